// ABOUTME: HelmOps backed by the system `helm` binary, one instance per kube context.
// ABOUTME: Init prepares a helm home, installs the diff/s3 plugins and adds configured repositories.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{HelmError, HelmOps, HelmRelease, HelmRepo};

const PLUGINS: [(&str, &str); 2] = [
    ("diff", "https://github.com/databus23/helm-diff"),
    ("s3", "https://github.com/hypnoglow/helm-s3.git"),
];

#[derive(Debug, Clone, Default)]
pub struct HelmCmdOptions {
    pub repositories: Vec<HelmRepo>,
    /// Pre-provisioned helm home. When unset, `init` creates a temporary one.
    pub helm_home: Option<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub kube_context: Option<String>,
    pub dry_run: bool,
    /// Copy helm's output to stdout.
    pub echo_output: bool,
    /// Helm executable; `helm` from `PATH` when unset.
    pub binary: Option<PathBuf>,
}

impl HelmCmdOptions {
    pub fn repositories(mut self, repositories: Vec<HelmRepo>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn helm_home(mut self, helm_home: Option<PathBuf>) -> Self {
        self.helm_home = helm_home;
        self
    }

    pub fn kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    pub fn kube_context(mut self, context: impl Into<String>) -> Self {
        self.kube_context = Some(context.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn echo_output(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    fn program(&self) -> PathBuf {
        self.binary.clone().unwrap_or_else(|| PathBuf::from("helm"))
    }
}

/// How helm processes are launched once the client is initialized.
#[derive(Debug)]
struct HelmExec {
    binary: PathBuf,
    helm_home: PathBuf,
    /// Minimal environment for a private helm home; `None` inherits ours.
    env: Option<Vec<(String, String)>>,
    kube_context: Option<String>,
    echo_output: bool,
}

impl HelmExec {
    fn command(&self, args: &[String]) -> (Command, String) {
        let mut full_args = Vec::with_capacity(args.len() + 1);
        if let Some(context) = &self.kube_context {
            full_args.push(format!("--kube-context={context}"));
        }
        full_args.extend(args.iter().cloned());

        let mut cmd = Command::new(&self.binary);
        cmd.args(&full_args);
        match &self.env {
            Some(env) => {
                cmd.env_clear();
                cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            }
            None => {
                cmd.env("HELM_HOME", &self.helm_home);
            }
        }

        (cmd, format!("helm {}", full_args.join(" ")))
    }

    /// Run helm and return its combined output.
    async fn exec(&self, args: &[String]) -> Result<String, HelmError> {
        let (mut cmd, command) = self.command(args);
        debug!("Running: {command}");

        let output = cmd.output().await.map_err(|source| HelmError::Spawn {
            command: command.clone(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if self.echo_output {
            print!("{combined}");
        }

        if !output.status.success() {
            return Err(HelmError::CommandFailed {
                command,
                output: combined,
            });
        }
        Ok(combined)
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

pub struct HelmCmd {
    options: HelmCmdOptions,
    exec: OnceLock<HelmExec>,
}

impl std::fmt::Debug for HelmCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelmCmd")
            .field("kube_context", &self.options.kube_context)
            .field("helm_home", &self.exec.get().map(|e| &e.helm_home))
            .finish()
    }
}

impl HelmCmd {
    pub fn new(options: HelmCmdOptions) -> Self {
        Self {
            options,
            exec: OnceLock::new(),
        }
    }

    fn exec(&self) -> Result<&HelmExec, HelmError> {
        self.exec.get().ok_or(HelmError::NotInitialized)
    }

    fn private_home(&self) -> Result<PathBuf, HelmError> {
        let context = self.options.kube_context.as_deref().unwrap_or("default");
        let path = std::env::temp_dir().join(format!(
            "mygitops-helmhome-{}-{}",
            std::process::id(),
            context.replace(['/', ':', '@'], "_")
        ));
        std::fs::create_dir_all(&path).map_err(|source| HelmError::HelmHome {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn private_env(&self, helm_home: &Path) -> Vec<(String, String)> {
        let mut env = vec![("HELM_HOME".to_string(), helm_home.display().to_string())];
        if let Some(kubeconfig) = &self.options.kubeconfig {
            env.push(("KUBECONFIG".to_string(), kubeconfig.display().to_string()));
        }
        if let Ok(path) = std::env::var("PATH") {
            env.push(("PATH".to_string(), path));
        }
        if let Ok(home) = std::env::var("HOME") {
            env.push(("HOME".to_string(), home));
        }
        env
    }

    async fn prepare(&self) -> Result<HelmExec, HelmError> {
        match &self.options.helm_home {
            Some(helm_home) => {
                debug!(
                    "HELM_HOME set to '{}', using pre-installed helm",
                    helm_home.display()
                );
                Ok(HelmExec {
                    binary: self.options.program(),
                    helm_home: helm_home.clone(),
                    env: None,
                    kube_context: self.options.kube_context.clone(),
                    echo_output: self.options.echo_output,
                })
            }
            None => {
                let helm_home = self.private_home()?;
                info!(
                    "No HELM_HOME specified, initializing helm in '{}'",
                    helm_home.display()
                );
                let exec = HelmExec {
                    binary: self.options.program(),
                    env: Some(self.private_env(&helm_home)),
                    helm_home,
                    kube_context: self.options.kube_context.clone(),
                    echo_output: self.options.echo_output,
                };
                exec.exec(&args(["init", "--client-only"])).await?;
                Ok(exec)
            }
        }
    }

    async fn install_plugin(exec: &HelmExec, name: &str, url: &str) -> Result<(), HelmError> {
        let listed = exec.exec(&args(["plugin", "list"])).await?;
        let installed = Regex::new(&format!(r"(?m)^{}\s", regex::escape(name)))
            .map(|re| re.is_match(&listed))
            .unwrap_or(false);
        if !installed {
            exec.exec(&args(["plugin", "install", url])).await?;
        }
        Ok(())
    }

    fn repo_listed(listing: &str, repo: &HelmRepo) -> bool {
        let pattern = format!(
            r"(?m)^{}\s*{}\s*$",
            regex::escape(&repo.name),
            regex::escape(&repo.url)
        );
        Regex::new(&pattern)
            .map(|re| re.is_match(listing))
            .unwrap_or(false)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RepositoriesFile {
    #[serde(default)]
    repositories: Vec<HelmRepo>,
}

#[async_trait]
impl HelmOps for HelmCmd {
    async fn init(&self) -> Result<(), HelmError> {
        if self.exec.get().is_some() {
            return Ok(());
        }

        let prepared = self.prepare().await?;
        let exec = self.exec.get_or_init(|| prepared);

        for (name, url) in PLUGINS {
            if let Err(e) = Self::install_plugin(exec, name, url).await {
                warn!("Cannot install helm {name} plugin: {e}");
            }
        }

        if self.options.repositories.is_empty() {
            return Ok(());
        }

        let listing = exec.exec(&args(["repo", "list"])).await?;
        for repo in &self.options.repositories {
            if !Self::repo_listed(&listing, repo) {
                self.add_repo(repo).await?;
            }
        }
        Ok(())
    }

    async fn sync_release(
        &self,
        release: &HelmRelease,
        value_files: &[PathBuf],
    ) -> Result<(), HelmError> {
        let mut cmd = args([
            "upgrade",
            "--install",
            release.name.as_str(),
            release.chart.as_str(),
            "--version",
            release.version.as_str(),
            "--namespace",
            release.namespace.as_str(),
        ]);
        cmd.extend(
            value_files
                .iter()
                .map(|file| format!("--values={}", file.display())),
        );
        if self.options.dry_run {
            cmd.push("--dry-run".to_string());
        }

        self.exec()?.exec(&cmd).await.map(drop)
    }

    async fn diff_release(
        &self,
        release: &HelmRelease,
        value_files: &[PathBuf],
    ) -> Result<(), HelmError> {
        let mut cmd = args([
            "diff",
            "upgrade",
            release.name.as_str(),
            release.chart.as_str(),
            "--allow-unreleased",
            "--version",
            release.version.as_str(),
        ]);
        cmd.extend(
            value_files
                .iter()
                .map(|file| format!("--values={}", file.display())),
        );

        self.exec()?.exec(&cmd).await.map(drop)
    }

    async fn update_repos(&self) -> Result<(), HelmError> {
        self.exec()?.exec(&args(["repo", "update"])).await.map(drop)
    }

    async fn add_repo(&self, repo: &HelmRepo) -> Result<(), HelmError> {
        self.exec()?
            .exec(&args(["repo", "add", repo.name.as_str(), repo.url.as_str()]))
            .await
            .map(drop)
    }

    async fn list_repos(&self) -> Result<Vec<HelmRepo>, HelmError> {
        let path = self
            .exec()?
            .helm_home
            .join("repository")
            .join("repositories.yaml");
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| HelmError::ReadRepos {
                path: path.clone(),
                source,
            })?;
        let file: RepositoriesFile =
            serde_yaml::from_str(&content).map_err(|source| HelmError::ParseRepos { path, source })?;
        Ok(file.repositories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(context: Option<&str>) -> HelmExec {
        HelmExec {
            binary: PathBuf::from("helm"),
            helm_home: PathBuf::from("/tmp/helm"),
            env: Some(Vec::new()),
            kube_context: context.map(str::to_string),
            echo_output: false,
        }
    }

    #[test]
    fn prefixes_kube_context() {
        let (_, rendered) = exec(Some("prod")).command(&args(["repo", "update"]));
        assert_eq!(rendered, "helm --kube-context=prod repo update");

        let (_, rendered) = exec(None).command(&args(["repo", "update"]));
        assert_eq!(rendered, "helm repo update");
    }

    #[test]
    fn recognises_listed_repositories() {
        let listing = "NAME  \tURL\nstable\thttps://charts.example.com\nlocal \thttp://127.0.0.1:8879/charts\n";
        let stable = HelmRepo {
            name: "stable".to_string(),
            url: "https://charts.example.com".to_string(),
        };
        let other = HelmRepo {
            name: "other".to_string(),
            url: "https://charts.example.com".to_string(),
        };
        assert!(HelmCmd::repo_listed(listing, &stable));
        assert!(!HelmCmd::repo_listed(listing, &other));
    }

    #[tokio::test]
    async fn operations_require_init() {
        let helm = HelmCmd::new(HelmCmdOptions::default());
        assert!(matches!(
            helm.update_repos().await,
            Err(HelmError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn lists_repositories_from_helm_home() {
        let home = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(home.path().join("repository")).unwrap();
        std::fs::write(
            home.path().join("repository/repositories.yaml"),
            "apiVersion: v1\nrepositories:\n- name: stable\n  url: https://charts.example.com\n  cache: /x\n",
        )
        .unwrap();

        let helm = HelmCmd::new(
            HelmCmdOptions::default().helm_home(Some(home.path().to_path_buf())),
        );
        helm.exec
            .set(helm.prepare().await.unwrap())
            .unwrap();

        let repos = helm.list_repos().await.unwrap();
        assert_eq!(
            repos,
            vec![HelmRepo {
                name: "stable".to_string(),
                url: "https://charts.example.com".to_string(),
            }]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_repo_listing_fails_init() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("helm");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$1\" = repo ] && [ \"$2\" = list ]; then echo 'Error: no repositories' >&2; exit 1; fi\nexit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let helm = HelmCmd::new(
            HelmCmdOptions::default()
                .binary(&script)
                .helm_home(Some(dir.path().to_path_buf()))
                .repositories(vec![HelmRepo {
                    name: "stable".to_string(),
                    url: "https://charts.example.com".to_string(),
                }]),
        );

        match helm.init().await {
            Err(HelmError::CommandFailed { command, output }) => {
                assert!(command.ends_with("repo list"));
                assert!(output.contains("no repositories"));
            }
            other => panic!("expected repo list failure, got {other:?}"),
        }
    }
}
