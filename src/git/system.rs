// ABOUTME: Git backend driving the system `git` binary through tokio::process.
// ABOUTME: Commands run with an isolated environment and a fixed robot identity.

use async_trait::async_trait;
use snafu::{ResultExt, ensure};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use super::GitBackend;
use super::error::{CommandFailedSnafu, GitError, NoPathSnafu, SpawnSnafu};

pub const ROBOT_NAME: &str = "MyGitops robot";
pub const ROBOT_EMAIL: &str = "mygitops@localhost";
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH: &str = "master";

#[derive(Debug, Clone)]
pub struct SystemGit {
    root: PathBuf,
    remote: String,
    branch: String,
}

impl SystemGit {
    /// Open an existing working copy. Fails unless git recognises `path` as one.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let path = path.as_ref();
        ensure!(!path.as_os_str().is_empty(), NoPathSnafu);

        let git = Self {
            root: path.to_path_buf(),
            remote: DEFAULT_REMOTE.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
        };
        git.run(&["rev-parse", "--git-dir"]).await?;
        Ok(git)
    }

    pub fn remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    fn upstream(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    fn git_cmd(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.root);

        // Don't let the caller's environment pick another repository
        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        if let Ok(home) = std::env::var("HOME") {
            cmd.env("HOME", home);
        }
        cmd.env("GIT_DIR", self.root.join(".git"));
        cmd.env("GIT_WORK_TREE", &self.root);

        cmd.arg("-c").arg(format!("user.name={ROBOT_NAME}"));
        cmd.arg("-c").arg(format!("user.email={ROBOT_EMAIL}"));
        cmd.arg("-c").arg("commit.gpgsign=false");

        cmd
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let command = format!("git {}", args.join(" "));
        debug!("Running: {command}");

        let output = self
            .git_cmd()
            .args(args)
            .output()
            .await
            .context(SpawnSnafu {
                command: command.clone(),
            })?;

        if !output.status.success() {
            let mut diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
            if diagnostic.trim().is_empty() {
                diagnostic = String::from_utf8_lossy(&output.stdout).into_owned();
            }
            return CommandFailedSnafu {
                command,
                output: diagnostic,
            }
            .fail();
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl GitBackend for SystemGit {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn fetch(&self) -> Result<(), GitError> {
        self.run(&["fetch", self.remote.as_str()]).await.map(drop)
    }

    async fn reset(&self) -> Result<(), GitError> {
        let upstream = self.upstream();
        self.run(&["reset", "--hard", upstream.as_str()]).await.map(drop)
    }

    async fn pull(&self, extra_args: &[&str]) -> Result<(), GitError> {
        let mut args = vec!["pull", self.remote.as_str(), self.branch.as_str()];
        args.extend_from_slice(extra_args);
        self.run(&args).await.map(drop)
    }

    async fn push(&self) -> Result<(), GitError> {
        self.run(&["push", self.remote.as_str(), self.branch.as_str()]).await.map(drop)
    }

    async fn add_all(&self) -> Result<(), GitError> {
        self.run(&["add", "-A"]).await.map(drop)
    }

    async fn commit(&self, message: &str) -> Result<(), GitError> {
        self.run(&["commit", "--allow-empty", "-m", message])
            .await
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_path_is_rejected() {
        let err = SystemGit::open("").await.unwrap_err();
        assert!(matches!(err, GitError::NoPath));
    }
}
