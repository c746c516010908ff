// ABOUTME: Entry point for the mygitops CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use mygitops::config::{self, Config};
use mygitops::deploy;
use mygitops::error::{Error, Result};
use mygitops::git::SystemGit;
use mygitops::helm::{HelmCmdFactory, HelmCmdOptions, HelmFactory};
use mygitops::notification::Notifier;
use mygitops::release::BatchedReleaseManager;
use mygitops::server::{self, AppState};
use mygitops::sync::{self, ClusterSync, SyncError};
use mygitops::types::{ClusterName, DeployRequest, TargetImage};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("mygitops=debug")
    } else {
        EnvFilter::new("mygitops=info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let root = cli.gitops_repo;
    let helm_home = cli.helm_home;

    match cli.command {
        Commands::Deploy {
            cluster,
            source,
            image,
            author,
        } => {
            let image = TargetImage::parse(&image).map_err(|e| Error::InvalidConfig(e.to_string()))?;
            let request = DeployRequest::new(source, image, author, cluster_arg(&cluster)?);
            let git = SystemGit::open(&root).await?;
            deploy::create(&git, &request).await?;
            println!("Committed: {}", request.commit_message());
            Ok(())
        }
        Commands::Sync { cluster, dry_run } => {
            let config = Config::discover_or_default(&root)?;
            let options = helm_options(&config, helm_home, None).dry_run(dry_run);
            let sync = cluster_sync(&root, &config, &cluster_arg(&cluster)?, options).await?;
            sync.refresh_and_sync().await?;
            println!("Cluster {} synced", sync.cluster());
            Ok(())
        }
        Commands::Diff { cluster } => {
            let config = Config::discover_or_default(&root)?;
            let options = helm_options(&config, helm_home, None).echo_output(true);
            let sync = cluster_sync(&root, &config, &cluster_arg(&cluster)?, options).await?;
            sync.diff().await?;
            Ok(())
        }
        Commands::Validate { cluster } => {
            let problems = sync::validate(&root, &cluster_arg(&cluster)?)?;
            if !problems.is_empty() {
                return Err(SyncError::InvalidManifests(problems).into());
            }
            println!("All manifests are valid");
            Ok(())
        }
        Commands::Serve {
            listen,
            kubeconfig,
            dry_run,
        } => serve(&root, helm_home, kubeconfig, listen, dry_run).await,
    }
}

fn cluster_arg(name: &str) -> Result<ClusterName> {
    ClusterName::new(name).map_err(|e| Error::InvalidConfig(e.to_string()))
}

fn default_kubeconfig() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".kube").join("config"))
        .ok_or_else(|| Error::MissingEnvVar("HOME".to_string()))
}

fn helm_options(
    config: &Config,
    helm_home: Option<PathBuf>,
    kubeconfig: Option<PathBuf>,
) -> HelmCmdOptions {
    HelmCmdOptions::default()
        .repositories(config.helm.repositories.clone())
        .helm_home(helm_home)
        .kubeconfig(kubeconfig)
}

async fn cluster_sync(
    root: &Path,
    config: &Config,
    cluster: &ClusterName,
    options: HelmCmdOptions,
) -> Result<ClusterSync> {
    let helm = HelmCmdFactory::new(options).create(cluster);
    helm.init().await?;
    Ok(ClusterSync::new(root, cluster.clone(), helm).max_parallel(config.sync.max_parallel))
}

async fn serve(
    root: &Path,
    helm_home: Option<PathBuf>,
    kubeconfig: Option<PathBuf>,
    listen: SocketAddr,
    dry_run: bool,
) -> Result<()> {
    let config = Config::discover_or_default(root)?;
    let kubeconfig = match kubeconfig {
        Some(path) => path,
        None => default_kubeconfig()?,
    };
    let clusters = config::load_clusters(&kubeconfig)?;
    info!(
        "Managing clusters: {}",
        clusters
            .iter()
            .map(ClusterName::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let git = SystemGit::open(root)
        .await?
        .remote(config.git.remote.as_str())
        .branch(config.git.branch.as_str());
    let factory =
        HelmCmdFactory::new(helm_options(&config, helm_home, Some(kubeconfig)).dry_run(dry_run));
    let manager = Arc::new(
        BatchedReleaseManager::init(config.release_options(clusters), Arc::new(git), &factory)
            .await?,
    );

    let mut state = AppState::new(manager.clone());
    match &config.notification.slack {
        Some(slack) => {
            let notifier: Arc<dyn Notifier> = Arc::new(slack.webhook()?);
            state = state.notifier(notifier);
        }
        None => warn!("No notification configured; deploy outcomes are only logged"),
    }

    server::serve(listen, state).await?;

    if let Ok(manager) = Arc::try_unwrap(manager) {
        manager.shutdown().await;
    }
    Ok(())
}
