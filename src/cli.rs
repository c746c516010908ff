// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mygitops")]
#[command(about = "Batched image deploys through a gitops repository and helm")]
#[command(version)]
pub struct Cli {
    /// Path to the gitops repository working copy
    #[arg(long, global = true, env = "MYGITOPS_REPO", default_value = ".")]
    pub gitops_repo: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Helm home to use instead of a private temporary one
    #[arg(long, global = true, env = "HELM_HOME")]
    pub helm_home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Patch the cluster's values files with a new image and commit (no push)
    Deploy {
        /// Cluster whose manifests are updated
        #[arg(long)]
        cluster: String,

        /// Repository that triggered the deploy
        #[arg(long)]
        source: String,

        /// Image as repository[:tag]
        #[arg(long)]
        image: String,

        /// Author recorded in the commit message
        #[arg(long)]
        author: String,
    },

    /// Install or upgrade every release of a cluster
    Sync {
        #[arg(long)]
        cluster: String,

        /// Pass --dry-run to helm
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what a sync would change
    Diff {
        #[arg(long)]
        cluster: String,
    },

    /// Check every values file of a cluster for a valid header
    Validate {
        #[arg(long)]
        cluster: String,
    },

    /// Run the HTTP deploy server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,

        /// Kubeconfig listing the clusters to manage (default: ~/.kube/config)
        #[arg(long, env = "KUBECONFIG")]
        kubeconfig: Option<PathBuf>,

        /// Pass --dry-run to helm
        #[arg(long)]
        dry_run: bool,
    },
}
