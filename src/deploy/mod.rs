// ABOUTME: Deployment workflow: patch every values file of the target cluster, then commit.
// ABOUTME: Runs unbatched from the CLI and as the per-request job inside the release batcher.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::git::{GitBackend, GitError};
use crate::manifest::{self, PatchError};
use crate::types::{ClusterName, DeployRequest};

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(
        "no files found for cluster '{cluster}' in gitops repo, searched for '{}/*-values.yaml'",
        .dir.display()
    )]
    NoManifests { cluster: ClusterName, dir: PathBuf },

    #[error("no deployments were patched, is the repo '{trigger_repo}' referenced in any of the manifests?")]
    NothingPatched { trigger_repo: String },

    #[error("cannot list manifests: {0}")]
    Discovery(#[source] std::io::Error),

    #[error("file {}: {source}", .path.display())]
    Patch {
        path: PathBuf,
        #[source]
        source: PatchError,
    },

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Point every values file of the request's cluster that references the
/// trigger repo at the request's image. Returns the number of files patched.
///
/// Every file is patched in memory before any is written, so a request that
/// fails leaves the working copy as it found it.
pub fn update_values(root: &Path, request: &DeployRequest) -> Result<usize, DeployError> {
    let manifests =
        manifest::find_manifests(root, &request.cluster).map_err(DeployError::Discovery)?;

    if manifests.values.is_empty() {
        return Err(DeployError::NoManifests {
            cluster: request.cluster.clone(),
            dir: manifest::cluster_dir(root, &request.cluster),
        });
    }

    let mut edits = Vec::new();
    for path in &manifests.values {
        let patch_error = |source: PatchError| DeployError::Patch {
            path: path.clone(),
            source,
        };
        let original = std::fs::read_to_string(path)
            .map_err(PatchError::from)
            .map_err(patch_error)?;
        if let Some(patched) = manifest::patch_content(&original, request).map_err(patch_error)? {
            edits.push(Edit {
                path,
                original,
                patched,
            });
        }
    }

    if edits.is_empty() {
        return Err(DeployError::NothingPatched {
            trigger_repo: request.trigger_repo.clone(),
        });
    }

    write_all(&edits)?;
    Ok(edits.len())
}

struct Edit<'a> {
    path: &'a PathBuf,
    original: String,
    patched: String,
}

/// Write every edit, putting back the files already written if one fails.
fn write_all(edits: &[Edit<'_>]) -> Result<(), DeployError> {
    for (written, edit) in edits.iter().enumerate() {
        if let Err(e) = std::fs::write(edit.path, &edit.patched) {
            for done in &edits[..written] {
                if let Err(restore) = std::fs::write(done.path, &done.original) {
                    warn!("Cannot restore {}: {restore}", done.path.display());
                }
            }
            return Err(DeployError::Patch {
                path: edit.path.clone(),
                source: e.into(),
            });
        }
        debug!("Patched {}", edit.path.display());
    }
    Ok(())
}

/// Apply the request to the working copy and record it as one commit.
pub async fn create(git: &dyn GitBackend, request: &DeployRequest) -> Result<(), DeployError> {
    let patched = update_values(git.root(), request)?;
    git.add_all().await?;
    git.commit(&request.commit_message()).await?;
    info!(
        "Committed {} to {} ({patched} file(s))",
        request.image, request.cluster
    );
    Ok(())
}
