// ABOUTME: Reads the cluster list from a kubeconfig file.
// ABOUTME: Each listed cluster name is used as the kube context when talking to it.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::Path;

use super::deserialize::deserialize_clusters;
use crate::error::{Error, Result};
use crate::types::ClusterName;

#[derive(Debug, Deserialize)]
struct Kubeconfig {
    #[serde(deserialize_with = "deserialize_clusters")]
    clusters: NonEmpty<ClusterName>,
}

pub fn clusters_from_yaml(yaml: &str) -> std::result::Result<NonEmpty<ClusterName>, serde_yaml::Error> {
    serde_yaml::from_str::<Kubeconfig>(yaml).map(|config| config.clusters)
}

/// Load the clusters named in the kubeconfig at `path`.
pub fn load_clusters(path: &Path) -> Result<NonEmpty<ClusterName>> {
    let content = std::fs::read_to_string(path)?;
    clusters_from_yaml(&content).map_err(|source| Error::Kubeconfig {
        path: path.to_path_buf(),
        source,
    })
}
