// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Turns kubeconfig cluster entries into a non-empty list of cluster names.

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::types::ClusterName;

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    name: String,
}

pub fn deserialize_clusters<'de, D>(deserializer: D) -> Result<NonEmpty<ClusterName>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries: Option<Vec<ClusterEntry>> = Option::deserialize(deserializer)?;
    let clusters = entries
        .unwrap_or_default()
        .into_iter()
        .map(|entry| ClusterName::new(&entry.name))
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(clusters)
        .ok_or_else(|| serde::de::Error::custom("at least one cluster is required"))
}
