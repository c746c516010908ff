// ABOUTME: DeployRequest - one "deploy this image to that cluster" ask.
// ABOUTME: Immutable once built; owned by the queued job until it completes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ClusterName, TargetImage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Identifier of the repository whose build triggered this deploy.
    /// Matched against the keys of a header's `images` mapping.
    pub trigger_repo: String,
    pub image: TargetImage,
    pub author: String,
    pub cluster: ClusterName,
}

impl DeployRequest {
    pub fn new(
        trigger_repo: impl Into<String>,
        image: TargetImage,
        author: impl Into<String>,
        cluster: ClusterName,
    ) -> Self {
        Self {
            trigger_repo: trigger_repo.into(),
            image,
            author: author.into(),
            cluster,
        }
    }

    /// Commit message recorded in the gitops repository for this deploy.
    pub fn commit_message(&self) -> String {
        format!(
            "Deploy: {} to {} by {}",
            self.image, self.cluster, self.author
        )
    }
}

impl fmt::Display for DeployRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "triggerRepo: {}, author: {}, cluster: {}, image: {}",
            self.trigger_repo, self.author, self.cluster, self.image
        )
    }
}
