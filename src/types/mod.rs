// ABOUTME: Validated domain types shared across the release pipeline.
// ABOUTME: Deploy requests, target images, and cluster names.

mod cluster;
mod image;
mod request;

pub use cluster::{ClusterName, ClusterNameError};
pub use image::{ParseImageError, TargetImage};
pub use request::DeployRequest;
