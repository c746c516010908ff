// ABOUTME: Deploy outcome notifications.
// ABOUTME: Fire-and-forget from the caller's point of view; failures are only logged.

mod slack;

pub use slack::{DEFAULT_ICON, DEFAULT_USERNAME, SlackWebhook};

use async_trait::async_trait;
use std::error::Error;

use crate::types::DeployRequest;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("there was no webhook url specified")]
    MissingWebhook,

    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected the message with status {status}")]
    Rejected { status: u16 },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Report the outcome of a deploy request; `error` is `None` on success.
    ///
    /// Failures are either a release error or the reason the request was
    /// refused before it reached the pipeline.
    async fn deployed(
        &self,
        request: &DeployRequest,
        error: Option<&(dyn Error + Send + Sync)>,
    ) -> Result<(), NotificationError>;
}
