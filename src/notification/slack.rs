// ABOUTME: Slack incoming-webhook notifier posting one attachment per deploy outcome.
// ABOUTME: Green attachment on success, red with the error field on failure.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::error::Error;
use std::time::Duration;
use tracing::debug;

use super::{NotificationError, Notifier};
use crate::types::DeployRequest;

pub const DEFAULT_USERNAME: &str = "mygitops";
pub const DEFAULT_ICON: &str = ":rocket:";

const SUCCESS_COLOR: &str = "#36a64f";
const FAILURE_COLOR: &str = "#ff0000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
pub(crate) struct Message {
    attachments: Vec<Attachment>,
    username: String,
    icon_emoji: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    channel: String,
}

#[derive(Debug, Serialize)]
struct Attachment {
    color: &'static str,
    pretext: String,
    fields: Vec<Field>,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct Field {
    title: &'static str,
    value: String,
}

#[derive(Debug, Clone)]
pub struct SlackWebhook {
    url: String,
    channel: String,
    username: String,
    icon: String,
    client: reqwest::Client,
}

impl SlackWebhook {
    /// Empty username or icon fall back to the defaults.
    pub fn new(
        url: impl Into<String>,
        channel: impl Into<String>,
        username: impl Into<String>,
        icon: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let url = url.into();
        if url.is_empty() {
            return Err(NotificationError::MissingWebhook);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("mygitops/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            url,
            channel: channel.into(),
            username: or_default(username.into(), DEFAULT_USERNAME),
            icon: or_default(icon.into(), DEFAULT_ICON),
            client,
        })
    }

    pub(crate) fn message(
        &self,
        request: &DeployRequest,
        error: Option<&(dyn Error + Send + Sync)>,
    ) -> Message {
        let repo = &request.trigger_repo;
        let mut fields = vec![
            Field {
                title: "Repository",
                value: repo.clone(),
            },
            Field {
                title: "Image",
                value: request.image.to_string(),
            },
            Field {
                title: "Author",
                value: request.author.clone(),
            },
            Field {
                title: "Cluster",
                value: request.cluster.to_string(),
            },
        ];

        let (color, pretext) = match error {
            None => (
                SUCCESS_COLOR,
                format!("Application {repo} was deployed successfully"),
            ),
            Some(e) => {
                fields.push(Field {
                    title: "Error",
                    value: e.to_string(),
                });
                (
                    FAILURE_COLOR,
                    format!("Application {repo} was not deployed successfully"),
                )
            }
        };

        Message {
            attachments: vec![Attachment {
                color,
                pretext,
                fields,
                ts: Utc::now().timestamp(),
            }],
            username: self.username.clone(),
            icon_emoji: self.icon.clone(),
            channel: self.channel.clone(),
        }
    }
}

fn or_default(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

#[async_trait]
impl Notifier for SlackWebhook {
    async fn deployed(
        &self,
        request: &DeployRequest,
        error: Option<&(dyn Error + Send + Sync)>,
    ) -> Result<(), NotificationError> {
        let message = self.message(request, error);
        let response = self.client.post(&self.url).json(&message).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
            });
        }
        debug!("Sent deploy notification for {}", request.trigger_repo);
        Ok(())
    }
}
