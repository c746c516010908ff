// ABOUTME: HTTP front door: form-encoded deploy requests and Docker Hub push webhooks.
// ABOUTME: Each request blocks until its release is live, then answers with a JSON envelope.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::notification::Notifier;
use crate::release::{ReleaseError, ReleaseErrorKind, ReleaseManager};
use crate::types::{ClusterName, DeployRequest, TargetImage};

#[derive(Clone)]
pub struct AppState {
    releases: Arc<dyn ReleaseManager>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl AppState {
    pub fn new(releases: Arc<dyn ReleaseManager>) -> Self {
        Self {
            releases,
            notifier: None,
        }
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn notify(&self, request: &DeployRequest, error: Option<Box<dyn Error + Send + Sync>>) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let request = request.clone();
        tokio::spawn(async move {
            debug!("Sending notification");
            if let Err(e) = notifier.deployed(&request, error.as_deref()).await {
                error!("Error sending notification: {e}");
            }
        });
    }
}

/// Response body of every deploy endpoint.
///
/// `deploy` holds the request whenever it could be identified, on errors too.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub deploy: Option<DeployRequest>,
    pub error: String,
}

impl ApiResponse {
    fn ok(deploy: DeployRequest) -> Self {
        Self {
            status: "ok".to_string(),
            deploy: Some(deploy),
            error: String::new(),
        }
    }

    fn error(message: impl Into<String>, deploy: Option<DeployRequest>) -> Self {
        Self {
            status: "error".to_string(),
            deploy,
            error: message.into(),
        }
    }
}

fn reject(status: StatusCode, message: String, deploy: Option<DeployRequest>) -> Response {
    error!("[status: {}] Error: {message}", status.as_u16());
    (status, Json(ApiResponse::error(message, deploy))).into_response()
}

/// Why a request was refused before reaching the release pipeline.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidRequest(String);

fn required(value: Option<&str>, name: &str) -> Result<String, InvalidRequest> {
    match value {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(InvalidRequest(format!("missing parameter `{name}`"))),
    }
}

fn cluster(value: &str) -> Result<ClusterName, InvalidRequest> {
    ClusterName::new(value).map_err(|e| InvalidRequest(e.to_string()))
}

/// Whatever was sent, as long as the trigger repo and a valid cluster are there.
fn identified(
    trigger_repo: Option<&str>,
    cluster: Option<&str>,
    image: TargetImage,
    author: &str,
) -> Option<DeployRequest> {
    let trigger_repo = trigger_repo.filter(|repo| !repo.is_empty())?;
    let cluster = ClusterName::new(cluster?).ok()?;
    Some(DeployRequest::new(trigger_repo, image, author, cluster))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployForm {
    pub trigger_repo: Option<String>,
    pub image_repo: Option<String>,
    pub image_tag: Option<String>,
    pub author: Option<String>,
    pub cluster: Option<String>,
}

impl DeployForm {
    fn to_request(&self) -> Result<DeployRequest, InvalidRequest> {
        let trigger_repo = required(self.trigger_repo.as_deref(), "triggerRepo")?;
        let image_repo = required(self.image_repo.as_deref(), "imageRepo")?;
        let image_tag = required(self.image_tag.as_deref(), "imageTag")?;
        let author = required(self.author.as_deref(), "author")?;
        let cluster = cluster(&required(self.cluster.as_deref(), "cluster")?)?;
        Ok(DeployRequest::new(
            trigger_repo,
            TargetImage::new(image_repo, image_tag),
            author,
            cluster,
        ))
    }

    fn identified(&self) -> Option<DeployRequest> {
        identified(
            self.trigger_repo.as_deref(),
            self.cluster.as_deref(),
            TargetImage::new(
                self.image_repo.as_deref().unwrap_or_default(),
                self.image_tag.as_deref().unwrap_or_default(),
            ),
            self.author.as_deref().unwrap_or_default(),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerhubParams {
    pub trigger_repo: Option<String>,
    pub cluster: Option<String>,
}

/// The parts of a Docker Hub push webhook that describe the pushed image.
#[derive(Debug, Default, Deserialize)]
pub struct DockerhubPayload {
    #[serde(default)]
    pub push_data: DockerhubPushData,
    #[serde(default)]
    pub repository: DockerhubRepository,
}

#[derive(Debug, Default, Deserialize)]
pub struct DockerhubPushData {
    #[serde(default)]
    pub pusher: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DockerhubRepository {
    #[serde(default)]
    pub repo_name: String,
}

fn from_payload(value: &str, field: &str) -> Result<String, InvalidRequest> {
    if value.is_empty() {
        return Err(InvalidRequest(format!(
            "is the json payload from dockerhub malformed? No `{field}` found in request"
        )));
    }
    Ok(value.to_string())
}

fn dockerhub_request(
    params: &DockerhubParams,
    payload: &DockerhubPayload,
) -> Result<DeployRequest, InvalidRequest> {
    let trigger_repo = required(params.trigger_repo.as_deref(), "triggerRepo")?;
    let cluster = cluster(&required(params.cluster.as_deref(), "cluster")?)?;
    let repository = from_payload(&payload.repository.repo_name, "repo_name")?;
    let pusher = from_payload(&payload.push_data.pusher, "pusher")?;
    let tag = from_payload(&payload.push_data.tag, "tag")?;
    Ok(DeployRequest::new(
        trigger_repo,
        TargetImage::new(repository, tag),
        pusher,
        cluster,
    ))
}

fn dockerhub_identified(
    params: &DockerhubParams,
    payload: &DockerhubPayload,
) -> Option<DeployRequest> {
    identified(
        params.trigger_repo.as_deref(),
        params.cluster.as_deref(),
        TargetImage::new(
            payload.repository.repo_name.as_str(),
            payload.push_data.tag.as_str(),
        ),
        &payload.push_data.pusher,
    )
}

fn status_for(error: &ReleaseError) -> StatusCode {
    match error.kind() {
        ReleaseErrorKind::UnmanagedCluster => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn release(state: &AppState, request: DeployRequest) -> Response {
    info!("New deploy request: {request}");
    match state.releases.request_release(request.clone()).await {
        Ok(()) => {
            info!("Deploy successful: {} to {}", request.image, request.cluster);
            state.notify(&request, None);
            (StatusCode::OK, Json(ApiResponse::ok(request))).into_response()
        }
        Err(e) => {
            let message = e.to_string();
            let status = status_for(&e);
            state.notify(&request, Some(Box::new(e)));
            reject(status, message, Some(request))
        }
    }
}

/// Answer 400, notifying when the refused request could be identified.
fn refuse(state: &AppState, error: InvalidRequest, request: Option<DeployRequest>) -> Response {
    let message = error.to_string();
    if let Some(request) = &request {
        state.notify(request, Some(Box::new(error)));
    }
    reject(StatusCode::BAD_REQUEST, message, request)
}

async fn index() -> &'static str {
    "hello world!"
}

async fn deploy(State(state): State<AppState>, Form(form): Form<DeployForm>) -> Response {
    match form.to_request() {
        Ok(request) => release(&state, request).await,
        Err(e) => refuse(&state, e, form.identified()),
    }
}

async fn dockerhub(
    State(state): State<AppState>,
    Query(params): Query<DockerhubParams>,
    Json(payload): Json<DockerhubPayload>,
) -> Response {
    match dockerhub_request(&params, &payload) {
        Ok(request) => release(&state, request).await,
        Err(e) => refuse(&state, e, dockerhub_identified(&params, &payload)),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/deploy", post(deploy))
        .route("/dockerhub", post(dockerhub))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Server started on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down");
            }
        })
        .await
}
