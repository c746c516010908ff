// ABOUTME: Integration tests for the HTTP deploy endpoints.
// ABOUTME: Drives the axum router with tower's oneshot against a scripted release manager.

mod support;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use mygitops::notification::{NotificationError, Notifier};
use mygitops::release::{ReleaseError, ReleaseManager};
use mygitops::server::{ApiResponse, AppState, router};
use mygitops::types::DeployRequest;
use parking_lot::Mutex;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

#[derive(Default)]
struct ScriptedManager {
    outcome: Option<ReleaseError>,
    requests: Mutex<Vec<DeployRequest>>,
}

impl ScriptedManager {
    fn failing(err: ReleaseError) -> Self {
        Self {
            outcome: Some(err),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<DeployRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ReleaseManager for ScriptedManager {
    async fn request_release(&self, request: DeployRequest) -> Result<(), ReleaseError> {
        self.requests.lock().push(request);
        match &self.outcome {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

struct ChannelNotifier {
    sent: mpsc::UnboundedSender<(DeployRequest, Option<String>)>,
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn deployed(
        &self,
        request: &DeployRequest,
        error: Option<&(dyn Error + Send + Sync)>,
    ) -> Result<(), NotificationError> {
        let _ = self.sent.send((request.clone(), error.map(|e| e.to_string())));
        Ok(())
    }
}

const FORM: &[(&str, &str)] = &[
    ("triggerRepo", "github.com/org/web"),
    ("imageRepo", "quay.io/org/web"),
    ("imageTag", "v1.2.3"),
    ("author", "alice"),
    ("cluster", "prod"),
];

fn encode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={}", v.replace('/', "%2F")))
        .collect::<Vec<_>>()
        .join("&")
}

fn deploy_form(fields: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/deploy")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(encode(fields)))
        .unwrap()
}

fn dockerhub(query: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/dockerhub?{query}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn body_of(response: Response) -> ApiResponse {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

mod index {
    use super::*;

    /// Test: the root path answers with a fixed greeting
    #[tokio::test]
    async fn root_says_hello() {
        let app = router(AppState::new(Arc::new(ScriptedManager::default())));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"hello world!");
    }
}

mod deploy {
    use super::*;

    /// Test: a complete form is turned into one release request
    #[tokio::test]
    async fn complete_form_is_released() {
        let manager = Arc::new(ScriptedManager::default());
        let app = router(AppState::new(manager.clone()));

        let response = app.oneshot(deploy_form(FORM)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_of(response).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.error, "");
        let deploy = body.deploy.unwrap();
        assert_eq!(deploy.trigger_repo, "github.com/org/web");
        assert_eq!(deploy.image.to_string(), "quay.io/org/web:v1.2.3");

        let requests = manager.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].author, "alice");
        assert_eq!(requests[0].cluster.as_str(), "prod");
    }

    /// Test: leaving out any one field is a 400 naming that field
    #[tokio::test]
    async fn each_missing_field_is_rejected() {
        for (missing, _) in FORM {
            let manager = Arc::new(ScriptedManager::default());
            let app = router(AppState::new(manager.clone()));
            let fields: Vec<(&str, &str)> =
                FORM.iter().copied().filter(|(k, _)| k != missing).collect();

            let response = app.oneshot(deploy_form(&fields)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "without {missing}");

            let body = body_of(response).await;
            assert_eq!(body.status, "error");
            assert_eq!(body.error, format!("missing parameter `{missing}`"));
            assert!(manager.requests().is_empty());
        }
    }

    /// Test: a cluster name that is not a valid context name is a 400
    #[tokio::test]
    async fn invalid_cluster_name_is_rejected() {
        let app = router(AppState::new(Arc::new(ScriptedManager::default())));
        let mut fields = FORM.to_vec();
        fields[4] = ("cluster", "..");

        let response = app.oneshot(deploy_form(&fields)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /// Test: an unmanaged cluster is the caller's fault
    #[tokio::test]
    async fn unmanaged_cluster_is_bad_request() {
        let manager = Arc::new(ScriptedManager::failing(ReleaseError::UnmanagedCluster(
            "prod".to_string(),
        )));
        let app = router(AppState::new(manager));

        let response = app.oneshot(deploy_form(FORM)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert_eq!(body.status, "error");
        assert!(body.error.contains("not managed"));
    }

    /// Test: pipeline failures are server errors carrying the message
    #[tokio::test]
    async fn pipeline_failure_is_server_error() {
        let manager = Arc::new(ScriptedManager::failing(ReleaseError::PushFailed(
            "rejected".to_string(),
        )));
        let app = router(AppState::new(manager));

        let response = app.oneshot(deploy_form(FORM)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body.error, "cannot push deployment: rejected");
        assert_eq!(body.deploy.unwrap().trigger_repo, "github.com/org/web");
    }
}

mod dockerhub_webhook {
    use super::*;

    fn push_payload() -> serde_json::Value {
        serde_json::json!({
            "push_data": {"pusher": "bob", "tag": "2.0.0", "pushed_at": 1417566161},
            "repository": {"repo_name": "org/web", "namespace": "org", "name": "web"}
        })
    }

    /// Test: a push webhook becomes a release of the pushed tag
    #[tokio::test]
    async fn push_is_released() {
        let manager = Arc::new(ScriptedManager::default());
        let app = router(AppState::new(manager.clone()));

        let response = app
            .oneshot(dockerhub(
                "triggerRepo=github.com%2Forg%2Fweb&cluster=prod",
                push_payload(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let requests = manager.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].trigger_repo, "github.com/org/web");
        assert_eq!(requests[0].image.repository, "org/web");
        assert_eq!(requests[0].image.tag, "2.0.0");
        assert_eq!(requests[0].author, "bob");
    }

    /// Test: the trigger repo must be given in the query
    #[tokio::test]
    async fn missing_trigger_repo_is_rejected() {
        let app = router(AppState::new(Arc::new(ScriptedManager::default())));
        let response = app
            .oneshot(dockerhub("cluster=prod", push_payload()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_of(response).await.error,
            "missing parameter `triggerRepo`"
        );
    }

    /// Test: a payload without a tag is reported as malformed
    #[tokio::test]
    async fn payload_without_tag_is_rejected() {
        let app = router(AppState::new(Arc::new(ScriptedManager::default())));
        let payload = serde_json::json!({
            "push_data": {"pusher": "bob"},
            "repository": {"repo_name": "org/web"}
        });
        let response = app
            .oneshot(dockerhub("triggerRepo=x&cluster=prod", payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_of(response).await.error.contains("No `tag` found"));
    }
}

mod notifications {
    use super::*;

    /// Test: every release outcome is passed to the notifier
    #[tokio::test]
    async fn outcomes_are_notified() {
        let (sent, mut received) = mpsc::unbounded_channel();
        let manager = Arc::new(ScriptedManager::failing(ReleaseError::SyncFailed(
            "helm exploded".to_string(),
        )));
        let state = AppState::new(manager).notifier(Arc::new(ChannelNotifier { sent }));

        let response = router(state).oneshot(deploy_form(FORM)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let (request, error) = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.trigger_repo, "github.com/org/web");
        assert_eq!(error.as_deref(), Some("cannot sync cluster: helm exploded"));
    }

    /// Test: a refused form is notified with the fields that were sent
    #[tokio::test]
    async fn refused_form_with_known_repo_and_cluster_is_notified() {
        let (sent, mut received) = mpsc::unbounded_channel();
        let manager = Arc::new(ScriptedManager::default());
        let state = AppState::new(manager.clone()).notifier(Arc::new(ChannelNotifier { sent }));
        let fields: Vec<(&str, &str)> = FORM
            .iter()
            .copied()
            .filter(|(k, _)| *k != "imageTag")
            .collect();

        let response = router(state).oneshot(deploy_form(&fields)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert_eq!(body.deploy.unwrap().author, "alice");

        let (request, error) = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.trigger_repo, "github.com/org/web");
        assert_eq!(request.cluster.as_str(), "prod");
        assert_eq!(request.image.tag, "");
        assert_eq!(error.as_deref(), Some("missing parameter `imageTag`"));
        assert!(manager.requests().is_empty());
    }

    /// Test: a malformed webhook payload is notified against the queried repo
    #[tokio::test]
    async fn malformed_dockerhub_payload_is_notified() {
        let (sent, mut received) = mpsc::unbounded_channel();
        let state = AppState::new(Arc::new(ScriptedManager::default()))
            .notifier(Arc::new(ChannelNotifier { sent }));
        let payload = serde_json::json!({"repository": {"repo_name": "org/web"}});

        let response = router(state)
            .oneshot(dockerhub("triggerRepo=x&cluster=prod", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (request, error) = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.trigger_repo, "x");
        assert!(error.unwrap().contains("No `pusher` found"));
    }

    /// Test: requests without a trigger repo and cluster are not notified
    #[tokio::test]
    async fn unidentified_forms_are_not_notified() {
        let (sent, mut received) = mpsc::unbounded_channel();
        let state = AppState::new(Arc::new(ScriptedManager::default()))
            .notifier(Arc::new(ChannelNotifier { sent }));

        let response = router(state)
            .oneshot(deploy_form(&FORM[..2]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(received.try_recv().is_err());
    }
}
