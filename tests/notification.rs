// ABOUTME: Integration tests for the Slack webhook notifier against a local HTTP receiver.
// ABOUTME: Checks the posted payload and how non-2xx answers are reported.

mod support;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use mygitops::notification::{NotificationError, Notifier, SlackWebhook};
use mygitops::release::ReleaseError;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

async fn receiver(status: StatusCode) -> (SocketAddr, mpsc::UnboundedReceiver<serde_json::Value>) {
    let (sent, received) = mpsc::unbounded_channel();
    let app = Router::new()
        .route(
            "/hook",
            post(
                move |State(sent): State<mpsc::UnboundedSender<serde_json::Value>>,
                      Json(body): Json<serde_json::Value>| async move {
                    let _ = sent.send(body);
                    status
                },
            ),
        )
        .with_state(sent);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, received)
}

/// Test: a failed deploy posts one red attachment with the error field
#[tokio::test]
async fn failure_is_posted_to_webhook() {
    let (addr, mut received) = receiver(StatusCode::OK).await;
    let hook = SlackWebhook::new(format!("http://{addr}/hook"), "#deploys", "", "").unwrap();
    let request = support::request("github.com/org/web", "v1", "prod");

    hook.deployed(&request, Some(&ReleaseError::PushFailed("rejected".to_string())))
        .await
        .unwrap();

    let body = received.recv().await.unwrap();
    assert_eq!(body["channel"], "#deploys");
    assert_eq!(body["username"], "mygitops");
    let attachment = &body["attachments"][0];
    assert_eq!(attachment["color"], "#ff0000");
    assert_eq!(attachment["fields"][4]["title"], "Error");
    assert_eq!(
        attachment["fields"][4]["value"],
        "cannot push deployment: rejected"
    );
}

/// Test: a webhook answering with an error status is reported as rejected
#[tokio::test]
async fn non_success_status_is_rejected() {
    let (addr, _received) = receiver(StatusCode::FORBIDDEN).await;
    let hook = SlackWebhook::new(format!("http://{addr}/hook"), "", "", "").unwrap();
    let request = support::request("github.com/org/web", "v1", "prod");

    let err = hook.deployed(&request, None).await.unwrap_err();
    assert!(matches!(err, NotificationError::Rejected { status: 403 }));
}
