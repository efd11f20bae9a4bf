//! The telegram sender against a local stand-in for the Bot API.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use lib_switch::configs::{ChannelProperties, NotificationChannel};
use lib_switch::notify::{Notifier, NotifierRegistry, NotifyError};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Received {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn send_message(
    State(received): State<Received>,
    Path(bot): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    received.calls.lock().unwrap().push((bot.clone(), body));
    if bot == "botbad-token" {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"ok": false, "description": "Unauthorized"})),
        )
    } else {
        (StatusCode::OK, Json(json!({"ok": true})))
    }
}

async fn spawn_stub() -> (SocketAddr, Received) {
    let received = Received::default();
    let app = Router::new()
        .route("/{bot}/sendMessage", post(send_message))
        .with_state(received.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, received)
}

fn telegram_channel(addr: SocketAddr, token: &str) -> NotificationChannel {
    let props: ChannelProperties = [
        ("bot_token".to_string(), token.to_string()),
        ("chat_id".to_string(), "123456789".to_string()),
        ("api_base".to_string(), format!("http://{addr}")),
    ]
    .into_iter()
    .collect();
    NotificationChannel::new("telegram", props)
}

#[tokio::test]
async fn posts_subject_and_body_to_chat() {
    let (addr, received) = spawn_stub().await;
    let notifier = NotifierRegistry::with_builtin()
        .build(&telegram_channel(addr, "123456:fake-token"))
        .unwrap()
        .expect("telegram is built in");
    assert_eq!(notifier.kind(), "telegram");

    notifier
        .notify("Dead Man's Switch Triggered", "No heartbeat from alpha")
        .await
        .unwrap();

    let calls = received.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "bot123456:fake-token");
    assert_eq!(
        calls[0].1,
        json!({"chat_id": "123456789", "text": "Dead Man's Switch Triggered\nNo heartbeat from alpha"})
    );
}

#[tokio::test]
async fn rejected_token_surfaces_status() {
    let (addr, received) = spawn_stub().await;
    let notifier = NotifierRegistry::with_builtin()
        .build(&telegram_channel(addr, "bad-token"))
        .unwrap()
        .unwrap();

    let err = notifier.notify("s", "b").await.unwrap_err();
    match err {
        NotifyError::Rejected { status, body, .. } => {
            assert_eq!(status, 401);
            assert!(body.contains("Unauthorized"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    // Client errors are not retried.
    assert_eq!(received.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unreachable_api_is_a_transport_error() {
    // Bind and drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let notifier = NotifierRegistry::with_builtin()
        .build(&telegram_channel(addr, "123:abc"))
        .unwrap()
        .unwrap();

    let err = notifier.notify("s", "b").await.unwrap_err();
    assert!(matches!(err, NotifyError::Transport { .. }));
}
