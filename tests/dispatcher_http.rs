//! Webhook delivery over real sockets: a throwaway axum receiver plays
//! the registered endpoints, one healthy and one failing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use clanhub::config::{QueueFullPolicy, WebhookConfig};
use clanhub::events::{ClanEventPayload, HookEvent};
use clanhub::models::{EventType, Hook};
use clanhub::services::{Dispatcher, FailureMeter, HookRegistry, HttpDeliverer};

#[derive(Clone, Default)]
struct Received {
    bodies: Arc<Mutex<Vec<Value>>>,
}

async fn accept(State(received): State<Received>, Json(body): Json<Value>) -> StatusCode {
    received.bodies.lock().unwrap().push(body);
    StatusCode::OK
}

async fn reject() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn spawn_receiver() -> (String, Received) {
    let received = Received::default();
    let app = Router::new()
        .route("/ok", post(accept))
        .route("/fail", post(reject))
        .with_state(received.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), received)
}

fn hook(game: &str, event_type: EventType, url: String) -> Hook {
    Hook {
        id: Uuid::new_v4(),
        public_id: Uuid::new_v4().to_string(),
        game_id: game.into(),
        event_type,
        url,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn delivers_real_http_posts_and_counts_failures() {
    let (base, received) = spawn_receiver().await;

    let registry = HookRegistry::new();
    registry
        .replace(vec![
            hook("g1", EventType::ClanCreated, format!("{base}/ok")),
            hook("g1", EventType::ClanCreated, format!("{base}/fail")),
        ])
        .await;

    let config = WebhookConfig {
        workers: 2,
        queue_size: 16,
        timeout_secs: 2,
        queue_full_policy: QueueFullPolicy::Drop,
        queue_block_ms: 50,
    };
    let failures = FailureMeter::new();
    let deliverer = Arc::new(HttpDeliverer::new(Duration::from_secs(config.timeout_secs)));
    let (dispatcher, pool) =
        Dispatcher::start(&config, registry, deliverer, failures.clone());

    dispatcher
        .dispatch(HookEvent::ClanCreated(ClanEventPayload {
            game_id: "g1".into(),
            public_id: "clan-1".into(),
            name: "The Clan".into(),
            metadata: serde_json::json!({"motto": "onwards"}),
            membership_count: 1,
        }))
        .await;

    drop(dispatcher);
    pool.join().await;

    let bodies = received.bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["success"], serde_json::json!(true));
    assert_eq!(bodies[0]["publicID"], serde_json::json!("clan-1"));
    assert_eq!(bodies[0]["membershipCount"], serde_json::json!(1));

    // The /fail endpoint counts against the failure meter.
    failures.tick();
    assert!(failures.rate() > 0.0);
}

#[tokio::test]
async fn unreachable_endpoint_is_counted_not_fatal() {
    let registry = HookRegistry::new();
    registry
        .replace(vec![hook(
            "g1",
            EventType::ClanCreated,
            // Reserved port on localhost, nothing listens here.
            "http://127.0.0.1:9/hook".to_string(),
        )])
        .await;

    let config = WebhookConfig {
        workers: 1,
        queue_size: 4,
        timeout_secs: 1,
        queue_full_policy: QueueFullPolicy::Drop,
        queue_block_ms: 50,
    };
    let failures = FailureMeter::new();
    let deliverer = Arc::new(HttpDeliverer::new(Duration::from_secs(config.timeout_secs)));
    let (dispatcher, pool) =
        Dispatcher::start(&config, registry, deliverer, failures.clone());

    dispatcher
        .dispatch(HookEvent::ClanCreated(ClanEventPayload {
            game_id: "g1".into(),
            public_id: "clan-1".into(),
            name: "The Clan".into(),
            metadata: serde_json::json!({}),
            membership_count: 1,
        }))
        .await;

    drop(dispatcher);
    pool.join().await;

    failures.tick();
    assert!(failures.rate() > 0.0);
}
