//! Webhook ingress tests against a scripted venue set.
//!
//! Drives the axum router directly, exercising the full path from raw
//! payload to per-venue breakdown without a network listener.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use relay_bot::ingress::{create_router, AppState};
use relay_core::{AlertSink, OrderRequest, Size, VenueId};
use relay_engine::{
    DedupeConfig, Deduplicator, ExecutionLogger, HealthBoard, ProcessorConfig, RateLimitConfig,
    SignalProcessor, SourceRateLimiter,
};
use relay_persistence::ExecutionStore;
use relay_telemetry::LogAlertSink;
use relay_venue::{
    OrderAck, OrderUpdate, ProbeReport, RetryPolicy, VenueAdapter, VenueError, VenuePosition,
    VenueResult,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

/// Minimal scripted venue: fills everything or times out everything.
struct ScriptedVenue {
    id: VenueId,
    fill: bool,
    updates_tx: broadcast::Sender<OrderUpdate>,
}

impl ScriptedVenue {
    fn new(id: &str, fill: bool) -> Arc<Self> {
        let (updates_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            id: VenueId::from(id),
            fill,
            updates_tx,
        })
    }
}

#[async_trait]
impl VenueAdapter for ScriptedVenue {
    fn id(&self) -> &VenueId {
        &self.id
    }

    async fn connect(&self) -> VenueResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> VenueResult<()> {
        Ok(())
    }

    async fn submit_order(&self, order: &OrderRequest) -> VenueResult<OrderAck> {
        if self.fill {
            Ok(OrderAck {
                order_id: format!("{}-1", self.id),
                filled: order.size,
                remaining: Size::ZERO,
                raw: serde_json::json!({"scripted": true}),
            })
        } else {
            Err(VenueError::Timeout("scripted timeout".to_string()))
        }
    }

    async fn order_status(&self, order_id: &str) -> VenueResult<OrderAck> {
        Err(VenueError::OrderNotFound(order_id.to_string()))
    }

    async fn cancel_order(&self, _order_id: &str) -> VenueResult<()> {
        Ok(())
    }

    async fn position(&self, symbol: &str) -> VenueResult<VenuePosition> {
        Ok(VenuePosition {
            symbol: symbol.to_string(),
            size: Size::ZERO,
            entry_price: None,
        })
    }

    async fn probe(&self) -> VenueResult<ProbeReport> {
        Ok(ProbeReport {
            status: "ok".to_string(),
            latency_ms: 1,
        })
    }

    fn order_updates(&self) -> broadcast::Receiver<OrderUpdate> {
        self.updates_tx.subscribe()
    }
}

struct Harness {
    router: Router,
    _dir: TempDir,
}

fn harness(venues: Vec<Arc<ScriptedVenue>>, auth_token: Option<&str>) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ExecutionStore::new(dir.path().to_str().unwrap(), 100));
    let alerts = Arc::new(LogAlertSink) as Arc<dyn AlertSink>;
    let logger = Arc::new(ExecutionLogger::new(store, alerts));
    let dedupe = Arc::new(Deduplicator::new(DedupeConfig::default()));
    let limiter = Arc::new(SourceRateLimiter::new(RateLimitConfig::default()));
    let board = Arc::new(HealthBoard::new(
        venues.iter().map(|v| v.id().clone()).collect::<Vec<_>>(),
    ));
    let adapters: Vec<Arc<dyn VenueAdapter>> = venues
        .into_iter()
        .map(|v| v as Arc<dyn VenueAdapter>)
        .collect();

    let processor = Arc::new(SignalProcessor::new(
        adapters,
        board.clone(),
        dedupe,
        limiter,
        logger,
        ProcessorConfig {
            venue_timeout_ms: 1_000,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
        },
    ));

    let router = create_router(AppState {
        processor,
        board,
        auth_token: auth_token.map(|s| s.to_string()),
    });

    Harness { router, _dir: dir }
}

fn webhook_request(payload: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook/tradingview")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_fanout_breakdown_over_mixed_venues() {
    let h = harness(
        vec![
            ScriptedVenue::new("alpha", true),
            ScriptedVenue::new("bravo", false),
        ],
        None,
    );

    let response = h
        .router
        .clone()
        .oneshot(webhook_request(
            r#"{"symbol":"ETH-PERP","side":"buy","size":"1.0"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["duplicate"], false);
    assert_eq!(body["overall"], "partial");

    let executions = body["executions"].as_array().unwrap();
    assert_eq!(executions.len(), 2);
    let status_of = |venue: &str| {
        executions
            .iter()
            .find(|e| e["venue"] == venue)
            .unwrap()["status"]
            .clone()
    };
    assert_eq!(status_of("alpha"), "filled");
    assert_eq!(status_of("bravo"), "failed");
}

#[tokio::test]
async fn test_invalid_side_is_rejected_with_field() {
    let h = harness(vec![ScriptedVenue::new("alpha", true)], None);

    let response = h
        .router
        .clone()
        .oneshot(webhook_request(
            r#"{"symbol":"ETH-PERP","side":"hold","size":"1.0"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["field"], "side");
}

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let h = harness(vec![ScriptedVenue::new("alpha", true)], None);
    let payload = r#"{"symbol":"ETH-PERP","side":"buy","size":"1.0"}"#;

    let first = h
        .router
        .clone()
        .oneshot(webhook_request(payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json_body(first).await["duplicate"], false);

    let second = h
        .router
        .clone()
        .oneshot(webhook_request(payload))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = json_body(second).await;
    assert_eq!(body["duplicate"], true);
    assert!(body.get("executions").is_none());
}

#[tokio::test]
async fn test_health_endpoint_reports_snapshot() {
    let h = harness(
        vec![
            ScriptedVenue::new("alpha", true),
            ScriptedVenue::new("bravo", true),
        ],
        None,
    );

    let response = h
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["overall"], "healthy");
    assert_eq!(body["venues"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_webhook_token_is_enforced() {
    let h = harness(vec![ScriptedVenue::new("alpha", true)], Some("secret"));
    let payload = r#"{"symbol":"ETH-PERP","side":"buy","size":"1.0"}"#;

    let denied = h
        .router
        .clone()
        .oneshot(webhook_request(payload))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut authed = webhook_request(payload);
    authed
        .headers_mut()
        .insert("x-relay-token", "secret".parse().unwrap());
    let allowed = h.router.clone().oneshot(authed).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}
