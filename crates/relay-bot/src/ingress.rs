//! Webhook ingress.
//!
//! The charting tool posts alert documents to `/webhook/{source}`.
//! Payloads are validated before anything reaches the engine; callers
//! always get a structured per-venue breakdown, never a raw error.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use relay_core::{now_ms, CoreError, HealthSnapshot, InboundSignal, Signal};
use relay_engine::{
    EngineError, FanoutStatus, HealthBoard, ProcessOutcome, SignalProcessor, VenueExecution,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Header carrying the shared webhook token.
const AUTH_HEADER: &str = "x-relay-token";

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<SignalProcessor>,
    pub board: Arc<HealthBoard>,
    pub auth_token: Option<String>,
}

/// Create the ingress router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/{source}", post(handle_webhook))
        .route("/health", get(get_health))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    overall: Option<FanoutStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    executions: Option<Vec<VenueExecution>>,
}

async fn handle_webhook(
    State(state): State<AppState>,
    Path(source): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<InboundSignal>,
) -> Response {
    if !check_auth(&headers, state.auth_token.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: "unauthorized".to_string(),
                field: None,
            }),
        )
            .into_response();
    }

    let body = match payload.validate() {
        Ok(body) => body,
        Err(e) => {
            let field = match &e {
                CoreError::Validation { field, .. } => Some((*field).to_string()),
                _ => None,
            };
            warn!(source = %source, error = %e, "Rejected malformed signal");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: e.to_string(),
                    field,
                }),
            )
                .into_response();
        }
    };

    let received_at = now_ms();
    let fingerprint = state.processor.dedupe().fingerprint(&body, received_at);
    let signal = Signal::new(fingerprint, body, received_at);

    match state.processor.process(signal, &source).await {
        Ok(ProcessOutcome::Duplicate) => (
            StatusCode::OK,
            Json(WebhookResponse {
                duplicate: true,
                overall: None,
                executions: None,
            }),
        )
            .into_response(),
        Ok(ProcessOutcome::Completed(report)) => (
            StatusCode::OK,
            Json(WebhookResponse {
                duplicate: false,
                overall: Some(report.overall),
                executions: Some(report.executions),
            }),
        )
            .into_response(),
        Err(e @ EngineError::RateLimited { .. }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorBody {
                error: e.to_string(),
                field: None,
            }),
        )
            .into_response(),
    }
}

async fn get_health(State(state): State<AppState>) -> Json<HealthSnapshot> {
    Json(state.board.snapshot())
}

fn check_auth(headers: &HeaderMap, token: Option<&str>) -> bool {
    let Some(expected) = token else {
        return true;
    };
    headers
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|presented| presented == expected)
}
