//! Core domain types for the relay execution engine.
//!
//! This crate provides the types shared across the workspace:
//! - `Signal`, `SignalBody`: validated trade instructions derived from inbound alerts
//! - `ExecutionAttempt`: append-only record of one (signal, venue) submission
//! - `Price`, `Size`: precision-safe numeric types
//! - `AlertEvent`, `AlertSink`: fire-and-forget notification boundary
//! - `VenueStatus`, `HealthSnapshot`: connectivity state exposed to collaborators

pub mod alert;
pub mod decimal;
pub mod error;
pub mod execution;
pub mod health;
pub mod signal;

pub use alert::{AlertEvent, AlertSink};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use execution::{
    AttemptId, ClientOrderId, ExecutionAttempt, ExecutionStatus, OrderRequest, VenueId,
};
pub use health::{HealthSnapshot, VenueHealthReport, VenueStatus};
pub use signal::{InboundSignal, OrderKind, Signal, SignalBody, SignalFingerprint, SignalSide};

/// Current unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
