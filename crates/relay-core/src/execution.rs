//! Execution-related types: order requests, attempt records, identifiers.

use crate::decimal::{Price, Size};
use crate::signal::{OrderKind, Signal, SignalFingerprint, SignalSide};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a configured trading venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Client order ID sent to a venue as idempotency token.
///
/// A fresh one must be generated for every submission attempt, retries
/// included, or venues reject the replayed nonce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `relay_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("relay_{ts}_{uuid_short}"))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an execution attempt record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    /// Format: `exec_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("exec_{ts}_{uuid_short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order parameters submitted to a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: SignalSide,
    pub size: Size,
    pub price: Option<Price>,
    pub order_type: OrderKind,
}

impl OrderRequest {
    pub fn from_signal(signal: &Signal) -> Self {
        Self {
            symbol: signal.symbol.clone(),
            side: signal.side,
            size: signal.size,
            price: signal.price,
            order_type: signal.order_type,
        }
    }
}

/// Outcome class of an execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Submitted, no fill and no error reported yet.
    Pending,
    /// Fully filled.
    Filled,
    /// Partially filled with remainder outstanding.
    Partial,
    /// Nothing filled and the attempt errored.
    Failed,
}

impl ExecutionStatus {
    /// Classify a fill outcome.
    ///
    /// Partial requires both a nonzero fill and a nonzero remainder; a
    /// zero fill is never partial.
    pub fn classify(filled: Size, remaining: Size, had_error: bool) -> Self {
        if filled.is_positive() {
            if remaining.is_positive() {
                Self::Partial
            } else {
                Self::Filled
            }
        } else if had_error {
            Self::Failed
        } else {
            Self::Pending
        }
    }

    /// True for outcomes that count as a successful venue submission.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Filled | Self::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Filled => "filled",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record for one (signal, venue) submission.
///
/// Exactly one is written per venue per fan-out round, regardless of how
/// many retries happened inside the adapter call. The on-disk trail is
/// append-only; in-memory corrections from push updates bump `revision`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    pub id: AttemptId,
    /// Soft reference: signals may be purged independently of attempts.
    pub signal_fingerprint: SignalFingerprint,
    pub venue: VenueId,
    pub symbol: String,
    pub status: ExecutionStatus,
    pub filled: Size,
    pub remaining: Size,
    /// Venue order id, when the venue acknowledged the order.
    pub order_id: Option<String>,
    /// Raw venue response for audit.
    pub raw_response: Option<serde_json::Value>,
    pub error: Option<String>,
    pub latency_ms: u64,
    pub created_at_ms: i64,
    /// Incremented when a later push update supersedes the logged outcome.
    pub revision: u32,
}
