//! Alert events and the outbound notification boundary.
//!
//! Delivery itself is an external concern; the engine only produces
//! events and hands them to an `AlertSink`, always off the critical path.

use crate::decimal::Size;
use crate::error::Result;
use crate::execution::VenueId;
use crate::health::VenueStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Event destined for the external notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertEvent {
    /// A venue's connectivity status changed (either direction).
    VenueStatusChanged {
        venue: VenueId,
        old: VenueStatus,
        new: VenueStatus,
    },
    /// An order filled partially.
    PartialFill {
        symbol: String,
        filled: Size,
        remaining: Size,
    },
}

/// Fire-and-forget notification sink.
///
/// Implementations must not be relied on for correctness: callers spawn
/// deliveries and swallow failures after logging them.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, event: AlertEvent) -> Result<()>;
}
