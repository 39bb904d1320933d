//! The venue adapter capability trait.

use crate::error::VenueResult;
use async_trait::async_trait;
use relay_core::{OrderRequest, Price, Size, VenueId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Acknowledgement of a synchronous submit or status call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    /// Venue-assigned order id.
    pub order_id: String,
    pub filled: Size,
    pub remaining: Size,
    /// Raw venue response, kept verbatim for the audit record.
    pub raw: serde_json::Value,
}

/// Position held at a venue for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuePosition {
    pub symbol: String,
    pub size: Size,
    pub entry_price: Option<Price>,
}

/// Result of a successful health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    /// Venue-reported status text.
    pub status: String,
    pub latency_ms: u64,
}

/// Asynchronous order-state-change event from the push subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub venue: VenueId,
    pub order_id: String,
    pub filled: Size,
    pub remaining: Size,
    /// Venue-reported state text (e.g. "filled", "rejected").
    pub state: String,
    pub raw: serde_json::Value,
}

/// Capability set of one trading venue.
///
/// Each instance exclusively owns its outbound connection; all open and
/// close operations funnel through `connect`/`disconnect`. Implementations
/// must generate a fresh client order id per `submit_order` call so every
/// retry carries a new idempotency token.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Stable identifier of this venue.
    fn id(&self) -> &VenueId;

    /// Open the outbound session and the order-update push subscription.
    /// Failures are connectivity errors and therefore retryable.
    async fn connect(&self) -> VenueResult<()>;

    /// Tear down the session and subscription.
    async fn disconnect(&self) -> VenueResult<()>;

    /// Submit an order. Transient failures may be retried by the caller;
    /// permanent rejections must surface unchanged.
    async fn submit_order(&self, order: &OrderRequest) -> VenueResult<OrderAck>;

    /// Query the current state of an order.
    async fn order_status(&self, order_id: &str) -> VenueResult<OrderAck>;

    /// Cancel an open order.
    async fn cancel_order(&self, order_id: &str) -> VenueResult<()>;

    /// Fetch the position for a symbol.
    async fn position(&self, symbol: &str) -> VenueResult<VenuePosition>;

    /// Lightweight authenticated liveness check with its own bounded
    /// timeout, independent of any retry backoff.
    async fn probe(&self) -> VenueResult<ProbeReport>;

    /// Subscribe to asynchronous order updates.
    fn order_updates(&self) -> broadcast::Receiver<OrderUpdate>;
}
