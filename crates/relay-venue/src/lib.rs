//! Venue adapters for the relay execution engine.
//!
//! A venue adapter owns the outbound connection to one trading venue:
//! an authenticated REST session for submit/query/cancel plus a
//! WebSocket push subscription for asynchronous order updates. The
//! `VenueAdapter` trait is the capability seam; concrete adapters are
//! injected at startup, never selected at runtime.

pub mod adapter;
pub mod error;
pub mod http;
pub mod retry;

pub use adapter::{OrderAck, OrderUpdate, ProbeReport, VenueAdapter, VenuePosition};
pub use error::{VenueError, VenueResult};
pub use http::{HttpVenue, VenueConfig};
pub use retry::{retry_with_backoff, RetryPolicy};
