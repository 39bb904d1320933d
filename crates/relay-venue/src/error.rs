//! Venue error taxonomy.
//!
//! Every adapter failure falls into one of two classes: transient
//! (connectivity, timeouts, server-side errors — safe to retry with a
//! fresh idempotency token) and permanent (business rejections — retrying
//! cannot help and must not happen).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("not connected")]
    NotConnected,

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("venue returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("order rejected by venue: {0}")]
    Rejected(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("malformed venue response: {0}")]
    Response(String),

    #[error("subscription error: {0}")]
    Subscription(String),
}

impl VenueError {
    /// True if the error class is worth retrying.
    ///
    /// Business rejections and malformed responses are permanent; a 4xx
    /// other than 429 means the request itself was bad.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_)
            | Self::NotConnected
            | Self::Timeout(_)
            | Self::Transport(_)
            | Self::Subscription(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Rejected(_) | Self::OrderNotFound(_) | Self::Response(_) => false,
        }
    }
}

impl From<reqwest::Error> for VenueError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub type VenueResult<T> = Result<T, VenueError>;
