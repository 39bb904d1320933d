//! Error types for relay-engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rate limit exceeded for source `{source_name}`, retry in {retry_after_ms} ms")]
    RateLimited {
        source_name: String,
        retry_after_ms: u64,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
