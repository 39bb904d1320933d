//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("venue error: {0}")]
    Venue(#[from] relay_venue::VenueError),

    #[error("engine error: {0}")]
    Engine(#[from] relay_engine::EngineError),

    #[error("persistence error: {0}")]
    Persistence(#[from] relay_persistence::PersistenceError),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] relay_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
