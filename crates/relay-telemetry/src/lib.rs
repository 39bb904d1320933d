//! Structured logging and in-process alert sinks.

pub mod alert;
pub mod error;
pub mod logging;

pub use alert::{BufferedAlertSink, LogAlertSink};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
