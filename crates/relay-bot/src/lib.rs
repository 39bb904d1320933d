//! Relay bot: wiring, configuration and webhook ingress.

pub mod app;
pub mod config;
pub mod error;
pub mod ingress;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
