//! Main application wiring.
//!
//! Builds the concrete venue adapter set from configuration and injects
//! it into the engine components, starts the health monitor and the
//! push-update forwarders, then serves the webhook ingress until a
//! shutdown signal arrives.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::ingress::{create_router, AppState};
use relay_core::AlertSink;
use relay_engine::{
    Deduplicator, ExecutionLogger, HealthBoard, HealthMonitor, SignalProcessor, SourceRateLimiter,
};
use relay_persistence::ExecutionStore;
use relay_telemetry::LogAlertSink;
use relay_venue::{HttpVenue, VenueAdapter};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self) -> AppResult<()> {
        let config = self.config;

        // The concrete adapter set for this process, one per configured
        // venue, injected everywhere that needs it.
        let mut adapters: Vec<Arc<dyn VenueAdapter>> = Vec::with_capacity(config.venues.len());
        for venue_config in &config.venues {
            adapters.push(Arc::new(HttpVenue::new(venue_config.clone())?));
        }
        info!(venues = adapters.len(), "Venue adapters created");

        // Initial connect. A venue that is down at startup stays in the
        // rotation; the health monitor's reconnect path picks it up.
        for adapter in &adapters {
            if let Err(e) = adapter.connect().await {
                warn!(venue = %adapter.id(), error = %e, "Initial connect failed, reconnect will retry");
            }
        }

        let store = Arc::new(ExecutionStore::new(
            &config.persistence.data_dir,
            config.persistence.buffer_size,
        ));
        let alerts: Arc<dyn AlertSink> = Arc::new(LogAlertSink);
        let logger = Arc::new(ExecutionLogger::new(store.clone(), alerts.clone()));
        let dedupe = Arc::new(Deduplicator::new(config.dedupe.clone()));
        let limiter = Arc::new(SourceRateLimiter::new(config.rate_limit.clone()));
        let board = Arc::new(HealthBoard::new(
            adapters.iter().map(|a| a.id().clone()).collect::<Vec<_>>(),
        ));

        let monitor = Arc::new(HealthMonitor::new(
            adapters.clone(),
            board.clone(),
            alerts.clone(),
            config.health.clone(),
        ));
        let monitor_task = {
            let monitor = monitor.clone();
            tokio::spawn(async move {
                if let Err(e) = monitor.run().await {
                    error!(?e, "Health monitor exited with error");
                }
            })
        };

        // Forward asynchronous order updates into the execution log.
        let mut update_tasks = Vec::with_capacity(adapters.len());
        for adapter in &adapters {
            let mut updates = adapter.order_updates();
            let logger = logger.clone();
            let venue = adapter.id().clone();
            update_tasks.push(tokio::spawn(async move {
                loop {
                    match updates.recv().await {
                        Ok(update) => logger.on_order_update(&update),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(venue = %venue, skipped, "Order update stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        let processor = Arc::new(SignalProcessor::new(
            adapters.clone(),
            board.clone(),
            dedupe,
            limiter,
            logger,
            config.execution.processor_config(),
        ));

        let state = AppState {
            processor,
            board,
            auth_token: config.ingress.auth_token.clone(),
        };
        let router = create_router(state);

        let listener = tokio::net::TcpListener::bind(config.ingress.bind_addr.as_str()).await?;
        info!(addr = %config.ingress.bind_addr, "Webhook ingress listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        // Teardown order: the server has drained (in-flight fan-outs ran
        // to completion), then the polling loop and reconnect tasks are
        // cancelled cooperatively, then venue sessions close.
        info!("Shutting down");
        monitor.shutdown().await;
        let _ = monitor_task.await;
        for task in update_tasks {
            task.abort();
        }
        for adapter in &adapters {
            if let Err(e) = adapter.disconnect().await {
                warn!(venue = %adapter.id(), error = %e, "Disconnect failed during shutdown");
            }
        }
        store.close()?;
        info!("Shutdown complete");

        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
