//! Execution outcome logging.
//!
//! Persists one attempt per (signal, venue) result, detects partial
//! fills, and reconciles late push updates. Persistence and alert
//! failures are recovered locally; they never fail the caller.

use crate::processor::VenueExecution;
use relay_core::{now_ms, AlertEvent, AlertSink, AttemptId, ExecutionAttempt, ExecutionStatus, Signal, Size};
use relay_persistence::ExecutionStore;
use relay_venue::OrderUpdate;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Writes the audit trail and emits partial-fill alerts.
pub struct ExecutionLogger {
    store: Arc<ExecutionStore>,
    alerts: Arc<dyn AlertSink>,
}

impl ExecutionLogger {
    pub fn new(store: Arc<ExecutionStore>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { store, alerts }
    }

    pub fn store(&self) -> &Arc<ExecutionStore> {
        &self.store
    }

    /// Record one venue's result for a signal.
    ///
    /// Infallible by design: a persistence error is logged and swallowed,
    /// since failing the fan-out over its own audit trail would be worse
    /// than a gap in the log.
    pub fn record(&self, signal: &Signal, execution: &VenueExecution) -> ExecutionAttempt {
        let attempt = ExecutionAttempt {
            id: AttemptId::new(),
            signal_fingerprint: signal.fingerprint.clone(),
            venue: execution.venue.clone(),
            symbol: signal.symbol.clone(),
            status: execution.status,
            filled: execution.filled,
            remaining: execution.remaining,
            order_id: execution.order_id.clone(),
            raw_response: execution.raw.clone(),
            error: execution.error.clone(),
            latency_ms: execution.latency_ms,
            created_at_ms: now_ms(),
            revision: 0,
        };

        if let Err(e) = self.store.append(attempt.clone()) {
            error!(?e, attempt = %attempt.id, "Failed to persist execution attempt");
        }

        if attempt.status == ExecutionStatus::Partial {
            self.emit_partial_fill(attempt.symbol.clone(), attempt.filled, attempt.remaining);
        }

        attempt
    }

    /// Reconcile an asynchronous push update against its logged attempt.
    /// The push event is authoritative; unmatched updates are dropped
    /// with a debug line.
    pub fn on_order_update(&self, update: &OrderUpdate) {
        let rejected = update.state == "rejected";
        match self.store.reconcile(
            &update.venue,
            &update.order_id,
            update.filled,
            update.remaining,
            rejected,
            update.raw.clone(),
        ) {
            Some(corrected) => {
                if corrected.status == ExecutionStatus::Partial {
                    self.emit_partial_fill(
                        corrected.symbol.clone(),
                        corrected.filled,
                        corrected.remaining,
                    );
                }
            }
            None => {
                debug!(
                    venue = %update.venue,
                    order_id = %update.order_id,
                    "Push update matched no logged attempt"
                );
            }
        }
    }

    /// Fire-and-forget: must never block or fail the persistence path.
    fn emit_partial_fill(&self, symbol: String, filled: Size, remaining: Size) {
        let sink = self.alerts.clone();
        tokio::spawn(async move {
            if let Err(e) = sink
                .deliver(AlertEvent::PartialFill {
                    symbol,
                    filled,
                    remaining,
                })
                .await
            {
                warn!(?e, "Alert delivery failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{InboundSignal, VenueId};
    use relay_telemetry::BufferedAlertSink;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_signal(symbol: &str) -> Signal {
        let body = InboundSignal {
            symbol: symbol.to_string(),
            side: "buy".to_string(),
            size: "1.0".to_string(),
            price: None,
            order_type: None,
        }
        .validate()
        .unwrap();
        Signal::new(
            relay_core::SignalFingerprint::from_string("fp_test".to_string()),
            body,
            now_ms(),
        )
    }

    fn execution(venue: &str, filled: &str, remaining: &str, order_id: Option<&str>) -> VenueExecution {
        let filled: Size = filled.parse().unwrap();
        let remaining: Size = remaining.parse().unwrap();
        VenueExecution {
            venue: VenueId::from(venue),
            status: ExecutionStatus::classify(filled, remaining, false),
            filled,
            remaining,
            order_id: order_id.map(|s| s.to_string()),
            raw: None,
            error: None,
            latency_ms: 3,
        }
    }

    fn setup() -> (ExecutionLogger, Arc<ExecutionStore>, Arc<BufferedAlertSink>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ExecutionStore::new(dir.path().to_str().unwrap(), 100));
        let alerts = Arc::new(BufferedAlertSink::new(100));
        let logger = ExecutionLogger::new(store.clone(), alerts.clone() as Arc<dyn AlertSink>);
        (logger, store, alerts, dir)
    }

    #[tokio::test]
    async fn test_partial_fill_emits_alert() {
        let (logger, store, alerts, _dir) = setup();
        let signal = make_signal("ETH-PERP");

        let attempt = logger.record(&signal, &execution("alpha", "0.5", "0.5", None));
        assert_eq!(attempt.status, ExecutionStatus::Partial);
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = alerts.recent(5);
        assert!(matches!(
            events.first(),
            Some(AlertEvent::PartialFill { symbol, .. }) if symbol == "ETH-PERP"
        ));
    }

    #[tokio::test]
    async fn test_full_fill_emits_no_alert() {
        let (logger, _store, alerts, _dir) = setup();
        let signal = make_signal("ETH-PERP");

        let attempt = logger.record(&signal, &execution("alpha", "1.0", "0", None));
        assert_eq!(attempt.status, ExecutionStatus::Filled);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn test_push_update_reconciles_logged_attempt() {
        let (logger, store, _alerts, _dir) = setup();
        let signal = make_signal("ETH-PERP");

        // Submit acknowledged but unfilled; the fill confirmation arrives
        // later over the push channel.
        logger.record(&signal, &execution("alpha", "0", "1.0", Some("v-42")));

        logger.on_order_update(&OrderUpdate {
            venue: VenueId::from("alpha"),
            order_id: "v-42".to_string(),
            filled: Size::new(dec!(1.0)),
            remaining: Size::ZERO,
            state: "filled".to_string(),
            raw: serde_json::json!({"state": "filled"}),
        });

        let attempts = store.by_fingerprint(&signal.fingerprint);
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, ExecutionStatus::Filled);
        assert_eq!(attempts[0].revision, 1);
    }

    #[tokio::test]
    async fn test_unmatched_push_update_is_dropped() {
        let (logger, store, _alerts, _dir) = setup();

        logger.on_order_update(&OrderUpdate {
            venue: VenueId::from("alpha"),
            order_id: "unknown".to_string(),
            filled: Size::ZERO,
            remaining: Size::ZERO,
            state: "filled".to_string(),
            raw: serde_json::Value::Null,
        });

        assert!(store.is_empty());
    }
}
