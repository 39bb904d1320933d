//! In-process alert sinks.
//!
//! Real notification delivery lives outside this system; these sinks
//! cover the in-process needs: structured log emission and a bounded
//! buffer of recent alerts for operators and tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{AlertEvent, AlertSink, Result};
use std::collections::VecDeque;
use tracing::{info, warn};

/// Sink that renders alert events as structured log lines.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, event: AlertEvent) -> Result<()> {
        match &event {
            AlertEvent::VenueStatusChanged { venue, old, new } => {
                info!(venue = %venue, old = %old, new = %new, "Venue status changed");
            }
            AlertEvent::PartialFill {
                symbol,
                filled,
                remaining,
            } => {
                warn!(symbol = %symbol, filled = %filled, remaining = %remaining, "Partial fill");
            }
        }
        Ok(())
    }
}

/// Sink keeping the last N alerts in memory.
///
/// Backs the health/alerts views and gives tests a way to observe
/// emitted events without an external channel.
pub struct BufferedAlertSink {
    alerts: Mutex<VecDeque<AlertEvent>>,
    max_alerts: usize,
}

impl BufferedAlertSink {
    pub fn new(max_alerts: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(max_alerts)),
            max_alerts,
        }
    }

    /// Most recent alerts, newest first.
    pub fn recent(&self, count: usize) -> Vec<AlertEvent> {
        let alerts = self.alerts.lock();
        alerts.iter().rev().take(count).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

impl Default for BufferedAlertSink {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl AlertSink for BufferedAlertSink {
    async fn deliver(&self, event: AlertEvent) -> Result<()> {
        let mut alerts = self.alerts.lock();
        alerts.push_back(event);
        while alerts.len() > self.max_alerts {
            alerts.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Size, VenueId, VenueStatus};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_buffered_sink_keeps_recent_alerts() {
        let sink = BufferedAlertSink::new(2);

        for i in 0..3 {
            sink.deliver(AlertEvent::PartialFill {
                symbol: format!("SYM-{i}"),
                filled: Size::new(dec!(0.5)),
                remaining: Size::new(dec!(0.5)),
            })
            .await
            .unwrap();
        }

        assert_eq!(sink.len(), 2);
        let recent = sink.recent(10);
        match &recent[0] {
            AlertEvent::PartialFill { symbol, .. } => assert_eq!(symbol, "SYM-2"),
            other => panic!("unexpected alert: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_log_sink_accepts_status_change() {
        let sink = LogAlertSink;
        sink.deliver(AlertEvent::VenueStatusChanged {
            venue: VenueId::from("hyper"),
            old: VenueStatus::Healthy,
            new: VenueStatus::Degraded,
        })
        .await
        .unwrap();
    }
}
