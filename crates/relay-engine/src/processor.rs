//! Signal fan-out orchestration.
//!
//! A validated signal passes the dedupe and rate-limit gates, then runs
//! against every active venue in parallel. Each venue gets its own task
//! wrapping `submit_order` in the retry executor under a bounded timeout;
//! task failures of any kind become structured per-venue results and
//! never abort the batch.

use crate::dedupe::Deduplicator;
use crate::error::{EngineError, EngineResult};
use crate::health::HealthBoard;
use crate::logger::ExecutionLogger;
use crate::rate_limit::SourceRateLimiter;
use relay_core::{
    ExecutionStatus, OrderRequest, Signal, SignalFingerprint, Size, VenueId,
};
use relay_venue::{retry_with_backoff, RetryPolicy, VenueAdapter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

fn default_venue_timeout_ms() -> u64 {
    15_000
}

/// Fan-out configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Upper bound on one venue's submit, retries included (ms).
    pub venue_timeout_ms: u64,
    /// Retry policy applied per venue around `submit_order`.
    pub retry: RetryPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            venue_timeout_ms: default_venue_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of one venue's submission within a fan-out round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueExecution {
    pub venue: VenueId,
    pub status: ExecutionStatus,
    pub filled: Size,
    pub remaining: Size,
    pub order_id: Option<String>,
    pub raw: Option<serde_json::Value>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Aggregate outcome of a fan-out round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutStatus {
    /// Every venue filled or partially filled.
    Success,
    /// Some venues succeeded, some failed.
    Partial,
    /// No venue succeeded.
    Failed,
}

impl fmt::Display for FanoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Partial => f.write_str("partial"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Per-venue breakdown returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutReport {
    pub fingerprint: SignalFingerprint,
    pub overall: FanoutStatus,
    pub executions: Vec<VenueExecution>,
}

/// Outcome of processing one inbound signal.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Re-delivery of an already-processed signal; idempotent no-op.
    Duplicate,
    /// Fan-out ran; one execution per attempted venue.
    Completed(FanoutReport),
}

/// Fan-out orchestrator.
pub struct SignalProcessor {
    adapters: Vec<Arc<dyn VenueAdapter>>,
    board: Arc<HealthBoard>,
    dedupe: Arc<Deduplicator>,
    limiter: Arc<SourceRateLimiter>,
    logger: Arc<ExecutionLogger>,
    config: ProcessorConfig,
}

impl SignalProcessor {
    pub fn new(
        adapters: Vec<Arc<dyn VenueAdapter>>,
        board: Arc<HealthBoard>,
        dedupe: Arc<Deduplicator>,
        limiter: Arc<SourceRateLimiter>,
        logger: Arc<ExecutionLogger>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            adapters,
            board,
            dedupe,
            limiter,
            logger,
            config,
        }
    }

    pub fn dedupe(&self) -> &Arc<Deduplicator> {
        &self.dedupe
    }

    pub fn logger(&self) -> &Arc<ExecutionLogger> {
        &self.logger
    }

    /// Gate and fan out one signal from `source`.
    pub async fn process(&self, mut signal: Signal, source: &str) -> EngineResult<ProcessOutcome> {
        if self
            .dedupe
            .check_and_mark(&signal.fingerprint, signal.received_at_ms)
        {
            info!(
                fingerprint = %signal.fingerprint,
                symbol = %signal.symbol,
                "Duplicate signal dropped"
            );
            return Ok(ProcessOutcome::Duplicate);
        }

        if let Err(retry_after) = self.limiter.try_acquire(source) {
            return Err(EngineError::RateLimited {
                source_name: source.to_string(),
                retry_after_ms: retry_after.as_millis() as u64,
            });
        }

        let report = self.fan_out(&signal).await;
        signal.mark_processed();

        info!(
            fingerprint = %signal.fingerprint,
            symbol = %signal.symbol,
            overall = %report.overall,
            venues = report.executions.len(),
            "Signal processed"
        );

        Ok(ProcessOutcome::Completed(report))
    }

    async fn fan_out(&self, signal: &Signal) -> FanoutReport {
        let selected = self.select_venues();
        let order = OrderRequest::from_signal(signal);
        let venue_timeout = Duration::from_millis(self.config.venue_timeout_ms);

        let mut handles = Vec::with_capacity(selected.len());
        for adapter in selected {
            let venue = adapter.id().clone();
            let handle = tokio::spawn(submit_to_venue(
                adapter,
                order.clone(),
                self.config.retry.clone(),
                venue_timeout,
            ));
            handles.push((venue, handle));
        }

        let mut executions = Vec::with_capacity(handles.len());
        for (venue, handle) in handles {
            let execution = match handle.await {
                Ok(execution) => execution,
                Err(e) => {
                    // A panicking venue task must not take the batch down.
                    error!(venue = %venue, ?e, "Venue task failed unexpectedly");
                    VenueExecution {
                        venue,
                        status: ExecutionStatus::Failed,
                        filled: Size::ZERO,
                        remaining: signal.size,
                        order_id: None,
                        raw: None,
                        error: Some(format!("venue task failed: {e}")),
                        latency_ms: 0,
                    }
                }
            };
            self.logger.record(signal, &execution);
            executions.push(execution);
        }

        FanoutReport {
            fingerprint: signal.fingerprint.clone(),
            overall: aggregate(&executions),
            executions,
        }
    }

    /// Currently-active venues per the health board. With zero active
    /// venues every configured venue is attempted anyway, so a fleet-wide
    /// probe outage cannot starve execution.
    fn select_venues(&self) -> Vec<Arc<dyn VenueAdapter>> {
        let active = self.board.active_venues();
        let selected: Vec<_> = self
            .adapters
            .iter()
            .filter(|adapter| active.contains(adapter.id()))
            .cloned()
            .collect();

        if selected.is_empty() {
            warn!("No active venues, attempting all configured venues");
            self.adapters.clone()
        } else {
            selected
        }
    }
}

/// Submit one order to one venue: retry executor inside a bounded
/// per-venue timeout. Always resolves to a structured result.
async fn submit_to_venue(
    adapter: Arc<dyn VenueAdapter>,
    order: OrderRequest,
    policy: RetryPolicy,
    venue_timeout: Duration,
) -> VenueExecution {
    let venue = adapter.id().clone();
    let started = Instant::now();

    let outcome = tokio::time::timeout(
        venue_timeout,
        retry_with_backoff(&policy, || {
            let adapter = adapter.clone();
            let order = order.clone();
            async move { adapter.submit_order(&order).await }
        }),
    )
    .await;

    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(ack)) => VenueExecution {
            venue,
            status: ExecutionStatus::classify(ack.filled, ack.remaining, false),
            filled: ack.filled,
            remaining: ack.remaining,
            order_id: Some(ack.order_id),
            raw: Some(ack.raw),
            error: None,
            latency_ms,
        },
        Ok(Err(e)) => {
            warn!(venue = %venue, error = %e, "Venue submission failed");
            VenueExecution {
                venue,
                status: ExecutionStatus::Failed,
                filled: Size::ZERO,
                remaining: order.size,
                order_id: None,
                raw: None,
                error: Some(e.to_string()),
                latency_ms,
            }
        }
        Err(_) => {
            warn!(
                venue = %venue,
                timeout_ms = venue_timeout.as_millis() as u64,
                "Venue submission timed out"
            );
            VenueExecution {
                venue,
                status: ExecutionStatus::Failed,
                filled: Size::ZERO,
                remaining: order.size,
                order_id: None,
                raw: None,
                error: Some("venue submission timed out".to_string()),
                latency_ms,
            }
        }
    }
}

fn aggregate(executions: &[VenueExecution]) -> FanoutStatus {
    if executions.is_empty() {
        return FanoutStatus::Failed;
    }
    let successes = executions
        .iter()
        .filter(|e| e.status.is_success())
        .count();
    if successes == executions.len() {
        FanoutStatus::Success
    } else if successes > 0 {
        FanoutStatus::Partial
    } else {
        FanoutStatus::Failed
    }
}
