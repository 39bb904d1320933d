//! Venue health monitoring and automatic reconnection.
//!
//! Per-venue state machine: healthy → degraded on the first probe
//! failure, degraded → offline once consecutive failures reach the
//! threshold. Any probe success flips straight back to healthy; there is
//! no half-open state. The `HealthBoard` is written only by the monitor;
//! every other component reads it through snapshot accessors.

use crate::error::EngineResult;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use relay_core::{
    now_ms, AlertEvent, AlertSink, HealthSnapshot, VenueHealthReport, VenueId, VenueStatus,
};
use relay_venue::{RetryPolicy, VenueAdapter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_offline_threshold() -> u32 {
    3
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect_max_attempts() -> u32 {
    8
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

/// Health monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Probe polling interval (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive probe failures before a venue goes offline.
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold: u32,
    /// Upper bound on one probe round-trip (ms), independent of any
    /// retry backoff.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Attempt cap for one reconnect task.
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Base delay for reconnect backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Ceiling for reconnect backoff (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            offline_threshold: default_offline_threshold(),
            probe_timeout_ms: default_probe_timeout_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

impl HealthConfig {
    fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.reconnect_max_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
        }
    }
}

/// Mutable health state of one venue. Owned by the monitor.
#[derive(Debug, Clone)]
pub struct VenueHealth {
    pub status: VenueStatus,
    pub consecutive_failures: u32,
    pub last_success_ms: Option<i64>,
    pub latency_ms: Option<u64>,
    pub reconnecting: bool,
}

impl VenueHealth {
    fn new() -> Self {
        Self {
            status: VenueStatus::Healthy,
            consecutive_failures: 0,
            last_success_ms: None,
            latency_ms: None,
            reconnecting: false,
        }
    }
}

/// Shared venue health state.
///
/// Mutation is restricted to this crate (the monitor's task); everything
/// else gets read-only access.
pub struct HealthBoard {
    venues: RwLock<HashMap<VenueId, VenueHealth>>,
}

impl HealthBoard {
    /// Initialize all configured venues as healthy; state is rebuilt
    /// fresh on process start.
    pub fn new(venues: impl IntoIterator<Item = VenueId>) -> Self {
        let map = venues
            .into_iter()
            .map(|venue| (venue, VenueHealth::new()))
            .collect();
        Self {
            venues: RwLock::new(map),
        }
    }

    /// Aggregate snapshot for health-check and dashboard collaborators.
    pub fn snapshot(&self) -> HealthSnapshot {
        let venues = self.venues.read();
        let mut reports: Vec<VenueHealthReport> = venues
            .iter()
            .map(|(venue, health)| VenueHealthReport {
                venue: venue.clone(),
                status: health.status,
                consecutive_failures: health.consecutive_failures,
                latency_ms: health.latency_ms,
                last_success_ms: health.last_success_ms,
                reconnecting: health.reconnecting,
            })
            .collect();
        reports.sort_by(|a, b| a.venue.cmp(&b.venue));
        HealthSnapshot::aggregate(reports)
    }

    pub fn status_of(&self, venue: &VenueId) -> Option<VenueStatus> {
        self.venues.read().get(venue).map(|h| h.status)
    }

    pub fn health_of(&self, venue: &VenueId) -> Option<VenueHealth> {
        self.venues.read().get(venue).cloned()
    }

    pub fn is_reconnecting(&self, venue: &VenueId) -> bool {
        self.venues
            .read()
            .get(venue)
            .is_some_and(|h| h.reconnecting)
    }

    /// Venues eligible for fan-out: not offline, no reconnect in flight.
    pub fn active_venues(&self) -> Vec<VenueId> {
        let venues = self.venues.read();
        let mut active: Vec<VenueId> = venues
            .iter()
            .filter(|(_, h)| h.status != VenueStatus::Offline && !h.reconnecting)
            .map(|(venue, _)| venue.clone())
            .collect();
        active.sort();
        active
    }

    pub(crate) fn record_success(
        &self,
        venue: &VenueId,
        latency_ms: u64,
        timestamp_ms: i64,
    ) -> Option<(VenueStatus, VenueStatus)> {
        let mut venues = self.venues.write();
        let health = venues.get_mut(venue)?;
        let old = health.status;
        health.status = VenueStatus::Healthy;
        health.consecutive_failures = 0;
        health.latency_ms = Some(latency_ms);
        health.last_success_ms = Some(timestamp_ms);
        (old != VenueStatus::Healthy).then_some((old, VenueStatus::Healthy))
    }

    pub(crate) fn record_failure(
        &self,
        venue: &VenueId,
        offline_threshold: u32,
    ) -> Option<(VenueStatus, VenueStatus)> {
        let mut venues = self.venues.write();
        let health = venues.get_mut(venue)?;
        let old = health.status;
        health.consecutive_failures += 1;
        health.latency_ms = None;
        let new = if health.consecutive_failures >= offline_threshold {
            VenueStatus::Offline
        } else {
            VenueStatus::Degraded
        };
        health.status = new;
        (old != new).then_some((old, new))
    }

    /// Single-flight guard: claims the reconnect slot for a venue.
    pub(crate) fn try_begin_reconnect(&self, venue: &VenueId) -> bool {
        let mut venues = self.venues.write();
        match venues.get_mut(venue) {
            Some(health) if !health.reconnecting => {
                health.reconnecting = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn end_reconnect(&self, venue: &VenueId) {
        if let Some(health) = self.venues.write().get_mut(venue) {
            health.reconnecting = false;
        }
    }
}

/// Supervisor polling all venue adapters and recovering failed ones.
pub struct HealthMonitor {
    adapters: Vec<Arc<dyn VenueAdapter>>,
    board: Arc<HealthBoard>,
    alerts: Arc<dyn AlertSink>,
    config: HealthConfig,
    shutdown_token: CancellationToken,
    reconnects: Mutex<HashMap<VenueId, JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        adapters: Vec<Arc<dyn VenueAdapter>>,
        board: Arc<HealthBoard>,
        alerts: Arc<dyn AlertSink>,
        config: HealthConfig,
    ) -> Self {
        Self {
            adapters,
            board,
            alerts,
            config,
            shutdown_token: CancellationToken::new(),
            reconnects: Mutex::new(HashMap::new()),
        }
    }

    pub fn board(&self) -> &Arc<HealthBoard> {
        &self.board
    }

    /// Run the polling loop until shutdown.
    pub async fn run(&self) -> EngineResult<()> {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        info!(
            interval_ms = self.config.poll_interval_ms,
            venues = self.adapters.len(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Health monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.poll_round().await;
                }
            }
        }

        Ok(())
    }

    /// One polling round: probe every venue in parallel (skipping those
    /// with a reconnect in flight) and apply the outcomes.
    async fn poll_round(&self) {
        self.reap_finished_reconnects();

        let probe_timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let probes = self
            .adapters
            .iter()
            .filter(|adapter| !self.board.is_reconnecting(adapter.id()))
            .map(|adapter| {
                let adapter = adapter.clone();
                async move {
                    let outcome = tokio::time::timeout(probe_timeout, adapter.probe()).await;
                    (adapter.id().clone(), outcome)
                }
            });

        for (venue, outcome) in join_all(probes).await {
            match outcome {
                Ok(Ok(report)) => {
                    if let Some((old, new)) =
                        self.board.record_success(&venue, report.latency_ms, now_ms())
                    {
                        info!(venue = %venue, old = %old, new = %new, "Venue recovered");
                        emit_status_alert(&self.alerts, venue, old, new);
                    }
                }
                Ok(Err(e)) => {
                    warn!(venue = %venue, error = %e, "Venue probe failed");
                    self.on_probe_failure(venue);
                }
                Err(_) => {
                    warn!(
                        venue = %venue,
                        timeout_ms = self.config.probe_timeout_ms,
                        "Venue probe timed out"
                    );
                    self.on_probe_failure(venue);
                }
            }
        }
    }

    fn on_probe_failure(&self, venue: VenueId) {
        if let Some((old, new)) = self
            .board
            .record_failure(&venue, self.config.offline_threshold)
        {
            warn!(venue = %venue, old = %old, new = %new, "Venue status changed");
            emit_status_alert(&self.alerts, venue.clone(), old, new);
        }
        // Offline venues keep retriggering recovery; the guard below
        // keeps it single-flighted.
        if self.board.status_of(&venue) == Some(VenueStatus::Offline) {
            self.spawn_reconnect(venue);
        }
    }

    /// Spawn the out-of-band reconnect task for a venue so the polling
    /// cadence is never blocked by a stuck reconnect.
    fn spawn_reconnect(&self, venue: VenueId) {
        if !self.board.try_begin_reconnect(&venue) {
            return;
        }
        let Some(adapter) = self.adapters.iter().find(|a| a.id() == &venue).cloned() else {
            self.board.end_reconnect(&venue);
            return;
        };

        info!(venue = %venue, "Starting reconnect task");
        let handle = tokio::spawn(run_reconnect(
            adapter,
            self.board.clone(),
            self.alerts.clone(),
            self.config.reconnect_policy(),
            self.shutdown_token.clone(),
        ));
        self.reconnects.lock().insert(venue, handle);
    }

    fn reap_finished_reconnects(&self) {
        self.reconnects.lock().retain(|_, handle| !handle.is_finished());
    }

    /// Cancel the polling loop and all outstanding reconnect tasks, then
    /// join them.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handles: Vec<(VenueId, JoinHandle<()>)> =
            self.reconnects.lock().drain().collect();
        for (venue, handle) in handles {
            if let Err(e) = handle.await {
                warn!(venue = %venue, ?e, "Reconnect task join failed");
            }
        }
    }
}

fn emit_status_alert(
    alerts: &Arc<dyn AlertSink>,
    venue: VenueId,
    old: VenueStatus,
    new: VenueStatus,
) {
    let sink = alerts.clone();
    tokio::spawn(async move {
        if let Err(e) = sink
            .deliver(AlertEvent::VenueStatusChanged { venue, old, new })
            .await
        {
            warn!(?e, "Alert delivery failed");
        }
    });
}

/// Reconnect one venue: disconnect, connect, verify with a fresh probe,
/// under backoff with jitter and a capped attempt count.
async fn run_reconnect(
    adapter: Arc<dyn VenueAdapter>,
    board: Arc<HealthBoard>,
    alerts: Arc<dyn AlertSink>,
    policy: RetryPolicy,
    shutdown: CancellationToken,
) {
    let venue = adapter.id().clone();
    let mut attempt = 1u32;

    loop {
        if shutdown.is_cancelled() {
            debug!(venue = %venue, "Reconnect cancelled");
            break;
        }

        let result = async {
            if let Err(e) = adapter.disconnect().await {
                debug!(venue = %venue, error = %e, "Disconnect before reconnect failed");
            }
            adapter.connect().await?;
            adapter.probe().await
        }
        .await;

        match result {
            Ok(report) => {
                if let Some((old, new)) = board.record_success(&venue, report.latency_ms, now_ms())
                {
                    info!(venue = %venue, old = %old, new = %new, "Venue reconnected");
                    emit_status_alert(&alerts, venue.clone(), old, new);
                }
                break;
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    error!(
                        venue = %venue,
                        attempts = attempt,
                        error = %e,
                        "Reconnect attempts exhausted, venue stays offline"
                    );
                    break;
                }
                let delay = policy.jittered(policy.delay_for(attempt));
                warn!(
                    venue = %venue,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Reconnect failed, backing off"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = shutdown.cancelled() => {
                        debug!(venue = %venue, "Reconnect cancelled during backoff");
                        break;
                    }
                }
                attempt += 1;
            }
        }
    }

    board.end_reconnect(&venue);
}
