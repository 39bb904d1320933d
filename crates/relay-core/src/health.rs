//! Venue connectivity status types exposed to collaborators.

use crate::execution::VenueId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity status of a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueStatus {
    Healthy,
    Degraded,
    Offline,
}

impl VenueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for VenueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-venue entry of a health snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueHealthReport {
    pub venue: VenueId,
    pub status: VenueStatus,
    pub consecutive_failures: u32,
    pub latency_ms: Option<u64>,
    pub last_success_ms: Option<i64>,
    pub reconnecting: bool,
}

/// Aggregate health view consumed by dashboard and health-check
/// collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub overall: VenueStatus,
    pub venues: Vec<VenueHealthReport>,
}

impl HealthSnapshot {
    /// Aggregate per-venue statuses: healthy if every venue is healthy
    /// (or none are configured), offline if all are unreachable,
    /// degraded otherwise.
    pub fn aggregate(venues: Vec<VenueHealthReport>) -> Self {
        let overall = if venues.is_empty() || venues.iter().all(|v| v.status == VenueStatus::Healthy)
        {
            VenueStatus::Healthy
        } else if venues.iter().all(|v| v.status == VenueStatus::Offline) {
            VenueStatus::Offline
        } else {
            VenueStatus::Degraded
        };
        Self { overall, venues }
    }
}
