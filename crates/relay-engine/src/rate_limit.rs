//! Per-source signal rate limiting.
//!
//! Sliding-window limiter applied before fan-out. A source exceeding its
//! budget is rejected immediately with a retry-after hint; requests are
//! never queued and never retried on the caller's behalf.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::warn;

fn default_max_signals() -> u32 {
    30
}

fn default_window_secs() -> u64 {
    60
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum signals per source per window.
    #[serde(default = "default_max_signals")]
    pub max_signals: u32,
    /// Window size in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_signals: default_max_signals(),
            window_secs: default_window_secs(),
        }
    }
}

/// Sliding-window rate limiter keyed by signal source.
pub struct SourceRateLimiter {
    max_signals: u32,
    window: Duration,
    /// Source → timestamps of accepted signals in the current window.
    history: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SourceRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            max_signals: config.max_signals,
            window: Duration::from_secs(config.window_secs),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Try to admit one signal for `source`.
    ///
    /// On rejection returns how long until the oldest slot frees up.
    pub fn try_acquire(&self, source: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut history = self.history.lock();
        let timestamps = history.entry(source.to_string()).or_default();

        while timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.max_signals as usize {
            let oldest = *timestamps.front().expect("window is non-empty at limit");
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            warn!(
                source,
                count = timestamps.len(),
                max = self.max_signals,
                retry_after_ms = retry_after.as_millis() as u64,
                "Signal rate limit exceeded"
            );
            return Err(retry_after);
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Signals admitted for `source` in the current window.
    pub fn current_count(&self, source: &str) -> usize {
        let now = Instant::now();
        let history = self.history.lock();
        history
            .get(source)
            .map(|timestamps| {
                timestamps
                    .iter()
                    .filter(|&&t| now.duration_since(t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_signals: u32, window_secs: u64) -> SourceRateLimiter {
        SourceRateLimiter::new(RateLimitConfig {
            max_signals,
            window_secs,
        })
    }

    #[test]
    fn test_rejects_at_limit() {
        let limiter = limiter(3, 60);

        for _ in 0..3 {
            assert!(limiter.try_acquire("tradingview").is_ok());
        }
        let retry_after = limiter.try_acquire("tradingview").unwrap_err();
        assert!(retry_after <= Duration::from_secs(60));
        assert_eq!(limiter.current_count("tradingview"), 3);
    }

    #[test]
    fn test_sources_are_independent() {
        let limiter = limiter(1, 60);

        assert!(limiter.try_acquire("alpha").is_ok());
        assert!(limiter.try_acquire("alpha").is_err());
        assert!(limiter.try_acquire("beta").is_ok());
    }

    #[test]
    fn test_window_frees_slots() {
        let limiter = SourceRateLimiter {
            max_signals: 1,
            window: Duration::from_millis(30),
            history: Mutex::new(HashMap::new()),
        };

        assert!(limiter.try_acquire("tradingview").is_ok());
        assert!(limiter.try_acquire("tradingview").is_err());

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.try_acquire("tradingview").is_ok());
    }
}
