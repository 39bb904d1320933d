//! In-memory execution attempt store with a JSON Lines audit mirror.

use crate::error::PersistenceResult;
use crate::writer::JsonLinesWriter;
use dashmap::DashMap;
use parking_lot::Mutex;
use relay_core::{
    AttemptId, ExecutionAttempt, ExecutionStatus, SignalFingerprint, Size, VenueId,
};
use tracing::{debug, warn};

/// Store for execution attempts.
///
/// Attempts are indexed by id, by signal fingerprint (for collaborators
/// querying a fan-out round) and by (venue, order id) so that later push
/// updates can be reconciled against the attempt they belong to.
pub struct ExecutionStore {
    attempts: DashMap<AttemptId, ExecutionAttempt>,
    by_fingerprint: DashMap<String, Vec<AttemptId>>,
    by_order: DashMap<(VenueId, String), AttemptId>,
    writer: Mutex<JsonLinesWriter>,
}

impl ExecutionStore {
    /// Create a store writing its audit trail under `data_dir`.
    pub fn new(data_dir: &str, buffer_size: usize) -> Self {
        Self {
            attempts: DashMap::new(),
            by_fingerprint: DashMap::new(),
            by_order: DashMap::new(),
            writer: Mutex::new(JsonLinesWriter::new(data_dir, buffer_size)),
        }
    }

    /// Record a new attempt. Written exactly once per (signal, venue)
    /// fan-out; later corrections go through `reconcile`.
    pub fn append(&self, attempt: ExecutionAttempt) -> PersistenceResult<()> {
        self.by_fingerprint
            .entry(attempt.signal_fingerprint.as_str().to_string())
            .or_default()
            .push(attempt.id.clone());

        if let Some(order_id) = &attempt.order_id {
            self.by_order
                .insert((attempt.venue.clone(), order_id.clone()), attempt.id.clone());
        }

        self.writer.lock().add_record(attempt.clone())?;
        self.attempts.insert(attempt.id.clone(), attempt);
        Ok(())
    }

    /// Reconcile a later push update against its logged attempt.
    ///
    /// Push updates are authoritative: the stored attempt is re-classified
    /// in place with a bumped revision, and the audit file gains one line
    /// per revision so on-disk history stays append-only.
    ///
    /// Returns the corrected attempt, or `None` when no attempt matches
    /// the (venue, order id) pair.
    pub fn reconcile(
        &self,
        venue: &VenueId,
        order_id: &str,
        filled: Size,
        remaining: Size,
        rejected: bool,
        raw: serde_json::Value,
    ) -> Option<ExecutionAttempt> {
        let attempt_id = self
            .by_order
            .get(&(venue.clone(), order_id.to_string()))?
            .clone();

        let mut entry = self.attempts.get_mut(&attempt_id)?;
        let attempt = entry.value_mut();

        attempt.filled = filled;
        attempt.remaining = remaining;
        attempt.status = ExecutionStatus::classify(filled, remaining, rejected);
        if rejected && attempt.error.is_none() {
            attempt.error = Some("rejected via push update".to_string());
        }
        attempt.raw_response = Some(raw);
        attempt.revision += 1;

        let corrected = attempt.clone();
        drop(entry);

        debug!(
            attempt = %corrected.id,
            venue = %venue,
            order_id,
            status = %corrected.status,
            revision = corrected.revision,
            "Reconciled push update into execution attempt"
        );

        if let Err(e) = self.writer.lock().add_record(corrected.clone()) {
            warn!(?e, attempt = %corrected.id, "Failed to append reconciliation audit line");
        }

        Some(corrected)
    }

    /// All attempts recorded for a signal fingerprint.
    pub fn by_fingerprint(&self, fingerprint: &SignalFingerprint) -> Vec<ExecutionAttempt> {
        self.by_fingerprint
            .get(fingerprint.as_str())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.attempts.get(id).map(|a| a.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fetch one attempt by id.
    pub fn get(&self, id: &AttemptId) -> Option<ExecutionAttempt> {
        self.attempts.get(id).map(|a| a.clone())
    }

    /// Number of attempts held in memory.
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// Flush buffered audit lines to disk.
    pub fn flush(&self) -> PersistenceResult<()> {
        self.writer.lock().flush()
    }

    /// Flush and close the audit writer.
    pub fn close(&self) -> PersistenceResult<()> {
        self.writer.lock().close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn make_attempt(fp: &str, venue: &str, order_id: Option<&str>) -> ExecutionAttempt {
        ExecutionAttempt {
            id: AttemptId::new(),
            signal_fingerprint: SignalFingerprint::from_string(fp.to_string()),
            venue: VenueId::from(venue),
            symbol: "ETH-PERP".to_string(),
            status: ExecutionStatus::Pending,
            filled: Size::ZERO,
            remaining: Size::new(dec!(1.0)),
            order_id: order_id.map(|s| s.to_string()),
            raw_response: None,
            error: None,
            latency_ms: 5,
            created_at_ms: 1_700_000_000_000,
            revision: 0,
        }
    }

    #[test]
    fn test_append_and_query_by_fingerprint() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::new(dir.path().to_str().unwrap(), 10);

        store.append(make_attempt("fp_a", "hyper", None)).unwrap();
        store.append(make_attempt("fp_a", "drift", None)).unwrap();
        store.append(make_attempt("fp_b", "hyper", None)).unwrap();

        let fp = SignalFingerprint::from_string("fp_a".to_string());
        assert_eq!(store.by_fingerprint(&fp).len(), 2);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_reconcile_upserts_and_bumps_revision() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::new(dir.path().to_str().unwrap(), 10);

        let attempt = make_attempt("fp_a", "hyper", Some("v-9"));
        let venue = attempt.venue.clone();
        store.append(attempt).unwrap();

        let corrected = store
            .reconcile(
                &venue,
                "v-9",
                Size::new(dec!(1.0)),
                Size::ZERO,
                false,
                serde_json::json!({"state": "filled"}),
            )
            .unwrap();

        assert_eq!(corrected.status, ExecutionStatus::Filled);
        assert_eq!(corrected.revision, 1);

        let fp = SignalFingerprint::from_string("fp_a".to_string());
        let stored = &store.by_fingerprint(&fp)[0];
        assert_eq!(stored.status, ExecutionStatus::Filled);
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn test_reconcile_unknown_order_is_none() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::new(dir.path().to_str().unwrap(), 10);

        let result = store.reconcile(
            &VenueId::from("hyper"),
            "missing",
            Size::ZERO,
            Size::ZERO,
            true,
            serde_json::Value::Null,
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_reconcile_rejection_fails_attempt() {
        let dir = TempDir::new().unwrap();
        let store = ExecutionStore::new(dir.path().to_str().unwrap(), 10);

        let attempt = make_attempt("fp_a", "hyper", Some("v-10"));
        let venue = attempt.venue.clone();
        store.append(attempt).unwrap();

        let corrected = store
            .reconcile(
                &venue,
                "v-10",
                Size::ZERO,
                Size::new(dec!(1.0)),
                true,
                serde_json::json!({"state": "rejected"}),
            )
            .unwrap();

        assert_eq!(corrected.status, ExecutionStatus::Failed);
        assert!(corrected.error.is_some());
    }
}
