//! Scripted fake venue shared by the engine's unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{OrderRequest, Size, VenueId};
use relay_venue::{
    OrderAck, OrderUpdate, ProbeReport, VenueAdapter, VenueError, VenuePosition, VenueResult,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Scripted outcome of one `submit_order` call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ScriptedSubmit {
    /// Fill the full requested size.
    FillAll,
    /// Fill a fixed amount.
    Fill { filled: Size, remaining: Size },
    /// Permanent business rejection.
    Reject,
    /// Transient timeout.
    Timeout,
    /// Panic inside the venue task.
    Panic,
}

/// Configurable in-memory venue.
///
/// `submit_script` outcomes are consumed first; once empty, `fallback`
/// applies to every further call. Probes and connects succeed while
/// `probe_ok` is set.
pub(crate) struct FakeVenue {
    id: VenueId,
    fallback: ScriptedSubmit,
    submit_script: Mutex<VecDeque<ScriptedSubmit>>,
    probe_ok: AtomicBool,
    order_seq: AtomicU32,
    pub submit_calls: AtomicU32,
    pub probe_calls: AtomicU32,
    pub connect_calls: AtomicU32,
    pub disconnect_calls: AtomicU32,
    updates_tx: broadcast::Sender<OrderUpdate>,
}

impl FakeVenue {
    pub fn new(id: &str) -> Arc<Self> {
        Self::with_fallback(id, ScriptedSubmit::FillAll)
    }

    pub fn with_fallback(id: &str, fallback: ScriptedSubmit) -> Arc<Self> {
        let (updates_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            id: VenueId::from(id),
            fallback,
            submit_script: Mutex::new(VecDeque::new()),
            probe_ok: AtomicBool::new(true),
            order_seq: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            probe_calls: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            updates_tx,
        })
    }

    pub fn script_submit(&self, outcome: ScriptedSubmit) {
        self.submit_script.lock().push_back(outcome);
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    fn next_order_id(&self) -> String {
        let seq = self.order_seq.fetch_add(1, Ordering::SeqCst);
        format!("{}-{seq}", self.id)
    }
}

#[async_trait]
impl VenueAdapter for FakeVenue {
    fn id(&self) -> &VenueId {
        &self.id
    }

    async fn connect(&self) -> VenueResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(VenueError::Connect("scripted refusal".to_string()))
        }
    }

    async fn disconnect(&self) -> VenueResult<()> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn submit_order(&self, order: &OrderRequest) -> VenueResult<OrderAck> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .submit_script
            .lock()
            .pop_front()
            .unwrap_or(self.fallback);

        match outcome {
            ScriptedSubmit::FillAll => Ok(OrderAck {
                order_id: self.next_order_id(),
                filled: order.size,
                remaining: Size::ZERO,
                raw: serde_json::json!({"fake": true}),
            }),
            ScriptedSubmit::Fill { filled, remaining } => Ok(OrderAck {
                order_id: self.next_order_id(),
                filled,
                remaining,
                raw: serde_json::json!({"fake": true}),
            }),
            ScriptedSubmit::Reject => {
                Err(VenueError::Rejected("scripted rejection".to_string()))
            }
            ScriptedSubmit::Timeout => {
                Err(VenueError::Timeout("scripted timeout".to_string()))
            }
            ScriptedSubmit::Panic => panic!("scripted venue panic"),
        }
    }

    async fn order_status(&self, order_id: &str) -> VenueResult<OrderAck> {
        Err(VenueError::OrderNotFound(order_id.to_string()))
    }

    async fn cancel_order(&self, _order_id: &str) -> VenueResult<()> {
        Ok(())
    }

    async fn position(&self, symbol: &str) -> VenueResult<VenuePosition> {
        Ok(VenuePosition {
            symbol: symbol.to_string(),
            size: Size::ZERO,
            entry_price: None,
        })
    }

    async fn probe(&self) -> VenueResult<ProbeReport> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe_ok.load(Ordering::SeqCst) {
            Ok(ProbeReport {
                status: "ok".to_string(),
                latency_ms: 1,
            })
        } else {
            Err(VenueError::Timeout("scripted probe timeout".to_string()))
        }
    }

    fn order_updates(&self) -> broadcast::Receiver<OrderUpdate> {
        self.updates_tx.subscribe()
    }
}
