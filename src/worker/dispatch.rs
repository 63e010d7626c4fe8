//! Consumer-side delivery of finished downloads
//!
//! The worker loop never calls consumer code. It posts [`DownloadResult`]s onto a channel
//! that the consumer drains on its own task through a [`ResultDispatcher`], which repeats
//! the table check right before the callback runs.

use super::Shared;
use super::table::Claim;
use crate::decode::DecodedImage;
use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// A fetched and decoded image, not yet validated for delivery
#[derive(Debug, Clone)]
pub struct DownloadResult<K> {
    pub key: K,
    pub url: String,
    pub image: DecodedImage,
}

/// What happened to a result handed to [`ResultDispatcher::deliver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Cancelled, cleared or superseded by a newer url for the same key
    Stale,
    /// The worker was stopped
    Stopped,
}

thread_local! {
    /// Gates whose shared side this thread currently holds, innermost last
    static HELD_GATES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks one gate as held by this thread until dropped
struct HeldGate {
    id: usize,
}

impl HeldGate {
    fn enter(id: usize) -> Self {
        HELD_GATES.with(|gates| gates.borrow_mut().push(id));
        Self { id }
    }
}

impl Drop for HeldGate {
    fn drop(&mut self) {
        HELD_GATES.with(|gates| {
            let mut gates = gates.borrow_mut();
            if let Some(pos) = gates.iter().rposition(|&id| id == self.id) {
                gates.remove(pos);
            }
        });
    }
}

/// Orders `stop()` against running delivery callbacks.
///
/// Deliveries hold the gate shared from validation until the callback returns; `stop()`
/// takes it exclusively while raising the stopped flag. The thread running a delivery
/// callback skips the lock for that same gate only, so stopping its own worker from the
/// callback works while other workers' gates are still honoured.
#[derive(Debug, Default)]
pub(crate) struct DeliveryGate {
    lock: RwLock<()>,
}

impl DeliveryGate {
    fn id(&self) -> usize {
        self as *const Self as usize
    }

    fn held_here(&self) -> bool {
        let id = self.id();
        HELD_GATES.with(|gates| gates.borrow().contains(&id))
    }

    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.held_here() {
            return f();
        }
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn shared<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.held_here() {
            return f();
        }
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let _held = HeldGate::enter(self.id());
        f()
    }
}

/// Receiving end of the worker, owned by the consumer context.
///
/// Only the task that owns the dispatcher ever runs delivery callbacks.
pub struct ResultDispatcher<K> {
    results: mpsc::UnboundedReceiver<DownloadResult<K>>,
    shared: Arc<Shared<K>>,
}

impl<K> ResultDispatcher<K>
where
    K: Eq + Hash + Debug,
{
    pub(crate) fn new(
        results: mpsc::UnboundedReceiver<DownloadResult<K>>,
        shared: Arc<Shared<K>>,
    ) -> Self {
        Self { results, shared }
    }

    /// Deliver `result` if its key still maps to the url that produced it.
    ///
    /// On success the table entry is removed before `on_delivered` runs, so a later submit
    /// of the same url counts as new work.
    pub fn deliver<F>(&self, result: DownloadResult<K>, on_delivered: F) -> DeliveryOutcome
    where
        F: FnOnce(K, DecodedImage),
    {
        let DownloadResult { key, url, image } = result;
        let metrics = &self.shared.metrics;

        self.shared.gate.shared(|| match self.shared.table.claim(&key, &url) {
            Claim::Claimed => {
                metrics.delivered();
                debug!(?key, url, "Delivering image");
                on_delivered(key, image);
                DeliveryOutcome::Delivered
            }
            Claim::Stale => {
                metrics.discarded_stale();
                debug!(?key, url, "Discarding stale result");
                DeliveryOutcome::Stale
            }
            Claim::Stopped => {
                metrics.discarded_stopped();
                debug!(?key, url, "Worker stopped, discarding result");
                DeliveryOutcome::Stopped
            }
        })
    }

    /// Next raw result; `None` once the worker loop has exited
    pub async fn recv(&mut self) -> Option<DownloadResult<K>> {
        self.results.recv().await
    }

    /// Deliver results until the worker exits or `on_delivered` breaks.
    ///
    /// Returns the number of results delivered.
    pub async fn run<F>(&mut self, mut on_delivered: F) -> usize
    where
        F: FnMut(K, DecodedImage) -> ControlFlow<()>,
    {
        let mut delivered = 0;

        while let Some(result) = self.results.recv().await {
            let mut flow = ControlFlow::Continue(());
            let outcome = self.deliver(result, |key, image| flow = on_delivered(key, image));
            if outcome == DeliveryOutcome::Delivered {
                delivered += 1;
            }
            if flow.is_break() {
                break;
            }
        }

        delivered
    }

    /// Deliver whatever is already queued without waiting
    pub fn dispatch_ready<F>(&mut self, mut on_delivered: F) -> usize
    where
        F: FnMut(K, DecodedImage),
    {
        let mut delivered = 0;

        while let Ok(result) = self.results.try_recv() {
            if self.deliver(result, &mut on_delivered) == DeliveryOutcome::Delivered {
                delivered += 1;
            }
        }

        delivered
    }
}

impl<K> Debug for ResultDispatcher<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultDispatcher")
            .field("queued", &self.results.len())
            .finish()
    }
}
