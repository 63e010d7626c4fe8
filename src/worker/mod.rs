//! Background thumbnail download worker
//!
//! One long-lived tokio task consumes work signals from an unbounded queue, fetches and
//! decodes one image at a time and posts the result to a [`ResultDispatcher`] owned by the
//! consumer. The [`RequestTable`] is the single source of truth for what each key wants:
//! a work signal only names a key, and the loop looks the url up when it gets to it.
//!
//! Keys use value equality (`Eq` + `Hash`). Two keys that compare equal address the same
//! slot, so a consumer that recycles handles must make equal handles mean the same target.

pub mod dispatch;
pub mod table;

pub use dispatch::{DeliveryOutcome, DownloadResult, ResultDispatcher};
pub use table::{Claim, RequestTable};

use crate::decode::{DecodeError, DecodedImage, ImageDecoder};
use crate::fetch::{FetchError, ImageFetcher};
use crate::observability::Metrics;
use dispatch::DeliveryGate;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker has not been started")]
    NotStarted,

    #[error("Cannot {action} a worker in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: WorkerState,
    },

    #[error("Worker must be started inside a tokio runtime")]
    NoRuntime,
}

/// Why a request produced no image
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Reported to the error callback when a fetch or decode fails
#[derive(Debug)]
pub struct DownloadFailure<K> {
    pub key: K,
    pub url: String,
    pub error: DownloadError,
}

pub type ErrorCallback<K> = Arc<dyn Fn(DownloadFailure<K>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    fn is_shutting_down(self) -> bool {
        matches!(self, WorkerState::Stopping | WorkerState::Stopped)
    }
}

/// "Look at the table for this key"
#[derive(Debug)]
struct WorkItem<K> {
    key: K,
    seq: u64,
}

/// State shared by the worker handle, its loop and the dispatcher
pub(crate) struct Shared<K> {
    pub(crate) table: RequestTable<K>,
    pub(crate) gate: DeliveryGate,
    pub(crate) metrics: Arc<Metrics>,
    state: watch::Sender<WorkerState>,
}

/// Handle to the download worker.
///
/// `submit`, `cancel` and `clear_all` may be called from any thread. Dropping the handle
/// stops the worker.
pub struct DownloadWorker<K> {
    shared: Arc<Shared<K>>,
    queue: mpsc::UnboundedSender<WorkItem<K>>,
    idle: Mutex<Option<WorkerLoop<K>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

#[bon::bon]
impl<K> DownloadWorker<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Build a worker and the dispatcher that receives its results
    #[builder]
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        decoder: Arc<dyn ImageDecoder>,
        metrics: Option<Arc<Metrics>>,
        on_error: Option<ErrorCallback<K>>,
    ) -> (Self, ResultDispatcher<K>) {
        let (state, _) = watch::channel(WorkerState::NotStarted);
        let shared = Arc::new(Shared {
            table: RequestTable::new(),
            gate: DeliveryGate::default(),
            metrics: metrics.unwrap_or_default(),
            state,
        });

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let worker_loop = WorkerLoop {
            queue: queue_rx,
            state: shared.state.subscribe(),
            pipeline: Pipeline {
                shared: Arc::clone(&shared),
                results: results_tx,
                fetcher,
                decoder,
                on_error,
            },
        };

        let worker = Self {
            shared: Arc::clone(&shared),
            queue: queue_tx,
            idle: Mutex::new(Some(worker_loop)),
            handle: Mutex::new(None),
        };

        (worker, ResultDispatcher::new(results_rx, shared))
    }

    /// Spawn the processing loop on the current tokio runtime
    pub fn start(&self) -> Result<(), WorkerError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;

        let mut current = WorkerState::NotStarted;
        let started = self.shared.state.send_if_modified(|state| {
            current = *state;
            if *state == WorkerState::NotStarted {
                *state = WorkerState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(WorkerError::InvalidState {
                action: "start",
                state: current,
            });
        }

        let worker_loop = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker_loop) = worker_loop {
            let handle = runtime.spawn(worker_loop.run());
            *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }

        info!("Download worker started");
        Ok(())
    }

    /// Record `url` as the only pending request for `key` and signal the loop.
    ///
    /// Every call schedules a fetch, so resubmitting the same url after a failure retries it.
    /// An empty `url` cancels the key. After `stop()` the request is accepted and ignored.
    pub fn submit(&self, key: K, url: impl Into<String>) -> Result<(), WorkerError> {
        let url = url.into();
        if url.is_empty() {
            return self.cancel(&key);
        }
        if !self.accepting()? {
            debug!(?key, url, "Worker stopped, ignoring request");
            return Ok(());
        }

        debug!(?key, url, "Got a URL");
        let Some(seq) = self.shared.table.insert(key.clone(), url) else {
            return Ok(());
        };
        self.shared.metrics.submitted();

        if self.queue.send(WorkItem { key, seq }).is_err() {
            debug!("Worker loop has exited, request will not be processed");
        }
        Ok(())
    }

    /// Forget the pending request for `key`; an in-flight fetch finishes but is not delivered
    pub fn cancel(&self, key: &K) -> Result<(), WorkerError> {
        if !self.accepting()? {
            return Ok(());
        }

        if self.shared.table.remove(key).is_some() {
            self.shared.metrics.cancelled();
            debug!(?key, "Request cancelled");
        }
        Ok(())
    }

    /// Drop every pending request and work signal issued so far.
    ///
    /// A fetch already in flight still delivers if its key is resubmitted with the same url
    /// before the result is dispatched.
    pub fn clear_all(&self) {
        let dropped = self.shared.table.clear();
        self.shared.metrics.cleared();
        debug!(dropped, "Cleared pending requests");
    }

    /// Ask the loop to exit. Idempotent.
    ///
    /// Once this returns no delivery callback is running or will run. An in-flight fetch is
    /// left to finish in the background; use [`DownloadWorker::join`] to wait for the loop.
    pub fn stop(&self) {
        let mut previous = WorkerState::NotStarted;
        self.shared.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                WorkerState::NotStarted => *state = WorkerState::Stopped,
                WorkerState::Running => *state = WorkerState::Stopping,
                WorkerState::Stopping | WorkerState::Stopped => return false,
            }
            true
        });
        if previous.is_shutting_down() {
            return;
        }

        self.shared.gate.exclusive(|| self.shared.table.shut_down());

        if previous == WorkerState::NotStarted {
            // Never started: closing the result channel ends the dispatcher.
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }

        info!(state = ?self.state(), "Download worker stopping");
    }

    /// Wait until the processing loop has exited
    pub async fn join(&self) {
        let mut state = self.shared.state.subscribe();
        if state.wait_for(|s| *s == WorkerState::Stopped).await.is_err() {
            return;
        }

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker loop terminated abnormally");
            }
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.shared.state.borrow()
    }

    /// Number of keys with a request that has not been delivered
    pub fn pending_len(&self) -> usize {
        self.shared.table.len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.shared.table.contains(key)
    }

    /// Url currently requested for `key`
    pub fn pending_url(&self, key: &K) -> Option<String> {
        self.shared.table.get(key)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    fn accepting(&self) -> Result<bool, WorkerError> {
        match self.state() {
            WorkerState::NotStarted => Err(WorkerError::NotStarted),
            WorkerState::Running => Ok(true),
            WorkerState::Stopping | WorkerState::Stopped => Ok(false),
        }
    }
}

impl<K> Debug for DownloadWorker<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadWorker")
            .field("state", &*self.shared.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<K> Drop for DownloadWorker<K> {
    fn drop(&mut self) {
        let shut_down = self.shared.state.send_if_modified(|state| match *state {
            WorkerState::NotStarted => {
                *state = WorkerState::Stopped;
                true
            }
            WorkerState::Running => {
                *state = WorkerState::Stopping;
                true
            }
            WorkerState::Stopping | WorkerState::Stopped => false,
        });
        if shut_down {
            self.shared.gate.exclusive(|| self.shared.table.shut_down());
        }
    }
}

struct WorkerLoop<K> {
    queue: mpsc::UnboundedReceiver<WorkItem<K>>,
    state: watch::Receiver<WorkerState>,
    pipeline: Pipeline<K>,
}

impl<K> WorkerLoop<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    async fn run(mut self) {
        debug!("Worker loop running");

        loop {
            if self.state.borrow().is_shutting_down() {
                break;
            }

            tokio::select! {
                biased;
                changed = self.state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                item = self.queue.recv() => match item {
                    Some(item) => self.pipeline.process(item).await,
                    None => break,
                },
            }
        }

        self.pipeline.shared.state.send_replace(WorkerState::Stopped);
        debug!("Worker loop exited");
    }
}

/// Fetch, decode and hand off, one request at a time
struct Pipeline<K> {
    shared: Arc<Shared<K>>,
    results: mpsc::UnboundedSender<DownloadResult<K>>,
    fetcher: Arc<dyn ImageFetcher>,
    decoder: Arc<dyn ImageDecoder>,
    on_error: Option<ErrorCallback<K>>,
}

impl<K> Pipeline<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    async fn process(&self, item: WorkItem<K>) {
        let WorkItem { key, seq } = item;

        // Cancelled, cleared, or overwritten by a later submit for this key.
        let Some(url) = self.shared.table.lookup(&key, seq) else {
            trace!(?key, "No pending request, skipping");
            return;
        };

        debug!(?key, url, "Processing request");

        match self.download(&url).await {
            Ok(image) => {
                debug!(?key, url, width = image.width(), height = image.height(), "Image decoded");
                if self.results.send(DownloadResult { key, url, image }).is_err() {
                    debug!("Dispatcher dropped, discarding result");
                }
            }
            Err(error) => self.report(key, url, error),
        }
    }

    async fn download(&self, url: &str) -> Result<DecodedImage, DownloadError> {
        let bytes = self.fetcher.fetch_bytes(url).await?;
        self.shared.metrics.fetched();
        trace!(url, size = bytes.len(), "Fetched image bytes");

        let decoder = Arc::clone(&self.decoder);
        let image = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| DecodeError::Aborted(e.to_string()))??;

        Ok(image)
    }

    fn report(&self, key: K, url: String, error: DownloadError) {
        match &error {
            DownloadError::Fetch(_) => self.shared.metrics.fetch_failed(),
            DownloadError::Decode(_) => self.shared.metrics.decode_failed(),
        }

        // The entry stays in the table; only a different url for this key replaces it.
        warn!(?key, url, error = %error, "Error downloading image");

        if let Some(on_error) = &self.on_error {
            on_error(DownloadFailure { key, url, error });
        }
    }
}
