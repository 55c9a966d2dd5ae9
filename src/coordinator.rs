/// LiveGrid Execution Coordinator
///
/// Decides where the Filter → Sort → Group pipeline runs:
///
/// - **Synchronous**: on the calling thread, finished before the call returns.
/// - **Offloaded**: each stage is posted to the worker context as a separate
///   request and awaited through a single-shot callback. Stages of one run
///   are awaited strictly in order; the caller is never blocked.
///
/// Any offloaded stage that cannot be dispatched, errors in the worker,
/// returns an unreadable payload or times out is recomputed synchronously.
/// That failure is logged and never reaches the caller.
///
/// # Correlation
///
/// With `CorrelationPolicy::ByStageKind` (the default) there is exactly one
/// callback slot per stage kind. A new request of the same kind replaces
/// the registered callback, abandoning the earlier run, and whichever
/// response arrives first is delivered to the newest callback. A newer run
/// can therefore publish the result computed for an older request.
///
/// `CorrelationPolicy::BySequence` tags every request with a sequence
/// number, cancels the previous run as soon as a new one starts and drops
/// responses nobody is waiting for. The latest request always wins.

use crate::error::{GridError, GridResult};
use crate::pipeline::{run_filter, run_group, run_pipeline, run_sort, PipelineInput};
use crate::protocol::{StageKind, WorkerRequest, WorkerResponse};
use crate::row::{DisplayRow, Row};
use crate::worker::{spawn_worker, WorkerChannels};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Synchronous,
    #[default]
    Offloaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CorrelationPolicy {
    /// One callback slot per stage kind; last response wins.
    #[default]
    ByStageKind,
    /// Sequence-tagged requests; last request wins.
    BySequence,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
    pub mode: ExecutionMode,
    pub correlation: CorrelationPolicy,
    /// Upper bound on each offloaded stage. `None` waits indefinitely.
    pub stage_timeout: Option<Duration>,
}

impl CoordinatorConfig {
    pub fn synchronous() -> Self {
        CoordinatorConfig {
            mode: ExecutionMode::Synchronous,
            ..Default::default()
        }
    }

    pub fn with_correlation(mut self, correlation: CorrelationPolicy) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }
}

/// Result of one completed pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub run_id: u64,
    pub display: Vec<DisplayRow>,
    /// Stages that were recomputed synchronously after an offload failure.
    pub fallbacks: Vec<StageKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CorrelationKey {
    Stage(StageKind),
    Sequence(StageKind, u64),
}

type Callback = oneshot::Sender<GridResult<JsonValue>>;
type CallbackTable = Arc<Mutex<HashMap<CorrelationKey, Callback>>>;

#[derive(Debug, Default)]
struct Progress {
    current_run: u64,
    pending: usize,
}

#[derive(Debug)]
struct Inner {
    config: CoordinatorConfig,
    requests: Option<UnboundedSender<String>>,
    callbacks: CallbackTable,
    progress: Mutex<Progress>,
    active: Mutex<Option<CancellationToken>>,
    /// Offloaded runs that have neither published nor been abandoned.
    in_flight: watch::Sender<usize>,
    next_run: AtomicU64,
    next_seq: AtomicU64,
}

/// Runs pipelines either in-process or through the worker context.
///
/// Cloning is cheap and every clone drives the same worker.
#[derive(Debug, Clone)]
pub struct ExecutionCoordinator {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts a run as in flight until dropped.
struct RunGuard(Arc<Inner>);

impl RunGuard {
    fn enter(inner: &Arc<Inner>) -> Self {
        inner.in_flight.send_modify(|n| *n += 1);
        RunGuard(Arc::clone(inner))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl ExecutionCoordinator {
    /// Create a coordinator. In offloaded mode this starts a worker thread;
    /// if that is impossible the coordinator stays synchronous for its whole
    /// lifetime and `is_worker_available` reports `false`.
    pub fn new(config: CoordinatorConfig) -> Self {
        if config.mode == ExecutionMode::Synchronous {
            return Self::build(config, None);
        }

        match spawn_worker() {
            Ok(channels) => Self::with_worker(config, channels),
            Err(e) => {
                log::warn!("worker unavailable, running pipelines synchronously: {}", e);
                Self::build(config, None)
            }
        }
    }

    pub fn synchronous() -> Self {
        Self::new(CoordinatorConfig::synchronous())
    }

    /// Create a coordinator on top of an existing worker context.
    pub fn with_worker(config: CoordinatorConfig, channels: WorkerChannels) -> Self {
        let WorkerChannels { requests, responses } = channels;
        let coordinator = Self::build(config, Some(requests));

        // The router must not own the request sender, or the worker would never hang up
        let callbacks = Arc::clone(&coordinator.inner.callbacks);
        let correlation = config.correlation;
        let router = thread::Builder::new()
            .name("grid-router".to_string())
            .spawn(move || route_responses(&callbacks, correlation, responses));

        match router {
            Ok(_) => coordinator,
            Err(e) => {
                log::warn!("failed to start response router, running pipelines synchronously: {}", e);
                Self::build(config, None)
            }
        }
    }

    fn build(config: CoordinatorConfig, requests: Option<UnboundedSender<String>>) -> Self {
        ExecutionCoordinator {
            inner: Arc::new(Inner {
                config,
                requests,
                callbacks: Arc::new(Mutex::new(HashMap::new())),
                progress: Mutex::new(Progress::default()),
                active: Mutex::new(None),
                in_flight: watch::channel(0).0,
                next_run: AtomicU64::new(0),
                next_seq: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// True if stages can currently be posted to a worker context.
    pub fn is_worker_available(&self) -> bool {
        self.inner.config.mode == ExecutionMode::Offloaded
            && self.inner.requests.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// True exactly while a stage request of the current run is pending.
    pub fn is_processing(&self) -> bool {
        lock(&self.inner.progress).pending > 0
    }

    /// Number of started runs that have not yet published or been abandoned.
    pub fn runs_in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Watch `runs_in_flight` change.
    pub fn watch_runs(&self) -> watch::Receiver<usize> {
        self.inner.in_flight.subscribe()
    }

    /// Id of the most recently started run (0 before the first run).
    pub fn current_run(&self) -> u64 {
        lock(&self.inner.progress).current_run
    }

    fn begin_run(&self) -> (u64, CancellationToken) {
        let run_id = self.inner.next_run.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut progress = lock(&self.inner.progress);
            progress.current_run = run_id;
            progress.pending = 0;
        }

        let token = CancellationToken::new();
        if self.inner.config.correlation == CorrelationPolicy::BySequence {
            if let Some(previous) = lock(&self.inner.active).replace(token.clone()) {
                previous.cancel();
            }
        }
        (run_id, token)
    }

    fn mark_pending(&self, run_id: u64) {
        let mut progress = lock(&self.inner.progress);
        if progress.current_run == run_id {
            progress.pending += 1;
        }
    }

    fn mark_settled(&self, run_id: u64) {
        let mut progress = lock(&self.inner.progress);
        if progress.current_run == run_id {
            progress.pending = progress.pending.saturating_sub(1);
        }
    }

    /// Run the whole pipeline on the calling thread.
    pub fn run_sync(&self, input: &PipelineInput) -> PipelineOutcome {
        let (run_id, _) = self.begin_run();
        PipelineOutcome {
            run_id,
            display: run_pipeline(input),
            fallbacks: Vec::new(),
        }
    }

    /// Run the pipeline, offloading stages when a worker is available.
    ///
    /// Returns `None` if the run was abandoned because a newer run took over
    /// its callback or cancelled it.
    pub async fn run(&self, input: &PipelineInput) -> Option<PipelineOutcome> {
        let (run_id, token) = self.begin_run();
        let _guard = RunGuard::enter(&self.inner);
        self.execute(run_id, input, &token).await
    }

    /// Start a run in the background and deliver its outcome on `results`.
    /// Returns the run id. An abandoned run delivers nothing; it only
    /// leaves `runs_in_flight`, after any outcome it produced was sent.
    ///
    /// Without a tokio runtime on the current thread the run completes
    /// synchronously before this returns.
    pub fn spawn_run(&self, input: PipelineInput, results: UnboundedSender<PipelineOutcome>) -> u64 {
        let (run_id, token) = self.begin_run();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let coordinator = self.clone();
                let guard = RunGuard::enter(&self.inner);
                handle.spawn(async move {
                    let _guard = guard;
                    if let Some(outcome) = coordinator.execute(run_id, &input, &token).await {
                        let _ = results.send(outcome);
                    }
                });
            }
            Err(_) => {
                log::debug!("no async runtime, running pipeline {} synchronously", run_id);
                let _ = results.send(PipelineOutcome {
                    run_id,
                    display: run_pipeline(&input),
                    fallbacks: Vec::new(),
                });
            }
        }
        run_id
    }

    async fn execute(&self, run_id: u64, input: &PipelineInput, token: &CancellationToken) -> Option<PipelineOutcome> {
        if !self.is_worker_available() {
            return Some(PipelineOutcome {
                run_id,
                display: run_pipeline(input),
                fallbacks: Vec::new(),
            });
        }

        match self.execute_offloaded(run_id, input, token).await {
            Ok(outcome) => {
                log::debug!(
                    "pipeline run {} produced {} display rows ({} fallbacks)",
                    run_id,
                    outcome.display.len(),
                    outcome.fallbacks.len()
                );
                Some(outcome)
            }
            Err(e) => {
                log::debug!("pipeline run {} abandoned: {}", run_id, e);
                None
            }
        }
    }

    async fn execute_offloaded(
        &self,
        run_id: u64,
        input: &PipelineInput,
        token: &CancellationToken,
    ) -> GridResult<PipelineOutcome> {
        let mut fallbacks = Vec::new();
        let rows = input.data.as_ref().clone();

        let rows: Vec<Row> = if input.filters.is_empty() {
            rows
        } else {
            let request = WorkerRequest::Filter {
                data: rows.clone(),
                filters: input.filters.clone(),
                seq: None,
            };
            self.offload_or(run_id, token, request, &mut fallbacks, || run_filter(rows, input))
                .await?
        };

        let rows: Vec<Row> = if input.sort.is_none() {
            rows
        } else {
            let request = WorkerRequest::Sort {
                data: rows.clone(),
                sort_config: input.sort.clone(),
                seq: None,
            };
            self.offload_or(run_id, token, request, &mut fallbacks, || run_sort(rows, input))
                .await?
        };

        let display: Vec<DisplayRow> = if input.groups.is_empty() {
            run_group(rows, input)
        } else {
            let request = WorkerRequest::Group {
                data: rows.clone(),
                groups: input.groups.clone(),
                expanded_groups: input.expanded_list(),
                aggregates: input.aggregates.clone(),
                seq: None,
            };
            self.offload_or(run_id, token, request, &mut fallbacks, || run_group(rows, input))
                .await?
        };

        if token.is_cancelled() {
            return Err(GridError::Superseded(StageKind::Group));
        }

        Ok(PipelineOutcome {
            run_id,
            display,
            fallbacks,
        })
    }

    /// Offload one stage, recomputing it with `fallback` on any failure
    /// other than being superseded.
    async fn offload_or<T, F>(
        &self,
        run_id: u64,
        token: &CancellationToken,
        request: WorkerRequest,
        fallbacks: &mut Vec<StageKind>,
        fallback: F,
    ) -> GridResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        let stage = request.kind();
        let result = self
            .offload(run_id, token, request)
            .await
            .and_then(|payload| serde_json::from_value::<T>(payload).map_err(GridError::from));

        match result {
            Ok(value) => Ok(value),
            Err(GridError::Superseded(stage)) => Err(GridError::Superseded(stage)),
            Err(e) => {
                log::warn!("{} stage falling back to synchronous execution: {}", stage, e);
                fallbacks.push(stage);
                Ok(fallback())
            }
        }
    }

    async fn offload(&self, run_id: u64, token: &CancellationToken, request: WorkerRequest) -> GridResult<JsonValue> {
        let stage = request.kind();
        let requests = self.inner.requests.as_ref().ok_or(GridError::WorkerUnavailable)?;

        let (key, request) = match self.inner.config.correlation {
            CorrelationPolicy::ByStageKind => (CorrelationKey::Stage(stage), request),
            CorrelationPolicy::BySequence => {
                let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
                (CorrelationKey::Sequence(stage, seq), request.with_seq(Some(seq)))
            }
        };
        let message = serde_json::to_string(&request)?;

        let (callback, receiver) = oneshot::channel();
        let replaced = lock(&self.inner.callbacks).insert(key, callback);
        if replaced.is_some() {
            log::debug!("{} callback replaced by run {}", stage, run_id);
        }

        self.mark_pending(run_id);
        if requests.send(message).is_err() {
            self.mark_settled(run_id);
            lock(&self.inner.callbacks).remove(&key);
            return Err(GridError::Transport("worker channel closed".to_string()));
        }
        log::debug!("dispatched {} for run {}", stage, run_id);

        let outcome = self.await_callback(stage, receiver, token).await;
        self.mark_settled(run_id);

        if let CorrelationKey::Sequence(..) = key {
            lock(&self.inner.callbacks).remove(&key);
        }
        outcome
    }

    async fn await_callback(
        &self,
        stage: StageKind,
        receiver: oneshot::Receiver<GridResult<JsonValue>>,
        token: &CancellationToken,
    ) -> GridResult<JsonValue> {
        let response = async {
            match receiver.await {
                Ok(outcome) => outcome,
                Err(_) => Err(GridError::Superseded(stage)),
            }
        };

        let bounded = async {
            match self.inner.config.stage_timeout {
                Some(limit) => tokio::time::timeout(limit, response)
                    .await
                    .unwrap_or_else(|_| Err(GridError::Timeout(stage))),
                None => response.await,
            }
        };

        tokio::select! {
            outcome = bounded => outcome,
            _ = token.cancelled() => Err(GridError::Superseded(stage)),
        }
    }
}

/// Deliver worker responses to registered callbacks until the worker hangs up.
fn route_responses(callbacks: &CallbackTable, correlation: CorrelationPolicy, mut responses: UnboundedReceiver<String>) {
    while let Some(message) = responses.blocking_recv() {
        route(callbacks, correlation, &message);
    }
    log::debug!("worker response channel closed");
}

fn route(callbacks: &CallbackTable, correlation: CorrelationPolicy, message: &str) {
    let json: JsonValue = match serde_json::from_str(message) {
        Ok(json) => json,
        Err(e) => {
            log::error!("unreadable worker response: {}", e);
            return;
        }
    };

    let Some(stage) = json.get("type").and_then(JsonValue::as_str).and_then(StageKind::parse) else {
        log::error!("worker response without a known stage type: {}", message);
        return;
    };
    let seq = json.get("seq").and_then(JsonValue::as_u64);

    let key = match (correlation, seq) {
        (CorrelationPolicy::BySequence, Some(seq)) => CorrelationKey::Sequence(stage, seq),
        _ => CorrelationKey::Stage(stage),
    };

    let Some(callback) = lock(callbacks).remove(&key) else {
        log::debug!("dropping {} response with no pending callback", stage);
        return;
    };

    let outcome = match serde_json::from_value::<WorkerResponse>(json) {
        Ok(WorkerResponse { error: Some(message), .. }) => {
            log::error!("{} stage failed in worker: {}", stage, message);
            Err(GridError::Worker { stage, message })
        }
        Ok(response) => Ok(response.result),
        Err(e) => Err(GridError::from(e)),
    };
    let _ = callback.send(outcome);
}
