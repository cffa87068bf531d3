//! The recents loading pipeline: fetch, filter, eager enrichment, publish and
//! background completion, with cooperative cancellation throughout.
//!
//! One pipeline is meant to exist per process. It is constructed explicitly
//! and handed to collaborators by reference (or by cheap clone); there is no
//! global instance.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use crate::config::{RecentsConfig, SharedConfig};
use crate::filter::FilterPolicy;
use crate::host::{HostServices, RecentsConsumer};
use crate::models::{
    CoreError, CoreErrorKind, Image, JobId, JobLane, PipelineState, RawSet, RecentsSnapshot,
    RecordList, TaskRecord, WorkingSet,
};
use crate::orchestration::{
    BackgroundJobQueue, CancellationMode, CancellationToken, Enricher, JobFuture,
    OrchestrationResult,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct LoadRequest {
    /// `0` means "as many as the host keeps".
    pub max_tasks: usize,
    pub with_icons: bool,
    pub with_thumbnails: bool,
}

impl LoadRequest {
    pub fn new(max_tasks: usize, with_icons: bool, with_thumbnails: bool) -> Self {
        Self {
            max_tasks,
            with_icons,
            with_thumbnails,
        }
    }

    pub fn preload() -> Self {
        Self::new(0, true, true)
    }
}

impl Default for LoadRequest {
    fn default() -> Self {
        Self::preload()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PassKind {
    Preload,
    Load,
}

struct PassTicket {
    kind: PassKind,
    generation: u64,
    request: LoadRequest,
    policy: FilterPolicy,
    fetch_limit: usize,
    eager_limit: usize,
    now: SystemTime,
}

#[derive(Default)]
struct PassOutcome {
    working: Vec<Arc<TaskRecord>>,
    raw: Vec<Arc<TaskRecord>>,
    eagerly_enriched: usize,
}

#[derive(Default)]
struct LoaderState {
    phase: PipelineState,
    preloaded: bool,
    publish_pending: bool,
    generation: u64,
    working: WorkingSet,
    raw: RawSet,
    consumer: Option<Arc<dyn RecentsConsumer>>,
    fetch_job: Option<JobId>,
    sweep_job: Option<JobId>,
    shut_down: bool,
}

impl LoaderState {
    fn snapshot(&self) -> RecentsSnapshot {
        RecentsSnapshot {
            working: self.working.clone(),
            raw: self.raw.clone(),
        }
    }
}

struct LoaderInner {
    host: HostServices,
    config: SharedConfig,
    enricher: Enricher,
    queue: BackgroundJobQueue,
    default_thumbnail: Image,
    state: Mutex<LoaderState>,
}

#[derive(Clone)]
pub struct RecentsLoadPipeline {
    inner: Arc<LoaderInner>,
}

impl RecentsLoadPipeline {
    /// Builds a pipeline on the tokio runtime the caller is running in.
    pub fn new(host: HostServices, config: SharedConfig) -> OrchestrationResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("recents pipeline requires a tokio runtime: {error}"),
            )
        })?;
        Self::with_runtime(host, config, runtime)
    }

    pub fn with_runtime(
        host: HostServices,
        config: SharedConfig,
        runtime: tokio::runtime::Handle,
    ) -> OrchestrationResult<Self> {
        let initial = config.snapshot();
        initial.validate()?;

        let enricher = Enricher::new(host.clone(), initial.thumbnail_permission);
        let queue = BackgroundJobQueue::new(runtime, initial.max_workers);

        Ok(Self {
            inner: Arc::new(LoaderInner {
                host,
                config,
                enricher,
                queue,
                default_thumbnail: Image::transparent_placeholder(),
                state: Mutex::new(LoaderState::default()),
            }),
        })
    }

    pub fn attach_consumer(&self, consumer: Arc<dyn RecentsConsumer>) {
        self.inner.lock_state().consumer = Some(consumer);
    }

    pub fn detach_consumer(&self) {
        self.inner.lock_state().consumer = None;
    }

    /// Runs a full load pass ahead of the overlay being shown. The result is
    /// kept for the next [`RecentsLoadPipeline::load_tasks_in_background`].
    pub fn preload_tasks(&self) {
        let mut state = self.inner.lock_state();
        if state.shut_down {
            tracing::debug!("preload ignored after shutdown");
            return;
        }
        if state.phase == PipelineState::Loading {
            tracing::debug!("preload requested while a pass is in flight");
            return;
        }
        self.inner
            .start_pass_locked(&mut state, PassKind::Preload, LoadRequest::preload());
    }

    pub fn load_tasks_in_background(&self, request: LoadRequest) {
        let mut state = self.inner.lock_state();
        if state.shut_down {
            tracing::debug!("load ignored after shutdown");
            return;
        }

        if state.phase == PipelineState::Loading {
            tracing::debug!(
                generation = state.generation,
                "load requested while a pass is in flight; coalescing"
            );
            state.publish_pending = true;
            return;
        }

        if state.preloaded
            && let Some(consumer) = state.consumer.clone()
        {
            state.preloaded = false;
            let snapshot = state.snapshot();
            tracing::debug!(
                working = snapshot.working.len(),
                raw = snapshot.raw.len(),
                "serving preloaded recents"
            );
            self.inner
                .start_sweep_locked(&mut state, snapshot.working.clone());
            drop(state);
            consumer.update(snapshot);
            return;
        }

        self.inner
            .start_pass_locked(&mut state, PassKind::Load, request);
    }

    /// Stops all in-flight loading and forgets every loaded record. Safe to
    /// call at any time, any number of times.
    pub fn cancel_loading_tasks(&self) {
        let mut state = self.inner.lock_state();
        tracing::debug!(phase = ?state.phase, "cancelling recents loading");

        state.generation = state.generation.wrapping_add(1);
        for lane in [JobLane::Fetch, JobLane::Completion, JobLane::Thumbnail] {
            self.inner
                .queue
                .cancel_lane(lane, CancellationMode::Cooperative);
        }
        for record in state.raw.iter() {
            record.abandon_thumbnail_load();
        }

        state.fetch_job = None;
        state.sweep_job = None;
        state.working = WorkingSet::empty();
        state.raw = RawSet::empty();
        state.preloaded = false;
        state.publish_pending = false;
        state.phase = PipelineState::Idle;
    }

    /// On-demand thumbnail for a record that scrolled into view.
    pub fn load_thumbnail(&self, record: &Arc<TaskRecord>) {
        if !self.inner.enricher.has_thumbnail_permission() {
            return;
        }
        if self.inner.lock_state().shut_down {
            tracing::debug!("thumbnail load ignored after shutdown");
            return;
        }
        if !record.begin_thumbnail_load() {
            return;
        }

        let inner = self.inner.clone();
        let record = record.clone();
        self.inner.queue.spawn(
            JobLane::Thumbnail,
            Box::new(move |token: CancellationToken| -> JobFuture {
                Box::pin(async move { inner.run_thumbnail(record, token).await })
            }),
        );
    }

    /// Drops cached icons; call after icon-pack or density changes.
    pub fn invalidate_assets(&self) {
        self.inner.host.assets.invalidate();
    }

    /// Aborts all background work for good. The pipeline stays readable and
    /// `Idle`; later load requests are ignored.
    pub fn shutdown(&self) {
        self.inner.lock_state().shut_down = true;
        self.cancel_loading_tasks();
        self.inner.queue.shutdown();
    }

    pub fn state(&self) -> PipelineState {
        self.inner.lock_state().phase
    }

    pub fn is_preloaded(&self) -> bool {
        self.inner.lock_state().preloaded
    }

    pub fn snapshot(&self) -> RecentsSnapshot {
        self.inner.lock_state().snapshot()
    }

    pub fn working_set(&self) -> WorkingSet {
        self.inner.lock_state().working.clone()
    }

    pub fn raw_set(&self) -> RawSet {
        self.inner.lock_state().raw.clone()
    }

    pub fn has_thumbnail_permission(&self) -> bool {
        self.inner.enricher.has_thumbnail_permission()
    }

    pub fn default_thumbnail(&self) -> Image {
        self.inner.default_thumbnail.clone()
    }

    pub fn default_icon(&self) -> Image {
        self.inner.enricher.default_icon().clone()
    }

    /// Waits until no fetch, completion or thumbnail job is left.
    pub async fn wait_until_settled(&self, timeout: Option<Duration>) -> OrchestrationResult<()> {
        loop {
            let active = self.inner.queue.active_jobs(None);
            if active.is_empty() {
                return Ok(());
            }
            for job_id in active {
                match self.inner.queue.wait_for_terminal(job_id, timeout).await {
                    Ok(_) => {}
                    Err(error) if error.kind == CoreErrorKind::InvalidInput => {}
                    Err(error) => return Err(error),
                }
            }
        }
    }
}

impl LoaderInner {
    fn lock_state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_pass_locked(
        self: &Arc<Self>,
        state: &mut LoaderState,
        kind: PassKind,
        request: LoadRequest,
    ) {
        if let Some(sweep) = state.sweep_job.take() {
            let _ = self.queue.cancel(sweep, CancellationMode::Cooperative);
        }

        state.generation = state.generation.wrapping_add(1);
        state.phase = PipelineState::Loading;
        state.preloaded = false;
        state.working = WorkingSet::empty();
        state.raw = RawSet::empty();

        let config = self.config.snapshot();
        let ticket = pass_ticket(kind, state.generation, request, &config);
        tracing::debug!(
            generation = ticket.generation,
            kind = ?kind,
            fetch_limit = ticket.fetch_limit,
            eager_limit = ticket.eager_limit,
            "starting recents load pass"
        );

        let inner = self.clone();
        let job_id = self.queue.spawn(
            JobLane::Fetch,
            Box::new(move |token: CancellationToken| -> JobFuture {
                Box::pin(async move { inner.run_pass(ticket, token).await })
            }),
        );
        state.fetch_job = Some(job_id);
    }

    /// Starts `load_missing_task_info` over `working`, replacing any sweep in flight.
    fn start_sweep_locked(self: &Arc<Self>, state: &mut LoaderState, working: WorkingSet) {
        if let Some(prior) = state.sweep_job.take() {
            let _ = self.queue.cancel(prior, CancellationMode::Cooperative);
        }
        if !working.iter().any(|record| record.needs_task_info()) {
            return;
        }

        let inner = self.clone();
        let job_id = self.queue.spawn(
            JobLane::Completion,
            Box::new(move |token: CancellationToken| -> JobFuture {
                Box::pin(async move { inner.run_sweep(working, token).await })
            }),
        );
        state.sweep_job = Some(job_id);
    }

    async fn run_pass(
        self: Arc<Self>,
        ticket: PassTicket,
        token: CancellationToken,
    ) -> OrchestrationResult<()> {
        let ticket = Arc::new(ticket);
        let worker = self.clone();
        let worker_ticket = ticket.clone();
        let worker_token = token.clone();
        let collected =
            tokio::task::spawn_blocking(move || worker.collect_tasks(&worker_ticket, &worker_token))
                .await;

        let outcome = match collected {
            Ok(outcome) => outcome,
            Err(join_error) => {
                tracing::warn!(
                    generation = ticket.generation,
                    error = %join_error,
                    "recents fetch worker failed; ending pass empty"
                );
                PassOutcome::default()
            }
        };

        self.finish_pass(&ticket, outcome, &token);
        Ok(())
    }

    fn collect_tasks(&self, ticket: &PassTicket, token: &CancellationToken) -> PassOutcome {
        let tasks = match self.host.tasks.list_recent_tasks(ticket.fetch_limit) {
            Ok(tasks) => tasks,
            Err(error) => {
                tracing::warn!(
                    generation = ticket.generation,
                    kind = ?error.kind,
                    message = %error.message,
                    "recent task source unavailable"
                );
                return PassOutcome::default();
            }
        };
        let home = self.host.tasks.home_activity();

        let mut pass = ticket.policy.begin(home.as_ref(), ticket.now);
        let mut eagerly_enriched = 0usize;
        for raw in &tasks {
            if token.is_cancelled() {
                tracing::debug!(generation = ticket.generation, "recents fetch cancelled");
                break;
            }

            let resolved = self.host.tasks.resolve_activity(&raw.target_intent());
            let admission = match pass.admit(raw, resolved) {
                Ok(admission) => admission,
                Err(reason) => {
                    tracing::trace!(
                        persistent_task_id = raw.persistent_id,
                        reason = ?reason,
                        "recent task filtered"
                    );
                    continue;
                }
            };

            let is_locked = admission.is_locked;
            let record = Arc::new(TaskRecord::new(raw, admission.resolved, is_locked));
            if eagerly_enriched < ticket.eager_limit {
                self.enricher.enrich_eagerly(
                    &record,
                    ticket.request.with_icons,
                    ticket.request.with_thumbnails,
                );
                eagerly_enriched += 1;
            }
            pass.accept(record, is_locked);
        }

        let filtered = pass.finish();
        PassOutcome {
            working: filtered.working,
            raw: filtered.raw,
            eagerly_enriched,
        }
    }

    fn finish_pass(
        self: &Arc<Self>,
        ticket: &PassTicket,
        outcome: PassOutcome,
        token: &CancellationToken,
    ) {
        let publish = {
            let mut state = self.lock_state();
            if token.is_cancelled() || state.generation != ticket.generation {
                tracing::debug!(generation = ticket.generation, "discarding superseded pass");
                return;
            }

            state.working = RecordList::from(outcome.working);
            state.raw = RecordList::from(outcome.raw);
            state.phase = PipelineState::Idle;
            state.fetch_job = None;

            let wants_publish = ticket.kind == PassKind::Load || state.publish_pending;
            state.publish_pending = false;

            tracing::debug!(
                generation = ticket.generation,
                working = state.working.len(),
                raw = state.raw.len(),
                eagerly_enriched = outcome.eagerly_enriched,
                "recents load pass finished"
            );

            match state.consumer.clone() {
                Some(consumer) if wants_publish => {
                    let snapshot = state.snapshot();
                    self.start_sweep_locked(&mut state, snapshot.working.clone());
                    Some((consumer, snapshot))
                }
                _ => {
                    state.preloaded = true;
                    None
                }
            }
        };

        if let Some((consumer, snapshot)) = publish {
            consumer.update(snapshot);
        }
    }

    async fn run_sweep(
        self: Arc<Self>,
        working: WorkingSet,
        token: CancellationToken,
    ) -> OrchestrationResult<()> {
        let worker = self.clone();
        let worker_token = token.clone();
        let updated = tokio::task::spawn_blocking(move || {
            let mut updated = 0usize;
            for record in working.iter() {
                if worker_token.is_cancelled() {
                    break;
                }
                if worker.enricher.complete_task_info(record) {
                    updated += 1;
                }
            }
            updated
        })
        .await
        .map_err(|join_error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("task info sweep join failure: {join_error}"),
            )
            .in_lane(JobLane::Completion)
        })?;

        tracing::debug!(
            updated,
            cancelled = token.is_cancelled(),
            "load_missing_task_info finished"
        );
        Ok(())
    }

    async fn run_thumbnail(
        self: Arc<Self>,
        record: Arc<TaskRecord>,
        token: CancellationToken,
    ) -> OrchestrationResult<()> {
        let persistent_task_id = record.persistent_task_id();
        if token.is_cancelled() {
            record.abandon_thumbnail_load();
            return Err(CoreError::new(CoreErrorKind::Cancelled, "thumbnail load cancelled")
                .in_lane(JobLane::Thumbnail)
                .for_task(persistent_task_id));
        }

        let worker = self.clone();
        let target = record.clone();
        let joined =
            tokio::task::spawn_blocking(move || worker.enricher.finish_thumbnail(&target)).await;
        if let Err(join_error) = joined {
            record.abandon_thumbnail_load();
            return Err(CoreError::new(
                CoreErrorKind::EnrichmentFailure,
                format!("thumbnail worker join failure: {join_error}"),
            )
            .in_lane(JobLane::Thumbnail)
            .for_task(persistent_task_id));
        }
        Ok(())
    }
}

fn pass_ticket(
    kind: PassKind,
    generation: u64,
    request: LoadRequest,
    config: &RecentsConfig,
) -> PassTicket {
    let fetch_limit = if request.max_tasks == 0 {
        config.max_recent_tasks
    } else {
        request.max_tasks
    };
    let eager_limit = if request.max_tasks == 0 {
        config.eager_limit
    } else {
        config.eager_limit.min(request.max_tasks)
    };

    PassTicket {
        kind,
        generation,
        request,
        policy: FilterPolicy::from_config(config),
        fetch_limit,
        eager_limit,
        now: SystemTime::now(),
    }
}
