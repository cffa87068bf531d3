use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tokio::runtime::Handle;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::AbortHandle;
use tokio::time::timeout;

use crate::models::{CoreError, CoreErrorKind, JobId, JobLane, JobPriority, JobStatus};
use crate::orchestration::{CancellationMode, OrchestrationResult};

const MAX_RETAINED_TERMINAL_JOBS: usize = 256;

pub type JobFuture = Pin<Box<dyn Future<Output = OrchestrationResult<()>> + Send>>;

pub type JobOperation = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send>;

/// Cooperative cancellation flag shared between a job and whoever cancels it.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub lane: JobLane,
    pub status: JobStatus,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub error_message: Option<String>,
}

/// Bounded worker pool for pipeline background work.
///
/// Every job holds one of `max_workers` permits while it runs. Background
/// priority jobs additionally hold a background slot; there is one slot fewer
/// than workers, so foreground work always has a worker left. Jobs in a
/// serialized lane run one at a time in submission order.
#[derive(Clone)]
pub struct BackgroundJobQueue {
    inner: Arc<Mutex<QueueState>>,
    runtime: Handle,
    workers: Arc<Semaphore>,
    background_slots: Arc<Semaphore>,
}

#[derive(Default)]
struct QueueState {
    next_job_id: u64,
    jobs: BTreeMap<JobId, JobSnapshot>,
    lane_locks: HashMap<JobLane, Arc<tokio::sync::Mutex<()>>>,
    cancellation_tokens: HashMap<JobId, CancellationToken>,
    abort_handles: HashMap<JobId, AbortHandle>,
    completion_notifiers: HashMap<JobId, Arc<Notify>>,
}

impl BackgroundJobQueue {
    pub fn new(runtime: Handle, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            inner: Arc::new(Mutex::new(QueueState::default())),
            runtime,
            workers: Arc::new(Semaphore::new(max_workers)),
            background_slots: Arc::new(Semaphore::new(max_workers.saturating_sub(1).max(1))),
        }
    }

    pub fn spawn(&self, lane: JobLane, operation: JobOperation) -> JobId {
        let (job_id, lane_lock, token, completion_notify) = {
            let mut state = lock_state(&self.inner);
            let job_id = JobId(state.next_job_id);
            state.next_job_id = state.next_job_id.saturating_add(1);

            state.jobs.insert(
                job_id,
                JobSnapshot {
                    id: job_id,
                    lane,
                    status: JobStatus::Queued,
                    created_at: SystemTime::now(),
                    started_at: None,
                    finished_at: None,
                    error_message: None,
                },
            );

            let lane_lock = lane.is_serialized().then(|| {
                state
                    .lane_locks
                    .entry(lane)
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                    .clone()
            });
            let token = CancellationToken::new();
            let completion_notify = Arc::new(Notify::new());

            state.cancellation_tokens.insert(job_id, token.clone());
            state
                .completion_notifiers
                .insert(job_id, completion_notify.clone());

            (job_id, lane_lock, token, completion_notify)
        };

        let inner = self.inner.clone();
        let workers = self.workers.clone();
        let background_slots = self.background_slots.clone();
        let join_handle = self.runtime.spawn(async move {
            let _lane_guard = match lane_lock {
                Some(lock) => Some(lock.lock_owned().await),
                None => None,
            };

            let permits = acquire_permits(lane.priority(), &workers, &background_slots).await;
            let Some(_permits) = permits else {
                set_terminal(&inner, job_id, JobStatus::Cancelled, None);
                finalize_cleanup(&inner, job_id, &completion_notify);
                return;
            };

            if !set_running_if_possible(&inner, job_id) {
                finalize_cleanup(&inner, job_id, &completion_notify);
                return;
            }

            if token.is_cancelled() {
                set_terminal(&inner, job_id, JobStatus::Cancelled, None);
                finalize_cleanup(&inner, job_id, &completion_notify);
                return;
            }

            let outcome = operation(token.clone()).await;
            match outcome {
                Ok(()) => {
                    let status = if token.is_cancelled() {
                        JobStatus::Cancelled
                    } else {
                        JobStatus::Completed
                    };
                    set_terminal(&inner, job_id, status, None);
                }
                Err(error) => {
                    let status = if token.is_cancelled() || error.is_cancelled() {
                        JobStatus::Cancelled
                    } else {
                        tracing::warn!(
                            job_id = job_id.0,
                            lane = ?lane,
                            kind = ?error.kind,
                            message = %error.message,
                            "background job failed"
                        );
                        JobStatus::Failed
                    };
                    set_terminal(&inner, job_id, status, Some(error.message));
                }
            }

            finalize_cleanup(&inner, job_id, &completion_notify);
        });

        let mut state = lock_state(&self.inner);
        let still_active = state
            .jobs
            .get(&job_id)
            .is_some_and(|job| !job.status.is_terminal());
        if still_active {
            state
                .abort_handles
                .insert(job_id, join_handle.abort_handle());
        }

        job_id
    }

    pub fn snapshot(&self, job_id: JobId) -> OrchestrationResult<JobSnapshot> {
        lock_state(&self.inner)
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| job_lookup_error(job_id))
    }

    pub fn status(&self, job_id: JobId) -> OrchestrationResult<JobStatus> {
        Ok(self.snapshot(job_id)?.status)
    }

    pub fn active_jobs(&self, lane: Option<JobLane>) -> Vec<JobId> {
        lock_state(&self.inner)
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .filter(|job| lane.is_none_or(|lane| job.lane == lane))
            .map(|job| job.id)
            .collect()
    }

    /// Requests cancellation. Queued jobs become `Cancelled` right away;
    /// running jobs observe their token at the next loop boundary, unless
    /// `Immediate` aborts them outright.
    pub fn cancel(&self, job_id: JobId, mode: CancellationMode) -> OrchestrationResult<()> {
        let (abort_handle, notify) = {
            let mut state = lock_state(&self.inner);
            let prior_status = state
                .jobs
                .get(&job_id)
                .map(|job| job.status)
                .ok_or_else(|| job_lookup_error(job_id))?;
            if prior_status.is_terminal() {
                return Ok(());
            }

            if let Some(token) = state.cancellation_tokens.get(&job_id) {
                token.cancel();
            }

            let notify = if prior_status == JobStatus::Queued
                && let Some(job) = state.jobs.get_mut(&job_id)
            {
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(SystemTime::now());
                state.completion_notifiers.get(&job_id).cloned()
            } else {
                None
            };

            (state.abort_handles.get(&job_id).cloned(), notify)
        };

        if let Some(notify) = notify {
            notify.notify_waiters();
        }

        if mode == CancellationMode::Immediate {
            if let Some(handle) = abort_handle {
                handle.abort();
            }
            self.force_mark_cancelled(job_id);
        }

        Ok(())
    }

    pub fn cancel_lane(&self, lane: JobLane, mode: CancellationMode) -> usize {
        let active = self.active_jobs(Some(lane));
        active
            .iter()
            .filter(|job_id| self.cancel(**job_id, mode).is_ok())
            .count()
    }

    /// Aborts every job and refuses further work.
    pub fn shutdown(&self) {
        for job_id in self.active_jobs(None) {
            let _ = self.cancel(job_id, CancellationMode::Immediate);
        }
        self.workers.close();
        self.background_slots.close();
    }

    pub async fn wait_for_terminal(
        &self,
        job_id: JobId,
        timeout_duration: Option<Duration>,
    ) -> OrchestrationResult<JobSnapshot> {
        loop {
            let notify = {
                let state = lock_state(&self.inner);
                let snapshot = state
                    .jobs
                    .get(&job_id)
                    .cloned()
                    .ok_or_else(|| job_lookup_error(job_id))?;
                if snapshot.status.is_terminal() {
                    return Ok(snapshot);
                }
                state
                    .completion_notifiers
                    .get(&job_id)
                    .cloned()
                    .ok_or_else(|| job_lookup_error(job_id))?
            };

            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.status(job_id)?.is_terminal() {
                continue;
            }

            if let Some(duration) = timeout_duration {
                timeout(duration, notified).await.map_err(|_| CoreError {
                    lane: None,
                    task: None,
                    kind: CoreErrorKind::Timeout,
                    message: format!("timed out waiting for job '{job_id}' to finish"),
                })?;
            } else {
                notified.await;
            }
        }
    }

    fn force_mark_cancelled(&self, job_id: JobId) {
        let notify = {
            let mut state = lock_state(&self.inner);
            if let Some(job) = state.jobs.get_mut(&job_id)
                && !job.status.is_terminal()
            {
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(SystemTime::now());
            }

            state.abort_handles.remove(&job_id);
            state.cancellation_tokens.remove(&job_id);
            state.completion_notifiers.get(&job_id).cloned()
        };

        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}

async fn acquire_permits(
    priority: JobPriority,
    workers: &Arc<Semaphore>,
    background_slots: &Arc<Semaphore>,
) -> Option<Vec<OwnedSemaphorePermit>> {
    let mut permits = Vec::with_capacity(2);
    if priority == JobPriority::Background {
        permits.push(background_slots.clone().acquire_owned().await.ok()?);
    }
    permits.push(workers.clone().acquire_owned().await.ok()?);
    Some(permits)
}

fn lock_state(inner: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_running_if_possible(inner: &Mutex<QueueState>, job_id: JobId) -> bool {
    let mut state = lock_state(inner);
    let Some(job) = state.jobs.get_mut(&job_id) else {
        return false;
    };
    if job.status.is_terminal() {
        return false;
    }
    job.status = JobStatus::Running;
    job.started_at = Some(SystemTime::now());
    true
}

fn set_terminal(
    inner: &Mutex<QueueState>,
    job_id: JobId,
    status: JobStatus,
    error_message: Option<String>,
) {
    let mut state = lock_state(inner);
    if let Some(job) = state.jobs.get_mut(&job_id) {
        job.status = status;
        job.finished_at = Some(SystemTime::now());
        job.error_message = error_message;
    }
}

fn finalize_cleanup(inner: &Mutex<QueueState>, job_id: JobId, notify: &Arc<Notify>) {
    {
        let mut state = lock_state(inner);
        state.abort_handles.remove(&job_id);
        state.cancellation_tokens.remove(&job_id);
        prune_terminal_jobs(&mut state);
    }
    notify.notify_waiters();
}

fn prune_terminal_jobs(state: &mut QueueState) {
    let terminal: Vec<JobId> = state
        .jobs
        .values()
        .filter(|job| job.status.is_terminal())
        .map(|job| job.id)
        .collect();
    let excess = terminal.len().saturating_sub(MAX_RETAINED_TERMINAL_JOBS);
    for job_id in terminal.into_iter().take(excess) {
        state.jobs.remove(&job_id);
        state.completion_notifiers.remove(&job_id);
    }
}

fn job_lookup_error(job_id: JobId) -> CoreError {
    CoreError::new(
        CoreErrorKind::InvalidInput,
        format!("unknown job id '{job_id}'"),
    )
}

#[cfg(test)]
mod tests {
    use super::CancellationToken;

    #[test]
    fn token_clones_share_cancellation() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
