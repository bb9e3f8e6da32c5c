//! FIFO job queue with a single-flight gate.
//!
//! The [`JobQueue`] accepts [`TranscodeRequest`] submissions and hands them,
//! one at a time and in submission order, to a [`JobExecutor`] running in a
//! spawned background task. At most one job is running at any moment; the
//! gate is released when that job reaches a terminal state, whatever the
//! outcome.
//!
//! # Example
//!
//! ```rust,ignore
//! let queue = JobQueue::new(executor, events, QueueOptions::default());
//! let ticket = queue.submit(TranscodeRequest::new(bytes, "a.mp4", "a.mp3", args));
//! let artifact = ticket.wait().await?;
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transforge_common::{EventBus, EventPayload, JobId, JobState, Result, TranscodeError};

use super::executor::JobExecutor;
use super::packager::{package_result, Artifact};
use super::request::TranscodeRequest;

type Reply = oneshot::Sender<Result<Artifact>>;

/// Queue tuning.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Applied to requests that carry no timeout.
    pub default_timeout: Option<Duration>,
    /// Number of terminal job states retained for [`JobQueue::status`].
    pub history_limit: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            default_timeout: None,
            history_limit: 256,
        }
    }
}

/// Result of [`JobQueue::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued and has been removed without running.
    Withdrawn,
    /// The job is running; it finishes, then its result is discarded.
    Advisory,
    /// No queued or running job has this id, or a timeout already
    /// resolved it.
    NotFound,
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobTicket {
    id: JobId,
    receiver: oneshot::Receiver<Result<Artifact>>,
}

impl JobTicket {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job's outcome.
    pub async fn wait(self) -> Result<Artifact> {
        self.receiver
            .await
            .unwrap_or(Err(TranscodeError::Cancelled))
    }
}

struct PendingJob {
    id: JobId,
    request: TranscodeRequest,
    reply: Reply,
}

struct RunningJob {
    id: JobId,
    reply: Option<Reply>,
    cancelled: bool,
    timed_out: bool,
}

struct QueueState {
    pending: VecDeque<PendingJob>,
    running: Option<RunningJob>,
    states: HashMap<JobId, JobState>,
    finished: VecDeque<JobId>,
    history_limit: usize,
    /// Timeout watchers of jobs not yet terminal.
    timers: HashMap<JobId, CancellationToken>,
}

impl QueueState {
    fn record_terminal(&mut self, id: JobId, state: JobState) {
        if let Some(timer) = self.timers.remove(&id) {
            timer.cancel();
        }
        self.states.insert(id, state);
        self.finished.push_back(id);
        while self.finished.len() > self.history_limit {
            if let Some(old) = self.finished.pop_front() {
                self.states.remove(&old);
            }
        }
    }

    fn withdraw(&mut self, id: JobId) -> Option<PendingJob> {
        let index = self.pending.iter().position(|job| job.id == id)?;
        self.pending.remove(index)
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    notify: Notify,
    executor: JobExecutor,
    events: Arc<EventBus>,
    shutdown: CancellationToken,
    default_timeout: Option<Duration>,
}

/// Serializes transcode jobs against one engine.
///
/// The worker task runs until [`shutdown`](Self::shutdown) is called or the
/// queue is dropped.
pub struct JobQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobQueue {
    /// Create a queue and spawn its worker. Must be called within a Tokio
    /// runtime.
    pub fn new(executor: JobExecutor, events: Arc<EventBus>, options: QueueOptions) -> Self {
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                running: None,
                states: HashMap::new(),
                finished: VecDeque::new(),
                history_limit: options.history_limit.max(1),
                timers: HashMap::new(),
            }),
            notify: Notify::new(),
            executor,
            events,
            shutdown: CancellationToken::new(),
            default_timeout: options.default_timeout,
        });

        let worker = tokio::spawn(process_jobs(Arc::clone(&inner)));

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    pub fn executor(&self) -> &JobExecutor {
        &self.inner.executor
    }

    /// Enqueue `request`. Never blocks; the returned ticket resolves once the
    /// job reaches a terminal state.
    pub fn submit(&self, request: TranscodeRequest) -> JobTicket {
        let id = JobId::new();
        let (reply, receiver) = oneshot::channel();
        let ticket = JobTicket { id, receiver };

        if self.inner.shutdown.is_cancelled() {
            warn!(job_id = %id, "Queue is shut down; rejecting job");
            let _ = reply.send(Err(TranscodeError::Cancelled));
            return ticket;
        }

        let timeout = request.timeout.or(self.inner.default_timeout);
        let input_name = request.input_name.clone();

        let timer = timeout.map(|budget| (budget, self.inner.shutdown.child_token()));

        // Jobs ahead of this one, including the running job.
        let position = {
            let mut state = self.inner.state.lock();
            let ahead = state.pending.len() + usize::from(state.running.is_some());
            state.states.insert(id, JobState::Queued);
            state.pending.push_back(PendingJob { id, request, reply });
            if let Some((_, token)) = &timer {
                state.timers.insert(id, token.clone());
            }
            ahead
        };

        info!(job_id = %id, input = %input_name, position, "Job queued");
        self.inner
            .events
            .broadcast(EventPayload::JobQueued { job_id: id, position });
        self.inner.notify.notify_one();

        if let Some((budget, token)) = timer {
            tokio::spawn(watch_timeout(Arc::downgrade(&self.inner), token, id, budget));
        }

        ticket
    }

    /// Cancel a job.
    ///
    /// A queued job is removed and resolved with `Cancelled` without ever
    /// reaching the engine. A running job cannot be interrupted: it runs to
    /// completion, then resolves with `Cancelled` instead of its result.
    pub fn cancel(&self, id: JobId) -> CancelOutcome {
        let mut state = self.inner.state.lock();

        if let Some(job) = state.withdraw(id) {
            state.record_terminal(id, JobState::Cancelled);
            drop(state);
            info!(job_id = %id, "Queued job withdrawn");
            let _ = job.reply.send(Err(TranscodeError::Cancelled));
            self.inner.events.broadcast(EventPayload::JobCancelled {
                job_id: id,
                was_running: false,
            });
            return CancelOutcome::Withdrawn;
        }

        match state.running.as_mut() {
            // A timed-out job's caller has already been answered.
            Some(running) if running.id == id && !running.timed_out => {
                running.cancelled = true;
                info!(job_id = %id, "Running job marked cancelled");
                CancelOutcome::Advisory
            }
            _ => CancelOutcome::NotFound,
        }
    }

    /// Current state of a job, if it is known.
    pub fn status(&self, id: JobId) -> Option<JobState> {
        self.inner.state.lock().states.get(&id).copied()
    }

    /// Number of jobs waiting behind the gate.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Number of timeout watchers still armed.
    pub fn armed_timeouts(&self) -> usize {
        self.inner.state.lock().timers.len()
    }

    /// Id of the job holding the gate.
    pub fn running(&self) -> Option<JobId> {
        self.inner.state.lock().running.as_ref().map(|r| r.id)
    }

    /// Stop the worker. Queued jobs resolve with `Cancelled`; a running job
    /// is abandoned and its staged files are reclaimed in the background.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.notify.notify_one();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Queue worker ended abnormally");
            }
        }

        let (drained, running) = {
            let mut state = self.inner.state.lock();
            let drained: Vec<PendingJob> = state.pending.drain(..).collect();
            for job in &drained {
                state.record_terminal(job.id, JobState::Cancelled);
            }
            let running = state.running.take();
            if let Some(job) = &running {
                state.record_terminal(job.id, JobState::Cancelled);
            }
            (drained, running)
        };

        for job in drained {
            let _ = job.reply.send(Err(TranscodeError::Cancelled));
        }
        if let Some(reply) = running.and_then(|job| job.reply) {
            let _ = reply.send(Err(TranscodeError::Cancelled));
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

/// Background loop that hands queued jobs to the executor one at a time.
async fn process_jobs(inner: Arc<QueueInner>) {
    info!("Transcode queue worker started");

    loop {
        let job = loop {
            if inner.shutdown.is_cancelled() {
                info!("Transcode queue worker stopped");
                return;
            }
            if let Some(job) = inner.start_next() {
                break job;
            }
            tokio::select! {
                _ = inner.notify.notified() => {}
                _ = inner.shutdown.cancelled() => {}
            }
        };

        let (id, request) = job;
        info!(job_id = %id, input = %request.input_name, "Job started");
        inner
            .events
            .broadcast(EventPayload::JobStarted { job_id: id });

        let outcome = tokio::select! {
            outcome = inner.executor.execute(id, &request) => outcome,
            _ = inner.shutdown.cancelled() => {
                warn!(job_id = %id, "Shutdown while job was running; abandoning it");
                info!("Transcode queue worker stopped");
                return;
            }
        };

        inner.finish(id, outcome.and_then(package_result));
    }
}

/// Resolve a job with `TimedOut` once `budget` has elapsed since submission.
///
/// `disarm` is cancelled when the job turns terminal or the queue shuts down.
async fn watch_timeout(
    inner: Weak<QueueInner>,
    disarm: CancellationToken,
    id: JobId,
    budget: Duration,
) {
    tokio::select! {
        _ = tokio::time::sleep(budget) => {}
        _ = disarm.cancelled() => return,
    }
    if let Some(inner) = inner.upgrade() {
        inner.expire(id, budget);
    }
}

impl QueueInner {
    fn start_next(&self) -> Option<(JobId, TranscodeRequest)> {
        let mut state = self.state.lock();
        if state.running.is_some() {
            return None;
        }
        let job = state.pending.pop_front()?;
        state.states.insert(job.id, JobState::Running);
        state.running = Some(RunningJob {
            id: job.id,
            reply: Some(job.reply),
            cancelled: false,
            timed_out: false,
        });
        Some((job.id, job.request))
    }

    fn finish(&self, id: JobId, outcome: Result<Artifact>) {
        let (running, terminal) = {
            let mut state = self.state.lock();
            let Some(running) = state.running.take().filter(|r| r.id == id) else {
                return;
            };
            let terminal = if running.cancelled {
                JobState::Cancelled
            } else if running.timed_out {
                JobState::TimedOut
            } else if outcome.is_ok() {
                JobState::Completed
            } else {
                JobState::Failed
            };
            state.record_terminal(id, terminal);
            (running, terminal)
        };

        let payload = match (&outcome, terminal) {
            (_, JobState::Cancelled) => {
                info!(job_id = %id, "Cancelled job finished; result discarded");
                Some(EventPayload::JobCancelled {
                    job_id: id,
                    was_running: true,
                })
            }
            // The caller was already resolved when the budget expired.
            (_, JobState::TimedOut) => {
                debug!(job_id = %id, "Timed-out job finished; result discarded");
                None
            }
            (Ok(artifact), _) => {
                info!(
                    job_id = %id,
                    output = %artifact.name,
                    size_bytes = artifact.size_bytes(),
                    "Job completed"
                );
                Some(EventPayload::JobCompleted {
                    job_id: id,
                    output_name: artifact.name.clone(),
                    size_bytes: artifact.size_bytes(),
                })
            }
            (Err(e), _) => {
                warn!(job_id = %id, kind = e.kind().as_str(), error = %e, "Job failed");
                Some(EventPayload::JobFailed {
                    job_id: id,
                    kind: e.kind(),
                    error: e.detail(),
                })
            }
        };
        if let Some(payload) = payload {
            self.events.broadcast(payload);
        }

        if let Some(reply) = running.reply {
            let result = match terminal {
                JobState::Cancelled => Err(TranscodeError::Cancelled),
                _ => outcome,
            };
            let _ = reply.send(result);
        }
        self.notify.notify_one();
    }

    fn expire(&self, id: JobId, budget: Duration) {
        let mut state = self.state.lock();

        if let Some(job) = state.withdraw(id) {
            state.record_terminal(id, JobState::TimedOut);
            drop(state);
            warn!(job_id = %id, budget_secs = budget.as_secs_f64(), "Queued job timed out");
            let _ = job.reply.send(Err(TranscodeError::timed_out(budget)));
            self.events.broadcast(EventPayload::JobTimedOut {
                job_id: id,
                was_running: false,
            });
            return;
        }

        let reply = match state.running.as_mut() {
            Some(running) if running.id == id && !running.cancelled => {
                running.timed_out = true;
                running.reply.take()
            }
            _ => None,
        };
        drop(state);

        if let Some(reply) = reply {
            warn!(
                job_id = %id,
                budget_secs = budget.as_secs_f64(),
                "Running job timed out; result will be discarded"
            );
            let _ = reply.send(Err(TranscodeError::timed_out(budget)));
            self.events.broadcast(EventPayload::JobTimedOut {
                job_id: id,
                was_running: true,
            });
        }
    }
}
