use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::QueueError;

/// Identifier of the single recurring scan job
pub const TICK_JOB_ID: &str = "maintenance-tick";

/// Which edge of a maintenance window a job announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Start,
    End,
}

impl Boundary {
    pub fn as_str(&self) -> &'static str {
        match self {
            Boundary::Start => "start",
            Boundary::End => "end",
        }
    }
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Announce a window boundary to the window's monitors
    Notify { boundary: Boundary, window_id: Uuid },
    /// Scan for upcoming boundaries
    Tick,
}

/// A named unit of delayed work
///
/// The id is derived from what the job does, so scheduling the same boundary
/// twice yields the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
}

impl Job {
    pub fn notify(boundary: Boundary, window_id: Uuid) -> Self {
        Self {
            id: format!("notify-{}-{}", boundary.as_str(), window_id),
            kind: JobKind::Notify { boundary, window_id },
        }
    }

    pub fn tick() -> Self {
        Self { id: TICK_JOB_ID.to_string(), kind: JobKind::Tick }
    }
}

/// Outcome of scheduling a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Scheduled,
    /// A job with the same id is already pending; nothing changed
    Duplicate,
}

/// Delayed-job facility with idempotent job ids
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Run `job` once after `delay`
    async fn schedule(&self, job: Job, delay: Duration) -> Result<Enqueued, QueueError>;

    /// Run `job` every `every`, first run one period from now
    async fn schedule_recurring(&self, job: Job, every: Duration) -> Result<Enqueued, QueueError>;

    /// Drop every pending job, one-shot and recurring. Returns how many were dropped.
    async fn clear(&self) -> Result<usize, QueueError>;
}

struct PendingJob {
    handle: JoinHandle<()>,
    delay: Duration,
}

/// In-process `JobQueue` backed by tokio timers
///
/// Due jobs are delivered on the channel returned by `new`. Pending jobs live
/// only as long as the process.
pub struct LocalJobQueue {
    pending: Arc<Mutex<HashMap<String, PendingJob>>>,
    tx: mpsc::UnboundedSender<Job>,
}

impl LocalJobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { pending: Arc::new(Mutex::new(HashMap::new())), tx }, rx)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, PendingJob>>, QueueError> {
        self.pending.lock().map_err(|_| QueueError::Backend("job table lock poisoned".to_string()))
    }

    /// Ids of jobs waiting to run, sorted
    pub fn pending(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .pending
            .lock()
            .map(|jobs| jobs.iter().filter(|(_, j)| !j.handle.is_finished()).map(|(id, _)| id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Delay a pending job was scheduled with
    pub fn scheduled_delay(&self, id: &str) -> Option<Duration> {
        self.pending.lock().ok()?.get(id).map(|job| job.delay)
    }

    fn insert_unless_pending(
        &self,
        job: &Job,
        delay: Duration,
        spawn: impl FnOnce() -> JoinHandle<()>,
    ) -> Result<Enqueued, QueueError> {
        if self.tx.is_closed() {
            return Err(QueueError::Closed);
        }

        let mut pending = self.lock()?;
        if pending.get(&job.id).is_some_and(|existing| !existing.handle.is_finished()) {
            debug!(job = %job.id, "Job already scheduled");
            return Ok(Enqueued::Duplicate);
        }

        // The spawned task can't remove itself before this insert: it needs the same lock
        pending.insert(job.id.clone(), PendingJob { handle: spawn(), delay });
        Ok(Enqueued::Scheduled)
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn schedule(&self, job: Job, delay: Duration) -> Result<Enqueued, QueueError> {
        let pending = self.pending.clone();
        let tx = self.tx.clone();
        let fired = job.clone();

        let outcome = self.insert_unless_pending(&job, delay, move || {
            tokio::spawn(async move {
                sleep(delay).await;
                if let Ok(mut pending) = pending.lock() {
                    pending.remove(&fired.id);
                }
                if tx.send(fired).is_err() {
                    debug!("Job receiver dropped, discarding fired job");
                }
            })
        })?;

        if outcome == Enqueued::Scheduled {
            debug!(job = %job.id, delay_ms = delay.as_millis() as u64, "Scheduled job");
        }
        Ok(outcome)
    }

    async fn schedule_recurring(&self, job: Job, every: Duration) -> Result<Enqueued, QueueError> {
        let every = every.max(Duration::from_millis(1));
        let tx = self.tx.clone();
        let fired = job.clone();

        let outcome = self.insert_unless_pending(&job, every, move || {
            tokio::spawn(async move {
                let mut timer = interval_at(Instant::now() + every, every);
                loop {
                    timer.tick().await;
                    if tx.send(fired.clone()).is_err() {
                        break;
                    }
                }
            })
        })?;

        if outcome == Enqueued::Scheduled {
            info!(job = %job.id, every_secs = every.as_secs(), "Scheduled recurring job");
        }
        Ok(outcome)
    }

    async fn clear(&self) -> Result<usize, QueueError> {
        let mut pending = self.lock()?;
        let count = pending.len();
        for (_, job) in pending.drain() {
            job.handle.abort();
        }
        Ok(count)
    }
}
