mod types;

pub use types::*;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::broadcast;
use transcode_common::JobId;

/// Queue change notification.
///
/// Events are fire-and-forget: sending with no subscriber is not an error,
/// and a lagging subscriber loses the oldest events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job has been added to the queue.
    JobQueued {
        #[serde(flatten)]
        job: Job,
    },
    /// The worker has picked up a job.
    JobStarted { id: JobId },
    /// A running job's progress has increased.
    JobProgress { id: JobId, progress: u8 },
    /// A job finished successfully.
    JobCompleted { id: JobId },
    /// A job failed.
    JobFailed { id: JobId, error: String },
    /// A running job was stopped.
    JobCancelled { id: JobId },
    /// A job was removed by request.
    JobRemoved { id: JobId },
    /// Every non-running job was removed.
    QueueCleared { removed: usize },
}

/// FIFO-by-insertion collection of jobs.
///
/// Every read and mutation goes through one lock, so the controller, the
/// worker and the hot-folder watcher never observe a half-applied change.
pub struct JobQueue {
    jobs: Mutex<Vec<Job>>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            jobs: Mutex::new(Vec::new()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    fn broadcast(&self, event: JobEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("No subscribers for job event");
        }
    }

    /// Append a job and return its id.
    pub fn add(&self, job: Job) -> JobId {
        let id = job.id;
        self.jobs.lock().push(job.clone());
        self.broadcast(JobEvent::JobQueued { job });
        id
    }

    /// Remove a job unless it is running. Unknown ids and running jobs are ignored.
    pub fn remove(&self, id: JobId) -> bool {
        let removed = {
            let mut jobs = self.jobs.lock();
            match jobs.iter().position(|j| j.id == id) {
                Some(idx) if jobs[idx].state != JobState::Running => {
                    jobs.remove(idx);
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.broadcast(JobEvent::JobRemoved { id });
        }
        removed
    }

    /// Remove every job that is not running. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut jobs = self.jobs.lock();
            let before = jobs.len();
            jobs.retain(|j| j.state == JobState::Running);
            before - jobs.len()
        };
        self.broadcast(JobEvent::QueueCleared { removed });
        removed
    }

    /// Ordered copy of the queue.
    pub fn snapshot(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().iter().find(|j| j.id == id).cloned()
    }

    pub fn has_pending(&self) -> bool {
        self.jobs.lock().iter().any(|j| j.state == JobState::Queued)
    }

    pub fn contains_source(&self, path: &Path) -> bool {
        self.jobs.lock().iter().any(|j| j.is_source(path))
    }

    /// Whether any job in the queue writes to `path`.
    pub fn contains_output(&self, path: &Path) -> bool {
        self.jobs.lock().iter().any(|j| j.output_path() == path)
    }

    pub fn stats(&self) -> QueueStats {
        let jobs = self.jobs.lock();
        let mut stats = QueueStats::default();
        for job in jobs.iter() {
            stats.record(job.state);
        }
        stats
    }

    /// Move the first queued job to `Running` and return a copy of it.
    ///
    /// When nothing is queued, `on_empty` runs while the lock is still held,
    /// so a producer that adds a job right afterwards is guaranteed to see
    /// its effect.
    pub fn claim_next(&self, on_empty: impl FnOnce()) -> Option<Job> {
        let job = {
            let mut jobs = self.jobs.lock();
            debug_assert!(
                jobs.iter().all(|j| j.state != JobState::Running),
                "claim_next called while a job is running"
            );
            match jobs.iter_mut().find(|j| j.state == JobState::Queued) {
                Some(job) => {
                    job.start();
                    job.clone()
                }
                None => {
                    on_empty();
                    return None;
                }
            }
        };
        self.broadcast(JobEvent::JobStarted { id: job.id });
        Some(job)
    }

    pub fn update_progress(&self, id: JobId, progress: u8) {
        let changed = {
            let mut jobs = self.jobs.lock();
            match jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => job.update_progress(progress).then_some(job.progress),
                None => None,
            }
        };
        if let Some(progress) = changed {
            self.broadcast(JobEvent::JobProgress { id, progress });
        }
    }

    pub fn complete(&self, id: JobId) {
        if self.apply(id, Job::complete) {
            self.broadcast(JobEvent::JobCompleted { id });
        }
    }

    pub fn fail(&self, id: JobId, error: &str) {
        if self.apply(id, |job| job.fail(error)) {
            self.broadcast(JobEvent::JobFailed {
                id,
                error: error.to_string(),
            });
        }
    }

    pub fn cancel(&self, id: JobId) {
        if self.apply(id, Job::cancel) {
            self.broadcast(JobEvent::JobCancelled { id });
        }
    }

    /// Run a finishing transition. Jobs already in a terminal state are left alone.
    fn apply(&self, id: JobId, f: impl FnOnce(&mut Job)) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) if !job.state.is_terminal() => {
                f(job);
                true
            }
            _ => false,
        }
    }
}
