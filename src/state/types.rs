use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use transcode_common::{FormatProfile, JobId};

/// One source-file-to-output-file conversion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
    pub profile: FormatProfile,
    pub state: JobState,
    /// Percentage in `0..=100`. Exactly 100 only once [`JobState::Done`].
    pub progress: u8,
    /// Set only in [`JobState::Failed`].
    pub error: Option<String>,
    pub source: JobSource,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

/// What the presentation layer shows for a job.
///
/// Paused is derived from the service's pause flag and is never stored on
/// the job itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayState {
    Queued,
    Running,
    Paused,
    Done,
    Failed,
    Cancelled,
}

impl std::fmt::Display for DisplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DisplayState::Queued => "queued",
            DisplayState::Running => "running",
            DisplayState::Paused => "paused",
            DisplayState::Done => "done",
            DisplayState::Failed => "failed",
            DisplayState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Who submitted the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Manual,
    HotFolder { watch_path: String },
}

impl Job {
    pub fn new(
        source_path: PathBuf,
        output_dir: PathBuf,
        profile: FormatProfile,
        source: JobSource,
    ) -> Self {
        Self {
            id: JobId::new(),
            source_path,
            output_dir,
            profile,
            state: JobState::Queued,
            progress: 0,
            error: None,
            source,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// `<output_dir>/<source stem>.<format>`
    pub fn output_path(&self) -> PathBuf {
        transcode_av::output_path_for(
            &self.source_path,
            &self.output_dir,
            self.profile.normalized_format(),
        )
    }

    pub fn is_source(&self, path: &Path) -> bool {
        self.source_path == path
    }

    pub fn start(&mut self) {
        self.state = JobState::Running;
        self.progress = 0;
        self.error = None;
        self.started_at = Some(Utc::now());
    }

    /// Record a running percentage. Lower values and updates outside
    /// `Running` are ignored; 100 is held back for [`Job::complete`].
    pub fn update_progress(&mut self, progress: u8) -> bool {
        if self.state != JobState::Running {
            return false;
        }
        let progress = progress.min(99);
        if progress <= self.progress {
            return false;
        }
        self.progress = progress;
        true
    }

    pub fn complete(&mut self) {
        self.state = JobState::Done;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.state = JobState::Failed;
        self.error = Some(error.to_string());
        self.completed_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.state = JobState::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Time spent queued before the worker claimed the job.
    pub fn queue_wait(&self) -> Option<chrono::Duration> {
        Some(self.started_at? - self.created_at)
    }

    /// Time from claim to finish, once the job has finished.
    pub fn run_time(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    pub fn display_state(&self, paused: bool) -> DisplayState {
        match self.state {
            JobState::Queued => DisplayState::Queued,
            JobState::Running if paused => DisplayState::Paused,
            JobState::Running => DisplayState::Running,
            JobState::Done => DisplayState::Done,
            JobState::Failed => DisplayState::Failed,
            JobState::Cancelled => DisplayState::Cancelled,
        }
    }
}

/// Per-state counts over the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl QueueStats {
    pub fn record(&mut self, state: JobState) {
        self.total += 1;
        match state {
            JobState::Queued => self.queued += 1,
            JobState::Running => self.running += 1,
            JobState::Done => self.done += 1,
            JobState::Failed => self.failed += 1,
            JobState::Cancelled => self.cancelled += 1,
        }
    }
}
