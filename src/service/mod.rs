//! Converter service: owns the job queue and the background worker and watcher threads.

mod worker;

use crate::config::{ServiceOptions, SettingsSource};
use crate::state::{Job, JobEvent, JobQueue, JobSource, QueueStats};
use crate::watch::HotFolderWatcher;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::broadcast;
use transcode_av::{ControlSignals, FfmpegLauncher, ProcessLauncher, Supervisor};
use transcode_common::{FormatProfile, JobId};

pub(crate) struct ServiceInner {
    pub(crate) queue: JobQueue,
    pub(crate) signals: ControlSignals,
    /// Set while a worker thread owns the queue.
    pub(crate) running: AtomicBool,
    pub(crate) supervisor: Supervisor,
    pub(crate) options: ServiceOptions,
    worker: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

/// Control surface for the conversion queue.
///
/// Cheap to clone; all clones share one queue. Every call returns
/// immediately except [`ConverterService::wait_idle`] and
/// [`ConverterService::shutdown`].
#[derive(Clone)]
pub struct ConverterService {
    inner: Arc<ServiceInner>,
}

impl ConverterService {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, options: ServiceOptions) -> Self {
        let supervisor = Supervisor::new(launcher).with_timing(options.supervisor_timing());
        Self {
            inner: Arc::new(ServiceInner {
                queue: JobQueue::new(),
                signals: ControlSignals::default(),
                running: AtomicBool::new(false),
                supervisor,
                options,
                worker: Mutex::new(None),
                watcher: Mutex::new(None),
                shutdown: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Service backed by the real ffmpeg at `options.ffmpeg_path`.
    pub fn with_ffmpeg(options: ServiceOptions) -> Self {
        let launcher = FfmpegLauncher::new(options.ffmpeg_path.clone());
        Self::new(Arc::new(launcher), options)
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.inner.options
    }

    /// Queue a manual conversion of `source` into `output_dir`.
    pub fn add_job(
        &self,
        source: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        profile: FormatProfile,
    ) -> JobId {
        self.enqueue(Job::new(
            source.into(),
            output_dir.into(),
            profile,
            JobSource::Manual,
        ))
    }

    pub fn enqueue(&self, job: Job) -> JobId {
        tracing::debug!(id = %job.id, source = %job.source_path.display(), "Job queued");
        self.inner.queue.add(job)
    }

    /// Remove a job. Running jobs and unknown ids are left alone.
    pub fn remove_job(&self, id: JobId) -> bool {
        self.inner.queue.remove(id)
    }

    /// Remove every job that is not running.
    pub fn clear_queue(&self) -> usize {
        self.inner.queue.clear()
    }

    pub fn has_pending_jobs(&self) -> bool {
        self.inner.queue.has_pending()
    }

    pub fn contains_source(&self, path: &Path) -> bool {
        self.inner.queue.contains_source(path)
    }

    /// Whether a queued or finished job converts into `path`.
    pub fn contains_output(&self, path: &Path) -> bool {
        self.inner.queue.contains_output(path)
    }

    /// Start the worker thread. Returns `false` if one is already running.
    ///
    /// Clears a previous stop request; a pending pause stays in effect.
    pub fn start_processing(&self) -> bool {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.inner.signals.clear_stop();

        let mut slot = self.inner.worker.lock();
        let inner = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name("transcode-worker".to_string())
            .spawn(move || worker::run(&inner));

        match spawned {
            Ok(handle) => {
                // A previous worker has already released the running flag
                // and is only unwinding, so its handle can be detached.
                *slot = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!("Failed to spawn worker thread: {}", e);
                self.inner.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Ask the worker to cancel the running job and exit. Queued jobs stay queued.
    pub fn stop_processing(&self) {
        tracing::info!("Stop requested");
        self.inner.signals.stop();
    }

    /// Suspend the running conversion and hold off new work.
    pub fn pause_processing(&self) {
        tracing::info!("Pause requested");
        self.inner.signals.pause();
    }

    pub fn resume_processing(&self) {
        tracing::info!("Resume requested");
        self.inner.signals.resume();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.signals.is_paused()
    }

    /// Ordered copy of the queue.
    pub fn snapshot(&self) -> Vec<Job> {
        self.inner.queue.snapshot()
    }

    pub fn get_job(&self, id: JobId) -> Option<Job> {
        self.inner.queue.get(id)
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.queue.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.queue.subscribe()
    }

    /// Block until no worker is running.
    pub fn wait_idle(&self) {
        loop {
            let handle = self.inner.worker.lock().take();
            match handle {
                Some(handle) => {
                    if handle.join().is_err() {
                        tracing::error!("Worker thread panicked");
                        self.inner.running.store(false, Ordering::SeqCst);
                    }
                }
                // Started but the handle is not stored yet.
                None if self.is_running() => std::thread::sleep(Duration::from_millis(10)),
                None => return,
            }
        }
    }

    /// Start polling the hot folder described by `settings`.
    ///
    /// The watcher runs until [`ConverterService::shutdown`]. Returns `false`
    /// if a watcher is already running.
    pub fn start_hot_folder(&self, settings: Arc<dyn SettingsSource>) -> bool {
        let mut slot = self.inner.watcher.lock();
        if slot.is_some() {
            return false;
        }

        let mut watcher = HotFolderWatcher::new(self.clone(), settings);
        let shutdown = Arc::clone(&self.inner.shutdown);
        let spawned = std::thread::Builder::new()
            .name("transcode-watcher".to_string())
            .spawn(move || watcher.run(&shutdown));

        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!("Failed to spawn hot folder watcher: {}", e);
                false
            }
        }
    }

    /// Stop the watcher and the worker, and wait for both threads to exit.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.stop_processing();

        let watcher = self.inner.watcher.lock().take();
        if let Some(handle) = watcher {
            if handle.join().is_err() {
                tracing::error!("Hot folder watcher panicked");
            }
        }
        self.wait_idle();
    }
}
