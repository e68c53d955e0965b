pub mod settle;

pub use settle::is_file_ready;

use crate::config::{Settings, SettingsSource};
use crate::service::ConverterService;
use crate::state::{Job, JobSource};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Longest single sleep while waiting for the next scan, so shutdown is noticed promptly.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Polls the configured hot folder and enqueues files once they are fully written.
pub struct HotFolderWatcher {
    service: ConverterService,
    settings: Arc<dyn SettingsSource>,
    /// Every source path ever enqueued by this watcher, plus the output
    /// paths of those jobs. Never pruned.
    processed: HashSet<PathBuf>,
    interval: Duration,
    readiness_delay: Duration,
}

impl HotFolderWatcher {
    pub fn new(service: ConverterService, settings: Arc<dyn SettingsSource>) -> Self {
        let interval = service.options().watch_interval;
        let readiness_delay = service.options().readiness_delay;
        Self {
            interval,
            readiness_delay,
            service,
            settings,
            processed: HashSet::new(),
        }
    }

    /// Scan every interval until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        tracing::info!("Hot folder watcher started");
        while !shutdown.load(Ordering::SeqCst) {
            self.scan_once();

            let deadline = Instant::now() + self.interval;
            while !shutdown.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
            }
        }
        tracing::info!("Hot folder watcher stopped");
    }

    /// Run one scan cycle. Returns the number of jobs enqueued.
    pub fn scan_once(&mut self) -> usize {
        let settings = self.settings.snapshot();
        if !settings.hot_folder_enabled {
            return 0;
        }
        let folder = settings.hot_folder_path.clone();
        if !folder.is_dir() {
            tracing::debug!("Hot folder is not a directory: {:?}", folder);
            return 0;
        }

        let mut added = 0;
        for entry in WalkDir::new(&folder).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Failed to read hot folder {:?}: {}", folder, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if !is_media_file(&path, &settings.hot_folder_extensions) {
                continue;
            }
            // Conversion outputs land here when the output directory is the hot folder.
            if self.processed.contains(&path)
                || self.service.contains_source(&path)
                || self.service.contains_output(&path)
            {
                continue;
            }
            if !is_file_ready(&path, self.readiness_delay) {
                tracing::debug!("File not ready yet: {:?}", path);
                continue;
            }

            if self.enqueue(&folder, path, &settings) {
                added += 1;
            }
        }

        added
    }

    fn enqueue(&mut self, folder: &Path, path: PathBuf, settings: &Settings) -> bool {
        let job = Job::new(
            path.clone(),
            settings.output_path.clone(),
            settings.default_profile.clone(),
            JobSource::HotFolder {
                watch_path: folder.display().to_string(),
            },
        );
        let output = job.output_path();
        if output == path {
            tracing::warn!("Skipping {:?}: output would overwrite the source", path);
            self.processed.insert(path);
            return false;
        }

        let id = self.service.enqueue(job);
        tracing::info!("Queued hot folder job {} for: {:?}", id, path);
        self.processed.insert(path);
        self.processed.insert(output);

        if !self.service.is_running() && self.service.start_processing() {
            tracing::info!("Started worker for hot folder job");
        }
        true
    }
}

/// Check if a file has a media extension
pub fn is_media_file(path: &Path, extensions: &[String]) -> bool {
    if let Some(ext) = path.extension() {
        let ext_str = ext.to_string_lossy().to_lowercase();

        if extensions.is_empty() {
            // Default media extensions
            let default_exts = [
                "mkv", "mp4", "avi", "mov", "wmv", "m4v", "ts", "m2ts", "webm", "flv", "mpg",
                "mpeg",
            ];
            return default_exts.contains(&ext_str.as_str());
        }

        return extensions
            .iter()
            .any(|e| e.trim_start_matches('.').to_lowercase() == ext_str);
    }
    false
}
