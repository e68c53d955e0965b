use super::{load_settings, Settings};
use parking_lot::RwLock;
use std::path::PathBuf;

/// Where the hot-folder watcher gets its settings from.
///
/// Called once per watcher cycle so edits take effect without a restart.
pub trait SettingsSource: Send + Sync {
    fn snapshot(&self) -> Settings;
}

/// Re-reads a settings file on every snapshot.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsSource for FileSettings {
    fn snapshot(&self) -> Settings {
        match load_settings(&self.path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Using default settings: {:#}", e);
                Settings::default()
            }
        }
    }
}

/// In-memory settings that can be swapped at runtime.
#[derive(Default)]
pub struct StaticSettings {
    inner: RwLock<Settings>,
}

impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn set(&self, settings: Settings) {
        *self.inner.write() = settings;
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        f(&mut self.inner.write());
    }
}

impl SettingsSource for StaticSettings {
    fn snapshot(&self) -> Settings {
        self.inner.read().clone()
    }
}
