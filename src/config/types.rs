use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use transcode_common::FormatProfile;

/// Persisted user settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Directory converted files are written to.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    #[serde(default)]
    pub hot_folder_enabled: bool,

    #[serde(default)]
    pub hot_folder_path: PathBuf,

    /// Print a notice when a job finishes.
    #[serde(default)]
    pub notifications_enabled: bool,

    /// Extensions picked up from the hot folder. Empty means the built-in media set.
    #[serde(default)]
    pub hot_folder_extensions: Vec<String>,

    #[serde(default)]
    pub default_profile: FormatProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            hot_folder_enabled: false,
            hot_folder_path: PathBuf::new(),
            notifications_enabled: false,
            hot_folder_extensions: Vec::new(),
            default_profile: FormatProfile::default(),
        }
    }
}

fn default_output_path() -> PathBuf {
    expand_path(Path::new("~/Videos"))
}

/// Expand a leading `~` in a configured path.
pub(crate) fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

impl Settings {
    /// Resolve `~` in every configured path.
    pub fn expand_paths(&mut self) {
        self.output_path = expand_path(&self.output_path);
        if !self.hot_folder_path.as_os_str().is_empty() {
            self.hot_folder_path = expand_path(&self.hot_folder_path);
        }
    }
}

/// Timing and tool location for a running service.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Path or name of the ffmpeg executable.
    pub ffmpeg_path: PathBuf,
    /// Worker and supervisor idle step while paused.
    pub pause_poll: Duration,
    /// Longest wait for one status line from the tool.
    pub read_timeout: Duration,
    /// Grace period between terminate and kill.
    pub termination_grace: Duration,
    /// Delay between hot-folder scans.
    pub watch_interval: Duration,
    /// Gap between the two size samples of the readiness check.
    pub readiness_delay: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            pause_poll: Duration::from_millis(250),
            read_timeout: Duration::from_millis(200),
            termination_grace: Duration::from_secs(5),
            watch_interval: Duration::from_secs(3),
            readiness_delay: Duration::from_secs(1),
        }
    }
}

impl ServiceOptions {
    pub fn supervisor_timing(&self) -> transcode_av::SupervisorTiming {
        transcode_av::SupervisorTiming {
            pause_poll: self.pause_poll,
            read_timeout: self.read_timeout,
            termination_grace: self.termination_grace,
        }
    }
}
