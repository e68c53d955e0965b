//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], a [`ConverterService`] wired to a
//! [`ScriptedLauncher`] with shortened polling intervals, plus a scratch
//! directory for source files.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use transcode_av::testing::{ProcessProbe, RunHandle, ScriptedLauncher, ScriptedRun};
use transcode_common::JobId;
use transcode_queue::config::ServiceOptions;
use transcode_queue::{ConverterService, Job};

/// Media duration reported by the scripted probe, in seconds.
pub const DURATION_SECS: u32 = 100;

pub fn fast_options() -> ServiceOptions {
    ServiceOptions {
        pause_poll: Duration::from_millis(10),
        read_timeout: Duration::from_millis(10),
        termination_grace: Duration::from_secs(1),
        watch_interval: Duration::from_millis(50),
        readiness_delay: Duration::from_millis(50),
        ..Default::default()
    }
}

/// A progress line for `seconds` of encoded media.
pub fn progress_line(seconds: u32) -> String {
    format!(
        "frame={} fps=25 q=28.0 size=512kB time=00:{:02}:{:02}.00 bitrate=900.0kbits/s speed=2x",
        seconds * 25,
        seconds / 60,
        seconds % 60
    )
}

pub struct TestHarness {
    pub service: ConverterService,
    pub launcher: ScriptedLauncher,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_launcher(ScriptedLauncher::new(Some(DURATION_SECS)))
    }

    pub fn with_launcher(launcher: ScriptedLauncher) -> Self {
        let service = ConverterService::new(Arc::new(launcher.clone()), fast_options());
        Self {
            service,
            launcher,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    /// Create a non-empty source file.
    pub fn source(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"source media bytes").unwrap();
        path
    }

    /// Queue a job for an existing source file.
    pub fn add(&self, name: &str) -> JobId {
        let source = self.source(name);
        self.service
            .add_job(source, self.output_dir(), Default::default())
    }

    /// Queue a run that succeeds after reporting 50%.
    pub fn push_success(&self) -> ProcessProbe {
        let line = progress_line(DURATION_SECS / 2);
        let (run, probe) = ScriptedRun::completed(&[&line], 0);
        self.launcher.push_run(run);
        probe
    }

    /// Queue a run driven from the test.
    pub fn push_interactive(&self) -> RunHandle {
        let (run, handle) = ScriptedRun::interactive();
        self.launcher.push_run(run);
        handle
    }

    pub fn job(&self, id: JobId) -> Job {
        self.service.get_job(id).expect("job should be in the queue")
    }

    pub fn wait_for(&self, what: &str, mut condition: impl FnMut(&ConverterService) -> bool) {
        wait_until(what, || condition(&self.service));
    }
}

/// Poll `condition` until it holds, panicking after five seconds.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}
