//! Drives one conversion through the external tool.

use crate::command::{build_ffmpeg_args, EncodeParams};
use crate::error::{Result, SupervisorError};
use crate::process::{ControllableProcess, ProcessLauncher, StatusRead};
use crate::progress::{parse_duration, parse_progress_time, percent_complete};
use crate::signals::ControlSignals;
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Non-progress lines kept for failure reports.
const DIAGNOSTIC_LINES: usize = 20;

/// Upper bound on the exit polling step.
const EXIT_POLL: Duration = Duration::from_millis(50);

/// Polling intervals used by the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorTiming {
    /// Idle step while paused.
    pub pause_poll: Duration,
    /// Longest wait for one status line before re-checking the signals.
    pub read_timeout: Duration,
    /// How long a terminated process may take to exit before it is killed.
    pub termination_grace: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            pause_poll: Duration::from_millis(250),
            read_timeout: Duration::from_millis(200),
            termination_grace: Duration::from_secs(5),
        }
    }
}

/// Owns the external process for the duration of one job.
pub struct Supervisor {
    launcher: Arc<dyn ProcessLauncher>,
    timing: SupervisorTiming,
}

impl Supervisor {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            timing: SupervisorTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: SupervisorTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Convert `source` into `output`, reporting integer percentages to `progress`.
    ///
    /// Percentages are non-decreasing, capped at 99 while running, and 100 is
    /// delivered only after a successful exit. The pause flag suspends the
    /// process itself; the stop flag terminates it and yields
    /// [`SupervisorError::Cancelled`]. No process outlives this call.
    pub fn run(
        &self,
        source: &Path,
        output: &Path,
        params: &EncodeParams,
        progress: &mut dyn FnMut(u8),
        signals: &ControlSignals,
    ) -> Result<()> {
        if !source.exists() {
            return Err(SupervisorError::source_not_found(source));
        }

        let tool = self.launcher.tool_name();
        let total = match self.probe_duration(&tool, source, signals)? {
            Some(secs) if secs > 0.0 => secs,
            _ => {
                warn!(source = %source.display(), "Could not determine duration, progress will be approximate");
                1.0
            }
        };

        let args = build_ffmpeg_args(source, output, params);
        debug!(tool = %tool, args = ?args, "Launching conversion");
        let mut guard = ProcessGuard::new(self.spawn(&tool, &args)?);

        let mut diagnostics = DiagnosticTail::new(DIAGNOSTIC_LINES);
        let mut suspended = false;
        let mut restart_pending = false;
        let mut last_percent = 0u8;

        loop {
            if signals.is_stopped() {
                self.cancel(&mut guard, suspended);
                info!(source = %source.display(), "Conversion cancelled");
                return Err(SupervisorError::Cancelled);
            }

            if signals.is_paused() {
                if !suspended && !restart_pending {
                    if self.launcher.supports_suspend() {
                        guard.get()?.suspend()?;
                        suspended = true;
                        info!(source = %source.display(), "Conversion paused");
                    } else {
                        warn!("Process suspension unsupported, conversion will restart from the beginning on resume");
                        guard.reap(Duration::ZERO);
                        restart_pending = true;
                    }
                }
                std::thread::sleep(self.timing.pause_poll);
                continue;
            }

            if suspended {
                guard.get()?.resume()?;
                suspended = false;
                info!(source = %source.display(), "Conversion resumed");
            }
            if restart_pending {
                guard.replace(self.spawn(&tool, &args)?);
                diagnostics.clear();
                restart_pending = false;
                info!(source = %source.display(), "Conversion restarted");
            }

            match guard.get()?.read_status(self.timing.read_timeout) {
                StatusRead::Line(line) => match parse_progress_time(&line) {
                    Some(elapsed) => {
                        let percent = percent_complete(elapsed, total);
                        if percent > last_percent {
                            last_percent = percent;
                            progress(percent);
                        }
                    }
                    None => diagnostics.push(line),
                },
                StatusRead::Idle => {}
                StatusRead::Closed => break,
            }
        }

        let exit_code = match self.wait_for_exit(&mut guard, signals) {
            Err(SupervisorError::Cancelled) => {
                info!(source = %source.display(), "Conversion cancelled");
                return Err(SupervisorError::Cancelled);
            }
            other => other?,
        };

        match exit_code {
            Some(0) => {
                progress(100);
                Ok(())
            }
            _ if signals.is_stopped() => Err(SupervisorError::Cancelled),
            code => Err(SupervisorError::ExecutionFailed {
                exit_code: code.unwrap_or(-1),
                diagnostics: diagnostics.render(),
            }),
        }
    }

    /// Run the metadata probe and pick the duration out of its output.
    fn probe_duration(
        &self,
        tool: &str,
        source: &Path,
        signals: &ControlSignals,
    ) -> Result<Option<f64>> {
        let process = self
            .launcher
            .probe(source)
            .map_err(|e| SupervisorError::launch_failed(tool, e))?;
        let mut guard = ProcessGuard::new(process);
        let mut duration = None;

        loop {
            if signals.is_stopped() {
                self.cancel(&mut guard, false);
                info!(source = %source.display(), "Cancelled while probing");
                return Err(SupervisorError::Cancelled);
            }
            match guard.get()?.read_status(self.timing.read_timeout) {
                StatusRead::Line(line) => {
                    if duration.is_none() {
                        duration = parse_duration(&line);
                    }
                }
                StatusRead::Idle => {}
                StatusRead::Closed => break,
            }
        }

        self.wait_for_exit(&mut guard, signals)?;
        Ok(duration)
    }

    /// Poll for exit, giving up with `Cancelled` once stop is requested.
    fn wait_for_exit(
        &self,
        guard: &mut ProcessGuard,
        signals: &ControlSignals,
    ) -> Result<Option<i32>> {
        let step = self.timing.read_timeout.min(EXIT_POLL);
        loop {
            if signals.is_stopped() {
                self.cancel(guard, false);
                return Err(SupervisorError::Cancelled);
            }
            let status = guard.get()?.try_wait()?;
            if let Some(code) = status {
                guard.release();
                return Ok(code);
            }
            std::thread::sleep(step);
        }
    }

    /// Terminate the held process and reap it within the grace period.
    fn cancel(&self, guard: &mut ProcessGuard, suspended: bool) {
        if let Some(process) = guard.process.as_deref_mut() {
            // A stopped process may not act on SIGTERM until continued.
            if suspended {
                if let Err(e) = process.resume() {
                    warn!("Failed to resume process before termination: {}", e);
                }
            }
            if let Err(e) = process.terminate() {
                warn!("Failed to terminate process: {}", e);
            }
        }
        guard.reap(self.timing.termination_grace);
    }

    fn spawn(&self, tool: &str, args: &[String]) -> Result<Box<dyn ControllableProcess>> {
        self.launcher
            .spawn(args)
            .map_err(|e| SupervisorError::launch_failed(tool, e))
    }
}

/// Kills the held process on drop unless it has already exited.
struct ProcessGuard {
    process: Option<Box<dyn ControllableProcess>>,
}

impl ProcessGuard {
    fn new(process: Box<dyn ControllableProcess>) -> Self {
        Self {
            process: Some(process),
        }
    }

    fn get(&mut self) -> io::Result<&mut (dyn ControllableProcess + 'static)> {
        self.process
            .as_deref_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no live process"))
    }

    fn replace(&mut self, process: Box<dyn ControllableProcess>) {
        self.reap(Duration::ZERO);
        self.process = Some(process);
    }

    /// Forget a process that has been waited on.
    fn release(&mut self) {
        self.process = None;
    }

    /// Wait up to `grace` for exit, then kill and wait.
    fn reap(&mut self, grace: Duration) {
        let Some(mut process) = self.process.take() else {
            return;
        };
        let deadline = Instant::now() + grace;
        loop {
            match process.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                _ => break,
            }
        }
        if let Err(e) = process.kill() {
            warn!("Failed to kill process: {}", e);
        }
        let _ = process.wait();
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.reap(Duration::ZERO);
    }
}

struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn clear(&mut self) {
        self.lines.clear();
    }

    fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::FfmpegLauncher;
    use crate::testing::{ScriptedLauncher, ScriptedRun};
    use assert_matches::assert_matches;
    use std::path::PathBuf;
    use std::sync::mpsc;
    use std::thread;

    fn fast_timing() -> SupervisorTiming {
        SupervisorTiming {
            pause_poll: Duration::from_millis(5),
            read_timeout: Duration::from_millis(5),
            termination_grace: Duration::from_millis(50),
        }
    }

    fn source_file() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".mkv").tempfile().unwrap();
        std::fs::write(file.path(), b"not really video").unwrap();
        file
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_missing_source_spawns_nothing() {
        let launcher = ScriptedLauncher::new(Some(100));
        let supervisor = Supervisor::new(Arc::new(launcher.clone()));
        let result = supervisor.run(
            Path::new("/definitely/not/here.mkv"),
            Path::new("/tmp/out.mp4"),
            &EncodeParams::default(),
            &mut |_: u8| {},
            &ControlSignals::default(),
        );
        assert_matches!(result, Err(SupervisorError::SourceNotFound { .. }));
        assert_eq!(launcher.probe_count(), 0);
        assert_eq!(launcher.spawn_count(), 0);
    }

    #[test]
    fn test_missing_tool_is_launch_failure() {
        let source = source_file();
        let supervisor = Supervisor::new(Arc::new(ScriptedLauncher::missing_tool()));
        let result = supervisor.run(
            source.path(),
            Path::new("/tmp/out.mp4"),
            &EncodeParams::default(),
            &mut |_: u8| {},
            &ControlSignals::default(),
        );
        assert_matches!(result, Err(SupervisorError::LaunchFailed { .. }));
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let source = source_file();
        let launcher = ScriptedLauncher::new(Some(100));
        let (run, probe) = ScriptedRun::completed(
            &[
                "Stream mapping:",
                "frame=1 time=00:00:10.00 bitrate=1k",
                "frame=2 time=00:00:40.00 bitrate=1k",
                "frame=3 time=00:00:30.00 bitrate=1k",
                "frame=4 time=00:01:40.00 bitrate=1k",
            ],
            0,
        );
        launcher.push_run(run);

        let supervisor = Supervisor::new(Arc::new(launcher)).with_timing(fast_timing());
        let params = EncodeParams {
            video_bitrate: Some("2M".to_string()),
            fps: Some(25),
            ..Default::default()
        };
        let mut seen = Vec::new();
        supervisor
            .run(
                source.path(),
                Path::new("/tmp/out.mp4"),
                &params,
                &mut |p: u8| seen.push(p),
                &ControlSignals::default(),
            )
            .unwrap();

        assert_eq!(seen, vec![10, 40, 99, 100]);
        let args = probe.snapshot().args;
        assert_eq!(args[0], "-y");
        assert!(args.windows(2).any(|w| w == ["-b:v", "2M"]));
        assert!(args.windows(2).any(|w| w == ["-r", "25"]));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_nonzero_exit_reports_code_and_diagnostics() {
        let source = source_file();
        let launcher = ScriptedLauncher::new(Some(100));
        let (run, _probe) =
            ScriptedRun::completed(&["in.mkv: Invalid data found when processing input"], 1);
        launcher.push_run(run);

        let supervisor = Supervisor::new(Arc::new(launcher)).with_timing(fast_timing());
        let result = supervisor.run(
            source.path(),
            Path::new("/tmp/out.mp4"),
            &EncodeParams::default(),
            &mut |_: u8| {},
            &ControlSignals::default(),
        );
        assert_matches!(
            result,
            Err(SupervisorError::ExecutionFailed { exit_code: 1, ref diagnostics })
                if diagnostics.contains("Invalid data")
        );
    }

    #[test]
    fn test_unknown_duration_still_completes() {
        let source = source_file();
        let launcher = ScriptedLauncher::new(None);
        let (run, _probe) = ScriptedRun::completed(&["frame=1 time=00:00:05.00"], 0);
        launcher.push_run(run);

        let supervisor = Supervisor::new(Arc::new(launcher)).with_timing(fast_timing());
        let mut seen = Vec::new();
        supervisor
            .run(
                source.path(),
                Path::new("/tmp/out.mp4"),
                &EncodeParams::default(),
                &mut |p: u8| seen.push(p),
                &ControlSignals::default(),
            )
            .unwrap();
        assert_eq!(seen, vec![99, 100]);
    }

    #[test]
    fn test_pause_suspends_and_resume_continues() {
        let source = source_file();
        let launcher = ScriptedLauncher::new(Some(100));
        let (run, handle) = ScriptedRun::interactive();
        launcher.push_run(run);

        let signals = Arc::new(ControlSignals::default());
        let (tx, rx) = mpsc::channel();
        let worker = {
            let signals = signals.clone();
            let path = source.path().to_path_buf();
            thread::spawn(move || {
                let supervisor = Supervisor::new(Arc::new(launcher)).with_timing(fast_timing());
                supervisor.run(
                    &path,
                    Path::new("/tmp/out.mp4"),
                    &EncodeParams::default(),
                    &mut |p: u8| {
                        let _ = tx.send(p);
                    },
                    &signals,
                )
            })
        };

        handle.progress(40);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 40);

        signals.pause();
        wait_until(|| handle.probe().snapshot().suspended);
        let reads_at_pause = handle.probe().snapshot().reads;

        // Output produced while suspended is not consumed.
        handle.progress(60);
        thread::sleep(Duration::from_millis(50));
        let record = handle.probe().snapshot();
        assert_eq!(record.reads, reads_at_pause);
        assert_eq!(record.reads_while_suspended, 0);
        assert!(rx.try_recv().is_err());

        signals.resume();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 60);
        handle.exit(0);

        worker.join().unwrap().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 100);
        let record = handle.probe().snapshot();
        assert_eq!(record.suspend_calls, 1);
        assert_eq!(record.resume_calls, 1);
        assert!(!record.terminated);
    }

    #[test]
    fn test_stop_while_paused_resumes_then_terminates() {
        let source = source_file();
        let launcher = ScriptedLauncher::new(Some(100));
        let (run, handle) = ScriptedRun::interactive();
        launcher.push_run(run);

        let signals = Arc::new(ControlSignals::default());
        let worker = {
            let signals = signals.clone();
            let path = source.path().to_path_buf();
            thread::spawn(move || {
                let supervisor = Supervisor::new(Arc::new(launcher)).with_timing(fast_timing());
                supervisor.run(
                    &path,
                    Path::new("/tmp/out.mp4"),
                    &EncodeParams::default(),
                    &mut |_: u8| {},
                    &signals,
                )
            })
        };

        handle.progress(10);
        signals.pause();
        wait_until(|| handle.probe().snapshot().suspended);
        signals.stop();

        let result = worker.join().unwrap();
        assert_matches!(result, Err(SupervisorError::Cancelled));
        let record = handle.probe().snapshot();
        assert!(record.terminated);
        assert!(!record.terminated_while_suspended);
        assert_eq!(record.resume_calls, 1);
    }

    #[test]
    fn test_without_suspend_pause_restarts_conversion() {
        let source = source_file();
        let launcher = ScriptedLauncher::new(Some(100)).without_suspend();
        let (first, first_handle) = ScriptedRun::interactive();
        let (second, second_handle) = ScriptedRun::interactive();
        launcher.push_run(first);
        launcher.push_run(second);

        let signals = Arc::new(ControlSignals::default());
        let (tx, rx) = mpsc::channel();
        let worker = {
            let signals = signals.clone();
            let launcher = launcher.clone();
            let path = source.path().to_path_buf();
            thread::spawn(move || {
                let supervisor = Supervisor::new(Arc::new(launcher)).with_timing(fast_timing());
                supervisor.run(
                    &path,
                    Path::new("/tmp/out.mp4"),
                    &EncodeParams::default(),
                    &mut |p: u8| {
                        let _ = tx.send(p);
                    },
                    &signals,
                )
            })
        };

        first_handle.progress(50);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 50);
        signals.pause();
        wait_until(|| first_handle.probe().snapshot().killed);
        signals.resume();

        // The restarted run begins again from zero; lower values are not reported.
        second_handle.progress(20);
        second_handle.progress(70);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 70);
        second_handle.exit(0);

        worker.join().unwrap().unwrap();
        assert_eq!(launcher.spawn_count(), 2);
        assert_eq!(first_handle.probe().snapshot().suspend_calls, 0);
    }

    #[test]
    fn test_stop_during_duration_lookup_cancels_without_spawning() {
        let source = source_file();
        let launcher = ScriptedLauncher::new(Some(100));
        let (probe_run, probe_handle) = ScriptedRun::interactive();
        launcher.push_probe_run(probe_run);

        let signals = Arc::new(ControlSignals::default());
        let worker = {
            let signals = signals.clone();
            let launcher = launcher.clone();
            let path = source.path().to_path_buf();
            thread::spawn(move || {
                let supervisor = Supervisor::new(Arc::new(launcher)).with_timing(fast_timing());
                supervisor.run(
                    &path,
                    Path::new("/tmp/out.mp4"),
                    &EncodeParams::default(),
                    &mut |_: u8| {},
                    &signals,
                )
            })
        };

        // The probe prints its header and then stalls on the input.
        probe_handle.line("Input #0, matroska,webm, from 'in.mkv':");
        wait_until(|| probe_handle.probe().snapshot().reads > 1);
        signals.stop();

        let result = worker.join().unwrap();
        assert_matches!(result, Err(SupervisorError::Cancelled));
        assert!(probe_handle.probe().snapshot().terminated);
        assert_eq!(launcher.probe_count(), 1);
        assert_eq!(launcher.spawn_count(), 0);
    }

    /// Write an executable shell script standing in for ffmpeg.
    #[cfg(unix)]
    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Run the supervisor against `tool`, request stop after a short delay
    /// and return the result with the time taken to honor the stop.
    #[cfg(unix)]
    fn stop_after_delay(tool: PathBuf) -> (Result<()>, Duration) {
        let source = source_file();
        let out_dir = tempfile::tempdir().unwrap();
        let output = out_dir.path().join("out.mp4");
        let signals = Arc::new(ControlSignals::default());
        let worker = {
            let signals = signals.clone();
            let path = source.path().to_path_buf();
            thread::spawn(move || {
                let supervisor =
                    Supervisor::new(Arc::new(FfmpegLauncher::new(tool))).with_timing(fast_timing());
                supervisor.run(
                    &path,
                    &output,
                    &EncodeParams::default(),
                    &mut |_: u8| {},
                    &signals,
                )
            })
        };

        thread::sleep(Duration::from_millis(200));
        let requested = Instant::now();
        signals.stop();
        let result = worker.join().unwrap();
        (result, requested.elapsed())
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_interrupts_hung_duration_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let tool = fake_tool(dir.path(), "exec sleep 30");

        let (result, elapsed) = stop_after_delay(tool);
        assert_matches!(result, Err(SupervisorError::Cancelled));
        assert!(elapsed < Duration::from_secs(5), "stop took {elapsed:?}");
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_interrupts_wait_after_stream_closes() {
        let dir = tempfile::tempdir().unwrap();
        // Answers the probe, then closes stderr during conversion and never exits.
        let tool = fake_tool(
            dir.path(),
            "if [ \"$1\" = \"-hide_banner\" ]; then\n  echo '  Duration: 00:01:40.00, start: 0.000000' >&2\n  exit 1\nfi\nexec 2>&-\nexec sleep 30",
        );

        let (result, elapsed) = stop_after_delay(tool);
        assert_matches!(result, Err(SupervisorError::Cancelled));
        assert!(elapsed < Duration::from_secs(5), "stop took {elapsed:?}");
    }
}
