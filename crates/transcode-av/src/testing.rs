//! Scripted process double for exercising the supervisor without ffmpeg.
//!
//! Each spawn consumes one [`ScriptedRun`]. A run either carries its whole
//! output up front or is driven line by line through a [`RunHandle`]. The
//! shared [`ProcessProbe`] records every control call so tests can assert
//! that a paused process was really suspended and never read from.

use crate::process::{ControllableProcess, ProcessLauncher, StatusRead};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

enum ScriptEvent {
    Line(String),
    Exit(i32),
}

/// What a fake process observed.
#[derive(Debug, Default, Clone)]
pub struct ProcessRecord {
    pub args: Vec<String>,
    pub suspended: bool,
    pub suspend_calls: usize,
    pub resume_calls: usize,
    pub terminated: bool,
    pub terminated_while_suspended: bool,
    pub killed: bool,
    pub reads: usize,
    pub reads_while_suspended: usize,
}

/// Shared view of one fake process.
#[derive(Debug, Clone, Default)]
pub struct ProcessProbe(Arc<Mutex<ProcessRecord>>);

impl ProcessProbe {
    pub fn snapshot(&self) -> ProcessRecord {
        self.0.lock().clone()
    }
}

/// Test-side controls for an interactive run.
#[derive(Clone)]
pub struct RunHandle {
    tx: Sender<ScriptEvent>,
    probe: ProcessProbe,
}

impl RunHandle {
    /// Emit one status line.
    pub fn line(&self, line: impl Into<String>) {
        let _ = self.tx.send(ScriptEvent::Line(line.into()));
    }

    /// Emit a progress line for `seconds` of encoded media.
    pub fn progress(&self, seconds: u32) {
        self.line(format!(
            "frame={} fps=25 q=28.0 size=1024kB time={:02}:{:02}:{:02}.00 bitrate=800.0kbits/s speed=1x",
            seconds * 25,
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60
        ));
    }

    /// Close the stream and exit with `code`.
    pub fn exit(&self, code: i32) {
        let _ = self.tx.send(ScriptEvent::Exit(code));
    }

    pub fn probe(&self) -> &ProcessProbe {
        &self.probe
    }
}

/// One scripted invocation.
pub struct ScriptedRun {
    rx: Receiver<ScriptEvent>,
    probe: ProcessProbe,
}

impl ScriptedRun {
    /// A run whose entire output is known up front.
    pub fn completed(lines: &[&str], exit_code: i32) -> (Self, ProcessProbe) {
        let (tx, rx) = mpsc::channel();
        for line in lines {
            let _ = tx.send(ScriptEvent::Line((*line).to_string()));
        }
        let _ = tx.send(ScriptEvent::Exit(exit_code));
        let probe = ProcessProbe::default();
        (
            Self {
                rx,
                probe: probe.clone(),
            },
            probe,
        )
    }

    /// A run driven from the test through the returned handle.
    pub fn interactive() -> (Self, RunHandle) {
        let (tx, rx) = mpsc::channel();
        let probe = ProcessProbe::default();
        (
            Self {
                rx,
                probe: probe.clone(),
            },
            RunHandle { tx, probe },
        )
    }
}

struct ScriptedProcess {
    rx: Receiver<ScriptEvent>,
    probe: ProcessProbe,
    exit_code: Option<i32>,
    closed: bool,
}

impl ScriptedProcess {
    fn from_run(run: ScriptedRun) -> Self {
        Self {
            rx: run.rx,
            probe: run.probe,
            exit_code: None,
            closed: false,
        }
    }

    fn dead(&self) -> bool {
        let record = self.probe.0.lock();
        record.terminated || record.killed
    }
}

impl ControllableProcess for ScriptedProcess {
    fn read_status(&mut self, timeout: Duration) -> StatusRead {
        {
            let mut record = self.probe.0.lock();
            record.reads += 1;
            if record.suspended {
                record.reads_while_suspended += 1;
            }
        }
        if self.closed || self.dead() {
            self.closed = true;
            return StatusRead::Closed;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(ScriptEvent::Line(line)) => StatusRead::Line(line),
            Ok(ScriptEvent::Exit(code)) => {
                self.exit_code = Some(code);
                self.closed = true;
                StatusRead::Closed
            }
            Err(RecvTimeoutError::Timeout) => StatusRead::Idle,
            Err(RecvTimeoutError::Disconnected) => {
                self.closed = true;
                StatusRead::Closed
            }
        }
    }

    fn suspend(&mut self) -> io::Result<()> {
        let mut record = self.probe.0.lock();
        record.suspended = true;
        record.suspend_calls += 1;
        Ok(())
    }

    fn resume(&mut self) -> io::Result<()> {
        let mut record = self.probe.0.lock();
        record.suspended = false;
        record.resume_calls += 1;
        Ok(())
    }

    fn terminate(&mut self) -> io::Result<()> {
        let mut record = self.probe.0.lock();
        record.terminated = true;
        record.terminated_while_suspended = record.suspended;
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.probe.0.lock().killed = true;
        Ok(())
    }

    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        if self.dead() {
            return Ok(Some(None));
        }
        while self.exit_code.is_none() {
            match self.rx.try_recv() {
                Ok(ScriptEvent::Exit(code)) => self.exit_code = Some(code),
                Ok(ScriptEvent::Line(_)) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.exit_code = Some(0),
            }
        }
        Ok(self.exit_code.map(Some))
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        loop {
            if self.dead() {
                return Ok(None);
            }
            if let Some(code) = self.exit_code {
                return Ok(Some(code));
            }
            match self.rx.recv() {
                Ok(ScriptEvent::Exit(code)) => self.exit_code = Some(code),
                Ok(ScriptEvent::Line(_)) => {}
                Err(_) => return Ok(Some(0)),
            }
        }
    }
}

#[derive(Default)]
struct LauncherState {
    runs: VecDeque<ScriptedRun>,
    probe_runs: VecDeque<ScriptedRun>,
    probes: usize,
    spawns: usize,
}

/// Launcher that hands out queued [`ScriptedRun`]s.
#[derive(Clone)]
pub struct ScriptedLauncher {
    probe_output: Option<String>,
    suspend_supported: bool,
    state: Arc<Mutex<LauncherState>>,
}

impl ScriptedLauncher {
    /// `duration_secs` is reported by the probe run; `None` omits the duration line.
    pub fn new(duration_secs: Option<u32>) -> Self {
        let probe_output = match duration_secs {
            Some(secs) => format!(
                "Input #0, matroska,webm, from 'in.mkv':\n  Duration: {:02}:{:02}:{:02}.00, start: 0.000000, bitrate: 800 kb/s",
                secs / 3600,
                (secs / 60) % 60,
                secs % 60
            ),
            None => "Input #0, matroska,webm, from 'in.mkv':\n  Duration: N/A".to_string(),
        };
        Self {
            probe_output: Some(probe_output),
            suspend_supported: true,
            state: Arc::new(Mutex::new(LauncherState::default())),
        }
    }

    /// A launcher whose tool cannot be started at all.
    pub fn missing_tool() -> Self {
        Self {
            probe_output: None,
            suspend_supported: true,
            state: Arc::new(Mutex::new(LauncherState::default())),
        }
    }

    /// Simulate a platform without process suspension.
    pub fn without_suspend(mut self) -> Self {
        self.suspend_supported = false;
        self
    }

    pub fn push_run(&self, run: ScriptedRun) {
        self.state.lock().runs.push_back(run);
    }

    /// Script the next metadata probe instead of the canned duration output.
    pub fn push_probe_run(&self, run: ScriptedRun) {
        self.state.lock().probe_runs.push_back(run);
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().probes
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().spawns
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn tool_name(&self) -> String {
        "ffmpeg".to_string()
    }

    fn probe(&self, _input: &Path) -> io::Result<Box<dyn ControllableProcess>> {
        let mut state = self.state.lock();
        state.probes += 1;
        let output = self
            .probe_output
            .as_deref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"))?;
        let run = match state.probe_runs.pop_front() {
            Some(run) => run,
            // ffmpeg exits 1 when given no output file.
            None => ScriptedRun::completed(&output.lines().collect::<Vec<_>>(), 1).0,
        };
        Ok(Box::new(ScriptedProcess::from_run(run)))
    }

    fn spawn(&self, args: &[String]) -> io::Result<Box<dyn ControllableProcess>> {
        let mut state = self.state.lock();
        if self.probe_output.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"));
        }
        let run = state
            .runs
            .pop_front()
            .ok_or_else(|| io::Error::other("no scripted run queued"))?;
        state.spawns += 1;
        run.probe.0.lock().args = args.to_vec();
        Ok(Box::new(ScriptedProcess::from_run(run)))
    }

    fn supports_suspend(&self) -> bool {
        self.suspend_supported
    }
}
