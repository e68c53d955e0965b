//! The controllable external process.
//!
//! [`ProcessLauncher`] starts the tool and [`ControllableProcess`] is the
//! narrow handle the supervisor drives: a readable status stream plus
//! suspend/resume/terminate. Platform differences (POSIX job-control
//! signals, console-window suppression on Windows) stay behind this seam.

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// Result of one bounded read from the status stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusRead {
    /// A complete status line (without its `\r`/`\n` terminator).
    Line(String),
    /// Nothing arrived within the timeout; the stream is still open.
    Idle,
    /// The stream is exhausted.
    Closed,
}

/// A live external process owned by exactly one supervisor invocation.
pub trait ControllableProcess: Send {
    /// Wait up to `timeout` for the next status line.
    fn read_status(&mut self, timeout: Duration) -> StatusRead;

    /// Halt execution at the OS level.
    fn suspend(&mut self) -> io::Result<()>;

    /// Continue a suspended process.
    fn resume(&mut self) -> io::Result<()>;

    /// Ask the process to exit.
    fn terminate(&mut self) -> io::Result<()>;

    /// Forcefully kill the process.
    fn kill(&mut self) -> io::Result<()>;

    /// Non-blocking exit check. `Some(None)` means it exited without a code (signal).
    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>>;

    /// Block until exit and return the exit code, if any.
    fn wait(&mut self) -> io::Result<Option<i32>>;
}

/// Starts the external tool in its two modes.
pub trait ProcessLauncher: Send + Sync {
    /// Name used in logs and launch errors.
    fn tool_name(&self) -> String;

    /// Start the tool in metadata-only mode (input path only).
    ///
    /// The returned process streams the input summary on its status stream;
    /// its exit code carries no meaning.
    fn probe(&self, input: &Path) -> io::Result<Box<dyn ControllableProcess>>;

    /// Spawn a conversion run with the given arguments.
    fn spawn(&self, args: &[String]) -> io::Result<Box<dyn ControllableProcess>>;

    /// Whether [`ControllableProcess::suspend`] is available on this platform.
    fn supports_suspend(&self) -> bool {
        cfg!(unix)
    }
}

/// Launches the real ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    program: PathBuf,
}

impl Default for FfmpegLauncher {
    fn default() -> Self {
        Self::new(PathBuf::from("ffmpeg"))
    }
}

impl FfmpegLauncher {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        hide_console_window(&mut cmd);
        cmd
    }
}

impl ProcessLauncher for FfmpegLauncher {
    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn probe(&self, input: &Path) -> io::Result<Box<dyn ControllableProcess>> {
        // Without an output file ffmpeg exits non-zero after printing the
        // input summary.
        let child = self
            .command()
            .arg("-hide_banner")
            .arg("-i")
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(Box::new(OsProcess::new(child)?))
    }

    fn spawn(&self, args: &[String]) -> io::Result<Box<dyn ControllableProcess>> {
        let child = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(Box::new(OsProcess::new(child)?))
    }
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}

/// An OS child process whose stderr is pumped into a channel by a helper thread.
pub struct OsProcess {
    child: Child,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
    exited: Option<Option<i32>>,
}

impl OsProcess {
    /// Wrap a child spawned with a piped stderr.
    pub fn new(mut child: Child) -> io::Result<Self> {
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stderr not piped"))?;
        let (tx, rx) = mpsc::channel();
        let reader = std::thread::Builder::new()
            .name("transcode-status".to_string())
            .spawn(move || pump_lines(stderr, tx))?;
        Ok(Self {
            child,
            lines: rx,
            reader: Some(reader),
            exited: None,
        })
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }

    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) -> io::Result<()> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(self.pid() as i32), signal).map_err(io::Error::from)
    }
}

impl ControllableProcess for OsProcess {
    fn read_status(&mut self, timeout: Duration) -> StatusRead {
        match self.lines.recv_timeout(timeout) {
            Ok(line) => StatusRead::Line(line),
            Err(RecvTimeoutError::Timeout) => StatusRead::Idle,
            Err(RecvTimeoutError::Disconnected) => StatusRead::Closed,
        }
    }

    #[cfg(unix)]
    fn suspend(&mut self) -> io::Result<()> {
        tracing::debug!(pid = self.pid(), "Suspending process");
        self.signal(nix::sys::signal::Signal::SIGSTOP)
    }

    #[cfg(not(unix))]
    fn suspend(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process suspension is not supported on this platform",
        ))
    }

    #[cfg(unix)]
    fn resume(&mut self) -> io::Result<()> {
        tracing::debug!(pid = self.pid(), "Resuming process");
        self.signal(nix::sys::signal::Signal::SIGCONT)
    }

    #[cfg(not(unix))]
    fn resume(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process suspension is not supported on this platform",
        ))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        if self.exited.is_some() {
            return Ok(());
        }
        self.signal(nix::sys::signal::Signal::SIGTERM)
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        if self.exited.is_some() {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already exited but not yet reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn try_wait(&mut self) -> io::Result<Option<Option<i32>>> {
        if let Some(code) = self.exited {
            return Ok(Some(code));
        }
        let status = self.child.try_wait()?;
        if let Some(status) = status {
            self.exited = Some(status.code());
        }
        Ok(self.exited)
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        if let Some(code) = self.exited {
            return Ok(code);
        }
        let status = self.child.wait()?;
        self.exited = Some(status.code());
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        Ok(status.code())
    }
}

impl Drop for OsProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.try_wait() {
            tracing::warn!(pid = self.pid(), "Killing orphaned process");
            let _ = self.kill();
            let _ = self.child.wait();
        }
    }
}

/// Split a byte stream on `\r` or `\n` and forward each non-empty line.
///
/// ffmpeg terminates its periodic status lines with a bare `\r`.
fn pump_lines<R: Read>(reader: R, tx: Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::new();

    loop {
        let consumed = match reader.fill_buf() {
            Ok([]) => break,
            Ok(buf) => {
                for &byte in buf {
                    if byte == b'\n' || byte == b'\r' {
                        if !line.is_empty() {
                            let text = String::from_utf8_lossy(&line).to_string();
                            line.clear();
                            if tx.send(text).is_err() {
                                return;
                            }
                        }
                    } else {
                        line.push(byte);
                    }
                }
                buf.len()
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        };
        reader.consume(consumed);
    }

    if !line.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&line).to_string());
    }
}
