//! Error types for transcode-av.

use std::path::PathBuf;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Failures raised while converting a single file.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The source file does not exist. Raised before anything is spawned.
    #[error("source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// The output directory could not be created.
    #[error("output directory unavailable: {}: {source}", path.display())]
    OutputDirUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external tool could not be started.
    #[error("failed to launch {tool}: {source}")]
    LaunchFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool exited unsuccessfully.
    #[error("conversion failed with exit code {exit_code}\n{diagnostics}")]
    ExecutionFailed { exit_code: i32, diagnostics: String },

    /// A stop was requested while the conversion was running.
    #[error("conversion cancelled")]
    Cancelled,

    /// An I/O error occurred while controlling the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    pub fn launch_failed(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::LaunchFailed {
            tool: tool.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
