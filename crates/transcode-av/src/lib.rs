//! # transcode-av
//!
//! Supervision of the external transcoding tool (ffmpeg).
//!
//! This crate provides:
//! - Argument assembly for conversion runs ([`build_ffmpeg_args`])
//! - Parsing of the tool's diagnostic stream (duration and `time=` tokens)
//! - The [`ControllableProcess`] seam with an OS-backed implementation that
//!   suspends, resumes and terminates the live process
//! - The [`Supervisor`], which drives one conversion to completion while
//!   honoring shared pause/stop [`ControlSignals`]
//! - Tool availability checks
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use transcode_av::{ControlSignals, EncodeParams, FfmpegLauncher, Supervisor};
//!
//! let supervisor = Supervisor::new(Arc::new(FfmpegLauncher::default()));
//! let signals = ControlSignals::default();
//! let params = EncodeParams {
//!     video_bitrate: Some("2M".into()),
//!     ..Default::default()
//! };
//! supervisor.run(
//!     "in.avi".as_ref(),
//!     "out/in.mp4".as_ref(),
//!     &params,
//!     &mut |pct| println!("{pct}%"),
//!     &signals,
//! )?;
//! # Ok::<(), transcode_av::SupervisorError>(())
//! ```

mod command;
mod error;
pub mod process;
pub mod progress;
mod signals;
mod supervisor;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod tools;

pub use command::{build_ffmpeg_args, output_path_for, EncodeParams};
pub use error::{Result, SupervisorError};
pub use process::{ControllableProcess, FfmpegLauncher, ProcessLauncher, StatusRead};
pub use signals::ControlSignals;
pub use supervisor::{Supervisor, SupervisorTiming};
