//! transcode-queue - Local media conversion queue
//!
//! Jobs are converted one at a time by a background worker that drives
//! ffmpeg, reports progress, and honors pause/resume/stop requests. A hot
//! folder can be polled so that new files are converted without operator
//! action.
//!
//! The library crate exposes the core for the binary and for integration tests.

pub mod config;
pub mod service;
pub mod state;
pub mod watch;

pub use service::ConverterService;
pub use state::{DisplayState, Job, JobEvent, JobSource, JobState, QueueStats};
