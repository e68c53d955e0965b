//! Shared types for transcode-queue.
//!
//! This crate holds the plain data that every other layer agrees on:
//! - [`JobId`], the process-unique job identifier
//! - [`FormatProfile`], the bundle of encode parameters copied into each job
//! - [`Error`], the validation error raised when a profile field is rejected

pub mod error;
pub mod ids;
pub mod profile;

pub use error::{Error, Result};
pub use ids::JobId;
pub use profile::{validate_bitrate, validate_resolution, FormatProfile};
