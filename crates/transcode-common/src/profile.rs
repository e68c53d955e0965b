//! Target encode parameters.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn bitrate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+[kKmM]?$").expect("valid bitrate regex"))
}

fn resolution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)x(\d+)$").expect("valid resolution regex"))
}

/// Validate a bitrate string such as `800k`, `2M` or `100`.
///
/// Surrounding whitespace is trimmed. Returns the trimmed value when it is
/// a positive integer with an optional `k`/`M` suffix, `None` otherwise.
pub fn validate_bitrate(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || !bitrate_pattern().is_match(trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Validate a `WIDTHxHEIGHT` resolution string. Both dimensions must be non-zero.
pub fn validate_resolution(value: &str) -> Option<(u32, u32)> {
    let caps = resolution_pattern().captures(value.trim())?;
    let width: u32 = caps[1].parse().ok()?;
    let height: u32 = caps[2].parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

/// Encode parameters applied to a job.
///
/// Profiles carry no identity; each job gets its own copy at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatProfile {
    /// Target container format (file extension), e.g. `mp4`.
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// `WIDTHxHEIGHT`
    #[serde(default = "default_resolution")]
    pub resolution: String,

    /// Numeric with optional `k`/`M` suffix.
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_format() -> String {
    "mp4".to_string()
}
fn default_video_codec() -> String {
    "h264".to_string()
}
fn default_audio_codec() -> String {
    "aac".to_string()
}
fn default_resolution() -> String {
    "1920x1080".to_string()
}
fn default_bitrate() -> String {
    "4M".to_string()
}
fn default_fps() -> u32 {
    30
}

impl Default for FormatProfile {
    fn default() -> Self {
        Self {
            format: default_format(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            resolution: default_resolution(),
            bitrate: default_bitrate(),
            fps: default_fps(),
        }
    }
}

impl FormatProfile {
    /// Target format with any leading dot removed (`.mkv` -> `mkv`).
    pub fn normalized_format(&self) -> &str {
        self.format.trim_start_matches('.')
    }

    /// Replace the bitrate. On rejection the profile is left untouched.
    pub fn set_bitrate(&mut self, value: &str) -> Result<()> {
        let bitrate = validate_bitrate(Some(value))
            .ok_or_else(|| Error::invalid_input(format!("bitrate '{}'", value.trim())))?;
        self.bitrate = bitrate;
        Ok(())
    }

    /// Replace the resolution. On rejection the profile is left untouched.
    pub fn set_resolution(&mut self, value: &str) -> Result<()> {
        let (width, height) = validate_resolution(value)
            .ok_or_else(|| Error::invalid_input(format!("resolution '{}'", value.trim())))?;
        self.resolution = format!("{width}x{height}");
        Ok(())
    }

    pub fn set_fps(&mut self, fps: u32) -> Result<()> {
        if fps == 0 {
            return Err(Error::invalid_input("fps must be positive"));
        }
        self.fps = fps;
        Ok(())
    }

    /// Bitrates entered as a bare number in the settings form are megabits.
    pub fn normalize_bitrate(value: &str) -> String {
        let trimmed = value.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            format!("{trimmed}M")
        } else {
            trimmed.to_string()
        }
    }

    /// Check every field that is passed through to the external tool.
    pub fn validate(&self) -> Result<()> {
        if self.normalized_format().is_empty() {
            return Err(Error::invalid_input("format must not be empty"));
        }
        if validate_bitrate(Some(&self.bitrate)).is_none() {
            return Err(Error::invalid_input(format!("bitrate '{}'", self.bitrate)));
        }
        if validate_resolution(&self.resolution).is_none() {
            return Err(Error::invalid_input(format!(
                "resolution '{}'",
                self.resolution
            )));
        }
        if self.fps == 0 {
            return Err(Error::invalid_input("fps must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bitrate() {
        assert_eq!(validate_bitrate(Some("800k")).as_deref(), Some("800k"));
        assert_eq!(validate_bitrate(Some("2M")).as_deref(), Some("2M"));
        assert_eq!(validate_bitrate(Some("  192k  ")).as_deref(), Some("192k"));
        assert_eq!(validate_bitrate(Some("100")).as_deref(), Some("100"));
        assert_eq!(validate_bitrate(Some("invalid")), None);
        assert_eq!(validate_bitrate(Some("12kb")), None);
        assert_eq!(validate_bitrate(Some("")), None);
        assert_eq!(validate_bitrate(None), None);
    }

    #[test]
    fn test_set_bitrate_rejection_keeps_profile() {
        let mut profile = FormatProfile::default();
        assert!(profile.set_bitrate("invalid").is_err());
        assert_eq!(profile.bitrate, "4M");

        profile.set_bitrate(" 192k ").unwrap();
        assert_eq!(profile.bitrate, "192k");
    }

    #[test]
    fn test_validate_resolution() {
        assert_eq!(validate_resolution("1280x720"), Some((1280, 720)));
        assert_eq!(validate_resolution("0x720"), None);
        assert_eq!(validate_resolution("1280*720"), None);
        assert_eq!(validate_resolution("wide"), None);
    }

    #[test]
    fn test_set_resolution_and_fps() {
        let mut profile = FormatProfile::default();
        assert!(profile.set_resolution("abc").is_err());
        assert_eq!(profile.resolution, "1920x1080");
        profile.set_resolution(" 640x480").unwrap();
        assert_eq!(profile.resolution, "640x480");

        assert!(profile.set_fps(0).is_err());
        assert_eq!(profile.fps, 30);
        profile.set_fps(25).unwrap();
        assert_eq!(profile.fps, 25);
    }

    #[test]
    fn test_normalized_format() {
        let profile = FormatProfile {
            format: ".mkv".to_string(),
            ..Default::default()
        };
        assert_eq!(profile.normalized_format(), "mkv");
    }

    #[test]
    fn test_normalize_bitrate() {
        assert_eq!(FormatProfile::normalize_bitrate("8"), "8M");
        assert_eq!(FormatProfile::normalize_bitrate("800k"), "800k");
    }

    #[test]
    fn test_default_profile_is_valid() {
        let profile = FormatProfile::default();
        assert!(profile.validate().is_ok());
        assert_eq!(profile.format, "mp4");
        assert_eq!(profile.video_codec, "h264");
        assert_eq!(profile.audio_codec, "aac");
        assert_eq!(profile.fps, 30);
    }
}
