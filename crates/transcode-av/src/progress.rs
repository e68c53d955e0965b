//! Parsing of the tool's diagnostic stream.
//!
//! The probe run reports `Duration: HH:MM:SS.CC`; conversion runs emit
//! periodic status lines carrying `time=HH:MM:SS.CC`.

use regex::Regex;
use std::sync::OnceLock;

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2})\.(\d+)").expect("valid duration regex")
    })
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"time=\s*(\d+):(\d{2}):(\d{2})\.(\d+)").expect("valid time regex")
    })
}

fn captures_to_seconds(caps: &regex::Captures<'_>) -> Option<f64> {
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let fraction: f64 = format!("0.{}", &caps[4]).parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
}

/// Total duration in seconds from probe output, if present.
pub fn parse_duration(text: &str) -> Option<f64> {
    duration_pattern()
        .captures(text)
        .and_then(|caps| captures_to_seconds(&caps))
}

/// Elapsed encode time in seconds from one status line, if present.
pub fn parse_progress_time(line: &str) -> Option<f64> {
    time_pattern()
        .captures(line)
        .and_then(|caps| captures_to_seconds(&caps))
}

/// `floor(100 * elapsed / total)`, clamped to `0..=99`.
///
/// 100 is reserved for a confirmed successful exit.
pub fn percent_complete(elapsed: f64, total: f64) -> u8 {
    if total <= 0.0 || !elapsed.is_finite() {
        return 0;
    }
    let pct = (100.0 * elapsed / total).floor();
    pct.clamp(0.0, 99.0) as u8
}
