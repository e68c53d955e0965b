use std::path::Path;
use std::time::Duration;

/// Size-stability readiness check.
///
/// Samples the file size, waits `interval`, samples again. The file counts
/// as fully written only when both samples agree and are non-zero. This is
/// a heuristic: a writer that pauses longer than `interval` will fool it.
pub fn is_file_ready(path: &Path, interval: Duration) -> bool {
    is_ready_with(
        || std::fs::metadata(path).ok().map(|m| m.len()),
        || std::thread::sleep(interval),
    )
}

/// Readiness check over an arbitrary size sampler. A failed sample means "not ready".
pub fn is_ready_with(mut sample: impl FnMut() -> Option<u64>, wait: impl FnOnce()) -> bool {
    let Some(first) = sample() else {
        return false;
    };
    if first == 0 {
        return false;
    }
    wait();
    matches!(sample(), Some(second) if second == first)
}
