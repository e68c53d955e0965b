//! Worker loop: drives the queue one job at a time.

use super::ServiceInner;
use crate::state::Job;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};
use transcode_av::{EncodeParams, SupervisorError};
use transcode_common::FormatProfile;

/// Process queued jobs until the queue drains or a stop is requested.
///
/// The running flag is always cleared before this returns. When the queue
/// drains it is cleared under the queue lock, so a producer that enqueues
/// right afterwards sees the worker as idle and can start a new one.
pub(super) fn run(inner: &ServiceInner) {
    info!("Worker started");

    loop {
        if inner.signals.is_stopped() {
            break;
        }
        if inner.signals.is_paused() {
            std::thread::sleep(inner.options.pause_poll);
            continue;
        }

        let Some(job) = inner
            .queue
            .claim_next(|| inner.running.store(false, Ordering::SeqCst))
        else {
            info!("Queue drained, worker idle");
            return;
        };

        process_job(inner, &job);

        if inner.signals.is_stopped() {
            break;
        }
    }

    inner.running.store(false, Ordering::SeqCst);
    info!("Worker stopped");
}

fn process_job(inner: &ServiceInner, job: &Job) {
    let span = tracing::info_span!("job", id = %job.id, file = %job.file_name());
    let _enter = span.enter();

    let waited_ms = job.queue_wait().map_or(0, |d| d.num_milliseconds());
    info!(source = %job.source_path.display(), waited_ms, "Processing job");

    match convert(inner, job) {
        Ok(()) => {
            info!("Job completed");
            inner.queue.complete(job.id);
        }
        Err(e) if e.is_cancelled() => {
            warn!("Job cancelled");
            inner.queue.cancel(job.id);
        }
        Err(e) => {
            error!("Job failed: {}", e);
            inner.queue.fail(job.id, &e.to_string());
        }
    }

    if let Some(elapsed) = inner.queue.get(job.id).and_then(|j| j.run_time()) {
        debug!(elapsed_ms = elapsed.num_milliseconds(), "Job finished");
    }
}

fn convert(inner: &ServiceInner, job: &Job) -> transcode_av::Result<()> {
    std::fs::create_dir_all(&job.output_dir).map_err(|source| {
        SupervisorError::OutputDirUnavailable {
            path: job.output_dir.clone(),
            source,
        }
    })?;

    let output = job.output_path();
    let params = encode_params(&job.profile);
    let id = job.id;

    inner.supervisor.run(
        &job.source_path,
        &output,
        &params,
        &mut |percent: u8| inner.queue.update_progress(id, percent),
        &inner.signals,
    )
}

/// Only parameters the profile actually sets are passed to the tool.
fn encode_params(profile: &FormatProfile) -> EncodeParams {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    EncodeParams {
        video_bitrate: non_empty(&profile.bitrate),
        audio_bitrate: None,
        resolution: non_empty(&profile.resolution),
        fps: (profile.fps > 0).then_some(profile.fps),
    }
}
