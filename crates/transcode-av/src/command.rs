//! Argument assembly for conversion runs.

use std::path::{Path, PathBuf};

/// Encode parameters passed through to the tool. Only `Some` values are emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeParams {
    pub video_bitrate: Option<String>,
    pub audio_bitrate: Option<String>,
    pub resolution: Option<String>,
    pub fps: Option<u32>,
}

/// Build `-y -i <input> [-b:v V] [-b:a A] [-s WxH] [-r FPS] <output>`.
pub fn build_ffmpeg_args(input: &Path, output: &Path, params: &EncodeParams) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
    ];

    if let Some(ref bitrate) = params.video_bitrate {
        args.extend(["-b:v".to_string(), bitrate.clone()]);
    }
    if let Some(ref bitrate) = params.audio_bitrate {
        args.extend(["-b:a".to_string(), bitrate.clone()]);
    }
    if let Some(ref resolution) = params.resolution {
        args.extend(["-s".to_string(), resolution.clone()]);
    }
    if let Some(fps) = params.fps {
        args.extend(["-r".to_string(), fps.to_string()]);
    }

    args.push(output.to_string_lossy().to_string());
    args
}

/// Derive `<output_dir>/<source stem>.<format>`, stripping a leading dot from `format`.
pub fn output_path_for(source: &Path, output_dir: &Path, format: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{}.{}", stem, format.trim_start_matches('.')))
}
