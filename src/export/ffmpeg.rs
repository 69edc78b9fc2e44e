//! FFmpeg-backed stage exporter
//!
//! Each stage is one ffmpeg invocation: the layer plan is lowered to a
//! filter chain, the time range is capped with `-t`, and the result is
//! encoded with the highest quality H.264 preset into a QuickTime container.
//! Track metadata comes from ffprobe's JSON output.

use super::pipeline::MediaExporter;
use super::types::{ExportError, ExportJob, VideoTrackInfo};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Stage exporter that shells out to `ffmpeg` and `ffprobe`
#[derive(Debug, Clone)]
pub struct FfmpegExporter {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegExporter {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfmpegExporter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MediaExporter for FfmpegExporter {
    async fn probe(&self, path: &Path) -> Result<VideoTrackInfo, ExportError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ExportError::Probe(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(ExportError::Probe(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let info = parse_probe_output(path, &output.stdout)?;
        tracing::debug!(
            "Probed {:?}: {}x{} @ {:.2}fps, {:.2}s, audio: {}",
            path,
            info.width,
            info.height,
            info.fps,
            info.duration_secs,
            info.has_audio
        );
        Ok(info)
    }

    async fn export(&self, job: &ExportJob) -> Result<(), ExportError> {
        let filter = job.plan.filter_graph(job.source)?;
        let args = build_stage_args(job, &filter);

        tracing::info!("Starting FFmpeg {} export: {:?}", job.stage, args);

        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ExportError::Ffmpeg(format!("Failed to start FFmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExportError::Ffmpeg(format!(
                "FFmpeg exited with {}: {}",
                output.status,
                last_lines(&stderr, 5)
            )));
        }

        tracing::info!("FFmpeg {} export finished: {:?}", job.stage, job.output);
        Ok(())
    }
}

/// Command line for one stage export.
///
/// Autorotation is disabled so the filter chain sees the stored frame
/// dimensions the plan was computed against. The filter chain bakes the
/// rotation into the pixels, so the output's display rotation is cleared.
pub fn build_stage_args(job: &ExportJob, filter: &str) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-noautorotate".to_string(),
        "-i".to_string(),
        job.input.to_string_lossy().to_string(),
        "-t".to_string(),
        job.max_duration_secs.to_string(),
        "-vf".to_string(),
        filter.to_string(),
        "-r".to_string(),
        job.frame_rate.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        job.preset.speed.to_string(),
        "-crf".to_string(),
        job.preset.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        job.preset.audio_bitrate.to_string(),
        "-metadata:s:v:0".to_string(),
        "rotate=0".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-f".to_string(),
        "mov".to_string(),
        job.output.to_string_lossy().to_string(),
    ]
}

/// Extract first-video-track metadata from `ffprobe -print_format json`
pub fn parse_probe_output(path: &Path, stdout: &[u8]) -> Result<VideoTrackInfo, ExportError> {
    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| ExportError::Probe(format!("Failed to parse ffprobe output: {}", e)))?;

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .ok_or_else(|| ExportError::NoVideoTrack(path.to_path_buf()))?;

    let codec_type = |stream: &serde_json::Value, kind: &str| {
        stream.get("codec_type").and_then(|v| v.as_str()) == Some(kind)
    };

    let video = streams
        .iter()
        .find(|s| codec_type(s, "video"))
        .ok_or_else(|| ExportError::NoVideoTrack(path.to_path_buf()))?;
    let has_audio = streams.iter().any(|s| codec_type(s, "audio"));

    let width = video.get("width").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let height = video.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(ExportError::Probe(format!(
            "video track has no dimensions in {:?}",
            path
        )));
    }

    let fps = video
        .get("r_frame_rate")
        .and_then(|v| v.as_str())
        .map(parse_frame_rate)
        .unwrap_or(0.0);

    // Container duration is more reliable than the stream's
    let duration_secs = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .or_else(|| video.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(VideoTrackInfo {
        width,
        height,
        fps,
        duration_secs,
        has_audio,
    })
}

/// Parse "30/1", "30000/1001" or "29.97"
fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().unwrap_or(0.0);
            let den: f64 = den.parse().unwrap_or(1.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => rate.parse().unwrap_or(0.0),
    }
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}
