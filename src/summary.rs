// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Video summaries: tensor → MP4 blobs → one stored record.
//!
//! A record holds the width, height and fps of the batch followed by one
//! encoded MP4 per retained video: `[w, h, fps, vid0, vid1, ...]`.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use chrono::Utc;
use ndarray::{ArrayView4, ArrayViewD, Axis, Ix4};
use tracing::{debug, info};

use crate::error::{PluginError, Result};
use crate::metadata::create_summary_metadata;
use crate::provider::TimeSeriesSink;

/// Number of leading dimension strings in a record.
pub const HEADER_LEN: usize = 3;

/// Stored form of one video summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSummaryRecord {
    values: Vec<Vec<u8>>,
}

impl VideoSummaryRecord {
    pub fn new(width: usize, height: usize, fps: u32, videos: Vec<Vec<u8>>) -> Self {
        let mut values = Vec::with_capacity(HEADER_LEN + videos.len());
        values.push(width.to_string().into_bytes());
        values.push(height.to_string().into_bytes());
        values.push(fps.to_string().into_bytes());
        values.extend(videos);
        Self { values }
    }

    pub fn width(&self) -> Option<usize> {
        parse_dimension(&self.values[0])
    }

    pub fn height(&self) -> Option<usize> {
        parse_dimension(&self.values[1])
    }

    pub fn fps(&self) -> Option<usize> {
        parse_dimension(&self.values[2])
    }

    /// Encoded MP4 payloads, in input order.
    pub fn videos(&self) -> &[Vec<u8>] {
        &self.values[HEADER_LEN..]
    }

    /// Every value in stored order, header first.
    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }
}

fn parse_dimension(raw: &[u8]) -> Option<usize> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

/// Turns one `[t, h, w, 3]` RGB clip into container bytes.
pub trait VideoEncoder: Send + Sync {
    fn encode(&self, frames: ArrayView4<'_, u8>, fps: u32) -> Result<Vec<u8>>;
}

/// Build a record from a `[k, t, h, w, c]` batch.
///
/// Only the first `max_outputs` videos are encoded; the rest are dropped
/// without notice.
pub fn video_summary(
    data: ArrayViewD<'_, u8>,
    fps: u32,
    max_outputs: i64,
    encoder: &dyn VideoEncoder,
) -> Result<VideoSummaryRecord> {
    if data.ndim() != 5 {
        return Err(PluginError::InvalidArgument(format!(
            "videos must have rank 5 [k, t, h, w, c], got rank {}",
            data.ndim()
        )));
    }
    let shape = data.shape();
    if shape[4] != 3 {
        return Err(PluginError::InvalidArgument(format!(
            "videos must have 3 (RGB) channels, got {}",
            shape[4]
        )));
    }
    if max_outputs < 0 {
        return Err(PluginError::InvalidArgument(format!(
            "max_outputs must be non-negative, got {max_outputs}"
        )));
    }
    let (height, width) = (shape[2], shape[3]);
    let keep = shape[0].min(usize::try_from(max_outputs).unwrap_or(usize::MAX));

    let mut videos = Vec::with_capacity(keep);
    for i in 0..keep {
        let clip = data
            .index_axis(Axis(0), i)
            .into_dimensionality::<Ix4>()
            .map_err(|e| PluginError::InvalidArgument(format!("video {i}: {e}")))?;
        let encoded = encoder.encode(clip, fps)?;
        debug!(video = i, bytes = encoded.len(), "Video encoded");
        videos.push(encoded);
    }

    Ok(VideoSummaryRecord::new(width, height, fps, videos))
}

// ─────────────────────────────── ffmpeg ──────────────────────────────────────

/// Encodes H.264 MP4 by piping raw RGB frames into `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, frames: ArrayView4<'_, u8>, fps: u32) -> Result<Vec<u8>> {
        let (t, h, w, _) = frames.dim();
        if t == 0 || h == 0 || w == 0 {
            return Err(PluginError::Encode(format!("empty video ({t}x{h}x{w})")));
        }

        // Removed when dropped, whichever way this function exits.
        let out = tempfile::Builder::new()
            .prefix("video")
            .suffix(".mp4")
            .tempfile()?;

        let mut child = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{w}x{h}"))
            .arg("-r")
            .arg(fps.to_string())
            .args(["-i", "-", "-an", "-c:v", "libx264", "-pix_fmt", "yuv420p"])
            // yuv420p needs even dimensions.
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-f", "mp4"])
            .arg(out.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PluginError::Encode(format!("spawn {:?}: {e}", self.ffmpeg)))?;

        let pixels = frames.as_standard_layout();
        let write_result = match (child.stdin.take(), pixels.as_slice()) {
            (Some(mut stdin), Some(bytes)) => stdin.write_all(bytes),
            _ => Err(std::io::Error::other("ffmpeg stdin unavailable")),
        };
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(PluginError::Encode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        write_result.map_err(|e| PluginError::Encode(format!("write frames: {e}")))?;

        let bytes = std::fs::read(out.path())?;
        if bytes.is_empty() {
            return Err(PluginError::Encode("ffmpeg produced no output".into()));
        }
        Ok(bytes)
    }
}

// ─────────────────────────────── writer ──────────────────────────────────────

/// Writes video summaries for one run.
pub struct SummaryWriter {
    run: String,
    sink: Arc<dyn TimeSeriesSink>,
    encoder: Arc<dyn VideoEncoder>,
}

impl SummaryWriter {
    pub fn new(
        run: impl Into<String>,
        sink: Arc<dyn TimeSeriesSink>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Self {
        Self { run: run.into(), sink, encoder }
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    /// Encode `data` and store it as one record of `tag` at `step`.
    ///
    /// Encoder failures abort the write; nothing is stored.
    pub fn video(
        &self,
        tag: &str,
        data: ArrayViewD<'_, u8>,
        fps: u32,
        step: i64,
        max_outputs: i64,
        description: Option<&str>,
    ) -> Result<VideoSummaryRecord> {
        let record = video_summary(data, fps, max_outputs, self.encoder.as_ref())?;
        let metadata = create_summary_metadata(tag, description.unwrap_or(""), false);
        let wall_time = Utc::now().timestamp_micros() as f64 / 1e6;

        self.sink.write_blob_sequence(
            &self.run,
            tag,
            step,
            wall_time,
            &metadata,
            record.values(),
        )?;
        info!(
            run = self.run,
            tag,
            step,
            videos = record.videos().len(),
            "Video summary written"
        );
        Ok(record)
    }
}
