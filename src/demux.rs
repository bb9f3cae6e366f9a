// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-track extraction from multi-stream MP4 blobs.
//!
//! The blob is written to a temp file, `ffprobe` lists its streams, and
//! `ffmpeg -c copy` remuxes the requested video stream into a fresh MP4.
//! Nothing is transcoded. Temp files are removed on drop on every path.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ToolsConfig;
use crate::error::{PluginError, Result};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_type: String,
}

/// Handle to the `ffmpeg` / `ffprobe` pair.
#[derive(Debug, Clone)]
pub struct Demuxer {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

impl Demuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into(), ffprobe: ffprobe.into() }
    }

    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(tools.ffmpeg.clone(), tools.ffprobe.clone())
    }

    /// Container stream indexes of every video stream in `path`.
    pub async fn probe_video_streams(&self, path: &Path) -> Result<Vec<u32>> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_streams", "-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PluginError::Demux(format!("spawn {:?}: {e}", self.ffprobe)))?;
        if !output.status.success() {
            return Err(PluginError::Demux(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| PluginError::Demux(format!("unreadable ffprobe output: {e}")))?;
        Ok(probe
            .streams
            .into_iter()
            .filter(|s| s.codec_type == "video")
            .map(|s| s.index)
            .collect())
    }

    /// Stream-copy container stream `stream_index` of `input` into a new MP4.
    async fn copy_stream(&self, input: &Path, stream_index: u32) -> Result<Vec<u8>> {
        let out = mp4_tempfile()?;
        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(input)
            .arg("-map")
            .arg(format!("0:{stream_index}"))
            .args(["-c", "copy", "-f", "mp4"])
            .arg(out.path())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PluginError::Demux(format!("spawn {:?}: {e}", self.ffmpeg)))?;
        if !output.status.success() {
            return Err(PluginError::Demux(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(tokio::fs::read(out.path()).await?)
    }

    /// Every video stream of `data` as its own MP4, in container order.
    pub async fn split_video_data(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        let input = write_input(data).await?;
        let streams = self.probe_video_streams(input.path()).await?;
        debug!(streams = streams.len(), "Splitting video tracks");
        let mut tracks = Vec::with_capacity(streams.len());
        for stream_index in streams {
            tracks.push(self.copy_stream(input.path(), stream_index).await?);
        }
        Ok(tracks)
    }
}

/// The `track`-th video stream of `data` (0-based, counting video streams
/// only), or `data` itself if splitting fails or the track does not exist.
/// The caller cannot tell the two apart.
pub async fn track_or_original(demuxer: &Demuxer, data: Vec<u8>, track: usize) -> Vec<u8> {
    let reason = match demuxer.split_video_data(&data).await {
        Ok(mut tracks) if track < tracks.len() => return tracks.swap_remove(track),
        Ok(tracks) => format!("track {track} out of range ({} video streams)", tracks.len()),
        Err(e) => e.to_string(),
    };
    warn!(track, bytes = data.len(), error = %reason, "Track extraction failed, serving original blob");
    data
}

fn mp4_tempfile() -> Result<NamedTempFile> {
    Ok(tempfile::Builder::new().prefix("video").suffix(".mp4").tempfile()?)
}

async fn write_input(data: &[u8]) -> Result<NamedTempFile> {
    let input = mp4_tempfile()?;
    tokio::fs::write(input.path(), data).await?;
    Ok(input)
}
