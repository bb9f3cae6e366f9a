//! Track extraction against real ffmpeg output.
//!
//! Every test returns early when `ffmpeg`/`ffprobe` are not installed or
//! cannot build the fixtures.

use std::path::Path;
use std::process::Command;

use ndarray::Array4;
use tempfile::TempDir;

use video_plugin::demux::{track_or_original, Demuxer};
use video_plugin::summary::{FfmpegEncoder, VideoEncoder};

fn tools_available() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        Command::new(tool)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

fn ffmpeg(args: &[&str]) -> bool {
    Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(args)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// MP4 with two video streams of different sizes.
fn two_track_fixture(dir: &Path) -> Option<Vec<u8>> {
    let out = dir.join("two.mp4");
    let ok = ffmpeg(&[
        "-f", "lavfi", "-i", "testsrc=size=64x48:rate=10:duration=1",
        "-f", "lavfi", "-i", "testsrc=size=32x32:rate=10:duration=1",
        "-map", "0:v", "-map", "1:v", "-c:v", "mpeg4",
        out.to_str()?,
    ]);
    if !ok {
        return None;
    }
    std::fs::read(out).ok()
}

fn single_track_fixture(dir: &Path) -> Option<Vec<u8>> {
    let out = dir.join("one.mp4");
    let ok = ffmpeg(&[
        "-f", "lavfi", "-i", "testsrc=size=32x32:rate=10:duration=1",
        "-c:v", "mpeg4",
        out.to_str()?,
    ]);
    if !ok {
        return None;
    }
    std::fs::read(out).ok()
}

/// Stream-copy `0:<stream>` of `input` the way an operator would by hand.
fn reference_extract(dir: &Path, input: &[u8], stream: u32) -> Option<Vec<u8>> {
    let src = dir.join("reference-src.mp4");
    let out = dir.join(format!("reference-{stream}.mp4"));
    std::fs::write(&src, input).ok()?;
    let map = format!("0:{stream}");
    let ok = ffmpeg(&[
        "-i", src.to_str()?, "-map", &map, "-c", "copy", "-f", "mp4", out.to_str()?,
    ]);
    if !ok {
        return None;
    }
    std::fs::read(out).ok()
}

fn setup() -> Option<(TempDir, Vec<u8>)> {
    if !tools_available() {
        eprintln!("ffmpeg/ffprobe not found, skipping");
        return None;
    }
    let dir = tempfile::tempdir().expect("create tempdir");
    let fixture = two_track_fixture(dir.path())?;
    Some((dir, fixture))
}

#[tokio::test]
async fn test_probe_counts_video_streams() {
    let Some((dir, fixture)) = setup() else { return };
    let path = dir.path().join("probe.mp4");
    std::fs::write(&path, &fixture).unwrap();

    let streams = Demuxer::default().probe_video_streams(&path).await.expect("probe");
    assert_eq!(streams, vec![0, 1]);
}

#[tokio::test]
async fn test_track_matches_reference_stream_copy() {
    let Some((dir, fixture)) = setup() else { return };
    let demuxer = Demuxer::default();

    for track in [0u32, 1] {
        let Some(expected) = reference_extract(dir.path(), &fixture, track) else { return };
        let got = track_or_original(&demuxer, fixture.clone(), track as usize).await;
        assert_eq!(got, expected, "track {track}");
        assert_ne!(got, fixture);
    }
}

#[tokio::test]
async fn test_split_returns_every_track() {
    let Some((_dir, fixture)) = setup() else { return };
    let tracks = Demuxer::default().split_video_data(&fixture).await.expect("split");
    assert_eq!(tracks.len(), 2);
    assert_ne!(tracks[0], tracks[1]);
}

#[tokio::test]
async fn test_out_of_range_returns_original() {
    let Some((dir, fixture)) = setup() else { return };
    let demuxer = Demuxer::default();

    let bytes = track_or_original(&demuxer, fixture.clone(), 2).await;
    assert_eq!(bytes, fixture);

    let Some(single) = single_track_fixture(dir.path()) else { return };
    let bytes = track_or_original(&demuxer, single.clone(), 1).await;
    assert_eq!(bytes, single);
}

#[tokio::test]
async fn test_garbage_returns_original() {
    // Runs with or without ffmpeg: either the probe or the spawn fails.
    let garbage = b"this is not a container".to_vec();
    let bytes = track_or_original(&Demuxer::default(), garbage.clone(), 0).await;
    assert_eq!(bytes, garbage);
    assert!(Demuxer::default().split_video_data(&garbage).await.is_err());
}

#[tokio::test]
async fn test_encoder_output_is_probeable() {
    if !tools_available() {
        return;
    }
    let has_x264 = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains("libx264"))
        .unwrap_or(false);
    if !has_x264 {
        return;
    }

    // Odd frame size exercises the even-dimension padding.
    let frames = Array4::from_shape_fn((8, 15, 21, 3), |(t, y, x, c)| ((t * 16 + y + x + c * 40) % 256) as u8);
    let mp4 = FfmpegEncoder::default().encode(frames.view(), 4).expect("encode");

    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("encoded.mp4");
    std::fs::write(&path, &mp4).unwrap();
    let streams = Demuxer::default().probe_video_streams(&path).await.expect("probe");
    assert_eq!(streams.len(), 1);
}
