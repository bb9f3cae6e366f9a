//! Summary writer tests. A fake encoder stands in for ffmpeg.

use std::sync::Arc;

use ndarray::{Array, ArrayView4, IxDyn};
use parking_lot::Mutex;
use tempfile::TempDir;

use video_plugin::error::{PluginError, Result};
use video_plugin::metadata::PLUGIN_NAME;
use video_plugin::provider::DataProvider;
use video_plugin::storage::LocalStore;
use video_plugin::summary::{
    video_summary, SummaryWriter, VideoEncoder, HEADER_LEN,
};

/// Encodes a clip as `"<t>x<h>x<w>@<fps>#<first pixel>"` and remembers the
/// calls.
#[derive(Default)]
struct FakeEncoder {
    calls: Mutex<usize>,
}

impl VideoEncoder for FakeEncoder {
    fn encode(&self, frames: ArrayView4<'_, u8>, fps: u32) -> Result<Vec<u8>> {
        *self.calls.lock() += 1;
        let (t, h, w, _) = frames.dim();
        Ok(format!("{t}x{h}x{w}@{fps}#{}", frames[[0, 0, 0, 0]]).into_bytes())
    }
}

struct FailingEncoder;

impl VideoEncoder for FailingEncoder {
    fn encode(&self, _frames: ArrayView4<'_, u8>, _fps: u32) -> Result<Vec<u8>> {
        Err(PluginError::Encode("ffmpeg exited with status 1".into()))
    }
}

/// `[k, t, h, w, 3]` batch where every pixel of video `i` equals `i`.
fn batch(k: usize, t: usize, h: usize, w: usize) -> Array<u8, IxDyn> {
    Array::from_shape_fn(IxDyn(&[k, t, h, w, 3]), |idx| idx[0] as u8)
}

fn tmp_dir() -> TempDir {
    tempfile::tempdir().expect("create tempdir")
}

#[test]
fn test_header_then_one_payload_per_video() {
    let enc = FakeEncoder::default();
    let data = batch(2, 4, 6, 8);
    let record = video_summary(data.view(), 4, 3, &enc).expect("summary");

    assert_eq!(record.values().len(), HEADER_LEN + 2);
    assert_eq!(record.values()[0], b"8");
    assert_eq!(record.values()[1], b"6");
    assert_eq!(record.values()[2], b"4");
    assert_eq!(record.width(), Some(8));
    assert_eq!(record.height(), Some(6));
    assert_eq!(record.fps(), Some(4));
    assert_eq!(record.videos()[0], b"4x6x8@4#0");
    assert_eq!(record.videos()[1], b"4x6x8@4#1");
}

#[test]
fn test_extra_videos_are_dropped() {
    let enc = FakeEncoder::default();
    let data = batch(5, 2, 2, 2);
    let record = video_summary(data.view(), 30, 2, &enc).expect("summary");

    assert_eq!(record.videos().len(), 2);
    assert_eq!(*enc.calls.lock(), 2, "dropped videos must not be encoded");
    assert!(record.videos()[1].ends_with(b"#1"));
}

#[test]
fn test_zero_max_outputs_keeps_header_only() {
    let enc = FakeEncoder::default();
    let record = video_summary(batch(3, 2, 2, 2).view(), 4, 0, &enc).expect("summary");
    assert_eq!(record.values().len(), HEADER_LEN);
    assert!(record.videos().is_empty());
}

#[test]
fn test_negative_max_outputs_rejected() {
    let enc = FakeEncoder::default();
    let err = video_summary(batch(1, 2, 2, 2).view(), 4, -1, &enc).unwrap_err();
    assert!(matches!(err, PluginError::InvalidArgument(_)));
    assert_eq!(*enc.calls.lock(), 0);
}

#[test]
fn test_wrong_rank_rejected() {
    let enc = FakeEncoder::default();
    let data = Array::<u8, _>::zeros(IxDyn(&[2, 4, 4, 3]));
    let err = video_summary(data.view(), 4, 3, &enc).unwrap_err();
    assert!(matches!(err, PluginError::InvalidArgument(_)));
}

#[test]
fn test_non_rgb_rejected() {
    let enc = FakeEncoder::default();
    let data = Array::<u8, _>::zeros(IxDyn(&[1, 2, 4, 4, 4]));
    let err = video_summary(data.view(), 4, 3, &enc).unwrap_err();
    assert!(matches!(err, PluginError::InvalidArgument(_)));
}

#[test]
fn test_writer_stores_one_record() {
    let dir = tmp_dir();
    let store = Arc::new(LocalStore::open(dir.path()).expect("open store"));
    let writer = SummaryWriter::new("train", store.clone(), Arc::new(FakeEncoder::default()));

    writer
        .video("rollouts", batch(2, 3, 4, 4).view(), 4, 7, 3, Some("episodes"))
        .expect("write");

    assert_eq!(store.len(), 1);
    let listing = store.list_blob_sequences("", PLUGIN_NAME).expect("list");
    let series = &listing["train"]["rollouts"];
    assert_eq!(series.display_name, "rollouts");
    assert_eq!(series.description, "episodes");
    assert_eq!(series.max_step, 7);
    assert_eq!(series.max_length, HEADER_LEN + 2);
}

#[test]
fn test_encoder_failure_writes_nothing() {
    let dir = tmp_dir();
    let store = Arc::new(LocalStore::open(dir.path()).expect("open store"));
    let writer = SummaryWriter::new("train", store.clone(), Arc::new(FailingEncoder));

    let err = writer
        .video("rollouts", batch(1, 2, 2, 2).view(), 4, 0, 3, None)
        .unwrap_err();
    assert!(matches!(err, PluginError::Encode(_)));
    assert!(store.is_empty());
}
