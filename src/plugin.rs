// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! The videos plugin: tag listing, per-series video metadata and blob
//! serving, on top of a host-supplied [`DataProvider`].
//!
//! Every method is a stateless request → response mapping; all data comes
//! from the provider on each call.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use pulldown_cmark::{html, Options, Parser};
use serde::Serialize;
use tracing::warn;

use crate::demux::{self, Demuxer};
use crate::error::{PluginError, Result};
use crate::metadata::{self, MetadataVersionChecker, PLUGIN_NAME, PROTO_VERSION};
use crate::provider::{BlobReference, BlobSequenceDatum, DataProvider, RunTagFilter};
use crate::summary::HEADER_LEN;

/// Videos kept per series when the host gives no sampling hint.
pub const DEFAULT_DOWNSAMPLING: usize = 10;

pub const VIDEO_MIMETYPE: &str = "video/mp4";

/// Route paths, relative to the plugin mount point.
pub const ROUTES: &[&str] = &["/index.js", "/videos", "/individualVideo", "/tags"];

/// What the host hands a plugin at construction.
#[derive(Clone)]
pub struct PluginContext {
    /// Plugin name → samples to keep per series.
    pub sampling_hints: HashMap<String, usize>,
    pub data_provider: Arc<dyn DataProvider>,
}

/// Where the host finds the plugin's frontend.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FrontendMetadata {
    pub es_module_path: String,
}

/// Lifecycle hooks a host calls on every plugin.
pub trait TbPlugin: Send + Sync {
    fn plugin_name(&self) -> &'static str;
    fn is_active(&self) -> bool;
    fn frontend_metadata(&self) -> FrontendMetadata;
    fn routes(&self) -> &'static [&'static str];
}

/// One entry of `GET /tags`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagInfo {
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub description: String,
    pub samples: usize,
}

/// `run → tag → TagInfo`.
pub type TagIndex = BTreeMap<String, BTreeMap<String, TagInfo>>;

/// One entry of `GET /videos`. `batch_size` is present only when the request
/// named a value index for it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoEntry {
    pub wall_time: f64,
    pub step: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,
    /// `blob_key=...`, ready to append to `individualVideo?`.
    pub query: String,
}

pub struct VideosPlugin {
    downsample_to: usize,
    data_provider: Arc<dyn DataProvider>,
    version_checker: MetadataVersionChecker,
    demuxer: Demuxer,
}

impl VideosPlugin {
    pub fn new(context: PluginContext) -> Self {
        let downsample_to = context
            .sampling_hints
            .get(PLUGIN_NAME)
            .copied()
            .unwrap_or(DEFAULT_DOWNSAMPLING);
        Self {
            downsample_to,
            data_provider: context.data_provider,
            version_checker: MetadataVersionChecker::new("video", PROTO_VERSION),
            demuxer: Demuxer::default(),
        }
    }

    /// Use a specific ffmpeg/ffprobe pair for track extraction.
    pub fn with_demuxer(mut self, demuxer: Demuxer) -> Self {
        self.demuxer = demuxer;
        self
    }

    pub fn downsample_to(&self) -> usize {
        self.downsample_to
    }

    /// Tag listing. Runs with no servable tags still appear, empty.
    pub fn index_impl(&self, experiment: &str) -> Result<TagIndex> {
        let mapping = self.data_provider.list_blob_sequences(experiment, PLUGIN_NAME)?;
        let mut result = TagIndex::new();
        for (run, tag_to_content) in mapping {
            let tags = result.entry(run.clone()).or_default();
            for (tag, series) in tag_to_content {
                let md = match metadata::parse_plugin_metadata(&series.plugin_content) {
                    Ok(md) => md,
                    Err(e) => {
                        warn!(run, tag, error = %e, "Skipping series with unreadable metadata");
                        continue;
                    }
                };
                if !self.version_checker.ok(md.version, &run, &tag) {
                    continue;
                }
                tags.insert(
                    tag,
                    TagInfo {
                        display_name: series.display_name,
                        description: markdown_to_safe_html(&series.description),
                        samples: series.max_length.saturating_sub(HEADER_LEN),
                    },
                );
            }
        }
        Ok(result)
    }

    /// Wall time, step and blob query of video `sample` at each kept step.
    ///
    /// The two indexes count differently. `sample` picks a video, so
    /// `sample = 0` is the first value after the `[w, h, fps]` header.
    /// `batch_size`, if given, is a raw index into the stored values, header
    /// included, of a decimal integer that is read and reported per step.
    pub fn video_response_for_run(
        &self,
        experiment: &str,
        run: &str,
        tag: &str,
        sample: usize,
        batch_size: Option<usize>,
    ) -> Result<Vec<VideoEntry>> {
        let all_videos = self.data_provider.read_blob_sequences(
            experiment,
            PLUGIN_NAME,
            self.downsample_to,
            &RunTagFilter::single(run, tag),
        )?;
        let videos = all_videos
            .get(run)
            .and_then(|tags| tags.get(tag))
            .ok_or_else(|| PluginError::NotFound {
                run: run.to_string(),
                tag: tag.to_string(),
            })?;

        let value_idx = HEADER_LEN.checked_add(sample).ok_or_else(|| {
            PluginError::InvalidArgument(format!("sample {sample} out of range"))
        })?;
        videos
            .iter()
            .filter(|datum| datum.values.len() > value_idx)
            .map(|datum| -> Result<VideoEntry> {
                let batch_size = batch_size
                    .map(|idx| self.integer_at(datum, idx))
                    .transpose()?;
                Ok(VideoEntry {
                    wall_time: datum.wall_time,
                    step: datum.step,
                    batch_size,
                    query: data_provider_query(&datum.values[value_idx])?,
                })
            })
            .collect()
    }

    /// Bytes of one blob, or of one video track inside it.
    ///
    /// With `track_number`, a failed extraction serves the whole blob
    /// instead of failing the request.
    pub async fn individual_video(
        &self,
        blob_key: &str,
        track_number: Option<usize>,
    ) -> Result<Vec<u8>> {
        let data = self.data_provider.read_blob(blob_key)?;
        Ok(match track_number {
            None => data,
            Some(track) => demux::track_or_original(&self.demuxer, data, track).await,
        })
    }

    fn integer_at(&self, datum: &BlobSequenceDatum, idx: usize) -> Result<i64> {
        let reference = datum.values.get(idx).ok_or_else(|| {
            PluginError::InvalidArgument(format!(
                "value {idx} missing at step {}",
                datum.step
            ))
        })?;
        let raw = self.data_provider.read_blob(&reference.blob_key)?;
        std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| {
                PluginError::InvalidArgument(format!(
                    "value {idx} at step {} is not an integer",
                    datum.step
                ))
            })
    }
}

impl TbPlugin for VideosPlugin {
    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    // Listing in the provider is enough to decide what to show.
    fn is_active(&self) -> bool {
        true
    }

    fn frontend_metadata(&self) -> FrontendMetadata {
        FrontendMetadata { es_module_path: "/index.js".to_string() }
    }

    fn routes(&self) -> &'static [&'static str] {
        ROUTES
    }
}

fn data_provider_query(reference: &BlobReference) -> Result<String> {
    serde_urlencoded::to_string([("blob_key", reference.blob_key.as_str())])
        .map_err(|e| PluginError::InvalidArgument(format!("blob key: {e}")))
}

/// Descriptions are written as Markdown and shown as HTML by the frontend.
fn markdown_to_safe_html(markdown: &str) -> String {
    if markdown.is_empty() {
        return String::new();
    }
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);
    let mut unsafe_html = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut unsafe_html, parser);
    ammonia::clean(&unsafe_html)
}
