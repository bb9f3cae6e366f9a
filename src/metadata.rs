// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Per-series plugin metadata.
//!
//! Every video series carries a [`SummaryMetadata`] envelope whose
//! `plugin_data.content` is a serialized [`VideoPluginData`]. Both are
//! protobuf messages so the host can store them without knowing the plugin.

use std::sync::atomic::{AtomicBool, Ordering};

use prost::Message;
use tracing::warn;

use crate::error::Result;

/// Name under which series are filed in the store and routes are mounted.
pub const PLUGIN_NAME: &str = "videos";

/// Latest `VideoPluginData.version` this crate understands.
pub const PROTO_VERSION: i32 = 0;

#[derive(Clone, PartialEq, Message)]
pub struct VideoPluginData {
    #[prost(int32, tag = "1")]
    pub version: i32,
    #[prost(bool, tag = "2")]
    pub converted_to_tensor: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct PluginData {
    #[prost(string, tag = "1")]
    pub plugin_name: String,
    #[prost(bytes = "vec", tag = "2")]
    pub content: Vec<u8>,
}

/// Host-level metadata attached to the first record of a series.
#[derive(Clone, PartialEq, Message)]
pub struct SummaryMetadata {
    #[prost(message, optional, tag = "1")]
    pub plugin_data: Option<PluginData>,
    #[prost(string, tag = "2")]
    pub display_name: String,
    #[prost(string, tag = "3")]
    pub summary_description: String,
}

impl SummaryMetadata {
    /// Name of the plugin owning this series, empty if unset.
    pub fn plugin_name(&self) -> &str {
        self.plugin_data.as_ref().map(|p| p.plugin_name.as_str()).unwrap_or("")
    }

    /// Raw plugin content, empty if unset.
    pub fn plugin_content(&self) -> &[u8] {
        self.plugin_data.as_ref().map(|p| p.content.as_slice()).unwrap_or(&[])
    }
}

/// Build the metadata envelope for a video series.
pub fn create_summary_metadata(
    display_name: &str,
    description: &str,
    converted_to_tensor: bool,
) -> SummaryMetadata {
    let content = VideoPluginData {
        version: PROTO_VERSION,
        converted_to_tensor,
    };
    SummaryMetadata {
        display_name: display_name.to_string(),
        summary_description: description.to_string(),
        plugin_data: Some(PluginData {
            plugin_name: PLUGIN_NAME.to_string(),
            content: content.encode_to_vec(),
        }),
    }
}

/// Parse the `content` field of a video series' [`PluginData`].
///
/// Versions newer than [`PROTO_VERSION`] are returned untouched; there are
/// no migrations yet.
pub fn parse_plugin_metadata(content: &[u8]) -> Result<VideoPluginData> {
    let result = VideoPluginData::decode(content)?;
    Ok(result)
}

/// Filters out series written by a newer version of the plugin.
///
/// Warns once per checker so a directory full of new-format data does not
/// flood the log.
#[derive(Debug)]
pub struct MetadataVersionChecker {
    data_kind: &'static str,
    latest_known_version: i32,
    warned: AtomicBool,
}

impl MetadataVersionChecker {
    pub fn new(data_kind: &'static str, latest_known_version: i32) -> Self {
        Self {
            data_kind,
            latest_known_version,
            warned: AtomicBool::new(false),
        }
    }

    /// Whether a series at `version` can be served.
    pub fn ok(&self, version: i32, run: &str, tag: &str) -> bool {
        if version <= self.latest_known_version {
            return true;
        }
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                kind = self.data_kind,
                run,
                tag,
                version,
                latest = self.latest_known_version,
                "Some {} data has an unknown metadata version; upgrade to view it",
                self.data_kind
            );
        }
        false
    }
}
