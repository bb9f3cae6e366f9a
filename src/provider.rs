// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Contract between plugins and the time-series store they read from.
//!
//! The serving side only ever sees a [`DataProvider`]; the summary writer
//! only ever sees a [`TimeSeriesSink`]. `storage::LocalStore` implements both.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::metadata::SummaryMetadata;

/// `run → tag → T`, ordered so responses are stable.
pub type RunTagMap<T> = BTreeMap<String, BTreeMap<String, T>>;

/// Summary of one blob-sequence series, without its data.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobSequenceTimeSeries {
    pub max_step: i64,
    pub max_wall_time: f64,
    /// Largest number of values in any datum of the series.
    pub max_length: usize,
    pub plugin_content: Vec<u8>,
    pub description: String,
    pub display_name: String,
}

/// Opaque handle to one stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReference {
    pub blob_key: String,
}

/// One step of a blob-sequence series.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobSequenceDatum {
    pub step: i64,
    pub wall_time: f64,
    pub values: Vec<BlobReference>,
}

/// Restricts a read to the given runs and tags. `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct RunTagFilter {
    pub runs: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl RunTagFilter {
    pub fn new(runs: Option<Vec<String>>, tags: Option<Vec<String>>) -> Self {
        Self { runs, tags }
    }

    /// Filter matching exactly one run and one tag.
    pub fn single(run: &str, tag: &str) -> Self {
        Self::new(Some(vec![run.to_string()]), Some(vec![tag.to_string()]))
    }

    pub fn matches(&self, run: &str, tag: &str) -> bool {
        let run_ok = self.runs.as_ref().map_or(true, |r| r.iter().any(|x| x == run));
        let tag_ok = self.tags.as_ref().map_or(true, |t| t.iter().any(|x| x == tag));
        run_ok && tag_ok
    }
}

/// Read-only view of the host's blob-sequence store.
pub trait DataProvider: Send + Sync {
    /// All series filed under `plugin_name`.
    fn list_blob_sequences(
        &self,
        experiment_id: &str,
        plugin_name: &str,
    ) -> Result<RunTagMap<BlobSequenceTimeSeries>>;

    /// Series data, keeping at most `downsample` data per series.
    fn read_blob_sequences(
        &self,
        experiment_id: &str,
        plugin_name: &str,
        downsample: usize,
        filter: &RunTagFilter,
    ) -> Result<RunTagMap<Vec<BlobSequenceDatum>>>;

    /// Raw bytes behind a key previously issued by this provider.
    fn read_blob(&self, blob_key: &str) -> Result<Vec<u8>>;
}

/// Append side of the store, used at training time.
pub trait TimeSeriesSink: Send + Sync {
    fn write_blob_sequence(
        &self,
        run: &str,
        tag: &str,
        step: i64,
        wall_time: f64,
        metadata: &SummaryMetadata,
        values: &[Vec<u8>],
    ) -> Result<()>;
}
