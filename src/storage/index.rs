// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Series index — maps (run, tag) → ordered data points → BlobLocations.
//!
//! The index lives in memory but is **persistent**: on startup the series log
//! is scanned and the index is rebuilt from the records already in it. No
//! separate index file is written.

use std::collections::{BTreeMap, HashSet};

use prost::Message;
use tracing::warn;

use crate::metadata::SummaryMetadata;
use crate::storage::series_log::{BlobLocation, ScannedRecord};

/// One step of one series.
#[derive(Debug, Clone)]
pub struct DataPoint {
    pub step: i64,
    pub wall_time: f64,
    pub values: Vec<BlobLocation>,
}

/// All points of one (run, tag) plus the metadata of its first record.
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub metadata: SummaryMetadata,
    pub points: Vec<DataPoint>,
}

impl Series {
    pub fn has_metadata(&self) -> bool {
        self.metadata.plugin_data.is_some()
    }

    pub fn max_step(&self) -> i64 {
        self.points.iter().map(|p| p.step).max().unwrap_or(0)
    }

    pub fn max_wall_time(&self) -> f64 {
        self.points.iter().map(|p| p.wall_time).fold(0.0, f64::max)
    }

    pub fn max_length(&self) -> usize {
        self.points.iter().map(|p| p.values.len()).max().unwrap_or(0)
    }
}

/// In-memory index of every series in the log.
#[derive(Default)]
pub struct SeriesIndex {
    runs: BTreeMap<String, BTreeMap<String, Series>>,
    blobs: HashSet<BlobLocation>,
    point_count: usize,
}

impl SeriesIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one data point. `metadata` only takes effect on a series that
    /// has none yet.
    pub fn insert(
        &mut self,
        run: &str,
        tag: &str,
        step: i64,
        wall_time: f64,
        metadata: Option<SummaryMetadata>,
        values: Vec<BlobLocation>,
    ) {
        let series = self
            .runs
            .entry(run.to_string())
            .or_default()
            .entry(tag.to_string())
            .or_default();
        if let Some(md) = metadata {
            if !series.has_metadata() {
                series.metadata = md;
            }
        }
        self.blobs.extend(values.iter().copied());
        series.points.push(DataPoint { step, wall_time, values });
        self.point_count += 1;
    }

    pub fn series(&self, run: &str, tag: &str) -> Option<&Series> {
        self.runs.get(run)?.get(tag)
    }

    /// Every (run, tag, series) in run then tag order.
    pub fn all_series(&self) -> impl Iterator<Item = (&str, &str, &Series)> {
        self.runs.iter().flat_map(|(run, tags)| {
            tags.iter().map(move |(tag, s)| (run.as_str(), tag.as_str(), s))
        })
    }

    /// Whether `loc` is exactly one value issued by this index.
    pub fn contains_blob(&self, loc: &BlobLocation) -> bool {
        self.blobs.contains(loc)
    }

    /// Total number of indexed data points.
    pub fn len(&self) -> usize {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Rebuild the index from records recovered by scanning the log.
    pub fn rebuild_from_scanned(&mut self, records: Vec<ScannedRecord>) {
        self.runs.clear();
        self.blobs.clear();
        self.point_count = 0;
        self.extend_from_scanned(records);
    }

    /// Add records found past the previously scanned end of the log.
    pub fn extend_from_scanned(&mut self, records: Vec<ScannedRecord>) {
        for r in records {
            let metadata = if r.metadata.is_empty() {
                None
            } else {
                match SummaryMetadata::decode(r.metadata.as_slice()) {
                    Ok(md) => Some(md),
                    Err(e) => {
                        warn!(run = r.run, tag = r.tag, step = r.step, error = %e, "Unreadable series metadata");
                        None
                    }
                }
            };
            self.insert(&r.run, &r.tag, r.step, r.wall_time, metadata, r.values);
        }
    }
}

/// Keep at most `k` items, evenly spaced, always including the first and
/// last.
pub fn downsample<T: Clone>(items: &[T], k: usize) -> Vec<T> {
    let n = items.len();
    if n <= k {
        return items.to_vec();
    }
    match k {
        0 => Vec::new(),
        1 => vec![items[n - 1].clone()],
        _ => (0..k).map(|i| items[i * (n - 1) / (k - 1)].clone()).collect(),
    }
}

