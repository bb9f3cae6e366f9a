// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! `LocalStore` — the series log plus its in-memory index, exposed through
//! the [`DataProvider`] and [`TimeSeriesSink`] contracts.

use std::path::Path;

use parking_lot::{Mutex, RwLock};
use prost::Message;
use tracing::{debug, info};

use crate::error::{PluginError, Result};
use crate::metadata::SummaryMetadata;
use crate::provider::{
    BlobReference, BlobSequenceDatum, BlobSequenceTimeSeries, DataProvider, RunTagFilter,
    RunTagMap, TimeSeriesSink,
};
use crate::storage::index::{downsample, SeriesIndex};
use crate::storage::series_log::{BlobLocation, SeriesLog};

/// File-backed blob-sequence store serving a single experiment.
pub struct LocalStore {
    log: Mutex<SeriesLog>,
    index: RwLock<SeriesIndex>,
}

impl LocalStore {
    /// Open the log under `base_path` and rebuild the index from it.
    pub fn open(base_path: &Path) -> Result<Self> {
        let mut log = SeriesLog::open(base_path)?;
        let records = log.scan()?;
        let count = records.len();
        let mut index = SeriesIndex::new();
        index.rebuild_from_scanned(records);
        if count > 0 {
            info!(recovered = count, path = ?log.path(), "Series index rebuilt from log");
        }
        Ok(Self {
            log: Mutex::new(log),
            index: RwLock::new(index),
        })
    }

    /// Number of data points across all series.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Index records appended to the log by other writers since the last
    /// scan. Called before every read so a running server sees new
    /// summaries without a restart.
    pub fn refresh(&self) -> Result<usize> {
        let mut log = self.log.lock();
        self.catch_up(&mut log)
    }

    fn catch_up(&self, log: &mut SeriesLog) -> Result<usize> {
        let records = log.scan_new()?;
        let count = records.len();
        if count > 0 {
            self.index.write().extend_from_scanned(records);
            debug!(records = count, "Indexed records from another writer");
        }
        Ok(count)
    }
}

impl DataProvider for LocalStore {
    fn list_blob_sequences(
        &self,
        _experiment_id: &str,
        plugin_name: &str,
    ) -> Result<RunTagMap<BlobSequenceTimeSeries>> {
        self.refresh()?;
        let index = self.index.read();
        let mut result = RunTagMap::new();
        for (run, tag, series) in index.all_series() {
            if series.metadata.plugin_name() != plugin_name {
                continue;
            }
            result.entry(run.to_string()).or_default().insert(
                tag.to_string(),
                BlobSequenceTimeSeries {
                    max_step: series.max_step(),
                    max_wall_time: series.max_wall_time(),
                    max_length: series.max_length(),
                    plugin_content: series.metadata.plugin_content().to_vec(),
                    description: series.metadata.summary_description.clone(),
                    display_name: series.metadata.display_name.clone(),
                },
            );
        }
        Ok(result)
    }

    fn read_blob_sequences(
        &self,
        _experiment_id: &str,
        plugin_name: &str,
        downsample_to: usize,
        filter: &RunTagFilter,
    ) -> Result<RunTagMap<Vec<BlobSequenceDatum>>> {
        self.refresh()?;
        let index = self.index.read();
        let mut result = RunTagMap::new();
        for (run, tag, series) in index.all_series() {
            if series.metadata.plugin_name() != plugin_name || !filter.matches(run, tag) {
                continue;
            }
            let data = downsample(&series.points, downsample_to)
                .into_iter()
                .map(|p| BlobSequenceDatum {
                    step: p.step,
                    wall_time: p.wall_time,
                    values: p
                        .values
                        .iter()
                        .map(|loc| BlobReference { blob_key: loc.to_key() })
                        .collect(),
                })
                .collect();
            result.entry(run.to_string()).or_default().insert(tag.to_string(), data);
        }
        Ok(result)
    }

    fn read_blob(&self, blob_key: &str) -> Result<Vec<u8>> {
        self.refresh()?;
        let loc = BlobLocation::from_key(blob_key)
            .filter(|loc| self.index.read().contains_blob(loc))
            .ok_or_else(|| PluginError::BlobNotFound(blob_key.to_string()))?;
        self.log.lock().read_blob(loc)
    }
}

impl TimeSeriesSink for LocalStore {
    fn write_blob_sequence(
        &self,
        run: &str,
        tag: &str,
        step: i64,
        wall_time: f64,
        metadata: &SummaryMetadata,
        values: &[Vec<u8>],
    ) -> Result<()> {
        // Serialises appends; the index write lock is taken only after the
        // record is on disk.
        let mut log = self.log.lock();
        self.catch_up(&mut log)?;
        let first = self
            .index
            .read()
            .series(run, tag)
            .map_or(true, |s| !s.has_metadata());
        let metadata_bytes = if first { metadata.encode_to_vec() } else { Vec::new() };

        let locations = log.append(run, tag, step, wall_time, &metadata_bytes, values)?;
        self.index.write().insert(
            run,
            tag,
            step,
            wall_time,
            first.then(|| metadata.clone()),
            locations,
        );
        debug!(run, tag, step, values = values.len(), "Blob sequence written");
        Ok(())
    }
}
