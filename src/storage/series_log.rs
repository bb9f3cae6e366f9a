//! Append-only series log — one file holding every run, tag and blob.
//!
//! ## File Layout
//!
//! ```text
//! [LogHeader   : 16 bytes]
//!   magic      : [u8;8]  = b"VIDPLOG1"
//!   created_at : i64     (unix seconds, LE)
//!
//! [RecordHeader: 32 bytes per record]
//!   magic        : [u8;4]  = b"VREC"
//!   step         : i64     (LE)
//!   wall_time    : f64     (unix seconds, LE)
//!   run_len      : u16     (LE)
//!   tag_len      : u16     (LE)
//!   metadata_len : u32     (LE) — 0 when the series already has metadata
//!   value_count  : u32     (LE)
//!
//! [run | tag | metadata]
//! [value_count × (len: u32 LE, bytes)]
//! ```
//!
//! A blob key is `"<offset>.<len>"` of one value payload, so serving a blob
//! is a single positioned read.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::Utc;
use tracing::{info, warn};

use crate::error::{PluginError, Result};

// ─────────────────────────────── constants ───────────────────────────────────

pub const LOG_FILE_NAME: &str = "series.log";
pub const LOG_MAGIC: &[u8; 8] = b"VIDPLOG1";
pub const RECORD_MAGIC: &[u8; 4] = b"VREC";
pub const LOG_HEADER_SIZE: u64 = 8 + 8;
pub const RECORD_HEADER_SIZE: u64 = 4 + 8 + 8 + 2 + 2 + 4 + 4; // 32 bytes
const VALUE_LEN_SIZE: u64 = 4;

// ─────────────────────────────── types ───────────────────────────────────────

/// Position of one value payload inside the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub offset: u64,
    pub len: u64,
}

impl BlobLocation {
    pub fn to_key(self) -> String {
        format!("{}.{}", self.offset, self.len)
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let (offset, len) = key.split_once('.')?;
        Some(Self {
            offset: offset.parse().ok()?,
            len: len.parse().ok()?,
        })
    }
}

/// A record recovered by [`SeriesLog::scan`].
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    pub run: String,
    pub tag: String,
    pub step: i64,
    pub wall_time: f64,
    pub metadata: Vec<u8>,
    pub values: Vec<BlobLocation>,
}

// ─────────────────────────────── SeriesLog ───────────────────────────────────

/// **Not** thread-safe on its own; `LocalStore` keeps it behind a mutex.
pub struct SeriesLog {
    path: PathBuf,
    /// End of the last complete record; appends start here.
    end: u64,
}

impl SeriesLog {
    /// Open (or create) `base_path/series.log`.
    ///
    /// Call [`scan`](Self::scan) before appending so a torn tail left by a
    /// crash is cut off first.
    pub fn open(base_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_path)
            .map_err(|e| PluginError::Storage(format!("Cannot create storage dir: {e}")))?;

        let path = base_path.join(LOG_FILE_NAME);
        if !path.exists() {
            let mut f = BufWriter::new(File::create(&path)?);
            f.write_all(LOG_MAGIC)?;
            f.write_i64::<LittleEndian>(Utc::now().timestamp())?;
            f.flush()?;
            info!(path = ?path, "Created series log");
            return Ok(Self { path, end: LOG_HEADER_SIZE });
        }

        let mut f = File::open(&path)
            .map_err(|e| PluginError::Storage(format!("open {path:?}: {e}")))?;
        let mut magic = [0u8; 8];
        f.read_exact(&mut magic)
            .map_err(|e| PluginError::Storage(format!("read header {path:?}: {e}")))?;
        if &magic != LOG_MAGIC {
            return Err(PluginError::Storage(format!("{path:?} is not a series log")));
        }
        let end = f.metadata()?.len();
        Ok(Self { path, end })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of the log holding complete records, header included.
    pub fn len(&self) -> u64 {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= LOG_HEADER_SIZE
    }

    /// Append one record. Returns the location of every value, in order.
    ///
    /// On failure the file is cut back to the last complete record.
    pub fn append(
        &mut self,
        run: &str,
        tag: &str,
        step: i64,
        wall_time: f64,
        metadata: &[u8],
        values: &[Vec<u8>],
    ) -> Result<Vec<BlobLocation>> {
        let record = PendingRecord::new(run, tag, step, wall_time, metadata, values)?;
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| PluginError::Storage(format!("open log {:?}: {e}", self.path)))?;

        let written = record.write_to(&file, self.end);
        match written {
            Ok((locations, end)) => {
                self.end = end;
                Ok(locations)
            }
            Err(e) => {
                if let Err(trunc) = file.set_len(self.end) {
                    warn!(path = ?self.path, end = self.end, error = %trunc, "Cannot cut back failed append");
                }
                Err(e)
            }
        }
    }

    /// Read the payload at `loc`.
    pub fn read_blob(&self, loc: BlobLocation) -> Result<Vec<u8>> {
        let in_bounds = loc.offset >= LOG_HEADER_SIZE
            && loc.offset.checked_add(loc.len).is_some_and(|end| end <= self.end);
        if !in_bounds {
            return Err(PluginError::BlobNotFound(loc.to_key()));
        }
        let mut f = File::open(&self.path)
            .map_err(|e| PluginError::Storage(format!("open log {:?}: {e}", self.path)))?;
        f.seek(SeekFrom::Start(loc.offset))?;
        let mut buf = vec![0u8; loc.len as usize];
        f.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Walk every record from the start of the log.
    ///
    /// Stops at the first incomplete or unrecognised record and truncates the
    /// file there, so the next append lands after the last good record.
    pub fn scan(&mut self) -> Result<Vec<ScannedRecord>> {
        let file_len = std::fs::metadata(&self.path)?.len();
        let (records, pos) = self.read_records(LOG_HEADER_SIZE, file_len)?;
        if pos < file_len {
            warn!(
                offset = pos,
                dropped_bytes = file_len - pos,
                path = ?self.path,
                "Incomplete record at end of series log, truncating"
            );
            OpenOptions::new().write(true).open(&self.path)?.set_len(pos)?;
        }
        self.end = pos;
        Ok(records)
    }

    /// Complete records appended past [`len`](Self::len) by another writer.
    ///
    /// A trailing partial record is left in place and picked up by a later
    /// call once its writer has finished it.
    pub fn scan_new(&mut self) -> Result<Vec<ScannedRecord>> {
        let file_len = std::fs::metadata(&self.path)?.len();
        if file_len <= self.end {
            return Ok(Vec::new());
        }
        let (records, pos) = self.read_records(self.end, file_len)?;
        self.end = pos;
        Ok(records)
    }

    /// Records from `start` up to the first incomplete one, and where that
    /// one begins.
    fn read_records(&self, start: u64, file_len: u64) -> Result<(Vec<ScannedRecord>, u64)> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        reader.seek(SeekFrom::Start(start))?;

        let mut records = Vec::new();
        let mut pos = start;
        while pos < file_len {
            match read_record(&mut reader, pos, file_len)? {
                Some((record, next)) => {
                    records.push(record);
                    pos = next;
                }
                None => break,
            }
        }
        Ok((records, pos))
    }
}

/// A record whose field lengths have been checked against the on-disk widths.
struct PendingRecord<'a> {
    step: i64,
    wall_time: f64,
    run: &'a str,
    tag: &'a str,
    metadata: &'a [u8],
    values: &'a [Vec<u8>],
    run_len: u16,
    tag_len: u16,
    metadata_len: u32,
    value_count: u32,
    value_lens: Vec<u32>,
}

impl<'a> PendingRecord<'a> {
    fn new(
        run: &'a str,
        tag: &'a str,
        step: i64,
        wall_time: f64,
        metadata: &'a [u8],
        values: &'a [Vec<u8>],
    ) -> Result<Self> {
        let run_len = u16::try_from(run.len())
            .map_err(|_| PluginError::Storage(format!("run name too long ({} bytes)", run.len())))?;
        let tag_len = u16::try_from(tag.len())
            .map_err(|_| PluginError::Storage(format!("tag name too long ({} bytes)", tag.len())))?;
        let metadata_len = u32::try_from(metadata.len())
            .map_err(|_| PluginError::Storage("metadata exceeds 4 GiB".into()))?;
        let value_count = u32::try_from(values.len())
            .map_err(|_| PluginError::Storage("too many values in one record".into()))?;
        let value_lens = values
            .iter()
            .map(|v| u32::try_from(v.len()))
            .collect::<std::result::Result<Vec<u32>, _>>()
            .map_err(|_| PluginError::Storage("value exceeds 4 GiB".into()))?;
        Ok(Self {
            step,
            wall_time,
            run,
            tag,
            metadata,
            values,
            run_len,
            tag_len,
            metadata_len,
            value_count,
            value_lens,
        })
    }

    /// Write at `offset`. Returns the value locations and the new end of the
    /// log.
    fn write_to(&self, file: &File, offset: u64) -> Result<(Vec<BlobLocation>, u64)> {
        let mut w = BufWriter::new(file);
        w.seek(SeekFrom::Start(offset))?;

        w.write_all(RECORD_MAGIC)?;
        w.write_i64::<LittleEndian>(self.step)?;
        w.write_f64::<LittleEndian>(self.wall_time)?;
        w.write_u16::<LittleEndian>(self.run_len)?;
        w.write_u16::<LittleEndian>(self.tag_len)?;
        w.write_u32::<LittleEndian>(self.metadata_len)?;
        w.write_u32::<LittleEndian>(self.value_count)?;
        w.write_all(self.run.as_bytes())?;
        w.write_all(self.tag.as_bytes())?;
        w.write_all(self.metadata)?;

        let mut pos = offset
            + RECORD_HEADER_SIZE
            + u64::from(self.run_len)
            + u64::from(self.tag_len)
            + u64::from(self.metadata_len);
        let mut locations = Vec::with_capacity(self.values.len());
        for (value, &len) in self.values.iter().zip(&self.value_lens) {
            w.write_u32::<LittleEndian>(len)?;
            w.write_all(value)?;
            pos += VALUE_LEN_SIZE;
            locations.push(BlobLocation { offset: pos, len: u64::from(len) });
            pos += u64::from(len);
        }
        w.flush()?;
        Ok((locations, pos))
    }
}

/// Decode the record at `offset`. `Ok(None)` means the log ends mid-record
/// or the bytes there are not a record.
fn read_record(
    r: &mut BufReader<File>,
    offset: u64,
    file_len: u64,
) -> Result<Option<(ScannedRecord, u64)>> {
    if file_len - offset < RECORD_HEADER_SIZE {
        return Ok(None);
    }
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != RECORD_MAGIC {
        return Ok(None);
    }
    let step = r.read_i64::<LittleEndian>()?;
    let wall_time = r.read_f64::<LittleEndian>()?;
    let run_len = r.read_u16::<LittleEndian>()? as u64;
    let tag_len = r.read_u16::<LittleEndian>()? as u64;
    let metadata_len = r.read_u32::<LittleEndian>()? as u64;
    let value_count = r.read_u32::<LittleEndian>()?;

    let mut pos = offset + RECORD_HEADER_SIZE;
    if pos + run_len + tag_len + metadata_len > file_len {
        return Ok(None);
    }
    let Ok(run) = String::from_utf8(read_vec(r, run_len)?) else {
        return Ok(None);
    };
    let Ok(tag) = String::from_utf8(read_vec(r, tag_len)?) else {
        return Ok(None);
    };
    let metadata = read_vec(r, metadata_len)?;
    pos += run_len + tag_len + metadata_len;

    let mut values = Vec::with_capacity(value_count.min(1024) as usize);
    for _ in 0..value_count {
        if pos + VALUE_LEN_SIZE > file_len {
            return Ok(None);
        }
        let len = r.read_u32::<LittleEndian>()? as u64;
        pos += VALUE_LEN_SIZE;
        if pos + len > file_len {
            return Ok(None);
        }
        values.push(BlobLocation { offset: pos, len });
        r.seek_relative(len as i64)?;
        pos += len;
    }

    Ok(Some((
        ScannedRecord { run, tag, step, wall_time, metadata, values },
        pos,
    )))
}

fn read_vec(r: &mut impl Read, len: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}
