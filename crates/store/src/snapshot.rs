//! Compacted, zstd-compressed image of the whole target map.
//!
//! Layout inside the zstd stream: a length-prefixed MessagePack
//! [`SnapshotHeader`] followed by `entry_count` length-prefixed entries.
//! Snapshots are written beside the live file and renamed into place, so a
//! reader only ever sees a complete snapshot or the previous one.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub format_version: u16,
    /// First journal generation that is NOT contained in this snapshot.
    pub generation: u64,
    pub entry_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Snapshot<T> {
    pub header: SnapshotHeader,
    pub entries: Vec<T>,
}

pub fn snapshot_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.snapshot", name))
}

pub fn snapshot_tmp_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.snapshot.tmp", name))
}

fn write_frame<W: Write, V: Serialize + ?Sized>(out: &mut W, value: &V) -> Result<u64, StoreError> {
    let encoded = rmp_serde::to_vec(value)?;
    out.write_all(&(encoded.len() as u32).to_le_bytes())?;
    out.write_all(&encoded)?;
    Ok(4 + encoded.len() as u64)
}

/// Write a snapshot of `entries` whose journal replay starts at `generation`.
///
/// Returns the compressed size of the snapshot file.
pub fn write_snapshot<T: Serialize>(
    dir: &Path,
    name: &str,
    generation: u64,
    entries: &[T],
) -> Result<u64, StoreError> {
    let tmp_path = snapshot_tmp_path(dir, name);
    let final_path = snapshot_path(dir, name);

    let file = fs::File::create(&tmp_path)?;
    let mut encoder = zstd::Encoder::new(BufWriter::new(file), 3)?;

    let header = SnapshotHeader {
        format_version: SNAPSHOT_FORMAT_VERSION,
        generation,
        entry_count: entries.len() as u64,
        created_at: Utc::now(),
    };
    let mut raw_bytes = write_frame(&mut encoder, &header)?;
    for entry in entries {
        raw_bytes += write_frame(&mut encoder, entry)?;
    }

    let buf_writer = encoder.finish()?;
    let file = buf_writer.into_inner().map_err(|e| StoreError::Io(e.into_error()))?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, &final_path)?;
    // Persist the rename itself; not supported on every platform.
    if let Ok(dir_handle) = fs::File::open(dir) {
        dir_handle.sync_all().ok();
    }

    let size_bytes = fs::metadata(&final_path)?.len();
    debug!(
        path = %final_path.display(),
        generation,
        entries = entries.len(),
        raw_bytes,
        size_bytes,
        "Snapshot written"
    );
    Ok(size_bytes)
}

/// Load the snapshot of database `name`, or `None` if it has never been compacted.
pub fn read_snapshot<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Option<Snapshot<T>>, StoreError> {
    let path = snapshot_path(dir, name);
    if !path.exists() {
        return Ok(None);
    }

    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.clone(),
        reason,
    };

    let file = fs::File::open(&path)?;
    if file.metadata()?.len() == 0 {
        return Err(corrupt("empty snapshot file".to_string()));
    }
    let mmap = unsafe { Mmap::map(&file)? };
    let data = zstd::decode_all(mmap.as_ref())?;

    let mut frames = FrameIter { data: &data, pos: 0 };

    let header: SnapshotHeader = match frames.next() {
        Some(frame) => rmp_serde::from_slice(frame.map_err(corrupt)?)?,
        None => return Err(corrupt("missing header".to_string())),
    };
    if header.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {}",
            header.format_version
        )));
    }

    let mut entries = Vec::with_capacity((header.entry_count as usize).min(data.len() / 4));
    for frame in frames {
        entries.push(rmp_serde::from_slice(frame.map_err(corrupt)?)?);
    }
    if entries.len() as u64 != header.entry_count {
        return Err(corrupt(format!(
            "header promises {} entries, found {}",
            header.entry_count,
            entries.len()
        )));
    }

    Ok(Some(Snapshot { header, entries }))
}

struct FrameIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<&'a [u8], String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        if self.pos + 4 > self.data.len() {
            self.pos = self.data.len();
            return Some(Err("truncated frame length".to_string()));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        let start = self.pos + 4;

        if start + len > self.data.len() {
            self.pos = self.data.len();
            return Some(Err(format!("truncated frame at byte {}", start - 4)));
        }

        self.pos = start + len;
        Some(Ok(&self.data[start..start + len]))
    }
}
