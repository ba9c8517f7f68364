//! Append-only journal of target mutations.
//!
//! Each record is framed as a u32 little-endian payload length followed by the
//! MessagePack encoding of a [`JournalRecord`]. Journals are numbered by
//! generation; only the newest generation is ever appended to.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ais_track_core::Mmsi;
use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

const JOURNAL_EXT: &str = "journal";

/// One mutation of the target map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalRecord<T> {
    Put(T),
    Remove(Mmsi),
}

/// Path of the journal for `generation` of database `name`.
pub fn journal_path(dir: &Path, name: &str, generation: u64) -> PathBuf {
    dir.join(format!("{}.{:010}.{}", name, generation, JOURNAL_EXT))
}

/// Extract the generation from a journal file name belonging to `name`.
pub fn parse_generation(file_name: &str, name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(name)?.strip_prefix('.')?;
    let digits = rest.strip_suffix(JOURNAL_EXT)?.strip_suffix('.')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// All journals of database `name` in `dir`, oldest generation first.
pub fn list_journals(dir: &Path, name: &str) -> Result<Vec<(u64, PathBuf)>, StoreError> {
    let mut journals = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let generation = match path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| parse_generation(n, name))
        {
            Some(g) => g,
            None => continue,
        };
        journals.push((generation, path));
    }
    journals.sort_by_key(|(generation, _)| *generation);
    Ok(journals)
}

pub struct JournalWriter {
    generation: u64,
    path: PathBuf,
    file: BufWriter<fs::File>,
    bytes_written: u64,
    records: u64,
}

impl JournalWriter {
    /// Open (or create) the journal for `generation`, appending to any existing content.
    pub fn open(dir: &Path, name: &str, generation: u64) -> Result<Self, StoreError> {
        let path = journal_path(dir, name, generation);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let bytes_written = file.metadata()?.len();

        Ok(Self {
            generation,
            path,
            file: BufWriter::new(file),
            bytes_written,
            records: 0,
        })
    }

    /// Append one record and push it to the OS. Returns the bytes written.
    pub fn append<T: Serialize>(&mut self, record: &JournalRecord<T>) -> Result<u64, StoreError> {
        let encoded = rmp_serde::to_vec(record)?;
        let len = encoded.len() as u32;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&encoded)?;
        self.file.flush()?;

        let written = 4 + encoded.len() as u64;
        self.bytes_written += written;
        self.records += 1;
        Ok(written)
    }

    /// Flush buffered bytes and fsync the file.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the journal file including content from before it was opened.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Records appended through this writer.
    pub fn records(&self) -> u64 {
        self.records
    }
}

/// Records recovered from one journal file.
#[derive(Debug)]
pub struct JournalReplay<T> {
    pub records: Vec<JournalRecord<T>>,
    /// The file ended inside a record (torn final write).
    pub truncated: bool,
}

/// Read every complete record of a journal file.
///
/// A partial trailing record is reported through `truncated` rather than as
/// an error; a complete record that fails to decode is corruption.
pub fn read_journal<T: DeserializeOwned>(path: &Path) -> Result<JournalReplay<T>, StoreError> {
    let file = fs::File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(JournalReplay {
            records: Vec::new(),
            truncated: false,
        });
    }
    let mmap = unsafe { Mmap::map(&file)? };
    let data: &[u8] = &mmap;

    let mut records = Vec::new();
    let mut pos = 0;
    let mut truncated = false;

    while pos < data.len() {
        if pos + 4 > data.len() {
            truncated = true;
            break;
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&data[pos..pos + 4]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if pos + 4 + len > data.len() {
            truncated = true;
            break;
        }

        let record = rmp_serde::from_slice(&data[pos + 4..pos + 4 + len]).map_err(|e| {
            StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("record at byte {pos}: {e}"),
            }
        })?;
        records.push(record);
        pos += 4 + len;
    }

    Ok(JournalReplay { records, truncated })
}
