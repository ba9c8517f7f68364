use std::collections::HashMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ais_track_core::{Mmsi, Tracked};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::journal::{self, JournalRecord, JournalWriter};
use crate::snapshot;

/// Result of one compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionStats {
    /// Journal generation the new snapshot replays from.
    pub generation: u64,
    pub entries: usize,
    pub snapshot_bytes: u64,
    pub journals_removed: usize,
    pub elapsed: Duration,
}

/// What was found on disk when the database was opened.
#[derive(Debug)]
pub struct Recovered<T> {
    pub entries: HashMap<Mmsi, T>,
    pub snapshot_entries: usize,
    pub journal_records: usize,
    pub truncated_journals: usize,
}

/// Durable backing structure for the target map: a compacted snapshot plus
/// an append-only journal of everything that happened since.
///
/// The database never holds the live map itself. The owner applies each
/// mutation to its map and to the journal in the same order, and hands the
/// database a copy of the map when it is time to compact.
pub struct TargetDb<T> {
    dir: PathBuf,
    name: String,
    /// Active journal; `None` once closed.
    journal: Mutex<Option<JournalWriter>>,
    /// Serializes compactions against each other, never against writers.
    compaction: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> TargetDb<T>
where
    T: Tracked + Serialize + DeserializeOwned,
{
    /// Open database `name` inside `dir`, creating the directory if needed,
    /// and recover its contents.
    pub fn open(dir: &Path, name: &str) -> Result<(Self, Recovered<T>), StoreError> {
        fs::create_dir_all(dir)?;

        let tmp = snapshot::snapshot_tmp_path(dir, name);
        if tmp.exists() {
            warn!(path = %tmp.display(), "Removing leftover snapshot from interrupted compaction");
            fs::remove_file(&tmp)?;
        }

        let mut entries = HashMap::new();
        let mut base_generation = 0;
        let mut snapshot_entries = 0;

        if let Some(snap) = snapshot::read_snapshot::<T>(dir, name)? {
            base_generation = snap.header.generation;
            snapshot_entries = snap.entries.len();
            for target in snap.entries {
                entries.insert(target.mmsi(), target);
            }
            debug!(
                generation = base_generation,
                entries = snapshot_entries,
                "Loaded target snapshot"
            );
        }

        let mut last_generation = base_generation;
        let mut journal_records = 0;
        let mut truncated_journals = 0;

        for (generation, path) in journal::list_journals(dir, name)? {
            if generation < base_generation {
                // Already folded into the snapshot; the compaction that wrote
                // it did not get to delete this file.
                fs::remove_file(&path)?;
                debug!(path = %path.display(), "Removed compacted journal");
                continue;
            }

            let replay = journal::read_journal::<T>(&path)?;
            if replay.truncated {
                warn!(path = %path.display(), "Journal ends in a partial record, ignoring the tail");
                truncated_journals += 1;
            }
            journal_records += replay.records.len();
            for record in replay.records {
                match record {
                    JournalRecord::Put(target) => {
                        entries.insert(target.mmsi(), target);
                    }
                    JournalRecord::Remove(mmsi) => {
                        entries.remove(&mmsi);
                    }
                }
            }
            last_generation = last_generation.max(generation);
        }

        // Never append after a possibly torn tail: always start a new generation.
        let writer = JournalWriter::open(dir, name, last_generation + 1)?;

        info!(
            dir = %dir.display(),
            name = name,
            targets = entries.len(),
            snapshot_entries,
            journal_records,
            generation = writer.generation(),
            "Target database opened"
        );

        let db = Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            journal: Mutex::new(Some(writer)),
            compaction: Mutex::new(()),
            _marker: PhantomData,
        };
        let recovered = Recovered {
            entries,
            snapshot_entries,
            journal_records,
            truncated_journals,
        };
        Ok((db, recovered))
    }

    /// Journal an insert or overwrite.
    pub fn append_put(&self, target: &T) -> Result<(), StoreError> {
        self.append(&JournalRecord::Put(target))
    }

    /// Journal a removal.
    pub fn append_remove(&self, mmsi: Mmsi) -> Result<(), StoreError> {
        self.append(&JournalRecord::<&T>::Remove(mmsi))
    }

    fn append(&self, record: &JournalRecord<&T>) -> Result<(), StoreError> {
        let mut journal = lock(&self.journal);
        let writer = journal.as_mut().ok_or(StoreError::Closed)?;
        writer.append(record)?;
        Ok(())
    }

    /// Size of the active journal; resets on every compaction.
    pub fn journal_bytes(&self) -> u64 {
        lock(&self.journal)
            .as_ref()
            .map(JournalWriter::bytes_written)
            .unwrap_or(0)
    }

    pub fn generation(&self) -> Option<u64> {
        lock(&self.journal).as_ref().map(JournalWriter::generation)
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.journal).is_none()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fold the journal into a fresh snapshot and reclaim the old journals.
    ///
    /// `live` must return the current contents of the owner's map. It runs
    /// after the journal has been rotated, so every mutation missing from the
    /// copy is in the new journal and is replayed on top of the snapshot.
    /// Writers are only blocked for the rotation.
    pub fn compact<F>(&self, live: F) -> Result<CompactionStats, StoreError>
    where
        F: FnOnce() -> Vec<T>,
    {
        let _compacting = lock(&self.compaction);
        let started = Instant::now();

        let generation = {
            let mut journal = lock(&self.journal);
            let current = journal.as_mut().ok_or(StoreError::Closed)?;
            current.sync()?;
            let next = JournalWriter::open(&self.dir, &self.name, current.generation() + 1)?;
            let generation = next.generation();
            *journal = Some(next);
            generation
        };

        let entries = live();
        let snapshot_bytes = snapshot::write_snapshot(&self.dir, &self.name, generation, &entries)?;

        let mut journals_removed = 0;
        for (old_generation, path) in journal::list_journals(&self.dir, &self.name)? {
            if old_generation < generation {
                fs::remove_file(&path)?;
                journals_removed += 1;
            }
        }

        let stats = CompactionStats {
            generation,
            entries: entries.len(),
            snapshot_bytes,
            journals_removed,
            elapsed: started.elapsed(),
        };
        debug!(
            generation,
            entries = stats.entries,
            snapshot_bytes,
            journals_removed,
            "Target database compacted"
        );
        Ok(stats)
    }

    /// Flush and fsync the journal, then refuse further writes.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut journal = lock(&self.journal);
        match journal.take() {
            Some(mut writer) => {
                writer.sync()?;
                info!(
                    name = %self.name,
                    generation = writer.generation(),
                    "Target database closed"
                );
                Ok(())
            }
            None => Err(StoreError::Closed),
        }
    }
}
