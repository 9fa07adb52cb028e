//! JSONL-backed record store.
//!
//! The whole table lives in memory; every mutation rewrites the snapshot
//! through a temp file and a rename, so readers of the file never observe a
//! half-written table.

use crate::error::StoreError;
use crate::store::{ListRange, PutOutcome, RecordStore, ScopeFilter, WriteCondition};
use crate::table::{RecordTable, StoredEntry};
use agora_rs_protocol::{MemoryRecord, RecordId};
use async_trait::async_trait;
use log::{debug, info};
use parking_lot::RwLock;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Record store persisted as one JSON line per record.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    table: RwLock<RecordTable>,
}

impl FileRecordStore {
    /// Open the store at `path`, loading existing records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let table = load_table(&path)?;
        info!(
            "opened file record store (path={}, records={})",
            path.display(),
            table.len()
        );
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a mutation to a copy of the table, persist it, then publish it.
    ///
    /// The in-memory table only changes once the snapshot is on disk.
    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut RecordTable) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut table = self.table.write();
        let mut next = table.clone();
        let result = apply(&mut next)?;
        write_table(&self.path, &next)?;
        *table = next;
        Ok(result)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn load_table(path: &Path) -> Result<RecordTable, StoreError> {
    if !path.exists() {
        return Ok(RecordTable::default());
    }
    let reader = BufReader::new(OpenOptions::new().read(true).open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str::<StoredEntry>(&line)?);
    }
    Ok(RecordTable::from_entries(entries))
}

fn write_table(path: &Path, table: &RecordTable) -> Result<(), StoreError> {
    let temp_path = temp_path(path);
    {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        for entry in table.entries() {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    debug!(
        "wrote record snapshot (path={}, records={})",
        path.display(),
        table.len()
    );
    Ok(())
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get(&self, id: RecordId) -> Result<Option<MemoryRecord>, StoreError> {
        Ok(self.table.read().get(id))
    }

    async fn put(
        &self,
        record: MemoryRecord,
        embedding: Option<Vec<f32>>,
        condition: WriteCondition,
    ) -> Result<PutOutcome, StoreError> {
        // A superseded write leaves the snapshot untouched.
        if condition == WriteCondition::NewerThanStored {
            let table = self.table.read();
            if let Some(stored) = table.get(record.id) {
                if record.updated_at <= stored.updated_at {
                    return Ok(PutOutcome::Superseded {
                        current_updated_at: stored.updated_at,
                    });
                }
            }
        }
        self.mutate(|table| table.put(record, embedding, condition))
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        if self.table.read().get(id).is_none() {
            return Ok(false);
        }
        self.mutate(|table| Ok(table.delete(id)))
    }

    async fn query_similar(
        &self,
        embedding: &[f32],
        scope: &ScopeFilter,
        k: usize,
    ) -> Result<Vec<(RecordId, f32)>, StoreError> {
        Ok(self.table.read().query_similar(embedding, scope, k))
    }

    async fn list_by_created_at(
        &self,
        scope: &ScopeFilter,
        range: ListRange,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        Ok(self.table.read().list(scope, range))
    }

    async fn embedding(&self, id: RecordId) -> Result<Option<Vec<f32>>, StoreError> {
        Ok(self.table.read().embedding(id))
    }
}
