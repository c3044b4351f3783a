use std::io;

use thiserror::Error;

use crate::config::storage::StorageLayout;
use crate::modules::files::model::FileRecord;
use crate::services::{blob, ids};

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON-on-disk record store, one document per file ID.
///
/// There is no locking: concurrent read-modify-write cycles on the same ID
/// can lose updates.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    layout: StorageLayout,
}

impl MetadataStore {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Persists `record`, replacing any previous document for its ID. The
    /// document is synced to a unique temp file and renamed into place.
    pub async fn write(&self, record: &FileRecord) -> Result<(), MetadataError> {
        let path = self.layout.metadata_path(&record.file_id);
        let body = serde_json::to_vec_pretty(record)?;
        blob::write_atomic(&path, &body).await?;
        Ok(())
    }

    /// Loads a record. Missing, unreadable-as-JSON, and invalid IDs all read as `None`.
    pub async fn read(&self, file_id: &str) -> Result<Option<FileRecord>, MetadataError> {
        if !ids::is_valid_file_id(file_id) {
            return Ok(None);
        }

        let raw = match tokio::fs::read(self.layout.metadata_path(file_id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<FileRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(file_id, error = %e, "malformed metadata record, treating as absent");
                Ok(None)
            }
        }
    }

    /// Read-modify-write of an existing record. Returns `Ok(None)` if there is none.
    pub async fn update<F>(&self, file_id: &str, apply: F) -> Result<Option<FileRecord>, MetadataError>
    where
        F: FnOnce(&mut FileRecord),
    {
        let Some(mut record) = self.read(file_id).await? else {
            return Ok(None);
        };
        apply(&mut record);
        self.write(&record).await?;
        Ok(Some(record))
    }

    /// Status bookkeeping that must never affect the operation it accompanies:
    /// failures are logged and dropped.
    pub async fn update_best_effort<F>(&self, file_id: &str, apply: F)
    where
        F: FnOnce(&mut FileRecord),
    {
        if let Err(e) = self.update(file_id, apply).await {
            tracing::warn!(file_id, error = %e, "metadata bookkeeping failed");
        }
    }

    /// Newest first, at most `limit` records. Unreadable documents are skipped.
    pub async fn find_all(&self, limit: usize) -> Result<Vec<FileRecord>, MetadataError> {
        let mut records = Vec::new();
        let mut entries = tokio::fs::read_dir(self.layout.metadata_dir()).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(file_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(record) = self.read(file_id).await? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        records.truncate(limit);
        Ok(records)
    }

    pub async fn count(&self) -> Result<u64, MetadataError> {
        let mut total = 0;
        let mut entries = tokio::fs::read_dir(self.layout.metadata_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                total += 1;
            }
        }
        Ok(total)
    }
}
