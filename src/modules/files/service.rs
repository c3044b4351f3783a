use std::error::Error as StdError;
use std::path::Path;

use axum::body::Bytes;
use futures::Stream;
use thiserror::Error;

use crate::config::storage::StorageLayout;
use crate::modules::files::crud::{MetadataError, MetadataStore};
use crate::modules::files::model::FileRecord;
use crate::services::blob::{self, BlobError};
use crate::services::conversion::{ConversionError, ConversionRunner};
use crate::services::ids;

pub const ALLOWED_MIME_TYPES: [&str; 7] = [
    "audio/ogg",
    "audio/opus",
    "audio/mpeg",
    "audio/wav",
    "audio/x-wav",
    "audio/oga",
    "audio/mp3",
];

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Unsupported audio type: {0}")]
    UnsupportedMediaType(String),
    #[error("File size exceeds max limit of {0} bytes")]
    PayloadTooLarge(u64),
    #[error("Failed to read upload: {0}")]
    Incomplete(String),
    #[error("Failed to save file: {0}")]
    Storage(String),
}

impl From<BlobError> for UploadError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::PayloadTooLarge(limit) => Self::PayloadTooLarge(limit),
            BlobError::Incomplete(msg) => Self::Incomplete(msg),
            BlobError::Storage(e) => Self::Storage(e.to_string()),
        }
    }
}

impl From<MetadataError> for UploadError {
    fn from(e: MetadataError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// True if `mime_type` (parameters ignored) is on the allow-list.
pub fn is_allowed_mime_type(mime_type: &str) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    ALLOWED_MIME_TYPES.contains(&essence.as_str())
}

/// Save, maybe convert, then record: the upload half of the pipeline.
pub struct UploadService {
    layout: StorageLayout,
    store: MetadataStore,
    converter: ConversionRunner,
    max_upload_bytes: u64,
    sample_rate: u32,
}

impl UploadService {
    pub fn new(
        layout: StorageLayout,
        store: MetadataStore,
        converter: ConversionRunner,
        max_upload_bytes: u64,
        sample_rate: u32,
    ) -> Self {
        Self {
            layout,
            store,
            converter,
            max_upload_bytes,
            sample_rate,
        }
    }

    pub async fn upload<S, E>(
        &self,
        original_name: &str,
        mime_type: &str,
        stream: S,
    ) -> Result<FileRecord, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: StdError,
    {
        if !is_allowed_mime_type(mime_type) {
            tracing::info!(mime_type, "rejecting upload with unsupported type");
            return Err(UploadError::UnsupportedMediaType(mime_type.to_string()));
        }

        let stored_name = ids::new_stored_name(original_name);
        let file_id = ids::file_id_of(&stored_name).to_string();
        let blob_path = self.layout.blob_path(&stored_name);

        let size_bytes = blob::save(stream, &blob_path, self.max_upload_bytes).await?;
        tracing::info!(file_id = %file_id, size_bytes, original_name, "upload saved");

        let mut record = FileRecord::new(
            file_id.clone(),
            original_name.to_string(),
            stored_name.clone(),
            mime_type.to_string(),
            size_bytes,
        );

        let needs_conversion = ids::extension_of(&stored_name)
            .map(ConversionRunner::needs_conversion)
            .unwrap_or(false);

        if needs_conversion {
            let converted_path = self.layout.converted_path(&file_id);
            match self.convert(&blob_path, &converted_path).await {
                Ok(duration) => {
                    let converted_name = format!("{}.wav", file_id);
                    tracing::info!(file_id = %file_id, duration_seconds = duration, "conversion finished");
                    record.record_conversion(
                        converted_name,
                        converted_path.to_string_lossy().into_owned(),
                        duration,
                    );
                }
                Err(e) => {
                    tracing::warn!(file_id = %file_id, error = %e, "conversion failed, keeping original upload");
                    let _ = tokio::fs::remove_file(&converted_path).await;
                    record.record_conversion_error(e.to_string());
                }
            }
        }

        if let Err(e) = self.store.write(&record).await {
            tracing::error!(file_id = %file_id, error = %e, "could not create metadata record");
            let _ = tokio::fs::remove_file(&blob_path).await;
            if record.converted_path.is_some() {
                let _ = tokio::fs::remove_file(self.layout.converted_path(&file_id)).await;
            }
            return Err(e.into());
        }

        Ok(record)
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<f64, ConversionError> {
        self.converter.convert(input, output, self.sample_rate).await?;
        self.converter.probe_duration_seconds(output).await
    }

    pub async fn find(&self, file_id: &str) -> Result<Option<FileRecord>, MetadataError> {
        self.store.read(file_id).await
    }

    pub async fn list(&self, limit: usize) -> Result<(Vec<FileRecord>, u64), MetadataError> {
        let records = self.store.find_all(limit).await?;
        let total = self.store.count().await?;
        Ok((records, total))
    }
}
