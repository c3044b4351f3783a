use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::storage::StorageLayout;
use crate::modules::files::crud::MetadataStore;
use crate::modules::files::model::FileRecord;
use crate::services::conversion::ConversionRunner;
use crate::services::engine::{EngineError, Transcript, TranscriptionEngine};
use crate::services::ids;

#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Metadata not found for file id {0}")]
    MetadataNotFound(String),
    #[error("No converted audio recorded for file id {0}")]
    MissingConvertedPath(String),
    #[error("Converted audio file not found: {0}")]
    ConvertedFileNotFound(PathBuf),
    #[error("Audio file not found: {0}")]
    AudioNotFound(PathBuf),
    #[error("{0}")]
    Failure(String),
}

impl From<EngineError> for TranscribeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::AudioNotFound(path) => Self::AudioNotFound(path),
            other => Self::Failure(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    Converted,
    Original,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub path: PathBuf,
    pub source: AudioSource,
}

impl ResolvedAudio {
    fn converted(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: AudioSource::Converted,
        }
    }
}

type Strategy = fn(&FileRecord, &StorageLayout) -> Option<ResolvedAudio>;

/// Where a record may say its audio lives, most specific first.
const STRATEGIES: [(&str, Strategy); 4] = [
    ("converted_path", from_converted_path as Strategy),
    ("extra.converted_path", from_nested_extra as Strategy),
    ("converted_name", from_converted_name as Strategy),
    ("original_upload", from_original_upload as Strategy),
];

fn from_converted_path(record: &FileRecord, _: &StorageLayout) -> Option<ResolvedAudio> {
    non_empty(record.converted_path.as_deref()).map(ResolvedAudio::converted)
}

fn from_nested_extra(record: &FileRecord, _: &StorageLayout) -> Option<ResolvedAudio> {
    let extra = record.extra.as_ref()?;
    non_empty(extra.converted_path.as_deref()).map(ResolvedAudio::converted)
}

fn from_converted_name(record: &FileRecord, layout: &StorageLayout) -> Option<ResolvedAudio> {
    let name = non_empty(record.converted_name.as_deref())
        .or_else(|| non_empty(record.extra.as_ref()?.converted_name.as_deref()))?;
    Some(ResolvedAudio::converted(layout.converted_dir().join(name)))
}

/// Uploads already in a format the engine reads are transcribed in place.
fn from_original_upload(record: &FileRecord, layout: &StorageLayout) -> Option<ResolvedAudio> {
    let convertible = ids::extension_of(&record.stored_name)
        .map(ConversionRunner::needs_conversion)
        .unwrap_or(false);
    if convertible || record.conversion_error.is_some() {
        return None;
    }
    Some(ResolvedAudio {
        path: layout.blob_path(&record.stored_name),
        source: AudioSource::Original,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn resolve_audio(record: &FileRecord, layout: &StorageLayout) -> Option<ResolvedAudio> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let resolved = strategy(record, layout)?;
        tracing::debug!(file_id = %record.file_id, strategy = *name, path = %resolved.path.display(), "resolved audio path");
        Some(resolved)
    })
}

/// Records written elsewhere may carry absolute paths from another root;
/// retry the same file name inside this layout.
async fn relocate(resolved: &ResolvedAudio, layout: &StorageLayout) -> Option<PathBuf> {
    let name = resolved.path.file_name()?;
    let candidate = match resolved.source {
        AudioSource::Converted => layout.converted_dir().join(name),
        AudioSource::Original => layout.upload_dir().join(name),
    };
    if candidate != resolved.path && tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
        Some(candidate)
    } else {
        None
    }
}

pub struct TranscriptionService {
    layout: StorageLayout,
    store: MetadataStore,
    engine: Arc<TranscriptionEngine>,
}

impl TranscriptionService {
    pub fn new(layout: StorageLayout, store: MetadataStore, engine: Arc<TranscriptionEngine>) -> Self {
        Self {
            layout,
            store,
            engine,
        }
    }

    pub async fn transcribe(&self, file_id: &str) -> Result<Transcript, TranscribeError> {
        let record = self
            .store
            .read(file_id)
            .await
            .map_err(|e| TranscribeError::Failure(e.to_string()))?
            .ok_or_else(|| TranscribeError::MetadataNotFound(file_id.to_string()))?;

        let resolved = resolve_audio(&record, &self.layout)
            .ok_or_else(|| TranscribeError::MissingConvertedPath(file_id.to_string()))?;

        let audio = if tokio::fs::try_exists(&resolved.path).await.unwrap_or(false) {
            resolved.path
        } else {
            match relocate(&resolved, &self.layout).await {
                Some(path) => {
                    tracing::info!(file_id, from = %resolved.path.display(), to = %path.display(), "audio relocated");
                    path
                }
                None => return Err(TranscribeError::ConvertedFileNotFound(resolved.path)),
            }
        };

        tracing::info!(file_id, audio = %audio.display(), "transcription requested");
        Ok(self.engine.transcribe(&audio).await?)
    }
}
