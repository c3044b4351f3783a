use std::io;
use std::path::{Path, PathBuf};

/// On-disk layout shared by every store.
///
/// ```text
/// <upload_dir>/<stored_name>            original uploads
/// <upload_dir>/converted/<id>.wav       normalized waveforms
/// <data_dir>/uploads_meta/<id>.json     one FileRecord per upload
/// <data_dir>/transcripts/<id>.txt       one transcript per upload
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    upload_dir: PathBuf,
    converted_dir: PathBuf,
    metadata_dir: PathBuf,
    transcripts_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(upload_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        let upload_dir = upload_dir.into();
        let data_dir = data_dir.into();
        Self {
            converted_dir: upload_dir.join("converted"),
            metadata_dir: data_dir.join("uploads_meta"),
            transcripts_dir: data_dir.join("transcripts"),
            upload_dir,
        }
    }

    /// Creates every directory and rebases the layout on absolute paths, so
    /// paths written into records stay valid regardless of the working directory.
    pub async fn prepare(self) -> io::Result<Self> {
        let Self {
            upload_dir,
            converted_dir,
            metadata_dir,
            transcripts_dir,
        } = self;

        for dir in [&upload_dir, &converted_dir, &metadata_dir, &transcripts_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }

        Ok(Self {
            upload_dir: tokio::fs::canonicalize(upload_dir).await?,
            converted_dir: tokio::fs::canonicalize(converted_dir).await?,
            metadata_dir: tokio::fs::canonicalize(metadata_dir).await?,
            transcripts_dir: tokio::fs::canonicalize(transcripts_dir).await?,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn converted_dir(&self) -> &Path {
        &self.converted_dir
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    pub fn transcripts_dir(&self) -> &Path {
        &self.transcripts_dir
    }

    pub fn blob_path(&self, stored_name: &str) -> PathBuf {
        self.upload_dir.join(stored_name)
    }

    pub fn converted_path(&self, file_id: &str) -> PathBuf {
        self.converted_dir.join(format!("{}.wav", file_id))
    }

    pub fn metadata_path(&self, file_id: &str) -> PathBuf {
        self.metadata_dir.join(format!("{}.json", file_id))
    }

    pub fn transcript_path(&self, file_id: &str) -> PathBuf {
        self.transcripts_dir.join(format!("{}.txt", file_id))
    }
}
