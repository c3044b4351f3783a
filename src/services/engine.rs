use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{OnceCell, Semaphore};

use crate::config::storage::StorageLayout;
use crate::modules::files::crud::MetadataStore;
use crate::modules::files::model::snippet;
use crate::services::blob;
use crate::services::stt::{ModelLoader, SpeechModel};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Audio file not found: {0}")]
    AudioNotFound(PathBuf),
    #[error("Transcription failed: {0}")]
    Transcription(String),
    #[error("Failed to store transcript: {0}")]
    Storage(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub file_id: String,
    pub text: String,
    pub transcript_path: PathBuf,
    /// True when the text came from an earlier run instead of fresh inference.
    pub replayed: bool,
}

/// Owns the lazily loaded speech model and the bounded pool inference runs on.
pub struct TranscriptionEngine {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn SpeechModel>>,
    slots: Arc<Semaphore>,
    layout: StorageLayout,
    store: MetadataStore,
    snippet_bytes: usize,
}

impl TranscriptionEngine {
    pub fn new(
        loader: Arc<dyn ModelLoader>,
        layout: StorageLayout,
        store: MetadataStore,
        workers: usize,
        snippet_bytes: usize,
    ) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
            slots: Arc::new(Semaphore::new(workers.max(1))),
            layout,
            store,
            snippet_bytes,
        }
    }

    /// Returns the shared model, loading it on first use. Concurrent first
    /// callers wait on the same load; a failed load is retried by the next caller.
    pub async fn model(&self) -> Result<Arc<dyn SpeechModel>, EngineError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let started = Instant::now();
                let model = self
                    .loader
                    .load()
                    .await
                    .map_err(|e| EngineError::Transcription(e.to_string()))?;
                tracing::info!(
                    model = model.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "speech model loaded"
                );
                Ok::<_, EngineError>(model)
            })
            .await?;
        Ok(Arc::clone(model))
    }

    /// Transcribes `audio`, keyed by its file stem. An existing transcript on
    /// disk is returned as-is without running the model again.
    pub async fn transcribe(&self, audio: &Path) -> Result<Transcript, EngineError> {
        if !tokio::fs::try_exists(audio).await.unwrap_or(false) {
            return Err(EngineError::AudioNotFound(audio.to_path_buf()));
        }

        let file_id = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| EngineError::AudioNotFound(audio.to_path_buf()))?;
        let transcript_path = self.layout.transcript_path(&file_id);
        let transcript_display = transcript_path.to_string_lossy().into_owned();

        if let Some(text) = read_existing(&transcript_path).await? {
            tracing::info!(file_id = %file_id, "transcript already on disk, replaying");
            let preview = snippet(&text, self.snippet_bytes);
            self.store
                .update_best_effort(&file_id, |r| {
                    r.mark_replayed(Utc::now(), transcript_display, preview)
                })
                .await;
            return Ok(Transcript {
                file_id,
                text,
                transcript_path,
                replayed: true,
            });
        }

        self.store
            .update_best_effort(&file_id, |r| r.mark_running(Utc::now()))
            .await;

        let started = Instant::now();
        let text = match self.infer(audio).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(file_id = %file_id, error = %e, "transcription failed");
                let message = e.to_string();
                self.store
                    .update_best_effort(&file_id, |r| r.mark_failed(Utc::now(), message))
                    .await;
                return Err(e);
            }
        };

        if let Err(e) = blob::write_atomic(&transcript_path, text.as_bytes()).await {
            tracing::error!(file_id = %file_id, error = %e, "could not write transcript");
            let message = format!("Failed to store transcript: {}", e);
            self.store
                .update_best_effort(&file_id, |r| r.mark_failed(Utc::now(), message))
                .await;
            return Err(EngineError::Storage(e));
        }

        let preview = snippet(&text, self.snippet_bytes);
        self.store
            .update_best_effort(&file_id, |r| {
                r.mark_done(Utc::now(), transcript_display, preview)
            })
            .await;

        tracing::info!(
            file_id = %file_id,
            chars = text.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transcription finished"
        );

        Ok(Transcript {
            file_id,
            text,
            transcript_path,
            replayed: false,
        })
    }

    /// Runs inference on its own task once a worker slot frees up. The task
    /// is not tied to the caller, so a dropped request does not abort it.
    async fn infer(&self, audio: &Path) -> Result<String, EngineError> {
        let model = self.model().await?;
        let slots = Arc::clone(&self.slots);
        let audio = audio.to_path_buf();

        let handle = tokio::spawn(async move {
            let _permit = slots
                .acquire_owned()
                .await
                .map_err(|e| EngineError::Transcription(e.to_string()))?;
            model
                .transcribe(&audio)
                .await
                .map(|text| text.trim().to_string())
                .map_err(|e| EngineError::Transcription(e.to_string()))
        });

        handle
            .await
            .map_err(|e| EngineError::Transcription(format!("inference task aborted: {}", e)))?
    }
}

async fn read_existing(path: &Path) -> Result<Option<String>, EngineError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(EngineError::Storage(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::files::model::{FileRecord, TranscriptionStatus};
    use crate::services::stt::SttError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        loads: AtomicUsize,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    struct Echo {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl SpeechModel for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn transcribe(&self, audio: &Path) -> Result<String, SttError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SttError::Inference("decoder exploded".to_string()));
            }
            Ok(format!("  heard {}  ", audio.file_name().unwrap().to_string_lossy()))
        }
    }

    #[async_trait]
    impl ModelLoader for Counting {
        async fn load(&self) -> Result<Arc<dyn SpeechModel>, SttError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Echo {
                calls: Arc::clone(&self.calls),
                fail: self.fail,
            }))
        }
    }

    /// Tracks how many inference calls are running at once.
    #[derive(Default)]
    struct Gauged {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct Slow {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SpeechModel for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn transcribe(&self, _audio: &Path) -> Result<String, SttError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".to_string())
        }
    }

    #[async_trait]
    impl ModelLoader for Gauged {
        async fn load(&self) -> Result<Arc<dyn SpeechModel>, SttError> {
            Ok(Arc::new(Slow {
                in_flight: Arc::clone(&self.in_flight),
                peak: Arc::clone(&self.peak),
            }))
        }
    }

    async fn engine(
        loader: Arc<dyn ModelLoader>,
    ) -> (tempfile::TempDir, TranscriptionEngine, MetadataStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(dir.path().join("uploads"), dir.path().join("data"))
            .prepare()
            .await
            .unwrap();
        let store = MetadataStore::new(layout.clone());
        let engine = TranscriptionEngine::new(loader, layout, store.clone(), 2, 4);
        (dir, engine, store)
    }

    async fn seed(engine: &TranscriptionEngine, store: &MetadataStore, id: &str) -> PathBuf {
        let audio = engine.layout.converted_path(id);
        std::fs::write(&audio, b"RIFF").unwrap();
        let record = FileRecord::new(
            id.to_string(),
            "a.ogg".to_string(),
            format!("{id}.ogg"),
            "audio/ogg".to_string(),
            4,
        );
        store.write(&record).await.unwrap();
        audio
    }

    #[tokio::test]
    async fn missing_audio_is_not_found() {
        let (_dir, engine, _) = engine(Arc::new(Counting::default())).await;
        let err = engine.transcribe(Path::new("/nope/x.wav")).await.unwrap_err();
        assert!(matches!(err, EngineError::AudioNotFound(_)));
    }

    #[tokio::test]
    async fn success_writes_transcript_and_marks_done() {
        let loader = Arc::new(Counting::default());
        let (_dir, engine, store) = engine(Arc::clone(&loader) as Arc<dyn ModelLoader>).await;
        let audio = seed(&engine, &store, "abc").await;

        let transcript = engine.transcribe(&audio).await.unwrap();

        assert_eq!(transcript.text, "heard abc.wav");
        assert!(!transcript.replayed);
        assert_eq!(std::fs::read_to_string(&transcript.transcript_path).unwrap(), "heard abc.wav");

        let record = store.read("abc").await.unwrap().unwrap();
        assert_eq!(record.status(), TranscriptionStatus::Done);
        assert_eq!(record.transcript_snippet.as_deref(), Some("hear"));
        assert!(record.transcription_started_at.is_some());
        assert!(record.transcription_finished_at.is_some());
    }

    #[tokio::test]
    async fn second_call_replays_without_inference() {
        let loader = Arc::new(Counting::default());
        let (_dir, engine, store) = engine(Arc::clone(&loader) as Arc<dyn ModelLoader>).await;
        let audio = seed(&engine, &store, "abc").await;

        let first = engine.transcribe(&audio).await.unwrap();
        let second = engine.transcribe(&audio).await.unwrap();

        assert_eq!(first.text, second.text);
        assert!(second.replayed);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inference_failure_marks_failed_and_propagates() {
        let loader = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let (_dir, engine, store) = engine(Arc::clone(&loader) as Arc<dyn ModelLoader>).await;
        let audio = seed(&engine, &store, "abc").await;

        let err = engine.transcribe(&audio).await.unwrap_err();
        assert!(err.to_string().contains("decoder exploded"));

        let record = store.read("abc").await.unwrap().unwrap();
        assert_eq!(record.status(), TranscriptionStatus::Failed);
        assert!(record.transcription_error.unwrap().contains("decoder exploded"));
        assert!(!engine.layout.transcript_path("abc").exists());
    }

    #[tokio::test]
    async fn works_without_a_metadata_record() {
        let (_dir, engine, store) = engine(Arc::new(Counting::default())).await;
        let audio = engine.layout.converted_path("loose");
        std::fs::write(&audio, b"RIFF").unwrap();

        let transcript = engine.transcribe(&audio).await.unwrap();
        assert_eq!(transcript.file_id, "loose");
        assert!(store.read("loose").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_first_use_loads_once() {
        let loader = Arc::new(Counting::default());
        let (_dir, engine, store) = engine(Arc::clone(&loader) as Arc<dyn ModelLoader>).await;
        let mut paths = Vec::new();
        for id in ["a1", "b2", "c3", "d4", "e5"] {
            paths.push(seed(&engine, &store, id).await);
        }

        let results = futures::future::join_all(paths.iter().map(|p| engine.transcribe(p))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn inference_never_exceeds_worker_count() {
        let loader = Arc::new(Gauged::default());
        let (_dir, engine, store) = engine(Arc::clone(&loader) as Arc<dyn ModelLoader>).await;
        let mut paths = Vec::new();
        for id in ["a1", "b2", "c3", "d4", "e5"] {
            paths.push(seed(&engine, &store, id).await);
        }

        let results = futures::future::join_all(paths.iter().map(|p| engine.transcribe(p))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        let peak = loader.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
        assert_eq!(loader.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_requests_for_one_file_leave_a_single_transcript() {
        let loader = Arc::new(Counting::default());
        let (_dir, engine, store) = engine(Arc::clone(&loader) as Arc<dyn ModelLoader>).await;
        let audio = seed(&engine, &store, "abc").await;

        let (first, second) = tokio::join!(engine.transcribe(&audio), engine.transcribe(&audio));

        assert_eq!(first.unwrap().text, "heard abc.wav");
        assert_eq!(second.unwrap().text, "heard abc.wav");
        let names: Vec<_> = std::fs::read_dir(engine.layout.transcripts_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["abc.txt".to_string()]);
        assert_eq!(
            std::fs::read_to_string(engine.layout.transcript_path("abc")).unwrap(),
            "heard abc.wav"
        );
    }

    #[tokio::test]
    async fn replay_clears_an_earlier_failure() {
        let loader = Arc::new(Counting::default());
        let (_dir, engine, store) = engine(Arc::clone(&loader) as Arc<dyn ModelLoader>).await;
        let audio = seed(&engine, &store, "abc").await;
        store
            .update("abc", |r| r.mark_failed(Utc::now(), "worker crashed".to_string()))
            .await
            .unwrap();
        std::fs::write(engine.layout.transcript_path("abc"), "kept from before").unwrap();

        let transcript = engine.transcribe(&audio).await.unwrap();

        assert!(transcript.replayed);
        assert_eq!(transcript.text, "kept from before");
        let record = store.read("abc").await.unwrap().unwrap();
        assert_eq!(record.status(), TranscriptionStatus::Done);
        assert!(record.transcription_error.is_none());
        assert_eq!(record.transcript_snippet.as_deref(), Some("kept"));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    }
}
