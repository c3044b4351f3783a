use std::io;
use std::sync::Arc;

use axum::Router;

use crate::config::settings::Settings;
use crate::config::storage::StorageLayout;
use crate::modules::files::crud::MetadataStore;
use crate::modules::files::service::UploadService;
use crate::modules::transcription::service::TranscriptionService;
use crate::services::conversion::ConversionRunner;
use crate::services::engine::TranscriptionEngine;
use crate::services::stt::ModelLoader;

pub mod config;
pub mod modules;
pub mod services;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub uploads: Arc<UploadService>,
    pub transcriptions: Arc<TranscriptionService>,
    pub engine: Arc<TranscriptionEngine>,
}

impl AppState {
    /// Prepares the storage directories and wires every service. The model
    /// itself is not loaded until the first transcription needs it.
    pub async fn new(settings: Settings, loader: Arc<dyn ModelLoader>) -> io::Result<Self> {
        let layout = StorageLayout::new(&settings.upload_dir, &settings.data_dir)
            .prepare()
            .await?;
        let store = MetadataStore::new(layout.clone());

        let converter = ConversionRunner::new(settings.ffmpeg.clone(), settings.ffprobe.clone());
        let uploads = UploadService::new(
            layout.clone(),
            store.clone(),
            converter,
            settings.max_upload_bytes,
            settings.sample_rate,
        );

        let engine = Arc::new(TranscriptionEngine::new(
            loader,
            layout.clone(),
            store.clone(),
            settings.inference_workers,
            settings.snippet_bytes,
        ));
        let transcriptions = TranscriptionService::new(layout, store, Arc::clone(&engine));

        Ok(Self {
            settings: Arc::new(settings),
            uploads: Arc::new(uploads),
            transcriptions: Arc::new(transcriptions),
            engine,
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(modules::files::routes::routes())
        .merge(modules::transcription::routes::routes())
        .with_state(state)
}
