use axum::{routing::post, Router};

use crate::modules::transcription::controller;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/v1/transcribe/{file_id}", post(controller::transcribe))
}
