use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::modules::files::controller;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // The blob store enforces the configured cap while streaming.
        .route(
            "/api/v1/upload",
            post(controller::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/v1/files", get(controller::list_files))
        .route("/api/v1/files/{file_id}", get(controller::get_file))
        .route("/api/v1/formats", get(controller::supported_formats))
}
