use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};

use crate::modules::files::{
    crud::MetadataError,
    model::FileRecord,
    schema::{FileListResponse, FormatsResponse, MessageResponse, UploadResponse},
    service::{UploadError, ALLOWED_MIME_TYPES},
};
use crate::services::conversion::CONVERT_EXTENSIONS;
use crate::AppState;

const LIST_LIMIT: usize = 50;

type ApiError = (StatusCode, Json<MessageResponse>);

fn error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(MessageResponse { detail: detail.into() }))
}

fn upload_error(e: UploadError) -> ApiError {
    let status = match e {
        UploadError::UnsupportedMediaType(_) | UploadError::Incomplete(_) => StatusCode::BAD_REQUEST,
        UploadError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error(status, e.to_string())
}

fn storage_error(e: MetadataError) -> ApiError {
    error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| error(StatusCode::BAD_REQUEST, format!("Failed to read multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != "file" && name != "audio" {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field.content_type().unwrap_or("").to_string();

        let record = state
            .uploads
            .upload(&original_name, &mime_type, field)
            .await
            .map_err(upload_error)?;

        return Ok(Json(UploadResponse {
            detail: "file uploaded successfully".to_string(),
            record,
        }));
    }

    Err(error(StatusCode::BAD_REQUEST, "No audio file provided"))
}

pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileRecord>, ApiError> {
    match state.uploads.find(&file_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(error(StatusCode::NOT_FOUND, "File not found")),
        Err(e) => Err(storage_error(e)),
    }
}

pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>, ApiError> {
    let (data, total) = state.uploads.list(LIST_LIMIT).await.map_err(storage_error)?;
    Ok(Json(FileListResponse { data, total }))
}

pub async fn supported_formats(State(state): State<AppState>) -> Json<FormatsResponse> {
    Json(FormatsResponse {
        mime_types: ALLOWED_MIME_TYPES.to_vec(),
        converted_extensions: CONVERT_EXTENSIONS.to_vec(),
        max_upload_bytes: state.settings.max_upload_bytes,
    })
}
