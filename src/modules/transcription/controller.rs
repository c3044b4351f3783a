use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::modules::files::model::TranscriptionStatus;
use crate::modules::transcription::{
    schema::{MessageResponse, TranscribeResponse},
    service::TranscribeError,
};
use crate::AppState;

pub async fn transcribe(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<TranscribeResponse>, (StatusCode, Json<MessageResponse>)> {
    let transcript = state.transcriptions.transcribe(&file_id).await.map_err(|e| {
        let status = match e {
            TranscribeError::MetadataNotFound(_)
            | TranscribeError::MissingConvertedPath(_)
            | TranscribeError::ConvertedFileNotFound(_)
            | TranscribeError::AudioNotFound(_) => StatusCode::NOT_FOUND,
            TranscribeError::Failure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(MessageResponse { detail: e.to_string() }))
    })?;

    Ok(Json(TranscribeResponse {
        file_id: transcript.file_id,
        transcript: transcript.text,
        transcript_path: transcript.transcript_path.to_string_lossy().into_owned(),
        status: TranscriptionStatus::Done.as_str().to_string(),
    }))
}
