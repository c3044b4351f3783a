use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub file_id: String,
    pub transcript: String,
    pub transcript_path: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub detail: String,
}
