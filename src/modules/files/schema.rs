use serde::Serialize;

use crate::modules::files::model::FileRecord;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub detail: String,
    #[serde(flatten)]
    pub record: FileRecord,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub data: Vec<FileRecord>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub mime_types: Vec<&'static str>,
    pub converted_extensions: Vec<&'static str>,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub detail: String,
}
