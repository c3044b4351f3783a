use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    #[default]
    #[serde(rename = "none")]
    Idle,
    Running,
    Done,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "none",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Conversion details as older records stored them, nested under `extra`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ConversionExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FileRecord {
    pub file_id: String,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converted_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<ConversionExtra>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_status: Option<TranscriptionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_saved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_error: Option<String>,
}

impl FileRecord {
    pub fn new(
        file_id: String,
        original_name: String,
        stored_name: String,
        mime_type: String,
        size_bytes: u64,
    ) -> Self {
        Self {
            file_id,
            original_name,
            stored_name,
            mime_type,
            size_bytes,
            uploaded_at: Utc::now(),
            converted_name: None,
            converted_path: None,
            duration_seconds: None,
            conversion_error: None,
            extra: None,
            transcription_status: None,
            transcription_started_at: None,
            transcription_finished_at: None,
            transcript_path: None,
            transcript_saved_at: None,
            transcript_snippet: None,
            transcription_error: None,
        }
    }

    pub fn status(&self) -> TranscriptionStatus {
        self.transcription_status.unwrap_or_default()
    }

    pub fn record_conversion(&mut self, converted_name: String, converted_path: String, duration: f64) {
        self.converted_name = Some(converted_name);
        self.converted_path = Some(converted_path);
        self.duration_seconds = Some(duration);
        self.conversion_error = None;
    }

    pub fn record_conversion_error(&mut self, error: String) {
        self.converted_name = None;
        self.converted_path = None;
        self.duration_seconds = None;
        self.conversion_error = Some(error);
    }

    /// Starts (or restarts after a failure) a transcription run.
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.transcription_status = Some(TranscriptionStatus::Running);
        self.transcription_started_at = Some(now);
        self.transcription_finished_at = None;
        self.transcription_error = None;
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>, transcript_path: String, snippet: String) {
        self.transcription_status = Some(TranscriptionStatus::Done);
        self.transcription_finished_at = Some(now);
        self.transcript_path = Some(transcript_path);
        self.transcript_saved_at = Some(now);
        self.transcript_snippet = Some(snippet);
        self.transcription_error = None;
    }

    /// Replaying a transcript that already exists on disk: settle on `done`
    /// without disturbing timestamps from the run that produced it.
    pub fn mark_replayed(&mut self, now: DateTime<Utc>, transcript_path: String, snippet: String) {
        self.transcription_status = Some(TranscriptionStatus::Done);
        self.transcription_error = None;
        self.transcription_finished_at.get_or_insert(now);
        self.transcript_path.get_or_insert(transcript_path);
        self.transcript_saved_at.get_or_insert(now);
        self.transcript_snippet.get_or_insert(snippet);
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>, error: String) {
        self.transcription_status = Some(TranscriptionStatus::Failed);
        self.transcription_finished_at = Some(now);
        self.transcription_error = Some(error);
    }
}

/// First `max_bytes` of `text`, cut back to a char boundary.
pub fn snippet(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
