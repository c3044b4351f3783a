pub mod files;
pub mod transcription;
