use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::settings::{Settings, SttBackend, ToolCommand};

#[derive(Error, Debug)]
pub enum SttError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Missing API key")]
    MissingApiKey,
    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A loaded speech-to-text model.
#[async_trait]
pub trait SpeechModel: Send + Sync {
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: &Path) -> Result<String, SttError>;
}

/// Produces the process-wide model. Called once per successful load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn SpeechModel>, SttError>;
}

pub fn loader_from_settings(settings: &Settings) -> Arc<dyn ModelLoader> {
    match settings.stt_backend {
        SttBackend::OpenAi => Arc::new(OpenAiLoader {
            api_key: settings.openai_api_key.clone(),
            base_url: settings.openai_base_url.clone(),
            model: settings.stt_model.clone(),
        }),
        SttBackend::WhisperCli => Arc::new(WhisperCliLoader {
            command: settings.whisper.clone(),
            model_path: settings.whisper_model.clone(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct OpenAiLoader {
    api_key: Option<String>,
    base_url: String,
    model: String,
}

#[async_trait]
impl ModelLoader for OpenAiLoader {
    async fn load(&self) -> Result<Arc<dyn SpeechModel>, SttError> {
        let api_key = self.api_key.clone().ok_or(SttError::MissingApiKey)?;

        Ok(Arc::new(SttClient {
            client: Client::new(),
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: self.model.clone(),
        }))
    }
}

/// OpenAI-compatible `/audio/transcriptions` client.
#[derive(Clone)]
pub struct SttClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[async_trait]
impl SpeechModel for SttClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, SttError> {
        let audio_data = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let file_part = Part::bytes(audio_data)
            .file_name(file_name)
            .mime_str("audio/wav")?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                return Err(SttError::ApiError(error_response.error.message));
            }
            return Err(SttError::ApiError(error_text));
        }

        let whisper_response: WhisperResponse = response.json().await?;
        Ok(whisper_response.text)
    }
}

pub struct WhisperCliLoader {
    command: ToolCommand,
    model_path: PathBuf,
}

#[async_trait]
impl ModelLoader for WhisperCliLoader {
    async fn load(&self) -> Result<Arc<dyn SpeechModel>, SttError> {
        match tokio::fs::metadata(&self.model_path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(SttError::ModelNotFound(self.model_path.clone())),
        }

        Ok(Arc::new(WhisperCli {
            name: self
                .model_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "whisper".to_string()),
            command: self.command.clone(),
            model_path: self.model_path.clone(),
        }))
    }
}

/// whisper.cpp command-line runner; the transcript is whatever it prints to stdout.
pub struct WhisperCli {
    name: String,
    command: ToolCommand,
    model_path: PathBuf,
}

#[async_trait]
impl SpeechModel for WhisperCli {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, SttError> {
        let output = self
            .command
            .command()
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(audio)
            .args(["-nt", "-np"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SttError::Inference(format!(
                "{} exited with {:?}: {}",
                self.command,
                output.status.code(),
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn openai_loader_requires_key() {
        let settings = Settings::default();
        let loader = loader_from_settings(&settings);
        let err = loader.load().await.err().unwrap();
        assert!(matches!(err, SttError::MissingApiKey));
    }

    #[tokio::test]
    async fn openai_loader_uses_configured_model() {
        let settings = Settings {
            openai_api_key: Some("sk-test".to_string()),
            stt_model: "whisper-large-v3".to_string(),
            ..Settings::default()
        };
        let model = loader_from_settings(&settings).load().await.unwrap();
        assert_eq!(model.name(), "whisper-large-v3");
    }

    #[tokio::test]
    async fn whisper_cli_loader_requires_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            stt_backend: SttBackend::WhisperCli,
            whisper_model: dir.path().join("ggml-missing.bin"),
            ..Settings::default()
        };
        let err = loader_from_settings(&settings).load().await.err().unwrap();
        assert!(matches!(err, SttError::ModelNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn whisper_cli_joins_stdout_lines() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("ggml-tiny.bin");
        std::fs::write(&model_path, b"weights").unwrap();

        let settings = Settings {
            stt_backend: SttBackend::WhisperCli,
            whisper: ToolCommand::with_args("sh", ["-c", "printf ' hello\\n\\n world \\n'", "whisper"]),
            whisper_model: model_path,
            ..Settings::default()
        };
        let model = loader_from_settings(&settings).load().await.unwrap();

        assert_eq!(model.name(), "ggml-tiny");
        let text = model.transcribe(Path::new("a.wav")).await.unwrap();
        assert_eq!(text, "hello world");
    }
}
