use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use validator::Validate;

/// 8 MiB, the largest upload accepted unless `MAX_UPLOAD_BYTES` says otherwise.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("Invalid settings: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// An external program plus any leading arguments, e.g. `nice -n 10 ffmpeg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl FromStr for ToolCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let program = parts.next().ok_or_else(|| "empty command".to_string())?;
        Ok(Self::with_args(program, parts))
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttBackend {
    OpenAi,
    WhisperCli,
}

impl FromStr for SttBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "whisper-cli" | "whisper_cli" => Ok(Self::WhisperCli),
            other => Err(format!("unknown backend {other}")),
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub data_dir: PathBuf,
    #[validate(range(min = 1))]
    pub max_upload_bytes: u64,
    #[validate(range(min = 8000, max = 192000))]
    pub sample_rate: u32,
    pub ffmpeg: ToolCommand,
    pub ffprobe: ToolCommand,
    pub stt_backend: SttBackend,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub stt_model: String,
    pub whisper: ToolCommand,
    pub whisper_model: PathBuf,
    #[validate(range(min = 1, max = 32))]
    pub inference_workers: usize,
    pub snippet_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            data_dir: PathBuf::from("data"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            sample_rate: 16000,
            ffmpeg: ToolCommand::new("ffmpeg"),
            ffprobe: ToolCommand::new("ffprobe"),
            stt_backend: SttBackend::OpenAi,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            stt_model: "whisper-1".to_string(),
            whisper: ToolCommand::new("whisper-cli"),
            whisper_model: PathBuf::from("models/ggml-small.bin"),
            inference_workers: 2,
            snippet_bytes: 512,
        }
    }
}

impl Settings {
    /// Reads settings from the process environment. Call `dotenvy::dotenv()` first
    /// if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let settings = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT", defaults.port)?,
            upload_dir: lookup("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            max_upload_bytes: parse(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            sample_rate: parse(&lookup, "SAMPLE_RATE", defaults.sample_rate)?,
            ffmpeg: parse(&lookup, "FFMPEG_CMD", defaults.ffmpeg)?,
            ffprobe: parse(&lookup, "FFPROBE_CMD", defaults.ffprobe)?,
            stt_backend: parse(&lookup, "STT_BACKEND", defaults.stt_backend)?,
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            openai_base_url: lookup("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            stt_model: lookup("STT_MODEL").unwrap_or(defaults.stt_model),
            whisper: parse(&lookup, "WHISPER_CMD", defaults.whisper)?,
            whisper_model: lookup("WHISPER_MODEL").map(PathBuf::from).unwrap_or(defaults.whisper_model),
            inference_workers: parse(&lookup, "INFERENCE_WORKERS", defaults.inference_workers)?,
            snippet_bytes: parse(&lookup, "SNIPPET_BYTES", defaults.snippet_bytes)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, SettingsError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| SettingsError::Invalid { key, value }),
        _ => Ok(default),
    }
}
