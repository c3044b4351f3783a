use std::io;
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;

use crate::config::settings::ToolCommand;

/// Extensions the speech engine cannot read directly; these are re-encoded to WAV.
pub const CONVERT_EXTENSIONS: [&str; 5] = ["opus", "oga", "ogg", "mp3", "m4a"];

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("ffmpeg failed (exit code {code:?}): {stderr}")]
    Conversion { code: Option<i32>, stderr: String },
    #[error("ffprobe failed (exit code {code:?}): {detail}")]
    Probe { code: Option<i32>, detail: String },
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

struct ToolOutput {
    code: Option<i32>,
    success: bool,
    stdout: String,
    stderr: String,
}

#[derive(Debug, Clone)]
pub struct ConversionRunner {
    ffmpeg: ToolCommand,
    ffprobe: ToolCommand,
}

impl ConversionRunner {
    pub fn new(ffmpeg: ToolCommand, ffprobe: ToolCommand) -> Self {
        Self { ffmpeg, ffprobe }
    }

    pub fn needs_conversion(extension: &str) -> bool {
        let extension = extension.trim_start_matches('.').to_lowercase();
        CONVERT_EXTENSIONS.contains(&extension.as_str())
    }

    /// Re-encodes `input` as mono 16-bit PCM WAV at `sample_rate_hz`, overwriting `output`.
    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        sample_rate_hz: u32,
    ) -> Result<(), ConversionError> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut cmd = self.ffmpeg.command();
        cmd.arg("-y")
            .arg("-i")
            .arg(input)
            .args(["-ac", "1"])
            .arg("-ar")
            .arg(sample_rate_hz.to_string())
            .args(["-sample_fmt", "s16"])
            .arg(output);

        let out = run(&self.ffmpeg, cmd).await?;
        if !out.success {
            return Err(ConversionError::Conversion {
                code: out.code,
                stderr: out.stderr,
            });
        }

        tracing::debug!(input = %input.display(), output = %output.display(), "converted audio");
        Ok(())
    }

    pub async fn probe_duration_seconds(&self, path: &Path) -> Result<f64, ConversionError> {
        let mut cmd = self.ffprobe.command();
        cmd.args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path);

        let out = run(&self.ffprobe, cmd).await?;
        if !out.success {
            return Err(ConversionError::Probe {
                code: out.code,
                detail: out.stderr,
            });
        }

        let raw = out.stdout.trim();
        raw.parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| ConversionError::Probe {
                code: out.code,
                detail: format!("could not parse duration from output: {:?}", raw),
            })
    }
}

async fn run(tool: &ToolCommand, mut cmd: tokio::process::Command) -> Result<ToolOutput, ConversionError> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|source| ConversionError::Spawn {
            tool: tool.to_string(),
            source,
        })?;

    Ok(ToolOutput {
        code: output.status.code(),
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::with_args("sh", ["-c", script, "tool"])
    }

    #[test]
    fn conversion_set() {
        for ext in ["opus", "OGG", ".mp3", "m4a", "oga"] {
            assert!(ConversionRunner::needs_conversion(ext), "{ext}");
        }
        for ext in ["wav", "flac", ""] {
            assert!(!ConversionRunner::needs_conversion(ext), "{ext}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn duration_is_parsed_from_tool_output() {
        let runner = ConversionRunner::new(sh("exit 1"), sh("echo ' 12.5 '"));
        let duration = runner.probe_duration_seconds(Path::new("x.wav")).await.unwrap();
        assert_eq!(duration, 12.5);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unparseable_duration_is_rejected() {
        let runner = ConversionRunner::new(sh("exit 1"), sh("echo N/A"));
        let err = runner.probe_duration_seconds(Path::new("x.wav")).await.unwrap_err();
        assert!(matches!(err, ConversionError::Probe { code: Some(0), .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_reports_code_and_stderr() {
        let runner = ConversionRunner::new(sh("echo 'bad header' >&2; exit 3"), sh("exit 1"));
        let dir = tempfile::tempdir().unwrap();

        let err = runner
            .convert(Path::new("in.ogg"), &dir.path().join("out/x.wav"), 16000)
            .await
            .unwrap_err();

        match err {
            ConversionError::Conversion { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad header");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(dir.path().join("out").is_dir());
    }

    #[tokio::test]
    async fn missing_tool_is_a_spawn_error() {
        let runner = ConversionRunner::new(
            ToolCommand::new("definitely-not-a-real-ffmpeg"),
            ToolCommand::new("definitely-not-a-real-ffprobe"),
        );
        let err = runner.probe_duration_seconds(Path::new("x.wav")).await.unwrap_err();
        assert!(matches!(err, ConversionError::Spawn { .. }));
    }
}
