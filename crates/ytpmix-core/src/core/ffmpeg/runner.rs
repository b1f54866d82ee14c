//! FFmpeg Runner Module
//!
//! Executes ffprobe / ffmpeg / ffplay for the non-render operations:
//! duration probing, GIF overlay conversion and quick preview.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use super::{FFmpegError, FFmpegInfo, FFmpegResult};
use crate::core::process::{configure_std_command, configure_tokio_command};

/// FFmpeg runner for executing auxiliary FFmpeg commands
#[derive(Clone, Debug)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
}

impl FFmpegRunner {
    /// Create a new FFmpeg runner
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
        }
    }

    /// Get FFmpeg info
    pub fn info(&self) -> &FFmpegInfo {
        &self.info
    }

    /// Query the container duration of `input` in seconds.
    ///
    /// Blocking: called from the synchronous compile path.
    pub fn probe_duration(&self, input: &Path) -> FFmpegResult<f64> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        let mut cmd = Command::new(&self.info.ffprobe_path);
        configure_std_command(&mut cmd);
        let output = cmd
            .args(["-v", "error", "-print_format", "json", "-show_format"])
            .arg(input)
            .output()
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!(
                "FFprobe failed for {}: {}",
                input.display(),
                stderr.trim()
            )));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        parse_duration_output(&json_str)
    }

    /// Convert an animated GIF into an alpha-preserving WebM overlay clip.
    pub async fn convert_gif_to_webm(&self, input: &Path, output: &Path) -> FFmpegResult<()> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        if let Some(parent) = output.parent() {
            if !parent.exists() {
                return Err(FFmpegError::OutputError(format!(
                    "Output directory does not exist: {}",
                    parent.display()
                )));
            }
        }

        let mut cmd = tokio::process::Command::new(&self.info.ffmpeg_path);
        configure_tokio_command(&mut cmd);
        let result = cmd
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args([
                "-c:v",
                "libvpx-vp9",
                "-pix_fmt",
                "yuva420p",
                "-auto-alt-ref",
                "0",
                "-an",
            ])
            .arg(output)
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(FFmpegError::ExecutionFailed(format!(
                "GIF conversion failed: {}",
                stderr
            )));
        }

        tracing::info!(
            "Converted GIF overlay {} -> {}",
            input.display(),
            output.display()
        );
        Ok(())
    }

    /// Launch the player on `source` and return without waiting for it.
    pub fn preview(&self, source: &Path) -> FFmpegResult<Child> {
        let player = self.info.ffplay_path.as_ref().ok_or(FFmpegError::NotFound)?;

        if !source.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                source.display()
            )));
        }

        let mut cmd = Command::new(player);
        configure_std_command(&mut cmd);
        let child = cmd
            .args(["-autoexit", "-nodisp"])
            .arg(source)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(FFmpegError::ProcessError)?;

        tracing::info!("Preview started for {}", source.display());
        Ok(child)
    }
}

/// Extract `format.duration` from ffprobe JSON output.
pub(crate) fn parse_duration_output(json_str: &str) -> FFmpegResult<f64> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FFmpegError::ParseError(format!("Failed to parse FFprobe output: {}", e)))?;

    let format = json
        .get("format")
        .ok_or_else(|| FFmpegError::ParseError("Missing format info".to_string()))?;

    // ffprobe reports duration as a string; some wrappers emit a number
    let duration = match format.get("duration") {
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        _ => None,
    }
    .ok_or_else(|| FFmpegError::ParseError("Missing or non-numeric duration".to_string()))?;

    if !duration.is_finite() || duration < 0.0 {
        return Err(FFmpegError::ProbeError(format!(
            "Invalid duration reported: {}",
            duration
        )));
    }

    Ok(duration)
}
