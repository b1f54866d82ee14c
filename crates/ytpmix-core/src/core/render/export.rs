//! Engine execution.
//!
//! Running the engine is the only long blocking step; it happens on the
//! async runtime so a driving UI or worker stays responsive. Failures are
//! surfaced with the full stderr text and never retried.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::EngineCommand;
use crate::core::process::configure_tokio_command;
use crate::core::{CoreError, CoreResult};

/// Result of a successful render
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub output_path: PathBuf,
    pub file_size: u64,
    pub encoding_time_sec: f64,
}

/// Runs an assembled command.
#[async_trait]
pub trait EngineExecutor: Send + Sync {
    async fn execute(&self, command: &EngineCommand) -> CoreResult<ExportOutcome>;
}

/// Executes commands with the real engine binary named in the command.
#[derive(Clone, Copy, Debug, Default)]
pub struct FFmpegExecutor;

#[async_trait]
impl EngineExecutor for FFmpegExecutor {
    async fn execute(&self, command: &EngineCommand) -> CoreResult<ExportOutcome> {
        for input in &command.inputs {
            if !input.exists() {
                return Err(CoreError::Resource(format!(
                    "Input file does not exist: {}",
                    input.display()
                )));
            }
        }
        if let Some(parent) = command.output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let start_time = Instant::now();
        info!("Starting export: {}", command.display());

        let mut cmd = tokio::process::Command::new(&command.program);
        configure_tokio_command(&mut cmd);
        cmd.args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            CoreError::Resource(format!(
                "Failed to spawn {}: {}",
                command.program.display(),
                e
            ))
        })?;

        // Drain stderr concurrently so a chatty engine cannot fill the pipe
        let stderr_handle = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                use tokio::io::AsyncReadExt;
                let mut buf = Vec::new();
                let mut stderr = stderr;
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).to_string()
            })
        });

        let status = child.wait().await?;

        let stderr = match stderr_handle {
            Some(handle) => handle
                .await
                .unwrap_or_else(|_| "Failed to read stderr".to_string()),
            None => String::new(),
        };

        if !status.success() {
            warn!(status = %status, "Export failed");
            return Err(CoreError::EngineExecution {
                status: status.to_string(),
                stderr,
            });
        }

        let file_size = std::fs::metadata(&command.output)
            .map(|m| m.len())
            .unwrap_or(0);
        let encoding_time_sec = start_time.elapsed().as_secs_f64();
        info!(
            "Export finished: {} ({} bytes, {:.1}s)",
            command.output.display(),
            file_size,
            encoding_time_sec
        );

        Ok(ExportOutcome {
            output_path: command.output.clone(),
            file_size,
            encoding_time_sec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command_with(program: &str, dir: &std::path::Path) -> EngineCommand {
        let input = dir.join("in.mp4");
        std::fs::write(&input, b"x").unwrap();
        let mut cmd = EngineCommand::new(program, dir.join("out.mp4"));
        cmd.inputs.push(input);
        cmd
    }

    #[tokio::test]
    async fn test_missing_input_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = EngineCommand::new("ffmpeg", dir.path().join("out.mp4"));
        cmd.inputs.push(dir.path().join("missing.mp4"));
        let err = FFmpegExecutor.execute(&cmd).await.unwrap_err();
        assert!(matches!(err, CoreError::Resource(_)));
    }

    #[tokio::test]
    async fn test_unspawnable_program_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = command_with("/definitely/not/a/binary", dir.path());
        let err = FFmpegExecutor.execute(&cmd).await.unwrap_err();
        assert!(matches!(err, CoreError::Resource(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = command_with("false", dir.path());
        let err = FFmpegExecutor.execute(&cmd).await.unwrap_err();
        assert!(matches!(err, CoreError::EngineExecution { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = command_with("true", dir.path());
        let outcome = FFmpegExecutor.execute(&cmd).await.unwrap();
        assert_eq!(outcome.output_path, dir.path().join("out.mp4"));
        assert_eq!(outcome.file_size, 0);
    }
}
