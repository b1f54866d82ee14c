//! ytpmix Error Definitions
//!
//! Defines error types used throughout the project.

use thiserror::Error;

use super::ffmpeg::FFmpegError;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Compile-time Errors
    // =========================================================================
    /// Source duration could not be determined.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Undefined or duplicate label, forward reference, or mismatched
    /// audio/video segment counts. Raised before any engine process starts.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-positive duration or out-of-range effect parameter.
    #[error("Filter build error: {0}")]
    FilterBuild(String),

    #[error("Unknown effect: {0}")]
    UnknownEffect(String),

    // =========================================================================
    // Export Errors
    // =========================================================================
    /// Render process exited non-zero. Carries the full diagnostic text.
    #[error("Engine execution failed ({status}): {stderr}")]
    EngineExecution { status: String, stderr: String },

    /// Missing source/overlay file or unusable binary.
    #[error("Resource error: {0}")]
    Resource(String),

    // =========================================================================
    // Project Errors
    // =========================================================================
    #[error("Invalid project state: {0}")]
    InvalidProjectState(String),

    #[error("No sources added")]
    NoSources,

    // =========================================================================
    // Plugin Errors
    // =========================================================================
    #[error("Plugin error: {0}")]
    PluginError(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Plugin not enabled: {0}")]
    PluginNotEnabled(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl From<FFmpegError> for CoreError {
    fn from(err: FFmpegError) -> Self {
        match err {
            FFmpegError::ProbeError(msg) | FFmpegError::ParseError(msg) => CoreError::Probe(msg),
            FFmpegError::NotFound => {
                CoreError::Resource("FFmpeg binaries not found".to_string())
            }
            FFmpegError::InvalidInput(msg) => CoreError::Resource(msg),
            FFmpegError::ExecutionFailed(msg) => CoreError::EngineExecution {
                status: "failed".to_string(),
                stderr: msg,
            },
            FFmpegError::OutputError(msg) => CoreError::Resource(msg),
            FFmpegError::ProcessError(e) => CoreError::IoError(e),
        }
    }
}

impl CoreError {
    /// True for errors raised while compiling, before the engine is started.
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            CoreError::Probe(_)
                | CoreError::Validation(_)
                | CoreError::FilterBuild(_)
                | CoreError::UnknownEffect(_)
                | CoreError::NoSources
        )
    }
}
