//! FFmpeg Detection Module
//!
//! Handles detection and validation of the ffmpeg / ffprobe / ffplay binaries.
//! Explicit paths from settings win; otherwise common install locations and
//! the system PATH are searched.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::{FFmpegError, FFmpegResult};
use crate::core::process::configure_std_command;
use crate::core::settings::FFmpegSettings;

/// Information about detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_path: PathBuf,
    /// Path to ffplay binary (preview only, optional)
    pub ffplay_path: Option<PathBuf>,
    /// FFmpeg version string
    pub version: String,
}

impl FFmpegInfo {
    /// Builds info from known paths without running anything.
    ///
    /// Used when the caller already trusts the paths (tests, dry runs).
    pub fn from_paths(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            ffplay_path: None,
            version: "unknown".to_string(),
        }
    }
}

/// Detect FFmpeg using settings overrides first, then the system.
pub fn detect_ffmpeg(settings: &FFmpegSettings) -> FFmpegResult<FFmpegInfo> {
    let ffmpeg_path = match &settings.ffmpeg_path {
        Some(path) if path.exists() => path.clone(),
        Some(path) => {
            tracing::warn!(
                "Configured ffmpeg path {} does not exist, searching system",
                path.display()
            );
            which_binary("ffmpeg")?
        }
        None => which_binary("ffmpeg")?,
    };

    let ffprobe_path = match &settings.ffprobe_path {
        Some(path) if path.exists() => path.clone(),
        _ => sibling_or_search(&ffmpeg_path, "ffprobe")?,
    };

    let ffplay_path = match &settings.ffplay_path {
        Some(path) if path.exists() => Some(path.clone()),
        _ => sibling_or_search(&ffmpeg_path, "ffplay").ok(),
    };

    let version = get_ffmpeg_version(&ffmpeg_path)?;

    Ok(FFmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        ffplay_path,
        version,
    })
}

/// Detect FFmpeg from system PATH
pub fn detect_system_ffmpeg() -> FFmpegResult<FFmpegInfo> {
    detect_ffmpeg(&FFmpegSettings::default())
}

fn binary_file_name(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Prefer a binary living next to ffmpeg (same install), else search.
fn sibling_or_search(ffmpeg_path: &Path, name: &str) -> FFmpegResult<PathBuf> {
    if let Some(dir) = ffmpeg_path.parent() {
        let candidate = dir.join(binary_file_name(name));
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    which_binary(name)
}

/// Find a binary in common install locations or the system PATH
fn which_binary(name: &str) -> FFmpegResult<PathBuf> {
    let binary_name = binary_file_name(name);

    for dir in get_common_ffmpeg_paths() {
        let candidate = dir.join(&binary_name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    // Fall back to PATH search using `where` (Windows) or `which` (Unix)
    let locator = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };

    let mut cmd = Command::new(locator);
    configure_std_command(&mut cmd);
    let output = cmd
        .arg(name)
        .output()
        .map_err(|_| FFmpegError::NotFound)?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = path_str.lines().next() {
            let trimmed = first_line.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }
    }

    Err(FFmpegError::NotFound)
}

/// Get common FFmpeg installation paths for the current platform
fn get_common_ffmpeg_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }
        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            paths.push(PathBuf::from(userprofile).join("scoop").join("shims"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/opt/local/bin"));
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

/// Get FFmpeg version string
fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let mut cmd = Command::new(ffmpeg_path);
    configure_std_command(&mut cmd);
    let output = cmd.arg("-version").output().map_err(FFmpegError::ProcessError)?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(
            "Failed to get FFmpeg version".to_string(),
        ));
    }

    parse_version_banner(&String::from_utf8_lossy(&output.stdout))
}

/// Parse version from the first banner line: "ffmpeg version X.X.X ..."
fn parse_version_banner(banner: &str) -> FFmpegResult<String> {
    let first_line = banner
        .lines()
        .next()
        .ok_or_else(|| FFmpegError::ParseError("Could not parse FFmpeg version".to_string()))?;

    Ok(first_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or(first_line)
        .to_string())
}
