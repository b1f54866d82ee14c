//! Filesystem utilities.
//!
//! Crash-tolerant writes for project state, settings and plugin config, plus
//! the source-path checks shared by the project model.
//!
//! A partial write must never leave a previously saved file unreadable, and
//! Windows does not allow rename-over-existing, so replacement goes through a
//! backup swap there.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Path Validation Utilities
// =============================================================================

/// Returns true when `path` looks like a remote URL rather than a local file.
pub fn is_remote_url(path: &str) -> bool {
    path.trim().contains("://")
}

/// Validates a local media path (source or overlay).
///
/// - Rejects empty paths
/// - Rejects URLs (remote download is handled outside this crate)
/// - Requires an existing regular file
pub fn validate_local_media_path(path: &str, label: &str) -> CoreResult<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Resource(format!("{label} is empty")));
    }

    if is_remote_url(trimmed) {
        return Err(CoreError::Resource(format!(
            "{label} must be a local file path, not a URL: {trimmed}"
        )));
    }

    let pb = PathBuf::from(trimmed);
    let meta = std::fs::metadata(&pb)
        .map_err(|_| CoreError::Resource(format!("{label} file not found: {}", pb.display())))?;
    if !meta.is_file() {
        return Err(CoreError::Resource(format!(
            "{label} is not a file: {}",
            pb.display()
        )));
    }

    Ok(pb)
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write bytes to `path` via a sibling temp file and rename.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = sibling_with_suffix(path, "tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    atomic_replace(path, &tmp_path)
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Remove a file or directory tree, logging instead of failing.
///
/// Missing targets are not an error, so repeated calls are harmless.
pub fn remove_best_effort(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        return;
    };

    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove temporary resource");
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!("{file_name}.{suffix}"))
}

fn atomic_replace(dest: &Path, src_tmp: &Path) -> CoreResult<()> {
    if !dest.exists() || !cfg!(windows) {
        if let Err(e) = std::fs::rename(src_tmp, dest) {
            let _ = std::fs::remove_file(src_tmp);
            return Err(CoreError::IoError(e));
        }
        return Ok(());
    }

    let bak = sibling_with_suffix(dest, "bak");
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}
