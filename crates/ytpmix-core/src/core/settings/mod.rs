//! Settings Persistence System
//!
//! Provides persistent settings with:
//! - Atomic file writes (temp file + rename)
//! - Advisory locking so two processes never interleave writes
//! - Defaults for every missing section, clamping for out-of-range values
//!
//! Storage location: {config_dir}/ytpmix/settings.json

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::fs::atomic_write_json_pretty;
use crate::core::{CoreError, CoreResult};

/// Settings schema version
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "settings.json.lock";

const X264_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Explicit engine binary locations
    #[serde(default)]
    pub ffmpeg: FFmpegSettings,

    /// Fixed encode parameters appended to every render
    #[serde(default)]
    pub export: ExportSettings,

    #[serde(default)]
    pub audio: AudioSettings,

    #[serde(default)]
    pub plugins: PluginSettings,

    #[serde(default)]
    pub session: SessionSettings,

    /// Optional presets file overriding the built-in presets
    #[serde(default)]
    pub presets_path: Option<PathBuf>,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            ffmpeg: FFmpegSettings::default(),
            export: ExportSettings::default(),
            audio: AudioSettings::default(),
            plugins: PluginSettings::default(),
            session: SessionSettings::default(),
            presets_path: None,
        }
    }
}

impl AppSettings {
    /// Clamp or reset out-of-range values instead of rejecting the file.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.export.crf = self.export.crf.min(51);
        self.export.preset = normalize_enum(&self.export.preset, X264_PRESETS, default_preset());
        if self.export.video_codec.trim().is_empty() {
            self.export.video_codec = default_video_codec();
        }
        if self.export.audio_codec.trim().is_empty() {
            self.export.audio_codec = default_audio_codec();
        }
        if self.export.audio_bitrate.trim().is_empty() {
            self.export.audio_bitrate = default_audio_bitrate();
        }

        self.audio.sample_rate = self.audio.sample_rate.clamp(8_000, 192_000);

        if self.plugins.config_path.as_os_str().is_empty() {
            self.plugins.config_path = default_plugin_config_path();
        }
    }
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: String) -> String {
    if allowed.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        fallback
    }
}

/// Engine binary overrides; `None` means "search the system".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FFmpegSettings {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
    #[serde(default)]
    pub ffplay_path: Option<PathBuf>,
}

/// Encode parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// x264 speed preset
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant rate factor (0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Pass `-y` so existing outputs are replaced
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

fn default_video_codec() -> String {
    "libx264".to_string()
}
fn default_preset() -> String {
    "medium".to_string()
}
fn default_crf() -> u8 {
    18
}
fn default_audio_codec() -> String {
    "aac".to_string()
}
fn default_audio_bitrate() -> String {
    "192k".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            preset: default_preset(),
            crf: default_crf(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            overwrite: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    /// Sample rate assumed by the pitch shifter
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_sample_rate() -> u32 {
    44_100
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
        }
    }
}

/// Plugin registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    /// Initial enabled flags; the registry's own config file wins when present
    #[serde(default)]
    pub enabled: std::collections::BTreeMap<String, bool>,

    /// Where the registry persists enabled flags
    #[serde(default = "default_plugin_config_path")]
    pub config_path: PathBuf,

    /// Arguments the `extra_output_args` plugin inserts before the output path
    #[serde(default)]
    pub extra_output_args: Vec<String>,
}

fn default_plugin_config_path() -> PathBuf {
    PathBuf::from(".plugins.json")
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: Default::default(),
            config_path: default_plugin_config_path(),
            extra_output_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Parent for per-session temp directories (system temp dir when unset)
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

// =============================================================================
// Settings Store
// =============================================================================

/// Loads and saves [`AppSettings`] under an advisory file lock.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    settings_path: PathBuf,
}

impl SettingsStore {
    /// Store rooted at `dir` (`{dir}/settings.json`)
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            settings_path: dir.as_ref().join(SETTINGS_FILE),
        }
    }

    /// Store at an explicit file path
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: path.into(),
        }
    }

    /// Store in the user's config directory, or the working directory when
    /// the platform has none.
    pub fn default_location() -> Self {
        let dir = dirs::config_dir()
            .map(|d| d.join("ytpmix"))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir)
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.settings_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Load settings, falling back to defaults when the file is missing.
    ///
    /// A present but unparseable file is an error so the caller can decide
    /// whether to overwrite it.
    pub fn load(&self) -> CoreResult<AppSettings> {
        self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<AppSettings>(&content).map_err(|e| {
                CoreError::Internal(format!(
                    "Failed to parse settings file {}: {}",
                    self.settings_path.display(),
                    e
                ))
            })?;
            settings.normalize();
            Ok(settings)
        })
    }

    /// Like [`load`](Self::load) but never fails.
    pub fn load_or_default(&self) -> AppSettings {
        match self.load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default()
            }
        }
    }

    /// Normalize and persist; returns what was written.
    pub fn save(&self, settings: &AppSettings) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            let mut normalized = settings.clone();
            normalized.normalize();
            atomic_write_json_pretty(&self.settings_path, &normalized)?;
            info!("Settings saved to {}", self.settings_path.display());
            Ok(normalized)
        })
    }
}
