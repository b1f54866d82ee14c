//! Project Module
//!
//! The project owns sources, overlays, the effect configuration, preset
//! parameters and an optional transcript. It tracks where it is in the
//! `Created -> Configured -> Compiled -> Exported | Failed` lifecycle.

mod state;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::effects::EffectConfig;
use crate::core::ffmpeg::DurationProber;
use crate::core::fs::validate_local_media_path;
use crate::core::{CoreError, CoreResult, TimeSec};

pub use state::ProjectState;

// =============================================================================
// Media
// =============================================================================

/// A local media file with a lazily probed duration.
///
/// The duration is probed at most once per instance and then cached.
#[derive(Clone, Debug)]
pub struct MediaSource {
    path: PathBuf,
    duration: OnceLock<TimeSec>,
}

impl MediaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            duration: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duration if it has already been probed.
    pub fn cached_duration(&self) -> Option<TimeSec> {
        self.duration.get().copied()
    }

    /// Probe on first use, then return the cached value.
    pub fn duration(&self, prober: &dyn DurationProber) -> CoreResult<TimeSec> {
        if let Some(d) = self.duration.get() {
            return Ok(*d);
        }
        let probed = prober.probe(&self.path)?;
        self.prime_duration(probed)
    }

    /// Store a duration probed elsewhere (e.g. on a blocking thread).
    ///
    /// An already cached value wins and is returned unchanged.
    pub fn prime_duration(&self, probed: TimeSec) -> CoreResult<TimeSec> {
        if probed < 0.0 || !probed.is_finite() {
            return Err(CoreError::Probe(format!(
                "invalid duration {} for {}",
                probed,
                self.path.display()
            )));
        }
        Ok(*self.duration.get_or_init(|| probed))
    }
}

impl PartialEq for MediaSource {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

/// An image or clip composited over the main video.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub path: PathBuf,
    /// Engine expression for the left edge, passed through verbatim
    pub x: String,
    /// Engine expression for the top edge, passed through verbatim
    pub y: String,
    /// Seconds; a positive start enables the visibility gate
    #[serde(default)]
    pub start: TimeSec,
    /// Seconds visible after `start`; `None` means until the end
    #[serde(default)]
    pub duration: Option<TimeSec>,
}

impl Overlay {
    pub fn new(
        path: impl Into<PathBuf>,
        x: impl Into<String>,
        y: impl Into<String>,
        start: TimeSec,
        duration: Option<TimeSec>,
    ) -> Self {
        Self {
            path: path.into(),
            x: x.into(),
            y: y.into(),
            start,
            duration,
        }
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportStatus {
    Success,
    Failure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "phase", content = "status")]
pub enum ProjectPhase {
    Created,
    Configured,
    Compiled,
    Exported(ExportStatus),
    Failed,
}

// =============================================================================
// Project
// =============================================================================

#[derive(Clone, Debug)]
pub struct Project {
    sources: Vec<MediaSource>,
    overlays: Vec<Overlay>,
    effects: EffectConfig,
    preset_params: Map<String, Value>,
    transcript: Option<String>,
    phase: ProjectPhase,
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

impl Project {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            overlays: Vec::new(),
            effects: EffectConfig::default(),
            preset_params: Map::new(),
            transcript: None,
            phase: ProjectPhase::Created,
        }
    }

    pub fn phase(&self) -> ProjectPhase {
        self.phase
    }

    fn touch(&mut self) {
        self.phase = ProjectPhase::Configured;
    }

    pub fn mark_compiled(&mut self) {
        self.phase = ProjectPhase::Compiled;
    }

    pub fn mark_exported(&mut self, status: ExportStatus) {
        self.phase = ProjectPhase::Exported(status);
    }

    pub fn mark_failed(&mut self) {
        self.phase = ProjectPhase::Failed;
    }

    // -------------------------------------------------------------------------
    // Sources
    // -------------------------------------------------------------------------

    /// Add a local source file. URLs and missing files are rejected.
    pub fn add_source(&mut self, path: &str) -> CoreResult<&MediaSource> {
        let pb = validate_local_media_path(path, "source")?;
        tracing::info!("Added source: {}", pb.display());
        self.sources.push(MediaSource::new(pb));
        self.touch();
        self.sources
            .last()
            .ok_or_else(|| CoreError::Internal("source list empty after push".into()))
    }

    pub fn remove_source(&mut self, index: usize) -> CoreResult<MediaSource> {
        if index >= self.sources.len() {
            return Err(CoreError::InvalidProjectState(format!(
                "no source at index {index}"
            )));
        }
        self.touch();
        Ok(self.sources.remove(index))
    }

    pub fn sources(&self) -> &[MediaSource] {
        &self.sources
    }

    /// The source the effect pipeline runs on (the first one added).
    pub fn main_source(&self) -> CoreResult<&MediaSource> {
        self.sources.first().ok_or(CoreError::NoSources)
    }

    // -------------------------------------------------------------------------
    // Overlays
    // -------------------------------------------------------------------------

    /// Append an overlay; list order is compositing order.
    pub fn add_overlay(&mut self, overlay: Overlay) -> CoreResult<()> {
        let pb = validate_local_media_path(&overlay.path.to_string_lossy(), "overlay")?;
        if overlay.start < 0.0 || !overlay.start.is_finite() {
            return Err(CoreError::FilterBuild(format!(
                "overlay start must be non-negative, got {}",
                overlay.start
            )));
        }
        if let Some(d) = overlay.duration {
            if d <= 0.0 || !d.is_finite() {
                return Err(CoreError::FilterBuild(format!(
                    "overlay duration must be positive, got {d}"
                )));
            }
        }
        self.overlays.push(Overlay { path: pb, ..overlay });
        self.touch();
        Ok(())
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn remove_overlay(&mut self, index: usize) -> CoreResult<Overlay> {
        if index >= self.overlays.len() {
            return Err(CoreError::InvalidProjectState(format!(
                "no overlay at index {index}"
            )));
        }
        self.touch();
        Ok(self.overlays.remove(index))
    }

    /// Swap an overlay with its neighbour; `up` moves it towards index 0.
    ///
    /// Moving past either end is a no-op.
    pub fn move_overlay(&mut self, index: usize, up: bool) -> CoreResult<()> {
        if index >= self.overlays.len() {
            return Err(CoreError::InvalidProjectState(format!(
                "no overlay at index {index}"
            )));
        }
        let target = if up {
            index.checked_sub(1)
        } else {
            Some(index + 1).filter(|t| *t < self.overlays.len())
        };
        if let Some(t) = target {
            self.overlays.swap(index, t);
            self.touch();
        }
        Ok(())
    }

    /// Point an existing overlay at a different file (e.g. a converted GIF).
    pub fn replace_overlay_path(&mut self, index: usize, path: PathBuf) -> CoreResult<()> {
        let overlay = self.overlays.get_mut(index).ok_or_else(|| {
            CoreError::InvalidProjectState(format!("no overlay at index {index}"))
        })?;
        overlay.path = path;
        self.touch();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Effects & presets
    // -------------------------------------------------------------------------

    pub fn effects(&self) -> &EffectConfig {
        &self.effects
    }

    pub fn set_effect(&mut self, name: &str, value: &Value) -> CoreResult<()> {
        self.effects.set_effect(name, value)?;
        self.touch();
        Ok(())
    }

    pub fn set_effects(&mut self, effects: EffectConfig) {
        self.effects = effects;
        self.touch();
    }

    pub fn preset_params(&self) -> &Map<String, Value> {
        &self.preset_params
    }

    /// Merge a preset's parameters and apply the ones naming known effects.
    pub fn load_preset(&mut self, name: &str, params: &Map<String, Value>) -> CoreResult<()> {
        let mut effects = self.effects.clone();
        let applied = effects.apply_known(params)?;
        self.effects = effects;
        for (k, v) in params {
            self.preset_params.insert(k.clone(), v.clone());
        }
        tracing::info!("Loaded preset '{}' ({} effect params)", name, applied.len());
        self.touch();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Transcript
    // -------------------------------------------------------------------------

    pub fn transcript(&self) -> Option<&str> {
        self.transcript.as_deref()
    }

    /// Set or clear the transcript. Blank text clears it.
    pub fn set_transcript(&mut self, text: Option<String>) {
        self.transcript = text.filter(|t| !t.trim().is_empty());
        self.touch();
    }
}
