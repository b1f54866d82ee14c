//! Persisted project state.
//!
//! On disk: `{sources, overlays, effects, preset_params, transcript?}`.
//! Referenced files are not re-checked on load; a moved source only fails
//! when the project is compiled.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{MediaSource, Overlay, Project, ProjectPhase};
use crate::core::effects::EffectConfig;
use crate::core::fs::atomic_write_json_pretty;
use crate::core::{CoreError, CoreResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub overlays: Vec<Overlay>,
    #[serde(default)]
    pub effects: EffectConfig,
    #[serde(default)]
    pub preset_params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl Project {
    pub fn to_state(&self) -> ProjectState {
        ProjectState {
            sources: self
                .sources
                .iter()
                .map(|s| s.path().to_string_lossy().to_string())
                .collect(),
            overlays: self.overlays.clone(),
            effects: self.effects.clone(),
            preset_params: self.preset_params.clone(),
            transcript: self.transcript.clone(),
        }
    }

    pub fn from_state(state: ProjectState) -> Self {
        let phase = if state.sources.is_empty() && state.overlays.is_empty() {
            ProjectPhase::Created
        } else {
            ProjectPhase::Configured
        };
        Self {
            sources: state
                .sources
                .into_iter()
                .map(|s| MediaSource::new(PathBuf::from(s)))
                .collect(),
            overlays: state.overlays,
            effects: state.effects,
            preset_params: state.preset_params,
            transcript: state.transcript,
            phase,
        }
    }

    /// Save the project as pretty JSON, replacing `path` atomically.
    pub fn export_project_state(&self, path: &Path) -> CoreResult<()> {
        atomic_write_json_pretty(path, &self.to_state())?;
        tracing::info!("Saved project state to {}", path.display());
        Ok(())
    }

    /// Replace this project's contents with the state stored at `path`.
    ///
    /// On failure the project is left unchanged.
    pub fn load_project_state(&mut self, path: &Path) -> CoreResult<()> {
        let text = std::fs::read_to_string(path)?;
        let state: ProjectState = serde_json::from_str(&text).map_err(|e| {
            CoreError::InvalidProjectState(format!("{}: {}", path.display(), e))
        })?;
        *self = Project::from_state(state);
        tracing::info!(
            sources = self.sources.len(),
            overlays = self.overlays.len(),
            "Loaded project state from {}",
            path.display()
        );
        Ok(())
    }

    /// Convenience for `Project::new()` followed by `load_project_state`.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let mut project = Project::new();
        project.load_project_state(path)?;
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configured_project(dir: &Path) -> Project {
        let src = dir.join("main.mp4");
        let img = dir.join("logo.png");
        std::fs::write(&src, b"x").unwrap();
        std::fs::write(&img, b"x").unwrap();

        let mut project = Project::new();
        project.add_source(&src.to_string_lossy()).unwrap();
        project
            .add_overlay(Overlay::new(&img, "W-w-10", "10", 2.5, None))
            .unwrap();
        project
            .add_overlay(Overlay::new(&img, "0", "0", 0.0, Some(1.25)))
            .unwrap();
        project.set_effect("stutter", &json!(true)).unwrap();
        project.set_effect("pitch_semitones", &json!(-3.5)).unwrap();
        project.set_effect("chroma_similarity", &json!(0.15)).unwrap();
        project
            .load_preset("mine", json!({"scramble": true, "tag": "x"}).as_object().unwrap())
            .unwrap();
        project.set_transcript(Some("one. two".into()));
        project
    }

    #[test]
    fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let project = configured_project(dir.path());
        let path = dir.path().join("state").join("project.json");

        project.export_project_state(&path).unwrap();
        let loaded = Project::open(&path).unwrap();

        assert_eq!(loaded.to_state(), project.to_state());
        assert_eq!(loaded.sources(), project.sources());
        assert_eq!(loaded.overlays(), project.overlays());
        assert_eq!(loaded.effects(), project.effects());
        assert_eq!(loaded.preset_params(), project.preset_params());
        assert_eq!(loaded.transcript(), Some("one. two"));
        assert_eq!(loaded.phase(), ProjectPhase::Configured);
    }

    #[test]
    fn test_persisted_layout() {
        let dir = tempfile::tempdir().unwrap();
        let project = configured_project(dir.path());
        let value = serde_json::to_value(project.to_state()).unwrap();

        assert!(value["sources"][0].as_str().unwrap().ends_with("main.mp4"));
        assert_eq!(value["overlays"][0]["x"], json!("W-w-10"));
        assert_eq!(value["overlays"][0]["start"], json!(2.5));
        assert!(value["overlays"][0]["duration"].is_null());
        assert_eq!(value["overlays"][1]["duration"], json!(1.25));
        assert_eq!(value["effects"]["stutter"], json!(true));
        assert_eq!(value["effects"]["stutter_ms"], json!(120));
        assert_eq!(value["preset_params"]["tag"], json!("x"));
    }

    #[test]
    fn test_load_does_not_revalidate_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(
            &path,
            r#"{"sources":["/gone/away.mp4"],"overlays":[{"path":"/gone/o.png","x":"0","y":"0","start":0,"duration":null}],"effects":{"reverse":true},"preset_params":{}}"#,
        )
        .unwrap();

        let project = Project::open(&path).unwrap();
        assert_eq!(
            project.main_source().unwrap().path(),
            Path::new("/gone/away.mp4")
        );
        assert!(project.effects().reverse);
        assert_eq!(project.effects().stutter_ms, 120);
    }

    #[test]
    fn test_bad_json_leaves_project_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let project_before = configured_project(dir.path());
        let mut project = project_before.clone();

        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            project.load_project_state(&path),
            Err(CoreError::InvalidProjectState(_))
        ));
        assert_eq!(project.to_state(), project_before.to_state());

        assert!(matches!(
            project.load_project_state(&dir.path().join("missing.json")),
            Err(CoreError::IoError(_))
        ));
    }
}
