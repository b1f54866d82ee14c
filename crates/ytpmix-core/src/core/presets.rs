//! Effect Presets
//!
//! Named bundles of flat effect parameters. Two presets ship with the crate;
//! a readable `presets.json` replaces them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::{CoreError, CoreResult};

/// Preset name -> flat effect parameters
pub type PresetTable = BTreeMap<String, Map<String, Value>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PresetFile {
    #[serde(default)]
    presets: PresetTable,
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Presets available when no presets file can be read.
pub fn builtin_presets() -> PresetTable {
    let mut table = PresetTable::new();
    table.insert(
        "classic (2006-2009)".to_string(),
        object(json!({
            "stutter": true,
            "stutter_ms": 120,
            "stutter_repeats": 6,
            "scramble": true,
            "scramble_segments": 8,
            "reverse": false,
            "pitch_semitones": 3
        })),
    );
    table.insert(
        "modern (2025)".to_string(),
        object(json!({
            "stutter": true,
            "stutter_ms": 80,
            "stutter_repeats": 3,
            "scramble": false,
            "scramble_segments": 6,
            "reverse": true,
            "pitch_semitones": -5
        })),
    );
    table
}

/// Read a presets file strictly.
pub fn read_presets_file(path: &Path) -> CoreResult<PresetTable> {
    let text = std::fs::read_to_string(path)?;
    let file: PresetFile = serde_json::from_str(&text)
        .map_err(|e| CoreError::Validation(format!("{}: {}", path.display(), e)))?;
    Ok(file.presets)
}

/// Presets from `path` when it is readable and non-empty, else the built-ins.
pub fn load_presets(path: Option<&Path>) -> PresetTable {
    let Some(path) = path else {
        return builtin_presets();
    };
    if !path.exists() {
        return builtin_presets();
    }
    match read_presets_file(path) {
        Ok(table) if !table.is_empty() => table,
        Ok(_) => {
            tracing::warn!("Presets file {} defines no presets", path.display());
            builtin_presets()
        }
        Err(e) => {
            tracing::warn!("Failed to read presets from {}: {}", path.display(), e);
            builtin_presets()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::effects::EffectConfig;

    #[test]
    fn test_builtins_apply_cleanly() {
        let presets = builtin_presets();
        assert_eq!(presets.len(), 2);

        let classic = EffectConfig::default()
            .merged(&presets["classic (2006-2009)"])
            .unwrap();
        assert!(classic.stutter && classic.scramble && !classic.reverse);
        assert_eq!(classic.stutter_repeats, 6);
        assert_eq!(classic.pitch_semitones, 3.0);

        let modern = EffectConfig::default()
            .merged(&presets["modern (2025)"])
            .unwrap();
        assert!(modern.reverse && !modern.scramble);
        assert_eq!(modern.stutter_ms, 80);
        assert_eq!(modern.scramble_segments, 6);
        assert_eq!(modern.pitch_semitones, -5.0);
    }

    #[test]
    fn test_file_replaces_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(
            &path,
            r#"{"presets": {"loud": {"reverse": true, "gain": 3}}}"#,
        )
        .unwrap();

        let presets = load_presets(Some(&path));
        assert_eq!(presets.keys().collect::<Vec<_>>(), vec!["loud"]);
        assert_eq!(presets["loud"]["gain"], json!(3));
    }

    #[test]
    fn test_unreadable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(&path, "[broken").unwrap();
        assert_eq!(load_presets(Some(&path)), builtin_presets());
        assert!(read_presets_file(&path).is_err());

        std::fs::write(&path, r#"{"presets": {}}"#).unwrap();
        assert_eq!(load_presets(Some(&path)), builtin_presets());

        assert_eq!(
            load_presets(Some(&dir.path().join("missing.json"))),
            builtin_presets()
        );
        assert_eq!(load_presets(None), builtin_presets());
    }
}
