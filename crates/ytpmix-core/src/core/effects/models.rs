//! Effect Model Definitions
//!
//! The effect configuration is a flat set of named parameters. It is a plain
//! value: every compile receives its own copy, and batch jobs receive a merged
//! copy instead of mutating a shared instance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{CoreError, CoreResult};

/// Every parameter name accepted by [`EffectConfig::set_effect`].
pub const EFFECT_NAMES: &[&str] = &[
    "stutter",
    "stutter_ms",
    "stutter_repeats",
    "scramble",
    "scramble_segments",
    "reverse",
    "pitch_semitones",
    "chroma",
    "chroma_similarity",
    "chroma_blend",
];

/// Flat effect configuration, persisted as `{name: value}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectConfig {
    pub stutter: bool,
    /// Length of the repeated fragment in milliseconds
    pub stutter_ms: u32,
    pub stutter_repeats: u32,

    pub scramble: bool,
    pub scramble_segments: u32,

    pub reverse: bool,

    /// Semitone shift; 0 leaves audio untouched
    pub pitch_semitones: f64,

    pub chroma: bool,
    pub chroma_similarity: f64,
    pub chroma_blend: f64,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            stutter: false,
            stutter_ms: 120,
            stutter_repeats: 6,
            scramble: false,
            scramble_segments: 8,
            reverse: false,
            pitch_semitones: 0.0,
            chroma: false,
            chroma_similarity: 0.1,
            chroma_blend: 0.0,
        }
    }
}

impl EffectConfig {
    /// Set one named parameter from a loosely typed value.
    ///
    /// Booleans accept `true`/`false`, numbers (non-zero is true) and the
    /// strings `"true"`, `"false"`, `"1"`, `"0"`, `"on"`, `"off"`. Numbers
    /// accept JSON numbers or numeric strings.
    pub fn set_effect(&mut self, name: &str, value: &Value) -> CoreResult<()> {
        match name {
            "stutter" => self.stutter = as_bool(name, value)?,
            "stutter_ms" => self.stutter_ms = as_u32(name, value)?,
            "stutter_repeats" => self.stutter_repeats = as_u32(name, value)?,
            "scramble" => self.scramble = as_bool(name, value)?,
            "scramble_segments" => self.scramble_segments = as_u32(name, value)?,
            "reverse" => self.reverse = as_bool(name, value)?,
            "pitch_semitones" => self.pitch_semitones = as_f64(name, value)?,
            "chroma" => self.chroma = as_bool(name, value)?,
            "chroma_similarity" => self.chroma_similarity = as_f64(name, value)?,
            "chroma_blend" => self.chroma_blend = as_f64(name, value)?,
            other => return Err(CoreError::UnknownEffect(other.to_string())),
        }
        Ok(())
    }

    /// Current value of one named parameter.
    pub fn get_effect(&self, name: &str) -> CoreResult<Value> {
        let value = match name {
            "stutter" => Value::from(self.stutter),
            "stutter_ms" => Value::from(self.stutter_ms),
            "stutter_repeats" => Value::from(self.stutter_repeats),
            "scramble" => Value::from(self.scramble),
            "scramble_segments" => Value::from(self.scramble_segments),
            "reverse" => Value::from(self.reverse),
            "pitch_semitones" => Value::from(self.pitch_semitones),
            "chroma" => Value::from(self.chroma),
            "chroma_similarity" => Value::from(self.chroma_similarity),
            "chroma_blend" => Value::from(self.chroma_blend),
            other => return Err(CoreError::UnknownEffect(other.to_string())),
        };
        Ok(value)
    }

    /// Copy of `self` with `overrides` applied. `self` is left untouched.
    pub fn merged(&self, overrides: &Map<String, Value>) -> CoreResult<EffectConfig> {
        let mut merged = self.clone();
        for (name, value) in overrides {
            merged.set_effect(name, value)?;
        }
        Ok(merged)
    }

    /// Apply the keys of a preset that name known effects; others are ignored.
    ///
    /// Returns the names that were applied.
    pub fn apply_known(&mut self, params: &Map<String, Value>) -> CoreResult<Vec<String>> {
        let mut applied = Vec::new();
        for (name, value) in params {
            if EFFECT_NAMES.contains(&name.as_str()) {
                self.set_effect(name, value)?;
                applied.push(name.clone());
            }
        }
        Ok(applied)
    }

    /// Reject parameters the compiler cannot turn into a graph.
    pub fn validate(&self) -> CoreResult<()> {
        if self.stutter {
            if self.stutter_ms == 0 {
                return Err(CoreError::FilterBuild(
                    "stutter_ms must be positive".to_string(),
                ));
            }
            if self.stutter_repeats == 0 {
                return Err(CoreError::FilterBuild(
                    "stutter_repeats must be at least 1".to_string(),
                ));
            }
        }

        if self.scramble && self.scramble_segments == 0 {
            return Err(CoreError::FilterBuild(
                "scramble_segments must be at least 1".to_string(),
            ));
        }

        if !self.pitch_semitones.is_finite() {
            return Err(CoreError::FilterBuild(format!(
                "pitch_semitones must be finite, got {}",
                self.pitch_semitones
            )));
        }

        if self.chroma {
            if !(self.chroma_similarity > 0.0 && self.chroma_similarity <= 1.0) {
                return Err(CoreError::FilterBuild(format!(
                    "chroma_similarity must be in (0, 1], got {}",
                    self.chroma_similarity
                )));
            }
            if !(0.0..=1.0).contains(&self.chroma_blend) {
                return Err(CoreError::FilterBuild(format!(
                    "chroma_blend must be in [0, 1], got {}",
                    self.chroma_blend
                )));
            }
        }

        Ok(())
    }

    /// True when at least one stage would emit a node.
    pub fn any_enabled(&self) -> bool {
        self.chroma
            || self.reverse
            || self.stutter
            || self.scramble
            || self.pitch_semitones != 0.0
    }
}

fn type_error(name: &str, expected: &str, value: &Value) -> CoreError {
    CoreError::FilterBuild(format!("{name} expects {expected}, got {value}"))
}

fn as_bool(name: &str, value: &Value) -> CoreResult<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(true),
            "false" | "0" | "off" | "no" => Ok(false),
            _ => Err(type_error(name, "a boolean", value)),
        },
        _ => Err(type_error(name, "a boolean", value)),
    }
}

fn as_f64(name: &str, value: &Value) -> CoreResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(type_error(name, "a finite number", value)),
    }
}

fn as_u32(name: &str, value: &Value) -> CoreResult<u32> {
    let f = as_f64(name, value)?;
    if f < 0.0 || f > u32::MAX as f64 || f.fract() != 0.0 {
        return Err(type_error(name, "a non-negative integer", value));
    }
    Ok(f as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let cfg = EffectConfig::default();
        assert_eq!(cfg.stutter_ms, 120);
        assert_eq!(cfg.stutter_repeats, 6);
        assert_eq!(cfg.scramble_segments, 8);
        assert!((cfg.chroma_similarity - 0.1).abs() < f64::EPSILON);
        assert!(!cfg.any_enabled());
    }

    #[test]
    fn test_set_effect_coerces_values() {
        let mut cfg = EffectConfig::default();
        cfg.set_effect("stutter", &json!("on")).unwrap();
        cfg.set_effect("stutter_ms", &json!("200")).unwrap();
        cfg.set_effect("stutter_repeats", &json!(3)).unwrap();
        cfg.set_effect("pitch_semitones", &json!(-5.5)).unwrap();
        cfg.set_effect("reverse", &json!(1)).unwrap();

        assert!(cfg.stutter);
        assert_eq!(cfg.stutter_ms, 200);
        assert_eq!(cfg.stutter_repeats, 3);
        assert_eq!(cfg.pitch_semitones, -5.5);
        assert!(cfg.reverse);
        assert_eq!(cfg.get_effect("stutter_ms").unwrap(), json!(200));
    }

    #[test]
    fn test_unknown_effect_is_rejected() {
        let mut cfg = EffectConfig::default();
        let err = cfg.set_effect("wobble", &json!(true)).unwrap_err();
        assert!(matches!(err, CoreError::UnknownEffect(name) if name == "wobble"));
        assert!(cfg.get_effect("wobble").is_err());
    }

    #[test]
    fn test_bad_value_types_are_rejected() {
        let mut cfg = EffectConfig::default();
        assert!(cfg.set_effect("stutter", &json!("maybe")).is_err());
        assert!(cfg.set_effect("stutter_repeats", &json!(-1)).is_err());
        assert!(cfg.set_effect("stutter_repeats", &json!(2.5)).is_err());
        assert!(cfg.set_effect("pitch_semitones", &json!([1])).is_err());
    }

    #[test]
    fn test_merged_leaves_original_untouched() {
        let base = EffectConfig::default();
        let mut overrides = Map::new();
        overrides.insert("reverse".into(), json!(true));
        overrides.insert("scramble_segments".into(), json!(4));

        let merged = base.merged(&overrides).unwrap();
        assert!(merged.reverse);
        assert_eq!(merged.scramble_segments, 4);
        assert_eq!(base, EffectConfig::default());
    }

    #[test]
    fn test_apply_known_skips_foreign_keys() {
        let mut cfg = EffectConfig::default();
        let mut params = Map::new();
        params.insert("stutter".into(), json!(true));
        params.insert("description".into(), json!("not an effect"));

        let applied = cfg.apply_known(&params).unwrap();
        assert_eq!(applied, vec!["stutter".to_string()]);
        assert!(cfg.stutter);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut cfg = EffectConfig {
            stutter: true,
            stutter_repeats: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::FilterBuild(_))));

        cfg.stutter = false;
        cfg.chroma = true;
        cfg.chroma_blend = 1.5;
        assert!(matches!(cfg.validate(), Err(CoreError::FilterBuild(_))));

        cfg.chroma_blend = 0.2;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_serde_flat_names() {
        let cfg = EffectConfig {
            stutter: true,
            pitch_semitones: 3.0,
            ..Default::default()
        };
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["stutter"], json!(true));
        assert_eq!(value["stutter_ms"], json!(120));
        assert_eq!(value["pitch_semitones"], json!(3.0));

        let partial: EffectConfig = serde_json::from_value(json!({"reverse": true})).unwrap();
        assert!(partial.reverse);
        assert_eq!(partial.stutter_repeats, 6);
    }
}
