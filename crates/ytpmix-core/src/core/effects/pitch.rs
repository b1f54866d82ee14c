//! Pitch shifting via resample + tempo correction.
//!
//! Resampling by `2^(S/12)` moves the pitch and the speed together; the
//! tempo chain then restores the original speed. The engine's `atempo`
//! only accepts ratios in `[0.5, 2.0]`, so larger corrections are split
//! into a chain of bounded factors.

use crate::core::{CoreError, CoreResult};

pub const MIN_TEMPO_FACTOR: f64 = 0.5;
pub const MAX_TEMPO_FACTOR: f64 = 2.0;

/// Shifts smaller than this (in semitones) are treated as no shift.
pub const PITCH_EPSILON: f64 = 1e-6;

/// Tempo factors this close to 1.0 are dropped from the chain.
const UNITY_EPSILON: f64 = 1e-8;

/// Split `tempo` into factors each within `[0.5, 2.0]` whose product is `tempo`.
pub fn decompose_tempo(tempo: f64) -> CoreResult<Vec<f64>> {
    if tempo <= 0.0 || !tempo.is_finite() {
        return Err(CoreError::FilterBuild(format!(
            "tempo must be positive and finite, got {tempo}"
        )));
    }

    let mut remaining = tempo;
    let mut chain = Vec::new();
    while remaining < MIN_TEMPO_FACTOR {
        remaining /= MIN_TEMPO_FACTOR;
        chain.push(MIN_TEMPO_FACTOR);
    }
    while remaining > MAX_TEMPO_FACTOR {
        remaining /= MAX_TEMPO_FACTOR;
        chain.push(MAX_TEMPO_FACTOR);
    }
    chain.push(remaining);
    Ok(chain)
}

/// How a semitone shift is realised on the audio stream.
#[derive(Clone, Debug, PartialEq)]
pub enum PitchPlan {
    /// Shift too small to matter; pass audio through unchanged
    Identity,
    Shift {
        rate_factor: f64,
        /// Resample target, `sample_rate * rate_factor` truncated
        shifted_rate: u32,
        sample_rate: u32,
        /// Tempo factors with unity entries removed
        tempo_chain: Vec<f64>,
    },
}

/// Plan a pitch shift of `semitones` for audio at `sample_rate`.
pub fn plan_pitch_shift(semitones: f64, sample_rate: u32) -> CoreResult<PitchPlan> {
    if !semitones.is_finite() {
        return Err(CoreError::FilterBuild(format!(
            "pitch shift must be finite, got {semitones}"
        )));
    }
    if sample_rate == 0 {
        return Err(CoreError::FilterBuild(
            "sample rate must be positive".to_string(),
        ));
    }
    if semitones.abs() < PITCH_EPSILON {
        return Ok(PitchPlan::Identity);
    }

    let rate_factor = 2f64.powf(semitones / 12.0);
    let tempo = 1.0 / rate_factor;
    let shifted = f64::from(sample_rate) * rate_factor;
    if shifted < 1.0 || shifted > f64::from(u32::MAX) {
        return Err(CoreError::FilterBuild(format!(
            "pitch shift of {semitones} semitones is out of range"
        )));
    }

    let tempo_chain = decompose_tempo(tempo)?
        .into_iter()
        .filter(|f| (f - 1.0).abs() > UNITY_EPSILON)
        .collect();

    Ok(PitchPlan::Shift {
        rate_factor,
        shifted_rate: shifted as u32,
        sample_rate,
        tempo_chain,
    })
}
