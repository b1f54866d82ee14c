//! ytpmix Core Type Definitions
//!
//! Defines fundamental types used throughout the project.

use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Job unique identifier (ULID)
pub type JobId = String;

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;

/// A half-open time range `[start, start + duration)` in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start: TimeSec,
    pub duration: TimeSec,
}

impl TimeRange {
    pub fn new(start: TimeSec, duration: TimeSec) -> Self {
        Self { start, duration }
    }

    pub fn end(&self) -> TimeSec {
        self.start + self.duration
    }
}

// =============================================================================
// Stream Types
// =============================================================================

/// Elementary stream kind inside a filter graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    /// Stream specifier suffix used by the engine (`v` / `a`).
    pub fn specifier(&self) -> &'static str {
        match self {
            StreamKind::Video => "v",
            StreamKind::Audio => "a",
        }
    }
}
