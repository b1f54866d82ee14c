//! Job System Module
//!
//! Export jobs for batch runs and the background export worker.

mod worker;

pub use worker::*;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::render::ExportOutcome;
use crate::core::{CoreError, CoreResult, JobId};

// =============================================================================
// Job Types
// =============================================================================

/// One requested render: an output path plus effect overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub name: String,
    pub output: PathBuf,
    /// Flat effect parameters applied on top of the project's effects
    #[serde(default)]
    pub overrides: Map<String, Value>,
}

impl BatchJob {
    pub fn new(name: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            overrides: Map::new(),
        }
    }

    pub fn with_override(mut self, name: &str, value: Value) -> Self {
        self.overrides.insert(name.to_string(), value);
        self
    }
}

/// Job status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobStatus {
    /// Waiting in queue
    #[default]
    Queued,
    /// Compiling or rendering
    Running,
    Completed { outcome: ExportOutcome },
    Failed { error: String },
}

/// Job definition
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    pub request: BatchJob,
    pub status: JobStatus,
    /// Creation timestamp
    pub created_at: String,
    /// Completion timestamp
    pub completed_at: Option<String>,
}

impl Job {
    pub fn new(request: BatchJob) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            request,
            status: JobStatus::Queued,
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    /// Record a terminal status and the completion time.
    pub fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.completed_at = Some(chrono::Utc::now().to_rfc3339());
    }

    pub fn is_done(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed { .. } | JobStatus::Failed { .. }
        )
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, JobStatus::Completed { .. })
    }
}

/// Read a batch file: a JSON array of `{name, output, overrides?}`.
pub fn load_batch_file(path: &Path) -> CoreResult<Vec<BatchJob>> {
    let text = std::fs::read_to_string(path)?;
    let jobs: Vec<BatchJob> = serde_json::from_str(&text)
        .map_err(|e| CoreError::Validation(format!("{}: {}", path.display(), e)))?;
    if jobs.is_empty() {
        return Err(CoreError::Validation(format!(
            "{} contains no jobs",
            path.display()
        )));
    }
    Ok(jobs)
}
