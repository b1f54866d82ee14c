//! Export Worker
//!
//! A single background task consuming queued exports in submission order.
//! Compilation runs on the blocking pool (it probes durations); rendering
//! runs on the async runtime. Progress is reported as [`JobEvent`]s.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{BatchJob, Job};
use crate::core::project::Project;
use crate::core::render::ExportOutcome;
use crate::core::session::Session;
use crate::core::{CoreError, CoreResult, JobId};

/// Job update event
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEvent {
    Started {
        job_id: JobId,
    },
    Completed {
        job_id: JobId,
        outcome: ExportOutcome,
    },
    Failed {
        job_id: JobId,
        error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Started { job_id }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }
}

/// Queued work: the job and the project snapshot it renders.
struct WorkItem {
    job: Job,
    project: Project,
}

/// Handle to the background export task.
pub struct ExportWorker {
    queue_tx: Option<mpsc::UnboundedSender<WorkItem>>,
    handle: Option<JoinHandle<()>>,
}

impl ExportWorker {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn(session: Arc<Session>) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(session, queue_rx, event_tx));
        (
            Self {
                queue_tx: Some(queue_tx),
                handle: Some(handle),
            },
            event_rx,
        )
    }

    /// Queue an export of a snapshot of `project`.
    ///
    /// Later edits to `project` do not affect the queued job.
    pub fn submit(&self, project: &Project, request: BatchJob) -> CoreResult<JobId> {
        let job = Job::new(request);
        let job_id = job.id.clone();
        let tx = self
            .queue_tx
            .as_ref()
            .ok_or_else(|| CoreError::Internal("export worker is shut down".to_string()))?;
        tx.send(WorkItem {
            job,
            project: project.clone(),
        })
        .map_err(|_| CoreError::Internal("export worker has stopped".to_string()))?;
        tracing::debug!("Queued export job {}", job_id);
        Ok(job_id)
    }

    /// Stop accepting jobs and wait until the queued ones have finished.
    pub async fn shutdown(mut self) {
        self.queue_tx.take();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("Export worker task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_worker(
    session: Arc<Session>,
    mut queue_rx: mpsc::UnboundedReceiver<WorkItem>,
    events: mpsc::UnboundedSender<JobEvent>,
) {
    while let Some(item) = queue_rx.recv().await {
        let job_id = item.job.id.clone();
        tracing::info!("Processing export job {} ({})", job_id, item.job.request.name);
        let _ = events.send(JobEvent::Started {
            job_id: job_id.clone(),
        });

        let event = match process(&session, item).await {
            Ok(outcome) => JobEvent::Completed { job_id, outcome },
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Export job failed");
                JobEvent::Failed {
                    job_id,
                    error: e.to_string(),
                }
            }
        };
        // Nobody listening is not an error for the worker
        let _ = events.send(event);
    }
    tracing::debug!("Export worker queue closed");
}

async fn process(session: &Arc<Session>, item: WorkItem) -> CoreResult<ExportOutcome> {
    let WorkItem { job, project } = item;
    let compile_session = Arc::clone(session);
    let plan = tokio::task::spawn_blocking(move || {
        let effects = project.effects().merged(&job.request.overrides)?;
        compile_session.plan_with(&project, &effects, &job.request.output)
    })
    .await
    .map_err(|e| CoreError::Internal(format!("compile task failed: {e}")))??;

    session.execute(&plan.command).await
}
