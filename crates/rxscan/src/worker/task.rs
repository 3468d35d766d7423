use log::{debug, warn};

use crate::db::{job_repo, Database};
use crate::pipeline::{Coordinator, ProgressReporter, RunOutcome};
use crate::prescription::JobStatus;

/// What happened to one delivered task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed { medicine_count: usize },
    Failed,
    /// Duplicate or stale delivery: the job was terminal or already claimed.
    Skipped,
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub job_id: String,
    pub outcome: TaskOutcome,
    pub message: Option<String>,
}

impl TaskReport {
    fn new(job_id: &str, outcome: TaskOutcome) -> Self {
        Self {
            job_id: job_id.to_string(),
            outcome,
            message: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Turns a delivered job id into at most one coordinator run.
///
/// Delivery is at-least-once. Every delivery tries to claim the job's run
/// and only the winner runs, so redelivering a job is a no-op.
pub struct TaskHandler {
    db: Database,
    coordinator: Coordinator,
}

impl TaskHandler {
    pub fn new(db: Database, coordinator: Coordinator) -> Self {
        Self { db, coordinator }
    }

    pub fn handle(&self, job_id: &str, progress: &dyn ProgressReporter) -> TaskReport {
        let job = match job_repo::find_by_id(&self.db, job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Delivered job {} does not exist", job_id);
                return TaskReport::new(job_id, TaskOutcome::NotFound);
            }
            Err(e) => {
                // The job stays unclaimed and is re-queued on the next start.
                warn!("Could not load job {}: {}", job_id, e);
                return TaskReport::new(job_id, TaskOutcome::Failed).with_message(e.to_string());
            }
        };

        if !matches!(job.status(), Ok(JobStatus::Processing)) {
            debug!("Job {} is {}, skipping delivery", job_id, job.status);
            return TaskReport::new(job_id, TaskOutcome::Skipped);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        match job_repo::claim_run(&self.db, job_id, &run_id) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Job {} already claimed, skipping delivery", job_id);
                return TaskReport::new(job_id, TaskOutcome::Skipped);
            }
            Err(e) => {
                warn!("Could not claim job {}: {}", job_id, e);
                return TaskReport::new(job_id, TaskOutcome::Failed).with_message(e.to_string());
            }
        }

        match self.coordinator.run(&job, &run_id, progress) {
            RunOutcome::Completed { medicine_count, .. } => {
                TaskReport::new(job_id, TaskOutcome::Completed { medicine_count })
            }
            RunOutcome::Failed { error } => {
                TaskReport::new(job_id, TaskOutcome::Failed).with_message(error)
            }
            RunOutcome::Superseded { run_id } => {
                debug!("Run {} of job {} was superseded", run_id, job_id);
                TaskReport::new(job_id, TaskOutcome::Skipped)
                    .with_message(format!("run {} superseded", run_id))
            }
        }
    }
}
