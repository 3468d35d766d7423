use thiserror::Error;

/// Errors that abort a run and leave the job `failed`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Persistence failed: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {0} has no images")]
    NoImages(String),

    #[error("Run {run_id} no longer owns job {job_id}")]
    LostClaim { job_id: String, run_id: String },
}

/// A per-image stage failure that was isolated and did not stop the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageWarning {
    pub index: usize,
    pub stage: &'static str,
    pub error: String,
}
