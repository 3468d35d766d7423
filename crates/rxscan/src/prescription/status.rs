//! Lifecycle of a prescription job.
//!
//! ```text
//!   pending ──submit──▶ processing ──▶ completed
//!                           │   ▲          │
//!                           ▼   └─reprocess┤
//!                         failed ──────────┘
//! ```
//!
//! `pending` only exists before the job row is written; persisted jobs start
//! in `processing`. The only way out of a terminal state is an explicit
//! reprocess.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid job status transition: {from} -> {to}")]
    Invalid { from: JobStatus, to: JobStatus },

    #[error("Unknown job status '{0}'")]
    UnknownStatus(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Processing)
                | (Failed, Processing)
        )
    }

    pub fn transition(self, to: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError::Invalid { from: self, to })
        }
    }

    /// Statuses a reprocess request may start from.
    pub fn reprocessable() -> [JobStatus; 2] {
        [JobStatus::Completed, JobStatus::Failed]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}
