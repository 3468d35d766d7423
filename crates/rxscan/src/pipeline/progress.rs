use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::prescription::JobStatus;

/// Phase of a job run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Preprocessing,
    Recognizing,
    Extracting,
    Completed,
    Failed,
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Queued => write!(f, "Queued"),
            JobPhase::Preprocessing => write!(f, "Preprocessing"),
            JobPhase::Recognizing => write!(f, "Recognizing"),
            JobPhase::Extracting => write!(f, "Extracting"),
            JobPhase::Completed => write!(f, "Completed"),
            JobPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Events emitted by the coordinator during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Phase { phase: JobPhase, message: String },
    Completed { medicine_count: usize },
    /// Carries a generic message only; error details stay in the logs.
    Failed { message: String },
}

impl ProgressEvent {
    pub fn phase(&self) -> JobPhase {
        match self {
            ProgressEvent::Phase { phase, .. } => *phase,
            ProgressEvent::Completed { .. } => JobPhase::Completed,
            ProgressEvent::Failed { .. } => JobPhase::Failed,
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Serializable progress event sent to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub phase: JobPhase,
    pub status: JobStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medicine_count: Option<usize>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, event: &ProgressEvent) -> Self {
        let phase = event.phase();
        let status = match phase {
            JobPhase::Completed => JobStatus::Completed,
            JobPhase::Failed => JobStatus::Failed,
            _ => JobStatus::Processing,
        };
        let (message, medicine_count) = match event {
            ProgressEvent::Phase { message, .. } | ProgressEvent::Failed { message } => {
                (message.clone(), None)
            }
            ProgressEvent::Completed { medicine_count } => (
                format!("Extracted {} medicine(s)", medicine_count),
                Some(*medicine_count),
            ),
        };

        Self {
            job_id: job_id.to_string(),
            phase,
            status,
            message,
            medicine_count,
            timestamp: Utc::now(),
        }
    }
}

/// Publishes a job's events on a broadcast channel. Sending never blocks
/// and events are dropped when nobody is subscribed.
pub struct BroadcastProgress {
    job_id: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl BroadcastProgress {
    pub fn new(job_id: &str, sender: Arc<broadcast::Sender<JobProgressEvent>>) -> Self {
        Self {
            job_id: job_id.to_string(),
            sender,
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        let _ = self.sender.send(JobProgressEvent::new(&self.job_id, &event));
    }
}

/// Creates a broadcast channel for progress events.
pub fn progress_channel(capacity: usize) -> Arc<broadcast::Sender<JobProgressEvent>> {
    let (sender, _) = broadcast::channel(capacity);
    Arc::new(sender)
}
