use std::sync::Mutex;

use crate::error::WorkerError;
use crate::pipeline::NoopProgress;

use super::task::{TaskHandler, TaskReport};

/// Hands a submitted job to whatever runs it. Delivery may repeat; the
/// receiving side deduplicates through the run claim.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, job_id: &str) -> Result<(), WorkerError>;
}

/// Runs each task on the caller's thread before `enqueue` returns.
pub struct InlineQueue {
    handler: TaskHandler,
    reports: Mutex<Vec<TaskReport>>,
}

impl InlineQueue {
    pub fn new(handler: TaskHandler) -> Self {
        Self {
            handler,
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Reports of every task run so far, oldest first.
    pub fn reports(&self) -> Vec<TaskReport> {
        self.reports
            .lock()
            .map(|reports| reports.clone())
            .unwrap_or_default()
    }
}

impl TaskQueue for InlineQueue {
    fn enqueue(&self, job_id: &str) -> Result<(), WorkerError> {
        let report = self.handler.handle(job_id, &NoopProgress);
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report);
        }
        Ok(())
    }
}

/// Records job ids without running them, for callers that drain the
/// queue themselves.
#[derive(Default)]
pub struct DeferredQueue {
    pending: Mutex<Vec<String>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every pending job id, oldest first.
    pub fn drain(&self) -> Vec<String> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

impl TaskQueue for DeferredQueue {
    fn enqueue(&self, job_id: &str) -> Result<(), WorkerError> {
        self.pending
            .lock()
            .map_err(|_| WorkerError::ChannelClosed)?
            .push(job_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_queue_drains_in_order() {
        let queue = DeferredQueue::new();
        queue.enqueue("a").unwrap();
        queue.enqueue("b").unwrap();
        queue.enqueue("a").unwrap();

        assert_eq!(queue.drain(), vec!["a", "b", "a"]);
        assert!(queue.drain().is_empty());
    }
}
