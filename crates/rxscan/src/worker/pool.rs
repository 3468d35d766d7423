use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use crate::db::{job_repo, Database};
use crate::error::WorkerError;
use crate::pipeline::{
    BroadcastProgress, Coordinator, JobPhase, JobProgressEvent, NoopProgress, PipelineConfig,
    ProgressEvent, ProgressReporter,
};
use crate::storage::BlobStore;

use super::queue::TaskQueue;
use super::task::{TaskHandler, TaskReport};

/// Builds a coordinator. Called once inside each worker thread, so
/// recognition engines are never shared between workers.
pub type CoordinatorFactory = Arc<dyn Fn() -> Coordinator + Send + Sync>;

/// What start-up recovery did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Jobs whose claimed run never finished, now `failed`.
    pub failed_orphans: usize,
    /// `processing` jobs that were never claimed, delivered again.
    pub requeued: usize,
}

pub struct WorkerPool {
    db: Database,
    task_sender: Sender<String>,
    report_receiver: Receiver<TaskReport>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

/// Cloneable producer side of a [`WorkerPool`].
#[derive(Clone)]
pub struct PoolQueue {
    sender: Sender<String>,
    shutdown: Arc<AtomicBool>,
}

impl TaskQueue for PoolQueue {
    fn enqueue(&self, job_id: &str) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }
        self.sender
            .send(job_id.to_string())
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

impl WorkerPool {
    /// Starts `worker_count` workers with Tesseract-backed coordinators.
    pub fn new(
        config: Arc<PipelineConfig>,
        db: Database,
        blobs: Arc<dyn BlobStore>,
        worker_count: usize,
        progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
    ) -> Result<Self, WorkerError> {
        let factory_db = db.clone();
        let factory: CoordinatorFactory = Arc::new(move || {
            Coordinator::from_config(&config, factory_db.clone(), Arc::clone(&blobs))
        });
        Self::with_factory(factory, db, worker_count, progress_sender)
    }

    /// Starts workers that build their coordinator with `factory`.
    /// A `worker_count` of zero starts one worker.
    pub fn with_factory(
        factory: CoordinatorFactory,
        db: Database,
        worker_count: usize,
        progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
    ) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        // Job ids are durable in the database; submitters never wait on a backlog.
        let (task_sender, task_receiver) = unbounded::<String>();
        let (report_sender, report_receiver) = bounded::<TaskReport>(worker_count * 64);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let report_tx = report_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_factory = Arc::clone(&factory);
            let worker_db = db.clone();
            let progress = progress_sender.clone();

            let handle = thread::Builder::new()
                .name(format!("rxscan-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(
                        worker_id,
                        task_rx,
                        report_tx,
                        shutdown_flag,
                        worker_db,
                        worker_factory,
                        progress,
                    );
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            db,
            task_sender,
            report_receiver,
            workers,
            shutdown,
        })
    }

    /// Fails runs a previous process left claimed, then re-delivers every
    /// unclaimed `processing` job. Call once, before accepting submissions.
    pub fn recover(&self) -> Result<Recovery, WorkerError> {
        let failed_orphans = job_repo::fail_orphaned_runs(&self.db)?;
        if failed_orphans > 0 {
            warn!("Marked {} interrupted job(s) as failed", failed_orphans);
        }

        let pending = job_repo::unclaimed_processing(&self.db)?;
        let queue = self.queue();
        for job_id in &pending {
            queue.enqueue(job_id)?;
        }
        if !pending.is_empty() {
            info!("Re-queued {} pending job(s)", pending.len());
        }

        Ok(Recovery {
            failed_orphans,
            requeued: pending.len(),
        })
    }

    pub fn queue(&self) -> PoolQueue {
        PoolQueue {
            sender: self.task_sender.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    pub fn try_recv_report(&self) -> Option<TaskReport> {
        self.report_receiver.try_recv().ok()
    }

    pub fn recv_report(&self) -> Option<TaskReport> {
        self.report_receiver.recv().ok()
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn wait(self) {
        drop(self.task_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn run_worker(
    worker_id: usize,
    task_receiver: Receiver<String>,
    report_sender: Sender<TaskReport>,
    shutdown: Arc<AtomicBool>,
    db: Database,
    factory: CoordinatorFactory,
    progress_sender: Option<Arc<broadcast::Sender<JobProgressEvent>>>,
) {
    debug!("Worker {} started", worker_id);

    let handler = TaskHandler::new(db, factory());

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match task_receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(job_id) => {
                debug!("Worker {} handling job {}", worker_id, job_id);

                let report = match progress_sender {
                    Some(ref sender) => {
                        let progress = BroadcastProgress::new(&job_id, Arc::clone(sender));
                        progress.report(ProgressEvent::Phase {
                            phase: JobPhase::Queued,
                            message: "Job queued for processing".to_string(),
                        });
                        handler.handle(&job_id, &progress)
                    }
                    None => handler.handle(&job_id, &NoopProgress),
                };

                // Nobody listening for reports is fine.
                let _ = report_sender.try_send(report);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} task channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
