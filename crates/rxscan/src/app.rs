//! Wires a loaded [`Config`] into a running system: database, blob store,
//! worker pool and the service on top of them.

use std::path::Path;
use std::sync::Arc;

use log::info;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::pipeline::{progress_channel, JobProgressEvent, PipelineConfig};
use crate::service::PrescriptionService;
use crate::storage::FileBlobStore;
use crate::worker::{Recovery, WorkerPool};

const PROGRESS_CAPACITY: usize = 256;

pub struct App {
    pub service: Arc<PrescriptionService>,
    pool: WorkerPool,
    progress: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl App {
    /// Opens storage, starts the workers and runs start-up recovery before
    /// the service accepts anything.
    pub fn start(config: &Config) -> Result<Self> {
        let db = Database::open(Path::new(&config.database_path))?;
        let blobs = Arc::new(FileBlobStore::new(&config.storage_directory));
        let progress = progress_channel(PROGRESS_CAPACITY);

        let pool = WorkerPool::new(
            Arc::new(PipelineConfig::from_config(config)),
            db.clone(),
            blobs.clone(),
            config.worker_count,
            Some(Arc::clone(&progress)),
        )?;
        let Recovery {
            failed_orphans,
            requeued,
        } = pool.recover()?;
        info!(
            "Recovery: {} orphaned run(s) failed, {} job(s) re-queued",
            failed_orphans, requeued
        );

        let service = PrescriptionService::new(
            db,
            blobs,
            Arc::new(pool.queue()),
            config.upload.clone(),
        );

        Ok(Self {
            service: Arc::new(service),
            pool,
            progress,
        })
    }

    /// Progress events of every job run by this app.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.progress.subscribe()
    }

    /// Stops accepting work and waits for in-flight runs to finish.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait();
    }
}
