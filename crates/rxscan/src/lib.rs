pub mod analytics;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod pipeline;
pub mod prescription;
pub mod processor;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod worker;

pub use analytics::AnalyticsSnapshot;
pub use app::App;
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{
    ConfigError, ProcessError, Result, RxscanError, StorageError, ValidationError, WorkerError,
};
pub use pipeline::{Coordinator, PipelineConfig, RunOutcome};
pub use prescription::{ImageUpload, JobMetadata, JobStatus, OwnerId};
pub use service::{PrescriptionService, ServiceError};
pub use storage::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use worker::{InlineQueue, TaskHandler, TaskQueue, WorkerPool};
