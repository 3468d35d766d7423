use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RxscanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Service error: {0}")]
    Service(#[from] crate::service::ServiceError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Submission-time rejections. No job row exists when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("An authenticated owner is required")]
    MissingOwner,

    #[error("At least one image is required")]
    NoImages,

    #[error("Too many images: {count} submitted, at most {max} allowed")]
    TooManyImages { count: usize, max: usize },

    #[error("Image {index} is too large: {size} bytes, maximum is {max} bytes")]
    ImageTooLarge { index: usize, size: usize, max: usize },

    #[error("Image {index} has unsupported content type '{content_type}'")]
    UnsupportedContentType { index: usize, content_type: String },

    #[error("Image {index} is empty")]
    EmptyImage { index: usize },
}

/// Per-image stage failures. These never abort a job.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("Failed to encode image: {0}")]
    ImageEncode(String),

    #[error("Failed to initialize OCR engine: {0}")]
    OcrInit(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Failed to process PDF: {0}")]
    PdfProcessing(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write blob '{path}': {source}")]
    WriteBlob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read blob '{path}': {source}")]
    ReadBlob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete blob '{path}': {source}")]
    DeleteBlob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Blob not found: {0}")]
    BlobNotFound(String),

    #[error("Invalid blob key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Blob store lock poisoned")]
    LockPoisoned,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Start-up recovery failed: {0}")]
    Recovery(#[from] crate::db::DatabaseError),
}

pub type Result<T> = std::result::Result<T, RxscanError>;
