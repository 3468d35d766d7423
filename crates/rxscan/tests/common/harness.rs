//! Test harness for isolated end-to-end runs.
//!
//! Every harness owns a temporary directory holding an on-disk SQLite
//! database and a filesystem blob store. Recognition is faked: strategies
//! answer by image width, which survives compression and enhancement.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;

use rxscan::config::{PreprocessConfig, UploadConfig};
use rxscan::extractor::MedicineExtractor;
use rxscan::processor::{
    sniff_image_info, Arbiter, ImagePreprocessor, RecognitionEngine, RecognitionResult,
    RecognitionStrategy,
};
use rxscan::worker::DeferredQueue;
use rxscan::{Coordinator, Database, FileBlobStore, InlineQueue, PrescriptionService, TaskHandler};

/// Answers with canned `(text, confidence)` per image width. Unknown
/// widths behave like an engine failure: empty text, zero confidence.
pub struct KeyedStrategy {
    engine: RecognitionEngine,
    by_width: HashMap<u32, (String, f64)>,
}

impl KeyedStrategy {
    pub fn new(engine: RecognitionEngine, texts: &[(u32, &str, f64)]) -> Self {
        Self {
            engine,
            by_width: texts
                .iter()
                .map(|(width, text, confidence)| (*width, (text.to_string(), *confidence)))
                .collect(),
        }
    }
}

impl RecognitionStrategy for KeyedStrategy {
    fn engine(&self) -> RecognitionEngine {
        self.engine
    }

    fn recognize(&self, image: &[u8]) -> RecognitionResult {
        let known = sniff_image_info(image).and_then(|info| self.by_width.get(&info.width));
        match known {
            Some((text, confidence)) => RecognitionResult {
                text: text.clone(),
                confidence: *confidence,
                engine: self.engine,
            },
            None => RecognitionResult::empty(self.engine),
        }
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub db: Database,
    pub blobs: Arc<FileBlobStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("data").join("rxscan.db"))
            .expect("Failed to open database");
        let blobs = Arc::new(FileBlobStore::new(temp_dir.path().join("blobs")));
        Self {
            temp_dir,
            db,
            blobs,
        }
    }

    /// Coordinator whose constrained strategy answers from `texts` and whose
    /// general strategy never recognizes anything.
    pub fn coordinator(&self, texts: &[(u32, &str, f64)]) -> Coordinator {
        self.coordinator_with(
            KeyedStrategy::new(RecognitionEngine::Constrained, texts),
            KeyedStrategy::new(RecognitionEngine::General, &[]),
        )
    }

    pub fn coordinator_with(&self, primary: KeyedStrategy, secondary: KeyedStrategy) -> Coordinator {
        Coordinator::new(
            self.db.clone(),
            self.blobs.clone(),
            ImagePreprocessor::new(PreprocessConfig::default()),
            Arbiter::new(Arc::new(primary), Arc::new(secondary)),
            MedicineExtractor::new(),
        )
    }

    pub fn handler(&self, texts: &[(u32, &str, f64)]) -> TaskHandler {
        TaskHandler::new(self.db.clone(), self.coordinator(texts))
    }

    /// Service that runs every job to completion inside `submit_job`.
    pub fn inline_service(&self, texts: &[(u32, &str, f64)]) -> (PrescriptionService, Arc<InlineQueue>) {
        let queue = Arc::new(InlineQueue::new(self.handler(texts)));
        let service = PrescriptionService::new(
            self.db.clone(),
            self.blobs.clone(),
            queue.clone(),
            UploadConfig::default(),
        );
        (service, queue)
    }

    /// Service whose queue only records job ids.
    pub fn deferred_service(&self) -> (PrescriptionService, Arc<DeferredQueue>) {
        let queue = Arc::new(DeferredQueue::new());
        let service = PrescriptionService::new(
            self.db.clone(),
            self.blobs.clone(),
            queue.clone(),
            UploadConfig::default(),
        );
        (service, queue)
    }

    pub fn blob_root(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("blobs")
    }
}
