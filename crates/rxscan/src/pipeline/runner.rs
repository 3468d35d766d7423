use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use crate::analytics;
use crate::db::image_repo::{self, ImageRow};
use crate::db::job_repo::{self, JobRow};
use crate::db::{medicine_repo, Database};
use crate::extractor::MedicineExtractor;
use crate::prescription::JobStatus;
use crate::processor::{self, build_corpus, Arbiter, ImagePreprocessor, RecognitionResult};
use crate::sanitize;
use crate::storage::{BlobStore, ImageKeys};

use super::config::PipelineConfig;
use super::context::RunContext;
use super::error::{ImageWarning, PipelineError};
use super::progress::{JobPhase, ProgressEvent, ProgressReporter};

/// Terminal result of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        medicine_count: usize,
        warnings: Vec<ImageWarning>,
    },
    Failed {
        error: String,
    },
    /// The run no longer owned the job when it tried to finish; nothing
    /// terminal was written.
    Superseded {
        run_id: String,
    },
}

/// Drives one claimed job run from raw images to persisted medicines.
pub struct Coordinator {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    preprocessor: ImagePreprocessor,
    arbiter: Arbiter,
    extractor: MedicineExtractor,
}

/// Derived keys and recognition result of one image.
struct ImageOutcome {
    compressed_key: Option<String>,
    enhanced_key: Option<String>,
    result: RecognitionResult,
}

impl Coordinator {
    /// Production constructor with Tesseract-backed recognition. Each
    /// worker builds its own coordinator, so engines are per worker.
    pub fn from_config(config: &PipelineConfig, db: Database, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            db,
            blobs,
            preprocessor: ImagePreprocessor::new(config.preprocess.clone()),
            arbiter: processor::tesseract_arbiter(&config.ocr),
            extractor: MedicineExtractor::new(),
        }
    }

    /// Constructor with injected stages.
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        preprocessor: ImagePreprocessor,
        arbiter: Arbiter,
        extractor: MedicineExtractor,
    ) -> Self {
        Self {
            db,
            blobs,
            preprocessor,
            arbiter,
            extractor,
        }
    }

    /// Runs a job whose run `run_id` has already been claimed.
    pub fn run(&self, job: &JobRow, run_id: &str, progress: &dyn ProgressReporter) -> RunOutcome {
        let _pipeline_span = info_span!("pipeline",
            job_id = %job.id,
            owner = %sanitize::hash_owner(&job.owner_id),
        )
        .entered();

        let mut ctx = RunContext::new(job.clone(), run_id);

        let outcome = match self.execute(&mut ctx, progress) {
            Ok(()) => self.complete(&ctx, progress),
            Err(e) => self.fail(&ctx, e, progress),
        };

        if !matches!(outcome, RunOutcome::Superseded { .. }) {
            self.refresh_analytics(&ctx.job.owner_id);
        }
        outcome
    }

    fn execute(
        &self,
        ctx: &mut RunContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let images = image_repo::list_for_job(&self.db, &ctx.job.id)?;
        if images.is_empty() {
            return Err(PipelineError::NoImages(ctx.job.id.clone()));
        }

        let total = images.len();
        for (index, image) in images.iter().enumerate() {
            let _image_span = info_span!("image", index, image_id = %image.id).entered();

            let outcome = self.process_image(ctx, index, total, image, progress);

            // Recording an image result is a persistence step and therefore fatal.
            image_repo::update_derived(
                &self.db,
                &image.id,
                outcome.compressed_key.as_deref(),
                outcome.enhanced_key.as_deref(),
            )?;
            let engine = (!outcome.result.text.is_empty() || outcome.result.confidence > 0.0)
                .then(|| outcome.result.engine.as_str());
            image_repo::update_recognition(
                &self.db,
                &image.id,
                &outcome.result.text,
                outcome.result.confidence,
                engine,
            )?;

            ctx.results.push(outcome.result);
        }

        progress.report(ProgressEvent::Phase {
            phase: JobPhase::Extracting,
            message: "Extracting medicines...".to_string(),
        });

        let corpus = {
            let _step = info_span!("arbitrate").entered();
            build_corpus(ctx.results.iter().map(|r| r.text.as_str()))
        };

        {
            let _step = info_span!("extract", corpus_len = corpus.len()).entered();
            ctx.medicines = self.extractor.extract(&corpus);
            debug!("Extracted {} medicine candidate(s)", ctx.medicines.len());
        }
        ctx.corpus = Some(corpus);

        {
            let _step = info_span!("persist", medicines = ctx.medicines.len()).entered();
            medicine_repo::replace_for_job(&self.db, &ctx.job.id, &ctx.medicines)?;
        }

        Ok(())
    }

    /// Handles one image. Every failure in here is isolated: the image ends
    /// up with whatever artifacts were produced and possibly empty text.
    fn process_image(
        &self,
        ctx: &mut RunContext,
        index: usize,
        total: usize,
        image: &ImageRow,
        progress: &dyn ProgressReporter,
    ) -> ImageOutcome {
        let mut outcome = ImageOutcome {
            compressed_key: None,
            enhanced_key: None,
            result: RecognitionResult::empty(processor::RecognitionEngine::Constrained),
        };

        progress.report(ProgressEvent::Phase {
            phase: JobPhase::Preprocessing,
            message: format!("Preprocessing image {} of {}", index + 1, total),
        });

        let raw = match self.blobs.get(&image.original_key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %sanitize::redact_key(&image.original_key), "Raw image unavailable: {}", e);
                ctx.warn(index, "load", e);
                return outcome;
            }
        };

        let source = if image.content_type == "application/pdf" {
            match processor::pdf::first_embedded_image(&raw) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!("No usable image in PDF: {}", e);
                    ctx.warn(index, "pdf", e);
                    return outcome;
                }
            }
        } else {
            raw
        };

        let keys = ImageKeys::from_original(image.original_key.as_str());
        let enhanced = {
            let _step = info_span!("preprocess").entered();

            match self.preprocessor.compress(&source) {
                Some(bytes) => outcome.compressed_key = self.store(ctx, index, &keys.compressed, &bytes),
                None => ctx.warn(index, "compress", "no compressed copy produced"),
            }

            match self.preprocessor.enhance(&source) {
                Some(bytes) => {
                    outcome.enhanced_key = self.store(ctx, index, &keys.enhanced, &bytes);
                    Some(bytes)
                }
                None => {
                    ctx.warn(index, "enhance", "no enhanced copy produced");
                    None
                }
            }
        };

        progress.report(ProgressEvent::Phase {
            phase: JobPhase::Recognizing,
            message: format!("Recognizing image {} of {}", index + 1, total),
        });

        outcome.result = {
            let _step = info_span!("recognize", enhanced = enhanced.is_some()).entered();
            self.arbiter.arbitrate(enhanced.as_deref().unwrap_or(&source))
        };

        debug!(
            engine = %outcome.result.engine,
            confidence = outcome.result.confidence,
            "Image recognized"
        );
        outcome
    }

    fn store(&self, ctx: &mut RunContext, index: usize, key: &str, bytes: &[u8]) -> Option<String> {
        match self.blobs.put(key, bytes) {
            Ok(()) => Some(key.to_string()),
            Err(e) => {
                warn!(key = %sanitize::redact_key(key), "Derived artifact not stored: {}", e);
                ctx.warn(index, "store", e);
                None
            }
        }
    }

    fn complete(&self, ctx: &RunContext, progress: &dyn ProgressReporter) -> RunOutcome {
        match job_repo::finish_run(&self.db, &ctx.job.id, &ctx.run_id, JobStatus::Completed) {
            Ok(true) => {
                info!(
                    medicines = ctx.medicines.len(),
                    warnings = ctx.warnings.len(),
                    "Job completed"
                );
                progress.report(ProgressEvent::Completed {
                    medicine_count: ctx.medicines.len(),
                });
                RunOutcome::Completed {
                    medicine_count: ctx.medicines.len(),
                    warnings: ctx.warnings.clone(),
                }
            }
            Ok(false) => self.lost_claim(ctx, progress),
            Err(e) => self.fail(ctx, PipelineError::Database(e), progress),
        }
    }

    /// Persists `failed` first, then logs. If even that write fails the job
    /// stays claimed and is failed by orphan recovery on the next start.
    fn fail(
        &self,
        ctx: &RunContext,
        err: PipelineError,
        progress: &dyn ProgressReporter,
    ) -> RunOutcome {
        match job_repo::finish_run(&self.db, &ctx.job.id, &ctx.run_id, JobStatus::Failed) {
            Ok(true) => {}
            Ok(false) => return self.lost_claim(ctx, progress),
            Err(db_err) => error!("Could not record failure: {}", db_err),
        }

        error!("Job failed: {}", err);
        progress.report(ProgressEvent::Failed {
            message: "Processing failed".to_string(),
        });
        RunOutcome::Failed {
            error: err.to_string(),
        }
    }

    fn lost_claim(&self, ctx: &RunContext, progress: &dyn ProgressReporter) -> RunOutcome {
        let err = PipelineError::LostClaim {
            job_id: ctx.job.id.clone(),
            run_id: ctx.run_id.clone(),
        };
        warn!("{}", err);
        progress.report(ProgressEvent::Failed {
            message: "Processing failed".to_string(),
        });
        RunOutcome::Superseded {
            run_id: ctx.run_id.clone(),
        }
    }

    fn refresh_analytics(&self, owner_id: &str) {
        let _step = info_span!("analytics").entered();
        if let Err(e) = analytics::refresh(&self.db, owner_id) {
            warn!("Analytics refresh failed: {}", e);
        }
    }
}
