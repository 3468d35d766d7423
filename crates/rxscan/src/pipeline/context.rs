use crate::db::job_repo::JobRow;
use crate::prescription::MedicineDraft;
use crate::processor::RecognitionResult;

use super::error::ImageWarning;

pub struct RunContext {
    // Input
    pub job: JobRow,
    pub run_id: String,

    // One arbitrated result per image, in submission order
    pub results: Vec<RecognitionResult>,

    // Set once every image has been handled
    pub corpus: Option<String>,

    pub medicines: Vec<MedicineDraft>,

    // Isolated per-image failures
    pub warnings: Vec<ImageWarning>,
}

impl RunContext {
    pub fn new(job: JobRow, run_id: impl Into<String>) -> Self {
        Self {
            job,
            run_id: run_id.into(),
            results: Vec::new(),
            corpus: None,
            medicines: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, index: usize, stage: &'static str, error: impl ToString) {
        self.warnings.push(ImageWarning {
            index,
            stage,
            error: error.to_string(),
        });
    }
}
