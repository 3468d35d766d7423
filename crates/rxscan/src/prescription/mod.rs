//! Prescription domain types: jobs, their lifecycle and medicine records.

pub mod job;
pub mod medicine;
pub mod status;

pub use job::{ImageUpload, JobMetadata, OwnerId};
pub use medicine::{potential_savings, MedicineDraft, EXTRACTION_CONFIDENCE};
pub use status::{JobStatus, TransitionError};
