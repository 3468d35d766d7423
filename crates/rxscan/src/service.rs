//! Transport-agnostic API over the pipeline: submission, reprocessing and
//! the read side used by clients.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn};

use crate::analytics::{self, AnalyticsSnapshot};
use crate::config::UploadConfig;
use crate::db::image_repo::{self, ImageRow, NewImage};
use crate::db::job_repo::{self, JobFilter, JobRow, JobSummaryRow};
use crate::db::medicine_repo::{self, MedicineRow, Pricing};
use crate::db::{analytics_repo, Database, DatabaseError};
use crate::error::{StorageError, ValidationError, WorkerError};
use crate::prescription::{ImageUpload, JobMetadata, JobStatus, OwnerId};
use crate::processor::sniff_image_info;
use crate::sanitize;
use crate::storage::{extension_for, BlobStore, ImageKeys};
use crate::worker::TaskQueue;

const GENERIC_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job cannot be reprocessed while {status}")]
    ReprocessRejected { status: JobStatus },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] WorkerError),
}

impl ServiceError {
    /// Message safe to show to the owner. Internal failures collapse into a
    /// generic one; details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::Validation(e) => e.to_string(),
            ServiceError::NotFound(_) => "Prescription not found".to_string(),
            ServiceError::ReprocessRejected { .. } => {
                "Prescription is still being processed".to_string()
            }
            ServiceError::Database(_) | ServiceError::Storage(_) | ServiceError::Queue(_) => {
                "Something went wrong, please try again later".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub title: Option<String>,
    pub status: JobStatus,
    pub image_count: u32,
    pub medicine_count: u32,
    pub estimated_total: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub jobs: Vec<JobSummary>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub id: String,
    pub position: u32,
    pub content_type: String,
    pub compressed_key: Option<String>,
    pub enhanced_key: Option<String>,
    pub extracted_text: String,
    pub confidence_score: f64,
    pub ocr_engine: Option<String>,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
}

impl From<ImageRow> for ImageResult {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            position: row.position,
            content_type: row.content_type,
            compressed_key: row.compressed_key,
            enhanced_key: row.enhanced_key,
            extracted_text: row.extracted_text,
            confidence_score: row.confidence_score,
            ocr_engine: row.ocr_engine,
            file_size: row.file_size,
            width: row.width,
            height: row.height,
            format: row.format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineRecord {
    pub id: String,
    pub prescription_id: String,
    pub name: String,
    pub generic_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub quantity: Option<u32>,
    pub instructions: String,
    pub estimated_cost: Option<f64>,
    pub generic_available: bool,
    pub generic_cost: Option<f64>,
    pub potential_savings: f64,
    pub extraction_confidence: f64,
}

impl From<MedicineRow> for MedicineRecord {
    fn from(row: MedicineRow) -> Self {
        let potential_savings = row.potential_savings();
        Self {
            id: row.id,
            prescription_id: row.prescription_id,
            name: row.name,
            generic_name: row.generic_name,
            dosage: row.dosage,
            frequency: row.frequency,
            duration: row.duration,
            quantity: row.quantity,
            instructions: row.instructions,
            estimated_cost: row.estimated_cost,
            generic_available: row.generic_available,
            generic_cost: row.generic_cost,
            potential_savings,
            extraction_confidence: row.extraction_confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub doctor_name: Option<String>,
    pub hospital_name: Option<String>,
    pub prescription_date: Option<String>,
    pub status: JobStatus,
    pub is_processed: bool,
    pub created_at: String,
    pub updated_at: String,
    pub images: Vec<ImageResult>,
    pub medicines: Vec<MedicineRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessAck {
    pub job_id: String,
    pub status: JobStatus,
}

/// Entry point for every owner-facing operation.
pub struct PrescriptionService {
    db: Database,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn TaskQueue>,
    upload: UploadConfig,
}

impl PrescriptionService {
    pub fn new(
        db: Database,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn TaskQueue>,
        upload: UploadConfig,
    ) -> Self {
        Self {
            db,
            blobs,
            queue,
            upload,
        }
    }

    /// Validates and records a submission, stores the raw images and hands
    /// the job to the queue. The returned summary is the job as recorded,
    /// always `processing`.
    pub fn submit_job(
        &self,
        owner: &OwnerId,
        metadata: JobMetadata,
        images: Vec<ImageUpload>,
    ) -> Result<JobSummary, ServiceError> {
        let _span = info_span!("submit", owner = %sanitize::hash_owner(owner.as_str())).entered();

        let media_types = validate_uploads(&self.upload, &images)?;

        let job_id = uuid::Uuid::new_v4().to_string();
        let mut new_images: Vec<NewImage> = Vec::with_capacity(images.len());
        for (position, (upload, media_type)) in images.iter().zip(&media_types).enumerate() {
            let image_id = uuid::Uuid::new_v4().to_string();
            let keys = ImageKeys::new(owner, &job_id, &image_id, media_type);

            if let Err(e) = self.blobs.put(&keys.original, &upload.bytes) {
                self.discard_originals(&new_images);
                return Err(e.into());
            }

            let info = if media_type == "application/pdf" {
                None
            } else {
                sniff_image_info(&upload.bytes)
            };
            new_images.push(NewImage {
                id: image_id,
                position: position as u32,
                content_type: media_type.clone(),
                original_key: keys.original,
                file_size: upload.size() as u64,
                width: info.as_ref().map(|i| i.width),
                height: info.as_ref().map(|i| i.height),
                format: info
                    .map(|i| i.format)
                    .unwrap_or_else(|| extension_for(media_type).to_string()),
            });
        }

        let mut job = JobRow::new_processing(job_id, owner.as_str());
        job.title = metadata.title;
        job.description = metadata.description;
        job.doctor_name = metadata.doctor_name;
        job.hospital_name = metadata.hospital_name;
        job.prescription_date = metadata.prescription_date.map(|d| d.to_string());

        if let Err(e) = job_repo::insert_with_images(&self.db, &job, &new_images) {
            self.discard_originals(&new_images);
            return Err(e.into());
        }
        info!(job_id = %job.id, images = new_images.len(), "Job submitted");

        // The job is durable at this point; if the hand-off fails it is
        // picked up again by start-up recovery.
        self.queue.enqueue(&job.id)?;

        Ok(JobSummary {
            id: job.id,
            title: job.title,
            status: JobStatus::Processing,
            image_count: new_images.len() as u32,
            medicine_count: 0,
            estimated_total: 0.0,
            created_at: job.created_at,
        })
    }

    /// Restarts a terminal job. A job that is still `processing` is
    /// rejected; of two concurrent requests only one succeeds.
    pub fn reprocess(&self, owner: &OwnerId, job_id: &str) -> Result<ReprocessAck, ServiceError> {
        let job = self.owned_job(owner, job_id)?;

        let current = job.status()?;
        if !current.is_terminal() {
            warn!(job_id = %job.id, status = %current, "Reprocess rejected");
            return Err(ServiceError::ReprocessRejected { status: current });
        }

        if !job_repo::begin_reprocess(&self.db, &job.id)? {
            let status = job_repo::find_by_id(&self.db, &job.id)?
                .map(|current| current.status())
                .transpose()?
                .unwrap_or(JobStatus::Processing);
            warn!(job_id = %job.id, %status, "Reprocess rejected");
            return Err(ServiceError::ReprocessRejected { status });
        }

        info!(job_id = %job.id, "Job reprocess started");
        self.queue.enqueue(&job.id)?;

        Ok(ReprocessAck {
            job_id: job.id,
            status: JobStatus::Processing,
        })
    }

    pub fn get_job(&self, owner: &OwnerId, job_id: &str) -> Result<JobDetail, ServiceError> {
        let job = self.owned_job(owner, job_id)?;
        let status = job.status()?;

        let images = image_repo::list_for_job(&self.db, &job.id)?
            .into_iter()
            .map(ImageResult::from)
            .collect();
        let medicines = medicine_repo::list_for_job(&self.db, &job.id)?
            .into_iter()
            .map(MedicineRecord::from)
            .collect();

        Ok(JobDetail {
            id: job.id,
            title: job.title,
            description: job.description,
            doctor_name: job.doctor_name,
            hospital_name: job.hospital_name,
            prescription_date: job.prescription_date,
            status,
            is_processed: job.is_processed,
            created_at: job.created_at,
            updated_at: job.updated_at,
            images,
            medicines,
        })
    }

    /// Lists the owner's jobs newest first.
    pub fn list_jobs(&self, owner: &OwnerId, filter: &JobFilter) -> Result<JobPage, ServiceError> {
        let (rows, total) = job_repo::list_by_owner(&self.db, owner.as_str(), filter)?;
        let jobs = rows
            .into_iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JobPage { jobs, total })
    }

    /// Case-insensitive substring search over medicine names. A blank
    /// query matches nothing.
    pub fn search_medicines(
        &self,
        owner: &OwnerId,
        query: &str,
        limit: u64,
    ) -> Result<Vec<MedicineRecord>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let rows = medicine_repo::search_by_owner(&self.db, owner.as_str(), query, limit)?;
        Ok(rows.into_iter().map(MedicineRecord::from).collect())
    }

    /// Recomputes and returns the owner's analytics.
    pub fn get_analytics(&self, owner: &OwnerId) -> Result<AnalyticsSnapshot, ServiceError> {
        Ok(analytics::refresh(&self.db, owner.as_str())?)
    }

    pub fn record_store_visit(&self, owner: &OwnerId) -> Result<(), ServiceError> {
        Ok(analytics_repo::increment_store_visits(&self.db, owner.as_str())?)
    }

    pub fn record_scheme_applied(&self, owner: &OwnerId) -> Result<(), ServiceError> {
        Ok(analytics_repo::increment_schemes_applied(&self.db, owner.as_str())?)
    }

    /// Records cost information for one of the owner's medicines.
    pub fn set_medicine_pricing(
        &self,
        owner: &OwnerId,
        medicine_id: &str,
        pricing: &Pricing,
    ) -> Result<MedicineRecord, ServiceError> {
        let not_found = || ServiceError::NotFound(medicine_id.to_string());

        medicine_repo::find_for_owner(&self.db, owner.as_str(), medicine_id)?.ok_or_else(not_found)?;
        if !medicine_repo::update_pricing(&self.db, medicine_id, pricing)? {
            return Err(not_found());
        }
        let row = medicine_repo::find_for_owner(&self.db, owner.as_str(), medicine_id)?
            .ok_or_else(not_found)?;
        Ok(row.into())
    }

    /// Best-effort removal of raw blobs written for a submission that was
    /// never recorded.
    fn discard_originals(&self, images: &[NewImage]) {
        for image in images {
            if let Err(e) = self.blobs.delete(&image.original_key) {
                warn!(key = %sanitize::redact_key(&image.original_key), "Orphaned upload left in store: {}", e);
            }
        }
    }

    /// Loads a job, hiding jobs of other owners behind `NotFound`.
    fn owned_job(&self, owner: &OwnerId, job_id: &str) -> Result<JobRow, ServiceError> {
        match job_repo::find_by_id(&self.db, job_id)? {
            Some(job) if job.owner_id == owner.as_str() => Ok(job),
            _ => Err(ServiceError::NotFound(job_id.to_string())),
        }
    }
}

fn summary_from_row(row: JobSummaryRow) -> Result<JobSummary, DatabaseError> {
    let status = row.job.status()?;
    Ok(JobSummary {
        id: row.job.id,
        title: row.job.title,
        status,
        image_count: row.image_count,
        medicine_count: row.medicine_count,
        estimated_total: row.estimated_total,
        created_at: row.job.created_at,
    })
}

/// Checks a submission against the upload limits and resolves each image's
/// media type. Nothing is stored when this fails.
pub fn validate_uploads(
    limits: &UploadConfig,
    images: &[ImageUpload],
) -> Result<Vec<String>, ValidationError> {
    if images.is_empty() {
        return Err(ValidationError::NoImages);
    }
    if images.len() > limits.max_images {
        return Err(ValidationError::TooManyImages {
            count: images.len(),
            max: limits.max_images,
        });
    }

    images
        .iter()
        .enumerate()
        .map(|(index, upload)| {
            if upload.bytes.is_empty() {
                return Err(ValidationError::EmptyImage { index });
            }
            if upload.size() > limits.max_image_bytes {
                return Err(ValidationError::ImageTooLarge {
                    index,
                    size: upload.size(),
                    max: limits.max_image_bytes,
                });
            }

            let media_type = resolve_media_type(upload);
            let allowed = limits
                .allowed_content_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&media_type));
            if !allowed {
                return Err(ValidationError::UnsupportedContentType {
                    index,
                    content_type: media_type,
                });
            }
            Ok(media_type)
        })
        .collect()
}

/// Declared media type, or a guess from the filename when the declared
/// one is missing or generic.
fn resolve_media_type(upload: &ImageUpload) -> String {
    let declared = upload.media_type();
    if !declared.is_empty() && declared != GENERIC_MEDIA_TYPE {
        return declared;
    }
    upload
        .filename
        .as_deref()
        .and_then(|name| mime_guess::from_path(name).first())
        .map(|mime| mime.essence_str().to_ascii_lowercase())
        .unwrap_or(declared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::MIB;
    use crate::storage::MemoryBlobStore;
    use crate::worker::DeferredQueue;

    struct Fixture {
        db: Database,
        blobs: Arc<MemoryBlobStore>,
        queue: Arc<DeferredQueue>,
        service: PrescriptionService,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());
        let queue = Arc::new(DeferredQueue::new());
        let service = PrescriptionService::new(
            db.clone(),
            blobs.clone(),
            queue.clone(),
            UploadConfig::default(),
        );
        Fixture {
            db,
            blobs,
            queue,
            service,
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("owner-1").unwrap()
    }

    fn jpeg_upload() -> ImageUpload {
        ImageUpload::new("image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0])
    }

    #[test]
    fn test_validate_rejects_empty_submission() {
        let err = validate_uploads(&UploadConfig::default(), &[]).unwrap_err();
        assert_eq!(err, ValidationError::NoImages);
    }

    #[test]
    fn test_validate_rejects_oversized_image() {
        let upload = ImageUpload::new("image/png", vec![0; 10 * MIB + 1]);
        let err = validate_uploads(&UploadConfig::default(), &[jpeg_upload(), upload]).unwrap_err();
        assert!(matches!(err, ValidationError::ImageTooLarge { index: 1, .. }));
    }

    #[test]
    fn test_validate_accepts_exact_limit() {
        let upload = ImageUpload::new("image/png", vec![0; 10 * MIB]);
        assert!(validate_uploads(&UploadConfig::default(), &[upload]).is_ok());
    }

    #[test]
    fn test_validate_rejects_unsupported_type() {
        let upload = ImageUpload::new("image/gif", vec![1]);
        let err = validate_uploads(&UploadConfig::default(), &[upload]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedContentType {
                index: 0,
                content_type: "image/gif".to_string()
            }
        );
    }

    #[test]
    fn test_validate_normalizes_media_type() {
        let uploads = [
            ImageUpload::new("IMAGE/JPEG; charset=binary", vec![1]),
            ImageUpload::new("application/octet-stream", vec![1]).with_filename("scan.pdf"),
        ];
        let media_types = validate_uploads(&UploadConfig::default(), &uploads).unwrap();
        assert_eq!(media_types, vec!["image/jpeg", "application/pdf"]);
    }

    #[test]
    fn test_validate_rejects_empty_image() {
        let err =
            validate_uploads(&UploadConfig::default(), &[ImageUpload::new("image/png", vec![])])
                .unwrap_err();
        assert_eq!(err, ValidationError::EmptyImage { index: 0 });
    }

    #[test]
    fn test_failed_upload_write_discards_earlier_blobs() {
        let fx = fixture();
        fx.blobs.fail_writes_to("original.png");

        let err = fx
            .service
            .submit_job(
                &owner(),
                JobMetadata::default(),
                vec![jpeg_upload(), ImageUpload::new("image/png", vec![1, 2, 3])],
            )
            .unwrap_err();

        assert!(matches!(err, ServiceError::Storage(_)));
        assert!(fx.blobs.is_empty());
        assert!(fx.queue.drain().is_empty());
    }

    #[test]
    fn test_failed_job_insert_discards_stored_blobs() {
        let fx = fixture();
        fx.db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_jobs BEFORE INSERT ON prescriptions
                     BEGIN SELECT RAISE(ABORT, 'read only'); END;",
                )?;
                Ok(())
            })
            .unwrap();

        let err = fx
            .service
            .submit_job(&owner(), JobMetadata::default(), vec![jpeg_upload(), jpeg_upload()])
            .unwrap_err();

        assert!(matches!(err, ServiceError::Database(_)));
        assert!(fx.blobs.is_empty());
        assert!(fx.queue.drain().is_empty());
    }

    #[test]
    fn test_submit_records_job_and_enqueues() {
        let fx = fixture();
        let metadata = JobMetadata {
            title: Some("Checkup".to_string()),
            ..JobMetadata::default()
        };

        let summary = fx
            .service
            .submit_job(&owner(), metadata, vec![jpeg_upload(), jpeg_upload()])
            .unwrap();

        assert_eq!(summary.status, JobStatus::Processing);
        assert_eq!(summary.image_count, 2);
        assert_eq!(fx.queue.drain(), vec![summary.id.clone()]);
        assert_eq!(fx.blobs.len(), 2);

        let detail = fx.service.get_job(&owner(), &summary.id).unwrap();
        assert_eq!(detail.title.as_deref(), Some("Checkup"));
        assert_eq!(detail.images.len(), 2);
        assert_eq!(detail.images[0].position, 0);
        assert_eq!(detail.images[0].format, "jpg");
        assert!(fx.blobs.contains(
            &image_repo::list_for_job(&fx.db, &summary.id).unwrap()[0].original_key
        ));
    }

    #[test]
    fn test_rejected_submission_leaves_no_trace() {
        let fx = fixture();
        let uploads = vec![jpeg_upload(); 11];

        let err = fx
            .service
            .submit_job(&owner(), JobMetadata::default(), uploads)
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::TooManyImages { count: 11, max: 10 })
        ));
        assert!(fx.blobs.is_empty());
        assert!(fx.queue.drain().is_empty());
        let (_, total) = job_repo::list_by_owner(&fx.db, "owner-1", &JobFilter::default()).unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_reprocess_rejected_while_processing() {
        let fx = fixture();
        let summary = fx
            .service
            .submit_job(&owner(), JobMetadata::default(), vec![jpeg_upload()])
            .unwrap();

        let err = fx.service.reprocess(&owner(), &summary.id).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::ReprocessRejected {
                status: JobStatus::Processing
            }
        ));
        assert_eq!(err.user_message(), "Prescription is still being processed");
    }

    #[test]
    fn test_reprocess_terminal_job() {
        let fx = fixture();
        let summary = fx
            .service
            .submit_job(&owner(), JobMetadata::default(), vec![jpeg_upload()])
            .unwrap();
        fx.queue.drain();
        assert!(job_repo::claim_run(&fx.db, &summary.id, "run-1").unwrap());
        assert!(job_repo::finish_run(&fx.db, &summary.id, "run-1", JobStatus::Failed).unwrap());

        let ack = fx.service.reprocess(&owner(), &summary.id).unwrap();
        assert_eq!(ack.status, JobStatus::Processing);
        assert_eq!(fx.queue.drain(), vec![summary.id]);
    }

    #[test]
    fn test_other_owner_sees_not_found() {
        let fx = fixture();
        let summary = fx
            .service
            .submit_job(&owner(), JobMetadata::default(), vec![jpeg_upload()])
            .unwrap();
        let stranger = OwnerId::new("owner-2").unwrap();

        assert!(matches!(
            fx.service.get_job(&stranger, &summary.id),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.reprocess(&stranger, &summary.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_blob_write_creates_no_job() {
        let fx = fixture();
        fx.blobs.fail_writes_to("original.jpg");

        let err = fx
            .service
            .submit_job(&owner(), JobMetadata::default(), vec![jpeg_upload()])
            .unwrap_err();

        assert!(matches!(err, ServiceError::Storage(_)));
        assert_eq!(
            err.user_message(),
            "Something went wrong, please try again later"
        );
        let (_, total) = job_repo::list_by_owner(&fx.db, "owner-1", &JobFilter::default()).unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_external_counters() {
        let fx = fixture();
        fx.service.record_store_visit(&owner()).unwrap();
        fx.service.record_store_visit(&owner()).unwrap();
        fx.service.record_scheme_applied(&owner()).unwrap();

        let snapshot = fx.service.get_analytics(&owner()).unwrap();
        assert_eq!(snapshot.stores_visited, 2);
        assert_eq!(snapshot.schemes_applied, 1);
        assert_eq!(snapshot.total_prescriptions, 0);
    }

    #[test]
    fn test_blank_search_matches_nothing() {
        let fx = fixture();
        assert!(fx.service.search_medicines(&owner(), "  ", 10).unwrap().is_empty());
    }
}
