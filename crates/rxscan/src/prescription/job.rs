use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque identifier of an authenticated owner, handed over by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ValidationError::MissingOwner);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Free-text metadata supplied with a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub doctor_name: Option<String>,
    pub hospital_name: Option<String>,
    pub prescription_date: Option<NaiveDate>,
}

/// One uploaded image as received from the transport layer.
#[derive(Clone)]
pub struct ImageUpload {
    pub filename: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: None,
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Content type without parameters, lowercased (`Image/JPEG; q=1` -> `image/jpeg`).
    pub fn media_type(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    pub fn is_pdf(&self) -> bool {
        self.media_type() == "application/pdf"
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_id_rejects_blank() {
        assert_eq!(OwnerId::new("  "), Err(ValidationError::MissingOwner));
        assert_eq!(OwnerId::new(""), Err(ValidationError::MissingOwner));
        assert_eq!(OwnerId::new("user-1").unwrap().as_str(), "user-1");
    }

    #[test]
    fn test_media_type_strips_parameters() {
        let upload = ImageUpload::new("Image/JPEG; charset=binary", vec![1]);
        assert_eq!(upload.media_type(), "image/jpeg");
        assert!(!upload.is_pdf());
    }

    #[test]
    fn test_pdf_detection() {
        let upload = ImageUpload::new("application/pdf", vec![1, 2, 3]);
        assert!(upload.is_pdf());
        assert_eq!(upload.size(), 3);
    }

    #[test]
    fn test_debug_omits_bytes() {
        let upload = ImageUpload::new("image/png", vec![0; 64]).with_filename("rx.png");
        let debug = format!("{:?}", upload);
        assert!(debug.contains("size: 64"));
        assert!(debug.contains("rx.png"));
        assert!(!debug.contains("[0, 0"));
    }

    #[test]
    fn test_metadata_deserializes_camel_case() {
        let metadata: JobMetadata = serde_json::from_str(
            r#"{"title": "Checkup", "doctorName": "Dr. Rao", "prescriptionDate": "2026-03-01"}"#,
        )
        .unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Checkup"));
        assert_eq!(metadata.doctor_name.as_deref(), Some("Dr. Rao"));
        assert_eq!(
            metadata.prescription_date,
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
        assert!(metadata.hospital_name.is_none());
    }
}
