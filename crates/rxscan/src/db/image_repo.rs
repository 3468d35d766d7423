//! Image repository: per-image rows of a prescription job.

use rusqlite::{params, Connection, Row};

use super::{now, Database, DatabaseError};

/// A raw image row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub id: String,
    pub prescription_id: String,
    pub position: u32,
    pub content_type: String,
    pub original_key: String,
    pub compressed_key: Option<String>,
    pub enhanced_key: Option<String>,
    pub extracted_text: String,
    pub confidence_score: f64,
    pub ocr_engine: Option<String>,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ImageRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            prescription_id: row.get("prescription_id")?,
            position: row.get("position")?,
            content_type: row.get("content_type")?,
            original_key: row.get("original_key")?,
            compressed_key: row.get("compressed_key")?,
            enhanced_key: row.get("enhanced_key")?,
            extracted_text: row.get("extracted_text")?,
            confidence_score: row.get("confidence_score")?,
            ocr_engine: row.get("ocr_engine")?,
            file_size: row.get("file_size")?,
            width: row.get("width")?,
            height: row.get("height")?,
            format: row.get("format")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// An image about to be recorded at submission time.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub id: String,
    pub position: u32,
    pub content_type: String,
    pub original_key: String,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
}

/// Inserts an image row on an open connection, typically inside the job's
/// submission transaction.
pub(crate) fn insert_in(
    conn: &Connection,
    prescription_id: &str,
    image: &NewImage,
    timestamp: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescription_images (id, prescription_id, position, content_type,
         original_key, file_size, width, height, format, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            image.id,
            prescription_id,
            image.position,
            image.content_type,
            image.original_key,
            image.file_size,
            image.width,
            image.height,
            image.format,
            timestamp,
        ],
    )?;
    Ok(())
}

/// Lists a job's images in submission order.
pub fn list_for_job(db: &Database, prescription_id: &str) -> Result<Vec<ImageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM prescription_images WHERE prescription_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map(params![prescription_id], ImageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Records the derived-artifact keys of an image. `None` clears a key, so a
/// run that could not derive an artifact never points at a stale one.
pub fn update_derived(
    db: &Database,
    image_id: &str,
    compressed_key: Option<&str>,
    enhanced_key: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE prescription_images SET compressed_key = ?2, enhanced_key = ?3, updated_at = ?4
             WHERE id = ?1",
            params![image_id, compressed_key, enhanced_key, now()],
        )?;
        Ok(())
    })
}

/// Stores the arbitrated recognition result of an image.
pub fn update_recognition(
    db: &Database,
    image_id: &str,
    text: &str,
    confidence: f64,
    engine: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE prescription_images SET extracted_text = ?2, confidence_score = ?3,
             ocr_engine = ?4, updated_at = ?5 WHERE id = ?1",
            params![image_id, text, confidence.clamp(0.0, 100.0), engine, now()],
        )?;
        Ok(())
    })
}
