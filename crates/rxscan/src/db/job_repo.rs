//! Job repository: the `prescriptions` table and its run-ownership guards.
//!
//! Status changes that race with other workers or requests are single
//! conditional `UPDATE`s; the affected-row count tells the caller whether it
//! won.

use rusqlite::{params, Row};

use super::image_repo::{self, NewImage};
use super::{medicine_repo, now, Database, DatabaseError};
use crate::prescription::JobStatus;

/// A raw job row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub owner_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub doctor_name: Option<String>,
    pub hospital_name: Option<String>,
    pub prescription_date: Option<String>,
    pub status: String,
    pub run_id: Option<String>,
    pub is_processed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            owner_id: row.get("owner_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            doctor_name: row.get("doctor_name")?,
            hospital_name: row.get("hospital_name")?,
            prescription_date: row.get("prescription_date")?,
            status: row.get("status")?,
            run_id: row.get("run_id")?,
            is_processed: row.get("is_processed")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// A fresh, unclaimed job in `processing` with no metadata.
    pub fn new_processing(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let timestamp = now();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            title: None,
            description: None,
            doctor_name: None,
            hospital_name: None,
            prescription_date: None,
            status: JobStatus::Processing.as_str().to_string(),
            run_id: None,
            is_processed: false,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        }
    }

    pub fn status(&self) -> Result<JobStatus, DatabaseError> {
        self.status
            .parse()
            .map_err(|_| DatabaseError::InvalidValue {
                column: "status",
                value: self.status.clone(),
            })
    }
}

/// A job as shown in listings, with counts rolled up from its children.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummaryRow {
    pub job: JobRow,
    pub image_count: u32,
    pub medicine_count: u32,
    /// Sum of the estimated costs that are known.
    pub estimated_total: f64,
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a job together with its image rows in one transaction.
pub fn insert_with_images(
    db: &Database,
    job: &JobRow,
    images: &[NewImage],
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO prescriptions (id, owner_id, title, description, doctor_name,
             hospital_name, prescription_date, status, run_id, is_processed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job.id,
                job.owner_id,
                job.title,
                job.description,
                job.doctor_name,
                job.hospital_name,
                job.prescription_date,
                job.status,
                job.run_id,
                job.is_processed,
                job.created_at,
                job.updated_at,
            ],
        )?;
        for image in images {
            image_repo::insert_in(&tx, &job.id, image, &job.created_at)?;
        }
        tx.commit()?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM prescriptions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists an owner's jobs newest first, returning (rows, total_count).
pub fn list_by_owner(
    db: &Database,
    owner_id: &str,
    filter: &JobFilter,
) -> Result<(Vec<JobSummaryRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = vec!["p.owner_id = ?1".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(owner_id.to_string())];

        if let Some(status) = filter.status {
            conditions.push(format!("p.status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str()));
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        let count_sql = format!("SELECT COUNT(*) FROM prescriptions p {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT p.*,
                (SELECT COUNT(*) FROM prescription_images i WHERE i.prescription_id = p.id)
                    AS image_count,
                (SELECT COUNT(*) FROM medicines m WHERE m.prescription_id = p.id)
                    AS medicine_count,
                (SELECT COALESCE(SUM(m.estimated_cost), 0) FROM medicines m
                    WHERE m.prescription_id = p.id) AS estimated_total
             FROM prescriptions p {}
             ORDER BY p.created_at DESC, p.id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobSummaryRow> = stmt
            .query_map(params_ref.as_slice(), |row| {
                Ok(JobSummaryRow {
                    job: JobRow::from_row(row)?,
                    image_count: row.get("image_count")?,
                    medicine_count: row.get("medicine_count")?,
                    estimated_total: row.get("estimated_total")?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Claims the current run of a `processing` job. Only one caller can win a
/// claim; a job that is terminal or already claimed yields `false`.
pub fn claim_run(db: &Database, id: &str, run_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE prescriptions SET run_id = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'processing' AND run_id IS NULL",
            params![id, run_id, now()],
        )?;
        Ok(changed == 1)
    })
}

/// Moves a terminal job back to `processing` and discards its medicines, in
/// one transaction. Returns `false` when the job was not terminal, which is
/// also what the loser of two concurrent reprocess requests observes.
pub fn begin_reprocess(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let [completed, failed] = JobStatus::reprocessable();
        let to = JobStatus::Processing;
        completed.transition(to)?;
        failed.transition(to)?;

        let tx = conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE prescriptions SET status = ?2, run_id = NULL, is_processed = 0,
             updated_at = ?3
             WHERE id = ?1 AND status IN (?4, ?5)",
            params![id, to.as_str(), now(), completed.as_str(), failed.as_str()],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        medicine_repo::delete_for_job_in(&tx, id)?;
        tx.commit()?;
        Ok(true)
    })
}

/// Ends a claimed run in `status`, releasing the claim. Returns `false` when
/// the run no longer owns the job. `status` must be a state `processing` may
/// move to; anything else is rejected before the row is touched.
pub fn finish_run(
    db: &Database,
    id: &str,
    run_id: &str,
    status: JobStatus,
) -> Result<bool, DatabaseError> {
    let from = JobStatus::Processing;
    let status = from.transition(status)?;

    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE prescriptions SET status = ?3, run_id = NULL, is_processed = ?4,
             updated_at = ?5
             WHERE id = ?1 AND run_id = ?2 AND status = ?6",
            params![
                id,
                run_id,
                status.as_str(),
                status == JobStatus::Completed,
                now(),
                from.as_str()
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Fails every job whose run was claimed but never finished. Only valid at
/// start-up, before any worker of this process has claimed a run.
pub fn fail_orphaned_runs(db: &Database) -> Result<usize, DatabaseError> {
    let from = JobStatus::Processing;
    let to = from.transition(JobStatus::Failed)?;

    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE prescriptions SET status = ?1, run_id = NULL, updated_at = ?2
             WHERE status = ?3 AND run_id IS NOT NULL",
            params![to.as_str(), now(), from.as_str()],
        )?;
        Ok(changed)
    })
}

/// IDs of `processing` jobs nobody has claimed yet, oldest first.
pub fn unclaimed_processing(db: &Database) -> Result<Vec<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id FROM prescriptions WHERE status = 'processing' AND run_id IS NULL
             ORDER BY created_at, id",
        )?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    })
}
