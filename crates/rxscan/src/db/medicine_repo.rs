//! Medicine repository.

use rusqlite::{params, Connection, Row};

use super::{now, Database, DatabaseError};
use crate::prescription::{potential_savings, MedicineDraft};

/// A raw medicine row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicineRow {
    pub id: String,
    pub prescription_id: String,
    pub position: u32,
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
    pub extraction_confidence: f64,
    pub created_at: String,
}

impl MedicineRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            prescription_id: row.get("prescription_id")?,
            position: row.get("position")?,
            name: row.get("name")?,
            generic_name: row.get("generic_name")?,
            dosage: row.get("dosage")?,
            frequency: row.get("frequency")?,
            duration: row.get("duration")?,
            quantity: row.get("quantity")?,
            instructions: row.get("instructions")?,
            estimated_cost: row.get("estimated_cost")?,
            generic_available: row.get("generic_available")?,
            generic_cost: row.get("generic_cost")?,
            extraction_confidence: row.get("extraction_confidence")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn potential_savings(&self) -> f64 {
        potential_savings(self.estimated_cost, self.generic_cost)
    }
}

/// Cost information recorded by pricing collaborators after extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pricing {
    pub generic_name: Option<String>,
    pub quantity: Option<u32>,
    pub estimated_cost: Option<f64>,
    pub generic_available: bool,
    pub generic_cost: Option<f64>,
}

pub(crate) fn delete_for_job_in(conn: &Connection, prescription_id: &str) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM medicines WHERE prescription_id = ?1",
        params![prescription_id],
    )?;
    Ok(deleted)
}

/// Replaces every medicine of a job with `drafts`, in one transaction.
/// An empty slice leaves the job with no medicines.
pub fn replace_for_job(
    db: &Database,
    prescription_id: &str,
    drafts: &[MedicineDraft],
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        delete_for_job_in(&tx, prescription_id)?;

        let timestamp = now();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO medicines (id, prescription_id, position, name, dosage, frequency,
                 duration, instructions, extraction_confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            for (position, draft) in drafts.iter().enumerate() {
                stmt.execute(params![
                    uuid::Uuid::new_v4().to_string(),
                    prescription_id,
                    position as u32,
                    draft.name,
                    draft.dosage,
                    draft.frequency,
                    draft.duration,
                    draft.instructions,
                    draft.extraction_confidence,
                    timestamp,
                ])?;
            }
        }

        tx.commit()?;
        Ok(drafts.len())
    })
}

/// Lists a job's medicines in extraction order.
pub fn list_for_job(db: &Database, prescription_id: &str) -> Result<Vec<MedicineRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM medicines WHERE prescription_id = ?1 ORDER BY position")?;
        let rows = stmt
            .query_map(params![prescription_id], MedicineRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds a medicine, but only if it belongs to one of `owner_id`'s jobs.
pub fn find_for_owner(
    db: &Database,
    owner_id: &str,
    medicine_id: &str,
) -> Result<Option<MedicineRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT m.* FROM medicines m JOIN prescriptions p ON p.id = m.prescription_id
             WHERE m.id = ?1 AND p.owner_id = ?2",
        )?;
        let mut rows = stmt.query_map(params![medicine_id, owner_id], MedicineRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Case-insensitive substring search on medicine names across an owner's jobs.
pub fn search_by_owner(
    db: &Database,
    owner_id: &str,
    query: &str,
    limit: u64,
) -> Result<Vec<MedicineRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT m.* FROM medicines m JOIN prescriptions p ON p.id = m.prescription_id
             WHERE p.owner_id = ?1 AND instr(lower(m.name), lower(?2)) > 0
             ORDER BY p.created_at DESC, m.position
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![owner_id, query, limit as i64], MedicineRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Records pricing for a medicine. Returns `false` if it does not exist.
pub fn update_pricing(db: &Database, medicine_id: &str, pricing: &Pricing) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE medicines SET generic_name = COALESCE(?2, generic_name),
             quantity = ?3, estimated_cost = ?4, generic_available = ?5, generic_cost = ?6
             WHERE id = ?1",
            params![
                medicine_id,
                pricing.generic_name,
                pricing.quantity,
                pricing.estimated_cost,
                pricing.generic_available,
                pricing.generic_cost,
            ],
        )?;
        Ok(changed == 1)
    })
}
