//! Owner analytics repository.
//!
//! Totals are always recomputed from the owner's jobs and medicines. The two
//! visit/scheme counters are owned by outside collaborators and are only
//! ever incremented here.

use rusqlite::{params, OptionalExtension, Row};

use super::{now, Database, DatabaseError};
use crate::prescription::potential_savings;

/// A raw analytics row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsRow {
    pub owner_id: String,
    pub total_prescriptions: u64,
    pub medicines_count: u64,
    pub total_savings: f64,
    pub stores_visited: u64,
    pub schemes_applied: u64,
    pub updated_at: String,
}

impl AnalyticsRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            owner_id: row.get("owner_id")?,
            total_prescriptions: row.get("total_prescriptions")?,
            medicines_count: row.get("medicines_count")?,
            total_savings: row.get("total_savings")?,
            stores_visited: row.get("stores_visited")?,
            schemes_applied: row.get("schemes_applied")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Recomputes an owner's totals from scratch and returns the stored row.
/// The row is created on first use; `updated_at` only moves when a total
/// actually changed.
pub fn recompute(db: &Database, owner_id: &str) -> Result<AnalyticsRow, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        let total_prescriptions: u64 = tx.query_row(
            "SELECT COUNT(*) FROM prescriptions WHERE owner_id = ?1",
            params![owner_id],
            |r| r.get(0),
        )?;

        let costs = {
            let mut stmt = tx.prepare(
                "SELECT m.estimated_cost, m.generic_cost FROM medicines m
                 JOIN prescriptions p ON p.id = m.prescription_id
                 WHERE p.owner_id = ?1",
            )?;
            let rows = stmt
                .query_map(params![owner_id], |r| {
                    Ok((r.get::<_, Option<f64>>(0)?, r.get::<_, Option<f64>>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let medicines_count = costs.len() as u64;
        let total_savings: f64 = costs
            .iter()
            .map(|(estimated, generic)| potential_savings(*estimated, *generic))
            .filter(|savings| *savings > 0.0)
            .sum();

        tx.execute(
            "INSERT INTO owner_analytics
                (owner_id, total_prescriptions, medicines_count, total_savings, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (owner_id) DO UPDATE SET
                updated_at = CASE
                    WHEN total_prescriptions != excluded.total_prescriptions
                      OR medicines_count != excluded.medicines_count
                      OR total_savings != excluded.total_savings
                    THEN excluded.updated_at ELSE updated_at END,
                total_prescriptions = excluded.total_prescriptions,
                medicines_count = excluded.medicines_count,
                total_savings = excluded.total_savings",
            params![owner_id, total_prescriptions, medicines_count, total_savings, now()],
        )?;

        let row = tx.query_row(
            "SELECT * FROM owner_analytics WHERE owner_id = ?1",
            params![owner_id],
            AnalyticsRow::from_row,
        )?;

        tx.commit()?;
        Ok(row)
    })
}

/// Finds the stored analytics row of an owner without recomputing it.
pub fn find(db: &Database, owner_id: &str) -> Result<Option<AnalyticsRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM owner_analytics WHERE owner_id = ?1",
                params![owner_id],
                AnalyticsRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Adds one store visit to the owner's counter.
pub fn increment_store_visits(db: &Database, owner_id: &str) -> Result<(), DatabaseError> {
    increment(db, owner_id, "stores_visited")
}

/// Adds one applied scheme to the owner's counter.
pub fn increment_schemes_applied(db: &Database, owner_id: &str) -> Result<(), DatabaseError> {
    increment(db, owner_id, "schemes_applied")
}

fn increment(db: &Database, owner_id: &str, column: &'static str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            &format!(
                "INSERT INTO owner_analytics (owner_id, {column}, updated_at) VALUES (?1, 1, ?2)
                 ON CONFLICT (owner_id) DO UPDATE SET {column} = {column} + 1,
                    updated_at = excluded.updated_at"
            ),
            params![owner_id, now()],
        )?;
        Ok(())
    })
}
