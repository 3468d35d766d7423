//! Per-owner analytics.
//!
//! A refresh is always a full recomputation from the owner's persisted jobs
//! and medicines, so concurrent or repeated refreshes converge.

use serde::Serialize;
use tracing::{debug, info_span};

use crate::db::analytics_repo::{self, AnalyticsRow};
use crate::db::{Database, DatabaseError};
use crate::sanitize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub owner_id: String,
    pub total_prescriptions: u64,
    pub medicines_count: u64,
    pub total_savings: f64,
    pub stores_visited: u64,
    pub schemes_applied: u64,
    pub updated_at: String,
}

impl From<AnalyticsRow> for AnalyticsSnapshot {
    fn from(row: AnalyticsRow) -> Self {
        Self {
            owner_id: row.owner_id,
            total_prescriptions: row.total_prescriptions,
            medicines_count: row.medicines_count,
            total_savings: row.total_savings,
            stores_visited: row.stores_visited,
            schemes_applied: row.schemes_applied,
            updated_at: row.updated_at,
        }
    }
}

/// Recomputes and stores the owner's totals.
pub fn refresh(db: &Database, owner_id: &str) -> Result<AnalyticsSnapshot, DatabaseError> {
    let _span = info_span!("analytics", owner = %sanitize::hash_owner(owner_id)).entered();

    let row = analytics_repo::recompute(db, owner_id)?;
    debug!(
        prescriptions = row.total_prescriptions,
        medicines = row.medicines_count,
        "Analytics refreshed"
    );
    Ok(row.into())
}
