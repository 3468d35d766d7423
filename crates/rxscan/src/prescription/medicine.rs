use serde::Serialize;

/// Confidence attached to every heuristically extracted medicine.
pub const EXTRACTION_CONFIDENCE: f64 = 0.7;

/// A medicine parsed out of the OCR corpus, before it is persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineDraft {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    /// The full source line, kept as an audit trail.
    pub instructions: String,
    pub extraction_confidence: f64,
}

/// Savings from switching to the generic: `max(0, estimated - generic)` when
/// both costs are known, otherwise zero.
pub fn potential_savings(estimated_cost: Option<f64>, generic_cost: Option<f64>) -> f64 {
    match (estimated_cost, generic_cost) {
        (Some(estimated), Some(generic)) => (estimated - generic).max(0.0),
        _ => 0.0,
    }
}
