//! Rule-based medicine extraction from OCR text.
//!
//! This is best-effort and keyword driven: a line is a candidate when it
//! mentions a dosage unit, a dosage form or a frequency marker, and fields
//! are lifted from its whitespace tokens. Nothing here is verified.

use crate::prescription::{MedicineDraft, EXTRACTION_CONFIDENCE};

/// Substrings that make a line a medicine candidate (matched case-insensitively).
const CANDIDATE_KEYWORDS: &[&str] = &[
    "mg", "ml", "tab", "tablet", "cap", "capsule", "syrup", "injection", "od", "bd", "tds",
    "once", "twice", "thrice", "daily",
];

/// Whole tokens recognised as a dosing frequency.
const FREQUENCY_MARKERS: &[&str] = &["od", "bd", "tds", "once", "twice", "thrice", "daily"];

const DOSAGE_UNITS: &[&str] = &["mg", "ml"];

pub struct MedicineExtractor {
    keywords: Vec<String>,
    frequency_markers: Vec<String>,
}

impl Default for MedicineExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MedicineExtractor {
    pub fn new() -> Self {
        Self {
            keywords: CANDIDATE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            frequency_markers: FREQUENCY_MARKERS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Extracts one draft per candidate line, in corpus order. Duplicate
    /// names are kept as separate drafts.
    pub fn extract(&self, corpus: &str) -> Vec<MedicineDraft> {
        corpus
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| self.is_candidate(line))
            .map(|line| self.parse_line(line))
            .collect()
    }

    pub fn is_candidate(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    fn parse_line(&self, line: &str) -> MedicineDraft {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let name = tokens.first().copied().unwrap_or_default();

        let dosage = tokens
            .iter()
            .find(|t| {
                let lower = t.to_lowercase();
                DOSAGE_UNITS.iter().any(|unit| lower.contains(unit))
            })
            .copied()
            .unwrap_or_default();

        let frequency = tokens
            .iter()
            .find(|t| {
                let lower = t.to_lowercase();
                self.frequency_markers.iter().any(|m| *m == lower)
            })
            .copied()
            .unwrap_or_default();

        MedicineDraft {
            name: name.to_string(),
            dosage: dosage.to_string(),
            frequency: frequency.to_string(),
            duration: String::new(),
            instructions: line.to_string(),
            extraction_confidence: EXTRACTION_CONFIDENCE,
        }
    }
}
