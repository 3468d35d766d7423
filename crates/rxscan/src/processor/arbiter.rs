use std::sync::Arc;

use crate::processor::ocr::{RecognitionResult, RecognitionStrategy};

/// Runs both strategies on an image and keeps the more confident result.
#[derive(Clone)]
pub struct Arbiter {
    primary: Arc<dyn RecognitionStrategy>,
    secondary: Arc<dyn RecognitionStrategy>,
}

impl Arbiter {
    /// `primary` wins ties.
    pub fn new(primary: Arc<dyn RecognitionStrategy>, secondary: Arc<dyn RecognitionStrategy>) -> Self {
        Self { primary, secondary }
    }

    pub fn arbitrate(&self, image: &[u8]) -> RecognitionResult {
        let primary = self.primary.recognize(image);
        let secondary = self.secondary.recognize(image);

        tracing::debug!(
            primary = primary.confidence,
            secondary = secondary.confidence,
            "Recognition confidences"
        );

        select(primary, secondary)
    }
}

/// Picks the higher-confidence result; `a` wins ties.
pub fn select(a: RecognitionResult, b: RecognitionResult) -> RecognitionResult {
    if a.confidence >= b.confidence {
        a
    } else {
        b
    }
}

/// Joins the non-empty texts in the given order with a single space.
///
/// Every text ends its own last line first, so the last line of one image
/// never runs into the first line of the next.
pub fn build_corpus<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    texts
        .into_iter()
        .map(|t| t.trim_end_matches(['\n', '\r']))
        .filter(|t| !t.trim().is_empty())
        .map(|t| format!("{t}\n"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ocr::RecognitionEngine;

    struct Fixed(RecognitionResult);

    impl RecognitionStrategy for Fixed {
        fn engine(&self) -> RecognitionEngine {
            self.0.engine
        }

        fn recognize(&self, _image: &[u8]) -> RecognitionResult {
            self.0.clone()
        }
    }

    fn result(text: &str, confidence: f64, engine: RecognitionEngine) -> RecognitionResult {
        RecognitionResult {
            text: text.to_string(),
            confidence,
            engine,
        }
    }

    fn arbiter(a: RecognitionResult, b: RecognitionResult) -> Arbiter {
        Arbiter::new(Arc::new(Fixed(a)), Arc::new(Fixed(b)))
    }

    #[test]
    fn test_higher_confidence_wins() {
        let chosen = arbiter(
            result("Paracetarnol", 40.0, RecognitionEngine::Constrained),
            result("Paracetamol", 85.0, RecognitionEngine::General),
        )
        .arbitrate(b"img");

        assert_eq!(chosen.text, "Paracetamol");
        assert_eq!(chosen.engine, RecognitionEngine::General);
    }

    #[test]
    fn test_tie_favours_primary() {
        let chosen = arbiter(
            result("primary", 60.0, RecognitionEngine::Constrained),
            result("secondary", 60.0, RecognitionEngine::General),
        )
        .arbitrate(b"img");

        assert_eq!(chosen.engine, RecognitionEngine::Constrained);
    }

    #[test]
    fn test_both_empty_yields_empty_primary() {
        let chosen = select(
            RecognitionResult::empty(RecognitionEngine::Constrained),
            RecognitionResult::empty(RecognitionEngine::General),
        );
        assert_eq!(chosen.text, "");
        assert_eq!(chosen.confidence, 0.0);
        assert_eq!(chosen.engine, RecognitionEngine::Constrained);
    }

    #[test]
    fn test_corpus_skips_empty_texts_and_keeps_order() {
        let corpus = build_corpus(["Paracetamol 500mg OD", "", "Amoxicillin 250mg BD"]);
        assert_eq!(corpus, "Paracetamol 500mg OD\n Amoxicillin 250mg BD\n");
    }

    #[test]
    fn test_corpus_keeps_inner_line_breaks() {
        let corpus = build_corpus(["Rx\nParacetamol 500mg OD\n", "Amoxicillin 250mg BD"]);
        assert_eq!(corpus, "Rx\nParacetamol 500mg OD\n Amoxicillin 250mg BD\n");
        assert_eq!(build_corpus(Vec::<&str>::new()), "");
    }

    #[test]
    fn test_corpus_gives_one_candidate_line_per_image() {
        let corpus = build_corpus(["Paracetamol 500mg OD", "Amoxicillin 250mg BD"]);
        let drafts = crate::extractor::MedicineExtractor::new().extract(&corpus);

        let names: Vec<&str> = drafts.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Paracetamol", "Amoxicillin"]);
        assert_eq!(drafts[1].dosage, "250mg");
        assert_eq!(drafts[1].frequency, "BD");
    }
}
