//! Recognition strategies.
//!
//! Two independent strategies share one result shape. The constrained
//! strategy reads word tokens under a restricted alphabet; the general one
//! detects text regions and keeps those above a confidence floor. Neither
//! ever returns an error: internal failures become an empty result with
//! confidence 0.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use leptess::LepTess;
use serde::Serialize;

use crate::error::ProcessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionEngine {
    Constrained,
    General,
}

impl RecognitionEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionEngine::Constrained => "constrained",
            RecognitionEngine::General => "general",
        }
    }
}

impl std::fmt::Display for RecognitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub text: String,
    /// Always within 0..=100.
    pub confidence: f64,
    pub engine: RecognitionEngine,
}

impl RecognitionResult {
    pub fn empty(engine: RecognitionEngine) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            engine,
        }
    }

    fn new(text: String, confidence: f64, engine: RecognitionEngine) -> Self {
        Self {
            text,
            confidence: confidence.clamp(0.0, 100.0),
            engine,
        }
    }
}

pub trait RecognitionStrategy: Send + Sync {
    fn engine(&self) -> RecognitionEngine;
    fn recognize(&self, image: &[u8]) -> RecognitionResult;
}

/// Full-page text plus one confidence (0-100) per recognised word.
#[derive(Debug, Clone, Default)]
pub struct TokenScan {
    pub text: String,
    pub token_confidences: Vec<f32>,
}

/// Backend that reads word tokens restricted to an alphabet.
pub trait TokenReader: Send + Sync {
    fn read_tokens(&self, image: &[u8]) -> Result<TokenScan, ProcessError>;
}

/// A detected text region with its confidence in 0.0-1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub text: String,
    pub confidence: f64,
}

/// Backend that detects text regions, in reading order.
pub trait RegionDetector: Send + Sync {
    fn detect_regions(&self, image: &[u8]) -> Result<Vec<TextRegion>, ProcessError>;
}

pub struct ConstrainedStrategy {
    reader: Arc<dyn TokenReader>,
}

impl ConstrainedStrategy {
    pub fn new(reader: Arc<dyn TokenReader>) -> Self {
        Self { reader }
    }
}

impl RecognitionStrategy for ConstrainedStrategy {
    fn engine(&self) -> RecognitionEngine {
        RecognitionEngine::Constrained
    }

    fn recognize(&self, image: &[u8]) -> RecognitionResult {
        let _span = tracing::info_span!("recognize.constrained").entered();

        let scan = match self.reader.read_tokens(image) {
            Ok(scan) => scan,
            Err(e) => {
                tracing::warn!("Constrained recognition failed: {}", e);
                return RecognitionResult::empty(self.engine());
            }
        };

        // Non-word entries report a confidence of -1 or 0.
        let confidences: Vec<f64> = scan
            .token_confidences
            .iter()
            .filter(|c| **c > 0.0)
            .map(|c| f64::from(*c))
            .collect();
        let confidence = mean(&confidences).unwrap_or(0.0);

        RecognitionResult::new(scan.text.trim().to_string(), confidence, self.engine())
    }
}

pub struct GeneralStrategy {
    detector: Arc<dyn RegionDetector>,
    confidence_floor: f64,
}

impl GeneralStrategy {
    pub fn new(detector: Arc<dyn RegionDetector>, confidence_floor: f64) -> Self {
        Self {
            detector,
            confidence_floor,
        }
    }
}

impl RecognitionStrategy for GeneralStrategy {
    fn engine(&self) -> RecognitionEngine {
        RecognitionEngine::General
    }

    fn recognize(&self, image: &[u8]) -> RecognitionResult {
        let _span = tracing::info_span!("recognize.general").entered();

        let regions = match self.detector.detect_regions(image) {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!("General recognition failed: {}", e);
                return RecognitionResult::empty(self.engine());
            }
        };

        let kept: Vec<&TextRegion> = regions
            .iter()
            .filter(|r| r.confidence > self.confidence_floor)
            .collect();

        let confidences: Vec<f64> = kept.iter().map(|r| r.confidence).collect();
        let Some(confidence) = mean(&confidences) else {
            return RecognitionResult::empty(self.engine());
        };

        let text = kept
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        RecognitionResult::new(text.trim().to_string(), confidence * 100.0, self.engine())
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Tesseract backend shared by both strategies.
///
/// The underlying instance is created on first use and reused for every
/// later call on the same engine; the mutex serialises access to it. Each
/// worker builds its own engines, so instances are never shared between
/// workers.
pub struct TesseractEngine {
    languages: String,
    whitelist: Option<String>,
    api: Mutex<Option<LepTess>>,
}

impl TesseractEngine {
    pub fn new(languages: &[String]) -> Self {
        let languages = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            languages,
            whitelist: None,
            api: Mutex::new(None),
        }
    }

    /// Restricts recognition to the given characters.
    pub fn with_whitelist(mut self, whitelist: impl Into<String>) -> Self {
        self.whitelist = Some(whitelist.into());
        self
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    fn with_api<T>(
        &self,
        image: &[u8],
        f: impl FnOnce(&mut LepTess) -> Result<T, ProcessError>,
    ) -> Result<T, ProcessError> {
        let png = to_png(image)?;

        let mut guard = self
            .api
            .lock()
            .map_err(|_| ProcessError::OcrFailed("OCR engine lock poisoned".to_string()))?;

        if guard.is_none() {
            *guard = Some(self.init()?);
        }
        let lt = guard
            .as_mut()
            .ok_or_else(|| ProcessError::OcrInit("OCR engine unavailable".to_string()))?;

        lt.set_image_from_mem(&png)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        f(lt)
    }

    fn init(&self) -> Result<LepTess, ProcessError> {
        tracing::debug!(languages = %self.languages, "Initializing Tesseract");

        let mut lt = LepTess::new(None, &self.languages)
            .map_err(|e| ProcessError::OcrInit(e.to_string()))?;

        // Treat the page as a single uniform block of text.
        lt.set_variable(leptess::Variable::TesseditPagesegMode, "6")
            .map_err(|e| ProcessError::OcrInit(e.to_string()))?;

        if let Some(ref whitelist) = self.whitelist {
            lt.set_variable(leptess::Variable::TesseditCharWhitelist, whitelist)
                .map_err(|e| ProcessError::OcrInit(e.to_string()))?;
        }

        Ok(lt)
    }
}

impl TokenReader for TesseractEngine {
    fn read_tokens(&self, image: &[u8]) -> Result<TokenScan, ProcessError> {
        self.with_api(image, |lt| {
            let text = lt
                .get_utf8_text()
                .map_err(|e| ProcessError::OcrFailed(e.to_string()))?;

            let mut token_confidences = Vec::new();
            if let Some(boxes) =
                lt.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_WORD, true)
            {
                for b in &boxes {
                    lt.set_rectangle_from_box(&b);
                    token_confidences.push(lt.mean_text_conf() as f32);
                }
            }

            Ok(TokenScan {
                text,
                token_confidences,
            })
        })
    }
}

impl RegionDetector for TesseractEngine {
    fn detect_regions(&self, image: &[u8]) -> Result<Vec<TextRegion>, ProcessError> {
        self.with_api(image, |lt| {
            let Some(boxes) =
                lt.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE, true)
            else {
                return Ok(Vec::new());
            };

            let mut regions = Vec::new();
            for b in &boxes {
                lt.set_rectangle_from_box(&b);
                let text = lt
                    .get_utf8_text()
                    .map_err(|e| ProcessError::OcrFailed(e.to_string()))?;
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                regions.push(TextRegion {
                    text: text.to_string(),
                    confidence: f64::from(lt.mean_text_conf()) / 100.0,
                });
            }
            Ok(regions)
        })
    }
}

/// Normalises any decodable image to PNG, which leptonica always accepts.
fn to_png(image: &[u8]) -> Result<Vec<u8>, ProcessError> {
    let img = image::load_from_memory(image)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to load image: {}", e)))?;

    let mut png_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to convert image: {}", e)))?;
    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTokens(Result<TokenScan, String>);

    impl TokenReader for FixedTokens {
        fn read_tokens(&self, _image: &[u8]) -> Result<TokenScan, ProcessError> {
            self.0.clone().map_err(ProcessError::OcrFailed)
        }
    }

    struct FixedRegions(Result<Vec<TextRegion>, String>);

    impl RegionDetector for FixedRegions {
        fn detect_regions(&self, _image: &[u8]) -> Result<Vec<TextRegion>, ProcessError> {
            self.0.clone().map_err(ProcessError::OcrFailed)
        }
    }

    fn region(text: &str, confidence: f64) -> TextRegion {
        TextRegion {
            text: text.to_string(),
            confidence,
        }
    }

    #[test]
    fn test_constrained_mean_ignores_non_positive_tokens() {
        let strategy = ConstrainedStrategy::new(Arc::new(FixedTokens(Ok(TokenScan {
            text: "Paracetamol 500mg OD\n".to_string(),
            token_confidences: vec![90.0, -1.0, 80.0, 0.0, 70.0],
        }))));

        let result = strategy.recognize(b"img");
        assert_eq!(result.text, "Paracetamol 500mg OD");
        assert_eq!(result.confidence, 80.0);
        assert_eq!(result.engine, RecognitionEngine::Constrained);
    }

    #[test]
    fn test_constrained_without_tokens_has_zero_confidence() {
        let strategy = ConstrainedStrategy::new(Arc::new(FixedTokens(Ok(TokenScan::default()))));
        let result = strategy.recognize(b"img");
        assert_eq!(result, RecognitionResult::empty(RecognitionEngine::Constrained));
    }

    #[test]
    fn test_constrained_error_becomes_empty_result() {
        let strategy =
            ConstrainedStrategy::new(Arc::new(FixedTokens(Err("engine missing".to_string()))));
        let result = strategy.recognize(b"img");
        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_constrained_confidence_is_clamped() {
        let strategy = ConstrainedStrategy::new(Arc::new(FixedTokens(Ok(TokenScan {
            text: "x".to_string(),
            token_confidences: vec![140.0],
        }))));
        assert_eq!(strategy.recognize(b"img").confidence, 100.0);
    }

    #[test]
    fn test_general_filters_below_floor_and_scales() {
        let strategy = GeneralStrategy::new(
            Arc::new(FixedRegions(Ok(vec![
                region("Amoxicillin", 0.9),
                region("smudge", 0.2),
                region("250mg BD", 0.7),
            ]))),
            0.3,
        );

        let result = strategy.recognize(b"img");
        assert_eq!(result.text, "Amoxicillin 250mg BD");
        assert!((result.confidence - 80.0).abs() < 1e-9);
        assert_eq!(result.engine, RecognitionEngine::General);
    }

    #[test]
    fn test_general_region_at_floor_is_discarded() {
        let strategy =
            GeneralStrategy::new(Arc::new(FixedRegions(Ok(vec![region("faint", 0.3)]))), 0.3);
        assert_eq!(
            strategy.recognize(b"img"),
            RecognitionResult::empty(RecognitionEngine::General)
        );
    }

    #[test]
    fn test_general_error_becomes_empty_result() {
        let strategy = GeneralStrategy::new(Arc::new(FixedRegions(Err("boom".to_string()))), 0.3);
        assert_eq!(
            strategy.recognize(b"img"),
            RecognitionResult::empty(RecognitionEngine::General)
        );
    }

    #[test]
    fn test_tesseract_engine_languages() {
        let engine = TesseractEngine::new(&["eng".to_string(), "hin".to_string()]);
        assert_eq!(engine.languages(), "eng+hin");
        assert_eq!(TesseractEngine::new(&[]).languages(), "eng");
    }

    #[test]
    fn test_tesseract_engine_rejects_invalid_image_before_init() {
        let engine = TesseractEngine::new(&[]).with_whitelist("0123456789");

        match engine.read_tokens(b"not valid image data") {
            Err(ProcessError::OcrFailed(msg)) => assert!(msg.contains("Failed to load image")),
            other => panic!("Expected OcrFailed, got {:?}", other.map(|s| s.text)),
        }
        assert!(engine.api.lock().unwrap().is_none());
    }
}
