pub mod arbiter;
pub mod image;
pub mod ocr;
pub mod pdf;

use std::sync::Arc;

pub use arbiter::{build_corpus, select, Arbiter};
pub use image::{sniff_image_info, ImageInfo, ImagePreprocessor};
pub use ocr::{
    ConstrainedStrategy, GeneralStrategy, RecognitionEngine, RecognitionResult,
    RecognitionStrategy, RegionDetector, TesseractEngine, TextRegion, TokenReader, TokenScan,
};

use crate::config::OcrConfig;

/// Builds the Tesseract-backed arbiter: constrained strategy first, general second.
pub fn tesseract_arbiter(config: &OcrConfig) -> Arbiter {
    let constrained = TesseractEngine::new(&config.languages).with_whitelist(&config.char_whitelist);
    let general = TesseractEngine::new(&config.languages);

    Arbiter::new(
        Arc::new(ConstrainedStrategy::new(Arc::new(constrained))),
        Arc::new(GeneralStrategy::new(
            Arc::new(general),
            config.recognition_confidence_floor,
        )),
    )
}
