use crate::config::{Config, OcrConfig, PreprocessConfig};

/// Settings handed to the preprocessor and the recognition strategies.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub ocr: OcrConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            preprocess: config.preprocess.clone(),
            ocr: config.ocr.clone(),
        }
    }

    pub fn max_width(&self) -> u32 {
        self.preprocess.max_width
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.preprocess.jpeg_quality
    }

    pub fn recognition_confidence_floor(&self) -> f64 {
        self.ocr.recognition_confidence_floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_config(&Config::default());
        assert_eq!(config.max_width(), 1200);
        assert_eq!(config.jpeg_quality(), 85);
        assert_eq!(config.recognition_confidence_floor(), 0.3);
    }

    #[test]
    fn test_projects_file_config() {
        let mut file_config = Config::default();
        file_config.preprocess.max_width = 800;
        file_config.ocr.recognition_confidence_floor = 0.5;

        let config = PipelineConfig::from_config(&file_config);
        assert_eq!(config.max_width(), 800);
        assert_eq!(config.recognition_confidence_floor(), 0.5);
    }
}
