use serde::{Deserialize, Serialize};

/// Size of one mebibyte, the unit used for upload limits.
pub const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_storage_directory")]
    pub storage_directory: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_database_path() -> String {
    dirs::home_dir()
        .map(|h| h.join(".rxscan").join("data").join("rxscan.db"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "rxscan.db".to_string())
}

fn default_storage_directory() -> String {
    dirs::home_dir()
        .map(|h| h.join(".rxscan").join("blobs"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "blobs".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: default_database_path(),
            storage_directory: default_storage_directory(),
            worker_count: default_worker_count(),
            preprocess: PreprocessConfig::default(),
            ocr: OcrConfig::default(),
            upload: UploadConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Image preprocessing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Compressed copies are downsized to at most this width.
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// JPEG quality of the compressed copy.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// JPEG quality of the enhanced (binarized) copy.
    #[serde(default = "default_enhanced_jpeg_quality")]
    pub enhanced_jpeg_quality: u8,
    #[serde(default = "default_contrast_factor")]
    pub contrast_factor: f32,
    #[serde(default = "default_sharpness_factor")]
    pub sharpness_factor: f32,
    /// Radius of the median filter; 1 means a 3x3 window.
    #[serde(default = "default_median_radius")]
    pub median_radius: u32,
    /// Radius of the adaptive threshold block; 5 means an 11x11 block.
    #[serde(default = "default_threshold_block_radius")]
    pub threshold_block_radius: u32,
}

fn default_max_width() -> u32 {
    1200
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_enhanced_jpeg_quality() -> u8 {
    95
}

fn default_contrast_factor() -> f32 {
    1.5
}

fn default_sharpness_factor() -> f32 {
    1.2
}

fn default_median_radius() -> u32 {
    1
}

fn default_threshold_block_radius() -> u32 {
    5
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            jpeg_quality: default_jpeg_quality(),
            enhanced_jpeg_quality: default_enhanced_jpeg_quality(),
            contrast_factor: default_contrast_factor(),
            sharpness_factor: default_sharpness_factor(),
            median_radius: default_median_radius(),
            threshold_block_radius: default_threshold_block_radius(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Regions detected by the general strategy below this confidence
    /// (0.0-1.0) are discarded.
    #[serde(default = "default_confidence_floor")]
    pub recognition_confidence_floor: f64,
    /// Alphabet the constrained strategy is allowed to emit.
    #[serde(default = "default_char_whitelist")]
    pub char_whitelist: String,
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

fn default_confidence_floor() -> f64 {
    0.3
}

pub(crate) fn default_char_whitelist() -> String {
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz.,()/-: ".to_string()
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            recognition_confidence_floor: default_confidence_floor(),
            char_whitelist: default_char_whitelist(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
}

fn default_max_images() -> usize {
    10
}

fn default_max_image_bytes() -> usize {
    10 * MIB
}

fn default_allowed_content_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "application/pdf".to_string(),
    ]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
            max_image_bytes: default_max_image_bytes(),
            allowed_content_types: default_allowed_content_types(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit newline-delimited JSON instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
