use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, Luma, Rgb, RgbImage};

use crate::config::PreprocessConfig;
use crate::error::ProcessError;

/// Pixel dimensions and format tag sniffed from an uploaded blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// Reads width/height/format from the image header without decoding pixels.
/// Returns `None` for anything the image crate does not recognise.
pub fn sniff_image_info(data: &[u8]) -> Option<ImageInfo> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?;
    let format = reader.format()?;
    let (width, height) = reader.into_dimensions().ok()?;
    Some(ImageInfo {
        width,
        height,
        format: format_tag(format).to_string(),
    })
}

fn format_tag(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("bin")
}

/// Deterministic image transforms applied before recognition.
///
/// Both transforms swallow their own errors: a `None` result means "no
/// derived artifact", and callers carry on with the raw image.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Flattens transparency onto white, caps the width and re-encodes as JPEG.
    pub fn compress(&self, data: &[u8]) -> Option<Vec<u8>> {
        let _span = tracing::info_span!("preprocess.compress", bytes = data.len()).entered();

        match self.try_compress(data) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Compressed copy skipped: {}", e);
                None
            }
        }
    }

    /// Produces a binarized grayscale copy tuned for OCR.
    pub fn enhance(&self, data: &[u8]) -> Option<Vec<u8>> {
        let _span = tracing::info_span!("preprocess.enhance", bytes = data.len()).entered();

        match self.try_enhance(data) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!("Enhanced copy skipped: {}", e);
                None
            }
        }
    }

    fn try_compress(&self, data: &[u8]) -> Result<Vec<u8>, ProcessError> {
        let img = decode(data)?;
        let rgb = flatten_onto_white(&img);

        let max_width = self.config.max_width;
        let rgb = if rgb.width() > max_width {
            let height = (u64::from(rgb.height()) * u64::from(max_width) / u64::from(rgb.width()))
                .max(1) as u32;
            image::imageops::resize(&rgb, max_width, height, FilterType::Lanczos3)
        } else {
            rgb
        };

        encode_jpeg(DynamicImage::ImageRgb8(rgb), self.config.jpeg_quality)
    }

    fn try_enhance(&self, data: &[u8]) -> Result<Vec<u8>, ProcessError> {
        let gray = decode(data)?.to_luma8();

        let gray = adjust_contrast(&gray, self.config.contrast_factor);
        let gray = adjust_sharpness(&gray, self.config.sharpness_factor);

        let radius = self.config.median_radius;
        let gray = imageproc::filter::median_filter(&gray, radius, radius);
        let binary =
            imageproc::contrast::adaptive_threshold(&gray, self.config.threshold_block_radius);

        encode_jpeg(
            DynamicImage::ImageLuma8(binary),
            self.config.enhanced_jpeg_quality,
        )
    }
}

fn decode(data: &[u8]) -> Result<DynamicImage, ProcessError> {
    image::load_from_memory(data).map_err(|e| ProcessError::ImageDecode(e.to_string()))
}

fn encode_jpeg(img: DynamicImage, quality: u8) -> Result<Vec<u8>, ProcessError> {
    let mut buffer = Vec::new();
    img.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
        .map_err(|e| ProcessError::ImageEncode(e.to_string()))?;
    Ok(buffer)
}

/// Alpha-composites onto a white background. Opaque images are converted as-is.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Scales each pixel's distance from the mean intensity by `factor`.
fn adjust_contrast(img: &GrayImage, factor: f32) -> GrayImage {
    let count = u64::from(img.width()) * u64::from(img.height());
    if count == 0 {
        return img.clone();
    }
    let sum: u64 = img.pixels().map(|p| u64::from(p.0[0])).sum();
    let mean = (sum as f64 / count as f64).round() as f32;

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let value = f32::from(pixel.0[0]);
        pixel.0[0] = clamp_u8(mean + factor * (value - mean));
    }
    out
}

/// Blends the image away from a smoothed copy of itself. Border pixels
/// are left untouched.
fn adjust_sharpness(img: &GrayImage, factor: f32) -> GrayImage {
    const KERNEL: [[u32; 3]; 3] = [[1, 1, 1], [1, 5, 1], [1, 1, 1]];
    const KERNEL_SUM: u32 = 13;

    let (width, height) = img.dimensions();
    if width < 3 || height < 3 {
        return img.clone();
    }

    let mut out = img.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = 0u32;
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let px = img.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1).0[0];
                    acc += u32::from(px) * weight;
                }
            }
            let smoothed = (acc as f32 / KERNEL_SUM as f32).round();
            let original = f32::from(img.get_pixel(x, y).0[0]);
            out.put_pixel(x, y, Luma([clamp_u8(smoothed + factor * (original - smoothed))]));
        }
    }
    out
}
