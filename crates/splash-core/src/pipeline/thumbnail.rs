//! Thumbnail rendering for detector frames.
//!
//! Detector counts span several decades, so frames are log-scaled and
//! contrast-stretched before being shrunk to a fixed square. The steps run
//! in a fixed order (shift, log, rescale, quantize, autocontrast, resize,
//! encode); changing the order changes the output.

use image::{codecs::jpeg::JpegEncoder, GrayImage, ImageResult};
use ndarray::Array2;
use std::io::Cursor;

use crate::config::ThumbnailConfig;
use crate::error::{IngestError, IngestResult};
use crate::types::{ThumbnailFormat, ThumbnailSpec};

/// Value the frame minimum is shifted to, keeping the log strictly positive.
const LOG_FLOOR: f64 = 1.001;

/// Top of the 8-bit range the log image is rescaled to.
const LOG_SCALE: f64 = 205.0;

/// A thumbnail spec whose format has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRequest {
    pub spec: ThumbnailSpec,
    pub format: ThumbnailFormat,
}

impl ThumbnailRequest {
    /// Check every spec, failing on the first unsupported format or zero size.
    ///
    /// Repeated identical specs collapse into one request.
    pub fn validate_all(specs: &[ThumbnailSpec]) -> IngestResult<Vec<Self>> {
        let mut requests: Vec<Self> = Vec::with_capacity(specs.len());
        for spec in specs {
            let format = ThumbnailFormat::parse(&spec.format).ok_or_else(|| {
                IngestError::UnsupportedFormat {
                    format: spec.format.clone(),
                }
            })?;
            if spec.size == 0 {
                return Err(IngestError::InvalidThumbnailSize {
                    size: spec.size,
                    format: spec.format.clone(),
                });
            }
            if requests.iter().all(|r| r.spec != *spec) {
                requests.push(Self {
                    spec: spec.clone(),
                    format,
                });
            }
        }
        Ok(requests)
    }
}

/// Renders contrast-normalized thumbnails from raw frames.
pub struct ThumbnailRenderer {
    config: ThumbnailConfig,
}

impl ThumbnailRenderer {
    /// Create a new renderer with the given configuration.
    pub fn new(config: ThumbnailConfig) -> Self {
        Self { config }
    }

    /// Log-scale, quantize and autocontrast a frame into an 8-bit image.
    ///
    /// Non-finite pixels are treated as the frame minimum. Fails on frames
    /// with no finite pixels.
    pub fn normalize(&self, pixels: &Array2<f64>) -> Result<GrayImage, String> {
        let (rows, cols) = pixels.dim();
        if rows == 0 || cols == 0 {
            return Err("frame has no pixels".to_string());
        }
        let min = pixels
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .reduce(f64::min)
            .ok_or("frame has no finite pixels")?;

        let log_img = pixels.mapv(|v| {
            let v = if v.is_finite() { v } else { min };
            (v - min + LOG_FLOOR).ln()
        });
        let max_log = log_img.iter().copied().fold(f64::MIN, f64::max);

        // Row-major iteration matches the image buffer layout
        let quantized: Vec<u8> = log_img
            .iter()
            .map(|&l| (LOG_SCALE * l / max_log) as u8)
            .collect();

        let mut image = GrayImage::from_raw(cols as u32, rows as u32, quantized)
            .ok_or("frame dimensions exceed image limits")?;
        autocontrast(&mut image, self.config.autocontrast_cutoff);
        Ok(image)
    }

    /// Resize a normalized image to `size x size` and encode it.
    pub fn render(
        &self,
        normalized: &GrayImage,
        request: &ThumbnailRequest,
    ) -> ImageResult<Vec<u8>> {
        let size = request.spec.size;
        let resized = image::imageops::resize(normalized, size, size, self.config.filter.into());

        let mut buffer = Cursor::new(Vec::new());
        match request.format {
            ThumbnailFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality)
                    .encode_image(&resized)?;
            }
            ThumbnailFormat::Tiff => {
                resized.write_to(&mut buffer, request.format.image_format())?;
            }
        }
        Ok(buffer.into_inner())
    }
}

/// Stretch the histogram so the darkest and brightest `cutoff` percent of
/// pixels saturate, and the rest spans 0..=255.
pub fn autocontrast(image: &mut GrayImage, cutoff: f64) {
    let mut histogram = [0f64; 256];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1.0;
    }

    if cutoff > 0.0 {
        let total: f64 = histogram.iter().sum();
        let cut = (total * cutoff / 100.0).floor();
        clip(&mut histogram, cut, 0..256);
        clip(&mut histogram, cut, (0..256).rev());
    }

    let lo = histogram.iter().position(|&h| h != 0.0);
    let hi = histogram.iter().rposition(|&h| h != 0.0);
    let lut: [u8; 256] = match (lo, hi) {
        (Some(lo), Some(hi)) if hi > lo => {
            let scale = 255.0 / (hi - lo) as f64;
            let offset = -(lo as f64) * scale;
            std::array::from_fn(|ix| ((ix as f64 * scale + offset) as i64).clamp(0, 255) as u8)
        }
        _ => return,
    };

    for pixel in image.pixels_mut() {
        pixel.0[0] = lut[pixel.0[0] as usize];
    }
}

/// Remove `cut` samples from the histogram, walking bins in `order`.
fn clip(histogram: &mut [f64; 256], mut cut: f64, order: impl Iterator<Item = usize>) {
    for ix in order {
        if cut > histogram[ix] {
            cut -= histogram[ix];
            histogram[ix] = 0.0;
        } else {
            histogram[ix] -= cut;
            cut = 0.0;
        }
        if cut <= 0.0 {
            break;
        }
    }
}
