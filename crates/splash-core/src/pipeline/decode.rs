//! Raw frame decoding with format detection, limits, and timeout support.

use image::{DynamicImage, ImageFormat};
use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use super::edf;
use crate::config::LimitsConfig;
use crate::error::IngestError;

/// Decodes detector frames into single-channel floating point pixels.
pub struct RawDecoder {
    limits: LimitsConfig,
}

/// A decoded detector frame.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Pixel intensities, shape (rows, cols)
    pub pixels: Array2<f64>,
    /// Detected container format ("edf", "tiff", "png", ...)
    pub format: String,
}

impl RawFrame {
    /// Frame shape as (rows, cols).
    pub fn shape(&self) -> [usize; 2] {
        let (rows, cols) = self.pixels.dim();
        [rows, cols]
    }
}

impl RawDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode a frame from an in-memory byte buffer with validation and timeout.
    ///
    /// Decoding runs on the blocking pool so large frames do not stall the
    /// async workers.
    pub async fn decode_from_bytes(
        &self,
        bytes: Arc<[u8]>,
        path: &Path,
    ) -> Result<RawFrame, IngestError> {
        let path_owned = path.to_path_buf();
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);

        let decode_result = timeout(timeout_duration, async {
            tokio::task::spawn_blocking(move || Self::decode_bytes_sync(&bytes, &path_owned)).await
        })
        .await;

        match decode_result {
            Ok(Ok(Ok(decoded))) => {
                let [rows, cols] = decoded.shape();
                let max_dim = self.limits.max_image_dimension as usize;
                if rows > max_dim || cols > max_dim {
                    return Err(IngestError::Decode {
                        path: path.to_path_buf(),
                        message: format!("frame {rows}x{cols} exceeds {max_dim} pixels per side"),
                    });
                }
                Ok(decoded)
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(e)) => Err(IngestError::Decode {
                path: path.to_path_buf(),
                message: format!("Task join error: {}", e),
            }),
            Err(_) => Err(IngestError::Timeout {
                path: path.to_path_buf(),
                stage: "decode".to_string(),
                timeout_ms: self.limits.decode_timeout_ms,
            }),
        }
    }

    /// Synchronous decode (runs in spawn_blocking).
    pub fn decode_bytes_sync(bytes: &[u8], path: &Path) -> Result<RawFrame, IngestError> {
        let decode_err = |message: String| IngestError::Decode {
            path: path.to_path_buf(),
            message,
        };

        let is_edf_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("edf"));
        if is_edf_ext || edf::looks_like_edf(bytes) {
            let frame = edf::parse(bytes).map_err(decode_err)?;
            return Ok(RawFrame {
                pixels: frame.data,
                format: "edf".to_string(),
            });
        }

        let reader = image::ImageReader::new(std::io::Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| decode_err(format!("Cannot detect image format: {}", e)))?;
        let format = match reader.format() {
            Some(f) => f,
            None => ImageFormat::from_path(path)
                .map_err(|_| decode_err("Unrecognized image format".to_string()))?,
        };
        let image = reader
            .decode()
            .map_err(|e| decode_err(e.to_string()))?;

        Ok(RawFrame {
            pixels: to_intensity(image).map_err(decode_err)?,
            format: format_to_string(format),
        })
    }
}

/// Collapse an image to one intensity channel, keeping 16-bit and float precision.
fn to_intensity(image: DynamicImage) -> Result<Array2<f64>, String> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let values: Vec<f64> = match image {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw().into_iter().map(f64::from).collect(),
        img @ (DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)) => img
            .to_luma32f()
            .into_raw()
            .into_iter()
            .map(f64::from)
            .collect(),
        img => img.to_luma16().into_raw().into_iter().map(f64::from).collect(),
    };
    Array2::from_shape_vec((height, width), values).map_err(|e| e.to_string())
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Pnm => "pnm".to_string(),
        _ => "unknown".to_string(),
    }
}

/// Handler name recorded in resource documents for a raw container format.
pub fn resource_spec(format: &str) -> &'static str {
    match format {
        "edf" => "EDF",
        "tiff" => "AD_TIFF",
        "jpeg" => "JPEG",
        "png" => "PNG",
        _ => "RAW",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_format_to_string() {
        assert_eq!(format_to_string(ImageFormat::Tiff), "tiff");
        assert_eq!(format_to_string(ImageFormat::Png), "png");
        assert_eq!(format_to_string(ImageFormat::WebP), "unknown");
    }

    #[test]
    fn test_decode_edf() {
        let data = Array2::from_shape_fn((5, 7), |(r, c)| (r * 7 + c) as u16);
        let bytes = edf::encode_u16(&data);
        let frame = RawDecoder::decode_bytes_sync(&bytes, Path::new("frame.edf")).unwrap();
        assert_eq!(frame.format, "edf");
        assert_eq!(frame.shape(), [5, 7]);
        assert_eq!(frame.pixels[[4, 6]], 34.0);
    }

    #[test]
    fn test_decode_tiff_keeps_16_bit_range() {
        let buf: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(6, 3, |x, y| Luma([(x * 10_000 + y) as u16]));
        let bytes = encode(DynamicImage::ImageLuma16(buf), ImageFormat::Tiff);

        let frame = RawDecoder::decode_bytes_sync(&bytes, Path::new("frame.tiff")).unwrap();
        assert_eq!(frame.format, "tiff");
        // rows = height, cols = width
        assert_eq!(frame.shape(), [3, 6]);
        assert_eq!(frame.pixels[[2, 5]], 50_002.0);
    }

    #[test]
    fn test_format_detected_by_content() {
        let buf: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_pixel(4, 4, Luma([9]));
        let bytes = encode(DynamicImage::ImageLuma8(buf), ImageFormat::Png);
        let frame = RawDecoder::decode_bytes_sync(&bytes, Path::new("misnamed.tiff")).unwrap();
        assert_eq!(frame.format, "png");
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = RawDecoder::decode_bytes_sync(b"not an image at all", Path::new("x.tiff"))
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_rejects_oversized_frame() {
        let limits = LimitsConfig {
            max_image_dimension: 4,
            ..LimitsConfig::default()
        };
        let decoder = RawDecoder::new(limits);
        let bytes = edf::encode_u16(&Array2::zeros((8, 2)));
        let err = decoder
            .decode_from_bytes(bytes.into(), Path::new("big.edf"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_resource_spec() {
        assert_eq!(resource_spec("edf"), "EDF");
        assert_eq!(resource_spec("tiff"), "AD_TIFF");
        assert_eq!(resource_spec("whatever"), "RAW");
    }
}
