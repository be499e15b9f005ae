//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::types::ThumbnailFormat;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "processing.parallel_workers must be > 0".into(),
            ));
        }
        if self.pipeline.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.buffer_size must be > 0".into(),
            ));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.limits.decode_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "limits.decode_timeout_ms must be > 0".into(),
            ));
        }
        if !(1..=100).contains(&self.thumbnail.jpeg_quality) {
            return Err(ConfigError::ValidationError(
                "thumbnail.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if !(0.0..50.0).contains(&self.thumbnail.autocontrast_cutoff) {
            return Err(ConfigError::ValidationError(
                "thumbnail.autocontrast_cutoff must be in [0, 50)".into(),
            ));
        }
        for spec in &self.ingest.thumbnails {
            if spec.size == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "ingest.thumbnails: size must be > 0 (format {:?})",
                    spec.format
                )));
            }
            if ThumbnailFormat::parse(&spec.format).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "ingest.thumbnails: unsupported format {:?}",
                    spec.format
                )));
            }
        }
        if self.tagging.rules.iter().any(|r| r.tag.is_empty()) {
            return Err(ConfigError::ValidationError(
                "tagging.rules: tag must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThumbnailSpec;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_parallel_workers() {
        let mut config = Config::default();
        config.processing.parallel_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("parallel_workers"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.limits.decode_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decode_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_unsupported_thumbnail_format() {
        let mut config = Config::default();
        config.ingest.thumbnails.push(ThumbnailSpec::new(128, "bmp"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bmp"));
    }

    #[test]
    fn test_validate_rejects_zero_thumbnail_size() {
        let mut config = Config::default();
        config.ingest.thumbnails = vec![ThumbnailSpec::new(0, "jpg")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("size must be > 0"));
    }

    #[test]
    fn test_validate_rejects_bad_cutoff() {
        let mut config = Config::default();
        config.thumbnail.autocontrast_cutoff = 50.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("autocontrast_cutoff"));

        config.thumbnail.autocontrast_cutoff = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_jpeg_quality() {
        let mut config = Config::default();
        config.thumbnail.jpeg_quality = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jpeg_quality"));
    }
}
