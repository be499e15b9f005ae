//! Configuration management for splash.
//!
//! Configuration is loaded from the platform config directory
//! (`splash/config.toml`) and every section falls back to its defaults.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for splash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source/destination roots and thumbnail specs
    pub ingest: IngestConfig,

    /// Worker settings
    pub processing: ProcessingConfig,

    /// Backpressure settings
    pub pipeline: PipelineConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Thumbnail rendering settings
    pub thumbnail: ThumbnailConfig,

    /// Path tagging settings
    pub tagging: TaggingConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/org.splash.splash/config.toml
    /// - Linux: ~/.config/splash/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\splash\config\config.toml
    ///
    /// Falls back to ~/.splash/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "splash", "splash")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".splash").join("config.toml")
            })
    }

    /// Resolved source root (with ~ expansion).
    pub fn source_root(&self) -> PathBuf {
        expand(&self.ingest.source_root)
    }

    /// Resolved output root (with ~ expansion).
    pub fn output_root(&self) -> PathBuf {
        expand(&self.ingest.output_root)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.processing.parallel_workers, 4);
        assert_eq!(config.pipeline.buffer_size, 64);
        assert_eq!(config.ingest.thumbnails.len(), 2);
        assert_eq!(config.ingest.source_label, "scattering ingestor");
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[ingest]"));
        assert!(toml.contains("[limits]"));
        assert!(toml.contains("thumbnails"));
    }

    #[test]
    fn test_toml_roundtrip_keeps_tag_rules() {
        let config = Config::default();
        let parsed = Config::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed.tagging.rules, config.tagging.rules);
        assert_eq!(parsed.thumbnail.filter, ResizeFilter::CatmullRom);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [ingest]
            output_root = "/data/archive"
            thumbnails = [{ size = 128, format = "jpg" }]
            "#,
        )
        .unwrap();
        assert_eq!(config.output_root(), PathBuf::from("/data/archive"));
        assert_eq!(config.ingest.thumbnails.len(), 1);
        assert_eq!(config.ingest.thumbnails[0].size, 128);
        assert_eq!(config.limits.max_file_size_mb, 512);
    }
}
