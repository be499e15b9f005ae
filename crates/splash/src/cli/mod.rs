//! Subcommands of the `splash` binary.

pub mod config;
pub mod ingest;

use splash_core::Config;
use std::path::{Path, PathBuf};

/// Load configuration from `path`, or from the default location when unset.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(&expand_path(path))?,
        None => Config::load()?,
    };
    Ok(config)
}

/// Expand a leading `~` in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splash.toml");
        std::fs::write(&path, "[processing]\nparallel_workers = 7\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.processing.parallel_workers, 7);
        assert_eq!(config.pipeline.buffer_size, 64);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splash.toml");
        std::fs::write(&path, "[processing]\nparallel_workers = 0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_expand_path_leaves_plain_paths() {
        assert_eq!(expand_path(Path::new("/data/raw")), PathBuf::from("/data/raw"));
    }
}
