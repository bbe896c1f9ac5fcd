//! Upload server configuration.
//!
//! Loaded from a JSON file with camelCase keys; every key is optional.

use std::path::{Path, PathBuf};

use bigfile_protocol::constants::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Where staged chunks and assembled files live, and which route prefix the
/// service answers on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Parent of every staging directory and every assembled file.
    pub storage_root: PathBuf,
    /// Route prefix; must match the uploader's.
    pub prefix: String,
    /// Name of the scratch directory under `storage_root` that receives raw
    /// multipart temp files.
    pub scratch_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("upload"),
            prefix: DEFAULT_PREFIX.into(),
            scratch_dir: "tmp".into(),
        }
    }
}

impl StoreConfig {
    /// Configuration rooted at `storage_root` with every other value at its
    /// default.
    pub fn with_root(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Default::default()
        }
    }

    /// Loads configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no store config, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Directory receiving raw multipart temp files.
    pub fn scratch_path(&self) -> PathBuf {
        self.storage_root.join(&self.scratch_dir)
    }

    /// Creates the storage root and the scratch directory.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(self.scratch_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.storage_root, PathBuf::from("upload"));
        assert_eq!(config.prefix, "upload");
        assert_eq!(config.scratch_path(), PathBuf::from("upload/tmp"));
    }

    #[test]
    fn load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"storageRoot":"/srv/uploads","prefix":"api"}"#).unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.storage_root, PathBuf::from("/srv/uploads"));
        assert_eq!(config.prefix, "api");
        assert_eq!(config.scratch_dir, "tmp");
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn load_malformed_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(StoreConfig::load(&path), Err(StoreError::Json(_))));
    }

    #[test]
    fn ensure_layout_creates_scratch() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::with_root(dir.path().join("files"));
        config.ensure_layout().unwrap();
        assert!(dir.path().join("files/tmp").is_dir());
    }
}
