//! Persisted archive selection

use crate::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Archive list entry that stands for "discover automatically"
pub const AUTO_SENTINEL: &str = "AUTO";

/// Which archives the registry mounts
///
/// Stored as `{ "archives": [...], "search_roots": [...] }`. An `archives`
/// list consisting of the single entry `"AUTO"` selects automatic discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredConfig", into = "StoredConfig")]
pub struct RegistryConfig {
    /// Archive files to mount, in order; ignored when `automatic` is set
    pub archives: Vec<PathBuf>,

    /// Discover archives in known install locations
    pub automatic: bool,

    /// Extra directories searched by discovery; `~` is expanded
    pub search_roots: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct StoredConfig {
    #[serde(default)]
    archives: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    search_roots: Vec<String>,
}

impl From<StoredConfig> for RegistryConfig {
    fn from(stored: StoredConfig) -> Self {
        let automatic = matches!(stored.archives.as_slice(), [only] if only == AUTO_SENTINEL);
        Self {
            archives: if automatic {
                Vec::new()
            } else {
                stored.archives.into_iter().map(PathBuf::from).collect()
            },
            automatic,
            search_roots: stored.search_roots,
        }
    }
}

impl From<RegistryConfig> for StoredConfig {
    fn from(config: RegistryConfig) -> Self {
        Self {
            archives: if config.automatic {
                vec![AUTO_SENTINEL.to_string()]
            } else {
                config
                    .archives
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect()
            },
            search_roots: config.search_roots,
        }
    }
}

impl RegistryConfig {
    /// Manual selection of `archives`
    pub fn new<I, P>(archives: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            archives: archives.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Replace the archive list
    #[must_use]
    pub fn with_archives(mut self, archives: Vec<PathBuf>) -> Self {
        self.archives = archives;
        self
    }

    /// Switch automatic discovery on or off
    #[must_use]
    pub fn with_automatic(mut self, automatic: bool) -> Self {
        self.automatic = automatic;
        self
    }

    /// Add a directory for discovery to search
    #[must_use]
    pub fn with_search_root(mut self, root: impl Into<String>) -> Self {
        self.search_roots.push(root.into());
        self
    }

    /// Read a stored configuration, or the default when the file is absent
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No registry config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| StorageError::Config(format!("{}: {e}", path.display())))
    }

    /// Write the configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| StorageError::Config(e.to_string()))?;
        fs::write(path, text)?;
        debug!("Saved registry config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_auto_sentinel() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"archives": ["AUTO"], "search_roots": ["~/games"]}"#).unwrap();
        assert!(config.automatic);
        assert!(config.archives.is_empty());
        assert_eq!(config.search_roots, vec!["~/games"]);

        let json = serde_json::to_value(RegistryConfig::default().with_automatic(true)).unwrap();
        assert_eq!(json, serde_json::json!({ "archives": ["AUTO"] }));
    }

    #[test]
    fn test_manual_list_keeps_order() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"archives": ["b.bsa", "a.bsa", "AUTO"]}"#).unwrap();
        assert!(!config.automatic);
        assert_eq!(
            config.archives,
            vec![PathBuf::from("b.bsa"), PathBuf::from("a.bsa"), PathBuf::from("AUTO")]
        );
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = RegistryConfig::load(dir.path().join("none.json")).unwrap();
        assert_eq!(config, RegistryConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.json");
        let config = RegistryConfig::new(["/data/meshes.bsa", "/data/textures.bsa"])
            .with_search_root("~/games");

        config.save(&path).unwrap();
        assert_eq!(RegistryConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RegistryConfig::load(&path),
            Err(StorageError::Config(_))
        ));
    }
}
