//! Ordered set of mounted archives
//!
//! The registry owns one reference to every mounted [`Archive`] and mounts
//! an [`ArchiveProvider`] for each into its [`OverlayChain`]. Order is
//! registration order: when several archives contain the same relative
//! path, the one registered first wins.

use crate::archive::Archive;
use crate::config::RegistryConfig;
use crate::discovery::Discovery;
use crate::overlay::{ArchiveProvider, FileProvider, OverlayChain, OverlayDirs};
use crate::{Result, StorageError};
use bsafs_formats::EntryFilter;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Mount {
    archive: Arc<Archive>,
    provider: Arc<ArchiveProvider>,
}

/// Mounted archives, in registration order
pub struct ArchiveRegistry {
    mounts: RwLock<Vec<Mount>>,
    automatic: RwLock<bool>,
    discovery: RwLock<Discovery>,
    overlay: Arc<OverlayChain>,
    dirs: OverlayDirs,
}

impl std::fmt::Debug for ArchiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveRegistry")
            .field("paths", &self.paths())
            .field("automatic", &*self.automatic.read())
            .finish_non_exhaustive()
    }
}

impl ArchiveRegistry {
    /// Registry mounting what `config` selects, listed in the process-wide
    /// overlay directory index
    pub fn new(config: &RegistryConfig) -> Self {
        Self::with_dirs(config, OverlayDirs::global())
    }

    /// Registry using its own overlay directory index
    pub fn with_dirs(config: &RegistryConfig, dirs: OverlayDirs) -> Self {
        let discovery = Discovery::new().with_search_roots(config.search_roots.iter().cloned());
        Self::with_discovery(config, dirs, discovery)
    }

    /// Registry with explicit discovery settings
    ///
    /// `config.search_roots` is ignored in favour of `discovery`.
    pub fn with_discovery(config: &RegistryConfig, dirs: OverlayDirs, discovery: Discovery) -> Self {
        let registry = Self {
            mounts: RwLock::new(Vec::new()),
            automatic: RwLock::new(config.automatic),
            discovery: RwLock::new(discovery),
            overlay: Arc::new(OverlayChain::with_real_fs(dirs.clone())),
            dirs,
        };

        let paths = if config.automatic {
            registry.discovery.read().archives()
        } else {
            config.archives.clone()
        };
        registry.mount_all(&paths);
        registry
    }

    fn mount_all(&self, paths: &[PathBuf]) {
        for path in paths {
            // Failures are logged by add() and the archive is skipped
            let _ = self.add(path);
        }
        info!("{} archives mounted", self.len());
    }

    /// Open and mount an archive after the existing ones
    ///
    /// Adding an already mounted path returns the existing archive.
    pub fn add(&self, path: impl AsRef<Path>) -> Result<Arc<Archive>> {
        let archive = Archive::new(path);
        if let Some(existing) = self.find(archive.path_key()) {
            debug!("{} already mounted", archive.path_key());
            return Ok(existing);
        }

        if let Err(e) = archive.open() {
            warn!(
                "Skipping archive {}: {}",
                archive.path().display(),
                archive.status_text()
            );
            return Err(e);
        }

        let archive = Arc::new(archive);
        let mut mounts = self.mounts.write();
        if let Some(existing) = mounts
            .iter()
            .find(|m| m.archive.path_key() == archive.path_key())
        {
            return Ok(Arc::clone(&existing.archive));
        }

        let provider = Arc::new(ArchiveProvider::new(Arc::clone(&archive), self.dirs.clone()));
        self.overlay
            .mount(Arc::clone(&provider) as Arc<dyn FileProvider>);
        mounts.push(Mount {
            archive: Arc::clone(&archive),
            provider,
        });
        Ok(archive)
    }

    /// Unmount an archive
    ///
    /// The archive is closed once no overlay handle or iterator still holds
    /// it; otherwise it closes when the last of them is dropped.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let key = Archive::new(path).path_key().to_string();
        let removed = {
            let mut mounts = self.mounts.write();
            let Some(index) = mounts.iter().position(|m| m.archive.path_key() == key) else {
                return false;
            };
            mounts.remove(index)
        };

        self.overlay.unmount(&key);
        let Mount { archive, provider } = removed;
        drop(provider);
        if Arc::strong_count(&archive) == 1 {
            archive.close();
        }
        debug!("Unmounted {}", key);
        true
    }

    /// Unmount every archive
    pub fn clear(&self) {
        let removed: Vec<Mount> = std::mem::take(&mut *self.mounts.write());
        for mount in removed {
            self.overlay.unmount(mount.archive.path_key());
            drop(mount.provider);
            if Arc::strong_count(&mount.archive) == 1 {
                mount.archive.close();
            }
        }
    }

    /// Whether the mount set comes from discovery
    pub fn is_automatic(&self) -> bool {
        *self.automatic.read()
    }

    /// Switch discovery on or off
    ///
    /// Switching on replaces the mount set with the discovered archives.
    /// Switching off keeps the current mounts as a manual selection.
    pub fn set_automatic(&self, automatic: bool) {
        *self.automatic.write() = automatic;
        if automatic {
            self.clear();
            let paths = self.discovery.read().archives();
            self.mount_all(&paths);
        }
    }

    /// Replace the discovery settings used by [`set_automatic`](Self::set_automatic)
    pub fn set_discovery(&self, discovery: Discovery) {
        *self.discovery.write() = discovery;
    }

    /// Paths of the mounted archives, in order
    pub fn paths(&self) -> Vec<PathBuf> {
        self.mounts
            .read()
            .iter()
            .map(|m| m.archive.path().to_path_buf())
            .collect()
    }

    /// Mounted archives, in order
    pub fn archives(&self) -> Vec<Arc<Archive>> {
        self.mounts
            .read()
            .iter()
            .map(|m| Arc::clone(&m.archive))
            .collect()
    }

    /// Number of mounted archives
    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    /// Nothing mounted
    pub fn is_empty(&self) -> bool {
        self.mounts.read().is_empty()
    }

    fn find(&self, path_key: &str) -> Option<Arc<Archive>> {
        self.mounts
            .read()
            .iter()
            .find(|m| m.archive.path_key() == path_key)
            .map(|m| Arc::clone(&m.archive))
    }

    /// First mounted archive containing the file `path`
    pub fn resolve(&self, path: &str) -> Option<Arc<Archive>> {
        self.mounts
            .read()
            .iter()
            .find(|m| m.archive.has_file(path))
            .map(|m| Arc::clone(&m.archive))
    }

    /// Whether any mounted archive contains the file `path`
    pub fn has_file(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Contents of `path` from the first archive containing it
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.resolve(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?
            .read(path)
    }

    /// Read `path` into `out`, reporting a missing resource as `false`
    pub fn file_contents(&self, path: &str, out: &mut Vec<u8>) -> bool {
        self.resolve(path)
            .is_some_and(|archive| archive.file_contents(path, out))
    }

    /// Stored size of `path` in the first archive containing it, 0 when absent
    pub fn file_size(&self, path: &str) -> u64 {
        self.resolve(path)
            .map_or(0, |archive| archive.file_size(path))
    }

    /// Union of a folder's entries across all archives
    ///
    /// Folders come first, then files; a name listed by an earlier archive
    /// is not repeated.
    pub fn entry_list(&self, path: &str, filter: &EntryFilter) -> Vec<String> {
        let archives = self.archives();
        let mut names: Vec<String> = Vec::new();
        for part in [filter.dirs_part(), filter.files_part()] {
            for archive in &archives {
                for name in archive.entry_list(path, &part) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    /// Overlay chain with one provider per mounted archive
    pub fn overlay(&self) -> &Arc<OverlayChain> {
        &self.overlay
    }

    /// Directory index the archives are registered in
    pub fn dirs(&self) -> &OverlayDirs {
        &self.dirs
    }

    /// Current selection as a storable configuration
    pub fn to_config(&self) -> RegistryConfig {
        RegistryConfig {
            archives: if self.is_automatic() {
                Vec::new()
            } else {
                self.paths()
            },
            automatic: self.is_automatic(),
            search_roots: self.discovery.read().search_roots().to_vec(),
        }
    }

    /// Store the current selection at `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_config().save(path)
    }
}

impl Drop for ArchiveRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
