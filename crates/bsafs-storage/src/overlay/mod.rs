//! Virtual filesystem overlay
//!
//! Resolving a path walks an ordered list of [`FileProvider`]s; the first one
//! that claims the path produces the [`FileHandle`] used for every later
//! operation. One provider exists per mounted archive (claiming paths at or
//! below the archive file) and an optional real-filesystem provider comes
//! last and claims everything else.
//!
//! Handles are read-only. Write-style calls report
//! [`StorageError::Unsupported`](crate::StorageError::Unsupported).

mod archive_provider;
mod dirs;
mod real_fs;

pub use archive_provider::{ArchiveProvider, OverlayHandle};
pub use dirs::OverlayDirs;
pub use real_fs::{RealFileHandle, RealFsProvider};

use crate::archive::ArchiveMetadata;
use crate::{Result, StorageError};
use bsafs_formats::EntryFilter;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Type and permission bits reported for a path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileFlags(pub u32);

impl FileFlags {
    /// Owner may read
    pub const READ_OWNER: u32 = 0x4000;
    /// Owner may execute / traverse
    pub const EXEC_OWNER: u32 = 0x1000;
    /// Group may read
    pub const READ_GROUP: u32 = 0x0040;
    /// Group may execute / traverse
    pub const EXEC_GROUP: u32 = 0x0010;
    /// Others may read
    pub const READ_OTHER: u32 = 0x0004;
    /// Others may execute / traverse
    pub const EXEC_OTHER: u32 = 0x0001;
    /// Every read bit
    pub const READ_ALL: u32 = Self::READ_OWNER | Self::READ_GROUP | Self::READ_OTHER;
    /// Every execute / traverse bit
    pub const EXEC_ALL: u32 = Self::EXEC_OWNER | Self::EXEC_GROUP | Self::EXEC_OTHER;

    /// Regular file
    pub const FILE: u32 = 0x0002_0000;
    /// Directory
    pub const DIRECTORY: u32 = 0x0004_0000;
    /// Path exists
    pub const EXISTS: u32 = 0x0040_0000;

    /// No flags
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Check if flag is set
    pub const fn has(self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Set flag
    pub fn set(&mut self, flag: u32) {
        self.0 |= flag;
    }

    /// Path exists
    pub const fn exists(self) -> bool {
        self.has(Self::EXISTS)
    }

    /// Path is a file
    pub const fn is_file(self) -> bool {
        self.has(Self::FILE)
    }

    /// Path is a directory (or an archive mounted as one)
    pub const fn is_dir(self) -> bool {
        self.has(Self::DIRECTORY)
    }
}

impl std::ops::BitOr<u32> for FileFlags {
    type Output = Self;

    fn bitor(self, rhs: u32) -> Self {
        Self(self.0 | rhs)
    }
}

impl fmt::Display for FileFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_dir() {
            'd'
        } else if self.is_file() {
            '-'
        } else {
            '?'
        };
        let bit = |flag: u32, c: char| if self.has(flag) { c } else { '-' };
        write!(
            f,
            "{kind}{}-{}{}-{}{}-{}",
            bit(Self::READ_OWNER, 'r'),
            bit(Self::EXEC_OWNER, 'x'),
            bit(Self::READ_GROUP, 'r'),
            bit(Self::EXEC_GROUP, 'x'),
            bit(Self::READ_OTHER, 'r'),
            bit(Self::EXEC_OTHER, 'x'),
        )
    }
}

/// Access requested when opening a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read only
    Read,
    /// Write only
    Write,
    /// Read and write
    ReadWrite,
    /// Append
    Append,
}

impl OpenMode {
    /// Mode needs no write access
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Read)
    }
}

/// Which form of a handle's path to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileNameKind {
    /// The path as requested
    Default,
    /// Last path component
    Base,
    /// Everything before the last component, as requested
    Path,
    /// Full absolute path
    Absolute,
    /// Absolute path of the containing directory
    AbsolutePath,
}

/// One operation target produced by a provider
pub trait FileHandle: Send {
    /// Type, existence and permission bits
    fn flags(&self) -> FileFlags;

    /// Names inside this directory
    fn entry_list(&self, filter: &EntryFilter) -> Vec<String>;

    /// Prepare for reading
    fn open(&mut self, mode: OpenMode) -> Result<()>;

    /// Release read state; returns whether the handle was open
    fn close(&mut self) -> bool;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Current read position
    fn pos(&self) -> u64;

    /// Move the read position
    fn seek(&mut self, pos: u64) -> Result<()>;

    /// Read up to `buf.len()` bytes
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Read up to `max_len` bytes, stopping after a newline
    fn read_line(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while line.len() < max_len {
            if self.read(&mut byte)? == 0 {
                break;
            }
            line.push(byte[0]);
            if byte[0] == b'\n' {
                break;
            }
        }
        Ok(line)
    }

    /// A form of this handle's path
    fn file_name(&self, kind: FileNameKind) -> String;

    /// Owner and timestamps
    fn metadata(&self) -> Result<ArchiveMetadata>;

    /// Whether path comparisons respect case
    fn case_sensitive(&self) -> bool {
        false
    }

    /// Whether the handle's path is relative
    fn is_relative_path(&self) -> bool {
        false
    }

    /// Write bytes
    fn write(&mut self, _buf: &[u8]) -> Result<usize> {
        Err(StorageError::Unsupported("write".to_string()))
    }

    /// Remove the file
    fn remove(&mut self) -> Result<()> {
        Err(StorageError::Unsupported("remove".to_string()))
    }

    /// Rename the file
    fn rename(&mut self, _new_name: &str) -> Result<()> {
        Err(StorageError::Unsupported("rename".to_string()))
    }

    /// Create a link to the file
    fn link(&mut self, _target: &str) -> Result<()> {
        Err(StorageError::Unsupported("link".to_string()))
    }

    /// Copy the file
    fn copy(&mut self, _target: &str) -> Result<()> {
        Err(StorageError::Unsupported("copy".to_string()))
    }

    /// Create a directory
    fn mkdir(&self, _path: &str, _create_parents: bool) -> Result<()> {
        Err(StorageError::Unsupported("mkdir".to_string()))
    }

    /// Remove a directory
    fn rmdir(&self, _path: &str, _recursive: bool) -> Result<()> {
        Err(StorageError::Unsupported("rmdir".to_string()))
    }

    /// Truncate or extend the file
    fn set_size(&mut self, _size: u64) -> Result<()> {
        Err(StorageError::Unsupported("set_size".to_string()))
    }

    /// Change permissions
    fn set_permissions(&mut self, _flags: FileFlags) -> Result<()> {
        Err(StorageError::Unsupported("set_permissions".to_string()))
    }
}

/// Source of file handles for the paths it claims
pub trait FileProvider: Send + Sync {
    /// Handle for `path`, or `None` when the path is not this provider's
    fn create(&self, path: &str) -> Option<Box<dyn FileHandle>>;

    /// Case-folded mount point, `None` for catch-all providers
    fn mount_point(&self) -> Option<&str> {
        None
    }
}

/// Ordered, first-match-wins list of providers
#[derive(Default)]
pub struct OverlayChain {
    mounts: RwLock<Vec<Arc<dyn FileProvider>>>,
    fallback: RwLock<Option<Arc<dyn FileProvider>>>,
}

impl fmt::Debug for OverlayChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mounts: Vec<Option<String>> = self
            .mounts
            .read()
            .iter()
            .map(|p| p.mount_point().map(str::to_string))
            .collect();
        f.debug_struct("OverlayChain")
            .field("mounts", &mounts)
            .field("fallback", &self.fallback.read().is_some())
            .finish()
    }
}

impl OverlayChain {
    /// Chain without providers
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain whose last provider is the real filesystem
    pub fn with_real_fs(dirs: OverlayDirs) -> Self {
        let chain = Self::new();
        chain.set_fallback(Arc::new(RealFsProvider::new(dirs)));
        chain
    }

    /// Provider consulted after every mount
    pub fn set_fallback(&self, provider: Arc<dyn FileProvider>) {
        *self.fallback.write() = Some(provider);
    }

    /// Append a provider after the existing mounts
    pub fn mount(&self, provider: Arc<dyn FileProvider>) {
        self.mounts.write().push(provider);
    }

    /// Remove every provider mounted at `mount_point`
    pub fn unmount(&self, mount_point: &str) -> bool {
        let mut mounts = self.mounts.write();
        let before = mounts.len();
        mounts.retain(|p| p.mount_point() != Some(mount_point));
        mounts.len() != before
    }

    /// Remove all mounted providers, keeping the fallback
    pub fn clear(&self) {
        self.mounts.write().clear();
    }

    /// Mount points in resolution order
    pub fn mount_points(&self) -> Vec<String> {
        self.mounts
            .read()
            .iter()
            .filter_map(|p| p.mount_point().map(str::to_string))
            .collect()
    }

    /// Handle from the first provider that claims `path`
    pub fn resolve(&self, path: &str) -> Option<Box<dyn FileHandle>> {
        let providers: Vec<Arc<dyn FileProvider>> = self
            .mounts
            .read()
            .iter()
            .cloned()
            .chain(self.fallback.read().clone())
            .collect();

        providers.iter().find_map(|provider| {
            let handle = provider.create(path)?;
            debug!(
                "{} claimed by {}",
                path,
                provider.mount_point().unwrap_or("filesystem")
            );
            Some(handle)
        })
    }

    /// Whether anything exists at `path`
    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_some_and(|h| h.flags().exists())
    }

    /// Flags for `path`, empty when unclaimed
    pub fn flags(&self, path: &str) -> FileFlags {
        self.resolve(path).map_or(FileFlags::empty(), |h| h.flags())
    }

    /// Directory listing of `path`
    pub fn list_entries(&self, path: &str, filter: &EntryFilter) -> Vec<String> {
        self.resolve(path)
            .map(|h| h.entry_list(filter))
            .unwrap_or_default()
    }

    /// Open `path` for reading
    pub fn open(&self, path: &str) -> Result<Box<dyn FileHandle>> {
        let mut handle = self
            .resolve(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        handle.open(OpenMode::Read)?;
        Ok(handle)
    }

    /// Size of `path` without opening it, 0 when unclaimed
    pub fn size(&self, path: &str) -> u64 {
        self.resolve(path).map_or(0, |h| h.size())
    }

    /// Metadata of the physical file backing `path`
    pub fn metadata(&self, path: &str) -> Result<ArchiveMetadata> {
        self.resolve(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?
            .metadata()
    }

    /// Whole contents of `path`
    pub fn read_to_end(&self, path: &str) -> Result<Vec<u8>> {
        let mut handle = self.open(path)?;
        let mut data = Vec::with_capacity(usize::try_from(handle.size()).unwrap_or(0));
        let mut chunk = [0u8; 8192];
        loop {
            let n = handle.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..n]);
        }
        handle.close();
        Ok(data)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_flags_display() {
        let dir = FileFlags::empty()
            | FileFlags::DIRECTORY
            | FileFlags::EXISTS
            | FileFlags::READ_ALL
            | FileFlags::EXEC_ALL;
        assert_eq!(dir.to_string(), "dr-xr-xr-x");

        let file = FileFlags::empty() | FileFlags::FILE | FileFlags::READ_OTHER;
        assert_eq!(file.to_string(), "-------r--");
        assert!(!file.exists());
    }

    #[test]
    fn test_open_mode() {
        assert!(OpenMode::Read.is_read_only());
        assert!(!OpenMode::Append.is_read_only());
    }

    #[test]
    fn test_empty_chain() {
        let chain = OverlayChain::new();
        assert!(!chain.exists("/anything"));
        assert!(matches!(chain.open("/anything"), Err(StorageError::NotFound(_))));
        assert_eq!(chain.size("/anything"), 0);
    }
}
