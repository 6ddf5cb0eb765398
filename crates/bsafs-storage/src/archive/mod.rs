//! Mounted archive files
//!
//! An [`Archive`] owns exactly one OS read handle. Every read against it,
//! including the ones the parser makes while opening, goes through one mutex,
//! so concurrent callers block instead of fighting over the file position.
//! The directory index is built by `open()` and never changes afterwards;
//! lookups take a cheap shared reference to it and do not touch the mutex.
//!
//! Archives are shared as `Arc<Archive>`. The registry holds one reference
//! and every overlay handle or entry iterator holds another, so the file
//! handle is released when the last of them is dropped.

mod content;
mod iter;

pub use iter::{DirEntry, EntryIter, EntryKind};

use crate::{Result, STATUS_FILE_OPEN, STATUS_INITIALIZED, STATUS_LOADED, StorageError};
use bsafs_formats::{ArchiveHeader, ArchiveParser, EntryFilter, ParsedArchive, normalize_path, probe};
use parking_lot::{Mutex, RwLock};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Lifecycle of a mounted archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    /// Constructed, nothing read
    Created,
    /// Opening the file and checking its leading bytes
    Probing,
    /// Parsing the directory
    Opening,
    /// Directory loaded, reads allowed
    Open,
    /// Probe or parse failed; see the status text
    OpenFailed,
    /// Explicitly closed, index discarded
    Closed,
}

/// OS metadata of the physical archive file
///
/// The format carries no per-entry timestamps, so every entry reports the
/// archive's own metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMetadata {
    /// Archive file size in bytes
    pub len: u64,
    /// Last modification time
    pub modified: Option<SystemTime>,
    /// Last access time
    pub accessed: Option<SystemTime>,
    /// Creation time, where the platform records it
    pub created: Option<SystemTime>,
    /// Owning user id (unix only)
    pub owner_id: Option<u32>,
    /// Owning group id (unix only)
    pub group_id: Option<u32>,
}

impl ArchiveMetadata {
    pub(crate) fn from_std(metadata: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let (owner_id, group_id) = {
            use std::os::unix::fs::MetadataExt;
            (Some(metadata.uid()), Some(metadata.gid()))
        };
        #[cfg(not(unix))]
        let (owner_id, group_id) = (None, None);

        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
            accessed: metadata.accessed().ok(),
            created: metadata.created().ok(),
            owner_id,
            group_id,
        }
    }
}

/// Case-folded, slash-separated form of a filesystem path
///
/// Used for every comparison between request paths and mount points.
pub fn mount_key(path: &Path) -> String {
    let key = path.to_string_lossy().replace('\\', "/").to_lowercase();
    match key.trim_end_matches('/') {
        "" if key.starts_with('/') => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

struct ReadState {
    file: Option<BufReader<File>>,
    state: ArchiveState,
}

/// A mounted archive
pub struct Archive {
    path: PathBuf,
    path_key: String,
    base_key: String,
    name_key: String,
    reader: Mutex<ReadState>,
    index: RwLock<Option<Arc<ParsedArchive>>>,
    status: RwLock<String>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("state", &self.reader.try_lock().map(|reader| reader.state))
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

impl Archive {
    /// Describe an archive file without touching it
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let path_key = mount_key(&path);
        let base_key = path.parent().map(mount_key).unwrap_or_default();
        let name_key = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        debug!("Archive {} base {} path {}", name_key, base_key, path_key);

        Self {
            path,
            path_key,
            base_key,
            name_key,
            reader: Mutex::new(ReadState {
                file: None,
                state: ArchiveState::Created,
            }),
            index: RwLock::new(None),
            status: RwLock::new(STATUS_INITIALIZED.to_string()),
        }
    }

    /// Whether `path` starts like a supported archive
    ///
    /// Reads at most eight bytes and closes the file again.
    pub fn can_open(path: impl AsRef<Path>) -> bool {
        File::open(path.as_ref())
            .ok()
            .and_then(|mut file| probe(&mut file))
            .is_some()
    }

    /// Open the archive and build its directory index
    ///
    /// On failure the archive keeps no index and its status text names the
    /// failing stage. Opening an open archive re-reads it.
    pub fn open(&self) -> Result<()> {
        let mut reader = self.reader.lock();
        reader.file = None;
        *self.index.write() = None;

        reader.state = ArchiveState::Probing;
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) => {
                reader.state = ArchiveState::OpenFailed;
                self.set_status(STATUS_FILE_OPEN);
                warn!("Failed to open archive {}: {e}", self.path.display());
                return Err(StorageError::Io(e));
            }
        };

        reader.state = ArchiveState::Opening;
        let mut parser = ArchiveParser::new(BufReader::new(file));
        match parser.parse() {
            Ok(parsed) => {
                info!(
                    "Opened archive {} ({} folders, {} files)",
                    self.path.display(),
                    parsed.tree.folder_count() - 1,
                    parsed.tree.file_count()
                );
                reader.file = Some(parser.into_inner());
                *self.index.write() = Some(Arc::new(parsed));
                reader.state = ArchiveState::Open;
                self.set_status(STATUS_LOADED);
                Ok(())
            }
            Err(e) => {
                reader.state = ArchiveState::OpenFailed;
                self.set_status(e.stage().label());
                warn!("Failed to parse archive {}: {e}", self.path.display());
                Err(StorageError::Format(e))
            }
        }
    }

    /// Release the read handle and discard the index
    pub fn close(&self) {
        let mut reader = self.reader.lock();
        reader.file = None;
        *self.index.write() = None;
        if reader.state == ArchiveState::Open {
            reader.state = ArchiveState::Closed;
            debug!("Closed archive {}", self.path_key);
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ArchiveState {
        self.reader.lock().state
    }

    /// Whether reads are currently allowed
    pub fn is_open(&self) -> bool {
        self.index.read().is_some()
    }

    /// Human-readable result of the last open
    pub fn status_text(&self) -> String {
        self.status.read().clone()
    }

    fn set_status(&self, status: &str) {
        status.clone_into(&mut self.status.write());
    }

    /// Absolute path of the archive file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Case-folded absolute path, the mount point for overlay lookups
    pub fn path_key(&self) -> &str {
        &self.path_key
    }

    /// Case-folded directory containing the archive
    pub fn base_key(&self) -> &str {
        &self.base_key
    }

    /// Case-folded file name of the archive
    pub fn name_key(&self) -> &str {
        &self.name_key
    }

    /// Header summary of the open archive
    pub fn header(&self) -> Option<ArchiveHeader> {
        self.parsed().map(|parsed| parsed.header)
    }

    /// Shared reference to the directory index, `None` unless open
    pub fn parsed(&self) -> Option<Arc<ParsedArchive>> {
        self.index.read().clone()
    }

    /// Archive-relative form of an absolute request path
    ///
    /// Returns `None` unless the case-folded path is the archive path itself
    /// or lies below it.
    pub fn strip_base_path(&self, path: &str) -> Option<String> {
        let key = path.replace('\\', "/").to_lowercase();
        let rest = key.strip_prefix(&self.path_key)?;
        if rest.is_empty() {
            return Some(String::new());
        }
        rest.strip_prefix('/').map(normalize_path)
    }

    /// Path names a file in the archive
    pub fn has_file(&self, path: &str) -> bool {
        self.parsed().is_some_and(|parsed| parsed.tree.has_file(path))
    }

    /// Path names a folder in the archive (the empty path is the root)
    pub fn has_folder(&self, path: &str) -> bool {
        self.parsed().is_some_and(|parsed| parsed.tree.has_folder(path))
    }

    /// Child folders and/or files of an archive folder
    pub fn entry_list(&self, path: &str, filter: &EntryFilter) -> Vec<String> {
        self.parsed()
            .map(|parsed| parsed.tree.entry_list(path, filter))
            .unwrap_or_default()
    }

    /// Archive path joined with a file's relative path, empty when absent
    pub fn absolute_file_path(&self, path: &str) -> String {
        if self.has_file(path) {
            format!(
                "{}/{}",
                self.path.to_string_lossy().replace('\\', "/"),
                normalize_path(path)
            )
        } else {
            String::new()
        }
    }

    /// OS metadata of the physical archive file
    pub fn metadata(&self) -> Result<ArchiveMetadata> {
        let metadata = std::fs::metadata(&self.path)?;
        Ok(ArchiveMetadata::from_std(&metadata))
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        debug!("Releasing archive {}", self.path_key);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use bsafs_test_utils::{ModernArchiveBuilder, TempArchive, sword_archive};

    #[test]
    fn test_mount_key() {
        assert_eq!(mount_key(Path::new("C:\\Games\\Data\\")), "c:/games/data");
        assert_eq!(mount_key(Path::new("/Games/Data/Meshes.BSA")), "/games/data/meshes.bsa");
        assert_eq!(mount_key(Path::new("/")), "/");
    }

    #[test]
    fn test_names_and_status_before_open() {
        let temp = TempArchive::write("Sword.BSA", &sword_archive()).unwrap();
        let archive = Archive::new(&temp.path);

        assert_eq!(archive.name_key(), "sword.bsa");
        assert_eq!(archive.base_key(), mount_key(temp.base()));
        assert_eq!(archive.status_text(), "initialized");
        assert_eq!(archive.state(), ArchiveState::Created);
        assert!(!archive.has_folder(""));
        assert!(Archive::can_open(&temp.path));
    }

    #[test]
    fn test_open_and_close() {
        let temp = TempArchive::write("sword.bsa", &sword_archive()).unwrap();
        let archive = Archive::new(&temp.path);

        archive.open().unwrap();
        assert_eq!(archive.state(), ArchiveState::Open);
        assert_eq!(archive.status_text(), "loaded successful");
        assert!(archive.has_file("Meshes\\Sword.nif"));
        assert!(archive.has_folder("textures"));

        archive.close();
        assert_eq!(archive.state(), ArchiveState::Closed);
        assert!(!archive.has_file("meshes/sword.nif"));
        assert!(archive.entry_list("", &EntryFilter::all()).is_empty());
    }

    #[test]
    fn test_failed_open_records_stage() {
        let image = ModernArchiveBuilder::new()
            .file("meshes", "a.nif", b"a")
            .declared_file_count(7)
            .build();
        let temp = TempArchive::write("broken.bsa", &image).unwrap();
        let archive = Archive::new(&temp.path);

        assert!(Archive::can_open(&temp.path));
        assert!(archive.open().is_err());
        assert_eq!(archive.state(), ArchiveState::OpenFailed);
        assert_eq!(archive.status_text(), "file count");
        assert!(!archive.has_file("meshes/a.nif"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::new(dir.path().join("nothing.bsa"));
        assert!(!Archive::can_open(archive.path()));
        assert!(matches!(archive.open(), Err(StorageError::Io(_))));
        assert_eq!(archive.status_text(), "file open");
    }

    #[test]
    fn test_strip_base_path() {
        let temp = TempArchive::write("sword.bsa", &sword_archive()).unwrap();
        let archive = Archive::new(&temp.path);
        let base = temp.path.to_string_lossy().to_uppercase();

        assert_eq!(archive.strip_base_path(&base), Some(String::new()));
        assert_eq!(
            archive.strip_base_path(&format!("{base}/Meshes/Sword.nif")),
            Some("meshes/sword.nif".to_string())
        );
        assert_eq!(archive.strip_base_path(&format!("{base}x/meshes")), None);
        assert_eq!(archive.strip_base_path("/elsewhere/meshes"), None);
    }

    #[test]
    fn test_absolute_file_path() {
        let temp = TempArchive::write("sword.bsa", &sword_archive()).unwrap();
        let archive = Archive::new(&temp.path);
        archive.open().unwrap();

        let absolute = archive.absolute_file_path("MESHES/sword.nif");
        assert!(absolute.ends_with("sword.bsa/meshes/sword.nif"));
        assert!(archive.absolute_file_path("meshes/missing.nif").is_empty());
    }

    #[test]
    fn test_metadata_is_archive_file_metadata() {
        let temp = TempArchive::write("sword.bsa", &sword_archive()).unwrap();
        let archive = Archive::new(&temp.path);
        let metadata = archive.metadata().unwrap();
        assert_eq!(metadata.len, sword_archive().len() as u64);
        assert!(metadata.modified.is_some());
    }
}
