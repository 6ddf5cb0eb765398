//! Fallback provider backed by the real filesystem

use super::{FileFlags, FileHandle, FileNameKind, FileProvider, OpenMode, OverlayDirs};
use crate::archive::{ArchiveMetadata, mount_key};
use crate::{Result, StorageError};
use bsafs_formats::EntryFilter;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Claims every path and serves it from disk
///
/// Directory listings also report the archives mounted in that directory,
/// as recorded in the shared [`OverlayDirs`].
#[derive(Debug, Clone, Default)]
pub struct RealFsProvider {
    dirs: OverlayDirs,
}

impl RealFsProvider {
    /// Provider consulting `dirs` for mounted archives
    pub fn new(dirs: OverlayDirs) -> Self {
        Self { dirs }
    }
}

impl FileProvider for RealFsProvider {
    fn create(&self, path: &str) -> Option<Box<dyn FileHandle>> {
        Some(Box::new(RealFileHandle::new(path, self.dirs.clone())))
    }
}

/// Read-only handle on a file or directory on disk
#[derive(Debug)]
pub struct RealFileHandle {
    path: PathBuf,
    dirs: OverlayDirs,
    file: Option<BufReader<File>>,
    pos: u64,
}

impl RealFileHandle {
    /// Handle for `path`
    pub fn new(path: impl AsRef<Path>, dirs: OverlayDirs) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            dirs,
            file: None,
            pos: 0,
        }
    }

    /// Path on disk
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_mounted_archive(&self) -> bool {
        let Some(name) = self.path.file_name() else {
            return false;
        };
        let base = self.path.parent().map(mount_key).unwrap_or_default();
        self.dirs
            .contains(&base, &name.to_string_lossy().to_lowercase())
    }

    fn file(&mut self) -> Result<&mut BufReader<File>> {
        let path = &self.path;
        self.file
            .as_mut()
            .ok_or_else(|| StorageError::NotOpen(path.display().to_string()))
    }
}

fn permission_flags(metadata: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        [
            (0o400_u32, FileFlags::READ_OWNER),
            (0o100, FileFlags::EXEC_OWNER),
            (0o040, FileFlags::READ_GROUP),
            (0o010, FileFlags::EXEC_GROUP),
            (0o004, FileFlags::READ_OTHER),
            (0o001, FileFlags::EXEC_OTHER),
        ]
        .iter()
        .filter(|(bit, _)| mode & bit != 0)
        .fold(0, |flags, (_, flag)| flags | flag)
    }
    #[cfg(not(unix))]
    {
        if metadata.is_dir() {
            FileFlags::READ_ALL | FileFlags::EXEC_ALL
        } else {
            FileFlags::READ_ALL
        }
    }
}

impl FileHandle for RealFileHandle {
    fn flags(&self) -> FileFlags {
        let mut flags = FileFlags::empty();
        if let Ok(metadata) = fs::metadata(&self.path) {
            flags.set(FileFlags::EXISTS | permission_flags(&metadata));
            if metadata.is_dir() {
                flags.set(FileFlags::DIRECTORY);
            } else {
                flags.set(FileFlags::FILE);
            }
        }
        if self.is_mounted_archive() {
            flags.set(FileFlags::DIRECTORY | FileFlags::EXEC_ALL);
        }
        flags
    }

    fn entry_list(&self, filter: &EntryFilter) -> Vec<String> {
        let Ok(read_dir) = fs::read_dir(&self.path) else {
            return Vec::new();
        };

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in read_dir.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }

        let mounted = self.dirs.names(&mount_key(&self.path));
        files.retain(|name| !mounted.contains(&name.to_lowercase()));
        for name in mounted {
            if !dirs.iter().any(|d| d.to_lowercase() == name) {
                dirs.push(name);
            }
        }

        dirs.sort_by_key(|name| name.to_lowercase());
        files.sort_by_key(|name| name.to_lowercase());

        let mut list = Vec::new();
        if filter.includes_dirs() {
            list.extend(dirs);
        }
        if filter.includes_files() {
            list.extend(files.into_iter().filter(|name| filter.matches_name(name)));
        }
        list
    }

    fn open(&mut self, mode: OpenMode) -> Result<()> {
        if !mode.is_read_only() {
            return Err(StorageError::Unsupported(format!(
                "{mode:?} access to {}",
                self.path.display()
            )));
        }
        self.file = Some(BufReader::new(File::open(&self.path)?));
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) -> bool {
        self.pos = 0;
        self.file.take().is_some()
    }

    fn size(&self) -> u64 {
        fs::metadata(&self.path).map_or(0, |m| if m.is_file() { m.len() } else { 0 })
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        let len = self.size();
        if pos > len {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {pos} beyond end {len}"),
            )));
        }
        self.file()?.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.file()?.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn file_name(&self, kind: FileNameKind) -> String {
        let absolute = || std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        let text = |path: &Path| path.to_string_lossy().into_owned();
        match kind {
            FileNameKind::Default => text(&self.path),
            FileNameKind::Base => self
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            FileNameKind::Path => self.path.parent().map(text).unwrap_or_default(),
            FileNameKind::Absolute => text(&absolute()),
            FileNameKind::AbsolutePath => absolute().parent().map(text).unwrap_or_default(),
        }
    }

    fn metadata(&self) -> Result<ArchiveMetadata> {
        Ok(ArchiveMetadata::from_std(&fs::metadata(&self.path)?))
    }

    fn case_sensitive(&self) -> bool {
        cfg!(unix)
    }

    fn is_relative_path(&self) -> bool {
        self.path.is_relative()
    }
}
