//! Provider serving paths inside one mounted archive

use super::{FileFlags, FileHandle, FileNameKind, FileProvider, OpenMode, OverlayDirs};
use crate::archive::{Archive, ArchiveMetadata};
use crate::{Result, StorageError};
use bsafs_formats::EntryFilter;
use std::io;
use std::sync::Arc;
use tracing::debug;

/// Claims every path at or below its archive's file path
///
/// While it exists, the archive is listed as a pseudo-directory of the real
/// directory that contains it.
#[derive(Debug)]
pub struct ArchiveProvider {
    archive: Arc<Archive>,
    dirs: OverlayDirs,
}

impl ArchiveProvider {
    /// Mount `archive` and register it in `dirs`
    pub fn new(archive: Arc<Archive>, dirs: OverlayDirs) -> Self {
        dirs.register(archive.base_key(), archive.name_key());
        Self { archive, dirs }
    }

    /// Mounted archive
    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }
}

impl Drop for ArchiveProvider {
    fn drop(&mut self) {
        self.dirs
            .unregister(self.archive.base_key(), self.archive.name_key());
    }
}

impl FileProvider for ArchiveProvider {
    fn create(&self, path: &str) -> Option<Box<dyn FileHandle>> {
        let relative = self.archive.strip_base_path(path)?;
        Some(Box::new(OverlayHandle::new(
            Arc::clone(&self.archive),
            path,
            relative,
        )))
    }

    fn mount_point(&self) -> Option<&str> {
        Some(self.archive.path_key())
    }
}

/// Handle on one path inside an archive
///
/// Opening reads and decompresses the whole entry; reads and seeks then work
/// on that buffer.
#[derive(Debug)]
pub struct OverlayHandle {
    archive: Arc<Archive>,
    original: String,
    relative: String,
    data: Option<Vec<u8>>,
    pos: u64,
}

impl OverlayHandle {
    /// Handle for `relative` inside `archive`, requested as `original`
    pub fn new(archive: Arc<Archive>, original: &str, relative: String) -> Self {
        debug!("archive handle: org {} rel {}", original, relative);
        Self {
            archive,
            original: original.replace('\\', "/"),
            relative,
            data: None,
            pos: 0,
        }
    }

    /// Archive-relative path
    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    /// Archive this handle keeps alive
    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }

    fn data(&self) -> Result<&[u8]> {
        self.data
            .as_deref()
            .ok_or_else(|| StorageError::NotOpen(self.original.clone()))
    }
}

impl FileHandle for OverlayHandle {
    fn flags(&self) -> FileFlags {
        let mut flags = FileFlags::empty();
        if self.archive.has_file(&self.relative) {
            flags.set(FileFlags::FILE | FileFlags::READ_ALL | FileFlags::EXISTS);
        }
        if self.archive.has_folder(&self.relative) {
            flags.set(
                FileFlags::DIRECTORY | FileFlags::READ_ALL | FileFlags::EXEC_ALL | FileFlags::EXISTS,
            );
        }
        flags
    }

    fn entry_list(&self, filter: &EntryFilter) -> Vec<String> {
        self.archive.entry_list(&self.relative, filter)
    }

    fn open(&mut self, mode: OpenMode) -> Result<()> {
        if !mode.is_read_only() {
            return Err(StorageError::Unsupported(format!(
                "{mode:?} access to {}",
                self.original
            )));
        }
        if self.data.is_some() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "handle already open",
            )));
        }
        self.data = Some(self.archive.read(&self.relative)?);
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self) -> bool {
        self.pos = 0;
        self.data.take().is_some()
    }

    fn size(&self) -> u64 {
        match &self.data {
            Some(data) => data.len() as u64,
            None => self.archive.file_size(&self.relative),
        }
    }

    fn pos(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        let len = self.data()?.len() as u64;
        if pos > len {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek to {pos} beyond end {len}"),
            )));
        }
        self.pos = pos;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pos = usize::try_from(self.pos).unwrap_or(usize::MAX);
        let data = self.data()?;
        let available = data.get(pos..).unwrap_or_default();
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        Ok(n)
    }

    fn file_name(&self, kind: FileNameKind) -> String {
        match kind {
            FileNameKind::Base => self
                .original
                .rsplit_once('/')
                .map_or(self.original.as_str(), |(_, base)| base)
                .to_string(),
            FileNameKind::Path => self
                .original
                .rsplit_once('/')
                .map_or(self.original.as_str(), |(dir, _)| dir)
                .to_string(),
            FileNameKind::AbsolutePath => {
                let mut absolute = self.archive.path_key().to_string();
                if !self.relative.is_empty() {
                    absolute.push('/');
                    absolute.push_str(&self.relative);
                }
                absolute
                    .rsplit_once('/')
                    .map_or(absolute.as_str(), |(dir, _)| dir)
                    .to_string()
            }
            FileNameKind::Default | FileNameKind::Absolute => self.original.clone(),
        }
    }

    fn metadata(&self) -> Result<ArchiveMetadata> {
        self.archive.metadata()
    }
}

impl io::Read for OverlayHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        FileHandle::read(self, buf).map_err(|e| match e {
            StorageError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        })
    }
}

impl io::Seek for OverlayHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let len = self.data.as_ref().map_or(0, Vec::len) as i128;
        let target = match pos {
            io::SeekFrom::Start(offset) => i128::from(offset),
            io::SeekFrom::End(offset) => len + i128::from(offset),
            io::SeekFrom::Current(offset) => i128::from(self.pos) + i128::from(offset),
        };
        let target = u64::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        FileHandle::seek(self, target).map_err(|e| match e {
            StorageError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        })?;
        Ok(target)
    }
}
