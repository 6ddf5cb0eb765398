//! Folder iteration

use super::Archive;
use bsafs_formats::{EntryFilter, normalize_path};
use std::sync::Arc;

/// Whether an iterated entry is a folder or a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Child folder
    Folder,
    /// File
    File,
}

/// One entry yielded by [`EntryIter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name within its folder
    pub name: String,
    /// Archive-relative path of the entry
    pub path: String,
    /// Folder or file
    pub kind: EntryKind,
}

impl DirEntry {
    /// Entry is a file
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Iterator over one archive folder: child folders first, then files
///
/// Keeps the archive alive while it exists.
#[derive(Debug)]
pub struct EntryIter {
    archive: Arc<Archive>,
    folder: String,
    folders: std::vec::IntoIter<String>,
    files: std::vec::IntoIter<String>,
}

impl EntryIter {
    /// Archive being iterated
    pub fn archive(&self) -> &Arc<Archive> {
        &self.archive
    }

    /// Normalized folder path being iterated
    pub fn folder(&self) -> &str {
        &self.folder
    }

    fn entry(&self, name: String, kind: EntryKind) -> DirEntry {
        let path = if self.folder.is_empty() {
            name.clone()
        } else {
            format!("{}/{name}", self.folder)
        };
        DirEntry { name, path, kind }
    }
}

impl Iterator for EntryIter {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        if let Some(name) = self.folders.next() {
            return Some(self.entry(name, EntryKind::Folder));
        }
        let name = self.files.next()?;
        Some(self.entry(name, EntryKind::File))
    }
}

impl Archive {
    /// Iterate a folder's entries
    ///
    /// Folder names honour the filter's folder selection only; file names are
    /// also matched against its wildcards.
    pub fn entries(self: &Arc<Self>, path: &str, filter: &EntryFilter) -> EntryIter {
        let folders = self.entry_list(path, &filter.dirs_part());
        let files = self.entry_list(path, &filter.files_part());

        EntryIter {
            archive: Arc::clone(self),
            folder: normalize_path(path),
            folders: folders.into_iter(),
            files: files.into_iter(),
        }
    }
}
