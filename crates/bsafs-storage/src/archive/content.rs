//! Entry reads

use super::Archive;
use crate::{Result, StorageError};
use bsafs_formats::{FileEntry, inflate_entry};
use std::io::{self, Read, Seek, SeekFrom};
use tracing::debug;

impl Archive {
    /// Directory entry for a file
    pub fn entry(&self, path: &str) -> Option<FileEntry> {
        self.parsed()
            .and_then(|parsed| parsed.tree.file(path).copied())
    }

    /// Stored size of a file, 0 when absent
    ///
    /// For compressed entries this is the on-disk size, not the size
    /// [`Archive::read`] returns.
    pub fn file_size(&self, path: &str) -> u64 {
        self.entry(path)
            .map_or(0, |entry| u64::from(entry.size()))
    }

    /// Whether reading the file inflates its payload
    pub fn is_compressed(&self, path: &str) -> bool {
        self.parsed().is_some_and(|parsed| {
            parsed
                .tree
                .file(path)
                .is_some_and(|entry| entry.compressed() != parsed.compressed_by_default())
        })
    }

    /// Read a file's contents, decompressing if needed
    ///
    /// Only the seek and the raw read happen under the archive's read mutex;
    /// decompression runs after it is released.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let parsed = self
            .parsed()
            .ok_or_else(|| StorageError::NotOpen(self.path_key.clone()))?;
        let entry = parsed
            .tree
            .file(path)
            .copied()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;

        let mut stored = Vec::new();
        {
            let mut reader = self.reader.lock();
            let file = reader
                .file
                .as_mut()
                .ok_or_else(|| StorageError::NotOpen(self.path_key.clone()))?;
            file.seek(SeekFrom::Start(entry.offset))?;
            file.by_ref()
                .take(u64::from(entry.size()))
                .read_to_end(&mut stored)?;
        }
        if stored.len() as u64 != u64::from(entry.size()) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{path}: entry runs past the end of the archive"),
            )));
        }

        let payload = if parsed.embedded_names() {
            strip_embedded_name(&stored)?
        } else {
            stored.as_slice()
        };

        if entry.compressed() != parsed.compressed_by_default() {
            Ok(inflate_entry(payload)?)
        } else if payload.len() == stored.len() {
            Ok(stored)
        } else {
            Ok(payload.to_vec())
        }
    }

    /// Read a file into `out`, reporting failure as `false`
    ///
    /// `out` is left untouched on failure.
    pub fn file_contents(&self, path: &str, out: &mut Vec<u8>) -> bool {
        match self.read(path) {
            Ok(data) => {
                *out = data;
                true
            }
            Err(e) => {
                debug!("Reading {} from {} failed: {e}", path, self.path_key);
                false
            }
        }
    }
}

/// Skip the length-prefixed path some archives store ahead of each payload
fn strip_embedded_name(stored: &[u8]) -> Result<&[u8]> {
    stored
        .split_first()
        .and_then(|(len, rest)| rest.get(usize::from(*len)..))
        .ok_or_else(|| {
            StorageError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "embedded file name longer than entry",
            ))
        })
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use bsafs_test_utils::{ModernArchiveBuilder, TempArchive, sword_archive, sword_dds, sword_nif};

    fn open(name: &str, image: &[u8]) -> (TempArchive, Archive) {
        let temp = TempArchive::write(name, image).unwrap();
        let archive = Archive::new(&temp.path);
        archive.open().unwrap();
        (temp, archive)
    }

    #[test]
    fn test_sizes_are_stored_sizes() {
        let (_temp, archive) = open("sword.bsa", &sword_archive());
        assert_eq!(archive.file_size("meshes/sword.nif"), 100);
        assert_eq!(archive.file_size("textures/sword.dds"), 2048);
        assert_eq!(archive.file_size("textures/missing.dds"), 0);
    }

    #[test]
    fn test_read_plain_and_compressed() {
        let (_temp, archive) = open("sword.bsa", &sword_archive());
        assert!(!archive.is_compressed("meshes/sword.nif"));
        assert!(archive.is_compressed("textures/sword.dds"));

        assert_eq!(archive.read("meshes/sword.nif").unwrap(), sword_nif());
        let dds = archive.read("Textures\\Sword.dds").unwrap();
        assert_eq!(dds, sword_dds());
        assert_ne!(dds.len(), 2048);
    }

    #[test]
    fn test_entry_past_end_of_file() {
        let (temp, archive) = open("sword.bsa", &sword_archive());
        let entry = archive.entry("meshes/sword.nif").unwrap();
        std::fs::OpenOptions::new()
            .write(true)
            .open(&temp.path)
            .unwrap()
            .set_len(entry.offset + 10)
            .unwrap();

        let err = archive.read("meshes/sword.nif").unwrap_err();
        assert!(matches!(&err, StorageError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
        let mut out = Vec::new();
        assert!(!archive.file_contents("meshes/sword.nif", &mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn test_file_contents_bool_surface() {
        let (_temp, archive) = open("sword.bsa", &sword_archive());
        let mut out = vec![0xAA];
        assert!(!archive.file_contents("meshes/missing.nif", &mut out));
        assert_eq!(out, vec![0xAA]);
        assert!(archive.file_contents("meshes/sword.nif", &mut out));
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn test_read_requires_open() {
        let temp = TempArchive::write("sword.bsa", &sword_archive()).unwrap();
        let archive = Archive::new(&temp.path);
        assert!(matches!(
            archive.read("meshes/sword.nif"),
            Err(StorageError::NotOpen(_))
        ));
        assert!(!archive.file_contents("meshes/sword.nif", &mut Vec::new()));
    }

    #[test]
    fn test_embedded_names_are_skipped() {
        let image = ModernArchiveBuilder::new()
            .version(0x68)
            .embedded_names(true)
            .file("meshes", "plain.nif", b"plain bytes")
            .compressed_file("textures", "packed.dds", &[3; 3000])
            .build();
        let (_temp, archive) = open("fo3.bsa", &image);

        assert_eq!(archive.read("meshes/plain.nif").unwrap(), b"plain bytes");
        assert_eq!(archive.read("textures/packed.dds").unwrap(), vec![3; 3000]);
    }

    #[test]
    fn test_embedded_flag_ignored_on_first_version() {
        // Bit 8 only means embedded names on version 0x68
        let image = ModernArchiveBuilder::new()
            .archive_flags(0x103)
            .file("meshes", "a.nif", b"abc")
            .build();
        let (_temp, archive) = open("tes4.bsa", &image);
        assert_eq!(archive.read("meshes/a.nif").unwrap(), b"abc");
    }

    #[test]
    fn test_corrupt_payload_is_decompression_error() {
        let image = ModernArchiveBuilder::new()
            .raw_file("textures", "bad.dds", vec![0x10, 0, 0, 0, 0xde, 0xad], true)
            .build();
        let (_temp, archive) = open("bad.bsa", &image);
        assert!(matches!(
            archive.read("textures/bad.dds"),
            Err(StorageError::Decompression(_))
        ));
    }
}
