//! Archive directory parser
//!
//! [`ArchiveParser`] walks an archive's header region and builds its
//! [`DirectoryTree`]. It is a small state machine:
//!
//! ```text
//! Unopened -> ReadingHeader -> ReadingFolderRecords / ReadingFileNames
//!          -> ReadingPerFolderFiles -> Built | Failed
//! ```
//!
//! Parsing is all-or-nothing: the tree is only handed out when every stage
//! succeeded, so a failed parse never exposes a partial index.

use crate::error::{FormatError, FormatResult, Stage, StageExt};
use crate::header::{
    ArchiveHeader, BSA_MAGIC, LEGACY_MAGIC, LegacyHeader, ModernHeader, SUPPORTED_VERSIONS,
};
use crate::records::{FileRecord, FolderRecord, LegacySizeOffset, SizeFlags};
use crate::tree::{DirectoryTree, FileEntry};
use binrw::{BinRead, BinResult};
use std::io::{Read, Seek, SeekFrom};

/// Parser progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Nothing read yet
    Unopened,
    /// Reading magic, version and header body
    ReadingHeader,
    /// Reading folder records (size/offset table for legacy archives)
    ReadingFolderRecords,
    /// Reading the file-name table
    ReadingFileNames,
    /// Reading folder names and file records into the tree
    ReadingPerFolderFiles,
    /// Tree complete
    Built,
    /// A stage failed, no tree is available
    Failed,
}

/// Result of a successful parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArchive {
    /// Header summary
    pub header: ArchiveHeader,
    /// Complete folder tree
    pub tree: DirectoryTree,
}

impl ParsedArchive {
    /// Entries are compressed unless toggled
    pub fn compressed_by_default(&self) -> bool {
        self.header.compressed_by_default()
    }

    /// Payloads carry a length-prefixed copy of their path
    pub fn embedded_names(&self) -> bool {
        self.header.embedded_names()
    }
}

/// Stateful archive parser over a seekable reader
#[derive(Debug)]
pub struct ArchiveParser<R> {
    reader: R,
    state: ParseState,
}

impl<R: Read + Seek> ArchiveParser<R> {
    /// Wrap a reader positioned anywhere; parsing starts from offset 0
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ParseState::Unopened,
        }
    }

    /// Current state
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Give the reader back
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Parse the archive directory
    pub fn parse(&mut self) -> FormatResult<ParsedArchive> {
        self.state = ParseState::ReadingHeader;
        match self.parse_archive() {
            Ok(parsed) => {
                self.state = ParseState::Built;
                Ok(parsed)
            }
            Err(e) => {
                self.state = ParseState::Failed;
                Err(e)
            }
        }
    }

    fn parse_archive(&mut self) -> FormatResult<ParsedArchive> {
        self.reader.seek(SeekFrom::Start(0)).at(Stage::FileMagic)?;
        let magic = u32::read_le(&mut self.reader).at(Stage::FileMagic)?;

        match magic {
            BSA_MAGIC => {
                let version = u32::read_le(&mut self.reader).at(Stage::FileVersion)?;
                if !SUPPORTED_VERSIONS.contains(&version) {
                    return Err(FormatError::UnsupportedVersion(version));
                }
                self.parse_modern(version)
            }
            LEGACY_MAGIC => self.parse_legacy(),
            other => Err(FormatError::BadMagic(other)),
        }
    }

    fn parse_modern(&mut self, version: u32) -> FormatResult<ParsedArchive> {
        let header = ModernHeader::read(&mut self.reader).at(Stage::HeaderSize)?;
        header.validate()?;

        self.state = ParseState::ReadingFileNames;
        self.reader
            .seek(SeekFrom::Start(header.file_name_table_offset()))
            .at(Stage::FileNameSeek)?;
        let names = read_bytes(&mut self.reader, u64::from(header.file_name_length))
            .at(Stage::FileNameRead)?;

        self.state = ParseState::ReadingFolderRecords;
        self.reader
            .seek(SeekFrom::Start(u64::from(header.folder_record_offset)))
            .at(Stage::FolderInfoSeek)?;
        let folders = read_records::<FolderRecord, _>(&mut self.reader, header.folder_count)
            .at(Stage::FolderInfoRead)?;

        // Folder blocks follow the folder records back to back
        self.state = ParseState::ReadingPerFolderFiles;
        let mut tree = DirectoryTree::new();
        let mut names = NameCursor::new(&names);
        let mut total: u64 = 0;

        for record in &folders {
            let folder_name = read_bstring(&mut self.reader).at(Stage::FolderNameRead)?;
            if folder_name.is_empty() {
                return Err(FormatError::EmptyFolderName);
            }
            let folder = tree.insert_folder(&folder_name);
            total += u64::from(record.file_count);

            for _ in 0..record.file_count {
                let file = FileRecord::read(&mut self.reader).at(Stage::FileInfoRead)?;
                let file_name = names.next_name()?;
                tree.insert_file(
                    folder,
                    &file_name,
                    FileEntry::new(file.size_flags, u64::from(file.offset)),
                );
            }
        }

        if total != u64::from(header.file_count) {
            return Err(FormatError::FileCountMismatch {
                declared: header.file_count,
                actual: total,
            });
        }

        Ok(ParsedArchive {
            header: ArchiveHeader::modern(version, &header),
            tree,
        })
    }

    fn parse_legacy(&mut self) -> FormatResult<ParsedArchive> {
        let header = LegacyHeader::read(&mut self.reader).at(Stage::LegacyHeader)?;
        let names_length = header.names_length().ok_or(FormatError::NameTableSize {
            hash_offset: header.hash_offset,
            file_count: header.file_count,
        })?;

        self.state = ParseState::ReadingFolderRecords;
        let sizes = read_records::<LegacySizeOffset, _>(&mut self.reader, header.file_count)
            .at(Stage::FileSizeOffset)?;
        let name_offsets =
            read_records::<u32, _>(&mut self.reader, header.file_count).at(Stage::FileNameOffset)?;

        self.state = ParseState::ReadingFileNames;
        let names =
            read_bytes(&mut self.reader, u64::from(names_length)).at(Stage::FileNames)?;

        self.state = ParseState::ReadingPerFolderFiles;
        let data_offset = header.data_offset();
        let mut tree = DirectoryTree::new();

        for (index, (size_offset, name_offset)) in sizes.iter().zip(&name_offsets).enumerate() {
            let full_name = names
                .get(*name_offset as usize..)
                .filter(|rest| !rest.is_empty())
                .map(c_string)
                .ok_or(FormatError::NameOffset {
                    index,
                    offset: *name_offset,
                })?;

            // Only the last backslash separates folder from file
            let (folder_name, file_name) = match full_name.rfind('\\') {
                Some(split) if split > 0 => (&full_name[..split], &full_name[split + 1..]),
                _ => ("", full_name.as_str()),
            };

            let folder = tree.insert_folder(folder_name);
            tree.insert_file(
                folder,
                file_name,
                FileEntry::new(
                    SizeFlags::new(size_offset.size),
                    data_offset + u64::from(size_offset.offset),
                ),
            );
        }

        let mut summary = ArchiveHeader::legacy(&header, names_length);
        summary.folder_count = u32::try_from(tree.folder_count() - 1).unwrap_or(u32::MAX);

        Ok(ParsedArchive {
            header: summary,
            tree,
        })
    }
}

/// Parse an archive directory from a seekable reader
pub fn parse_archive<R: Read + Seek>(reader: R) -> FormatResult<ParsedArchive> {
    ArchiveParser::new(reader).parse()
}

/// Sequential cursor over a table of NUL-terminated names
struct NameCursor<'a> {
    table: &'a [u8],
    pos: usize,
}

impl<'a> NameCursor<'a> {
    fn new(table: &'a [u8]) -> Self {
        Self { table, pos: 0 }
    }

    fn next_name(&mut self) -> FormatResult<String> {
        let rest = self
            .table
            .get(self.pos..)
            .filter(|rest| !rest.is_empty())
            .ok_or(FormatError::NameTableOverrun {
                offset: self.pos,
                length: self.table.len(),
            })?;
        let len = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        self.pos += len + 1;
        Ok(latin1(&rest[..len]))
    }
}

fn read_records<T, R>(reader: &mut R, count: u32) -> BinResult<Vec<T>>
where
    T: for<'a> BinRead<Args<'a> = ()>,
    R: Read + Seek,
{
    (0..count)
        .map(|_| T::read_options(&mut *reader, binrw::Endian::Little, ()))
        .collect()
}

fn read_bytes<R: Read>(reader: &mut R, len: u64) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
    }
    Ok(buf)
}

/// Read a 1-byte length-prefixed string, dropping trailing NULs
fn read_bstring<R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut len = [0u8; 1];
    reader.read_exact(&mut len)?;
    let mut bytes = vec![0u8; usize::from(len[0])];
    reader.read_exact(&mut bytes)?;
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    Ok(latin1(&bytes))
}

fn c_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    latin1(&bytes[..len])
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::header::FormatVariant;
    use binrw::io::Cursor;
    use bsafs_test_utils::{LegacyArchiveBuilder, ModernArchiveBuilder};

    #[test]
    fn test_modern_parse() {
        let image = ModernArchiveBuilder::new()
            .file("meshes\\weapons", "Sword.nif", &[1; 10])
            .file("textures", "sword.dds", &[2; 20])
            .build();

        let mut parser = ArchiveParser::new(Cursor::new(image));
        assert_eq!(parser.state(), ParseState::Unopened);
        let parsed = parser.parse().unwrap();
        assert_eq!(parser.state(), ParseState::Built);

        assert_eq!(parsed.header.variant, FormatVariant::Modern { version: 0x67 });
        assert_eq!(parsed.header.file_count, 2);
        assert!(parsed.tree.has_folder("meshes"));
        assert_eq!(
            parsed.tree.file("meshes/weapons/sword.nif").map(FileEntry::size),
            Some(10)
        );
        assert_eq!(parsed.tree.file("textures/sword.dds").map(FileEntry::size), Some(20));
    }

    #[test]
    fn test_file_count_mismatch_fails_closed() {
        let image = ModernArchiveBuilder::new()
            .file("meshes", "a.nif", b"a")
            .file("meshes", "b.nif", b"b")
            .declared_file_count(3)
            .build();

        let mut parser = ArchiveParser::new(Cursor::new(image));
        let err = parser.parse().unwrap_err();
        assert!(matches!(
            err,
            FormatError::FileCountMismatch {
                declared: 3,
                actual: 2
            }
        ));
        assert_eq!(err.stage().label(), "file count");
        assert_eq!(parser.state(), ParseState::Failed);
    }

    #[test]
    fn test_missing_name_flags() {
        let image = ModernArchiveBuilder::new()
            .archive_flags(0x1)
            .file("meshes", "a.nif", b"a")
            .build();
        let err = parse_archive(Cursor::new(image)).unwrap_err();
        assert_eq!(err.stage(), Stage::HeaderFlags);
    }

    #[test]
    fn test_bad_magic_and_version() {
        let err = parse_archive(Cursor::new(vec![0u8; 64])).unwrap_err();
        assert!(matches!(err, FormatError::BadMagic(0)));

        let image = ModernArchiveBuilder::new().version(0x69).build();
        let err = parse_archive(Cursor::new(image)).unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedVersion(0x69)));
        assert_eq!(err.stage().label(), "file version");
    }

    #[test]
    fn test_truncated_header() {
        let mut image = ModernArchiveBuilder::new().build();
        image.truncate(20);
        let err = parse_archive(Cursor::new(image)).unwrap_err();
        assert_eq!(err.stage(), Stage::HeaderSize);
        assert_eq!(err.kind(), crate::ErrorKind::Format);
    }

    #[test]
    fn test_truncated_file_records() {
        let mut image = ModernArchiveBuilder::new()
            .file("meshes", "a.nif", b"abc")
            .build();
        // Keep the header and folder record, cut into the folder block
        image.truncate(36 + 16 + 4);
        let err = parse_archive(Cursor::new(image)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Io);
    }

    #[test]
    fn test_legacy_parse() {
        let image = LegacyArchiveBuilder::new()
            .file("meshes\\armor\\cuirass.nif", &[7; 12])
            .file("readme.txt", b"hi")
            .file("\\odd.txt", b"x")
            .build();

        let parsed = parse_archive(Cursor::new(image)).unwrap();
        assert_eq!(parsed.header.variant, FormatVariant::Legacy);
        assert!(!parsed.compressed_by_default());
        assert_eq!(
            parsed.tree.file("meshes/armor/cuirass.nif").map(FileEntry::size),
            Some(12)
        );
        assert!(parsed.tree.has_file("readme.txt"));
        // A leading backslash does not split, the name keeps it
        assert!(parsed.tree.root().file("\\odd.txt").is_some());
        assert_eq!(parsed.header.folder_count, 2);
    }

    #[test]
    fn test_legacy_offsets_are_absolute() {
        let image = LegacyArchiveBuilder::new()
            .file("a\\one.bin", b"first")
            .file("a\\two.bin", b"second")
            .build();
        let parsed = parse_archive(Cursor::new(image.clone())).unwrap();

        let entry = parsed.tree.file("a/two.bin").unwrap();
        let start = entry.offset as usize;
        assert_eq!(&image[start..start + entry.size() as usize], b"second");
    }

    #[test]
    fn test_legacy_bad_hash_offset() {
        let mut image = LegacyArchiveBuilder::new().file("a\\b", b"c").build();
        image[4..8].copy_from_slice(&4u32.to_le_bytes());
        let err = parse_archive(Cursor::new(image)).unwrap_err();
        assert!(matches!(err, FormatError::NameTableSize { .. }));
    }
}
