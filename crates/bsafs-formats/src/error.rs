//! Archive parse error types

use std::fmt;
use std::io;
use thiserror::Error;

/// Result alias for archive parsing
pub type FormatResult<T> = std::result::Result<T, FormatError>;

/// Parse step that was running when an archive failed to open
///
/// The label of the failing stage is what a mounted archive reports as its
/// status text, so these strings are user visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading the four magic bytes
    FileMagic,
    /// Reading or checking the version word
    FileVersion,
    /// Reading the fixed-size header
    HeaderSize,
    /// Checking the archive flags
    HeaderFlags,
    /// Seeking to the flat file-name table
    FileNameSeek,
    /// Reading the flat file-name table
    FileNameRead,
    /// Seeking back to the folder records
    FolderInfoSeek,
    /// Reading the folder records
    FolderInfoRead,
    /// Reading a length-prefixed folder name
    FolderNameRead,
    /// Reading a folder's file records
    FileInfoRead,
    /// Consuming a name from the file-name table
    FileNameSize,
    /// Comparing summed folder file counts with the header total
    FileCount,
    /// Reading the legacy header
    LegacyHeader,
    /// Reading the legacy size/offset table
    FileSizeOffset,
    /// Reading or resolving the legacy name offsets
    FileNameOffset,
    /// Reading the legacy name blob
    FileNames,
}

impl Stage {
    /// Short human-readable label for the stage
    pub const fn label(self) -> &'static str {
        match self {
            Self::FileMagic => "file magic",
            Self::FileVersion => "file version",
            Self::HeaderSize => "header size",
            Self::HeaderFlags => "header flags",
            Self::FileNameSeek => "file name seek",
            Self::FileNameRead => "file name read",
            Self::FolderInfoSeek => "folder info seek",
            Self::FolderInfoRead => "folder info read",
            Self::FolderNameRead => "folder name read",
            Self::FileInfoRead => "file info read",
            Self::FileNameSize => "file name size",
            Self::FileCount => "file count",
            Self::LegacyHeader => "header",
            Self::FileSizeOffset => "file size/offset",
            Self::FileNameOffset => "file name offset",
            Self::FileNames => "file names",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse classification of a parse failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bytes do not describe a valid archive
    Format,
    /// The underlying reader failed (short read, seek failure)
    Io,
}

/// Archive parse error
#[derive(Debug, Error)]
pub enum FormatError {
    /// Magic word is neither the modern nor the legacy archive magic
    #[error("unrecognized archive magic: 0x{0:08X}")]
    BadMagic(u32),

    /// Modern archive with a version this crate cannot read
    #[error("unsupported archive version: 0x{0:X}")]
    UnsupportedVersion(u32),

    /// Archive flags lack the path-name or file-name bits
    #[error("archive flags 0x{0:08X} do not declare both path and file names")]
    MissingNames(u32),

    /// Reader failure while running a parse stage
    #[error("{stage}: {source}")]
    Io {
        /// Stage that was running
        stage: Stage,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Folder record with a zero-length name
    #[error("empty folder name")]
    EmptyFolderName,

    /// File records reference more names than the name table holds
    #[error("file name table exhausted at offset {offset} of {length}")]
    NameTableOverrun {
        /// Cursor position in the name table
        offset: usize,
        /// Total table length
        length: usize,
    },

    /// Summed per-folder file counts disagree with the header
    #[error("file count mismatch: header declares {declared}, folders hold {actual}")]
    FileCountMismatch {
        /// Count from the header
        declared: u32,
        /// Sum of folder record counts
        actual: u64,
    },

    /// Legacy hash offset too small for the declared file count
    #[error("legacy name table size invalid: hash offset {hash_offset}, {file_count} files")]
    NameTableSize {
        /// Hash table offset from the legacy header
        hash_offset: u32,
        /// File count from the legacy header
        file_count: u32,
    },

    /// Legacy name offset points outside the name blob
    #[error("file name offset {offset} out of range for entry {index}")]
    NameOffset {
        /// Entry index
        index: usize,
        /// Offending offset
        offset: u32,
    },
}

impl FormatError {
    /// Stage label retained as the archive's status text
    pub fn stage(&self) -> Stage {
        match self {
            Self::BadMagic(_) => Stage::FileMagic,
            Self::UnsupportedVersion(_) => Stage::FileVersion,
            Self::MissingNames(_) => Stage::HeaderFlags,
            Self::Io { stage, .. } => *stage,
            Self::EmptyFolderName => Stage::FolderNameRead,
            Self::NameTableOverrun { .. } => Stage::FileNameSize,
            Self::FileCountMismatch { .. } => Stage::FileCount,
            Self::NameTableSize { .. } => Stage::FileNames,
            Self::NameOffset { .. } => Stage::FileNameOffset,
        }
    }

    /// Classify the failure as a format or an I/O problem
    ///
    /// A header that ends early is a format problem (the file is too small to
    /// be an archive); any other reader failure is I/O.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io {
                stage: Stage::HeaderSize | Stage::LegacyHeader,
                source,
            } if source.kind() == io::ErrorKind::UnexpectedEof => ErrorKind::Format,
            Self::Io { .. } => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }
}

/// Attach a parse stage to reader results
pub(crate) trait StageExt<T> {
    fn at(self, stage: Stage) -> FormatResult<T>;
}

impl<T> StageExt<T> for io::Result<T> {
    fn at(self, stage: Stage) -> FormatResult<T> {
        self.map_err(|source| FormatError::Io { stage, source })
    }
}

impl<T> StageExt<T> for binrw::BinResult<T> {
    fn at(self, stage: Stage) -> FormatResult<T> {
        self.map_err(|e| FormatError::Io {
            stage,
            source: into_io(e),
        })
    }
}

fn into_io(error: binrw::Error) -> io::Error {
    match error {
        binrw::Error::Io(e) => e,
        binrw::Error::Backtrace(backtrace) => into_io(*backtrace.error),
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}
