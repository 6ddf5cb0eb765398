//! Archive header structures, flag words and format probing

use crate::error::{FormatError, FormatResult};
use binrw::BinRead;
use std::fmt;
use std::io::Read;

/// Magic of modern archives ("BSA\0" read little-endian)
pub const BSA_MAGIC: u32 = 0x0041_5342;

/// Magic of legacy archives
pub const LEGACY_MAGIC: u32 = 0x0000_0100;

/// Modern archive version written by the first title using the format
pub const VERSION_TES4: u32 = 0x67;

/// Later modern version, adds embedded file names
pub const VERSION_FO3: u32 = 0x68;

/// Modern versions accepted by [`probe`] and the parser
pub const SUPPORTED_VERSIONS: [u32; 2] = [VERSION_TES4, VERSION_FO3];

/// Archive-wide flag word of a modern header
#[derive(BinRead, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[br(little)]
pub struct ArchiveFlags(pub u32);

impl ArchiveFlags {
    /// Folder names are stored (bit 0)
    pub const PATH_NAMES: u32 = 0x0001;

    /// File names are stored (bit 1)
    pub const FILE_NAMES: u32 = 0x0002;

    /// Entries are compressed unless their toggle bit is set (bit 2)
    pub const COMPRESSED: u32 = 0x0004;

    /// Payloads start with their full path (bit 8, version 0x68 only)
    pub const EMBEDDED_NAMES: u32 = 0x0100;

    /// Create flags from the raw word
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw flag word
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if flag is set
    pub const fn has(self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Both folder and file names are present
    pub const fn has_names(self) -> bool {
        self.has(Self::PATH_NAMES) && self.has(Self::FILE_NAMES)
    }
}

impl fmt::Display for ArchiveFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Content categories an archive declares in its header
#[derive(BinRead, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[br(little)]
pub struct FileTypeFlags(pub u32);

impl FileTypeFlags {
    /// Meshes (bit 0)
    pub const MESHES: u32 = 0x0001;
    /// Textures (bit 1)
    pub const TEXTURES: u32 = 0x0002;
    /// Menus (bit 2)
    pub const MENUS: u32 = 0x0004;
    /// Sounds (bit 3)
    pub const SOUNDS: u32 = 0x0008;
    /// Voices (bit 4)
    pub const VOICES: u32 = 0x0010;
    /// Shaders (bit 5)
    pub const SHADERS: u32 = 0x0020;
    /// Trees (bit 6)
    pub const TREES: u32 = 0x0040;
    /// Fonts (bit 7)
    pub const FONTS: u32 = 0x0080;
    /// Miscellaneous (bit 8)
    pub const MISC: u32 = 0x0100;

    const NAMES: [(u32, &'static str); 9] = [
        (Self::MESHES, "meshes"),
        (Self::TEXTURES, "textures"),
        (Self::MENUS, "menus"),
        (Self::SOUNDS, "sounds"),
        (Self::VOICES, "voices"),
        (Self::SHADERS, "shaders"),
        (Self::TREES, "trees"),
        (Self::FONTS, "fonts"),
        (Self::MISC, "misc"),
    ];

    /// Create flags from the raw word
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Check if flag is set
    pub const fn has(self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Names of the categories that are set, in bit order
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for FileTypeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for FileTypeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}

/// Which on-disk generation an archive uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVariant {
    /// `BSA\0` archives with folder records and a name table
    Modern {
        /// Version word following the magic
        version: u32,
    },
    /// Flat archives with backslash-joined names
    Legacy,
}

/// Modern header body following magic and version
///
/// All fields are little-endian u32:
/// - folder record offset (from the start of the file)
/// - archive flags
/// - folder count and file count
/// - total folder-name and file-name lengths
/// - file-type flags
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct ModernHeader {
    /// Absolute offset of the first folder record
    pub folder_record_offset: u32,
    /// Archive-wide flags
    pub archive_flags: ArchiveFlags,
    /// Number of folder records
    pub folder_count: u32,
    /// Total number of file records
    pub file_count: u32,
    /// Total length of folder names
    pub folder_name_length: u32,
    /// Length of the flat file-name table
    pub file_name_length: u32,
    /// Content categories
    pub file_flags: FileTypeFlags,
}

impl ModernHeader {
    /// Encoded size in bytes
    pub const SIZE: usize = 28;

    /// Reject archives without folder and file names
    pub fn validate(&self) -> FormatResult<()> {
        if !self.archive_flags.has_names() {
            return Err(FormatError::MissingNames(self.archive_flags.bits()));
        }
        Ok(())
    }

    /// Absolute offset of the flat file-name table
    ///
    /// The table follows every folder block: one length byte per folder, the
    /// folder names, a folder record and the file records.
    pub fn file_name_table_offset(&self) -> u64 {
        let record = crate::records::RECORD_SIZE as u64;
        u64::from(self.folder_record_offset)
            + u64::from(self.folder_name_length)
            + u64::from(self.folder_count) * (1 + record)
            + u64::from(self.file_count) * record
    }
}

/// Legacy header body following the magic
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct LegacyHeader {
    /// Offset of the hash table, relative to the end of the header
    pub hash_offset: u32,
    /// Number of files
    pub file_count: u32,
}

impl LegacyHeader {
    /// Encoded size in bytes, including the magic
    pub const SIZE: u64 = 12;

    /// Length of the name blob, `None` when the header is inconsistent
    pub fn names_length(&self) -> Option<u32> {
        self.file_count
            .checked_mul(12)
            .and_then(|tables| self.hash_offset.checked_sub(tables))
    }

    /// Absolute offset that stored entry offsets are relative to
    pub fn data_offset(&self) -> u64 {
        Self::SIZE + u64::from(self.hash_offset) + u64::from(self.file_count) * 8
    }
}

/// Header summary shared by both variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Format generation
    pub variant: FormatVariant,
    /// Archive flags (zero for legacy archives)
    pub archive_flags: ArchiveFlags,
    /// File-type flags (zero for legacy archives)
    pub file_flags: FileTypeFlags,
    /// Folder count (derived from the names for legacy archives)
    pub folder_count: u32,
    /// File count
    pub file_count: u32,
    /// Total folder-name length (zero for legacy archives)
    pub folder_name_length: u32,
    /// File-name table length
    pub file_name_length: u32,
}

impl ArchiveHeader {
    /// Summary of a modern header
    pub fn modern(version: u32, header: &ModernHeader) -> Self {
        Self {
            variant: FormatVariant::Modern { version },
            archive_flags: header.archive_flags,
            file_flags: header.file_flags,
            folder_count: header.folder_count,
            file_count: header.file_count,
            folder_name_length: header.folder_name_length,
            file_name_length: header.file_name_length,
        }
    }

    /// Summary of a legacy header
    pub fn legacy(header: &LegacyHeader, names_length: u32) -> Self {
        Self {
            variant: FormatVariant::Legacy,
            archive_flags: ArchiveFlags::default(),
            file_flags: FileTypeFlags::default(),
            folder_count: 0,
            file_count: header.file_count,
            folder_name_length: 0,
            file_name_length: names_length,
        }
    }

    /// Entries are compressed unless toggled
    pub fn compressed_by_default(&self) -> bool {
        matches!(self.variant, FormatVariant::Modern { .. })
            && self.archive_flags.has(ArchiveFlags::COMPRESSED)
    }

    /// Payloads carry a length-prefixed copy of their path
    pub fn embedded_names(&self) -> bool {
        self.variant == FormatVariant::Modern { version: VERSION_FO3 }
            && self.archive_flags.has(ArchiveFlags::EMBEDDED_NAMES)
    }
}

/// Identify an archive from its leading bytes
///
/// Reads at most eight bytes. Returns `None` for unknown magic, unsupported
/// versions and inputs that end early.
pub fn probe<R: Read>(reader: &mut R) -> Option<FormatVariant> {
    let magic = read_u32(reader)?;
    match magic {
        BSA_MAGIC => {
            let version = read_u32(reader)?;
            SUPPORTED_VERSIONS
                .contains(&version)
                .then_some(FormatVariant::Modern { version })
        }
        LEGACY_MAGIC => Some(FormatVariant::Legacy),
        _ => None,
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Option<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).ok()?;
    Some(u32::from_le_bytes(buf))
}
