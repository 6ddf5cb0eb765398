//! Folder and file records plus the packed size/flags word

use binrw::BinRead;

/// Encoded size of both folder and file records
pub const RECORD_SIZE: usize = 16;

/// Folder record from a modern archive
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct FolderRecord {
    /// Name hash (unused for lookup)
    pub hash: u64,
    /// Number of file records in this folder's block
    pub file_count: u32,
    /// Offset of the folder block, biased by the file-name table length
    pub offset: u32,
}

/// File record from a modern archive
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct FileRecord {
    /// Name hash (unused for lookup)
    pub hash: u64,
    /// Stored size and compression toggle
    pub size_flags: SizeFlags,
    /// Absolute payload offset
    pub offset: u32,
}

/// Size/offset pair from a legacy archive
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct LegacySizeOffset {
    /// Stored size
    pub size: u32,
    /// Payload offset relative to the data section
    pub offset: u32,
}

/// Packed 32-bit word: low 30 bits stored size, high bits compression toggle
#[derive(BinRead, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[br(little)]
pub struct SizeFlags(pub u32);

impl SizeFlags {
    /// Mask selecting the stored size
    pub const SIZE_MASK: u32 = 0x3fff_ffff;

    /// Bits that invert the archive's compression default
    pub const COMPRESSION_MASK: u32 = 0xc000_0000;

    /// Wrap a raw word
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Stored (on-disk) size in bytes
    pub const fn size(self) -> u32 {
        self.0 & Self::SIZE_MASK
    }

    /// Entry toggles the archive's compression default
    pub const fn compressed(self) -> bool {
        (self.0 & Self::COMPRESSION_MASK) != 0
    }
}
