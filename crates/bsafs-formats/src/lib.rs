//! Parsers for Bethesda BSA archives
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::doc_markdown)] // Format terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
//! This crate reads the directory of BSA archives and decodes entry payloads.
//! It works on any `Read + Seek` source and holds no file handles of its own;
//! sharing, locking and mounting live in `bsafs-storage`.
//!
//! # Supported Formats
//!
//! - **Modern** (`BSA\0`, versions `0x67` and `0x68`): folder records,
//!   length-prefixed folder names, per-folder file records and a flat
//!   NUL-separated file-name table
//! - **Legacy** (magic `0x100`): a flat table of sizes and offsets with
//!   backslash-joined names
//!
//! # Example
//!
//! ```rust,no_run
//! use bsafs_formats::{EntryFilter, parse_archive};
//! use std::fs::File;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let parsed = parse_archive(File::open("Oblivion - Meshes.bsa")?)?;
//! for name in parsed.tree.entry_list("meshes", &EntryFilter::dirs()) {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Entry payload decompression
pub mod compression;
/// Parse errors and stage labels
pub mod error;
/// Wildcard name filters for listings
pub mod filter;
/// Header structures and format probing
pub mod header;
/// Archive directory parser
pub mod parser;
/// Folder and file records
pub mod records;
/// In-memory directory index
pub mod tree;

pub use compression::{DecompressError, MAX_DECOMPRESSION_SIZE, inflate_entry};
pub use error::{ErrorKind, FormatError, FormatResult, Stage};
pub use filter::{EntryFilter, NamePattern};
pub use header::{
    ArchiveFlags, ArchiveHeader, BSA_MAGIC, FileTypeFlags, FormatVariant, LEGACY_MAGIC,
    VERSION_FO3, VERSION_TES4, probe,
};
pub use parser::{ArchiveParser, ParseState, ParsedArchive, parse_archive};
pub use records::SizeFlags;
pub use tree::{DirectoryTree, FileEntry, FolderId, FolderNode, normalize_path};
