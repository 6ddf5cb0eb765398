//! Mounted BSA archives exposed through a virtual filesystem overlay.
//!
//! This crate turns parsed archives into something the rest of an
//! application can load resources from without caring whether a path lives
//! on disk or inside an archive:
//!
//! - **Archive**: one mounted archive file with a single shared read handle,
//!   a read mutex, its directory index and a retained status text
//! - **Content access**: stored sizes, raw and decompressed entry reads
//! - **Overlay**: a first-match-wins chain of file providers; archives
//!   appear as pseudo-directories next to real files
//! - **Registry**: the ordered mount list, automatic discovery and its
//!   persisted configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use bsafs_storage::{ArchiveRegistry, RegistryConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistryConfig::default()
//!     .with_archives(vec!["/games/oblivion/Data/Oblivion - Meshes.bsa".into()]);
//! let registry = ArchiveRegistry::new(&config);
//!
//! let bytes = registry.read("meshes/clutter/bucket.nif")?;
//! println!("{} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use thiserror::Error;

// Mounted archive and content access
pub mod archive;

// Virtual filesystem overlay
pub mod overlay;

// Mount list management
pub mod registry;

// Persisted mount list
pub mod config;

// Installation discovery
pub mod discovery;

pub use archive::{Archive, ArchiveMetadata, ArchiveState, DirEntry, EntryIter, EntryKind, mount_key};
pub use bsafs_formats::EntryFilter;
pub use config::RegistryConfig;
pub use discovery::{Discovery, GameTitle};
pub use overlay::{FileFlags, FileHandle, FileNameKind, FileProvider, OpenMode, OverlayChain};
pub use registry::ArchiveRegistry;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive directory could not be parsed
    #[error("Invalid format: {0}")]
    Format(#[from] bsafs_formats::FormatError),

    /// Entry payload could not be decompressed
    #[error("Decompression failed: {0}")]
    Decompression(#[from] bsafs_formats::DecompressError),

    /// Path is not present; an ordinary negative lookup
    #[error("Content not found: {0}")]
    NotFound(String),

    /// Write-style operation on a read-only provider
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Archive is not in the open state
    #[error("Archive not open: {0}")]
    NotOpen(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether this is an ordinary "no such path" result
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Version information for the storage crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Status text of an archive that has not been opened yet
pub const STATUS_INITIALIZED: &str = "initialized";

/// Status text of a successfully opened archive
pub const STATUS_LOADED: &str = "loaded successful";

/// Status text when the archive file itself cannot be opened
pub const STATUS_FILE_OPEN: &str = "file open";
