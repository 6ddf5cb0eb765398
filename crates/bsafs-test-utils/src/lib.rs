//! Test utilities for bsafs
//!
//! Builds synthetic archive images byte by byte so parser, storage and
//! overlay tests never depend on game data being installed.
//!
//! Two builders cover the two on-disk generations:
//!
//! - [`ModernArchiveBuilder`]: the `BSA\0` format (versions `0x67`/`0x68`)
//! - [`LegacyArchiveBuilder`]: the headerless `0x100` format
//!
//! The builders deliberately allow inconsistent images (wrong declared file
//! count, garbage payloads) so failure paths can be exercised.

use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `BSA\0` little-endian magic.
pub const MODERN_MAGIC: u32 = 0x0041_5342;
/// Legacy archive magic.
pub const LEGACY_MAGIC: u32 = 0x0000_0100;
/// Version written by [`ModernArchiveBuilder::new`].
pub const VERSION_0X67: u32 = 0x67;
/// Later version supporting embedded file names.
pub const VERSION_0X68: u32 = 0x68;

/// Archive flag: folder names present.
pub const FLAG_PATH_NAMES: u32 = 0x0001;
/// Archive flag: file names present.
pub const FLAG_FILE_NAMES: u32 = 0x0002;
/// Archive flag: entries compressed unless toggled.
pub const FLAG_COMPRESSED: u32 = 0x0004;
/// Archive flag: payloads prefixed with their full name (version `0x68`).
pub const FLAG_EMBEDDED_NAMES: u32 = 0x0100;

/// Per-entry bit that inverts the archive compression default.
pub const ENTRY_TOGGLE_BIT: u32 = 0x4000_0000;

const MODERN_HEADER_SIZE: u32 = 36;
const RECORD_SIZE: usize = 16;

/// Compress `data` the way archives store it: little-endian original size
/// followed by a zlib stream.
pub fn compress_payload(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing into a Vec cannot fail
    let _ = encoder.write_all(data);
    let stream = encoder.finish().unwrap_or_default();

    let mut payload = Vec::with_capacity(stream.len() + 4);
    payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
    payload.extend_from_slice(&stream);
    payload
}

#[derive(Debug, Clone)]
struct FileSpec {
    name: String,
    payload: Vec<u8>,
    toggle: bool,
}

#[derive(Debug, Clone)]
struct FolderSpec {
    name: String,
    files: Vec<FileSpec>,
}

/// Builder for `BSA\0` archive images.
#[derive(Debug, Clone)]
pub struct ModernArchiveBuilder {
    version: u32,
    archive_flags: u32,
    file_flags: u32,
    folders: Vec<FolderSpec>,
    declared_file_count: Option<u32>,
}

impl Default for ModernArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModernArchiveBuilder {
    /// Version `0x67` archive with path and file names, no default compression.
    pub fn new() -> Self {
        Self {
            version: VERSION_0X67,
            archive_flags: FLAG_PATH_NAMES | FLAG_FILE_NAMES,
            file_flags: 0,
            folders: Vec::new(),
            declared_file_count: None,
        }
    }

    /// Override the version field.
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Replace the archive flags word entirely.
    #[must_use]
    pub fn archive_flags(mut self, flags: u32) -> Self {
        self.archive_flags = flags;
        self
    }

    /// Set or clear the compressed-by-default flag.
    #[must_use]
    pub fn compressed_by_default(mut self, on: bool) -> Self {
        if on {
            self.archive_flags |= FLAG_COMPRESSED;
        } else {
            self.archive_flags &= !FLAG_COMPRESSED;
        }
        self
    }

    /// Set or clear the embedded-names flag.
    #[must_use]
    pub fn embedded_names(mut self, on: bool) -> Self {
        if on {
            self.archive_flags |= FLAG_EMBEDDED_NAMES;
        } else {
            self.archive_flags &= !FLAG_EMBEDDED_NAMES;
        }
        self
    }

    /// Set the header file-type flags word.
    #[must_use]
    pub fn file_flags(mut self, flags: u32) -> Self {
        self.file_flags = flags;
        self
    }

    /// Write a header file count that disagrees with the folder records.
    #[must_use]
    pub fn declared_file_count(mut self, count: u32) -> Self {
        self.declared_file_count = Some(count);
        self
    }

    /// Add a file that reads back as `data`.
    #[must_use]
    pub fn file(self, folder: &str, name: &str, data: &[u8]) -> Self {
        if self.archive_flags & FLAG_COMPRESSED != 0 {
            self.raw_file(folder, name, compress_payload(data), false)
        } else {
            self.raw_file(folder, name, data.to_vec(), false)
        }
    }

    /// Add a file whose payload is stored compressed and reads back as `data`.
    #[must_use]
    pub fn compressed_file(self, folder: &str, name: &str, data: &[u8]) -> Self {
        let toggle = self.archive_flags & FLAG_COMPRESSED == 0;
        self.raw_file(folder, name, compress_payload(data), toggle)
    }

    /// Add a file with an exact stored payload and toggle bit.
    #[must_use]
    pub fn raw_file(mut self, folder: &str, name: &str, payload: Vec<u8>, toggle: bool) -> Self {
        let spec = FileSpec {
            name: name.to_string(),
            payload,
            toggle,
        };
        if let Some(existing) = self.folders.iter_mut().find(|f| f.name == folder) {
            existing.files.push(spec);
        } else {
            self.folders.push(FolderSpec {
                name: folder.to_string(),
                files: vec![spec],
            });
        }
        self
    }

    /// Serialize the archive image.
    pub fn build(&self) -> Vec<u8> {
        let folder_count = self.folders.len();
        let file_count: usize = self.folders.iter().map(|f| f.files.len()).sum();
        let folder_name_length: usize = self.folders.iter().map(|f| f.name.len() + 1).sum();
        let name_blob: Vec<u8> = self
            .folders
            .iter()
            .flat_map(|f| &f.files)
            .flat_map(|file| file.name.bytes().chain(std::iter::once(0)))
            .collect();

        let folder_records_end = MODERN_HEADER_SIZE as usize + folder_count * RECORD_SIZE;
        let blocks_len = folder_count + folder_name_length + file_count * RECORD_SIZE;
        let data_start = folder_records_end + blocks_len + name_blob.len();

        // Lay out payloads first so the file records can point at them
        let embedded = self.archive_flags & FLAG_EMBEDDED_NAMES != 0;
        let mut data = Vec::new();
        let mut placements = Vec::with_capacity(file_count);
        for folder in &self.folders {
            for file in &folder.files {
                let offset = data_start + data.len();
                let mut stored = Vec::new();
                if embedded {
                    let full = format!("{}\\{}", folder.name, file.name);
                    stored.push(full.len() as u8);
                    stored.extend_from_slice(full.as_bytes());
                }
                stored.extend_from_slice(&file.payload);
                let mut size_flags = stored.len() as u32;
                if file.toggle {
                    size_flags |= ENTRY_TOGGLE_BIT;
                }
                placements.push((size_flags, offset as u32));
                data.extend_from_slice(&stored);
            }
        }

        let mut out = Vec::with_capacity(data_start + data.len());
        put_u32(&mut out, MODERN_MAGIC);
        put_u32(&mut out, self.version);
        put_u32(&mut out, MODERN_HEADER_SIZE);
        put_u32(&mut out, self.archive_flags);
        put_u32(&mut out, folder_count as u32);
        put_u32(
            &mut out,
            self.declared_file_count.unwrap_or(file_count as u32),
        );
        put_u32(&mut out, folder_name_length as u32);
        put_u32(&mut out, name_blob.len() as u32);
        put_u32(&mut out, self.file_flags);

        let mut block_offset = folder_records_end + name_blob.len();
        for (i, folder) in self.folders.iter().enumerate() {
            put_u64(&mut out, fake_hash(&folder.name, i));
            put_u32(&mut out, folder.files.len() as u32);
            put_u32(&mut out, block_offset as u32);
            block_offset += 1 + folder.name.len() + 1 + folder.files.len() * RECORD_SIZE;
        }

        let mut placement = placements.iter();
        for folder in &self.folders {
            out.push((folder.name.len() + 1) as u8);
            out.extend_from_slice(folder.name.as_bytes());
            out.push(0);
            for (i, file) in folder.files.iter().enumerate() {
                let (size_flags, offset) = placement.next().copied().unwrap_or_default();
                put_u64(&mut out, fake_hash(&file.name, i));
                put_u32(&mut out, size_flags);
                put_u32(&mut out, offset);
            }
        }

        out.extend_from_slice(&name_blob);
        out.extend_from_slice(&data);
        out
    }
}

/// Builder for legacy (`0x100`) archive images.
#[derive(Debug, Clone, Default)]
pub struct LegacyArchiveBuilder {
    files: Vec<(String, Vec<u8>)>,
}

impl LegacyArchiveBuilder {
    /// Empty legacy archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file under a backslash-separated path such as `meshes\a.nif`.
    #[must_use]
    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.push((path.to_string(), data.to_vec()));
        self
    }

    /// Serialize the archive image.
    pub fn build(&self) -> Vec<u8> {
        let count = self.files.len();
        let mut names = Vec::new();
        let mut name_offsets = Vec::with_capacity(count);
        for (path, _) in &self.files {
            name_offsets.push(names.len() as u32);
            names.extend_from_slice(path.as_bytes());
            names.push(0);
        }
        let hash_offset = 12 * count + names.len();

        let mut out = Vec::new();
        put_u32(&mut out, LEGACY_MAGIC);
        put_u32(&mut out, hash_offset as u32);
        put_u32(&mut out, count as u32);

        let mut relative = 0u32;
        for (_, data) in &self.files {
            put_u32(&mut out, data.len() as u32);
            put_u32(&mut out, relative);
            relative += data.len() as u32;
        }
        for offset in &name_offsets {
            put_u32(&mut out, *offset);
        }
        out.extend_from_slice(&names);
        for (i, (path, _)) in self.files.iter().enumerate() {
            put_u64(&mut out, fake_hash(path, i));
        }
        for (_, data) in &self.files {
            out.extend_from_slice(data);
        }
        out
    }
}

/// The two-folder archive used by the end-to-end scenarios.
///
/// - `meshes/sword.nif`: 100 bytes, stored uncompressed
/// - `textures/sword.dds`: 8192 bytes, stored compressed in exactly 2048 bytes
pub fn sword_archive() -> Vec<u8> {
    ModernArchiveBuilder::new()
        .file("meshes", "sword.nif", &sword_nif())
        .raw_file("textures", "sword.dds", padded_payload(&sword_dds(), 2048), true)
        .build()
}

/// Contents of `meshes/sword.nif` in [`sword_archive`].
pub fn sword_nif() -> Vec<u8> {
    (0..100u8).collect()
}

/// Decompressed contents of `textures/sword.dds` in [`sword_archive`].
pub fn sword_dds() -> Vec<u8> {
    (0..8192u32).map(|i| (i % 251) as u8).collect()
}

/// Compressed payload padded with trailing zeros to an exact stored size.
///
/// Zlib readers stop at the end of the stream, so the padding is ignored.
pub fn padded_payload(data: &[u8], stored_size: usize) -> Vec<u8> {
    let mut payload = compress_payload(data);
    if payload.len() < stored_size {
        payload.resize(stored_size, 0);
    }
    payload
}

/// An archive image written to a temporary directory.
#[derive(Debug)]
pub struct TempArchive {
    /// Keeps the directory alive for the lifetime of the test.
    pub dir: TempDir,
    /// Full path of the written archive.
    pub path: PathBuf,
}

impl TempArchive {
    /// Write `bytes` as `name` inside a fresh temporary directory.
    pub fn write(name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let path = write_archive(dir.path(), name, bytes)?;
        Ok(Self { dir, path })
    }

    /// Directory holding the archive.
    pub fn base(&self) -> &Path {
        self.dir.path()
    }
}

/// Write `bytes` as `dir/name`, returning the full path.
pub fn write_archive(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

// Readers ignore the hash fields, any stable value will do
fn fake_hash(name: &str, salt: usize) -> u64 {
    name.bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64 ^ salt as u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
}
