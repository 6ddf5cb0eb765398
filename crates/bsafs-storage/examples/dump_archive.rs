#![allow(clippy::expect_used, clippy::panic)]

//! Mount one archive and print its header and directory tree.
//!
//! Usage:
//!   cargo run --example dump_archive -p bsafs-storage -- <archive.bsa> [inner/path]
//!
//! With an inner path the first bytes of that entry are hex-dumped as well.

mod common;

use bsafs_storage::{Archive, EntryFilter};
use std::sync::Arc;

fn main() {
    common::init_tracing();
    let path = common::archive_path();

    let archive = Arc::new(Archive::new(&path));
    if let Err(e) = archive.open() {
        panic!("{}: {} ({e})", path.display(), archive.status_text());
    }

    let header = archive.header().expect("open archive has a header");
    println!("Archive:  {}", archive.path().display());
    println!("Format:   {:?}", header.variant);
    println!("Flags:    0x{:08x}", header.archive_flags.bits());
    println!("Contents: {}", header.file_flags);
    println!(
        "Counts:   {} folders, {} files\n",
        header.folder_count, header.file_count
    );

    print_folder(&archive, "", 0);

    if let Some(inner) = std::env::args().nth(2) {
        let data = archive.read(&inner).expect("failed to read entry");
        println!(
            "\n{inner}: {} bytes stored, {} bytes read{}",
            archive.file_size(&inner),
            data.len(),
            if archive.is_compressed(&inner) {
                " (compressed)"
            } else {
                ""
            }
        );
        common::hex_dump(&data, 256);
    }
}

fn print_folder(archive: &Arc<Archive>, folder: &str, depth: usize) {
    let indent = "  ".repeat(depth);
    for entry in archive.entries(folder, &EntryFilter::all()) {
        if entry.is_file() {
            let marker = if archive.is_compressed(&entry.path) {
                " [z]"
            } else {
                ""
            };
            println!(
                "{indent}{} ({} bytes){marker}",
                entry.name,
                archive.file_size(&entry.path)
            );
        } else {
            println!("{indent}{}/", entry.name);
            print_folder(archive, &entry.path, depth + 1);
        }
    }
}
