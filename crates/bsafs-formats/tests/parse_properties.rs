//! Directory parsing properties over synthesized archives

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bsafs_formats::{
    ArchiveParser, EntryFilter, FileEntry, FileTypeFlags, FormatError, FormatVariant, ParseState,
    inflate_entry, parse_archive, probe,
};
use bsafs_test_utils::{ModernArchiveBuilder, sword_archive, sword_dds, sword_nif};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::io::Cursor;

fn payload<'a>(image: &'a [u8], entry: &FileEntry) -> &'a [u8] {
    let start = entry.offset as usize;
    &image[start..start + entry.size() as usize]
}

#[test]
fn parsing_twice_yields_identical_trees() {
    let image = sword_archive();
    let first = parse_archive(Cursor::new(image.clone())).unwrap();
    let second = parse_archive(Cursor::new(image)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.tree.walk_files(), second.tree.walk_files());
}

#[test]
fn sword_archive_layout() {
    let image = sword_archive();
    assert_eq!(
        probe(&mut image.as_slice()),
        Some(FormatVariant::Modern { version: 0x67 })
    );

    let parsed = parse_archive(Cursor::new(image.clone())).unwrap();
    assert_eq!(
        parsed.tree.entry_list("", &EntryFilter::dirs()),
        vec!["meshes", "textures"]
    );

    let nif = parsed.tree.file("meshes/sword.nif").unwrap();
    assert_eq!(nif.size(), 100);
    assert!(!nif.compressed());
    assert_eq!(payload(&image, nif), sword_nif().as_slice());

    let dds = parsed.tree.file("textures/sword.dds").unwrap();
    assert_eq!(dds.size(), 2048);
    assert!(dds.compressed());
    let inflated = inflate_entry(payload(&image, dds)).unwrap();
    assert_eq!(inflated, sword_dds());
    assert_ne!(inflated.len(), 2048);
}

#[test]
fn lookups_ignore_case_and_separator() {
    let parsed = parse_archive(Cursor::new(sword_archive())).unwrap();
    let upper = parsed.tree.file("Textures/Sword.DDS").unwrap();
    let lower = parsed.tree.file("textures\\sword.dds").unwrap();
    assert_eq!(upper, lower);
    assert!(parsed.tree.has_folder("MESHES"));
}

#[test]
fn fail_closed_leaves_no_tree() {
    let image = ModernArchiveBuilder::new()
        .file("meshes", "a.nif", b"a")
        .file("textures", "a.dds", b"b")
        .declared_file_count(1)
        .build();

    let mut parser = ArchiveParser::new(Cursor::new(image));
    let result = parser.parse();
    assert!(matches!(result, Err(FormatError::FileCountMismatch { .. })));
    assert_eq!(parser.state(), ParseState::Failed);
}

#[test]
fn later_version_with_header_flags() {
    let image = ModernArchiveBuilder::new()
        .version(0x68)
        .embedded_names(true)
        .file_flags(FileTypeFlags::MESHES | FileTypeFlags::SOUNDS)
        .file("sound\\fx", "hit.wav", b"RIFF....")
        .build();

    let parsed = parse_archive(Cursor::new(image.clone())).unwrap();
    assert!(parsed.embedded_names());
    assert_eq!(parsed.header.file_flags.names(), vec!["meshes", "sounds"]);

    // Stored size covers the length byte and the embedded path
    let entry = parsed.tree.file("sound/fx/hit.wav").unwrap();
    let stored = payload(&image, entry);
    let prefix = usize::from(stored[0]);
    assert_eq!(&stored[1..=prefix], b"sound\\fx\\hit.wav");
    assert_eq!(&stored[1 + prefix..], b"RIFF....");
}

#[test]
fn compressed_by_default_archive() {
    let image = ModernArchiveBuilder::new()
        .compressed_by_default(true)
        .file("textures", "packed.dds", &[9; 4000])
        .raw_file("textures", "plain.dds", vec![1, 2, 3], true)
        .build();

    let parsed = parse_archive(Cursor::new(image.clone())).unwrap();
    assert!(parsed.compressed_by_default());

    let packed = parsed.tree.file("textures/packed.dds").unwrap();
    assert!(!packed.compressed());
    assert_eq!(inflate_entry(payload(&image, packed)).unwrap(), vec![9; 4000]);

    let plain = parsed.tree.file("textures/plain.dds").unwrap();
    assert!(plain.compressed());
    assert_eq!(payload(&image, plain), &[1, 2, 3]);
}

fn archive_contents() -> impl Strategy<Value = Vec<(String, String, Vec<u8>)>> {
    prop::collection::vec(
        (
            "[a-z]{1,6}(\\\\[a-z]{1,6}){0,2}",
            "[a-z]{1,8}\\.[a-z]{3}",
            prop::collection::vec(any::<u8>(), 0..64),
        ),
        1..12,
    )
}

proptest! {
    #[test]
    fn uncompressed_entries_round_trip(files in archive_contents()) {
        let mut builder = ModernArchiveBuilder::new();
        for (folder, name, data) in &files {
            builder = builder.file(folder, name, data);
        }
        let image = builder.build();
        let parsed = parse_archive(Cursor::new(image.clone())).unwrap();

        // Later duplicates overwrite earlier ones
        for (folder, name, _) in &files {
            let path = format!("{}/{}", folder.replace('\\', "/"), name);
            let entry = parsed.tree.file(&path).unwrap();
            let expected = files
                .iter()
                .rev()
                .find(|(f, n, _)| f == folder && n == name)
                .map(|(_, _, d)| d.clone())
                .unwrap();
            prop_assert_eq!(payload(&image, entry), expected.as_slice());
        }
    }
}
