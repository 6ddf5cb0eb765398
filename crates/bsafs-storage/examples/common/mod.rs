#![allow(dead_code)]

use std::path::PathBuf;

/// Archive path from the first argument or `BSAFS_ARCHIVE`.
///
/// Panics with a usage message if neither is given.
pub fn archive_path() -> PathBuf {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BSAFS_ARCHIVE").ok())
        .expect(
            "no archive given.\n\
             Pass a .bsa path as the first argument or set BSAFS_ARCHIVE, e.g.:\n\
             cargo run --example dump_archive -p bsafs-storage -- \"Oblivion - Meshes.bsa\"",
        );
    let p = PathBuf::from(&path);
    assert!(p.exists(), "archive does not exist: {path}");
    p
}

/// Install a tracing subscriber honouring `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Print a hex dump of `bytes`, capped at `max_bytes`.
pub fn hex_dump(bytes: &[u8], max_bytes: usize) {
    let len = bytes.len().min(max_bytes);
    for (i, chunk) in bytes[..len].chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let ascii: String = chunk
            .iter()
            .map(|b| {
                if b.is_ascii_graphic() || *b == b' ' {
                    *b as char
                } else {
                    '.'
                }
            })
            .collect();
        println!("  {:08x}  {:<48}  {ascii}", i * 16, hex.join(" "));
    }
    if bytes.len() > max_bytes {
        println!("  ... ({} more bytes)", bytes.len() - max_bytes);
    }
}
