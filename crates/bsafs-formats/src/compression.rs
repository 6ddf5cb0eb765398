//! Entry payload decompression
//!
//! A compressed payload is a 4-byte original-size prefix followed by a zlib
//! stream. The prefix is stored little-endian; read with its outer and inner
//! byte pairs swapped it becomes the big-endian size word zlib tooling
//! conventionally expects, which is what [`swap_length_prefix`] produces.

use flate2::read::ZlibDecoder;
use std::io::{self, Read};
use thiserror::Error;

/// Maximum allowed decompression size (1 GB)
///
/// Limits output from hostile or corrupt size prefixes.
pub const MAX_DECOMPRESSION_SIZE: usize = 1024 * 1024 * 1024;

// Upper bound for the initial allocation, the declared size is untrusted
const INITIAL_CAPACITY_LIMIT: usize = 16 * 1024 * 1024;

/// Decompression failure
#[derive(Debug, Error)]
pub enum DecompressError {
    /// Payload too short to hold the size prefix
    #[error("compressed payload of {0} bytes has no size prefix")]
    TooShort(usize),

    /// Declared or produced size above [`MAX_DECOMPRESSION_SIZE`]
    #[error("decompressed size {0} exceeds limit of {MAX_DECOMPRESSION_SIZE} bytes")]
    TooLarge(usize),

    /// Zlib stream is corrupt or truncated
    #[error("corrupt compressed payload: {0}")]
    Corrupt(#[from] io::Error),
}

/// Swap byte 0 with 3 and 1 with 2, turning the stored prefix big-endian
pub const fn swap_length_prefix(prefix: [u8; 4]) -> [u8; 4] {
    [prefix[3], prefix[2], prefix[1], prefix[0]]
}

/// Original size declared by a compressed payload's prefix
pub fn declared_size(payload: &[u8]) -> Option<u32> {
    let (prefix, _) = payload.split_first_chunk::<4>()?;
    Some(u32::from_be_bytes(swap_length_prefix(*prefix)))
}

/// Inflate one compressed entry payload
///
/// The declared size only sizes the output buffer. A stream that inflates to
/// a different length is still returned as is.
pub fn inflate_entry(payload: &[u8]) -> Result<Vec<u8>, DecompressError> {
    let Some((prefix, stream)) = payload.split_first_chunk::<4>() else {
        return Err(DecompressError::TooShort(payload.len()));
    };
    let declared = u32::from_be_bytes(swap_length_prefix(*prefix)) as usize;
    if declared > MAX_DECOMPRESSION_SIZE {
        return Err(DecompressError::TooLarge(declared));
    }

    let mut decompressed = Vec::with_capacity(declared.min(INITIAL_CAPACITY_LIMIT));
    ZlibDecoder::new(stream)
        .take(MAX_DECOMPRESSION_SIZE as u64 + 1)
        .read_to_end(&mut decompressed)?;

    if decompressed.len() > MAX_DECOMPRESSION_SIZE {
        return Err(DecompressError::TooLarge(decompressed.len()));
    }
    Ok(decompressed)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use bsafs_test_utils::compress_payload;

    #[test]
    fn test_swap_length_prefix() {
        assert_eq!(swap_length_prefix([1, 2, 3, 4]), [4, 3, 2, 1]);
        assert_eq!(declared_size(&[0x00, 0x20, 0x00, 0x00, 0xff]), Some(8192));
        assert_eq!(declared_size(&[1, 2]), None);
    }

    #[test]
    fn test_inflate_round_trip() {
        let original: Vec<u8> = (0..5000u32).map(|i| (i % 7) as u8).collect();
        let payload = compress_payload(&original);
        assert_eq!(declared_size(&payload), Some(5000));
        assert_eq!(inflate_entry(&payload).unwrap(), original);
    }

    #[test]
    fn test_inflate_ignores_wrong_declared_size() {
        let mut payload = compress_payload(b"hello archive");
        payload[..4].copy_from_slice(&3u32.to_le_bytes());
        assert_eq!(inflate_entry(&payload).unwrap(), b"hello archive");
    }

    #[test]
    fn test_inflate_errors() {
        assert!(matches!(inflate_entry(&[1, 2, 3]), Err(DecompressError::TooShort(3))));

        let garbage = [0x10, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef, 0x00];
        assert!(matches!(inflate_entry(&garbage), Err(DecompressError::Corrupt(_))));

        let huge = [0xff, 0xff, 0xff, 0x7f];
        assert!(matches!(inflate_entry(&huge), Err(DecompressError::TooLarge(_))));
    }
}
