//! Conditional gzip of text plaintexts.
//!
//! A blob is classified as binary if the first 8 KiB contain a NUL byte;
//! binary blobs pass through untouched, textual blobs are gzipped at level 2
//! before encryption. Decompression is self-describing: a decrypted blob
//! that carries the gzip magic and inflates cleanly is inflated, anything
//! else passes through. No metadata needs to travel with the blob.

use crate::error::Result;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const SNIFF_LEN: usize = 8 * 1024;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_LEVEL: u32 = 2;

/// NUL byte anywhere in the first 8 KiB means binary.
pub fn is_binary(data: &[u8]) -> bool {
    let sniff = &data[..data.len().min(SNIFF_LEN)];
    sniff.contains(&0)
}

/// Gzip textual data; return binary data unchanged.
pub fn encode(data: &[u8]) -> Result<Vec<u8>> {
    if is_binary(data) {
        return Ok(data.to_vec());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(GZIP_LEVEL));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate if the payload is a well-formed gzip stream, else pass through.
pub fn decode(data: &[u8]) -> Vec<u8> {
    if data.len() < 2 || data[..2] != GZIP_MAGIC {
        return data.to_vec();
    }
    let mut inflated = Vec::new();
    match GzDecoder::new(data).read_to_end(&mut inflated) {
        Ok(_) => inflated,
        // Magic collision in opaque data; the payload was never compressed.
        Err(_) => data.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_detected() {
        assert!(!is_binary(b"hello world\n"));
        assert!(!is_binary(b""));
    }

    #[test]
    fn test_nul_means_binary() {
        assert!(is_binary(b"abc\0def"));
    }

    #[test]
    fn test_nul_past_sniff_window_is_text() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0);
        assert!(!is_binary(&data));
    }

    #[test]
    fn test_text_roundtrip() {
        let text = b"line one\nline two\nline two\nline two\n";
        let packed = encode(text).unwrap();
        assert_ne!(packed, text.to_vec());
        assert_eq!(packed[..2], GZIP_MAGIC);
        assert_eq!(decode(&packed), text.to_vec());
    }

    #[test]
    fn test_binary_passthrough() {
        let blob: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let packed = encode(&blob).unwrap();
        assert_eq!(packed, blob);
        assert_eq!(decode(&packed), blob);
    }

    #[test]
    fn test_decode_leaves_non_gzip_alone() {
        assert_eq!(decode(b"plain"), b"plain".to_vec());
        // Starts with the gzip magic but is not a gzip stream.
        let fake = [0x1f, 0x8b, 0xff, 0xff, 0x00];
        assert_eq!(decode(&fake), fake.to_vec());
    }

    #[test]
    fn test_compression_shrinks_repetitive_text() {
        let text = "the same line over and over\n".repeat(200);
        let packed = encode(text.as_bytes()).unwrap();
        assert!(packed.len() < text.len() / 2);
    }
}
