//! Battery RAM save blob encoding.
//!
//! Saves travel as zlib streams wrapped in standard base64 so they can be
//! embedded in BSON string fields and stored by the client as text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

/// Errors raised while encoding or decoding a save blob.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("save data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("save data is not a zlib stream: {0}")]
    CorruptSave(std::io::Error),
    #[error("failed to compress save data: {0}")]
    Compress(std::io::Error),
}

/// Compresses raw battery RAM and returns it as base64 text.
pub fn compress_save(ram: &[u8]) -> Result<String, SaveError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(ram).map_err(SaveError::Compress)?;
    let compressed = encoder.finish().map_err(SaveError::Compress)?;
    Ok(STANDARD.encode(compressed))
}

/// Decodes base64 text and inflates it back into raw battery RAM.
///
/// Anything that is not a complete zlib stream is rejected as corrupt.
pub fn decompress_save(encoded: &str) -> Result<Vec<u8>, SaveError> {
    let compressed = STANDARD.decode(encoded.trim())?;
    let mut ram = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .read_to_end(&mut ram)
        .map_err(SaveError::CorruptSave)?;
    Ok(ram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cases: [Vec<u8>; 4] = [
            Vec::new(),
            vec![0x42],
            vec![0u8; 8192],
            (0..32768u32).map(|i| (i * 31 % 251) as u8).collect(),
        ];
        for ram in cases {
            let encoded = compress_save(&ram).unwrap();
            assert_eq!(decompress_save(&encoded).unwrap(), ram);
        }
    }

    #[test]
    fn test_rejects_uncompressed_payload() {
        let raw = STANDARD.encode(b"definitely not zlib");
        assert!(matches!(decompress_save(&raw), Err(SaveError::CorruptSave(_))));
    }

    #[test]
    fn test_rejects_bad_base64() {
        assert!(matches!(decompress_save("@@not base64@@"), Err(SaveError::Base64(_))));
    }
}
