//! Payload encodings used by the relay.
//!
//! - `palette`: 16-color indexed frames for `SCREEN_DRAW`
//! - `save`: zlib + base64 battery RAM blobs for `SAVE_DATA` and `SELECT_GAME`

pub mod palette;
pub mod save;

pub use palette::{encode_indexed, FrameError, IndexedFrame, Rgb, PALETTE_SIZE};
pub use save::{compress_save, decompress_save, SaveError};

/// Converts an RGBA byte buffer into packed `0x00RRGGBB` pixels, dropping alpha.
pub(crate) fn rgba_to_rgb24_pixels(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|px| (u32::from(px[0]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[2]))
        .collect()
}

/// Splits a packed `0x00RRGGBB` pixel back into its channels.
pub(crate) fn unpack_rgb(color: u32) -> Rgb {
    [(color >> 16) as u8, (color >> 8) as u8, color as u8]
}
