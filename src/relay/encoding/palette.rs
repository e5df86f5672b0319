//! 16-color indexed frame encoding.
//!
//! Frames are reduced to at most 16 representative colors with median cut,
//! every pixel is mapped to its nearest palette entry (squared RGB distance),
//! and the resulting 4-bit indices are packed two per byte, high nibble first.
//! Frames with 16 or fewer distinct colors therefore keep their exact colors.
//!
//! One extra row of index 0 is appended after the last real row because the
//! browser renderer drops the final row it receives.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use super::{rgba_to_rgb24_pixels, unpack_rgb};

/// Number of palette slots in every encoded frame.
pub const PALETTE_SIZE: usize = 16;

/// An RGB triple.
pub type Rgb = [u8; 3];

/// Errors raised while encoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for a {width}x{height} RGBA frame")]
    BufferSize {
        width: u16,
        height: u16,
        expected: usize,
        actual: usize,
    },
}

/// A quantized frame ready for `SCREEN_DRAW`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFrame {
    /// Width in pixels.
    pub width: u16,
    /// Height in rows, including the trailing padding row.
    pub height: u16,
    /// Exactly 16 colors; unused slots are black.
    pub palette: [Rgb; PALETTE_SIZE],
    /// Packed 4-bit indices, `ceil(width * height / 2)` bytes.
    pub screen: Bytes,
}

/// Encodes an RGBA frame as a 16-color palette plus packed 4-bit indices.
///
/// # Arguments
///
/// * `data` - Row-major RGBA pixels, exactly `width * height * 4` bytes.
/// * `width` - Frame width in pixels.
/// * `height` - Frame height in pixels, not counting the padding row.
///
/// # Returns
///
/// The encoded frame, whose `height` is `height + 1`.
pub fn encode_indexed(data: &[u8], width: u16, height: u16) -> Result<IndexedFrame, FrameError> {
    let expected = usize::from(width) * usize::from(height) * 4;
    if data.len() != expected {
        return Err(FrameError::BufferSize {
            width,
            height,
            expected,
            actual: data.len(),
        });
    }

    let pixels = rgba_to_rgb24_pixels(data);
    let colors = quantize(&pixels);

    let mut palette = [[0u8; 3]; PALETTE_SIZE];
    palette[..colors.len()].copy_from_slice(&colors);

    // Nearest-color lookup is only done once per distinct input color
    let mut color_map: HashMap<u32, u8> = HashMap::new();
    let mut indices = Vec::with_capacity(pixels.len() + usize::from(width));
    for &pixel in &pixels {
        let index = *color_map
            .entry(pixel)
            .or_insert_with(|| nearest_index(&colors, unpack_rgb(pixel)));
        indices.push(index);
    }

    // Compensating row for the renderer
    indices.resize(indices.len() + usize::from(width), 0);

    let mut buf = BytesMut::with_capacity(indices.len().div_ceil(2));
    for pair in indices.chunks(2) {
        let high = pair[0] << 4;
        let low = pair.get(1).copied().unwrap_or(0);
        buf.put_u8(high | low);
    }

    Ok(IndexedFrame {
        width,
        height: height + 1,
        palette,
        screen: buf.freeze(),
    })
}

/// Reduces the pixels to at most `PALETTE_SIZE` representative colors.
fn quantize(pixels: &[u32]) -> Vec<Rgb> {
    let mut histogram: BTreeMap<u32, u64> = BTreeMap::new();
    for &pixel in pixels {
        *histogram.entry(pixel).or_insert(0) += 1;
    }
    if histogram.is_empty() {
        return Vec::new();
    }

    let mut boxes = vec![ColorBox {
        colors: histogram.into_iter().collect(),
    }];

    while boxes.len() < PALETTE_SIZE {
        let widest = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(_, b)| b.widest_channel().1)
            .map(|(idx, _)| idx);

        let Some(idx) = widest else {
            break;
        };

        let (left, right) = boxes.remove(idx).split();
        boxes.insert(idx, right);
        boxes.insert(idx, left);
    }

    boxes.iter().map(ColorBox::average).collect()
}

/// Picks the palette entry closest to `color`, preferring the lowest index on ties.
fn nearest_index(palette: &[Rgb], color: Rgb) -> u8 {
    palette
        .iter()
        .enumerate()
        .min_by_key(|(idx, entry)| (distance_sq(**entry, color), *idx))
        .map_or(0, |(idx, _)| idx as u8)
}

fn distance_sq(a: Rgb, b: Rgb) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = i32::from(x) - i32::from(y);
            (d * d) as u32
        })
        .sum()
}

/// A set of distinct colors with their pixel counts.
struct ColorBox {
    colors: Vec<(u32, u64)>,
}

impl ColorBox {
    /// Returns the channel (0 = R, 1 = G, 2 = B) with the largest spread and that spread.
    fn widest_channel(&self) -> (usize, u8) {
        (0..3)
            .map(|channel| {
                let (min, max) = self.colors.iter().fold((u8::MAX, u8::MIN), |(lo, hi), &(c, _)| {
                    let v = unpack_rgb(c)[channel];
                    (lo.min(v), hi.max(v))
                });
                (channel, max - min)
            })
            .max_by_key(|&(channel, spread)| (spread, std::cmp::Reverse(channel)))
            .unwrap_or((0, 0))
    }

    /// Splits at the pixel-weighted median of the widest channel.
    ///
    /// Both halves are non-empty; callers only split boxes with two or more colors.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let (channel, _) = self.widest_channel();
        self.colors
            .sort_by_key(|&(c, _)| (unpack_rgb(c)[channel], c));

        let total: u64 = self.colors.iter().map(|&(_, n)| n).sum();
        let mut acc = 0;
        let mut cut = self.colors.len() - 1;
        for (i, &(_, n)) in self.colors.iter().enumerate() {
            acc += n;
            if acc * 2 >= total {
                cut = i + 1;
                break;
            }
        }
        let cut = cut.clamp(1, self.colors.len() - 1);

        let right = self.colors.split_off(cut);
        (self, ColorBox { colors: right })
    }

    /// Pixel-weighted mean color, rounded to nearest.
    fn average(&self) -> Rgb {
        let total: u64 = self.colors.iter().map(|&(_, n)| n).sum();
        let mut sums = [0u64; 3];
        for &(c, n) in &self.colors {
            for (sum, v) in sums.iter_mut().zip(unpack_rgb(c)) {
                *sum += u64::from(v) * n;
            }
        }
        sums.map(|s| ((s + total / 2) / total.max(1)) as u8)
    }
}
