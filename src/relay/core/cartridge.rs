//! Cartridge header parsing.

use super::CoreError;

const TITLE_START: usize = 0x134;
const TITLE_END: usize = 0x144;
const CGB_FLAG: usize = 0x143;
const CARTRIDGE_TYPE: usize = 0x147;
const RAM_SIZE: usize = 0x149;
const HEADER_CHECKSUM: usize = 0x14D;

/// Smallest image that still contains a complete header.
pub const HEADER_LEN: usize = 0x150;

/// ROM information extracted from the cartridge header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    /// Internal program name
    pub title: String,
    /// Cartridge type byte
    pub cartridge_type: u8,
    /// External RAM size in bytes
    pub ram_size: usize,
    /// Whether the cartridge keeps its RAM on a battery
    pub has_battery: bool,
}

impl CartridgeHeader {
    /// Parses and validates the header of a program image.
    pub fn parse(image: &[u8]) -> Result<Self, CoreError> {
        if image.len() < HEADER_LEN {
            return Err(CoreError::ImageTooSmall { len: image.len() });
        }

        let expected = header_checksum(image);
        if image[HEADER_CHECKSUM] != expected {
            return Err(CoreError::HeaderChecksum {
                expected,
                found: image[HEADER_CHECKSUM],
            });
        }

        // Color titles are one byte shorter; the last byte is the CGB flag
        let title_end = match image[CGB_FLAG] {
            0x80 | 0xC0 => CGB_FLAG,
            _ => TITLE_END,
        };
        let title: String = image[TITLE_START..title_end]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
            .collect();

        let cartridge_type = image[CARTRIDGE_TYPE];
        let ram_size = match cartridge_type {
            // MBC2 carries 512 half-bytes of internal RAM
            0x05 | 0x06 => 512,
            _ => ram_size_bytes(image[RAM_SIZE]),
        };

        Ok(Self {
            title: title.trim_end().to_string(),
            cartridge_type,
            ram_size,
            has_battery: has_battery(cartridge_type),
        })
    }

    /// Size of the RAM that must survive power-off, zero when there is none.
    pub fn battery_ram_size(&self) -> usize {
        if self.has_battery {
            self.ram_size
        } else {
            0
        }
    }
}

/// Computes the header checksum over 0x134..=0x14C.
pub fn header_checksum(image: &[u8]) -> u8 {
    image[TITLE_START..HEADER_CHECKSUM]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
}

fn ram_size_bytes(code: u8) -> usize {
    match code {
        0x01 => 2 * 1024,
        0x02 => 8 * 1024,
        0x03 => 32 * 1024,
        0x04 => 128 * 1024,
        0x05 => 64 * 1024,
        _ => 0,
    }
}

fn has_battery(cartridge_type: u8) -> bool {
    matches!(
        cartridge_type,
        0x03 | 0x06 | 0x09 | 0x0D | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E | 0x22 | 0xFF
    )
}
