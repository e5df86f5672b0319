//! Emulation core capability interface.
//!
//! The relay never looks inside the emulator. Sessions drive it through
//! [`EmulationCore`], and fresh, isolated instances come from a
//! [`CoreFactory`]. The [`pattern`] module ships a headless reference core
//! used by the binary and the tests.

pub mod cartridge;
pub mod pattern;

use once_cell::sync::Lazy;
use std::collections::HashMap;
use thiserror::Error;

pub use cartridge::CartridgeHeader;
pub use pattern::{PatternCore, PatternCoreFactory};

/// Native screen width of the reference hardware.
pub const NATIVE_WIDTH: u16 = 160;
/// Native screen height of the reference hardware.
pub const NATIVE_HEIGHT: u16 = 144;

/// A joypad input as understood by the emulation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputCode(pub u8);

/// Button names accepted in `PRESS_BUTTON`, mapped to core input codes.
pub static KEY_MAP: Lazy<HashMap<&'static str, InputCode>> = Lazy::new(|| {
    [
        ("RIGHT", 0),
        ("LEFT", 1),
        ("UP", 2),
        ("DOWN", 3),
        ("A", 4),
        ("B", 5),
        ("SELECT", 6),
        ("START", 7),
    ]
    .into_iter()
    .map(|(name, code)| (name, InputCode(code)))
    .collect()
});

/// Looks up a button name in [`KEY_MAP`].
pub fn input_code(button: &str) -> Option<InputCode> {
    KEY_MAP.get(button).copied()
}

/// Callback invoked by a core after every write to battery-backed RAM.
pub type BatteryObserver = Box<dyn FnMut() + Send>;

/// Errors raised by an emulation core.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("program image is {len} bytes, too small to hold a cartridge header")]
    ImageTooSmall { len: usize },
    #[error("cartridge header checksum mismatch (expected {expected:#04x}, found {found:#04x})")]
    HeaderChecksum { expected: u8, found: u8 },
}

/// The narrow surface the relay needs from an emulator.
///
/// One instance belongs to exactly one session and is only touched from that
/// session's worker thread.
pub trait EmulationCore: Send {
    /// Loads a program image, optionally restoring battery RAM, and returns
    /// the program name embedded in the image.
    fn load(&mut self, image: &[u8], save: Option<&[u8]>) -> Result<String, CoreError>;

    /// Replaces the set of inputs currently held down.
    fn set_held(&mut self, codes: &[InputCode]);

    /// Runs the emulator for exactly one video frame.
    fn advance_frame(&mut self);

    /// Screen dimensions of [`read_pixels`](Self::read_pixels).
    fn dimensions(&self) -> (u16, u16) {
        (NATIVE_WIDTH, NATIVE_HEIGHT)
    }

    /// Current screen as row-major RGBA.
    fn read_pixels(&self) -> &[u8];

    /// Current contents of battery-backed RAM; empty when the program has none.
    fn battery_ram(&self) -> &[u8];

    /// Registers the callback fired after each battery RAM write.
    fn on_battery_write(&mut self, observer: BatteryObserver);
}

/// Creates fresh, unshared emulation core instances.
pub trait CoreFactory: Send + Sync {
    fn create(&self) -> Box<dyn EmulationCore>;
}
