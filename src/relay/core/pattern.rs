//! Headless reference core.
//!
//! `PatternCore` does not execute the program. It reads the cartridge header,
//! keeps battery RAM the size the header declares, and renders a moving
//! four-shade test pattern that reacts to held inputs. Every newly pressed
//! input is appended to battery RAM so saves and autosave have something to
//! persist. Deployments with a full emulator plug it in through
//! [`EmulationCore`] instead.

use super::{
    BatteryObserver, CartridgeHeader, CoreError, CoreFactory, EmulationCore, InputCode,
    NATIVE_HEIGHT, NATIVE_WIDTH,
};

/// Classic DMG green shades, darkest first.
const SHADES: [[u8; 3]; 4] = [
    [0x0F, 0x38, 0x0F],
    [0x30, 0x62, 0x30],
    [0x8B, 0xAC, 0x0F],
    [0x9B, 0xBC, 0x0F],
];

/// Reference core rendering a test pattern.
pub struct PatternCore {
    header: Option<CartridgeHeader>,
    pixels: Vec<u8>,
    ram: Vec<u8>,
    held: u8,
    previous: u8,
    presses: usize,
    frame: u64,
    observer: Option<BatteryObserver>,
}

impl PatternCore {
    pub fn new() -> Self {
        let mut core = Self {
            header: None,
            pixels: vec![0; usize::from(NATIVE_WIDTH) * usize::from(NATIVE_HEIGHT) * 4],
            ram: Vec::new(),
            held: 0,
            previous: 0,
            presses: 0,
            frame: 0,
            observer: None,
        };
        core.render();
        core
    }

    /// Number of frames advanced since the last load.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    fn render(&mut self) {
        let scroll = (self.frame / 4) as usize;
        let held = self.held.count_ones() as usize;
        let width = usize::from(NATIVE_WIDTH);
        for (i, px) in self.pixels.chunks_exact_mut(4).enumerate() {
            let (x, y) = (i % width, i / width);
            let shade = SHADES[(x / 8 + y / 8 + scroll + held) % SHADES.len()];
            px[..3].copy_from_slice(&shade);
            px[3] = 0xFF;
        }
    }

    fn write_battery(&mut self, value: u8) {
        if self.ram.is_empty() {
            return;
        }
        let slot = self.presses % self.ram.len();
        self.ram[slot] = value;
        self.presses += 1;
        if let Some(observer) = self.observer.as_mut() {
            observer();
        }
    }
}

impl Default for PatternCore {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulationCore for PatternCore {
    fn load(&mut self, image: &[u8], save: Option<&[u8]>) -> Result<String, CoreError> {
        let header = CartridgeHeader::parse(image)?;

        self.ram = vec![0; header.battery_ram_size()];
        if let Some(save) = save {
            let len = save.len().min(self.ram.len());
            self.ram[..len].copy_from_slice(&save[..len]);
        }

        self.held = 0;
        self.previous = 0;
        self.presses = 0;
        self.frame = 0;
        let title = header.title.clone();
        self.header = Some(header);
        self.render();
        Ok(title)
    }

    fn set_held(&mut self, codes: &[InputCode]) {
        self.held = codes
            .iter()
            .filter(|code| code.0 < 8)
            .fold(0, |mask, code| mask | (1 << code.0));
    }

    fn advance_frame(&mut self) {
        if self.header.is_none() {
            return;
        }

        let pressed = self.held & !self.previous;
        for bit in 0..8u8 {
            if pressed & (1 << bit) != 0 {
                self.write_battery(bit + 1);
            }
        }
        self.previous = self.held;
        self.frame += 1;
        self.render();
    }

    fn read_pixels(&self) -> &[u8] {
        &self.pixels
    }

    fn battery_ram(&self) -> &[u8] {
        &self.ram
    }

    fn on_battery_write(&mut self, observer: BatteryObserver) {
        self.observer = Some(observer);
    }
}

/// Creates [`PatternCore`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternCoreFactory;

impl CoreFactory for PatternCoreFactory {
    fn create(&self) -> Box<dyn EmulationCore> {
        Box::new(PatternCore::new())
    }
}
