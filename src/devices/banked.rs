//! Bank-switched ROM.
//!
//! A cartridge or expansion ROM larger than its address window. Selecting a
//! bank re-claims the window with a different offset into the image;
//! disabling the ROM releases the window and whatever sits underneath shows
//! through again.

use log::debug;

use super::Device;
use crate::{BankConfig, DeviceId, MapError, MapResult, MemoryMap, SharedBuffer, PAGE_MASK};

/// ROM image seen through a fixed-size window, one bank at a time.
///
/// # Examples
///
/// ```rust
/// use pagemap::{BankedRom, Device, MapConfig, MemoryBus, MemoryMap};
///
/// let mut map = MemoryMap::new(MapConfig::default()).unwrap();
///
/// // Four 8 KiB banks; every byte holds its bank number.
/// let image: Vec<u8> = (0..4u8).flat_map(|bank| vec![bank; 0x2000]).collect();
/// let mut cart = BankedRom::new(0x8000, 0x2000, image);
/// cart.attach(&mut map).unwrap();
///
/// assert_eq!(map.read(0x8000), 0);
/// cart.select_bank(&mut map, 3);
/// assert_eq!(map.read(0x9FFF), 3);
/// ```
pub struct BankedRom {
    name: String,
    base: u32,
    window: u32,
    image: SharedBuffer,
    bank: usize,
    enabled: bool,
    id: Option<DeviceId>,
}

impl BankedRom {
    /// `image` seen through `window` bytes at `base`, starting at bank 0.
    ///
    /// # Panics
    ///
    /// Panics if `base` or `window` is not a multiple of
    /// [`PAGE_SIZE`](crate::PAGE_SIZE), or if the image is not a whole
    /// number of windows.
    pub fn new(base: u32, window: u32, image: Vec<u8>) -> Self {
        assert!(
            base & PAGE_MASK == 0 && window & PAGE_MASK == 0,
            "bank window 0x{:X}+0x{:X} is not page aligned",
            base,
            window
        );
        assert!(
            window > 0 && !image.is_empty() && image.len() % window as usize == 0,
            "image of 0x{:X} bytes is not a whole number of 0x{:X}-byte banks",
            image.len(),
            window
        );
        Self {
            name: format!("banked@{:04X}", base),
            base,
            window,
            image: SharedBuffer::new(image),
            bank: 0,
            enabled: true,
            id: None,
        }
    }

    /// Rename the device.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Number of banks in the image.
    pub fn bank_count(&self) -> usize {
        self.image.len() / self.window as usize
    }

    /// Bank currently selected.
    pub fn bank(&self) -> usize {
        self.bank
    }

    /// Whether the window is claimed.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Switch the window to `bank`.
    ///
    /// Only the low bits that address an existing bank are decoded, as on
    /// hardware where the bank latch is wider than the ROM.
    pub fn select_bank<M: BankConfig + ?Sized>(&mut self, map: &mut M, bank: usize) {
        self.bank = bank % self.bank_count();
        debug!("{}: bank {}", self.name, self.bank);
        if self.enabled {
            self.claim(map);
        }
    }

    /// Release the window so the device underneath shows through.
    pub fn disable<M: BankConfig + ?Sized>(&mut self, map: &mut M) {
        if let (true, Some(id)) = (self.enabled, self.id) {
            map.release_read(id, self.base, self.window);
        }
        self.enabled = false;
    }

    /// Claim the window again with the selected bank.
    pub fn enable<M: BankConfig + ?Sized>(&mut self, map: &mut M) {
        self.enabled = true;
        self.claim(map);
    }

    fn claim<M: BankConfig + ?Sized>(&self, map: &mut M) {
        if let Some(id) = self.id {
            let offset = self.bank * self.window as usize;
            map.alloc_read_window(id, self.base, self.window, &self.image, offset);
        }
    }
}

impl Device for BankedRom {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<DeviceId> {
        self.id
    }

    fn attach(&mut self, map: &mut MemoryMap) -> MapResult<DeviceId> {
        let id = map.connect(&self.name, true)?;
        self.id = Some(id);
        if self.enabled {
            self.claim(map);
        }
        Ok(id)
    }

    fn detach(&mut self, map: &mut MemoryMap) -> MapResult<()> {
        let id = self
            .id
            .take()
            .ok_or_else(|| MapError::UnknownDevice(self.name.clone()))?;
        map.disconnect(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MapConfig, MemoryBus, RamDevice};

    fn image(banks: u8, window: usize) -> Vec<u8> {
        (0..banks).flat_map(|bank| vec![0xB0 | bank; window]).collect()
    }

    fn map_with_ram() -> (MemoryMap, RamDevice) {
        let mut map = MemoryMap::new(MapConfig::default()).unwrap();
        let mut ram = RamDevice::new(0x10000);
        ram.attach(&mut map).unwrap();
        (map, ram)
    }

    #[test]
    fn test_bank_switching() {
        let (mut map, _ram) = map_with_ram();
        let mut cart = BankedRom::new(0x8000, 0x4000, image(4, 0x4000));
        cart.attach(&mut map).unwrap();
        assert_eq!(cart.bank_count(), 4);

        for bank in 0..4 {
            cart.select_bank(&mut map, bank);
            assert_eq!(map.read(0x8000), 0xB0 | bank as u8);
            assert_eq!(map.read(0xBFFF), 0xB0 | bank as u8);
        }
    }

    #[test]
    fn test_bank_number_wraps() {
        let (mut map, _ram) = map_with_ram();
        let mut cart = BankedRom::new(0x8000, 0x2000, image(4, 0x2000));
        cart.attach(&mut map).unwrap();

        cart.select_bank(&mut map, 6);
        assert_eq!(cart.bank(), 2);
        assert_eq!(map.read(0x8000), 0xB2);
    }

    #[test]
    fn test_disable_shows_ram() {
        let (mut map, ram) = map_with_ram();
        ram.load_bytes(0x8000, &[0x42]);
        let mut cart = BankedRom::new(0x8000, 0x2000, image(2, 0x2000));
        cart.attach(&mut map).unwrap();

        cart.disable(&mut map);
        assert!(!cart.is_enabled());
        assert_eq!(map.read(0x8000), 0x42);

        // Selecting while disabled only latches the bank.
        cart.select_bank(&mut map, 1);
        assert_eq!(map.read(0x8000), 0x42);

        cart.enable(&mut map);
        assert_eq!(map.read(0x8000), 0xB1);
    }

    #[test]
    fn test_bank_under_higher_priority_rom() {
        let (mut map, _ram) = map_with_ram();
        let mut cart = BankedRom::new(0x8000, 0x2000, image(2, 0x2000)).with_name("cart");
        let mut rom = crate::RomDevice::new(0x8000, vec![0xEE; 0x400]);

        rom.attach(&mut map).unwrap(); // slot 0
        cart.attach(&mut map).unwrap(); // slot 1
        cart.select_bank(&mut map, 1);

        assert_eq!(map.read(0x8000), 0xEE);
        assert_eq!(map.read(0x8400), 0xB1);

        rom.detach(&mut map).unwrap();
        assert_eq!(map.read(0x8000), 0xB1);
    }

    #[test]
    #[should_panic(expected = "not page aligned")]
    fn test_sub_page_window_panics() {
        let image: Vec<u8> = (0..4u8).flat_map(|bank| vec![bank; 0x100]).collect();
        let _ = BankedRom::new(0x8000, 0x100, image);
    }

    #[test]
    #[should_panic(expected = "not page aligned")]
    fn test_unaligned_base_panics() {
        let _ = BankedRom::new(0x8100, 0x400, vec![0; 0x800]);
    }

    #[test]
    #[should_panic(expected = "whole number")]
    fn test_ragged_image_panics() {
        let _ = BankedRom::new(0x8000, 0x2000, vec![0; 0x3000]);
    }
}
