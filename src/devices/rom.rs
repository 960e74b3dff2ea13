//! ROM device.
//!
//! Claims its pages in the read direction only. Writes to the same
//! addresses reach whatever sits underneath in the write direction, which
//! is how most 8-bit machines behave ("write under ROM").

use super::Device;
use crate::{BankConfig, DeviceId, MapError, MapResult, MemoryMap, SharedBuffer, PAGE_MASK};

/// Read-only memory at a fixed base address.
///
/// `RomDevice` claims its pages for reads only, at the highest free priority
/// unless [`low_priority`](RomDevice::low_priority) is asked for. Images
/// that end inside a page are zero-padded to the page boundary.
///
/// # Examples
///
/// ```rust
/// use pagemap::{Device, MapConfig, MemoryBus, MemoryMap, RomDevice};
///
/// let mut map = MemoryMap::new(MapConfig::default()).unwrap();
///
/// let mut rom_data = vec![0; 0x4000];
/// rom_data[0x3FFC] = 0x00; // reset vector low byte
/// rom_data[0x3FFD] = 0xC0; // reset vector high byte
///
/// let mut rom = RomDevice::new(0xC000, rom_data);
/// rom.attach(&mut map).unwrap();
///
/// assert_eq!(map.read(0xFFFD), 0xC0);
/// ```
pub struct RomDevice {
    name: String,
    base: u32,
    data: SharedBuffer,
    high_priority: bool,
    id: Option<DeviceId>,
}

impl RomDevice {
    /// Create a ROM device holding `data`, to be mapped at `base`.
    ///
    /// The device is named after its base address (`rom@C000`).
    ///
    /// # Arguments
    ///
    /// * `base` - First address of the ROM; must be page aligned
    /// * `data` - ROM image, padded with zeroes to a whole number of pages
    ///
    /// # Returns
    ///
    /// A detached `RomDevice`
    ///
    /// # Panics
    ///
    /// Panics if `base` is not a multiple of [`PAGE_SIZE`](crate::PAGE_SIZE).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pagemap::RomDevice;
    ///
    /// let boot = RomDevice::new(0x0000, vec![0x31; 0x100]); // 256-byte boot ROM
    /// assert_eq!(boot.size(), 0x400);
    /// ```
    pub fn new(base: u32, data: Vec<u8>) -> Self {
        assert!(
            base & PAGE_MASK == 0,
            "ROM base 0x{:X} is not page aligned",
            base
        );
        Self {
            name: format!("rom@{:04X}", base),
            base,
            data: SharedBuffer::whole_pages(data),
            high_priority: true,
            id: None,
        }
    }

    /// Rename the device.
    ///
    /// # Arguments
    ///
    /// * `name` - Label to connect under (e.g. "basic", "kernal")
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pagemap::{Device, RomDevice};
    ///
    /// let kernal = RomDevice::new(0xE000, vec![0; 0x2000]).with_name("kernal");
    /// assert_eq!(kernal.name(), "kernal");
    /// ```
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Ask for the lowest free priority instead of the highest.
    ///
    /// Useful for a ROM that other devices should be able to cover, such as
    /// a cartridge image sitting under bank-switched overlays.
    pub fn low_priority(mut self) -> Self {
        self.high_priority = false;
        self
    }

    /// The ROM image, padding included.
    pub fn buffer(&self) -> &SharedBuffer {
        &self.data
    }

    /// Size of the mapped image in bytes.
    ///
    /// # Returns
    ///
    /// The image length rounded up to whole pages
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl Device for RomDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<DeviceId> {
        self.id
    }

    fn attach(&mut self, map: &mut MemoryMap) -> MapResult<DeviceId> {
        let id = map.connect(&self.name, self.high_priority)?;
        map.alloc_read_direct(id, self.base, self.data.len() as u32, &self.data);
        self.id = Some(id);
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
