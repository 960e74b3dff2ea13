//! Background RAM device.
//!
//! Takes the default slot and covers its whole range in both directions, so
//! anything not claimed by another device reads and writes plain RAM.

use super::Device;
use crate::{BankConfig, DeviceId, MapError, MapResult, MemoryMap, SharedBuffer, PAGE_SIZE};

/// RAM mapped at address 0 under everything else.
///
/// `RamDevice` takes the default slot, so it can only be attached once per
/// map and never detached. Every page it covers is readable and writable
/// unless a higher-priority device claims it.
///
/// # Examples
///
/// ```rust
/// use pagemap::{Device, MapConfig, MemoryBus, MemoryMap, RamDevice};
///
/// let mut map = MemoryMap::new(MapConfig::new(0x4000)).unwrap();
/// let mut ram = RamDevice::new(0x4000);
/// ram.attach(&mut map).unwrap();
///
/// map.write(0x1234, 0x42);
/// assert_eq!(map.read(0x1234), 0x42);
/// ```
pub struct RamDevice {
    data: SharedBuffer,
    id: Option<DeviceId>,
}

impl RamDevice {
    /// Create a new RAM device with the specified size.
    ///
    /// All bytes are initialized to zero.
    ///
    /// # Arguments
    ///
    /// * `size` - Number of bytes, a non-zero multiple of [`PAGE_SIZE`]
    ///
    /// # Returns
    ///
    /// A detached `RamDevice`
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero or not a whole number of pages.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pagemap::RamDevice;
    ///
    /// let ram = RamDevice::new(0x4000); // 16KB RAM
    /// assert_eq!(ram.buffer().len(), 0x4000);
    /// ```
    pub fn new(size: usize) -> Self {
        assert!(
            size > 0 && size % PAGE_SIZE == 0,
            "RAM size 0x{:X} is not a whole number of pages",
            size
        );
        Self {
            data: SharedBuffer::zeroed(size),
            id: None,
        }
    }

    /// Load bytes into RAM at the specified offset.
    ///
    /// This is useful for initializing RAM contents with program data or
    /// preloaded values, before or after the device is attached.
    ///
    /// # Arguments
    ///
    /// * `offset` - Starting offset within the RAM device
    /// * `bytes` - Slice of bytes to load
    ///
    /// # Panics
    ///
    /// Panics if `offset + bytes.len()` exceeds the RAM size.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pagemap::RamDevice;
    ///
    /// let ram = RamDevice::new(0x400);
    /// ram.load_bytes(0x100, &[0x01, 0x02, 0x03]);
    ///
    /// assert_eq!(ram.buffer().get(0x100), 0x01);
    /// assert_eq!(ram.buffer().get(0x102), 0x03);
    /// ```
    pub fn load_bytes(&self, offset: usize, bytes: &[u8]) {
        self.data.load(offset, bytes);
    }

    /// The RAM contents.
    ///
    /// # Returns
    ///
    /// A handle sharing storage with the map, so writes through the bus
    /// show up here immediately
    pub fn buffer(&self) -> &SharedBuffer {
        &self.data
    }
}

impl Device for RamDevice {
    fn name(&self) -> &str {
        "ram"
    }

    fn id(&self) -> Option<DeviceId> {
        self.id
    }

    fn attach(&mut self, map: &mut MemoryMap) -> MapResult<DeviceId> {
        let id = map.connect_default(self.name())?;
        map.alloc_ram(id, 0, self.data.len() as u32, &self.data);
        self.id = Some(id);
        Ok(id)
    }

    fn detach(&mut self, _map: &mut MemoryMap) -> MapResult<()> {
        Err(MapError::DefaultPinned)
    }
}
