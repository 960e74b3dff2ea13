//! Stock device models built on the page map.
//!
//! Each device owns its storage and state, connects to a [`MemoryMap`] once
//! and claims the pages it decodes. They double as worked examples of the
//! [`BankConfig`](crate::BankConfig) API.
//!
//! - [`RamDevice`]: background RAM in the default slot, read and write.
//! - [`RomDevice`]: fixed ROM image, reads only; writes fall through.
//! - [`BankedRom`]: a large ROM image seen through a switchable window.
//! - [`IoPorts`]: a register block answered by handlers.
//!
//! # Example
//!
//! ```rust
//! use pagemap::{Device, MapConfig, MemoryBus, MemoryMap, RamDevice, RomDevice};
//!
//! let mut map = MemoryMap::new(MapConfig::default()).unwrap();
//!
//! let mut ram = RamDevice::new(0x10000);
//! ram.attach(&mut map).unwrap();
//!
//! let mut rom = RomDevice::new(0xC000, vec![0xEA; 0x4000]);
//! rom.attach(&mut map).unwrap();
//!
//! assert_eq!(map.read(0xC000), 0xEA);
//! map.write(0xC000, 0x01);
//! assert_eq!(ram.buffer().get(0xC000), 0x01);
//! ```

use crate::{DeviceId, MapResult, MemoryMap};

pub mod banked;
pub mod io;
pub mod ram;
pub mod rom;

pub use banked::BankedRom;
pub use io::IoPorts;
pub use ram::RamDevice;
pub use rom::RomDevice;

/// A hardware component that lives on the memory map.
pub trait Device {
    /// Label the device connects under.
    fn name(&self) -> &str;

    /// Slot the device holds, if attached.
    fn id(&self) -> Option<DeviceId>;

    /// Connect to `map` and claim the device's pages.
    ///
    /// Returns [`MapError::NoFreeSlot`](crate::MapError::NoFreeSlot) when the
    /// map is full; the device then stays detached.
    fn attach(&mut self, map: &mut MemoryMap) -> MapResult<DeviceId>;

    /// Release every page and leave `map`.
    fn detach(&mut self, map: &mut MemoryMap) -> MapResult<()>;
}
