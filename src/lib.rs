//! # Bank-Switching Page Map
//!
//! A priority-resolved, paged memory map for vintage computer emulators.
//!
//! Several emulated devices (ROM banks, RAM, memory-mapped I/O) can claim the
//! same 1 KiB pages of the address space at the same time. On every access
//! the map answers with the mapping of the highest-priority claimant, and
//! when that device lets go of a page the next claimant down is restored
//! exactly as it was. Reads and writes are resolved separately, so a page
//! can read from ROM while its writes go to the RAM underneath.
//!
//! ## Quick Start
//!
//! ```rust
//! use pagemap::{BankConfig, MapConfig, MemoryBus, MemoryMap, SharedBuffer};
//!
//! let mut map = MemoryMap::new(MapConfig::default()).unwrap();
//!
//! let ram = SharedBuffer::zeroed(0x10000);
//! let ram_id = map.connect_default("ram").unwrap();
//! map.alloc_ram(ram_id, 0x0000, 0x10000, &ram);
//!
//! let kernal = SharedBuffer::new(vec![0x4C; 0x2000]);
//! let rom_id = map.connect("kernal", true).unwrap();
//! map.alloc_read_direct(rom_id, 0xE000, 0x2000, &kernal);
//!
//! assert_eq!(map.read(0xE000), 0x4C);
//! map.write(0xE000, 0x00);
//! assert_eq!(ram.get(0xE000), 0x00);
//! ```
//!
//! ## Architecture
//!
//! - **Priority**: device ids run from 0 (highest) to 7. Id 7
//!   ([`DeviceId::DEFAULT`]) is the background device; it covers every page
//!   and can never release, so no access ever hits a hole.
//! - **Resolution**: each direction keeps a page table (what is visible), a
//!   per-page priority chain and a mirror of every device's own claims.
//! - **Access**: a page is either buffer-backed ([`SharedBuffer`]) or
//!   handler-backed ([`ReadHandler`] / [`WriteHandler`]).
//!
//! ## Modules
//!
//! - `page` - page geometry and [`DeviceId`]
//! - `buffer` - device-owned byte buffers
//! - `resolver` - claim/release engine shared by both directions
//! - `read` / `write` - per-direction managers and handler traits
//! - `memory_map` - the [`MemoryMap`] facade and its capability traits
//! - `devices` - stock RAM, ROM, banked ROM and I/O port devices
//!
//! ## Errors
//!
//! Running out of device slots, bad construction parameters and by-name
//! lookups are reported as [`MapError`]. Broken call contracts (an unknown
//! device id, an address outside the space, an unaligned buffer mapping)
//! panic.

pub mod buffer;
pub mod config;
pub mod devices;
pub mod memory_map;
pub mod page;
pub mod read;
pub mod resolver;
pub mod wasm;
pub mod write;

use thiserror::Error;

// Re-export public API
pub use buffer::SharedBuffer;
pub use config::MapConfig;
pub use devices::{BankedRom, Device, IoPorts, RamDevice, RomDevice};
pub use memory_map::{BankConfig, MemoryBus, MemoryMap};
pub use page::{DeviceId, PageRange, MAX_DEVICES, PAGE_BITS, PAGE_MASK, PAGE_SIZE};
pub use read::{read_table, ReadHandler, ReadManager, ReadTable};
pub use resolver::{Backing, PageTable, Resolver, SharedPageTable};
pub use write::{write_table, WriteHandler, WriteManager, WriteTable};

/// Recoverable failures of the page map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// Every non-default slot is taken.
    #[error("no free device slot")]
    NoFreeSlot,

    /// The background slot already belongs to a device.
    #[error("the default slot is already held by a device")]
    DefaultTaken,

    /// The background device cannot leave.
    #[error("the default device cannot be disconnected")]
    DefaultPinned,

    /// Only one direction was given an external page table.
    #[error("external page tables must be supplied for both directions or neither")]
    PartialExternalTables,

    /// The space size is zero or not a whole number of pages.
    #[error("address space size 0x{0:X} is not a non-zero multiple of the page size")]
    InvalidSpaceSize(u32),

    /// An injected page table has the wrong number of entries.
    #[error("page table has {actual} pages, expected {expected}")]
    TableSizeMismatch { expected: usize, actual: usize },

    /// The device id has no device behind it.
    #[error("device {0} is not connected")]
    NotConnected(DeviceId),

    /// Another connected device already uses this name.
    #[error("a device named '{0}' is already connected")]
    DuplicateName(String),

    /// No connected device carries this name.
    #[error("no device named '{0}'")]
    UnknownDevice(String),
}

/// Result alias for page map operations.
pub type MapResult<T> = Result<T, MapError>;
