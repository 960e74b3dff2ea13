//! The page map as seen by the rest of the emulator.
//!
//! [`MemoryMap`] pairs one [`ReadManager`] with one [`WriteManager`] and keeps
//! their device slots in lockstep, so a device gets the same [`DeviceId`] in
//! both directions. Collaborators see it through two traits:
//!
//! - [`BankConfig`]: what device models use at power-on and on bank switches.
//! - [`MemoryBus`]: what the CPU core uses on every memory cycle.
//!
//! # Example
//!
//! ```rust
//! use pagemap::{BankConfig, MapConfig, MemoryBus, MemoryMap, SharedBuffer};
//!
//! let mut map = MemoryMap::new(MapConfig::new(0x10000)).unwrap();
//!
//! // Background RAM under the whole space, both directions.
//! let ram = SharedBuffer::zeroed(0x10000);
//! let ram_id = map.connect_default("ram").unwrap();
//! map.alloc_ram(ram_id, 0, 0x10000, &ram);
//!
//! // An 8 KiB ROM over the bottom of the read space only.
//! let rom = SharedBuffer::new(vec![0xEA; 0x2000]);
//! let rom_id = map.connect("rom", true).unwrap();
//! map.alloc_read_direct(rom_id, 0x0000, 0x2000, &rom);
//!
//! map.write(0x0000, 0x42);
//! assert_eq!(map.read(0x0000), 0xEA);
//! assert_eq!(ram.get(0x0000), 0x42);
//!
//! map.release_read(rom_id, 0x0000, 0x2000);
//! assert_eq!(map.read(0x0000), 0x42);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, info};

use crate::buffer::SharedBuffer;
use crate::config::MapConfig;
use crate::page::{DeviceId, PAGE_SIZE};
use crate::read::{ReadHandler, ReadManager, ReadTable};
use crate::write::{WriteHandler, WriteManager, WriteTable};
use crate::{MapError, MapResult};

/// Byte access as performed by a CPU core.
///
/// Reads and writes never fail: unmapped reads return the floating-bus
/// value and unmapped writes are dropped.
pub trait MemoryBus {
    /// Read the byte visible at `addr`.
    fn read(&self, addr: u32) -> u8;

    /// Write `value` to whatever receives writes at `addr`.
    fn write(&mut self, addr: u32, value: u8);
}

/// Mapping changes as performed by device models.
///
/// All methods take the [`DeviceId`] the device got from `connect`. Address
/// ranges are in bytes and rounded out to whole pages.
pub trait BankConfig {
    /// Map reads of `[addr, addr + length)` onto `buffer` from `offset` on.
    fn alloc_read_window(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        buffer: &SharedBuffer,
        offset: usize,
    );

    /// Route reads of `[addr, addr + length)` to `handler`.
    fn alloc_read_callback(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        handler: Rc<RefCell<dyn ReadHandler>>,
    );

    /// Drop the read claims of `id` on `[addr, addr + length)`.
    fn release_read(&mut self, id: DeviceId, addr: u32, length: u32);

    /// Store writes to `[addr, addr + length)` into `buffer` from `offset` on.
    fn alloc_write_window(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        buffer: &SharedBuffer,
        offset: usize,
    );

    /// Route writes to `[addr, addr + length)` to `handler`.
    fn alloc_write_callback(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        handler: Rc<RefCell<dyn WriteHandler>>,
    );

    /// Drop the write claims of `id` on `[addr, addr + length)`.
    fn release_write(&mut self, id: DeviceId, addr: u32, length: u32);

    /// Map reads of `[addr, addr + length)` onto the start of `buffer`.
    fn alloc_read_direct(&mut self, id: DeviceId, addr: u32, length: u32, buffer: &SharedBuffer) {
        self.alloc_read_window(id, addr, length, buffer, 0);
    }

    /// Store writes to `[addr, addr + length)` into the start of `buffer`.
    fn alloc_write_direct(&mut self, id: DeviceId, addr: u32, length: u32, buffer: &SharedBuffer) {
        self.alloc_write_window(id, addr, length, buffer, 0);
    }

    /// Map `buffer` as RAM: reads and writes of the range both hit it.
    fn alloc_ram(&mut self, id: DeviceId, addr: u32, length: u32, buffer: &SharedBuffer) {
        self.alloc_read_direct(id, addr, length, buffer);
        self.alloc_write_direct(id, addr, length, buffer);
    }

    /// Drop the claims of `id` on `[addr, addr + length)` in both directions.
    fn release(&mut self, id: DeviceId, addr: u32, length: u32) {
        self.release_read(id, addr, length);
        self.release_write(id, addr, length);
    }
}

/// Read and write page maps sharing one device lifecycle.
pub struct MemoryMap {
    config: MapConfig,
    reads: ReadManager,
    writes: WriteManager,
}

impl MemoryMap {
    /// Create a map with its own page tables. Every page starts unmapped.
    pub fn new(config: MapConfig) -> MapResult<Self> {
        let reads = ReadManager::new(&config)?;
        let writes = WriteManager::new(&config)?;
        info!(
            "memory map: 0x{:X} bytes in {} pages",
            config.space_size,
            reads.page_count()
        );
        Ok(Self {
            config,
            reads,
            writes,
        })
    }

    /// Create a map that publishes into caller-owned page tables.
    ///
    /// Either both tables are given or neither; the caller keeps ownership
    /// of what it passes in.
    pub fn with_tables(
        config: MapConfig,
        read_table: Option<ReadTable>,
        write_table: Option<WriteTable>,
    ) -> MapResult<Self> {
        match (read_table, write_table) {
            (None, None) => Self::new(config),
            (Some(read_table), Some(write_table)) => {
                let reads = ReadManager::with_table(&config, read_table)?;
                let writes = WriteManager::with_table(&config, write_table)?;
                info!(
                    "memory map: 0x{:X} bytes in {} external pages",
                    config.space_size,
                    reads.page_count()
                );
                Ok(Self {
                    config,
                    reads,
                    writes,
                })
            }
            _ => Err(MapError::PartialExternalTables),
        }
    }

    /// Configuration the map was built with.
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Size of the address space in bytes.
    ///
    /// Zero after [`cleanup`](MemoryMap::cleanup); [`config`](MemoryMap::config)
    /// still reports the size the map was built with.
    pub fn space_size(&self) -> u32 {
        (self.page_count() * PAGE_SIZE) as u32
    }

    /// Number of pages per direction.
    pub fn page_count(&self) -> usize {
        self.reads.page_count()
    }

    /// Read direction, for inspection.
    pub fn reads(&self) -> &ReadManager {
        &self.reads
    }

    /// Write direction, for inspection.
    pub fn writes(&self) -> &WriteManager {
        &self.writes
    }

    /// Register a device in both directions.
    ///
    /// Returns [`MapError::NoFreeSlot`] when all slots are taken; the caller
    /// should then leave the device inactive.
    ///
    /// # Panics
    ///
    /// Panics if the two directions hand out different ids.
    pub fn connect(&mut self, name: &str, high_priority: bool) -> MapResult<DeviceId> {
        let read_id = self.reads.connect(name, high_priority)?;
        let write_id = self.writes.connect(name, high_priority);
        assert_eq!(
            Ok(read_id),
            write_id,
            "read and write spaces disagree on the slot for '{}'",
            name
        );
        Ok(read_id)
    }

    /// Give the default slot to the background device in both directions.
    pub fn connect_default(&mut self, name: &str) -> MapResult<DeviceId> {
        let id = self.reads.connect_default(name)?;
        let write_id = self.writes.connect_default(name);
        assert_eq!(
            Ok(id),
            write_id,
            "read and write spaces disagree on the default slot"
        );
        Ok(id)
    }

    /// Release every claim of `id` in both directions and free its slot.
    pub fn disconnect(&mut self, id: DeviceId) -> MapResult<()> {
        self.reads.disconnect(id)?;
        self.writes.disconnect(id)?;
        debug!("memory map: {} disconnected", id);
        Ok(())
    }

    /// Disconnect the device registered under `name`.
    pub fn disconnect_named(&mut self, name: &str) -> MapResult<DeviceId> {
        let id = self
            .reads
            .resolver()
            .find(name)
            .ok_or_else(|| MapError::UnknownDevice(name.to_string()))?;
        self.disconnect(id)?;
        Ok(id)
    }

    /// Whether `id` is connected.
    pub fn is_connected(&self, id: DeviceId) -> bool {
        self.reads.resolver().is_connected(id)
    }

    /// Label a device was connected under.
    pub fn device_name(&self, id: DeviceId) -> Option<&str> {
        self.reads.resolver().device_name(id)
    }

    /// Connected devices in priority order.
    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &str)> + '_ {
        self.reads.resolver().devices()
    }

    /// Device visible to reads at `addr`.
    pub fn read_owner(&self, addr: u32) -> DeviceId {
        self.reads.owner(addr)
    }

    /// Device receiving writes at `addr`.
    pub fn write_owner(&self, addr: u32) -> DeviceId {
        self.writes.owner(addr)
    }

    /// Read `addr` through the claim of `id`, bypassing priority.
    pub fn read_through(&self, id: DeviceId, addr: u32) -> u8 {
        self.reads.read_through(id, addr)
    }

    /// Write `addr` through the claim of `id`, bypassing priority.
    pub fn write_through(&self, id: DeviceId, addr: u32, value: u8) {
        self.writes.write_through(id, addr, value);
    }

    /// Disconnect everything and drop the page storage.
    ///
    /// The map has zero pages afterwards; any access panics.
    pub fn cleanup(&mut self) {
        self.reads.cleanup();
        self.writes.cleanup();
        info!("memory map: cleaned up");
    }
}

impl MemoryBus for MemoryMap {
    #[inline]
    fn read(&self, addr: u32) -> u8 {
        self.reads.read(addr)
    }

    #[inline]
    fn write(&mut self, addr: u32, value: u8) {
        self.writes.write(addr, value);
    }
}

impl BankConfig for MemoryMap {
    fn alloc_read_window(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        buffer: &SharedBuffer,
        offset: usize,
    ) {
        self.reads.alloc_direct_at(id, addr, length, buffer, offset);
    }

    fn alloc_read_callback(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        handler: Rc<RefCell<dyn ReadHandler>>,
    ) {
        self.reads.alloc_callback(id, addr, length, handler);
    }

    fn release_read(&mut self, id: DeviceId, addr: u32, length: u32) {
        self.reads.release(id, addr, length);
    }

    fn alloc_write_window(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        buffer: &SharedBuffer,
        offset: usize,
    ) {
        self.writes.alloc_direct_at(id, addr, length, buffer, offset);
    }

    fn alloc_write_callback(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        handler: Rc<RefCell<dyn WriteHandler>>,
    ) {
        self.writes.alloc_callback(id, addr, length, handler);
    }

    fn release_write(&mut self, id: DeviceId, addr: u32, length: u32) {
        self.writes.release(id, addr, length);
    }
}
