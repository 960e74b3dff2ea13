//! Write direction of the page map.
//!
//! Kept apart from the read direction so a page can read from ROM while its
//! writes land in the RAM underneath.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::buffer::SharedBuffer;
use crate::config::MapConfig;
use crate::page::{page_of, DeviceId, PageRange, PAGE_MASK};
use crate::resolver::{direct_pages, Backing, PageTable, Resolver, SharedPageTable};
use crate::MapResult;

/// Device logic receiving writes on handler-backed pages.
pub trait WriteHandler {
    /// Accept `value` written to `addr`.
    fn write(&mut self, addr: u32, value: u8);
}

/// Page table handle for the write direction.
pub type WriteTable = SharedPageTable<dyn WriteHandler>;

/// Claims and lookups for the write direction.
pub struct WriteManager {
    resolver: Resolver<dyn WriteHandler>,
}

impl WriteManager {
    /// Write space owning its own page table.
    pub fn new(config: &MapConfig) -> MapResult<Self> {
        let pages = config.page_count()?;
        Ok(Self {
            resolver: Resolver::new("write", pages),
        })
    }

    /// Write space storing into a caller-owned page table.
    pub fn with_table(config: &MapConfig, table: WriteTable) -> MapResult<Self> {
        config.check_table(table.borrow().len())?;
        Ok(Self {
            resolver: Resolver::with_table("write", table),
        })
    }

    /// Handle to the visible page table.
    pub fn table(&self) -> WriteTable {
        self.resolver.shared_table()
    }

    /// Underlying claim/release engine.
    pub fn resolver(&self) -> &Resolver<dyn WriteHandler> {
        &self.resolver
    }

    /// Number of pages in the space.
    pub fn page_count(&self) -> usize {
        self.resolver.page_count()
    }

    /// See [`Resolver::connect`].
    pub fn connect(&mut self, name: &str, high_priority: bool) -> MapResult<DeviceId> {
        self.resolver.connect(name, high_priority)
    }

    /// See [`Resolver::connect_default`].
    pub fn connect_default(&mut self, name: &str) -> MapResult<DeviceId> {
        self.resolver.connect_default(name)
    }

    /// See [`Resolver::disconnect`].
    pub fn disconnect(&mut self, id: DeviceId) -> MapResult<()> {
        self.resolver.disconnect(id)
    }

    /// Store writes of `length` bytes at `addr` into `buffer`.
    pub fn alloc_direct(&mut self, id: DeviceId, addr: u32, length: u32, buffer: &SharedBuffer) {
        self.alloc_direct_at(id, addr, length, buffer, 0);
    }

    /// Store writes of `length` bytes at `addr` into `buffer` from `offset` on.
    ///
    /// # Panics
    ///
    /// Same contract as [`ReadManager::alloc_direct_at`](crate::ReadManager::alloc_direct_at).
    pub fn alloc_direct_at(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        buffer: &SharedBuffer,
        offset: usize,
    ) {
        let (pages, stride) = direct_pages("write", addr, length, buffer, offset);
        let backing = Backing::Direct {
            buffer: buffer.clone(),
            offset,
        };
        self.resolver.alloc(id, pages, backing, stride);
    }

    /// Route writes of `length` bytes at `addr` to `handler`.
    pub fn alloc_callback(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        handler: Rc<RefCell<dyn WriteHandler>>,
    ) {
        let backing = Backing::Callback { handler, device: id };
        self.resolver
            .alloc(id, PageRange::from_bytes(addr, length), backing, 0);
    }

    /// Drop the claims of `id` on the pages touched by `[addr, addr + length)`.
    pub fn release(&mut self, id: DeviceId, addr: u32, length: u32) {
        self.resolver.release(id, PageRange::from_bytes(addr, length));
    }

    /// Device receiving writes at `addr`.
    pub fn owner(&self, addr: u32) -> DeviceId {
        self.resolver.owner(self.page_index(addr))
    }

    /// Whether `id` holds a claim on the page containing `addr`.
    pub fn claims(&self, id: DeviceId, addr: u32) -> bool {
        self.resolver.claim(id, self.page_index(addr)).is_some()
    }

    /// Write `value` to whatever is visible at `addr`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is outside the space.
    #[inline]
    pub fn write(&self, addr: u32, value: u8) {
        let page = self.page_index(addr);
        let handler = match self.resolver.table().entry(page) {
            Backing::Direct { buffer, offset } => {
                buffer.set(offset + (addr & PAGE_MASK) as usize, value);
                return;
            }
            Backing::Callback { handler, .. } => Rc::clone(handler),
            Backing::Unmapped => {
                trace!("write of 0x{:02X} to unmapped address 0x{:04X}", value, addr);
                return;
            }
        };
        handler.borrow_mut().write(addr, value);
    }

    /// Write through the claim of `id`, whether or not it is visible.
    ///
    /// Dropped if `id` has no claim there.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is outside the space or `id` is not connected.
    pub fn write_through(&self, id: DeviceId, addr: u32, value: u8) {
        let page = self.page_index(addr);
        let handler = match self.resolver.claim(id, page) {
            Some(Backing::Direct { buffer, offset }) => {
                buffer.set(offset + (addr & PAGE_MASK) as usize, value);
                return;
            }
            Some(Backing::Callback { handler, .. }) => Rc::clone(handler),
            Some(Backing::Unmapped) | None => return,
        };
        handler.borrow_mut().write(addr, value);
    }

    /// Drop every device and the page storage.
    pub fn cleanup(&mut self) {
        self.resolver.cleanup();
    }

    #[inline]
    fn page_index(&self, addr: u32) -> usize {
        let page = page_of(addr);
        assert!(
            page < self.resolver.page_count(),
            "write to 0x{:X} outside the address space",
            addr
        );
        page
    }
}

/// Fresh write table sized for `config`, for injection with
/// [`WriteManager::with_table`].
pub fn write_table(config: &MapConfig) -> MapResult<WriteTable> {
    Ok(PageTable::shared(config.page_count()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Latch {
        writes: Vec<(u32, u8)>,
    }

    impl WriteHandler for Latch {
        fn write(&mut self, addr: u32, value: u8) {
            self.writes.push((addr, value));
        }
    }

    fn manager() -> WriteManager {
        WriteManager::new(&MapConfig::default()).unwrap()
    }

    #[test]
    fn test_unmapped_writes_are_dropped() {
        let writes = manager();
        writes.write(0x1234, 0x42);
        assert_eq!(writes.owner(0x1234), DeviceId::DEFAULT);
    }

    #[test]
    fn test_direct_writes_land_in_buffer() {
        let mut writes = manager();
        let ram = SharedBuffer::zeroed(0x10000);
        let id = writes.connect_default("ram").unwrap();
        writes.alloc_direct(id, 0, 0x10000, &ram);

        writes.write(0x0000, 0x11);
        writes.write(0xC123, 0x22);
        assert_eq!(ram.get(0x0000), 0x11);
        assert_eq!(ram.get(0xC123), 0x22);
    }

    #[test]
    fn test_callback_invoked_once_per_write() {
        let mut writes = manager();
        let latch = Rc::new(RefCell::new(Latch::default()));
        let id = writes.connect("vdp", false).unwrap();
        writes.alloc_callback(id, 0x9800, 0x400, latch.clone());

        writes.write(0x9801, 0xA5);
        writes.write(0x9BFF, 0x5A);
        assert_eq!(latch.borrow().writes, vec![(0x9801, 0xA5), (0x9BFF, 0x5A)]);
    }

    #[test]
    fn test_write_through_hidden_claim() {
        let mut writes = manager();
        let ram = SharedBuffer::zeroed(0x10000);
        let latch = Rc::new(RefCell::new(Latch::default()));

        let ram_id = writes.connect_default("ram").unwrap();
        writes.alloc_direct(ram_id, 0, 0x10000, &ram);
        let io_id = writes.connect("io", true).unwrap();
        writes.alloc_callback(io_id, 0xD000, 0x1000, latch.clone());

        writes.write(0xD000, 0x01);
        writes.write_through(ram_id, 0xD000, 0x02);
        assert_eq!(latch.borrow().writes, vec![(0xD000, 0x01)]);
        assert_eq!(ram.get(0xD000), 0x02);

        // No claim at 0x0000 for the I/O device.
        writes.write_through(io_id, 0x0000, 0x03);
        assert_eq!(ram.get(0x0000), 0x00);
        assert_eq!(latch.borrow().writes.len(), 1);
    }

    #[test]
    fn test_release_exposes_ram_again() {
        let mut writes = manager();
        let ram = SharedBuffer::zeroed(0x10000);
        let latch = Rc::new(RefCell::new(Latch::default()));

        let ram_id = writes.connect_default("ram").unwrap();
        writes.alloc_direct(ram_id, 0, 0x10000, &ram);
        let io_id = writes.connect("io", false).unwrap();
        writes.alloc_callback(io_id, 0xD000, 0x1000, latch.clone());
        writes.release(io_id, 0xD000, 0x1000);

        writes.write(0xD020, 0x0E);
        assert!(latch.borrow().writes.is_empty());
        assert_eq!(ram.get(0xD020), 0x0E);
        assert_eq!(writes.owner(0xD020), ram_id);
    }
}
