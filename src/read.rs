//! Read direction of the page map.
//!
//! Every CPU fetch and load goes through [`ReadManager::read`]: one page table
//! lookup, then either a buffer index or a handler call.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::buffer::SharedBuffer;
use crate::config::MapConfig;
use crate::page::{page_of, DeviceId, PageRange, PAGE_MASK};
use crate::resolver::{direct_pages, Backing, PageTable, Resolver, SharedPageTable};
use crate::MapResult;

/// Device logic answering reads on handler-backed pages.
///
/// The handler receives the full bus address and decodes it itself, so one
/// handler can serve any number of pages.
///
/// # Examples
///
/// ```rust
/// use pagemap::ReadHandler;
///
/// struct StatusPort {
///     ready: bool,
/// }
///
/// impl ReadHandler for StatusPort {
///     fn read(&mut self, _addr: u32) -> u8 {
///         if self.ready { 0x80 } else { 0x00 }
///     }
/// }
/// ```
pub trait ReadHandler {
    /// Produce the byte at `addr`.
    fn read(&mut self, addr: u32) -> u8;
}

/// Page table handle for the read direction.
pub type ReadTable = SharedPageTable<dyn ReadHandler>;

/// Claims and lookups for the read direction.
pub struct ReadManager {
    resolver: Resolver<dyn ReadHandler>,
    unmapped_value: u8,
}

impl ReadManager {
    /// Read space owning its own page table.
    pub fn new(config: &MapConfig) -> MapResult<Self> {
        let pages = config.page_count()?;
        Ok(Self {
            resolver: Resolver::new("read", pages),
            unmapped_value: config.unmapped_value,
        })
    }

    /// Read space writing into a caller-owned page table.
    pub fn with_table(config: &MapConfig, table: ReadTable) -> MapResult<Self> {
        config.check_table(table.borrow().len())?;
        Ok(Self {
            resolver: Resolver::with_table("read", table),
            unmapped_value: config.unmapped_value,
        })
    }

    /// Handle to the visible page table.
    pub fn table(&self) -> ReadTable {
        self.resolver.shared_table()
    }

    /// Underlying claim/release engine.
    pub fn resolver(&self) -> &Resolver<dyn ReadHandler> {
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

    /// Map `length` bytes at `addr` onto `buffer`, starting at its first byte.
    pub fn alloc_direct(&mut self, id: DeviceId, addr: u32, length: u32, buffer: &SharedBuffer) {
        self.alloc_direct_at(id, addr, length, buffer, 0);
    }

    /// Map `length` bytes at `addr` onto `buffer`, starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not page aligned, the buffer does not cover every
    /// touched page, the range leaves the space or `id` is not connected.
    pub fn alloc_direct_at(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        buffer: &SharedBuffer,
        offset: usize,
    ) {
        let (pages, stride) = direct_pages("read", addr, length, buffer, offset);
        let backing = Backing::Direct {
            buffer: buffer.clone(),
            offset,
        };
        self.resolver.alloc(id, pages, backing, stride);
    }

    /// Route reads of `length` bytes at `addr` to `handler`.
    pub fn alloc_callback(
        &mut self,
        id: DeviceId,
        addr: u32,
        length: u32,
        handler: Rc<RefCell<dyn ReadHandler>>,
    ) {
        let backing = Backing::Callback { handler, device: id };
        self.resolver
            .alloc(id, PageRange::from_bytes(addr, length), backing, 0);
    }

    /// Drop the claims of `id` on the pages touched by `[addr, addr + length)`.
    pub fn release(&mut self, id: DeviceId, addr: u32, length: u32) {
        self.resolver.release(id, PageRange::from_bytes(addr, length));
    }

    /// Device visible at `addr`.
    pub fn owner(&self, addr: u32) -> DeviceId {
        self.resolver.owner(self.page_index(addr))
    }

    /// Whether `id` holds a claim on the page containing `addr`.
    pub fn claims(&self, id: DeviceId, addr: u32) -> bool {
        self.resolver.claim(id, self.page_index(addr)).is_some()
    }

    /// Read the byte visible at `addr`.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is outside the space.
    #[inline]
    pub fn read(&self, addr: u32) -> u8 {
        let page = self.page_index(addr);
        let handler = match self.resolver.table().entry(page) {
            Backing::Direct { buffer, offset } => {
                return buffer.get(offset + (addr & PAGE_MASK) as usize)
            }
            Backing::Callback { handler, .. } => Rc::clone(handler),
            Backing::Unmapped => {
                trace!("read from unmapped address 0x{:04X}", addr);
                return self.unmapped_value;
            }
        };
        let value = handler.borrow_mut().read(addr);
        value
    }

    /// Read `addr` through the claim of `id`, whether or not it is visible.
    ///
    /// Returns the floating-bus value if `id` has no claim there.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is outside the space or `id` is not connected.
    pub fn read_through(&self, id: DeviceId, addr: u32) -> u8 {
        let page = self.page_index(addr);
        let handler = match self.resolver.claim(id, page) {
            Some(Backing::Direct { buffer, offset }) => {
                return buffer.get(offset + (addr & PAGE_MASK) as usize)
            }
            Some(Backing::Callback { handler, .. }) => Rc::clone(handler),
            Some(Backing::Unmapped) | None => return self.unmapped_value,
        };
        let value = handler.borrow_mut().read(addr);
        value
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
            "read of 0x{:X} outside the address space",
            addr
        );
        page
    }
}

/// Fresh read table sized for `config`, for injection with
/// [`ReadManager::with_table`].
pub fn read_table(config: &MapConfig) -> MapResult<ReadTable> {
    Ok(PageTable::shared(config.page_count()?))
}
