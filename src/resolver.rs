//! Priority resolution shared by the read and write directions.
//!
//! Three pieces of state work together here:
//!
//! - **Page table**: the backing currently visible on each page. This is the
//!   only structure the access hot path looks at.
//! - **Priority table**: for each page, eight slots. Slot `i` holds the
//!   numerically smallest device id `>= i` that still claims the page, so
//!   slot 0 is always the visible owner and slot `pid + 1` is the device that
//!   takes over when `pid` lets go.
//! - **Mirrors**: every connected device keeps a private copy of each claim it
//!   has made, whether or not it currently wins, so a lower-priority mapping
//!   can be put back when a higher-priority device releases the page.
//!
//! The default slot ([`DeviceId::DEFAULT`]) is live from construction and
//! claims every page, initially with [`Backing::Unmapped`]. Nothing can take
//! its claims away, so every page always has a mapping.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::buffer::SharedBuffer;
use crate::page::{DeviceId, PageRange, MAX_DEVICES, PAGE_MASK, PAGE_SIZE};
use crate::{MapError, MapResult};

/// What a page resolves to.
///
/// `H` is the handler trait object of the direction (`dyn ReadHandler` or
/// `dyn WriteHandler`).
pub enum Backing<H: ?Sized> {
    /// Byte `n` of the page lives at `buffer[offset + n]`.
    Direct { buffer: SharedBuffer, offset: usize },
    /// Accesses are forwarded to a device handler with the full address.
    Callback {
        handler: Rc<RefCell<H>>,
        device: DeviceId,
    },
    /// Nobody mapped anything: reads float, writes vanish.
    Unmapped,
}

impl<H: ?Sized> Backing<H> {
    /// Backing of the next page for a contiguous claim.
    ///
    /// Direct mappings move `stride` bytes further into their buffer; the
    /// other kinds decode addresses themselves and stay unchanged.
    fn advanced(&self, stride: usize) -> Self {
        match self {
            Backing::Direct { buffer, offset } => Backing::Direct {
                buffer: buffer.clone(),
                offset: offset + stride,
            },
            other => other.clone(),
        }
    }

    /// Whether this is a buffer-backed mapping.
    pub fn is_direct(&self) -> bool {
        matches!(self, Backing::Direct { .. })
    }

    /// Whether this is a handler-backed mapping.
    pub fn is_callback(&self) -> bool {
        matches!(self, Backing::Callback { .. })
    }

    /// Whether this page has no mapping beyond the undefined-access fallback.
    pub fn is_unmapped(&self) -> bool {
        matches!(self, Backing::Unmapped)
    }
}

impl<H: ?Sized> Clone for Backing<H> {
    fn clone(&self) -> Self {
        match self {
            Backing::Direct { buffer, offset } => Backing::Direct {
                buffer: buffer.clone(),
                offset: *offset,
            },
            Backing::Callback { handler, device } => Backing::Callback {
                handler: Rc::clone(handler),
                device: *device,
            },
            Backing::Unmapped => Backing::Unmapped,
        }
    }
}

impl<H: ?Sized> fmt::Debug for Backing<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Backing::Direct { buffer, offset } => f
                .debug_struct("Direct")
                .field("len", &buffer.len())
                .field("offset", offset)
                .finish(),
            Backing::Callback { device, .. } => {
                f.debug_struct("Callback").field("device", device).finish()
            }
            Backing::Unmapped => f.write_str("Unmapped"),
        }
    }
}

/// Visible backing of every page in one direction.
pub struct PageTable<H: ?Sized> {
    entries: Vec<Backing<H>>,
}

/// Page table handle that can be injected from outside the map.
pub type SharedPageTable<H> = Rc<RefCell<PageTable<H>>>;

impl<H: ?Sized> PageTable<H> {
    /// Table of `pages` unmapped pages.
    pub fn new(pages: usize) -> Self {
        Self {
            entries: vec![Backing::Unmapped; pages],
        }
    }

    /// Same, already wrapped for injection.
    pub fn shared(pages: usize) -> SharedPageTable<H> {
        Rc::new(RefCell::new(Self::new(pages)))
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no pages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visible backing of `page`.
    ///
    /// # Panics
    ///
    /// Panics if `page` is outside the table.
    #[inline]
    pub fn entry(&self, page: usize) -> &Backing<H> {
        &self.entries[page]
    }

    fn reset(&mut self) {
        for entry in &mut self.entries {
            *entry = Backing::Unmapped;
        }
    }
}

/// Pages and per-page stride of a buffer-backed claim.
///
/// # Panics
///
/// Panics if `addr` is not page aligned or `buffer` ends before the last
/// touched page does.
pub(crate) fn direct_pages(
    space: &str,
    addr: u32,
    length: u32,
    buffer: &SharedBuffer,
    offset: usize,
) -> (PageRange, usize) {
    assert!(
        addr & PAGE_MASK == 0,
        "{} space: direct mapping at 0x{:X} is not page aligned",
        space,
        addr
    );
    let pages = PageRange::from_bytes(addr, length);
    let needed = offset + pages.len() * PAGE_SIZE;
    assert!(
        needed <= buffer.len(),
        "{} space: buffer of 0x{:X} bytes does not cover 0x{:X} bytes from offset 0x{:X}",
        space,
        buffer.len(),
        pages.len() * PAGE_SIZE,
        offset
    );
    (pages, PAGE_SIZE)
}

/// A connected device: its label and every claim it holds.
struct DeviceSlot<H: ?Sized> {
    name: String,
    mirror: Vec<Option<Backing<H>>>,
}

impl<H: ?Sized> DeviceSlot<H> {
    fn new(name: String, pages: usize) -> Self {
        Self {
            name,
            mirror: vec![None; pages],
        }
    }
}

/// Claim/release engine for one access direction.
pub struct Resolver<H: ?Sized> {
    space: &'static str,
    pages: SharedPageTable<H>,
    priority: Vec<[DeviceId; MAX_DEVICES]>,
    slots: [Option<DeviceSlot<H>>; MAX_DEVICES],
    default_claimed: bool,
}

impl<H: ?Sized> Resolver<H> {
    /// Resolver owning a fresh table of `pages` pages.
    ///
    /// `space` names the direction in log output.
    pub fn new(space: &'static str, pages: usize) -> Self {
        Self::with_table(space, PageTable::shared(pages))
    }

    /// Resolver writing into an injected page table.
    ///
    /// The caller keeps its own handle; every entry is reset to unmapped.
    pub fn with_table(space: &'static str, table: SharedPageTable<H>) -> Self {
        table.borrow_mut().reset();
        let pages = table.borrow().len();

        let mut slots: [Option<DeviceSlot<H>>; MAX_DEVICES] = std::array::from_fn(|_| None);
        let mut background = DeviceSlot::new(String::from("undefined"), pages);
        background.mirror.fill(Some(Backing::Unmapped));
        slots[DeviceId::DEFAULT.index()] = Some(background);

        info!("{} space: {} pages", space, pages);

        Self {
            space,
            pages: table,
            priority: vec![[DeviceId::DEFAULT; MAX_DEVICES]; pages],
            slots,
            default_claimed: false,
        }
    }

    /// Number of pages in the space.
    pub fn page_count(&self) -> usize {
        self.priority.len()
    }

    /// Borrow the visible page table.
    #[inline]
    pub fn table(&self) -> Ref<'_, PageTable<H>> {
        self.pages.borrow()
    }

    /// Handle to the visible page table.
    pub fn shared_table(&self) -> SharedPageTable<H> {
        Rc::clone(&self.pages)
    }

    /// Assign a free priority slot to a device.
    ///
    /// Ordinary devices get the lowest-priority free slot (largest id below
    /// the default); `high_priority` devices get the highest-priority free
    /// slot (smallest id). Names must be unique among connected devices so
    /// that [`disconnect_named`](Resolver::disconnect_named) is unambiguous.
    pub fn connect(&mut self, name: &str, high_priority: bool) -> MapResult<DeviceId> {
        if self.name_taken(name) {
            return Err(MapError::DuplicateName(name.to_string()));
        }

        let free = |idx: &usize| self.slots[*idx].is_none();
        let chosen = if high_priority {
            (0..DeviceId::DEFAULT.index()).find(free)
        } else {
            (0..DeviceId::DEFAULT.index()).rev().find(free)
        };

        let Some(idx) = chosen else {
            warn!("{} space: no free slot for device '{}'", self.space, name);
            return Err(MapError::NoFreeSlot);
        };

        let id = DeviceId::new(idx as u8);
        self.slots[idx] = Some(DeviceSlot::new(name.to_string(), self.page_count()));
        debug!("{} space: connected '{}' as {}", self.space, name, id);
        Ok(id)
    }

    /// Hand the default slot to the background device.
    pub fn connect_default(&mut self, name: &str) -> MapResult<DeviceId> {
        if self.default_claimed {
            return Err(MapError::DefaultTaken);
        }
        if self.name_taken(name) {
            return Err(MapError::DuplicateName(name.to_string()));
        }
        self.default_claimed = true;
        self.slot_mut(DeviceId::DEFAULT).name = name.to_string();
        debug!("{} space: '{}' holds the default slot", self.space, name);
        Ok(DeviceId::DEFAULT)
    }

    /// Release every claim of `id` and free its slot.
    pub fn disconnect(&mut self, id: DeviceId) -> MapResult<()> {
        if id.is_default() {
            return Err(MapError::DefaultPinned);
        }
        if self.slots[id.index()].is_none() {
            return Err(MapError::NotConnected(id));
        }

        self.release(id, PageRange { first: 0, limit: self.page_count() });
        if let Some(slot) = self.slots[id.index()].take() {
            debug!("{} space: disconnected '{}' ({})", self.space, slot.name, id);
        }
        Ok(())
    }

    /// Disconnect the device registered under `name`.
    pub fn disconnect_named(&mut self, name: &str) -> MapResult<DeviceId> {
        let id = self.find(name).ok_or_else(|| MapError::UnknownDevice(name.to_string()))?;
        self.disconnect(id)?;
        Ok(id)
    }

    /// Id of the device registered under `name`.
    pub fn find(&self, name: &str) -> Option<DeviceId> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.name == name))
            .map(|idx| DeviceId::new(idx as u8))
    }

    /// Whether `id` is connected. The default slot always is.
    pub fn is_connected(&self, id: DeviceId) -> bool {
        self.slots[id.index()].is_some()
    }

    /// Label of a connected device.
    pub fn device_name(&self, id: DeviceId) -> Option<&str> {
        self.slots[id.index()].as_ref().map(|s| s.name.as_str())
    }

    /// Connected devices in priority order.
    pub fn devices(&self) -> impl Iterator<Item = (DeviceId, &str)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.as_ref()
                .map(|s| (DeviceId::new(idx as u8), s.name.as_str()))
        })
    }

    /// Device currently visible on `page`.
    pub fn owner(&self, page: usize) -> DeviceId {
        self.priority[page][0]
    }

    /// Claim `pages` for `id`.
    ///
    /// `backing` maps the first page; each following page gets it advanced by
    /// `stride` bytes (zero for handler-backed claims). The claim is recorded
    /// in the device's mirror whether or not it becomes visible.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not connected or the range leaves the space.
    pub fn alloc(&mut self, id: DeviceId, pages: PageRange, backing: Backing<H>, stride: usize) {
        self.check_range(pages);
        assert!(
            self.is_connected(id),
            "{} space: alloc for unconnected device {}",
            self.space,
            id
        );

        let mut table = self.pages.borrow_mut();
        let mirror = &mut self.slots[id.index()]
            .as_mut()
            .unwrap_or_else(|| unreachable!())
            .mirror;

        let mut backing = backing;
        for page in pages.iter() {
            let chain = &mut self.priority[page];
            for slot in chain[..=id.index()].iter_mut().rev() {
                if !id.outranks(*slot) {
                    break;
                }
                *slot = id;
            }

            if chain[0] == id {
                table.entries[page] = backing.clone();
            }

            let next = backing.advanced(stride);
            mirror[page] = Some(backing);
            backing = next;
        }

        debug!(
            "{} space: {} claimed pages [{:#X}, {:#X})",
            self.space, id, pages.first, pages.limit
        );
    }

    /// Drop the claims of `id` on `pages`.
    ///
    /// Pages where `id` was visible fall back to the next claimant down the
    /// priority chain. The default device cannot release; the call is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not connected or the range leaves the space.
    pub fn release(&mut self, id: DeviceId, pages: PageRange) {
        if id.is_default() {
            warn!("{} space: default device cannot release pages", self.space);
            return;
        }
        self.check_range(pages);
        assert!(
            self.is_connected(id),
            "{} space: release for unconnected device {}",
            self.space,
            id
        );

        let pid = id.index();
        let mut table = self.pages.borrow_mut();
        for page in pages.iter() {
            let chain = &mut self.priority[page];
            if chain[pid] == id {
                let next = chain[pid + 1];
                let was_visible = chain[0] == id;
                for slot in chain[..=pid].iter_mut().rev() {
                    if *slot != id {
                        break;
                    }
                    *slot = next;
                }

                if was_visible {
                    let restored = self.slots[next.index()]
                        .as_ref()
                        .and_then(|slot| slot.mirror[page].clone())
                        .unwrap_or_else(|| {
                            unreachable!("{} holds page {:#X} without a claim", next, page)
                        });
                    table.entries[page] = restored;
                }
            }

            if let Some(slot) = self.slots[pid].as_mut() {
                slot.mirror[page] = None;
            }
        }

        debug!(
            "{} space: {} released pages [{:#X}, {:#X})",
            self.space, id, pages.first, pages.limit
        );
    }

    /// Claim `id` holds on `page`, visible or not.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not connected.
    pub fn claim(&self, id: DeviceId, page: usize) -> Option<&Backing<H>> {
        self.slot(id).mirror[page].as_ref()
    }

    /// Drop every device and all page storage.
    pub fn cleanup(&mut self) {
        self.pages.borrow_mut().reset();
        self.pages = PageTable::shared(0);
        self.priority.clear();
        self.slots = std::array::from_fn(|_| None);
        self.slots[DeviceId::DEFAULT.index()] = Some(DeviceSlot::new(String::from("undefined"), 0));
        self.default_claimed = false;
        info!("{} space: cleaned up", self.space);
    }

    /// Whether a device other than the unclaimed default slot uses `name`.
    fn name_taken(&self, name: &str) -> bool {
        self.slots.iter().enumerate().any(|(idx, slot)| {
            let placeholder = idx == DeviceId::DEFAULT.index() && !self.default_claimed;
            !placeholder && slot.as_ref().is_some_and(|s| s.name == name)
        })
    }

    fn slot(&self, id: DeviceId) -> &DeviceSlot<H> {
        match self.slots[id.index()].as_ref() {
            Some(slot) => slot,
            None => panic!("{} space: device {} is not connected", self.space, id),
        }
    }

    fn slot_mut(&mut self, id: DeviceId) -> &mut DeviceSlot<H> {
        let space = self.space;
        match self.slots[id.index()].as_mut() {
            Some(slot) => slot,
            None => panic!("{} space: device {} is not connected", space, id),
        }
    }

    fn check_range(&self, pages: PageRange) {
        assert!(
            pages.first <= pages.limit && pages.limit <= self.page_count(),
            "{} space: pages [{:#X}, {:#X}) outside {} pages",
            self.space,
            pages.first,
            pages.limit,
            self.page_count()
        );
    }
}
