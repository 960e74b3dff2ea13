//! Page geometry and device identifiers.
//!
//! The address space is cut into fixed 1 KiB pages. Every mapping decision
//! (who owns what, which buffer backs it) is made per page; the low
//! [`PAGE_BITS`] bits of an address only select a byte inside the page.

use std::fmt;

/// Number of address bits covered by one page.
pub const PAGE_BITS: u32 = 10;

/// Size of one page in bytes.
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

/// Mask selecting the byte offset inside a page.
pub const PAGE_MASK: u32 = (PAGE_SIZE as u32) - 1;

/// Number of priority slots, including the reserved default slot.
pub const MAX_DEVICES: usize = 8;

/// Priority slot of a connected device.
///
/// Lower numbers win: when two devices claim the same page, the one with the
/// smaller id is visible. The last slot ([`DeviceId::DEFAULT`]) belongs to the
/// background device that covers the whole space and can never release.
///
/// # Examples
///
/// ```rust
/// use pagemap::DeviceId;
///
/// let rom = DeviceId::new(0);
/// assert!(rom.outranks(DeviceId::DEFAULT));
/// assert!(DeviceId::DEFAULT.is_default());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(u8);

impl DeviceId {
    /// Reserved slot of the background device.
    pub const DEFAULT: DeviceId = DeviceId((MAX_DEVICES - 1) as u8);

    /// Wrap a raw slot number.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is not below [`MAX_DEVICES`].
    pub const fn new(raw: u8) -> Self {
        assert!((raw as usize) < MAX_DEVICES, "device id out of range");
        DeviceId(raw)
    }

    /// Slot number as an index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw slot number.
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Whether this is the reserved background slot.
    #[inline]
    pub const fn is_default(self) -> bool {
        self.0 == Self::DEFAULT.0
    }

    /// Whether this device wins over `other` on a shared page.
    #[inline]
    pub const fn outranks(self, other: DeviceId) -> bool {
        self.0 < other.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "pid{}", self.0)
    }
}

/// Half-open range of page numbers `[first, limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub first: usize,
    pub limit: usize,
}

impl PageRange {
    /// Pages touched by the byte range `[addr, addr + length)`.
    ///
    /// A partial page at the end counts as a whole page.
    ///
    /// ```rust
    /// use pagemap::PageRange;
    ///
    /// let pages = PageRange::from_bytes(0x1000, 0x401);
    /// assert_eq!((pages.first, pages.limit), (4, 6));
    /// ```
    pub fn from_bytes(addr: u32, length: u32) -> Self {
        let end = addr as u64 + length as u64 + PAGE_MASK as u64;
        PageRange {
            first: (addr >> PAGE_BITS) as usize,
            limit: (end >> PAGE_BITS) as usize,
        }
    }

    /// Number of pages in the range.
    #[inline]
    pub fn len(&self) -> usize {
        self.limit.saturating_sub(self.first)
    }

    /// Whether the range covers no page.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over the page numbers.
    pub fn iter(&self) -> std::ops::Range<usize> {
        self.first..self.limit
    }
}

/// Page number containing `addr`.
#[inline]
pub fn page_of(addr: u32) -> usize {
    (addr >> PAGE_BITS) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_geometry() {
        assert_eq!(PAGE_SIZE, 1024);
        assert_eq!(PAGE_MASK, 0x3FF);
        assert_eq!(page_of(0x03FF), 0);
        assert_eq!(page_of(0x0400), 1);
        assert_eq!(page_of(0xFFFF), 63);
    }

    #[test]
    fn test_page_range_rounds_up() {
        let pages = PageRange::from_bytes(0, 0x2000);
        assert_eq!((pages.first, pages.limit), (0, 8));

        let pages = PageRange::from_bytes(0x0400, 1);
        assert_eq!((pages.first, pages.limit), (1, 2));

        let pages = PageRange::from_bytes(0x0800, 0);
        assert!(pages.is_empty());
    }

    #[test]
    fn test_page_range_does_not_overflow() {
        let pages = PageRange::from_bytes(0xFFFF_FC00, 0x400);
        assert_eq!(pages.first, 0x3F_FFFF);
        assert_eq!(pages.limit, 0x40_0000);
    }

    #[test]
    fn test_device_id_ordering() {
        assert!(DeviceId::new(0).outranks(DeviceId::new(1)));
        assert!(!DeviceId::new(3).outranks(DeviceId::new(3)));
        assert!(DeviceId::new(6).outranks(DeviceId::DEFAULT));
        assert_eq!(DeviceId::DEFAULT.index(), MAX_DEVICES - 1);
        assert_eq!(DeviceId::new(2).to_string(), "pid2");
    }

    #[test]
    #[should_panic(expected = "device id out of range")]
    fn test_device_id_out_of_range() {
        let _ = DeviceId::new(MAX_DEVICES as u8);
    }
}
