//! Device-owned byte buffers shared with the page map.

use std::cell::RefCell;
use std::rc::Rc;

use crate::page::PAGE_SIZE;

/// Handle to a byte buffer owned by a device.
///
/// Cloning the handle does not copy the bytes: the device keeps one clone
/// and the page map keeps one per mapped page. The buffer length is fixed
/// at construction.
///
/// # Examples
///
/// ```rust
/// use pagemap::SharedBuffer;
///
/// let ram = SharedBuffer::zeroed(0x400);
/// let view = ram.clone();
///
/// ram.set(0x10, 0x42);
/// assert_eq!(view.get(0x10), 0x42);
/// ```
#[derive(Clone, Debug)]
pub struct SharedBuffer {
    data: Rc<RefCell<Box<[u8]>>>,
}

impl SharedBuffer {
    /// Wrap existing contents, e.g. a ROM image handed over by a loader.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Rc::new(RefCell::new(data.into_boxed_slice())),
        }
    }

    /// Wrap `data` zero-padded to a whole number of pages.
    ///
    /// Direct mappings always cover whole pages, so images shorter than a
    /// page (boot ROMs, small cartridge dumps) need padding before they can
    /// be mapped. An empty image becomes one page of zeroes.
    ///
    /// ```rust
    /// use pagemap::SharedBuffer;
    ///
    /// let boot = SharedBuffer::whole_pages(vec![0x31; 0x100]);
    /// assert_eq!(boot.len(), 0x400);
    /// assert_eq!(boot.get(0xFF), 0x31);
    /// assert_eq!(boot.get(0x100), 0x00);
    /// ```
    pub fn whole_pages(mut data: Vec<u8>) -> Self {
        let pages = data.len().div_ceil(PAGE_SIZE).max(1);
        data.resize(pages * PAGE_SIZE, 0);
        Self::new(data)
    }

    /// Allocate a buffer of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the byte at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside the buffer.
    #[inline]
    pub fn get(&self, offset: usize) -> u8 {
        self.data.borrow()[offset]
    }

    /// Store `value` at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is outside the buffer.
    #[inline]
    pub fn set(&self, offset: usize, value: u8) {
        self.data.borrow_mut()[offset] = value;
    }

    /// Copy `bytes` into the buffer starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the copy would run past the end of the buffer.
    pub fn load(&self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        self.data.borrow_mut()[offset..end].copy_from_slice(bytes);
    }

    /// Fill the whole buffer with `value`.
    pub fn fill(&self, value: u8) {
        self.data.borrow_mut().fill(value);
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.borrow().to_vec()
    }

    /// Whether both handles refer to the same storage.
    pub fn same_as(&self, other: &SharedBuffer) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl From<Vec<u8>> for SharedBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_buffer() {
        let buf = SharedBuffer::zeroed(256);
        assert_eq!(buf.len(), 256);
        assert!(!buf.is_empty());
        assert!(buf.to_vec().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clones_share_storage() {
        let buf = SharedBuffer::new(vec![1, 2, 3, 4]);
        let other = buf.clone();

        other.set(2, 0x99);
        assert_eq!(buf.get(2), 0x99);
        assert!(buf.same_as(&other));
        assert!(!buf.same_as(&SharedBuffer::new(vec![1, 2, 3, 4])));
    }

    #[test]
    fn test_load_and_fill() {
        let buf = SharedBuffer::zeroed(8);
        buf.load(2, &[0xAA, 0xBB]);
        assert_eq!(buf.to_vec(), vec![0, 0, 0xAA, 0xBB, 0, 0, 0, 0]);

        buf.fill(0xFF);
        assert_eq!(buf.get(7), 0xFF);
    }

    #[test]
    fn test_whole_pages_padding() {
        assert_eq!(SharedBuffer::whole_pages(Vec::new()).len(), PAGE_SIZE);
        assert_eq!(SharedBuffer::whole_pages(vec![1; PAGE_SIZE]).len(), PAGE_SIZE);

        let buf = SharedBuffer::whole_pages(vec![0xAB; PAGE_SIZE + 1]);
        assert_eq!(buf.len(), 2 * PAGE_SIZE);
        assert_eq!(buf.get(PAGE_SIZE), 0xAB);
        assert_eq!(buf.get(PAGE_SIZE + 1), 0x00);
    }

    #[test]
    #[should_panic]
    fn test_load_past_end_panics() {
        SharedBuffer::zeroed(4).load(3, &[1, 2]);
    }
}
