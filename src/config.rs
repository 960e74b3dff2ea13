//! Runtime configuration of a page map.

use crate::page::{PAGE_MASK, PAGE_SIZE};
use crate::{MapError, MapResult};

/// Address-space parameters chosen when a map is created.
///
/// Page size and the number of priority slots are compile-time constants;
/// only the space size and the floating-bus value vary per machine.
///
/// # Examples
///
/// ```rust
/// use pagemap::MapConfig;
///
/// let config = MapConfig::new(0x8000).with_unmapped_value(0x00);
/// assert_eq!(config.page_count().unwrap(), 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapConfig {
    /// Total address-space size in bytes. Must be a non-zero multiple of
    /// [`PAGE_SIZE`].
    pub space_size: u32,
    /// Value returned by reads from pages nobody mapped.
    pub unmapped_value: u8,
}

impl MapConfig {
    /// Configuration for a space of `space_size` bytes.
    pub fn new(space_size: u32) -> Self {
        Self {
            space_size,
            ..Self::default()
        }
    }

    /// Replace the floating-bus value.
    pub fn with_unmapped_value(mut self, value: u8) -> Self {
        self.unmapped_value = value;
        self
    }

    /// Number of pages, or an error if the size is unusable.
    pub fn page_count(&self) -> MapResult<usize> {
        if self.space_size == 0 || self.space_size & PAGE_MASK != 0 {
            return Err(MapError::InvalidSpaceSize(self.space_size));
        }
        Ok(self.space_size as usize / PAGE_SIZE)
    }

    /// Check that an injected page table has one entry per page.
    pub(crate) fn check_table(&self, actual: usize) -> MapResult<()> {
        let expected = self.page_count()?;
        if actual != expected {
            return Err(MapError::TableSizeMismatch { expected, actual });
        }
        Ok(())
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            space_size: 0x10000,
            unmapped_value: 0xFF, // floating bus
        }
    }
}
