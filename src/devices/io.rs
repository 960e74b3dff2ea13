//! Memory-mapped register block.
//!
//! A generic I/O chip: `N` byte registers decoded from the low address bits
//! and mirrored across every page the device claims, the way cheap address
//! decoders on 8-bit boards leave chips repeated through their I/O area.

use std::cell::RefCell;
use std::rc::Rc;

use super::Device;
use crate::{
    BankConfig, DeviceId, MapError, MapResult, MemoryMap, ReadHandler, WriteHandler,
};

/// Register file shared between the map and the device owner.
pub struct Registers {
    regs: Vec<u8>,
    mask: u32,
    reads: u64,
    writes: u64,
    last_write: Option<(u32, u8)>,
}

impl Registers {
    fn decode(&self, addr: u32) -> usize {
        (addr & self.mask) as usize
    }
}

impl ReadHandler for Registers {
    fn read(&mut self, addr: u32) -> u8 {
        self.reads += 1;
        self.regs[self.decode(addr)]
    }
}

impl WriteHandler for Registers {
    fn write(&mut self, addr: u32, value: u8) {
        let reg = self.decode(addr);
        self.regs[reg] = value;
        self.writes += 1;
        self.last_write = Some((addr, value));
    }
}

/// Handler-backed register block.
///
/// # Examples
///
/// ```rust
/// use pagemap::{Device, IoPorts, MapConfig, MemoryBus, MemoryMap};
///
/// let mut map = MemoryMap::new(MapConfig::default()).unwrap();
/// let mut cia = IoPorts::new(0xDC00, 0x400, 16);
/// cia.attach(&mut map).unwrap();
///
/// map.write(0xDC0D, 0x7F);
/// assert_eq!(cia.peek(0x0D), 0x7F);
/// assert_eq!(map.read(0xDC1D), 0x7F); // mirror
/// ```
pub struct IoPorts {
    name: String,
    base: u32,
    span: u32,
    registers: Rc<RefCell<Registers>>,
    id: Option<DeviceId>,
}

impl IoPorts {
    /// `count` registers repeated over `span` bytes from `base`.
    ///
    /// # Panics
    ///
    /// Panics if `count` is not a power of two.
    pub fn new(base: u32, span: u32, count: usize) -> Self {
        assert!(count.is_power_of_two(), "register count must be a power of two");
        Self {
            name: format!("io@{:04X}", base),
            base,
            span,
            registers: Rc::new(RefCell::new(Registers {
                regs: vec![0; count],
                mask: (count - 1) as u32,
                reads: 0,
                writes: 0,
                last_write: None,
            })),
            id: None,
        }
    }

    /// Rename the device.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Register value without touching the access counters.
    pub fn peek(&self, reg: usize) -> u8 {
        self.registers.borrow().regs[reg]
    }

    /// Set a register from the device side (e.g. a status flag).
    pub fn poke(&self, reg: usize, value: u8) {
        self.registers.borrow_mut().regs[reg] = value;
    }

    /// Number of bus reads served.
    pub fn read_count(&self) -> u64 {
        self.registers.borrow().reads
    }

    /// Number of bus writes received.
    pub fn write_count(&self) -> u64 {
        self.registers.borrow().writes
    }

    /// Address and value of the latest bus write.
    pub fn last_write(&self) -> Option<(u32, u8)> {
        self.registers.borrow().last_write
    }
}

impl Device for IoPorts {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<DeviceId> {
        self.id
    }

    fn attach(&mut self, map: &mut MemoryMap) -> MapResult<DeviceId> {
        let id = map.connect(&self.name, true)?;
        map.alloc_read_callback(id, self.base, self.span, self.registers.clone());
        map.alloc_write_callback(id, self.base, self.span, self.registers.clone());
        self.id = Some(id);
        Ok(id)
    }

    fn detach(&mut self, map: &mut MemoryMap) -> MapResult<()> {
        let id = self
            .id
            .take()
            .ok_or_else(|| MapError::UnknownDevice(self.name.clone()))?;
        map.disconnect(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MapConfig, MemoryBus, RamDevice};

    #[test]
    fn test_registers_mirror() {
        let mut map = MemoryMap::new(MapConfig::default()).unwrap();
        let mut io = IoPorts::new(0xA000, 0x400, 4);
        io.attach(&mut map).unwrap();

        map.write(0xA001, 0x11);
        assert_eq!(map.read(0xA001), 0x11);
        assert_eq!(map.read(0xA005), 0x11);
        assert_eq!(map.read(0xA3FD), 0x11);
        assert_eq!(io.peek(1), 0x11);
    }

    #[test]
    fn test_handler_called_once_per_access() {
        let mut map = MemoryMap::new(MapConfig::default()).unwrap();
        let mut io = IoPorts::new(0xD000, 0x400, 16);
        io.attach(&mut map).unwrap();

        map.write(0xD020, 0x06);
        assert_eq!(io.write_count(), 1);
        assert_eq!(io.last_write(), Some((0xD020, 0x06)));

        map.read(0xD020);
        map.read(0xD021);
        assert_eq!(io.read_count(), 2);
    }

    #[test]
    fn test_poke_visible_on_bus() {
        let mut map = MemoryMap::new(MapConfig::default()).unwrap();
        let mut io = IoPorts::new(0xDC00, 0x400, 16).with_name("cia1");
        io.attach(&mut map).unwrap();

        io.poke(0x0D, 0x81);
        assert_eq!(map.read(0xDC0D), 0x81);
        assert_eq!(map.device_name(io.id().unwrap()), Some("cia1"));
    }

    #[test]
    fn test_detach_restores_ram() {
        let mut map = MemoryMap::new(MapConfig::default()).unwrap();
        let mut ram = RamDevice::new(0x10000);
        ram.attach(&mut map).unwrap();
        let mut io = IoPorts::new(0xD000, 0x1000, 64);
        io.attach(&mut map).unwrap();

        map.write(0xD400, 0x0F);
        assert_eq!(ram.buffer().get(0xD400), 0x00);

        io.detach(&mut map).unwrap();
        map.write(0xD400, 0x0F);
        assert_eq!(ram.buffer().get(0xD400), 0x0F);
        assert_eq!(io.write_count(), 1);
    }
}
