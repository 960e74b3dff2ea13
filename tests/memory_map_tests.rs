//! Integration tests for the page map.
//!
//! These tests drive the public API the way an emulator does: a background
//! RAM device, ROMs and I/O claiming pages over it, and bank switches that
//! come and go while the CPU keeps reading and writing.

use std::cell::RefCell;
use std::rc::Rc;

use pagemap::{
    BankConfig, DeviceId, MapConfig, MapError, MemoryBus, MemoryMap, ReadHandler, SharedBuffer,
    WriteHandler,
};

/// 64 KiB map with RAM in the default slot, both directions.
fn setup_map() -> (MemoryMap, SharedBuffer) {
    let mut map = MemoryMap::new(MapConfig::new(0x10000)).unwrap();
    let ram = SharedBuffer::new((0..0x10000).map(|i| (i >> 8) as u8).collect());
    let id = map.connect_default("ram").unwrap();
    map.alloc_ram(id, 0x0000, 0x10000, &ram);
    (map, ram)
}

fn pattern(len: usize, seed: u8) -> SharedBuffer {
    SharedBuffer::new((0..len).map(|i| (i as u8).wrapping_mul(3) ^ seed).collect())
}

#[derive(Default)]
struct Recorder {
    writes: Vec<(u32, u8)>,
}

impl WriteHandler for Recorder {
    fn write(&mut self, addr: u32, value: u8) {
        self.writes.push((addr, value));
    }
}

impl ReadHandler for Recorder {
    fn read(&mut self, addr: u32) -> u8 {
        (addr >> 4) as u8
    }
}

#[test]
fn test_end_to_end_rom_over_ram() {
    let (mut map, ram) = setup_map();
    assert_eq!(map.page_count(), 64);
    assert_eq!(map.space_size(), 0x10000);

    let rom = pattern(0x2000, 0x5A);
    let rom_id = map.connect("rom", true).unwrap();
    assert_eq!(rom_id, DeviceId::new(0));
    map.alloc_read_direct(rom_id, 0x0000, 0x2000, &rom);

    // Reads come from ROM
    assert_eq!(map.read(0x0000), rom.get(0));
    assert_eq!(map.read(0x1FFF), rom.get(0x1FFF));
    assert_eq!(map.read(0x2000), ram.get(0x2000));

    // Writes go to RAM on the independent write side
    map.write(0x0000, 0x99);
    assert_eq!(ram.get(0x0000), 0x99);
    assert_eq!(rom.get(0), 0x5A);
    assert_eq!(map.read(0x0000), rom.get(0));

    // Releasing the ROM shows RAM again
    map.release_read(rom_id, 0x0000, 0x2000);
    assert_eq!(map.read(0x0000), 0x99);
    assert_eq!(map.read_owner(0x0000), DeviceId::DEFAULT);
}

#[test]
fn test_direct_mapping_page_offsets() {
    let (mut map, _ram) = setup_map();
    let rom = pattern(0x400, 0x11);
    let id = map.connect("rom", false).unwrap();
    map.alloc_read_direct(id, 0x1000, 0x400, &rom);

    assert_eq!(map.read(0x1000), rom.get(0));
    assert_eq!(map.read(0x13FF), rom.get(0x3FF));
}

#[test]
fn test_higher_priority_wins_regardless_of_order() {
    for high_first in [true, false] {
        let (mut map, _ram) = setup_map();
        let a_buf = SharedBuffer::new(vec![0xAA; 0x1000]);
        let b_buf = SharedBuffer::new(vec![0xBB; 0x1000]);
        let a = map.connect("a", true).unwrap();
        let b = map.connect("b", false).unwrap();
        assert!(a.outranks(b));

        if high_first {
            map.alloc_read_direct(a, 0x4000, 0x1000, &a_buf);
            map.alloc_read_direct(b, 0x4000, 0x1000, &b_buf);
        } else {
            map.alloc_read_direct(b, 0x4000, 0x1000, &b_buf);
            map.alloc_read_direct(a, 0x4000, 0x1000, &a_buf);
        }
        assert_eq!(map.read(0x4000), 0xAA);
        assert_eq!(map.read(0x4FFF), 0xAA);

        map.release_read(a, 0x4000, 0x1000);
        assert_eq!(map.read(0x4000), 0xBB);
    }
}

#[test]
fn test_alloc_then_release_restores_exact_state() {
    let (mut map, _ram) = setup_map();
    let snapshot: Vec<(u8, DeviceId)> = (0..0x10000u32)
        .step_by(0x100)
        .map(|addr| (map.read(addr), map.read_owner(addr)))
        .collect();

    let cart = SharedBuffer::new(vec![0xC0; 0x4000]);
    let id = map.connect("cart", true).unwrap();
    map.alloc_read_direct(id, 0x8000, 0x4000, &cart);
    map.release_read(id, 0x8000, 0x4000);

    let after: Vec<(u8, DeviceId)> = (0..0x10000u32)
        .step_by(0x100)
        .map(|addr| (map.read(addr), map.read_owner(addr)))
        .collect();
    assert_eq!(snapshot, after);
}

#[test]
fn test_default_release_is_noop() {
    let (mut map, ram) = setup_map();
    map.release(DeviceId::DEFAULT, 0x0000, 0x10000);

    assert_eq!(map.read(0x1234), ram.get(0x1234));
    map.write(0x1234, 0x42);
    assert_eq!(ram.get(0x1234), 0x42);
    assert_eq!(map.read_owner(0xFFFF), DeviceId::DEFAULT);
}

#[test]
fn test_callback_write_invoked_exactly_once() {
    let (mut map, ram) = setup_map();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let id = map.connect("vic", true).unwrap();
    map.alloc_write_callback(id, 0xD000, 0x400, recorder.clone());

    map.write(0xD020, 0x0E);
    assert_eq!(recorder.borrow().writes, vec![(0xD020, 0x0E)]);
    assert_eq!(ram.get(0xD020), (0xD020u32 >> 8) as u8);

    // Reads on that page still come from RAM: only writes were claimed
    assert_eq!(map.read(0xD020), ram.get(0xD020));
}

#[test]
fn test_callback_read_decodes_address() {
    let (mut map, _ram) = setup_map();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let id = map.connect("sid", false).unwrap();
    map.alloc_read_callback(id, 0xD400, 0x400, recorder);

    assert_eq!(map.read(0xD410), 0x41);
    assert_eq!(map.read(0xD7F0), 0x7F);
}

#[test]
fn test_unmapped_space_floats() {
    let mut map = MemoryMap::new(MapConfig::new(0x8000).with_unmapped_value(0xEE)).unwrap();
    assert_eq!(map.read(0x0000), 0xEE);
    map.write(0x0000, 0x12);
    assert_eq!(map.read(0x0000), 0xEE);
    assert_eq!(map.read_owner(0x7FFF), DeviceId::DEFAULT);
}

#[test]
fn test_invalid_space_sizes() {
    assert_eq!(
        MemoryMap::new(MapConfig::new(0)).err(),
        Some(MapError::InvalidSpaceSize(0))
    );
    assert_eq!(
        MemoryMap::new(MapConfig::new(0x10001)).err(),
        Some(MapError::InvalidSpaceSize(0x10001))
    );
}

/// The C64 PLA exposes BASIC, KERNAL, character ROM and I/O depending on the
/// low bits of the 6510 port. Reproduce three of its configurations with
/// releases and claims on a 64 KiB map.
#[test]
fn test_c64_style_bank_configurations() {
    let (mut map, ram) = setup_map();

    let basic = SharedBuffer::new(vec![0xBA; 0x2000]);
    let kernal = SharedBuffer::new(vec![0xCE; 0x2000]);
    let chargen = SharedBuffer::new(vec![0xC4; 0x1000]);
    let io = Rc::new(RefCell::new(Recorder::default()));

    let io_id = map.connect("io", true).unwrap();
    let chargen_id = map.connect("chargen", true).unwrap();
    let basic_id = map.connect("basic", false).unwrap();
    let kernal_id = map.connect("kernal", false).unwrap();

    // Power-on: BASIC, KERNAL and I/O visible
    map.alloc_read_direct(basic_id, 0xA000, 0x2000, &basic);
    map.alloc_read_direct(kernal_id, 0xE000, 0x2000, &kernal);
    map.alloc_read_direct(chargen_id, 0xD000, 0x1000, &chargen);
    map.alloc_read_callback(io_id, 0xD000, 0x1000, io.clone());
    map.alloc_write_callback(io_id, 0xD000, 0x1000, io.clone());

    assert_eq!(map.read(0xA000), 0xBA);
    assert_eq!(map.read(0xE000), 0xCE);
    assert_eq!(map.read(0xD020), 0x02);
    map.write(0xA000, 0x55);
    assert_eq!(map.read(0xA000), 0xBA);

    // Character ROM instead of I/O: the chargen claim was hidden underneath
    map.release(io_id, 0xD000, 0x1000);
    assert_eq!(map.read(0xD000), 0xC4);
    map.write(0xD000, 0x77);
    assert_eq!(ram.get(0xD000), 0x77);
    assert_eq!(io.borrow().writes.len(), 0);

    // All RAM
    map.release_read(basic_id, 0xA000, 0x2000);
    map.release_read(kernal_id, 0xE000, 0x2000);
    map.release_read(chargen_id, 0xD000, 0x1000);
    assert_eq!(map.read(0xA000), 0x55);
    assert_eq!(map.read(0xD000), 0x77);
    assert_eq!(map.read(0xE000), ram.get(0xE000));

    // I/O comes back over RAM
    map.alloc_read_callback(io_id, 0xD000, 0x1000, io.clone());
    assert_eq!(map.read(0xD020), 0x02);
    assert_eq!(map.read_through(DeviceId::DEFAULT, 0xD000), 0x77);
}

#[test]
fn test_exhaustion_leaves_device_inactive() {
    let (mut map, _ram) = setup_map();
    let ids: Vec<DeviceId> = (0..7)
        .map(|i| map.connect(&format!("card{}", i), i % 2 == 0).unwrap())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 7);
    assert!(!ids.contains(&DeviceId::DEFAULT));

    assert_eq!(map.connect("one too many", false), Err(MapError::NoFreeSlot));

    map.disconnect(ids[2]).unwrap();
    assert_eq!(map.connect("replacement", false), Ok(ids[2]));
}

#[test]
fn test_devices_listing() {
    let (mut map, _ram) = setup_map();
    map.connect("fdc", false).unwrap();
    map.connect("rtc", true).unwrap();

    let listed: Vec<(DeviceId, String)> = map
        .devices()
        .map(|(id, name)| (id, name.to_string()))
        .collect();
    assert_eq!(
        listed,
        vec![
            (DeviceId::new(0), String::from("rtc")),
            (DeviceId::new(6), String::from("fdc")),
            (DeviceId::DEFAULT, String::from("ram")),
        ]
    );
}

#[test]
#[should_panic(expected = "not connected")]
fn test_read_through_unconnected_panics() {
    let (map, _ram) = setup_map();
    map.read_through(DeviceId::new(4), 0x0000);
}

#[test]
#[should_panic(expected = "outside the address space")]
fn test_write_outside_space_panics() {
    let mut map = MemoryMap::new(MapConfig::new(0x4000)).unwrap();
    map.write(0x4000, 0x00);
}
