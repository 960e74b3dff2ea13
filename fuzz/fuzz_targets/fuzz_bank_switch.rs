//! Fuzz target for bank switching.
//!
//! Replays arbitrary connect/claim/release/disconnect sequences on a small
//! map, in both directions, and checks after every step that each page
//! resolves to a connected device still claiming it and that RAM shows
//! through wherever nothing else claims the page.

#![no_main]

use std::cell::RefCell;
use std::rc::Rc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pagemap::{
    BankConfig, DeviceId, MapConfig, MemoryBus, MemoryMap, ReadHandler, SharedBuffer,
    WriteHandler, PAGE_SIZE,
};

const PAGES: u8 = 32;
const SPACE: u32 = PAGES as u32 * PAGE_SIZE as u32;
const RAM_BYTE: u8 = 0x5A;

/// Register answering reads with the last byte written to it
struct Latch {
    value: u8,
}

impl ReadHandler for Latch {
    fn read(&mut self, _addr: u32) -> u8 {
        self.value
    }
}

impl WriteHandler for Latch {
    fn write(&mut self, _addr: u32, value: u8) {
        self.value = value;
    }
}

/// Which side of the bus an operation touches
#[derive(Debug, Clone, Copy, Arbitrary)]
enum Direction {
    Read,
    Write,
    Both,
}

/// One mapping change or bus access
#[derive(Debug, Arbitrary)]
enum Action {
    Connect {
        high_priority: bool,
    },
    AllocDirect {
        device: u8,
        direction: Direction,
        first: u8,
        pages: u8,
        fill: u8,
    },
    AllocCallback {
        device: u8,
        direction: Direction,
        first: u8,
        pages: u8,
        value: u8,
    },
    Release {
        device: u8,
        direction: Direction,
        first: u8,
        pages: u8,
    },
    Disconnect {
        device: u8,
    },
    Read {
        addr: u16,
    },
    Write {
        addr: u16,
        value: u8,
    },
}

fn span(first: u8, pages: u8) -> (u32, u32) {
    let first = first % PAGES;
    let pages = (pages % (PAGES - first)).max(1);
    (
        first as u32 * PAGE_SIZE as u32,
        pages as u32 * PAGE_SIZE as u32,
    )
}

fn check(map: &MemoryMap, ram: &SharedBuffer, ram_id: DeviceId, connected: &[DeviceId]) {
    for page in 0..PAGES as u32 {
        let addr = page * PAGE_SIZE as u32;

        let reader = map.read_owner(addr);
        assert!(map.is_connected(reader));
        assert!(reader == ram_id || connected.contains(&reader));
        assert!(map.reads().claims(reader, addr));
        if reader == ram_id {
            assert_eq!(map.read(addr), ram.get(addr as usize));
        }

        let writer = map.write_owner(addr);
        assert!(map.is_connected(writer));
        assert!(writer == ram_id || connected.contains(&writer));
        assert!(map.writes().claims(writer, addr));
    }
}

fuzz_target!(|actions: Vec<Action>| {
    let mut map = MemoryMap::new(MapConfig::new(SPACE)).unwrap();
    let ram = SharedBuffer::new(vec![RAM_BYTE; SPACE as usize]);
    let ram_id = map.connect_default("ram").unwrap();
    map.alloc_ram(ram_id, 0, SPACE, &ram);

    let mut connected: Vec<DeviceId> = Vec::new();
    let mut serial = 0usize;

    for action in actions.iter().take(256) {
        match *action {
            Action::Connect { high_priority } => {
                serial += 1;
                // Slot exhaustion is an expected outcome
                if let Ok(id) = map.connect(&format!("card{}", serial), high_priority) {
                    connected.push(id);
                }
            }
            Action::AllocDirect { device, direction, first, pages, fill } => {
                if connected.is_empty() {
                    continue;
                }
                let id = connected[device as usize % connected.len()];
                let (addr, length) = span(first, pages);
                let buffer = SharedBuffer::new(vec![fill; length as usize]);
                match direction {
                    Direction::Read => map.alloc_read_direct(id, addr, length, &buffer),
                    Direction::Write => map.alloc_write_direct(id, addr, length, &buffer),
                    Direction::Both => map.alloc_ram(id, addr, length, &buffer),
                }
            }
            Action::AllocCallback { device, direction, first, pages, value } => {
                if connected.is_empty() {
                    continue;
                }
                let id = connected[device as usize % connected.len()];
                let (addr, length) = span(first, pages);
                let latch = Rc::new(RefCell::new(Latch { value }));
                if matches!(direction, Direction::Read | Direction::Both) {
                    map.alloc_read_callback(id, addr, length, latch.clone());
                }
                if matches!(direction, Direction::Write | Direction::Both) {
                    map.alloc_write_callback(id, addr, length, latch);
                }
            }
            Action::Release { device, direction, first, pages } => {
                if connected.is_empty() {
                    continue;
                }
                let id = connected[device as usize % connected.len()];
                let (addr, length) = span(first, pages);
                match direction {
                    Direction::Read => map.release_read(id, addr, length),
                    Direction::Write => map.release_write(id, addr, length),
                    Direction::Both => map.release(id, addr, length),
                }
            }
            Action::Disconnect { device } => {
                if connected.is_empty() {
                    continue;
                }
                let id = connected.remove(device as usize % connected.len());
                map.disconnect(id).unwrap();
            }
            Action::Read { addr } => {
                let _ = map.read(addr as u32 % SPACE);
            }
            Action::Write { addr, value } => {
                let addr = addr as u32 % SPACE;
                let ram_visible = map.write_owner(addr) == ram_id;
                map.write(addr, value);
                if ram_visible {
                    assert_eq!(ram.get(addr as usize), value);
                }
            }
        }

        check(&map, &ram, ram_id, &connected);
    }
});
