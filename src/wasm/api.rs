//! WASM API for the page map.
//!
//! JavaScript cannot honour the Rust-side call contracts, so every entry
//! point checks ids and ranges first and reports problems as [`JsError`]
//! instead of panicking.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::warn;
use wasm_bindgen::prelude::*;

use crate::{
    BankConfig, DeviceId, MapConfig, MemoryBus, MemoryMap, ReadHandler, SharedBuffer,
    WriteHandler, MAX_DEVICES, PAGE_BITS, PAGE_MASK, PAGE_SIZE,
};

/// JavaScript-compatible error wrapper
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct JsError {
    message: String,
}

#[wasm_bindgen]
impl JsError {
    #[wasm_bindgen(constructor)]
    pub fn new(message: &str) -> JsError {
        JsError {
            message: message.to_string(),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl From<crate::MapError> for JsError {
    fn from(err: crate::MapError) -> Self {
        JsError::new(&err.to_string())
    }
}

/// I/O handler forwarding to JavaScript callbacks.
struct JsPort {
    on_read: js_sys::Function,
    on_write: js_sys::Function,
    fallback: u8,
}

impl ReadHandler for JsPort {
    fn read(&mut self, addr: u32) -> u8 {
        let result = self
            .on_read
            .call1(&JsValue::NULL, &JsValue::from(addr))
            .map(|v| v.as_f64());
        read_result(result, addr, self.fallback)
    }
}

impl WriteHandler for JsPort {
    fn write(&mut self, addr: u32, value: u8) {
        let result = self
            .on_write
            .call2(&JsValue::NULL, &JsValue::from(addr), &JsValue::from(value))
            .map(|_| ());
        write_result(result, addr, value);
    }
}

/// Byte returned by an `on_read` callback.
///
/// A thrown exception or a non-numeric return is logged and reads as
/// `fallback`.
fn read_result<E: fmt::Debug>(result: Result<Option<f64>, E>, addr: u32, fallback: u8) -> u8 {
    match result {
        Ok(Some(value)) => value as u8,
        Ok(None) => {
            warn!("on_read(0x{:04X}) did not return a number", addr);
            fallback
        }
        Err(err) => {
            warn!("on_read(0x{:04X}) threw {:?}", addr, err);
            fallback
        }
    }
}

fn write_result<E: fmt::Debug>(result: Result<(), E>, addr: u32, value: u8) {
    if let Err(err) = result {
        warn!("on_write(0x{:04X}, 0x{:02X}) threw {:?}", addr, value, err);
    }
}

/// First address of `page`, if the space has that page.
fn page_start(page: u32, page_count: usize) -> Option<u32> {
    if (page as usize) < page_count {
        Some(page << PAGE_BITS)
    } else {
        None
    }
}

/// Memory map interface for JavaScript
#[wasm_bindgen]
pub struct WasmMemoryMap {
    map: MemoryMap,
    buffers: Vec<SharedBuffer>,
}

#[wasm_bindgen]
impl WasmMemoryMap {
    /// Create a map of `space_size` bytes with nothing mapped
    #[wasm_bindgen(constructor)]
    pub fn new(space_size: u32) -> Result<WasmMemoryMap, JsError> {
        let map = MemoryMap::new(MapConfig::new(space_size))?;
        Ok(WasmMemoryMap {
            map,
            buffers: Vec::new(),
        })
    }

    /// Connect a device and return its priority id
    pub fn connect(&mut self, name: &str, high_priority: bool) -> Result<u8, JsError> {
        Ok(self.map.connect(name, high_priority)?.raw())
    }

    /// Put zeroed RAM under the whole space in the default slot
    pub fn connect_ram(&mut self) -> Result<u8, JsError> {
        let id = self.map.connect_default("ram")?;
        let ram = SharedBuffer::zeroed(self.space_size() as usize);
        self.map.alloc_ram(id, 0, self.space_size(), &ram);
        self.buffers.push(ram);
        Ok(id.raw())
    }

    /// Map a copy of `bytes` as ROM at `addr` (reads only)
    pub fn map_rom(&mut self, pid: u8, addr: u32, bytes: &[u8]) -> Result<(), JsError> {
        let id = self.check_id(pid)?;
        let rom = SharedBuffer::whole_pages(bytes.to_vec());
        self.check_direct(addr, rom.len() as u32)?;
        self.map.alloc_read_direct(id, addr, rom.len() as u32, &rom);
        self.buffers.push(rom);
        Ok(())
    }

    /// Map `length` bytes of fresh RAM at `addr` (reads and writes)
    pub fn map_ram(&mut self, pid: u8, addr: u32, length: u32) -> Result<(), JsError> {
        let id = self.check_id(pid)?;
        let ram = SharedBuffer::whole_pages(vec![0; length as usize]);
        self.check_direct(addr, ram.len() as u32)?;
        self.map.alloc_ram(id, addr, ram.len() as u32, &ram);
        self.buffers.push(ram);
        Ok(())
    }

    /// Route accesses of `length` bytes at `addr` to JavaScript callbacks
    ///
    /// `on_read(addr)` must return a number; `on_write(addr, value)` is
    /// called for every store.
    pub fn map_io(
        &mut self,
        pid: u8,
        addr: u32,
        length: u32,
        on_read: js_sys::Function,
        on_write: js_sys::Function,
    ) -> Result<(), JsError> {
        let id = self.check_id(pid)?;
        self.check_range(addr, length)?;
        let port = Rc::new(RefCell::new(JsPort {
            on_read,
            on_write,
            fallback: self.map.config().unmapped_value,
        }));
        self.map.alloc_read_callback(id, addr, length, port.clone());
        self.map.alloc_write_callback(id, addr, length, port);
        Ok(())
    }

    /// Drop the claims of `pid` on `length` bytes at `addr`, both directions
    pub fn release(&mut self, pid: u8, addr: u32, length: u32) -> Result<(), JsError> {
        let id = self.check_id(pid)?;
        self.check_range(addr, length)?;
        self.map.release(id, addr, length);
        Ok(())
    }

    /// Disconnect a device, restoring whatever it covered
    pub fn disconnect(&mut self, pid: u8) -> Result<(), JsError> {
        let id = self.check_id(pid)?;
        Ok(self.map.disconnect(id)?)
    }

    /// Read a byte as the CPU would
    pub fn read(&self, addr: u32) -> Result<u8, JsError> {
        self.check_range(addr, 1)?;
        Ok(self.map.read(addr))
    }

    /// Write a byte as the CPU would
    pub fn write(&mut self, addr: u32, value: u8) -> Result<(), JsError> {
        self.check_range(addr, 1)?;
        self.map.write(addr, value);
        Ok(())
    }

    /// Priority id visible to reads at `addr`
    pub fn read_owner(&self, addr: u32) -> Result<u8, JsError> {
        self.check_range(addr, 1)?;
        Ok(self.map.read_owner(addr).raw())
    }

    /// Priority id receiving writes at `addr`
    pub fn write_owner(&self, addr: u32) -> Result<u8, JsError> {
        self.check_range(addr, 1)?;
        Ok(self.map.write_owner(addr).raw())
    }

    /// Read a whole page for display
    pub fn get_page(&self, page: u32) -> Result<Vec<u8>, JsError> {
        let start = page_start(page, self.map.page_count()).ok_or_else(|| {
            JsError::new(&format!(
                "page {} is outside the {} pages of the space",
                page,
                self.map.page_count()
            ))
        })?;
        Ok((0..PAGE_SIZE as u32)
            .map(|i| self.map.read(start + i))
            .collect())
    }

    #[wasm_bindgen(getter)]
    pub fn space_size(&self) -> u32 {
        self.map.space_size()
    }

    #[wasm_bindgen(getter)]
    pub fn page_count(&self) -> u32 {
        self.map.page_count() as u32
    }
}

impl WasmMemoryMap {
    fn check_id(&self, pid: u8) -> Result<DeviceId, JsError> {
        if pid as usize >= MAX_DEVICES {
            return Err(JsError::new(&format!("device id {} out of range", pid)));
        }
        let id = DeviceId::new(pid);
        if !self.map.is_connected(id) {
            return Err(JsError::new(&format!("device {} is not connected", id)));
        }
        Ok(id)
    }

    fn check_range(&self, addr: u32, length: u32) -> Result<(), JsError> {
        let end = addr as u64 + length as u64;
        if end > self.space_size() as u64 {
            return Err(JsError::new(&format!(
                "range 0x{:X}+0x{:X} is outside the address space",
                addr, length
            )));
        }
        Ok(())
    }

    fn check_direct(&self, addr: u32, length: u32) -> Result<(), JsError> {
        if addr & PAGE_MASK != 0 {
            return Err(JsError::new(&format!(
                "address 0x{:X} is not page aligned",
                addr
            )));
        }
        self.check_range(addr, length)
    }
}
