//! WebAssembly bindings for the page map.
//!
//! This module provides JavaScript-callable interfaces to a [`MemoryMap`](crate::MemoryMap),
//! so browser front ends can build machine memory layouts and inspect them.

#[cfg(feature = "wasm")]
pub mod api;

#[cfg(feature = "wasm")]
pub use api::WasmMemoryMap;
