// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform-specific threading for cross-platform compatibility.
//!
//! On native platforms threads come from `std::thread`, while on WASM they
//! come from `wasm_thread`, which mirrors the `std::thread` API.

#[cfg(not(target_arch = "wasm32"))]
pub use std::thread;
#[cfg(target_arch = "wasm32")]
pub use wasm_thread as thread;
