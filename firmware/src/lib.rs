#![cfg_attr(not(test), no_std)]

//! Pocket credential reminder firmware.
//!
//! Credentials are cached in flash, browsed on the display, refreshed from a
//! remote endpoint over Wi-Fi and typed into a paired host by emulating a BLE
//! keyboard. Everything except the `runtime` module builds on the host so the
//! state machines can be exercised without hardware.

extern crate alloc;

pub mod config;
pub mod hid;
pub mod storage;
pub mod sync;
pub mod system;
pub mod time;
pub mod ui;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(target_arch = "xtensa")]
pub mod runtime;
