#![cfg_attr(not(any(test, feature = "sim")), no_std)]

//! USB HID keyboard to Amiga keyboard-port bridge.
//!
//! The library is hardware independent: everything that touches pins,
//! timers or the USB side goes through the traits in [`platform`] and
//! [`transport`]. The ESP32 wiring lives in the `amigahid` binary.

pub mod config;
pub mod emitter;
pub mod error;
pub mod keymap;
pub mod link;
pub mod liveness;
pub mod platform;
pub mod report;
pub mod sequencer;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod transport;
pub mod types;

pub use error::LinkError;
pub use link::{select_interface, LinkDriver, LinkStats};
