//! linkguard - single-link BLE link-quality control for the nRF52840.
//!
//! The library holds all control logic and builds on the host, so it can
//! be unit-tested without hardware (`cargo test`).  The firmware images in
//! `src/main.rs` (central) and `src/bin/peripheral.rs` need the `embedded`
//! feature, which also pulls in the SoftDevice backend and the LED driver.
//!
//! Layout:
//! - [`radio`] - Radio Link Interface trait, events, and a recording mock.
//! - [`link`] - connection lifecycle manager and telemetry poll schedule.
//! - [`power`] - stepped, delegated, and monitor-only power control.
//! - [`zone`] - path-loss zone classifier and its discrete outputs.
//! - [`emulated`] - software path-loss monitoring and autonomous power
//!   control for controllers without them.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod config;
pub mod emulated;
pub mod error;
pub mod link;
pub mod power;
pub mod radio;
pub mod zone;

#[cfg(feature = "embedded")]
pub mod leds;
#[cfg(feature = "embedded")]
pub mod softdevice;

pub use error::{ConnectionError, Error, Feature, RadioError};
pub use link::{LinkManager, LinkState};
