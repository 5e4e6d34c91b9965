//! A single-radio BLE Link Layer implementation.
//!
//! Implements just the Link Layer state machine described by the *Bluetooth Core Specification
//! v4.1, Vol 6, Part B*: advertising, scanning, initiating and a single connection, in either the
//! master or slave role. L2CAP, ATT/GATT and the Security Manager are out of scope; a Host stack
//! is expected to sit on top and exchange data and control PDUs through the [`link`] module.
//!
//! This crate is runtime and hardware-agnostic: it does not need an RTOS, and provides hardware
//! interfaces that need to be implemented once for every supported MCU family. The only part that
//! interacts directly with platform-specific interfaces is [`link`]. You have to provide it with
//! a few hardware-specific services, tied together through the [`Config`] trait:
//! * A microsecond-precision [`Timer`].
//! * A [`Transmitter`] that can send data and advertising channel packets.
//! * A processor for `link::Cmd`, which tells the support code when to call the Link Layer's
//!   functions again.
//!
//! [`link`]: link/index.html
//! [`Config`]: config/trait.Config.html
//! [`Timer`]: time/trait.Timer.html
//! [`Transmitter`]: link/trait.Transmitter.html

#![no_std]

#[macro_use]
mod utils;
#[macro_use]
mod log;
pub mod bytes;
pub mod config;
mod crc;
mod error;
pub mod link;
pub mod phy;
pub mod time;
pub mod timer_service;
pub mod uuid;

pub use self::error::{Error, LlError};

use self::link::llcp::VersionNumber;

/// Version of the Bluetooth Core Specification implemented by this Link Layer.
pub const BLUETOOTH_VERSION: VersionNumber = VersionNumber::V4_1;
