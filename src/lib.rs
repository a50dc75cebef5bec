//! Software (bit-banged) SPI master.
//!
//! ## Overview
//!
//! This crate reproduces the SPI electrical and timing contract using
//! nothing but primitive digital-pin control, for targets that have run out
//! of hardware SPI peripherals (or never had one on the pins in question).
//! All four clock polarity/phase combinations are supported, a requested
//! bus frequency is quantized into a per-bit hold time around the board's
//! fixed per-bit software overhead, and words of 1 to 16 bits are exchanged
//! MSB first.
//!
//! The driver owns no pins itself. It runs on a board-supplied
//! implementation of the [`master::Instance`] trait, which provides raw
//! clock/data line control, chip select, device status and a busy-wait
//! delay. This keeps the core platform-agnostic and testable off-target.
//!
//! Every transfer is synchronous and blocking, including the busy-wait
//! delays; a caller must provide exclusive access to one [`master::Spi`]
//! value for the duration of an exchange. Independent bus instances are
//! fully independent.
//!
//! ## Usage
//!
//! ```rust
//! use spi_bitbang::{
//!     master::{Config, Instance, Spi},
//!     DeviceId, Mode, StatusFlags,
//! };
//!
//! // Pin control for one concrete board. For the sake of a runnable
//! // example the data-in line is looped back to data-out.
//! struct Board {
//!     mosi: bool,
//! }
//!
//! impl Instance for Board {
//!     const PER_BIT_NS: u32 = 100;
//!
//!     fn set_sck(&mut self, _high: bool) {}
//!
//!     fn set_mosi(&mut self, high: bool) {
//!         self.mosi = high;
//!     }
//!
//!     fn miso(&mut self) -> bool {
//!         self.mosi
//!     }
//!
//!     fn select(&mut self, _device: DeviceId, _selected: bool) {}
//!
//!     fn status(&mut self, _device: DeviceId) -> StatusFlags {
//!         StatusFlags::PRESENT
//!     }
//!
//!     fn delay_us(&mut self, _micros: u32) {
//!         // forward to the platform delay, e.g. embedded_hal::delay::DelayNs
//!     }
//! }
//!
//! let config = Config::default()
//!     .with_frequency(fugit::HertzU32::kHz(400))
//!     .with_mode(Mode::Mode0);
//! let mut spi = Spi::new(Board { mosi: false }, config).unwrap();
//!
//! spi.select(DeviceId(0), true);
//! assert_eq!(spi.exchange_u8(0xa5), 0xa5);
//! spi.select(DeviceId(0), false);
//! ```
//!
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![deny(missing_docs)]
#![no_std]

// MUST be the first module
mod fmt;

#[cfg(test)]
extern crate std;

pub mod master;

/// SPI clock modes.
///
/// The mode number combines the clock polarity (the level the clock line
/// rests at between words) and the clock phase (whether data is sampled on
/// the first or the second clock edge of a bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// CPOL = 0, CPHA = 0: clock idles low, data is sampled on the rising
    /// (first) edge.
    Mode0,
    /// CPOL = 0, CPHA = 1: clock idles low, data is sampled on the falling
    /// (second) edge.
    Mode1,
    /// CPOL = 1, CPHA = 0: clock idles high, data is sampled on the falling
    /// (first) edge.
    Mode2,
    /// CPOL = 1, CPHA = 1: clock idles high, data is sampled on the rising
    /// (second) edge.
    Mode3,
}

/// Identifies one addressable device on the bus for chip-select, status and
/// command/data purposes. The meaning of the value is defined by the board
/// layer implementing [`master::Instance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId(pub u32);

bitflags::bitflags! {
    /// Board-defined device status flags.
    ///
    /// The driver only transports these between the board layer and the
    /// caller; acting on them is bus-client policy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        /// A device/medium is present.
        const PRESENT = 1 << 0;
        /// The medium is write protected.
        const WRITE_PROTECTED = 1 << 1;
        /// The device is busy.
        const BUSY = 1 << 2;
    }
}

/// Bus operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The board layer does not implement the requested operation.
    Unsupported,
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}
