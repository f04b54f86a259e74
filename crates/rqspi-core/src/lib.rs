//! rqspi-core - Core library for shared QSPI bus access
//!
//! This crate arbitrates one physical quad-SPI controller between several
//! logical device handles. Every handle carries its own framing (phase
//! widths and sizes, dummy cycles) and clock frequency; the bus makes sure
//! the controller is reprogrammed whenever a different handle becomes the
//! active one, and never otherwise.
//!
//! # Features
//!
//! - `std` - Enable standard library support (`std::error::Error` impls)
//!
//! # Example
//!
//! ```ignore
//! use rqspi_core::bus::QspiBus;
//! use rqspi_core::qspi::{opcodes, QspiFormat};
//!
//! let bus = QspiBus::new(hal);
//! let flash = bus.open(pins_a)?;
//! let sensor = bus.open(pins_b)?;
//!
//! flash.set_frequency(50_000_000)?;
//! sensor.configure_format(QspiFormat::default().with_dummy_cycles(8))?;
//!
//! let mut id = [0u8; 3];
//! flash.read_with(opcodes::RDID as u32, None, None, &mut id)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod bus;
pub mod error;
pub mod hal;
pub mod qspi;

pub use error::{Error, FormatField, Result};
