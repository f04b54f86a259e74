//! rqspi-linux-spi - Linux spidev backend
//!
//! This crate drives a QSPI bus through the Linux `spidev` interface at
//! `/dev/spidevX.Y`. Each phase of a command becomes one segment of a single
//! `SPI_IOC_MESSAGE`, with `tx_nbits`/`rx_nbits` set to the phase width, so
//! controllers whose kernel driver supports dual and quad transfers get real
//! multi-wire phases.
//!
//! # Example
//!
//! ```no_run
//! use rqspi_core::bus::QspiBus;
//! use rqspi_core::qspi::opcodes;
//! use rqspi_linux_spi::{LinuxQspi, LinuxQspiConfig};
//!
//! let bus: QspiBus<LinuxQspi> = QspiBus::new(LinuxQspi::new(LinuxQspiConfig::default()));
//! let flash = bus.open("/dev/spidev0.0".into())?;
//!
//! let mut id = [0u8; 3];
//! flash.read_with(opcodes::RDID as u32, None, None, &mut id)?;
//! println!("JEDEC ID: {:02X} {:02X} {:02X}", id[0], id[1], id[2]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - Read/write access to `/dev/spidevX.Y` device
//! - Dual/quad phases need a controller driver that advertises them

pub mod device;
pub mod error;

// Re-exports
pub use device::{mode, parse_options, LinuxQspi, LinuxQspiChannel, LinuxQspiConfig};
pub use error::{LinuxSpiError, Result};
