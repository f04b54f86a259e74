//! QSPI types and command structures
//!
//! This module provides the per-phase wire parameters, the handle framing
//! configuration, the command builder, and common flash opcodes.

mod command;
mod format;
pub mod opcodes;
mod width;

pub use command::{Phase, QspiCommand};
pub use format::{QspiFormat, RawFormat, DEFAULT_FREQUENCY_HZ};
pub use width::{BusWidth, PhaseSize};
