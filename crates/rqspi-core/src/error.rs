//! Error types for rqspi-core
//!
//! The core error is `Copy` and carries no driver detail: hardware failures
//! of any kind collapse into [`Error::TransferFailed`] at the bus layer.

use core::fmt;

/// The format field that failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatField {
    /// Instruction phase bus width
    InstructionWidth,
    /// Instruction phase size
    InstructionSize,
    /// Address phase bus width
    AddressWidth,
    /// Address phase size
    AddressSize,
    /// Alternate phase bus width
    AltWidth,
    /// Alternate phase size
    AltSize,
    /// Data phase bus width
    DataWidth,
    /// Number of dummy cycles
    DummyCycles,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    /// A format field is outside its allowed set
    InvalidFormat(FormatField),
    /// Bus frequency must be non-zero
    InvalidFrequency,

    // Driver errors
    /// The driver cannot drive the requested number of wires
    WidthNotSupported,
    /// The driver failed to bring up the peripheral
    InitFailed,
    /// Instruction is not understood by the device
    OpcodeNotSupported,
    /// Address is beyond the end of the device
    AddressOutOfBounds,
    /// The peripheral driver reported a failure
    TransferFailed,
}

impl fmt::Display for FormatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InstructionWidth => "instruction width",
            Self::InstructionSize => "instruction size",
            Self::AddressWidth => "address width",
            Self::AddressSize => "address size",
            Self::AltWidth => "alternate width",
            Self::AltSize => "alternate size",
            Self::DataWidth => "data width",
            Self::DummyCycles => "dummy cycles",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(field) => write!(f, "invalid QSPI format: bad {}", field),
            Self::InvalidFrequency => write!(f, "bus frequency must be non-zero"),
            Self::WidthNotSupported => write!(f, "bus width not supported by driver"),
            Self::InitFailed => write!(f, "QSPI peripheral initialization failed"),
            Self::OpcodeNotSupported => write!(f, "instruction not supported by device"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::TransferFailed => write!(f, "QSPI transfer failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
