//! Per-handle framing configuration

use super::{BusWidth, PhaseSize};
use crate::error::{Error, FormatField, Result};

/// Clock frequency a freshly opened handle runs at (1 MHz)
pub const DEFAULT_FREQUENCY_HZ: u32 = 1_000_000;

/// Phase widths and sizes a handle programs into the controller
///
/// The default is quad width on every phase with an 8-bit instruction, a
/// 32-bit address, no alternate bytes and no dummy cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QspiFormat {
    /// Bus width of the instruction phase
    pub inst_width: BusWidth,
    /// Size of the instruction phase (never `None`)
    pub inst_size: PhaseSize,
    /// Bus width of the address phase
    pub address_width: BusWidth,
    /// Size of the address phase when an address is given (never `None`)
    pub address_size: PhaseSize,
    /// Bus width of the alternate phase
    pub alt_width: BusWidth,
    /// Size of the alternate phase when an alternate value is given
    pub alt_size: PhaseSize,
    /// Bus width of the data phase
    pub data_width: BusWidth,
    /// Clock cycles between the alternate and data phases
    pub dummy_cycles: u8,
}

impl Default for QspiFormat {
    fn default() -> Self {
        Self {
            inst_width: BusWidth::Quad,
            inst_size: PhaseSize::Bits8,
            address_width: BusWidth::Quad,
            address_size: PhaseSize::Bits32,
            alt_width: BusWidth::Quad,
            alt_size: PhaseSize::None,
            data_width: BusWidth::Quad,
            dummy_cycles: 0,
        }
    }
}

impl QspiFormat {
    /// Set the instruction phase width and size
    pub fn with_instruction(mut self, width: BusWidth, size: PhaseSize) -> Self {
        self.inst_width = width;
        self.inst_size = size;
        self
    }

    /// Set the address phase width and size
    pub fn with_address(mut self, width: BusWidth, size: PhaseSize) -> Self {
        self.address_width = width;
        self.address_size = size;
        self
    }

    /// Set the alternate phase width and size
    pub fn with_alt(mut self, width: BusWidth, size: PhaseSize) -> Self {
        self.alt_width = width;
        self.alt_size = size;
        self
    }

    /// Set the data phase width
    pub fn with_data_width(mut self, width: BusWidth) -> Self {
        self.data_width = width;
        self
    }

    /// Set the number of dummy cycles
    pub fn with_dummy_cycles(mut self, cycles: u8) -> Self {
        self.dummy_cycles = cycles;
        self
    }

    /// Check the fields the type system cannot rule out
    ///
    /// Instruction and address sizes must name an actual size; only the
    /// alternate phase may be configured as absent.
    pub fn validate(&self) -> Result<()> {
        if self.inst_size == PhaseSize::None {
            return Err(Error::InvalidFormat(FormatField::InstructionSize));
        }
        if self.address_size == PhaseSize::None {
            return Err(Error::InvalidFormat(FormatField::AddressSize));
        }
        Ok(())
    }
}

/// Untyped format as it arrives from a command line or a config file
///
/// Widths are wire counts, sizes are bit counts (0 for "none").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawFormat {
    /// Instruction wires
    pub inst_width: i64,
    /// Instruction bits
    pub inst_size: i64,
    /// Address wires
    pub address_width: i64,
    /// Address bits
    pub address_size: i64,
    /// Alternate wires
    pub alt_width: i64,
    /// Alternate bits (0 for none)
    pub alt_size: i64,
    /// Data wires
    pub data_width: i64,
    /// Dummy cycles
    pub dummy_cycles: i64,
}

impl Default for RawFormat {
    fn default() -> Self {
        QspiFormat::default().into()
    }
}

impl From<QspiFormat> for RawFormat {
    fn from(f: QspiFormat) -> Self {
        Self {
            inst_width: f.inst_width.lines() as i64,
            inst_size: f.inst_size.bits() as i64,
            address_width: f.address_width.lines() as i64,
            address_size: f.address_size.bits() as i64,
            alt_width: f.alt_width.lines() as i64,
            alt_size: f.alt_size.bits() as i64,
            data_width: f.data_width.lines() as i64,
            dummy_cycles: f.dummy_cycles as i64,
        }
    }
}

impl TryFrom<RawFormat> for QspiFormat {
    type Error = Error;

    fn try_from(raw: RawFormat) -> Result<Self> {
        let width = |lines: i64, field| {
            BusWidth::from_lines(lines).ok_or(Error::InvalidFormat(field))
        };
        let size = |bits: i64, field| match PhaseSize::from_bits(bits) {
            Some(PhaseSize::None) | None => Err(Error::InvalidFormat(field)),
            Some(s) => Ok(s),
        };

        let format = Self {
            inst_width: width(raw.inst_width, FormatField::InstructionWidth)?,
            inst_size: size(raw.inst_size, FormatField::InstructionSize)?,
            address_width: width(raw.address_width, FormatField::AddressWidth)?,
            address_size: size(raw.address_size, FormatField::AddressSize)?,
            alt_width: width(raw.alt_width, FormatField::AltWidth)?,
            alt_size: PhaseSize::from_bits(raw.alt_size)
                .ok_or(Error::InvalidFormat(FormatField::AltSize))?,
            data_width: width(raw.data_width, FormatField::DataWidth)?,
            dummy_cycles: u8::try_from(raw.dummy_cycles)
                .map_err(|_| Error::InvalidFormat(FormatField::DummyCycles))?,
        };
        format.validate()?;
        Ok(format)
    }
}
