//! Phase bus widths and sizes

/// Number of data wires driven during a phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BusWidth {
    /// One wire (IO0 out, IO1 in)
    Single = 1,
    /// Two wires (IO0-IO1)
    Dual = 2,
    /// Four wires (IO0-IO3)
    #[default]
    Quad = 4,
}

impl BusWidth {
    /// Returns the number of data lines
    pub const fn lines(&self) -> u8 {
        *self as u8
    }

    /// Map a raw line count onto a bus width
    pub const fn from_lines(lines: i64) -> Option<Self> {
        match lines {
            1 => Some(Self::Single),
            2 => Some(Self::Dual),
            4 => Some(Self::Quad),
            _ => None,
        }
    }
}

/// Size of the instruction, address or alternate phase
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PhaseSize {
    /// Phase is omitted from the transaction
    #[default]
    None,
    /// 8 bits
    Bits8,
    /// 16 bits
    Bits16,
    /// 24 bits
    Bits24,
    /// 32 bits
    Bits32,
}

impl PhaseSize {
    /// Returns the phase length in bits
    pub const fn bits(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Bits8 => 8,
            Self::Bits16 => 16,
            Self::Bits24 => 24,
            Self::Bits32 => 32,
        }
    }

    /// Returns the phase length in bytes
    pub const fn bytes(&self) -> usize {
        self.bits() as usize / 8
    }

    /// Map a raw bit count onto a phase size (0 means no phase)
    pub const fn from_bits(bits: i64) -> Option<Self> {
        match bits {
            0 => Some(Self::None),
            8 => Some(Self::Bits8),
            16 => Some(Self::Bits16),
            24 => Some(Self::Bits24),
            32 => Some(Self::Bits32),
            _ => None,
        }
    }

    /// Encode `value` big-endian into `buf`, returning the bytes written
    ///
    /// Only the low `bits()` of the value are sent.
    pub fn encode(&self, value: u32, buf: &mut [u8]) -> usize {
        let len = self.bytes();
        let be = value.to_be_bytes();
        buf[..len].copy_from_slice(&be[4 - len..]);
        len
    }
}
