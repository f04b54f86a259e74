//! QSPI command descriptor

use super::{BusWidth, PhaseSize, QspiFormat};

/// One header phase of a transaction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Phase {
    /// Wires driven during the phase
    pub width: BusWidth,
    /// Phase length; `PhaseSize::None` omits the phase
    pub size: PhaseSize,
    /// Value shifted out MSB first
    pub value: u32,
}

impl Phase {
    /// Returns true if the phase is clocked out at all
    pub const fn is_present(&self) -> bool {
        !matches!(self.size, PhaseSize::None)
    }

    fn optional(width: BusWidth, size: PhaseSize, value: Option<u32>) -> Self {
        match value {
            Some(value) => Self { width, size, value },
            None => Self {
                width,
                size: PhaseSize::None,
                value: 0,
            },
        }
    }
}

/// Wire-level description of a single transaction
///
/// Built fresh for every transfer from the owning handle's format and the
/// call's instruction, address and alternate values. Data buffers are passed
/// to the driver next to the descriptor, not inside it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct QspiCommand {
    /// Instruction phase
    pub instruction: Phase,
    /// Address phase
    pub address: Phase,
    /// Alternate phase (mode bits)
    pub alt: Phase,
    /// Clock cycles between the alternate and data phases
    pub dummy_cycles: u8,
    /// Bus width of the data phase
    pub data_width: BusWidth,
}

impl QspiCommand {
    /// Build a descriptor from a handle's format
    ///
    /// A `None` address or alternate value drops that phase: its size becomes
    /// `PhaseSize::None` and its value 0, whatever the format says. Widths,
    /// dummy cycles and the data width are copied from the format untouched.
    pub fn build(
        format: &QspiFormat,
        instruction: u32,
        address: Option<u32>,
        alt: Option<u32>,
    ) -> Self {
        Self {
            instruction: Phase {
                width: format.inst_width,
                size: format.inst_size,
                value: instruction,
            },
            address: Phase::optional(format.address_width, format.address_size, address),
            alt: Phase::optional(format.alt_width, format.alt_size, alt),
            dummy_cycles: format.dummy_cycles,
            data_width: format.data_width,
        }
    }

    /// Returns true if this command has an address phase
    pub fn has_address(&self) -> bool {
        self.address.is_present()
    }

    /// Returns true if this command has an alternate phase
    pub fn has_alt(&self) -> bool {
        self.alt.is_present()
    }

    /// Widest bus used by any phase of this command
    pub fn max_width(&self) -> BusWidth {
        let mut lines = self.data_width.lines();
        for phase in [&self.instruction, &self.address, &self.alt] {
            if phase.is_present() {
                lines = lines.max(phase.width.lines());
            }
        }
        BusWidth::from_lines(lines as i64).unwrap_or(BusWidth::Quad)
    }

    /// Number of bytes clocked out for the dummy phase
    ///
    /// Dummy cycles run at the address phase width, rounded up to whole bytes.
    pub fn dummy_bytes(&self) -> usize {
        let bits = self.dummy_cycles as usize * self.address.width.lines() as usize;
        bits.div_ceil(8)
    }

    /// Length of the instruction, address and alternate phases in bytes
    pub fn header_len(&self) -> usize {
        self.instruction.size.bytes() + self.address.size.bytes() + self.alt.size.bytes()
    }

    /// Encode the instruction, address and alternate phases into `buf`
    ///
    /// Returns the number of bytes written (always `header_len()`).
    pub fn encode_header(&self, buf: &mut [u8]) -> usize {
        let mut len = 0;
        for phase in [&self.instruction, &self.address, &self.alt] {
            len += phase.size.encode(phase.value, &mut buf[len..]);
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> QspiFormat {
        QspiFormat::default()
            .with_instruction(BusWidth::Single, PhaseSize::Bits8)
            .with_address(BusWidth::Dual, PhaseSize::Bits24)
            .with_alt(BusWidth::Quad, PhaseSize::Bits8)
            .with_data_width(BusWidth::Quad)
            .with_dummy_cycles(6)
    }

    #[test]
    fn test_address_and_alt_present() {
        let cmd = QspiCommand::build(&format(), 0xEB, Some(0x123456), Some(0xA5));
        assert_eq!(cmd.instruction.width, BusWidth::Single);
        assert_eq!(cmd.instruction.size, PhaseSize::Bits8);
        assert_eq!(cmd.instruction.value, 0xEB);
        assert_eq!(cmd.address.width, BusWidth::Dual);
        assert_eq!(cmd.address.size, PhaseSize::Bits24);
        assert_eq!(cmd.address.value, 0x123456);
        assert_eq!(cmd.alt.width, BusWidth::Quad);
        assert_eq!(cmd.alt.size, PhaseSize::Bits8);
        assert_eq!(cmd.alt.value, 0xA5);
        assert_eq!(cmd.dummy_cycles, 6);
        assert_eq!(cmd.data_width, BusWidth::Quad);
    }

    #[test]
    fn test_address_absent_alt_present() {
        let cmd = QspiCommand::build(&format(), 0x9F, None, Some(0xA5));
        assert_eq!(cmd.address.width, BusWidth::Dual);
        assert_eq!(cmd.address.size, PhaseSize::None);
        assert_eq!(cmd.address.value, 0);
        assert_eq!(cmd.alt.size, PhaseSize::Bits8);
        assert_eq!(cmd.alt.value, 0xA5);
    }

    #[test]
    fn test_address_present_alt_absent() {
        let cmd = QspiCommand::build(&format(), 0x0B, Some(0x10), None);
        assert_eq!(cmd.address.size, PhaseSize::Bits24);
        assert_eq!(cmd.address.value, 0x10);
        assert_eq!(cmd.alt.width, BusWidth::Quad);
        assert_eq!(cmd.alt.size, PhaseSize::None);
        assert_eq!(cmd.alt.value, 0);
    }

    #[test]
    fn test_address_and_alt_absent() {
        let cmd = QspiCommand::build(&format(), 0x06, None, None);
        assert!(!cmd.has_address());
        assert!(!cmd.has_alt());
        assert_eq!(cmd.address.value, 0);
        assert_eq!(cmd.alt.value, 0);
        assert_eq!(cmd.header_len(), 1);
        assert_eq!(cmd.dummy_cycles, 6);
    }

    #[test]
    fn test_encode_header() {
        let cmd = QspiCommand::build(&format(), 0xEB, Some(0x123456), Some(0xA5));
        let mut buf = [0u8; 8];
        assert_eq!(cmd.header_len(), 5);
        assert_eq!(cmd.encode_header(&mut buf), 5);
        assert_eq!(&buf[..5], &[0xEB, 0x12, 0x34, 0x56, 0xA5]);
    }

    #[test]
    fn test_dummy_bytes_follow_address_width() {
        // 6 cycles on 2 wires = 12 bits, rounded up to 2 bytes
        let cmd = QspiCommand::build(&format(), 0xBB, Some(0), None);
        assert_eq!(cmd.dummy_bytes(), 2);

        let quad = format()
            .with_address(BusWidth::Quad, PhaseSize::Bits24)
            .with_dummy_cycles(4);
        assert_eq!(QspiCommand::build(&quad, 0xEB, Some(0), None).dummy_bytes(), 2);

        let none = format().with_dummy_cycles(0);
        assert_eq!(QspiCommand::build(&none, 0x03, Some(0), None).dummy_bytes(), 0);
    }

    #[test]
    fn test_max_width_ignores_absent_phases() {
        let f = QspiFormat::default()
            .with_instruction(BusWidth::Single, PhaseSize::Bits8)
            .with_address(BusWidth::Single, PhaseSize::Bits24)
            .with_alt(BusWidth::Quad, PhaseSize::Bits8)
            .with_data_width(BusWidth::Dual);
        assert_eq!(QspiCommand::build(&f, 0x3B, Some(0), None).max_width(), BusWidth::Dual);
        assert_eq!(QspiCommand::build(&f, 0x3B, Some(0), Some(0)).max_width(), BusWidth::Quad);
    }
}
