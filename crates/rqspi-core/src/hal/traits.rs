//! Driver trait definitions

use crate::error::{Error, Result};
use crate::qspi::{BusWidth, QspiCommand};
use bitflags::bitflags;

bitflags! {
    /// QSPI driver feature flags
    ///
    /// Single-wire operation is always available; these flags report the
    /// wider modes a driver can clock.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QspiFeatures: u32 {
        /// Can drive phases on two wires
        const DUAL = 1 << 0;
        /// Can drive phases on four wires
        const QUAD = 1 << 1;

        /// Every width
        const ALL = Self::DUAL.bits() | Self::QUAD.bits();
    }
}

impl Default for QspiFeatures {
    fn default() -> Self {
        QspiFeatures::empty()
    }
}

/// Peripheral bring-up
///
/// One `QspiHal` stands for one physical controller. Every logical handle
/// opened on a bus gets its own [`QspiChannel`] from [`init`](Self::init);
/// all channels of a HAL drive the same wires and share one clock.
pub trait QspiHal {
    /// Pin set (or device path) a channel is bound to
    type Pins;
    /// Per-handle driver state
    type Channel: QspiChannel;

    /// Bind a channel to `pins` and program the initial clock and bus width
    fn init(&self, pins: Self::Pins, hz: u32, width: BusWidth) -> Result<Self::Channel>;
}

/// Per-handle driver primitives
///
/// Dropping a channel releases whatever `init` acquired.
///
/// Implementations report failures however they like; the bus collapses
/// every error into [`Error::TransferFailed`].
pub trait QspiChannel {
    /// Widths this channel can drive
    fn features(&self) -> QspiFeatures;

    /// Program the controller clock
    fn set_frequency(&mut self, hz: u32) -> Result<()>;

    /// Run `cmd` followed by a data-in phase into `buf`
    ///
    /// Returns the number of bytes actually received.
    fn read(&mut self, cmd: &QspiCommand, buf: &mut [u8]) -> Result<usize>;

    /// Run `cmd` followed by a data-out phase from `data`
    ///
    /// Returns the number of bytes actually sent.
    fn write(&mut self, cmd: &QspiCommand, data: &[u8]) -> Result<usize>;

    /// Run `cmd` with no data phase
    fn write_command(&mut self, cmd: &QspiCommand) -> Result<()>;
}

/// Check that a driver can clock every phase of a command
///
/// # Example
///
/// ```ignore
/// fn read(&mut self, cmd: &QspiCommand, buf: &mut [u8]) -> Result<usize> {
///     check_command_supported(cmd, self.features())?;
///     // ... run the transfer
/// }
/// ```
pub fn check_command_supported(cmd: &QspiCommand, features: QspiFeatures) -> Result<()> {
    match cmd.max_width() {
        BusWidth::Single => Ok(()),
        BusWidth::Dual if features.contains(QspiFeatures::DUAL) => Ok(()),
        BusWidth::Quad if features.contains(QspiFeatures::QUAD) => Ok(()),
        _ => Err(Error::WidthNotSupported),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qspi::{PhaseSize, QspiFormat};

    #[test]
    fn test_check_command_supported() {
        let single = QspiFormat::default()
            .with_instruction(BusWidth::Single, PhaseSize::Bits8)
            .with_address(BusWidth::Single, PhaseSize::Bits24)
            .with_data_width(BusWidth::Single);
        let cmd = QspiCommand::build(&single, 0x03, Some(0), None);
        assert_eq!(check_command_supported(&cmd, QspiFeatures::empty()), Ok(()));

        let dual = single.with_data_width(BusWidth::Dual);
        let cmd = QspiCommand::build(&dual, 0x3B, Some(0), None);
        assert_eq!(
            check_command_supported(&cmd, QspiFeatures::empty()),
            Err(Error::WidthNotSupported)
        );
        assert_eq!(check_command_supported(&cmd, QspiFeatures::DUAL), Ok(()));

        let cmd = QspiCommand::build(&QspiFormat::default(), 0xEC, Some(0), None);
        assert_eq!(
            check_command_supported(&cmd, QspiFeatures::DUAL),
            Err(Error::WidthNotSupported)
        );
        assert_eq!(check_command_supported(&cmd, QspiFeatures::ALL), Ok(()));
    }
}
