//! Lock-protected bus and handle state

use core::fmt;

use crate::error::{Error, Result};
use crate::hal::QspiChannel;
use crate::qspi::{opcodes, QspiCommand, QspiFormat, DEFAULT_FREQUENCY_HZ};

/// Identifies a handle on its bus
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u32);

impl HandleId {
    /// Raw handle number, unique for the lifetime of the bus
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a handle programs into the bus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleConfig {
    /// Phase widths and sizes
    pub format: QspiFormat,
    /// Bus clock in Hz
    pub frequency: u32,
    /// Instruction for default-form reads
    pub read_instruction: u32,
    /// Instruction for default-form writes
    pub write_instruction: u32,
    /// Alternate value for default-form transfers (`None` skips the phase)
    pub alt_value: Option<u32>,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            format: QspiFormat::default(),
            frequency: DEFAULT_FREQUENCY_HZ,
            read_instruction: opcodes::DEFAULT_READ as u32,
            write_instruction: opcodes::DEFAULT_WRITE as u32,
            alt_value: None,
        }
    }
}

/// Which handle's configuration is live on the controller
///
/// Shared by every handle of a bus and only touched with the bus lock held.
pub(crate) struct BusState {
    owner: Option<HandleId>,
    next_id: u32,
    open: usize,
}

impl BusState {
    pub(crate) const fn new() -> Self {
        Self {
            owner: None,
            next_id: 0,
            open: 0,
        }
    }

    pub(crate) fn owner(&self) -> Option<HandleId> {
        self.owner
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open
    }

    pub(crate) fn register(&mut self) -> HandleId {
        let id = HandleId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.open += 1;
        id
    }

    /// Forget a handle, clearing the owner if it was this one
    pub(crate) fn unregister(&mut self, id: HandleId) {
        self.open = self.open.saturating_sub(1);
        if self.owner == Some(id) {
            self.owner = None;
        }
    }

    /// Forget the owner so the next transaction from any handle reprograms
    pub(crate) fn disown(&mut self) {
        self.owner = None;
    }

    /// Make `id` the owner, reprogramming the clock if ownership changes
    ///
    /// Caller holds the bus lock. A failed reprogram leaves the owner as is.
    pub(crate) fn claim<C: QspiChannel>(&mut self, id: HandleId, slot: &mut Slot<C>) -> Result<()> {
        if self.owner == Some(id) {
            return Ok(());
        }

        slot.channel
            .set_frequency(slot.config.frequency)
            .map_err(driver_error)?;
        log::debug!(
            "qspi: handle {} owns bus ({} Hz, previous owner {:?})",
            id,
            slot.config.frequency,
            self.owner
        );
        self.owner = Some(id);
        Ok(())
    }

    /// Store a new clock and apply it right away
    ///
    /// The owner reprograms in place. Any other handle claims the bus, so the
    /// new rate is live before this returns. If the driver refuses the rate
    /// the stored clock and the owner stay as they were.
    pub(crate) fn set_frequency<C: QspiChannel>(
        &mut self,
        id: HandleId,
        slot: &mut Slot<C>,
        hz: u32,
    ) -> Result<()> {
        if self.owner == Some(id) {
            log::trace!("qspi: handle {} retunes bus to {} Hz", id, hz);
            slot.channel.set_frequency(hz).map_err(driver_error)?;
            slot.config.frequency = hz;
            return Ok(());
        }

        let previous = core::mem::replace(&mut slot.config.frequency, hz);
        let result = self.claim(id, slot);
        if result.is_err() {
            slot.config.frequency = previous;
        }
        result
    }
}

/// Per-handle configuration plus the driver channel
pub(crate) struct Slot<C> {
    pub(crate) config: HandleConfig,
    channel: C,
}

impl<C: QspiChannel> Slot<C> {
    pub(crate) fn new(channel: C) -> Self {
        Self {
            config: HandleConfig::default(),
            channel,
        }
    }

    fn command(&self, instruction: u32, address: Option<u32>, alt: Option<u32>) -> QspiCommand {
        QspiCommand::build(&self.config.format, instruction, address, alt)
    }

    pub(crate) fn read(
        &mut self,
        instruction: u32,
        address: Option<u32>,
        alt: Option<u32>,
        buf: &mut [u8],
    ) -> Result<usize> {
        let cmd = self.command(instruction, address, alt);
        self.channel.read(&cmd, buf).map_err(driver_error)
    }

    pub(crate) fn write(
        &mut self,
        instruction: u32,
        address: Option<u32>,
        alt: Option<u32>,
        data: &[u8],
    ) -> Result<usize> {
        let cmd = self.command(instruction, address, alt);
        self.channel.write(&cmd, data).map_err(driver_error)
    }

    pub(crate) fn perform_command(&mut self, instruction: u32, alt: Option<u32>) -> Result<()> {
        let cmd = self.command(instruction, None, alt);
        self.channel.write_command(&cmd).map_err(driver_error)
    }
}

/// Drivers only get to say yes or no at this layer
fn driver_error(e: Error) -> Error {
    log::debug!("qspi: driver reported: {}", e);
    Error::TransferFailed
}
