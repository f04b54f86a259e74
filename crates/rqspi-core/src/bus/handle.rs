//! Logical device handles

use core::mem::ManuallyDrop;

use lock_api::{Mutex, RawMutex};

use super::arbiter::{DefaultRawMutex, QspiBus};
use super::state::{BusState, HandleConfig, HandleId, Slot};
use crate::error::{Error, Result};
use crate::hal::QspiHal;
use crate::qspi::QspiFormat;

/// A logical device on a shared QSPI bus
///
/// Obtained from [`QspiBus::open`]. All methods take `&self`, so a handle can
/// be shared between threads; every call is serialized against every other
/// handle on the same bus.
///
/// Read and write return the number of bytes the driver actually moved.
/// Driver failures of any kind come back as [`Error::TransferFailed`].
pub struct Qspi<'bus, H: QspiHal, R: RawMutex = DefaultRawMutex> {
    bus: &'bus QspiBus<H, R>,
    id: HandleId,
    // Only written with the bus lock held; dropped under it too
    slot: ManuallyDrop<Mutex<R, Slot<H::Channel>>>,
}

impl<'bus, H: QspiHal, R: RawMutex> Qspi<'bus, H, R> {
    pub(crate) fn new(bus: &'bus QspiBus<H, R>, id: HandleId, slot: Slot<H::Channel>) -> Self {
        Self {
            bus,
            id,
            slot: ManuallyDrop::new(Mutex::new(slot)),
        }
    }

    /// Identifier of this handle on its bus
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The bus this handle was opened on
    pub fn bus(&self) -> &'bus QspiBus<H, R> {
        self.bus
    }

    /// Returns true if this handle's configuration is live on the controller
    pub fn is_owner(&self) -> bool {
        self.bus.owner() == Some(self.id)
    }

    /// Snapshot of the stored configuration
    pub fn config(&self) -> HandleConfig {
        self.slot.lock().config
    }

    /// Currently stored format
    pub fn format(&self) -> QspiFormat {
        self.config().format
    }

    /// Currently stored bus clock in Hz
    pub fn frequency(&self) -> u32 {
        self.config().frequency
    }

    /// Replace every phase width and size in one step
    ///
    /// An invalid format is rejected before anything changes. The new format
    /// is used from the next transaction on; the controller is not touched
    /// here.
    pub fn configure_format(&self, format: QspiFormat) -> Result<()> {
        format.validate()?;
        self.locked(|_, slot| {
            slot.config.format = format;
            Ok(())
        })
    }

    /// Change the bus clock
    ///
    /// If this handle owns the bus the controller is retuned in place.
    /// Otherwise the handle claims the bus, so the new clock is never left
    /// waiting behind another handle's traffic.
    pub fn set_frequency(&self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(Error::InvalidFrequency);
        }
        self.locked(|state, slot| state.set_frequency(self.id, slot, hz))
    }

    /// Set the instruction used by [`read`](Self::read)
    pub fn set_read_instruction(&self, instruction: u32) {
        let _bus = self.bus.lock();
        self.slot.lock().config.read_instruction = instruction;
    }

    /// Set the instruction used by [`write`](Self::write)
    pub fn set_write_instruction(&self, instruction: u32) {
        let _bus = self.bus.lock();
        self.slot.lock().config.write_instruction = instruction;
    }

    /// Set the alternate value used by [`read`](Self::read) and [`write`](Self::write)
    pub fn set_alt_value(&self, alt: Option<u32>) {
        let _bus = self.bus.lock();
        self.slot.lock().config.alt_value = alt;
    }

    /// Make this handle the bus owner without running a transaction
    pub fn acquire(&self) -> Result<()> {
        self.locked(|state, slot| state.claim(self.id, slot))
    }

    /// Read using the stored read instruction and alternate value
    pub fn read(&self, address: u32, buf: &mut [u8]) -> Result<usize> {
        self.transaction(|slot| {
            let cfg = slot.config;
            slot.read(cfg.read_instruction, Some(address), cfg.alt_value, buf)
        })
    }

    /// Write using the stored write instruction and alternate value
    pub fn write(&self, address: u32, data: &[u8]) -> Result<usize> {
        self.transaction(|slot| {
            let cfg = slot.config;
            slot.write(cfg.write_instruction, Some(address), cfg.alt_value, data)
        })
    }

    /// Read with an explicit instruction; `None` skips the address or alternate phase
    pub fn read_with(
        &self,
        instruction: u32,
        address: Option<u32>,
        alt: Option<u32>,
        buf: &mut [u8],
    ) -> Result<usize> {
        self.transaction(|slot| slot.read(instruction, address, alt, buf))
    }

    /// Write with an explicit instruction; `None` skips the address or alternate phase
    pub fn write_with(
        &self,
        instruction: u32,
        address: Option<u32>,
        alt: Option<u32>,
        data: &[u8],
    ) -> Result<usize> {
        self.transaction(|slot| slot.write(instruction, address, alt, data))
    }

    /// Send an instruction (and optional alternate value) with no address or data
    pub fn perform_command(&self, instruction: u32, alt: Option<u32>) -> Result<()> {
        self.transaction(|slot| slot.perform_command(instruction, alt))
    }

    /// Run `f` with the bus lock and this handle's state held
    fn locked<T>(
        &self,
        f: impl FnOnce(&mut BusState, &mut Slot<H::Channel>) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.bus.lock();
        let mut slot = self.slot.lock();
        f(&mut state, &mut slot)
    }

    /// Claim the bus, then run `f` before the lock is dropped
    fn transaction<T>(&self, f: impl FnOnce(&mut Slot<H::Channel>) -> Result<T>) -> Result<T> {
        self.locked(|state, slot| {
            state.claim(self.id, slot)?;
            f(slot)
        })
    }
}

impl<H: QspiHal, R: RawMutex> Drop for Qspi<'_, H, R> {
    fn drop(&mut self) {
        let mut state = self.bus.lock();
        state.unregister(self.id);
        // SAFETY: `slot` is not used again after this point
        unsafe { ManuallyDrop::drop(&mut self.slot) };
        log::debug!("qspi: closed handle {} ({} open)", self.id, state.open_count());
    }
}
