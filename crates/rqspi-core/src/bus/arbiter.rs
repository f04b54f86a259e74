//! The shared bus

use lock_api::{Mutex, MutexGuard, RawMutex};

use super::handle::Qspi;
use super::state::{BusState, HandleId, Slot};
use crate::error::{Error, Result};
use crate::hal::QspiHal;
use crate::qspi::{BusWidth, DEFAULT_FREQUENCY_HZ};

/// Lock used when none is named: a spinning mutex that works without an OS
pub type DefaultRawMutex = spin::Mutex<()>;

/// One physical QSPI controller shared by several handles
///
/// The lock strategy is picked with `R`; any `lock_api::RawMutex` works
/// (spin locks for bare metal, ticket locks for fairness, OS-backed locks
/// on hosted targets).
pub struct QspiBus<H: QspiHal, R: RawMutex = DefaultRawMutex> {
    hal: H,
    state: Mutex<R, BusState>,
}

impl<H: QspiHal, R: RawMutex> QspiBus<H, R> {
    /// Create a bus around a peripheral with no owner yet
    pub const fn new(hal: H) -> Self {
        Self {
            hal,
            state: Mutex::const_new(R::INIT, BusState::new()),
        }
    }

    /// Get the underlying peripheral
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Open a handle bound to `pins`
    ///
    /// The channel comes up at 1 MHz in quad mode with the default format,
    /// and the new handle immediately becomes the bus owner.
    pub fn open(&self, pins: H::Pins) -> Result<Qspi<'_, H, R>> {
        let mut state = self.lock();

        // Init programs the shared clock, so nobody's rate is live anymore
        state.disown();
        let channel = self
            .hal
            .init(pins, DEFAULT_FREQUENCY_HZ, BusWidth::Quad)
            .map_err(|e| {
                log::debug!("qspi: channel init failed: {}", e);
                Error::InitFailed
            })?;
        let mut slot = Slot::new(channel);

        let id = state.register();
        if let Err(e) = state.claim(id, &mut slot) {
            state.unregister(id);
            return Err(e);
        }
        log::debug!("qspi: opened handle {} ({} open)", id, state.open_count());

        Ok(Qspi::new(self, id, slot))
    }

    /// The handle whose configuration is currently programmed, if any
    pub fn owner(&self) -> Option<HandleId> {
        self.lock().owner()
    }

    /// Number of handles currently open on this bus
    pub fn handle_count(&self) -> usize {
        self.lock().open_count()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, R, BusState> {
        self.state.lock()
    }
}
