//! Recording driver for arbiter tests

use core::cell::Cell;
use std::sync::{Arc, Mutex};
use std::vec::Vec;

use lock_api::{GuardSend, RawMutex};

use super::arbiter::DefaultRawMutex;

use crate::error::{Error, Result};
use crate::hal::{QspiChannel, QspiFeatures, QspiHal};
use crate::qspi::{BusWidth, QspiCommand};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Frequency { pin: u8, hz: u32 },
    Read { pin: u8, hz: u32, cmd: QspiCommand },
    Write { pin: u8, hz: u32, cmd: QspiCommand },
    Command { pin: u8, hz: u32, cmd: QspiCommand },
    /// `locked` is true if the releasing thread held a `TrackedMutex`
    Release { pin: u8, locked: bool },
}

#[derive(Default)]
struct Log {
    hz: u32,
    events: Vec<Event>,
    fail_init: bool,
    fail_frequency: bool,
    fail_transfer: bool,
}

#[derive(Clone, Default)]
pub(crate) struct MockHal {
    log: Arc<Mutex<Log>>,
}

impl MockHal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Log) -> T) -> T {
        f(&mut self.log.lock().unwrap())
    }

    pub(crate) fn clear(&self) {
        self.with(|log| log.events.clear());
    }

    pub(crate) fn frequency(&self) -> u32 {
        self.with(|log| log.hz)
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.with(|log| log.events.clone())
    }

    pub(crate) fn reprograms(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Frequency { hz, .. } => Some(hz),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn commands(&self) -> Vec<QspiCommand> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Read { cmd, .. } | Event::Write { cmd, .. } | Event::Command { cmd, .. } => {
                    Some(cmd)
                }
                _ => None,
            })
            .collect()
    }

    pub(crate) fn released(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Release { pin, .. } => Some(pin),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn fail_next_init(&self) {
        self.with(|log| log.fail_init = true);
    }

    pub(crate) fn fail_next_frequency(&self) {
        self.with(|log| log.fail_frequency = true);
    }

    pub(crate) fn fail_next_transfer(&self) {
        self.with(|log| log.fail_transfer = true);
    }
}

impl QspiHal for MockHal {
    type Pins = u8;
    type Channel = MockChannel;

    fn init(&self, pin: u8, hz: u32, _width: BusWidth) -> Result<MockChannel> {
        self.with(|log| {
            if core::mem::take(&mut log.fail_init) {
                return Err(Error::InitFailed);
            }
            log.hz = hz;
            log.events.push(Event::Frequency { pin, hz });
            Ok(())
        })?;
        Ok(MockChannel {
            pin,
            hal: self.clone(),
        })
    }
}

pub(crate) struct MockChannel {
    pin: u8,
    hal: MockHal,
}

impl MockChannel {
    fn transfer(&self, event: impl FnOnce(u8, u32) -> Event) -> Result<()> {
        self.hal.with(|log| {
            if core::mem::take(&mut log.fail_transfer) {
                return Err(Error::TransferFailed);
            }
            let e = event(self.pin, log.hz);
            log.events.push(e);
            Ok(())
        })
    }
}

impl QspiChannel for MockChannel {
    fn features(&self) -> QspiFeatures {
        QspiFeatures::ALL
    }

    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        let pin = self.pin;
        self.hal.with(|log| {
            if core::mem::take(&mut log.fail_frequency) {
                return Err(Error::TransferFailed);
            }
            log.hz = hz;
            log.events.push(Event::Frequency { pin, hz });
            Ok(())
        })
    }

    fn read(&mut self, cmd: &QspiCommand, buf: &mut [u8]) -> Result<usize> {
        let cmd = *cmd;
        self.transfer(|pin, hz| Event::Read { pin, hz, cmd })?;
        buf.fill(self.pin);
        Ok(buf.len())
    }

    fn write(&mut self, cmd: &QspiCommand, data: &[u8]) -> Result<usize> {
        let cmd = *cmd;
        self.transfer(|pin, hz| Event::Write { pin, hz, cmd })?;
        Ok(data.len())
    }

    fn write_command(&mut self, cmd: &QspiCommand) -> Result<()> {
        let cmd = *cmd;
        self.transfer(|pin, hz| Event::Command { pin, hz, cmd })
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        let pin = self.pin;
        let locked = LOCKS_HELD.with(|held| held.get() > 0);
        self.hal.with(|log| log.events.push(Event::Release { pin, locked }));
    }
}

std::thread_local! {
    static LOCKS_HELD: Cell<usize> = const { Cell::new(0) };
}

/// Spin lock that counts how many instances the current thread holds
pub(crate) struct TrackedMutex(DefaultRawMutex);

unsafe impl RawMutex for TrackedMutex {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self(<DefaultRawMutex as RawMutex>::INIT);
    type GuardMarker = GuardSend;

    fn lock(&self) {
        <DefaultRawMutex as RawMutex>::lock(&self.0);
        LOCKS_HELD.with(|held| held.set(held.get() + 1));
    }

    fn try_lock(&self) -> bool {
        let locked = <DefaultRawMutex as RawMutex>::try_lock(&self.0);
        if locked {
            LOCKS_HELD.with(|held| held.set(held.get() + 1));
        }
        locked
    }

    unsafe fn unlock(&self) {
        LOCKS_HELD.with(|held| held.set(held.get() - 1));
        <DefaultRawMutex as RawMutex>::unlock(&self.0);
    }
}
