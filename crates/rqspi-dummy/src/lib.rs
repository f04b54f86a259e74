//! rqspi-dummy - In-memory QSPI flash emulator for testing
//!
//! This crate provides a dummy QSPI peripheral backed by an emulated NOR
//! flash chip. Every channel opened on it shares one emulated controller
//! clock, so the emulator can tell when a transfer runs at a clock that
//! some other channel programmed. Those transfers are counted as
//! "foreign" in [`DummyStats`]; a correct bus arbiter never produces one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rqspi_core::error::{Error, Result};
use rqspi_core::hal::{check_command_supported, QspiChannel, QspiFeatures, QspiHal};
use rqspi_core::qspi::{opcodes, BusWidth, QspiCommand};

/// Configuration for the dummy flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC manufacturer ID
    pub manufacturer_id: u8,
    /// JEDEC device ID
    pub device_id: u16,
    /// Flash size in bytes
    pub size: usize,
    /// Page size for programming
    pub page_size: usize,
    /// Sector size for the smallest erase
    pub sector_size: usize,
    /// Widths the emulated controller can drive
    pub features: QspiFeatures,
    /// Keep a record of every transfer (see [`DummyQspi::take_log`])
    pub record: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            manufacturer_id: 0xEF, // Winbond
            device_id: 0x4019,     // W25Q256JV
            size: 32 * 1024 * 1024,
            page_size: 256,
            sector_size: 4096,
            features: QspiFeatures::ALL,
            record: false,
        }
    }
}

impl DummyConfig {
    /// Set the flash size in bytes
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the supported bus widths
    pub fn with_features(mut self, features: QspiFeatures) -> Self {
        self.features = features;
        self
    }

    /// Enable or disable the transfer log
    pub fn with_recording(mut self, record: bool) -> Self {
        self.record = record;
        self
    }
}

/// Counters kept by the emulated controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Clock reprograms, including the one done by channel init
    pub reprograms: u64,
    /// Transfers that reached the flash
    pub transfers: u64,
    /// Transfers that ran at a clock programmed by another channel
    pub foreign_transfers: u64,
    /// Channels opened
    pub opened: u64,
    /// Channels released
    pub released: u64,
}

/// What kind of transfer a log entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Data-in transfer
    Read,
    /// Data-out transfer
    Write,
    /// Command with no data phase
    Command,
}

/// One logged transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRecord {
    /// Chip select the channel was opened with
    pub cs: u8,
    /// Controller clock at the moment of the transfer
    pub hz: u32,
    /// Descriptor handed to the controller
    pub cmd: QspiCommand,
    /// Transfer direction
    pub kind: TransferKind,
}

/// Emulated controller plus flash contents, shared by all channels
struct Controller {
    config: DummyConfig,
    data: Vec<u8>,
    status_reg1: u8,
    qpi: bool,
    /// Clock currently programmed and the channel that programmed it
    hz: u32,
    programmed_by: Option<u64>,
    next_channel: u64,
    stats: DummyStats,
    log: Vec<TransferRecord>,
    fail_next: bool,
}

impl Controller {
    fn program_clock(&mut self, channel: u64, hz: u32) {
        self.hz = hz;
        self.programmed_by = Some(channel);
        self.stats.reprograms += 1;
    }

    /// Account for a transfer and decide whether it may proceed
    fn begin(&mut self, channel: &DummyChannel, cmd: &QspiCommand, kind: TransferKind) -> Result<()> {
        if std::mem::take(&mut self.fail_next) {
            log::debug!("dummy: injected failure on cs{}", channel.cs);
            return Err(Error::TransferFailed);
        }
        check_command_supported(cmd, self.config.features)?;

        self.stats.transfers += 1;
        if self.programmed_by != Some(channel.id) || self.hz != channel.hz {
            log::warn!(
                "dummy: cs{} transfer at {} Hz, expected {} Hz",
                channel.cs,
                self.hz,
                channel.hz
            );
            self.stats.foreign_transfers += 1;
        }
        if self.config.record {
            self.log.push(TransferRecord {
                cs: channel.cs,
                hz: self.hz,
                cmd: *cmd,
                kind,
            });
        }
        Ok(())
    }

    fn address(&self, cmd: &QspiCommand) -> Result<usize> {
        if !cmd.has_address() {
            return Err(Error::OpcodeNotSupported);
        }
        let addr = cmd.address.value as usize;
        if addr >= self.data.len() {
            return Err(Error::AddressOutOfBounds);
        }
        Ok(addr)
    }

    fn handle_read(&mut self, cmd: &QspiCommand, buf: &mut [u8]) -> Result<usize> {
        match cmd.instruction.value as u8 {
            opcodes::RDID => {
                let id = [
                    self.config.manufacturer_id,
                    (self.config.device_id >> 8) as u8,
                    self.config.device_id as u8,
                ];
                let len = buf.len().min(id.len());
                buf[..len].copy_from_slice(&id[..len]);
                Ok(len)
            }
            opcodes::RDSR => {
                let len = buf.len().min(1);
                buf[..len].fill(self.status_reg1);
                Ok(len)
            }
            opcodes::READ_4B | opcodes::FAST_READ_4B | opcodes::QOR_4B | opcodes::QIOR_4B => {
                let addr = self.address(cmd)?;
                // Reads stop at the end of the array
                let len = buf.len().min(self.data.len() - addr);
                buf[..len].copy_from_slice(&self.data[addr..addr + len]);
                Ok(len)
            }
            _ => Err(Error::OpcodeNotSupported),
        }
    }

    fn handle_write(&mut self, cmd: &QspiCommand, data: &[u8]) -> Result<usize> {
        match cmd.instruction.value as u8 {
            opcodes::PP_4B | opcodes::QPP_4B => {
                if self.status_reg1 & opcodes::SR1_WEL == 0 {
                    return Err(Error::TransferFailed);
                }
                let addr = self.address(cmd)?;
                // Programming stops at the page boundary
                let page_end = (addr / self.config.page_size + 1) * self.config.page_size;
                let len = data.len().min(page_end.min(self.data.len()) - addr);

                // Flash programming: can only change 1 -> 0
                for (dst, &src) in self.data[addr..addr + len].iter_mut().zip(data) {
                    *dst &= src;
                }
                self.status_reg1 &= !opcodes::SR1_WEL;
                Ok(len)
            }
            // Erase carries an address but no data
            opcodes::SE_4B => {
                let addr = self.address(cmd)?;
                self.erase(addr & !(self.config.sector_size - 1), self.config.sector_size)?;
                Ok(0)
            }
            _ => Err(Error::OpcodeNotSupported),
        }
    }

    fn handle_command(&mut self, cmd: &QspiCommand) -> Result<()> {
        match cmd.instruction.value as u8 {
            opcodes::WREN => self.status_reg1 |= opcodes::SR1_WEL,
            opcodes::WRDI => self.status_reg1 &= !opcodes::SR1_WEL,
            opcodes::CE_60 | opcodes::CE_C7 => self.erase(0, self.data.len())?,
            opcodes::EQIO => self.qpi = true,
            opcodes::RSTQIO => self.qpi = false,
            opcodes::RSTEN => {}
            opcodes::RST => {
                self.status_reg1 = 0;
                self.qpi = false;
            }
            _ => return Err(Error::OpcodeNotSupported),
        }
        Ok(())
    }

    fn erase(&mut self, addr: usize, len: usize) -> Result<()> {
        if self.status_reg1 & opcodes::SR1_WEL == 0 {
            return Err(Error::TransferFailed);
        }
        let end = (addr + len).min(self.data.len());
        self.data[addr..end].fill(0xFF);
        self.status_reg1 &= !opcodes::SR1_WEL;
        Ok(())
    }
}

/// Dummy QSPI peripheral
///
/// Cloning is cheap and yields another view of the same emulated chip.
#[derive(Clone)]
pub struct DummyQspi {
    inner: Arc<Mutex<Controller>>,
}

impl DummyQspi {
    /// Create a dummy flash with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            inner: Arc::new(Mutex::new(Controller {
                config,
                data,
                status_reg1: 0,
                qpi: false,
                hz: 0,
                programmed_by: None,
                next_channel: 0,
                stats: DummyStats::default(),
                log: Vec::new(),
                fail_next: false,
            })),
        }
    }

    /// Create a dummy flash with default configuration (W25Q256JV)
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let flash = Self::new(config);
        {
            let mut ctrl = flash.controller();
            let len = initial_data.len().min(ctrl.data.len());
            ctrl.data[..len].copy_from_slice(&initial_data[..len]);
        }
        flash
    }

    fn controller(&self) -> MutexGuard<'_, Controller> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the flash contents
    pub fn data(&self) -> Vec<u8> {
        self.controller().data.clone()
    }

    /// Flash size in bytes
    pub fn size(&self) -> usize {
        self.controller().data.len()
    }

    /// Clock currently programmed into the emulated controller
    pub fn frequency(&self) -> u32 {
        self.controller().hz
    }

    /// Returns true if the emulated chip is in QPI mode
    pub fn in_qpi_mode(&self) -> bool {
        self.controller().qpi
    }

    /// Snapshot of the controller counters
    pub fn stats(&self) -> DummyStats {
        self.controller().stats
    }

    /// Drain the transfer log (empty unless recording is enabled)
    pub fn take_log(&self) -> Vec<TransferRecord> {
        std::mem::take(&mut self.controller().log)
    }

    /// Make the next transfer fail, whichever channel issues it
    pub fn fail_next_transfer(&self) {
        self.controller().fail_next = true;
    }
}

impl QspiHal for DummyQspi {
    /// Chip select number, only used to tag log entries
    type Pins = u8;
    type Channel = DummyChannel;

    fn init(&self, cs: u8, hz: u32, width: BusWidth) -> Result<DummyChannel> {
        let mut ctrl = self.controller();
        let id = ctrl.next_channel;
        ctrl.next_channel += 1;
        ctrl.program_clock(id, hz);
        ctrl.stats.opened += 1;
        log::debug!("dummy: cs{} opened as channel {} ({} Hz, {:?})", cs, id, hz, width);

        Ok(DummyChannel {
            id,
            cs,
            hz,
            flash: self.clone(),
        })
    }
}

/// One handle's view of the dummy controller
pub struct DummyChannel {
    id: u64,
    cs: u8,
    /// Clock this channel last programmed
    hz: u32,
    flash: DummyQspi,
}

impl QspiChannel for DummyChannel {
    fn features(&self) -> QspiFeatures {
        self.flash.controller().config.features
    }

    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        self.flash.controller().program_clock(self.id, hz);
        self.hz = hz;
        log::trace!("dummy: cs{} set clock to {} Hz", self.cs, hz);
        Ok(())
    }

    fn read(&mut self, cmd: &QspiCommand, buf: &mut [u8]) -> Result<usize> {
        let mut ctrl = self.flash.controller();
        ctrl.begin(self, cmd, TransferKind::Read)?;
        ctrl.handle_read(cmd, buf)
    }

    fn write(&mut self, cmd: &QspiCommand, data: &[u8]) -> Result<usize> {
        let mut ctrl = self.flash.controller();
        ctrl.begin(self, cmd, TransferKind::Write)?;
        ctrl.handle_write(cmd, data)
    }

    fn write_command(&mut self, cmd: &QspiCommand) -> Result<()> {
        let mut ctrl = self.flash.controller();
        ctrl.begin(self, cmd, TransferKind::Command)?;
        ctrl.handle_command(cmd)
    }
}

impl Drop for DummyChannel {
    fn drop(&mut self) {
        self.flash.controller().stats.released += 1;
        log::debug!("dummy: cs{} released", self.cs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rqspi_core::bus::QspiBus;
    use rqspi_core::qspi::{PhaseSize, QspiFormat};

    fn small() -> DummyConfig {
        DummyConfig::default().with_size(64 * 1024)
    }

    #[test]
    fn test_read_jedec_id() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new_default());
        let flash = bus.open(0).unwrap();

        let mut id = [0u8; 3];
        let n = flash
            .read_with(opcodes::RDID as u32, None, None, &mut id)
            .unwrap();
        assert_eq!(n, 3);
        assert_eq!(id, [0xEF, 0x40, 0x19]);
    }

    #[test]
    fn test_write_then_read_back() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new(small()));
        let flash = bus.open(0).unwrap();

        let data = [0x12, 0x34, 0x56, 0x78];
        flash.perform_command(opcodes::WREN as u32, None).unwrap();
        assert_eq!(flash.write(0x1000, &data), Ok(4));

        let mut buf = [0u8; 4];
        assert_eq!(flash.read(0x1000, &mut buf), Ok(4));
        assert_eq!(buf, data);
        assert_eq!(&bus.hal().data()[0x1000..0x1004], &data);
    }

    #[test]
    fn test_program_without_wren_fails() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new(small()));
        let flash = bus.open(0).unwrap();
        assert_eq!(flash.write(0, &[0u8; 4]), Err(Error::TransferFailed));
        assert!(bus.hal().data()[..4].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_lengths_report_actual_transfer() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new(small()));
        let flash = bus.open(0).unwrap();

        // Reads stop at the end of the chip
        let mut buf = [0u8; 32];
        assert_eq!(flash.read(64 * 1024 - 8, &mut buf), Ok(8));

        // Programs stop at the page boundary
        flash.perform_command(opcodes::WREN as u32, None).unwrap();
        assert_eq!(flash.write(250, &[0u8; 16]), Ok(6));
    }

    #[test]
    fn test_sector_erase() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::with_data(small(), &[0u8; 8192]));
        let flash = bus.open(0).unwrap();

        // Without WREN the erase is refused
        assert_eq!(
            flash.write_with(opcodes::SE_4B as u32, Some(0x1010), None, &[]),
            Err(Error::TransferFailed)
        );

        flash.perform_command(opcodes::WREN as u32, None).unwrap();
        assert_eq!(
            flash.write_with(opcodes::SE_4B as u32, Some(0x1010), None, &[]),
            Ok(0)
        );

        let data = bus.hal().data();
        assert!(data[..0x1000].iter().all(|&b| b == 0));
        assert!(data[0x1000..0x2000].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_chip_erase_and_qpi_toggle() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::with_data(small(), &[0u8; 512]));
        let flash = bus.open(0).unwrap();

        flash.perform_command(opcodes::EQIO as u32, None).unwrap();
        assert!(bus.hal().in_qpi_mode());

        flash.perform_command(opcodes::WREN as u32, None).unwrap();
        flash.perform_command(opcodes::CE_C7 as u32, None).unwrap();
        assert!(bus.hal().data().iter().all(|&b| b == 0xFF));

        flash.perform_command(opcodes::RSTQIO as u32, None).unwrap();
        assert!(!bus.hal().in_qpi_mode());
    }

    #[test]
    fn test_unsupported_width_is_a_transfer_failure() {
        let config = small().with_features(QspiFeatures::DUAL);
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new(config));
        let flash = bus.open(0).unwrap();

        // Default framing is quad everywhere
        let mut buf = [0u8; 4];
        assert_eq!(flash.read(0, &mut buf), Err(Error::TransferFailed));

        let dual = QspiFormat::default()
            .with_instruction(BusWidth::Single, PhaseSize::Bits8)
            .with_address(BusWidth::Dual, PhaseSize::Bits32)
            .with_data_width(BusWidth::Dual);
        flash.configure_format(dual).unwrap();
        assert_eq!(flash.read(0, &mut buf), Ok(4));
    }

    #[test]
    fn test_two_handles_switch_clock_once_per_switch() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new(small()));
        let slow = bus.open(0).unwrap();
        let fast = bus.open(1).unwrap();
        slow.set_frequency(5_000_000).unwrap();
        fast.set_frequency(80_000_000).unwrap();

        let mut buf = [0u8; 4];
        slow.read(0, &mut buf).unwrap();
        let base = bus.hal().stats().reprograms;

        fast.read(0, &mut buf).unwrap();
        assert_eq!(bus.hal().stats().reprograms, base + 1);
        assert_eq!(bus.hal().frequency(), 80_000_000);

        fast.read(4, &mut buf).unwrap();
        assert_eq!(bus.hal().stats().reprograms, base + 1);

        slow.read(0, &mut buf).unwrap();
        assert_eq!(bus.hal().stats().reprograms, base + 2);
        assert_eq!(bus.hal().frequency(), 5_000_000);
        assert_eq!(bus.hal().stats().foreign_transfers, 0);
    }

    #[test]
    fn test_injected_failure_keeps_owner() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new(small()));
        let a = bus.open(0).unwrap();
        let _b = bus.open(1).unwrap();
        a.acquire().unwrap();

        bus.hal().fail_next_transfer();
        let mut buf = [0u8; 4];
        assert_eq!(a.read(0, &mut buf), Err(Error::TransferFailed));
        assert_eq!(bus.owner(), Some(a.id()));
        assert_eq!(a.read(0, &mut buf), Ok(4));
    }

    #[test]
    fn test_drop_releases_channel() {
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new(small()));
        let a = bus.open(0).unwrap();
        drop(bus.open(1).unwrap());

        let stats = bus.hal().stats();
        assert_eq!(stats.opened, 2);
        assert_eq!(stats.released, 1);
        assert_eq!(bus.owner(), None);
        drop(a);
        assert_eq!(bus.hal().stats().released, 2);
    }

    #[test]
    fn test_stress_never_runs_under_foreign_clock() {
        let config = small().with_recording(true);
        let bus: QspiBus<DummyQspi> = QspiBus::new(DummyQspi::new(config));
        let handles: Vec<_> = (0..4u8).map(|cs| bus.open(cs).unwrap()).collect();
        for (i, h) in handles.iter().enumerate() {
            h.set_frequency(1_000_000 * (i as u32 + 1)).unwrap();
            let dummy = if i % 2 == 0 { 0 } else { 8 };
            h.configure_format(QspiFormat::default().with_dummy_cycles(dummy))
                .unwrap();
        }
        bus.hal().take_log();

        std::thread::scope(|s| {
            for t in 0..8 {
                let h = &handles[t % handles.len()];
                s.spawn(move || {
                    let mut buf = [0u8; 64];
                    for i in 0..250u32 {
                        h.read(i * 64, &mut buf).unwrap();
                    }
                });
            }
        });

        assert_eq!(bus.hal().stats().foreign_transfers, 0);
        let log = bus.hal().take_log();
        assert_eq!(log.len(), 8 * 250);
        for record in log {
            assert_eq!(record.hz, 1_000_000 * (record.cs as u32 + 1));
            let dummy = if record.cs % 2 == 0 { 0 } else { 8 };
            assert_eq!(record.cmd.dummy_cycles, dummy);
        }
    }
}
