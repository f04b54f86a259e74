//! Linux QSPI channel implementation
//!
//! This module provides `LinuxQspi`, a `QspiHal` that opens one spidev
//! file descriptor per handle, and `LinuxQspiChannel`, which turns QSPI
//! command descriptors into multi-segment `SPI_IOC_MESSAGE` transfers.

use crate::error::{LinuxSpiError, Result};

use rqspi_core::error::{Error as CoreError, Result as CoreResult};
use rqspi_core::hal::{check_command_supported, QspiChannel, QspiFeatures, QspiHal};
use rqspi_core::qspi::{BusWidth, QspiCommand};

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Path to kernel spidev buffer size parameter
const BUF_SIZE_SYSFS: &str = "/sys/module/spidev/parameters/bufsiz";

/// SPI mode constants
pub mod mode {
    /// SPI mode 0: CPOL=0, CPHA=0
    pub const MODE_0: u8 = 0;
    /// SPI mode 1: CPOL=0, CPHA=1
    pub const MODE_1: u8 = 1;
    /// SPI mode 2: CPOL=1, CPHA=0
    pub const MODE_2: u8 = 2;
    /// SPI mode 3: CPOL=1, CPHA=1
    pub const MODE_3: u8 = 3;

    /// Transmit on two wires
    pub const TX_DUAL: u32 = 0x100;
    /// Transmit on four wires
    pub const TX_QUAD: u32 = 0x200;
    /// Receive on two wires
    pub const RX_DUAL: u32 = 0x400;
    /// Receive on four wires
    pub const RX_QUAD: u32 = 0x800;
}

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    const SPI_IOC_MAGIC: u8 = b'k';

    // SPI ioctl type numbers
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;
    const SPI_IOC_TYPE_MODE32: u8 = 5;

    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );
    ioctl_write_ptr!(spi_ioc_wr_mode32, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE32, u32);

    /// Size of spi_ioc_transfer struct
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// Calculate ioctl number for SPI_IOC_MESSAGE(n)
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        // _IOW = _IOC(_IOC_WRITE, type, nr, size)
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,          // __u64 tx_buf
    rx_buf: u64,          // __u64 rx_buf
    len: u32,             // __u32 len
    speed_hz: u32,        // __u32 speed_hz
    delay_usecs: u16,     // __u16 delay_usecs
    bits_per_word: u8,    // __u8 bits_per_word
    cs_change: u8,        // __u8 cs_change
    tx_nbits: u8,         // __u8 tx_nbits
    rx_nbits: u8,         // __u8 rx_nbits
    word_delay_usecs: u8, // __u8 word_delay_usecs
    _pad: u8,             // padding
}

impl SpiIocTransfer {
    fn tx(buf: &[u8], width: BusWidth, speed_hz: u32) -> Self {
        Self {
            tx_buf: buf.as_ptr() as u64,
            len: buf.len() as u32,
            speed_hz,
            bits_per_word: 8,
            tx_nbits: width.lines(),
            ..Default::default()
        }
    }

    fn rx(buf: &mut [u8], width: BusWidth, speed_hz: u32) -> Self {
        Self {
            rx_buf: buf.as_mut_ptr() as u64,
            len: buf.len() as u32,
            speed_hz,
            bits_per_word: 8,
            rx_nbits: width.lines(),
            ..Default::default()
        }
    }
}

/// Data phase of a transfer
enum DataPhase<'a> {
    None,
    In(&'a mut [u8]),
    Out(&'a [u8]),
}

/// Configuration shared by every channel of a `LinuxQspi`
#[derive(Debug, Clone)]
pub struct LinuxQspiConfig {
    /// Device a CLI-opened handle binds to (e.g., "/dev/spidev0.0")
    pub device: String,
    /// SPI mode (0-3, default: 0)
    pub mode: u8,
    /// Widest bus the controller may use (default: quad)
    pub max_width: BusWidth,
}

impl Default for LinuxQspiConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            mode: mode::MODE_0,
            max_width: BusWidth::Quad,
        }
    }
}

impl LinuxQspiConfig {
    /// Create a new configuration with the given device path
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Set the SPI mode (0-3)
    pub fn with_mode(mut self, mode: u8) -> Self {
        self.mode = mode;
        self
    }

    /// Set the widest bus the controller may use
    pub fn with_max_width(mut self, width: BusWidth) -> Self {
        self.max_width = width;
        self
    }
}

/// spidev-backed QSPI peripheral
///
/// Every handle opened on a bus gets its own file descriptor; the pin set
/// is the spidev path. Handles sharing a controller share its clock, which
/// is why they should share one `QspiBus`.
#[derive(Debug, Clone)]
pub struct LinuxQspi {
    config: LinuxQspiConfig,
}

impl LinuxQspi {
    /// Create a peripheral with the given configuration
    pub fn new(config: LinuxQspiConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &LinuxQspiConfig {
        &self.config
    }
}

impl QspiHal for LinuxQspi {
    type Pins = PathBuf;
    type Channel = LinuxQspiChannel;

    fn init(&self, pins: PathBuf, hz: u32, width: BusWidth) -> CoreResult<LinuxQspiChannel> {
        let lines = width.lines().min(self.config.max_width.lines());
        let width = BusWidth::from_lines(lines as i64).unwrap_or(BusWidth::Single);

        LinuxQspiChannel::open(&pins, self.config.mode, width, hz).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::InitFailed
        })
    }
}

/// One handle's spidev file descriptor
pub struct LinuxQspiChannel {
    /// File handle for spidev device
    file: File,
    /// Widths enabled in the device mode
    features: QspiFeatures,
    /// Maximum kernel buffer size
    max_kernel_buf_size: usize,
    /// Current speed in Hz
    speed_hz: u32,
}

impl LinuxQspiChannel {
    fn open(path: &Path, spi_mode: u8, width: BusWidth, speed_hz: u32) -> Result<Self> {
        log::debug!("linux_spi: Opening device {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| LinuxSpiError::OpenFailed {
                path: path.display().to_string(),
                source: e,
            })?;

        let fd = file.as_raw_fd();

        // Mode plus the multi-wire bits for the widest width we may use
        let (wide_bits, features) = match width {
            BusWidth::Single => (0, QspiFeatures::empty()),
            BusWidth::Dual => (mode::TX_DUAL | mode::RX_DUAL, QspiFeatures::DUAL),
            BusWidth::Quad => (mode::TX_QUAD | mode::RX_QUAD, QspiFeatures::ALL),
        };
        let mode32 = spi_mode as u32 | wide_bits;
        unsafe {
            ioctl::spi_ioc_wr_mode32(fd, &mode32).map_err(|e| LinuxSpiError::SetModeFailed {
                mode: mode32,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        // Set bits per word (always 8)
        let bits: u8 = 8;
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
                LinuxSpiError::SetBitsPerWordFailed {
                    bits,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        let max_kernel_buf_size = get_max_kernel_buf_size();
        let mut channel = Self {
            file,
            features,
            max_kernel_buf_size,
            speed_hz,
        };
        channel.set_speed(speed_hz)?;

        log::info!(
            "linux_spi: Opened {} (mode={:#x}, speed={} kHz)",
            path.display(),
            mode32,
            speed_hz / 1000
        );

        Ok(channel)
    }

    /// Get current speed setting
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Set a new SPI clock speed
    pub fn set_speed(&mut self, speed_hz: u32) -> Result<()> {
        let fd = self.file.as_raw_fd();
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed_hz).map_err(|e| {
                LinuxSpiError::SetSpeedFailed {
                    speed: speed_hz,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }
        self.speed_hz = speed_hz;
        log::debug!("linux_spi: Set speed to {} Hz", speed_hz);
        Ok(())
    }

    /// Run one command as a single chip-select assertion
    ///
    /// Returns the number of data bytes moved, which is less than asked for
    /// when the data phase exceeds the kernel buffer.
    fn transfer(&mut self, cmd: &QspiCommand, data: DataPhase<'_>) -> Result<usize> {
        let mut header = vec![0u8; cmd.header_len() + cmd.dummy_bytes()];
        let limit = self.max_kernel_buf_size;
        let (transfers, moved) =
            build_transfers(cmd, &mut header, data, limit, self.speed_hz);

        // The kernel wants at least one segment
        if transfers.is_empty() {
            return Err(LinuxSpiError::InvalidParameter(
                "Command has no phases".into(),
            ));
        }

        let ioctl_num = ioctl::spi_ioc_message(transfers.len() as u8);
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), ioctl_num, transfers.as_ptr()) };

        if ret < 0 {
            return Err(LinuxSpiError::TransferFailed(
                std::io::Error::last_os_error(),
            ));
        }

        Ok(moved)
    }
}

/// Lay out the segments of one command
///
/// `header` must be `header_len() + dummy_bytes()` long and outlive the
/// returned segments, which point into it and into the data buffer.
fn build_transfers(
    cmd: &QspiCommand,
    header: &mut [u8],
    data: DataPhase<'_>,
    limit: usize,
    speed_hz: u32,
) -> (Vec<SpiIocTransfer>, usize) {
    let mut transfers = Vec::with_capacity(5);
    let mut offset = 0;

    for phase in [&cmd.instruction, &cmd.address, &cmd.alt] {
        if !phase.is_present() {
            continue;
        }
        let len = phase.size.encode(phase.value, &mut header[offset..]);
        transfers.push(SpiIocTransfer::tx(
            &header[offset..offset + len],
            phase.width,
            speed_hz,
        ));
        offset += len;
    }

    let dummy = cmd.dummy_bytes();
    if dummy > 0 {
        let bytes = &mut header[offset..offset + dummy];
        bytes.fill(0xFF);
        transfers.push(SpiIocTransfer::tx(bytes, cmd.address.width, speed_hz));
    }

    let moved = match data {
        DataPhase::None => 0,
        DataPhase::In(buf) => {
            let len = buf.len().min(limit);
            if len > 0 {
                transfers.push(SpiIocTransfer::rx(&mut buf[..len], cmd.data_width, speed_hz));
            }
            len
        }
        DataPhase::Out(buf) => {
            let len = buf.len().min(limit);
            if len > 0 {
                transfers.push(SpiIocTransfer::tx(&buf[..len], cmd.data_width, speed_hz));
            }
            len
        }
    };

    (transfers, moved)
}

impl QspiChannel for LinuxQspiChannel {
    fn features(&self) -> QspiFeatures {
        self.features
    }

    fn set_frequency(&mut self, hz: u32) -> CoreResult<()> {
        self.set_speed(hz).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::TransferFailed
        })
    }

    fn read(&mut self, cmd: &QspiCommand, buf: &mut [u8]) -> CoreResult<usize> {
        check_command_supported(cmd, self.features)?;
        self.transfer(cmd, DataPhase::In(buf)).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::TransferFailed
        })
    }

    fn write(&mut self, cmd: &QspiCommand, data: &[u8]) -> CoreResult<usize> {
        check_command_supported(cmd, self.features)?;
        self.transfer(cmd, DataPhase::Out(data)).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::TransferFailed
        })
    }

    fn write_command(&mut self, cmd: &QspiCommand) -> CoreResult<()> {
        check_command_supported(cmd, self.features)?;
        self.transfer(cmd, DataPhase::None).map(|_| ()).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::TransferFailed
        })
    }
}

/// Read the maximum kernel buffer size from sysfs, or use page size as fallback
fn get_max_kernel_buf_size() -> usize {
    if let Ok(content) = std::fs::read_to_string(BUF_SIZE_SYSFS) {
        if let Ok(size) = content.trim().parse::<usize>() {
            if size > 0 {
                log::debug!("linux_spi: Using buffer size {} from sysfs", size);
                return size;
            }
        }
        log::warn!("linux_spi: Invalid buffer size in {}", BUF_SIZE_SYSFS);
    } else {
        log::debug!("linux_spi: Cannot read {}, using page size", BUF_SIZE_SYSFS);
    }

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    log::debug!("linux_spi: Using page size {} as buffer size", page_size);
    page_size
}

/// Parse driver options from a list of key-value pairs
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxQspiConfig, String> {
    let mut config = LinuxQspiConfig::default();

    for (key, value) in options {
        match *key {
            "dev" => {
                config.device = value.to_string();
            }
            "mode" => {
                let mode: u8 = value
                    .parse()
                    .map_err(|_| format!("Invalid mode value: {}", value))?;
                if mode > 3 {
                    return Err(format!("Invalid SPI mode: {} (must be 0-3)", mode));
                }
                config.mode = mode;
            }
            "io" => {
                let lines: i64 = value
                    .parse()
                    .map_err(|_| format!("Invalid io value: {}", value))?;
                config.max_width = BusWidth::from_lines(lines)
                    .ok_or_else(|| format!("Invalid io width: {} (must be 1, 2 or 4)", lines))?;
            }
            _ => {
                log::warn!("linux_spi: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.device.is_empty() {
        return Err("No device specified. Use dev=/dev/spidevX.Y".to_string());
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rqspi_core::qspi::{PhaseSize, QspiFormat};

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[("dev", "/dev/spidev1.0"), ("mode", "3"), ("io", "2")])
            .unwrap();
        assert_eq!(config.device, "/dev/spidev1.0");
        assert_eq!(config.mode, mode::MODE_3);
        assert_eq!(config.max_width, BusWidth::Dual);

        assert!(parse_options(&[("mode", "0")]).is_err());
        assert!(parse_options(&[("dev", "/dev/spidev0.0"), ("mode", "4")]).is_err());
        assert!(parse_options(&[("dev", "/dev/spidev0.0"), ("io", "3")]).is_err());
    }

    #[test]
    fn test_segments_follow_phase_widths() {
        let format = QspiFormat::default()
            .with_instruction(BusWidth::Single, PhaseSize::Bits8)
            .with_address(BusWidth::Quad, PhaseSize::Bits24)
            .with_alt(BusWidth::Quad, PhaseSize::Bits8)
            .with_data_width(BusWidth::Quad)
            .with_dummy_cycles(4);
        let cmd = QspiCommand::build(&format, 0xEB, Some(0x123456), Some(0xF0));

        let mut header = vec![0u8; cmd.header_len() + cmd.dummy_bytes()];
        let mut buf = [0u8; 16];
        let (transfers, moved) =
            build_transfers(&cmd, &mut header, DataPhase::In(&mut buf), 4096, 1_000_000);

        assert_eq!(moved, 16);
        let shape: Vec<_> = transfers
            .iter()
            .map(|t| (t.len, t.tx_nbits, t.rx_nbits))
            .collect();
        assert_eq!(shape, vec![(1, 1, 0), (3, 4, 0), (1, 4, 0), (2, 4, 0), (16, 0, 4)]);
        assert_eq!(header, vec![0xEB, 0x12, 0x34, 0x56, 0xF0, 0xFF, 0xFF]);
    }

    #[test]
    fn test_command_only_and_truncated_data() {
        let cmd = QspiCommand::build(&QspiFormat::default(), 0x06, None, None);
        let mut header = vec![0u8; cmd.header_len() + cmd.dummy_bytes()];
        let (transfers, moved) =
            build_transfers(&cmd, &mut header, DataPhase::None, 4096, 1_000_000);
        assert_eq!(transfers.len(), 1);
        assert_eq!(moved, 0);

        let cmd = QspiCommand::build(&QspiFormat::default(), 0x34, Some(0), None);
        let mut header = vec![0u8; cmd.header_len() + cmd.dummy_bytes()];
        let data = [0u8; 64];
        let (transfers, moved) =
            build_transfers(&cmd, &mut header, DataPhase::Out(&data), 32, 1_000_000);
        assert_eq!(moved, 32);
        assert_eq!(transfers.last().map(|t| t.len), Some(32));
    }
}
