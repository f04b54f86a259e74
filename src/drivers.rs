//! Driver registration and dispatch
//!
//! Driver strings look like `name[:key=value,...]`, for example
//! `dummy:size=16M` or `linux_spi:dev=/dev/spidev0.0,mode=0`. Every command
//! that talks to a device opens one handle on a fresh bus, applies the
//! handle flags to it and hands it to a [`HandleTask`].

use std::collections::HashMap;

use rqspi_core::bus::{Qspi, QspiBus};
use rqspi_core::hal::QspiHal;
use rqspi_core::qspi::QspiFormat;
use thiserror::Error;

use crate::cli::HandleArgs;

/// Errors raised while picking and configuring a driver
#[derive(Debug, Error)]
pub enum CliError {
    /// No driver with this name is compiled in
    #[error("Unknown driver: {0} (available: {names})", names = driver_names_short())]
    UnknownDriver(String),

    /// Option without `=`
    #[error("Invalid parameter format: '{0}' (expected key=value)")]
    ParameterFormat(String),

    /// Option value that does not parse
    #[error("Invalid {key} value: {value}")]
    InvalidParameter {
        /// Option name
        key: String,
        /// Value as given
        value: String,
    },

    /// Driver rejected its options
    #[error("{0}")]
    Driver(String),
}

/// Information about a driver
pub struct DriverInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available drivers (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_drivers() -> Vec<DriverInfo> {
    let mut drivers = Vec::new();

    #[cfg(feature = "dummy")]
    drivers.push(DriverInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory QSPI flash emulator (size=<bytes[K|M]>,cs=<n>,io=<1|2|4>)",
    });

    #[cfg(feature = "linux-spi")]
    drivers.push(DriverInfo {
        name: "linux_spi",
        aliases: &["linux-spi", "spidev"],
        description: "Linux spidev interface (dev=/dev/spidevX.Y,mode=<0-3>,io=<1|2|4>)",
    });

    drivers
}

/// Generate a short list of driver names for CLI help
pub fn driver_names_short() -> String {
    let drivers = available_drivers();
    let names: Vec<&str> = drivers.iter().map(|d| d.name).collect();
    names.join(", ")
}

/// A parsed driver string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverParams {
    /// Driver name
    pub name: String,
    /// Driver options
    pub params: HashMap<String, String>,
}

impl DriverParams {
    /// Options as borrowed pairs, the shape backend option parsers take
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse a driver string of the form `name[:key=value,...]`
pub fn parse_driver_params(s: &str) -> Result<DriverParams, CliError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));

    let mut params = HashMap::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            let (key, value) = opt
                .split_once('=')
                .ok_or_else(|| CliError::ParameterFormat(opt.to_string()))?;
            params.insert(key.to_string(), value.to_string());
        }
    }

    Ok(DriverParams {
        name: name.to_string(),
        params,
    })
}

/// Parse a byte count with an optional K or M suffix
pub fn parse_size(s: &str) -> Option<usize> {
    let (digits, scale) = match s.as_bytes().last()? {
        b'K' | b'k' => (&s[..s.len() - 1], 1024),
        b'M' | b'm' => (&s[..s.len() - 1], 1024 * 1024),
        _ => (s, 1),
    };
    digits.parse::<usize>().ok()?.checked_mul(scale)
}

/// Work done with one configured handle
///
/// Implemented by each device command so that it can run on any driver
/// without knowing the driver's types.
pub trait HandleTask {
    /// Run the command on `handle`
    fn run<H: QspiHal>(self, handle: &Qspi<'_, H>) -> Result<(), Box<dyn std::error::Error>>;
}

/// Open the driver named in `args`, configure a handle and run `task` on it
pub fn run_with_handle<T: HandleTask>(
    args: &HandleArgs,
    task: T,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = parse_driver_params(&args.driver)?;

    match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let (config, cs) = dummy::config(&params)?;
            let bus: QspiBus<_> = QspiBus::new(rqspi_dummy::DummyQspi::new(config));
            run_on_bus(&bus, cs, args, task)
        }

        #[cfg(feature = "linux-spi")]
        "linux_spi" | "linux-spi" | "spidev" => {
            let config =
                rqspi_linux_spi::parse_options(&params.pairs()).map_err(CliError::Driver)?;
            let pins = std::path::PathBuf::from(&config.device);
            let bus: QspiBus<_> = QspiBus::new(rqspi_linux_spi::LinuxQspi::new(config));
            run_on_bus(&bus, pins, args, task)
        }

        other => Err(CliError::UnknownDriver(other.to_string()).into()),
    }
}

fn run_on_bus<H: QspiHal, T: HandleTask>(
    bus: &QspiBus<H>,
    pins: H::Pins,
    args: &HandleArgs,
    task: T,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = QspiFormat::try_from(args.raw_format())?;

    let handle = bus.open(pins)?;
    handle.configure_format(format)?;
    handle.set_frequency(args.frequency)?;
    handle.set_alt_value(args.alt);

    log::debug!(
        "Handle {} ready at {} Hz: {:?}",
        handle.id(),
        handle.frequency(),
        handle.format()
    );

    task.run(&handle)
}

/// Dummy driver options
#[cfg(feature = "dummy")]
pub mod dummy {
    use super::{parse_size, CliError, DriverParams};
    use rqspi_core::hal::QspiFeatures;
    use rqspi_dummy::DummyConfig;

    /// Build the emulator configuration and chip select from driver options
    pub fn config(params: &DriverParams) -> Result<(DummyConfig, u8), CliError> {
        let mut config = DummyConfig::default();
        let mut cs = 0;

        for (key, value) in &params.params {
            let invalid = || CliError::InvalidParameter {
                key: key.clone(),
                value: value.clone(),
            };
            match key.as_str() {
                "size" => {
                    let size = parse_size(value).filter(|&s| s > 0).ok_or_else(invalid)?;
                    config = config.with_size(size);
                }
                "cs" => cs = value.parse().map_err(|_| invalid())?,
                "io" => {
                    let features = match value.as_str() {
                        "1" => QspiFeatures::empty(),
                        "2" => QspiFeatures::DUAL,
                        "4" => QspiFeatures::ALL,
                        _ => return Err(invalid()),
                    };
                    config = config.with_features(features);
                }
                _ => log::warn!("dummy: Unknown option: {}={}", key, value),
            }
        }

        Ok((config, cs))
    }
}
