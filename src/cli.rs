//! CLI argument parsing

use crate::drivers;
use clap::{Parser, Subcommand};
use rqspi_core::qspi::{opcodes, RawFormat, DEFAULT_FREQUENCY_HZ};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the driver argument
fn driver_help() -> String {
    format!("Driver to use [available: {}]", drivers::driver_names_short())
}

#[derive(Parser)]
#[command(name = "rqspi")]
#[command(author, version, about = "Shared QSPI bus tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Handle settings shared across transfer commands
///
/// Widths are wire counts (1, 2, 4); sizes are bit counts (8, 16, 24, 32,
/// and 0 for no alternate phase).
#[derive(clap::Args, Debug, Clone)]
pub struct HandleArgs {
    /// Driver to use
    #[arg(short, long, help = driver_help())]
    pub driver: String,

    /// Bus clock in Hz
    #[arg(short, long, default_value_t = DEFAULT_FREQUENCY_HZ)]
    pub frequency: u32,

    /// Instruction phase wires
    #[arg(long, default_value_t = 4)]
    pub inst_width: i64,

    /// Instruction phase bits
    #[arg(long, default_value_t = 8)]
    pub inst_size: i64,

    /// Address phase wires
    #[arg(long, default_value_t = 4)]
    pub address_width: i64,

    /// Address phase bits
    #[arg(long, default_value_t = 32)]
    pub address_size: i64,

    /// Alternate phase wires
    #[arg(long, default_value_t = 4)]
    pub alt_width: i64,

    /// Alternate phase bits (0 for none)
    #[arg(long, default_value_t = 0)]
    pub alt_size: i64,

    /// Data phase wires
    #[arg(long, default_value_t = 4)]
    pub data_width: i64,

    /// Dummy cycles between address/alternate and data
    #[arg(long, default_value_t = 0)]
    pub dummy_cycles: i64,

    /// Alternate value sent with every transfer
    #[arg(long, value_parser = parse_hex_u32)]
    pub alt: Option<u32>,
}

impl HandleArgs {
    /// Format flags as they were given
    pub fn raw_format(&self) -> RawFormat {
        RawFormat {
            inst_width: self.inst_width,
            inst_size: self.inst_size,
            address_width: self.address_width,
            address_size: self.address_size,
            alt_width: self.alt_width,
            alt_size: self.alt_size,
            data_width: self.data_width,
            dummy_cycles: self.dummy_cycles,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available drivers
    Drivers,

    /// Read from a device to a file
    Read {
        #[command(flatten)]
        handle: HandleArgs,

        /// Start address
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0")]
        address: u32,

        /// Number of bytes to read
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Read instruction
        #[arg(long, value_parser = parse_hex_u32, default_value_t = opcodes::DEFAULT_READ as u32)]
        instruction: u32,
    },

    /// Program a file into a device
    Write {
        #[command(flatten)]
        handle: HandleArgs,

        /// Start address
        #[arg(short, long, value_parser = parse_hex_u32, default_value = "0")]
        address: u32,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Program instruction
        #[arg(long, value_parser = parse_hex_u32, default_value_t = opcodes::DEFAULT_WRITE as u32)]
        instruction: u32,

        /// Page size; programming never crosses a page boundary
        #[arg(long, default_value_t = 256)]
        page_size: usize,
    },

    /// Send a bare instruction, optionally reading a response
    Command {
        #[command(flatten)]
        handle: HandleArgs,

        /// Instruction to send
        #[arg(short, long, value_parser = parse_hex_u32)]
        instruction: u32,

        /// Read this many response bytes (e.g., 3 for RDID)
        #[arg(short, long, default_value_t = 0)]
        read: usize,
    },

    /// Hammer several handles on one dummy bus from several threads
    Stress {
        /// Driver options (dummy only)
        #[arg(short, long, default_value = "dummy")]
        driver: String,

        /// Number of handles, each at its own clock
        #[arg(long, default_value_t = 4)]
        handles: u8,

        /// Number of threads
        #[arg(long, default_value_t = 8)]
        threads: usize,

        /// Transfers per thread
        #[arg(long, default_value_t = 1000)]
        iterations: usize,
    },
}
