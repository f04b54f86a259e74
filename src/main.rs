//! rqspi - Shared QSPI bus tool
//!
//! Opens a logical device handle on a QSPI bus through one of the compiled
//! in drivers and runs reads, page programs or bare commands on it. The
//! `stress` command exercises bus arbitration with many handles and threads
//! on the in-memory emulator.

mod cli;
mod commands;
mod drivers;

use clap::Parser;
use cli::{Cli, Commands};
use drivers::run_with_handle;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let result = match cli.command {
        Commands::Drivers => {
            commands::list_drivers();
            Ok(())
        }
        Commands::Read {
            handle,
            address,
            length,
            output,
            instruction,
        } => run_with_handle(
            &handle,
            commands::ReadTask {
                address,
                length,
                output,
                instruction,
            },
        ),
        Commands::Write {
            handle,
            address,
            input,
            instruction,
            page_size,
        } => run_with_handle(
            &handle,
            commands::WriteTask {
                address,
                input,
                instruction,
                page_size,
            },
        ),
        Commands::Command {
            handle,
            instruction,
            read,
        } => run_with_handle(&handle, commands::CommandTask { instruction, read }),
        #[cfg(feature = "dummy")]
        Commands::Stress {
            driver,
            handles,
            threads,
            iterations,
        } => commands::run_stress(&driver, handles, threads, iterations),
        #[cfg(not(feature = "dummy"))]
        Commands::Stress { .. } => Err("stress needs the dummy driver (rebuild with --features dummy)".into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
