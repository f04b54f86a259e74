//! Stress command implementation
//!
//! Opens several handles at distinct clocks on one emulated bus and drives
//! them from several threads. The emulator flags any transfer that runs at
//! a clock another handle programmed, so a non-zero "foreign" count means
//! arbitration is broken.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use rqspi_core::bus::QspiBus;
use rqspi_dummy::DummyQspi;

use crate::drivers::{self, CliError};

/// Base clock; handle `n` runs at `(n + 1)` times this
const BASE_FREQUENCY_HZ: u32 = 1_000_000;

/// Bytes read per transfer
const TRANSFER_SIZE: usize = 64;

/// Run the stress test
pub fn run_stress(
    driver: &str,
    handles: u8,
    threads: usize,
    iterations: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = drivers::parse_driver_params(driver)?;
    if params.name != "dummy" {
        return Err(CliError::Driver(format!(
            "stress needs the dummy driver, got {}",
            params.name
        ))
        .into());
    }
    if handles == 0 || threads == 0 {
        return Err("Need at least one handle and one thread".into());
    }

    let (config, _) = drivers::dummy::config(&params)?;
    let flash = DummyQspi::new(config);
    let bus: QspiBus<DummyQspi> = QspiBus::new(flash.clone());

    let mut opened = Vec::with_capacity(handles as usize);
    for cs in 0..handles {
        let handle = bus.open(cs)?;
        handle.set_frequency(BASE_FREQUENCY_HZ * (cs as u32 + 1))?;
        opened.push(handle);
    }
    let before = flash.stats();

    println!(
        "Running {} threads x {} transfers over {} handles",
        threads, iterations, handles
    );

    let pb = ProgressBar::new((threads * iterations) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let size = flash.size();
    std::thread::scope(|s| -> Result<(), rqspi_core::Error> {
        let workers: Vec<_> = (0..threads)
            .map(|t| {
                let handle = &opened[t % opened.len()];
                let pb = &pb;
                s.spawn(move || {
                    let mut buf = [0u8; TRANSFER_SIZE];
                    for i in 0..iterations {
                        let address = ((t * iterations + i) * TRANSFER_SIZE) % size;
                        handle.read(address as u32, &mut buf)?;
                        pb.inc(1);
                    }
                    Ok(())
                })
            })
            .collect();

        for worker in workers {
            match worker.join() {
                Ok(result) => result?,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        Ok(())
    })?;
    let elapsed = start.elapsed();
    pb.finish_and_clear();

    let after = flash.stats();
    let transfers = after.transfers - before.transfers;
    let reprograms = after.reprograms - before.reprograms;
    let foreign = after.foreign_transfers - before.foreign_transfers;

    println!("Transfers:         {}", transfers);
    println!("Clock reprograms:  {}", reprograms);
    println!("Foreign transfers: {}", foreign);
    println!(
        "Elapsed:           {:.2?} ({:.0} transfers/s)",
        elapsed,
        transfers as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    if foreign > 0 {
        return Err(format!("{} transfers ran under another handle's clock", foreign).into());
    }

    Ok(())
}
