//! Write command implementation

use indicatif::{ProgressBar, ProgressStyle};
use rqspi_core::bus::Qspi;
use rqspi_core::hal::QspiHal;
use rqspi_core::qspi::opcodes;
use std::path::PathBuf;

use super::read::device_address;
use crate::drivers::HandleTask;

/// Status polls before giving up on a program cycle
const MAX_BUSY_POLLS: usize = 100_000;

/// Program a file at `address`, one page at a time
pub struct WriteTask {
    pub address: u32,
    pub input: PathBuf,
    pub instruction: u32,
    pub page_size: usize,
}

impl HandleTask for WriteTask {
    fn run<H: QspiHal>(self, handle: &Qspi<'_, H>) -> Result<(), Box<dyn std::error::Error>> {
        if self.page_size == 0 {
            return Err("Page size must be non-zero".into());
        }
        let data = std::fs::read(&self.input)?;
        handle.set_write_instruction(self.instruction);

        let pb = ProgressBar::new(data.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
                .progress_chars("#>-"),
        );

        let mut offset = 0usize;
        while offset < data.len() {
            let address = device_address(self.address, offset)?;
            // Never cross a page boundary in one program
            let page_left = self.page_size - address as usize % self.page_size;
            let chunk = &data[offset..data.len().min(offset + page_left)];

            handle.perform_command(opcodes::WREN as u32, None)?;
            let n = handle.write(address, chunk)?;
            wait_ready(handle)?;

            if n == 0 {
                return Err(format!("Device accepted no data at {:#x}", address).into());
            }
            offset += n;
            pb.set_position(offset as u64);
        }

        pb.finish_with_message("Write complete");
        println!("Wrote {} bytes from {:?}", data.len(), self.input);

        Ok(())
    }
}

/// Poll the status register until the write-in-progress bit clears
fn wait_ready<H: QspiHal>(handle: &Qspi<'_, H>) -> Result<(), Box<dyn std::error::Error>> {
    let mut status = [0u8; 1];
    for _ in 0..MAX_BUSY_POLLS {
        handle.read_with(opcodes::RDSR as u32, None, None, &mut status)?;
        if status[0] & opcodes::SR1_WIP == 0 {
            return Ok(());
        }
    }
    Err("Timed out waiting for the device to finish programming".into())
}
