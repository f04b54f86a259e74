//! Read command implementation

use indicatif::{ProgressBar, ProgressStyle};
use rqspi_core::bus::Qspi;
use rqspi_core::hal::QspiHal;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use crate::drivers::HandleTask;

/// Default chunk size for reading (4 KiB)
const READ_CHUNK_SIZE: usize = 4096;

/// Read `length` bytes from `address` into a file
pub struct ReadTask {
    pub address: u32,
    pub length: u32,
    pub output: PathBuf,
    pub instruction: u32,
}

impl HandleTask for ReadTask {
    fn run<H: QspiHal>(self, handle: &Qspi<'_, H>) -> Result<(), Box<dyn std::error::Error>> {
        handle.set_read_instruction(self.instruction);

        let data = read_with_progress(handle, self.address, self.length as usize)?;

        let mut file = File::create(&self.output)?;
        file.write_all(&data)?;

        println!("Wrote {} bytes to {:?}", data.len(), self.output);

        Ok(())
    }
}

/// Read a range in chunks with a progress bar
///
/// Stops early if the device returns a short chunk (end of the array).
pub fn read_with_progress<H: QspiHal>(
    handle: &Qspi<'_, H>,
    address: u32,
    length: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut data = vec![0u8; length];

    let pb = ProgressBar::new(length as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let mut offset = 0usize;
    while offset < length {
        let chunk_size = std::cmp::min(READ_CHUNK_SIZE, length - offset);
        let chunk = &mut data[offset..offset + chunk_size];

        let n = handle.read(device_address(address, offset)?, chunk)?;
        offset += n;
        pb.set_position(offset as u64);

        if n < chunk_size {
            log::warn!("Short read at {:#x}, stopping", address as u64 + offset as u64);
            break;
        }
    }

    data.truncate(offset);
    pb.finish_with_message("Read complete");
    Ok(data)
}

/// Address `offset` bytes past `base`, if it fits in 32 bits
pub fn device_address(base: u32, offset: usize) -> Result<u32, String> {
    u32::try_from(offset)
        .ok()
        .and_then(|offset| base.checked_add(offset))
        .ok_or_else(|| {
            format!(
                "Address {:#x} + {:#x} is beyond the 32-bit address space",
                base, offset
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_address() {
        assert_eq!(device_address(0x1000, 0x20), Ok(0x1020));
        assert_eq!(device_address(u32::MAX - 4, 4), Ok(u32::MAX));
        assert!(device_address(u32::MAX - 4, 5).is_err());
        assert!(device_address(1, u32::MAX as usize).is_err());
    }
}
