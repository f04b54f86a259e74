//! Raw command implementation

use rqspi_core::bus::Qspi;
use rqspi_core::hal::QspiHal;

use crate::drivers::HandleTask;

/// Send one instruction, with the handle's alternate value if set
pub struct CommandTask {
    pub instruction: u32,
    /// Response bytes to read; 0 sends a bare command
    pub read: usize,
}

impl HandleTask for CommandTask {
    fn run<H: QspiHal>(self, handle: &Qspi<'_, H>) -> Result<(), Box<dyn std::error::Error>> {
        let alt = handle.config().alt_value;

        if self.read == 0 {
            handle.perform_command(self.instruction, alt)?;
            println!("Sent {:#04x}", self.instruction);
            return Ok(());
        }

        let mut buf = vec![0u8; self.read];
        let n = handle.read_with(self.instruction, None, alt, &mut buf)?;
        let hex: Vec<String> = buf[..n].iter().map(|b| format!("{:02X}", b)).collect();
        println!("{:#04x}: {}", self.instruction, hex.join(" "));

        Ok(())
    }
}
