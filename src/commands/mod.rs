//! CLI command implementations
//!
//! Device commands implement [`HandleTask`](crate::drivers::HandleTask) and
//! run on whatever driver the user picked. `stress` is special: it needs the
//! emulator's counters, so it only runs on the dummy driver.

mod command;
mod list;
mod read;
#[cfg(feature = "dummy")]
mod stress;
mod write;

pub use command::CommandTask;
pub use list::list_drivers;
pub use read::ReadTask;
#[cfg(feature = "dummy")]
pub use stress::run_stress;
pub use write::WriteTask;
