//! Shared bus arbitration
//!
//! A [`QspiBus`] owns one physical controller. Any number of [`Qspi`]
//! handles can be opened on it, each with its own framing and clock. The bus
//! remembers which handle last programmed the controller (the owner) and
//! reprograms the clock only when a different handle starts a transaction.
//!
//! ```text
//!   thread A ──► Qspi #0 ─┐
//!                         ├─► QspiBus ── lock ── owner ──► QspiHal channels
//!   thread B ──► Qspi #1 ─┘
//! ```
//!
//! Every operation on a handle holds the bus lock for its whole duration:
//! ownership claim, descriptor build and the driver transfer. Transactions
//! on different handles of the same bus therefore never interleave.

mod arbiter;
mod handle;
#[cfg(test)]
mod mock;
mod state;

pub use arbiter::{DefaultRawMutex, QspiBus};
pub use handle::Qspi;
pub use state::{HandleConfig, HandleId};
