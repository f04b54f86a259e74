//! Peripheral driver traits
//!
//! The register-level QSPI driver lives outside this crate. Backends plug in
//! by implementing [`QspiHal`] (peripheral bring-up) and [`QspiChannel`]
//! (the per-handle read/write/command primitives).

mod traits;

pub use traits::*;
