//! Common QSPI NOR flash opcodes
//!
//! The subset of JEDEC opcodes a quad-capable NOR flash answers to, used as
//! handle defaults and by the emulated flash backend.

// ============================================================================
// Write control
// ============================================================================

/// Write Enable - required before any program/erase operation
pub const WREN: u8 = 0x06;
/// Write Disable - clears WEL bit in status register
pub const WRDI: u8 = 0x04;

// ============================================================================
// Status and identification
// ============================================================================

/// Read Status Register 1
pub const RDSR: u8 = 0x05;
/// Read JEDEC ID (manufacturer + device ID)
pub const RDID: u8 = 0x9F;

// ============================================================================
// Read commands - 4-byte address
// ============================================================================

/// Read Data with 4-byte address
pub const READ_4B: u8 = 0x13;
/// Fast Read with 4-byte address
pub const FAST_READ_4B: u8 = 0x0C;
/// Quad Output Read with 4-byte address (1-1-4)
pub const QOR_4B: u8 = 0x6C;
/// Quad I/O Read with 4-byte address (1-4-4 / 4-4-4)
pub const QIOR_4B: u8 = 0xEC;

// ============================================================================
// Page Program
// ============================================================================

/// Page Program with 4-byte address
pub const PP_4B: u8 = 0x12;
/// Quad Page Program with 4-byte address
pub const QPP_4B: u8 = 0x34;

// ============================================================================
// Erase
// ============================================================================

/// Sector Erase 4KB with 4-byte address
pub const SE_4B: u8 = 0x21;
/// Chip Erase (entire chip)
pub const CE_60: u8 = 0x60;
/// Chip Erase (alternate opcode)
pub const CE_C7: u8 = 0xC7;

// ============================================================================
// Mode control
// ============================================================================

/// Enter QPI Mode
pub const EQIO: u8 = 0x38;
/// Reset QPI Mode / Exit QPI Mode
pub const RSTQIO: u8 = 0xFF;
/// Reset Enable
pub const RSTEN: u8 = 0x66;
/// Reset Device
pub const RST: u8 = 0x99;

// ============================================================================
// Status register bit definitions
// ============================================================================

/// Status Register 1: Write In Progress / Busy
pub const SR1_WIP: u8 = 0x01;
/// Status Register 1: Write Enable Latch
pub const SR1_WEL: u8 = 0x02;

/// Instruction a new handle uses for default-form reads
pub const DEFAULT_READ: u8 = QIOR_4B;
/// Instruction a new handle uses for default-form writes
pub const DEFAULT_WRITE: u8 = QPP_4B;
