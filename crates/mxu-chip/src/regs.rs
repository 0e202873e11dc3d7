// SPDX-License-Identifier: AGPL-3.0-only

//! Register window of the matrix-multiplier IP block.
//!
//! Offsets are relative to the block's base address as assigned by the
//! platform interconnect. The hardware decodes the bus address against
//! these values, so they must match the synthesised design.
//!
//! ```text
//! 0x00  CONTROL   64  W   bit0 start, bit1 enable  (command 0x3)
//! 0x08  STATUS    64  R   bit0 done
//! 0x10  C_ADDR    32  W   linear result index 0..15
//! 0x18  C_DATA    32  R   one 32-bit product element
//! 0x20  A_ADDR    64  W   packed BRAM addresses, one A column
//! 0x28  A_DATA    64  W   packed 16-bit elements, one A column
//! 0x30  B_ADDR    64  W   packed BRAM addresses, one B row
//! 0x38  B_DATA    64  W   packed 16-bit elements, one B row
//! ```

use std::fmt;

// ── Status and control ───────────────────────────────────────────────────────

/// Control register (write). Writing [`control::START_COMMAND`] starts a multiply.
pub const CONTROL: usize = 0x00;

/// Status register (read). Bit 0 is the done flag.
pub const STATUS: usize = 0x08;

// ── Result readback ──────────────────────────────────────────────────────────

/// C-matrix BRAM address (write, linear index `row * 4 + col`).
pub const C_ADDR: usize = 0x10;

/// C-matrix data (read, one element for the latched C address).
pub const C_DATA: usize = 0x18;

// ── Operand load ports ───────────────────────────────────────────────────────

/// A-matrix packed address word.
pub const A_ADDR: usize = 0x20;
/// A-matrix packed data word. Writing it commits the pair to BRAM.
pub const A_DATA: usize = 0x28;
/// B-matrix packed address word.
pub const B_ADDR: usize = 0x30;
/// B-matrix packed data word. Writing it commits the pair to BRAM.
pub const B_DATA: usize = 0x38;

/// Size of the register window in bytes.
pub const WINDOW_SIZE: usize = 0x40;

// ── Control register bit definitions ─────────────────────────────────────────

/// Control register bits.
pub mod control {
    /// Start a multiplication.
    pub const START: u64 = 1 << 0;
    /// Enable the engine. Always written together with [`START`].
    pub const ENABLE: u64 = 1 << 1;
    /// Command value the firmware writes to launch one multiply.
    pub const START_COMMAND: u64 = START | ENABLE;
}

// ── Status register bit definitions ──────────────────────────────────────────

/// Status register bits.
pub mod status {
    /// Multiplication finished; C BRAM holds valid results.
    pub const DONE: u64 = 1 << 0;
}

/// Access width of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWidth {
    /// 32-bit access.
    W32,
    /// 64-bit access.
    W64,
}

impl RegWidth {
    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::W32 => 4,
            Self::W64 => 8,
        }
    }

    /// Width in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }
}

/// Direction a register may be accessed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Software reads, hardware writes.
    Read,
    /// Software writes, hardware reads.
    Write,
}

/// Named register in the accelerator window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Command register.
    Control,
    /// Completion flag.
    Status,
    /// Result address latch.
    CAddr,
    /// Result data port.
    CData,
    /// Operand A address port.
    AAddr,
    /// Operand A data port.
    AData,
    /// Operand B address port.
    BAddr,
    /// Operand B data port.
    BData,
}

impl Register {
    /// Every register, in offset order.
    pub const ALL: [Self; 8] = [
        Self::Control,
        Self::Status,
        Self::CAddr,
        Self::CData,
        Self::AAddr,
        Self::AData,
        Self::BAddr,
        Self::BData,
    ];

    /// Byte offset from the block base address.
    #[must_use]
    pub const fn offset(self) -> usize {
        match self {
            Self::Control => CONTROL,
            Self::Status => STATUS,
            Self::CAddr => C_ADDR,
            Self::CData => C_DATA,
            Self::AAddr => A_ADDR,
            Self::AData => A_DATA,
            Self::BAddr => B_ADDR,
            Self::BData => B_DATA,
        }
    }

    /// Access width.
    #[must_use]
    pub const fn width(self) -> RegWidth {
        match self {
            Self::CAddr | Self::CData => RegWidth::W32,
            _ => RegWidth::W64,
        }
    }

    /// Permitted access direction.
    #[must_use]
    pub const fn access(self) -> Access {
        match self {
            Self::Status | Self::CData => Access::Read,
            _ => Access::Write,
        }
    }

    /// Short upper-case name, as used in logs and the register dump.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Control => "CONTROL",
            Self::Status => "STATUS",
            Self::CAddr => "C_ADDR",
            Self::CData => "C_DATA",
            Self::AAddr => "A_ADDR",
            Self::AData => "A_DATA",
            Self::BAddr => "B_ADDR",
            Self::BData => "B_DATA",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#04x}", self.name(), self.offset())
    }
}
