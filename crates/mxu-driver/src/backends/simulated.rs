// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated accelerator backend
//!
//! Implements [`RegisterInterface`] with a cycle-free software model of the
//! IP block, so the full load → start → poll → readback sequence runs in CI
//! without a bitstream.
//!
//! ## Model
//!
//! ```text
//! A_ADDR/A_DATA  →  each slot's 4-bit address picks a_banks[bank][element]
//! B_ADDR/B_DATA  →  each slot's 4-bit address picks b_banks[bank][element]
//! CONTROL.start  →  C[i][j] = Σk a_banks[i][k] · b_banks[j][k]   (u32, wrapping)
//! STATUS.done    →  set after `latency` status reads, or never
//! C_ADDR/C_DATA  →  C[idx / 4][idx % 4]
//! ```
//!
//! Like the RTL, the model decodes bank and element from the address word
//! rather than trusting the slot order, so a loader that packs an operand
//! in the wrong orientation produces a wrong product here too.
//!
//! Every access is appended to an access log for sequence checks.

use crate::backend::{check_access, BackendType, RegisterInterface};
use crate::error::Result;
use crate::pack::{unpack_addresses, unpack_data};
use mxu_chip::geometry::{BANKS, DIM, RESULT_ELEMENTS};
use mxu_chip::regs::{control, status};
use mxu_chip::{Access, RegWidth, Register};
use tracing::{debug, warn};

/// When the simulated device raises its done bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Done after this many status reads following a start command
    AfterPolls(u32),
    /// Never completes (hung engine)
    Never,
}

/// One register access observed by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterAccess {
    /// Software wrote `value`
    Write {
        /// Target register
        reg: Register,
        /// Value written (zero-extended for 32-bit registers)
        value: u64,
    },
    /// Software read `value`
    Read {
        /// Source register
        reg: Register,
        /// Value returned (zero-extended for 32-bit registers)
        value: u64,
    },
}

impl RegisterAccess {
    /// Whether this access is a write
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    /// Register touched
    pub const fn register(&self) -> Register {
        match self {
            Self::Write { reg, .. } | Self::Read { reg, .. } => *reg,
        }
    }
}

/// Software model of the matrix-multiplier IP block
#[derive(Debug)]
pub struct SimulatedAccelerator {
    completion: Completion,

    a_addr_latch: u64,
    b_addr_latch: u64,
    /// Operand A BRAM, [bank][element] (bank = row of A)
    a_banks: [[u16; DIM]; BANKS],
    /// Operand B BRAM, [bank][element] (bank = column of B)
    b_banks: [[u16; DIM]; BANKS],
    /// Result BRAM, row-major
    c: [u32; RESULT_ELEMENTS],
    c_index: u32,

    busy: bool,
    done: bool,
    polls_since_start: u32,
    starts: u32,

    log: Vec<RegisterAccess>,
}

impl Default for SimulatedAccelerator {
    fn default() -> Self {
        Self::new(Completion::AfterPolls(1))
    }
}

impl SimulatedAccelerator {
    /// Create a simulator with the given completion behaviour
    pub fn new(completion: Completion) -> Self {
        Self {
            completion,
            a_addr_latch: 0,
            b_addr_latch: 0,
            a_banks: [[0; DIM]; BANKS],
            b_banks: [[0; DIM]; BANKS],
            c: [0; RESULT_ELEMENTS],
            c_index: 0,
            busy: false,
            done: false,
            polls_since_start: 0,
            starts: 0,
            log: Vec::new(),
        }
    }

    /// Simulator that raises done after `polls` status reads
    pub fn with_latency(polls: u32) -> Self {
        Self::new(Completion::AfterPolls(polls))
    }

    /// Simulator whose engine never finishes
    pub fn hung() -> Self {
        Self::new(Completion::Never)
    }

    /// Operand A BRAM contents, `[bank][element]`
    pub const fn a_banks(&self) -> &[[u16; DIM]; BANKS] {
        &self.a_banks
    }

    /// Operand B BRAM contents, `[bank][element]`
    pub const fn b_banks(&self) -> &[[u16; DIM]; BANKS] {
        &self.b_banks
    }

    /// Whether the done bit is currently set
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Number of start commands accepted
    pub const fn starts(&self) -> u32 {
        self.starts
    }

    /// Every access since creation or the last [`clear_log`](Self::clear_log)
    pub fn access_log(&self) -> &[RegisterAccess] {
        &self.log
    }

    /// Write accesses only, in order
    pub fn writes(&self) -> Vec<RegisterAccess> {
        self.log.iter().copied().filter(RegisterAccess::is_write).collect()
    }

    /// Forget recorded accesses
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn commit_operand(banks: &mut [[u16; DIM]; BANKS], addr_word: u64, data_word: u64) {
        let addrs = unpack_addresses(addr_word);
        let data = unpack_data(data_word);
        for (addr, value) in addrs.iter().zip(data) {
            banks[usize::from(addr.bank)][usize::from(addr.element)] = value;
        }
    }

    fn start(&mut self) {
        for i in 0..DIM {
            for j in 0..DIM {
                self.c[i * DIM + j] = (0..DIM).fold(0u32, |acc, k| {
                    acc.wrapping_add(
                        u32::from(self.a_banks[i][k]) * u32::from(self.b_banks[j][k]),
                    )
                });
            }
        }
        self.starts += 1;
        self.busy = true;
        self.done = false;
        self.polls_since_start = 0;
        debug!("Simulated multiply #{} started", self.starts);
    }

    fn poll(&mut self) -> u64 {
        if self.busy {
            self.polls_since_start = self.polls_since_start.saturating_add(1);
            if let Completion::AfterPolls(n) = self.completion {
                if self.polls_since_start >= n {
                    self.busy = false;
                    self.done = true;
                    debug!("Simulated multiply done after {n} polls");
                }
            }
        }
        if self.done {
            status::DONE
        } else {
            0
        }
    }
}

impl RegisterInterface for SimulatedAccelerator {
    fn read_u32(&mut self, reg: Register) -> Result<u32> {
        check_access(reg, RegWidth::W32, Access::Read)?;
        // CData is the only readable 32-bit register.
        let value = self.c[self.c_index as usize];
        self.log.push(RegisterAccess::Read {
            reg,
            value: u64::from(value),
        });
        Ok(value)
    }

    fn write_u32(&mut self, reg: Register, value: u32) -> Result<()> {
        check_access(reg, RegWidth::W32, Access::Write)?;
        self.log.push(RegisterAccess::Write {
            reg,
            value: u64::from(value),
        });
        // CAddr is the only writable 32-bit register; the RTL wires 4 bits.
        if value as usize >= RESULT_ELEMENTS {
            warn!("C address {value} wraps to {}", value % RESULT_ELEMENTS as u32);
        }
        self.c_index = value % RESULT_ELEMENTS as u32;
        Ok(())
    }

    fn read_u64(&mut self, reg: Register) -> Result<u64> {
        check_access(reg, RegWidth::W64, Access::Read)?;
        // Status is the only readable 64-bit register.
        let value = self.poll();
        self.log.push(RegisterAccess::Read { reg, value });
        Ok(value)
    }

    fn write_u64(&mut self, reg: Register, value: u64) -> Result<()> {
        check_access(reg, RegWidth::W64, Access::Write)?;
        self.log.push(RegisterAccess::Write { reg, value });
        match reg {
            Register::Control => {
                if value & control::START != 0 {
                    self.start();
                }
            }
            Register::AAddr => self.a_addr_latch = value,
            Register::AData => Self::commit_operand(&mut self.a_banks, self.a_addr_latch, value),
            Register::BAddr => self.b_addr_latch = value,
            Register::BData => Self::commit_operand(&mut self.b_banks, self.b_addr_latch, value),
            // Remaining registers are rejected by check_access above.
            Register::Status | Register::CAddr | Register::CData => {}
        }
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Simulated
    }
}
