// SPDX-License-Identifier: AGPL-3.0-only

//! Pure Rust driver for the 4×4 banked matrix-multiplication accelerator.
//!
//! The IP block multiplies two 4×4 matrices of 16-bit elements into a 4×4
//! matrix of 32-bit elements. Software talks to it through eight registers:
//! it packs operands into banked BRAM writes, starts the engine, polls for
//! done, and reads the product back one element at a time.
//!
//! # Backends
//!
//! ```text
//! MmioBackend          : /dev/mem (or UIO) mapping of the register window
//! SimulatedAccelerator : software model of the IP block, no hardware
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use mxu_driver::{samples, select_backend, BackendSelection, Controller, DriverConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DriverConfig::from_env()?;
//! let regs = select_backend(BackendSelection::Mmio, &config)?;
//! let mut ctl = Controller::new(regs, &config);
//!
//! let report = ctl.run(&samples::matrix_a(), &samples::matrix_b())?;
//! print!("{}", report.result);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod backend;
pub mod backends;
mod config;
mod controller;
mod error;
mod matrix;
pub mod pack;
pub mod samples;
pub mod wait;

/// Silicon model constants (re-exported from mxu-chip).
pub mod chip {
    pub use mxu_chip::geometry::{BANKS, DIM, RESULT_ELEMENTS};
    pub use mxu_chip::regs::{control, status, WINDOW_SIZE};
    pub use mxu_chip::{Access, BankAddress, RegWidth, Register};
}

pub use backend::{check_access, select_backend, BackendSelection, BackendType, RegisterInterface};
pub use backends::{Completion, MmioBackend, RegisterAccess, SimulatedAccelerator};
pub use config::{
    timeout_from_ms, DriverConfig, DEFAULT_DEVICE_PATH, ENV_BASE_ADDR, ENV_DEVICE_PATH,
    ENV_POLL_TIMEOUT_MS,
};
pub use controller::{Controller, ControllerState, RunReport};
pub use error::{Axis, MxuError, Result};
pub use matrix::{reference_product, Matrix, OperandMatrix, ResultMatrix};
pub use pack::{compose_element_address, pack_column, pack_row, BitField, PackedWrite};
pub use wait::{CancelToken, Clock, ManualClock, PollPolicy, SystemClock, WaitOutcome};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        select_backend, BackendSelection, Controller, DriverConfig, MxuError, OperandMatrix,
        PollPolicy, RegisterInterface, ResultMatrix, Result, RunReport,
    };
}
