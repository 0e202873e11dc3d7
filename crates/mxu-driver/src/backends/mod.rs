// SPDX-License-Identifier: AGPL-3.0-only

//! Register interface implementations
//!
//! Two backends available:
//! - **MMIO**: maps the physical register window through `/dev/mem` or a UIO node
//! - **Simulated**: software model of the IP block, for CI and bring-up

pub mod mmio;
pub mod simulated;

pub use mmio::MmioBackend;
pub use simulated::{Completion, RegisterAccess, SimulatedAccelerator};
