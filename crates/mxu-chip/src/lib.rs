// SPDX-License-Identifier: AGPL-3.0-only

//! Silicon model for the 4×4 banked matrix-multiplication accelerator.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the IP block: register offsets, command and status bits,
//! the fixed matrix geometry, and the BRAM address format the operand
//! memories decode.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`regs`] | Register window: offsets, widths, directions, bit definitions |
//! | [`geometry`] | Matrix dimension, bank count, packed field widths |
//! | [`bram`] | 4-bit BRAM element address (bank + element index) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bram;
pub mod geometry;
pub mod regs;

pub use bram::BankAddress;
pub use regs::{Access, RegWidth, Register};
