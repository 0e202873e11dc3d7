// SPDX-License-Identifier: AGPL-3.0-only

//! BRAM element addressing.
//!
//! Each operand memory is split into [`BANKS`](crate::geometry::BANKS)
//! lanes so that one 64-bit write can land four elements at once. The
//! hardware addresses a single element with a 4-bit value:
//!
//! ```text
//!  bit  3   2   1   0
//!      [ bank  ][element]
//! ```
//!
//! Operand A is stored bank = row, element = column. Operand B is stored
//! bank = column, element = row. Both orientations share this address
//! format; only the loader decides which coordinate becomes the bank.

use crate::geometry::{ADDR_BITS, ELEMENT_INDEX_BITS};

const ELEMENT_MASK: u8 = (1 << ELEMENT_INDEX_BITS) - 1;
const ADDR_MASK: u8 = (1 << ADDR_BITS) - 1;

/// Decoded 4-bit BRAM element address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BankAddress {
    /// Bank (lane) index, `0..4`.
    pub bank: u8,
    /// Position inside the bank, `0..4`.
    pub element: u8,
}

impl BankAddress {
    /// Decode the low 4 bits of `raw`. Higher bits are ignored, as the
    /// hardware only wires `ADDR_BITS` of each sub-field.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        let raw = raw & ADDR_MASK;
        Self {
            bank: raw >> ELEMENT_INDEX_BITS,
            element: raw & ELEMENT_MASK,
        }
    }
}
