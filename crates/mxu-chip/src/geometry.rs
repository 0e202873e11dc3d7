// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed geometry of the accelerator.
//!
//! The IP block is synthesised for one problem size only:
//!
//! ```text
//!   A (4×4, u16) × B (4×4, u16) = C (4×4, u32)
//!
//!   64-bit write port = 4 banks × 16-bit element
//!   BRAM element address = [bank:2][element:2]      (4 bits)
//! ```

/// Matrix dimension shared by both operands and the result.
pub const DIM: usize = 4;

/// Parallel operand banks behind one 64-bit write.
pub const BANKS: usize = 4;

/// Width of one operand element in bits.
pub const DATA_BITS: u32 = 16;

/// Bits of the element index inside a BRAM address.
pub const ELEMENT_INDEX_BITS: u32 = 2;

/// Bits of the bank index inside a BRAM address.
pub const BANK_INDEX_BITS: u32 = 2;

/// Width of one BRAM address sub-field in a packed address word.
pub const ADDR_BITS: u32 = ELEMENT_INDEX_BITS + BANK_INDEX_BITS;

/// Number of result elements read back through C-Address / C-Data.
pub const RESULT_ELEMENTS: usize = DIM * DIM;

#[cfg(test)]
#[allow(clippy::assertions_on_constants)]
mod tests {
    use super::*;

    #[test]
    fn packed_words_fit_in_64_bits() {
        assert_eq!(BANKS as u32 * DATA_BITS, 64);
        assert!(BANKS as u32 * ADDR_BITS <= 64);
    }

    #[test]
    fn index_fields_cover_dimension() {
        assert_eq!(1usize << ELEMENT_INDEX_BITS, DIM);
        assert_eq!(1usize << BANK_INDEX_BITS, BANKS);
        assert_eq!(RESULT_ELEMENTS, 16);
    }
}
