// SPDX-License-Identifier: AGPL-3.0-only

//! Address/data packing for the banked operand memories
//!
//! One 64-bit write pair loads four elements at once: the address word
//! carries four 4-bit BRAM addresses and the data word four 16-bit
//! elements, both indexed by bank slot.
//!
//! ```text
//! address word  [63 .. 16 unused][slot3:4][slot2:4][slot1:4][slot0:4]
//! data word     [slot3:16][slot2:16][slot1:16][slot0:16]
//! BRAM address  [bank:2][element:2]
//! ```
//!
//! Operand A is packed one **column** at a time (bank = row, element =
//! column). Operand B is packed one **row** at a time (bank = column,
//! element = row). The two orientations are not interchangeable: the
//! hardware reads A banks as rows and B banks as columns when it forms
//! dot products.

use crate::error::{Axis, MxuError, Result};
use crate::matrix::OperandMatrix;
use mxu_chip::geometry::{ADDR_BITS, BANKS, BANK_INDEX_BITS, DATA_BITS, DIM, ELEMENT_INDEX_BITS};
use mxu_chip::BankAddress;
use tracing::{trace, warn};

/// Fixed-width bit field inside a 64-bit register word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    /// Name used in range errors
    pub name: &'static str,
    /// Bit offset of the least significant bit
    pub offset: u32,
    /// Field width in bits (1..=64)
    pub width: u32,
}

impl BitField {
    /// Define a field
    pub const fn new(name: &'static str, offset: u32, width: u32) -> Self {
        Self {
            name,
            offset,
            width,
        }
    }

    /// Largest value the field can hold
    pub const fn max(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Place `value` at the field's offset
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `value` does not fit in `width` bits.
    pub fn encode(&self, value: u64) -> Result<u64> {
        if value > self.max() {
            return Err(MxuError::out_of_range(self.name, value, self.max()));
        }
        Ok(value << self.offset)
    }

    /// Extract the field from `word`
    pub const fn decode(&self, word: u64) -> u64 {
        (word >> self.offset) & self.max()
    }
}

const ELEMENT_INDEX: BitField = BitField::new("element index", 0, ELEMENT_INDEX_BITS);
const BANK_INDEX: BitField = BitField::new("bank index", ELEMENT_INDEX_BITS, BANK_INDEX_BITS);

/// 4-bit BRAM address field for bank slot `slot` of a packed address word
pub const fn address_slot(slot: usize) -> BitField {
    BitField::new("BRAM address", slot as u32 * ADDR_BITS, ADDR_BITS)
}

/// 16-bit element field for bank slot `slot` of a packed data word
pub const fn data_slot(slot: usize) -> BitField {
    BitField::new("operand element", slot as u32 * DATA_BITS, DATA_BITS)
}

/// Compose the 4-bit BRAM address `element_index | (bank_index << 2)`
///
/// # Errors
///
/// Returns `OutOfRange` if either index is outside `0..4`.
pub fn compose_element_address(bank_index: usize, element_index: usize) -> Result<u8> {
    let element = ELEMENT_INDEX.encode(element_index as u64)?;
    let bank = BANK_INDEX.encode(bank_index as u64)?;
    #[allow(clippy::cast_possible_truncation)] // both fields fit in 4 bits
    Ok((element | bank) as u8)
}

/// One address/data write pair for an operand port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedWrite {
    /// Packed BRAM address word
    pub address: u64,
    /// Packed element data word
    pub data: u64,
}

impl PackedWrite {
    fn push(&mut self, slot: usize, bank: usize, element: usize, value: u16) -> Result<()> {
        let addr = compose_element_address(bank, element)?;
        self.address |= address_slot(slot).encode(u64::from(addr))?;
        self.data |= data_slot(slot).encode(u64::from(value))?;
        Ok(())
    }
}

/// Pack column `column_index` of operand A (bank = row, element = column)
///
/// # Errors
///
/// Returns `InvalidIndex` if `column_index >= 4`.
pub fn pack_column(matrix: &OperandMatrix, column_index: usize) -> Result<PackedWrite> {
    if column_index >= DIM {
        warn!("Column index {column_index} out of bounds for operand A");
        return Err(MxuError::invalid_index(Axis::Column, column_index, DIM));
    }

    let mut packed = PackedWrite::default();
    for row in 0..BANKS {
        packed.push(row, row, column_index, matrix.rows()[row][column_index])?;
    }

    trace!(
        "Packed A column {column_index}: address={:#x} data={:#x}",
        packed.address,
        packed.data
    );
    Ok(packed)
}

/// Pack row `row_index` of operand B (bank = column, element = row)
///
/// # Errors
///
/// Returns `InvalidIndex` if `row_index >= 4`.
pub fn pack_row(matrix: &OperandMatrix, row_index: usize) -> Result<PackedWrite> {
    if row_index >= DIM {
        warn!("Row index {row_index} out of bounds for operand B");
        return Err(MxuError::invalid_index(Axis::Row, row_index, DIM));
    }

    let mut packed = PackedWrite::default();
    for col in 0..BANKS {
        packed.push(col, col, row_index, matrix.rows()[row_index][col])?;
    }

    trace!(
        "Packed B row {row_index}: address={:#x} data={:#x}",
        packed.address,
        packed.data
    );
    Ok(packed)
}

/// Split a packed data word into its four 16-bit elements, by bank slot
pub fn unpack_data(word: u64) -> [u16; BANKS] {
    #[allow(clippy::cast_possible_truncation)] // decode masks to 16 bits
    std::array::from_fn(|slot| data_slot(slot).decode(word) as u16)
}

/// Split a packed address word into its four BRAM addresses, by bank slot
pub fn unpack_addresses(word: u64) -> [BankAddress; BANKS] {
    #[allow(clippy::cast_possible_truncation)] // decode masks to 4 bits
    std::array::from_fn(|slot| BankAddress::from_raw(address_slot(slot).decode(word) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples;
    use std::collections::HashSet;

    #[test]
    fn compose_matches_formula() {
        for bank in 0..4 {
            for element in 0..4 {
                let addr = compose_element_address(bank, element).unwrap();
                assert_eq!(usize::from(addr), element | (bank << 2));
            }
        }
    }

    #[test]
    fn compose_is_injective() {
        let all: HashSet<u8> = (0..4)
            .flat_map(|b| (0..4).map(move |e| compose_element_address(b, e).unwrap()))
            .collect();
        assert_eq!(all.len(), 16);
        assert!(all.iter().all(|&a| a < 16));
    }

    #[test]
    fn compose_rejects_wide_indices() {
        assert!(matches!(
            compose_element_address(4, 0),
            Err(MxuError::OutOfRange { field: "bank index", value: 4, max: 3 })
        ));
        assert!(matches!(
            compose_element_address(0, 5),
            Err(MxuError::OutOfRange { field: "element index", value: 5, max: 3 })
        ));
    }

    #[test]
    fn bit_field_encode_decode() {
        let f = BitField::new("test", 8, 4);
        assert_eq!(f.max(), 0xF);
        assert_eq!(f.encode(0xA).unwrap(), 0xA00);
        assert_eq!(f.decode(0xFAFF), 0xA);
        assert!(f.encode(0x10).is_err());

        let full = BitField::new("full", 0, 64);
        assert_eq!(full.max(), u64::MAX);
        assert_eq!(full.encode(u64::MAX).unwrap(), u64::MAX);
    }

    #[test]
    fn slot_fields_are_disjoint() {
        let mut seen_addr = 0u64;
        let mut seen_data = 0u64;
        for slot in 0..BANKS {
            let a = address_slot(slot).max() << address_slot(slot).offset;
            let d = data_slot(slot).max() << data_slot(slot).offset;
            assert_eq!(seen_addr & a, 0);
            assert_eq!(seen_data & d, 0);
            seen_addr |= a;
            seen_data |= d;
        }
        assert_eq!(seen_addr, 0xFFFF);
        assert_eq!(seen_data, u64::MAX);
    }

    #[test]
    fn column_zero_of_sample_a() {
        let packed = pack_column(&samples::matrix_a(), 0).unwrap();
        assert_eq!(packed.data, 1 | (5 << 16) | (9 << 32) | (13 << 48));
        assert_eq!(packed.address, (4 << 4) | (8 << 8) | (12 << 12));
        assert_eq!(packed.address, 0xC840);
    }

    #[test]
    fn pack_column_recovers_every_element() {
        let a = samples::matrix_a();
        for col in 0..DIM {
            let packed = pack_column(&a, col).unwrap();
            assert_eq!(unpack_data(packed.data), a.column(col));
            for (row, addr) in unpack_addresses(packed.address).iter().enumerate() {
                assert_eq!(usize::from(addr.bank), row);
                assert_eq!(usize::from(addr.element), col);
            }
        }
    }

    #[test]
    fn pack_row_recovers_every_element() {
        let b = samples::matrix_b();
        for row in 0..DIM {
            let packed = pack_row(&b, row).unwrap();
            assert_eq!(unpack_data(packed.data), b.rows()[row]);
            for (col, addr) in unpack_addresses(packed.address).iter().enumerate() {
                assert_eq!(usize::from(addr.bank), col);
                assert_eq!(usize::from(addr.element), row);
            }
        }
    }

    #[test]
    fn packing_is_pure() {
        let a = samples::matrix_a();
        assert_eq!(pack_column(&a, 2).unwrap(), pack_column(&a, 2).unwrap());
        assert_eq!(pack_row(&a, 3).unwrap(), pack_row(&a, 3).unwrap());
    }

    #[test]
    fn orientations_differ() {
        let a = samples::matrix_a();
        let col = pack_column(&a, 1).unwrap();
        let row = pack_row(&a, 1).unwrap();
        // Address words coincide for the same index; the data does not.
        assert_eq!(col.address, row.address);
        assert_ne!(col.data, row.data);
        assert_eq!(col, pack_row(&a.transpose(), 1).unwrap());
    }

    #[test]
    fn out_of_range_index_is_invalid() {
        let a = samples::matrix_a();
        assert!(matches!(
            pack_column(&a, 4),
            Err(MxuError::InvalidIndex { axis: Axis::Column, index: 4, limit: 4 })
        ));
        assert!(matches!(
            pack_row(&a, 7),
            Err(MxuError::InvalidIndex { axis: Axis::Row, index: 7, limit: 4 })
        ));
    }

    #[test]
    fn full_width_elements_survive() {
        let m = OperandMatrix::new([[u16::MAX; 4]; 4]);
        let packed = pack_column(&m, 3).unwrap();
        assert_eq!(packed.data, u64::MAX);
        assert_eq!(unpack_data(packed.data), [u16::MAX; 4]);
    }
}
