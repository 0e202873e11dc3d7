// SPDX-License-Identifier: AGPL-3.0-only

//! Sample operands used by the bring-up firmware
//!
//! `A × B` has a hand-checkable first element:
//! `1*16 + 2*12 + 3*8 + 4*4 = 80`.

use crate::matrix::OperandMatrix;

/// Sample operand A
pub const fn matrix_a() -> OperandMatrix {
    OperandMatrix::new([
        [1, 2, 3, 4],
        [5, 6, 7, 8],
        [9, 10, 11, 12],
        [13, 14, 15, 16],
    ])
}

/// Sample operand B
pub const fn matrix_b() -> OperandMatrix {
    OperandMatrix::new([
        [16, 15, 14, 13],
        [12, 11, 10, 9],
        [8, 7, 6, 5],
        [4, 3, 2, 1],
    ])
}
