// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-size operand and result matrices
//!
//! The accelerator only multiplies 4×4 matrices, so storage is a plain
//! `[[T; 4]; 4]` and the element type carries the field width: operands
//! are `u16` (one 16-bit bank slot), results are `u32` (one C-Data read).

use crate::error::{MxuError, Result};
use mxu_chip::geometry::DIM;
use std::fmt;
use std::path::Path;

/// Row-major 4×4 matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Matrix<T> {
    rows: [[T; DIM]; DIM],
}

/// Operand matrix (A or B), 16-bit elements
pub type OperandMatrix = Matrix<u16>;

/// Result matrix (C), 32-bit elements produced by the device
pub type ResultMatrix = Matrix<u32>;

impl<T: Copy> Matrix<T> {
    /// Create from row-major storage
    pub const fn new(rows: [[T; DIM]; DIM]) -> Self {
        Self { rows }
    }

    /// Element at `(row, col)`, `None` if either index is out of range
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        self.rows.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Row-major storage
    pub const fn rows(&self) -> &[[T; DIM]; DIM] {
        &self.rows
    }

    /// Copy of one column
    ///
    /// # Panics
    ///
    /// Panics if `col >= 4`.
    pub fn column(&self, col: usize) -> [T; DIM] {
        std::array::from_fn(|row| self.rows[row][col])
    }

    /// Transposed copy
    #[must_use]
    pub fn transpose(&self) -> Self {
        Self {
            rows: std::array::from_fn(|row| self.column(row)),
        }
    }

    /// Iterate `(row, col, value)` in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(r, row)| row.iter().enumerate().map(move |(c, &v)| (r, c, v)))
    }
}

impl OperandMatrix {
    /// Build from wider integers, rejecting anything that does not fit 16 bits
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for the first element above `u16::MAX`.
    pub fn try_from_wide(rows: &[[u64; DIM]; DIM]) -> Result<Self> {
        let mut out = [[0u16; DIM]; DIM];
        for (r, row) in rows.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                out[r][c] = u16::try_from(v).map_err(|_| {
                    MxuError::out_of_range("operand element", v, u64::from(u16::MAX))
                })?;
            }
        }
        Ok(Self::new(out))
    }

    /// Parse four lines of four integers separated by whitespace or commas
    ///
    /// Blank lines and lines starting with `#` are skipped. Hex values with
    /// a `0x` prefix are accepted.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the text is not exactly 4×4 integers, or
    /// `OutOfRange` if an element does not fit 16 bits.
    pub fn parse(text: &str) -> Result<Self> {
        let mut wide = [[0u64; DIM]; DIM];
        let mut row = 0;

        for (lineno, line) in text.lines().enumerate().map(|(i, l)| (i + 1, l.trim())) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if row == DIM {
                return Err(MxuError::parse(lineno, format!("more than {DIM} rows")));
            }

            let fields: Vec<&str> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            if fields.len() != DIM {
                return Err(MxuError::parse(
                    lineno,
                    format!("expected {DIM} values, found {}", fields.len()),
                ));
            }

            for (col, field) in fields.iter().enumerate() {
                wide[row][col] = parse_u64(field).map_err(|reason| MxuError::parse(lineno, reason))?;
            }
            row += 1;
        }

        if row != DIM {
            return Err(MxuError::parse(0, format!("expected {DIM} rows, found {row}")));
        }

        Self::try_from_wide(&wide)
    }

    /// Read and parse a matrix file (see [`OperandMatrix::parse`])
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as `parse`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer
pub(crate) fn parse_u64(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid integer {s:?}: {e}"))
}

/// CPU reference product with the device's 32-bit wrapping accumulation
///
/// Used as ground truth when validating a hardware or simulated run.
pub fn reference_product(a: &OperandMatrix, b: &OperandMatrix) -> ResultMatrix {
    let rows = std::array::from_fn(|i| {
        std::array::from_fn(|j| {
            (0..DIM).fold(0u32, |acc, k| {
                acc.wrapping_add(u32::from(a.rows[i][k]) * u32::from(b.rows[k][j]))
            })
        })
    });
    ResultMatrix::new(rows)
}

impl fmt::Display for OperandMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            writeln!(f, "{:>6} {:>6} {:>6} {:>6}", row[0], row[1], row[2], row[3])?;
        }
        Ok(())
    }
}

impl fmt::Display for ResultMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (r, c, v) in self.iter() {
            writeln!(f, "C[{r}][{c}] = {v} (0x{v:X})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples;

    #[test]
    fn column_and_transpose() {
        let a = samples::matrix_a();
        assert_eq!(a.column(0), [1, 5, 9, 13]);
        assert_eq!(a.transpose().rows()[2], [3, 7, 11, 15]);
        assert_eq!(a.get(3, 3), Some(16));
        assert_eq!(a.get(4, 0), None);
    }

    #[test]
    fn reference_product_of_samples() {
        let c = reference_product(&samples::matrix_a(), &samples::matrix_b());
        assert_eq!(c.get(0, 0), Some(80));
        assert_eq!(c.rows()[0], [80, 70, 60, 50]);
        assert_eq!(c.rows()[3], [560, 502, 444, 386]);
    }

    #[test]
    fn reference_product_wraps_like_hardware() {
        let max = OperandMatrix::new([[u16::MAX; DIM]; DIM]);
        let c = reference_product(&max, &max);
        let expected = (u32::from(u16::MAX) * u32::from(u16::MAX)).wrapping_mul(4);
        assert_eq!(c.get(1, 2), Some(expected));
    }

    #[test]
    fn try_from_wide_rejects_17_bit_value() {
        let mut wide = [[1u64; DIM]; DIM];
        wide[2][1] = 0x1_0000;
        let err = OperandMatrix::try_from_wide(&wide).unwrap_err();
        assert!(matches!(err, MxuError::OutOfRange { value: 0x1_0000, max: 0xFFFF, .. }));
    }

    #[test]
    fn parse_accepts_commas_hex_and_comments() {
        let text = "# operand A\n1, 2, 3, 4\n5 6 7 8\n\n0x9 10 11 12\n13,14,15,0xffff\n";
        let m = OperandMatrix::parse(text).unwrap();
        assert_eq!(m.rows()[2][0], 9);
        assert_eq!(m.rows()[3][3], u16::MAX);
    }

    #[test]
    fn parse_rejects_wrong_shape() {
        assert!(matches!(
            OperandMatrix::parse("1 2 3\n5 6 7 8\n9 10 11 12\n13 14 15 16"),
            Err(MxuError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            OperandMatrix::parse("1 2 3 4\n5 6 7 8"),
            Err(MxuError::Parse { line: 0, .. })
        ));
        assert!(matches!(
            OperandMatrix::parse("1 2 3 4\n1 2 3 4\n1 2 3 4\n1 2 3 4\n1 2 3 4"),
            Err(MxuError::Parse { line: 5, .. })
        ));
    }

    #[test]
    fn parse_rejects_out_of_range() {
        let err = OperandMatrix::parse("1 2 3 4\n5 6 7 8\n9 10 11 12\n13 14 15 70000").unwrap_err();
        assert!(matches!(err, MxuError::OutOfRange { value: 70000, .. }));
    }

    #[test]
    fn from_file_reads_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        std::fs::write(&path, "16 15 14 13\n12 11 10 9\n8 7 6 5\n4 3 2 1\n").unwrap();
        assert_eq!(OperandMatrix::from_file(&path).unwrap(), samples::matrix_b());
    }

    #[test]
    fn result_display_is_decimal_and_hex() {
        let c = reference_product(&samples::matrix_a(), &samples::matrix_b());
        let text = c.to_string();
        assert!(text.starts_with("C[0][0] = 80 (0x50)\n"));
        assert!(text.contains("C[3][0] = 560 (0x230)"));
        assert_eq!(text.lines().count(), 16);
    }
}
