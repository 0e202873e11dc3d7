// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for accelerator driver operations

use mxu_chip::Register;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, MxuError>;

/// Matrix axis an index refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Row index
    Row,
    /// Column index
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row => write!(f, "row"),
            Self::Column => write!(f, "column"),
        }
    }
}

/// Errors that can occur while driving the accelerator
#[derive(Debug, Error)]
pub enum MxuError {
    /// Row or column index outside the fixed matrix dimension
    #[error("Invalid {axis} index {index} (must be < {limit})")]
    InvalidIndex {
        /// Axis the index addresses
        axis: Axis,
        /// Requested index
        index: usize,
        /// Exclusive upper bound
        limit: usize,
    },

    /// Value does not fit its bit field
    #[error("Value {value:#x} out of range for {field} (max {max:#x})")]
    OutOfRange {
        /// Field being encoded
        field: &'static str,
        /// Offending value
        value: u64,
        /// Largest value the field holds
        max: u64,
    },

    /// Done bit not observed within the poll policy
    #[error("Operation timeout after {elapsed_ms}ms ({polls} status polls)")]
    Timeout {
        /// Time waited in milliseconds
        elapsed_ms: u64,
        /// Status reads issued
        polls: u64,
    },

    /// Wait aborted through a cancel token
    #[error("Wait cancelled after {polls} status polls")]
    Cancelled {
        /// Status reads issued before cancellation
        polls: u64,
    },

    /// Controller operation called out of sequence
    #[error("Controller in invalid state: {state}")]
    InvalidState {
        /// Current state description
        state: String,
    },

    /// Register accessed with the wrong width or direction, or outside the window
    #[error("Register access rejected for {register}: {reason}")]
    RegisterAccess {
        /// Register name
        register: String,
        /// Reason for rejection
        reason: String,
    },

    /// Memory device file not found
    #[error("Device not found: {path}")]
    DeviceNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// Mapping the register window failed
    #[error("Failed to map register window: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// Malformed matrix text or configuration value
    #[error("Parse error at line {line}: {reason}")]
    Parse {
        /// 1-based line number (0 for single values)
        line: usize,
        /// Reason for failure
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl MxuError {
    /// Create an invalid index error
    pub const fn invalid_index(axis: Axis, index: usize, limit: usize) -> Self {
        Self::InvalidIndex { axis, index, limit }
    }

    /// Create an out of range error
    pub const fn out_of_range(field: &'static str, value: u64, max: u64) -> Self {
        Self::OutOfRange { field, value, max }
    }

    /// Create an invalid state error
    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Create a register access error
    pub fn register_access(register: Register, reason: impl Into<String>) -> Self {
        Self::RegisterAccess {
            register: register.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a map failed error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// Create a device not found error
    pub fn device_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DeviceNotFound { path: path.into() }
    }

    /// Create a parse error
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }
}
