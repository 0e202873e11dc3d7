// SPDX-License-Identifier: AGPL-3.0-only

//! Register interface abstraction
//!
//! The controller never touches raw addresses. It talks to a
//! [`RegisterInterface`], which is either the real memory-mapped window
//! or a software model of the accelerator.

use crate::config::DriverConfig;
use crate::error::{MxuError, Result};
use mxu_chip::{Access, RegWidth, Register};
use std::fmt::Debug;

/// Typed access to the accelerator's register window
///
/// Implementations must reject accesses whose width or direction does not
/// match [`Register::width`] / [`Register::access`]; see [`check_access`].
pub trait RegisterInterface: Debug + Send {
    /// Read a 32-bit register
    ///
    /// # Errors
    ///
    /// Returns `RegisterAccess` if the register is not a readable 32-bit register.
    fn read_u32(&mut self, reg: Register) -> Result<u32>;

    /// Write a 32-bit register
    ///
    /// # Errors
    ///
    /// Returns `RegisterAccess` if the register is not a writable 32-bit register.
    fn write_u32(&mut self, reg: Register, value: u32) -> Result<()>;

    /// Read a 64-bit register
    ///
    /// # Errors
    ///
    /// Returns `RegisterAccess` if the register is not a readable 64-bit register.
    fn read_u64(&mut self, reg: Register) -> Result<u64>;

    /// Write a 64-bit register
    ///
    /// # Errors
    ///
    /// Returns `RegisterAccess` if the register is not a writable 64-bit register.
    fn write_u64(&mut self, reg: Register, value: u64) -> Result<()>;

    /// Get backend type for debugging
    fn backend_type(&self) -> BackendType;
}

impl<T: RegisterInterface + ?Sized> RegisterInterface for Box<T> {
    fn read_u32(&mut self, reg: Register) -> Result<u32> {
        (**self).read_u32(reg)
    }

    fn write_u32(&mut self, reg: Register, value: u32) -> Result<()> {
        (**self).write_u32(reg, value)
    }

    fn read_u64(&mut self, reg: Register) -> Result<u64> {
        (**self).read_u64(reg)
    }

    fn write_u64(&mut self, reg: Register, value: u64) -> Result<()> {
        (**self).write_u64(reg, value)
    }

    fn backend_type(&self) -> BackendType {
        (**self).backend_type()
    }
}

/// Validate an access against the register map
///
/// # Errors
///
/// Returns `RegisterAccess` on a width or direction mismatch.
pub fn check_access(reg: Register, width: RegWidth, access: Access) -> Result<()> {
    if reg.width() != width {
        return Err(MxuError::register_access(
            reg,
            format!(
                "{}-bit access to {}-bit register",
                width.bits(),
                reg.width().bits()
            ),
        ));
    }
    if reg.access() != access {
        let verb = match access {
            Access::Read => "read from write-only",
            Access::Write => "write to read-only",
        };
        return Err(MxuError::register_access(reg, format!("{verb} register")));
    }
    Ok(())
}

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Memory-mapped register window on real hardware
    Mmio,

    /// Software model of the accelerator, no hardware required
    Simulated,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mmio => write!(f, "MMIO"),
            Self::Simulated => write!(f, "Simulated"),
        }
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSelection {
    /// Map the physical register window
    Mmio,

    /// Use the software model (CI, bring-up without a bitstream)
    Simulated,
}

/// Open the selected backend
///
/// # Errors
///
/// Returns error if the backend cannot be initialized (device file
/// missing, mapping refused).
pub fn select_backend(
    selection: BackendSelection,
    config: &DriverConfig,
) -> Result<Box<dyn RegisterInterface>> {
    use crate::backends::{MmioBackend, SimulatedAccelerator};

    match selection {
        BackendSelection::Mmio => {
            tracing::info!(
                "Using MMIO backend: {} @ {:#x}",
                config.device_path.display(),
                config.base_address
            );
            MmioBackend::open(&config.device_path, config.base_address)
                .map(|b| Box::new(b) as Box<dyn RegisterInterface>)
        }

        BackendSelection::Simulated => {
            tracing::info!(
                "Using simulated backend (done after {} status polls)",
                config.completion_latency
            );
            Ok(Box::new(SimulatedAccelerator::with_latency(
                config.completion_latency,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_access_accepts_map() {
        for reg in Register::ALL {
            assert!(check_access(reg, reg.width(), reg.access()).is_ok(), "{reg}");
        }
    }

    #[test]
    fn check_access_rejects_width_mismatch() {
        let err = check_access(Register::CAddr, RegWidth::W64, Access::Write).unwrap_err();
        assert!(err.to_string().contains("64-bit access to 32-bit register"));
    }

    #[test]
    fn check_access_rejects_direction_mismatch() {
        assert!(matches!(
            check_access(Register::Status, RegWidth::W64, Access::Write),
            Err(MxuError::RegisterAccess { .. })
        ));
        assert!(matches!(
            check_access(Register::AData, RegWidth::W64, Access::Read),
            Err(MxuError::RegisterAccess { .. })
        ));
    }

    #[test]
    fn select_simulated_backend() {
        let backend = select_backend(BackendSelection::Simulated, &DriverConfig::default()).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Simulated);
    }

    #[test]
    fn select_mmio_without_device_fails() {
        let config = DriverConfig {
            device_path: "/nonexistent/mxu-mem".into(),
            ..DriverConfig::default()
        };
        assert!(matches!(
            select_backend(BackendSelection::Mmio, &config),
            Err(MxuError::DeviceNotFound { .. })
        ));
    }
}
