// SPDX-License-Identifier: AGPL-3.0-only

//! Driver configuration
//!
//! Resolution order: explicit values set by the caller (CLI flags), then
//! environment variables, then defaults.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `MXU_BASE_ADDR` | Physical base of the register window (`0x…` or decimal) |
//! | `MXU_DEVICE_PATH` | Memory device file, default `/dev/mem` |
//! | `MXU_POLL_TIMEOUT_MS` | Done-bit timeout in ms, `0` waits forever |

use crate::error::{MxuError, Result};
use crate::matrix::parse_u64;
use crate::wait::PollPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable for the register window base address
pub const ENV_BASE_ADDR: &str = "MXU_BASE_ADDR";
/// Environment variable for the memory device file
pub const ENV_DEVICE_PATH: &str = "MXU_DEVICE_PATH";
/// Environment variable for the poll timeout in milliseconds
pub const ENV_POLL_TIMEOUT_MS: &str = "MXU_POLL_TIMEOUT_MS";

/// Default memory device file
pub const DEFAULT_DEVICE_PATH: &str = "/dev/mem";

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Physical base address of the register window
    pub base_address: u64,

    /// Memory device file used by the MMIO backend
    pub device_path: PathBuf,

    /// Done-bit polling policy
    pub poll: PollPolicy,

    /// Status reads before the simulated backend reports done
    pub completion_latency: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_address: 0,
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            poll: PollPolicy::default(),
            completion_latency: 4,
        }
    }
}

impl DriverConfig {
    /// Defaults overridden by `MXU_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns `Parse` if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`
    ///
    /// Separated from [`from_env`](Self::from_env) so tests don't mutate the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if a value is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(base) = lookup(ENV_BASE_ADDR) {
            config.base_address = parse_u64(&base)
                .map_err(|reason| MxuError::parse(0, format!("{ENV_BASE_ADDR}: {reason}")))?;
        }

        if let Some(path) = lookup(ENV_DEVICE_PATH) {
            config.device_path = PathBuf::from(path);
        }

        if let Some(ms) = lookup(ENV_POLL_TIMEOUT_MS) {
            let ms = parse_u64(&ms)
                .map_err(|reason| MxuError::parse(0, format!("{ENV_POLL_TIMEOUT_MS}: {reason}")))?;
            config.poll = config.poll.with_timeout(timeout_from_ms(ms));
        }

        tracing::debug!(
            "Driver config: base={:#x} device={} timeout={:?}",
            config.base_address,
            config.device_path.display(),
            config.poll.timeout
        );

        Ok(config)
    }
}

/// Millisecond timeout, `0` meaning unbounded
pub const fn timeout_from_ms(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = DriverConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, DriverConfig::default());
        assert_eq!(config.device_path, PathBuf::from("/dev/mem"));
        assert_eq!(config.poll.timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn env_overrides() {
        let config = DriverConfig::from_lookup(lookup(&[
            (ENV_BASE_ADDR, "0xFF200000"),
            (ENV_DEVICE_PATH, "/dev/uio0"),
            (ENV_POLL_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.base_address, 0xFF20_0000);
        assert_eq!(config.device_path, PathBuf::from("/dev/uio0"));
        assert_eq!(config.poll.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn zero_timeout_is_unbounded() {
        let config = DriverConfig::from_lookup(lookup(&[(ENV_POLL_TIMEOUT_MS, "0")])).unwrap();
        assert_eq!(config.poll.timeout, None);
    }

    #[test]
    fn decimal_base_address() {
        let config = DriverConfig::from_lookup(lookup(&[(ENV_BASE_ADDR, "4096")])).unwrap();
        assert_eq!(config.base_address, 0x1000);
    }

    #[test]
    fn malformed_values_rejected() {
        assert!(matches!(
            DriverConfig::from_lookup(lookup(&[(ENV_BASE_ADDR, "0xZZ")])),
            Err(MxuError::Parse { .. })
        ));
        assert!(matches!(
            DriverConfig::from_lookup(lookup(&[(ENV_POLL_TIMEOUT_MS, "soon")])),
            Err(MxuError::Parse { .. })
        ));
    }
}
