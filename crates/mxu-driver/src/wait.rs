// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded, cancellable completion wait
//!
//! The done handshake is a busy-poll of the status register. Left unbounded,
//! a hung engine hangs the caller forever, so every wait runs under a
//! [`PollPolicy`] (timeout, poll cap, exponential backoff) and can be aborted
//! from another thread through a [`CancelToken`]. Time comes from a [`Clock`]
//! so tests can drive a "never completes" device without real delay.

use crate::error::{MxuError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Polling policy for the done bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Give up after this long; `None` waits forever
    pub timeout: Option<Duration>,
    /// Sleep after the first unsuccessful probe
    pub initial_backoff: Duration,
    /// Upper bound for the doubling backoff
    pub max_backoff: Duration,
    /// Give up after this many probes; `None` for no cap
    pub max_polls: Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(1)),
            initial_backoff: Duration::from_micros(1),
            max_backoff: Duration::from_millis(1),
            max_polls: None,
        }
    }
}

impl PollPolicy {
    /// Wait forever, the way bare-metal firmware spins on the done bit
    ///
    /// Only a [`CancelToken`] can end such a wait early.
    pub const fn unbounded() -> Self {
        Self {
            timeout: None,
            initial_backoff: Duration::from_micros(1),
            max_backoff: Duration::from_millis(1),
            max_polls: None,
        }
    }

    /// Same policy with a different timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Same policy with a poll cap
    #[must_use]
    pub const fn with_max_polls(mut self, max_polls: Option<u64>) -> Self {
        self.max_polls = max_polls;
        self
    }
}

/// Time source for waits
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;

    /// Block for `d`
    fn sleep(&self, d: Duration);
}

/// Wall clock backed by `Instant` and `thread::sleep`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Virtual clock: `sleep` advances time instantly
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without sleeping
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now = now.saturating_add(d);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// Shared flag that aborts a wait in progress
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Withdraw a cancellation request so later waits run again
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Statistics of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOutcome {
    /// Probes issued, including the successful one
    pub polls: u64,
    /// Time spent waiting
    pub elapsed: Duration,
}

/// Probe until it returns `true`, under `policy`
///
/// The cancel token is checked before every probe. Backoff starts at
/// `initial_backoff` and doubles up to `max_backoff`; a sleep never runs
/// past the timeout deadline.
///
/// # Errors
///
/// Returns `Cancelled`, `Timeout`, or the first error from `probe`.
pub fn wait_until<C, F>(
    policy: &PollPolicy,
    clock: &C,
    cancel: &CancelToken,
    mut probe: F,
) -> Result<WaitOutcome>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<bool>,
{
    let start = clock.now();
    let mut polls = 0u64;
    let mut backoff = policy.initial_backoff;

    loop {
        if cancel.is_cancelled() {
            warn!("Wait cancelled after {polls} polls");
            return Err(MxuError::Cancelled { polls });
        }

        polls += 1;
        if probe()? {
            let elapsed = clock.now().saturating_sub(start);
            trace!("Condition met after {polls} polls in {elapsed:?}");
            return Ok(WaitOutcome { polls, elapsed });
        }

        let elapsed = clock.now().saturating_sub(start);
        let timed_out = policy.timeout.is_some_and(|t| elapsed >= t);
        let capped = policy.max_polls.is_some_and(|m| polls >= m);
        if timed_out || capped {
            #[allow(clippy::cast_possible_truncation)]
            let elapsed_ms = elapsed.as_millis() as u64;
            warn!("Timeout after {polls} polls ({elapsed_ms}ms)");
            return Err(MxuError::Timeout { elapsed_ms, polls });
        }

        let nap = match policy.timeout {
            Some(t) => backoff.min(t.saturating_sub(elapsed)),
            None => backoff,
        };
        clock.sleep(nap);
        backoff = backoff.saturating_mul(2).min(policy.max_backoff);
    }
}
