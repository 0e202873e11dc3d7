// SPDX-License-Identifier: AGPL-3.0-only

//! Device controller: load → trigger → poll → read back
//!
//! ```text
//! Idle ─load_a→ LoadingA ─load_b→ LoadingB ─trigger→ Triggered
//!   ─wait_done→ Polling ─done→ ReadingResults ─read_results→ Done
//!
//! any device error → Failed (until reset)
//! ```
//!
//! Operand A goes in one column per A_ADDR/A_DATA pair, operand B one row
//! per B_ADDR/B_DATA pair. Results come back one 32-bit element per
//! C_ADDR write + C_DATA read, row-major. Nothing is retried: a register
//! access either succeeds or fails the run. The only unbounded step in the
//! raw protocol, the done-bit poll, runs under the configured [`PollPolicy`].

use crate::backend::RegisterInterface;
use crate::config::DriverConfig;
use crate::error::{Axis, MxuError, Result};
use crate::matrix::{OperandMatrix, ResultMatrix};
use crate::pack::{pack_column, pack_row, PackedWrite};
use crate::wait::{wait_until, CancelToken, Clock, PollPolicy, SystemClock, WaitOutcome};
use mxu_chip::geometry::DIM;
use mxu_chip::regs::{control, status};
use mxu_chip::Register;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

const ALL_LOADED: u8 = (1 << DIM) - 1;

/// Position in the load/trigger/poll/read sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Nothing loaded
    Idle,
    /// Operand A columns being written
    LoadingA,
    /// Operand B rows being written
    LoadingB,
    /// Start command written
    Triggered,
    /// Waiting for the done bit
    Polling,
    /// Done bit seen, results readable
    ReadingResults,
    /// Full result matrix collected
    Done,
    /// A device access or the wait failed; only `reset` is accepted
    Failed,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LoadingA => "loading A",
            Self::LoadingB => "loading B",
            Self::Triggered => "triggered",
            Self::Polling => "polling",
            Self::ReadingResults => "reading results",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a full [`Controller::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Product read back from the device
    pub result: ResultMatrix,
    /// Status reads until done
    pub polls: u64,
    /// Time spent waiting for done
    pub wait: Duration,
    /// Register writes issued
    pub register_writes: u64,
    /// Register reads issued
    pub register_reads: u64,
    /// Time for the whole sequence
    pub total: Duration,
}

/// Drives one accelerator through its register interface
///
/// The controller owns the interface for its lifetime, so no other code
/// can interleave accesses with a run in progress.
#[derive(Debug)]
pub struct Controller<R: RegisterInterface, C: Clock = SystemClock> {
    regs: R,
    clock: C,
    poll: PollPolicy,
    cancel: CancelToken,
    state: ControllerState,
    a_columns: u8,
    b_rows: u8,
    writes: u64,
    reads: u64,
}

impl<R: RegisterInterface> Controller<R> {
    /// Controller on the wall clock, polling per `config.poll`
    pub fn new(regs: R, config: &DriverConfig) -> Self {
        Self::with_clock(regs, config.poll, SystemClock::default())
    }
}

impl<R: RegisterInterface, C: Clock> Controller<R, C> {
    /// Controller with an explicit poll policy and time source
    pub fn with_clock(regs: R, poll: PollPolicy, clock: C) -> Self {
        info!("Creating controller on {} backend", regs.backend_type());
        Self {
            regs,
            clock,
            poll,
            cancel: CancelToken::new(),
            state: ControllerState::Idle,
            a_columns: 0,
            b_rows: 0,
            writes: 0,
            reads: 0,
        }
    }

    /// Use `cancel` to abort completion waits
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the current or next completion wait
    ///
    /// A cancellation stays in effect until [`reset`](Self::reset).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current sequence state
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    /// Register interface
    pub const fn registers(&self) -> &R {
        &self.regs
    }

    /// Release the register interface
    pub fn into_inner(self) -> R {
        self.regs
    }

    /// Forget loaded operands, errors and any pending cancellation, and
    /// return to `Idle`
    ///
    /// Touches no registers: the IP block has no reset command, and the
    /// next load overwrites every BRAM element.
    pub fn reset(&mut self) {
        debug!("Controller reset from {}", self.state);
        self.cancel.reset();
        self.clear_sequence();
    }

    fn clear_sequence(&mut self) {
        self.state = ControllerState::Idle;
        self.a_columns = 0;
        self.b_rows = 0;
    }

    // ── Operand load ─────────────────────────────────────────────────────────

    /// Load all four columns of operand A
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if called mid-sequence, or the first register error.
    pub fn load_a(&mut self, a: &OperandMatrix) -> Result<()> {
        info!("Loading operand A");
        for col in 0..DIM {
            self.load_a_column(a, col)?;
        }
        Ok(())
    }

    /// Load one column of operand A through A_ADDR/A_DATA
    ///
    /// An out-of-range column is reported and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` for `col >= 4`, `InvalidState` if called
    /// mid-sequence, or the register error.
    pub fn load_a_column(&mut self, a: &OperandMatrix, col: usize) -> Result<()> {
        self.expect_state(
            &[
                ControllerState::Idle,
                ControllerState::LoadingA,
                ControllerState::Done,
            ],
            "load operand A",
        )?;
        let packed = pack_column(a, col)?;

        if self.state != ControllerState::LoadingA {
            self.a_columns = 0;
            self.b_rows = 0;
            self.state = ControllerState::LoadingA;
        }

        debug!(
            "A column {col}: address={} ({:#x}) data={} ({:#x})",
            packed.address, packed.address, packed.data, packed.data
        );
        self.write_pair(Register::AAddr, Register::AData, packed)?;
        self.a_columns |= 1 << col;
        Ok(())
    }

    /// Load all four rows of operand B
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless operand A is fully loaded, or the first
    /// register error.
    pub fn load_b(&mut self, b: &OperandMatrix) -> Result<()> {
        info!("Loading operand B");
        for row in 0..DIM {
            self.load_b_row(b, row)?;
        }
        Ok(())
    }

    /// Load one row of operand B through B_ADDR/B_DATA
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` for `row >= 4`, `InvalidState` unless operand
    /// A is fully loaded, or the register error.
    pub fn load_b_row(&mut self, b: &OperandMatrix, row: usize) -> Result<()> {
        let a_complete = self.state == ControllerState::LoadingA && self.a_columns == ALL_LOADED;
        if !a_complete && self.state != ControllerState::LoadingB {
            return Err(self.out_of_sequence("load operand B"));
        }
        let packed = pack_row(b, row)?;

        self.state = ControllerState::LoadingB;
        debug!(
            "B row {row}: address={} ({:#x}) data={} ({:#x})",
            packed.address, packed.address, packed.data, packed.data
        );
        self.write_pair(Register::BAddr, Register::BData, packed)?;
        self.b_rows |= 1 << row;
        Ok(())
    }

    // ── Trigger and completion ───────────────────────────────────────────────

    /// Write the start command to CONTROL
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless both operands are fully loaded, or the
    /// register error.
    pub fn trigger(&mut self) -> Result<()> {
        if self.state != ControllerState::LoadingB || self.b_rows != ALL_LOADED {
            return Err(self.out_of_sequence("trigger"));
        }
        info!("Starting multiplication");
        self.write64(Register::Control, control::START_COMMAND)?;
        self.state = ControllerState::Triggered;
        Ok(())
    }

    /// Poll STATUS until the done bit is set
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` unless triggered, `Timeout`/`Cancelled` per the
    /// poll policy, or the register error. The controller is `Failed` after
    /// any error except `InvalidState`.
    pub fn wait_done(&mut self) -> Result<WaitOutcome> {
        if self.state != ControllerState::Triggered {
            return Err(self.out_of_sequence("wait for completion"));
        }
        info!("Waiting for multiplication to finish");
        self.state = ControllerState::Polling;

        let Self {
            regs,
            clock,
            poll,
            cancel,
            reads,
            ..
        } = self;
        let outcome = wait_until(poll, clock, cancel, || {
            *reads += 1;
            Ok(regs.read_u64(Register::Status)? & status::DONE != 0)
        });

        match outcome {
            Ok(outcome) => {
                info!(
                    "Multiplication finished after {} polls ({:?})",
                    outcome.polls, outcome.elapsed
                );
                self.state = ControllerState::ReadingResults;
                Ok(outcome)
            }
            Err(e) => {
                self.state = ControllerState::Failed;
                Err(e)
            }
        }
    }

    // ── Result readback ──────────────────────────────────────────────────────

    /// Read one result element: write `row * 4 + col` to C_ADDR, read C_DATA
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` for coordinates outside 4×4, `InvalidState`
    /// before completion, or the register error.
    pub fn read_element(&mut self, row: usize, col: usize) -> Result<u32> {
        self.expect_state(
            &[ControllerState::ReadingResults, ControllerState::Done],
            "read results",
        )?;
        if row >= DIM {
            warn!("Result row {row} out of bounds");
            return Err(MxuError::invalid_index(Axis::Row, row, DIM));
        }
        if col >= DIM {
            warn!("Result column {col} out of bounds");
            return Err(MxuError::invalid_index(Axis::Column, col, DIM));
        }

        #[allow(clippy::cast_possible_truncation)] // < 16
        let index = (row * DIM + col) as u32;
        self.write32(Register::CAddr, index)?;
        let value = self.read32(Register::CData)?;
        debug!("C[{row}][{col}] = {value} ({value:#x})");
        Ok(value)
    }

    /// Read all 16 result elements, row-major
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` before completion, or the first register error.
    pub fn read_results(&mut self) -> Result<ResultMatrix> {
        self.expect_state(
            &[ControllerState::ReadingResults, ControllerState::Done],
            "read results",
        )?;
        info!("Reading results from C BRAM");

        let mut rows = [[0u32; DIM]; DIM];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, slot) in row.iter_mut().enumerate() {
                *slot = self.read_element(r, c)?;
            }
        }

        self.state = ControllerState::Done;
        Ok(ResultMatrix::new(rows))
    }

    // ── Whole sequence ───────────────────────────────────────────────────────

    /// Load `a` and `b`, start, wait, and read back `a × b`
    ///
    /// Starts from `Idle` or `Done`. Register and timing counters in the
    /// report cover this run only.
    ///
    /// # Errors
    ///
    /// Returns the first error from any step.
    pub fn run(&mut self, a: &OperandMatrix, b: &OperandMatrix) -> Result<RunReport> {
        self.expect_state(&[ControllerState::Idle, ControllerState::Done], "run")?;
        self.clear_sequence();

        let start = self.clock.now();
        let (writes0, reads0) = (self.writes, self.reads);

        self.load_a(a)?;
        self.load_b(b)?;
        self.trigger()?;
        let waited = self.wait_done()?;
        let result = self.read_results()?;

        let total = self.clock.now().saturating_sub(start);
        info!("Run complete in {total:?}");

        Ok(RunReport {
            result,
            polls: waited.polls,
            wait: waited.elapsed,
            register_writes: self.writes - writes0,
            register_reads: self.reads - reads0,
            total,
        })
    }

    // ── Register helpers ─────────────────────────────────────────────────────

    fn write_pair(&mut self, addr: Register, data: Register, packed: PackedWrite) -> Result<()> {
        self.write64(addr, packed.address)?;
        self.write64(data, packed.data)
    }

    fn write64(&mut self, reg: Register, value: u64) -> Result<()> {
        self.writes += 1;
        self.regs.write_u64(reg, value).inspect_err(|_| self.state = ControllerState::Failed)
    }

    fn write32(&mut self, reg: Register, value: u32) -> Result<()> {
        self.writes += 1;
        self.regs.write_u32(reg, value).inspect_err(|_| self.state = ControllerState::Failed)
    }

    fn read32(&mut self, reg: Register) -> Result<u32> {
        self.reads += 1;
        self.regs.read_u32(reg).inspect_err(|_| self.state = ControllerState::Failed)
    }

    fn expect_state(&self, allowed: &[ControllerState], action: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.out_of_sequence(action))
        }
    }

    fn out_of_sequence(&self, action: &str) -> MxuError {
        warn!("Cannot {action} while {}", self.state);
        MxuError::invalid_state(format!("cannot {action} while {}", self.state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{RegisterAccess, SimulatedAccelerator};
    use crate::matrix::reference_product;
    use crate::samples;
    use crate::wait::ManualClock;

    fn sim_controller(latency: u32) -> Controller<SimulatedAccelerator, ManualClock> {
        Controller::with_clock(
            SimulatedAccelerator::with_latency(latency),
            PollPolicy::default(),
            ManualClock::new(),
        )
    }

    #[test]
    fn load_a_fills_banks_by_row() {
        let mut ctl = sim_controller(1);
        let a = samples::matrix_a();
        ctl.load_a(&a).unwrap();
        assert_eq!(ctl.state(), ControllerState::LoadingA);
        assert_eq!(ctl.registers().a_banks(), a.rows());
    }

    #[test]
    fn load_b_fills_banks_by_column() {
        let mut ctl = sim_controller(1);
        let b = samples::matrix_b();
        ctl.load_a(&samples::matrix_a()).unwrap();
        ctl.load_b(&b).unwrap();
        assert_eq!(ctl.registers().b_banks(), b.transpose().rows());
    }

    #[test]
    fn column_writes_are_address_then_data() {
        let mut ctl = sim_controller(1);
        ctl.load_a_column(&samples::matrix_a(), 0).unwrap();
        assert_eq!(
            ctl.registers().writes(),
            vec![
                RegisterAccess::Write { reg: Register::AAddr, value: 0xC840 },
                RegisterAccess::Write {
                    reg: Register::AData,
                    value: 1 | (5 << 16) | (9 << 32) | (13 << 48),
                },
            ]
        );
    }

    #[test]
    fn invalid_column_writes_nothing() {
        let mut ctl = sim_controller(1);
        let err = ctl.load_a_column(&samples::matrix_a(), 4).unwrap_err();
        assert!(matches!(err, MxuError::InvalidIndex { axis: Axis::Column, index: 4, .. }));
        assert!(ctl.registers().access_log().is_empty());
        assert_eq!(ctl.state(), ControllerState::Idle);
    }

    #[test]
    fn invalid_row_writes_nothing() {
        let mut ctl = sim_controller(1);
        ctl.load_a(&samples::matrix_a()).unwrap();
        let before = ctl.registers().access_log().len();
        let err = ctl.load_b_row(&samples::matrix_b(), 9).unwrap_err();
        assert!(matches!(err, MxuError::InvalidIndex { axis: Axis::Row, index: 9, .. }));
        assert_eq!(ctl.registers().access_log().len(), before);
    }

    #[test]
    fn run_produces_reference_product() {
        let mut ctl = sim_controller(3);
        let (a, b) = (samples::matrix_a(), samples::matrix_b());
        let report = ctl.run(&a, &b).unwrap();
        assert_eq!(report.result.get(0, 0), Some(80));
        assert_eq!(report.result, reference_product(&a, &b));
        assert_eq!(report.polls, 3);
        // 4 A pairs + 4 B pairs + start + 16 C addresses
        assert_eq!(report.register_writes, 8 + 8 + 1 + 16);
        assert_eq!(report.register_reads, 3 + 16);
        assert_eq!(ctl.state(), ControllerState::Done);
    }

    #[test]
    fn trigger_before_load_is_rejected() {
        let mut ctl = sim_controller(1);
        assert!(matches!(ctl.trigger(), Err(MxuError::InvalidState { .. })));
        ctl.load_a(&samples::matrix_a()).unwrap();
        ctl.load_b_row(&samples::matrix_b(), 0).unwrap();
        assert!(matches!(ctl.trigger(), Err(MxuError::InvalidState { .. })));
        assert_eq!(ctl.registers().starts(), 0);
    }

    #[test]
    fn load_b_before_a_is_rejected() {
        let mut ctl = sim_controller(1);
        let err = ctl.load_b(&samples::matrix_b()).unwrap_err();
        assert!(matches!(err, MxuError::InvalidState { .. }));
        assert!(ctl.registers().access_log().is_empty());
    }

    #[test]
    fn read_before_done_is_rejected() {
        let mut ctl = sim_controller(1);
        assert!(matches!(ctl.read_results(), Err(MxuError::InvalidState { .. })));
        assert!(matches!(ctl.read_element(0, 0), Err(MxuError::InvalidState { .. })));
        assert!(ctl.registers().access_log().is_empty());
    }

    #[test]
    fn read_element_bounds() {
        let mut ctl = sim_controller(1);
        ctl.run(&samples::matrix_a(), &samples::matrix_b()).unwrap();
        assert_eq!(ctl.read_element(3, 3).unwrap(), 386);
        assert!(matches!(
            ctl.read_element(0, 4),
            Err(MxuError::InvalidIndex { axis: Axis::Column, .. })
        ));
        assert!(matches!(
            ctl.read_element(4, 0),
            Err(MxuError::InvalidIndex { axis: Axis::Row, .. })
        ));
    }

    #[test]
    fn hung_device_times_out_and_fails() {
        let clock = ManualClock::new();
        let policy = PollPolicy::default().with_timeout(Some(Duration::from_millis(10)));
        let mut ctl = Controller::with_clock(SimulatedAccelerator::hung(), policy, clock.clone());

        let err = ctl.run(&samples::matrix_a(), &samples::matrix_b()).unwrap_err();
        assert!(matches!(err, MxuError::Timeout { elapsed_ms: 10, .. }));
        assert_eq!(ctl.state(), ControllerState::Failed);
        assert_eq!(clock.now(), Duration::from_millis(10));

        assert!(matches!(
            ctl.run(&samples::matrix_a(), &samples::matrix_b()),
            Err(MxuError::InvalidState { .. })
        ));
        ctl.reset();
        assert_eq!(ctl.state(), ControllerState::Idle);
    }

    #[test]
    fn cancelled_wait() {
        let cancel = CancelToken::new();
        let mut ctl = Controller::with_clock(
            SimulatedAccelerator::hung(),
            PollPolicy::unbounded(),
            ManualClock::new(),
        )
        .with_cancel_token(cancel.clone());

        ctl.load_a(&samples::matrix_a()).unwrap();
        ctl.load_b(&samples::matrix_b()).unwrap();
        ctl.trigger().unwrap();
        cancel.cancel();
        assert!(matches!(ctl.wait_done(), Err(MxuError::Cancelled { polls: 0 })));
        assert_eq!(ctl.state(), ControllerState::Failed);
    }

    #[test]
    fn reset_clears_cancellation() {
        let mut ctl = sim_controller(3);
        let cancel = ctl.cancel_token();

        ctl.load_a(&samples::matrix_a()).unwrap();
        ctl.load_b(&samples::matrix_b()).unwrap();
        ctl.trigger().unwrap();
        cancel.cancel();
        assert!(matches!(ctl.wait_done(), Err(MxuError::Cancelled { polls: 0 })));
        assert_eq!(ctl.state(), ControllerState::Failed);

        ctl.reset();
        assert!(!cancel.is_cancelled());
        let report = ctl.run(&samples::matrix_a(), &samples::matrix_b()).unwrap();
        assert_eq!(report.result.get(0, 0), Some(80));
        assert_eq!(report.result.get(3, 3), Some(386));
    }

    #[test]
    fn cancel_before_run_aborts_its_wait() {
        let mut ctl = sim_controller(1);
        ctl.cancel_token().cancel();
        assert!(matches!(
            ctl.run(&samples::matrix_a(), &samples::matrix_b()),
            Err(MxuError::Cancelled { polls: 0 })
        ));
        assert_eq!(ctl.registers().starts(), 1);
    }

    #[test]
    fn run_twice_from_done() {
        let mut ctl = sim_controller(2);
        let first = ctl.run(&samples::matrix_a(), &samples::matrix_b()).unwrap();
        let second = ctl.run(&samples::matrix_b(), &samples::matrix_a()).unwrap();
        assert_eq!(first.result, reference_product(&samples::matrix_a(), &samples::matrix_b()));
        assert_eq!(second.result, reference_product(&samples::matrix_b(), &samples::matrix_a()));
        assert_eq!(second.register_writes, first.register_writes);
        assert_eq!(ctl.registers().starts(), 2);
    }
}
