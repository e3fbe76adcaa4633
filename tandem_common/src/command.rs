//! Execution command returned by every fault-processing entry point.
//!
//! The scheduler obeys the command returned from `process_errors` once per
//! task cycle. The fault core never terminates a task itself — it only
//! reports the command the lifecycle callbacks decided on.

use static_assertions::const_assert_eq;

/// Tri-state command obeyed by the scheduler after each fault-processing
/// call. No other value is ever produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ExecutionCommand {
    /// Continue with the next work cycle.
    #[default]
    Continue = 0,
    /// Finish the current cycle and stop scheduling further cycles.
    Stop = 1,
    /// Terminal: the issuing task will not run further cycles.
    Abort = 2,
}

const_assert_eq!(core::mem::size_of::<ExecutionCommand>(), 1);

impl ExecutionCommand {
    /// True for Stop and Abort — the task leaves the run rotation.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stop | Self::Abort)
    }

    /// Merge two commands, keeping the more severe one.
    #[inline]
    pub const fn escalate(self, other: Self) -> Self {
        if (other as u8) > (self as u8) { other } else { self }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
