//! Ordered severity classification for error records.
//!
//! Every [`crate::record::ErrorRecord`] carries exactly one [`Impact`] tag.
//! The enum derives a strict precedence relation (`Ord`) used for escalation
//! and duplicate-suppression decisions: a record may only displace a stored
//! record of strictly lower severity.
//!
//! One rule sits above the plain ordering: **fatal dominance**. Once a
//! fatal-tier record occupies a slot, no later record displaces it without
//! an explicit `force` — the first fatal wins, regardless of how the later
//! record compares on the raw scale.

use serde::{Deserialize, Serialize};

/// Severity tag attached to an error record, least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Impact {
    /// No impact on task execution; recorded for diagnostics only.
    #[default]
    None = 0,
    /// No impact, linked to a prior fatal record. Once released this record
    /// must never independently re-trigger escalation, and it is owned
    /// elsewhere — it must not be double-released.
    NoneLinkedFatal = 1,
    /// Task entered die mode.
    DieMode = 2,
    /// Task entered exception mode.
    ExceptionMode = 3,
    /// Fatal error.
    FatalError = 4,
    /// Fatal error caused by a command abort.
    FatalCommandAbort = 5,
    /// User-level error.
    UserError = 6,
}

impl Impact {
    /// True at or above the first "caused-by" tier.
    #[inline]
    pub const fn has_impact(&self) -> bool {
        (*self as u8) >= (Self::DieMode as u8)
    }

    /// True for the fatal tier proper (fatal / fatal-by-command-abort).
    ///
    /// Exception mode escalates through the same own-fatal path but does
    /// not invoke fatal dominance in slot replacement.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalError | Self::FatalCommandAbort)
    }

    /// True for records that are forbidden from re-triggering escalation.
    #[inline]
    pub const fn is_linked_to_fatal(&self) -> bool {
        matches!(self, Self::NoneLinkedFatal)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_is_strictly_increasing() {
        let scale = [
            Impact::None,
            Impact::NoneLinkedFatal,
            Impact::DieMode,
            Impact::ExceptionMode,
            Impact::FatalError,
            Impact::FatalCommandAbort,
            Impact::UserError,
        ];
        for pair in scale.windows(2) {
            assert!(pair[0] < pair[1], "{:?} must rank below {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn has_impact_starts_at_die_mode() {
        assert!(!Impact::None.has_impact());
        assert!(!Impact::NoneLinkedFatal.has_impact());
        assert!(Impact::DieMode.has_impact());
        assert!(Impact::ExceptionMode.has_impact());
        assert!(Impact::FatalError.has_impact());
        assert!(Impact::FatalCommandAbort.has_impact());
        assert!(Impact::UserError.has_impact());
    }

    #[test]
    fn fatal_tier() {
        assert!(Impact::FatalError.is_fatal());
        assert!(Impact::FatalCommandAbort.is_fatal());
        assert!(!Impact::ExceptionMode.is_fatal());
        assert!(!Impact::DieMode.is_fatal());
        assert!(!Impact::UserError.is_fatal());
    }

    #[test]
    fn linked_marker() {
        assert!(Impact::NoneLinkedFatal.is_linked_to_fatal());
        assert!(!Impact::None.is_linked_to_fatal());
        assert!(!Impact::FatalError.is_linked_to_fatal());
    }

    #[test]
    fn serde_snake_case() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            impact: Impact,
        }
        let w = Wrapper {
            impact: Impact::FatalCommandAbort,
        };
        let s = toml::to_string(&w).unwrap();
        assert!(s.contains("fatal_command_abort"), "got: {s}");
    }
}
