//! Per-task single-error register.
//!
//! Each task owns exactly one [`OwnErrorSlot`], created and destroyed with
//! the task. The slot holds zero or one record; at most one *meaningful*
//! own error exists per task at any instant, and clearing is the only way
//! to make room for a lower-severity record.
//!
//! ## Replacement policy
//!
//! - An empty slot accepts unconditionally.
//! - `force` always replaces; the displaced record is force-released.
//! - A fatal-tier incumbent wins against anything (first fatal wins).
//! - Otherwise a strictly higher severity replaces, equal-or-lower is a
//!   duplicate — reported but not stored, and counted as success for the
//!   caller since the incumbent already represents the worst known
//!   condition.

use parking_lot::Mutex;
use tracing::debug;

use tandem_common::record::ErrorRecord;

/// Outcome of a slot or table insertion attempt.
///
/// A closed result enum rather than a boolean, so callers cannot conflate
/// "nothing to do" with "failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The record was stored (possibly displacing a weaker incumbent).
    Accepted,
    /// An equal-or-stronger record is already stored; treated as success.
    DuplicateIgnored,
    /// The record could not be stored — reason.
    Rejected(&'static str),
}

impl SlotOutcome {
    /// Accepted and DuplicateIgnored both count as success for the caller.
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Accepted | Self::DuplicateIgnored)
    }
}

/// Single-record register guarded by one mutex.
///
/// The mutex is held for every read or write and only for O(1) critical
/// sections, never across a callback.
#[derive(Debug, Default)]
pub struct OwnErrorSlot {
    current: Mutex<Option<ErrorRecord>>,
}

impl OwnErrorSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` under the replacement policy above.
    pub fn set_current(&self, record: ErrorRecord, force: bool) -> SlotOutcome {
        if !record.is_valid() {
            return SlotOutcome::Rejected("record already released");
        }

        let mut slot = self.current.lock();
        match slot.as_mut() {
            None => {
                *slot = Some(record);
                SlotOutcome::Accepted
            }
            Some(existing) => {
                if force {
                    debug!(
                        old = existing.id().0,
                        new = record.id().0,
                        "own-error slot: forced replacement"
                    );
                    existing.force_release();
                    *slot = Some(record);
                    return SlotOutcome::Accepted;
                }
                if existing.impact().is_fatal() {
                    // First fatal wins.
                    return SlotOutcome::DuplicateIgnored;
                }
                if record.impact() > existing.impact() {
                    existing.force_release();
                    *slot = Some(record);
                    SlotOutcome::Accepted
                } else {
                    SlotOutcome::DuplicateIgnored
                }
            }
        }
    }

    /// Release and remove the current record, if any.
    pub fn clear_current(&self) {
        if let Some(mut record) = self.current.lock().take() {
            record.force_release();
        }
    }

    /// Read-only clone of the current record.
    ///
    /// Records linked to a prior fatal are not meaningful own errors and
    /// are excluded from the view.
    pub fn current(&self) -> Option<ErrorRecord> {
        let slot = self.current.lock();
        slot.as_ref()
            .filter(|r| !r.impact().is_linked_to_fatal())
            .and_then(|r| r.try_clone())
    }

    /// True when a meaningful record occupies the slot.
    pub fn is_occupied(&self) -> bool {
        self.current().is_some()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
