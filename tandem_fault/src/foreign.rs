//! Per-listener table of pending foreign errors.
//!
//! A [`ForeignErrorTable`] belongs to exactly one listener task (a task
//! granted `TaskRights::FOREIGN_LISTENER`). Any task reporting about
//! itself to the listener appends into its own bucket; the listener's
//! reconciliation pass consumes buckets in bulk. The table's data mutex is
//! the only lock a reporter touches — never its own slot mutex — so lock
//! order between tasks cannot invert.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use tandem_common::record::ErrorRecord;
use tandem_common::task::TaskId;

use crate::slot::SlotOutcome;

/// Multi-producer table keyed by reporting task.
///
/// Buckets keep arrival order; the draining read returns records grouped
/// per reporting task in ascending task-id order.
#[derive(Debug, Default)]
pub struct ForeignErrorTable {
    buckets: Mutex<BTreeMap<TaskId, VecDeque<ErrorRecord>>>,
}

impl ForeignErrorTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// File a foreign record into its reporter's bucket.
    ///
    /// The duplicate-vs-replace policy of the own-error slot applies per
    /// bucket: the incumbent compared against is the strongest record the
    /// bucket currently holds. A superseding insert force-releases the
    /// displaced entries.
    pub fn add_foreign(&self, record: ErrorRecord, force: bool) -> SlotOutcome {
        if !record.is_valid() {
            return SlotOutcome::Rejected("record already released");
        }

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(record.owner()).or_default();

        if bucket.is_empty() {
            bucket.push_back(record);
            return SlotOutcome::Accepted;
        }

        let strongest = bucket
            .iter()
            .map(|r| r.impact())
            .max()
            .unwrap_or(tandem_common::impact::Impact::None);

        if force {
            debug!(reporter = %record.owner(), "foreign table: forced replacement");
            for mut displaced in bucket.drain(..) {
                displaced.force_release();
            }
            bucket.push_back(record);
            return SlotOutcome::Accepted;
        }
        if strongest.is_fatal() {
            // First fatal wins, per reporting-task bucket.
            return SlotOutcome::DuplicateIgnored;
        }
        if record.impact() > strongest {
            for mut displaced in bucket.drain(..) {
                displaced.force_release();
            }
            bucket.push_back(record);
            SlotOutcome::Accepted
        } else {
            SlotOutcome::DuplicateIgnored
        }
    }

    /// Draining read of everything pending.
    ///
    /// Returns `None` when nothing is pending, otherwise the pending
    /// records grouped per reporting task. With `fatal_only`, only
    /// fatal-tier records are drained and the rest stay queued.
    pub fn take_pending(&self, fatal_only: bool) -> Option<Vec<ErrorRecord>> {
        let mut buckets = self.buckets.lock();
        let mut drained = Vec::new();

        for bucket in buckets.values_mut() {
            if fatal_only {
                let mut keep = VecDeque::with_capacity(bucket.len());
                for record in bucket.drain(..) {
                    if record.impact().is_fatal() {
                        drained.push(record);
                    } else {
                        keep.push_back(record);
                    }
                }
                *bucket = keep;
            } else {
                drained.extend(bucket.drain(..));
            }
        }
        buckets.retain(|_, bucket| !bucket.is_empty());

        if drained.is_empty() { None } else { Some(drained) }
    }

    /// Non-draining probe for pending work.
    pub fn has_pending(&self, fatal_only: bool) -> bool {
        let buckets = self.buckets.lock();
        buckets.values().flatten().any(|r| {
            r.is_pending() && (!fatal_only || r.impact().is_fatal())
        })
    }

    /// Number of reporting tasks with at least one pending record.
    pub fn reporter_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
