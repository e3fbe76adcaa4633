//! Lifecycle fault reconciler (privileged task only).
//!
//! The single lifecycle-owning task holds the process-wide list of
//! outstanding foreign-fatal-error snapshots. On every reconciliation pass
//! it sweeps the list for staleness, promotes snapshots whose owning task
//! missed its chance to resolve them into failure candidates, and emits the
//! lifecycle-failure notification exactly once per candidate.
//!
//! A snapshot whose owner's live phase/generation/running state still
//! matches is left untouched — resolution is still in progress. The sweep
//! runs on every pass, not only when new batches arrive, so a task that
//! silently moves on is caught on the next cycle of the privileged task.

use std::sync::Arc;

use heapless::Vec as FixedVec;
use tracing::{debug, error, warn};

use tandem_common::command::ExecutionCommand;
use tandem_common::consts::MAX_STORED_FAULTS;
use tandem_common::record::ErrorRecord;
use tandem_common::task::{Lifecycle, TaskId, TaskSnapshot};

use crate::coordinator::FaultHooks;
use crate::foreign::ForeignErrorTable;

/// Directory of live tasks, implemented by the scheduler.
///
/// Lets the privileged task probe the live state of any reporting task and
/// enumerate every listener-capable task's foreign-error table.
pub trait TaskDirectory {
    /// Live snapshot of a task, or `None` if the task is gone.
    fn snapshot_of(&self, id: TaskId) -> Option<TaskSnapshot>;

    /// Foreign-error tables of every listener-capable task.
    fn listener_tables(&self) -> Vec<Arc<ForeignErrorTable>>;

    /// Identity to notify about a failure of `id`; falls back to the
    /// generic misc-component identity when the task is already gone.
    fn resolve_identity(&self, id: TaskId) -> TaskId {
        if self.snapshot_of(id).is_some() {
            id
        } else {
            TaskId::MISC
        }
    }
}

/// A stored snapshot promoted to an unrecoverable component failure.
#[derive(Debug, Clone)]
pub struct FailureCandidate {
    /// Independent clone of the promoted record.
    pub record: ErrorRecord,
    /// Resolved identity to carry in the notification.
    pub notify: TaskId,
}

/// Holder of the stored pending-foreign-fatal snapshot list.
#[derive(Debug, Default)]
pub struct LifecycleFaultReconciler {
    stored: FixedVec<ErrorRecord, MAX_STORED_FAULTS>,
}

impl LifecycleFaultReconciler {
    /// Create an empty reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the stored snapshot list (inspection/testing).
    pub fn stored(&self) -> &[ErrorRecord] {
        &self.stored
    }

    /// Staleness sweep: drop every stored snapshot that is no longer valid
    /// or no longer pending.
    ///
    /// Dropped snapshots are force-released unless they are linked to a
    /// prior fatal — those are owned elsewhere and must not be
    /// double-released.
    pub fn check_stored(&mut self) {
        let mut i = 0;
        while i < self.stored.len() {
            if self.stored[i].is_pending() {
                i += 1;
                continue;
            }
            let mut dropped = self.stored.swap_remove(i);
            if !dropped.impact().is_linked_to_fatal() {
                dropped.force_release();
            }
            debug!(id = dropped.id().0, "stored foreign snapshot no longer pending, dropped");
        }
    }

    /// Merge a freshly drained foreign batch into storage, deduplicating
    /// by record id.
    ///
    /// Returns records that could not be stored because the fixed list is
    /// full; the caller must treat those as immediate failure candidates —
    /// a fatal record is never silently lost.
    pub fn accept_batch(&mut self, batch: Vec<ErrorRecord>) -> Vec<ErrorRecord> {
        let mut overflow = Vec::new();
        for record in batch {
            if self.stored.iter().any(|r| r.id() == record.id()) {
                continue;
            }
            if let Err(record) = self.stored.push(record) {
                error!(
                    id = record.id().0,
                    reporter = %record.owner(),
                    "stored foreign list full, promoting record immediately"
                );
                overflow.push(record);
            }
        }
        overflow
    }

    /// Candidacy sweep: promote every stored snapshot whose owner can no
    /// longer resolve it.
    ///
    /// A snapshot is promoted when the reporting task is gone, when the
    /// runtime is in global die mode, or when the task's live
    /// phase/generation/running state no longer matches the snapshot taken
    /// at filing time. Promotion clones the record, drops it from storage,
    /// and force-releases the original.
    pub fn check_candidacy(
        &mut self,
        directory: &dyn TaskDirectory,
        global_die_mode: bool,
    ) -> Vec<FailureCandidate> {
        let mut candidates = Vec::new();
        let mut i = 0;
        while i < self.stored.len() {
            let promote = match directory.snapshot_of(self.stored[i].owner()) {
                None => true,
                Some(live) => global_die_mode || !self.stored[i].matches(&live),
            };
            if !promote {
                i += 1;
                continue;
            }

            let mut original = self.stored.swap_remove(i);
            let owner = original.owner();
            match original.try_clone() {
                Some(record) => {
                    warn!(
                        id = record.id().0,
                        reporter = %owner,
                        "foreign fatal missed resolution, promoting to failure candidate"
                    );
                    candidates.push(FailureCandidate {
                        record,
                        notify: directory.resolve_identity(owner),
                    });
                }
                // Invalid snapshots are swept by check_stored; reaching one
                // here means it was released mid-pass. Nothing to promote.
                None => debug!(reporter = %owner, "stored snapshot released mid-pass"),
            }
            original.force_release();
        }
        candidates
    }

    /// One full reconciliation pass.
    ///
    /// `fresh_batch` is the newly drained foreign batch when change
    /// detection saw a material difference, `None` otherwise. Returns the
    /// escalated command from the emitted notifications, or `None` when
    /// the pending set produced no notification (idempotence: observing an
    /// unchanged unresolved set must not retrigger escalation).
    pub fn reconcile(
        &mut self,
        fresh_batch: Option<Vec<ErrorRecord>>,
        directory: &dyn TaskDirectory,
        lifecycle: &dyn Lifecycle,
        hooks: &mut dyn FaultHooks,
    ) -> Option<ExecutionCommand> {
        self.check_stored();

        let overflow = match fresh_batch {
            Some(batch) => self.accept_batch(batch),
            None => Vec::new(),
        };

        let mut candidates = self.check_candidacy(directory, lifecycle.is_global_die_mode());
        candidates.extend(overflow.into_iter().map(|record| {
            let notify = directory.resolve_identity(record.owner());
            FailureCandidate { record, notify }
        }));

        if candidates.is_empty() {
            return None;
        }

        let mut command = ExecutionCommand::Continue;
        for candidate in &candidates {
            lifecycle.mark_component_failure();
            if lifecycle.coordinated_shutdown_enabled() && !lifecycle.is_shutting_down() {
                lifecycle.begin_coordinated_shutdown();
            }
            command = command
                .escalate(hooks.on_component_failure(candidate.notify, &candidate.record));
        }
        Some(command)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use tandem_common::impact::Impact;
    use tandem_common::record::ErrorIdSource;
    use tandem_common::task::PhaseId;

    struct StubDirectory {
        tasks: BTreeMap<TaskId, TaskSnapshot>,
    }

    impl StubDirectory {
        fn with(tasks: &[(TaskId, TaskSnapshot)]) -> Self {
            Self {
                tasks: tasks.iter().cloned().collect(),
            }
        }
    }

    impl TaskDirectory for StubDirectory {
        fn snapshot_of(&self, id: TaskId) -> Option<TaskSnapshot> {
            self.tasks.get(&id).copied()
        }
        fn listener_tables(&self) -> Vec<Arc<ForeignErrorTable>> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct StubLifecycle {
        die_mode: Cell<bool>,
        shutdown_enabled: Cell<bool>,
        failures: Cell<u32>,
        shutdowns: Cell<u32>,
    }

    impl Lifecycle for StubLifecycle {
        fn is_operable(&self) -> bool {
            true
        }
        fn has_component_failure(&self) -> bool {
            self.failures.get() > 0
        }
        fn is_global_die_mode(&self) -> bool {
            self.die_mode.get()
        }
        fn is_shutting_down(&self) -> bool {
            self.shutdowns.get() > 0
        }
        fn coordinated_shutdown_enabled(&self) -> bool {
            self.shutdown_enabled.get()
        }
        fn command_for(&self, _task: TaskId) -> ExecutionCommand {
            ExecutionCommand::Continue
        }
        fn mark_component_failure(&self) {
            self.failures.set(self.failures.get() + 1);
        }
        fn begin_coordinated_shutdown(&self) {
            self.shutdowns.set(self.shutdowns.get() + 1);
        }
    }

    #[derive(Default)]
    struct StubHooks {
        notified: RefCell<Vec<(TaskId, u64)>>,
    }

    impl FaultHooks for StubHooks {
        fn on_internal_defect(&mut self, _record: &ErrorRecord) -> ExecutionCommand {
            ExecutionCommand::Abort
        }
        fn on_own_die(&mut self, _record: &ErrorRecord) -> ExecutionCommand {
            ExecutionCommand::Abort
        }
        fn on_own_fatal(&mut self, _record: &ErrorRecord) -> ExecutionCommand {
            ExecutionCommand::Abort
        }
        fn on_lifecycle_own_error(&mut self, _record: &ErrorRecord) -> ExecutionCommand {
            ExecutionCommand::Stop
        }
        fn on_foreign_fatals(&mut self, _batch: &[ErrorRecord]) -> ExecutionCommand {
            ExecutionCommand::Continue
        }
        fn on_component_failure(
            &mut self,
            task: TaskId,
            record: &ErrorRecord,
        ) -> ExecutionCommand {
            self.notified.borrow_mut().push((task, record.id().0));
            ExecutionCommand::Stop
        }
    }

    fn fatal(ids: &ErrorIdSource, owner: TaskId, phase: u32, generation: u64) -> ErrorRecord {
        ErrorRecord::new(
            ids,
            owner,
            Impact::FatalError,
            PhaseId(phase),
            generation,
            "fatal",
        )
    }

    fn live(phase: u32, generation: u64) -> TaskSnapshot {
        TaskSnapshot {
            phase: PhaseId(phase),
            generation,
            running: true,
        }
    }

    #[test]
    fn matching_snapshot_left_untouched() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        assert!(rec.accept_batch(vec![fatal(&ids, TaskId(1), 2, 5)]).is_empty());

        let dir = StubDirectory::with(&[(TaskId(1), live(2, 5))]);
        let candidates = rec.check_candidacy(&dir, false);
        assert!(candidates.is_empty());
        assert_eq!(rec.stored().len(), 1);
    }

    #[test]
    fn phase_drift_promotes() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        rec.accept_batch(vec![fatal(&ids, TaskId(1), 2, 5)]);

        let dir = StubDirectory::with(&[(TaskId(1), live(3, 5))]);
        let candidates = rec.check_candidacy(&dir, false);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].notify, TaskId(1));
        assert!(rec.stored().is_empty());
    }

    #[test]
    fn generation_drift_promotes() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        rec.accept_batch(vec![fatal(&ids, TaskId(1), 2, 5)]);

        let dir = StubDirectory::with(&[(TaskId(1), live(2, 6))]);
        assert_eq!(rec.check_candidacy(&dir, false).len(), 1);
    }

    #[test]
    fn stopped_task_promotes() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        rec.accept_batch(vec![fatal(&ids, TaskId(1), 2, 5)]);

        let dir = StubDirectory::with(&[(
            TaskId(1),
            TaskSnapshot {
                phase: PhaseId(2),
                generation: 5,
                running: false,
            },
        )]);
        assert_eq!(rec.check_candidacy(&dir, false).len(), 1);
    }

    #[test]
    fn gone_task_promotes_with_misc_identity() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        rec.accept_batch(vec![fatal(&ids, TaskId(9), 2, 5)]);

        let dir = StubDirectory::with(&[]);
        let candidates = rec.check_candidacy(&dir, false);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].notify, TaskId::MISC);
    }

    #[test]
    fn global_die_mode_promotes_matching_snapshots() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        rec.accept_batch(vec![fatal(&ids, TaskId(1), 2, 5)]);

        let dir = StubDirectory::with(&[(TaskId(1), live(2, 5))]);
        assert_eq!(rec.check_candidacy(&dir, true).len(), 1);
    }

    #[test]
    fn check_stored_drops_resolved_and_released() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        let mut resolved = fatal(&ids, TaskId(1), 0, 0);
        resolved.resolve();
        let mut released = fatal(&ids, TaskId(2), 0, 0);
        released.force_release();
        let kept = fatal(&ids, TaskId(3), 0, 0);
        let kept_id = kept.id();

        // Bypass accept_batch: released records would be deduped anyway.
        rec.stored.push(resolved).unwrap();
        rec.stored.push(released).unwrap();
        rec.stored.push(kept).unwrap();

        rec.check_stored();
        assert_eq!(rec.stored().len(), 1);
        assert_eq!(rec.stored()[0].id(), kept_id);
    }

    #[test]
    fn accept_batch_dedupes_by_id() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        let r = fatal(&ids, TaskId(1), 0, 0);
        let copy = r.try_clone().unwrap();

        rec.accept_batch(vec![r]);
        rec.accept_batch(vec![copy]);
        assert_eq!(rec.stored().len(), 1);
    }

    #[test]
    fn reconcile_notifies_once_per_candidate_and_starts_shutdown() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        let lifecycle = StubLifecycle::default();
        lifecycle.shutdown_enabled.set(true);
        let mut hooks = StubHooks::default();

        // Two reporters, both already moved on.
        let dir = StubDirectory::with(&[(TaskId(1), live(9, 9)), (TaskId(2), live(9, 9))]);
        let batch = vec![fatal(&ids, TaskId(1), 2, 5), fatal(&ids, TaskId(2), 2, 5)];

        let cmd = rec.reconcile(Some(batch), &dir, &lifecycle, &mut hooks);
        assert_eq!(cmd, Some(ExecutionCommand::Stop));
        assert_eq!(hooks.notified.borrow().len(), 2);
        assert_eq!(lifecycle.failures.get(), 2);
        // Shutdown begins once; later candidates see it under way.
        assert_eq!(lifecycle.shutdowns.get(), 1);
    }

    #[test]
    fn reconcile_unchanged_set_is_silent() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        let lifecycle = StubLifecycle::default();
        let mut hooks = StubHooks::default();

        // Owner still matches: stored, no candidates.
        let dir = StubDirectory::with(&[(TaskId(1), live(2, 5))]);
        let batch = vec![fatal(&ids, TaskId(1), 2, 5)];
        assert_eq!(rec.reconcile(Some(batch), &dir, &lifecycle, &mut hooks), None);

        // Second pass, nothing new: still silent, snapshot retained.
        assert_eq!(rec.reconcile(None, &dir, &lifecycle, &mut hooks), None);
        assert!(hooks.notified.borrow().is_empty());
        assert_eq!(rec.stored().len(), 1);
    }

    #[test]
    fn overflow_records_promoted_immediately() {
        let ids = ErrorIdSource::new();
        let mut rec = LifecycleFaultReconciler::new();
        let lifecycle = StubLifecycle::default();
        let mut hooks = StubHooks::default();

        let mut batch = Vec::new();
        for i in 0..(MAX_STORED_FAULTS + 1) {
            batch.push(fatal(&ids, TaskId(100 + i as u32), 2, 5));
        }
        // Every reporter still matches its snapshot, so only the overflow
        // record can produce a notification.
        let tasks: Vec<_> = (0..(MAX_STORED_FAULTS + 1))
            .map(|i| (TaskId(100 + i as u32), live(2, 5)))
            .collect();
        let dir = StubDirectory::with(&tasks);

        let cmd = rec.reconcile(Some(batch), &dir, &lifecycle, &mut hooks);
        assert_eq!(cmd, Some(ExecutionCommand::Stop));
        assert_eq!(hooks.notified.borrow().len(), 1);
        assert_eq!(rec.stored().len(), MAX_STORED_FAULTS);
    }
}
