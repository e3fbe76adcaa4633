//! Per-task fault coordinator.
//!
//! One [`FaultCoordinator`] exists per task, wired during task construction
//! and consulted once per work cycle. It composes the task's own-error slot
//! with, depending on the task's rights, a foreign-error table and the
//! privileged lifecycle reconciler. All entry points take `&self`; the
//! coordinator is shared behind an `Arc` so reporting tasks can file
//! foreign records into a listener directly.
//!
//! ## Cycle contract
//!
//! `add_error` never blocks and never panics out of the reporting path; a
//! record that cannot be routed is counted and logged, not thrown.
//! `process_errors` runs at a fixed point of the task's cycle and returns
//! the [`ExecutionCommand`] the scheduler must obey for that cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

use tandem_common::command::ExecutionCommand;
use tandem_common::impact::Impact;
use tandem_common::record::{ErrorId, ErrorIdSource, ErrorRecord};
use tandem_common::task::{Lifecycle, TaskId, TaskProbe, TaskRights};

use crate::foreign::ForeignErrorTable;
use crate::reconciler::{LifecycleFaultReconciler, TaskDirectory};
use crate::slot::OwnErrorSlot;

/// Lifecycle callbacks a task implements to decide its fate.
///
/// Every method returns the command the task wants the scheduler to apply;
/// the coordinator merges them with [`ExecutionCommand::escalate`]. Methods
/// take `&mut self` — the hooks object belongs to the task being cycled
/// and is never shared.
pub trait FaultHooks {
    /// A defect inside the fault machinery itself (broken wiring, missing
    /// backing store). The record describes the defect.
    fn on_internal_defect(&mut self, record: &ErrorRecord) -> ExecutionCommand;

    /// The task's own die-mode error is pending (ordinary task).
    fn on_own_die(&mut self, record: &ErrorRecord) -> ExecutionCommand;

    /// The task's own fatal-tier error is pending (ordinary task).
    fn on_own_fatal(&mut self, record: &ErrorRecord) -> ExecutionCommand;

    /// The lifecycle-owning task's own error is pending; the privileged
    /// task handles its die-mode and fatal errors through this single path.
    fn on_lifecycle_own_error(&mut self, record: &ErrorRecord) -> ExecutionCommand;

    /// A listener observed a materially new batch of foreign fatal errors.
    fn on_foreign_fatals(&mut self, batch: &[ErrorRecord]) -> ExecutionCommand;

    /// The reconciler promoted a foreign error to an unrecoverable
    /// component failure. `task` is the resolved identity to report,
    /// [`TaskId::MISC`] when the reporter is already gone.
    fn on_component_failure(&mut self, task: TaskId, record: &ErrorRecord) -> ExecutionCommand;
}

/// Borrowed scheduler state for one `process_errors` call.
///
/// `directory` is only needed by the lifecycle owner; ordinary tasks pass
/// `None`.
pub struct FaultContext<'a> {
    /// The task being cycled.
    pub task: &'a dyn TaskProbe,
    /// Process-wide lifecycle proxy.
    pub lifecycle: &'a dyn Lifecycle,
    /// Task directory, lifecycle owner only.
    pub directory: Option<&'a dyn TaskDirectory>,
}

/// Error wiring a coordinator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SetupError {
    /// `set_up` was called a second time.
    #[error("fault coordinator for {0} is already set up")]
    AlreadyConfigured(TaskId),
}

/// Fault-containment state of one task.
pub struct FaultCoordinator {
    task_id: TaskId,
    rights: TaskRights,
    ids: ErrorIdSource,
    own: OwnErrorSlot,
    foreign: Mutex<Option<Arc<ForeignErrorTable>>>,
    reconciler: Mutex<Option<LifecycleFaultReconciler>>,
    last_foreign_ids: Mutex<Vec<ErrorId>>,
    routing_failures: AtomicU64,
    configured: AtomicBool,
}

impl FaultCoordinator {
    /// Create an unwired coordinator for `task_id` with the given rights.
    ///
    /// The id source is injected, never global; clones of one source share
    /// the counter across all coordinators of a runtime.
    pub fn new(task_id: TaskId, rights: TaskRights, ids: ErrorIdSource) -> Self {
        Self {
            task_id,
            rights,
            ids,
            own: OwnErrorSlot::new(),
            foreign: Mutex::new(None),
            reconciler: Mutex::new(None),
            last_foreign_ids: Mutex::new(Vec::new()),
            routing_failures: AtomicU64::new(0),
            configured: AtomicBool::new(false),
        }
    }

    /// One-time wiring: allocates the foreign table for listener-capable
    /// tasks and the reconciler for the lifecycle owner.
    ///
    /// # Errors
    ///
    /// Fails loudly when called a second time; the first wiring stays
    /// intact.
    pub fn set_up(&self) -> Result<(), SetupError> {
        if self
            .configured
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!(task = %self.task_id, "duplicate fault coordinator set-up rejected");
            return Err(SetupError::AlreadyConfigured(self.task_id));
        }
        if self.rights.contains(TaskRights::FOREIGN_LISTENER) {
            *self.foreign.lock() = Some(Arc::new(ForeignErrorTable::new()));
        }
        if self.rights.contains(TaskRights::LIFECYCLE_OWNER) {
            *self.reconciler.lock() = Some(LifecycleFaultReconciler::new());
        }
        debug!(task = %self.task_id, rights = ?self.rights, "fault coordinator set up");
        Ok(())
    }

    /// Task this coordinator belongs to.
    #[inline]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Rights granted at construction.
    #[inline]
    pub fn rights(&self) -> TaskRights {
        self.rights
    }

    /// Shared id source, for filing records against this runtime.
    #[inline]
    pub fn id_source(&self) -> &ErrorIdSource {
        &self.ids
    }

    /// This listener's foreign table, for the scheduler's task directory.
    pub fn foreign_table(&self) -> Option<Arc<ForeignErrorTable>> {
        self.foreign.lock().clone()
    }

    /// Records that could not be routed since construction.
    pub fn routing_failures(&self) -> u64 {
        self.routing_failures.load(Ordering::Relaxed)
    }

    /// Stored pending-foreign list of the lifecycle owner; empty for
    /// everyone else.
    pub fn stored_foreign_list(&self) -> Vec<ErrorRecord> {
        self.reconciler
            .lock()
            .as_ref()
            .map(|r| r.stored().to_vec())
            .unwrap_or_default()
    }

    /// File a record. Never blocks, never panics; returns whether the
    /// record was handled (stored, deduplicated, or deliberately dropped).
    ///
    /// A record owned by this task goes to the own-error slot; anything
    /// else needs listener rights and lands in the foreign table. Records
    /// without impact carry nothing actionable and are dropped as handled.
    pub fn add_error(&self, record: ErrorRecord) -> bool {
        if !record.is_valid() {
            debug!(task = %self.task_id, "released record dropped at filing");
            return true;
        }
        if !record.impact().has_impact() {
            debug!(task = %self.task_id, id = record.id().0, "no-impact record dropped");
            return true;
        }

        if record.owner() == self.task_id {
            return self.own.set_current(record, false).is_success();
        }

        let table = self.foreign.lock().clone();
        match table {
            Some(table) if self.rights.contains(TaskRights::FOREIGN_LISTENER) => {
                table.add_foreign(record, false).is_success()
            }
            _ => {
                self.routing_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    task = %self.task_id,
                    reporter = %record.owner(),
                    "foreign record filed at a task without listener rights"
                );
                false
            }
        }
    }

    /// Decide whether an unwound error belongs to this task's pending own
    /// error. True when the ids match, or when the pending own error is
    /// fatal and absorbs the unwind.
    pub fn process_unhandled(&self, record: &ErrorRecord) -> bool {
        match self.own.current() {
            Some(current) if current.id() == record.id() => true,
            Some(current) if current.impact().is_fatal() => {
                debug!(
                    task = %self.task_id,
                    unwound = record.id().0,
                    pending = current.id().0,
                    "unhandled error absorbed by pending fatal"
                );
                true
            }
            _ => {
                error!(
                    task = %self.task_id,
                    id = record.id().0,
                    "unhandled error does not match any pending own error"
                );
                false
            }
        }
    }

    /// Once-per-cycle fault processing. Returns the command the scheduler
    /// must apply to this task for the current cycle.
    ///
    /// With `fatal_only` (final cycle of a stopping task) non-fatal own
    /// errors and non-fatal foreign records are left in place.
    pub fn process_errors(
        &self,
        cx: &FaultContext<'_>,
        hooks: &mut dyn FaultHooks,
        fatal_only: bool,
    ) -> ExecutionCommand {
        // Step 1: feasibility gate.
        if !self.configured.load(Ordering::Acquire) {
            return self.internal_defect(hooks, "fault processing before set-up");
        }
        if !cx.lifecycle.is_operable() || cx.lifecycle.is_shutting_down() {
            return self.internal_defect(hooks, "fault processing with unusable lifecycle");
        }
        if cx.task.is_aborting() {
            return self.internal_defect(hooks, "fault processing on an aborting task");
        }

        // Step 2: an already-notified component failure overrides local
        // routing; the lifecycle decides for everyone.
        if cx.lifecycle.has_component_failure() {
            return cx.lifecycle.command_for(self.task_id);
        }

        // Step 3: nothing pending anywhere.
        let own = self.own.current();
        if own.is_none() && !self.has_foreign_backlog(cx, fatal_only) {
            return ExecutionCommand::Continue;
        }

        // Step 4: route the own record.
        let mut command = ExecutionCommand::Continue;
        let privileged = self.rights.contains(TaskRights::LIFECYCLE_OWNER);
        if let Some(record) = own {
            let fatal_tier = matches!(
                record.impact(),
                Impact::ExceptionMode | Impact::FatalError | Impact::FatalCommandAbort
            );
            if !fatal_only || fatal_tier {
                command = match record.impact() {
                    Impact::DieMode if privileged => hooks.on_lifecycle_own_error(&record),
                    Impact::DieMode => hooks.on_own_die(&record),
                    Impact::ExceptionMode | Impact::FatalError | Impact::FatalCommandAbort => {
                        if privileged {
                            hooks.on_lifecycle_own_error(&record)
                        } else {
                            hooks.on_own_fatal(&record)
                        }
                    }
                    Impact::UserError => {
                        // Reported upstream by the filer; the slot only has
                        // to make room again.
                        self.own.clear_current();
                        ExecutionCommand::Continue
                    }
                    // current() never yields these.
                    Impact::None | Impact::NoneLinkedFatal => ExecutionCommand::Continue,
                };
            }
        }

        // Step 5: foreign work.
        if !self.rights.contains(TaskRights::FOREIGN_LISTENER) {
            return command;
        }
        if privileged {
            command.escalate(self.reconcile_foreign(cx, hooks, fatal_only))
        } else {
            command.escalate(self.drain_foreign(cx, hooks, fatal_only))
        }
    }

    /// Ordinary listener path: drain the own table and escalate only on a
    /// materially changed batch.
    fn drain_foreign(
        &self,
        cx: &FaultContext<'_>,
        hooks: &mut dyn FaultHooks,
        fatal_only: bool,
    ) -> ExecutionCommand {
        let Some(table) = self.foreign.lock().clone() else {
            let cmd = self.internal_defect(hooks, "listener rights without a foreign table");
            return cmd.escalate(ExecutionCommand::Abort);
        };
        let Some(batch) = table.take_pending(fatal_only) else {
            return ExecutionCommand::Continue;
        };

        let ids = Self::id_set(&batch);
        let changed = {
            let mut last = self.last_foreign_ids.lock();
            if *last == ids {
                false
            } else {
                *last = ids;
                true
            }
        };

        let command = if changed {
            warn!(
                task = %self.task_id,
                count = batch.len(),
                "observed foreign fatal errors"
            );
            hooks.on_foreign_fatals(&batch)
        } else {
            // Same unresolved set as last pass: no re-escalation, the
            // lifecycle state already reflects it.
            cx.lifecycle.command_for(self.task_id)
        };

        for mut record in batch {
            record.force_release();
        }
        command
    }

    /// Privileged path: drain every listener table and run a full
    /// reconciliation pass.
    fn reconcile_foreign(
        &self,
        cx: &FaultContext<'_>,
        hooks: &mut dyn FaultHooks,
        fatal_only: bool,
    ) -> ExecutionCommand {
        let Some(directory) = cx.directory else {
            let cmd = self.internal_defect(hooks, "lifecycle owner without a task directory");
            return cmd.escalate(ExecutionCommand::Abort);
        };

        let mut batch = Vec::new();
        for table in directory.listener_tables() {
            if let Some(drained) = table.take_pending(fatal_only) {
                batch.extend(drained);
            }
        }
        let fresh = if batch.is_empty() { None } else { Some(batch) };

        let mut guard = self.reconciler.lock();
        let Some(reconciler) = guard.as_mut() else {
            drop(guard);
            let cmd = self.internal_defect(hooks, "lifecycle owner without a reconciler");
            return cmd.escalate(ExecutionCommand::Abort);
        };

        match reconciler.reconcile(fresh, directory, cx.lifecycle, hooks) {
            Some(command) => command,
            None => cx.lifecycle.command_for(self.task_id),
        }
    }

    fn has_foreign_backlog(&self, cx: &FaultContext<'_>, fatal_only: bool) -> bool {
        if !self.rights.contains(TaskRights::FOREIGN_LISTENER) {
            return false;
        }
        if self.rights.contains(TaskRights::LIFECYCLE_OWNER) {
            // Stored snapshots need the staleness sweep even when nothing
            // new arrived.
            if self
                .reconciler
                .lock()
                .as_ref()
                .is_some_and(|r| !r.stored().is_empty())
            {
                return true;
            }
            if let Some(directory) = cx.directory {
                return directory
                    .listener_tables()
                    .iter()
                    .any(|t| t.has_pending(fatal_only));
            }
            return false;
        }
        self.foreign
            .lock()
            .as_ref()
            .is_some_and(|t| t.has_pending(fatal_only))
    }

    fn internal_defect(&self, hooks: &mut dyn FaultHooks, message: &str) -> ExecutionCommand {
        error!(task = %self.task_id, message, "fault machinery defect");
        let record = ErrorRecord::new(
            &self.ids,
            self.task_id,
            Impact::FatalError,
            Default::default(),
            0,
            message,
        );
        hooks.on_internal_defect(&record)
    }

    fn id_set(batch: &[ErrorRecord]) -> Vec<ErrorId> {
        let mut ids: Vec<ErrorId> = batch.iter().map(|r| r.id()).collect();
        ids.sort_unstable();
        ids
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
