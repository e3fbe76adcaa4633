//! # Task identities, rights, and scheduler probe traits
//!
//! Defines the narrow contract between the fault core and the surrounding
//! cooperative scheduler. The scheduler owns task execution; the fault core
//! only probes it through the traits below.
//!
//! # Design
//!
//! The traits are deliberately thin — they capture exactly the hook points
//! the fault core needs, without mandating a scheduling strategy (thread per
//! task, coroutine pool, test harness, etc.). Capabilities a task holds are
//! declared up front as [`TaskRights`] bitflags, built at construction time
//! rather than discovered at runtime.

use bitflags::bitflags;

use crate::command::ExecutionCommand;
use crate::consts::MISC_COMPONENT_ID;

/// Identifies one task within the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

impl TaskId {
    /// Fallback identity for failures whose reporting task is already gone.
    pub const MISC: Self = Self(MISC_COMPONENT_ID);

    /// True for the misc-component fallback identity.
    #[inline]
    pub const fn is_misc(&self) -> bool {
        self.0 == MISC_COMPONENT_ID
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_misc() {
            write!(f, "task(misc)")
        } else {
            write!(f, "task({})", self.0)
        }
    }
}

/// Opaque execution-phase identifier copied from the scheduler.
///
/// The fault core never interprets the value — it only compares snapshots
/// taken at error-filing time against the live value later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PhaseId(pub u32);

bitflags! {
    /// Capabilities a task holds with respect to the fault core.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TaskRights: u8 {
        /// May hold a foreign-error table and receive escalation callbacks
        /// about other tasks.
        const FOREIGN_LISTENER = 0x01;
        /// The single privileged lifecycle-owning task. Implies running the
        /// reconciliation pass and driving coordinated shutdown.
        const LIFECYCLE_OWNER  = 0x02;
    }
}

impl Default for TaskRights {
    fn default() -> Self {
        Self::empty()
    }
}

/// Point-in-time copy of a task's live execution state.
///
/// Compared against the phase/generation snapshot stored inside an error
/// record to detect "the owner moved on without resolving this".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSnapshot {
    /// Current execution phase.
    pub phase: PhaseId,
    /// Run-iteration counter.
    pub generation: u64,
    /// Whether the task is still scheduled.
    pub running: bool,
}

/// Read-only probe into one task's live state.
///
/// Implemented by the scheduler's task handle. All methods must be cheap
/// and callable from the task's own cycle.
pub trait TaskProbe {
    /// Current execution phase of the task.
    fn current_phase(&self) -> PhaseId;

    /// Current run-iteration counter.
    fn current_generation(&self) -> u64;

    /// Whether the task is still scheduled for further cycles.
    fn is_running(&self) -> bool;

    /// Whether the task has already decided to abort this cycle.
    fn is_aborting(&self) -> bool;

    /// Snapshot of phase/generation/running in one call.
    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            phase: self.current_phase(),
            generation: self.current_generation(),
            running: self.is_running(),
        }
    }
}

/// Probe and control surface of the process-wide lifecycle.
///
/// One implementation exists per runtime; it is shared across tasks, so the
/// mutating notifications take `&self` and implementations use interior
/// mutability.
pub trait Lifecycle {
    /// False once the lifecycle proxy is torn down or was never wired.
    fn is_operable(&self) -> bool;

    /// True once at least one component failure has been notified.
    fn has_component_failure(&self) -> bool;

    /// True when the whole runtime is in die mode.
    fn is_global_die_mode(&self) -> bool;

    /// True once coordinated shutdown has begun.
    fn is_shutting_down(&self) -> bool;

    /// Whether coordinated shutdown may be initiated at all.
    fn coordinated_shutdown_enabled(&self) -> bool;

    /// Map the current lifecycle state to the command `task` must obey.
    fn command_for(&self, task: TaskId) -> ExecutionCommand;

    /// Record that at least one component has failed.
    fn mark_component_failure(&self);

    /// Begin the staged shutdown sequence (ceasing → pre-shutdown →
    /// shutdown). The staging itself is external to the fault core.
    fn begin_coordinated_shutdown(&self);
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misc_identity() {
        assert!(TaskId::MISC.is_misc());
        assert!(!TaskId(0).is_misc());
        assert_eq!(format!("{}", TaskId::MISC), "task(misc)");
        assert_eq!(format!("{}", TaskId(7)), "task(7)");
    }

    #[test]
    fn rights_flags() {
        let ordinary = TaskRights::empty();
        assert!(!ordinary.contains(TaskRights::FOREIGN_LISTENER));

        let listener = TaskRights::FOREIGN_LISTENER;
        assert!(listener.contains(TaskRights::FOREIGN_LISTENER));
        assert!(!listener.contains(TaskRights::LIFECYCLE_OWNER));

        let main = TaskRights::FOREIGN_LISTENER | TaskRights::LIFECYCLE_OWNER;
        assert!(main.contains(TaskRights::LIFECYCLE_OWNER));
    }

    #[test]
    fn probe_snapshot_mirrors_accessors() {
        struct Fixed;
        impl TaskProbe for Fixed {
            fn current_phase(&self) -> PhaseId {
                PhaseId(3)
            }
            fn current_generation(&self) -> u64 {
                41
            }
            fn is_running(&self) -> bool {
                true
            }
            fn is_aborting(&self) -> bool {
                false
            }
        }

        let snap = Fixed.snapshot();
        assert_eq!(snap.phase, PhaseId(3));
        assert_eq!(snap.generation, 41);
        assert!(snap.running);
    }

    /// Verify the traits are object-safe (used as `&dyn` at the seams).
    #[test]
    fn traits_are_object_safe() {
        struct Dummy;
        impl TaskProbe for Dummy {
            fn current_phase(&self) -> PhaseId {
                PhaseId(0)
            }
            fn current_generation(&self) -> u64 {
                0
            }
            fn is_running(&self) -> bool {
                false
            }
            fn is_aborting(&self) -> bool {
                false
            }
        }
        impl Lifecycle for Dummy {
            fn is_operable(&self) -> bool {
                true
            }
            fn has_component_failure(&self) -> bool {
                false
            }
            fn is_global_die_mode(&self) -> bool {
                false
            }
            fn is_shutting_down(&self) -> bool {
                false
            }
            fn coordinated_shutdown_enabled(&self) -> bool {
                true
            }
            fn command_for(&self, _task: TaskId) -> ExecutionCommand {
                ExecutionCommand::Continue
            }
            fn mark_component_failure(&self) {}
            fn begin_coordinated_shutdown(&self) {}
        }

        let d = Dummy;
        let probe: &dyn TaskProbe = &d;
        let life: &dyn Lifecycle = &d;
        assert!(!probe.is_running());
        assert!(life.is_operable());
    }
}
