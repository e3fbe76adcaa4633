//! Error records and the injected id source.
//!
//! An [`ErrorRecord`] is an immutable-after-creation description of one
//! reported failure. It lives inside exactly one container (an own-error
//! slot or one foreign-error table bucket) at a time; crossing the
//! own/foreign boundary always happens through [`ErrorRecord::try_clone`],
//! never through aliasing, so that a force-release in one place cannot
//! invalidate a copy held elsewhere.
//!
//! Ids come from an explicitly owned [`ErrorIdSource`] injected at
//! construction — never a global singleton — so tests stay deterministic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::impact::Impact;
use crate::task::{PhaseId, TaskId, TaskSnapshot};

/// Process-wide unique, monotonically increasing record id. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ErrorId(pub u64);

/// Shared monotone counter handing out [`ErrorId`]s.
///
/// Cloning shares the counter; two clones never produce the same id.
#[derive(Debug, Clone, Default)]
pub struct ErrorIdSource {
    next: Arc<AtomicU64>,
}

impl ErrorIdSource {
    /// Create a fresh source starting at id 1.
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Hand out the next id.
    #[inline]
    pub fn next_id(&self) -> ErrorId {
        ErrorId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// One reported failure.
///
/// `valid` transitions true → false exactly once (via
/// [`ErrorRecord::force_release`]) and never back; once invalid, severity
/// and message reads are no longer meaningful and cloning fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    id: ErrorId,
    owner: TaskId,
    impact: Impact,
    phase: PhaseId,
    generation: u64,
    message: String,
    valid: bool,
    pending: bool,
}

impl ErrorRecord {
    /// File a new record for `owner`, snapshotting its current phase and
    /// generation so the reconciler can later detect a missed resolution.
    pub fn new(
        ids: &ErrorIdSource,
        owner: TaskId,
        impact: Impact,
        phase: PhaseId,
        generation: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: ids.next_id(),
            owner,
            impact,
            phase,
            generation,
            message: message.into(),
            valid: true,
            pending: true,
        }
    }

    /// Unique id assigned at creation.
    #[inline]
    pub const fn id(&self) -> ErrorId {
        self.id
    }

    /// Task that produced the record.
    #[inline]
    pub const fn owner(&self) -> TaskId {
        self.owner
    }

    /// Severity classification.
    #[inline]
    pub const fn impact(&self) -> Impact {
        self.impact
    }

    /// Execution phase of the owner at filing time.
    #[inline]
    pub const fn phase_snapshot(&self) -> PhaseId {
        self.phase
    }

    /// Run-iteration counter of the owner at filing time.
    #[inline]
    pub const fn generation_snapshot(&self) -> u64 {
        self.generation
    }

    /// Short human-readable description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// False once force-released.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// True until explicitly cleared, resolved, or superseded.
    #[inline]
    pub const fn is_pending(&self) -> bool {
        self.valid && self.pending
    }

    /// Deep, independent copy with the same id. Returns `None` if the
    /// source is already invalid.
    pub fn try_clone(&self) -> Option<Self> {
        if self.valid { Some(self.clone()) } else { None }
    }

    /// Mark the record as no longer awaiting resolution.
    pub fn resolve(&mut self) {
        self.pending = false;
    }

    /// Invalidate the record and release anything it still owns.
    ///
    /// Idempotent: releasing an already-invalid record is a no-op.
    pub fn force_release(&mut self) {
        if !self.valid {
            return;
        }
        trace!(id = self.id.0, owner = %self.owner, "force-releasing error record");
        self.valid = false;
        self.pending = false;
        self.message.clear();
    }

    /// True when the owning task's live state still equals the snapshot
    /// captured at filing time *and* the task is still running. False
    /// signals the owner missed its chance to resolve this record.
    pub fn matches_snapshot(&self, phase: PhaseId, generation: u64, running: bool) -> bool {
        self.valid && running && self.phase == phase && self.generation == generation
    }

    /// [`Self::matches_snapshot`] against a whole [`TaskSnapshot`].
    #[inline]
    pub fn matches(&self, snap: &TaskSnapshot) -> bool {
        self.matches_snapshot(snap.phase, snap.generation, snap.running)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
