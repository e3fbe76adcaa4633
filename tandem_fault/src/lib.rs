//! # Tandem Fault Core Library
//!
//! Fault-containment core of the Tandem cooperative runtime. Tasks file
//! error records about themselves, listener tasks collect records about
//! others, and the single privileged lifecycle task reconciles unresolved
//! foreign fatals into component-failure notifications and coordinated
//! shutdown.
//!
//! ## Layers
//!
//! 1. **BoundedQueue** — blocking hand-off between tasks with pluggable
//!    backpressure.
//! 2. **OwnErrorSlot** — one meaningful own error per task.
//! 3. **ForeignErrorTable** — per-listener multi-producer record table.
//! 4. **FaultCoordinator** — the per-task entry points driven once per
//!    work cycle.
//! 5. **LifecycleFaultReconciler** — privileged staleness detection and
//!    escalation.
//!
//! ## Cooperative, Not Threaded
//!
//! The core owns no background threads. Everything advances inside the
//! calling task's cycle; cross-task state is shared behind `Arc` and
//! short-lived `parking_lot` mutexes, never held across a callback.

pub mod coordinator;
pub mod foreign;
pub mod queue;
pub mod reconciler;
pub mod slot;
