//! System-wide constants shared by all Tandem crates.

/// Upper bound on stored pending-foreign-fatal snapshots held by the
/// lifecycle reconciler (compile-time bound for the fixed-capacity list).
pub const MAX_STORED_FAULTS: usize = 32;

/// Default capacity for bounded hand-off queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Smallest finite queue capacity accepted at construction.
///
/// A capacity of exactly 1 has ambiguous hand-off semantics and is rejected.
pub const MIN_QUEUE_CAPACITY: usize = 2;

/// Raw id of the fallback "misc component" task identity, used when a
/// failure must be attributed to a task that no longer exists.
pub const MISC_COMPONENT_ID: u32 = u32::MAX;
