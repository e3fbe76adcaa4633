//! Prelude module for common re-exports.
//!
//! Consumers can do `use tandem_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Logging / Configuration ────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, FaultConfig, LogLevel, RuntimeConfig, SharedConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_QUEUE_CAPACITY, MAX_STORED_FAULTS, MIN_QUEUE_CAPACITY};

// ─── Fault Data Model ───────────────────────────────────────────────
pub use crate::command::ExecutionCommand;
pub use crate::impact::Impact;
pub use crate::record::{ErrorId, ErrorIdSource, ErrorRecord};

// ─── Task Contracts ─────────────────────────────────────────────────
pub use crate::task::{Lifecycle, PhaseId, TaskId, TaskProbe, TaskRights, TaskSnapshot};
