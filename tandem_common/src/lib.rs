//! Tandem Common Library
//!
//! This crate provides the shared data model and scheduler-facing contracts
//! for all Tandem workspace crates.
//!
//! # Module Structure
//!
//! - [`command`] - Execution command returned to the scheduler
//! - [`impact`] - Ordered severity classification for error records
//! - [`record`] - Error records and the injected id source
//! - [`task`] - Task identities, rights, and scheduler probe traits
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - System-wide constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! tandem = { package = "tandem_common", path = "../tandem_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use tandem_common::prelude::*;
//! ```

pub mod command;
pub mod config;
pub mod consts;
pub mod impact;
pub mod prelude;
pub mod record;
pub mod task;
