//! Configuration loading traits and types.
//!
//! Standardized TOML configuration loading for Tandem applications: a
//! `[shared]` section common to every binary plus a `[fault]` section
//! tuning the fault-containment core.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tandem_common::config::{ConfigLoader, RuntimeConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), tandem_common::config::ConfigError> {
//!     let config = RuntimeConfig::load(Path::new("tandem.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::consts::{DEFAULT_QUEUE_CAPACITY, MAX_STORED_FAULTS, MIN_QUEUE_CAPACITY};

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared across all Tandem applications.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "tandem-supervisor-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tuning knobs for the fault-containment core.
///
/// # TOML Example
///
/// ```toml
/// [fault]
/// queue_capacity = 64
/// max_stored_faults = 16
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Capacity of bounded hand-off queues. Finite capacities below 2 are
    /// rejected — a single-slot queue has ambiguous hand-off semantics.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound on stored pending-foreign-fatal snapshots. Must not
    /// exceed the compile-time bound of the reconciler's fixed list.
    #[serde(default = "default_max_stored_faults")]
    pub max_stored_faults: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_max_stored_faults() -> usize {
    MAX_STORED_FAULTS
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_stored_faults: MAX_STORED_FAULTS,
        }
    }
}

impl FaultConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `queue_capacity` is below the minimum finite capacity
    /// - `max_stored_faults` is zero or exceeds the compile-time bound
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "queue_capacity must be >= {MIN_QUEUE_CAPACITY}, got {}",
                self.queue_capacity
            )));
        }
        if self.max_stored_faults == 0 || self.max_stored_faults > MAX_STORED_FAULTS {
            return Err(ConfigError::ValidationError(format!(
                "max_stored_faults must be in 1..={MAX_STORED_FAULTS}, got {}",
                self.max_stored_faults
            )));
        }
        Ok(())
    }
}

/// Complete runtime configuration: shared section plus fault tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Common application fields.
    pub shared: SharedConfig,

    /// Fault-core tuning. Optional in the file; defaults apply.
    #[serde(default)]
    pub fault: FaultConfig,
}

impl RuntimeConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.fault.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Semantic validation is a separate, explicit `validate()` call
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any serde-deserializable struct can use ConfigLoader.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
