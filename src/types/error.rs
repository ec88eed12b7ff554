//! Unified Error Type System
//!
//! Centralized error types for the entire engine.
//!
//! ## Error Groups
//!
//! - **System**: IO, CSV, JSON errors (auto `From` impls)
//! - **Driver lifecycle**: bailouts, fetch failures, bad data, contract
//!   violations (missing args/settings, run-before-setup)
//! - **Structure/configuration**: bad paths, bad predicate patterns,
//!   scheme errors from the generator
//! - **Invariants**: internal consistency violations that indicate a
//!   misconfigured test, not a defect in the system under test
//!
//! ## Design Principles
//!
//! - Single unified error type (`DredgeError`) for the entire crate
//! - Structured variants carrying the driver identity and data snapshots
//!   needed to reproduce a failure without re-running the test
//! - No panic/unwrap outside tests - everything is a `Result`

use serde_json::Value;
use thiserror::Error;

use crate::types::JsonMap;

/// Error type driver hooks are allowed to bubble up.
///
/// Drivers wrap arbitrary transports (network, subprocess, in-process), so
/// their hooks return a boxed error; the engine wraps it with identity and
/// snapshot context.
pub type DriverFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Engine Error
// =============================================================================

#[derive(Debug, Error)]
pub enum DredgeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Driver Lifecycle
    // -------------------------------------------------------------------------
    /// A bailout predicate declared the driver cannot handle the argset.
    /// Recovered by the engine (counted and skipped), surfaced everywhere
    /// else.
    #[error("driver '{driver}' bailed out: {bailout}")]
    NotSupported { driver: String, bailout: String },

    /// `fetch` failed. Carries everything needed to replay the trial.
    #[error(
        "driver '{driver}' failed to fetch\n  cause: {source}\n  args: {}\n  settings: {}",
        snapshot(.args),
        snapshot(.settings)
    )]
    Driver {
        driver: String,
        args: JsonMap,
        settings: JsonMap,
        #[source]
        source: DriverFailure,
    },

    /// `decode`, `normalize` or `check` failed. Carries the data snapshot
    /// as it looked when the hook gave up.
    #[error(
        "driver '{driver}' produced bad data\n  cause: {source}\n  args: {}\n  data: {}",
        snapshot(.args),
        snapshot(.data)
    )]
    DriverData {
        driver: String,
        args: JsonMap,
        data: JsonMap,
        #[source]
        source: DriverFailure,
    },

    #[error("driver '{driver}': run() called before setup()")]
    SetupRequired { driver: String },

    #[error("driver '{driver}': missing mandatory arg '{key}'")]
    MissingArg { driver: String, key: String },

    #[error("driver '{driver}': missing mandatory setting '{key}'")]
    MissingSetting { driver: String, key: String },

    #[error("malformed settings key '{key}' (expected 'DriverName.optionName')")]
    BadSettingsKey { key: String },

    // -------------------------------------------------------------------------
    // Structure / Configuration
    // -------------------------------------------------------------------------
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    #[error("bad predicate pattern: {0}")]
    BadPattern(String),

    #[error("bad scheme: {0}")]
    BadScheme(String),

    #[error("scheme/source mismatch at key '{key}'")]
    SchemeMismatch { key: String },

    #[error("recursion limit exceeded ({limit})")]
    RecursionLimit { limit: usize },

    // -------------------------------------------------------------------------
    // Invariants
    // -------------------------------------------------------------------------
    /// A cleanup hack turned a failing comparison into a passing one. The
    /// ruleset is eating real differences; fatal by design.
    #[error("cleanup hack ate the error ({oracle} vs {result})")]
    CleanupAte { oracle: String, result: String },
}

/// Render a mapping for error output: canonical JSON, indented under the
/// label line.
fn snapshot(map: &JsonMap) -> String {
    let dump = crate::diff::canonical_json(&Value::Object(map.clone()));
    dump.replace('\n', "\n  ")
}

pub type Result<T> = std::result::Result<T, DredgeError>;

// =============================================================================
// Helper Constructors
// =============================================================================

impl DredgeError {
    /// Create a bailout signal for a named predicate
    pub fn not_supported(driver: impl Into<String>, bailout: impl Into<String>) -> Self {
        Self::NotSupported {
            driver: driver.into(),
            bailout: bailout.into(),
        }
    }

    /// Wrap a `fetch` failure with the trial context
    pub fn driver(
        driver: impl Into<String>,
        args: JsonMap,
        settings: JsonMap,
        source: DriverFailure,
    ) -> Self {
        Self::Driver {
            driver: driver.into(),
            args,
            settings,
            source,
        }
    }

    /// Wrap a `decode`/`normalize`/`check` failure with the data snapshot
    pub fn driver_data(
        driver: impl Into<String>,
        args: JsonMap,
        data: JsonMap,
        source: DriverFailure,
    ) -> Self {
        Self::DriverData {
            driver: driver.into(),
            args,
            data,
            source,
        }
    }

    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    pub fn bad_pattern(msg: impl Into<String>) -> Self {
        Self::BadPattern(msg.into())
    }

    pub fn bad_scheme(msg: impl Into<String>) -> Self {
        Self::BadScheme(msg.into())
    }

    /// True for the one error kind the engine recovers from
    pub fn is_bailout(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}

// =============================================================================
// Tests
// =============================================================================
