//! Shared Types
//!
//! Crate-wide aliases and the unified error type.

pub mod error;

pub use error::{DredgeError, DriverFailure, Result};

/// The mapping type flowing through the whole engine: argsets, driver
/// outputs and settings are all JSON objects. BTree-backed, so key order is
/// sorted and deterministic.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
