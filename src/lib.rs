//! Dredge - Differential Regression Testing Engine
//!
//! Systematically explores a Cartesian space of input argument sets, feeds
//! each set to two or more independently-implemented drivers, compares the
//! results under a user-supplied equivalence, deduplicates discrepancies by
//! fingerprint and renders structured, human-readable diffs.
//!
//! ## Core Pieces
//!
//! - **Generator**: schema-driven Cartesian enumeration over heterogeneous,
//!   possibly nested, possibly single-pass sources
//! - **Driver protocol**: a strict per-trial contract (setup → value-check →
//!   fetch → decode → normalize → check) with timing isolation and bailout
//!   predicates for degenerate inputs
//! - **Hacks**: declarative, pattern-guarded, path-addressed case
//!   transformations to paper over known bugs or strip irrelevant data
//! - **Tracker**: deduplicating error database keyed by diff fingerprint,
//!   with reports and CSV export
//!
//! ## Quick Start
//!
//! ```ignore
//! use dredge::{Comparator, Engine, Generator, Scheme, Source, TestTriple};
//!
//! let scheme = Scheme::nested([("op", Scheme::Iterable), ("a", Scheme::Iterable)]);
//! let source = Source::from(json!({"op": ["add", "div"], "a": [1, 2, 3]}));
//! let argsets = Generator::new(source, scheme)?.try_into_iter()?;
//!
//! let triples = vec![TestTriple::new(
//!     Comparator::equality(),
//!     Arc::new(ReferenceDriver),
//!     Arc::new(CandidateDriver),
//! )];
//! let tracker = Engine::new(triples, settings).run(argsets)?;
//! if tracker.errors_found() {
//!     eprintln!("{}", tracker.format_report(20));
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: the orchestrator and comparison triples
//! - [`generator`]: Cartesian argset enumeration
//! - [`driver`]: the driver trait and trial lifecycle
//! - [`case`]: per-comparison records and the hack rule engine
//! - [`diff`]: canonical JSON and the contextual diff
//! - [`tracker`] / [`stats`]: error deduplication and run statistics
//! - [`path`] / [`matching`] / [`rules`]: the addressing and pattern
//!   primitives the rule engine is built from

pub mod case;
pub mod clock;
pub mod diff;
pub mod driver;
pub mod engine;
pub mod generator;
pub mod matching;
pub mod path;
pub mod rules;
pub mod stats;
pub mod tracker;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Error Types
pub use types::{DredgeError, DriverFailure, JsonMap, Result};

// Orchestration
pub use engine::{Comparator, Engine, TestTriple};
pub use tracker::Tracker;

// Enumeration
pub use generator::{Generator, Scheme, Source};

// Driver Protocol
pub use driver::{Bailout, Driver, SharedDriver, Trial, check_values, run_driver};

// Cases & Hacks
pub use case::{Case, Rule, Ruleset};

// =============================================================================
// Supporting Re-exports
// =============================================================================

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use diff::{canonical_json, js_diff};
pub use matching::data_match;
pub use stats::StatCounter;
