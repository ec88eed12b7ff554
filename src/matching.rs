//! Structural Subset Matcher
//!
//! Answers "does pattern P structurally occur inside data D?". Scalars match
//! by equality; mappings match when every pattern key exists in the data
//! with a matching value; sequences match when every pattern element has at
//! least one matching counterpart (order ignored, no multiplicity
//! accounting - duplicates in the pattern are satisfied by a single match).
//! A type mismatch between pattern and data is simply no match.
//!
//! Hack rules use this to guard transformations on the shape of a case, so
//! the matcher must stay total over arbitrary JSON - the only error is the
//! recursion limit, which guards against pathological nesting.

use serde_json::Value;

use crate::types::{DredgeError, Result};

/// Depth bound used by [`data_match`]
pub const DEFAULT_DEPTH_LIMIT: usize = 10;

/// Check whether `pattern` is structurally contained in `data`, with the
/// default depth limit.
pub fn data_match(pattern: &Value, data: &Value) -> Result<bool> {
    data_match_limit(pattern, data, DEFAULT_DEPTH_LIMIT)
}

/// [`data_match`] with a caller-chosen depth limit
pub fn data_match_limit(pattern: &Value, data: &Value, limit: usize) -> Result<bool> {
    match_at(pattern, data, limit, 0)
}

fn match_at(pattern: &Value, data: &Value, limit: usize, depth: usize) -> Result<bool> {
    if depth == limit {
        return Err(DredgeError::RecursionLimit { limit });
    }
    if pattern == data {
        return Ok(true);
    }
    match (pattern, data) {
        (Value::Object(pm), Value::Object(dm)) => {
            for (key, pv) in pm {
                let Some(dv) = dm.get(key) else {
                    return Ok(false);
                };
                if !match_at(pv, dv, limit, depth + 1)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Array(pa), Value::Array(da)) => {
            'pattern: for pv in pa {
                for dv in da {
                    if match_at(pv, dv, limit, depth + 1)? {
                        continue 'pattern;
                    }
                }
                return Ok(false);
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

// =============================================================================
// Tests
// =============================================================================
