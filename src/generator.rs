//! Cartesian Argset Generator
//!
//! Builds argument sets from ranges (or arbitrary iterators) of values. The
//! definition is split in two parts mirroring each other:
//!
//! - a **scheme**: the prototype of an argset, where every leaf is marked
//!   [`Scheme::Scalar`] (constant, carried through unchanged) or
//!   [`Scheme::Iterable`] (enumerate the source values), or is a nested
//!   mapping enumerated by a sub-generator;
//! - a **source**: the same shape, holding the actual value / values /
//!   sub-source at each position.
//!
//! Enumeration is the exhaustive Cartesian product of the per-key pools,
//! each combination yielded as a fresh argset:
//!
//! ```
//! use dredge::generator::{Generator, Scheme, Source};
//! use serde_json::json;
//!
//! let scheme = Scheme::nested([("op", Scheme::Iterable), ("a", Scheme::Iterable)]);
//! let source = Source::from(json!({"op": ["add", "div"], "a": [1, 2, 3]}));
//! let argsets: Vec<_> = Generator::new(source, scheme)?.try_into_iter()?.collect();
//! assert_eq!(argsets.len(), 6);
//! # Ok::<(), dredge::DredgeError>(())
//! ```
//!
//! Scheme keys missing from the source are silently skipped; source keys not
//! mentioned by the scheme are ignored. Source iterators may be single-pass:
//! every pool is materialized exactly once before the product starts, so
//! restartability is never required.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::types::{DredgeError, JsonMap, Result};

/// Default recursion bound for nested sub-schemes
pub const DEFAULT_RECURSION_LIMIT: usize = 10;

// =============================================================================
// Scheme
// =============================================================================

/// Prototype of an argset: a sentinel per leaf, or a nested sub-scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    /// The source holds one constant value, present in every argset
    Scalar,
    /// The source holds the values to enumerate at this key
    Iterable,
    /// The source holds a sub-source enumerated by a sub-generator
    Nested(BTreeMap<String, Scheme>),
}

impl Scheme {
    /// Build a nested scheme from key/sub-scheme pairs
    pub fn nested<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Scheme)>,
    {
        Self::Nested(
            entries
                .into_iter()
                .map(|(key, sub)| (key.into(), sub))
                .collect(),
        )
    }
}

// =============================================================================
// Source
// =============================================================================

/// Value tree matching a scheme. Leaves are plain values (scalars, or arrays
/// to enumerate) or boxed iterators; inner nodes are sub-sources.
pub enum Source {
    /// A constant, or an array to enumerate under an `Iterable` leaf
    Value(Value),
    /// A possibly single-pass iterator of values
    Iter(Box<dyn Iterator<Item = Value>>),
    /// A sub-source for a nested sub-scheme
    Nested(BTreeMap<String, Source>),
}

impl Source {
    /// Wrap an arbitrary iterator of values
    pub fn iter<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'static,
    {
        Self::Iter(Box::new(values.into_iter()))
    }

    /// Build a nested source from key/sub-source pairs
    pub fn nested<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Source)>,
    {
        Self::Nested(
            entries
                .into_iter()
                .map(|(key, sub)| (key.into(), sub))
                .collect(),
        )
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Iter(_) => f.write_str("Iter(..)"),
            Self::Nested(m) => f.debug_tuple("Nested").field(&m.keys()).finish(),
        }
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Schema-driven Cartesian enumerator over a source tree.
#[derive(Debug)]
pub struct Generator {
    scheme: BTreeMap<String, Scheme>,
    source: BTreeMap<String, Source>,
    recursion_limit: usize,
    depth: usize,
}

impl Generator {
    pub fn new(source: Source, scheme: Scheme) -> Result<Self> {
        Self::with_recursion_limit(source, scheme, DEFAULT_RECURSION_LIMIT)
    }

    pub fn with_recursion_limit(source: Source, scheme: Scheme, limit: usize) -> Result<Self> {
        Self::at_depth(source, scheme, limit, 0, "<root>")
    }

    fn at_depth(
        source: Source,
        scheme: Scheme,
        limit: usize,
        depth: usize,
        key: &str,
    ) -> Result<Self> {
        if depth > limit {
            return Err(DredgeError::RecursionLimit { limit });
        }
        let Scheme::Nested(scheme_map) = scheme else {
            return Err(DredgeError::bad_scheme("scheme must be a mapping"));
        };
        let source_map = match source {
            Source::Nested(map) => map,
            // a plain JSON object is a perfectly good sub-source
            Source::Value(Value::Object(obj)) => obj
                .into_iter()
                .map(|(k, v)| (k, Source::Value(v)))
                .collect(),
            _ => {
                return Err(DredgeError::SchemeMismatch {
                    key: key.to_string(),
                });
            }
        };
        Ok(Self {
            scheme: scheme_map,
            source: source_map,
            recursion_limit: limit,
            depth,
        })
    }

    /// Materialize the per-key pools and return the product iterator.
    /// Consumes the generator: sources may be one-shot.
    pub fn try_into_iter(self) -> Result<Argsets> {
        let Self {
            scheme,
            mut source,
            recursion_limit,
            depth,
        } = self;

        let mut names = Vec::new();
        let mut pools = Vec::new();
        for (key, subscheme) in scheme {
            // scheme keys with no source entry are silently skipped
            let Some(subsource) = source.remove(&key) else {
                continue;
            };
            let pool = match subscheme {
                Scheme::Scalar => match subsource {
                    Source::Value(value) => vec![value],
                    _ => return Err(DredgeError::SchemeMismatch { key }),
                },
                Scheme::Iterable => match subsource {
                    Source::Value(Value::Array(items)) => items,
                    Source::Iter(it) => it.collect(),
                    _ => return Err(DredgeError::SchemeMismatch { key }),
                },
                nested @ Scheme::Nested(_) => {
                    let sub =
                        Self::at_depth(subsource, nested, recursion_limit, depth + 1, &key)?;
                    sub.try_into_iter()?.map(Value::Object).collect()
                }
            };
            names.push(key);
            pools.push(pool);
        }

        let empty = pools.iter().any(|pool| pool.is_empty());
        Ok(Argsets {
            names,
            indices: vec![0; pools.len()],
            pools,
            exhausted: empty,
        })
    }
}

// =============================================================================
// Product Iterator
// =============================================================================

/// Odometer over the materialized pools; yields each combination as a fresh
/// argset. Key order is sorted (and thus stable within a run).
pub struct Argsets {
    names: Vec<String>,
    pools: Vec<Vec<Value>>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl Iterator for Argsets {
    type Item = JsonMap;

    fn next(&mut self) -> Option<JsonMap> {
        if self.exhausted {
            return None;
        }
        let argset: JsonMap = self
            .names
            .iter()
            .zip(&self.pools)
            .zip(&self.indices)
            .map(|((name, pool), &idx)| (name.clone(), pool[idx].clone()))
            .collect();

        // advance, rightmost position fastest
        let mut wrapped = true;
        for pos in (0..self.indices.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.pools[pos].len() {
                wrapped = false;
                break;
            }
            self.indices[pos] = 0;
        }
        if wrapped {
            self.exhausted = true;
        }
        Some(argset)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect(source: Source, scheme: Scheme) -> Vec<JsonMap> {
        Generator::new(source, scheme)
            .unwrap()
            .try_into_iter()
            .unwrap()
            .collect()
    }

    fn as_values(argsets: &[JsonMap]) -> Vec<Value> {
        argsets.iter().cloned().map(Value::Object).collect()
    }

    #[test]
    fn test_flat_two_of_three() {
        // "c" is in the source but not the scheme: dangling, ignored
        let scheme = Scheme::nested([("a", Scheme::Iterable), ("b", Scheme::Iterable)]);
        let source = Source::from(json!({
            "a": [1, 2, 3],
            "b": ["i", "ii", "iii"],
            "c": ["I", "II", "III"],
        }));
        let argsets = collect(source, scheme);
        assert_eq!(argsets.len(), 9);
        for (a, b) in [(1, "i"), (2, "ii"), (3, "iii")] {
            assert!(as_values(&argsets).contains(&json!({"a": a, "b": b})));
        }
        assert!(argsets.iter().all(|argset| !argset.contains_key("c")));
    }

    #[test]
    fn test_nested_subscheme() {
        let scheme = Scheme::nested([
            ("a", Scheme::Iterable),
            ("b", Scheme::Iterable),
            (
                "x",
                Scheme::nested([("h1", Scheme::Iterable), ("h2", Scheme::Iterable)]),
            ),
        ]);
        let source = Source::from(json!({
            "a": [1, 2, 3],
            "b": ["i", "ii", "iii"],
            "x": {"h1": [101, 102], "h2": [201, 202]},
        }));
        let argsets = collect(source, scheme);
        assert_eq!(argsets.len(), 36);
        assert!(
            as_values(&argsets)
                .contains(&json!({"a": 2, "b": "iii", "x": {"h1": 102, "h2": 201}}))
        );
    }

    #[test]
    fn test_scalar_carried_unchanged() {
        let scheme = Scheme::nested([
            ("a", Scheme::Iterable),
            ("il", Scheme::Scalar),
            ("id", Scheme::Scalar),
            ("ii", Scheme::Scalar),
        ]);
        let source = Source::from(json!({
            "a": [1, 2, 3],
            "il": [2, 7],
            "id": {"a": 1},
            "ii": 42,
        }));
        let argsets = collect(source, scheme);
        assert_eq!(argsets.len(), 3);
        for argset in &argsets {
            assert_eq!(argset["il"], json!([2, 7]));
            assert_eq!(argset["id"], json!({"a": 1}));
            assert_eq!(argset["ii"], json!(42));
        }
    }

    #[test]
    fn test_scheme_key_missing_from_source_is_skipped() {
        let scheme = Scheme::nested([
            ("a", Scheme::Iterable),
            ("b", Scheme::Iterable),
            ("MIA", Scheme::Iterable),
        ]);
        let source = Source::from(json!({"a": [1, 2, 3], "b": ["i", "ii", "iii"]}));
        let argsets = collect(source, scheme);
        assert_eq!(argsets.len(), 9);
        assert!(argsets.iter().all(|argset| !argset.contains_key("MIA")));
    }

    #[test]
    fn test_single_pass_iterator_source() {
        let scheme = Scheme::nested([("a", Scheme::Iterable), ("it", Scheme::Iterable)]);
        let one_shot = ["iterate", "over", "me"].into_iter().map(Value::from);
        let source = Source::nested([
            ("a", Source::from(json!([1, 2, 3]))),
            ("it", Source::iter(one_shot)),
        ]);
        let argsets = collect(source, scheme);
        assert_eq!(argsets.len(), 9);
        assert!(as_values(&argsets).contains(&json!({"a": 3, "it": "me"})));
    }

    #[test]
    fn test_empty_pool_yields_nothing() {
        let scheme = Scheme::nested([("a", Scheme::Iterable), ("b", Scheme::Iterable)]);
        let source = Source::from(json!({"a": [1, 2], "b": []}));
        assert!(collect(source, scheme).is_empty());
    }

    #[test]
    fn test_empty_scheme_yields_one_empty_argset() {
        let argsets = collect(Source::from(json!({})), Scheme::Nested(BTreeMap::new()));
        assert_eq!(argsets, vec![JsonMap::new()]);
    }

    #[test]
    fn test_argsets_are_distinct() {
        let scheme = Scheme::nested([("a", Scheme::Iterable), ("b", Scheme::Iterable)]);
        let source = Source::from(json!({"a": [1, 2, 3], "b": ["i", "ii"]}));
        let argsets = collect(source, scheme);
        for (i, left) in argsets.iter().enumerate() {
            for right in &argsets[i + 1..] {
                assert_ne!(left, right);
            }
        }
    }

    // failure modes

    #[test]
    fn test_root_scheme_must_be_nested() {
        let err = Generator::new(Source::from(json!({})), Scheme::Iterable);
        assert!(matches!(err, Err(DredgeError::BadScheme(_))));
    }

    #[test]
    fn test_subscheme_with_scalar_source_is_a_mismatch() {
        let scheme = Scheme::nested([
            ("h", Scheme::nested([("ua", Scheme::Iterable)])),
            ("p", Scheme::Iterable),
        ]);
        let source = Source::from(json!({
            "h": "NOT A CORRESPONDING OBJECT",
            "p": ["a", "b"],
        }));
        let err = Generator::new(source, scheme).unwrap().try_into_iter();
        assert!(matches!(
            err,
            Err(DredgeError::SchemeMismatch { key }) if key == "h"
        ));
    }

    #[test]
    fn test_iterable_over_non_sequence_is_a_mismatch() {
        let scheme = Scheme::nested([("a", Scheme::Iterable)]);
        let source = Source::from(json!({"a": 42}));
        let err = Generator::new(source, scheme).unwrap().try_into_iter();
        assert!(matches!(err, Err(DredgeError::SchemeMismatch { .. })));
    }

    #[test]
    fn test_recursion_limit() {
        let mut scheme = Scheme::nested([("leaf", Scheme::Iterable)]);
        let mut source = json!({"leaf": [1]});
        for _ in 0..12 {
            scheme = Scheme::nested([("d", scheme)]);
            source = json!({"d": source});
        }
        let err = Generator::new(Source::from(source), scheme)
            .unwrap()
            .try_into_iter();
        assert!(matches!(err, Err(DredgeError::RecursionLimit { .. })));
    }

    // enumeration properties

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn pools() -> impl Strategy<Value = Vec<(String, Vec<i64>)>> {
            proptest::collection::vec(
                ("[a-e]{1,3}", proptest::collection::vec(any::<i64>(), 1..4)),
                1..4,
            )
            .prop_map(|entries| {
                let mut seen = BTreeMap::new();
                for (key, values) in entries {
                    seen.entry(key).or_insert(values);
                }
                seen.into_iter().collect()
            })
        }

        fn build(entries: &[(String, Vec<i64>)]) -> (Source, Scheme) {
            let scheme = Scheme::nested(
                entries
                    .iter()
                    .map(|(key, _)| (key.clone(), Scheme::Iterable)),
            );
            let source = Source::nested(entries.iter().map(|(key, values)| {
                (
                    key.clone(),
                    Source::from(Value::from(values.clone())),
                )
            }));
            (source, scheme)
        }

        proptest! {
            #[test]
            fn prop_enumeration_is_complete_and_distinct(entries in pools()) {
                let (source, scheme) = build(&entries);
                let argsets = collect(source, scheme);
                let expected: usize = entries.iter().map(|(_, v)| v.len()).product();
                prop_assert_eq!(argsets.len(), expected);
                let unique: std::collections::BTreeSet<String> = argsets
                    .iter()
                    .map(|argset| Value::Object(argset.clone()).to_string())
                    .collect();
                prop_assert_eq!(unique.len(), argsets.len());
            }

            #[test]
            fn prop_dangling_source_keys_change_nothing(
                entries in pools(),
                extra in proptest::collection::vec(any::<i64>(), 1..4),
            ) {
                let (source, scheme) = build(&entries);
                let plain = collect(source, scheme.clone());

                let (dangling_source, _) = build(&entries);
                let Source::Nested(mut map) = dangling_source else { unreachable!() };
                map.insert("zzz_dangling".into(), Source::from(Value::from(extra)));
                let dangling = collect(Source::Nested(map), scheme);

                prop_assert_eq!(plain, dangling);
            }

            #[test]
            fn prop_scalars_preserved_in_every_argset(
                entries in pools(),
                constant in any::<i64>(),
            ) {
                let scheme = Scheme::nested(
                    entries
                        .iter()
                        .map(|(key, _)| (key.clone(), Scheme::Iterable))
                        .chain([("zzz_const".to_string(), Scheme::Scalar)]),
                );
                let source = Source::nested(
                    entries
                        .iter()
                        .map(|(key, values)| {
                            (key.clone(), Source::from(Value::from(values.clone())))
                        })
                        .chain([("zzz_const".to_string(), Source::from(json!(constant)))]),
                );
                let argsets = collect(source, scheme);
                prop_assert!(!argsets.is_empty());
                for argset in &argsets {
                    prop_assert_eq!(&argset["zzz_const"], &json!(constant));
                }
            }
        }
    }
}
