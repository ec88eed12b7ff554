//! Case & Hacks
//!
//! A [`Case`] is the smallest unit of comparison: the argset, both driver
//! outputs (deep copies) and the two driver names, held as one addressable
//! tree:
//!
//! ```text
//! {
//!     "argset": {...},
//!     "oracle": {...},
//!     "result": {...},
//!     "oname": "PyCalcDriver",
//!     "rname": "CgiCalcDriver"
//! }
//! ```
//!
//! Hacks are declarative transformations applied to a case before (or, for
//! cleanup hacks, after) comparison, used to paper over known bugs and
//! anomalies or to strip data that a non-equality comparator legitimately
//! ignores. Each [`Rule`] optionally guards on structural patterns and then
//! applies its actions; paths address the whole case, e.g.
//! `/oracle/temperature`.
//!
//! All actions silently ignore invalid paths and paths leading to
//! non-existent data (a path leading to `null` is valid data). Rules are
//! written against whole families of structures, most of which contain only
//! some of the addressed fields.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::matching::data_match;
use crate::path::PathOps;
use crate::types::{JsonMap, Result};

// =============================================================================
// Rules
// =============================================================================

/// One declarative transformation. Guards absent means match-all; a rule
/// with no actions is inert but still counts as matched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rule {
    /// Patterns matched structurally against the whole case
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drivers: Option<Vec<Value>>,
    /// Patterns matched structurally against the argset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argsets: Option<Vec<Value>>,
    /// Paths to delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<Vec<String>>,
    /// Pairs of paths to flat mappings whose null-valued keys are mirrored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub even_up: Option<Vec<(String, String)>>,
    /// Re-render values through a format string (quantizes floats)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_str: Option<Vec<FormatStr>>,
    /// Replace one exact value with another
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<Vec<Exchange>>,
    /// Round numeric values to a decimal precision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<Vec<Round>>,
}

/// `format_str` action: render each path's value with `format`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatStr {
    pub format: String,
    pub paths: Vec<String>,
}

/// `exchange` action: where the value equals `old`, store `new`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub old: Value,
    pub new: Value,
    pub paths: Vec<String>,
}

/// `round` action: round to `digits` decimal places (half away from zero)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub digits: i32,
    pub paths: Vec<String>,
}

/// Rules are applied in order; all matching rules fire
pub type Ruleset = Vec<Rule>;

// =============================================================================
// Case
// =============================================================================

/// Per-comparison working record. Throwaway: lives for one comparator
/// evaluation and is mutated in place by hacks. The oracle/result trees are
/// deep copies, so hacks never touch the cached driver output.
#[derive(Debug, Clone)]
pub struct Case {
    root: Value,
    paths: PathOps,
}

impl Case {
    pub fn new(
        argset: &JsonMap,
        oracle: &JsonMap,
        result: &JsonMap,
        oname: &str,
        rname: &str,
    ) -> Self {
        let root = json!({
            "argset": argset.clone(),
            "oracle": oracle.clone(),
            "result": result.clone(),
            "oname": oname,
            "rname": rname,
        });
        Self {
            root,
            paths: PathOps::default(),
        }
    }

    pub fn argset(&self) -> &Value {
        &self.root["argset"]
    }

    pub fn oracle(&self) -> &Value {
        &self.root["oracle"]
    }

    pub fn result(&self) -> &Value {
        &self.root["result"]
    }

    pub fn oname(&self) -> &str {
        self.root["oname"].as_str().unwrap_or_default()
    }

    pub fn rname(&self) -> &str {
        self.root["rname"].as_str().unwrap_or_default()
    }

    /// The whole case tree, as seen by `drivers` guard patterns
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Apply every matching rule of `ruleset`. Returns whether any rule
    /// matched, whether or not its actions changed anything.
    pub fn hack(&mut self, ruleset: &[Rule]) -> Result<bool> {
        let mut matched = false;
        for rule in ruleset {
            if !self.rule_applies(rule)? {
                continue;
            }
            matched = true;
            if let Some(paths) = &rule.remove {
                self.apply_remove(paths);
            }
            if let Some(pairs) = &rule.even_up {
                self.apply_even_up(pairs);
            }
            if let Some(specs) = &rule.format_str {
                self.apply_format_str(specs);
            }
            if let Some(specs) = &rule.exchange {
                self.apply_exchange(specs);
            }
            if let Some(specs) = &rule.round {
                self.apply_round(specs);
            }
        }
        Ok(matched)
    }

    fn rule_applies(&self, rule: &Rule) -> Result<bool> {
        if let Some(patterns) = &rule.drivers {
            if !self.any_matches(patterns, &self.root)? {
                return Ok(false);
            }
        }
        if let Some(patterns) = &rule.argsets {
            if !self.any_matches(patterns, self.argset())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn any_matches(&self, patterns: &[Value], data: &Value) -> Result<bool> {
        for pattern in patterns {
            if data_match(pattern, data)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    fn apply_remove(&mut self, paths: &[String]) {
        for path in paths {
            let _ = self.paths.del(&mut self.root, path);
        }
    }

    /// Even up the structure of two flat mappings: a key present on exactly
    /// one side whose value there is null gets a null entry on the other
    /// side. Asymmetric keys with non-null values are left alone.
    fn apply_even_up(&mut self, pairs: &[(String, String)]) {
        for (path_a, path_b) in pairs {
            let (Ok(side_a), Ok(side_b)) = (
                self.paths.get(&self.root, path_a),
                self.paths.get(&self.root, path_b),
            ) else {
                continue;
            };
            let (Some(map_a), Some(map_b)) = (side_a.as_object(), side_b.as_object()) else {
                continue;
            };

            let mut fill_a = Vec::new();
            let mut fill_b = Vec::new();
            for key in map_a.keys().chain(map_b.keys()) {
                match (map_a.get(key), map_b.get(key)) {
                    (Some(Value::Null), None) => fill_b.push(key.clone()),
                    (None, Some(Value::Null)) => fill_a.push(key.clone()),
                    _ => {}
                }
            }

            for (path, fills) in [(path_a, fill_a), (path_b, fill_b)] {
                if fills.is_empty() {
                    continue;
                }
                if let Ok(Value::Object(map)) = self.paths.get_mut(&mut self.root, path) {
                    for key in fills {
                        map.insert(key, Value::Null);
                    }
                }
            }
        }
    }

    fn apply_format_str(&mut self, specs: &[FormatStr]) {
        for spec in specs {
            for path in &spec.paths {
                if let Ok(cur) = self.paths.get_mut(&mut self.root, path) {
                    if let Some(text) = format_value(&spec.format, cur) {
                        *cur = Value::String(text);
                    }
                }
            }
        }
    }

    fn apply_exchange(&mut self, specs: &[Exchange]) {
        for spec in specs {
            for path in &spec.paths {
                if let Ok(cur) = self.paths.get_mut(&mut self.root, path) {
                    if *cur == spec.old {
                        *cur = spec.new.clone();
                    }
                }
            }
        }
    }

    fn apply_round(&mut self, specs: &[Round]) {
        for spec in specs {
            let factor = 10f64.powi(spec.digits);
            for path in &spec.paths {
                if let Ok(cur) = self.paths.get_mut(&mut self.root, path) {
                    let Some(number) = cur.as_f64() else {
                        continue;
                    };
                    let rounded = (number * factor).round() / factor;
                    if let Some(num) = serde_json::Number::from_f64(rounded) {
                        *cur = Value::Number(num);
                    }
                }
            }
        }
    }
}

// =============================================================================
// Format Strings
// =============================================================================

/// printf-subset formatter: `%%`, `%s`, `%d`, `%f`, `%.Nf`. Returns `None`
/// when the format has no placeholder or the value does not fit the
/// conversion; the action then leaves the value alone.
fn format_value(fmt: &str, value: &Value) -> Option<String> {
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    let mut substituted = false;
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                digits.push(d);
                chars.next();
            }
            precision = digits.parse::<usize>().ok();
        }
        let rendered = match chars.next()? {
            's' => Some(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            'd' => value.as_f64().map(|v| format!("{}", v.trunc() as i64)),
            'f' => value.as_f64().map(|v| match precision {
                Some(p) => format!("{v:.p$}"),
                None => format!("{v:.6}"),
            }),
            _ => None,
        };
        out.push_str(&rendered?);
        substituted = true;
    }
    substituted.then_some(out)
}

// =============================================================================
// Tests
// =============================================================================
