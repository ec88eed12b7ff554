//! Canonical JSON & Contextual Diff
//!
//! The comparison pipeline renders both driver outputs as canonical JSON
//! (sorted keys, 4-space indent) and diffs them line by line. Instead of
//! proximity context the way a unified diff would, the output keeps only the
//! breadcrumb trail of structural opener lines needed to locate each change,
//! so a two-value difference buried in a large structure reads as a short
//! story:
//!
//! ```text
//! aaa ~/A
//!  {
//!      "x": [
//! a        2,
//! bbb ~/B
//!  {
//!      "x": [
//! b        1,
//! ```
//!
//! `-`/`+` markers are rewritten to `a`/`b` (configurable) so the output is
//! never mistaken for an applicable patch. The text is byte-deterministic
//! for equal inputs and doubles as the failure fingerprint.

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};

// =============================================================================
// Canonical Dump
// =============================================================================

/// Human-readable canonical JSON: sorted keys, 4-space indent, `": "` and
/// `", "` separators. Sorting falls out of the BTree-backed object map.
pub fn canonical_json(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    if value.serialize(&mut ser).is_err() {
        return value.to_string();
    }
    String::from_utf8(buf).unwrap_or_default()
}

// =============================================================================
// Context Tracker
// =============================================================================

/// One structural level: the opener line that introduced it, emitted at most
/// once.
struct Level {
    hint: Option<String>,
    hinted: bool,
}

/// Tracks the most recent opener line at each indentation level while
/// scanning diff body lines. Indentation in canonical JSON moves one level
/// per line, so a single push/pop per line is sufficient.
struct ContextTracker {
    trace: Vec<Level>,
    last_line: Option<String>,
    last_indent: isize,
}

impl ContextTracker {
    fn new() -> Self {
        Self {
            trace: Vec::new(),
            last_line: None,
            last_indent: -1,
        }
    }

    fn check(&mut self, marker: char, content: &str) {
        let indent = (content.len() - content.trim_start_matches(' ').len()) as isize;
        if indent > self.last_indent {
            self.trace.push(Level {
                hint: self.last_line.clone(),
                hinted: false,
            });
        } else if indent < self.last_indent {
            self.trace.pop();
        }
        self.last_line = Some(format!("{marker}{content}"));
        self.last_indent = indent;
    }

    /// Breadcrumbs for every enclosing level not yet shown, outermost first
    fn pending_hints(&mut self) -> Vec<String> {
        let mut hints = Vec::new();
        for level in &mut self.trace {
            if !level.hinted {
                level.hinted = true;
                if let Some(hint) = &level.hint {
                    hints.push(hint.clone());
                }
            }
        }
        hints
    }
}

// =============================================================================
// Diff
// =============================================================================

/// Contextual diff of two values with the default `a`/`b` markers.
pub fn js_diff(a: &Value, b: &Value, name_a: &str, name_b: &str) -> String {
    js_diff_with(a, b, name_a, name_b, 'a', 'b')
}

/// Contextual diff with caller-chosen side markers.
pub fn js_diff_with(
    a: &Value,
    b: &Value,
    name_a: &str,
    name_b: &str,
    char_a: char,
    char_b: char,
) -> String {
    let dump_a = canonical_json(a);
    let dump_b = canonical_json(b);

    let mut buf_a = vec![format!("{0}{0}{0} ~/{1}", char_a, name_a)];
    let mut buf_b = vec![format!("{0}{0}{0} ~/{1}", char_b, name_b)];
    let mut tracker = ContextTracker::new();

    for change in diff::lines(&dump_a, &dump_b) {
        let (marker, content) = match change {
            diff::Result::Both(line, _) => (' ', line),
            diff::Result::Left(line) => ('-', line),
            diff::Result::Right(line) => ('+', line),
        };
        tracker.check(marker, content);
        if marker != ' ' {
            for hint in tracker.pending_hints() {
                buf_a.push(hint.clone());
                buf_b.push(hint);
            }
        }
        match marker {
            '-' => buf_a.push(format!("{char_a}{content}")),
            '+' => buf_b.push(format!("{char_b}{content}")),
            _ => {}
        }
    }

    let mut lines = buf_a;
    lines.extend(buf_b);
    lines.join("\n")
}

// =============================================================================
// Tests
// =============================================================================
