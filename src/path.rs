//! Path Addressing
//!
//! Unix-path-like addressing into nested JSON mappings, e.g.
//! `/oracle/stats/word_count`. "Directories" are object keys; the root is
//! whatever value the caller hands in. This is how hack rules point at
//! fields inside a [`Case`](crate::case::Case) without knowing the shape of
//! the structures around them.
//!
//! Every non-final segment must name an existing mapping; anything else is
//! [`PathNotFound`](crate::types::DredgeError::PathNotFound). `set` creates
//! the final key if absent but never creates intermediate mappings. A stored
//! `null` still exists.

use serde_json::Value;

use crate::types::{DredgeError, Result};

/// Path operations with a fixed separator (default `/`).
#[derive(Debug, Clone, Copy)]
pub struct PathOps {
    sep: char,
}

impl Default for PathOps {
    fn default() -> Self {
        Self { sep: '/' }
    }
}

impl PathOps {
    pub fn new(sep: char) -> Self {
        Self { sep }
    }

    fn segments<'p>(&self, path: &'p str) -> impl Iterator<Item = &'p str> {
        path.trim_start_matches(self.sep).split(self.sep)
    }

    /// Read the value at `path`
    pub fn get<'a>(&self, root: &'a Value, path: &str) -> Result<&'a Value> {
        let mut cur = root;
        for seg in self.segments(path) {
            cur = cur
                .as_object()
                .and_then(|map| map.get(seg))
                .ok_or_else(|| DredgeError::path_not_found(path))?;
        }
        Ok(cur)
    }

    /// Mutable cursor to the value at `path`
    pub fn get_mut<'a>(&self, root: &'a mut Value, path: &str) -> Result<&'a mut Value> {
        let mut cur = root;
        for seg in self.segments(path) {
            cur = cur
                .as_object_mut()
                .and_then(|map| map.get_mut(seg))
                .ok_or_else(|| DredgeError::path_not_found(path))?;
        }
        Ok(cur)
    }

    /// Write `value` at `path`, creating the final key if absent.
    /// Intermediate mappings are never created.
    pub fn set(&self, root: &mut Value, path: &str, value: Value) -> Result<()> {
        let segs: Vec<&str> = self.segments(path).collect();
        let (last, parents) = segs
            .split_last()
            .ok_or_else(|| DredgeError::path_not_found(path))?;
        let mut cur = root;
        for seg in parents {
            cur = cur
                .as_object_mut()
                .and_then(|map| map.get_mut(*seg))
                .ok_or_else(|| DredgeError::path_not_found(path))?;
        }
        cur.as_object_mut()
            .ok_or_else(|| DredgeError::path_not_found(path))?
            .insert((*last).to_string(), value);
        Ok(())
    }

    /// Delete the key at `path`, returning the removed value
    pub fn del(&self, root: &mut Value, path: &str) -> Result<Value> {
        let segs: Vec<&str> = self.segments(path).collect();
        let (last, parents) = segs
            .split_last()
            .ok_or_else(|| DredgeError::path_not_found(path))?;
        let mut cur = root;
        for seg in parents {
            cur = cur
                .as_object_mut()
                .and_then(|map| map.get_mut(*seg))
                .ok_or_else(|| DredgeError::path_not_found(path))?;
        }
        cur.as_object_mut()
            .and_then(|map| map.remove(*last))
            .ok_or_else(|| DredgeError::path_not_found(path))
    }

    /// True iff `get` would succeed. A stored `null` exists.
    pub fn exists(&self, root: &Value, path: &str) -> bool {
        self.get(root, path).is_ok()
    }
}

// =============================================================================
// Tests
// =============================================================================
