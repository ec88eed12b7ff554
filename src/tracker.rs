//! Error Tracker
//!
//! Deduplicating in-memory database of failures seen during a regression
//! run, keyed by fingerprint (the diff text). Two failures are the same
//! error iff their fingerprints are byte-identical, so fingerprints must be
//! deterministic - no timestamps, no volatile values.
//!
//! Each distinct error gets a short stable handle, its **EID**: the first 7
//! lowercase hex digits of the SHA-1 of the fingerprint (inspired by git).
//! Affected argsets are kept in insertion order per bucket. In bigger runs
//! argset lists grow large, so [`Tracker::format_report`] can truncate them
//! and [`Tracker::write_args_csv`] exports the full lists, one CSV per EID,
//! for analysis in a table processor.

use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::clock::SharedClock;
use crate::types::{JsonMap, Result};

// =============================================================================
// Tracker
// =============================================================================

pub struct Tracker {
    db: IndexMap<String, Vec<JsonMap>>,
    tests_done: u64,
    argsets_done: u64,
    driver_stats: JsonMap,
    clock: SharedClock,
    start: Duration,
}

impl Tracker {
    pub fn new(clock: SharedClock) -> Self {
        let start = clock.now();
        Self {
            db: IndexMap::new(),
            tests_done: 0,
            argsets_done: 0,
            driver_stats: JsonMap::new(),
            clock,
            start,
        }
    }

    /// Record one test result. A non-empty fingerprint files `argset` under
    /// its bucket; `None` (or an empty string) just counts the test.
    pub fn update(&mut self, result: Option<String>, argset: &JsonMap) {
        self.tests_done += 1;
        if let Some(fingerprint) = result {
            if !fingerprint.is_empty() {
                self.db.entry(fingerprint).or_default().push(argset.clone());
            }
        }
    }

    /// Count one fully processed argset
    pub fn argset_done(&mut self) {
        self.argsets_done += 1;
    }

    /// Attach the final stats snapshot from the engine's counter
    pub fn attach_driver_stats(&mut self, stats: JsonMap) {
        self.driver_stats = stats;
    }

    pub fn errors_found(&self) -> bool {
        !self.db.is_empty()
    }

    /// Distinct fingerprints, in first-seen order
    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.db.keys().map(String::as_str)
    }

    /// Argsets filed under one fingerprint, in insertion order
    pub fn affected(&self, fingerprint: &str) -> Option<&[JsonMap]> {
        self.db.get(fingerprint).map(Vec::as_slice)
    }

    /// EID: first 7 lowercase hex digits of the fingerprint's SHA-1
    pub fn eid(fingerprint: &str) -> String {
        let digest = Sha1::digest(fingerprint.as_bytes());
        let mut hex = String::with_capacity(8);
        for byte in digest.iter().take(4) {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex.truncate(7);
        hex
    }

    // -------------------------------------------------------------------------
    // Stats
    // -------------------------------------------------------------------------

    /// Basic stats plus the attached driver stats.
    ///
    /// - `argsets`: unique argsets processed
    /// - `tests_done`: how many times `update` was called
    /// - `distinct_errors` / `total_errors`: bucket count / total filed
    /// - `time`: whole seconds since the tracker was created
    pub fn getstats(&self) -> JsonMap {
        let total_errors: usize = self.db.values().map(Vec::len).sum();
        let age: Duration = self.clock.now().saturating_sub(self.start);

        let mut stats = JsonMap::new();
        stats.insert("argsets".into(), Value::from(self.argsets_done));
        stats.insert("tests_done".into(), Value::from(self.tests_done));
        stats.insert("distinct_errors".into(), Value::from(self.db.len()));
        stats.insert("total_errors".into(), Value::from(total_errors));
        stats.insert("time".into(), Value::from(age.as_secs()));
        stats.extend(self.driver_stats.clone());
        stats
    }

    // -------------------------------------------------------------------------
    // Report
    // -------------------------------------------------------------------------

    /// Complete report: summary line plus one section per distinct error.
    /// `max_aa` caps the listed argsets per error (0 = all); truncated lists
    /// point at the per-error CSV.
    pub fn format_report(&self, max_aa: usize) -> String {
        let stats = self.getstats();
        let mut report = format!(
            "Found {total} ({distinct} distinct) errors in {tests} tests \
             with {argsets} argsets (duration: {time}s):\n",
            total = stats["total_errors"],
            distinct = stats["distinct_errors"],
            tests = stats["tests_done"],
            argsets = stats["argsets"],
            time = stats["time"],
        );
        for (fingerprint, affected) in &self.db {
            report.push('\n');
            report.push_str(&self.format_error(fingerprint, affected, max_aa));
        }
        report
    }

    fn format_error(&self, fingerprint: &str, affected: &[JsonMap], max_aa: usize) -> String {
        let eid = Self::eid(fingerprint);
        let mut lines: Vec<String> = affected
            .iter()
            .take(if max_aa == 0 { affected.len() } else { max_aa })
            .map(|argset| Value::Object(argset.clone()).to_string())
            .collect();
        if max_aa > 0 && affected.len() > max_aa {
            lines.push(format!(
                "[...] not showing {} cases, see {}.csv for full list",
                affected.len() - max_aa,
                eid
            ));
        }
        format!(
            "~~~ ERROR FOUND ({eid}) ~~~~~~~~~~~~~~~~~~~~~~~~~\n\
             --- error string: -----------------------------------\n\
             {fingerprint}\n\
             --- argsets affected ({count}) ---------------------------\n\
             {listing}\n",
            count = affected.len(),
            listing = lines.join("\n"),
        )
    }

    // -------------------------------------------------------------------------
    // CSV Export
    // -------------------------------------------------------------------------

    /// Append a header row and one data row to `path`; columns are the
    /// stats keys, sorted lexicographically.
    pub fn write_stats_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let stats = self.getstats();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(stats.keys())?;
        writer.write_record(stats.values().map(csv_cell))?;
        writer.flush()?;
        Ok(())
    }

    /// One CSV per distinct error, named `<prefix>/<eid>.csv`. All files
    /// share one schema: the sorted union of argset keys across every
    /// bucket; missing keys are empty cells.
    pub fn write_args_csv(&self, prefix: impl AsRef<Path>) -> Result<()> {
        let mut columns: Vec<&str> = Vec::new();
        for affected in self.db.values() {
            for argset in affected {
                for key in argset.keys() {
                    if !columns.contains(&key.as_str()) {
                        columns.push(key);
                    }
                }
            }
        }
        columns.sort_unstable();

        for (fingerprint, affected) in &self.db {
            let path = prefix
                .as_ref()
                .join(format!("{}.csv", Self::eid(fingerprint)));
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(&columns)?;
            for argset in affected {
                writer.write_record(
                    columns
                        .iter()
                        .map(|column| argset.get(*column).map(csv_cell).unwrap_or_default()),
                )?;
            }
            writer.flush()?;
        }
        Ok(())
    }
}

/// Scalars render plain, containers as compact JSON, null as empty
fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
