//! Regression Engine
//!
//! The orchestrator. Pulls argsets from a source, runs every referenced
//! driver at most once per argset (caching the outputs), then evaluates each
//! configured [`TestTriple`] - comparator, oracle driver, result driver -
//! against deep-copied cases. Mismatches are rendered as contextual diffs
//! and deduplicated in the returned [`Tracker`].
//!
//! ```ignore
//! let triples = vec![TestTriple::new(
//!     Comparator::equality(),
//!     Arc::new(PyCalcDriver),
//!     Arc::new(CgiCalcDriver),
//! )];
//! let tracker = Engine::new(triples, settings).run(argsets)?;
//! if tracker.errors_found() {
//!     panic!("{}", tracker.format_report(20));
//! }
//! ```
//!
//! Execution is single-threaded and sequential; ordering is the argset
//! enumeration order crossed with the configured triple order. The engine
//! recovers only from driver bailouts - driver failures abort the run and
//! surface to the caller. There is no cancellation: to stop early, stop
//! yielding argsets.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::case::{Case, Ruleset};
use crate::clock::{SharedClock, shared_clock};
use crate::diff::js_diff;
use crate::driver::{SharedDriver, check_values, run_driver};
use crate::stats::StatCounter;
use crate::tracker::Tracker;
use crate::types::{DredgeError, JsonMap, Result};

// =============================================================================
// Comparator
// =============================================================================

/// Named equivalence between oracle and result trees. Cleanup hacks only
/// run for non-equality comparators (structural equality has nothing
/// irrelevant to strip).
#[derive(Clone)]
pub struct Comparator {
    name: String,
    equality: bool,
    func: Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>,
}

impl Comparator {
    /// Structural equality of the two trees
    pub fn equality() -> Self {
        Self {
            name: "eq".to_string(),
            equality: true,
            func: Arc::new(|oracle, result| oracle == result),
        }
    }

    /// A custom (non-equality) equivalence
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            equality: false,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_equality(&self) -> bool {
        self.equality
    }

    pub fn matches(&self, oracle: &Value, result: &Value) -> bool {
        (self.func)(oracle, result)
    }
}

impl std::fmt::Debug for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comparator")
            .field("name", &self.name)
            .field("equality", &self.equality)
            .finish()
    }
}

// =============================================================================
// Test Triple
// =============================================================================

/// One configured comparison: the oracle is the presumed-correct reference,
/// the result is the implementation under test.
#[derive(Clone)]
pub struct TestTriple {
    pub comparator: Comparator,
    pub oracle: SharedDriver,
    pub result: SharedDriver,
}

impl TestTriple {
    pub fn new(comparator: Comparator, oracle: SharedDriver, result: SharedDriver) -> Self {
        Self {
            comparator,
            oracle,
            result,
        }
    }
}

/// Callback invoked between argsets with `(current, previous)`
pub type OnNext = Box<dyn FnMut(&JsonMap, Option<&JsonMap>)>;

// =============================================================================
// Engine
// =============================================================================

pub struct Engine {
    triples: Vec<TestTriple>,
    settings: JsonMap,
    apply_hacks: Vec<Ruleset>,
    cleanup_hack: Option<Ruleset>,
    on_next: Option<OnNext>,
    clock: SharedClock,
}

impl Engine {
    pub fn new(triples: Vec<TestTriple>, settings: JsonMap) -> Self {
        Self {
            triples,
            settings,
            apply_hacks: Vec::new(),
            cleanup_hack: None,
            on_next: None,
            clock: shared_clock(),
        }
    }

    /// Rulesets applied to every case before comparison
    pub fn with_apply_hacks(mut self, hacks: Vec<Ruleset>) -> Self {
        self.apply_hacks = hacks;
        self
    }

    /// Ruleset applied after a mismatch under a non-equality comparator, to
    /// strip comparison-irrelevant data from the report
    pub fn with_cleanup_hack(mut self, hack: Ruleset) -> Self {
        self.cleanup_hack = Some(hack);
        self
    }

    /// Callback invoked after pulling each argset, with the previous one
    pub fn with_on_next<F>(mut self, on_next: F) -> Self
    where
        F: FnMut(&JsonMap, Option<&JsonMap>) + 'static,
    {
        self.on_next = Some(Box::new(on_next));
        self
    }

    /// Replace the real clock (tests inject a frozen one)
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Drive the whole regression: consume `argsrc`, compare every triple on
    /// every argset, and return the tracker with the final stats attached.
    pub fn run<I>(mut self, argsrc: I) -> Result<Tracker>
    where
        I: IntoIterator<Item = JsonMap>,
    {
        let mut tracker = Tracker::new(SharedClock::clone(&self.clock));
        let mut counter = StatCounter::new(SharedClock::clone(&self.clock));

        // the union of driver classes across triples, keyed (and ordered) by
        // class name; each runs at most once per argset
        let mut drivers: BTreeMap<String, SharedDriver> = BTreeMap::new();
        for triple in &self.triples {
            for driver in [&triple.oracle, &triple.result] {
                drivers
                    .entry(driver.name().to_string())
                    .or_insert_with(|| Arc::clone(driver));
            }
        }
        debug!(
            triples = self.triples.len(),
            drivers = drivers.len(),
            "regression run starting"
        );

        let mut last_argset: Option<JsonMap> = None;
        for argset in argsrc {
            let on_start = self.clock.now();
            if let Some(on_next) = self.on_next.as_mut() {
                on_next(&argset, last_argset.as_ref());
            }
            counter.add(
                "on_next",
                self.clock.now().saturating_sub(on_start).as_secs_f64(),
            );

            // load the data first, only once for each driver
            let mut data: BTreeMap<String, JsonMap> = BTreeMap::new();
            for (name, driver) in &drivers {
                if let Err(err) = check_values(driver.as_ref(), &argset) {
                    if !err.is_bailout() {
                        return Err(err);
                    }
                    debug!(driver = %name, %err, "bailout");
                    counter.count_for(name, "bailouts");
                    continue;
                }
                let (output, duration, overhead) = run_driver(
                    driver.as_ref(),
                    &argset,
                    &self.settings,
                    self.clock.as_ref(),
                )?;
                counter.count_for(name, "calls");
                counter.add_for(name, "duration", duration.as_secs_f64());
                counter.add_for(name, "overhead", overhead.as_secs_f64());
                data.insert(name.clone(), output);
            }

            for triple in &self.triples {
                let oname = triple.oracle.name();
                let rname = triple.result.name();
                // skip the pair if either class bailed out on this argset
                let (Some(oracle_data), Some(result_data)) = (data.get(oname), data.get(rname))
                else {
                    continue;
                };

                let mut case = Case::new(&argset, oracle_data, result_data, oname, rname);

                let mut hacks_done = 0usize;
                for ruleset in &self.apply_hacks {
                    if case.hack(ruleset)? {
                        hacks_done += 1;
                    }
                }
                counter.add_for(oname, "ohacks", hacks_done as f64);
                counter.add_for(rname, "rhacks", hacks_done as f64);
                counter.add("hacks", hacks_done as f64);
                counter.add("hacked_cases", if hacks_done > 0 { 1.0 } else { 0.0 });

                let mut fingerprint = None;
                if !triple.comparator.matches(case.oracle(), case.result()) {
                    // strip normally-ignored data so it does not clutter the
                    // report; a cleanup that makes the comparison pass means
                    // the ruleset is misconfigured
                    if !triple.comparator.is_equality() {
                        if let Some(cleanup) = &self.cleanup_hack {
                            case.hack(cleanup)?;
                            if triple.comparator.matches(case.oracle(), case.result()) {
                                return Err(DredgeError::CleanupAte {
                                    oracle: oname.to_string(),
                                    result: rname.to_string(),
                                });
                            }
                        }
                    }
                    let diff = js_diff(case.oracle(), case.result(), oname, rname);
                    debug!(
                        comparator = %triple.comparator.name(),
                        oracle = %oname,
                        result = %rname,
                        eid = %Tracker::eid(&diff),
                        "mismatch"
                    );
                    fingerprint = Some(diff);
                }

                tracker.update(fingerprint, &argset);
                counter.count("cases");
            }

            tracker.argset_done();
            counter.count("argsets");
            let argset_value = Value::Object(argset.clone());
            trace!(argset = %argset_value, "argset done");
            last_argset = Some(argset);
        }

        tracker.attach_driver_stats(counter.all_stats());
        debug!(
            errors = tracker.errors_found(),
            "regression run finished"
        );
        Ok(tracker)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::Rule;
    use crate::clock::ManualClock;
    use crate::driver::{Bailout, Driver, HookResult, Trial};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn map(value: Value) -> JsonMap {
        value.as_object().cloned().unwrap()
    }

    fn argsets(ops: &[&str], avals: &[i64], bvals: &[i64]) -> Vec<JsonMap> {
        let mut out = Vec::new();
        for op in ops {
            for a in avals {
                for b in bvals {
                    out.push(map(json!({"op": op, "a": a, "b": b})));
                }
            }
        }
        out
    }

    fn calc(op: &str, a: i64, b: i64) -> std::result::Result<i64, String> {
        match op {
            "add" => Ok(a + b),
            "sub" => Ok(a - b),
            "mul" => Ok(a * b),
            "div" => Ok(a / b),
            other => Err(format!("unknown op: {other}")),
        }
    }

    fn calc_args(trial: &Trial) -> std::result::Result<(String, i64, i64), String> {
        let args = trial.args();
        let op = args["op"].as_str().ok_or("op is not a string")?;
        let a = args["a"].as_i64().ok_or("a is not an integer")?;
        let b = args["b"].as_i64().ok_or("b is not an integer")?;
        Ok((op.to_string(), a, b))
    }

    fn zerodiv(argset: &JsonMap) -> bool {
        argset.get("op") == Some(&json!("div")) && argset.get("b") == Some(&json!(0))
    }

    const ZERODIV: &[Bailout] = &[Bailout {
        name: "bailout_on_zerodiv",
        pred: zerodiv,
    }];

    /// Reference arithmetic; counts fetches for the single-fetch property
    #[derive(Default)]
    struct GoodCalc {
        fetches: AtomicUsize,
    }

    impl Driver for GoodCalc {
        fn name(&self) -> &str {
            "GoodCalc"
        }
        fn bailouts(&self) -> &[Bailout] {
            ZERODIV
        }
        fn mandatory_args(&self) -> &[&str] {
            &["op", "a", "b"]
        }
        fn fetch(&self, trial: &mut Trial) -> HookResult {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            let (op, a, b) = calc_args(trial)?;
            trial
                .data
                .insert("result".into(), json!(calc(&op, a, b)?));
            Ok(())
        }
    }

    /// Deliberately broken: multiplication is off by one
    struct WonkyCalc;

    impl Driver for WonkyCalc {
        fn name(&self) -> &str {
            "WonkyCalc"
        }
        fn bailouts(&self) -> &[Bailout] {
            ZERODIV
        }
        fn mandatory_args(&self) -> &[&str] {
            &["op", "a", "b"]
        }
        fn fetch(&self, trial: &mut Trial) -> HookResult {
            let (op, a, b) = calc_args(trial)?;
            let mut result = calc(&op, a, b)?;
            if op == "mul" {
                result += 1;
            }
            trial.data.insert("result".into(), json!(result));
            trial.data.insert("noise".into(), json!("transport junk"));
            Ok(())
        }
    }

    fn eq_triple() -> Vec<TestTriple> {
        vec![TestTriple::new(
            Comparator::equality(),
            Arc::new(GoodCalc::default()),
            Arc::new(WonkyCalc),
        )]
    }

    fn strip_noise() -> Ruleset {
        vec![Rule {
            remove: Some(vec!["/result/noise".into()]),
            ..Rule::default()
        }]
    }

    #[test]
    fn test_clean_run_finds_no_errors() {
        init_tracing();
        let tracker = Engine::new(eq_triple(), JsonMap::new())
            .with_apply_hacks(vec![strip_noise()])
            .run(argsets(&["add", "sub"], &[1, 2], &[3, 4]))
            .unwrap();
        assert!(!tracker.errors_found());
        let stats = tracker.getstats();
        assert_eq!(stats["argsets"], json!(8));
        assert_eq!(stats["tests_done"], json!(8));
        assert_eq!(stats["GoodCalc_calls"], json!(8));
        assert_eq!(stats["WonkyCalc_calls"], json!(8));
    }

    #[test]
    fn test_mismatches_are_tracked_and_deduplicated() {
        let tracker = Engine::new(eq_triple(), JsonMap::new())
            .with_apply_hacks(vec![strip_noise()])
            .run(argsets(&["add", "mul"], &[1, 2], &[3]))
            .unwrap();
        assert!(tracker.errors_found());
        let stats = tracker.getstats();
        // mul 1*3 and 2*3 each produce their own diff text
        assert_eq!(stats["distinct_errors"], json!(2));
        assert_eq!(stats["total_errors"], json!(2));
        assert_eq!(stats["tests_done"], json!(4));

        let report = tracker.format_report(0);
        assert!(report.contains("GoodCalc"));
        assert!(report.contains("WonkyCalc"));
        assert!(report.contains("\"result\": 3"));
        assert!(report.contains("\"result\": 4"));
    }

    #[test]
    fn test_fingerprints_are_stable_across_runs() {
        let run = || {
            Engine::new(eq_triple(), JsonMap::new())
                .with_apply_hacks(vec![strip_noise()])
                .run(argsets(&["add", "mul"], &[1, 2], &[3]))
                .unwrap()
        };
        let first = run();
        let second = run();
        let fps_first: Vec<_> = first.fingerprints().collect();
        let fps_second: Vec<_> = second.fingerprints().collect();
        assert_eq!(fps_first, fps_second);
        for fp in fps_first {
            assert_eq!(first.affected(fp), second.affected(fp));
        }
    }

    #[test]
    fn test_bailout_skips_driver_and_pair() {
        let tracker = Engine::new(eq_triple(), JsonMap::new())
            .run(vec![map(json!({"op": "div", "a": 1, "b": 0}))])
            .unwrap();
        // both drivers bail, no case is produced
        assert!(!tracker.errors_found());
        let stats = tracker.getstats();
        assert_eq!(stats["tests_done"], json!(0));
        assert_eq!(stats["argsets"], json!(1));
        assert_eq!(stats["GoodCalc_bailouts"], json!(1));
        assert_eq!(stats["WonkyCalc_bailouts"], json!(1));
        assert_eq!(stats["GoodCalc_calls"], json!(0));
    }

    #[test]
    fn test_single_fetch_per_argset_across_triples() {
        let good = Arc::new(GoodCalc::default());
        let wonky: SharedDriver = Arc::new(WonkyCalc);
        // two triples referencing the same oracle class
        let triples = vec![
            TestTriple::new(
                Comparator::equality(),
                Arc::clone(&good) as SharedDriver,
                Arc::clone(&wonky),
            ),
            TestTriple::new(
                Comparator::new("result_only", |o, r| o["result"] == r["result"]),
                Arc::clone(&good) as SharedDriver,
                wonky,
            ),
        ];
        let source = argsets(&["add", "sub"], &[1, 2, 3], &[5]);
        let count = source.len();
        let tracker = Engine::new(triples, JsonMap::new())
            .with_apply_hacks(vec![strip_noise()])
            .run(source)
            .unwrap();
        assert_eq!(good.fetches.load(Ordering::Relaxed), count);
        assert_eq!(tracker.getstats()["tests_done"], json!(2 * count));
    }

    #[test]
    fn test_hack_accounting() {
        let tracker = Engine::new(eq_triple(), JsonMap::new())
            .with_apply_hacks(vec![strip_noise()])
            .run(argsets(&["add"], &[1, 2], &[3]))
            .unwrap();
        let stats = tracker.getstats();
        assert_eq!(stats["hacks"], json!(2));
        assert_eq!(stats["hacked_cases"], json!(2));
        assert_eq!(stats["cases_hacked"], json!(100.0));
        assert_eq!(stats["GoodCalc_ohacks"], json!(2));
        assert_eq!(stats["WonkyCalc_rhacks"], json!(2));
    }

    #[test]
    fn test_cleanup_hack_strips_report_clutter() {
        let triples = vec![TestTriple::new(
            Comparator::new("result_only", |o, r| o["result"] == r["result"]),
            Arc::new(GoodCalc::default()),
            Arc::new(WonkyCalc),
        )];
        let tracker = Engine::new(triples, JsonMap::new())
            .with_cleanup_hack(strip_noise())
            .run(argsets(&["mul"], &[2], &[3]))
            .unwrap();
        assert!(tracker.errors_found());
        let fingerprint = tracker.fingerprints().next().unwrap();
        // the cleanup removed the noise field before the diff was rendered
        assert!(!fingerprint.contains("transport junk"));
        assert!(fingerprint.contains("\"result\": 6"));
        assert!(fingerprint.contains("\"result\": 7"));
    }

    #[test]
    fn test_cleanup_eating_the_error_is_fatal() {
        let triples = vec![TestTriple::new(
            Comparator::new("result_only", |o, r| o["result"] == r["result"]),
            Arc::new(GoodCalc::default()),
            Arc::new(WonkyCalc),
        )];
        // "cleanup" that papers over the actual difference
        let cleanup = vec![Rule {
            exchange: Some(vec![crate::case::Exchange {
                old: json!(7),
                new: json!(6),
                paths: vec!["/result/result".into()],
            }]),
            ..Rule::default()
        }];
        let err = Engine::new(triples, JsonMap::new())
            .with_cleanup_hack(cleanup)
            .run(argsets(&["mul"], &[2], &[3]));
        assert!(matches!(err, Err(DredgeError::CleanupAte { .. })));
    }

    #[test]
    fn test_on_next_sees_current_and_previous() {
        let seen: Arc<std::sync::Mutex<Vec<(Value, Option<Value>)>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let source = argsets(&["add"], &[1, 2], &[3]);
        Engine::new(eq_triple(), JsonMap::new())
            .with_apply_hacks(vec![strip_noise()])
            .with_on_next(move |current, previous| {
                sink.lock().unwrap().push((
                    Value::Object(current.clone()),
                    previous.cloned().map(Value::Object),
                ));
            })
            .run(source.clone())
            .unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, Value::Object(source[0].clone()));
        assert_eq!(seen[0].1, None);
        assert_eq!(seen[1].1, Some(Value::Object(source[0].clone())));
    }

    #[test]
    fn test_driver_failure_aborts_the_run() {
        struct Exploding;
        impl Driver for Exploding {
            fn name(&self) -> &str {
                "Exploding"
            }
            fn fetch(&self, _trial: &mut Trial) -> HookResult {
                Err("kaboom".into())
            }
        }
        let triples = vec![TestTriple::new(
            Comparator::equality(),
            Arc::new(GoodCalc::default()),
            Arc::new(Exploding),
        )];
        let err = Engine::new(triples, JsonMap::new()).run(argsets(&["add"], &[1], &[1]));
        assert!(matches!(err, Err(DredgeError::Driver { .. })));
    }

    #[test]
    fn test_settings_are_filtered_per_driver() {
        struct Echo;
        impl Driver for Echo {
            fn name(&self) -> &str {
                "Echo"
            }
            fn mandatory_settings(&self) -> &[&str] {
                &["tag"]
            }
            fn fetch(&self, trial: &mut Trial) -> HookResult {
                let tag = trial.setting("tag").cloned().ok_or("tag is unset")?;
                trial.data.insert("tag".into(), tag);
                Ok(())
            }
        }
        struct Fixed;
        impl Driver for Fixed {
            fn name(&self) -> &str {
                "Fixed"
            }
            fn fetch(&self, trial: &mut Trial) -> HookResult {
                trial.data.insert("tag".into(), json!("marker"));
                Ok(())
            }
        }
        let settings = map(json!({"Echo.tag": "marker", "Other.tag": "wrong"}));
        let triples = vec![TestTriple::new(
            Comparator::equality(),
            Arc::new(Fixed),
            Arc::new(Echo),
        )];
        let tracker = Engine::new(triples, settings)
            .run(vec![JsonMap::new()])
            .unwrap();
        assert!(!tracker.errors_found());
    }

    #[test]
    fn test_frozen_clock_zeroes_timing_stats() {
        let clock = Arc::new(ManualClock::new());
        let tracker = Engine::new(eq_triple(), JsonMap::new())
            .with_apply_hacks(vec![strip_noise()])
            .with_clock(clock)
            .run(argsets(&["add"], &[1], &[2]))
            .unwrap();
        let stats = tracker.getstats();
        assert_eq!(stats["GoodCalc_duration"], json!(0));
        assert_eq!(stats["gtotal_drivertime"], json!(0));
        assert_eq!(stats["time"], json!(0));
    }
}
