//! Stat Counters & Derived Formulas
//!
//! Generic counters plus per-driver counters, with derived quantities
//! registered as lazy formulas over `(generic, per_driver)` and evaluated
//! only when a snapshot is taken. Division by zero in a formula yields
//! `null` instead of poisoning the whole snapshot.
//!
//! Drivers auto-register on first update with zeroed `calls`, `rhacks`,
//! `ohacks`, `duration`, `overhead`; registration also installs the derived
//! per-driver and grand-total formulas.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

use crate::clock::SharedClock;
use crate::types::JsonMap;

/// Counters every driver starts with
pub const DRIVER_COUNTERS: [&str; 5] = ["calls", "rhacks", "ohacks", "duration", "overhead"];

/// Generic counter table: durations in fractional seconds, counts as whole
/// numbers
pub type GenericStats = BTreeMap<String, f64>;

/// Per-driver counter tables keyed by driver name
pub type DriverStats = BTreeMap<String, BTreeMap<String, f64>>;

type Formula = Box<dyn Fn(&GenericStats, &DriverStats) -> Option<Value>>;

// =============================================================================
// Stat Counter
// =============================================================================

pub struct StatCounter {
    generic: GenericStats,
    drivers: DriverStats,
    formulas: BTreeMap<String, Formula>,
    clock: SharedClock,
    born: Duration,
}

impl StatCounter {
    pub fn new(clock: SharedClock) -> Self {
        let born = clock.now();
        Self {
            generic: GenericStats::new(),
            drivers: DriverStats::new(),
            formulas: BTreeMap::new(),
            clock,
            born,
        }
    }

    /// Add a value to a generic counter
    pub fn add(&mut self, name: &str, value: f64) {
        *self.generic.entry(name.to_string()).or_insert(0.0) += value;
    }

    /// Alias for `add(name, 1)`
    pub fn count(&mut self, name: &str) {
        self.add(name, 1.0);
    }

    /// Add a value to a driver counter, registering the driver on first use
    pub fn add_for(&mut self, driver: &str, name: &str, value: f64) {
        if !self.drivers.contains_key(driver) {
            self.register(driver);
        }
        if let Some(counters) = self.drivers.get_mut(driver) {
            *counters.entry(name.to_string()).or_insert(0.0) += value;
        }
    }

    /// Alias for `add_for(driver, name, 1)`
    pub fn count_for(&mut self, driver: &str, name: &str) {
        self.add_for(driver, name, 1.0);
    }

    /// Register a derived quantity evaluated at snapshot time
    pub fn add_formula<F>(&mut self, name: impl Into<String>, formula: F)
    where
        F: Fn(&GenericStats, &DriverStats) -> Option<Value> + 'static,
    {
        self.formulas.insert(name.into(), Box::new(formula));
    }

    pub fn generic(&self) -> &GenericStats {
        &self.generic
    }

    fn register(&mut self, driver: &str) {
        let zeroed = DRIVER_COUNTERS
            .iter()
            .map(|name| (name.to_string(), 0.0))
            .collect();
        self.drivers.insert(driver.to_string(), zeroed);

        // cumulative duration/overhead, rounded to ms
        for counter in ["overhead", "duration"] {
            let dname = driver.to_string();
            self.add_formula(format!("{driver}_{counter}"), move |_, d| {
                Some(ms(d.get(&dname)?.get(counter).copied()?))
            });
        }

        // per-call averages; null until the driver has been called
        for counter in ["overhead", "duration"] {
            let dname = driver.to_string();
            self.add_formula(format!("{driver}_{counter}_per_call"), move |_, d| {
                let stats = d.get(&dname)?;
                let calls = stats.get("calls").copied().unwrap_or(0.0);
                if calls == 0.0 {
                    return None;
                }
                Some(ms(stats.get(counter).copied()? / calls))
            });
        }

        // grand totals: total driver time, loop overhead, on_next cost
        self.add_formula("gtotal_drivertime", |_, d| Some(ms(drivertime(d))));

        let clock = SharedClock::clone(&self.clock);
        let born = self.born;
        self.add_formula("gtotal_loop_overhead", move |g, d| {
            let age = clock.now().saturating_sub(born).as_secs_f64();
            let onnext = g.get("on_next").copied().unwrap_or(0.0);
            Some(Value::from(
                as_ms(age) - as_ms(drivertime(d)) - as_ms(onnext),
            ))
        });
        self.add_formula("gtotal_loop_onnext", |g, _| {
            Some(ms(g.get("on_next").copied().unwrap_or(0.0)))
        });

        // percentage of cases touched by at least one hack, two decimals
        self.add_formula("cases_hacked", |g, _| {
            let cases = g.get("cases").copied().unwrap_or(0.0);
            if cases == 0.0 {
                return None;
            }
            let hacked = g.get("hacked_cases").copied().unwrap_or(0.0);
            let percent = (100.0 * hacked / cases * 100.0).round() / 100.0;
            serde_json::Number::from_f64(percent).map(Value::Number)
        });
    }

    /// Snapshot: generic counters, flattened driver counters
    /// (`DriverName_counter`) and every formula, formulas taking precedence
    /// on name collisions.
    pub fn all_stats(&self) -> JsonMap {
        let mut stats = JsonMap::new();
        for (name, value) in &self.generic {
            stats.insert(name.clone(), num(*value));
        }
        for (driver, counters) in &self.drivers {
            for (name, value) in counters {
                stats.insert(format!("{driver}_{name}"), num(*value));
            }
        }
        for (name, formula) in &self.formulas {
            let value = formula(&self.generic, &self.drivers).unwrap_or(Value::Null);
            stats.insert(name.clone(), value);
        }
        stats
    }
}

fn drivertime(drivers: &DriverStats) -> f64 {
    drivers
        .values()
        .map(|counters| {
            counters.get("overhead").copied().unwrap_or(0.0)
                + counters.get("duration").copied().unwrap_or(0.0)
        })
        .sum()
}

fn as_ms(seconds: f64) -> i64 {
    (1000.0 * seconds) as i64
}

fn ms(seconds: f64) -> Value {
    Value::from(as_ms(seconds))
}

/// Counters are whole numbers unless they accumulated fractional seconds
fn num(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

// =============================================================================
// Tests
// =============================================================================
