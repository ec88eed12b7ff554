//! Driver Protocol
//!
//! A driver is the abstraction and encapsulation of one system under test
//! (or a mock providing reference data). Implementations only have to
//! provide [`Driver::fetch`]; everything else has defaults.
//!
//! ## Trial lifecycle
//!
//! ```text
//! check_values(driver, argset)?;        // optional, to force bailouts ASAP
//! let mut trial = Trial::new();
//! trial.setup(driver, &settings, true)?;
//! trial.run(driver, &argset, &clock)?;
//! trial.data                            // decoded, normalized, checked
//! ```
//!
//! `run` re-checks the bailouts, validates mandatory args and settings,
//! measures `fetch`, then runs `decode` → `normalize` → `check` and finally
//! strips `_`-prefixed keys from the data. A driver that has a better
//! measurement of its own cost (e.g. it fronts a gateway and the gateway
//! reports server-side timing) can set [`Trial::duration`] itself during
//! `fetch`; otherwise the measured wall time of the `fetch` call is used, so
//! decode and transport overhead never pollute the figure.
//!
//! ## Bailouts
//!
//! When exhaustive enumeration produces argsets a driver cannot (or need
//! not) handle - an unsupported flag combination, a division by zero - a
//! named [`Bailout`] predicate lets the driver skip them. The engine counts
//! the bailout and produces no case for any pair referencing the driver on
//! that argset.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::types::{DredgeError, DriverFailure, JsonMap, Result};

/// Outcome of a driver hook; anything the transport throws can bubble up
pub type HookResult = std::result::Result<(), DriverFailure>;

/// A named predicate declaring argsets the driver will not handle
pub struct Bailout {
    pub name: &'static str,
    pub pred: fn(&JsonMap) -> bool,
}

// =============================================================================
// Driver Trait
// =============================================================================

/// Per-trial execution contract. The engine owns trial lifetimes; driver
/// values themselves are stateless prototypes shared across argsets.
pub trait Driver {
    /// Driver class name; also the settings key prefix (`Name.option`)
    fn name(&self) -> &str;

    /// Static bailout predicates, checked before anything else runs
    fn bailouts(&self) -> &[Bailout] {
        &[]
    }

    /// Keys that must be present in every argset handed to `run`
    fn mandatory_args(&self) -> &[&str] {
        &[]
    }

    /// Keys that must be present in the trial settings after filtering
    fn mandatory_settings(&self) -> &[&str] {
        &[]
    }

    /// Obtain raw data into `trial.data`. The only hook without a default.
    fn fetch(&self, trial: &mut Trial) -> HookResult;

    /// Decode `trial.data` from whatever raw form `fetch` left it in
    fn decode(&self, _trial: &mut Trial) -> HookResult {
        Ok(())
    }

    /// Prepare data for comparison (sort, split, trim...)
    fn normalize(&self, _trial: &mut Trial) -> HookResult {
        Ok(())
    }

    /// Early failure detection on the final data
    fn check(&self, _trial: &Trial) -> HookResult {
        Ok(())
    }
}

/// Shared driver handle, as referenced by test pairs
pub type SharedDriver = Arc<dyn Driver + Send + Sync>;

/// Run the bailout predicates for `argset`. Usable before any trial state
/// exists; the engine calls this once per driver per argset.
pub fn check_values(driver: &dyn Driver, argset: &JsonMap) -> Result<()> {
    for bailout in driver.bailouts() {
        if (bailout.pred)(argset) {
            return Err(DredgeError::not_supported(driver.name(), bailout.name));
        }
    }
    Ok(())
}

// =============================================================================
// Trial
// =============================================================================

/// Mutable state of one driver execution against one argset. Created and
/// discarded per argset; drivers must not smuggle state across trials.
#[derive(Debug, Default)]
pub struct Trial {
    /// Driver output; `_`-prefixed keys are stripped after `check`
    pub data: JsonMap,
    /// Measured or driver-reported cost of `fetch`
    pub duration: Option<Duration>,
    args: JsonMap,
    settings: JsonMap,
    setup_done: bool,
}

impl Trial {
    pub fn new() -> Self {
        Self::default()
    }

    /// The argset this trial runs against
    pub fn args(&self) -> &JsonMap {
        &self.args
    }

    /// Filtered settings
    pub fn settings(&self) -> &JsonMap {
        &self.settings
    }

    /// Convenience accessor for one setting
    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }

    /// Load settings. With `only_own`, keep only `"DriverName.option"` keys
    /// whose prefix matches this driver, stripped of the prefix; unknown
    /// prefixes are silently ignored.
    pub fn setup(&mut self, driver: &dyn Driver, settings: &JsonMap, only_own: bool) -> Result<()> {
        if only_own {
            for (key, value) in settings {
                let Some((class_name, option)) = key.split_once('.') else {
                    return Err(DredgeError::BadSettingsKey { key: key.clone() });
                };
                if class_name == driver.name() {
                    self.settings.insert(option.to_string(), value.clone());
                }
            }
        } else {
            self.settings = settings.clone();
        }
        self.setup_done = true;
        Ok(())
    }

    /// Validate, execute and post-process one trial. See the module docs for
    /// the exact ordering.
    pub fn run(&mut self, driver: &dyn Driver, argset: &JsonMap, clock: &dyn Clock) -> Result<()> {
        if !self.setup_done {
            return Err(DredgeError::SetupRequired {
                driver: driver.name().to_string(),
            });
        }
        check_values(driver, argset)?;
        self.args = argset.clone();
        for key in driver.mandatory_args() {
            if !self.args.contains_key(*key) {
                return Err(DredgeError::MissingArg {
                    driver: driver.name().to_string(),
                    key: (*key).to_string(),
                });
            }
        }
        for key in driver.mandatory_settings() {
            if !self.settings.contains_key(*key) {
                return Err(DredgeError::MissingSetting {
                    driver: driver.name().to_string(),
                    key: (*key).to_string(),
                });
            }
        }

        let start = clock.now();
        if let Err(cause) = driver.fetch(self) {
            return Err(DredgeError::driver(
                driver.name(),
                self.args.clone(),
                self.settings.clone(),
                cause,
            ));
        }
        if self.duration.is_none() {
            self.duration = Some(clock.now().saturating_sub(start));
        }

        let staging = (|| -> HookResult {
            driver.decode(self)?;
            driver.normalize(self)?;
            driver.check(self)
        })();
        if let Err(cause) = staging {
            return Err(DredgeError::driver_data(
                driver.name(),
                self.args.clone(),
                self.data.clone(),
                cause,
            ));
        }

        self.data.retain(|key, _| !key.starts_with('_'));
        Ok(())
    }
}

/// One-shot convenience: set up, run, and hand back the interesting parts.
/// Returns `(data, duration, overhead)` where overhead is the wall time of
/// the whole trial minus the driver-attributed duration.
pub fn run_driver(
    driver: &dyn Driver,
    argset: &JsonMap,
    settings: &JsonMap,
    clock: &dyn Clock,
) -> Result<(JsonMap, Duration, Duration)> {
    let wall_start = clock.now();
    let mut trial = Trial::new();
    trial.setup(driver, settings, true)?;
    trial.run(driver, argset, clock)?;
    let duration = trial.duration.unwrap_or_default();
    let wall = clock.now().saturating_sub(wall_start);
    Ok((trial.data, duration, wall.saturating_sub(duration)))
}

// =============================================================================
// Tests
// =============================================================================
