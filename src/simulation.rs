//! Deterministic, controlled failures: fail one business key exactly N times, then
//! succeed forever after.
//!
//! The simulator is an explicit object: inject it in the handlers that should fail and
//! build a fresh one for every test case.
use crate::configuration::FailureSimulationSettings;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// A failure injected by [`FailureSimulator`].
///
/// It is always recoverable: the message succeeds once it has been redelivered enough times.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Simulated failure for {key} (attempt {attempt}/{fail_n_times})")]
pub struct SimulatedFailure {
    /// The business key that was made to fail.
    pub key: String,
    /// Which failure this is, from 1 to `fail_n_times`.
    pub attempt: u32,
    pub fail_n_times: u32,
}

/// Per-key attempt counter driving controlled failures.
///
/// For the configured target key the first `fail_n_times` checks fail, every later check
/// succeeds. Any other key never fails.
#[derive(Debug)]
pub struct FailureSimulator {
    settings: FailureSimulationSettings,
    attempts_by_key: Mutex<HashMap<String, u32>>,
}

impl FailureSimulator {
    pub fn new(settings: FailureSimulationSettings) -> Self {
        Self {
            settings,
            attempts_by_key: Mutex::new(HashMap::new()),
        }
    }

    /// A simulator that never fails.
    pub fn disabled() -> Self {
        Self::new(FailureSimulationSettings::default())
    }

    pub fn settings(&self) -> &FailureSimulationSettings {
        &self.settings
    }

    /// Returns `true` (and records the attempt) if processing for `key` should fail.
    pub fn should_fail(&self, key: &str) -> bool {
        self.check(key).is_err()
    }

    /// Same decision as [`FailureSimulator::should_fail`], but the failure carries the attempt
    /// number so that it can be reported.
    ///
    /// The counter for `key` is only incremented when a failure is returned.
    pub fn check(&self, key: &str) -> Result<(), SimulatedFailure> {
        let settings = &self.settings;
        if !settings.enabled || key != settings.target_key {
            return Ok(());
        }

        let mut attempts_by_key = self
            .attempts_by_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let attempts = attempts_by_key.entry(key.to_owned()).or_insert(0);
        if *attempts >= settings.fail_n_times {
            return Ok(());
        }
        *attempts += 1;

        Err(SimulatedFailure {
            key: key.to_owned(),
            attempt: *attempts,
            fail_n_times: settings.fail_n_times,
        })
    }

    /// How many failures have been injected so far for `key`.
    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts_by_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for FailureSimulator {
    fn default() -> Self {
        Self::disabled()
    }
}
