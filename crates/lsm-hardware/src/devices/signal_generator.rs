//! Lightsheet signal generator.

use lsm_core::{AppResult, InstrumentError, SignalGeneratorDriver, Variable, VariableSet};
use std::sync::Arc;

const DEFAULT_SAMPLE_RATE_HZ: f64 = 100_000.0;
const DEFAULT_TRIGGER_PERIOD_S: f64 = 0.010;

/// Waveform generator driving the lightsheet scanners and camera triggers.
pub struct SignalGenerator {
    name: String,
    sample_rate: Variable<f64>,
    trigger_period: Variable<f64>,
    variables: VariableSet,
}

impl SignalGenerator {
    /// Wrap a signal generator driver.
    pub fn new(driver: Arc<dyn SignalGeneratorDriver>) -> AppResult<Self> {
        let name = driver.name();
        let positive = |v: &f64| {
            anyhow::ensure!(v.is_finite() && *v > 0.0, "value must be positive");
            Ok(())
        };

        let sample_rate = {
            let driver = driver.clone();
            Variable::new("sample_rate", DEFAULT_SAMPLE_RATE_HZ)
                .with_units("Hz")
                .with_validator(positive)
                .with_writer(move |hz: &f64| driver.apply_sample_rate(*hz))
        };
        let trigger_period = {
            let driver = driver.clone();
            Variable::new("trigger_period", DEFAULT_TRIGGER_PERIOD_S)
                .with_units("s")
                .with_validator(positive)
                .with_writer(move |s: &f64| driver.apply_trigger_period(*s))
        };

        sample_rate
            .set(DEFAULT_SAMPLE_RATE_HZ)
            .and_then(|_| trigger_period.set(DEFAULT_TRIGGER_PERIOD_S))
            .map_err(|e| InstrumentError::construction(name.clone(), e.into()))?;

        let variables = VariableSet::new()
            .with(sample_rate.clone())
            .with(trigger_period.clone());

        Ok(Self {
            name,
            sample_rate,
            trigger_period,
            variables,
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output sample rate (Hz)
    pub fn sample_rate(&self) -> &Variable<f64> {
        &self.sample_rate
    }

    /// Trigger period (s)
    pub fn trigger_period(&self) -> &Variable<f64> {
        &self.trigger_period
    }

    /// All variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }
}
