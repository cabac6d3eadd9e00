//! Laser device.

use lsm_core::{AppResult, InstrumentError, LaserDriver, Variable, VariableSet};
use std::sync::Arc;
use tracing::debug;

/// A laser line with power and on/off control.
pub struct Laser {
    name: String,
    power: Variable<f64>,
    laser_on: Variable<bool>,
    power_on: Variable<bool>,
    wavelength: Variable<f64>,
    max_power_mw: f64,
    variables: VariableSet,
}

impl Laser {
    /// Wrap a laser driver. The laser starts switched off at 0 % power.
    pub fn new(name: impl Into<String>, driver: Arc<dyn LaserDriver>) -> AppResult<Self> {
        let name = name.into();

        let power = {
            let driver = driver.clone();
            Variable::new("power", 0.0)
                .with_units("%")
                .with_description("Target power as a percentage of maximum")
                .with_range(0.0, 100.0)
                .with_writer(move |p: &f64| driver.apply_power_percent(*p))
        };
        let laser_on = {
            let driver = driver.clone();
            Variable::new("laser_on", false)
                .with_writer(move |on: &bool| driver.apply_laser_on(*on))
        };
        let power_on = {
            let driver = driver.clone();
            Variable::new("power_on", false)
                .with_writer(move |on: &bool| driver.apply_power_on(*on))
        };
        let wavelength = Variable::new("wavelength", driver.wavelength_nm())
            .with_units("nm")
            .read_only();

        for result in [power.set(0.0), laser_on.set(false), power_on.set(false)] {
            result.map_err(|e| InstrumentError::construction(name.clone(), e.into()))?;
        }

        let variables = VariableSet::new()
            .with(power.clone())
            .with(laser_on.clone())
            .with(power_on.clone())
            .with(wavelength.clone());

        debug!(laser = %name, wavelength_nm = driver.wavelength_nm(), "laser constructed");
        Ok(Self {
            name,
            power,
            laser_on,
            power_on,
            wavelength,
            max_power_mw: driver.max_power_mw(),
            variables,
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target power in percent (0-100)
    pub fn power(&self) -> &Variable<f64> {
        &self.power
    }

    /// Emission on/off
    pub fn laser_on(&self) -> &Variable<bool> {
        &self.laser_on
    }

    /// Power supply on/off
    pub fn power_on(&self) -> &Variable<bool> {
        &self.power_on
    }

    /// Wavelength in nm (read-only)
    pub fn wavelength(&self) -> &Variable<f64> {
        &self.wavelength
    }

    /// Maximum output power in mW
    pub fn max_power_mw(&self) -> f64 {
        self.max_power_mw
    }

    /// All variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::SimLaser;

    #[test]
    fn test_power_range_enforced() {
        let driver = Arc::new(SimLaser::new(488.0, 100.0));
        let laser = Laser::new("Laser488", driver.clone()).unwrap();

        laser.power().set(20.0).unwrap();
        assert_eq!(driver.state().power_percent, 20.0);

        assert!(laser.power().set(120.0).is_err());
        assert_eq!(laser.power().get(), 20.0);
        assert_eq!(driver.state().power_percent, 20.0);
    }

    #[test]
    fn test_on_off_written_through() {
        let driver = Arc::new(SimLaser::new(594.0, 100.0));
        let laser = Laser::new("Laser594", driver.clone()).unwrap();

        laser.laser_on().set(true).unwrap();
        laser.power_on().set(true).unwrap();
        let state = driver.state();
        assert!(state.laser_on);
        assert!(state.power_on);
        assert_eq!(laser.wavelength().get(), 594.0);
    }
}
