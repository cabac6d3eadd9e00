//! Motorized axes and the composite three-axis stage.
//!
//! A [`ThreeAxisStage`] owns its own x/y/z variables and is chained to three
//! [`StageAxis`] devices through propagation links, so moving the composite stage moves
//! the physical axes without any explicit forwarding code.

use lsm_core::{AppResult, InstrumentError, StageAxisDriver, Variable, VariableSet};
use std::sync::Arc;
use tracing::debug;

/// One motorized axis. Also used for lightsheet beta-angle stages.
pub struct StageAxis {
    name: String,
    serial: u64,
    position: Variable<f64>,
    variables: VariableSet,
}

impl StageAxis {
    /// Wrap an axis driver, seeding the position from the controller.
    pub fn new(name: impl Into<String>, driver: Arc<dyn StageAxisDriver>) -> AppResult<Self> {
        let name = name.into();
        let initial = driver
            .position()
            .map_err(|e| InstrumentError::construction(name.clone(), e))?;

        let position = {
            let driver = driver.clone();
            Variable::new("position", initial)
                .with_validator(|p: &f64| {
                    anyhow::ensure!(p.is_finite(), "position must be finite");
                    Ok(())
                })
                .with_writer(move |p: &f64| driver.move_to(*p))
        };
        let variables = VariableSet::new().with(position.clone());

        debug!(axis = %name, serial = driver.serial(), "stage axis constructed");
        Ok(Self {
            name,
            serial: driver.serial(),
            position,
            variables,
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Controller serial number
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Axis position
    pub fn position(&self) -> &Variable<f64> {
        &self.position
    }

    /// All variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }
}

/// Sample stage composed of three chained axes.
pub struct ThreeAxisStage {
    name: String,
    x: Variable<f64>,
    y: Variable<f64>,
    z: Variable<f64>,
    axes: [Arc<StageAxis>; 3],
    variables: VariableSet,
}

impl ThreeAxisStage {
    /// Chain three axes (x, y, z) under one stage.
    ///
    /// Each composite coordinate starts at its axis position and is linked to it.
    pub fn new(
        name: impl Into<String>,
        x_axis: Arc<StageAxis>,
        y_axis: Arc<StageAxis>,
        z_axis: Arc<StageAxis>,
    ) -> AppResult<Self> {
        let x = Variable::new("x", x_axis.position().get()).with_units("mm");
        let y = Variable::new("y", y_axis.position().get()).with_units("mm");
        let z = Variable::new("z", z_axis.position().get()).with_units("mm");

        x.subscribe(x_axis.position())?;
        y.subscribe(y_axis.position())?;
        z.subscribe(z_axis.position())?;

        let variables = VariableSet::new()
            .with(x.clone())
            .with(y.clone())
            .with(z.clone());

        Ok(Self {
            name: name.into(),
            x,
            y,
            z,
            axes: [x_axis, y_axis, z_axis],
            variables,
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// X coordinate (mm)
    pub fn x(&self) -> &Variable<f64> {
        &self.x
    }

    /// Y coordinate (mm)
    pub fn y(&self) -> &Variable<f64> {
        &self.y
    }

    /// Z coordinate (mm)
    pub fn z(&self) -> &Variable<f64> {
        &self.z
    }

    /// Chained axes in x, y, z order
    pub fn axes(&self) -> &[Arc<StageAxis>; 3] {
        &self.axes
    }

    /// Move all three coordinates.
    pub fn move_to(&self, x: f64, y: f64, z: f64) -> AppResult<()> {
        self.x.set(x)?;
        self.y.set(y)?;
        self.z.set(z)
    }

    /// All variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::SimAxis;

    fn axis(name: &str, serial: u64) -> (Arc<StageAxis>, Arc<SimAxis>) {
        let driver = Arc::new(SimAxis::new(serial));
        (
            Arc::new(StageAxis::new(name, driver.clone()).unwrap()),
            driver,
        )
    }

    #[test]
    fn test_composite_stage_drives_axes() {
        let (x, xd) = axis("X", 1);
        let (y, yd) = axis("Y", 2);
        let (z, zd) = axis("Z", 3);
        let stage = ThreeAxisStage::new("Stage", x.clone(), y, z).unwrap();

        stage.move_to(1.5, -2.0, 0.25).unwrap();
        assert_eq!(x.position().get(), 1.5);
        assert_eq!(xd.position().unwrap(), 1.5);
        assert_eq!(yd.position().unwrap(), -2.0);
        assert_eq!(zd.position().unwrap(), 0.25);
        assert_eq!(stage.variables().link_count(), 3);
    }

    #[test]
    fn test_axis_rejects_non_finite() {
        let (x, xd) = axis("X", 1);
        assert!(x.position().set(f64::NAN).is_err());
        assert_eq!(xd.position().unwrap(), 0.0);
    }
}
