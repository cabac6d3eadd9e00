//! Lightsheet device.
//!
//! Geometry and timing of one illumination channel. `effective_exposure` and
//! `image_height` are normally driven by the paired cameras through propagation links
//! rather than written directly.

use lsm_core::{Variable, VariableSet};

/// One illumination lightsheet.
pub struct LightSheet {
    name: String,
    x: Variable<f64>,
    y: Variable<f64>,
    z: Variable<f64>,
    alpha: Variable<f64>,
    beta: Variable<f64>,
    width: Variable<f64>,
    height: Variable<f64>,
    power: Variable<f64>,
    effective_exposure: Variable<f64>,
    image_height: Variable<u32>,
    lambda: Variable<f64>,
    laser_on: Vec<Variable<bool>>,
    variables: VariableSet,
}

impl LightSheet {
    /// Create a lightsheet with wavelength `lambda_um` and one on/off flag per laser line.
    pub fn new(name: impl Into<String>, lambda_um: f64, laser_lines: usize) -> Self {
        let x = Variable::new("x", 0.0).with_units("um");
        let y = Variable::new("y", 0.0).with_units("um");
        let z = Variable::new("z", 0.0).with_units("um");
        let alpha = Variable::new("alpha", 0.0).with_units("deg");
        let beta = Variable::new("beta", 0.0).with_units("deg");
        let width = Variable::new("width", 0.0)
            .with_description("Sheet width as a fraction of the field")
            .with_range(0.0, 1.0);
        let height = Variable::new("height", 500.0).with_units("um");
        let power = Variable::new("power", 1.0)
            .with_description("Relative power")
            .with_range(0.0, 1.0);
        let effective_exposure = Variable::new("effective_exposure", 0.0)
            .with_units("s")
            .with_validator(|s: &f64| {
                anyhow::ensure!(*s >= 0.0, "exposure cannot be negative");
                Ok(())
            });
        let image_height = Variable::new("image_height", 0u32).with_units("px");
        let lambda = Variable::new("lambda", lambda_um)
            .with_units("um")
            .read_only();
        let laser_on: Vec<Variable<bool>> = (0..laser_lines)
            .map(|i| Variable::new(format!("laser_on_{}", i), false))
            .collect();

        let mut variables = VariableSet::new()
            .with(x.clone())
            .with(y.clone())
            .with(z.clone())
            .with(alpha.clone())
            .with(beta.clone())
            .with(width.clone())
            .with(height.clone())
            .with(power.clone())
            .with(effective_exposure.clone())
            .with(image_height.clone())
            .with(lambda.clone());
        for flag in &laser_on {
            variables.register(flag.clone());
        }

        Self {
            name: name.into(),
            x,
            y,
            z,
            alpha,
            beta,
            width,
            height,
            power,
            effective_exposure,
            image_height,
            lambda,
            laser_on,
            variables,
        }
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lateral position (um)
    pub fn x(&self) -> &Variable<f64> {
        &self.x
    }

    /// Vertical position (um)
    pub fn y(&self) -> &Variable<f64> {
        &self.y
    }

    /// Axial position (um)
    pub fn z(&self) -> &Variable<f64> {
        &self.z
    }

    /// In-plane angle (deg)
    pub fn alpha(&self) -> &Variable<f64> {
        &self.alpha
    }

    /// Out-of-plane angle (deg)
    pub fn beta(&self) -> &Variable<f64> {
        &self.beta
    }

    /// Sheet width, fraction of field (0-1)
    pub fn width(&self) -> &Variable<f64> {
        &self.width
    }

    /// Sheet height (um)
    pub fn height(&self) -> &Variable<f64> {
        &self.height
    }

    /// Relative power (0-1)
    pub fn power(&self) -> &Variable<f64> {
        &self.power
    }

    /// Effective exposure (s), driven by camera exposure
    pub fn effective_exposure(&self) -> &Variable<f64> {
        &self.effective_exposure
    }

    /// Image height (px), driven by camera stack height
    pub fn image_height(&self) -> &Variable<u32> {
        &self.image_height
    }

    /// Wavelength (um, read-only)
    pub fn lambda(&self) -> &Variable<f64> {
        &self.lambda
    }

    /// Per-laser-line on/off flags
    pub fn laser_on(&self) -> &[Variable<bool>] {
        &self.laser_on
    }

    /// All variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_laser_flags_sized_to_lines() {
        let sheet = LightSheet::new("I0", 9.4, 2);
        assert_eq!(sheet.laser_on().len(), 2);
        assert!(sheet.variables().get("laser_on_1").is_some());
        assert_eq!(sheet.lambda().get(), 9.4);
    }

    #[test]
    fn test_width_range() {
        let sheet = LightSheet::new("I0", 9.4, 0);
        sheet.width().set(0.45).unwrap();
        assert!(sheet.width().set(1.5).is_err());
        assert_eq!(sheet.width().get(), 0.45);
    }
}
