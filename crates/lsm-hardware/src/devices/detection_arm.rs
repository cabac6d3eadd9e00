//! Detection arm device.

use lsm_core::{Variable, VariableSet};

/// Imaging path of one camera.
///
/// The pixel size is seeded once at construction (usually from the paired camera) and is
/// not linked to it afterwards.
pub struct DetectionArm {
    name: String,
    pixel_size: Variable<f64>,
    focus_z: Variable<f64>,
    variables: VariableSet,
}

impl DetectionArm {
    /// Create a detection arm with the given pixel size in micrometers.
    pub fn new(name: impl Into<String>, pixel_size_um: f64) -> Self {
        let pixel_size = Variable::new("pixel_size", pixel_size_um)
            .with_units("um")
            .with_validator(|p: &f64| {
                anyhow::ensure!(*p > 0.0, "pixel size must be positive");
                Ok(())
            });
        let focus_z = Variable::new("focus_z", 0.0).with_units("um");
        let variables = VariableSet::new()
            .with(pixel_size.clone())
            .with(focus_z.clone());

        Self {
            name: name.into(),
            pixel_size,
            focus_z,
            variables,
        }
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Effective pixel size in the sample plane (um)
    pub fn pixel_size(&self) -> &Variable<f64> {
        &self.pixel_size
    }

    /// Detection focus position (um)
    pub fn focus_z(&self) -> &Variable<f64> {
        &self.focus_z
    }

    /// All variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }
}
