//! Stack camera device.

use lsm_core::{AppResult, CameraDriver, InstrumentError, Variable, VariableSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Values applied to a camera right after construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraDefaults {
    /// Stack width in pixels
    pub stack_width: u32,
    /// Stack height in pixels
    pub stack_height: u32,
    /// Exposure time in seconds
    pub exposure_s: f64,
}

impl Default for CameraDefaults {
    fn default() -> Self {
        Self {
            stack_width: 1024,
            stack_height: 2048,
            exposure_s: 0.010,
        }
    }
}

/// Camera acquiring image stacks for one detection arm.
///
/// Width, height, exposure and trigger mode write through to the driver.
/// Pixel size is read once from the driver and is read-only.
pub struct StackCamera {
    name: String,
    model: String,
    stack_width: Variable<u32>,
    stack_height: Variable<u32>,
    exposure: Variable<f64>,
    pixel_size: Variable<f64>,
    external_trigger: Variable<bool>,
    variables: VariableSet,
}

impl StackCamera {
    /// Wrap a driver and apply `defaults` through it.
    ///
    /// # Errors
    ///
    /// `Construction` if the driver rejects any default.
    pub fn new(
        name: impl Into<String>,
        driver: Arc<dyn CameraDriver>,
        defaults: CameraDefaults,
    ) -> AppResult<Self> {
        let name = name.into();
        // Seeded from defaults: a single-axis write always sends a full ROI.
        let roi = Arc::new(Mutex::new((defaults.stack_width, defaults.stack_height)));

        let stack_width = {
            let driver = driver.clone();
            let roi = roi.clone();
            Variable::new("stack_width", 0u32)
                .with_units("px")
                .with_validator(|w: &u32| {
                    anyhow::ensure!(*w > 0, "stack width must be positive");
                    Ok(())
                })
                .with_writer(move |w: &u32| {
                    let mut roi = roi.lock();
                    driver.apply_roi(*w, roi.1)?;
                    roi.0 = *w;
                    Ok(())
                })
        };

        let stack_height = {
            let driver = driver.clone();
            let roi = roi.clone();
            Variable::new("stack_height", 0u32)
                .with_units("px")
                .with_validator(|h: &u32| {
                    anyhow::ensure!(*h > 0, "stack height must be positive");
                    Ok(())
                })
                .with_writer(move |h: &u32| {
                    let mut roi = roi.lock();
                    driver.apply_roi(roi.0, *h)?;
                    roi.1 = *h;
                    Ok(())
                })
        };

        let exposure = {
            let driver = driver.clone();
            Variable::new("exposure", 0.0)
                .with_units("s")
                .with_description("Exposure time")
                .with_validator(|s: &f64| {
                    anyhow::ensure!(s.is_finite() && *s > 0.0, "exposure must be positive");
                    Ok(())
                })
                .with_writer(move |s: &f64| driver.apply_exposure(*s))
        };

        let external_trigger = {
            let driver = driver.clone();
            Variable::new("external_trigger", false)
                .with_writer(move |on: &bool| driver.apply_external_trigger(*on))
        };

        let pixel_size = Variable::new("pixel_size", driver.pixel_size_um())
            .with_units("um")
            .read_only();

        let apply = |result: AppResult<()>| {
            result.map_err(|e| InstrumentError::construction(name.clone(), e.into()))
        };
        apply(stack_width.set(defaults.stack_width))?;
        apply(stack_height.set(defaults.stack_height))?;
        apply(exposure.set(defaults.exposure_s))?;

        let variables = VariableSet::new()
            .with(stack_width.clone())
            .with(stack_height.clone())
            .with(exposure.clone())
            .with(pixel_size.clone())
            .with(external_trigger.clone());

        debug!(camera = %name, model = %driver.model(), "camera constructed");
        Ok(Self {
            model: driver.model(),
            name,
            stack_width,
            stack_height,
            exposure,
            pixel_size,
            external_trigger,
            variables,
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Driver model string
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stack width in pixels
    pub fn stack_width(&self) -> &Variable<u32> {
        &self.stack_width
    }

    /// Stack height in pixels
    pub fn stack_height(&self) -> &Variable<u32> {
        &self.stack_height
    }

    /// Exposure time in seconds
    pub fn exposure(&self) -> &Variable<f64> {
        &self.exposure
    }

    /// Pixel size in micrometers (read-only)
    pub fn pixel_size(&self) -> &Variable<f64> {
        &self.pixel_size
    }

    /// External trigger mode
    pub fn external_trigger(&self) -> &Variable<bool> {
        &self.external_trigger
    }

    /// All variables
    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }
}
