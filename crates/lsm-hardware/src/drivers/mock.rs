//! Simulated Hardware Implementations
//!
//! In-memory drivers for running the instrument without physical hardware.
//! Every driver records the last values applied to it so tests can check that
//! variable writes reached the driver.
//!
//! # Available Mocks
//!
//! - `SimCamera` - fixed pixel size, records ROI, exposure and trigger mode
//! - `SimLaser` - records power, emission and supply state
//! - `SimAxis` - moves instantly, reports the last target
//! - `SimSignalGenerator` - records sample rate and trigger period
//! - `SimulatedBackend` - [`DeviceBackend`] building the drivers above

use crate::backend::{AxisSpec, DeviceBackend, LaserSpec};
use anyhow::{anyhow, Result};
use lsm_core::{CameraDriver, LaserDriver, SignalGeneratorDriver, StageAxisDriver};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Pixel size reported by simulated cameras (um).
pub const SIM_PIXEL_SIZE_UM: f64 = 6.5;

// =============================================================================
// SimCamera
// =============================================================================

/// Last values applied to a [`SimCamera`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimCameraState {
    /// Region of interest (width, height) in pixels
    pub roi: (u32, u32),
    /// Exposure in seconds
    pub exposure_s: f64,
    /// External trigger mode
    pub external_trigger: bool,
}

/// Simulated stack camera.
pub struct SimCamera {
    index: usize,
    pixel_size_um: f64,
    failing: bool,
    state: Mutex<SimCameraState>,
}

impl SimCamera {
    /// Create a camera for detection arm `index`.
    pub fn new(index: usize, pixel_size_um: f64) -> Self {
        Self {
            index,
            pixel_size_um,
            failing: false,
            state: Mutex::new(SimCameraState::default()),
        }
    }

    /// Make every `apply_*` call fail.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Snapshot of applied values
    pub fn state(&self) -> SimCameraState {
        self.state.lock().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(anyhow!("simulated camera {} is not responding", self.index));
        }
        Ok(())
    }
}

impl CameraDriver for SimCamera {
    fn model(&self) -> String {
        format!("SimCamera-{}", self.index)
    }

    fn pixel_size_um(&self) -> f64 {
        self.pixel_size_um
    }

    fn apply_exposure(&self, seconds: f64) -> Result<()> {
        self.check()?;
        self.state.lock().exposure_s = seconds;
        Ok(())
    }

    fn apply_roi(&self, width: u32, height: u32) -> Result<()> {
        self.check()?;
        self.state.lock().roi = (width, height);
        Ok(())
    }

    fn apply_external_trigger(&self, external: bool) -> Result<()> {
        self.check()?;
        self.state.lock().external_trigger = external;
        Ok(())
    }
}

// =============================================================================
// SimLaser
// =============================================================================

/// Last values applied to a [`SimLaser`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimLaserState {
    /// Target power in percent
    pub power_percent: f64,
    /// Emission enabled
    pub laser_on: bool,
    /// Power supply enabled
    pub power_on: bool,
}

/// Simulated laser line.
pub struct SimLaser {
    wavelength_nm: f64,
    max_power_mw: f64,
    state: Mutex<SimLaserState>,
}

impl SimLaser {
    /// Create a laser line.
    pub fn new(wavelength_nm: f64, max_power_mw: f64) -> Self {
        Self {
            wavelength_nm,
            max_power_mw,
            state: Mutex::new(SimLaserState::default()),
        }
    }

    /// Snapshot of applied values
    pub fn state(&self) -> SimLaserState {
        self.state.lock().clone()
    }
}

impl LaserDriver for SimLaser {
    fn wavelength_nm(&self) -> f64 {
        self.wavelength_nm
    }

    fn max_power_mw(&self) -> f64 {
        self.max_power_mw
    }

    fn apply_power_percent(&self, percent: f64) -> Result<()> {
        self.state.lock().power_percent = percent;
        Ok(())
    }

    fn apply_laser_on(&self, on: bool) -> Result<()> {
        self.state.lock().laser_on = on;
        Ok(())
    }

    fn apply_power_on(&self, on: bool) -> Result<()> {
        self.state.lock().power_on = on;
        Ok(())
    }
}

// =============================================================================
// SimAxis
// =============================================================================

/// Simulated motorized axis. Moves are instantaneous.
pub struct SimAxis {
    serial: u64,
    position: Mutex<f64>,
}

impl SimAxis {
    /// Create an axis at position 0.
    pub fn new(serial: u64) -> Self {
        Self {
            serial,
            position: Mutex::new(0.0),
        }
    }
}

impl StageAxisDriver for SimAxis {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn move_to(&self, position: f64) -> Result<()> {
        *self.position.lock() = position;
        Ok(())
    }

    fn position(&self) -> Result<f64> {
        Ok(*self.position.lock())
    }
}

// =============================================================================
// SimSignalGenerator
// =============================================================================

/// Simulated waveform generator.
pub struct SimSignalGenerator {
    name: String,
    applied: Mutex<(f64, f64)>,
}

impl SimSignalGenerator {
    /// Create a generator.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied: Mutex::new((0.0, 0.0)),
        }
    }

    /// Last applied (sample rate Hz, trigger period s)
    pub fn applied(&self) -> (f64, f64) {
        *self.applied.lock()
    }
}

impl SignalGeneratorDriver for SimSignalGenerator {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn apply_sample_rate(&self, hz: f64) -> Result<()> {
        self.applied.lock().0 = hz;
        Ok(())
    }

    fn apply_trigger_period(&self, seconds: f64) -> Result<()> {
        self.applied.lock().1 = seconds;
        Ok(())
    }
}

// =============================================================================
// SimulatedBackend
// =============================================================================

/// Backend producing simulated drivers.
///
/// Keeps a handle to every driver it builds, so callers can inspect what the
/// assembled devices wrote through.
#[derive(Default)]
pub struct SimulatedBackend {
    failing_cameras: HashSet<usize>,
    cameras: Mutex<Vec<Arc<SimCamera>>>,
    lasers: Mutex<Vec<Arc<SimLaser>>>,
    axes: Mutex<Vec<Arc<SimAxis>>>,
    signal_generators: Mutex<Vec<Arc<SimSignalGenerator>>>,
}

impl SimulatedBackend {
    /// Create a backend with no injected faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the camera of detection arm `index` reject every write.
    pub fn fail_camera(mut self, index: usize) -> Self {
        self.failing_cameras.insert(index);
        self
    }

    /// Cameras built so far, in build order
    pub fn cameras(&self) -> Vec<Arc<SimCamera>> {
        self.cameras.lock().clone()
    }

    /// Lasers built so far, in build order
    pub fn lasers(&self) -> Vec<Arc<SimLaser>> {
        self.lasers.lock().clone()
    }

    /// Axes built so far, in build order
    pub fn axes(&self) -> Vec<Arc<SimAxis>> {
        self.axes.lock().clone()
    }

    /// Signal generators built so far
    pub fn signal_generators(&self) -> Vec<Arc<SimSignalGenerator>> {
        self.signal_generators.lock().clone()
    }
}

impl DeviceBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn camera(&self, index: usize) -> Result<Arc<dyn CameraDriver>> {
        let mut camera = SimCamera::new(index, SIM_PIXEL_SIZE_UM);
        if self.failing_cameras.contains(&index) {
            camera = camera.failing();
        }
        let camera = Arc::new(camera);
        self.cameras.lock().push(camera.clone());
        Ok(camera)
    }

    fn laser(&self, spec: &LaserSpec) -> Result<Arc<dyn LaserDriver>> {
        let laser = Arc::new(SimLaser::new(spec.wavelength_nm, spec.max_power_mw));
        self.lasers.lock().push(laser.clone());
        Ok(laser)
    }

    fn stage_axis(&self, spec: &AxisSpec) -> Result<Arc<dyn StageAxisDriver>> {
        let axis = Arc::new(SimAxis::new(spec.serial));
        self.axes.lock().push(axis.clone());
        Ok(axis)
    }

    fn signal_generator(&self, name: &str) -> Result<Arc<dyn SignalGeneratorDriver>> {
        let generator = Arc::new(SimSignalGenerator::new(name));
        self.signal_generators.lock().push(generator.clone());
        Ok(generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_tracks_built_drivers() {
        let backend = SimulatedBackend::new();
        let camera = backend.camera(0).unwrap();
        camera.apply_exposure(0.02).unwrap();

        assert_eq!(backend.cameras().len(), 1);
        assert_eq!(backend.cameras()[0].state().exposure_s, 0.02);
        assert_eq!(camera.pixel_size_um(), SIM_PIXEL_SIZE_UM);
    }

    #[test]
    fn test_fail_camera_only_affects_that_index() {
        let backend = SimulatedBackend::new().fail_camera(1);
        assert!(backend.camera(0).unwrap().apply_roi(10, 10).is_ok());
        assert!(backend.camera(1).unwrap().apply_roi(10, 10).is_err());
    }

    #[test]
    fn test_axis_moves() {
        let backend = SimulatedBackend::new();
        let axis = backend
            .stage_axis(&AxisSpec {
                name: "X".into(),
                serial: 26000278,
            })
            .unwrap();
        axis.move_to(3.0).unwrap();
        assert_eq!(axis.position().unwrap(), 3.0);
        assert_eq!(axis.serial(), 26000278);
    }
}
