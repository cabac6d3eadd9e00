//! Device backend contract.
//!
//! A backend builds the drivers behind each logical device role. The assembly asks
//! the selected backend for drivers and never names a concrete driver type, so the
//! same wiring runs against real hardware or against
//! [`SimulatedBackend`](crate::drivers::mock::SimulatedBackend).

use anyhow::Result;
use lsm_core::{CameraDriver, LaserDriver, SignalGeneratorDriver, StageAxisDriver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Laser line description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserSpec {
    /// Laser name (e.g., "Laser488")
    pub name: String,
    /// Emission wavelength in nm
    pub wavelength_nm: f64,
    /// Maximum output power in mW
    pub max_power_mw: f64,
}

/// Motorized axis description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    /// Axis name (e.g., "XKCubeStage")
    pub name: String,
    /// Controller serial number
    pub serial: u64,
}

/// Factory for device drivers.
pub trait DeviceBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Whether the drivers are simulated.
    fn is_simulated(&self) -> bool;

    /// Driver for the camera of detection arm `index`.
    fn camera(&self, index: usize) -> Result<Arc<dyn CameraDriver>>;

    /// Driver for a laser line.
    fn laser(&self, spec: &LaserSpec) -> Result<Arc<dyn LaserDriver>>;

    /// Driver for a motorized axis.
    fn stage_axis(&self, spec: &AxisSpec) -> Result<Arc<dyn StageAxisDriver>>;

    /// Driver for the lightsheet signal generator.
    fn signal_generator(&self, name: &str) -> Result<Arc<dyn SignalGeneratorDriver>>;
}
