//! Device roles and driver capability contracts.
//!
//! Physical drivers live outside this workspace. The instrument core only talks to
//! them through the small traits below, one per device family:
//!
//! - A camera driver implements [`CameraDriver`]
//! - A laser driver implements [`LaserDriver`]
//! - A motorized axis (translation or angle) implements [`StageAxisDriver`]
//! - A waveform generator implements [`SignalGeneratorDriver`]
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is synchronous (writes are short register updates, acquisition is not modelled here)
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Focuses on ONE device family
//!
//! Devices wrap a driver and expose its settings as reactive variables. A variable's
//! writer hook forwards each accepted value to the matching `apply_*` call.

use anyhow::Result;
use serde::{Deserialize, Serialize};

// =============================================================================
// Device Kind
// =============================================================================

/// Device role tag used to key the registry.
///
/// Replaces type-based lookup: every registered device carries exactly one kind, and
/// `(kind, index)` identifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Stack camera, one per detection arm
    Camera,
    /// Laser line
    Laser,
    /// Single motorized axis chained into a composite stage
    StageAxis,
    /// Composite three-axis sample stage
    Stage,
    /// Beta-angle stage, one per lightsheet
    AngleStage,
    /// Detection arm, one per camera
    DetectionArm,
    /// Illumination lightsheet, one per channel
    LightSheet,
    /// Lightsheet selector
    OpticalSwitch,
    /// Lightsheet waveform generator
    SignalGenerator,
}

/// Whether a kind holds a single shared device or one device per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceScope {
    /// Exactly one device per instrument, registered at index 0
    Global,
    /// One device per channel, indexed from 0
    PerChannel,
}

impl DeviceKind {
    /// All kinds, in registry ordering.
    pub const ALL: [DeviceKind; 9] = [
        DeviceKind::Camera,
        DeviceKind::Laser,
        DeviceKind::StageAxis,
        DeviceKind::Stage,
        DeviceKind::AngleStage,
        DeviceKind::DetectionArm,
        DeviceKind::LightSheet,
        DeviceKind::OpticalSwitch,
        DeviceKind::SignalGenerator,
    ];

    /// Registry scope of this kind.
    pub fn scope(&self) -> DeviceScope {
        match self {
            Self::Stage | Self::OpticalSwitch | Self::SignalGenerator => DeviceScope::Global,
            _ => DeviceScope::PerChannel,
        }
    }

    /// Short machine-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Laser => "laser",
            Self::StageAxis => "stage_axis",
            Self::Stage => "stage",
            Self::AngleStage => "angle_stage",
            Self::DetectionArm => "detection_arm",
            Self::LightSheet => "lightsheet",
            Self::OpticalSwitch => "optical_switch",
            Self::SignalGenerator => "signal_generator",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Driver Contracts
// =============================================================================

/// Stack camera driver.
pub trait CameraDriver: Send + Sync {
    /// Model string reported by the driver
    fn model(&self) -> String;

    /// Physical pixel size in micrometers.
    fn pixel_size_um(&self) -> f64;

    /// Apply exposure time in seconds.
    fn apply_exposure(&self, seconds: f64) -> Result<()>;

    /// Apply stack region of interest in pixels.
    fn apply_roi(&self, width: u32, height: u32) -> Result<()>;

    /// Select external (true) or internal (false) triggering.
    fn apply_external_trigger(&self, external: bool) -> Result<()>;
}

/// Laser driver.
pub trait LaserDriver: Send + Sync {
    /// Emission wavelength in nanometers
    fn wavelength_nm(&self) -> f64;

    /// Maximum output power in milliwatts
    fn max_power_mw(&self) -> f64;

    /// Apply target power as a percentage 0-100.
    fn apply_power_percent(&self, percent: f64) -> Result<()>;

    /// Switch emission on or off.
    fn apply_laser_on(&self, on: bool) -> Result<()>;

    /// Switch the laser power supply on or off.
    fn apply_power_on(&self, on: bool) -> Result<()>;
}

/// Single motorized axis (translation in mm or rotation in degrees).
pub trait StageAxisDriver: Send + Sync {
    /// Controller serial number
    fn serial(&self) -> u64;

    /// Move to an absolute position.
    fn move_to(&self, position: f64) -> Result<()>;

    /// Current position as reported by the controller.
    fn position(&self) -> Result<f64>;
}

/// Waveform generator driving the lightsheet scanners.
pub trait SignalGeneratorDriver: Send + Sync {
    /// Device name
    fn name(&self) -> String;

    /// Apply output sample rate in Hz.
    fn apply_sample_rate(&self, hz: f64) -> Result<()>;

    /// Apply trigger period in seconds.
    fn apply_trigger_period(&self, seconds: f64) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes() {
        assert_eq!(DeviceKind::OpticalSwitch.scope(), DeviceScope::Global);
        assert_eq!(DeviceKind::SignalGenerator.scope(), DeviceScope::Global);
        assert_eq!(DeviceKind::Camera.scope(), DeviceScope::PerChannel);
        assert_eq!(DeviceKind::LightSheet.scope(), DeviceScope::PerChannel);
    }

    #[test]
    fn test_kind_ordering_is_stable() {
        let mut kinds = DeviceKind::ALL.to_vec();
        kinds.reverse();
        kinds.sort();
        assert_eq!(kinds, DeviceKind::ALL.to_vec());
    }

    #[test]
    fn test_kind_serde_roundtrip_label() {
        let json = serde_json::to_value(DeviceKind::DetectionArm).unwrap();
        assert_eq!(json, serde_json::json!("detection_arm"));
        assert_eq!(DeviceKind::DetectionArm.to_string(), "detection_arm");
    }
}
