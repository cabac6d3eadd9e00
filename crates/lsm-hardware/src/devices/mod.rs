//! Device variants.
//!
//! Each variant owns a fixed set of [`Variable`](lsm_core::Variable)s listed in its
//! [`VariableSet`]. The registry stores them behind [`Device`], a closed enum tagged by
//! [`DeviceKind`], so lookup never needs runtime type reflection.

pub mod camera;
pub mod detection_arm;
pub mod laser;
pub mod lightsheet;
pub mod optical_switch;
pub mod signal_generator;
pub mod stage;

pub use camera::{CameraDefaults, StackCamera};
pub use detection_arm::DetectionArm;
pub use laser::Laser;
pub use lightsheet::LightSheet;
pub use optical_switch::OpticalSwitch;
pub use signal_generator::SignalGenerator;
pub use stage::{StageAxis, ThreeAxisStage};

use lsm_core::{DeviceKind, VariableSet};
use std::sync::Arc;

/// A registered device.
///
/// Cloning is cheap; every clone refers to the same device instance.
#[derive(Clone)]
pub enum Device {
    /// Stack camera of a detection arm
    Camera(Arc<StackCamera>),
    /// Laser line
    Laser(Arc<Laser>),
    /// Single axis chained under the sample stage
    StageAxis(Arc<StageAxis>),
    /// Three-axis sample stage
    Stage(Arc<ThreeAxisStage>),
    /// Beta-angle stage of a lightsheet
    AngleStage(Arc<StageAxis>),
    /// Detection arm
    DetectionArm(Arc<DetectionArm>),
    /// Illumination lightsheet
    LightSheet(Arc<LightSheet>),
    /// Lightsheet optical switch
    OpticalSwitch(Arc<OpticalSwitch>),
    /// Signal generator
    SignalGenerator(Arc<SignalGenerator>),
}

impl Device {
    /// Role tag of this device.
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Camera(_) => DeviceKind::Camera,
            Device::Laser(_) => DeviceKind::Laser,
            Device::StageAxis(_) => DeviceKind::StageAxis,
            Device::Stage(_) => DeviceKind::Stage,
            Device::AngleStage(_) => DeviceKind::AngleStage,
            Device::DetectionArm(_) => DeviceKind::DetectionArm,
            Device::LightSheet(_) => DeviceKind::LightSheet,
            Device::OpticalSwitch(_) => DeviceKind::OpticalSwitch,
            Device::SignalGenerator(_) => DeviceKind::SignalGenerator,
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        match self {
            Device::Camera(d) => d.name(),
            Device::Laser(d) => d.name(),
            Device::StageAxis(d) | Device::AngleStage(d) => d.name(),
            Device::Stage(d) => d.name(),
            Device::DetectionArm(d) => d.name(),
            Device::LightSheet(d) => d.name(),
            Device::OpticalSwitch(d) => d.name(),
            Device::SignalGenerator(d) => d.name(),
        }
    }

    /// Variables exposed by this device.
    pub fn variables(&self) -> &VariableSet {
        match self {
            Device::Camera(d) => d.variables(),
            Device::Laser(d) => d.variables(),
            Device::StageAxis(d) | Device::AngleStage(d) => d.variables(),
            Device::Stage(d) => d.variables(),
            Device::DetectionArm(d) => d.variables(),
            Device::LightSheet(d) => d.variables(),
            Device::OpticalSwitch(d) => d.variables(),
            Device::SignalGenerator(d) => d.variables(),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl From<StackCamera> for Device {
    fn from(d: StackCamera) -> Self {
        Device::Camera(Arc::new(d))
    }
}

impl From<Laser> for Device {
    fn from(d: Laser) -> Self {
        Device::Laser(Arc::new(d))
    }
}

impl From<ThreeAxisStage> for Device {
    fn from(d: ThreeAxisStage) -> Self {
        Device::Stage(Arc::new(d))
    }
}

impl From<DetectionArm> for Device {
    fn from(d: DetectionArm) -> Self {
        Device::DetectionArm(Arc::new(d))
    }
}

impl From<LightSheet> for Device {
    fn from(d: LightSheet) -> Self {
        Device::LightSheet(Arc::new(d))
    }
}

impl From<OpticalSwitch> for Device {
    fn from(d: OpticalSwitch) -> Self {
        Device::OpticalSwitch(Arc::new(d))
    }
}

impl From<SignalGenerator> for Device {
    fn from(d: SignalGenerator) -> Self {
        Device::SignalGenerator(Arc::new(d))
    }
}
