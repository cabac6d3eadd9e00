//! `lsm-hardware`
//!
//! Device variants, the device registry and the driver backend contract for the
//! light-sheet instrument.
//!
//! - [`devices`]: camera, laser, stages, detection arm, lightsheet, optical switch and
//!   signal generator, each exposing a fixed [`VariableSet`](lsm_core::VariableSet)
//! - [`registry`]: [`DeviceRegistry`] keyed by `(DeviceKind, index)`
//! - [`backend`]: [`DeviceBackend`] factory building drivers for each device role
//! - [`drivers::mock`]: [`SimulatedBackend`] for running without hardware

pub mod backend;
pub mod devices;
pub mod drivers;
pub mod registry;

pub use backend::{AxisSpec, DeviceBackend, LaserSpec};
pub use devices::{
    CameraDefaults, Device, DetectionArm, Laser, LightSheet, OpticalSwitch, SignalGenerator,
    StackCamera, StageAxis, ThreeAxisStage,
};
pub use drivers::mock::SimulatedBackend;
pub use registry::{DeviceInfo, DeviceKey, DeviceRegistry};
