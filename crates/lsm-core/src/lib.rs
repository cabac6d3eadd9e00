//! `lsm-core`
//!
//! Core building blocks for composing a light-sheet instrument out of heterogeneous
//! devices.
//!
//! ## Key Types
//!
//! - [`Variable`]: typed reactive value with synchronous propagation links
//! - [`VariableSet`]: the named variables a device exposes
//! - [`DeviceKind`]: role tag used to key the device registry
//! - [`InstrumentError`]: error type shared across the workspace
//! - Driver contracts in [`capabilities`] implemented by external hardware drivers

pub mod capabilities;
pub mod error;
pub mod variable;

pub use capabilities::{
    CameraDriver, DeviceKind, DeviceScope, LaserDriver, SignalGeneratorDriver, StageAxisDriver,
};
pub use error::{AppResult, InstrumentError};
pub use variable::{Variable, VariableBase, VariableId, VariableMetadata, VariableSet};
