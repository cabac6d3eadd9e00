//! Device Registry
//!
//! Owns every device of one instrument, keyed by role and channel index.
//!
//! - **DeviceKey**: `(DeviceKind, index)`. The index is the ordinal of the device within
//!   its kind. Global kinds (stage, optical switch, signal generator) exist once, at
//!   index 0.
//! - **Registration**: duplicate keys are rejected, never overwritten.
//! - **Lookup**: absent keys fail with `NotFound`; nothing is created implicitly.
//!
//! Ordering is deterministic (`BTreeMap`), so two instruments built from the same
//! manifest list the same keys in the same order.
//!
//! # Example
//!
//! ```rust
//! use lsm_core::DeviceKind;
//! use lsm_hardware::devices::DetectionArm;
//! use lsm_hardware::registry::DeviceRegistry;
//!
//! let mut registry = DeviceRegistry::new();
//! registry.register(0, DetectionArm::new("D0", 6.5)).unwrap();
//!
//! assert_eq!(registry.count_of(DeviceKind::DetectionArm), 1);
//! assert!(registry.detection_arm(1).is_err());
//! ```

use crate::devices::{
    Device, DetectionArm, Laser, LightSheet, OpticalSwitch, SignalGenerator, StackCamera,
    StageAxis, ThreeAxisStage,
};
use lsm_core::{AppResult, DeviceKind, DeviceScope, InstrumentError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Keys and Info
// =============================================================================

/// Registry key: device role plus channel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey {
    /// Device role
    pub kind: DeviceKind,
    /// Ordinal within the role
    pub index: usize,
}

impl DeviceKey {
    /// Create a key.
    pub fn new(kind: DeviceKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl std::fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.kind, self.index)
    }
}

/// Information about a registered device (returned by list operations)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Registry key
    pub key: DeviceKey,
    /// Device name
    pub name: String,
    /// Variable names, sorted
    pub variables: Vec<String>,
    /// Outgoing propagation links over all variables
    pub links: usize,
}

// =============================================================================
// Device Registry
// =============================================================================

/// Devices of one instrument keyed by `(kind, index)`.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceKey, Device>,
}

impl DeviceRegistry {
    /// Create a new empty device registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device at `index` within its kind.
    ///
    /// # Errors
    ///
    /// - `DuplicateKey` if the key is taken; the registered device is kept.
    /// - `Configuration` if a global kind is registered at an index other than 0.
    pub fn register(&mut self, index: usize, device: impl Into<Device>) -> AppResult<DeviceKey> {
        let device = device.into();
        let key = DeviceKey::new(device.kind(), index);

        if key.kind.scope() == DeviceScope::Global && index != 0 {
            return Err(InstrumentError::Configuration(format!(
                "{} is a global device and must be registered at index 0, not {}",
                key.kind, index
            )));
        }
        if self.devices.contains_key(&key) {
            return Err(InstrumentError::DuplicateKey {
                kind: key.kind,
                index,
            });
        }

        debug!(%key, name = %device.name(), "device registered");
        self.devices.insert(key, device);
        Ok(key)
    }

    /// Device at `(kind, index)`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no device is registered under that key.
    pub fn lookup(&self, kind: DeviceKind, index: usize) -> AppResult<&Device> {
        self.devices
            .get(&DeviceKey::new(kind, index))
            .ok_or(InstrumentError::NotFound { kind, index })
    }

    /// Check if a key is registered
    pub fn contains(&self, kind: DeviceKind, index: usize) -> bool {
        self.devices.contains_key(&DeviceKey::new(kind, index))
    }

    /// Number of devices of `kind`.
    pub fn count_of(&self, kind: DeviceKind) -> usize {
        self.devices.keys().filter(|k| k.kind == kind).count()
    }

    /// All keys in order.
    pub fn keys(&self) -> Vec<DeviceKey> {
        self.devices.keys().copied().collect()
    }

    /// Devices of `kind` in index order.
    pub fn devices_of(&self, kind: DeviceKind) -> impl Iterator<Item = &Device> {
        self.devices
            .iter()
            .filter(move |(k, _)| k.kind == kind)
            .map(|(_, d)| d)
    }

    /// Total outgoing propagation links over all registered devices.
    pub fn link_count(&self) -> usize {
        self.devices.values().map(|d| d.variables().link_count()).sum()
    }

    /// List all registered devices
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices
            .iter()
            .map(|(key, device)| DeviceInfo {
                key: *key,
                name: device.name().to_string(),
                variables: device
                    .variables()
                    .names()
                    .into_iter()
                    .map(String::from)
                    .collect(),
                links: device.variables().link_count(),
            })
            .collect()
    }

    /// Get count of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    // =========================================================================
    // Typed Access
    // =========================================================================

    fn typed<D>(
        &self,
        kind: DeviceKind,
        index: usize,
        extract: impl FnOnce(&Device) -> Option<&Arc<D>>,
    ) -> AppResult<Arc<D>> {
        self.lookup(kind, index)
            .map(extract)?
            .cloned()
            .ok_or(InstrumentError::NotFound { kind, index })
    }

    /// Camera of detection arm `index`
    pub fn camera(&self, index: usize) -> AppResult<Arc<StackCamera>> {
        self.typed(DeviceKind::Camera, index, |d| match d {
            Device::Camera(c) => Some(c),
            _ => None,
        })
    }

    /// Laser line `index`
    pub fn laser(&self, index: usize) -> AppResult<Arc<Laser>> {
        self.typed(DeviceKind::Laser, index, |d| match d {
            Device::Laser(l) => Some(l),
            _ => None,
        })
    }

    /// Chained stage axis `index` (0 = x, 1 = y, 2 = z)
    pub fn stage_axis(&self, index: usize) -> AppResult<Arc<StageAxis>> {
        self.typed(DeviceKind::StageAxis, index, |d| match d {
            Device::StageAxis(a) => Some(a),
            _ => None,
        })
    }

    /// Three-axis sample stage
    pub fn stage(&self) -> AppResult<Arc<ThreeAxisStage>> {
        self.typed(DeviceKind::Stage, 0, |d| match d {
            Device::Stage(s) => Some(s),
            _ => None,
        })
    }

    /// Beta-angle stage of lightsheet `index`
    pub fn angle_stage(&self, index: usize) -> AppResult<Arc<StageAxis>> {
        self.typed(DeviceKind::AngleStage, index, |d| match d {
            Device::AngleStage(a) => Some(a),
            _ => None,
        })
    }

    /// Detection arm `index`
    pub fn detection_arm(&self, index: usize) -> AppResult<Arc<DetectionArm>> {
        self.typed(DeviceKind::DetectionArm, index, |d| match d {
            Device::DetectionArm(a) => Some(a),
            _ => None,
        })
    }

    /// Lightsheet `index`
    pub fn lightsheet(&self, index: usize) -> AppResult<Arc<LightSheet>> {
        self.typed(DeviceKind::LightSheet, index, |d| match d {
            Device::LightSheet(l) => Some(l),
            _ => None,
        })
    }

    /// Optical switch
    pub fn optical_switch(&self) -> AppResult<Arc<OpticalSwitch>> {
        self.typed(DeviceKind::OpticalSwitch, 0, |d| match d {
            Device::OpticalSwitch(s) => Some(s),
            _ => None,
        })
    }

    /// Signal generator
    pub fn signal_generator(&self) -> AppResult<Arc<SignalGenerator>> {
        self.typed(DeviceKind::SignalGenerator, 0, |d| match d {
            Device::SignalGenerator(s) => Some(s),
            _ => None,
        })
    }

    /// All cameras in index order.
    pub fn cameras(&self) -> Vec<Arc<StackCamera>> {
        self.devices_of(DeviceKind::Camera)
            .filter_map(|d| match d {
                Device::Camera(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    /// All lasers in index order.
    pub fn lasers(&self) -> Vec<Arc<Laser>> {
        self.devices_of(DeviceKind::Laser)
            .filter_map(|d| match d {
                Device::Laser(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    /// All lightsheets in index order.
    pub fn lightsheets(&self) -> Vec<Arc<LightSheet>> {
        self.devices_of(DeviceKind::LightSheet)
            .filter_map(|d| match d {
                Device::LightSheet(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    /// All detection arms in index order.
    pub fn detection_arms(&self) -> Vec<Arc<DetectionArm>> {
        self.devices_of(DeviceKind::DetectionArm)
            .filter_map(|d| match d {
                Device::DetectionArm(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_arms(n: usize) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        for i in 0..n {
            registry
                .register(i, DetectionArm::new(format!("D{}", i), 6.5))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry_with_arms(2);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.count_of(DeviceKind::DetectionArm), 2);
        assert_eq!(registry.count_of(DeviceKind::Camera), 0);
        assert_eq!(registry.detection_arm(1).unwrap().name(), "D1");
        assert_eq!(
            registry.lookup(DeviceKind::DetectionArm, 0).unwrap().name(),
            "D0"
        );
    }

    #[test]
    fn test_duplicate_key_keeps_original() {
        let mut registry = registry_with_arms(1);
        let err = registry
            .register(0, DetectionArm::new("other", 1.0))
            .unwrap_err();

        assert!(matches!(
            err,
            InstrumentError::DuplicateKey {
                kind: DeviceKind::DetectionArm,
                index: 0
            }
        ));
        assert_eq!(registry.detection_arm(0).unwrap().name(), "D0");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_absent_is_not_found() {
        let registry = registry_with_arms(1);

        for result in [
            registry.lookup(DeviceKind::DetectionArm, 1).map(|_| ()),
            registry.lookup(DeviceKind::Camera, 0).map(|_| ()),
            registry.camera(0).map(|_| ()),
            registry.optical_switch().map(|_| ()),
        ] {
            assert!(matches!(result, Err(InstrumentError::NotFound { .. })));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_global_kind_only_at_index_zero() {
        let mut registry = DeviceRegistry::new();
        let err = registry
            .register(1, OpticalSwitch::new("OpticalSwitch", 2))
            .unwrap_err();
        assert!(matches!(err, InstrumentError::Configuration(_)));

        registry
            .register(0, OpticalSwitch::new("OpticalSwitch", 2))
            .unwrap();
        assert_eq!(registry.optical_switch().unwrap().channels(), 2);
    }

    #[test]
    fn test_keys_are_ordered() {
        let mut registry = DeviceRegistry::new();
        registry.register(1, LightSheet::new("I1", 9.4, 0)).unwrap();
        registry.register(0, LightSheet::new("I0", 9.4, 0)).unwrap();
        registry.register(0, DetectionArm::new("D0", 6.5)).unwrap();

        let keys = registry.keys();
        assert_eq!(
            keys,
            vec![
                DeviceKey::new(DeviceKind::DetectionArm, 0),
                DeviceKey::new(DeviceKind::LightSheet, 0),
                DeviceKey::new(DeviceKind::LightSheet, 1),
            ]
        );
        let names: Vec<_> = registry
            .lightsheets()
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(names, vec!["I0", "I1"]);
    }

    #[test]
    fn test_list_devices_reports_links() {
        let mut registry = registry_with_arms(1);
        let sheet = LightSheet::new("I0", 9.4, 0);
        let arm = registry.detection_arm(0).unwrap();
        arm.focus_z().subscribe(sheet.z()).unwrap();
        registry.register(0, sheet).unwrap();

        let infos = registry.list_devices();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].links, 1);
        assert!(infos[0].variables.contains(&"focus_z".to_string()));
        assert_eq!(registry.link_count(), 1);
    }
}
