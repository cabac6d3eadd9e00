//! Error types for instrument assembly and operation.
//!
//! This module defines [`InstrumentError`], the error type shared by the registry,
//! the propagation machinery, the instruction list and the assembly. It is built with
//! `thiserror` so lower-level errors convert into it with `?`.
//!
//! ## Error Hierarchy
//!
//! - **Registry errors**: `DuplicateKey`, `NotFound`
//! - **Propagation errors**: `PropagationCycle`, `Propagation`, `ReadOnly`, `Validation`,
//!   `DriverWrite`
//! - **Execution errors**: `InstructionFailure`, `UnknownInstruction`
//! - **Assembly errors**: `Construction`, `PhaseOrder`, `Configuration`, `Config`
//!
//! Driver contracts and instruction bodies report failures with `anyhow::Result`; the
//! core wraps those into `Construction` or `InstructionFailure` and attaches the name
//! of the device or instruction that failed.

use crate::capabilities::DeviceKind;
use thiserror::Error;

/// Convenience alias for results using the instrument error type.
pub type AppResult<T> = std::result::Result<T, InstrumentError>;

/// Primary error type for the instrument core.
///
/// # Error Categories
///
/// 1. **Fatal during assembly** - `DuplicateKey`, `NotFound`, `Construction`, `PhaseOrder`,
///    `Configuration`, `Config`. Assembly aborts; partially built instruments are never
///    returned.
///
/// 2. **Recoverable at runtime** - `NotFound` outside assembly means "feature absent";
///    `Validation`, `ReadOnly`, `DriverWrite` and `Propagation` reject a single write.
///
/// 3. **Reported to the scheduler** - `InstructionFailure`. The external scheduler decides
///    whether to retry or skip.
#[derive(Error, Debug)]
pub enum InstrumentError {
    /// A device is already registered under this key.
    ///
    /// Silent overwrite is never performed: another component may hold a live handle
    /// to the registered device.
    #[error("Device key ({kind}, {index}) is already registered")]
    DuplicateKey {
        /// Device role
        kind: DeviceKind,
        /// Channel index
        index: usize,
    },

    /// No device is registered under this key.
    #[error("No device registered at ({kind}, {index})")]
    NotFound {
        /// Device role
        kind: DeviceKind,
        /// Channel index
        index: usize,
    },

    /// An instruction's `execute` failed.
    #[error("Instruction '{instruction}' failed: {source}")]
    InstructionFailure {
        /// Name of the failing instruction
        instruction: String,
        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },

    /// No instruction in the list matches this id or name.
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),

    /// A device (or its driver) could not be constructed.
    #[error("Failed to construct device '{device}': {source}")]
    Construction {
        /// Name of the device being built
        device: String,
        /// Underlying driver error
        #[source]
        source: anyhow::Error,
    },

    /// Linking these variables would close a propagation cycle.
    #[error("Linking '{source_name}' -> '{target_name}' would create a propagation cycle")]
    PropagationCycle {
        /// Upstream variable name
        source_name: String,
        /// Downstream variable name
        target_name: String,
    },

    /// A downstream write failed while propagating a value.
    ///
    /// The upstream variable keeps its new value.
    #[error("Propagation from '{variable}' failed: {source}")]
    Propagation {
        /// Variable whose outgoing link failed
        variable: String,
        /// Error raised by the downstream variable
        #[source]
        source: Box<InstrumentError>,
    },

    /// Write attempted on a read-only variable.
    #[error("Variable '{0}' is read-only")]
    ReadOnly(String),

    /// Value rejected by a variable's validator.
    #[error("Invalid value for '{variable}': {message}")]
    Validation {
        /// Variable name
        variable: String,
        /// Validator message
        message: String,
    },

    /// A variable's writer hook (driver write-through) failed; the value is unchanged.
    #[error("Driver write for '{variable}' failed: {source}")]
    DriverWrite {
        /// Variable name
        variable: String,
        /// Driver error
        #[source]
        source: anyhow::Error,
    },

    /// An assembly phase ran before its prerequisites.
    #[error("Assembly phase '{phase}' requires '{missing}' to run first")]
    PhaseOrder {
        /// Phase that was attempted
        phase: String,
        /// Prerequisite that has not completed
        missing: String,
    },

    /// Configuration values parsed but are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl From<figment::Error> for InstrumentError {
    fn from(err: figment::Error) -> Self {
        InstrumentError::Config(Box::new(err))
    }
}

impl InstrumentError {
    /// Wrap an instruction body error with the instruction name.
    pub fn instruction(name: impl Into<String>, source: anyhow::Error) -> Self {
        InstrumentError::InstructionFailure {
            instruction: name.into(),
            source,
        }
    }

    /// Wrap a driver construction error with the device name.
    pub fn construction(device: impl Into<String>, source: anyhow::Error) -> Self {
        InstrumentError::Construction {
            device: device.into(),
            source,
        }
    }

    /// Whether a caller outside assembly can carry on after this error.
    ///
    /// `NotFound` signals an absent feature; write rejections leave state untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            InstrumentError::NotFound { .. }
                | InstrumentError::UnknownInstruction(_)
                | InstrumentError::ReadOnly(_)
                | InstrumentError::Validation { .. }
                | InstrumentError::DriverWrite { .. }
                | InstrumentError::Propagation { .. }
                | InstrumentError::InstructionFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InstrumentError::DuplicateKey {
            kind: DeviceKind::Camera,
            index: 1,
        };
        assert_eq!(err.to_string(), "Device key (camera, 1) is already registered");

        let err = InstrumentError::NotFound {
            kind: DeviceKind::LightSheet,
            index: 7,
        };
        assert_eq!(err.to_string(), "No device registered at (lightsheet, 7)");
    }

    #[test]
    fn test_instruction_failure_keeps_cause() {
        let err = InstrumentError::instruction("Adaptation: Power", anyhow::anyhow!("no signal"));
        assert!(err.to_string().contains("Adaptation: Power"));
        assert!(err.to_string().contains("no signal"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_recoverability() {
        assert!(InstrumentError::NotFound {
            kind: DeviceKind::Laser,
            index: 0
        }
        .is_recoverable());
        assert!(!InstrumentError::DuplicateKey {
            kind: DeviceKind::Laser,
            index: 0
        }
        .is_recoverable());
        assert!(!InstrumentError::construction("cam", anyhow::anyhow!("usb")).is_recoverable());
    }
}
