//! `lsm-instructions`
//!
//! Control routines acting on the assembled device graph and the ordered list that
//! schedules them.
//!
//! - [`Instruction`]: named unit of behavior with `execute(context)`
//! - [`InstructionList`]: append / insert-at-position / enable flags / lazy
//!   `ordered_enabled` view
//! - Built-in variants: parameter-set, toggle, adaptation, composite, multi-channel
//!   sequencing, stage motion, operator prompt

pub mod adaptation;
pub mod builtin;
pub mod instruction;
pub mod list;
pub mod workflow;

pub use adaptation::{
    AdaptationInstruction, AdaptationParameter, AdaptiveZInstruction, CorrectionAlgorithm,
    DetectionArmSelection, NoCorrection,
};
pub use builtin::{
    change_lightsheet_width, MultiChannelInstruction, OperatorPrompt, SetVariableInstruction,
    StageMoveInstruction, ToggleInstruction, ValueSource,
};
pub use instruction::{Instruction, InstructionContext, InstructionKind};
pub use list::{InstructionId, InstructionList, ScheduledInstruction};
pub use workflow::{guided_calibration, CalibrationStep, CompositeInstruction};
