//! Instruction contract.
//!
//! An instruction is a named unit of control behavior bound to devices resolved from
//! the registry when it is built. The list decides *whether* and *when* it runs; the
//! instruction only knows *what* to do.

use lsm_hardware::DeviceRegistry;
use serde::{Deserialize, Serialize};

/// Broad category of an instruction, used for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    /// Sets one or more variables to a value
    ParameterSet,
    /// Flips a boolean variable
    Toggle,
    /// Closed-loop correction over lightsheets and control planes
    Adaptation,
    /// Ordered sub-sequence of named steps
    Composite,
    /// Cycles the optical switch through the lightsheets
    Sequencing,
    /// Moves the sample stage
    Motion,
    /// Operator checkpoint
    Prompt,
}

/// Read-only view handed to an executing instruction.
///
/// The instruction list itself is deliberately absent: an instruction cannot reorder
/// or toggle the schedule it runs from.
#[derive(Debug, Clone, Copy)]
pub struct InstructionContext<'a> {
    /// Registry of the assembled instrument
    pub registry: &'a DeviceRegistry,
    /// Number of control planes used by adaptation
    pub control_planes: usize,
}

impl<'a> InstructionContext<'a> {
    /// Create a context.
    pub fn new(registry: &'a DeviceRegistry, control_planes: usize) -> Self {
        Self {
            registry,
            control_planes,
        }
    }
}

/// A schedulable control routine.
///
/// `execute` runs to completion or returns the cause of failure. The list wraps the
/// cause into `InstructionFailure` with the instruction name attached.
pub trait Instruction: Send + Sync {
    /// Unique display name, used for enabling by name.
    fn name(&self) -> &str;

    /// Category
    fn kind(&self) -> InstructionKind;

    /// Short description for listings
    fn description(&self) -> String {
        String::new()
    }

    /// Run once.
    fn execute(&self, ctx: &InstructionContext<'_>) -> anyhow::Result<()>;
}
