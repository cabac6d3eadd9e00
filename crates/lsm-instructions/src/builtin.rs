//! Built-in instruction variants.
//!
//! Each variant binds the variables or devices it acts on when it is constructed;
//! execution never searches the registry for them again.

use crate::instruction::{Instruction, InstructionContext, InstructionKind};
use lsm_core::Variable;
use lsm_hardware::{LightSheet, OpticalSwitch, ThreeAxisStage};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

// =============================================================================
// Parameter-set
// =============================================================================

/// Where a [`SetVariableInstruction`] takes its value from.
#[derive(Debug, Clone)]
pub enum ValueSource<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Fixed at construction
    Fixed(T),
    /// Read from a request variable at execution time
    Requested(Variable<T>),
}

/// One-shot write of a value into one or more variables.
pub struct SetVariableInstruction<T>
where
    T: Clone + Send + Sync + 'static,
{
    name: String,
    targets: Vec<Variable<T>>,
    source: ValueSource<T>,
}

impl<T> SetVariableInstruction<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    /// Write `value` into every target.
    pub fn fixed(name: impl Into<String>, targets: Vec<Variable<T>>, value: T) -> Self {
        Self {
            name: name.into(),
            targets,
            source: ValueSource::Fixed(value),
        }
    }

    /// Write whatever `request` holds at execution time into every target.
    pub fn requested(
        name: impl Into<String>,
        targets: Vec<Variable<T>>,
        request: Variable<T>,
    ) -> Self {
        Self {
            name: name.into(),
            targets,
            source: ValueSource::Requested(request),
        }
    }

    /// Value source
    pub fn source(&self) -> &ValueSource<T> {
        &self.source
    }

    /// Variables written on execution
    pub fn targets(&self) -> &[Variable<T>] {
        &self.targets
    }
}

impl<T> Instruction for SetVariableInstruction<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstructionKind {
        InstructionKind::ParameterSet
    }

    fn description(&self) -> String {
        match &self.source {
            ValueSource::Fixed(v) => format!("set {} variable(s) to {:?}", self.targets.len(), v),
            ValueSource::Requested(r) => {
                format!("set {} variable(s) from '{}'", self.targets.len(), r.name())
            }
        }
    }

    fn execute(&self, _ctx: &InstructionContext<'_>) -> anyhow::Result<()> {
        let value = match &self.source {
            ValueSource::Fixed(v) => v.clone(),
            ValueSource::Requested(r) => r.get(),
        };
        for target in &self.targets {
            target.set(value.clone())?;
        }
        Ok(())
    }
}

/// Sets the width of every lightsheet in `lightsheets`.
pub fn change_lightsheet_width(
    lightsheets: &[Arc<LightSheet>],
    width: f64,
) -> SetVariableInstruction<f64> {
    SetVariableInstruction::fixed(
        format!("Change lightsheet width to {}", width),
        lightsheets.iter().map(|l| l.width().clone()).collect(),
        width,
    )
}

// =============================================================================
// Toggle
// =============================================================================

/// Flips a boolean variable each time it runs.
pub struct ToggleInstruction {
    name: String,
    target: Variable<bool>,
}

impl ToggleInstruction {
    /// Toggle `target`.
    pub fn new(name: impl Into<String>, target: Variable<bool>) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

impl Instruction for ToggleInstruction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstructionKind {
        InstructionKind::Toggle
    }

    fn description(&self) -> String {
        format!("toggle '{}'", self.target.name())
    }

    fn execute(&self, _ctx: &InstructionContext<'_>) -> anyhow::Result<()> {
        self.target.set(!self.target.get())?;
        Ok(())
    }
}

// =============================================================================
// Multi-channel sequencing
// =============================================================================

/// Routes light to the next lightsheet on every run, wrapping around.
pub struct MultiChannelInstruction {
    name: String,
    switch: Arc<OpticalSwitch>,
    next: AtomicUsize,
}

impl MultiChannelInstruction {
    /// Cycle `switch` through all of its channels.
    pub fn new(name: impl Into<String>, switch: Arc<OpticalSwitch>) -> Self {
        Self {
            name: name.into(),
            switch,
            next: AtomicUsize::new(0),
        }
    }
}

impl Instruction for MultiChannelInstruction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstructionKind {
        InstructionKind::Sequencing
    }

    fn description(&self) -> String {
        format!("cycle through {} lightsheet(s)", self.switch.channels())
    }

    fn execute(&self, _ctx: &InstructionContext<'_>) -> anyhow::Result<()> {
        let channels = self.switch.channels();
        anyhow::ensure!(channels > 0, "optical switch has no channels");
        let channel = self.next.fetch_add(1, Ordering::Relaxed) % channels;
        self.switch.select_only(channel)?;
        debug!(channel, "lightsheet selected");
        Ok(())
    }
}

// =============================================================================
// Stage motion
// =============================================================================

/// Moves the sample stage to a fixed position.
pub struct StageMoveInstruction {
    name: String,
    stage: Arc<ThreeAxisStage>,
    target: [f64; 3],
}

impl StageMoveInstruction {
    /// Move `stage` to `target` (x, y, z).
    pub fn new(name: impl Into<String>, stage: Arc<ThreeAxisStage>, target: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            stage,
            target,
        }
    }
}

impl Instruction for StageMoveInstruction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstructionKind {
        InstructionKind::Motion
    }

    fn description(&self) -> String {
        format!("move {} to {:?}", self.stage.name(), self.target)
    }

    fn execute(&self, _ctx: &InstructionContext<'_>) -> anyhow::Result<()> {
        let [x, y, z] = self.target;
        self.stage.move_to(x, y, z)?;
        Ok(())
    }
}

// =============================================================================
// Operator prompt
// =============================================================================

/// Checkpoint that hands control to the operator.
///
/// Logs its message and counts how often it was reached; acknowledging the prompt
/// is up to the surrounding UI.
pub struct OperatorPrompt {
    name: String,
    message: String,
    reached: AtomicUsize,
}

impl OperatorPrompt {
    /// Create a prompt.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            reached: AtomicUsize::new(0),
        }
    }

    /// Message shown to the operator
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Number of times this prompt was executed
    pub fn times_reached(&self) -> usize {
        self.reached.load(Ordering::Relaxed)
    }
}

impl Instruction for OperatorPrompt {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstructionKind {
        InstructionKind::Prompt
    }

    fn description(&self) -> String {
        self.message.clone()
    }

    fn execute(&self, _ctx: &InstructionContext<'_>) -> anyhow::Result<()> {
        self.reached.fetch_add(1, Ordering::Relaxed);
        info!(prompt = %self.name, "{}", self.message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsm_hardware::DeviceRegistry;

    fn ctx(registry: &DeviceRegistry) -> InstructionContext<'_> {
        InstructionContext::new(registry, 0)
    }

    #[test]
    fn test_fixed_and_requested_values() {
        let registry = DeviceRegistry::new();
        let a = Variable::new("a", 0.0);
        let b = Variable::new("b", 0.0);
        let request = Variable::new("request", 3.0);

        SetVariableInstruction::fixed("fixed", vec![a.clone(), b.clone()], 1.5)
            .execute(&ctx(&registry))
            .unwrap();
        assert_eq!((a.get(), b.get()), (1.5, 1.5));

        let requested = SetVariableInstruction::requested("req", vec![a.clone()], request.clone());
        request.set(7.0).unwrap();
        requested.execute(&ctx(&registry)).unwrap();
        assert_eq!(a.get(), 7.0);
    }

    #[test]
    fn test_rejected_value_is_an_error() {
        let registry = DeviceRegistry::new();
        let bounded = Variable::new("bounded", 0.0).with_range(0.0, 1.0);
        let result = SetVariableInstruction::fixed("too much", vec![bounded.clone()], 2.0)
            .execute(&ctx(&registry));
        assert!(result.is_err());
        assert_eq!(bounded.get(), 0.0);
    }

    #[test]
    fn test_toggle_flips() {
        let registry = DeviceRegistry::new();
        let flag = Variable::new("on", false);
        let toggle = ToggleInstruction::new("flip", flag.clone());

        toggle.execute(&ctx(&registry)).unwrap();
        assert!(flag.get());
        toggle.execute(&ctx(&registry)).unwrap();
        assert!(!flag.get());
    }

    #[test]
    fn test_multichannel_wraps_around() {
        let registry = DeviceRegistry::new();
        let switch = Arc::new(OpticalSwitch::new("OpticalSwitch", 3));
        let seq = MultiChannelInstruction::new("Multi-channel", switch.clone());

        let mut seen = Vec::new();
        for _ in 0..4 {
            seq.execute(&ctx(&registry)).unwrap();
            seen.push(switch.selected());
        }
        assert_eq!(seen, vec![vec![0], vec![1], vec![2], vec![0]]);
    }

    #[test]
    fn test_width_change_targets_every_sheet() {
        let registry = DeviceRegistry::new();
        let sheets: Vec<_> = (0..3)
            .map(|i| Arc::new(LightSheet::new(format!("I{}", i), 9.4, 0)))
            .collect();
        let change = change_lightsheet_width(&sheets, 0.45);

        change.execute(&ctx(&registry)).unwrap();
        assert!(sheets.iter().all(|s| s.width().get() == 0.45));
        assert_eq!(change.targets().len(), 3);
    }

    #[test]
    fn test_prompt_counts() {
        let registry = DeviceRegistry::new();
        let prompt = OperatorPrompt::new("Mount", "Mount the sample");
        prompt.execute(&ctx(&registry)).unwrap();
        prompt.execute(&ctx(&registry)).unwrap();
        assert_eq!(prompt.times_reached(), 2);
    }
}
