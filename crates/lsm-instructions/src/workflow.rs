//! Composite instructions and the guided calibration workflow.

use crate::adaptation::{AdaptationInstruction, AdaptationParameter, CorrectionAlgorithm};
use crate::builtin::OperatorPrompt;
use crate::instruction::{Instruction, InstructionContext, InstructionKind};
use anyhow::Context;
use lsm_hardware::LightSheet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Ordered sub-sequence of instructions run as one unit.
///
/// Stops at the first failing step; the error names the step.
pub struct CompositeInstruction {
    name: String,
    steps: Vec<Box<dyn Instruction>>,
}

impl CompositeInstruction {
    /// Create an empty composite.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Add a step at the end.
    pub fn step<I: Instruction + 'static>(mut self, step: I) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Instruction for CompositeInstruction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstructionKind {
        InstructionKind::Composite
    }

    fn description(&self) -> String {
        self.step_names().join(" -> ")
    }

    fn execute(&self, ctx: &InstructionContext<'_>) -> anyhow::Result<()> {
        for (i, step) in self.steps.iter().enumerate() {
            debug!(composite = %self.name, step = %step.name(), "running step");
            step.execute(ctx)
                .with_context(|| format!("step {} '{}' failed", i + 1, step.name()))?;
        }
        Ok(())
    }
}

/// Named steps of the guided calibration workflow, in running order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStep {
    /// Operator aligns the sheets without a sample
    ManualCalibration,
    /// Focus and angle adaptation without a sample
    AutomaticCalibration,
    /// Operator mounts the sample
    SampleMounting,
    /// Full adaptation with the sample in place
    AutomaticCalibrationWithSample,
    /// Focus touch-up during imaging
    RecalibrationWithSample,
}

impl CalibrationStep {
    /// All steps in order
    pub const ALL: [CalibrationStep; 5] = [
        CalibrationStep::ManualCalibration,
        CalibrationStep::AutomaticCalibration,
        CalibrationStep::SampleMounting,
        CalibrationStep::AutomaticCalibrationWithSample,
        CalibrationStep::RecalibrationWithSample,
    ];

    /// Step title
    pub fn title(&self) -> &'static str {
        match self {
            Self::ManualCalibration => "Step 1: Manual calibration",
            Self::AutomaticCalibration => "Step 2: Automatic calibration",
            Self::SampleMounting => "Step 3: Sample mounting",
            Self::AutomaticCalibrationWithSample => "Step 4: Automatic calibration with sample",
            Self::RecalibrationWithSample => "Step 5: Recalibration with sample",
        }
    }

    fn parameters(&self) -> &'static [AdaptationParameter] {
        match self {
            Self::ManualCalibration | Self::SampleMounting => &[],
            Self::AutomaticCalibration => {
                &[AdaptationParameter::FocusZ, AdaptationParameter::AngleAlpha]
            }
            Self::AutomaticCalibrationWithSample => &AdaptationParameter::ALL,
            Self::RecalibrationWithSample => &[AdaptationParameter::FocusZ],
        }
    }

    /// Build this step as an instruction.
    ///
    /// Operator steps become prompts; automatic steps become a composite of adaptation
    /// instructions over `lightsheets`.
    pub fn build(
        &self,
        lightsheets: &[Arc<LightSheet>],
        algorithm: &Arc<dyn CorrectionAlgorithm>,
    ) -> Box<dyn Instruction> {
        match self {
            Self::ManualCalibration => Box::new(OperatorPrompt::new(
                self.title(),
                "Align lightsheets and detection arms manually, then continue",
            )),
            Self::SampleMounting => Box::new(OperatorPrompt::new(
                self.title(),
                "Mount the sample and bring it into the field of view, then continue",
            )),
            _ => {
                let mut composite = CompositeInstruction::new(self.title());
                for parameter in self.parameters() {
                    composite = composite.step(AdaptationInstruction::new(
                        *parameter,
                        lightsheets.to_vec(),
                        algorithm.clone(),
                    ));
                }
                Box::new(composite)
            }
        }
    }
}

/// The guided calibration workflow as one composite instruction.
pub fn guided_calibration(
    name: impl Into<String>,
    lightsheets: &[Arc<LightSheet>],
    algorithm: Arc<dyn CorrectionAlgorithm>,
) -> CompositeInstruction {
    let mut workflow = CompositeInstruction::new(name);
    for step in CalibrationStep::ALL {
        workflow.steps.push(step.build(lightsheets, &algorithm));
    }
    workflow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptation::NoCorrection;
    use crate::builtin::SetVariableInstruction;
    use lsm_core::Variable;
    use lsm_hardware::DeviceRegistry;

    #[test]
    fn test_steps_in_order() {
        let sheets = vec![Arc::new(LightSheet::new("I0", 9.4, 0))];
        let workflow = guided_calibration("Guided calibration", &sheets, Arc::new(NoCorrection));

        let titles: Vec<_> = CalibrationStep::ALL.iter().map(|s| s.title()).collect();
        assert_eq!(workflow.step_names(), titles);

        let registry = DeviceRegistry::new();
        workflow
            .execute(&InstructionContext::new(&registry, 2))
            .unwrap();
    }

    #[test]
    fn test_stops_at_first_failure() {
        let registry = DeviceRegistry::new();
        let ok = Variable::new("ok", 0.0);
        let bounded = Variable::new("bounded", 0.0).with_range(0.0, 1.0);
        let after = Variable::new("after", 0.0);

        let composite = CompositeInstruction::new("three steps")
            .step(SetVariableInstruction::fixed("first", vec![ok.clone()], 1.0))
            .step(SetVariableInstruction::fixed("second", vec![bounded], 5.0))
            .step(SetVariableInstruction::fixed("third", vec![after.clone()], 1.0));

        let err = composite
            .execute(&InstructionContext::new(&registry, 0))
            .unwrap_err();

        assert!(err.to_string().contains("second"));
        assert_eq!(ok.get(), 1.0);
        assert_eq!(after.get(), 0.0);
    }
}
