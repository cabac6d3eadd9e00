//! Adaptation instructions.
//!
//! An adaptation instruction runs a closed-loop correction for one tunable lightsheet
//! parameter. The numerical content lives behind [`CorrectionAlgorithm`]; this module
//! only decides which variable each correction lands on.
//!
//! For every lightsheet the algorithm is asked once per control plane. The mean of the
//! per-plane corrections is added to the lightsheet's variable. With zero control
//! planes the instruction is a no-op.
//!
//! Focus adaptations may measure through a subset of the detection arms
//! ([`DetectionArmSelection`]); the selected arms then refocus on the corrected sheets.
//! [`AdaptiveZInstruction`] moves the detection focus of every arm instead of the sheets.
//! A non-finite mean correction fails the instruction before anything is written.

use crate::instruction::{Instruction, InstructionContext, InstructionKind};
use anyhow::Context;
use lsm_core::Variable;
use lsm_hardware::{DetectionArm, LightSheet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Lightsheet parameter tuned by an adaptation instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationParameter {
    /// Axial position of the sheet relative to the detection focal plane
    FocusZ,
    /// In-plane sheet angle
    AngleAlpha,
    /// Relative sheet power
    Power,
    /// Lateral sheet position
    LateralX,
}

impl AdaptationParameter {
    /// All tunable parameters
    pub const ALL: [AdaptationParameter; 4] = [
        AdaptationParameter::FocusZ,
        AdaptationParameter::AngleAlpha,
        AdaptationParameter::Power,
        AdaptationParameter::LateralX,
    ];

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::FocusZ => "Focus Z",
            Self::AngleAlpha => "Angle alpha",
            Self::Power => "Power",
            Self::LateralX => "Lateral X",
        }
    }

    /// The lightsheet variable this parameter corrects.
    pub fn variable<'a>(&self, lightsheet: &'a LightSheet) -> &'a Variable<f64> {
        match self {
            Self::FocusZ => lightsheet.z(),
            Self::AngleAlpha => lightsheet.alpha(),
            Self::Power => lightsheet.power(),
            Self::LateralX => lightsheet.x(),
        }
    }
}

/// Detection arms a focus adaptation measures through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionArmSelection {
    /// Every arm on every run
    All,
    /// One operator-chosen arm
    Manual(usize),
    /// `width` consecutive arms, shifted by one arm on each run
    SlidingWindow(usize),
}

impl DetectionArmSelection {
    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "all detection arms",
            Self::Manual(_) => "manual detection arm selection",
            Self::SlidingWindow(_) => "sliding window detection arm selection",
        }
    }

    /// Arm indices used on run number `run` of an instrument with `arms` arms.
    pub fn select(&self, arms: usize, run: usize) -> anyhow::Result<Vec<usize>> {
        anyhow::ensure!(arms > 0, "no detection arms to measure through");
        match *self {
            Self::All => Ok((0..arms).collect()),
            Self::Manual(arm) => {
                anyhow::ensure!(arm < arms, "detection arm {} out of range ({} arms)", arm, arms);
                Ok(vec![arm])
            }
            Self::SlidingWindow(width) => {
                anyhow::ensure!(width > 0, "sliding window must cover at least one arm");
                Ok((0..width.min(arms)).map(|k| (run + k) % arms).collect())
            }
        }
    }
}

/// Numerical correction supplied by an external algorithm.
pub trait CorrectionAlgorithm: Send + Sync {
    /// Algorithm name for logging
    fn name(&self) -> &str;

    /// Correction to add to `current` for one lightsheet at one control plane.
    fn correction(
        &self,
        parameter: AdaptationParameter,
        lightsheet: usize,
        control_plane: usize,
        current: f64,
    ) -> anyhow::Result<f64>;

    /// Focus correction for one lightsheet measured through one detection arm.
    ///
    /// Defaults to [`correction`](Self::correction) for [`AdaptationParameter::FocusZ`].
    fn focus_correction(
        &self,
        lightsheet: usize,
        detection_arm: usize,
        control_plane: usize,
        current: f64,
    ) -> anyhow::Result<f64> {
        let _ = detection_arm;
        self.correction(AdaptationParameter::FocusZ, lightsheet, control_plane, current)
    }
}

/// Algorithm that never corrects anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCorrection;

impl CorrectionAlgorithm for NoCorrection {
    fn name(&self) -> &str {
        "none"
    }

    fn correction(
        &self,
        _: AdaptationParameter,
        _: usize,
        _: usize,
        _: f64,
    ) -> anyhow::Result<f64> {
        Ok(0.0)
    }
}

fn apply_correction(variable: &Variable<f64>, current: f64, correction: f64) -> anyhow::Result<()> {
    anyhow::ensure!(
        correction.is_finite(),
        "correction {} for '{}' is not finite",
        correction,
        variable.name()
    );
    if correction != 0.0 {
        variable.set(current + correction)?;
    }
    Ok(())
}

/// Detection arms bound to a focus adaptation.
struct ArmBinding {
    arms: Vec<Arc<DetectionArm>>,
    selection: DetectionArmSelection,
    runs: AtomicUsize,
}

/// Closed-loop correction of one parameter over a set of lightsheets.
pub struct AdaptationInstruction {
    name: String,
    parameter: AdaptationParameter,
    lightsheets: Vec<Arc<LightSheet>>,
    algorithm: Arc<dyn CorrectionAlgorithm>,
    arms: Option<ArmBinding>,
}

impl AdaptationInstruction {
    /// Adapt `parameter` on every lightsheet in `lightsheets` using `algorithm`.
    pub fn new(
        parameter: AdaptationParameter,
        lightsheets: Vec<Arc<LightSheet>>,
        algorithm: Arc<dyn CorrectionAlgorithm>,
    ) -> Self {
        Self {
            name: format!("Adaptation: {}", parameter.label()),
            parameter,
            lightsheets,
            algorithm,
            arms: None,
        }
    }

    /// Focus Z adaptation measured through the arms picked by `selection`.
    ///
    /// Every lightsheet's z gets the mean correction over the selected arms and the
    /// control planes; the selected arms then move their focus to the mean sheet z.
    pub fn focus_with_arm_selection(
        lightsheets: Vec<Arc<LightSheet>>,
        arms: Vec<Arc<DetectionArm>>,
        selection: DetectionArmSelection,
        algorithm: Arc<dyn CorrectionAlgorithm>,
    ) -> Self {
        Self {
            name: format!(
                "Adaptation: {} with {}",
                AdaptationParameter::FocusZ.label(),
                selection.label()
            ),
            parameter: AdaptationParameter::FocusZ,
            lightsheets,
            algorithm,
            arms: Some(ArmBinding {
                arms,
                selection,
                runs: AtomicUsize::new(0),
            }),
        }
    }

    /// Tuned parameter
    pub fn parameter(&self) -> AdaptationParameter {
        self.parameter
    }

    /// Detection arm selection, if this adaptation measures through the arms
    pub fn arm_selection(&self) -> Option<DetectionArmSelection> {
        self.arms.as_ref().map(|b| b.selection)
    }

    fn adapt_per_sheet(&self, planes: usize) -> anyhow::Result<()> {
        for (index, sheet) in self.lightsheets.iter().enumerate() {
            let variable = self.parameter.variable(sheet);
            let current = variable.get();

            let mut total = 0.0;
            for plane in 0..planes {
                total += self
                    .algorithm
                    .correction(self.parameter, index, plane, current)
                    .with_context(|| format!("{} at control plane {}", sheet.name(), plane))?;
            }
            let correction = total / planes as f64;
            apply_correction(variable, current, correction)?;
            debug!(lightsheet = %sheet.name(), correction, "adapted");
        }
        Ok(())
    }

    fn adapt_through_arms(&self, binding: &ArmBinding, planes: usize) -> anyhow::Result<()> {
        let run = binding.runs.fetch_add(1, Ordering::Relaxed);
        let selected = binding.selection.select(binding.arms.len(), run)?;
        let samples = (selected.len() * planes) as f64;

        for (index, sheet) in self.lightsheets.iter().enumerate() {
            let current = sheet.z().get();
            let mut total = 0.0;
            for &arm in &selected {
                for plane in 0..planes {
                    total += self
                        .algorithm
                        .focus_correction(index, arm, plane, current)
                        .with_context(|| {
                            format!(
                                "{} through {} at control plane {}",
                                sheet.name(),
                                binding.arms[arm].name(),
                                plane
                            )
                        })?;
                }
            }
            let correction = total / samples;
            apply_correction(sheet.z(), current, correction)?;
            debug!(lightsheet = %sheet.name(), ?selected, correction, "focus adapted");
        }

        if !self.lightsheets.is_empty() {
            let focus = self.lightsheets.iter().map(|s| s.z().get()).sum::<f64>()
                / self.lightsheets.len() as f64;
            for &arm in &selected {
                binding.arms[arm].focus_z().set(focus)?;
            }
        }
        Ok(())
    }
}

impl Instruction for AdaptationInstruction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstructionKind {
        InstructionKind::Adaptation
    }

    fn description(&self) -> String {
        format!(
            "adapt {} on {} lightsheet(s) with '{}'",
            self.parameter.label(),
            self.lightsheets.len(),
            self.algorithm.name()
        )
    }

    fn execute(&self, ctx: &InstructionContext<'_>) -> anyhow::Result<()> {
        if ctx.control_planes == 0 {
            return Ok(());
        }
        match &self.arms {
            Some(binding) => self.adapt_through_arms(binding, ctx.control_planes),
            None => self.adapt_per_sheet(ctx.control_planes),
        }
    }
}

/// Moves the detection focus of every arm onto the lightsheets.
///
/// Each arm's `focus_z` gets the mean focus correction over all lightsheets and control
/// planes measured through that arm. Lightsheet positions are left alone.
pub struct AdaptiveZInstruction {
    name: String,
    lightsheets: Vec<Arc<LightSheet>>,
    arms: Vec<Arc<DetectionArm>>,
    algorithm: Arc<dyn CorrectionAlgorithm>,
}

impl AdaptiveZInstruction {
    /// Adaptive Z over `arms`, measured on `lightsheets`.
    pub fn new(
        lightsheets: Vec<Arc<LightSheet>>,
        arms: Vec<Arc<DetectionArm>>,
        algorithm: Arc<dyn CorrectionAlgorithm>,
    ) -> Self {
        Self {
            name: "Adaptive Z".to_string(),
            lightsheets,
            arms,
            algorithm,
        }
    }
}

impl Instruction for AdaptiveZInstruction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstructionKind {
        InstructionKind::Adaptation
    }

    fn description(&self) -> String {
        format!(
            "refocus {} detection arm(s) on {} lightsheet(s) with '{}'",
            self.arms.len(),
            self.lightsheets.len(),
            self.algorithm.name()
        )
    }

    fn execute(&self, ctx: &InstructionContext<'_>) -> anyhow::Result<()> {
        let samples = self.lightsheets.len() * ctx.control_planes;
        if samples == 0 {
            return Ok(());
        }

        for (a, arm) in self.arms.iter().enumerate() {
            let current = arm.focus_z().get();
            let mut total = 0.0;
            for l in 0..self.lightsheets.len() {
                for plane in 0..ctx.control_planes {
                    total += self
                        .algorithm
                        .focus_correction(l, a, plane, current)
                        .with_context(|| format!("{} at control plane {}", arm.name(), plane))?;
                }
            }
            let correction = total / samples as f64;
            apply_correction(arm.focus_z(), current, correction)?;
            debug!(arm = %arm.name(), correction, "detection focus adapted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsm_hardware::DeviceRegistry;

    struct Fixed {
        step: f64,
        calls: AtomicUsize,
    }

    impl CorrectionAlgorithm for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn correction(
            &self,
            _: AdaptationParameter,
            _: usize,
            plane: usize,
            _: f64,
        ) -> anyhow::Result<f64> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.step * (plane + 1) as f64)
        }
    }

    /// Reports arm `a` as `a + 1` micrometres out of focus.
    struct PerArm;

    impl CorrectionAlgorithm for PerArm {
        fn name(&self) -> &str {
            "per-arm"
        }

        fn correction(
            &self,
            _: AdaptationParameter,
            _: usize,
            _: usize,
            _: f64,
        ) -> anyhow::Result<f64> {
            Ok(0.0)
        }

        fn focus_correction(&self, _: usize, arm: usize, _: usize, _: f64) -> anyhow::Result<f64> {
            Ok((arm + 1) as f64)
        }
    }

    struct Diverging;

    impl CorrectionAlgorithm for Diverging {
        fn name(&self) -> &str {
            "diverging"
        }

        fn correction(
            &self,
            _: AdaptationParameter,
            _: usize,
            _: usize,
            _: f64,
        ) -> anyhow::Result<f64> {
            Ok(f64::NAN)
        }
    }

    fn sheets(n: usize) -> Vec<Arc<LightSheet>> {
        (0..n)
            .map(|i| Arc::new(LightSheet::new(format!("I{}", i), 9.4, 0)))
            .collect()
    }

    fn arms(n: usize) -> Vec<Arc<DetectionArm>> {
        (0..n)
            .map(|i| Arc::new(DetectionArm::new(format!("D{}", i), 6.5)))
            .collect()
    }

    fn fixed(step: f64) -> Arc<Fixed> {
        Arc::new(Fixed {
            step,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_mean_correction_per_sheet() {
        let registry = DeviceRegistry::new();
        let lightsheets = sheets(2);
        let algorithm = fixed(1.0);
        let adapt = AdaptationInstruction::new(
            AdaptationParameter::FocusZ,
            lightsheets.clone(),
            algorithm.clone(),
        );

        adapt
            .execute(&InstructionContext::new(&registry, 3))
            .unwrap();

        // planes give 1, 2, 3 -> mean 2
        assert!(lightsheets.iter().all(|s| s.z().get() == 2.0));
        assert_eq!(algorithm.calls.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_no_planes_is_noop() {
        let registry = DeviceRegistry::new();
        let lightsheets = sheets(1);
        let algorithm = fixed(1.0);
        AdaptationInstruction::new(
            AdaptationParameter::LateralX,
            lightsheets.clone(),
            algorithm.clone(),
        )
        .execute(&InstructionContext::new(&registry, 0))
        .unwrap();

        assert_eq!(lightsheets[0].x().get(), 0.0);
        assert_eq!(algorithm.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_out_of_range_power_fails() {
        let registry = DeviceRegistry::new();
        let lightsheets = sheets(1);
        let result = AdaptationInstruction::new(
            AdaptationParameter::Power,
            lightsheets.clone(),
            fixed(5.0),
        )
        .execute(&InstructionContext::new(&registry, 1));

        assert!(result.is_err());
        assert_eq!(lightsheets[0].power().get(), 1.0);
    }

    #[test]
    fn test_non_finite_correction_rejected() {
        let registry = DeviceRegistry::new();
        let lightsheets = sheets(1);
        let ctx = InstructionContext::new(&registry, 2);

        for parameter in AdaptationParameter::ALL {
            let before = parameter.variable(&lightsheets[0]).get();
            let err = AdaptationInstruction::new(
                parameter,
                lightsheets.clone(),
                Arc::new(Diverging),
            )
            .execute(&ctx)
            .unwrap_err();

            assert!(err.to_string().contains("not finite"), "{err}");
            assert_eq!(parameter.variable(&lightsheets[0]).get(), before);
        }

        let arm = arms(1);
        let err = AdaptiveZInstruction::new(lightsheets.clone(), arm.clone(), Arc::new(Diverging))
            .execute(&ctx)
            .unwrap_err();
        assert!(err.to_string().contains("not finite"), "{err}");
        assert_eq!(arm[0].focus_z().get(), 0.0);
    }

    #[test]
    fn test_selection_indices() {
        let all = DetectionArmSelection::All;
        assert_eq!(all.select(2, 7).unwrap(), vec![0, 1]);

        let manual = DetectionArmSelection::Manual(1);
        assert_eq!(manual.select(2, 0).unwrap(), vec![1]);
        assert!(manual.select(1, 0).is_err());

        let window = DetectionArmSelection::SlidingWindow(2);
        assert_eq!(window.select(3, 0).unwrap(), vec![0, 1]);
        assert_eq!(window.select(3, 1).unwrap(), vec![1, 2]);
        assert_eq!(window.select(3, 2).unwrap(), vec![2, 0]);
        // wider than the instrument: every arm once
        assert_eq!(DetectionArmSelection::SlidingWindow(5).select(2, 1).unwrap(), vec![1, 0]);

        assert!(DetectionArmSelection::SlidingWindow(0).select(2, 0).is_err());
        assert!(all.select(0, 0).is_err());
    }

    #[test]
    fn test_manual_arm_drives_sheet_and_arm_focus() {
        let registry = DeviceRegistry::new();
        let lightsheets = sheets(2);
        let detection = arms(2);
        let adapt = AdaptationInstruction::focus_with_arm_selection(
            lightsheets.clone(),
            detection.clone(),
            DetectionArmSelection::Manual(1),
            Arc::new(PerArm),
        );

        adapt
            .execute(&InstructionContext::new(&registry, 2))
            .unwrap();

        assert!(lightsheets.iter().all(|s| s.z().get() == 2.0));
        assert_eq!(detection[1].focus_z().get(), 2.0);
        assert_eq!(detection[0].focus_z().get(), 0.0);
    }

    #[test]
    fn test_sliding_window_advances_each_run() {
        let registry = DeviceRegistry::new();
        let ctx = InstructionContext::new(&registry, 1);
        let lightsheets = sheets(1);
        let detection = arms(2);
        let adapt = AdaptationInstruction::focus_with_arm_selection(
            lightsheets.clone(),
            detection.clone(),
            DetectionArmSelection::SlidingWindow(1),
            Arc::new(PerArm),
        );

        adapt.execute(&ctx).unwrap();
        assert_eq!(lightsheets[0].z().get(), 1.0);
        assert_eq!(detection[0].focus_z().get(), 1.0);
        assert_eq!(detection[1].focus_z().get(), 0.0);

        adapt.execute(&ctx).unwrap();
        assert_eq!(lightsheets[0].z().get(), 3.0);
        assert_eq!(detection[1].focus_z().get(), 3.0);
        assert_eq!(detection[0].focus_z().get(), 1.0);
    }

    #[test]
    fn test_arm_selection_without_arms_fails() {
        let registry = DeviceRegistry::new();
        let lightsheets = sheets(1);
        let result = AdaptationInstruction::focus_with_arm_selection(
            lightsheets.clone(),
            Vec::new(),
            DetectionArmSelection::All,
            Arc::new(PerArm),
        )
        .execute(&InstructionContext::new(&registry, 1));

        assert!(result.is_err());
        assert_eq!(lightsheets[0].z().get(), 0.0);
    }

    #[test]
    fn test_adaptive_z_moves_arms_not_sheets() {
        let registry = DeviceRegistry::new();
        let lightsheets = sheets(2);
        let detection = arms(2);
        AdaptiveZInstruction::new(lightsheets.clone(), detection.clone(), Arc::new(PerArm))
            .execute(&InstructionContext::new(&registry, 3))
            .unwrap();

        assert_eq!(detection[0].focus_z().get(), 1.0);
        assert_eq!(detection[1].focus_z().get(), 2.0);
        assert!(lightsheets.iter().all(|s| s.z().get() == 0.0));
    }

    #[test]
    fn test_names() {
        let adapt = AdaptationInstruction::new(
            AdaptationParameter::AngleAlpha,
            Vec::new(),
            Arc::new(NoCorrection),
        );
        assert_eq!(adapt.name(), "Adaptation: Angle alpha");
        assert_eq!(adapt.arm_selection(), None);

        let sliding = AdaptationInstruction::focus_with_arm_selection(
            Vec::new(),
            Vec::new(),
            DetectionArmSelection::SlidingWindow(1),
            Arc::new(NoCorrection),
        );
        assert_eq!(
            sliding.name(),
            "Adaptation: Focus Z with sliding window detection arm selection"
        );

        let adaptive = AdaptiveZInstruction::new(Vec::new(), Vec::new(), Arc::new(NoCorrection));
        assert_eq!(adaptive.name(), "Adaptive Z");
    }
}
