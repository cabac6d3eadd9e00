//! Instrument Assembly
//!
//! Composition root. Builds the device registry and the instruction list of one
//! instrument from an [`InstrumentManifest`], in strict phase order:
//!
//! ```text
//!   hardware  ─┐                                  (hardware_present = true)
//!              ├─► imaging path ─► standard instructions
//!   simulated ─┘                                  (hardware_present = false)
//! ```
//!
//! - **hardware / simulated**: selects the driver backend, registers the sample stage
//!   with its chained axes, the beta-angle stages, and the laser lines, each laser
//!   followed by its power-level and on/off instructions
//! - **imaging path**: cameras, signal generator, detection arms (pixel size seeded once
//!   from the camera), lightsheets, exposure and height links for every camera/lightsheet
//!   pair, optical switch
//! - **standard instructions**: adaptation library (adaptive Z, focus Z plain and with
//!   manual or sliding-window detection arm selection, angle, power, lateral X), width
//!   change at the head of the schedule, multi-channel sequencing, guided calibration
//!   workflow
//!
//! Every phase is additive. A phase whose prerequisite has not completed fails with
//! `PhaseOrder`; any device construction failure aborts the build.

use crate::config::InstrumentManifest;
use lsm_core::{AppResult, DeviceKind, InstrumentError, Variable};
use lsm_hardware::{
    DetectionArm, Device, DeviceBackend, DeviceRegistry, Laser, LightSheet, OpticalSwitch,
    SignalGenerator, SimulatedBackend, StackCamera, StageAxis, ThreeAxisStage,
};
use lsm_instructions::{
    change_lightsheet_width, guided_calibration, AdaptationInstruction, AdaptationParameter,
    AdaptiveZInstruction, CorrectionAlgorithm, DetectionArmSelection, Instruction,
    InstructionContext, InstructionList, MultiChannelInstruction, NoCorrection,
    SetVariableInstruction, StageMoveInstruction, ToggleInstruction,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Name of the multi-channel sequencing instruction
pub const MULTI_CHANNEL: &str = "Multi-channel";
/// Name of the guided calibration workflow
pub const GUIDED_CALIBRATION: &str = "Guided calibration";

// =============================================================================
// Phases
// =============================================================================

/// Assembly phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Real drivers for stages and lasers
    Hardware,
    /// Simulated drivers for stages and lasers
    Simulated,
    /// Cameras, detection arms, lightsheets and their links
    ImagingPath,
    /// Adaptation, width change, sequencing and workflow instructions
    StandardInstructions,
}

impl Phase {
    /// Label used in errors and logs
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Hardware => "hardware",
            Phase::Simulated => "simulated",
            Phase::ImagingPath => "imaging_path",
            Phase::StandardInstructions => "standard_instructions",
        }
    }
}

// =============================================================================
// Instrument Core
// =============================================================================

/// Owned, in-progress instrument. Each phase is one method call.
pub struct InstrumentCore {
    manifest: InstrumentManifest,
    registry: DeviceRegistry,
    instructions: InstructionList,
    backend: Option<Arc<dyn DeviceBackend>>,
    power_requests: Vec<Variable<f64>>,
    completed: Vec<Phase>,
}

impl InstrumentCore {
    /// Empty core for `manifest`.
    pub fn new(manifest: InstrumentManifest) -> Self {
        Self {
            manifest,
            registry: DeviceRegistry::new(),
            instructions: InstructionList::new(),
            backend: None,
            power_requests: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// Phases completed so far, in order
    pub fn completed(&self) -> &[Phase] {
        &self.completed
    }

    /// Registry built so far
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Instruction list built so far
    pub fn instructions(&self) -> &InstructionList {
        &self.instructions
    }

    fn done(&self, phase: Phase) -> bool {
        self.completed.contains(&phase)
    }

    fn require(&self, phase: Phase, any_of: &[Phase]) -> AppResult<()> {
        if any_of.iter().any(|p| self.done(*p)) {
            return Ok(());
        }
        Err(InstrumentError::PhaseOrder {
            phase: phase.label().to_string(),
            missing: any_of
                .iter()
                .map(|p| p.label())
                .collect::<Vec<_>>()
                .join(" or "),
        })
    }

    fn begin_backend_phase(&self, phase: Phase) -> AppResult<()> {
        if let Some(other) = [Phase::Hardware, Phase::Simulated]
            .into_iter()
            .find(|p| self.done(*p))
        {
            return Err(InstrumentError::Configuration(format!(
                "{} phase cannot run after {} phase",
                phase.label(),
                other.label()
            )));
        }
        Ok(())
    }

    fn backend(&self) -> AppResult<Arc<dyn DeviceBackend>> {
        self.backend.clone().ok_or_else(|| InstrumentError::PhaseOrder {
            phase: Phase::ImagingPath.label().to_string(),
            missing: "hardware or simulated".to_string(),
        })
    }

    /// Hardware phase: stages and lasers through a real driver backend.
    #[instrument(skip_all, fields(backend = %backend.name()))]
    pub fn hardware_phase(&mut self, backend: Arc<dyn DeviceBackend>) -> AppResult<()> {
        self.begin_backend_phase(Phase::Hardware)?;
        self.register_motion_and_lasers(backend)?;
        self.completed.push(Phase::Hardware);
        info!(devices = self.registry.len(), "hardware phase complete");
        Ok(())
    }

    /// Simulated phase: the same device roles through a simulation backend.
    #[instrument(skip_all, fields(backend = %backend.name()))]
    pub fn simulated_phase(&mut self, backend: Arc<dyn DeviceBackend>) -> AppResult<()> {
        self.begin_backend_phase(Phase::Simulated)?;
        if !backend.is_simulated() {
            warn!(backend = %backend.name(), "simulated phase running on a non-simulated backend");
        }
        self.register_motion_and_lasers(backend)?;
        self.completed.push(Phase::Simulated);
        info!(devices = self.registry.len(), "simulated phase complete");
        Ok(())
    }

    fn register_motion_and_lasers(&mut self, backend: Arc<dyn DeviceBackend>) -> AppResult<()> {
        let stage_cfg = self.manifest.stage.clone();

        // Sample stage and its chained axes
        let mut axes = Vec::with_capacity(stage_cfg.axes.len());
        for (i, spec) in stage_cfg.axes.iter().enumerate() {
            let driver = backend
                .stage_axis(spec)
                .map_err(|e| InstrumentError::construction(&spec.name, e))?;
            let axis = Arc::new(StageAxis::new(&spec.name, driver)?);
            self.registry.register(i, Device::StageAxis(axis.clone()))?;
            axes.push(axis);
        }
        let [x, y, z]: [Arc<StageAxis>; 3] = axes.try_into().map_err(|_| {
            InstrumentError::Configuration("sample stage needs exactly three axes".into())
        })?;
        let stage = Arc::new(ThreeAxisStage::new(&stage_cfg.name, x, y, z)?);
        self.registry.register(0, Device::Stage(stage.clone()))?;
        self.instructions.append_shared(
            Arc::new(StageMoveInstruction::new(
                format!("{}: move to home", stage_cfg.name),
                stage,
                stage_cfg.home,
            )),
            false,
        );

        // Beta-angle stages, one per lightsheet
        for (l, spec) in stage_cfg
            .angle_stages
            .iter()
            .take(self.manifest.instrument.lightsheets)
            .enumerate()
        {
            let driver = backend
                .stage_axis(spec)
                .map_err(|e| InstrumentError::construction(&spec.name, e))?;
            let angle = Arc::new(StageAxis::new(&spec.name, driver)?);
            self.registry.register(l, Device::AngleStage(angle))?;
        }

        // Lasers, each followed by its instruction library
        for (index, spec) in self.manifest.lasers.clone().iter().enumerate() {
            let driver = backend
                .laser(spec)
                .map_err(|e| InstrumentError::construction(&spec.name, e))?;
            let laser = Arc::new(Laser::new(&spec.name, driver)?);
            self.registry.register(index, Device::Laser(laser.clone()))?;
            self.add_laser_instructions(&laser);
        }

        self.backend = Some(backend);
        Ok(())
    }

    fn add_laser_instructions(&mut self, laser: &Laser) {
        let name = laser.name();
        let mut add = |instruction: Arc<dyn Instruction>| {
            self.instructions.append_shared(instruction, false);
        };

        for level in self.manifest.laser_power_levels.clone() {
            add(Arc::new(SetVariableInstruction::fixed(
                format!("{}: power {}%", name, level),
                vec![laser.power().clone()],
                level,
            )));
        }
        for on in [true, false] {
            add(Arc::new(SetVariableInstruction::fixed(
                format!("{}: laser {}", name, if on { "on" } else { "off" }),
                vec![laser.laser_on().clone()],
                on,
            )));
        }
        add(Arc::new(ToggleInstruction::new(
            format!("{}: switch laser on/off", name),
            laser.laser_on().clone(),
        )));
        add(Arc::new(ToggleInstruction::new(
            format!("{}: switch power on/off", name),
            laser.power_on().clone(),
        )));

        let request = Variable::new(format!("{}_requested_power", name), laser.power().get())
            .with_units("%")
            .with_range(0.0, 100.0);
        add(Arc::new(SetVariableInstruction::requested(
            format!("{}: change power", name),
            vec![laser.power().clone()],
            request.clone(),
        )));
        self.power_requests.push(request);
    }

    /// Imaging-path phase. Requires the hardware or simulated phase.
    #[instrument(skip_all)]
    pub fn imaging_path_phase(&mut self) -> AppResult<()> {
        self.require(Phase::ImagingPath, &[Phase::Hardware, Phase::Simulated])?;
        let backend = self.backend()?;
        let arms = self.manifest.instrument.detection_arms;
        let sheets = self.manifest.instrument.lightsheets;
        let defaults = self.manifest.camera_defaults();

        for c in 0..arms {
            let name = format!("C{}", c);
            let driver = backend
                .camera(c)
                .map_err(|e| InstrumentError::construction(&name, e))?;
            self.registry
                .register(c, StackCamera::new(name, driver, defaults)?)?;
        }

        let generator_name = &self.manifest.imaging.signal_generator;
        let generator = backend
            .signal_generator(generator_name)
            .map_err(|e| InstrumentError::construction(generator_name, e))?;
        self.registry.register(0, SignalGenerator::new(generator)?)?;

        for c in 0..arms {
            let pixel_size = self.registry.camera(c)?.pixel_size().get();
            self.registry
                .register(c, DetectionArm::new(format!("D{}", c), pixel_size))?;
        }

        let laser_lines = self.registry.count_of(DeviceKind::Laser);
        for l in 0..sheets {
            self.registry.register(
                l,
                LightSheet::new(
                    format!("I{}", l),
                    self.manifest.imaging.lightsheet_lambda_um,
                    laser_lines,
                ),
            )?;
        }

        for l in 0..self.registry.count_of(DeviceKind::LightSheet) {
            let sheet = self.registry.lightsheet(l)?;
            for c in 0..self.registry.count_of(DeviceKind::Camera) {
                let camera = self.registry.camera(c)?;
                camera.exposure().subscribe(sheet.effective_exposure())?;
                camera.stack_height().subscribe(sheet.image_height())?;
            }
            // seed from the first camera so lightsheets agree with it before any write
            let first = self.registry.camera(0)?;
            sheet.effective_exposure().set(first.exposure().get())?;
            sheet.image_height().set(first.stack_height().get())?;
        }

        self.registry.register(0, OpticalSwitch::new("OpticalSwitch", sheets))?;

        self.completed.push(Phase::ImagingPath);
        info!(
            cameras = arms,
            lightsheets = sheets,
            links = self.registry.link_count(),
            "imaging path phase complete"
        );
        Ok(())
    }

    /// Standard-instructions phase. Requires the imaging path.
    #[instrument(skip_all, fields(algorithm = %algorithm.name()))]
    pub fn standard_instructions_phase(
        &mut self,
        algorithm: Arc<dyn CorrectionAlgorithm>,
    ) -> AppResult<()> {
        self.require(Phase::StandardInstructions, &[Phase::ImagingPath])?;
        let lightsheets = self.registry.lightsheets();
        if lightsheets.is_empty() {
            return Err(InstrumentError::NotFound {
                kind: DeviceKind::LightSheet,
                index: 0,
            });
        }

        let arms = self.registry.detection_arms();
        let tuning = &self.manifest.adaptation;
        let mut adaptations: Vec<Arc<dyn Instruction>> = vec![
            Arc::new(AdaptiveZInstruction::new(
                lightsheets.clone(),
                arms.clone(),
                algorithm.clone(),
            )),
            Arc::new(AdaptationInstruction::new(
                AdaptationParameter::FocusZ,
                lightsheets.clone(),
                algorithm.clone(),
            )),
        ];
        for selection in [
            DetectionArmSelection::Manual(tuning.manual_detection_arm),
            DetectionArmSelection::SlidingWindow(tuning.sliding_window_width),
        ] {
            adaptations.push(Arc::new(AdaptationInstruction::focus_with_arm_selection(
                lightsheets.clone(),
                arms.clone(),
                selection,
                algorithm.clone(),
            )));
        }
        for parameter in AdaptationParameter::ALL
            .into_iter()
            .filter(|p| *p != AdaptationParameter::FocusZ)
        {
            adaptations.push(Arc::new(AdaptationInstruction::new(
                parameter,
                lightsheets.clone(),
                algorithm.clone(),
            )));
        }
        for adaptation in adaptations {
            self.instructions.append_shared(adaptation, false);
        }

        self.instructions.insert(
            0,
            change_lightsheet_width(&lightsheets, self.manifest.imaging.lightsheet_width),
        )?;

        self.instructions.append_shared(
            Arc::new(MultiChannelInstruction::new(
                MULTI_CHANNEL,
                self.registry.optical_switch()?,
            )),
            false,
        );

        self.instructions.append_shared(
            Arc::new(guided_calibration(
                GUIDED_CALIBRATION,
                &lightsheets,
                algorithm,
            )),
            false,
        );

        self.completed.push(Phase::StandardInstructions);
        info!(instructions = self.instructions.len(), "standard instructions phase complete");
        Ok(())
    }

    /// Enable the manifest's `[schedule]` names, then hand over the instrument.
    ///
    /// # Errors
    ///
    /// `PhaseOrder` if the standard instructions have not been added;
    /// `UnknownInstruction` if a scheduled name matches nothing.
    pub fn finish(self) -> AppResult<Instrument> {
        self.require(Phase::StandardInstructions, &[Phase::StandardInstructions])?;
        for name in &self.manifest.schedule.enabled {
            self.instructions.set_enabled_by_name(name, true)?;
            debug!(instruction = %name, "enabled by schedule");
        }
        let simulated = self.backend.as_ref().is_some_and(|b| b.is_simulated());
        Ok(Instrument {
            name: self.manifest.instrument.name.clone(),
            simulated,
            control_planes: self.manifest.instrument.control_planes,
            registry: self.registry,
            instructions: self.instructions,
            power_requests: self.power_requests,
        })
    }
}

// =============================================================================
// Instrument Assembly
// =============================================================================

/// Builds an [`Instrument`] from a manifest.
///
/// # Example
///
/// ```rust
/// use lightsheet_daq::{assembly::InstrumentAssembly, config::InstrumentManifest};
/// use lsm_core::DeviceKind;
///
/// let instrument = InstrumentAssembly::new(InstrumentManifest::default()).build().unwrap();
/// assert_eq!(instrument.registry().count_of(DeviceKind::LightSheet), 4);
/// ```
pub struct InstrumentAssembly {
    manifest: InstrumentManifest,
    hardware: Option<Arc<dyn DeviceBackend>>,
    simulation: Arc<dyn DeviceBackend>,
    correction: Arc<dyn CorrectionAlgorithm>,
}

impl InstrumentAssembly {
    /// Assembly over `manifest` with the built-in simulated backend and no correction.
    pub fn new(manifest: InstrumentManifest) -> Self {
        Self {
            manifest,
            hardware: None,
            simulation: Arc::new(SimulatedBackend::new()),
            correction: Arc::new(NoCorrection),
        }
    }

    /// Backend used when `hardware_present` is set.
    pub fn with_hardware_backend(mut self, backend: Arc<dyn DeviceBackend>) -> Self {
        self.hardware = Some(backend);
        self
    }

    /// Backend used when `hardware_present` is not set.
    pub fn with_simulated_backend(mut self, backend: Arc<dyn DeviceBackend>) -> Self {
        self.simulation = backend;
        self
    }

    /// Correction algorithm driving the adaptation instructions.
    pub fn with_correction(mut self, correction: Arc<dyn CorrectionAlgorithm>) -> Self {
        self.correction = correction;
        self
    }

    /// Validate the manifest and run every phase in order.
    ///
    /// # Errors
    ///
    /// Any failure aborts the build; no partially built instrument is returned.
    #[instrument(skip_all, fields(instrument = %self.manifest.instrument.name))]
    pub fn build(self) -> AppResult<Instrument> {
        self.manifest.validate()?;
        let hardware_present = self.manifest.instrument.hardware_present;
        let mut core = InstrumentCore::new(self.manifest);

        if hardware_present {
            let backend = self.hardware.ok_or_else(|| {
                InstrumentError::construction(
                    "hardware backend",
                    anyhow::anyhow!("hardware_present is set but no hardware backend was supplied"),
                )
            })?;
            core.hardware_phase(backend)?;
        } else {
            core.simulated_phase(self.simulation)?;
        }
        core.imaging_path_phase()?;
        core.standard_instructions_phase(self.correction)?;

        let instrument = core.finish()?;
        info!(
            devices = instrument.registry.len(),
            instructions = instrument.instructions.len(),
            "instrument assembled"
        );
        Ok(instrument)
    }
}

// =============================================================================
// Instrument
// =============================================================================

/// An assembled instrument: registry plus schedule.
pub struct Instrument {
    name: String,
    simulated: bool,
    control_planes: usize,
    registry: DeviceRegistry,
    instructions: InstructionList,
    power_requests: Vec<Variable<f64>>,
}

/// Snapshot of an instrument's composition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentSummary {
    /// Instrument name
    pub name: String,
    /// Whether drivers are simulated
    pub simulated: bool,
    /// Device count per kind
    pub devices: BTreeMap<DeviceKind, usize>,
    /// Total propagation links
    pub links: usize,
    /// Instruction names in schedule order
    pub schedule: Vec<String>,
    /// Enabled instruction names in schedule order
    pub enabled: Vec<String>,
}

impl std::fmt::Display for InstrumentSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.simulated { "simulated" } else { "hardware" };
        writeln!(f, "{} ({})", self.name, mode)?;
        for (kind, count) in &self.devices {
            writeln!(f, "  {:<18} {}", kind, count)?;
        }
        writeln!(f, "  propagation links  {}", self.links)?;
        writeln!(f, "schedule:")?;
        for (i, name) in self.schedule.iter().enumerate() {
            let mark = if self.enabled.contains(name) { "x" } else { " " };
            writeln!(f, "  [{}] {:>3} {}", mark, i, name)?;
        }
        Ok(())
    }
}

/// Outcome of one pass over the enabled instructions.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Names of instructions that completed
    pub completed: Vec<String>,
    /// Failures, in the order they happened
    pub failures: Vec<InstrumentError>,
}

impl Instrument {
    /// Instrument name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether drivers are simulated
    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// Device registry
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Schedule
    pub fn instructions(&self) -> &InstructionList {
        &self.instructions
    }

    /// Requested-power variable read by the change-power instruction of laser `index`.
    pub fn power_request(&self, index: usize) -> Option<&Variable<f64>> {
        self.power_requests.get(index)
    }

    /// Execution context for instructions of this instrument.
    pub fn context(&self) -> InstructionContext<'_> {
        InstructionContext::new(&self.registry, self.control_planes)
    }

    /// Run every enabled instruction once, in order.
    ///
    /// Failures are logged and collected; the pass continues with the next instruction.
    pub fn run_cycle(&self) -> CycleReport {
        let ctx = self.context();
        let mut report = CycleReport::default();
        for entry in self.instructions.ordered_enabled() {
            match entry.execute(&ctx) {
                Ok(()) => report.completed.push(entry.name().to_string()),
                Err(e) => {
                    warn!(instruction = %entry.name(), error = %e, "instruction failed");
                    report.failures.push(e);
                }
            }
        }
        report
    }

    /// Composition snapshot.
    pub fn summary(&self) -> InstrumentSummary {
        let devices = DeviceKind::ALL
            .into_iter()
            .map(|kind| (kind, self.registry.count_of(kind)))
            .filter(|(_, count)| *count > 0)
            .collect();
        InstrumentSummary {
            name: self.name.clone(),
            simulated: self.simulated,
            devices,
            links: self.registry.link_count(),
            schedule: self.instructions.names().into_iter().map(String::from).collect(),
            enabled: self
                .instructions
                .ordered_enabled()
                .map(|e| e.name().to_string())
                .collect(),
        }
    }
}
