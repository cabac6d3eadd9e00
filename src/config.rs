//! Instrument Manifest using Figment
//!
//! Strongly-typed description of one light-sheet instrument. Every hardware
//! identifier and default the assembly needs lives here, never in the assembly code.
//!
//! Configuration is layered:
//! 1. Built-in defaults ([`InstrumentManifest::default`]: simulated 2 arms, 4 lightsheets)
//! 2. A TOML file
//! 3. Environment variables prefixed with `LSM_`, `__` separating nested keys
//!    (e.g. `LSM_INSTRUMENT__DETECTION_ARMS=1`)
//!
//! # Example
//! ```no_run
//! use lightsheet_daq::config::InstrumentManifest;
//!
//! let manifest = InstrumentManifest::load_from("config/xwing.toml")?;
//! println!("{} detection arms", manifest.instrument.detection_arms);
//! # Ok::<(), lsm_core::InstrumentError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use lsm_core::{AppResult, InstrumentError};
use lsm_hardware::{AxisSpec, CameraDefaults, LaserSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LSM_";

/// Top-level instrument manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentManifest {
    /// Instrument composition
    pub instrument: InstrumentSection,
    /// Imaging-path defaults
    pub imaging: ImagingSection,
    /// Laser lines, registered in this order
    pub lasers: Vec<LaserSpec>,
    /// Power levels (percent) offered as one-shot instructions for every laser
    pub laser_power_levels: Vec<f64>,
    /// Motorized stages
    pub stage: StageSection,
    /// Detection arm selection for focus adaptation
    pub adaptation: AdaptationSection,
    /// Initial schedule
    pub schedule: ScheduleSection,
    /// Logging settings
    pub logging: LoggingSection,
}

/// Instrument composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSection {
    /// Instrument name
    pub name: String,
    /// Number of detection arms (one camera each)
    pub detection_arms: usize,
    /// Number of lightsheets
    pub lightsheets: usize,
    /// Whether real hardware drivers are used
    pub hardware_present: bool,
    /// Number of control planes used by adaptation
    pub control_planes: usize,
}

/// Imaging-path defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingSection {
    /// Default stack width in pixels
    pub stack_width: u32,
    /// Default stack height in pixels
    pub stack_height: u32,
    /// Default exposure in seconds
    pub exposure_s: f64,
    /// Lightsheet wavelength parameter in micrometers
    pub lightsheet_lambda_um: f64,
    /// Width applied by the first-run width-change instruction
    pub lightsheet_width: f64,
    /// Signal generator name
    pub signal_generator: String,
}

/// Motorized stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSection {
    /// Name of the composite sample stage
    pub name: String,
    /// Chained axes in x, y, z order
    pub axes: Vec<AxisSpec>,
    /// Beta-angle stages, one per lightsheet
    pub angle_stages: Vec<AxisSpec>,
    /// Target of the move-to-home instruction (x, y, z)
    pub home: [f64; 3],
}

/// Detection arm selection for focus adaptation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationSection {
    /// Arm used by the manual-selection focus adaptation
    pub manual_detection_arm: usize,
    /// Arms measured per run by the sliding-window focus adaptation
    pub sliding_window_width: usize,
}

/// Initial schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    /// Instruction names enabled right after assembly
    pub enabled: Vec<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored
    #[default]
    Pretty,
    /// Single-line
    Compact,
    /// JSON lines
    Json,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for InstrumentManifest {
    fn default() -> Self {
        Self {
            instrument: InstrumentSection::default(),
            imaging: ImagingSection::default(),
            lasers: default_lasers(),
            laser_power_levels: vec![0.0, 1.0, 5.0, 10.0, 20.0, 50.0, 100.0],
            stage: StageSection::default(),
            adaptation: AdaptationSection::default(),
            schedule: ScheduleSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl Default for InstrumentSection {
    fn default() -> Self {
        Self {
            name: "XWing".to_string(),
            detection_arms: 2,
            lightsheets: 4,
            hardware_present: false,
            control_planes: 7,
        }
    }
}

impl Default for ImagingSection {
    fn default() -> Self {
        let camera = CameraDefaults::default();
        Self {
            stack_width: camera.stack_width,
            stack_height: camera.stack_height,
            exposure_s: camera.exposure_s,
            lightsheet_lambda_um: 9.4,
            lightsheet_width: 0.45,
            signal_generator: "LightSheetSignalGenerator".to_string(),
        }
    }
}

impl Default for StageSection {
    fn default() -> Self {
        let axis = |name: &str, serial| AxisSpec {
            name: name.to_string(),
            serial,
        };
        Self {
            name: "Stage".to_string(),
            axes: vec![
                axis("XKCubeStage", 26000278),
                axis("YKCubeStage", 26000298),
                axis("ZKCubeStage", 26000299),
            ],
            angle_stages: vec![
                axis("Illumination0BAngleKCubeStage", 26000303),
                axis("Illumination1BAngleKCubeStage", 26000309),
                axis("Illumination2BAngleKCubeStage", 26000317),
                axis("Illumination3BAngleKCubeStage", 26000318),
            ],
            home: [0.0, 0.0, 0.0],
        }
    }
}

impl Default for AdaptationSection {
    fn default() -> Self {
        Self {
            manual_detection_arm: 0,
            sliding_window_width: 1,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn default_lasers() -> Vec<LaserSpec> {
    vec![
        LaserSpec {
            name: "Laser488".to_string(),
            wavelength_nm: 488.0,
            max_power_mw: 100.0,
        },
        LaserSpec {
            name: "Laser594".to_string(),
            wavelength_nm: 594.0,
            max_power_mw: 100.0,
        },
    ]
}

impl InstrumentManifest {
    /// Layered figment: defaults, then `path` (if any), then `LSM_` environment variables.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(InstrumentManifest::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load from a TOML file plus environment overrides, then validate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::from_figment(Self::figment(Some(path.as_ref())))
    }

    /// Load from defaults plus environment overrides, then validate.
    pub fn from_env() -> AppResult<Self> {
        Self::from_figment(Self::figment(None))
    }

    /// Extract and validate.
    pub fn from_figment(figment: Figment) -> AppResult<Self> {
        let manifest: Self = figment.extract()?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Camera defaults applied in the imaging-path phase
    pub fn camera_defaults(&self) -> CameraDefaults {
        CameraDefaults {
            stack_width: self.imaging.stack_width,
            stack_height: self.imaging.stack_height,
            exposure_s: self.imaging.exposure_s,
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let fail = |msg: String| -> AppResult<()> { Err(InstrumentError::Configuration(msg)) };

        let instrument = &self.instrument;
        if instrument.detection_arms == 0 {
            return fail("instrument.detection_arms must be at least 1".into());
        }
        if instrument.lightsheets == 0 {
            return fail("instrument.lightsheets must be at least 1".into());
        }

        let imaging = &self.imaging;
        if imaging.stack_width == 0 || imaging.stack_height == 0 {
            return fail(format!(
                "imaging stack size {}x{} must be positive",
                imaging.stack_width, imaging.stack_height
            ));
        }
        if !(imaging.exposure_s.is_finite() && imaging.exposure_s > 0.0) {
            return fail(format!("imaging.exposure_s {} must be positive", imaging.exposure_s));
        }
        if !(0.0..=1.0).contains(&imaging.lightsheet_width) {
            return fail(format!(
                "imaging.lightsheet_width {} must be within 0-1",
                imaging.lightsheet_width
            ));
        }

        let mut names = HashSet::new();
        for laser in &self.lasers {
            if laser.name.trim().is_empty() {
                return fail("laser name cannot be empty".into());
            }
            if !names.insert(laser.name.as_str()) {
                return fail(format!("duplicate laser name: {}", laser.name));
            }
            if laser.wavelength_nm <= 0.0 || laser.max_power_mw <= 0.0 {
                return fail(format!(
                    "laser {} needs positive wavelength and max power",
                    laser.name
                ));
            }
        }

        if let Some(level) = self
            .laser_power_levels
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return fail(format!("laser power level {} must be within 0-100 %", level));
        }

        if self.stage.axes.len() != 3 {
            return fail(format!(
                "stage.axes must list x, y and z, found {}",
                self.stage.axes.len()
            ));
        }
        if self.stage.angle_stages.len() < instrument.lightsheets {
            return fail(format!(
                "{} lightsheets need as many angle stages, found {}",
                instrument.lightsheets,
                self.stage.angle_stages.len()
            ));
        }

        let adaptation = &self.adaptation;
        if adaptation.manual_detection_arm >= instrument.detection_arms {
            return fail(format!(
                "adaptation.manual_detection_arm {} out of range ({} detection arms)",
                adaptation.manual_detection_arm, instrument.detection_arms
            ));
        }
        if !(1..=instrument.detection_arms).contains(&adaptation.sliding_window_width) {
            return fail(format!(
                "adaptation.sliding_window_width {} must be within 1-{}",
                adaptation.sliding_window_width, instrument.detection_arms
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return fail(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        Ok(())
    }
}
