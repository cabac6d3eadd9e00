//! # Light-Sheet DAQ
//!
//! Device-composition core of a multi-view light-sheet microscope. Given a manifest of
//! detection arms, lightsheets and laser lines, it assembles a registry of devices whose
//! variables are wired together by synchronous propagation links, plus an ordered
//! schedule of instructions that act on those devices.
//!
//! ## Crate Structure
//!
//! - **`config`**: [`InstrumentManifest`](config::InstrumentManifest), layered from
//!   defaults, a TOML file and `LSM_*` environment variables with `figment`.
//! - **`tracing_setup`**: structured logging with `tracing-subscriber`.
//! - **`assembly`**: [`InstrumentAssembly`](assembly::InstrumentAssembly), the composition
//!   root running the hardware/simulated, imaging-path and standard-instructions phases.
//!
//! The building blocks live in the workspace crates:
//!
//! - `lsm-core`: reactive [`Variable`](lsm_core::Variable)s, device kinds, driver traits
//!   and [`InstrumentError`](lsm_core::InstrumentError)
//! - `lsm-hardware`: device variants, [`DeviceRegistry`](lsm_hardware::DeviceRegistry) and
//!   the simulated driver backend
//! - `lsm-instructions`: [`Instruction`](lsm_instructions::Instruction) variants and the
//!   [`InstructionList`](lsm_instructions::InstructionList)

pub mod assembly;
pub mod config;
pub mod tracing_setup;

pub use assembly::{Instrument, InstrumentAssembly, InstrumentCore, InstrumentSummary, Phase};
pub use config::InstrumentManifest;
