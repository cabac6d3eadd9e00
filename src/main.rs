//! CLI entry point for the light-sheet instrument
//!
//! Assembles an instrument from a manifest and either describes it or runs its
//! enabled schedule.
//!
//! # Usage
//!
//! ```bash
//! lightsheet_daq --config config/xwing.toml describe
//! lightsheet_daq --arms 1 --lightsheets 2 run --cycles 3
//! lightsheet_daq describe --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lightsheet_daq::{tracing_setup, InstrumentAssembly, InstrumentManifest};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "lightsheet_daq")]
#[command(about = "Assemble and drive a multi-view light-sheet microscope", long_about = None)]
struct Cli {
    /// Instrument manifest (TOML); `LSM_*` environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the number of detection arms
    #[arg(long, global = true)]
    arms: Option<usize>,

    /// Override the number of lightsheets
    #[arg(long, global = true)]
    lightsheets: Option<usize>,

    /// Force the simulated backend
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the assembled devices, links and schedule
    Describe {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run the enabled instructions in order
    Run {
        /// Number of passes over the schedule
        #[arg(long, default_value = "1")]
        cycles: usize,

        /// Additional instructions to enable by name
        #[arg(long = "enable")]
        enable: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manifest = InstrumentManifest::from_figment(InstrumentManifest::figment(
        cli.config.as_deref(),
    ))
    .context("failed to load instrument manifest")?;
    if let Some(arms) = cli.arms {
        manifest.instrument.detection_arms = arms;
    }
    if let Some(lightsheets) = cli.lightsheets {
        manifest.instrument.lightsheets = lightsheets;
    }
    if cli.simulate {
        manifest.instrument.hardware_present = false;
    }

    tracing_setup::init_from_manifest(&manifest).map_err(anyhow::Error::msg)?;

    let instrument = InstrumentAssembly::new(manifest)
        .build()
        .context("instrument assembly failed")?;

    match cli.command {
        Commands::Describe { json } => {
            let summary = instrument.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print!("{}", summary);
            }
        }
        Commands::Run { cycles, enable } => {
            for name in &enable {
                instrument.instructions().set_enabled_by_name(name, true)?;
            }
            for cycle in 0..cycles {
                let report = instrument.run_cycle();
                info!(
                    cycle,
                    completed = report.completed.len(),
                    failed = report.failures.len(),
                    "cycle finished"
                );
                if report.completed.is_empty() && report.failures.is_empty() {
                    warn!("no instruction is enabled");
                }
            }
        }
    }

    Ok(())
}
