//! Entry point for the gyrification viewer.
//!
//! Parses the command line, builds the [`Simulation`], and either runs it
//! headless (printing per-step diagnostics) or hands it to [`Viewer`].

mod reference_io;
mod viewer;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use gyri_core::reference::ReferenceMap;
use gyri_core::{Config, Frame, Simulation};
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use viewer::Viewer;

#[derive(Parser, Debug)]
#[command(name = "gyri", about = "Cortical folding growth simulation")]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reference density: a NIfTI volume (`.nii`, `.nii.gz`) or a grayscale image.
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Run to completion without a window, logging diagnostics.
    #[arg(long)]
    headless: bool,

    #[arg(long)]
    steps: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    points: Option<usize>,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(steps) = self.steps {
            cfg.run.total_steps = steps;
        }
        if let Some(seed) = self.seed {
            cfg.run.seed = seed;
        }
        if let Some(points) = self.points {
            cfg.grid.points = points;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn run_headless(mut sim: Simulation) -> Result<()> {
    let summary = sim.run(&mut |frame: &Frame<'_>| {
        let report = frame.report;
        info!(step = report.step, max_z = report.max_height, "step");
        if let Some(sample) = report.fractal {
            match sample.dimension {
                Some(value) => info!(step = sample.step, fractal_dimension = value, "fractal"),
                None => info!(step = sample.step, "fractal dimension undefined"),
            }
        }
        ControlFlow::Continue(())
    })?;

    match summary.final_fractal {
        Some(value) => info!(fractal_dimension = value, "estimated final fractal dimension"),
        None => info!("final fractal dimension undefined"),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let cfg = cli.load_config()?;

    let reference: Option<ReferenceMap> = cli
        .reference
        .as_deref()
        .map(reference_io::load_reference)
        .transpose()?;

    let sim = Simulation::from_seed(cfg, reference.as_ref())?;

    if cli.headless {
        return run_headless(sim);
    }

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Gyrification",
        options,
        Box::new(move |_cc| Ok(Box::new(Viewer::new(sim, reference)))),
    )
    .map_err(|e| anyhow!("viewer failed: {e}"))
}
