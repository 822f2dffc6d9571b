//! Simulation driver: owns the engine and the current state, produces
//! diagnostics after every step, and hands frames to an observer.

use crate::boundary::BoundaryField;
use crate::config::Config;
use crate::curvature;
use crate::engine::{self, GrowthEngine, SimulationState};
use crate::error::{SimError, SimResult};
use crate::fractal::{self, FractalSample};
use crate::grid::Grid;
use crate::reference::ReferenceMap;
use crate::types::{Field, Step};
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::ControlFlow;
use tracing::{debug, info, warn};

/// Structured diagnostics of one committed step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub step: Step,
    pub max_height: f64,
    pub clamped_points: usize,
    /// Present on sampling steps (every `fractal_interval` steps and the last one).
    pub fractal: Option<FractalSample>,
}

/// Read-only view of the simulation handed to a [`StepObserver`].
pub struct Frame<'a> {
    pub report: &'a StepReport,
    pub grid: &'a Grid,
    pub heights: ArrayView2<'a, f64>,
    pub curvature: ArrayView2<'a, f64>,
}

/// Receives a [`Frame`] after every committed step.
///
/// Returning [`ControlFlow::Break`] stops the run before the next step
/// begins.
pub trait StepObserver {
    fn on_step(&mut self, frame: &Frame<'_>) -> ControlFlow<()>;
}

impl<F> StepObserver for F
where
    F: FnMut(&Frame<'_>) -> ControlFlow<()>,
{
    fn on_step(&mut self, frame: &Frame<'_>) -> ControlFlow<()> {
        self(frame)
    }
}

/// Outcome of [`Simulation::run`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub steps_completed: Step,
    pub cancelled: bool,
    pub max_height: f64,
    /// Fractal estimate of the last sampled step, if it was defined.
    pub final_fractal: Option<f64>,
}

pub struct Simulation {
    config: Config,
    engine: GrowthEngine,
    state: SimulationState,
    curvature: Field,
    fractal_log: Vec<FractalSample>,
}

impl Simulation {
    /// Builds a simulation.
    ///
    /// The reference map (if any) is resampled to the grid resolution.
    /// `rng` is only used here, for the initial perturbation and the
    /// genetic modifier.
    pub fn new(
        config: Config,
        reference: Option<&ReferenceMap>,
        rng: &mut impl Rng,
    ) -> SimResult<Self> {
        config.validate()?;
        let grid = Grid::new(config.grid.points, config.grid.half_extent)?;

        let resampled = reference
            .map(|map| map.resample(grid.len(), grid.len()))
            .transpose()?;
        let (engine, state) =
            GrowthEngine::new(&config, grid, resampled.as_ref(), rng)?;

        let curvature =
            curvature::curvature(state.outer.view(), config.diagnostics.curvature_order)?;
        engine::ensure_finite(&curvature, 0, "curvature")?;

        info!(
            points = config.grid.points,
            total_steps = config.run.total_steps,
            growth_radius = engine.boundary().growth_radius(),
            reference = reference.is_some(),
            "simulation initialised"
        );

        Ok(Self {
            config,
            engine,
            state,
            curvature,
            fractal_log: Vec::new(),
        })
    }

    /// Builds a simulation whose randomness comes from `config.run.seed`.
    pub fn from_seed(config: Config, reference: Option<&ReferenceMap>) -> SimResult<Self> {
        let mut rng = StdRng::seed_from_u64(config.run.seed);
        Self::new(config, reference, &mut rng)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        self.engine.grid()
    }

    pub fn boundary(&self) -> &BoundaryField {
        self.engine.boundary()
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Index of the next step to run.
    pub fn step(&self) -> Step {
        self.state.step
    }

    pub fn is_finished(&self) -> bool {
        self.state.step >= self.engine.total_steps()
    }

    /// Outer-layer heights, row-major in grid order.
    pub fn heights(&self) -> ArrayView2<'_, f64> {
        self.state.outer.view()
    }

    pub fn inner_heights(&self) -> Option<ArrayView2<'_, f64>> {
        self.state.inner.as_ref().map(|f| f.view())
    }

    /// Curvature of the current outer heights.
    pub fn curvature(&self) -> ArrayView2<'_, f64> {
        self.curvature.view()
    }

    /// Every fractal sample taken so far, oldest first.
    pub fn fractal_log(&self) -> &[FractalSample] {
        &self.fractal_log
    }

    /// Runs one step.
    ///
    /// ### Returns
    /// - `Ok(Some(report))` after a committed step.
    /// - `Ok(None)` if the run has already reached its last step.
    ///
    /// ### Errors
    /// [`SimError::NumericalDivergence`] if heights or curvature turn
    /// non-finite. The state is left at the last good step.
    pub fn advance(&mut self) -> SimResult<Option<StepReport>> {
        if self.is_finished() {
            return Ok(None);
        }
        let t = self.state.step;

        let outcome = self.engine.step(&self.state)?;
        let curvature = curvature::curvature(
            outcome.state.outer.view(),
            self.config.diagnostics.curvature_order,
        )?;
        engine::ensure_finite(&curvature, t, "curvature")?;

        self.state = outcome.state;
        self.curvature = curvature;

        let max_height = self
            .state
            .outer
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        debug!(step = t, max_height, clamped = outcome.clamped_points, "step committed");
        if outcome.clamped_points > 0 {
            debug!(step = t, count = outcome.clamped_points, "constraint clamped points");
        }

        let last = t + 1 == self.engine.total_steps();
        let fractal = if t % self.config.diagnostics.fractal_interval == 0 || last {
            Some(self.sample_fractal(t))
        } else {
            None
        };

        Ok(Some(StepReport {
            step: t,
            max_height,
            clamped_points: outcome.clamped_points,
            fractal,
        }))
    }

    /// Advances until the last step or until `observer` breaks.
    ///
    /// A cancelled run still samples the fractal proxy on the step it
    /// stopped at, so `final_fractal` describes the state left behind.
    pub fn run(&mut self, observer: &mut impl StepObserver) -> SimResult<RunSummary> {
        let mut steps_completed = 0;
        let mut cancelled = false;
        let mut max_height = f64::NEG_INFINITY;

        while let Some(report) = self.advance()? {
            steps_completed += 1;
            max_height = report.max_height;

            let flow = observer.on_step(&Frame {
                report: &report,
                grid: self.engine.grid(),
                heights: self.state.outer.view(),
                curvature: self.curvature.view(),
            });
            if flow.is_break() {
                cancelled = true;
                // The stopping state is terminal for this run.
                if report.fractal.is_none() {
                    self.sample_fractal(report.step);
                }
                info!(step = report.step, "run cancelled by observer");
                break;
            }
        }

        let final_fractal = self.fractal_log.last().and_then(|s| s.dimension);
        info!(steps_completed, cancelled, ?final_fractal, "run finished");

        Ok(RunSummary {
            steps_completed,
            cancelled,
            max_height,
            final_fractal,
        })
    }

    fn sample_fractal(&mut self, step: Step) -> FractalSample {
        let dimension = match fractal::estimate(
            self.state.outer.view(),
            self.engine.grid(),
            self.config.diagnostics.fractal_layers,
        ) {
            Ok(value) => {
                info!(step, fractal_dimension = value, "fractal dimension sampled");
                Some(value)
            }
            Err(SimError::DegenerateGeometry(reason)) => {
                warn!(step, %reason, "fractal dimension undefined");
                None
            }
            Err(other) => {
                warn!(step, error = %other, "fractal dimension failed");
                None
            }
        };
        let sample = FractalSample { step, dimension };
        self.fractal_log.push(sample);
        sample
    }
}
