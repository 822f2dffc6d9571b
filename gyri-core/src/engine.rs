use crate::boundary::BoundaryField;
use crate::config::{Config, FoldConfig};
use crate::error::{SimError, SimResult};
use crate::grid::Grid;
use crate::phases::{self, CyclePhase, LayerGrowth};
use crate::reference::ReferenceMap;
use crate::types::{Field, Step};
use ndarray::Array2;
use rand::Rng;

/// Heights of both layers at the start of `step`.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationState {
    /// Index of the next step to run.
    pub step: Step,
    /// Folding, constrained layer.
    pub outer: Field,
    /// Slower layer, present when enabled in the configuration.
    pub inner: Option<Field>,
}

/// Result of one engine step.
#[derive(Clone, Debug)]
pub struct StepOutcome {
    pub state: SimulationState,
    /// Outer-layer points pulled back by the constraint in this step.
    pub clamped_points: usize,
}

/// Static inputs of the growth update: grid, boundary, per-layer growth
/// parameters and the fixed regional and genetic factors.
///
/// The engine never mutates a state; [`GrowthEngine::step`] maps one
/// state to the next.
#[derive(Clone, Debug)]
pub struct GrowthEngine {
    grid: Grid,
    boundary: BoundaryField,
    outer: LayerGrowth,
    inner: Option<LayerGrowth>,
    folding: FoldConfig,
    regional: Field,
    genetic: Field,
    total_steps: Step,
}

impl GrowthEngine {
    /// Builds the engine and its initial state.
    ///
    /// `reference`, when given, must match the grid shape. It sets the
    /// initial outer heights (rescaled onto `[0, initial_height_range]`)
    /// and shapes the boundary. Randomness is drawn from `rng` in a fixed
    /// order: initial noise first, then the genetic modifier.
    pub fn new(
        cfg: &Config,
        grid: Grid,
        reference: Option<&ReferenceMap>,
        rng: &mut impl Rng,
    ) -> SimResult<(Self, SimulationState)> {
        cfg.validate()?;

        let total_steps = cfg.run.total_steps;
        let boundary = BoundaryField::new(&cfg.boundary, &grid, total_steps, reference)?;
        boundary.check_feasible(&grid)?;

        let g = &cfg.growth;
        let mut outer_heights = match reference {
            Some(map) => map.rescaled(0.0, g.initial_height_range),
            None => Array2::zeros(grid.shape()),
        };
        phases::perturb(&mut outer_heights, g.initial_noise_std, rng)?;
        let genetic = phases::genetic_modifier(grid.shape(), g.genetic_variation_std, rng)?;
        let regional = phases::regional_factor(&grid, g.regional_amplitude, g.regional_width);

        let outer = LayerGrowth {
            max_rate: g.max_rate_outer,
            cycle_amplitude: g.outer_cycle_amplitude,
            cycle_frequency: g.cycle_frequency,
            phase: CyclePhase::Sine,
        };
        let inner = g.inner_layer.then_some(LayerGrowth {
            max_rate: g.max_rate_inner,
            cycle_amplitude: g.inner_cycle_amplitude,
            cycle_frequency: g.cycle_frequency,
            phase: CyclePhase::Cosine,
        });

        let state = SimulationState {
            step: 0,
            outer: outer_heights,
            inner: inner.map(|_| Array2::zeros(grid.shape())),
        };

        let engine = Self {
            grid,
            boundary,
            outer,
            inner,
            folding: cfg.folding.clone(),
            regional,
            genetic,
            total_steps,
        };
        Ok((engine, state))
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn boundary(&self) -> &BoundaryField {
        &self.boundary
    }

    pub fn total_steps(&self) -> Step {
        self.total_steps
    }

    /// Runs one step on `state` and returns the next state.
    ///
    /// ### Errors
    /// - [`SimError::Configuration`] if `state` is already terminal or its
    ///   fields do not match the grid.
    /// - [`SimError::NumericalDivergence`] if a layer holds a non-finite
    ///   value after the update.
    pub fn step(&self, state: &SimulationState) -> SimResult<StepOutcome> {
        let t = state.step;
        if t >= self.total_steps {
            return Err(SimError::config(format!(
                "state at step {t} is past the last step {}",
                self.total_steps
            )));
        }
        if state.outer.dim() != self.grid.shape()
            || state.inner.as_ref().is_some_and(|f| f.dim() != self.grid.shape())
            || state.inner.is_some() != self.inner.is_some()
        {
            return Err(SimError::config("state does not match the engine's grid or layers"));
        }

        let growth_radius = self.boundary.growth_radius();

        let rate = phases::growth_rate(
            &self.outer,
            t,
            self.regional.view(),
            Some(self.genetic.view()),
        );
        let mut outer = phases::radial_growth_phase(
            &self.grid,
            state.outer.view(),
            rate.view(),
            growth_radius,
        );
        phases::fold_phase(&self.grid, &mut outer, &self.folding, t, self.total_steps);

        let radius = self.boundary.constraint_radius(t);
        let clamped_points =
            phases::constraint_phase(&self.grid, state.outer.view(), &mut outer, radius.view());
        ensure_finite(&outer, t, "outer height")?;

        let inner = match (&self.inner, &state.inner) {
            (Some(layer), Some(heights)) => {
                let rate = phases::growth_rate(layer, t, self.regional.view(), None);
                let next =
                    phases::radial_growth_phase(&self.grid, heights.view(), rate.view(), growth_radius);
                ensure_finite(&next, t, "inner height")?;
                Some(next)
            }
            _ => None,
        };

        Ok(StepOutcome {
            state: SimulationState {
                step: t + 1,
                outer,
                inner,
            },
            clamped_points,
        })
    }
}

pub(crate) fn ensure_finite(field: &Field, step: Step, quantity: &'static str) -> SimResult<()> {
    if field.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SimError::NumericalDivergence { step, quantity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn small_config() -> Config {
        let mut cfg = Config::default();
        cfg.grid.points = 12;
        cfg.run.total_steps = 8;
        cfg
    }

    fn build(cfg: &Config, seed: u64) -> (GrowthEngine, SimulationState) {
        let grid = Grid::new(cfg.grid.points, cfg.grid.half_extent).expect("grid");
        let mut rng = StdRng::seed_from_u64(seed);
        GrowthEngine::new(cfg, grid, None, &mut rng).expect("engine")
    }

    #[test]
    fn initial_state_has_both_layers_and_noise() {
        let (_, state) = build(&small_config(), 1);
        assert_eq!(state.step, 0);
        assert_eq!(state.outer.dim(), (12, 12));
        assert!(state.outer.iter().any(|&z| z != 0.0));
        assert!(state.inner.as_ref().is_some_and(|f| f.iter().all(|&z| z == 0.0)));
    }

    #[test]
    fn inner_layer_can_be_disabled() {
        let mut cfg = small_config();
        cfg.growth.inner_layer = false;
        let (engine, state) = build(&cfg, 1);
        assert!(state.inner.is_none());

        let next = engine.step(&state).expect("step");
        assert!(next.state.inner.is_none());
    }

    #[test]
    fn step_advances_index_and_leaves_input_untouched() {
        let (engine, state) = build(&small_config(), 5);
        let before = state.clone();
        let next = engine.step(&state).expect("step");

        assert_eq!(state, before);
        assert_eq!(next.state.step, 1);
        assert_ne!(next.state.outer, state.outer);
    }

    #[test]
    fn inner_layer_grows_slower_than_outer_at_centre() {
        let mut cfg = small_config();
        cfg.folding.strength_base = 0.0;
        cfg.folding.fine_amplitude = 0.0;
        cfg.growth.initial_noise_std = 0.0;
        let (engine, state) = build(&cfg, 2);

        let next = engine.step(&state).expect("step").state;
        let inner = next.inner.expect("inner layer");
        assert!(inner[[6, 6]] > 0.0);
        assert!(inner[[6, 6]] < next.outer[[6, 6]]);
    }

    #[test]
    fn terminal_state_is_rejected() {
        let (engine, mut state) = build(&small_config(), 1);
        state.step = engine.total_steps();
        assert!(matches!(engine.step(&state), Err(SimError::Configuration(_))));
    }

    #[test]
    fn non_finite_heights_are_reported_with_step() {
        let (engine, mut state) = build(&small_config(), 1);
        state.step = 3;
        state.inner.as_mut().expect("inner")[[0, 0]] = f64::NAN;

        match engine.step(&state) {
            Err(SimError::NumericalDivergence { step, quantity }) => {
                assert_eq!(step, 3);
                assert_eq!(quantity, "inner height");
            }
            other => panic!("expected divergence, got {other:?}"),
        }
    }

    #[test]
    fn reference_sets_initial_baseline() {
        let mut cfg = small_config();
        cfg.growth.initial_noise_std = 0.0;
        let grid = Grid::new(12, 1.0).expect("grid");
        let reference =
            ReferenceMap::new(Array2::from_shape_fn((12, 12), |(i, _)| 1.0 + i as f64))
                .expect("reference");
        let mut rng = StdRng::seed_from_u64(0);

        let (_, state) =
            GrowthEngine::new(&cfg, grid, Some(&reference), &mut rng).expect("engine");
        assert_eq!(state.outer[[0, 4]], 0.0);
        assert!((state.outer[[11, 4]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn infeasible_boundary_is_a_configuration_error() {
        let mut cfg = small_config();
        cfg.boundary.base_radius = 1.0;
        let grid = Grid::new(12, 1.0).expect("grid");
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            GrowthEngine::new(&cfg, grid, None, &mut rng),
            Err(SimError::Configuration(_))
        ));
    }
}
