//! Per-step phases of the gyrification update.
//!
//! One engine step runs, in order:
//! 1. [`growth_rate`]: time- and space-varying growth rate of a layer.
//! 2. [`radial_growth_phase`]: growth towards the growth radius, fading
//!    to zero at it.
//! 3. [`fold_phase`]: multi-frequency sinusoidal perturbation of the
//!    outer layer.
//! 4. [`constraint_phase`]: clamps outer-layer points that left the
//!    constraint radius.

use crate::config::FoldConfig;
use crate::error::{SimError, SimResult};
use crate::grid::Grid;
use crate::types::{Field, Step};
use glam::DVec3;
use ndarray::{Array2, ArrayView2, Zip};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Smallest value a genetic modifier may take.
pub const MIN_GENETIC_MODIFIER: f64 = 1e-3;

/// Shape of the periodic proliferation cycle of a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    Sine,
    Cosine,
}

/// Growth parameters of one layer.
#[derive(Clone, Copy, Debug)]
pub struct LayerGrowth {
    pub max_rate: f64,
    pub cycle_amplitude: f64,
    pub cycle_frequency: f64,
    pub phase: CyclePhase,
}

impl LayerGrowth {
    /// `g_max * (1 + a * cycle(omega * t))`, the spatially uniform part of the rate.
    pub fn temporal_rate(&self, step: Step) -> f64 {
        let angle = self.cycle_frequency * step as f64;
        let cycle = match self.phase {
            CyclePhase::Sine => angle.sin(),
            CyclePhase::Cosine => angle.cos(),
        };
        self.max_rate * (1.0 + self.cycle_amplitude * cycle)
    }
}

/// Central growth bump `1 + amplitude * exp(-(x² + y²) / width)`.
///
/// Strictly positive as long as `amplitude > -1` and `width > 0`, which
/// [`crate::config::Config::validate`] enforces.
pub fn regional_factor(grid: &Grid, amplitude: f64, width: f64) -> Field {
    Zip::from(grid.x())
        .and(grid.y())
        .map_collect(|&x, &y| 1.0 + amplitude * (-(x * x + y * y) / width).exp())
}

/// Per-point multiplier `1 + N(0, std)`, sampled once, floored at
/// [`MIN_GENETIC_MODIFIER`] so it never flips the sign of growth.
///
/// ### Errors
/// [`SimError::Configuration`] if `std` is negative or not finite.
pub fn genetic_modifier(shape: (usize, usize), std: f64, rng: &mut impl Rng) -> SimResult<Field> {
    let normal = normal(std, "genetic_variation_std")?;
    Ok(Array2::from_shape_simple_fn(shape, || {
        (1.0 + normal.sample(rng)).max(MIN_GENETIC_MODIFIER)
    }))
}

/// Adds `N(0, std)` noise to every point.
///
/// ### Errors
/// [`SimError::Configuration`] if `std` is negative or not finite.
pub fn perturb(heights: &mut Field, std: f64, rng: &mut impl Rng) -> SimResult<()> {
    let normal = normal(std, "initial_noise_std")?;
    heights.mapv_inplace(|z| z + normal.sample(rng));
    Ok(())
}

fn normal(std: f64, name: &str) -> SimResult<Normal<f64>> {
    if !std.is_finite() {
        return Err(SimError::config(format!("{name} must be finite, got {std}")));
    }
    Normal::new(0.0, std).map_err(|e| SimError::config(format!("{name} = {std}: {e}")))
}

/// Growth rate field of a layer at `step`:
/// `g(x, y, t) = g_max * (1 + a * cycle(omega t)) * regional(x, y) * genetic(x, y)`.
///
/// ### Parameters
/// - `layer` - Rate, cycle amplitude, frequency and phase of the layer.
/// - `step` - Current step index.
/// - `regional` - Static regional factor.
/// - `genetic` - Static genetic modifier, or `None` for layers without one.
pub fn growth_rate(
    layer: &LayerGrowth,
    step: Step,
    regional: ArrayView2<'_, f64>,
    genetic: Option<ArrayView2<'_, f64>>,
) -> Field {
    let base = layer.temporal_rate(step);
    match genetic {
        Some(genetic) => Zip::from(regional)
            .and(genetic)
            .map_collect(|&r, &g| base * r * g),
        None => regional.mapv(|r| base * r),
    }
}

/// Grows each point towards the growth radius.
///
/// For each grid point:
///
/// `Z' = Z + g * (1 - sqrt(x² + y² + Z²) / radius)`
///
/// The increment shrinks as the point approaches `radius` and turns
/// negative beyond it.
///
/// ### Returns
/// The proposed heights; `heights` itself is left untouched.
pub fn radial_growth_phase(
    grid: &Grid,
    heights: ArrayView2<'_, f64>,
    rate: ArrayView2<'_, f64>,
    radius: f64,
) -> Field {
    Zip::from(grid.x())
        .and(grid.y())
        .and(heights)
        .and(rate)
        .map_collect(|&x, &y, &z, &g| {
            let dist = (x * x + y * y + z * z).sqrt();
            z + g * (1.0 - dist / radius)
        })
}

/// Fold amplitude `A1(t) = strength_base * (1 + m * sin(nu * t))`.
pub fn fold_strength(folding: &FoldConfig, step: Step) -> f64 {
    folding.strength_base
        * (1.0 + folding.modulation_amplitude * (folding.modulation_frequency * step as f64).sin())
}

/// Adds the folding perturbation to `heights` in place:
///
/// `A1 sin(k1 x) cos(k1 y) + c2 A1 cos(k2 x) sin(k2 y)
///  + A3 cos(k3 x) sin(k3 y) exp(-t / T)`
///
/// The fine (`k3`) term decays with normalized time.
pub fn fold_phase(
    grid: &Grid,
    heights: &mut Field,
    folding: &FoldConfig,
    step: Step,
    total_steps: Step,
) {
    let a1 = fold_strength(folding, step);
    let a2 = folding.secondary_weight * a1;
    let a3 = folding.fine_amplitude * (-(step as f64) / total_steps as f64).exp();
    let [k1, k2, k3] = folding.wavenumbers;

    Zip::from(heights)
        .and(grid.x())
        .and(grid.y())
        .for_each(|z, &x, &y| {
            *z += a1 * (k1 * x).sin() * (k1 * y).cos()
                + a2 * (k2 * x).cos() * (k2 * y).sin()
                + a3 * (k3 * x).cos() * (k3 * y).sin();
        });
}

/// Pulls outer-layer points back inside the constraint radius.
///
/// For each point whose proposed position `(x, y, Z')` lies farther than
/// `radius(x, y)` from the origin:
///
/// 1. Rescale along the ray through the *previous* position:
///    `Z' = radius * Z_old / |(x, y, Z_old)|`. A previous position at the
///    origin has no direction and skips this.
/// 2. A point can only move along its own column, so if the result is
///    still outside, project it onto the boundary sphere:
///    `|Z'| = sqrt(max(radius² - x² - y², 0))`, keeping its sign.
///
/// Afterwards every point satisfies `|(x, y, Z')| <= radius` up to
/// rounding, provided `radius >= sqrt(x² + y²)` (see
/// [`crate::boundary::BoundaryField::check_feasible`]).
///
/// ### Parameters
/// - `grid` - Grid coordinates.
/// - `previous` - Heights before this step.
/// - `proposed` - Heights after growth and folding; clamped in place.
/// - `radius` - Constraint radius for this step.
///
/// ### Returns
/// Number of points that were clamped.
pub fn constraint_phase(
    grid: &Grid,
    previous: ArrayView2<'_, f64>,
    proposed: &mut Field,
    radius: ArrayView2<'_, f64>,
) -> usize {
    let mut clamped = 0;

    Zip::from(proposed)
        .and(previous)
        .and(radius)
        .and(grid.x())
        .and(grid.y())
        .for_each(|z, &z_old, &r, &x, &y| {
            if DVec3::new(x, y, *z).length() <= r {
                return;
            }
            clamped += 1;

            let old = DVec3::new(x, y, z_old);
            let old_dist = old.length();
            if old_dist > 0.0 {
                *z = (old * (r / old_dist)).z;
            }

            let planar_sq = x * x + y * y;
            if planar_sq + *z * *z > r * r {
                let limit = (r * r - planar_sq).max(0.0).sqrt();
                *z = limit.copysign(*z);
            }
        });

    clamped
}
