//! Simulation configuration.
//!
//! Every section carries `#[serde(default)]`, so a TOML file only needs to
//! name the values it changes:
//!
//! ```toml
//! [grid]
//! points = 40
//!
//! [boundary]
//! pressure_increase = 0.03
//! ```

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub run: RunConfig,
    pub growth: GrowthConfig,
    pub folding: FoldConfig,
    pub boundary: BoundaryConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Points per axis (`N`).
    pub points: usize,
    /// The domain is `[-half_extent, half_extent]` on both axes.
    pub half_extent: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of steps (`T_max`).
    pub total_steps: usize,
    /// Seed for the initial perturbation and the genetic modifier.
    pub seed: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    pub max_rate_outer: f64,
    pub max_rate_inner: f64,
    /// Whether the slower inner layer is simulated at all.
    pub inner_layer: bool,
    pub outer_cycle_amplitude: f64,
    pub inner_cycle_amplitude: f64,
    /// Angular frequency (per step) of the proliferation cycle.
    pub cycle_frequency: f64,
    /// Peak extra growth at the domain centre.
    pub regional_amplitude: f64,
    /// Width of the central growth bump, in squared domain units.
    pub regional_width: f64,
    pub genetic_variation_std: f64,
    pub initial_noise_std: f64,
    /// Reference-derived initial heights are mapped onto `[0, initial_height_range]`.
    pub initial_height_range: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoldConfig {
    pub strength_base: f64,
    pub modulation_amplitude: f64,
    pub modulation_frequency: f64,
    /// Spatial wavenumbers of the primary, secondary and fine fold terms.
    pub wavenumbers: [f64; 3],
    /// Amplitude of the secondary term relative to the primary one.
    pub secondary_weight: f64,
    /// Amplitude of the fine term before its exponential decay.
    pub fine_amplitude: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub base_radius: f64,
    pub max_radius: f64,
    /// Total radius lost to pressure over the whole run.
    pub pressure_increase: f64,
    /// `alpha`: weight of the mean reference intensity in the growth radius.
    pub reference_radius_weight: f64,
    /// `beta`: weight of the local reference intensity in the constraint radius.
    pub reference_constraint_weight: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurvatureOrder {
    First,
    Second,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// A fractal sample is taken whenever `step % fractal_interval == 0`.
    pub fractal_interval: usize,
    pub fractal_layers: usize,
    pub curvature_order: CurvatureOrder,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            points: 60,
            half_extent: 1.0,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            total_steps: 150,
            seed: 42,
        }
    }
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            max_rate_outer: 0.1,
            max_rate_inner: 0.06,
            inner_layer: true,
            outer_cycle_amplitude: 0.1,
            inner_cycle_amplitude: 0.05,
            cycle_frequency: 0.05,
            regional_amplitude: 0.3,
            regional_width: 0.5,
            genetic_variation_std: 0.02,
            initial_noise_std: 0.01,
            initial_height_range: 0.5,
        }
    }
}

impl Default for FoldConfig {
    fn default() -> Self {
        Self {
            strength_base: 0.04,
            modulation_amplitude: 0.2,
            modulation_frequency: 0.1,
            wavenumbers: [5.0, 10.0, 15.0],
            secondary_weight: 0.5,
            fine_amplitude: 0.02,
        }
    }
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            base_radius: 1.5,
            max_radius: 2.0,
            pressure_increase: 0.015,
            reference_radius_weight: 0.1,
            reference_constraint_weight: 0.2,
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            fractal_interval: 10,
            fractal_layers: 30,
            curvature_order: CurvatureOrder::Second,
        }
    }
}

fn check_finite(name: &str, value: f64) -> SimResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimError::config(format!("{name} must be finite, got {value}")))
    }
}

fn check_non_negative(name: &str, value: f64) -> SimResult<()> {
    check_finite(name, value)?;
    if value < 0.0 {
        return Err(SimError::config(format!(
            "{name} must be non-negative, got {value}"
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> SimResult<()> {
    check_finite(name, value)?;
    if value <= 0.0 {
        return Err(SimError::config(format!("{name} must be positive, got {value}")));
    }
    Ok(())
}

impl Config {
    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> SimResult<Self> {
        let cfg: Config = toml::from_str(content)
            .map_err(|e| SimError::config(format!("invalid TOML: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a TOML configuration file.
    pub fn load(path: &Path) -> SimResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> SimResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SimError::config(format!("cannot serialize configuration: {e}")))
    }

    /// Checks every parameter range. Geometric feasibility of the boundary
    /// (which depends on the reference map) is checked when the
    /// simulation is built.
    pub fn validate(&self) -> SimResult<()> {
        if self.grid.points < 2 {
            return Err(SimError::config(format!(
                "grid.points must be at least 2, got {}",
                self.grid.points
            )));
        }
        check_positive("grid.half_extent", self.grid.half_extent)?;

        if self.run.total_steps == 0 {
            return Err(SimError::config("run.total_steps must be positive"));
        }

        let g = &self.growth;
        check_finite("growth.max_rate_outer", g.max_rate_outer)?;
        check_finite("growth.max_rate_inner", g.max_rate_inner)?;
        check_finite("growth.outer_cycle_amplitude", g.outer_cycle_amplitude)?;
        check_finite("growth.inner_cycle_amplitude", g.inner_cycle_amplitude)?;
        check_finite("growth.cycle_frequency", g.cycle_frequency)?;
        check_finite("growth.regional_amplitude", g.regional_amplitude)?;
        if g.regional_amplitude <= -1.0 {
            return Err(SimError::config(format!(
                "growth.regional_amplitude must be greater than -1, got {}",
                g.regional_amplitude
            )));
        }
        check_positive("growth.regional_width", g.regional_width)?;
        check_non_negative("growth.genetic_variation_std", g.genetic_variation_std)?;
        check_non_negative("growth.initial_noise_std", g.initial_noise_std)?;
        check_non_negative("growth.initial_height_range", g.initial_height_range)?;

        let f = &self.folding;
        check_finite("folding.strength_base", f.strength_base)?;
        check_finite("folding.modulation_amplitude", f.modulation_amplitude)?;
        check_finite("folding.modulation_frequency", f.modulation_frequency)?;
        check_finite("folding.secondary_weight", f.secondary_weight)?;
        check_finite("folding.fine_amplitude", f.fine_amplitude)?;
        for k in f.wavenumbers {
            check_finite("folding.wavenumbers", k)?;
        }

        let b = &self.boundary;
        check_positive("boundary.base_radius", b.base_radius)?;
        check_positive("boundary.max_radius", b.max_radius)?;
        if b.max_radius < b.base_radius {
            return Err(SimError::config(format!(
                "boundary.max_radius ({}) must not be smaller than boundary.base_radius ({})",
                b.max_radius, b.base_radius
            )));
        }
        check_finite("boundary.pressure_increase", b.pressure_increase)?;
        check_non_negative("boundary.reference_radius_weight", b.reference_radius_weight)?;
        check_non_negative(
            "boundary.reference_constraint_weight",
            b.reference_constraint_weight,
        )?;

        if self.diagnostics.fractal_interval == 0 {
            return Err(SimError::config("diagnostics.fractal_interval must be positive"));
        }
        if self.diagnostics.fractal_layers < 2 {
            return Err(SimError::config(format!(
                "diagnostics.fractal_layers must be at least 2, got {}",
                self.diagnostics.fractal_layers
            )));
        }

        Ok(())
    }
}
