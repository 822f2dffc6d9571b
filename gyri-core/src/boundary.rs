use crate::config::BoundaryConfig;
use crate::error::{SimError, SimResult};
use crate::grid::Grid;
use crate::reference::ReferenceMap;
use crate::types::{Field, Step};
use ndarray::Array2;

/// Growth ceiling and confining boundary of the surface.
///
/// Two radii are derived from the same inputs:
///
/// - the **growth radius** `R0 + alpha * mean(ref)`, a constant that the
///   radial growth term decelerates towards;
/// - the **constraint radius**
///   `growth_radius - pressure(t) + beta * ref(x, y)`, clamped to
///   `[0, max_radius]`, which the outer layer may never exceed.
///
/// `ref` is the reference map normalized by its maximum. Without a
/// reference both `alpha` and `beta` terms vanish, leaving a sphere that
/// shrinks with pressure. Constant spheres are the `pressure_increase == 0`
/// special case.
#[derive(Clone, Debug)]
pub struct BoundaryField {
    growth_radius: f64,
    max_radius: f64,
    pressure_increase: f64,
    total_steps: Step,
    /// `beta * normalized_reference`, or `None` without a reference.
    modulation: Option<Field>,
    shape: (usize, usize),
}

impl BoundaryField {
    /// Builds the boundary for `grid`.
    ///
    /// `reference` must already be resampled to the grid shape.
    pub fn new(
        cfg: &BoundaryConfig,
        grid: &Grid,
        total_steps: Step,
        reference: Option<&ReferenceMap>,
    ) -> SimResult<Self> {
        if total_steps == 0 {
            return Err(SimError::config("boundary needs a positive step count"));
        }

        let mut growth_radius = cfg.base_radius;
        let modulation = match reference {
            Some(map) => {
                if map.dim() != grid.shape() {
                    return Err(SimError::config(format!(
                        "reference map shape {:?} does not match grid shape {:?}",
                        map.dim(),
                        grid.shape()
                    )));
                }
                let normalized = map.normalized()?;
                growth_radius += cfg.reference_radius_weight * normalized.mean().unwrap_or(0.0);
                Some(normalized * cfg.reference_constraint_weight)
            }
            None => None,
        };

        Ok(Self {
            growth_radius,
            max_radius: cfg.max_radius,
            pressure_increase: cfg.pressure_increase,
            total_steps,
            modulation,
            shape: grid.shape(),
        })
    }

    pub fn growth_radius(&self) -> f64 {
        self.growth_radius
    }

    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    /// Radius lost to pressure at `step`: `pressure_increase * step / T`.
    pub fn pressure(&self, step: Step) -> f64 {
        self.pressure_increase * step as f64 / self.total_steps as f64
    }

    /// Constraint radius at a single grid point.
    #[inline]
    pub fn radius_at(&self, i: usize, j: usize, step: Step) -> f64 {
        let local = self.modulation.as_ref().map_or(0.0, |m| m[[i, j]]);
        (self.growth_radius - self.pressure(step) + local).clamp(0.0, self.max_radius)
    }

    /// Constraint radius over the whole grid at `step`.
    pub fn constraint_radius(&self, step: Step) -> Field {
        Array2::from_shape_fn(self.shape, |(i, j)| self.radius_at(i, j, step))
    }

    /// Fails if some grid point's planar distance already exceeds its
    /// constraint radius at the first or last step: no height could
    /// satisfy the boundary there. The radius is monotone in `t`, so the
    /// two end points cover the whole run.
    pub fn check_feasible(&self, grid: &Grid) -> SimResult<()> {
        let last = self.total_steps.saturating_sub(1);
        for step in [0, last] {
            for i in 0..grid.len() {
                for j in 0..grid.len() {
                    let planar = grid.planar_distance(i, j);
                    let radius = self.radius_at(i, j, step);
                    if planar > radius {
                        return Err(SimError::config(format!(
                            "constraint radius {radius:.4} at ({:.3}, {:.3}) on step {step} is \
                             smaller than the point's planar distance {planar:.4}",
                            grid.x()[[i, j]],
                            grid.y()[[i, j]],
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(base: f64, pressure: f64) -> BoundaryConfig {
        BoundaryConfig {
            base_radius: base,
            max_radius: 3.0,
            pressure_increase: pressure,
            reference_radius_weight: 0.1,
            reference_constraint_weight: 0.2,
        }
    }

    #[test]
    fn constant_sphere_without_reference() {
        let grid = Grid::new(6, 1.0).expect("grid");
        let boundary = BoundaryField::new(&cfg(1.5, 0.0), &grid, 10, None).expect("boundary");

        assert_eq!(boundary.growth_radius(), 1.5);
        for step in 0..10 {
            assert!(boundary.constraint_radius(step).iter().all(|&r| r == 1.5));
        }
    }

    #[test]
    fn pressure_shrinks_radius_monotonically() {
        let grid = Grid::new(6, 1.0).expect("grid");
        let boundary = BoundaryField::new(&cfg(1.5, 0.2), &grid, 20, None).expect("boundary");

        let mut previous = boundary.constraint_radius(0);
        for step in 1..20 {
            let current = boundary.constraint_radius(step);
            for (now, before) in current.iter().zip(previous.iter()) {
                assert!(now <= before, "radius grew from {before} to {now} at step {step}");
            }
            previous = current;
        }
        assert!((boundary.pressure(10) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn reference_modulates_growth_and_constraint_radius() {
        let grid = Grid::new(4, 1.0).expect("grid");
        let mut data = Array2::from_elem((4, 4), 2.0);
        data[[0, 0]] = 4.0;
        let reference = ReferenceMap::new(data).expect("reference");

        let boundary =
            BoundaryField::new(&cfg(1.5, 0.0), &grid, 10, Some(&reference)).expect("boundary");

        // normalized: 1.0 at (0,0), 0.5 elsewhere; mean = (1 + 15 * 0.5) / 16
        let mean = (1.0 + 15.0 * 0.5) / 16.0;
        assert!((boundary.growth_radius() - (1.5 + 0.1 * mean)).abs() < 1e-12);
        assert!((boundary.radius_at(0, 0, 0) - (boundary.growth_radius() + 0.2)).abs() < 1e-12);
        assert!((boundary.radius_at(2, 3, 0) - (boundary.growth_radius() + 0.1)).abs() < 1e-12);
    }

    #[test]
    fn radius_is_clamped_to_max_and_zero() {
        let grid = Grid::new(3, 0.1).expect("grid");
        let mut c = cfg(2.9, 10.0);
        c.max_radius = 2.95;
        let reference = ReferenceMap::new(Array2::from_elem((3, 3), 1.0)).expect("reference");
        let boundary = BoundaryField::new(&c, &grid, 2, Some(&reference)).expect("boundary");

        assert_eq!(boundary.max_radius(), 2.95);
        assert_eq!(boundary.radius_at(1, 1, 0), boundary.max_radius());
        assert_eq!(boundary.radius_at(1, 1, 1), 0.0);
    }

    #[test]
    fn rejects_reference_of_another_shape() {
        let grid = Grid::new(4, 1.0).expect("grid");
        let wrong = ReferenceMap::new(Array2::from_elem((5, 5), 1.0)).expect("reference");
        assert!(matches!(
            BoundaryField::new(&cfg(1.5, 0.0), &grid, 10, Some(&wrong)),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn feasibility_requires_radius_beyond_grid_corners() {
        let grid = Grid::new(5, 1.0).expect("grid");
        let roomy = BoundaryField::new(&cfg(1.5, 0.015), &grid, 10, None).expect("boundary");
        assert!(roomy.check_feasible(&grid).is_ok());

        let tight = BoundaryField::new(&cfg(1.2, 0.0), &grid, 10, None).expect("boundary");
        assert!(matches!(
            tight.check_feasible(&grid),
            Err(SimError::Configuration(_))
        ));
    }
}
