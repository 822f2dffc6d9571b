use crate::error::{SimError, SimResult};
use crate::types::Field;
use ndarray::{Array1, Array2};

/// Fixed square parameter domain with its meshgrid coordinate arrays.
///
/// Coordinates follow the "xy" meshgrid convention: `x` varies along
/// axis 1 (columns) and `y` along axis 0 (rows), so
/// `x()[[i, j]] == xs[j]` and `y()[[i, j]] == ys[i]`.
#[derive(Clone, Debug)]
pub struct Grid {
    n: usize,
    half_extent: f64,
    x: Field,
    y: Field,
}

impl Grid {
    /// Builds an `n x n` grid spanning `[-half_extent, half_extent]²`
    /// with uniform spacing.
    ///
    /// ### Errors
    /// [`SimError::Configuration`] if `n < 2` or `half_extent` is not a
    /// positive finite number.
    pub fn new(n: usize, half_extent: f64) -> SimResult<Self> {
        if n < 2 {
            return Err(SimError::config(format!(
                "grid resolution must be at least 2, got {n}"
            )));
        }
        if !half_extent.is_finite() || half_extent <= 0.0 {
            return Err(SimError::config(format!(
                "grid half extent must be positive, got {half_extent}"
            )));
        }

        let axis = Array1::linspace(-half_extent, half_extent, n);
        let x = Array2::from_shape_fn((n, n), |(_, j)| axis[j]);
        let y = Array2::from_shape_fn((n, n), |(i, _)| axis[i]);

        Ok(Self {
            n,
            half_extent,
            x,
            y,
        })
    }

    /// Points per axis.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    pub fn half_extent(&self) -> f64 {
        self.half_extent
    }

    pub fn x(&self) -> &Field {
        &self.x
    }

    pub fn y(&self) -> &Field {
        &self.y
    }

    /// Distance of grid point `(i, j)` from the origin in the x/y plane.
    #[inline]
    pub fn planar_distance(&self, i: usize, j: usize) -> f64 {
        self.x[[i, j]].hypot(self.y[[i, j]])
    }

    /// Voxel edge length used when the height field is lifted into a
    /// volume: the domain width divided by the point count.
    pub fn cell_spacing(&self) -> f64 {
        2.0 * self.half_extent / self.n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_span_domain_in_meshgrid_order() {
        let grid = Grid::new(5, 1.0).expect("valid grid");

        assert_eq!(grid.shape(), (5, 5));
        assert_eq!(grid.x()[[0, 0]], -1.0);
        assert_eq!(grid.x()[[0, 4]], 1.0);
        assert_eq!(grid.x()[[3, 2]], 0.0);
        assert_eq!(grid.y()[[0, 3]], -1.0);
        assert_eq!(grid.y()[[4, 1]], 1.0);
        assert_eq!(grid.y()[[2, 4]], 0.0);

        // x is constant down a column, y constant along a row.
        for i in 0..5 {
            assert_eq!(grid.x()[[i, 1]], -0.5);
            assert_eq!(grid.y()[[1, i]], -0.5);
        }
    }

    #[test]
    fn planar_distance_of_corner() {
        let grid = Grid::new(3, 2.0).expect("valid grid");
        assert!((grid.planar_distance(0, 0) - 8f64.sqrt()).abs() < 1e-12);
        assert_eq!(grid.planar_distance(1, 1), 0.0);
    }

    #[test]
    fn rejects_invalid_resolution_and_extent() {
        assert!(matches!(Grid::new(0, 1.0), Err(SimError::Configuration(_))));
        assert!(matches!(Grid::new(1, 1.0), Err(SimError::Configuration(_))));
        assert!(Grid::new(10, 0.0).is_err());
        assert!(Grid::new(10, f64::NAN).is_err());
    }

    #[test]
    fn cell_spacing_matches_domain_over_points() {
        let grid = Grid::new(50, 1.0).expect("valid grid");
        assert!((grid.cell_spacing() - 0.04).abs() < 1e-15);

        let wide = Grid::new(4, 2.5).expect("valid grid");
        assert_eq!(wide.half_extent(), 2.5);
        assert_eq!(wide.x()[[0, 3]], wide.half_extent());
        assert!((wide.cell_spacing() - 1.25).abs() < 1e-15);
    }
}
