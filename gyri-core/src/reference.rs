//! Reference intensity maps and their resampling onto the simulation grid.
//!
//! A reference map is a 2D projection of some volumetric density (for
//! example a fetal head atlas averaged along one axis). It is resampled
//! to the grid resolution, normalized, and then shapes both the initial
//! heights and the constraint boundary.

use crate::error::{SimError, SimResult};
use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};

/// A validated 2D reference intensity map at its native resolution.
///
/// Invariants: at least 2 rows and 2 columns, all values finite.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceMap {
    data: Array2<f64>,
}

impl ReferenceMap {
    pub fn new(data: Array2<f64>) -> SimResult<Self> {
        let (rows, cols) = data.dim();
        if rows < 2 || cols < 2 {
            return Err(SimError::config(format!(
                "reference map has degenerate shape {rows}x{cols}"
            )));
        }
        if let Some(bad) = data.iter().find(|v| !v.is_finite()) {
            return Err(SimError::config(format!(
                "reference map contains a non-finite value ({bad})"
            )));
        }
        Ok(Self { data })
    }

    /// Projects a 3D volume to 2D by averaging along `axis`.
    pub fn from_volume(volume: &Array3<f64>, axis: Axis) -> SimResult<Self> {
        if axis.index() >= 3 {
            return Err(SimError::config(format!(
                "cannot project a volume along axis {}",
                axis.index()
            )));
        }
        let projected = volume
            .mean_axis(axis)
            .ok_or_else(|| SimError::config("reference volume is empty along the projection axis"))?;
        Self::new(projected)
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn mean(&self) -> f64 {
        // Non-empty by construction.
        self.data.mean().unwrap_or(0.0)
    }

    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Divides every value by the maximum.
    ///
    /// ### Errors
    /// [`SimError::Configuration`] if the maximum is not positive.
    pub fn normalized(&self) -> SimResult<Array2<f64>> {
        let max = self.max();
        if max <= 0.0 {
            return Err(SimError::config(format!(
                "reference map maximum must be positive to normalize, got {max}"
            )));
        }
        Ok(self.data.mapv(|v| v / max))
    }

    /// Linearly maps `[min, max]` onto `[lo, hi]`. A constant map lands on `lo`.
    pub fn rescaled(&self, lo: f64, hi: f64) -> Array2<f64> {
        let (min, max) = (self.min(), self.max());
        let span = max - min;
        if span <= 0.0 {
            return Array2::from_elem(self.data.dim(), lo);
        }
        self.data.mapv(|v| lo + (v - min) / span * (hi - lo))
    }

    /// Resamples to `rows x cols`.
    ///
    /// The primary path is a linear zoom whose output shape is
    /// `round(input * factor)` per axis; if that does not land exactly on
    /// the requested shape the antialiased resize is used instead.
    pub fn resample(&self, rows: usize, cols: usize) -> SimResult<ReferenceMap> {
        if rows < 2 || cols < 2 {
            return Err(SimError::config(format!(
                "cannot resample a reference map to degenerate shape {rows}x{cols}"
            )));
        }
        let (in_rows, in_cols) = self.dim();
        let factors = (
            rows as f64 / in_rows as f64,
            cols as f64 / in_cols as f64,
        );

        let zoomed = zoom_linear(&self.data, factors);
        let data = if zoomed.dim() == (rows, cols) {
            zoomed
        } else {
            tracing::debug!(
                got = ?zoomed.dim(),
                want = ?(rows, cols),
                "zoom missed the target shape, using antialiased resize"
            );
            resize_antialiased(&self.data, rows, cols)
        };
        ReferenceMap::new(data)
    }
}

/// Endpoint-aligned linear zoom: output sample `k` of `m` reads input
/// coordinate `k * (n - 1) / (m - 1)`.
pub fn zoom_linear(data: &Array2<f64>, factors: (f64, f64)) -> Array2<f64> {
    let (rows, cols) = data.dim();
    let out_rows = ((rows as f64) * factors.0).round().max(1.0) as usize;
    let out_cols = ((cols as f64) * factors.1).round().max(1.0) as usize;

    let along_rows = map_lanes(data.view(), Axis(0), out_rows, |lane, m| {
        resample_aligned(lane, m)
    });
    map_lanes(along_rows.view(), Axis(1), out_cols, |lane, m| {
        resample_aligned(lane, m)
    })
}

/// Antialiased linear resize: Gaussian prefilter with
/// `sigma = max(0, (scale - 1) / 2)` on downsampled axes, then
/// half-pixel-centred linear interpolation with clamped edges.
pub fn resize_antialiased(data: &Array2<f64>, rows: usize, cols: usize) -> Array2<f64> {
    let (in_rows, in_cols) = data.dim();
    let scale_rows = in_rows as f64 / rows as f64;
    let scale_cols = in_cols as f64 / cols as f64;

    let sigma_rows = ((scale_rows - 1.0) / 2.0).max(0.0);
    let sigma_cols = ((scale_cols - 1.0) / 2.0).max(0.0);

    let smoothed = map_lanes(data.view(), Axis(0), in_rows, |lane, _| {
        gaussian_blur(lane, sigma_rows)
    });
    let smoothed = map_lanes(smoothed.view(), Axis(1), in_cols, |lane, _| {
        gaussian_blur(lane, sigma_cols)
    });

    let along_rows = map_lanes(smoothed.view(), Axis(0), rows, |lane, m| {
        resample_centred(lane, m)
    });
    map_lanes(along_rows.view(), Axis(1), cols, |lane, m| {
        resample_centred(lane, m)
    })
}

/// Applies a 1D transform to every lane along `axis`, producing lanes of
/// length `out_len`.
fn map_lanes<F>(
    data: ndarray::ArrayView2<'_, f64>,
    axis: Axis,
    out_len: usize,
    f: F,
) -> Array2<f64>
where
    F: Fn(ArrayView1<'_, f64>, usize) -> Array1<f64>,
{
    let (rows, cols) = data.dim();
    let shape = if axis == Axis(0) {
        (out_len, cols)
    } else {
        (rows, out_len)
    };
    let mut out = Array2::zeros(shape);
    for (mut dst, src) in out.lanes_mut(axis).into_iter().zip(data.lanes(axis)) {
        dst.assign(&f(src, out_len));
    }
    out
}

#[inline]
fn lerp_at(lane: ArrayView1<'_, f64>, coord: f64) -> f64 {
    let last = lane.len() - 1;
    let coord = coord.clamp(0.0, last as f64);
    let lo = coord.floor() as usize;
    let hi = (lo + 1).min(last);
    let t = coord - lo as f64;
    lane[lo] * (1.0 - t) + lane[hi] * t
}

fn resample_aligned(lane: ArrayView1<'_, f64>, m: usize) -> Array1<f64> {
    let n = lane.len();
    if m == 1 {
        return Array1::from_elem(1, lane[0]);
    }
    let step = (n - 1) as f64 / (m - 1) as f64;
    Array1::from_shape_fn(m, |k| lerp_at(lane, k as f64 * step))
}

fn resample_centred(lane: ArrayView1<'_, f64>, m: usize) -> Array1<f64> {
    let scale = lane.len() as f64 / m as f64;
    Array1::from_shape_fn(m, |k| lerp_at(lane, (k as f64 + 0.5) * scale - 0.5))
}

/// Gaussian smoothing with reflected boundaries, truncated at 4 sigma.
fn gaussian_blur(lane: ArrayView1<'_, f64>, sigma: f64) -> Array1<f64> {
    if sigma <= 0.0 {
        return lane.to_owned();
    }
    let radius = (4.0 * sigma).ceil() as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|o| (-0.5 * (o as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    let n = lane.len() as isize;
    let reflect = |mut i: isize| -> usize {
        // Mirror about the outer edges ("d c b a | a b c d | d c b a").
        let period = 2 * n;
        i = i.rem_euclid(period);
        if i >= n { (period - 1 - i) as usize } else { i as usize }
    };

    Array1::from_shape_fn(lane.len(), |k| {
        let k = k as isize;
        weights
            .iter()
            .enumerate()
            .map(|(w_idx, w)| w * lane[reflect(k + w_idx as isize - radius)])
            .sum::<f64>()
            / total
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ramp(rows: usize, cols: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(i, j)| {
            1.0 + (i as f64 * 0.37).sin().abs() + j as f64 * 0.05
        })
    }

    #[test]
    fn rejects_degenerate_and_non_finite_maps() {
        assert!(matches!(
            ReferenceMap::new(Array2::zeros((1, 8))),
            Err(SimError::Configuration(_))
        ));
        assert!(ReferenceMap::new(Array2::zeros((8, 0))).is_err());
        assert!(ReferenceMap::new(array![[1.0, f64::NAN], [0.0, 1.0]]).is_err());
    }

    #[test]
    fn volume_projection_averages_along_axis() {
        let volume = Array3::from_shape_fn((3, 2, 4), |(i, j, k)| (i + j + k) as f64);
        let map = ReferenceMap::from_volume(&volume, Axis(2)).expect("projectable");

        assert_eq!(map.dim(), (3, 2));
        // mean of (i + j + k) over k = 0..4 is i + j + 1.5
        assert_eq!(map.data()[[2, 1]], 4.5);
        assert!(ReferenceMap::from_volume(&volume, Axis(3)).is_err());
    }

    #[test]
    fn normalized_divides_by_max() {
        let map = ReferenceMap::new(array![[1.0, 2.0], [4.0, 0.0]]).expect("valid");
        let norm = map.normalized().expect("positive max");
        assert_eq!(norm, array![[0.25, 0.5], [1.0, 0.0]]);

        let dark = ReferenceMap::new(Array2::zeros((3, 3))).expect("valid");
        assert!(dark.normalized().is_err());
    }

    #[test]
    fn rescaled_maps_range_and_handles_constant_maps() {
        let map = ReferenceMap::new(array![[2.0, 4.0], [6.0, 10.0]]).expect("valid");
        let scaled = map.rescaled(0.0, 0.5);
        assert_eq!(scaled[[0, 0]], 0.0);
        assert_eq!(scaled[[1, 1]], 0.5);
        assert_eq!(scaled[[0, 1]], 0.125);

        let flat = ReferenceMap::new(Array2::from_elem((2, 2), 3.0)).expect("valid");
        assert!(flat.rescaled(0.0, 0.5).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zoom_keeps_endpoints_and_interpolates_linearly() {
        let data = array![[0.0, 2.0], [4.0, 6.0]];
        let out = zoom_linear(&data, (1.5, 1.5));

        assert_eq!(out.dim(), (3, 3));
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[2, 2]], 6.0);
        assert_eq!(out[[1, 1]], 3.0);
        assert_eq!(out[[0, 1]], 1.0);
    }

    #[test]
    fn resample_hits_requested_shape() {
        let map = ReferenceMap::new(ramp(37, 23)).expect("valid");
        let out = map.resample(20, 20).expect("resamplable");
        assert_eq!(out.dim(), (20, 20));
    }

    #[test]
    fn antialiased_resize_hits_shape_and_preserves_constant_maps() {
        let data = Array2::from_elem((40, 30), 2.5);
        let out = resize_antialiased(&data, 10, 12);
        assert_eq!(out.dim(), (10, 12));
        assert!(out.iter().all(|v| (v - 2.5).abs() < 1e-12));
    }

    #[test]
    fn antialiased_resize_smooths_alternating_pattern() {
        let data = Array2::from_shape_fn((32, 32), |(i, j)| ((i + j) % 2) as f64);
        let out = resize_antialiased(&data, 8, 8);
        for v in out.iter() {
            assert!((v - 0.5).abs() < 0.3, "expected blurred value near 0.5, got {v}");
        }
        let mean = out.mean().expect("non-empty");
        assert!((mean - 0.5).abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn resample_round_trip_preserves_mean() {
        let original = ReferenceMap::new(ramp(37, 41)).expect("valid");
        let small = original.resample(20, 20).expect("down");
        let back = small.resample(37, 41).expect("up");

        let drift = (back.mean() - original.mean()).abs() / original.mean();
        assert!(drift < 0.05, "mean drifted by {drift}");
    }

    #[test]
    fn resample_rejects_degenerate_target() {
        let map = ReferenceMap::new(ramp(5, 5)).expect("valid");
        assert!(map.resample(1, 5).is_err());
    }
}
