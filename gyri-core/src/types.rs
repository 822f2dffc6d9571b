use ndarray::Array2;

/// Index of a simulation step, counted from `0`.
///
/// A state whose `step` equals the configured total step count is
/// terminal; no further update is applied to it.
pub type Step = usize;

/// Row-major `N x N` scalar field laid out in grid order
/// (`field[[i, j]]` belongs to the point `(X[[i, j]], Y[[i, j]])`).
pub type Field = Array2<f64>;
