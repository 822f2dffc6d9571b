//! Fold-complexity estimate from an isosurface of the height field.
//!
//! The height field is lifted into a thin band volume of `L` stacked,
//! offset copies of itself. The zero isosurface of that volume is
//! extracted with marching tetrahedra and the ratio `faces / vertices` of
//! the resulting mesh is reported. The ratio is a relative complexity
//! proxy, comparable between steps of one run, not a rigorous fractal
//! dimension.

use crate::error::{SimError, SimResult};
use crate::grid::Grid;
use crate::types::Step;
use glam::DVec3;
use ndarray::{Array1, Array3, ArrayView2};
use std::collections::HashMap;

/// Triangle mesh produced by isosurface extraction.
///
/// Vertices lying on a lattice edge shared by several cells are stored
/// once. Triangle winding is not normalized.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<DVec3>,
    pub faces: Vec<[u32; 3]>,
}

/// One entry of the append-only fractal log.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FractalSample {
    pub step: Step,
    /// `None` when the isosurface was degenerate.
    pub dimension: Option<f64>,
}

/// Corner offsets of a lattice cell, indexed 0..8.
const CUBE_CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Six tetrahedra sharing the 0-6 diagonal. Every cell uses the same split,
/// so faces shared between neighbouring cells are cut along the same diagonal.
const CUBE_TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

/// Stacks `layers` offset copies of `heights`:
/// `V[i, j, k] = Z[i, j] + (z_k - mean(Z))` with `z_k` sweeping
/// `[min(Z), max(Z)]` linearly.
pub fn band_volume(heights: ArrayView2<'_, f64>, layers: usize) -> Array3<f64> {
    let (rows, cols) = heights.dim();
    let (min, max) = min_max(heights);
    let mean = heights.mean().unwrap_or(0.0);
    let sweep = Array1::linspace(min, max, layers);

    Array3::from_shape_fn((rows, cols, layers), |(i, j, k)| {
        heights[[i, j]] + (sweep[k] - mean)
    })
}

/// Extracts the `level` isosurface of `volume` by marching tetrahedra.
///
/// A lattice point counts as inside when its value is below `level`.
/// Output positions are `index * spacing` per axis.
pub fn extract_isosurface(volume: &Array3<f64>, level: f64, spacing: DVec3) -> Mesh {
    let (nx, ny, nz) = volume.dim();
    let mut mesh = Mesh::default();
    if nx < 2 || ny < 2 || nz < 2 {
        return mesh;
    }

    let linear = |p: [usize; 3]| (p[0] * ny + p[1]) * nz + p[2];
    let mut welded: HashMap<(usize, usize), u32> = HashMap::new();

    let mut edge_vertex = |a: [usize; 3], b: [usize; 3], mesh: &mut Mesh| -> u32 {
        let (ka, kb) = (linear(a), linear(b));
        let key = if ka < kb { (ka, kb) } else { (kb, ka) };
        *welded.entry(key).or_insert_with(|| {
            let va = volume[a];
            let vb = volume[b];
            // va and vb straddle the level, so they differ.
            let t = (level - va) / (vb - va);
            let pa = DVec3::new(a[0] as f64, a[1] as f64, a[2] as f64);
            let pb = DVec3::new(b[0] as f64, b[1] as f64, b[2] as f64);
            mesh.vertices.push(pa.lerp(pb, t) * spacing);
            (mesh.vertices.len() - 1) as u32
        })
    };

    for x in 0..nx - 1 {
        for y in 0..ny - 1 {
            for z in 0..nz - 1 {
                let corner = |c: usize| {
                    let o = CUBE_CORNERS[c];
                    [x + o[0], y + o[1], z + o[2]]
                };

                for tet in CUBE_TETRAHEDRA {
                    let pts = tet.map(corner);
                    let inside = pts.map(|p| volume[p] < level);
                    let count = inside.iter().filter(|&&b| b).count();

                    match count {
                        0 | 4 => {}
                        1 | 3 => {
                            // The corner on its own side forms a triangle with
                            // the three edges leaving it.
                            let lone_inside = count == 1;
                            let lone = (0..4)
                                .find(|&k| inside[k] == lone_inside)
                                .unwrap_or(0);
                            let others: Vec<usize> = (0..4).filter(|&k| k != lone).collect();
                            let face = [
                                edge_vertex(pts[lone], pts[others[0]], &mut mesh),
                                edge_vertex(pts[lone], pts[others[1]], &mut mesh),
                                edge_vertex(pts[lone], pts[others[2]], &mut mesh),
                            ];
                            mesh.faces.push(face);
                        }
                        _ => {
                            // Two in, two out: the cut is a quad over the four
                            // crossing edges, split into two triangles.
                            let ins: Vec<usize> = (0..4).filter(|&k| inside[k]).collect();
                            let outs: Vec<usize> = (0..4).filter(|&k| !inside[k]).collect();
                            let q0 = edge_vertex(pts[ins[0]], pts[outs[0]], &mut mesh);
                            let q1 = edge_vertex(pts[ins[0]], pts[outs[1]], &mut mesh);
                            let q2 = edge_vertex(pts[ins[1]], pts[outs[1]], &mut mesh);
                            let q3 = edge_vertex(pts[ins[1]], pts[outs[0]], &mut mesh);
                            mesh.faces.push([q0, q1, q2]);
                            mesh.faces.push([q0, q2, q3]);
                        }
                    }
                }
            }
        }
    }

    mesh
}

/// Faces-per-vertex ratio of the zero isosurface of the band volume.
///
/// Voxel spacing is `(2h/N, 2h/N, (max - min) / layers)`.
///
/// ### Errors
/// [`SimError::DegenerateGeometry`] if the field is flat or the
/// extracted mesh is empty.
pub fn estimate(heights: ArrayView2<'_, f64>, grid: &Grid, layers: usize) -> SimResult<f64> {
    let (min, max) = min_max(heights);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return Err(SimError::DegenerateGeometry(format!(
            "height range is {range}, nothing to triangulate"
        )));
    }
    if layers < 2 {
        return Err(SimError::DegenerateGeometry(format!(
            "band volume needs at least 2 layers, got {layers}"
        )));
    }

    let volume = band_volume(heights, layers);
    let cell = grid.cell_spacing();
    let spacing = DVec3::new(cell, cell, range / layers as f64);
    let mesh = extract_isosurface(&volume, 0.0, spacing);

    if mesh.vertices.is_empty() || mesh.faces.is_empty() {
        return Err(SimError::DegenerateGeometry(
            "isosurface has no vertices".to_string(),
        ));
    }
    Ok(mesh.faces.len() as f64 / mesh.vertices.len() as f64)
}

fn min_max(values: ArrayView2<'_, f64>) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}
