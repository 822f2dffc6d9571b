use crate::config::CurvatureOrder;
use crate::error::{SimError, SimResult};
use crate::types::Field;
use ndarray::{Array2, ArrayView2, Axis, Zip};

/// Discrete derivative along `axis` with unit index spacing: central
/// differences inside, one-sided first differences at both ends.
///
/// ### Errors
/// [`SimError::Configuration`] if the field has fewer than 2 samples
/// along `axis`.
pub fn gradient(field: ArrayView2<'_, f64>, axis: Axis) -> SimResult<Array2<f64>> {
    let len = field.len_of(axis);
    if len < 2 {
        return Err(SimError::config(format!(
            "gradient needs at least 2 samples along axis {}, got {len}",
            axis.index()
        )));
    }

    let mut out = Array2::zeros(field.dim());
    Zip::from(out.lanes_mut(axis))
        .and(field.lanes(axis))
        .for_each(|mut d, z| {
            d[0] = z[1] - z[0];
            d[len - 1] = z[len - 1] - z[len - 2];
            for k in 1..len - 1 {
                d[k] = 0.5 * (z[k + 1] - z[k - 1]);
            }
        });
    Ok(out)
}

/// Local roughness of a height field.
///
/// `x` runs along axis 1 and `y` along axis 0, matching the grid. With
/// [`CurvatureOrder::First`] this is the slope magnitude
/// `sqrt(Zx² + Zy²)`; [`CurvatureOrder::Second`] adds the pure second
/// differences, `sqrt(Zx² + Zy² + Zxx² + Zyy²)`.
pub fn curvature(heights: ArrayView2<'_, f64>, order: CurvatureOrder) -> SimResult<Field> {
    let zx = gradient(heights, Axis(1))?;
    let zy = gradient(heights, Axis(0))?;

    Ok(match order {
        CurvatureOrder::First => Zip::from(&zx)
            .and(&zy)
            .map_collect(|&gx, &gy| (gx * gx + gy * gy).sqrt()),
        CurvatureOrder::Second => {
            let zxx = gradient(zx.view(), Axis(1))?;
            let zyy = gradient(zy.view(), Axis(0))?;
            Zip::from(&zx)
                .and(&zy)
                .and(&zxx)
                .and(&zyy)
                .map_collect(|&gx, &gy, &gxx, &gyy| {
                    (gx * gx + gy * gy + gxx * gxx + gyy * gyy).sqrt()
                })
        }
    })
}
