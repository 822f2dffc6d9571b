//! Loading reference projections from image files and NIfTI volumes.

use gyri_core::reference::ReferenceMap;
use gyri_core::{SimError, SimResult};
use image::ImageError;
use ndarray::{Array2, Array3, Axis};
use nifti::{IntoNdArray, NiftiError, NiftiObject, ReaderOptions};
use std::fmt::Display;
use std::io;
use std::path::Path;
use tracing::{info, warn};

/// Axis a volume is averaged along to get the 2D reference.
const PROJECTION_AXIS: Axis = Axis(2);

/// Loads a reference map from `path`.
///
/// `.nii` / `.nii.gz` files are read as 3D volumes and averaged along
/// their third axis. Anything else is decoded as an image whose pixel rows
/// become array rows and whose luminance lands in `[0, 1]`. A transient
/// I/O failure is retried once before being reported.
///
/// ### Errors
/// [`SimError::Configuration`] if the file cannot be read or decoded, if
/// a volume is not three-dimensional, or if the result is too small to
/// resample.
pub fn load_reference(path: &Path) -> SimResult<ReferenceMap> {
    if is_volume(path) {
        load_volume(path)
    } else {
        load_image(path)
    }
}

fn is_volume(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

fn load_image(path: &Path) -> SimResult<ReferenceMap> {
    let image = read_with_retry(path, || image::open(path), is_transient_image)?;

    let luma = image.into_luma16();
    let (width, height) = luma.dimensions();
    let data = Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
        f64::from(luma.get_pixel(col as u32, row as u32).0[0]) / f64::from(u16::MAX)
    });
    ReferenceMap::new(data)
}

fn load_volume(path: &Path) -> SimResult<ReferenceMap> {
    let object = read_with_retry(
        path,
        || ReaderOptions::new().read_file(path),
        is_transient_nifti,
    )?;
    let array = object
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| decode_error(path, e))?;

    // Trailing singleton dimensions (a one-frame time axis) carry no data.
    let mut shape = array.shape().to_vec();
    while shape.len() > 3 && shape.last() == Some(&1) {
        shape.pop();
    }
    let &[nx, ny, nz] = shape.as_slice() else {
        return Err(SimError::Configuration(format!(
            "reference volume {} must be 3D, has shape {:?}",
            path.display(),
            array.shape()
        )));
    };

    let values: Vec<f64> = array.iter().copied().collect();
    let volume =
        Array3::from_shape_vec((nx, ny, nz), values).map_err(|e| decode_error(path, e))?;
    info!(path = %path.display(), shape = ?(nx, ny, nz), "reference volume loaded");

    ReferenceMap::from_volume(&volume, PROJECTION_AXIS)
}

/// Runs `read` and, if it fails transiently, once more.
fn read_with_retry<T, E: Display>(
    path: &Path,
    mut read: impl FnMut() -> Result<T, E>,
    transient: impl Fn(&E) -> bool,
) -> SimResult<T> {
    match read() {
        Err(err) if transient(&err) => {
            warn!(path = %path.display(), error = %err, "transient read failure, retrying once");
            read()
        }
        other => other,
    }
    .map_err(|e| decode_error(path, e))
}

fn decode_error(path: &Path, err: impl Display) -> SimError {
    SimError::Configuration(format!("cannot load reference {}: {err}", path.display()))
}

fn is_transient_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

fn is_transient_image(err: &ImageError) -> bool {
    matches!(err, ImageError::IoError(e) if is_transient_kind(e.kind()))
}

fn is_transient_nifti(err: &NiftiError) -> bool {
    matches!(err, NiftiError::Io(e) if is_transient_kind(e.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;

    /// Writes a single-file NIfTI-1 volume of little-endian `f32` values,
    /// `x` varying fastest.
    fn write_nifti(path: &Path, dims: [usize; 3], value: impl Fn(usize, usize, usize) -> f32) {
        let mut header = vec![0u8; 352];
        header[0..4].copy_from_slice(&348i32.to_le_bytes());
        let dim: [i16; 8] = [3, dims[0] as i16, dims[1] as i16, dims[2] as i16, 1, 1, 1, 1];
        for (k, d) in dim.iter().enumerate() {
            header[40 + 2 * k..42 + 2 * k].copy_from_slice(&d.to_le_bytes());
        }
        header[70..72].copy_from_slice(&16i16.to_le_bytes()); // FLOAT32
        header[72..74].copy_from_slice(&32i16.to_le_bytes());
        for k in 0..8 {
            header[76 + 4 * k..80 + 4 * k].copy_from_slice(&1f32.to_le_bytes());
        }
        header[108..112].copy_from_slice(&352f32.to_le_bytes());
        header[112..116].copy_from_slice(&1f32.to_le_bytes());
        header[344..348].copy_from_slice(b"n+1\0");

        let mut file = std::fs::File::create(path).expect("create volume");
        file.write_all(&header).expect("header");
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    file.write_all(&value(x, y, z).to_le_bytes()).expect("voxel");
                }
            }
        }
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let err = load_reference(Path::new("/no/such/atlas.png")).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));

        let err = load_reference(Path::new("/no/such/atlas.nii.gz")).unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn volume_extensions_are_recognised() {
        assert!(is_volume(Path::new("atlas.nii")));
        assert!(is_volume(Path::new("/data/Atlas.NII.GZ")));
        assert!(!is_volume(Path::new("atlas.png")));
        assert!(!is_volume(Path::new("nii")));
    }

    #[test]
    fn volume_is_averaged_along_third_axis() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("atlas.nii");
        write_nifti(&path, [4, 3, 2], |x, y, z| (x + 10 * y + 100 * z) as f32);

        let map = load_reference(&path).expect("volume");

        assert_eq!(map.dim(), (4, 3));
        // mean over z of 100 * z is 50.
        assert!((map.data()[[1, 2]] - 71.0).abs() < 1e-9);
        assert!((map.data()[[3, 0]] - 53.0).abs() < 1e-9);
    }

    #[test]
    fn transient_failure_is_retried_exactly_once() {
        let calls = Cell::new(0);
        let result: SimResult<u8> = read_with_retry(
            Path::new("atlas.nii"),
            || {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    Err(io::Error::from(io::ErrorKind::Interrupted))
                } else {
                    Ok(7)
                }
            },
            |e: &io::Error| is_transient_kind(e.kind()),
        );
        assert_eq!(result.expect("second attempt"), 7);
        assert_eq!(calls.get(), 2);

        calls.set(0);
        let result: SimResult<u8> = read_with_retry(
            Path::new("atlas.nii"),
            || {
                calls.set(calls.get() + 1);
                Err(io::Error::from(io::ErrorKind::TimedOut))
            },
            |e: &io::Error| is_transient_kind(e.kind()),
        );
        assert!(matches!(result, Err(SimError::Configuration(_))));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn only_interrupted_style_io_errors_are_transient() {
        let interrupted = ImageError::IoError(io::Error::from(io::ErrorKind::Interrupted));
        let missing = ImageError::IoError(io::Error::from(io::ErrorKind::NotFound));
        assert!(is_transient_image(&interrupted));
        assert!(!is_transient_image(&missing));

        let timed_out = NiftiError::Io(io::Error::from(io::ErrorKind::TimedOut));
        let denied = NiftiError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(is_transient_nifti(&timed_out));
        assert!(!is_transient_nifti(&denied));
    }
}
