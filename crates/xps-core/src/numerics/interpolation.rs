//! Linear interpolation helpers for spectra and 2D emission images.

use crate::numerics::DenseMatrix;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpolationError {
    #[error("interpolation axis requires at least 2 points, got {actual}")]
    InsufficientPoints { actual: usize },
    #[error("interpolation axis/value length mismatch: axis={axis}, values={values}")]
    LengthMismatch { axis: usize, values: usize },
    #[error("interpolation axis must be strictly increasing at index {index}: {previous} -> {current}")]
    NonIncreasingAxis {
        index: usize,
        previous: f64,
        current: f64,
    },
    #[error("image shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ImageShapeMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },
}

/// Linear interpolation with boundary clamping: queries outside the axis
/// return the first/last sample.
pub fn interpolate_linear(
    query: f64,
    axis: &[f64],
    values: &[f64],
) -> Result<f64, InterpolationError> {
    validate_axis(axis, values)?;

    let last = axis.len() - 1;
    if query <= axis[0] {
        return Ok(values[0]);
    }
    if query >= axis[last] {
        return Ok(values[last]);
    }

    Ok(interpolate_interior(query, axis, values))
}

/// Resamples an edge-like spectrum onto a shifted axis: queries below the
/// axis hold the first (occupied-side) value, queries strictly above it
/// read zero. A query landing exactly on the last axis point still reads
/// the last sample.
///
/// This encodes the physical assumption that the occupied-state signal
/// saturates on the low-energy side and vanishes beyond the high-energy
/// side.
pub fn resample_shifted_edge(
    axis: &[f64],
    values: &[f64],
    shift: f64,
) -> Result<Vec<f64>, InterpolationError> {
    validate_axis(axis, values)?;

    let last = axis.len() - 1;
    let resampled = axis
        .iter()
        .map(|&energy| {
            let query = energy - shift;
            if query <= axis[0] {
                values[0]
            } else if query > axis[last] {
                0.0
            } else {
                interpolate_interior(query, axis, values)
            }
        })
        .collect();

    Ok(resampled)
}

/// Bilinear interpolator over a rectilinear (spatial x energy) grid.
///
/// Out-of-domain queries clamp to the nearest edge sample instead of
/// extrapolating, so distorted coordinates near the boundary never produce
/// NaN or negative overshoot.
#[derive(Debug, Clone)]
pub struct GridInterpolator2D<'a> {
    spatial_axis: &'a [f64],
    energy_axis: &'a [f64],
    image: &'a DenseMatrix,
}

impl<'a> GridInterpolator2D<'a> {
    pub fn new(
        spatial_axis: &'a [f64],
        energy_axis: &'a [f64],
        image: &'a DenseMatrix,
    ) -> Result<Self, InterpolationError> {
        validate_monotonic(spatial_axis)?;
        validate_monotonic(energy_axis)?;
        if image.nrows() != spatial_axis.len() || image.ncols() != energy_axis.len() {
            return Err(InterpolationError::ImageShapeMismatch {
                expected_rows: spatial_axis.len(),
                expected_cols: energy_axis.len(),
                rows: image.nrows(),
                cols: image.ncols(),
            });
        }

        Ok(Self {
            spatial_axis,
            energy_axis,
            image,
        })
    }

    pub fn sample(&self, spatial: f64, energy: f64) -> f64 {
        let (row, row_fraction) = bracket(self.spatial_axis, spatial);
        let (col, col_fraction) = bracket(self.energy_axis, energy);

        let v00 = self.image[(row, col)];
        let v01 = self.image[(row, col + 1)];
        let v10 = self.image[(row + 1, col)];
        let v11 = self.image[(row + 1, col + 1)];

        let low = v00 + (v01 - v00) * col_fraction;
        let high = v10 + (v11 - v10) * col_fraction;
        low + (high - low) * row_fraction
    }
}

/// Bracketing interval and clamped fraction for a query on an axis.
fn bracket(axis: &[f64], query: f64) -> (usize, f64) {
    let last = axis.len() - 1;
    if query <= axis[0] {
        return (0, 0.0);
    }
    if query >= axis[last] {
        return (last - 1, 1.0);
    }

    match axis.binary_search_by(|probe| probe.total_cmp(&query)) {
        Ok(index) => {
            if index == last {
                (last - 1, 1.0)
            } else {
                (index, 0.0)
            }
        }
        Err(upper) => {
            let lower = upper - 1;
            let fraction = (query - axis[lower]) / (axis[upper] - axis[lower]);
            (lower, fraction)
        }
    }
}

fn interpolate_interior(query: f64, axis: &[f64], values: &[f64]) -> f64 {
    let (lower, fraction) = bracket(axis, query);
    values[lower] + (values[lower + 1] - values[lower]) * fraction
}

fn validate_axis(axis: &[f64], values: &[f64]) -> Result<(), InterpolationError> {
    validate_monotonic(axis)?;
    if axis.len() != values.len() {
        return Err(InterpolationError::LengthMismatch {
            axis: axis.len(),
            values: values.len(),
        });
    }
    Ok(())
}

fn validate_monotonic(axis: &[f64]) -> Result<(), InterpolationError> {
    if axis.len() < 2 {
        return Err(InterpolationError::InsufficientPoints { actual: axis.len() });
    }
    for index in 1..axis.len() {
        if axis[index] <= axis[index - 1] {
            return Err(InterpolationError::NonIncreasingAxis {
                index,
                previous: axis[index - 1],
                current: axis[index],
            });
        }
    }
    Ok(())
}
