//! X-ray source emission model: spot intensity profile and the 2D emission
//! image that couples row position into energy shift.

use crate::grid::CalculationGrid;
use crate::numerics::DenseMatrix;
use crate::numerics::interpolation::{InterpolationError, resample_shifted_edge};
use crate::physics::{PhysicsError, SpotShape, elliptical_gaussian_2d, skew_gaussian_profile};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmissionError {
    #[error("ideal spectrum length mismatch: energy axis={expected}, spectrum={actual}")]
    SpectrumLengthMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Physics(#[from] PhysicsError),
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
}

/// Source parameter bag. Spot sizes are in energy units (x) and spatial
/// units (y); `alpha` is the energy shift per unit spatial position; the
/// rotation is in degrees. Mutated directly by callers between runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XraySource {
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub alpha: f64,
    pub gamma_x: f64,
    pub gamma_y: f64,
    pub rotation: f64,
}

impl Default for XraySource {
    fn default() -> Self {
        Self {
            sigma_x: 0.01,
            sigma_y: 1.0,
            alpha: 0.0,
            gamma_x: 0.0,
            gamma_y: 0.0,
            rotation: 0.0,
        }
    }
}

impl XraySource {
    fn spot_shape(&self) -> SpotShape {
        SpotShape {
            sigma_x: self.sigma_x,
            sigma_y: self.sigma_y,
            gamma_x: self.gamma_x,
            gamma_y: self.gamma_y,
            rotation: self.rotation,
        }
    }

    /// Skew-Gaussian intensity profile along the spatial (row) axis.
    pub fn spatial_distribution(&self, spatial_axis: &[f64]) -> Result<Vec<f64>, EmissionError> {
        Ok(skew_gaussian_profile(
            spatial_axis,
            self.sigma_y,
            self.gamma_y,
        )?)
    }

    /// Raw 2D illumination footprint over the grid mesh, independent of any
    /// sample physics.
    pub fn spot_profile(&self, grid: &CalculationGrid) -> Result<DenseMatrix, EmissionError> {
        Ok(elliptical_gaussian_2d(grid, &self.spot_shape())?)
    }

    /// 2D emission image: for every spatial row the ideal spectrum is
    /// resampled onto an axis shifted by `alpha * y` (holding the occupied
    /// edge, zeroing beyond the unoccupied edge) and scaled by the row
    /// intensity. This is how spot size and energy gradient leak into the
    /// final energy resolution.
    pub fn generate_emission(
        &self,
        grid: &CalculationGrid,
        ideal_spectrum: &[f64],
    ) -> Result<DenseMatrix, EmissionError> {
        let energy_axis = grid.energy_axis();
        if ideal_spectrum.len() != energy_axis.len() {
            return Err(EmissionError::SpectrumLengthMismatch {
                expected: energy_axis.len(),
                actual: ideal_spectrum.len(),
            });
        }

        let row_intensity = self.spatial_distribution(grid.spatial_axis())?;

        let (rows, cols) = grid.mesh_shape();
        let mut image = DenseMatrix::zeros(rows, cols);
        for (row, &y) in grid.spatial_axis().iter().enumerate() {
            let shift = self.alpha * y;
            let shifted = resample_shifted_edge(energy_axis, ideal_spectrum, shift)?;
            for (col, &value) in shifted.iter().enumerate() {
                image[(row, col)] = value * row_intensity[row];
            }
        }

        Ok(image)
    }
}
