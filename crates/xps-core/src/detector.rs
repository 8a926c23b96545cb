//! 2D detector model: tilt and smile coordinate distortion, projection of
//! the emission image to a 1D spectrum, and intrinsic-resolution blur.

use crate::common::constants::DEG_TO_RAD;
use crate::grid::CalculationGrid;
use crate::numerics::DenseMatrix;
use crate::numerics::convolution::{ConvolutionError, convolve_edge_padded, gaussian_kernel};
use crate::numerics::interpolation::{GridInterpolator2D, InterpolationError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    #[error("detector parameter {name} must be finite, got {value}")]
    NonFiniteParameter { name: &'static str, value: f64 },
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error(transparent)]
    Convolution(#[from] ConvolutionError),
}

/// Detector parameter bag: smile curvature, tilt angle in degrees, and
/// intrinsic Gaussian resolution in energy units. Mutated directly by
/// callers between runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detector2D {
    pub kappa: f64,
    pub theta: f64,
    pub sigma_res: f64,
}

impl Default for Detector2D {
    fn default() -> Self {
        Self {
            kappa: 0.0,
            theta: 0.0,
            sigma_res: 0.001,
        }
    }
}

impl Detector2D {
    /// Projects the 2D emission image onto the energy axis.
    ///
    /// The (energy, row) coordinates are rotated by the tilt angle and bent
    /// by the smile curvature (scaled by the squared normalized row
    /// position), the image is resampled at the distorted coordinates with
    /// nearest-edge clamping outside the grid domain, rows are summed, and
    /// the result is blurred by the intrinsic resolution. `sigma_res <= 0`
    /// (or a width below one energy bin) skips the blur.
    pub fn project_to_1d(
        &self,
        grid: &CalculationGrid,
        image: &DenseMatrix,
    ) -> Result<Vec<f64>, ProjectionError> {
        self.validate()?;

        let interpolator =
            GridInterpolator2D::new(grid.spatial_axis(), grid.energy_axis(), image)?;

        let theta_rad = self.theta * DEG_TO_RAD;
        let (sin_theta, cos_theta) = theta_rad.sin_cos();
        let half_extent = grid.spatial_half_extent();

        let mut spectrum = vec![0.0; grid.energy_axis().len()];
        for &y in grid.spatial_axis() {
            let y_norm = y / half_extent;
            let smile_shift = self.kappa * y_norm * y_norm;
            for (col, &energy) in grid.energy_axis().iter().enumerate() {
                let energy_src = energy * cos_theta + y * sin_theta - smile_shift;
                let spatial_src = -energy * sin_theta + y * cos_theta;
                spectrum[col] += interpolator.sample(spatial_src, energy_src);
            }
        }

        if self.sigma_res > 0.0
            && let Some(kernel) = gaussian_kernel(self.sigma_res, grid.energy_step())?
        {
            spectrum = convolve_edge_padded(&spectrum, &kernel)?;
        }

        Ok(spectrum)
    }

    fn validate(&self) -> Result<(), ProjectionError> {
        for (name, value) in [
            ("kappa", self.kappa),
            ("theta", self.theta),
            ("sigma_res", self.sigma_res),
        ] {
            if !value.is_finite() {
                return Err(ProjectionError::NonFiniteParameter { name, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Detector2D, ProjectionError};
    use crate::grid::CalculationGrid;
    use crate::numerics::DenseMatrix;
    use crate::numerics::interpolation::InterpolationError;

    fn test_grid() -> CalculationGrid {
        CalculationGrid::with_spatial_axis(-0.05, 0.05, 100, -10.0, 10.0, 50).expect("grid")
    }

    fn uniform_image(grid: &CalculationGrid, value: f64) -> DenseMatrix {
        let (rows, cols) = grid.mesh_shape();
        let mut image = DenseMatrix::zeros(rows, cols);
        for row in 0..rows {
            for col in 0..cols {
                image[(row, col)] = value;
            }
        }
        image
    }

    #[test]
    fn identity_detector_sums_rows_exactly() {
        let grid = test_grid();
        let detector = Detector2D {
            kappa: 0.0,
            theta: 0.0,
            sigma_res: 0.0,
        };
        let image = uniform_image(&grid, 0.25);

        let spectrum = detector.project_to_1d(&grid, &image).expect("projection");
        for value in spectrum {
            assert!((value - 0.25 * 50.0).abs() <= 1.0e-10);
        }
    }

    #[test]
    fn clamped_extrapolation_keeps_distorted_output_finite_and_nonnegative() {
        let grid = test_grid();
        let detector = Detector2D {
            kappa: 0.04,
            theta: 0.3,
            sigma_res: 0.0,
        };
        let image = uniform_image(&grid, 1.0);

        let spectrum = detector.project_to_1d(&grid, &image).expect("projection");
        for value in spectrum {
            assert!(value.is_finite());
            assert!(value >= 0.0);
            // Clamping reads edge samples, never amplifies beyond the image
            // maximum times the row count.
            assert!(value <= 50.0 + 1.0e-9);
        }
    }

    #[test]
    fn smile_curvature_drags_the_apparent_edge_toward_higher_energy() {
        let grid = test_grid();
        let (rows, cols) = grid.mesh_shape();
        // Step image: occupied below energy 0 in every row.
        let mut image = DenseMatrix::zeros(rows, cols);
        for row in 0..rows {
            for (col, &energy) in grid.energy_axis().iter().enumerate() {
                image[(row, col)] = if energy <= 0.0 { 1.0 } else { 0.0 };
            }
        }

        let straight = Detector2D {
            kappa: 0.0,
            theta: 0.0,
            sigma_res: 0.0,
        };
        let smiled = Detector2D {
            kappa: 0.02,
            theta: 0.0,
            sigma_res: 0.0,
        };

        let reference = straight.project_to_1d(&grid, &image).expect("reference");
        let distorted = smiled.project_to_1d(&grid, &image).expect("distorted");

        // The parabolic shift samples the image at lower source energies,
        // where the state is still occupied, so occupation just above the
        // nominal edge rises relative to the straight detector.
        let edge_col = cols / 2;
        assert!(distorted[edge_col] > reference[edge_col]);
        // Total intensity is conserved away from the edge.
        assert!((distorted[2] - reference[2]).abs() <= 1.0e-9);
    }

    #[test]
    fn resolution_blur_preserves_total_weight_of_a_plateau() {
        let grid = test_grid();
        let detector = Detector2D {
            kappa: 0.0,
            theta: 0.0,
            sigma_res: 0.002,
        };
        let image = uniform_image(&grid, 0.1);

        let spectrum = detector.project_to_1d(&grid, &image).expect("projection");
        // Edge padding keeps a flat signal flat.
        for value in spectrum {
            assert!((value - 0.1 * 50.0).abs() <= 1.0e-9);
        }
    }

    #[test]
    fn projection_rejects_mismatched_images_and_bad_parameters() {
        let grid = test_grid();
        let image = DenseMatrix::zeros(3, 4);
        let detector = Detector2D::default();
        let error = detector
            .project_to_1d(&grid, &image)
            .expect_err("image shape mismatch should fail");
        assert_eq!(
            error,
            ProjectionError::Interpolation(InterpolationError::ImageShapeMismatch {
                expected_rows: 50,
                expected_cols: 100,
                rows: 3,
                cols: 4,
            })
        );

        let detector = Detector2D {
            theta: f64::NAN,
            ..Detector2D::default()
        };
        let image = uniform_image(&grid, 1.0);
        let error = detector
            .project_to_1d(&grid, &image)
            .expect_err("NaN tilt should fail");
        assert!(matches!(error, ProjectionError::NonFiniteParameter { name: "theta", .. }));
    }
}
