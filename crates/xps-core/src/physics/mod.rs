//! Stateless physics primitives: Fermi-Dirac occupation, skew-normal
//! densities, and the 2D elliptical skew-Gaussian spot distribution.

use crate::common::constants::{
    DEG_TO_RAD, FERMI_EXPONENT_CLAMP, KB_EV_PER_K, NORMALIZATION_EPSILON,
    STEP_FUNCTION_TEMPERATURE_K,
};
use crate::grid::CalculationGrid;
use crate::numerics::DenseMatrix;
use statrs::function::erf::erf;

pub use crate::numerics::convolution::convolve_edge_signal;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PhysicsError {
    #[error("{name} must be finite and > 0, got {value}")]
    NonPositiveSigma { name: &'static str, value: f64 },
    #[error("{name} must be finite, got {value}")]
    NonFiniteParameter { name: &'static str, value: f64 },
}

/// Elliptical skew-Gaussian spot parameters. Sigmas are in axis units
/// (energy axis for x, spatial axis for y), the rotation is in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotShape {
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub gamma_x: f64,
    pub gamma_y: f64,
    pub rotation: f64,
}

impl SpotShape {
    pub fn validate(&self) -> Result<(), PhysicsError> {
        validate_sigma("sigma_x", self.sigma_x)?;
        validate_sigma("sigma_y", self.sigma_y)?;
        validate_finite("gamma_x", self.gamma_x)?;
        validate_finite("gamma_y", self.gamma_y)?;
        validate_finite("rotation", self.rotation)?;
        Ok(())
    }
}

/// Fermi-Dirac occupation `1 / (1 + exp((E - EF) / kB T))`.
///
/// Below 0.1 K the occupation is the ideal step function; elsewhere the
/// exponent argument is clamped to ±100 before exponentiation.
pub fn fermi_dirac(energy: f64, temperature: f64, fermi_level: f64) -> f64 {
    if temperature < STEP_FUNCTION_TEMPERATURE_K {
        return if energy <= fermi_level { 1.0 } else { 0.0 };
    }

    let argument = ((energy - fermi_level) / (KB_EV_PER_K * temperature))
        .clamp(-FERMI_EXPONENT_CLAMP, FERMI_EXPONENT_CLAMP);
    1.0 / (argument.exp() + 1.0)
}

/// Fermi-Dirac occupation over a whole energy axis.
pub fn fermi_dirac_curve(energies: &[f64], temperature: f64, fermi_level: f64) -> Vec<f64> {
    energies
        .iter()
        .map(|&energy| fermi_dirac(energy, temperature, fermi_level))
        .collect()
}

/// Skew-normal density `2 φ(x/σ)/σ · Φ(γ x / (σ √2))`.
///
/// At γ = 0 this reduces to a plain normal density; the analytic integral is
/// exactly 1 for any γ.
pub fn skew_gaussian(x: f64, sigma: f64, gamma: f64) -> Result<f64, PhysicsError> {
    validate_sigma("sigma", sigma)?;
    validate_finite("gamma", gamma)?;
    Ok(skew_gaussian_unchecked(x, sigma, gamma))
}

/// Skew-normal density sampled along an axis.
pub fn skew_gaussian_profile(
    axis: &[f64],
    sigma: f64,
    gamma: f64,
) -> Result<Vec<f64>, PhysicsError> {
    validate_sigma("sigma", sigma)?;
    validate_finite("gamma", gamma)?;
    Ok(axis
        .iter()
        .map(|&x| skew_gaussian_unchecked(x, sigma, gamma))
        .collect())
}

fn skew_gaussian_unchecked(x: f64, sigma: f64, gamma: f64) -> f64 {
    let density = (-x * x / (2.0 * sigma * sigma)).exp()
        / (sigma * (2.0 * std::f64::consts::PI).sqrt());
    let skew_factor = 0.5 * (1.0 + erf(gamma * x / (sigma * std::f64::consts::SQRT_2)));
    2.0 * density * skew_factor
}

/// 2D elliptical skew-Gaussian over the grid mesh, rotated by
/// `spot.rotation` degrees and renormalized to unit sum over all cells.
///
/// The result is a density over the discretized grid, not a continuous
/// integral: `sum(cells) == 1` up to the normalization epsilon.
pub fn elliptical_gaussian_2d(
    grid: &CalculationGrid,
    spot: &SpotShape,
) -> Result<DenseMatrix, PhysicsError> {
    spot.validate()?;

    let (rows, cols) = grid.mesh_shape();
    let angle = spot.rotation * DEG_TO_RAD;
    let (sin_angle, cos_angle) = angle.sin_cos();

    let mut distribution = DenseMatrix::zeros(rows, cols);
    let mut total = 0.0;
    for (row, &y) in grid.spatial_axis().iter().enumerate() {
        for (col, &x) in grid.energy_axis().iter().enumerate() {
            let x_rot = x * cos_angle - y * sin_angle;
            let y_rot = x * sin_angle + y * cos_angle;

            let value = directional_factor(x_rot, spot.sigma_x, spot.gamma_x)
                * directional_factor(y_rot, spot.sigma_y, spot.gamma_y);
            distribution[(row, col)] = value;
            total += value;
        }
    }

    let normalization = total + NORMALIZATION_EPSILON;
    for row in 0..rows {
        for col in 0..cols {
            distribution[(row, col)] /= normalization;
        }
    }

    Ok(distribution)
}

fn directional_factor(coordinate: f64, sigma: f64, gamma: f64) -> f64 {
    let envelope = (-coordinate * coordinate / (2.0 * sigma * sigma)).exp();
    let skew_factor =
        0.5 * (1.0 + erf(gamma * coordinate / (sigma * std::f64::consts::SQRT_2)));
    2.0 * envelope * skew_factor
}

fn validate_sigma(name: &'static str, value: f64) -> Result<(), PhysicsError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PhysicsError::NonPositiveSigma { name, value });
    }
    Ok(())
}

fn validate_finite(name: &'static str, value: f64) -> Result<(), PhysicsError> {
    if !value.is_finite() {
        return Err(PhysicsError::NonFiniteParameter { name, value });
    }
    Ok(())
}
