//! Physical constants and numerical guards shared across the twin engine.
//!
//! These values are shared across the forward-model and analysis kernels to
//! avoid ad hoc per-module literal constants.

/// Boltzmann constant in eV/K.
pub const KB_EV_PER_K: f64 = 8.617_333_262e-5;

/// Below this temperature the Fermi-Dirac occupation is evaluated as the
/// ideal step function to avoid exponent blow-up.
pub const STEP_FUNCTION_TEMPERATURE_K: f64 = 0.1;

/// Fermi-Dirac exponent arguments are clamped to this magnitude before
/// exponentiation.
pub const FERMI_EXPONENT_CLAMP: f64 = 100.0;

/// Additive epsilon guarding normalizations against division by zero.
pub const NORMALIZATION_EPSILON: f64 = 1.0e-12;

/// Degrees-to-radians conversion factor.
pub const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;
