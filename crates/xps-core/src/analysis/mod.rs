//! Inverse-problem layer: Fermi-edge fitting, theoretical resolution
//! budgets, and full instrument-parameter estimation against the twin
//! engine.

pub mod deconvolution;
pub mod optimizer;

pub use deconvolution::{
    FermiEdgeFitOptions, FermiEdgeGuess, FermiEdgeSolution, FitDiagnostics, IrfBounds,
    IrfEstimate, IrfEstimationOptions, IrfParameters, ProgressRecord, ResolutionBudget,
    ResolutionCoefficients, XpsDeconvolver, fermi_dirac_convolved,
};
pub use optimizer::{ReducedFit, ReducedIrfParameters, XpsOptimizer};

use crate::common::constants::NORMALIZATION_EPSILON;

/// Typed failure reasons surfaced by every solver in this module. Solvers
/// return these as values; they never panic across the API boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("observed spectrum length mismatch: expected {expected}, got {actual}")]
    ObservedLengthMismatch { expected: usize, actual: usize },
    #[error("invalid fit input: {0}")]
    BadInput(String),
    #[error("numerical failure during fitting: {0}")]
    Numerical(String),
    #[error("fit did not converge: {0}")]
    NonConvergence(String),
}

/// Spectrum scaled so its maximum is 1, guarded against all-zero input.
pub fn peak_normalized(values: &[f64]) -> Vec<f64> {
    let peak = values.iter().fold(0.0_f64, |acc, &value| acc.max(value));
    let scale = peak + NORMALIZATION_EPSILON;
    values.iter().map(|&value| value / scale).collect()
}

#[cfg(test)]
mod tests {
    use super::peak_normalized;

    #[test]
    fn peak_normalization_scales_the_maximum_to_one() {
        let normalized = peak_normalized(&[1.0, 4.0, 2.0]);
        assert!((normalized[1] - 1.0).abs() <= 1.0e-9);
        assert!((normalized[0] - 0.25).abs() <= 1.0e-9);
    }

    #[test]
    fn peak_normalization_survives_an_all_zero_spectrum() {
        let normalized = peak_normalized(&[0.0, 0.0]);
        assert!(normalized.iter().all(|value| value.is_finite()));
    }
}
