//! Fermi-edge deconvolution and instrument-response estimation.
//!
//! `XpsDeconvolver` owns a twin engine and runs two inverse problems
//! against it: a padded-convolution Fermi-edge model fit (global search
//! plus local refinement) and a full nine-parameter instrument-response
//! estimation that drives the forward simulation inside the objective.

use std::sync::mpsc::SyncSender;

use crate::analysis::{FitError, peak_normalized};
use crate::common::constants::NORMALIZATION_EPSILON;
use crate::engine::DigitalTwinEngine;
use crate::numerics::DenseMatrix;
use crate::numerics::convolution::{convolve_same, gaussian_kernel};
use crate::numerics::differential_evolution::{DifferentialEvolution, ParameterBounds};
use crate::numerics::least_squares::{
    LeastSquaresError, LeastSquaresOptions, fit_least_squares,
};
use crate::physics::fermi_dirac;

const EF_SHIFT_BOUNDS: (f64, f64) = (-0.05, 0.05);
const SIGMA_TOTAL_BOUNDS: (f64, f64) = (1.0e-4, 0.05);
const TEMPERATURE_BOUNDS: (f64, f64) = (0.1, 300.0);
const AMPLITUDE_BOUNDS: (f64, f64) = (0.5, 2.0);
const OFFSET_BOUNDS: (f64, f64) = (-0.5, 0.5);

const MIN_EDGE_PADDING: usize = 10;
const MAX_EDGE_PADDING: usize = 1000;

/// A local refinement that stops on its iteration budget still yields a
/// usable solution when it explains most of the variance; below this R²
/// the fit is reported as non-convergent instead.
const MIN_ACCEPTABLE_R_SQUARED: f64 = 0.5;

/// Effectively a step function for the response-profile simulation.
const IRF_STEP_TEMPERATURE_K: f64 = 0.01;

/// Thermally broadened Fermi edge convolved with a Gaussian of width
/// `sigma_total`, evaluated on `energy_axis`.
///
/// The edge is computed on a padded axis (10 sigma on each side, clamped
/// to [10, 1000] bins) before convolving, so the kernel never sees the
/// hard array boundary, then sliced back to the input axis. The kernel is
/// sampled on the axis step (half-width 5 sigma), so the curve varies
/// smoothly with `sigma_total`.
pub fn fermi_dirac_convolved(
    energy_axis: &[f64],
    ef_shift: f64,
    temperature: f64,
    sigma_total: f64,
) -> Result<Vec<f64>, FitError> {
    if energy_axis.len() < 2 {
        return Err(FitError::BadInput(format!(
            "energy axis needs at least 2 points, got {}",
            energy_axis.len()
        )));
    }
    if !sigma_total.is_finite() || sigma_total <= 0.0 {
        return Err(FitError::BadInput(format!(
            "sigma_total must be finite and > 0, got {sigma_total}"
        )));
    }

    let span = energy_axis[energy_axis.len() - 1] - energy_axis[0];
    let step = span / (energy_axis.len() - 1) as f64;
    if !step.is_finite() || step <= 0.0 {
        return Err(FitError::BadInput(format!(
            "energy axis must be increasing, got step {step}"
        )));
    }

    let padding = ((10.0 * sigma_total / step) as usize).clamp(MIN_EDGE_PADDING, MAX_EDGE_PADDING);

    let mut padded_axis = Vec::with_capacity(energy_axis.len() + 2 * padding);
    for offset in (1..=padding).rev() {
        padded_axis.push(energy_axis[0] - offset as f64 * step);
    }
    padded_axis.extend_from_slice(energy_axis);
    for offset in 1..=padding {
        padded_axis.push(energy_axis[energy_axis.len() - 1] + offset as f64 * step);
    }

    let edge: Vec<f64> = padded_axis
        .iter()
        .map(|&energy| fermi_dirac(energy, temperature, ef_shift))
        .collect();

    let convolved = match gaussian_kernel(sigma_total, step)
        .map_err(|error| FitError::Numerical(error.to_string()))?
    {
        Some(kernel) => convolve_same(&edge, &kernel)
            .map_err(|error| FitError::Numerical(error.to_string()))?,
        // Sigma narrower than the bin resolution leaves the edge unchanged.
        None => edge,
    };
    Ok(convolved[padding..padding + energy_axis.len()].to_vec())
}

/// Starting point for the Fermi-edge fit. Temperature is the measurement
/// temperature; amplitude and offset always start at 1 and 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FermiEdgeGuess {
    pub ef_shift: f64,
    pub sigma_total: f64,
    pub temperature: f64,
}

impl FermiEdgeGuess {
    pub fn at_temperature(temperature: f64) -> Self {
        Self {
            ef_shift: 0.0,
            sigma_total: 0.005,
            temperature,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FermiEdgeFitOptions {
    pub guess: FermiEdgeGuess,
    /// When false the temperature is pinned at the guess value.
    pub fit_temperature: bool,
    /// When false the global search stage is skipped and the local
    /// refinement starts from the guess directly.
    pub use_global_search: bool,
}

impl FermiEdgeFitOptions {
    pub fn at_temperature(temperature: f64) -> Self {
        Self {
            guess: FermiEdgeGuess::at_temperature(temperature),
            fit_temperature: true,
            use_global_search: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitDiagnostics {
    pub iterations: usize,
    pub function_evaluations: usize,
    pub final_cost: f64,
    /// Whether the local refinement met a tolerance criterion; a fit that
    /// only exhausted its iteration budget reports `false` here.
    pub converged: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct FermiEdgeSolution {
    pub ef_shift: f64,
    pub ef_shift_error: f64,
    pub sigma_total: f64,
    pub sigma_total_error: f64,
    pub temperature: f64,
    pub temperature_error: f64,
    pub amplitude: f64,
    pub offset: f64,
    pub fitted_spectrum: Vec<f64>,
    /// `observed - fitted` per energy bin.
    pub residuals: Vec<f64>,
    pub r_squared: f64,
    pub covariance: DenseMatrix,
    pub diagnostics: FitDiagnostics,
}

/// Per-parameter search intervals for the instrument-response estimation,
/// in the forward-model units (energies in eV, angles in degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrfBounds {
    pub kappa: ParameterBounds,
    pub theta: ParameterBounds,
    pub sigma_res: ParameterBounds,
    pub alpha: ParameterBounds,
    pub sigma_x: ParameterBounds,
    pub sigma_y: ParameterBounds,
    pub gamma_x: ParameterBounds,
    pub gamma_y: ParameterBounds,
    pub rotation: ParameterBounds,
}

impl Default for IrfBounds {
    fn default() -> Self {
        Self {
            kappa: ParameterBounds::new(0.0, 0.1),
            theta: ParameterBounds::new(-0.5, 0.5),
            sigma_res: ParameterBounds::new(1.0e-4, 0.01),
            alpha: ParameterBounds::new(-0.01, 0.01),
            sigma_x: ParameterBounds::new(1.0e-5, 2.0e-3),
            sigma_y: ParameterBounds::new(0.01, 2.0),
            gamma_x: ParameterBounds::new(-5.0, 5.0),
            gamma_y: ParameterBounds::new(-10.0, 10.0),
            rotation: ParameterBounds::new(-45.0, 45.0),
        }
    }
}

impl IrfBounds {
    fn named(&self) -> [(&'static str, ParameterBounds); 9] {
        [
            ("kappa", self.kappa),
            ("theta", self.theta),
            ("sigma_res", self.sigma_res),
            ("alpha", self.alpha),
            ("sigma_x", self.sigma_x),
            ("sigma_y", self.sigma_y),
            ("gamma_x", self.gamma_x),
            ("gamma_y", self.gamma_y),
            ("rotation", self.rotation),
        ]
    }

    fn to_vec(self) -> Vec<ParameterBounds> {
        self.named().iter().map(|&(_, bound)| bound).collect()
    }

    fn validate(&self) -> Result<(), FitError> {
        for (name, bound) in self.named() {
            if !bound.lower.is_finite() || !bound.upper.is_finite() || bound.lower > bound.upper {
                return Err(FitError::BadInput(format!(
                    "bounds for {name} must satisfy finite lower <= upper, got [{}, {}]",
                    bound.lower, bound.upper
                )));
            }
        }
        for (name, bound) in [("sigma_x", self.sigma_x), ("sigma_y", self.sigma_y)] {
            if bound.lower <= 0.0 {
                return Err(FitError::BadInput(format!(
                    "lower bound for {name} must be > 0, got {}",
                    bound.lower
                )));
            }
        }
        Ok(())
    }
}

/// The nine instrument-response parameters in their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IrfParameters {
    pub kappa: f64,
    pub theta: f64,
    pub sigma_res: f64,
    pub alpha: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub gamma_x: f64,
    pub gamma_y: f64,
    pub rotation: f64,
}

impl IrfParameters {
    pub fn from_engine(engine: &DigitalTwinEngine) -> Self {
        Self {
            kappa: engine.detector.kappa,
            theta: engine.detector.theta,
            sigma_res: engine.detector.sigma_res,
            alpha: engine.source.alpha,
            sigma_x: engine.source.sigma_x,
            sigma_y: engine.source.sigma_y,
            gamma_x: engine.source.gamma_x,
            gamma_y: engine.source.gamma_y,
            rotation: engine.source.rotation,
        }
    }

    fn from_slice(values: &[f64]) -> Self {
        Self {
            kappa: values[0],
            theta: values[1],
            sigma_res: values[2],
            alpha: values[3],
            sigma_x: values[4],
            sigma_y: values[5],
            gamma_x: values[6],
            gamma_y: values[7],
            rotation: values[8],
        }
    }

    fn apply_to(&self, engine: &mut DigitalTwinEngine) {
        engine.detector.kappa = self.kappa;
        engine.detector.theta = self.theta;
        engine.detector.sigma_res = self.sigma_res;
        engine.source.alpha = self.alpha;
        engine.source.sigma_x = self.sigma_x;
        engine.source.sigma_y = self.sigma_y;
        engine.source.gamma_x = self.gamma_x;
        engine.source.gamma_y = self.gamma_y;
        engine.source.rotation = self.rotation;
    }
}

/// One progress sample from the global search, emitted once per
/// generation. Sent over a bounded channel with `try_send`; a slow
/// consumer drops samples instead of stalling the optimization.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProgressRecord {
    pub iteration: usize,
    pub loss: f64,
}

pub struct IrfEstimationOptions {
    pub bounds: IrfBounds,
    /// Generation budget for the global search.
    pub max_iterations: usize,
    /// Local least-squares refinement from the global best.
    pub polish: bool,
    pub progress: Option<SyncSender<ProgressRecord>>,
}

impl Default for IrfEstimationOptions {
    fn default() -> Self {
        Self {
            bounds: IrfBounds::default(),
            max_iterations: 50,
            polish: true,
            progress: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrfEstimate {
    pub parameters: IrfParameters,
    /// Peak-normalized simulated spectrum at the estimate.
    pub fitted_spectrum: Vec<f64>,
    /// Negative energy derivative of a near-zero-temperature simulation at
    /// the estimate, max-abs normalized.
    pub estimated_irf: Vec<f64>,
    /// Mean squared error between the normalized observed and simulated
    /// spectra.
    pub final_loss: f64,
    pub converged: bool,
    pub message: String,
    pub iterations: usize,
    pub function_evaluations: usize,
}

/// Per-term theoretical resolution budget, every term expressed as a
/// Gaussian sigma in energy units. The total adds the terms in quadrature.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResolutionBudget {
    pub detector_intrinsic: f64,
    pub smile_curvature: f64,
    pub detector_tilt: f64,
    pub source_size: f64,
    pub energy_gradient: f64,
    pub spot_asymmetry: f64,
    pub total: f64,
}

/// Empirical conversion factors from geometry parameters to resolution
/// contributions. These are calibration constants for a particular
/// beamline layout; override them when the geometry differs.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResolutionCoefficients {
    /// Energy spread per unit smile curvature.
    pub smile_scale: f64,
    /// Energy spread per degree of detector tilt.
    pub tilt_scale: f64,
    /// Coupling between the energy gradient and the spot height.
    pub gradient_coupling: f64,
    /// Energy spread per unit of spot skewness.
    pub asymmetry_scale: f64,
}

impl Default for ResolutionCoefficients {
    fn default() -> Self {
        Self {
            smile_scale: 0.01,
            tilt_scale: 0.001,
            gradient_coupling: 0.1,
            asymmetry_scale: 1.0e-4,
        }
    }
}

/// Owns a twin engine and fits its parameters to observed spectra.
#[derive(Debug, Clone)]
pub struct XpsDeconvolver {
    engine: DigitalTwinEngine,
}

impl XpsDeconvolver {
    pub fn new(engine: DigitalTwinEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &DigitalTwinEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DigitalTwinEngine {
        &mut self.engine
    }

    pub fn into_engine(self) -> DigitalTwinEngine {
        self.engine
    }

    /// Fits the convolved Fermi-edge model
    /// `amplitude * conv(ef_shift, T, sigma_total) + offset` to the
    /// observed spectrum on the engine's energy axis.
    ///
    /// A seeded global search over the hard parameter box feeds a local
    /// least-squares refinement; the refinement alone runs when the global
    /// stage is disabled. Parameter uncertainties come from the local
    /// stage's covariance estimate.
    pub fn fit_fermi_edge(
        &self,
        observed: &[f64],
        options: &FermiEdgeFitOptions,
    ) -> Result<FermiEdgeSolution, FitError> {
        let energy_axis = self.engine.grid().energy_axis();
        if observed.len() != energy_axis.len() {
            return Err(FitError::ObservedLengthMismatch {
                expected: energy_axis.len(),
                actual: observed.len(),
            });
        }

        let temperature_bound = if options.fit_temperature {
            ParameterBounds::new(TEMPERATURE_BOUNDS.0, TEMPERATURE_BOUNDS.1)
        } else {
            ParameterBounds::pinned(
                options
                    .guess
                    .temperature
                    .clamp(TEMPERATURE_BOUNDS.0, TEMPERATURE_BOUNDS.1),
            )
        };
        let bounds = vec![
            ParameterBounds::new(EF_SHIFT_BOUNDS.0, EF_SHIFT_BOUNDS.1),
            ParameterBounds::new(SIGMA_TOTAL_BOUNDS.0, SIGMA_TOTAL_BOUNDS.1),
            temperature_bound,
            ParameterBounds::new(AMPLITUDE_BOUNDS.0, AMPLITUDE_BOUNDS.1),
            ParameterBounds::new(OFFSET_BOUNDS.0, OFFSET_BOUNDS.1),
        ];

        let initial: Vec<f64> = vec![
            options.guess.ef_shift,
            options.guess.sigma_total,
            options.guess.temperature,
            1.0,
            0.0,
        ]
        .iter()
        .zip(&bounds)
        .map(|(&value, bound)| bound.clamp(value))
        .collect();

        let model = |params: &[f64]| -> Result<Vec<f64>, FitError> {
            let curve = fermi_dirac_convolved(energy_axis, params[0], params[2], params[1])?;
            Ok(curve
                .iter()
                .map(|&value| params[3] * value + params[4])
                .collect())
        };

        let mut global_iterations = 0;
        let mut global_evaluations = 0;
        let start = if options.use_global_search {
            let mut solver = DifferentialEvolution::new(bounds.clone())
                .map_err(|error| FitError::Numerical(error.to_string()))?;
            solver.relative_tolerance = 1.0e-8;
            let outcome = solver
                .minimize(
                    |params| match model(params) {
                        Ok(curve) => curve
                            .iter()
                            .zip(observed)
                            .map(|(&fit, &data)| (fit - data) * (fit - data))
                            .sum(),
                        Err(_) => f64::INFINITY,
                    },
                    None,
                )
                .map_err(|error| FitError::Numerical(error.to_string()))?;
            global_iterations = outcome.iterations;
            global_evaluations = outcome.function_evaluations;
            outcome.solution
        } else {
            initial
        };

        let residual = |params: &[f64]| -> Vec<f64> {
            match model(params) {
                Ok(curve) => curve
                    .iter()
                    .zip(observed)
                    .map(|(&fit, &data)| fit - data)
                    .collect(),
                Err(_) => vec![f64::INFINITY; observed.len()],
            }
        };
        let outcome = fit_least_squares(residual, &start, &LeastSquaresOptions::bounded(bounds))
            .map_err(map_least_squares_error)?;

        let fitted = model(&outcome.solution)?;
        let residuals: Vec<f64> = observed
            .iter()
            .zip(&fitted)
            .map(|(&data, &fit)| data - fit)
            .collect();

        let mean = observed.iter().sum::<f64>() / observed.len() as f64;
        let total_variance: f64 = observed
            .iter()
            .map(|&value| (value - mean) * (value - mean))
            .sum();
        let r_squared = 1.0 - outcome.cost / (total_variance + NORMALIZATION_EPSILON);

        // The best point found is still returned when only the iteration
        // budget ran out; an unexplained spectrum is a genuine failure.
        if !outcome.converged && r_squared < MIN_ACCEPTABLE_R_SQUARED {
            return Err(FitError::NonConvergence(format!(
                "{} (r_squared = {r_squared:.3})",
                outcome.message
            )));
        }

        Ok(FermiEdgeSolution {
            ef_shift: outcome.solution[0],
            ef_shift_error: outcome.standard_errors[0],
            sigma_total: outcome.solution[1],
            sigma_total_error: outcome.standard_errors[1],
            temperature: outcome.solution[2],
            temperature_error: outcome.standard_errors[2],
            amplitude: outcome.solution[3],
            offset: outcome.solution[4],
            fitted_spectrum: fitted,
            residuals,
            r_squared,
            covariance: outcome.covariance,
            diagnostics: FitDiagnostics {
                iterations: global_iterations + outcome.iterations,
                function_evaluations: global_evaluations + outcome.function_evaluations,
                final_cost: outcome.cost,
                converged: outcome.converged,
                message: outcome.message,
            },
        })
    }

    /// Quadrature resolution budget from the engine's current parameters.
    pub fn calculate_theoretical_resolution(
        &self,
        coefficients: &ResolutionCoefficients,
    ) -> ResolutionBudget {
        let source = &self.engine.source;
        let detector = &self.engine.detector;

        let detector_intrinsic = detector.sigma_res;
        let smile_curvature = detector.kappa * coefficients.smile_scale;
        let detector_tilt = detector.theta.abs() * coefficients.tilt_scale;
        let source_size = source.sigma_x;
        let energy_gradient = source.alpha.abs() * source.sigma_y * coefficients.gradient_coupling;
        let spot_asymmetry = coefficients.asymmetry_scale
            * (source.gamma_x * source.gamma_x + source.gamma_y * source.gamma_y).sqrt();

        let total = (detector_intrinsic * detector_intrinsic
            + smile_curvature * smile_curvature
            + detector_tilt * detector_tilt
            + source_size * source_size
            + energy_gradient * energy_gradient
            + spot_asymmetry * spot_asymmetry)
            .sqrt();

        ResolutionBudget {
            detector_intrinsic,
            smile_curvature,
            detector_tilt,
            source_size,
            energy_gradient,
            spot_asymmetry,
            total,
        }
    }

    /// Estimates all nine instrument-response parameters by matching the
    /// peak-normalized forward simulation to the observed spectrum.
    ///
    /// A seeded global search explores the bounded box (pinned bounds
    /// exclude a parameter from the search); a local least-squares polish
    /// refines the global best. The loss is the mean squared error of the
    /// normalized spectra.
    pub fn estimate_irf_parameters(
        &mut self,
        observed: &[f64],
        temperature: f64,
        options: &IrfEstimationOptions,
    ) -> Result<IrfEstimate, FitError> {
        let energy_count = self.engine.grid().energy_axis().len();
        if observed.len() != energy_count {
            return Err(FitError::ObservedLengthMismatch {
                expected: energy_count,
                actual: observed.len(),
            });
        }
        options.bounds.validate()?;
        let observed = peak_normalized(observed);

        let bounds = options.bounds.to_vec();
        let mut solver = DifferentialEvolution::new(bounds.clone())
            .map_err(|error| FitError::Numerical(error.to_string()))?;
        solver.max_iterations = options.max_iterations;

        let engine = &mut self.engine;
        let simulate = |engine: &mut DigitalTwinEngine, params: &[f64]| -> Option<Vec<f64>> {
            IrfParameters::from_slice(params).apply_to(engine);
            engine
                .simulate(temperature)
                .ok()
                .map(|simulation| peak_normalized(&simulation.intensity))
        };

        let mut objective = |params: &[f64]| -> f64 {
            match simulate(engine, params) {
                Some(normalized) => {
                    normalized
                        .iter()
                        .zip(&observed)
                        .map(|(&fit, &data)| (fit - data) * (fit - data))
                        .sum::<f64>()
                        / observed.len() as f64
                }
                None => f64::INFINITY,
            }
        };

        let mut report = options.progress.as_ref().map(|sender| {
            let sender = sender.clone();
            move |iteration: usize, loss: f64| {
                let _ = sender.try_send(ProgressRecord { iteration, loss });
            }
        });
        let callback = report.as_mut().map(|f| f as &mut dyn FnMut(usize, f64));

        let global = solver
            .minimize(&mut objective, callback)
            .map_err(|error| FitError::Numerical(error.to_string()))?;

        let mut solution = global.solution.clone();
        let mut final_loss = global.objective_value;
        let mut iterations = global.iterations;
        let mut function_evaluations = global.function_evaluations;
        let mut message = global.message.clone();

        if options.polish {
            let residual = |params: &[f64]| -> Vec<f64> {
                match simulate(engine, params) {
                    Some(normalized) => normalized
                        .iter()
                        .zip(&observed)
                        .map(|(&fit, &data)| fit - data)
                        .collect(),
                    None => vec![f64::INFINITY; observed.len()],
                }
            };
            match fit_least_squares(
                residual,
                &solution,
                &LeastSquaresOptions::bounded(bounds),
            ) {
                Ok(polished) => {
                    let polished_loss = polished.cost / observed.len() as f64;
                    iterations += polished.iterations;
                    function_evaluations += polished.function_evaluations;
                    if polished_loss <= final_loss {
                        solution = polished.solution;
                        final_loss = polished_loss;
                        message = format!("{message}; polished: {}", polished.message);
                    }
                }
                // Polish is best effort; the global solution stands.
                Err(error) => message = format!("{message}; polish failed: {error}"),
            }
        }

        let parameters = IrfParameters::from_slice(&solution);
        parameters.apply_to(engine);
        let simulation = engine
            .simulate(temperature)
            .map_err(|error| FitError::Numerical(error.to_string()))?;
        let fitted_spectrum = peak_normalized(&simulation.intensity);

        let step_response = engine
            .simulate(IRF_STEP_TEMPERATURE_K)
            .map_err(|error| FitError::Numerical(error.to_string()))?;
        let estimated_irf =
            response_profile(engine.grid().energy_axis(), &step_response.intensity);

        Ok(IrfEstimate {
            parameters,
            fitted_spectrum,
            estimated_irf,
            final_loss,
            converged: global.converged,
            message,
            iterations,
            function_evaluations,
        })
    }
}

fn map_least_squares_error(error: LeastSquaresError) -> FitError {
    match error {
        LeastSquaresError::InitialOutsideBounds { .. }
        | LeastSquaresError::BoundsLengthMismatch { .. }
        | LeastSquaresError::EmptyParameters => FitError::BadInput(error.to_string()),
        other => FitError::Numerical(other.to_string()),
    }
}

/// Negative central-difference derivative of a step-like spectrum,
/// normalized to unit maximum magnitude. The falling edge of a cold
/// simulation maps to a positive response peak.
fn response_profile(energy_axis: &[f64], intensity: &[f64]) -> Vec<f64> {
    let count = intensity.len();
    let mut derivative = vec![0.0; count];
    if count >= 2 {
        derivative[0] = (intensity[1] - intensity[0]) / (energy_axis[1] - energy_axis[0]);
        derivative[count - 1] = (intensity[count - 1] - intensity[count - 2])
            / (energy_axis[count - 1] - energy_axis[count - 2]);
        for index in 1..count - 1 {
            derivative[index] = (intensity[index + 1] - intensity[index - 1])
                / (energy_axis[index + 1] - energy_axis[index - 1]);
        }
    }

    let peak = derivative
        .iter()
        .fold(0.0_f64, |acc, &value| acc.max(value.abs()));
    derivative
        .iter()
        .map(|&value| -value / (peak + NORMALIZATION_EPSILON))
        .collect()
}
