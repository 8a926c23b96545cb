//! Bounded Levenberg-Marquardt least squares with a forward-difference
//! Jacobian and a Gauss-Newton covariance estimate on the free dimensions.

use crate::numerics::DenseMatrix;
use crate::numerics::differential_evolution::ParameterBounds;
use crate::numerics::linalg::lu_factorize;

const INITIAL_DAMPING: f64 = 1.0e-3;
const DAMPING_INCREASE: f64 = 10.0;
const DAMPING_DECREASE: f64 = 0.3;
const MIN_DAMPING: f64 = 1.0e-12;
const MAX_DAMPING: f64 = 1.0e12;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LeastSquaresError {
    #[error("least squares requires at least one parameter")]
    EmptyParameters,
    #[error("bounds length mismatch: parameters={parameters}, bounds={bounds}")]
    BoundsLengthMismatch { parameters: usize, bounds: usize },
    #[error(
        "initial guess[{index}] = {value} lies outside the configured bounds [{lower}, {upper}]"
    )]
    InitialOutsideBounds {
        index: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },
    #[error("residual vector must not be empty")]
    EmptyResiduals,
    #[error("residuals are not finite at the initial guess")]
    NonFiniteInitialResiduals,
}

#[derive(Debug, Clone)]
pub struct LeastSquaresOptions {
    pub bounds: Vec<ParameterBounds>,
    pub max_iterations: usize,
    pub cost_tolerance: f64,
    pub gradient_tolerance: f64,
}

impl LeastSquaresOptions {
    pub fn bounded(bounds: Vec<ParameterBounds>) -> Self {
        Self {
            bounds,
            max_iterations: 100,
            cost_tolerance: 1.0e-12,
            gradient_tolerance: 1.0e-12,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeastSquaresOutcome {
    pub solution: Vec<f64>,
    /// Full-dimension covariance; rows/columns of pinned parameters are zero.
    pub covariance: DenseMatrix,
    pub standard_errors: Vec<f64>,
    /// Sum of squared residuals at the solution.
    pub cost: f64,
    pub residuals: Vec<f64>,
    pub iterations: usize,
    pub function_evaluations: usize,
    pub converged: bool,
    pub message: String,
}

/// Minimizes `sum(residuals(x)^2)` subject to per-parameter bounds.
///
/// Dimensions whose bounds collapse to a point are held fixed and excluded
/// from both the search and the covariance.
pub fn fit_least_squares<F>(
    mut residual_fn: F,
    initial: &[f64],
    options: &LeastSquaresOptions,
) -> Result<LeastSquaresOutcome, LeastSquaresError>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    if initial.is_empty() {
        return Err(LeastSquaresError::EmptyParameters);
    }
    if options.bounds.len() != initial.len() {
        return Err(LeastSquaresError::BoundsLengthMismatch {
            parameters: initial.len(),
            bounds: options.bounds.len(),
        });
    }
    for (index, (&value, bound)) in initial.iter().zip(&options.bounds).enumerate() {
        if value < bound.lower || value > bound.upper {
            return Err(LeastSquaresError::InitialOutsideBounds {
                index,
                value,
                lower: bound.lower,
                upper: bound.upper,
            });
        }
    }

    let free: Vec<usize> = options
        .bounds
        .iter()
        .enumerate()
        .filter(|(_, bound)| !bound.is_pinned())
        .map(|(index, _)| index)
        .collect();

    let mut x = initial.to_vec();
    let mut residuals = residual_fn(&x);
    let mut function_evaluations = 1;
    if residuals.is_empty() {
        return Err(LeastSquaresError::EmptyResiduals);
    }
    if residuals.iter().any(|value| !value.is_finite()) {
        return Err(LeastSquaresError::NonFiniteInitialResiduals);
    }
    let mut cost = sum_of_squares(&residuals);

    let mut damping = INITIAL_DAMPING;
    let mut iterations = 0;
    let mut converged = free.is_empty();
    let mut message = if free.is_empty() {
        "all parameters pinned by equal bounds".to_string()
    } else {
        "maximum number of iterations reached".to_string()
    };

    while !free.is_empty() && iterations < options.max_iterations {
        iterations += 1;

        let jacobian = forward_difference_jacobian(
            &mut residual_fn,
            &mut function_evaluations,
            &x,
            &free,
            &options.bounds,
            &residuals,
        );

        let gradient = jt_times_r(&jacobian, &residuals);
        let gradient_norm = gradient.iter().fold(0.0_f64, |acc, g| acc.max(g.abs()));
        if gradient_norm <= options.gradient_tolerance {
            converged = true;
            message = "gradient norm below tolerance".to_string();
            break;
        }

        let normal = jt_times_j(&jacobian);
        let mut accepted = false;
        while damping <= MAX_DAMPING {
            let step = match solve_damped(&normal, &gradient, damping) {
                Some(step) => step,
                None => {
                    damping *= DAMPING_INCREASE;
                    continue;
                }
            };

            let mut candidate = x.clone();
            for (slot, &dim) in free.iter().enumerate() {
                candidate[dim] = options.bounds[dim].clamp(candidate[dim] + step[slot]);
            }

            let candidate_residuals = residual_fn(&candidate);
            function_evaluations += 1;
            let candidate_cost = if candidate_residuals.iter().all(|v| v.is_finite()) {
                sum_of_squares(&candidate_residuals)
            } else {
                f64::INFINITY
            };

            if candidate_cost < cost {
                let improvement = cost - candidate_cost;
                x = candidate;
                residuals = candidate_residuals;
                cost = candidate_cost;
                damping = (damping * DAMPING_DECREASE).max(MIN_DAMPING);
                accepted = true;

                if improvement <= options.cost_tolerance * cost.max(f64::MIN_POSITIVE) {
                    converged = true;
                    message = "cost change below tolerance".to_string();
                }
                break;
            }
            damping *= DAMPING_INCREASE;
        }

        if !accepted {
            converged = true;
            message = "no descent step available within damping budget".to_string();
            break;
        }
        if converged {
            break;
        }
    }

    let (covariance, standard_errors) = if free.is_empty() {
        (
            DenseMatrix::zeros(x.len(), x.len()),
            vec![0.0; x.len()],
        )
    } else {
        let jacobian = forward_difference_jacobian(
            &mut residual_fn,
            &mut function_evaluations,
            &x,
            &free,
            &options.bounds,
            &residuals,
        );
        covariance_estimate(&jacobian, &free, x.len(), cost, residuals.len())
    };

    Ok(LeastSquaresOutcome {
        solution: x,
        covariance,
        standard_errors,
        cost,
        residuals,
        iterations,
        function_evaluations,
        converged,
        message,
    })
}

fn forward_difference_jacobian<F>(
    residual_fn: &mut F,
    function_evaluations: &mut usize,
    x: &[f64],
    free: &[usize],
    bounds: &[ParameterBounds],
    base_residuals: &[f64],
) -> Vec<Vec<f64>>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let sqrt_eps = f64::EPSILON.sqrt();
    free.iter()
        .map(|&dim| {
            let mut step = sqrt_eps * (1.0 + x[dim].abs());
            // Step backward when the forward probe would leave the bounds.
            if x[dim] + step > bounds[dim].upper {
                step = -step;
            }

            let mut probe = x.to_vec();
            probe[dim] += step;
            let probe_residuals = residual_fn(&probe);
            *function_evaluations += 1;

            probe_residuals
                .iter()
                .zip(base_residuals)
                .map(|(&probed, &base)| {
                    let derivative = (probed - base) / step;
                    if derivative.is_finite() { derivative } else { 0.0 }
                })
                .collect()
        })
        .collect()
}

fn sum_of_squares(residuals: &[f64]) -> f64 {
    residuals.iter().map(|&value| value * value).sum()
}

/// Columns of the Jacobian are stored per free dimension.
fn jt_times_r(jacobian: &[Vec<f64>], residuals: &[f64]) -> Vec<f64> {
    jacobian
        .iter()
        .map(|column| {
            column
                .iter()
                .zip(residuals)
                .map(|(&j, &r)| j * r)
                .sum()
        })
        .collect()
}

fn jt_times_j(jacobian: &[Vec<f64>]) -> DenseMatrix {
    let dimension = jacobian.len();
    let mut normal = DenseMatrix::zeros(dimension, dimension);
    for row in 0..dimension {
        for col in row..dimension {
            let value: f64 = jacobian[row]
                .iter()
                .zip(&jacobian[col])
                .map(|(&a, &b)| a * b)
                .sum();
            normal[(row, col)] = value;
            normal[(col, row)] = value;
        }
    }
    normal
}

fn solve_damped(normal: &DenseMatrix, gradient: &[f64], damping: f64) -> Option<Vec<f64>> {
    let dimension = gradient.len();
    let mut damped = normal.clone();
    for index in 0..dimension {
        let diagonal = normal[(index, index)].max(1.0e-12);
        damped[(index, index)] = normal[(index, index)] + damping * diagonal;
    }

    let negated: Vec<f64> = gradient.iter().map(|&g| -g).collect();
    lu_factorize(&damped)
        .and_then(|decomposition| decomposition.solve(&negated))
        .ok()
}

/// Gauss-Newton covariance on the free dimensions. A singular normal
/// matrix (collinear or insensitive parameters) leaves the variance
/// undetermined: those dimensions report infinite uncertainty instead of
/// failing the whole fit.
fn covariance_estimate(
    jacobian: &[Vec<f64>],
    free: &[usize],
    dimension: usize,
    cost: f64,
    residual_count: usize,
) -> (DenseMatrix, Vec<f64>) {
    let normal = jt_times_j(jacobian);
    let inverse = match lu_factorize(&normal).and_then(|decomposition| decomposition.invert()) {
        Ok(inverse) => inverse,
        Err(_) => {
            let mut covariance = DenseMatrix::zeros(dimension, dimension);
            let mut standard_errors = vec![0.0; dimension];
            for &dim in free {
                covariance[(dim, dim)] = f64::INFINITY;
                standard_errors[dim] = f64::INFINITY;
            }
            return (covariance, standard_errors);
        }
    };

    let degrees_of_freedom = residual_count.saturating_sub(free.len());
    let variance_scale = if degrees_of_freedom > 0 {
        cost / degrees_of_freedom as f64
    } else {
        1.0
    };

    let mut covariance = DenseMatrix::zeros(dimension, dimension);
    for (row_slot, &row_dim) in free.iter().enumerate() {
        for (col_slot, &col_dim) in free.iter().enumerate() {
            covariance[(row_dim, col_dim)] = variance_scale * inverse[(row_slot, col_slot)];
        }
    }

    let standard_errors = (0..dimension)
        .map(|index| covariance[(index, index)].max(0.0).sqrt())
        .collect();

    (covariance, standard_errors)
}

#[cfg(test)]
mod tests {
    use super::{
        LeastSquaresError, LeastSquaresOptions, ParameterBounds, fit_least_squares,
    };

    #[test]
    fn recovers_a_linear_model_exactly() {
        let t: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let data: Vec<f64> = t.iter().map(|&ti| 1.5 + 0.8 * ti).collect();

        let residual = |params: &[f64]| -> Vec<f64> {
            t.iter()
                .zip(&data)
                .map(|(&ti, &yi)| params[0] + params[1] * ti - yi)
                .collect()
        };

        let options = LeastSquaresOptions::bounded(vec![
            ParameterBounds::new(-10.0, 10.0),
            ParameterBounds::new(-10.0, 10.0),
        ]);
        let outcome = fit_least_squares(residual, &[0.0, 0.0], &options).expect("fit");

        assert!(outcome.converged, "message: {}", outcome.message);
        assert!((outcome.solution[0] - 1.5).abs() <= 1.0e-6);
        assert!((outcome.solution[1] - 0.8).abs() <= 1.0e-6);
        assert!(outcome.cost <= 1.0e-10);
        // Noiseless data leaves negligible parameter variance.
        assert!(outcome.standard_errors[0] <= 1.0e-4);
    }

    #[test]
    fn recovers_a_nonlinear_decay_within_bounds() {
        let t: Vec<f64> = (0..80).map(|i| i as f64 * 0.05).collect();
        let data: Vec<f64> = t.iter().map(|&ti| 2.0 * (-1.3 * ti).exp()).collect();

        let residual = |params: &[f64]| -> Vec<f64> {
            t.iter()
                .zip(&data)
                .map(|(&ti, &yi)| params[0] * (-params[1] * ti).exp() - yi)
                .collect()
        };

        let options = LeastSquaresOptions::bounded(vec![
            ParameterBounds::new(0.1, 5.0),
            ParameterBounds::new(0.1, 5.0),
        ]);
        let outcome = fit_least_squares(residual, &[1.0, 0.5], &options).expect("fit");

        assert!((outcome.solution[0] - 2.0).abs() <= 1.0e-4);
        assert!((outcome.solution[1] - 1.3).abs() <= 1.0e-4);
        for (value, bound) in outcome.solution.iter().zip(&options.bounds) {
            assert!(*value >= bound.lower && *value <= bound.upper);
        }
    }

    #[test]
    fn pinned_parameters_are_excluded_from_search_and_covariance() {
        let data = [1.0, 2.0, 3.0];
        let residual = |params: &[f64]| -> Vec<f64> {
            data.iter().map(|&yi| params[0] + params[1] - yi).collect()
        };

        let options = LeastSquaresOptions::bounded(vec![
            ParameterBounds::pinned(0.5),
            ParameterBounds::new(-5.0, 5.0),
        ]);
        let outcome = fit_least_squares(residual, &[0.5, 0.0], &options).expect("fit");

        assert_eq!(outcome.solution[0], 0.5);
        assert!((outcome.solution[1] - 1.5).abs() <= 1.0e-6);
        assert_eq!(outcome.covariance[(0, 0)], 0.0);
        assert_eq!(outcome.standard_errors[0], 0.0);
    }

    #[test]
    fn collinear_parameters_keep_the_solution_with_infinite_uncertainty() {
        let data = [1.0, 2.0, 3.0];
        // Only the sum of the two parameters is determined by the data.
        let residual = |params: &[f64]| -> Vec<f64> {
            data.iter().map(|&yi| params[0] + params[1] - yi).collect()
        };

        let options = LeastSquaresOptions::bounded(vec![
            ParameterBounds::new(-5.0, 5.0),
            ParameterBounds::new(-5.0, 5.0),
        ]);
        let outcome = fit_least_squares(residual, &[0.0, 0.0], &options).expect("fit");

        assert!((outcome.solution[0] + outcome.solution[1] - 2.0).abs() <= 1.0e-6);
        assert!(outcome.standard_errors.iter().all(|error| error.is_infinite()));
        assert!(outcome.covariance[(0, 0)].is_infinite());
    }

    #[test]
    fn rejects_an_initial_guess_outside_the_bounds() {
        let options =
            LeastSquaresOptions::bounded(vec![ParameterBounds::new(0.0, 1.0)]);
        let error = fit_least_squares(|p| vec![p[0]], &[2.0], &options)
            .expect_err("out-of-bounds initial guess should fail");
        assert_eq!(
            error,
            LeastSquaresError::InitialOutsideBounds {
                index: 0,
                value: 2.0,
                lower: 0.0,
                upper: 1.0,
            }
        );
    }
}
