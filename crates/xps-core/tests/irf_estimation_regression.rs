use std::sync::mpsc::sync_channel;

use xps_core::DigitalTwinEngine;
use xps_core::analysis::{FitError, IrfBounds, IrfEstimationOptions, XpsDeconvolver};
use xps_core::detector::Detector2D;
use xps_core::grid::CalculationGrid;
use xps_core::numerics::differential_evolution::ParameterBounds;
use xps_core::source::XraySource;

const MEASUREMENT_TEMPERATURE_K: f64 = 30.0;

const TRUE_KAPPA: f64 = 0.01;
const TRUE_THETA: f64 = 0.08;
const TRUE_SIGMA_RES: f64 = 0.0015;
const TRUE_ALPHA: f64 = 0.002;
const PINNED_SIGMA_X: f64 = 5.0e-4;
const PINNED_SIGMA_Y: f64 = 0.5;

fn measurement_grid() -> CalculationGrid {
    CalculationGrid::with_spatial_axis(-0.05, 0.05, 120, -10.0, 10.0, 40).expect("grid")
}

fn true_engine() -> DigitalTwinEngine {
    DigitalTwinEngine::with_components(
        measurement_grid(),
        XraySource {
            sigma_x: PINNED_SIGMA_X,
            sigma_y: PINNED_SIGMA_Y,
            alpha: TRUE_ALPHA,
            gamma_x: 0.0,
            gamma_y: 0.0,
            rotation: 0.0,
        },
        Detector2D {
            kappa: TRUE_KAPPA,
            theta: TRUE_THETA,
            sigma_res: TRUE_SIGMA_RES,
        },
    )
}

/// Search box freeing the smile curvature and the detector blur. Tilt and
/// the emission gradient both shift energy linearly in the detector row,
/// and under a symmetric spot either one reduces to extra Gaussian blur;
/// a single spectrum cannot separate them from sigma_res, so both stay
/// pinned at their known values alongside the spot shape.
fn search_bounds() -> IrfBounds {
    IrfBounds {
        kappa: ParameterBounds::new(0.0, 0.05),
        theta: ParameterBounds::pinned(TRUE_THETA),
        sigma_res: ParameterBounds::new(1.0e-4, 0.005),
        alpha: ParameterBounds::pinned(TRUE_ALPHA),
        sigma_x: ParameterBounds::pinned(PINNED_SIGMA_X),
        sigma_y: ParameterBounds::pinned(PINNED_SIGMA_Y),
        gamma_x: ParameterBounds::pinned(0.0),
        gamma_y: ParameterBounds::pinned(0.0),
        rotation: ParameterBounds::pinned(0.0),
    }
}

fn synthetic_observation() -> Vec<f64> {
    true_engine()
        .simulate(MEASUREMENT_TEMPERATURE_K)
        .expect("synthetic spectrum")
        .intensity
}

fn fresh_deconvolver() -> XpsDeconvolver {
    // The starting engine carries default parameters; the search overwrites
    // them from the bound box.
    XpsDeconvolver::new(DigitalTwinEngine::with_components(
        measurement_grid(),
        XraySource::default(),
        Detector2D::default(),
    ))
}

fn estimation_options() -> IrfEstimationOptions {
    IrfEstimationOptions {
        bounds: search_bounds(),
        max_iterations: 40,
        polish: true,
        progress: None,
    }
}

#[test]
fn estimation_recovers_the_free_distortion_parameters() {
    let observed = synthetic_observation();
    let mut deconvolver = fresh_deconvolver();

    let estimate = deconvolver
        .estimate_irf_parameters(&observed, MEASUREMENT_TEMPERATURE_K, &estimation_options())
        .expect("estimate");

    let parameters = estimate.parameters;
    assert!(
        (parameters.kappa - TRUE_KAPPA).abs() <= 0.1 * TRUE_KAPPA,
        "kappa = {}",
        parameters.kappa
    );
    assert!(
        (parameters.sigma_res - TRUE_SIGMA_RES).abs() <= 0.1 * TRUE_SIGMA_RES,
        "sigma_res = {}",
        parameters.sigma_res
    );

    // Pinned parameters pass through untouched.
    assert_eq!(parameters.theta, TRUE_THETA);
    assert_eq!(parameters.alpha, TRUE_ALPHA);
    assert_eq!(parameters.sigma_x, PINNED_SIGMA_X);
    assert_eq!(parameters.sigma_y, PINNED_SIGMA_Y);
    assert_eq!(parameters.rotation, 0.0);

    assert!(estimate.final_loss <= 1.0e-6, "loss = {}", estimate.final_loss);
    assert!(!estimate.message.is_empty());
    assert_eq!(estimate.fitted_spectrum.len(), observed.len());
}

#[test]
fn estimation_is_deterministic_across_runs() {
    let observed = synthetic_observation();

    let first = fresh_deconvolver()
        .estimate_irf_parameters(&observed, MEASUREMENT_TEMPERATURE_K, &estimation_options())
        .expect("first estimate");
    let second = fresh_deconvolver()
        .estimate_irf_parameters(&observed, MEASUREMENT_TEMPERATURE_K, &estimation_options())
        .expect("second estimate");

    assert_eq!(first.parameters, second.parameters);
    assert_eq!(first.final_loss, second.final_loss);
    assert_eq!(first.function_evaluations, second.function_evaluations);
}

#[test]
fn progress_records_arrive_with_non_increasing_loss() {
    let observed = synthetic_observation();
    let mut deconvolver = fresh_deconvolver();

    let (sender, receiver) = sync_channel(256);
    let options = IrfEstimationOptions {
        bounds: search_bounds(),
        max_iterations: 15,
        polish: false,
        progress: Some(sender),
    };

    deconvolver
        .estimate_irf_parameters(&observed, MEASUREMENT_TEMPERATURE_K, &options)
        .expect("estimate");
    drop(options);

    let records: Vec<_> = receiver.iter().collect();
    assert!(!records.is_empty());
    for pair in records.windows(2) {
        assert!(pair[1].loss <= pair[0].loss + 1.0e-15);
        assert!(pair[1].iteration > pair[0].iteration);
    }
}

#[test]
fn estimated_response_profile_is_normalized_and_peaked() {
    let observed = synthetic_observation();
    let mut deconvolver = fresh_deconvolver();

    let estimate = deconvolver
        .estimate_irf_parameters(&observed, MEASUREMENT_TEMPERATURE_K, &estimation_options())
        .expect("estimate");

    let peak = estimate
        .estimated_irf
        .iter()
        .fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    assert!((peak - 1.0).abs() <= 1.0e-9);
    // A falling edge has a positive response peak.
    let max = estimate
        .estimated_irf
        .iter()
        .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    assert!(max > 0.9);
}

#[test]
fn estimation_rejects_mismatched_observations() {
    let mut deconvolver = fresh_deconvolver();
    let error = deconvolver
        .estimate_irf_parameters(&[1.0; 7], MEASUREMENT_TEMPERATURE_K, &estimation_options())
        .expect_err("length mismatch");
    assert_eq!(
        error,
        FitError::ObservedLengthMismatch {
            expected: 120,
            actual: 7,
        }
    );
}
