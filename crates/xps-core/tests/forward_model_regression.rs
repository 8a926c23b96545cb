use xps_core::detector::Detector2D;
use xps_core::grid::CalculationGrid;
use xps_core::physics::fermi_dirac_curve;
use xps_core::source::XraySource;
use xps_core::{DigitalTwinEngine, analysis::peak_normalized};

fn distortion_free_engine() -> DigitalTwinEngine {
    let grid = CalculationGrid::new(-0.05, 0.05, 300).expect("grid");
    let source = XraySource {
        sigma_x: 1.0e-5,
        sigma_y: 1.0,
        alpha: 0.0,
        gamma_x: 0.0,
        gamma_y: 0.0,
        rotation: 0.0,
    };
    let detector = Detector2D {
        kappa: 0.0,
        theta: 0.0,
        sigma_res: 0.0,
    };
    DigitalTwinEngine::with_components(grid, source, detector)
}

#[test]
fn distortion_free_simulation_reproduces_the_bare_fermi_edge() {
    let engine = distortion_free_engine();
    let simulation = engine.simulate(30.0).expect("simulation");

    let normalized = peak_normalized(&simulation.intensity);
    let reference = fermi_dirac_curve(simulation.energy.as_slice(), 30.0, 0.0);
    let reference_peak = reference.iter().fold(0.0_f64, |acc, &v| acc.max(v));

    // With no tilt, smile, gradient, or blur every spatial row carries the
    // same spectrum, so the projected shape is the ideal edge.
    for (index, (&value, &ideal)) in normalized.iter().zip(&reference).enumerate() {
        assert!(
            (value - ideal / reference_peak).abs() <= 1.0e-6,
            "bin {index}: simulated {value} vs ideal {ideal}"
        );
    }
}

#[test]
fn cold_edge_simulation_is_monotone_within_ripple() {
    let grid = CalculationGrid::new(-0.1, 0.1, 500).expect("grid");
    let engine = DigitalTwinEngine::with_components(
        grid,
        XraySource::default(),
        Detector2D::default(),
    );
    let simulation = engine.simulate(5.0).expect("simulation");

    let peak = simulation
        .intensity
        .iter()
        .fold(0.0_f64, |acc, &v| acc.max(v));
    let ripple = 1.0e-3 * peak;
    for (index, pair) in simulation.intensity.windows(2).enumerate() {
        assert!(
            pair[1] <= pair[0] + ripple,
            "intensity rose beyond ripple at bin {index}: {} -> {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn resolution_blur_keeps_the_occupied_plateau_flat() {
    let mut engine = distortion_free_engine();
    engine.detector.sigma_res = 0.002;

    let simulation = engine.simulate(5.0).expect("simulation");
    let normalized = peak_normalized(&simulation.intensity);

    // Edge-replicate padding keeps the far occupied side at the plateau
    // level instead of darkening toward the array boundary.
    for &value in &normalized[..20] {
        assert!((value - 1.0).abs() <= 1.0e-3, "plateau bled: {value}");
    }
    assert!(normalized[normalized.len() - 1] <= 1.0e-3);
}

#[test]
fn distorted_simulation_is_deterministic() {
    let grid = CalculationGrid::with_spatial_axis(-0.05, 0.05, 120, -10.0, 10.0, 40)
        .expect("grid");
    let source = XraySource {
        alpha: 0.002,
        sigma_y: 0.5,
        ..XraySource::default()
    };
    let detector = Detector2D {
        kappa: 0.01,
        theta: 0.1,
        sigma_res: 0.0015,
    };
    let engine = DigitalTwinEngine::with_components(grid, source, detector);

    let first = engine.simulate(30.0).expect("first run");
    let second = engine.simulate(30.0).expect("second run");
    assert_eq!(first, second);
}

#[test]
fn instrument_distortions_broaden_the_edge() {
    let sharp = distortion_free_engine();
    let sharp_run = peak_normalized(&sharp.simulate(5.0).expect("sharp").intensity);

    let mut blurred = distortion_free_engine();
    blurred.detector.kappa = 0.02;
    blurred.detector.sigma_res = 0.003;
    blurred.source.alpha = 0.003;
    let blurred_run = peak_normalized(&blurred.simulate(5.0).expect("blurred").intensity);

    let width = |spectrum: &[f64]| {
        let upper = spectrum.iter().position(|&v| v <= 0.9).expect("upper crossing");
        let lower = spectrum.iter().position(|&v| v <= 0.1).expect("lower crossing");
        lower - upper
    };
    assert!(
        width(&blurred_run) > width(&sharp_run),
        "distortions must widen the 10-90 edge width"
    );
}
