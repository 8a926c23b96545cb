use super::CliError;
use super::helpers::{SpectrumFile, read_spectrum, write_json};
use serde::Serialize;
use std::path::PathBuf;
use xps_core::analysis::{
    FermiEdgeFitOptions, FermiEdgeGuess, IrfBounds, IrfEstimationOptions, IrfParameters,
    ProgressRecord, ReducedIrfParameters, ResolutionCoefficients, XpsDeconvolver, XpsOptimizer,
    peak_normalized,
};
use xps_core::{CalculationGrid, Detector2D, DigitalTwinEngine, XraySource};

#[derive(clap::Args)]
pub(super) struct GridArgs {
    /// Energy axis start in eV relative to the Fermi level
    #[arg(long, default_value_t = -0.05, allow_negative_numbers = true)]
    energy_start: f64,

    /// Energy axis end in eV relative to the Fermi level
    #[arg(long, default_value_t = 0.05, allow_negative_numbers = true)]
    energy_end: f64,

    /// Number of energy bins
    #[arg(long, default_value_t = 500)]
    energy_steps: usize,

    #[command(flatten)]
    spatial: SpatialArgs,
}

impl GridArgs {
    fn build(&self) -> Result<CalculationGrid, CliError> {
        Ok(CalculationGrid::with_spatial_axis(
            self.energy_start,
            self.energy_end,
            self.energy_steps,
            self.spatial.spatial_start,
            self.spatial.spatial_end,
            self.spatial.spatial_steps,
        )?)
    }
}

#[derive(clap::Args)]
pub(super) struct SpatialArgs {
    /// Spatial axis start in detector row units
    #[arg(long, default_value_t = -10.0, allow_negative_numbers = true)]
    spatial_start: f64,

    /// Spatial axis end in detector row units
    #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
    spatial_end: f64,

    /// Number of spatial rows
    #[arg(long, default_value_t = 200)]
    spatial_steps: usize,
}

impl SpatialArgs {
    fn grid_for(&self, energy_axis: &[f64]) -> Result<CalculationGrid, CliError> {
        Ok(CalculationGrid::with_spatial_axis(
            energy_axis[0],
            energy_axis[energy_axis.len() - 1],
            energy_axis.len(),
            self.spatial_start,
            self.spatial_end,
            self.spatial_steps,
        )?)
    }
}

#[derive(clap::Args)]
pub(super) struct InstrumentArgs {
    /// Source spot width along the energy direction in eV
    #[arg(long, default_value_t = 0.01)]
    sigma_x: f64,

    /// Source spot height along the spatial direction
    #[arg(long, default_value_t = 1.0)]
    sigma_y: f64,

    /// Energy shift per unit spatial position in eV
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    alpha: f64,

    /// Spot skewness along the energy direction
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    gamma_x: f64,

    /// Spot skewness along the spatial direction
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    gamma_y: f64,

    /// Spot rotation in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    rotation: f64,

    /// Detector smile curvature in eV at the spatial extremes
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    kappa: f64,

    /// Detector tilt in degrees
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    theta: f64,

    /// Intrinsic detector resolution sigma in eV
    #[arg(long, default_value_t = 0.001)]
    sigma_res: f64,
}

impl InstrumentArgs {
    fn components(&self) -> (XraySource, Detector2D) {
        (
            XraySource {
                sigma_x: self.sigma_x,
                sigma_y: self.sigma_y,
                alpha: self.alpha,
                gamma_x: self.gamma_x,
                gamma_y: self.gamma_y,
                rotation: self.rotation,
            },
            Detector2D {
                kappa: self.kappa,
                theta: self.theta,
                sigma_res: self.sigma_res,
            },
        )
    }
}

#[derive(clap::Args)]
pub(super) struct SimulateArgs {
    #[command(flatten)]
    grid: GridArgs,

    #[command(flatten)]
    instrument: InstrumentArgs,

    /// Sample temperature in kelvin
    #[arg(long, default_value_t = 30.0)]
    temperature: f64,

    /// Scale the spectrum to unit peak intensity
    #[arg(long)]
    normalize: bool,

    /// Output path for the spectrum JSON (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(super) fn run_simulate(args: SimulateArgs) -> Result<i32, CliError> {
    let grid = args.grid.build()?;
    let (source, detector) = args.instrument.components();
    let engine = DigitalTwinEngine::with_components(grid, source, detector);

    let mut simulation = engine.simulate(args.temperature)?;
    if args.normalize {
        simulation.intensity = peak_normalized(&simulation.intensity);
    }
    tracing::info!(
        bins = simulation.energy.len(),
        temperature = args.temperature,
        "simulated spectrum"
    );

    write_json(
        &SpectrumFile {
            energy: simulation.energy,
            intensity: simulation.intensity,
        },
        args.output.as_deref(),
    )?;
    Ok(0)
}

#[derive(clap::Args)]
pub(super) struct FitEdgeArgs {
    /// Measured spectrum JSON with parallel energy and intensity arrays
    #[arg(long)]
    input: PathBuf,

    /// Measurement temperature in kelvin
    #[arg(long, default_value_t = 30.0)]
    temperature: f64,

    /// Starting Fermi-level shift in eV
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    ef_guess: f64,

    /// Starting total Gaussian broadening in eV
    #[arg(long, default_value_t = 0.005)]
    sigma_guess: f64,

    /// Pin the temperature at the measurement value instead of fitting it
    #[arg(long)]
    hold_temperature: bool,

    /// Skip the global search and refine from the guess only
    #[arg(long)]
    local_only: bool,

    /// Output path for the fit report JSON (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FitEdgeReport {
    ef_shift: f64,
    ef_shift_error: f64,
    sigma_total: f64,
    sigma_total_error: f64,
    temperature: f64,
    temperature_error: f64,
    amplitude: f64,
    offset: f64,
    r_squared: f64,
    final_cost: f64,
    converged: bool,
    iterations: usize,
    function_evaluations: usize,
    message: String,
    fitted_spectrum: Vec<f64>,
    residuals: Vec<f64>,
}

pub(super) fn run_fit_edge(args: FitEdgeArgs) -> Result<i32, CliError> {
    let spectrum = read_spectrum(&args.input)?;
    let grid = CalculationGrid::new(
        spectrum.energy[0],
        spectrum.energy[spectrum.energy.len() - 1],
        spectrum.energy.len(),
    )?;
    let deconvolver = XpsDeconvolver::new(DigitalTwinEngine::with_components(
        grid,
        XraySource::default(),
        Detector2D::default(),
    ));

    let options = FermiEdgeFitOptions {
        guess: FermiEdgeGuess {
            ef_shift: args.ef_guess,
            sigma_total: args.sigma_guess,
            temperature: args.temperature,
        },
        fit_temperature: !args.hold_temperature,
        use_global_search: !args.local_only,
    };
    let solution = deconvolver.fit_fermi_edge(&spectrum.intensity, &options)?;
    tracing::info!(
        ef_shift = solution.ef_shift,
        sigma_total = solution.sigma_total,
        r_squared = solution.r_squared,
        "fermi edge fit complete"
    );

    write_json(
        &FitEdgeReport {
            ef_shift: solution.ef_shift,
            ef_shift_error: solution.ef_shift_error,
            sigma_total: solution.sigma_total,
            sigma_total_error: solution.sigma_total_error,
            temperature: solution.temperature,
            temperature_error: solution.temperature_error,
            amplitude: solution.amplitude,
            offset: solution.offset,
            r_squared: solution.r_squared,
            final_cost: solution.diagnostics.final_cost,
            converged: solution.diagnostics.converged,
            iterations: solution.diagnostics.iterations,
            function_evaluations: solution.diagnostics.function_evaluations,
            message: solution.diagnostics.message.clone(),
            fitted_spectrum: solution.fitted_spectrum,
            residuals: solution.residuals,
        },
        args.output.as_deref(),
    )?;
    Ok(0)
}

#[derive(clap::Args)]
pub(super) struct EstimateIrfArgs {
    /// Measured spectrum JSON with parallel energy and intensity arrays
    #[arg(long)]
    input: PathBuf,

    /// Measurement temperature in kelvin
    #[arg(long, default_value_t = 30.0)]
    temperature: f64,

    #[command(flatten)]
    spatial: SpatialArgs,

    /// Generation budget for the global search
    #[arg(long, default_value_t = 50)]
    max_iterations: usize,

    /// Skip the local least-squares polish after the global search
    #[arg(long)]
    no_polish: bool,

    /// Output path for the estimate JSON (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct IrfReport {
    parameters: IrfParameters,
    final_loss: f64,
    converged: bool,
    message: String,
    iterations: usize,
    function_evaluations: usize,
    fitted_spectrum: Vec<f64>,
    estimated_irf: Vec<f64>,
}

pub(super) fn run_estimate_irf(args: EstimateIrfArgs) -> Result<i32, CliError> {
    let spectrum = read_spectrum(&args.input)?;
    let grid = args.spatial.grid_for(&spectrum.energy)?;
    let mut deconvolver = XpsDeconvolver::new(DigitalTwinEngine::with_components(
        grid,
        XraySource::default(),
        Detector2D::default(),
    ));

    let (sender, receiver) = std::sync::mpsc::sync_channel::<ProgressRecord>(64);
    let logger = std::thread::spawn(move || {
        for record in receiver {
            tracing::info!(
                iteration = record.iteration,
                loss = record.loss,
                "estimation progress"
            );
        }
    });

    let options = IrfEstimationOptions {
        bounds: IrfBounds::default(),
        max_iterations: args.max_iterations,
        polish: !args.no_polish,
        progress: Some(sender),
    };
    let estimate =
        deconvolver.estimate_irf_parameters(&spectrum.intensity, args.temperature, &options);
    drop(options);
    let _ = logger.join();
    let estimate = estimate?;

    tracing::info!(
        final_loss = estimate.final_loss,
        converged = estimate.converged,
        "instrument response estimated"
    );

    write_json(
        &IrfReport {
            parameters: estimate.parameters,
            final_loss: estimate.final_loss,
            converged: estimate.converged,
            message: estimate.message.clone(),
            iterations: estimate.iterations,
            function_evaluations: estimate.function_evaluations,
            fitted_spectrum: estimate.fitted_spectrum,
            estimated_irf: estimate.estimated_irf,
        },
        args.output.as_deref(),
    )?;
    Ok(0)
}

#[derive(clap::Args)]
pub(super) struct RefineArgs {
    /// Measured spectrum JSON with parallel energy and intensity arrays
    #[arg(long)]
    input: PathBuf,

    /// Measurement temperature in kelvin
    #[arg(long, default_value_t = 30.0)]
    temperature: f64,

    #[command(flatten)]
    spatial: SpatialArgs,

    /// Starting smile curvature
    #[arg(long, allow_negative_numbers = true)]
    kappa_guess: Option<f64>,

    /// Starting tilt in degrees
    #[arg(long, allow_negative_numbers = true)]
    theta_guess: Option<f64>,

    /// Starting intrinsic resolution sigma in eV
    #[arg(long)]
    sigma_res_guess: Option<f64>,

    /// Starting Fermi-level shift in eV
    #[arg(long, allow_negative_numbers = true)]
    ef_guess: Option<f64>,

    /// Starting energy gradient in eV per unit spatial position
    #[arg(long, allow_negative_numbers = true)]
    alpha_guess: Option<f64>,

    /// Output path for the refinement JSON (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RefineReport {
    parameters: ReducedIrfParameters,
    standard_errors: ReducedIrfParameters,
    cost: f64,
    converged: bool,
    message: String,
    iterations: usize,
    function_evaluations: usize,
    fitted_spectrum: Vec<f64>,
}

pub(super) fn run_refine(args: RefineArgs) -> Result<i32, CliError> {
    let spectrum = read_spectrum(&args.input)?;
    let grid = args.spatial.grid_for(&spectrum.energy)?;
    let mut optimizer = XpsOptimizer::new(DigitalTwinEngine::with_components(
        grid,
        XraySource::default(),
        Detector2D::default(),
    ));

    let defaults = ReducedIrfParameters::default();
    let initial = ReducedIrfParameters {
        kappa: args.kappa_guess.unwrap_or(defaults.kappa),
        theta: args.theta_guess.unwrap_or(defaults.theta),
        sigma_res: args.sigma_res_guess.unwrap_or(defaults.sigma_res),
        ef_shift: args.ef_guess.unwrap_or(defaults.ef_shift),
        alpha: args.alpha_guess.unwrap_or(defaults.alpha),
    };

    let fit = optimizer.fit(
        &spectrum.energy,
        &spectrum.intensity,
        args.temperature,
        Some(initial),
    )?;
    tracing::info!(cost = fit.cost, converged = fit.converged, "refinement complete");

    write_json(
        &RefineReport {
            parameters: fit.parameters,
            standard_errors: fit.standard_errors,
            cost: fit.cost,
            converged: fit.converged,
            message: fit.message.clone(),
            iterations: fit.iterations,
            function_evaluations: fit.function_evaluations,
            fitted_spectrum: fit.fitted_spectrum,
        },
        args.output.as_deref(),
    )?;
    Ok(0)
}

#[derive(clap::Args)]
pub(super) struct ResolutionArgs {
    #[command(flatten)]
    instrument: InstrumentArgs,

    /// Energy spread per unit smile curvature
    #[arg(long, default_value_t = 0.01)]
    smile_scale: f64,

    /// Energy spread per degree of detector tilt
    #[arg(long, default_value_t = 0.001)]
    tilt_scale: f64,

    /// Coupling between the energy gradient and the spot height
    #[arg(long, default_value_t = 0.1)]
    gradient_coupling: f64,

    /// Energy spread per unit of spot skewness
    #[arg(long, default_value_t = 1.0e-4)]
    asymmetry_scale: f64,

    /// Output path for the budget JSON (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(super) fn run_resolution(args: ResolutionArgs) -> Result<i32, CliError> {
    // The budget only reads instrument parameters; any valid grid works.
    let grid = CalculationGrid::new(-0.05, 0.05, 16)?;
    let (source, detector) = args.instrument.components();
    let deconvolver =
        XpsDeconvolver::new(DigitalTwinEngine::with_components(grid, source, detector));

    let coefficients = ResolutionCoefficients {
        smile_scale: args.smile_scale,
        tilt_scale: args.tilt_scale,
        gradient_coupling: args.gradient_coupling,
        asymmetry_scale: args.asymmetry_scale,
    };
    let budget = deconvolver.calculate_theoretical_resolution(&coefficients);
    tracing::info!(total = budget.total, "resolution budget computed");

    write_json(&budget, args.output.as_deref())?;
    Ok(0)
}
