mod commands;
mod helpers;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Entry point for the installed binary: initializes logging, runs the
/// requested command, and maps failures to exit codes.
pub fn run_from_env() -> i32 {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            error.exit_code()
        }
    }
}

/// Programmatic entry point used by tests: takes the arguments after the
/// program name.
pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args: Vec<String> = std::iter::once("xps-twin".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect();
    parse_and_dispatch(full_args)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "xps-twin", about = "XPS digital-twin simulator and deconvolver")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Forward-simulate a detected spectrum and write it as JSON
    Simulate(commands::SimulateArgs),
    /// Fit the convolved Fermi-edge model to a measured spectrum
    FitEdge(commands::FitEdgeArgs),
    /// Estimate the full instrument response from a measured spectrum
    EstimateIrf(commands::EstimateIrfArgs),
    /// Refine the reduced instrument parameter set against a measured spectrum
    Refine(commands::RefineArgs),
    /// Report the theoretical resolution budget for instrument parameters
    Resolution(commands::ResolutionArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Simulate(args) => commands::run_simulate(args),
        CliCommand::FitEdge(args) => commands::run_fit_edge(args),
        CliCommand::EstimateIrf(args) => commands::run_estimate_irf(args),
        CliCommand::Refine(args) => commands::run_refine(args),
        CliCommand::Resolution(args) => commands::run_resolution(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Grid(#[from] xps_core::grid::GridError),
    #[error(transparent)]
    Engine(#[from] xps_core::engine::EngineError),
    #[error(transparent)]
    Fit(#[from] xps_core::analysis::FitError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            _ => 1,
        }
    }
}
