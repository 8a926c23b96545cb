pub mod convolution;
pub mod differential_evolution;
pub mod interpolation;
pub mod least_squares;
pub mod linalg;

pub use convolution::{
    ConvolutionError, convolve_edge_padded, convolve_edge_signal, convolve_same, gaussian_kernel,
};
pub use differential_evolution::{
    DifferentialEvolution, DifferentialEvolutionError, DifferentialEvolutionOutcome,
    ParameterBounds,
};
pub use interpolation::{
    GridInterpolator2D, InterpolationError, interpolate_linear, resample_shifted_edge,
};
pub use least_squares::{
    LeastSquaresError, LeastSquaresOptions, LeastSquaresOutcome, fit_least_squares,
};
pub use linalg::{LinalgError, LuDecomposition, lu_factorize};

/// Dense real matrix used for 2D emission images and fit covariance.
pub type DenseMatrix = faer::Mat<f64>;
