//! Digital-twin simulator for an XPS spectrometer.
//!
//! The forward model chains a calculation grid, an X-ray source emission
//! model, and a 2D detector projection into a single `simulate` pass; the
//! analysis layer inverts that model to recover resolution and instrument
//! distortion parameters from an observed Fermi edge.

pub mod analysis;
pub mod common;
pub mod detector;
pub mod engine;
pub mod grid;
pub mod numerics;
pub mod physics;
pub mod source;

pub use detector::Detector2D;
pub use engine::{DigitalTwinEngine, Simulation};
pub use grid::CalculationGrid;
pub use source::XraySource;
