//! Digital-twin engine: composes the grid, source, and detector into a
//! single forward-simulation pass.

use crate::detector::{Detector2D, ProjectionError};
use crate::grid::{CalculationGrid, GridError};
use crate::physics::fermi_dirac_curve;
use crate::source::{EmissionError, XraySource};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Emission(#[from] EmissionError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// One forward-simulation result: the grid's energy axis and the raw
/// (unnormalized) detected intensity. Peak normalization is the caller's
/// responsibility.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Simulation {
    pub energy: Vec<f64>,
    pub intensity: Vec<f64>,
}

/// Owns one grid, one source, and one detector. The grid is immutable; the
/// source and detector are public parameter bags mutated between calls.
/// `simulate` holds no cached state, so an engine used inside an
/// optimization objective must be exclusively owned by that optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitalTwinEngine {
    grid: CalculationGrid,
    pub source: XraySource,
    pub detector: Detector2D,
}

impl DigitalTwinEngine {
    /// Engine over the given energy range with default source and detector
    /// parameters and the default spatial axis.
    pub fn new(
        energy_start: f64,
        energy_end: f64,
        energy_steps: usize,
    ) -> Result<Self, EngineError> {
        Ok(Self::with_components(
            CalculationGrid::new(energy_start, energy_end, energy_steps)?,
            XraySource::default(),
            Detector2D::default(),
        ))
    }

    pub fn with_components(
        grid: CalculationGrid,
        source: XraySource,
        detector: Detector2D,
    ) -> Self {
        Self {
            grid,
            source,
            detector,
        }
    }

    pub fn grid(&self) -> &CalculationGrid {
        &self.grid
    }

    /// Full forward pass: ideal Fermi-Dirac occupation, source emission,
    /// detector projection. Every call re-derives everything from the
    /// current parameter values.
    pub fn simulate(&self, temperature: f64) -> Result<Simulation, EngineError> {
        let ideal = fermi_dirac_curve(self.grid.energy_axis(), temperature, 0.0);
        let emission = self.source.generate_emission(&self.grid, &ideal)?;
        let intensity = self.detector.project_to_1d(&self.grid, &emission)?;

        Ok(Simulation {
            energy: self.grid.energy_axis().to_vec(),
            intensity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{DigitalTwinEngine, Simulation};

    #[test]
    fn repeated_simulation_is_bit_identical() {
        let engine = DigitalTwinEngine::new(-0.05, 0.05, 200).expect("engine");
        let first = engine.simulate(5.0).expect("first run");
        let second = engine.simulate(5.0).expect("second run");
        assert_eq!(first, second);
    }

    #[test]
    fn simulated_intensity_tracks_the_occupied_side() {
        let engine = DigitalTwinEngine::new(-0.05, 0.05, 200).expect("engine");
        let simulation = engine.simulate(5.0).expect("simulation");

        let peak = simulation
            .intensity
            .iter()
            .fold(0.0_f64, |acc, &v| acc.max(v));
        assert!(peak > 0.0);
        // Occupied side carries the peak, unoccupied side decays to ~0.
        assert!(simulation.intensity[0] >= 0.9 * peak);
        assert!(simulation.intensity[199] <= 0.05 * peak);
    }

    #[test]
    fn simulation_round_trips_through_json() {
        let engine = DigitalTwinEngine::new(-0.05, 0.05, 50).expect("engine");
        let simulation = engine.simulate(30.0).expect("simulation");

        let encoded = serde_json::to_string(&simulation).expect("serialize");
        let decoded: Simulation = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, simulation);
    }
}
