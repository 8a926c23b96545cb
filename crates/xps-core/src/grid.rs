//! Discretized calculation grid: energy axis, spatial (detector-row) axis,
//! and their combined 2D mesh shape.

const DEFAULT_SPATIAL_START: f64 = -10.0;
const DEFAULT_SPATIAL_END: f64 = 10.0;
const DEFAULT_SPATIAL_STEPS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("{axis} axis requires at least 2 points, got {actual}")]
    TooFewPoints { axis: AxisKind, actual: usize },
    #[error("{axis} axis range must be finite, got [{start}, {end}]")]
    NonFiniteRange {
        axis: AxisKind,
        start: String,
        end: String,
    },
    #[error("{axis} axis range must be increasing, got [{start}, {end}]")]
    EmptyRange {
        axis: AxisKind,
        start: String,
        end: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Energy,
    Spatial,
}

impl std::fmt::Display for AxisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Energy => f.write_str("energy"),
            Self::Spatial => f.write_str("spatial"),
        }
    }
}

/// Immutable once constructed. The energy axis carries the spectrum; the
/// spatial axis is a dimensionless proxy for detector row position.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationGrid {
    energy_axis: Vec<f64>,
    spatial_axis: Vec<f64>,
    energy_step: f64,
    spatial_step: f64,
}

impl CalculationGrid {
    /// Grid with the default spatial axis (-10..10, 200 points).
    pub fn new(energy_start: f64, energy_end: f64, energy_steps: usize) -> Result<Self, GridError> {
        Self::with_spatial_axis(
            energy_start,
            energy_end,
            energy_steps,
            DEFAULT_SPATIAL_START,
            DEFAULT_SPATIAL_END,
            DEFAULT_SPATIAL_STEPS,
        )
    }

    pub fn with_spatial_axis(
        energy_start: f64,
        energy_end: f64,
        energy_steps: usize,
        spatial_start: f64,
        spatial_end: f64,
        spatial_steps: usize,
    ) -> Result<Self, GridError> {
        let energy_axis = linspace(AxisKind::Energy, energy_start, energy_end, energy_steps)?;
        let spatial_axis = linspace(AxisKind::Spatial, spatial_start, spatial_end, spatial_steps)?;
        let energy_step = energy_axis[1] - energy_axis[0];
        let spatial_step = spatial_axis[1] - spatial_axis[0];

        Ok(Self {
            energy_axis,
            spatial_axis,
            energy_step,
            spatial_step,
        })
    }

    pub fn energy_axis(&self) -> &[f64] {
        &self.energy_axis
    }

    pub fn spatial_axis(&self) -> &[f64] {
        &self.spatial_axis
    }

    pub fn energy_step(&self) -> f64 {
        self.energy_step
    }

    pub fn spatial_step(&self) -> f64 {
        self.spatial_step
    }

    /// Shape of the 2D mesh: (spatial rows, energy columns).
    pub fn mesh_shape(&self) -> (usize, usize) {
        (self.spatial_axis.len(), self.energy_axis.len())
    }

    /// Largest absolute spatial coordinate, used to normalize row positions.
    pub fn spatial_half_extent(&self) -> f64 {
        self.spatial_axis
            .iter()
            .fold(0.0_f64, |acc, value| acc.max(value.abs()))
    }
}

fn linspace(axis: AxisKind, start: f64, end: f64, steps: usize) -> Result<Vec<f64>, GridError> {
    if steps < 2 {
        return Err(GridError::TooFewPoints {
            axis,
            actual: steps,
        });
    }
    if !start.is_finite() || !end.is_finite() {
        return Err(GridError::NonFiniteRange {
            axis,
            start: format!("{start}"),
            end: format!("{end}"),
        });
    }
    if end <= start {
        return Err(GridError::EmptyRange {
            axis,
            start: format!("{start}"),
            end: format!("{end}"),
        });
    }

    let step = (end - start) / (steps - 1) as f64;
    Ok((0..steps).map(|index| start + step * index as f64).collect())
}
