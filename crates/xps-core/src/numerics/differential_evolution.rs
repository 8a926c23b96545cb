//! Seeded differential evolution (best/1/bin) with deferred population
//! updates, bound clamping, and equal-bounds dimension pinning.
//!
//! The population is evaluated by a single worker: objectives in this crate
//! mutate shared engine parameters in place, so parallel evaluation would
//! race on that state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DifferentialEvolutionError {
    #[error("differential evolution requires at least one parameter bound")]
    EmptyBounds,
    #[error("bound {index} must satisfy finite lower <= upper, got [{lower}, {upper}]")]
    InvalidBound {
        index: usize,
        lower: f64,
        upper: f64,
    },
    #[error("objective never returned a finite value during initialization")]
    ObjectiveNeverFinite,
}

/// Inclusive search interval for one parameter. Equal bounds pin the
/// parameter at that value and exclude it from the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterBounds {
    pub lower: f64,
    pub upper: f64,
}

impl ParameterBounds {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn pinned(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.lower == self.upper
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialEvolutionOutcome {
    pub solution: Vec<f64>,
    pub objective_value: f64,
    pub iterations: usize,
    pub function_evaluations: usize,
    pub converged: bool,
    pub message: String,
}

/// Bounded global minimizer. Defaults mirror the estimation workflow:
/// deterministic seed 42, population multiplier 15, dithered mutation in
/// [0.5, 1), recombination 0.7.
#[derive(Debug, Clone)]
pub struct DifferentialEvolution {
    bounds: Vec<ParameterBounds>,
    pub max_iterations: usize,
    pub population_multiplier: usize,
    pub mutation_range: (f64, f64),
    pub recombination: f64,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub seed: u64,
}

impl DifferentialEvolution {
    pub fn new(bounds: Vec<ParameterBounds>) -> Result<Self, DifferentialEvolutionError> {
        if bounds.is_empty() {
            return Err(DifferentialEvolutionError::EmptyBounds);
        }
        for (index, bound) in bounds.iter().enumerate() {
            if !bound.lower.is_finite() || !bound.upper.is_finite() || bound.lower > bound.upper {
                return Err(DifferentialEvolutionError::InvalidBound {
                    index,
                    lower: bound.lower,
                    upper: bound.upper,
                });
            }
        }

        Ok(Self {
            bounds,
            max_iterations: 100,
            population_multiplier: 15,
            mutation_range: (0.5, 1.0),
            recombination: 0.7,
            relative_tolerance: 1.0e-2,
            absolute_tolerance: 0.0,
            seed: 42,
        })
    }

    pub fn bounds(&self) -> &[ParameterBounds] {
        &self.bounds
    }

    /// Minimizes the objective. The optional callback observes
    /// (generation index, best objective value) once per generation.
    pub fn minimize<F>(
        &self,
        mut objective: F,
        mut callback: Option<&mut dyn FnMut(usize, f64)>,
    ) -> Result<DifferentialEvolutionOutcome, DifferentialEvolutionError>
    where
        F: FnMut(&[f64]) -> f64,
    {
        let free: Vec<usize> = self
            .bounds
            .iter()
            .enumerate()
            .filter(|(_, bound)| !bound.is_pinned())
            .map(|(index, _)| index)
            .collect();

        let pinned_template: Vec<f64> = self.bounds.iter().map(|bound| bound.lower).collect();
        if free.is_empty() {
            let value = guarded(&mut objective, &pinned_template);
            if !value.is_finite() {
                return Err(DifferentialEvolutionError::ObjectiveNeverFinite);
            }
            return Ok(DifferentialEvolutionOutcome {
                solution: pinned_template,
                objective_value: value,
                iterations: 0,
                function_evaluations: 1,
                converged: true,
                message: "all parameters pinned by equal bounds".to_string(),
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let population_count = (self.population_multiplier * free.len()).max(5);

        let mut population: Vec<Vec<f64>> = (0..population_count)
            .map(|_| {
                let mut member = pinned_template.clone();
                for &dim in &free {
                    let bound = self.bounds[dim];
                    member[dim] = rng.gen_range(bound.lower..=bound.upper);
                }
                member
            })
            .collect();

        let mut energies: Vec<f64> = population
            .iter()
            .map(|member| guarded(&mut objective, member))
            .collect();
        let mut function_evaluations = population_count;

        let mut best_index = argmin(&energies);
        if !energies[best_index].is_finite() {
            return Err(DifferentialEvolutionError::ObjectiveNeverFinite);
        }

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            iterations += 1;
            let mutation_factor = rng.gen_range(self.mutation_range.0..self.mutation_range.1);

            // Deferred updating: build and evaluate every trial against the
            // current generation before replacing anything.
            let mut trials = Vec::with_capacity(population_count);
            for member_index in 0..population_count {
                let (first, second) =
                    distinct_pair(&mut rng, population_count, member_index, best_index);

                let mut trial = population[member_index].clone();
                let forced_dim = free[rng.gen_range(0..free.len())];
                for &dim in &free {
                    let crossover = dim == forced_dim
                        || rng.r#gen::<f64>() < self.recombination;
                    if crossover {
                        let mutant = population[best_index][dim]
                            + mutation_factor
                                * (population[first][dim] - population[second][dim]);
                        trial[dim] = self.bounds[dim].clamp(mutant);
                    }
                }
                trials.push(trial);
            }

            for (member_index, trial) in trials.into_iter().enumerate() {
                let energy = guarded(&mut objective, &trial);
                function_evaluations += 1;
                if energy < energies[member_index] {
                    population[member_index] = trial;
                    energies[member_index] = energy;
                }
            }

            best_index = argmin(&energies);
            if let Some(observer) = callback.as_deref_mut() {
                observer(iterations, energies[best_index]);
            }

            if population_converged(
                &energies,
                self.absolute_tolerance,
                self.relative_tolerance,
            ) {
                converged = true;
                break;
            }
        }

        let message = if converged {
            "population energies converged".to_string()
        } else {
            "maximum number of iterations reached".to_string()
        };

        Ok(DifferentialEvolutionOutcome {
            solution: population[best_index].clone(),
            objective_value: energies[best_index],
            iterations,
            function_evaluations,
            converged,
            message,
        })
    }
}

fn guarded<F>(objective: &mut F, point: &[f64]) -> f64
where
    F: FnMut(&[f64]) -> f64,
{
    let value = objective(point);
    if value.is_finite() { value } else { f64::INFINITY }
}

fn argmin(energies: &[f64]) -> usize {
    let mut best = 0;
    for (index, &energy) in energies.iter().enumerate() {
        if energy < energies[best] {
            best = index;
        }
    }
    best
}

fn distinct_pair(
    rng: &mut StdRng,
    population_count: usize,
    member_index: usize,
    best_index: usize,
) -> (usize, usize) {
    let mut draw = |exclude: &[usize]| loop {
        let candidate = rng.gen_range(0..population_count);
        if !exclude.contains(&candidate) {
            return candidate;
        }
    };
    let first = draw(&[member_index, best_index]);
    let second = draw(&[member_index, best_index, first]);
    (first, second)
}

fn population_converged(energies: &[f64], absolute_tol: f64, relative_tol: f64) -> bool {
    let finite: Vec<f64> = energies.iter().copied().filter(|e| e.is_finite()).collect();
    if finite.len() != energies.len() {
        return false;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let variance = finite
        .iter()
        .map(|energy| (energy - mean) * (energy - mean))
        .sum::<f64>()
        / finite.len() as f64;
    variance.sqrt() <= absolute_tol + relative_tol * mean.abs()
}
