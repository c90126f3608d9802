//! Particle-swarm minimization on top of `argmin`.
//!
//! The residual is exposed to argmin as a `CostFunction` over the free
//! dimensions only; dimensions whose bounds collapse to a point are pinned
//! and never searched. Each swarm iteration scores all particles as one batch
//! on the evaluation pool. A run stops when the iteration budget is spent.

use std::borrow::Borrow;

use argmin::core::{CostFunction, Error, Executor, SendAlias, State, SyncAlias};
use argmin::solver::particleswarm::ParticleSwarm;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, OptimizeError};

use super::{check_bounds, EvaluationPool, GlobalOptimizer, Objective, OptimizeResult};

// Non-finite residuals are replaced by this so particle comparisons stay total.
const PENALTY: f64 = f64::MAX;

/// Particle-swarm settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Swarm size.
    pub particles: usize,
    /// Iteration budget.
    pub max_iters: u64,
    /// Seed for reproducible runs; `None` draws from the OS.
    pub seed: Option<u64>,
    /// Evaluation threads; `0` means one per available core.
    pub workers: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            particles: 40,
            max_iters: 300,
            seed: None,
            workers: 0,
        }
    }
}

impl SwarmConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a swarm under two particles or a
    /// zero iteration budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.particles < 2 {
            return Err(ConfigError::Invalid {
                reason: format!("optimizer: particles must be at least 2, got {}", self.particles),
            });
        }
        if self.max_iters == 0 {
            return Err(ConfigError::Invalid {
                reason: "optimizer: max_iters must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Maps swarm positions over the free dimensions back to full vectors.
#[derive(Debug)]
struct Layout {
    pinned: Vec<f64>,
    free: Vec<usize>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Layout {
    fn new(bounds: &[(f64, f64)]) -> Self {
        let free: Vec<usize> = bounds
            .iter()
            .enumerate()
            .filter(|(_, (lo, hi))| lo < hi)
            .map(|(dim, _)| dim)
            .collect();
        Self {
            pinned: bounds.iter().map(|&(lo, _)| lo).collect(),
            lower: free.iter().map(|&dim| bounds[dim].0).collect(),
            upper: free.iter().map(|&dim| bounds[dim].1).collect(),
            free,
        }
    }

    fn expand(&self, position: &[f64]) -> Vec<f64> {
        let mut x = self.pinned.clone();
        for (slot, &dim) in self.free.iter().enumerate() {
            if let Some(&value) = position.get(slot) {
                x[dim] = value.clamp(self.lower[slot], self.upper[slot]);
            }
        }
        x
    }
}

fn penalize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        PENALTY
    }
}

/// The residual as seen by argmin.
struct SwarmProblem<'a, 'o> {
    objective: &'a Objective<'o>,
    layout: &'a Layout,
    pool: EvaluationPool,
}

impl CostFunction for SwarmProblem<'_, '_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, position: &Self::Param) -> Result<Self::Output, Error> {
        Ok(penalize((self.objective)(&self.layout.expand(position))))
    }

    fn bulk_cost<P>(&self, positions: &[P]) -> Result<Vec<Self::Output>, Error>
    where
        P: Borrow<Self::Param> + SyncAlias,
        Self::Output: SendAlias,
        Self: SyncAlias,
    {
        let candidates: Vec<Vec<f64>> = positions
            .iter()
            .map(|position| self.layout.expand(position.borrow()))
            .collect();
        let values = self.pool.evaluate(self.objective, &candidates).map_err(Error::new)?;
        Ok(values.into_iter().map(penalize).collect())
    }
}

fn solver_error(err: Error) -> OptimizeError {
    match err.downcast::<OptimizeError>() {
        Ok(err) => err,
        Err(err) => OptimizeError::Solver {
            message: err.to_string(),
        },
    }
}

/// Bounded particle-swarm optimizer.
#[derive(Debug, Clone, Default)]
pub struct ParticleSwarmOptimizer {
    config: SwarmConfig,
}

impl ParticleSwarmOptimizer {
    /// An optimizer with the given settings.
    #[must_use]
    pub const fn new(config: SwarmConfig) -> Self {
        Self { config }
    }

    /// Swarm settings.
    #[must_use]
    pub const fn config(&self) -> &SwarmConfig {
        &self.config
    }

    fn rng(&self) -> StdRng {
        match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl GlobalOptimizer for ParticleSwarmOptimizer {
    #[tracing::instrument(
        name = "optimize.particle_swarm",
        target = "optimize",
        skip_all,
        fields(dims = bounds.len(), particles = self.config.particles)
    )]
    fn minimize(&self, objective: &Objective<'_>, bounds: &[(f64, f64)]) -> Result<OptimizeResult, OptimizeError> {
        check_bounds(bounds)?;
        let layout = Layout::new(bounds);
        if layout.free.is_empty() {
            let fun = objective(&layout.pinned);
            return Ok(OptimizeResult {
                success: fun.is_finite(),
                x: layout.pinned,
                fun,
                iterations: 0,
                evaluations: 1,
                message: "All dimensions are fixed".to_string(),
            });
        }

        let problem = SwarmProblem {
            objective,
            layout: &layout,
            pool: EvaluationPool::new(self.config.workers),
        };
        let solver: ParticleSwarm<Vec<f64>, f64, StdRng> =
            ParticleSwarm::new((layout.lower.clone(), layout.upper.clone()), self.config.particles)
                .with_rng_generator(self.rng());
        let max_iters = self.config.max_iters;
        let result = Executor::new(problem, solver)
            .configure(|state| state.max_iters(max_iters))
            .run()
            .map_err(solver_error)?;

        let state = result.state();
        let best = state.get_best_param().ok_or_else(|| OptimizeError::Solver {
            message: "swarm finished without a best particle".to_string(),
        })?;
        let iterations = state.get_iter();
        let evaluations = state.get_func_counts().get("cost_count").copied().unwrap_or(0);
        let best_cost = state.get_best_cost();
        let success = best_cost < PENALTY;
        tracing::debug!(
            target: "optimize",
            iterations,
            evaluations,
            best = best_cost,
            success,
            "swarm_complete"
        );

        Ok(OptimizeResult {
            x: layout.expand(&best.position),
            fun: if success { best_cost } else { f64::INFINITY },
            success,
            iterations,
            evaluations,
            message: if success {
                format!("Iteration budget of {max_iters} spent")
            } else {
                "No candidate produced a finite residual".to_string()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer(seed: u64) -> ParticleSwarmOptimizer {
        ParticleSwarmOptimizer::new(SwarmConfig {
            particles: 30,
            max_iters: 200,
            seed: Some(seed),
            workers: 2,
        })
    }

    fn shifted_sphere(x: &[f64]) -> f64 {
        (x[0] - 1.5).powi(2) + (x[1] + 0.5).powi(2)
    }

    #[test]
    fn test_finds_shifted_sphere_minimum() {
        let result = optimizer(1)
            .minimize(&shifted_sphere, &[(-5.0, 5.0), (-5.0, 5.0)])
            .unwrap();
        assert!(result.success);
        assert!((result.x[0] - 1.5).abs() < 5e-2, "{:?}", result.x);
        assert!((result.x[1] + 0.5).abs() < 5e-2, "{:?}", result.x);
        assert!(result.fun < 1e-2);
        assert!(result.iterations > 0 && result.iterations <= 200);
        assert!(result.evaluations >= 30);
    }

    #[test]
    fn test_solution_respects_bounds() {
        // Unconstrained minimum at (1.5, -0.5) lies outside the box.
        let result = optimizer(2).minimize(&shifted_sphere, &[(2.0, 3.0), (0.0, 1.0)]).unwrap();
        assert!((2.0..=3.0).contains(&result.x[0]));
        assert!((0.0..=1.0).contains(&result.x[1]));
        assert!((result.x[0] - 2.0).abs() < 5e-2);
        assert!(result.x[1] < 5e-2);
    }

    #[test]
    fn test_degenerate_dimension_stays_fixed() {
        let result = optimizer(3)
            .minimize(&shifted_sphere, &[(-5.0, 5.0), (0.25, 0.25)])
            .unwrap();
        assert_eq!(result.x[1], 0.25);
        assert!((result.x[0] - 1.5).abs() < 5e-2);
    }

    #[test]
    fn test_all_fixed_evaluates_once() {
        let result = optimizer(4).minimize(&shifted_sphere, &[(1.5, 1.5), (-0.5, -0.5)]).unwrap();
        assert_eq!(result.x, vec![1.5, -0.5]);
        assert_eq!(result.fun, 0.0);
        assert_eq!(result.evaluations, 1);
        assert!(result.success);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let bounds = [(-5.0, 5.0), (-5.0, 5.0)];
        let a = optimizer(9).minimize(&shifted_sphere, &bounds).unwrap();
        let b = optimizer(9).minimize(&shifted_sphere, &bounds).unwrap();
        assert_eq!(a.x, b.x);
        assert_eq!(a.fun, b.fun);
    }

    #[test]
    fn test_non_finite_residuals_are_not_success() {
        let result = optimizer(5).minimize(&|_: &[f64]| f64::NAN, &[(0.0, 1.0)]).unwrap();
        assert!(!result.success);
        assert!(result.fun.is_infinite());
        assert!((0.0..=1.0).contains(&result.x[0]));
    }

    #[test]
    fn test_rejects_bad_bounds() {
        assert_eq!(
            optimizer(6).minimize(&shifted_sphere, &[]).unwrap_err(),
            OptimizeError::EmptyBounds
        );
        assert!(matches!(
            optimizer(6).minimize(&shifted_sphere, &[(1.0, 0.0)]),
            Err(OptimizeError::InvalidBounds { index: 0, .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(SwarmConfig::default().validate().is_ok());
        let small = SwarmConfig {
            particles: 1,
            ..SwarmConfig::default()
        };
        assert!(small.validate().is_err());
        let idle = SwarmConfig {
            max_iters: 0,
            ..SwarmConfig::default()
        };
        assert!(idle.validate().is_err());
    }
}
