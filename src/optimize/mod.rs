//! Derivative-free global optimization.
//!
//! Fitting only needs "minimize a scalar residual inside box bounds", so the
//! engine talks to a `GlobalOptimizer` trait object. The default
//! implementation drives argmin's particle swarm, with each batch of
//! particles scored on a scoped worker pool.

pub mod pool;
pub mod swarm;

use serde::{Deserialize, Serialize};

use crate::error::OptimizeError;

pub use pool::EvaluationPool;
pub use swarm::{ParticleSwarmOptimizer, SwarmConfig};

/// Objective evaluated by an optimizer. Must be callable from several threads.
pub type Objective<'a> = dyn Fn(&[f64]) -> f64 + Sync + 'a;

/// Outcome of a minimization.
///
/// Failing to find a usable point is not an error: `success` is false and
/// `x` still holds the best candidate found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResult {
    /// Best point, within bounds.
    pub x: Vec<f64>,
    /// Objective at `x`; infinite when nothing finite was found.
    pub fun: f64,
    /// True when `fun` is finite.
    pub success: bool,
    /// Solver iterations run.
    pub iterations: u64,
    /// Objective evaluations made.
    pub evaluations: u64,
    /// Why the run stopped.
    pub message: String,
}

/// A bounded, derivative-free minimizer.
pub trait GlobalOptimizer: Send + Sync {
    /// Minimizes `objective` over the box `bounds`.
    ///
    /// # Errors
    ///
    /// Returns `OptimizeError` for empty or inverted bounds, or if worker
    /// threads cannot be started.
    fn minimize(&self, objective: &Objective<'_>, bounds: &[(f64, f64)]) -> Result<OptimizeResult, OptimizeError>;
}

/// Checks bounds are non-empty, finite and ordered.
///
/// # Errors
///
/// Returns `OptimizeError::EmptyBounds` or `OptimizeError::InvalidBounds`.
pub fn check_bounds(bounds: &[(f64, f64)]) -> Result<(), OptimizeError> {
    if bounds.is_empty() {
        return Err(OptimizeError::EmptyBounds);
    }
    for (index, &(lo, hi)) in bounds.iter().enumerate() {
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(OptimizeError::InvalidBounds { index, lo, hi });
        }
    }
    Ok(())
}
