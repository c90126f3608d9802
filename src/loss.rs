//! Scoring a health/economy outcome.
//!
//! A loss is either one scalar, with the trade-off already resolved, or a
//! fixed-arity vector of objectives kept separate for Pareto search. Lower is
//! better throughout.

use serde::{Deserialize, Serialize};

use crate::economy::EconomicOutput;
use crate::health::{HealthData, PopulationData};

/// Badness of an outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Loss {
    /// One value with the trade-off already resolved.
    Scalar(f64),
    /// Separate objectives, compared by Pareto dominance.
    Objectives(Vec<f64>),
}

impl Loss {
    /// Whether `self` dominates `other`.
    ///
    /// Scalars dominate when strictly smaller. Objective vectors dominate
    /// when no coordinate is larger and at least one is smaller.
    ///
    /// # Panics
    ///
    /// Panics when the objective vectors differ in length, or when a scalar
    /// is compared with an objective vector. Both are caller bugs.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => a < b,
            (Self::Objectives(a), Self::Objectives(b)) => {
                assert!(
                    a.len() == b.len(),
                    "losses have different length: {} vs {}",
                    a.len(),
                    b.len()
                );
                a.iter().zip(b).all(|(x, y)| x <= y) && a.iter().zip(b).any(|(x, y)| x < y)
            }
            _ => panic!("cannot compare a scalar loss with a multi-objective loss"),
        }
    }

    /// The value of a scalar loss.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Objectives(_) => None,
        }
    }

    /// Number of objectives; 1 for a scalar.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Objectives(v) => v.len(),
        }
    }
}

impl From<f64> for Loss {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Loss {
    fn from(values: Vec<f64>) -> Self {
        Self::Objectives(values)
    }
}

/// Scores a forecast and its economic output.
pub trait LossFunction: Send + Sync {
    /// Loss of `health` and `economy` for `population`.
    fn compute(&self, population: &PopulationData, health: &HealthData, economy: &EconomicOutput) -> Loss;
}

impl<F> LossFunction for F
where
    F: Fn(&PopulationData, &HealthData, &EconomicOutput) -> Loss + Send + Sync,
{
    fn compute(&self, population: &PopulationData, health: &HealthData, economy: &EconomicOutput) -> Loss {
        self(population, health, economy)
    }
}

/// Deaths by the end of the forecast. The deaths compartment is cumulative.
fn forecast_deaths(health: &HealthData) -> f64 {
    health.deaths().last().copied().unwrap_or(0.0)
}

/// `death_weight · deaths − output_weight · output`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedLoss {
    /// Weight per death.
    pub death_weight: f64,
    /// Weight per unit of economic output.
    pub output_weight: f64,
}

impl LossFunction for WeightedLoss {
    fn compute(&self, _population: &PopulationData, health: &HealthData, economy: &EconomicOutput) -> Loss {
        Loss::Scalar(self.death_weight * forecast_deaths(health) - self.output_weight * economy.total())
    }
}

/// Wellbeing-years lost: life-years lost to deaths minus the wellbeing-years
/// bought by economic output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WellbeingYearsLoss {
    /// Wellbeing-years per unit of economic output.
    pub wellbeing_years_per_output: f64,
}

impl LossFunction for WellbeingYearsLoss {
    fn compute(&self, population: &PopulationData, health: &HealthData, economy: &EconomicOutput) -> Loss {
        let life_years = forecast_deaths(health) * population.life_expectancy;
        Loss::Scalar(life_years - economy.total() * self.wellbeing_years_per_output)
    }
}

/// Two objectives: deaths and negated output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEconomyObjectives;

impl LossFunction for HealthEconomyObjectives {
    fn compute(&self, _population: &PopulationData, health: &HealthData, economy: &EconomicOutput) -> Loss {
        Loss::Objectives(vec![forecast_deaths(health), -economy.total()])
    }
}
