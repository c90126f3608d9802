//! SIR model with vital dynamics and disease deaths.
//!
//! Compartments are susceptible, infectious, recovered and dead. The
//! population mixes homogeneously and recovery grants permanent immunity.

use crate::error::ConfigError;
use crate::health::{HealthData, HealthPoint, PopulationData};
use crate::parameter::{Parameter, ParameterConfig};

use super::compartment::CompartmentDynamics;

/// Positions of the SIR parameters in the flat parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sir {
    beta: usize,
    gamma: usize,
    b: usize,
    mu: usize,
    mu_i: usize,
    cfr: usize,
}

impl CompartmentDynamics for Sir {
    const NAME: &'static str = "sir";

    fn default_parameter_config() -> ParameterConfig {
        ParameterConfig::builtin(vec![
            Parameter::new("beta", "Infection rate", 0.0, 10.0).policy_dependent(),
            Parameter::new("gamma", "Recovery rate", 1.0 / 30.0, 1.0 / 5.0),
            Parameter::new("b", "Birth rate", 0.0, 1.0 / 2.0),
            Parameter::new("mu", "Base mortality rate", 1.0 / 365.0 / 90.0, 1.0 / 365.0 / 30.0),
            Parameter::new("mu_i", "Infected mortality rate", 1.0 / 30.0, 1.0 / 5.0),
            Parameter::new("cfr", "Case fatality rate", 0.0, 0.05),
        ])
    }

    fn bind(config: &ParameterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            beta: config.index_of("beta")?,
            gamma: config.index_of("gamma")?,
            b: config.index_of("b")?,
            mu: config.index_of("mu")?,
            mu_i: config.index_of("mu_i")?,
            cfr: config.index_of("cfr")?,
        })
    }

    fn compartments(&self) -> usize {
        4
    }

    fn derivatives(&self, state: &[f64], p: &[f64], out: &mut [f64]) {
        let (s, i, r) = (state[0], state[1], state[2]);
        let n = s + i + r;
        let (beta, gamma, b, mu, mu_i, cfr) =
            (p[self.beta], p[self.gamma], p[self.b], p[self.mu], p[self.mu_i], p[self.cfr]);
        // Infection pressure; an empty population has none.
        let force = if n > 0.0 { beta / n } else { 0.0 };

        out[0] = (-force * i + b - mu) * s;
        out[1] = (force * s - gamma * (1.0 - cfr) - mu_i * cfr - mu) * i;
        out[2] = gamma * (1.0 - cfr) * i - mu * r;
        out[3] = mu_i * cfr * i;
    }

    fn initial_state(&self, population: &PopulationData, last: &HealthPoint, _params: &[f64]) -> Vec<f64> {
        let susceptible = population.population_size - last.confirmed_cases - last.recovered - last.deaths;
        vec![susceptible, last.confirmed_cases, last.recovered, last.deaths]
    }

    fn format_output(&self, series: Vec<Vec<f64>>) -> HealthData {
        let mut series = series.into_iter().skip(1);
        let mut next = || series.next().unwrap_or_default();
        let infected = next();
        let recovered = next();
        let deaths = next();
        HealthData::from_series(infected, recovered, deaths, None, None)
    }
}
