//! SEIR model: SIR with an incubating (exposed) compartment.

use crate::error::ConfigError;
use crate::health::{HealthData, HealthPoint, PopulationData};
use crate::parameter::{ParamMap, Parameter, ParameterConfig};

use super::compartment::CompartmentDynamics;
use super::state::SegmentFit;

const INITIAL_EXPOSED_FR: &str = "initial_exposed_fr";

/// Positions of the SEIR parameters in the flat parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seir {
    beta: usize,
    gamma: usize,
    sigma: usize,
    b: usize,
    mu: usize,
    mu_i: usize,
    cfr: usize,
    initial_exposed_fr: usize,
}

impl CompartmentDynamics for Seir {
    const NAME: &'static str = "seir";

    fn default_parameter_config() -> ParameterConfig {
        ParameterConfig::builtin(vec![
            Parameter::new("beta", "Infection rate", 0.0, 10.0).policy_dependent(),
            Parameter::new("gamma", "Recovery rate", 1.0 / 30.0, 1.0 / 5.0),
            Parameter::new("sigma", "Incubation rate", 1.0 / 14.0, 1.0 / 2.0),
            Parameter::new("b", "Birth rate", 0.0, 1.0 / 2.0),
            Parameter::new("mu", "Base mortality rate", 1.0 / 365.0 / 90.0, 1.0 / 365.0 / 30.0),
            Parameter::new("mu_i", "Infected mortality rate", 1.0 / 30.0, 1.0 / 5.0),
            Parameter::new("cfr", "Case fatality rate", 0.0, 0.05),
            Parameter::new(
                INITIAL_EXPOSED_FR,
                "Initial fraction of the population that has been exposed",
                0.0,
                1.0,
            ),
        ])
    }

    fn bind(config: &ParameterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            beta: config.index_of("beta")?,
            gamma: config.index_of("gamma")?,
            sigma: config.index_of("sigma")?,
            b: config.index_of("b")?,
            mu: config.index_of("mu")?,
            mu_i: config.index_of("mu_i")?,
            cfr: config.index_of("cfr")?,
            initial_exposed_fr: config.index_of(INITIAL_EXPOSED_FR)?,
        })
    }

    fn compartments(&self) -> usize {
        5
    }

    fn derivatives(&self, state: &[f64], p: &[f64], out: &mut [f64]) {
        let (s, e, i, r) = (state[0], state[1], state[2], state[3]);
        let n = s + e + i + r;
        let (beta, gamma, sigma) = (p[self.beta], p[self.gamma], p[self.sigma]);
        let (b, mu, mu_i, cfr) = (p[self.b], p[self.mu], p[self.mu_i], p[self.cfr]);
        let infections = if n > 0.0 { beta * s * i / n } else { 0.0 };

        out[0] = -infections + (b - mu) * s;
        out[1] = infections - sigma * e - mu * e;
        out[2] = sigma * e - (gamma * (1.0 - cfr) + mu_i * cfr) * i - mu * i;
        out[3] = gamma * (1.0 - cfr) * i - mu * r;
        out[4] = mu_i * cfr * i;
    }

    /// Exposed comes from the observation when present, otherwise it is
    /// `initial_exposed_fr` of the susceptible pool.
    fn initial_state(&self, population: &PopulationData, last: &HealthPoint, params: &[f64]) -> Vec<f64> {
        let susceptible = population.population_size - last.confirmed_cases - last.recovered - last.deaths;
        let exposed = last
            .exposed_cases
            .unwrap_or_else(|| susceptible * params[self.initial_exposed_fr]);
        vec![
            susceptible - exposed,
            exposed,
            last.confirmed_cases,
            last.recovered,
            last.deaths,
        ]
    }

    fn format_output(&self, series: Vec<Vec<f64>>) -> HealthData {
        let mut series = series.into_iter().skip(1);
        let mut next = || series.next().unwrap_or_default();
        let exposed = next();
        let infected = next();
        let recovered = next();
        let deaths = next();
        HealthData::from_series(infected, recovered, deaths, Some(exposed), None)
    }

    /// Keeps the last segment's exposed fraction for seeding forecasts.
    fn finalize_general(&self, general: &mut ParamMap, segments: &[SegmentFit]) {
        if let Some(value) = segments.last().and_then(|s| s.params.get(INITIAL_EXPOSED_FR)) {
            general.insert(INITIAL_EXPOSED_FR.to_string(), *value);
        }
    }
}
