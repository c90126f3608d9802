//! SEIR variant that separates reported from unreported infections.
//!
//! Compartments are susceptible, exposed, unreported infectious, reported
//! infectious, dead, recovered (reported) and recovered (unreported). Both
//! infectious groups spread the disease at their own rates. Exposed cases
//! leave incubation after `INCUBATION_DAYS` on average; a share `alpha` of
//! that flow is detected and reported, the rest goes unreported and clears
//! at rate `ETA` without ever being counted.
//!
//! Confirmed cases are cumulative here: reported infectious plus reported
//! recoveries plus deaths.

use crate::error::ConfigError;
use crate::health::{HealthData, HealthPoint, PopulationData};
use crate::parameter::{ParamMap, Parameter, ParameterConfig};

use super::compartment::CompartmentDynamics;
use super::state::SegmentFit;

/// Mean incubation period in days.
pub const INCUBATION_DAYS: f64 = 5.0;

/// Clearance rate of unreported infections.
pub const ETA: f64 = 1.0 / 14.0;

/// Share of confirmed cases assumed recovered when the observed count lags.
const MIN_RECOVERED_SHARE: f64 = 0.1;

/// Unreported recoveries seeded per unreported infection at the start of a fit.
const UNREPORTED_RECOVERED_SHARE: f64 = 0.1;

const INITIAL_EXPOSED_FR: &str = "initial_exposed_fr";
const INITIAL_UNREPORTED_FR: &str = "initial_unreported_fr";

/// Positions of the parameters in the flat parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuquanSeir {
    beta1: usize,
    beta2: usize,
    alpha: usize,
    delta: usize,
    zeta: usize,
    ccfr: usize,
    initial_exposed_fr: usize,
    initial_unreported_fr: usize,
}

impl CompartmentDynamics for AuquanSeir {
    const NAME: &'static str = "auquan_seir";

    fn default_parameter_config() -> ParameterConfig {
        ParameterConfig::builtin(vec![
            Parameter::new("beta1", "Infection rate from unreported cases", 0.05, 0.25).policy_dependent(),
            Parameter::new("beta2", "Infection rate from reported cases", 0.01, 0.2).policy_dependent(),
            Parameter::new("alpha", "Rate at which exposed cases are reported", 0.0001, 0.2).policy_dependent(),
            Parameter::new("delta", "Death rate of fatal reported cases", 1.0 / 21.0, 1.0 / 10.0),
            Parameter::new("zeta", "Recovery rate of reported cases", 1.0 / 25.0, 1.0 / 14.0),
            Parameter::new("ccfr", "Confirmed case fatality rate", 0.03, 0.15),
            Parameter::new(
                INITIAL_EXPOSED_FR,
                "Initial fraction of the unreported population that has been exposed",
                0.0,
                2.0 / 3.0,
            ),
            Parameter::new(
                INITIAL_UNREPORTED_FR,
                "Initial fraction of the remaining population that is infectious but unreported",
                0.0,
                2.0 / 3.0,
            ),
        ])
    }

    fn bind(config: &ParameterConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            beta1: config.index_of("beta1")?,
            beta2: config.index_of("beta2")?,
            alpha: config.index_of("alpha")?,
            delta: config.index_of("delta")?,
            zeta: config.index_of("zeta")?,
            ccfr: config.index_of("ccfr")?,
            initial_exposed_fr: config.index_of(INITIAL_EXPOSED_FR)?,
            initial_unreported_fr: config.index_of(INITIAL_UNREPORTED_FR)?,
        })
    }

    fn compartments(&self) -> usize {
        7
    }

    fn derivatives(&self, state: &[f64], p: &[f64], out: &mut [f64]) {
        let (s, e, iu, ir) = (state[0], state[1], state[2], state[3]);
        let n: f64 = state.iter().sum();
        let (beta1, beta2, alpha) = (p[self.beta1], p[self.beta2], p[self.alpha]);
        let (delta, zeta, ccfr) = (p[self.delta], p[self.zeta], p[self.ccfr]);
        let infections = if n > 0.0 { (beta1 * iu + beta2 * ir) * s / n } else { 0.0 };
        let unreported = (1.0 / INCUBATION_DAYS - alpha).max(0.0);
        let fatal = delta * ccfr * ir;
        let cured = zeta * (1.0 - ccfr) * ir;

        out[0] = -infections;
        out[1] = infections - (alpha + unreported) * e;
        out[2] = unreported * e - ETA * iu;
        out[3] = alpha * e - fatal - cured;
        out[4] = fatal;
        out[5] = cured;
        out[6] = ETA * iu;
    }

    /// Observations without an unreported count get a lower bound on
    /// recoveries, and a seed of unreported recoveries. A point produced by
    /// this model carries both hidden counts and is resumed as is; its
    /// unreported recoveries are not part of the output and restart at zero.
    fn initial_state(&self, population: &PopulationData, last: &HealthPoint, params: &[f64]) -> Vec<f64> {
        let resumed = last.unreported_cases.is_some();
        let recovered = if resumed {
            last.recovered
        } else {
            last.recovered.max(MIN_RECOVERED_SHARE * last.confirmed_cases)
        };
        let deaths = last.deaths;
        let reported = (last.confirmed_cases - recovered - deaths).max(0.0);
        let pool = (population.population_size - reported - recovered - deaths).max(0.0);

        let exposed = last
            .exposed_cases
            .unwrap_or_else(|| pool * params[self.initial_exposed_fr]);
        let unreported = last
            .unreported_cases
            .unwrap_or_else(|| (pool - exposed).max(0.0) * params[self.initial_unreported_fr]);
        let unreported_recovered = if resumed {
            0.0
        } else {
            UNREPORTED_RECOVERED_SHARE * unreported
        };
        let susceptible = (pool - exposed - unreported - unreported_recovered).max(0.0);

        vec![
            susceptible,
            exposed,
            unreported,
            reported,
            deaths,
            recovered,
            unreported_recovered,
        ]
    }

    fn format_output(&self, series: Vec<Vec<f64>>) -> HealthData {
        let mut series = series.into_iter().skip(1);
        let mut next = || series.next().unwrap_or_default();
        let exposed = next();
        let unreported = next();
        let reported = next();
        let deaths = next();
        let recovered = next();
        let confirmed = reported
            .iter()
            .zip(&recovered)
            .zip(&deaths)
            .map(|((i, r), d)| i + r + d)
            .collect();
        HealthData::from_series(confirmed, recovered, deaths, Some(exposed), Some(unreported))
    }

    /// Keeps the last segment's initial fractions for seeding forecasts.
    fn finalize_general(&self, general: &mut ParamMap, segments: &[SegmentFit]) {
        let Some(last) = segments.last() else {
            return;
        };
        for name in [INITIAL_EXPOSED_FR, INITIAL_UNREPORTED_FR] {
            if let Some(value) = last.params.get(name) {
                general.insert(name.to_string(), *value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::compartment::CompartmentEngine;
    use crate::policy::PolicyVector;

    fn auquan() -> AuquanSeir {
        AuquanSeir::bind(&AuquanSeir::default_parameter_config()).unwrap()
    }

    // beta1, beta2, alpha, delta, zeta, ccfr, initial_exposed_fr, initial_unreported_fr
    const PARAMS: [f64; 8] = [0.2, 0.1, 0.05, 0.1, 0.05, 0.1, 0.01, 0.01];

    fn point(confirmed: f64, recovered: f64, deaths: f64) -> HealthPoint {
        HealthPoint {
            confirmed_cases: confirmed,
            recovered,
            deaths,
            exposed_cases: None,
            unreported_cases: None,
        }
    }

    fn engine() -> CompartmentEngine<AuquanSeir> {
        let mut engine = CompartmentEngine::<AuquanSeir>::new().unwrap();
        engine.set_param_values(&PARAMS).unwrap();
        engine
    }

    #[test]
    fn test_initial_state_from_observation() {
        let state = auquan().initial_state(&PopulationData::new(10_100.0, 70.0), &point(100.0, 0.0, 0.0), &PARAMS);
        // 10% of confirmed assumed recovered; the rest are reported infectious.
        assert_eq!(state[5], 10.0);
        assert_eq!(state[3], 90.0);
        assert_eq!(state[1], 100.0);
        assert!((state[2] - 99.0).abs() < 1e-9);
        assert!((state[6] - 9.9).abs() < 1e-9);
        assert!((state.iter().sum::<f64>() - 10_100.0).abs() < 1e-9);
    }

    #[test]
    fn test_initial_state_resumes_hidden_counts() {
        let last = HealthPoint {
            exposed_cases: Some(40.0),
            unreported_cases: Some(25.0),
            ..point(100.0, 5.0, 1.0)
        };
        let state = auquan().initial_state(&PopulationData::new(1_000.0, 70.0), &last, &PARAMS);
        assert_eq!(state[1], 40.0);
        assert_eq!(state[2], 25.0);
        assert_eq!(state[3], 94.0);
        assert_eq!(state[5], 5.0);
        assert_eq!(state[6], 0.0);
    }

    #[test]
    fn test_derivatives_conserve_population() {
        let state = [900.0, 40.0, 20.0, 30.0, 2.0, 5.0, 3.0];
        let mut out = [0.0; 7];
        auquan().derivatives(&state, &PARAMS, &mut out);
        assert!(out.iter().sum::<f64>().abs() < 1e-9);
        assert!(out[0] < 0.0);
        assert!(out[4] > 0.0);
    }

    #[test]
    fn test_predict_with_no_cases() {
        let mut engine = engine();
        engine
            .set_param_values(&[0.2, 0.1, 0.05, 0.1, 0.05, 0.1, 0.0, 0.0])
            .unwrap();
        let health = HealthData::new(vec![0.0], vec![0.0], vec![0.0]).unwrap();
        let forecast = engine
            .predict_with_params(&PopulationData::new(1e6, 70.0), &health, 10, engine.params())
            .unwrap();
        assert_eq!(forecast.len(), 10);
        assert!(forecast.confirmed_cases().iter().all(|&v| v == 0.0));
        assert!(forecast.unreported_cases().unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_forecast_reports_unreported_cases() {
        let engine = engine();
        let health = HealthData::new(vec![100.0], vec![0.0], vec![0.0]).unwrap();
        let forecast = engine
            .predict_with_params(&PopulationData::new(1e6, 70.0), &health, 30, engine.params())
            .unwrap();
        assert_eq!(forecast.len(), 30);
        assert_eq!(forecast.unreported_cases().map(<[f64]>::len), Some(30));
        assert_eq!(forecast.exposed_cases().map(<[f64]>::len), Some(30));
        assert!(forecast.unreported_cases().unwrap()[29] > 0.0);

        // Confirmed counts are cumulative, so never decrease.
        let confirmed = forecast.confirmed_cases();
        assert!(confirmed.windows(2).all(|w| w[1] >= w[0] - 1e-6));
        for day in 0..30 {
            assert!(confirmed[day] >= forecast.recovered()[day] + forecast.deaths()[day]);
        }
    }

    #[test]
    fn test_finalize_keeps_last_initial_fractions() {
        let segment = |fr: f64| SegmentFit {
            policy: PolicyVector::default(),
            days: 10,
            params: ParamMap::from([
                (INITIAL_EXPOSED_FR.to_string(), fr),
                (INITIAL_UNREPORTED_FR.to_string(), fr / 2.0),
            ]),
        };
        let mut general = ParamMap::new();
        auquan().finalize_general(&mut general, &[segment(0.1), segment(0.3)]);
        assert_eq!(general[INITIAL_EXPOSED_FR], 0.3);
        assert_eq!(general[INITIAL_UNREPORTED_FR], 0.15);
    }
}
