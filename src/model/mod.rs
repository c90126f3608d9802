//! Disease models.
//!
//! The variants form a closed set behind `HealthModel`: `DiseaseModel`
//! dispatches to a SIR, SEIR or reported/unreported SEIR
//! `CompartmentEngine`, or to an `Ensemble` of other models.

pub mod auquan;
pub mod compartment;
pub mod ensemble;
pub mod seir;
pub mod sir;
pub mod state;

use std::sync::Arc;

use crate::config::PlannerConfig;
use crate::error::{ConfigError, PlannerResult};
use crate::health::{HealthData, PopulationData};
use crate::mapper::ParameterMapper;
use crate::optimize::ParticleSwarmOptimizer;
use crate::policy::PolicyTimeline;

pub use auquan::AuquanSeir;
pub use compartment::{CompartmentDynamics, CompartmentEngine};
pub use ensemble::Ensemble;
pub use seir::Seir;
pub use sir::Sir;
pub use state::{DiscountTable, ExcludedSegment, FitReport, FittedModelState, SegmentSummary};

/// Fit/predict capability shared by every disease model.
pub trait HealthModel {
    /// Name used in logs and reports.
    fn name(&self) -> &str;

    /// Learns parameters from observed health data under `timeline`.
    ///
    /// # Errors
    ///
    /// Returns `PlannerError` if no segment could be fitted or the inputs are
    /// inconsistent.
    fn fit(
        &mut self,
        population: &PopulationData,
        health: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<Vec<FitReport>>;

    /// Forecasts one value per day of `timeline`, continuing from `past`.
    ///
    /// # Errors
    ///
    /// Returns `PlannerError` if the model is not fitted or integration fails.
    fn predict(
        &self,
        population: &PopulationData,
        past: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<HealthData>;
}

impl<D: CompartmentDynamics> HealthModel for CompartmentEngine<D> {
    fn name(&self) -> &str {
        D::NAME
    }

    fn fit(
        &mut self,
        population: &PopulationData,
        health: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<Vec<FitReport>> {
        Ok(vec![Self::fit(self, population, health, timeline)?])
    }

    fn predict(
        &self,
        population: &PopulationData,
        past: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<HealthData> {
        Self::predict(self, population, past, timeline)
    }
}

/// A disease model variant.
#[derive(Debug)]
pub enum DiseaseModel {
    /// Susceptible, infectious, recovered, dead.
    Sir(CompartmentEngine<Sir>),
    /// SIR with an exposed compartment.
    Seir(CompartmentEngine<Seir>),
    /// SEIR with reported and unreported infections.
    AuquanSeir(CompartmentEngine<AuquanSeir>),
    /// Mean of several models.
    Ensemble(Ensemble),
}

impl DiseaseModel {
    /// SIR with default parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the default parameters cannot be bound.
    pub fn sir() -> Result<Self, ConfigError> {
        Ok(Self::Sir(CompartmentEngine::new()?))
    }

    /// SEIR with default parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the default parameters cannot be bound.
    pub fn seir() -> Result<Self, ConfigError> {
        Ok(Self::Seir(CompartmentEngine::new()?))
    }

    /// Reported/unreported SEIR with default parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the default parameters cannot be bound.
    pub fn auquan_seir() -> Result<Self, ConfigError> {
        Ok(Self::AuquanSeir(CompartmentEngine::new()?))
    }

    /// Applies the optimizer and integrator settings of `config`.
    #[must_use]
    pub fn configured(self, config: &PlannerConfig) -> Self {
        let optimizer = Arc::new(ParticleSwarmOptimizer::new(config.optimizer.clone()));
        match self {
            Self::Sir(engine) => Self::Sir(
                engine
                    .with_optimizer(optimizer)
                    .with_integrator(config.integrator.clone()),
            ),
            Self::Seir(engine) => Self::Seir(
                engine
                    .with_optimizer(optimizer)
                    .with_integrator(config.integrator.clone()),
            ),
            Self::AuquanSeir(engine) => Self::AuquanSeir(
                engine
                    .with_optimizer(optimizer)
                    .with_integrator(config.integrator.clone()),
            ),
            Self::Ensemble(ensemble) => Self::Ensemble(Ensemble::new(
                ensemble
                    .into_members()
                    .into_iter()
                    .map(|m| m.configured(config))
                    .collect(),
            )),
        }
    }

    /// Fitted states of every compartment model, depth first.
    #[must_use]
    pub fn fitted_states(&self) -> Vec<&FittedModelState> {
        match self {
            Self::Sir(engine) => vec![engine.state()],
            Self::Seir(engine) => vec![engine.state()],
            Self::AuquanSeir(engine) => vec![engine.state()],
            Self::Ensemble(ensemble) => ensemble.members().iter().flat_map(Self::fitted_states).collect(),
        }
    }

    /// Attaches `mapper` to every compartment model.
    pub fn attach_mapper(&mut self, mapper: &Arc<ParameterMapper>) {
        match self {
            Self::Sir(engine) => engine.attach_mapper(Arc::clone(mapper)),
            Self::Seir(engine) => engine.attach_mapper(Arc::clone(mapper)),
            Self::AuquanSeir(engine) => engine.attach_mapper(Arc::clone(mapper)),
            Self::Ensemble(ensemble) => {
                for member in ensemble.members_mut() {
                    member.attach_mapper(mapper);
                }
            }
        }
    }
}

impl HealthModel for DiseaseModel {
    fn name(&self) -> &str {
        match self {
            Self::Sir(engine) => HealthModel::name(engine),
            Self::Seir(engine) => HealthModel::name(engine),
            Self::AuquanSeir(engine) => HealthModel::name(engine),
            Self::Ensemble(ensemble) => ensemble.name(),
        }
    }

    fn fit(
        &mut self,
        population: &PopulationData,
        health: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<Vec<FitReport>> {
        match self {
            Self::Sir(engine) => HealthModel::fit(engine, population, health, timeline),
            Self::Seir(engine) => HealthModel::fit(engine, population, health, timeline),
            Self::AuquanSeir(engine) => HealthModel::fit(engine, population, health, timeline),
            Self::Ensemble(ensemble) => ensemble.fit(population, health, timeline),
        }
    }

    fn predict(
        &self,
        population: &PopulationData,
        past: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<HealthData> {
        match self {
            Self::Sir(engine) => engine.predict(population, past, timeline),
            Self::Seir(engine) => engine.predict(population, past, timeline),
            Self::AuquanSeir(engine) => engine.predict(population, past, timeline),
            Self::Ensemble(ensemble) => ensemble.predict(population, past, timeline),
        }
    }
}

impl From<Ensemble> for DiseaseModel {
    fn from(ensemble: Ensemble) -> Self {
        Self::Ensemble(ensemble)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::error::{PlannerError, PredictError};
    use crate::parameter::ParamMap;
    use crate::policy::{Dial, PolicyVector};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sir(beta: f64) -> CompartmentEngine<Sir> {
        let mut engine = CompartmentEngine::<Sir>::new().unwrap();
        engine.set_param_values(&[beta, 0.1, 0.0, 0.0, 0.1, 0.01]).unwrap();
        engine.set_discounts(PolicyVector::default(), ParamMap::from([("beta".to_string(), 1.0)]));
        engine
    }

    fn past() -> HealthData {
        HealthData::new(vec![100.0], vec![0.0], vec![0.0]).unwrap()
    }

    fn population() -> PopulationData {
        PopulationData::new(1e6, 70.0)
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = DiseaseModel::sir().unwrap();
        let timeline = PolicyTimeline::constant(PolicyVector::default(), date(2020, 3, 1), 10);
        let err = model.predict(&population(), &past(), &timeline).unwrap_err();
        assert!(matches!(err, PlannerError::Predict(PredictError::MissingParameters { .. })));
        assert!(err.to_string().contains("beta"));
    }

    #[test]
    fn test_predict_is_indexed_by_timeline() {
        let model = DiseaseModel::Sir(sir(0.5));
        let timeline = PolicyTimeline::constant(PolicyVector::default(), date(2020, 3, 1), 10);
        let forecast = model.predict(&population(), &past(), &timeline).unwrap();
        assert_eq!(forecast.len(), 10);
        assert_eq!(forecast.start(), Some(date(2020, 3, 1)));
    }

    #[test]
    fn test_discount_scales_policy_dependent_parameter() {
        let mut engine = sir(0.5);
        let strict = PolicyVector::from_pairs([(Dial::Curfew, 1.0)]).unwrap();
        engine.set_discounts(strict, ParamMap::from([("beta".to_string(), 0.2)]));
        let params = engine.resolve_params(&strict).unwrap();
        assert!((params["beta"] - 0.1).abs() < 1e-12);
        assert_eq!(params["gamma"], 0.1);
    }

    #[test]
    fn test_unseen_policy_without_mapper_fails() {
        let engine = sir(0.5);
        let unseen = PolicyVector::from_pairs([(Dial::Mining, 0.5)]).unwrap();
        assert!(matches!(
            engine.resolve_params(&unseen),
            Err(PlannerError::Predict(PredictError::NoDiscountForPolicy { .. }))
        ));
    }

    #[test]
    fn test_segments_chain_state() {
        let engine = sir(0.5);
        let relaxed = PolicyVector::default();
        let whole = PolicyTimeline::constant(relaxed, date(2020, 3, 1), 20);
        let split = PolicyTimeline::builder(date(2020, 3, 1))
            .then(relaxed, 8)
            .then(relaxed, 12)
            .build();
        let a = engine.predict(&population(), &past(), &whole).unwrap();
        let b = engine.predict(&population(), &past(), &split).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.confirmed_cases().iter().zip(b.confirmed_cases()) {
            assert!((x - y).abs() <= 1e-2 * x.abs().max(1.0), "{x} vs {y}");
        }
    }

    #[test]
    fn test_ensemble_averages_members() {
        let first = sir(0.3);
        let second = sir(0.6);
        let timeline = PolicyTimeline::constant(PolicyVector::default(), date(2020, 3, 1), 5);
        let a = first.predict(&population(), &past(), &timeline).unwrap();
        let b = second.predict(&population(), &past(), &timeline).unwrap();

        let ensemble = DiseaseModel::from(Ensemble::new(vec![DiseaseModel::Sir(first), DiseaseModel::Sir(second)]));
        let mean = ensemble.predict(&population(), &past(), &timeline).unwrap();
        for day in 0..5 {
            let expected = (a.confirmed_cases()[day] + b.confirmed_cases()[day]) / 2.0;
            assert!((mean.confirmed_cases()[day] - expected).abs() < 1e-9);
        }
        assert_eq!(mean.start(), Some(date(2020, 3, 1)));
        assert_eq!(ensemble.fitted_states().len(), 2);
    }

    #[test]
    fn test_ensemble_drops_optional_components() {
        let mut seir = CompartmentEngine::<Seir>::new().unwrap();
        seir.set_param_values(&[0.5, 0.1, 0.2, 0.0, 0.0, 0.1, 0.01, 0.001]).unwrap();
        seir.set_discounts(PolicyVector::default(), ParamMap::from([("beta".to_string(), 1.0)]));
        let ensemble = Ensemble::new(vec![DiseaseModel::Sir(sir(0.5)), DiseaseModel::Seir(seir)]);
        let timeline = PolicyTimeline::constant(PolicyVector::default(), date(2020, 3, 1), 3);
        let mean = ensemble.predict(&population(), &past(), &timeline).unwrap();
        assert!(mean.exposed_cases().is_none());
    }

    #[test]
    fn test_auquan_variant_dispatches() {
        let mut engine = CompartmentEngine::<AuquanSeir>::new().unwrap();
        engine
            .set_param_values(&[0.2, 0.1, 0.05, 0.1, 0.05, 0.1, 0.01, 0.01])
            .unwrap();
        engine.set_discounts(
            PolicyVector::default(),
            ParamMap::from([
                ("beta1".to_string(), 1.0),
                ("beta2".to_string(), 1.0),
                ("alpha".to_string(), 1.0),
            ]),
        );
        let model = DiseaseModel::AuquanSeir(engine);
        assert_eq!(model.name(), "auquan_seir");
        assert_eq!(model.fitted_states().len(), 1);

        let timeline = PolicyTimeline::constant(PolicyVector::default(), date(2020, 3, 1), 14);
        let forecast = model.predict(&population(), &past(), &timeline).unwrap();
        assert_eq!(forecast.len(), 14);
        assert_eq!(forecast.unreported_cases().map(<[f64]>::len), Some(14));
    }
}
