//! Compartment-model fit/predict engine.
//!
//! A concrete model supplies its equations through `CompartmentDynamics`;
//! `CompartmentEngine` does everything else. Fitting runs one bounded global
//! optimization per policy segment and aggregates the converged segments into
//! a `FittedModelState`. Prediction replays the equations through a future
//! timeline, one segment at a time, each segment starting from where the
//! previous one ended.

use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigError, FitError, OdeError, PlannerResult, PredictError};
use crate::health::{HealthData, HealthPoint, PopulationData};
use crate::mapper::ParameterMapper;
use crate::ode::{by_compartment, solve_ivp, IntegratorConfig};
use crate::optimize::{GlobalOptimizer, ParticleSwarmOptimizer};
use crate::parameter::{ParamMap, ParameterConfig};
use crate::policy::{PolicyTimeline, PolicyVector};

use super::state::{aggregate, ExcludedSegment, FitReport, FittedModelState, SegmentFit, SegmentSummary};

/// Equations and state mapping of a concrete compartment model.
///
/// Implementations resolve parameter positions once in `bind`, so the hot
/// derivative path works on flat parameter slices.
pub trait CompartmentDynamics: fmt::Debug + Send + Sync + Sized {
    /// Model name used in logs, reports and persistence keys.
    const NAME: &'static str;

    /// Parameters used when none are supplied.
    fn default_parameter_config() -> ParameterConfig;

    /// Binds the dynamics to a parameter layout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownParameter` if a parameter the equations
    /// need is not declared.
    fn bind(config: &ParameterConfig) -> Result<Self, ConfigError>;

    /// Number of compartments in the state vector.
    fn compartments(&self) -> usize;

    /// Writes `d(state)/dt` into `out`.
    fn derivatives(&self, state: &[f64], params: &[f64], out: &mut [f64]);

    /// Initial state from the last observed health point.
    fn initial_state(&self, population: &PopulationData, last: &HealthPoint, params: &[f64]) -> Vec<f64>;

    /// Converts per-compartment series into health output.
    fn format_output(&self, series: Vec<Vec<f64>>) -> HealthData;

    /// Adjusts aggregated general parameters after fitting.
    fn finalize_general(&self, _general: &mut ParamMap, _segments: &[SegmentFit]) {}
}

/// Fit/predict pipeline over one set of dynamics.
pub struct CompartmentEngine<D: CompartmentDynamics> {
    dynamics: D,
    parameter_config: ParameterConfig,
    optimizer: Arc<dyn GlobalOptimizer>,
    integrator: IntegratorConfig,
    mapper: Option<Arc<ParameterMapper>>,
    state: FittedModelState,
}

impl<D: CompartmentDynamics> fmt::Debug for CompartmentEngine<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompartmentEngine")
            .field("model", &D::NAME)
            .field("parameter_config", &self.parameter_config)
            .field("integrator", &self.integrator)
            .field("mapper", &self.mapper.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<D: CompartmentDynamics> CompartmentEngine<D> {
    /// Creates an engine with the model's default parameters.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the default parameters cannot be bound.
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_parameter_config(D::default_parameter_config())
    }

    /// Creates an engine with a custom parameter layout.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownParameter` if the layout misses a
    /// parameter the equations need.
    pub fn with_parameter_config(parameter_config: ParameterConfig) -> Result<Self, ConfigError> {
        let dynamics = D::bind(&parameter_config)?;
        Ok(Self {
            dynamics,
            parameter_config,
            optimizer: Arc::new(ParticleSwarmOptimizer::default()),
            integrator: IntegratorConfig::default(),
            mapper: None,
            state: FittedModelState::default(),
        })
    }

    /// Replaces the fitting optimizer.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Arc<dyn GlobalOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Replaces the integrator settings.
    #[must_use]
    pub fn with_integrator(mut self, integrator: IntegratorConfig) -> Self {
        self.integrator = integrator;
        self
    }

    /// Attaches a mapper for unseen policies.
    #[must_use]
    pub fn with_mapper(mut self, mapper: Arc<ParameterMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Attaches a mapper in place.
    pub fn attach_mapper(&mut self, mapper: Arc<ParameterMapper>) {
        self.mapper = Some(mapper);
    }

    /// Model name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        D::NAME
    }

    /// Bound dynamics.
    #[must_use]
    pub const fn dynamics(&self) -> &D {
        &self.dynamics
    }

    /// Declared parameters.
    #[must_use]
    pub const fn parameter_config(&self) -> &ParameterConfig {
        &self.parameter_config
    }

    /// Integrator settings.
    #[must_use]
    pub const fn integrator(&self) -> &IntegratorConfig {
        &self.integrator
    }

    /// Fitted state.
    #[must_use]
    pub const fn state(&self) -> &FittedModelState {
        &self.state
    }

    /// Replaces the fitted state, e.g. with one loaded from elsewhere.
    pub fn set_state(&mut self, state: FittedModelState) {
        self.state = state;
    }

    /// Current general parameters.
    #[must_use]
    pub fn params(&self) -> &ParamMap {
        &self.state.general
    }

    /// Sets general parameters by name. Discounts are kept.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownParameter` for undeclared names.
    pub fn set_params(&mut self, params: ParamMap) -> Result<(), ConfigError> {
        self.parameter_config.check_known(&params)?;
        self.state.general = params;
        Ok(())
    }

    /// Sets general parameters from a vector in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParameterCountMismatch` if the length is wrong.
    pub fn set_param_values(&mut self, values: &[f64]) -> Result<(), ConfigError> {
        self.state.general = self.parameter_config.parse(values)?;
        Ok(())
    }

    /// Records the discount ratios to apply under `policy`.
    pub fn set_discounts(&mut self, policy: PolicyVector, discounts: ParamMap) {
        self.state.discounts.insert(policy, discounts);
    }

    /// Fits one parameter set per policy segment and aggregates them.
    ///
    /// Segments with fewer than two observations, or whose optimizer does not
    /// converge, are excluded and listed in the report.
    ///
    /// # Errors
    ///
    /// Returns `FitError::NoSegmentConverged` if every segment was excluded,
    /// `HealthDataError::MissingIndex` if `health` has no dates, and
    /// `OptimizeError` if the optimizer rejects the parameter bounds.
    #[tracing::instrument(
        name = "model.fit",
        target = "fit",
        skip_all,
        fields(model = D::NAME, segments = timeline.applications().len())
    )]
    pub fn fit(
        &mut self,
        population: &PopulationData,
        health: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<FitReport> {
        let bounds = self.parameter_config.bounds();
        let open_days = timeline.open_ended_days();
        let mut segments = Vec::new();
        let mut fitted = Vec::new();
        let mut excluded = Vec::new();

        for application in timeline.applications() {
            let window = health.slice_dates(application.start, Some(application.end_date_with(open_days)))?;
            let exclude = |reason: String| {
                tracing::warn!(
                    target: "fit",
                    model = D::NAME,
                    start = %application.start,
                    policy = %application.policy,
                    reason = %reason,
                    "segment_excluded"
                );
                ExcludedSegment {
                    policy: application.policy,
                    start: application.start,
                    end: application.end,
                    reason,
                }
            };

            if window.len() < 2 {
                excluded.push(exclude(format!("{} observation(s), at least 2 needed", window.len())));
                continue;
            }

            tracing::debug!(
                target: "fit",
                model = D::NAME,
                start = %application.start,
                observations = window.len(),
                "segment_fit_started"
            );
            let objective = |values: &[f64]| self.residual(values, population, &window);
            let result = self.optimizer.minimize(&objective, &bounds)?;

            if !result.success || !result.fun.is_finite() {
                excluded.push(exclude(result.message));
                continue;
            }

            let params = self.parameter_config.parse(&result.x)?;
            tracing::debug!(
                target: "fit",
                model = D::NAME,
                start = %application.start,
                residual = result.fun,
                iterations = result.iterations,
                "segment_converged"
            );
            fitted.push(SegmentSummary {
                policy: application.policy,
                start: application.start,
                end: application.end,
                observations: window.len(),
                residual: result.fun,
                iterations: result.iterations,
            });
            segments.push(SegmentFit {
                policy: application.policy,
                days: application.len_days_with(open_days),
                params,
            });
        }

        if segments.is_empty() {
            return Err(FitError::NoSegmentConverged {
                attempted: timeline.applications().len(),
            }
            .into());
        }

        let mut state = aggregate(&self.parameter_config, &segments);
        self.dynamics.finalize_general(&mut state.general, &segments);
        tracing::info!(
            target: "fit",
            model = D::NAME,
            converged = segments.len(),
            excluded = excluded.len(),
            policies = state.discounts.len(),
            "fit_complete"
        );
        self.state = state;

        Ok(FitReport {
            model: D::NAME.to_string(),
            fitted,
            excluded,
        })
    }

    /// Sum of mean squared errors of confirmed, recovered and deaths when
    /// forecasting `health[1..]` from `health[0]` with `values`.
    ///
    /// A candidate whose integration fails scores `+inf`.
    #[must_use]
    pub fn residual(&self, values: &[f64], population: &PopulationData, health: &HealthData) -> f64 {
        let Some(first) = health.point(0) else {
            return f64::INFINITY;
        };
        let horizon = health.len() - 1;
        let Ok(predicted) = self.simulate(population, &first, horizon, values) else {
            return f64::INFINITY;
        };
        let observed = health.slice(1..health.len());
        mean_squared_error(predicted.confirmed_cases(), observed.confirmed_cases())
            + mean_squared_error(predicted.recovered(), observed.recovered())
            + mean_squared_error(predicted.deaths(), observed.deaths())
    }

    /// Forecasts through `timeline`, starting from the end of `past`.
    ///
    /// Returns one row per day of the timeline, indexed from its start.
    /// Nothing is returned unless every segment integrates.
    ///
    /// # Errors
    ///
    /// Returns `PredictError::MissingParameters` before fitting,
    /// `PredictError::NoDiscountForPolicy` for an unseen policy with no
    /// mapper attached, and `PredictError::Integration` on numerical failure.
    #[tracing::instrument(
        name = "model.predict",
        target = "predict",
        skip_all,
        fields(model = D::NAME, days = timeline.len_days())
    )]
    pub fn predict(
        &self,
        population: &PopulationData,
        past: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<HealthData> {
        self.check_params(&self.state.general)?;
        let start = timeline.start()?;
        let mut current = past.last().ok_or(PredictError::EmptyHistory)?;
        let open_days = timeline.open_ended_days();

        let mut segments = Vec::with_capacity(timeline.applications().len());
        for application in timeline.applications() {
            let days = application.len_days_with(open_days);
            if days <= 0 {
                continue;
            }
            let params = self.resolve_params(&application.policy)?;
            let values = self.parameter_config.flatten(&params)?;
            tracing::debug!(
                target: "predict",
                model = D::NAME,
                start = %application.start,
                days,
                "segment_integrate"
            );
            let segment = self.simulate(population, &current, days as usize, &values)?;
            if let Some(last) = segment.last() {
                current = last;
            }
            segments.push(segment);
        }

        if segments.is_empty() {
            return Ok(HealthData::empty().with_start(start));
        }
        let output = HealthData::concatenate(&segments)?;
        Ok(output.with_start(start))
    }

    /// Forecasts `horizon` days after the end of `past` with explicit parameters.
    ///
    /// # Errors
    ///
    /// Returns `PredictError::MissingParameters` if `params` is incomplete,
    /// `PredictError::EmptyHistory` for empty `past`, and
    /// `PredictError::Integration` on numerical failure.
    pub fn predict_with_params(
        &self,
        population: &PopulationData,
        past: &HealthData,
        horizon: usize,
        params: &ParamMap,
    ) -> Result<HealthData, PredictError> {
        self.check_params(params)?;
        let last = past.last().ok_or(PredictError::EmptyHistory)?;
        let values = self.parameter_config.flatten(params).map_err(|_| PredictError::MissingParameters {
            missing: self.parameter_config.missing(params),
        })?;
        Ok(self.simulate(population, &last, horizon, &values)?)
    }

    /// General parameters with the discounts for `policy` applied.
    ///
    /// # Errors
    ///
    /// Returns `PredictError::NoDiscountForPolicy` if the policy was not seen
    /// during fitting and no mapper is attached, or a mapper error.
    pub fn resolve_params(&self, policy: &PolicyVector) -> PlannerResult<ParamMap> {
        let discounts = match (self.state.discounts.get(policy), &self.mapper) {
            (Some(known), _) => known.clone(),
            (None, Some(mapper)) => mapper.get(policy)?,
            (None, None) => {
                return Err(PredictError::NoDiscountForPolicy {
                    policy: policy.to_string(),
                }
                .into())
            }
        };

        let mut params = self.state.general.clone();
        for (name, ratio) in discounts {
            if let Some(value) = params.get_mut(&name) {
                *value *= ratio;
            }
        }
        Ok(params)
    }

    fn check_params(&self, params: &ParamMap) -> Result<(), PredictError> {
        let missing = self.parameter_config.missing(params);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PredictError::MissingParameters { missing })
        }
    }

    /// Integrates `horizon` days from `last`, sampling days `1..=horizon`.
    fn simulate(
        &self,
        population: &PopulationData,
        last: &HealthPoint,
        horizon: usize,
        values: &[f64],
    ) -> Result<HealthData, OdeError> {
        let y0 = self.dynamics.initial_state(population, last, values);
        let t_eval: Vec<f64> = (1..=horizon).map(|day| day as f64).collect();
        let states = solve_ivp(
            |_, y, dy| self.dynamics.derivatives(y, values, dy),
            &y0,
            &t_eval,
            &self.integrator,
        )?;
        Ok(self
            .dynamics
            .format_output(by_compartment(&states, self.dynamics.compartments())))
    }
}

impl<D: CompartmentDynamics> Clone for CompartmentEngine<D>
where
    D: Clone,
{
    fn clone(&self) -> Self {
        Self {
            dynamics: self.dynamics.clone(),
            parameter_config: self.parameter_config.clone(),
            optimizer: Arc::clone(&self.optimizer),
            integrator: self.integrator.clone(),
            mapper: self.mapper.clone(),
            state: self.state.clone(),
        }
    }
}

fn mean_squared_error(predicted: &[f64], observed: &[f64]) -> f64 {
    if observed.is_empty() {
        return 0.0;
    }
    let sum: f64 = predicted
        .iter()
        .zip(observed)
        .map(|(p, o)| (p - o).powi(2))
        .sum();
    sum / observed.len() as f64
}
