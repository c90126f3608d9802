//! Policy search.
//!
//! A `PolicySearch` proposes policy timelines, scores each with a health
//! forecast, an economic run and a loss function, and keeps the Pareto
//! frontier of what it has seen.

pub mod exhaustive;
pub mod random;
pub mod space;

use std::sync::Mutex;
use std::thread;

use crossbeam_channel::bounded;

use crate::economy::{run_economy, EconomicModel};
use crate::error::{OptimizeError, PlannerResult};
use crate::frontier::{ParetoFrontier, SearchResult};
use crate::health::{HealthData, PopulationData};
use crate::loss::{Loss, LossFunction};
use crate::model::HealthModel;
use crate::policy::PolicyTimeline;

pub use exhaustive::ExhaustiveSearch;
pub use random::RandomSearch;
pub use space::{DialSpace, LockdownConfig};

/// Forecast of health outcomes under a proposed timeline.
pub trait HealthOutcomeModel: Send + Sync {
    /// # Errors
    ///
    /// Returns `PlannerError` if the forecast cannot be produced.
    fn forecast(&self, timeline: &PolicyTimeline) -> PlannerResult<HealthData>;
}

impl<F> HealthOutcomeModel for F
where
    F: Fn(&PolicyTimeline) -> PlannerResult<HealthData> + Send + Sync,
{
    fn forecast(&self, timeline: &PolicyTimeline) -> PlannerResult<HealthData> {
        self(timeline)
    }
}

/// A fitted `HealthModel` forecasting forward from observed data.
#[derive(Debug, Clone, Copy)]
pub struct Forecaster<'a, M> {
    model: &'a M,
    population: &'a PopulationData,
    past: &'a HealthData,
}

impl<'a, M: HealthModel> Forecaster<'a, M> {
    /// Forecasts with `model` from the `past` observations.
    #[must_use]
    pub const fn new(model: &'a M, population: &'a PopulationData, past: &'a HealthData) -> Self {
        Self {
            model,
            population,
            past,
        }
    }
}

impl<M: HealthModel + Sync> HealthOutcomeModel for Forecaster<'_, M> {
    fn forecast(&self, timeline: &PolicyTimeline) -> PlannerResult<HealthData> {
        self.model.predict(self.population, self.past, timeline)
    }
}

fn evaluate(
    proposal: &PolicyTimeline,
    population: &PopulationData,
    health: &dyn HealthOutcomeModel,
    economic: &dyn EconomicModel,
    loss: &dyn LossFunction,
) -> PlannerResult<Loss> {
    let forecast = health.forecast(proposal)?;
    let output = run_economy(economic, proposal);
    Ok(loss.compute(population, &forecast, &output))
}

/// Propose/record loop over policy timelines.
pub trait PolicySearch {
    /// Next candidate, or `None` once the strategy is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `PlannerError::Config` if the search space cannot be sampled.
    fn propose(&mut self) -> PlannerResult<Option<PolicyTimeline>>;

    /// Notes the loss of an evaluated proposal.
    fn record(&mut self, proposal: PolicyTimeline, loss: Loss);

    /// Loss used to score proposals.
    fn loss(&self) -> &dyn LossFunction;

    /// Every recorded `(proposal, loss)` pair in evaluation order.
    fn history(&self) -> &[SearchResult<PolicyTimeline>];

    /// Runs until exhaustion or `n_steps` evaluations.
    ///
    /// # Errors
    ///
    /// Returns the first proposal or forecast failure.
    ///
    /// # Panics
    ///
    /// Panics if the loss function mixes loss kinds or arities.
    #[tracing::instrument(name = "search.optimize", target = "search", skip_all, fields(n_steps = ?n_steps))]
    fn optimize(
        &mut self,
        population: &PopulationData,
        health: &dyn HealthOutcomeModel,
        economic: &dyn EconomicModel,
        n_steps: Option<usize>,
    ) -> PlannerResult<ParetoFrontier<PolicyTimeline>> {
        let mut frontier = ParetoFrontier::new();
        let mut step = 0usize;
        while n_steps.map_or(true, |n| step < n) {
            let Some(proposal) = self.propose()? else {
                tracing::info!(target: "search", steps = step, "search_exhausted");
                break;
            };
            let loss = evaluate(&proposal, population, health, economic, self.loss())?;
            self.record(proposal.clone(), loss.clone());
            let added = frontier.update(SearchResult::new(proposal, loss));
            step += 1;
            tracing::debug!(target: "search", step, added, frontier = frontier.len(), "search_step");
        }
        Ok(frontier)
    }

    /// Like `optimize`, evaluating up to `workers` proposals at a time on
    /// worker threads. The frontier is updated under a lock; proposals are
    /// recorded in proposal order once their batch completes.
    ///
    /// # Errors
    ///
    /// Returns the first proposal or forecast failure, or
    /// `OptimizeError::WorkerSpawn` if a worker cannot be started.
    ///
    /// # Panics
    ///
    /// Panics if the loss function mixes loss kinds or arities.
    #[tracing::instrument(name = "search.optimize_concurrent", target = "search", skip_all, fields(n_steps = ?n_steps, workers = workers))]
    fn optimize_concurrent(
        &mut self,
        population: &PopulationData,
        health: &dyn HealthOutcomeModel,
        economic: &dyn EconomicModel,
        n_steps: Option<usize>,
        workers: usize,
    ) -> PlannerResult<ParetoFrontier<PolicyTimeline>> {
        let workers = workers.max(1);
        let frontier = Mutex::new(ParetoFrontier::new());
        let mut step = 0usize;
        let mut exhausted = false;

        while !exhausted && n_steps.map_or(true, |n| step < n) {
            let room = n_steps.map_or(workers, |n| workers.min(n - step));
            let mut batch = Vec::with_capacity(room);
            while batch.len() < room {
                match self.propose()? {
                    Some(proposal) => batch.push(proposal),
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }
            if batch.is_empty() {
                break;
            }

            let losses = evaluate_batch(&batch, population, health, economic, self.loss(), &frontier)?;
            step += batch.len();
            for (proposal, loss) in batch.into_iter().zip(losses) {
                self.record(proposal, loss);
            }
            tracing::debug!(target: "search", step, "search_batch");
        }
        if exhausted {
            tracing::info!(target: "search", steps = step, "search_exhausted");
        }
        Ok(frontier.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner))
    }
}

fn evaluate_batch(
    batch: &[PolicyTimeline],
    population: &PopulationData,
    health: &dyn HealthOutcomeModel,
    economic: &dyn EconomicModel,
    loss: &dyn LossFunction,
    frontier: &Mutex<ParetoFrontier<PolicyTimeline>>,
) -> PlannerResult<Vec<Loss>> {
    let (job_tx, job_rx) = bounded::<usize>(batch.len());
    let (result_tx, result_rx) = bounded::<(usize, PlannerResult<Loss>)>(batch.len());
    for idx in 0..batch.len() {
        job_tx.send(idx).map_err(|err| OptimizeError::WorkerSpawn {
            message: err.to_string(),
        })?;
    }
    drop(job_tx);

    thread::scope(|scope| {
        for worker in 0..batch.len() {
            let rx = job_rx.clone();
            let tx = result_tx.clone();
            thread::Builder::new()
                .name(format!("planner-search-{worker}"))
                .spawn_scoped(scope, move || {
                    while let Ok(idx) = rx.recv() {
                        let result = evaluate(&batch[idx], population, health, economic, loss);
                        if let Ok(loss) = &result {
                            let mut frontier = frontier.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                            frontier.update(SearchResult::new(batch[idx].clone(), loss.clone()));
                        }
                        let _ = tx.send((idx, result));
                    }
                })
                .map_err(|err| OptimizeError::WorkerSpawn {
                    message: err.to_string(),
                })?;
        }
        Ok::<(), OptimizeError>(())
    })?;
    drop(result_tx);

    let mut results: Vec<(usize, PlannerResult<Loss>)> = result_rx.try_iter().collect();
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, loss)| loss).collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::economy::SectorOutput;
    use crate::policy::{Dial, PolicyVector};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, 1).unwrap()
    }

    /// Opening up (curfew dial towards 1) raises deaths.
    fn health() -> impl HealthOutcomeModel {
        |timeline: &PolicyTimeline| -> PlannerResult<HealthData> {
            let curfew = timeline.applications()[0].policy.get(Dial::Curfew);
            Ok(HealthData::new(vec![0.0], vec![0.0], vec![10.0 * curfew])?)
        }
    }

    fn economy() -> impl EconomicModel {
        |policy: &PolicyVector| SectorOutput::from([("all".to_string(), policy.get(Dial::Curfew))])
    }

    fn config() -> LockdownConfig {
        LockdownConfig::new(start(), 1)
            .unwrap()
            .with_dial(Dial::Curfew, DialSpace::Options(vec![0.0, 0.25, 0.5, 0.75, 1.0]))
            .unwrap()
    }

    #[test]
    fn test_optimize_runs_n_steps() {
        let loss = |_: &PopulationData, h: &HealthData, _: &crate::economy::EconomicOutput| {
            Loss::Scalar(h.deaths()[0])
        };
        let mut search = RandomSearch::with_seed(config(), loss, 3);
        let frontier = search
            .optimize(&PopulationData::new(1.0, 1.0), &health(), &economy(), Some(7))
            .unwrap();
        assert_eq!(search.history().len(), 7);
        assert_eq!(frontier.len(), 1);
    }

    #[test]
    fn test_zero_steps_evaluates_nothing() {
        let mut search = RandomSearch::with_seed(config(), crate::loss::HealthEconomyObjectives, 3);
        let frontier = search
            .optimize(&PopulationData::new(1.0, 1.0), &health(), &economy(), Some(0))
            .unwrap();
        assert!(frontier.is_empty());
        assert!(search.history().is_empty());
    }

    #[test]
    fn test_concurrent_matches_sequential_frontier() {
        let population = PopulationData::new(1.0, 1.0);
        let mut sequential = ExhaustiveSearch::with_seed(config(), crate::loss::HealthEconomyObjectives, 1);
        let expected = sequential.optimize(&population, &health(), &economy(), None).unwrap();

        let mut concurrent = ExhaustiveSearch::with_seed(config(), crate::loss::HealthEconomyObjectives, 1);
        let frontier = concurrent
            .optimize_concurrent(&population, &health(), &economy(), None, 3)
            .unwrap();

        assert_eq!(frontier.len(), expected.len());
        for member in expected.members() {
            assert!(frontier.members().contains(member));
        }
        assert_eq!(concurrent.history(), sequential.history());
    }

    #[test]
    fn test_concurrent_respects_n_steps() {
        let mut search = RandomSearch::with_seed(config(), crate::loss::HealthEconomyObjectives, 9);
        search
            .optimize_concurrent(&PopulationData::new(1.0, 1.0), &health(), &economy(), Some(5), 2)
            .unwrap();
        assert_eq!(search.history().len(), 5);
    }

    #[test]
    fn test_forecast_errors_propagate() {
        let failing = |_: &PolicyTimeline| -> PlannerResult<HealthData> {
            Err(crate::error::PredictError::EmptyHistory.into())
        };
        let mut search = RandomSearch::with_seed(config(), crate::loss::HealthEconomyObjectives, 1);
        let err = search
            .optimize(&PopulationData::new(1.0, 1.0), &failing, &economy(), Some(3))
            .unwrap_err();
        assert!(err.is_predict());
    }
}
