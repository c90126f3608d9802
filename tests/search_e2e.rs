use std::collections::BTreeMap;

use chrono::NaiveDate;

use lockdown_planner::economy::{EconomicOutput, SectorOutput};
use lockdown_planner::model::CompartmentEngine;
use lockdown_planner::search::HealthOutcomeModel;
use lockdown_planner::{
    Dial, DialSpace, ExhaustiveSearch, Forecaster, HealthData, HealthEconomyObjectives, LockdownConfig, Loss,
    ParamMap, PlannerResult, PolicySearch, PolicyTimeline, PolicyVector, PopulationData, RandomSearch,
    SectorGvaModel, Sir,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 7, 1).unwrap()
}

/// Three curfew options with hand-computed health and economic losses:
///
/// | curfew | health | economy | sum |
/// |--------|--------|---------|-----|
/// | 0.0    | 1      | 5       | 6   |
/// | 0.5    | 2      | 2       | 4   |
/// | 1.0    | 5      | 1       | 6   |
fn table() -> BTreeMap<u8, (f64, f64)> {
    BTreeMap::from([(0, (1.0, 5.0)), (5, (2.0, 2.0)), (10, (5.0, 1.0))])
}

fn key(policy: &PolicyVector) -> u8 {
    (policy.get(Dial::Curfew) * 10.0).round() as u8
}

fn health() -> impl HealthOutcomeModel {
    |timeline: &PolicyTimeline| -> PlannerResult<HealthData> {
        let (deaths, _) = table()[&key(&timeline.applications()[0].policy)];
        Ok(HealthData::new(vec![0.0], vec![0.0], vec![deaths])?)
    }
}

fn economy(policy: &PolicyVector) -> SectorOutput {
    let (_, loss) = table()[&key(policy)];
    SectorOutput::from([("economic_loss".to_string(), loss)])
}

fn config() -> LockdownConfig {
    LockdownConfig::new(start(), 1)
        .unwrap()
        .with_dial(Dial::Curfew, DialSpace::Options(vec![0.0, 0.5, 1.0]))
        .unwrap()
}

fn summed(_: &PopulationData, health: &HealthData, economy: &EconomicOutput) -> Loss {
    Loss::Scalar(health.deaths()[0] + economy.total())
}

fn split(_: &PopulationData, health: &HealthData, economy: &EconomicOutput) -> Loss {
    Loss::Objectives(vec![health.deaths()[0], economy.total()])
}

#[test]
fn exhaustive_single_objective_finds_minimum() {
    let population = PopulationData::new(1e6, 70.0);
    let mut search = ExhaustiveSearch::with_seed(config(), summed, 0);
    let frontier = search.optimize(&population, &health(), &economy, None).unwrap();

    assert_eq!(search.history().len(), 3);
    assert_eq!(frontier.len(), 1);
    let best = &frontier.members()[0];
    assert_eq!(best.solution.applications()[0].policy.get(Dial::Curfew), 0.5);
    assert_eq!(best.loss, Loss::Scalar(4.0));
}

#[test]
fn exhaustive_multi_objective_keeps_all_tradeoffs() {
    let population = PopulationData::new(1e6, 70.0);
    let mut search = ExhaustiveSearch::with_seed(config(), split, 0);
    let frontier = search.optimize(&population, &health(), &economy, None).unwrap();

    assert_eq!(frontier.len(), 3);
    let losses: Vec<&Loss> = frontier.members().iter().map(|m| &m.loss).collect();
    assert_eq!(
        losses,
        vec![
            &Loss::from(vec![1.0, 5.0]),
            &Loss::from(vec![2.0, 2.0]),
            &Loss::from(vec![5.0, 1.0]),
        ]
    );
}

#[test]
fn exhaustive_stops_before_step_limit_when_exhausted() {
    let population = PopulationData::new(1e6, 70.0);
    let mut search = ExhaustiveSearch::with_seed(config(), summed, 0);
    search.optimize(&population, &health(), &economy, Some(100)).unwrap();
    assert_eq!(search.history().len(), 3);
}

#[test]
fn random_search_over_fitted_sir_model() {
    let population = PopulationData::new(1e6, 70.0);
    let past = HealthData::new(vec![500.0], vec![50.0], vec![5.0]).unwrap();

    let mut engine = CompartmentEngine::<Sir>::new().unwrap();
    engine.set_param_values(&[0.5, 0.1, 0.0, 0.0, 0.1, 0.02]).unwrap();
    for (curfew, discount) in [(0.0, 0.2), (0.5, 0.6), (1.0, 1.0)] {
        let policy = PolicyVector::from_pairs([(Dial::Curfew, curfew), (Dial::Mining, curfew)]).unwrap();
        engine.set_discounts(policy, ParamMap::from([("beta".to_string(), discount)]));
    }

    let config = LockdownConfig::new(start(), 60)
        .unwrap()
        .with_dial(Dial::Curfew, DialSpace::Options(vec![0.0, 0.5, 1.0]))
        .unwrap()
        .with_dial(Dial::Mining, DialSpace::Options(vec![0.0, 0.5, 1.0]))
        .unwrap();
    let economy = SectorGvaModel::new().with_sector("mining", 100.0, [Dial::Mining]).unwrap();

    // Only policies with matching curfew and mining dials have discounts, so
    // restrict the search to those through the health model.
    let forecaster = Forecaster::new(&engine, &population, &past);
    let health = |timeline: &PolicyTimeline| -> PlannerResult<HealthData> {
        let policy = timeline.applications()[0].policy;
        let curfew = policy.get(Dial::Curfew);
        let aligned = PolicyVector::from_pairs([(Dial::Curfew, curfew), (Dial::Mining, curfew)])?;
        forecaster.forecast(&PolicyTimeline::constant(aligned, start(), 60))
    };

    let mut search = RandomSearch::with_seed(config, HealthEconomyObjectives, 17);
    let frontier = search
        .optimize_concurrent(&population, &health, &economy, Some(12), 4)
        .unwrap();

    assert_eq!(search.history().len(), 12);
    assert!(!frontier.is_empty());
    for member in frontier.members() {
        assert!(search.history().contains(member));
        let Loss::Objectives(values) = &member.loss else {
            panic!("expected two objectives");
        };
        assert_eq!(values.len(), 2);
        assert!(values[0] > 0.0);
    }
}
