use std::hint::black_box;

use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lockdown_planner::model::CompartmentEngine;
use lockdown_planner::policy::TimelineIndex;
use lockdown_planner::{
    Dial, HealthData, ParamMap, PolicyTimeline, PolicyVector, PopulationData, Seir, Sir,
};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()
}

fn policies() -> Vec<PolicyVector> {
    (0..=10)
        .map(|i| PolicyVector::from_pairs([(Dial::Curfew, f64::from(i) / 10.0)]).unwrap())
        .collect()
}

/// Alternates through eleven curfew levels, `segment` days each.
fn stepped_timeline(days: i64, segment: i64) -> PolicyTimeline {
    let policies = policies();
    let mut builder = PolicyTimeline::builder(start());
    let mut elapsed = 0;
    let mut idx = 0;
    while elapsed < days {
        let len = segment.min(days - elapsed);
        builder = builder.then(policies[idx % policies.len()], len);
        elapsed += len;
        idx += 1;
    }
    builder.build()
}

fn discounted<D: lockdown_planner::CompartmentDynamics>(mut engine: CompartmentEngine<D>) -> CompartmentEngine<D> {
    for (i, policy) in policies().into_iter().enumerate() {
        let ratio = 0.2 + 0.08 * i as f64;
        engine.set_discounts(policy, ParamMap::from([("beta".to_string(), ratio)]));
    }
    engine
}

fn bench_predict(c: &mut Criterion) {
    let population = PopulationData::new(5.8e7, 64.0);
    let past = HealthData::new(vec![1000.0], vec![100.0], vec![10.0]).unwrap();

    let mut sir = CompartmentEngine::<Sir>::new().unwrap();
    sir.set_param_values(&[0.3, 0.1, 0.0, 3e-5, 0.1, 0.02]).unwrap();
    let sir = discounted(sir);

    let mut seir = CompartmentEngine::<Seir>::new().unwrap();
    seir.set_param_values(&[0.3, 0.1, 0.25, 0.0, 3e-5, 0.1, 0.02, 0.5]).unwrap();
    let seir = discounted(seir);

    let mut group = c.benchmark_group("forecast/predict");
    for days in [30i64, 180, 365] {
        let timeline = stepped_timeline(days, 14);
        group.throughput(Throughput::Elements(days as u64));
        group.bench_with_input(BenchmarkId::new("sir", days), &timeline, |b, timeline| {
            b.iter(|| sir.predict(&population, &past, black_box(timeline)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("seir", days), &timeline, |b, timeline| {
            b.iter(|| seir.predict(&population, &past, black_box(timeline)).unwrap());
        });
    }
    group.finish();
}

fn bench_timeline(c: &mut Criterion) {
    let timeline = stepped_timeline(720, 7);

    let mut group = c.benchmark_group("forecast/timeline");
    group.throughput(Throughput::Elements(1));
    group.bench_function("lookup_offset", |b| {
        b.iter(|| timeline.lookup(black_box(511i64)).unwrap());
    });
    group.bench_function("slice", |b| {
        b.iter(|| {
            timeline
                .slice(
                    Some(TimelineIndex::Offset(black_box(100))),
                    Some(TimelineIndex::Offset(black_box(600))),
                )
                .unwrap()
        });
    });
    group.finish();
}

criterion_group!(forecast, bench_predict, bench_timeline);
criterion_main!(forecast);
