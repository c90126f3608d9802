//! Fitted parameters and their aggregation across policy segments.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::parameter::{ParamMap, ParameterConfig};
use crate::policy::{PolicyEnd, PolicyVector};

/// Per-policy discount ratios of the policy-dependent parameters.
pub type DiscountTable = HashMap<PolicyVector, ParamMap>;

/// What `fit` learns: baseline values plus per-policy discounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FittedModelState {
    /// Baseline values. Policy-dependent entries hold the maximum seen.
    pub general: ParamMap,
    /// Discount ratio of each policy-dependent parameter, per observed policy.
    #[serde(serialize_with = "serialize_discounts", deserialize_with = "deserialize_discounts")]
    pub discounts: DiscountTable,
}

impl FittedModelState {
    /// True once general parameters exist.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        !self.general.is_empty()
    }

    /// Observed policies in a stable order.
    #[must_use]
    pub fn policies(&self) -> Vec<&PolicyVector> {
        let mut policies: Vec<_> = self.discounts.keys().collect();
        policies.sort_by(|a, b| compare_features(a, b));
        policies
    }
}

/// One successfully fitted segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFit {
    /// Policy in force over the segment.
    pub policy: PolicyVector,
    /// Segment length, used as its aggregation weight.
    pub days: i64,
    /// Fitted parameter values.
    pub params: ParamMap,
}

/// Summary of a converged segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    /// Policy in force over the segment.
    pub policy: PolicyVector,
    /// First day of the segment.
    pub start: NaiveDate,
    /// Exclusive end of the segment.
    pub end: PolicyEnd,
    /// Observed days used by the fit.
    pub observations: usize,
    /// Best residual reached.
    pub residual: f64,
    /// Optimizer iterations spent.
    pub iterations: u64,
}

/// A segment left out of aggregation, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedSegment {
    /// Policy in force over the segment.
    pub policy: PolicyVector,
    /// First day of the segment.
    pub start: NaiveDate,
    /// Exclusive end of the segment.
    pub end: PolicyEnd,
    /// Why the segment was skipped.
    pub reason: String,
}

/// Outcome of fitting one compartment model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    /// Model name.
    pub model: String,
    /// Segments that contributed to the fitted state.
    pub fitted: Vec<SegmentSummary>,
    /// Segments left out.
    pub excluded: Vec<ExcludedSegment>,
}

/// Combines per-segment fits into a `FittedModelState`.
///
/// Policy-independent parameters are averaged, weighted by segment length.
/// Policy-dependent parameters take the maximum across segments as their
/// general value and store `value / max` per policy; a non-positive maximum
/// gives every policy a ratio of 1. When a policy occurs in several segments
/// the later segment's ratio is kept.
#[must_use]
pub fn aggregate(config: &ParameterConfig, segments: &[SegmentFit]) -> FittedModelState {
    let total_days: i64 = segments.iter().map(|s| s.days.max(0)).sum();
    let weight = |segment: &SegmentFit| {
        if total_days > 0 {
            segment.days.max(0) as f64 / total_days as f64
        } else {
            1.0 / segments.len() as f64
        }
    };

    let mut general = ParamMap::new();
    for param in config {
        let values = segments.iter().map(|s| (s, s.params.get(&param.name).copied().unwrap_or(0.0)));
        let value = if param.policy_dependent {
            values.fold(f64::NEG_INFINITY, |acc, (_, v)| acc.max(v))
        } else {
            values.map(|(s, v)| v * weight(s)).sum()
        };
        general.insert(param.name.clone(), value);
    }

    let mut discounts = DiscountTable::new();
    for segment in segments {
        let ratios = config
            .policy_dependent()
            .map(|param| {
                let max = general[&param.name];
                let value = segment.params.get(&param.name).copied().unwrap_or(0.0);
                let ratio = if max > 0.0 { value / max } else { 1.0 };
                (param.name.clone(), ratio)
            })
            .collect();
        discounts.insert(segment.policy, ratios);
    }

    FittedModelState { general, discounts }
}

fn compare_features(a: &PolicyVector, b: &PolicyVector) -> std::cmp::Ordering {
    a.features()
        .iter()
        .zip(b.features())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(std::cmp::Ordering::Equal)
}

#[derive(Serialize, Deserialize)]
struct DiscountEntry {
    policy: PolicyVector,
    discounts: ParamMap,
}

fn serialize_discounts<S: Serializer>(table: &DiscountTable, serializer: S) -> Result<S::Ok, S::Error> {
    let mut entries: Vec<_> = table.iter().collect();
    entries.sort_by(|(a, _), (b, _)| compare_features(a, b));
    serializer.collect_seq(entries.into_iter().map(|(policy, discounts)| DiscountEntry {
        policy: *policy,
        discounts: discounts.clone(),
    }))
}

fn deserialize_discounts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DiscountTable, D::Error> {
    let entries = Vec::<DiscountEntry>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(|e| (e.policy, e.discounts)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;
    use crate::policy::Dial;

    fn config() -> ParameterConfig {
        ParameterConfig::new(vec![
            Parameter::new("beta", "", 0.0, 10.0).policy_dependent(),
            Parameter::new("gamma", "", 0.0, 1.0),
        ])
        .unwrap()
    }

    fn params(beta: f64, gamma: f64) -> ParamMap {
        ParamMap::from([("beta".to_string(), beta), ("gamma".to_string(), gamma)])
    }

    fn policy(value: f64) -> PolicyVector {
        PolicyVector::from_pairs([(Dial::Curfew, value)]).unwrap()
    }

    #[test]
    fn test_aggregate_weights_and_discounts() {
        let segments = vec![
            SegmentFit { policy: policy(0.0), days: 30, params: params(2.0, 0.1) },
            SegmentFit { policy: policy(1.0), days: 10, params: params(0.5, 0.2) },
        ];
        let state = aggregate(&config(), &segments);
        assert_eq!(state.general["beta"], 2.0);
        assert!((state.general["gamma"] - (0.1 * 0.75 + 0.2 * 0.25)).abs() < 1e-12);
        assert_eq!(state.discounts[&policy(0.0)]["beta"], 1.0);
        assert_eq!(state.discounts[&policy(1.0)]["beta"], 0.25);
        assert!(!state.discounts[&policy(1.0)].contains_key("gamma"));
    }

    #[test]
    fn test_aggregate_non_positive_maximum_gives_unit_ratio() {
        let segments = vec![SegmentFit { policy: policy(0.5), days: 5, params: params(0.0, 0.1) }];
        let state = aggregate(&config(), &segments);
        assert_eq!(state.general["beta"], 0.0);
        assert_eq!(state.discounts[&policy(0.5)]["beta"], 1.0);
    }

    #[test]
    fn test_repeated_policy_keeps_later_ratio() {
        let segments = vec![
            SegmentFit { policy: policy(0.5), days: 5, params: params(1.0, 0.1) },
            SegmentFit { policy: policy(0.0), days: 5, params: params(4.0, 0.1) },
            SegmentFit { policy: policy(0.5), days: 5, params: params(2.0, 0.1) },
        ];
        let state = aggregate(&config(), &segments);
        assert_eq!(state.discounts.len(), 2);
        assert_eq!(state.discounts[&policy(0.5)]["beta"], 0.5);
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let segments = vec![
            SegmentFit { policy: policy(0.0), days: 30, params: params(2.0, 0.1) },
            SegmentFit { policy: policy(1.0), days: 10, params: params(0.5, 0.2) },
        ];
        let state = aggregate(&config(), &segments);
        let json = serde_json::to_string(&state).unwrap();
        let decoded: FittedModelState = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(decoded.policies(), vec![&policy(0.0), &policy(1.0)]);
    }
}
