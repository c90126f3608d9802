//! Economic output under a policy.
//!
//! An `EconomicModel` maps a policy to daily output per sector. The planner
//! only consumes that sector-to-output shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::{Dial, PolicyTimeline, PolicyVector};

/// Daily output keyed by sector name.
pub type SectorOutput = BTreeMap<String, f64>;

/// Daily economic output under a fixed policy.
pub trait EconomicModel: Send + Sync {
    /// Daily output of each sector while `policy` is in force.
    fn sector_output(&self, policy: &PolicyVector) -> SectorOutput;
}

impl<F> EconomicModel for F
where
    F: Fn(&PolicyVector) -> SectorOutput + Send + Sync,
{
    fn sector_output(&self, policy: &PolicyVector) -> SectorOutput {
        self(policy)
    }
}

/// Output accumulated over a timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EconomicOutput {
    /// Total output per sector.
    pub by_sector: SectorOutput,
}

impl EconomicOutput {
    /// Sum over all sectors.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.by_sector.values().sum()
    }

    fn accumulate(&mut self, daily: &SectorOutput, days: i64) {
        #[allow(clippy::cast_precision_loss)]
        let days = days as f64;
        for (sector, value) in daily {
            *self.by_sector.entry(sector.clone()).or_insert(0.0) += value * days;
        }
    }
}

impl From<SectorOutput> for EconomicOutput {
    fn from(by_sector: SectorOutput) -> Self {
        Self { by_sector }
    }
}

/// Integrates `model` over every application of `timeline`.
///
/// Open-ended applications last the timeline's open-ended length.
#[must_use]
pub fn run_economy(model: &dyn EconomicModel, timeline: &PolicyTimeline) -> EconomicOutput {
    let mut output = EconomicOutput::default();
    for application in timeline.applications() {
        let days = application.len_days_with(timeline.open_ended_days());
        if days <= 0 {
            continue;
        }
        output.accumulate(&model.sector_output(&application.policy), days);
    }
    output
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SectorBaseline {
    daily_value_added: f64,
    dials: Vec<Dial>,
}

/// Basic lockdown model: each sector's baseline value added scaled by the
/// mean of the dials that govern it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorGvaModel {
    sectors: BTreeMap<String, SectorBaseline>,
}

impl SectorGvaModel {
    /// A model with no sectors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One sector per economic dial, each with the same baseline.
    #[must_use]
    pub fn per_dial(daily_value_added: f64) -> Self {
        let sectors = Dial::ALL
            .iter()
            .filter(|d| d.is_economic())
            .map(|&dial| {
                (
                    dial.name().to_string(),
                    SectorBaseline {
                        daily_value_added,
                        dials: vec![dial],
                    },
                )
            })
            .collect();
        Self { sectors }
    }

    /// Adds a sector governed by `dials`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an empty dial list or a negative or
    /// non-finite baseline.
    pub fn with_sector(
        mut self,
        name: impl Into<String>,
        daily_value_added: f64,
        dials: impl IntoIterator<Item = Dial>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let dials: Vec<Dial> = dials.into_iter().collect();
        if dials.is_empty() {
            return Err(ConfigError::Invalid {
                reason: format!("sector '{name}' is not governed by any dial"),
            });
        }
        if !daily_value_added.is_finite() || daily_value_added < 0.0 {
            return Err(ConfigError::Invalid {
                reason: format!("sector '{name}' has invalid baseline {daily_value_added}"),
            });
        }
        self.sectors.insert(name, SectorBaseline { daily_value_added, dials });
        Ok(self)
    }

    /// Sector names in order.
    pub fn sectors(&self) -> impl Iterator<Item = &str> + '_ {
        self.sectors.keys().map(String::as_str)
    }
}

impl EconomicModel for SectorGvaModel {
    fn sector_output(&self, policy: &PolicyVector) -> SectorOutput {
        self.sectors
            .iter()
            .map(|(name, sector)| {
                #[allow(clippy::cast_precision_loss)]
                let activity =
                    sector.dials.iter().map(|&d| policy.get(d)).sum::<f64>() / sector.dials.len() as f64;
                (name.clone(), sector.daily_value_added * activity)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_gva_model_scales_by_mean_dial() {
        let model = SectorGvaModel::new()
            .with_sector("industry", 100.0, [Dial::Mining, Dial::Manufacturing])
            .unwrap();
        let policy = PolicyVector::from_pairs([(Dial::Mining, 1.0), (Dial::Manufacturing, 0.5)]).unwrap();
        assert_eq!(model.sector_output(&policy)["industry"], 75.0);
        assert_eq!(model.sector_output(&PolicyVector::default())["industry"], 0.0);
    }

    #[test]
    fn test_per_dial_covers_economic_dials() {
        let model = SectorGvaModel::per_dial(1.0);
        assert_eq!(model.sectors().count(), Dial::ALL.iter().filter(|d| d.is_economic()).count());
        assert!(model.sectors().any(|s| s == "agriculture"));
        assert!(!model.sectors().any(|s| s == "curfew"));
    }

    #[test]
    fn test_with_sector_validates() {
        assert!(SectorGvaModel::new().with_sector("none", 1.0, []).is_err());
        assert!(SectorGvaModel::new().with_sector("neg", -1.0, [Dial::Mining]).is_err());
    }

    #[test]
    fn test_run_economy_integrates_days() {
        let open = PolicyVector::from_pairs([(Dial::Mining, 1.0)]).unwrap();
        let half = PolicyVector::from_pairs([(Dial::Mining, 0.5)]).unwrap();
        let model = SectorGvaModel::new().with_sector("mining", 10.0, [Dial::Mining]).unwrap();
        let timeline = PolicyTimeline::builder(date(2020, 4, 1)).then(open, 3).then(half, 4).build();

        let output = run_economy(&model, &timeline);
        assert_eq!(output.by_sector["mining"], 10.0 * 3.0 + 5.0 * 4.0);
        assert_eq!(output.total(), 50.0);
    }

    #[test]
    fn test_closure_model() {
        let model = |policy: &PolicyVector| SectorOutput::from([("all".to_string(), policy.get(Dial::Curfew))]);
        let policy = PolicyVector::from_pairs([(Dial::Curfew, 0.25)]).unwrap();
        let timeline = PolicyTimeline::constant(policy, date(2020, 4, 1), 8).with_open_ended_days(30);
        assert_eq!(run_economy(&model, &timeline).total(), 2.0);
    }
}
