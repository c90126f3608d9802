//! Ensemble of disease models.

use crate::error::PlannerResult;
use crate::health::{HealthData, PopulationData};
use crate::policy::PolicyTimeline;

use super::state::FitReport;
use super::{DiseaseModel, HealthModel};

/// Averages the forecasts of several models.
///
/// Fitting succeeds only if every member fits. Forecasts are the
/// component-wise mean of the members' confirmed, recovered and deaths.
#[derive(Debug)]
pub struct Ensemble {
    members: Vec<DiseaseModel>,
}

impl Ensemble {
    /// An ensemble averaging `members` with equal weight.
    #[must_use]
    pub const fn new(members: Vec<DiseaseModel>) -> Self {
        Self { members }
    }

    /// Member models.
    #[must_use]
    pub fn members(&self) -> &[DiseaseModel] {
        &self.members
    }

    /// Member models, mutably.
    pub fn members_mut(&mut self) -> &mut [DiseaseModel] {
        &mut self.members
    }

    /// Consumes the ensemble.
    #[must_use]
    pub fn into_members(self) -> Vec<DiseaseModel> {
        self.members
    }
}

impl HealthModel for Ensemble {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn fit(
        &mut self,
        population: &PopulationData,
        health: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<Vec<FitReport>> {
        let mut reports = Vec::new();
        for member in &mut self.members {
            reports.extend(member.fit(population, health, timeline)?);
        }
        Ok(reports)
    }

    fn predict(
        &self,
        population: &PopulationData,
        past: &HealthData,
        timeline: &PolicyTimeline,
    ) -> PlannerResult<HealthData> {
        let predictions = self
            .members
            .iter()
            .map(|m| m.predict(population, past, timeline).map(HealthData::without_optional))
            .collect::<PlannerResult<Vec<_>>>()?;
        let average = HealthData::average(&predictions)?;
        Ok(match timeline.start() {
            Ok(start) => average.with_start(start),
            Err(_) => average,
        })
    }
}
