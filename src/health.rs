//! Population descriptors and daily health time series.
//!
//! `HealthData` is the shape exchanged with the compartment models: three
//! required daily series (confirmed cases, recovered, deaths) and two
//! optional ones (exposed, unreported). A series may carry a start date, in
//! which case its daily date index is `start + i`.

use std::ops::Range;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::HealthDataError;

/// Population descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationData {
    /// Number of people.
    pub population_size: f64,
    /// Expected remaining life-years per death, used by wellbeing losses.
    pub life_expectancy: f64,
}

impl PopulationData {
    /// Describes a population.
    #[must_use]
    pub const fn new(population_size: f64, life_expectancy: f64) -> Self {
        Self {
            population_size,
            life_expectancy,
        }
    }
}

/// One day of health data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthPoint {
    /// Confirmed cases.
    pub confirmed_cases: f64,
    /// Recoveries.
    pub recovered: f64,
    /// Deaths.
    pub deaths: f64,
    /// Exposed, incubating cases, when modelled.
    pub exposed_cases: Option<f64>,
    /// Infectious cases that were never reported, when modelled.
    pub unreported_cases: Option<f64>,
}

/// Daily health time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthData {
    start: Option<NaiveDate>,
    confirmed_cases: Vec<f64>,
    recovered: Vec<f64>,
    deaths: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exposed_cases: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unreported_cases: Option<Vec<f64>>,
}

fn check_len(component: &'static str, expected: usize, values: &[f64]) -> Result<(), HealthDataError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(HealthDataError::LengthMismatch {
            component,
            expected,
            actual: values.len(),
        })
    }
}

/// Collects an optional component across series. All present or all absent.
fn collect_optional<'a>(
    component: &'static str,
    values: impl Iterator<Item = Option<&'a Vec<f64>>>,
) -> Result<Option<Vec<&'a Vec<f64>>>, HealthDataError> {
    let values: Vec<_> = values.collect();
    let present = values.iter().filter(|v| v.is_some()).count();
    if present == 0 {
        Ok(None)
    } else if present == values.len() {
        Ok(Some(values.into_iter().flatten().collect()))
    } else {
        Err(HealthDataError::PartialComponent { component })
    }
}

fn mean_of(series: &[&Vec<f64>], component: &'static str) -> Result<Vec<f64>, HealthDataError> {
    let len = series.first().map_or(0, |s| s.len());
    for s in series {
        check_len(component, len, s)?;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = series.len() as f64;
    Ok((0..len)
        .map(|i| series.iter().map(|s| s[i]).sum::<f64>() / count)
        .collect())
}

impl HealthData {
    /// Creates an unindexed series.
    ///
    /// # Errors
    ///
    /// Returns `HealthDataError::LengthMismatch` if the components differ in length.
    pub fn new(
        confirmed_cases: Vec<f64>,
        recovered: Vec<f64>,
        deaths: Vec<f64>,
    ) -> Result<Self, HealthDataError> {
        let len = confirmed_cases.len();
        check_len("recovered", len, &recovered)?;
        check_len("deaths", len, &deaths)?;
        Ok(Self {
            start: None,
            confirmed_cases,
            recovered,
            deaths,
            exposed_cases: None,
            unreported_cases: None,
        })
    }

    /// Model output; the integrator guarantees equal lengths.
    pub(crate) fn from_series(
        confirmed_cases: Vec<f64>,
        recovered: Vec<f64>,
        deaths: Vec<f64>,
        exposed_cases: Option<Vec<f64>>,
        unreported_cases: Option<Vec<f64>>,
    ) -> Self {
        debug_assert_eq!(confirmed_cases.len(), recovered.len());
        debug_assert_eq!(confirmed_cases.len(), deaths.len());
        Self {
            start: None,
            confirmed_cases,
            recovered,
            deaths,
            exposed_cases,
            unreported_cases,
        }
    }

    /// A zero-length series.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            start: None,
            confirmed_cases: Vec::new(),
            recovered: Vec::new(),
            deaths: Vec::new(),
            exposed_cases: None,
            unreported_cases: None,
        }
    }

    /// Attaches exposed-case counts.
    ///
    /// # Errors
    ///
    /// Returns `HealthDataError::LengthMismatch` on a length mismatch.
    pub fn with_exposed(mut self, exposed_cases: Vec<f64>) -> Result<Self, HealthDataError> {
        check_len("exposed_cases", self.len(), &exposed_cases)?;
        self.exposed_cases = Some(exposed_cases);
        Ok(self)
    }

    /// Attaches unreported-case counts.
    ///
    /// # Errors
    ///
    /// Returns `HealthDataError::LengthMismatch` on a length mismatch.
    pub fn with_unreported(mut self, unreported_cases: Vec<f64>) -> Result<Self, HealthDataError> {
        check_len("unreported_cases", self.len(), &unreported_cases)?;
        self.unreported_cases = Some(unreported_cases);
        Ok(self)
    }

    /// Sets the date of the first value.
    #[must_use]
    pub fn with_start(mut self, start: NaiveDate) -> Self {
        self.start = Some(start);
        self
    }

    /// Drops the optional components.
    #[must_use]
    pub fn without_optional(mut self) -> Self {
        self.exposed_cases = None;
        self.unreported_cases = None;
        self
    }

    /// Number of days.
    #[must_use]
    pub fn len(&self) -> usize {
        self.confirmed_cases.len()
    }

    /// True for a zero-length series.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.confirmed_cases.is_empty()
    }

    /// Date of the first value, if indexed.
    #[must_use]
    pub const fn start(&self) -> Option<NaiveDate> {
        self.start
    }

    /// Daily date index, if the series is indexed.
    #[must_use]
    pub fn dates(&self) -> Option<Vec<NaiveDate>> {
        self.start
            .map(|start| start.iter_days().take(self.len()).collect())
    }

    /// Daily confirmed cases.
    #[must_use]
    pub fn confirmed_cases(&self) -> &[f64] {
        &self.confirmed_cases
    }

    /// Daily recoveries.
    #[must_use]
    pub fn recovered(&self) -> &[f64] {
        &self.recovered
    }

    /// Daily deaths.
    #[must_use]
    pub fn deaths(&self) -> &[f64] {
        &self.deaths
    }

    /// Daily exposed cases, if present.
    #[must_use]
    pub fn exposed_cases(&self) -> Option<&[f64]> {
        self.exposed_cases.as_deref()
    }

    /// Daily unreported cases, if present.
    #[must_use]
    pub fn unreported_cases(&self) -> Option<&[f64]> {
        self.unreported_cases.as_deref()
    }

    /// Value at position `index`.
    #[must_use]
    pub fn point(&self, index: usize) -> Option<HealthPoint> {
        Some(HealthPoint {
            confirmed_cases: *self.confirmed_cases.get(index)?,
            recovered: *self.recovered.get(index)?,
            deaths: *self.deaths.get(index)?,
            exposed_cases: self.exposed_cases.as_ref().and_then(|v| v.get(index).copied()),
            unreported_cases: self.unreported_cases.as_ref().and_then(|v| v.get(index).copied()),
        })
    }

    /// Most recent value.
    #[must_use]
    pub fn last(&self) -> Option<HealthPoint> {
        self.len().checked_sub(1).and_then(|idx| self.point(idx))
    }

    /// Positional slice; the range is clamped to the series.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        let take = |v: &Vec<f64>| v[start..end].to_vec();
        Self {
            start: self.start.map(|d| d + Duration::days(start as i64)),
            confirmed_cases: take(&self.confirmed_cases),
            recovered: take(&self.recovered),
            deaths: take(&self.deaths),
            exposed_cases: self.exposed_cases.as_ref().map(take),
            unreported_cases: self.unreported_cases.as_ref().map(take),
        }
    }

    /// Half-open date slice `[from, to)`; `to = None` runs to the end.
    ///
    /// Dates outside the series clip to its edges.
    ///
    /// # Errors
    ///
    /// Returns `HealthDataError::MissingIndex` for an unindexed series.
    pub fn slice_dates(&self, from: NaiveDate, to: Option<NaiveDate>) -> Result<Self, HealthDataError> {
        let start = self.start.ok_or(HealthDataError::MissingIndex)?;
        let position = |date: NaiveDate| {
            usize::try_from((date - start).num_days()).unwrap_or(0)
        };
        let end = to.map_or(self.len(), position);
        Ok(self.slice(position(from)..end))
    }

    /// Joins series end to end. The result keeps the first series' start date.
    ///
    /// # Errors
    ///
    /// Returns `HealthDataError::NoSeries` for an empty list and
    /// `HealthDataError::PartialComponent` if an optional component is present
    /// in only some of the series.
    pub fn concatenate(series: &[Self]) -> Result<Self, HealthDataError> {
        let first = series.first().ok_or(HealthDataError::NoSeries)?;
        let join = |values: Vec<&Vec<f64>>| values.into_iter().flatten().copied().collect();
        let exposed = collect_optional("exposed_cases", series.iter().map(|s| s.exposed_cases.as_ref()))?;
        let unreported = collect_optional(
            "unreported_cases",
            series.iter().map(|s| s.unreported_cases.as_ref()),
        )?;
        Ok(Self {
            start: first.start,
            confirmed_cases: join(series.iter().map(|s| &s.confirmed_cases).collect()),
            recovered: join(series.iter().map(|s| &s.recovered).collect()),
            deaths: join(series.iter().map(|s| &s.deaths).collect()),
            exposed_cases: exposed.map(join),
            unreported_cases: unreported.map(join),
        })
    }

    /// Component-wise mean of same-shaped series.
    ///
    /// An optional component stays missing only if it is missing from every
    /// series.
    ///
    /// # Errors
    ///
    /// Returns `HealthDataError::NoSeries` for an empty list,
    /// `HealthDataError::PartialComponent` on partial missingness and
    /// `HealthDataError::LengthMismatch` if the series differ in length.
    pub fn average(series: &[Self]) -> Result<Self, HealthDataError> {
        let first = series.first().ok_or(HealthDataError::NoSeries)?;
        let required = |component: &'static str, pick: fn(&Self) -> &Vec<f64>| {
            mean_of(&series.iter().map(pick).collect::<Vec<_>>(), component)
        };
        let exposed = collect_optional("exposed_cases", series.iter().map(|s| s.exposed_cases.as_ref()))?;
        let unreported = collect_optional(
            "unreported_cases",
            series.iter().map(|s| s.unreported_cases.as_ref()),
        )?;
        Ok(Self {
            start: first.start,
            confirmed_cases: required("confirmed_cases", |s| &s.confirmed_cases)?,
            recovered: required("recovered", |s| &s.recovered)?,
            deaths: required("deaths", |s| &s.deaths)?,
            exposed_cases: exposed.map(|v| mean_of(&v, "exposed_cases")).transpose()?,
            unreported_cases: unreported.map(|v| mean_of(&v, "unreported_cases")).transpose()?,
        })
    }
}
