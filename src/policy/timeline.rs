//! Policy applications and the interval algebra over them.
//!
//! A timeline is an ordered, contiguous run of half-open `[start, end)`
//! applications. The last application may be open-ended; for arithmetic it
//! then lasts a configurable number of days (`DEFAULT_OPEN_ENDED_DAYS`).

use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::TimelineError;
use crate::policy::PolicyVector;

/// Duration assumed for an open-ended application when computing lengths.
pub const DEFAULT_OPEN_ENDED_DAYS: i64 = 365;

/// End of a policy application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEnd {
    /// Exclusive end date.
    Bounded(NaiveDate),
    /// Applies indefinitely.
    Unbounded,
}

impl PolicyEnd {
    /// True for an open-ended application.
    #[must_use]
    pub const fn is_unbounded(self) -> bool {
        matches!(self, Self::Unbounded)
    }

    /// True if `date` falls before this end.
    #[must_use]
    pub fn is_after(self, date: NaiveDate) -> bool {
        match self {
            Self::Bounded(end) => end > date,
            Self::Unbounded => true,
        }
    }

    /// The earlier of two ends.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        match (self, other) {
            (Self::Bounded(a), Self::Bounded(b)) => Self::Bounded(a.min(b)),
            (Self::Bounded(a), Self::Unbounded) | (Self::Unbounded, Self::Bounded(a)) => {
                Self::Bounded(a)
            }
            (Self::Unbounded, Self::Unbounded) => Self::Unbounded,
        }
    }
}

impl From<NaiveDate> for PolicyEnd {
    fn from(date: NaiveDate) -> Self {
        Self::Bounded(date)
    }
}

/// A policy vector in force over `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyApplication {
    /// Dial levels in force.
    pub policy: PolicyVector,
    /// First day in force.
    pub start: NaiveDate,
    /// First day no longer in force.
    pub end: PolicyEnd,
}

impl PolicyApplication {
    /// Creates a closed application. Ordering of `start`/`end` is not checked.
    #[must_use]
    pub const fn new(policy: PolicyVector, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            policy,
            start,
            end: PolicyEnd::Bounded(end),
        }
    }

    /// Creates an application with no end date.
    #[must_use]
    pub const fn open_ended(policy: PolicyVector, start: NaiveDate) -> Self {
        Self {
            policy,
            start,
            end: PolicyEnd::Unbounded,
        }
    }

    /// Length in days, using `DEFAULT_OPEN_ENDED_DAYS` when open-ended.
    #[must_use]
    pub fn len_days(&self) -> i64 {
        self.len_days_with(DEFAULT_OPEN_ENDED_DAYS)
    }

    /// Length in days, using `open_ended_days` when open-ended.
    #[must_use]
    pub fn len_days_with(&self, open_ended_days: i64) -> i64 {
        (self.end_date_with(open_ended_days) - self.start).num_days()
    }

    /// Effective exclusive end date.
    #[must_use]
    pub fn end_date_with(&self, open_ended_days: i64) -> NaiveDate {
        match self.end {
            PolicyEnd::Bounded(end) => end,
            PolicyEnd::Unbounded => shift_days(self.start, open_ended_days),
        }
    }

    /// Check if a date falls within `[start, end)`.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.is_after(date)
    }

    /// Check if this application intersects `[from, to)`.
    #[must_use]
    pub fn overlaps(&self, from: NaiveDate, to: PolicyEnd) -> bool {
        to.is_after(self.start) && self.end.is_after(from)
    }

    /// Clips this application to `[from, to)`.
    #[must_use]
    pub fn clip(&self, from: NaiveDate, to: PolicyEnd) -> Self {
        Self {
            policy: self.policy,
            start: self.start.max(from),
            end: self.end.min(to),
        }
    }
}

impl fmt::Display for PolicyApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            PolicyEnd::Bounded(end) => write!(f, "[{} → {}) {}", self.start, end, self.policy),
            PolicyEnd::Unbounded => write!(f, "[{} → ∞) {}", self.start, self.policy),
        }
    }
}

/// A timeline position: a day offset or a calendar date.
///
/// Non-negative offsets count from the timeline start, negative offsets
/// count backward from its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimelineIndex {
    /// Days from the start, or from the end when negative.
    Offset(i64),
    /// A calendar date.
    Date(NaiveDate),
}

impl From<i64> for TimelineIndex {
    fn from(offset: i64) -> Self {
        Self::Offset(offset)
    }
}

impl From<i32> for TimelineIndex {
    fn from(offset: i32) -> Self {
        Self::Offset(i64::from(offset))
    }
}

impl From<NaiveDate> for TimelineIndex {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

/// Ordered, non-overlapping, contiguous sequence of policy applications.
///
/// Construction never validates ordering; call [`PolicyTimeline::validate`]
/// when the applications come from an untrusted source.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use lockdown_planner::{Dial, PolicyTimeline, PolicyVector};
///
/// let strict = PolicyVector::from_pairs([(Dial::Curfew, 0.1)]).unwrap();
/// let relaxed = PolicyVector::from_pairs([(Dial::Curfew, 0.9)]).unwrap();
/// let start = NaiveDate::from_ymd_opt(2020, 3, 1).unwrap();
///
/// let timeline = PolicyTimeline::builder(start)
///     .then(strict, 10)
///     .then(relaxed, 20)
///     .build();
///
/// assert_eq!(timeline.len_days(), 30);
/// assert_eq!(timeline.lookup(9).unwrap(), &strict);
/// assert_eq!(timeline.lookup(-1).unwrap(), &relaxed);
/// assert_eq!(timeline.slice(Some(5.into()), Some(15.into())).unwrap().len_days(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTimeline {
    applications: Vec<PolicyApplication>,
    #[serde(default = "default_open_ended_days")]
    open_ended_days: i64,
}

const fn default_open_ended_days() -> i64 {
    DEFAULT_OPEN_ENDED_DAYS
}

impl PolicyTimeline {
    /// A timeline from explicit applications, in order.
    #[must_use]
    pub const fn new(applications: Vec<PolicyApplication>) -> Self {
        Self {
            applications,
            open_ended_days: DEFAULT_OPEN_ENDED_DAYS,
        }
    }

    /// Overrides the duration assumed for an open-ended application.
    #[must_use]
    pub fn with_open_ended_days(mut self, days: i64) -> Self {
        self.open_ended_days = days;
        self
    }

    /// Starts a contiguous timeline at `start`.
    #[must_use]
    pub const fn builder(start: NaiveDate) -> TimelineBuilder {
        TimelineBuilder {
            cursor: start,
            applications: Vec::new(),
        }
    }

    /// A single policy held for `days` days.
    #[must_use]
    pub fn constant(policy: PolicyVector, start: NaiveDate, days: i64) -> Self {
        Self::builder(start).then(policy, days).build()
    }

    /// Applications in chronological order.
    #[must_use]
    pub fn applications(&self) -> &[PolicyApplication] {
        &self.applications
    }

    /// Days assumed for an open-ended application.
    #[must_use]
    pub const fn open_ended_days(&self) -> i64 {
        self.open_ended_days
    }

    /// True when no policy is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    /// Sum of application lengths in days.
    #[must_use]
    pub fn len_days(&self) -> i64 {
        self.applications
            .iter()
            .map(|app| app.len_days_with(self.open_ended_days))
            .sum()
    }

    /// Start date of the first application.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Empty` for an empty timeline.
    pub fn start(&self) -> Result<NaiveDate, TimelineError> {
        self.applications
            .first()
            .map(|app| app.start)
            .ok_or(TimelineError::Empty)
    }

    /// End of the last application.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Empty` for an empty timeline.
    pub fn end(&self) -> Result<PolicyEnd, TimelineError> {
        self.applications
            .last()
            .map(|app| app.end)
            .ok_or(TimelineError::Empty)
    }

    /// Effective exclusive end date (open-ended applications use the default duration).
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Empty` for an empty timeline.
    pub fn end_date(&self) -> Result<NaiveDate, TimelineError> {
        self.applications
            .last()
            .map(|app| app.end_date_with(self.open_ended_days))
            .ok_or(TimelineError::Empty)
    }

    /// Daily date index `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Empty` for an empty timeline.
    pub fn dates(&self) -> Result<Vec<NaiveDate>, TimelineError> {
        let start = self.start()?;
        let end = self.end_date()?;
        Ok(start.iter_days().take_while(|d| *d < end).collect())
    }

    /// Resolves an index to a date without bounds checks. Offsets past the
    /// calendar range saturate.
    fn resolve(&self, index: TimelineIndex) -> Result<NaiveDate, TimelineError> {
        match index {
            TimelineIndex::Date(date) => Ok(date),
            TimelineIndex::Offset(offset) if offset >= 0 => Ok(shift_days(self.start()?, offset)),
            TimelineIndex::Offset(offset) => Ok(shift_days(self.end_date()?, offset)),
        }
    }

    /// Policy in force at `index`.
    ///
    /// Offsets must lie in `[-len, len)`; dates must be covered by an
    /// application.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Empty` for an empty timeline and
    /// `TimelineError::NotFound` when nothing covers the position.
    pub fn lookup(&self, index: impl Into<TimelineIndex>) -> Result<&PolicyVector, TimelineError> {
        if self.is_empty() {
            return Err(TimelineError::Empty);
        }
        let index = index.into();
        if let TimelineIndex::Offset(offset) = index {
            let len = self.len_days();
            if offset >= len || offset < -len {
                return Err(TimelineError::NotFound {
                    date: self.resolve(index)?,
                });
            }
        }
        let date = self.resolve(index)?;
        self.applications
            .iter()
            .find(|app| app.contains(date))
            .map(|app| &app.policy)
            .ok_or(TimelineError::NotFound { date })
    }

    /// Sub-timeline over `[from, to)`, clipping the boundary applications.
    ///
    /// Missing bounds default to the timeline's own start and end. Bounds past
    /// either edge clip silently; offsets beyond `[-len, len]` clamp to the
    /// nearest edge.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::Empty` for an empty timeline.
    pub fn slice(
        &self,
        from: Option<TimelineIndex>,
        to: Option<TimelineIndex>,
    ) -> Result<Self, TimelineError> {
        if self.is_empty() {
            return Err(TimelineError::Empty);
        }
        let len = self.len_days();
        let from = match from {
            Some(TimelineIndex::Offset(offset)) if offset < -len => self.start()?,
            Some(TimelineIndex::Offset(offset)) if offset >= len => self.end_date()?,
            Some(index) => self.resolve(index)?,
            None => self.start()?,
        };
        let to = match to {
            Some(TimelineIndex::Offset(offset)) if offset < -len => PolicyEnd::Bounded(self.start()?),
            Some(TimelineIndex::Offset(offset)) if offset > len => self.end()?,
            Some(index) => PolicyEnd::Bounded(self.resolve(index)?),
            None => self.end()?,
        };

        let applications = self
            .applications
            .iter()
            .filter(|app| app.overlaps(from, to))
            .map(|app| app.clip(from, to))
            .collect();

        Ok(Self {
            applications,
            open_ended_days: self.open_ended_days,
        })
    }

    /// Checks ordering and contiguity.
    ///
    /// # Errors
    ///
    /// Returns `TimelineError::NotContiguous` at the first gap, overlap or
    /// inverted application.
    pub fn validate(&self) -> Result<(), TimelineError> {
        for (idx, app) in self.applications.iter().enumerate() {
            if !app.end.is_after(app.start) {
                return Err(TimelineError::NotContiguous {
                    date: app.start,
                    reason: "application ends before it starts".to_string(),
                });
            }
            let Some(next) = self.applications.get(idx + 1) else {
                continue;
            };
            match app.end {
                PolicyEnd::Bounded(end) if end == next.start => {}
                PolicyEnd::Bounded(end) => {
                    return Err(TimelineError::NotContiguous {
                        date: end,
                        reason: format!("next application starts at {}", next.start),
                    });
                }
                PolicyEnd::Unbounded => {
                    return Err(TimelineError::NotContiguous {
                        date: next.start,
                        reason: "open-ended application is not last".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for PolicyTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, app) in self.applications.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{app}")?;
        }
        Ok(())
    }
}

/// `date` moved by `days`, saturating at the calendar limits.
fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// Appends contiguous applications.
#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    cursor: NaiveDate,
    applications: Vec<PolicyApplication>,
}

impl TimelineBuilder {
    /// Holds `policy` for the next `days` days.
    #[must_use]
    pub fn then(mut self, policy: PolicyVector, days: i64) -> Self {
        let end = shift_days(self.cursor, days);
        self.applications
            .push(PolicyApplication::new(policy, self.cursor, end));
        self.cursor = end;
        self
    }

    /// Holds `policy` indefinitely and finishes the timeline.
    #[must_use]
    pub fn open_ended(mut self, policy: PolicyVector) -> PolicyTimeline {
        self.applications
            .push(PolicyApplication::open_ended(policy, self.cursor));
        self.build()
    }

    /// Finishes the timeline at the cursor.
    #[must_use]
    pub fn build(self) -> PolicyTimeline {
        PolicyTimeline::new(self.applications)
    }
}
