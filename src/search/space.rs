//! Space of candidate lockdown policies.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::{Dial, PolicyTimeline, PolicyVector, DEFAULT_OPEN_ENDED_DAYS};

/// Values a dial may take during search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialSpace {
    /// Always this value.
    Fixed(f64),
    /// One of a discrete set; enumerated by exhaustive search.
    Options(Vec<f64>),
    /// Anywhere in `[min, max]`, drawn uniformly.
    Range {
        /// Lowest level.
        min: f64,
        /// Highest level.
        max: f64,
    },
}

impl DialSpace {
    fn validate(&self, dial: Dial) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidDialSpace {
            dial: dial.name().to_string(),
            reason,
        };
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        match self {
            Self::Fixed(v) if !in_unit(*v) => Err(invalid(format!("value {v} is outside [0, 1]"))),
            Self::Options(values) if values.is_empty() => Err(invalid("no options".to_string())),
            Self::Options(values) => match values.iter().find(|v| !in_unit(**v)) {
                Some(v) => Err(invalid(format!("option {v} is outside [0, 1]"))),
                None => Ok(()),
            },
            Self::Range { min, max } if !(in_unit(*min) && in_unit(*max)) || min > max => {
                Err(invalid(format!("range [{min}, {max}] is not within [0, 1]")))
            }
            _ => Ok(()),
        }
    }

    /// Draws one value.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            Self::Fixed(v) => *v,
            Self::Options(values) => values[rng.gen_range(0..values.len())],
            Self::Range { min, max } => rng.gen_range(*min..=*max),
        }
    }
}

/// Dials to search over, and the window every proposal covers.
///
/// Dials without an entry stay at 0. Deserialization runs the same checks
/// as the builder methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LockdownConfigFile")]
pub struct LockdownConfig {
    dials: BTreeMap<Dial, DialSpace>,
    start: NaiveDate,
    horizon_days: i64,
    open_ended_days: i64,
}

/// Unchecked wire form of `LockdownConfig`.
#[derive(Deserialize)]
struct LockdownConfigFile {
    #[serde(default)]
    dials: BTreeMap<Dial, DialSpace>,
    start: NaiveDate,
    horizon_days: i64,
    #[serde(default = "default_open_ended_days")]
    open_ended_days: i64,
}

impl TryFrom<LockdownConfigFile> for LockdownConfig {
    type Error = ConfigError;

    fn try_from(file: LockdownConfigFile) -> Result<Self, Self::Error> {
        let config = Self {
            dials: file.dials,
            start: file.start,
            horizon_days: file.horizon_days,
            open_ended_days: file.open_ended_days,
        };
        config.validate()?;
        Ok(config)
    }
}

const fn default_open_ended_days() -> i64 {
    DEFAULT_OPEN_ENDED_DAYS
}

impl LockdownConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for a non-positive horizon.
    pub fn new(start: NaiveDate, horizon_days: i64) -> Result<Self, ConfigError> {
        if horizon_days < 1 {
            return Err(ConfigError::Invalid {
                reason: format!("search horizon must be positive, got {horizon_days} days"),
            });
        }
        Ok(Self {
            dials: BTreeMap::new(),
            start,
            horizon_days,
            open_ended_days: DEFAULT_OPEN_ENDED_DAYS,
        })
    }

    /// Sets the space of `dial`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidDialSpace` for empty options, values
    /// outside `[0, 1]` or an inverted range.
    pub fn with_dial(mut self, dial: Dial, space: DialSpace) -> Result<Self, ConfigError> {
        space.validate(dial)?;
        self.dials.insert(dial, space);
        Ok(self)
    }

    /// Overrides the open-ended length carried by proposed timelines.
    #[must_use]
    pub const fn with_open_ended_days(mut self, days: i64) -> Self {
        self.open_ended_days = days;
        self
    }

    /// Checks the horizon and every dial space.
    ///
    /// # Errors
    ///
    /// Returns the first invalid dial space or horizon.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon_days < 1 {
            return Err(ConfigError::Invalid {
                reason: format!("search horizon must be positive, got {} days", self.horizon_days),
            });
        }
        self.dials.iter().try_for_each(|(dial, space)| space.validate(*dial))
    }

    /// Configured dials in declaration order.
    pub fn dials(&self) -> impl Iterator<Item = (Dial, &DialSpace)> + '_ {
        self.dials.iter().map(|(d, s)| (*d, s))
    }

    /// First day of proposed timelines.
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Length of proposed timelines.
    #[must_use]
    pub const fn horizon_days(&self) -> i64 {
        self.horizon_days
    }

    /// Draws a policy, one value per configured dial.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a dial space holds an invalid value.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<PolicyVector, ConfigError> {
        self.dials
            .iter()
            .try_fold(PolicyVector::default(), |policy, (dial, space)| {
                policy.with(*dial, space.sample(rng))
            })
    }

    /// The proposal for `policy`: held from `start` over the horizon.
    #[must_use]
    pub fn timeline_for(&self, policy: PolicyVector) -> PolicyTimeline {
        PolicyTimeline::constant(policy, self.start, self.horizon_days).with_open_ended_days(self.open_ended_days)
    }
}
