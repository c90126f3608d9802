//! Planner configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PlannerResult};
use crate::mapper::MapperConfig;
use crate::ode::IntegratorConfig;
use crate::optimize::SwarmConfig;
use crate::policy::DEFAULT_OPEN_ENDED_DAYS;

/// Every tunable of the planner in one place.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Length assumed for an open-ended policy application.
    pub open_ended_days: i64,
    /// Settings of the fitting optimizer.
    pub optimizer: SwarmConfig,
    /// Settings of the ODE integrator.
    pub integrator: IntegratorConfig,
    /// Settings of the policy-to-parameter mapper.
    pub mapper: MapperConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            open_ended_days: DEFAULT_OPEN_ENDED_DAYS,
            optimizer: SwarmConfig::default(),
            integrator: IntegratorConfig::default(),
            mapper: MapperConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found in any section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.open_ended_days < 1 {
            return Err(ConfigError::Invalid {
                reason: format!("open_ended_days must be positive, got {}", self.open_ended_days),
            });
        }
        self.optimizer.validate()?;
        self.integrator.validate()?;
        self.mapper.validate()
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Invalid {
            reason: format!("malformed planner config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `PlannerError::Store` if the file cannot be read, otherwise as
    /// `from_json_str`.
    pub fn from_path(path: impl AsRef<Path>) -> PlannerResult<Self> {
        let json = std::fs::read_to_string(path).map_err(crate::error::StoreError::from)?;
        Ok(Self::from_json_str(&json)?)
    }
}
