//! Model parameter definitions.
//!
//! A `ParameterConfig` is an ordered set of bounded parameters. The order is
//! what links the optimizer's flat vectors to named values: `parse` and
//! `flatten` are exact inverses for vectors of the declared length.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Named parameter values.
pub type ParamMap = BTreeMap<String, f64>;

/// A single bounded model parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name used in parameter maps.
    pub name: String,
    /// Human-readable meaning.
    pub description: String,
    /// Inclusive search bounds `[lo, hi]`.
    pub bounds: (f64, f64),
    /// Whether the fitted value changes with the active policy.
    #[serde(default)]
    pub policy_dependent: bool,
}

impl Parameter {
    /// A parameter that does not vary with policy.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, lo: f64, hi: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            bounds: (lo, hi),
            policy_dependent: false,
        }
    }

    /// Marks the parameter as policy-dependent.
    #[must_use]
    pub fn policy_dependent(mut self) -> Self {
        self.policy_dependent = true;
        self
    }
}

/// Ordered set of parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Parameter>", into = "Vec<Parameter>")]
pub struct ParameterConfig {
    parameters: Vec<Parameter>,
}

impl ParameterConfig {
    /// Creates a config, checking names are unique and bounds are ordered.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingParameterConfig` for an empty list,
    /// `ConfigError::DuplicateParameter` or `ConfigError::InvalidBounds`.
    pub fn new(parameters: Vec<Parameter>) -> Result<Self, ConfigError> {
        if parameters.is_empty() {
            return Err(ConfigError::MissingParameterConfig);
        }
        let mut seen = HashSet::new();
        for param in &parameters {
            if !seen.insert(param.name.as_str()) {
                return Err(ConfigError::DuplicateParameter {
                    name: param.name.clone(),
                });
            }
            let (lo, hi) = param.bounds;
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(ConfigError::InvalidBounds {
                    name: param.name.clone(),
                    lo,
                    hi,
                });
            }
        }
        Ok(Self { parameters })
    }

    /// Built-in tables whose names and bounds are known to be valid.
    pub(crate) fn builtin(parameters: Vec<Parameter>) -> Self {
        debug_assert!(Self::new(parameters.clone()).is_ok());
        Self { parameters }
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Parameters in vector order.
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.parameters.iter()
    }

    /// Looks up a parameter by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Position of `name` in vector form.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownParameter` if the name is not declared.
    pub fn index_of(&self, name: &str) -> Result<usize, ConfigError> {
        self.parameters
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownParameter {
                name: name.to_string(),
            })
    }

    /// Names in vector order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Parameters refitted per policy.
    pub fn policy_dependent(&self) -> impl Iterator<Item = &Parameter> + '_ {
        self.parameters.iter().filter(|p| p.policy_dependent)
    }

    /// Search bounds in vector order.
    #[must_use]
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| p.bounds).collect()
    }

    /// Declared parameters absent from `values`, in declaration order.
    #[must_use]
    pub fn missing(&self, values: &ParamMap) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| !values.contains_key(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }

    /// Vector → mapping.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParameterCountMismatch` if the lengths differ.
    pub fn parse(&self, values: &[f64]) -> Result<ParamMap, ConfigError> {
        if values.len() != self.parameters.len() {
            return Err(ConfigError::ParameterCountMismatch {
                expected: self.parameters.len(),
                actual: values.len(),
            });
        }
        Ok(self
            .parameters
            .iter()
            .zip(values)
            .map(|(param, value)| (param.name.clone(), *value))
            .collect())
    }

    /// Mapping → vector, in declaration order. Extra keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingParameterValue` for the first absent parameter.
    pub fn flatten(&self, values: &ParamMap) -> Result<Vec<f64>, ConfigError> {
        self.parameters
            .iter()
            .map(|param| {
                values
                    .get(&param.name)
                    .copied()
                    .ok_or_else(|| ConfigError::MissingParameterValue {
                        name: param.name.clone(),
                    })
            })
            .collect()
    }

    /// Checks that every key in `values` is declared.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownParameter` for the first undeclared key.
    pub fn check_known(&self, values: &ParamMap) -> Result<(), ConfigError> {
        match values.keys().find(|name| self.get(name).is_none()) {
            Some(name) => Err(ConfigError::UnknownParameter { name: name.clone() }),
            None => Ok(()),
        }
    }
}

impl TryFrom<Vec<Parameter>> for ParameterConfig {
    type Error = ConfigError;

    fn try_from(parameters: Vec<Parameter>) -> Result<Self, Self::Error> {
        Self::new(parameters)
    }
}

impl From<ParameterConfig> for Vec<Parameter> {
    fn from(config: ParameterConfig) -> Self {
        config.parameters
    }
}

impl<'a> IntoIterator for &'a ParameterConfig {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ParameterConfig {
        ParameterConfig::new(vec![
            Parameter::new("beta", "Infection rate", 0.0, 10.0).policy_dependent(),
            Parameter::new("gamma", "Recovery rate", 1.0 / 30.0, 1.0 / 5.0),
            Parameter::new("cfr", "Case fatality rate", 0.0, 0.05),
        ])
        .unwrap()
    }

    #[test]
    fn test_parse_flatten_roundtrip() {
        let config = config();
        let values = vec![2.5, 0.1, 0.01];
        let parsed = config.parse(&values).unwrap();
        assert_eq!(parsed["beta"], 2.5);
        assert_eq!(parsed["gamma"], 0.1);
        assert_eq!(config.flatten(&parsed).unwrap(), values);
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert_eq!(
            config().parse(&[1.0]),
            Err(ConfigError::ParameterCountMismatch { expected: 3, actual: 1 })
        );
    }

    #[test]
    fn test_flatten_reports_missing_value() {
        let mut values = ParamMap::new();
        values.insert("beta".to_string(), 1.0);
        assert_eq!(
            config().flatten(&values),
            Err(ConfigError::MissingParameterValue { name: "gamma".to_string() })
        );
        assert_eq!(config().missing(&values), vec!["gamma", "cfr"]);
    }

    #[test]
    fn test_new_validates() {
        assert_eq!(ParameterConfig::new(Vec::new()), Err(ConfigError::MissingParameterConfig));
        assert!(matches!(
            ParameterConfig::new(vec![Parameter::new("a", "", 1.0, 0.0)]),
            Err(ConfigError::InvalidBounds { .. })
        ));
        assert!(matches!(
            ParameterConfig::new(vec![Parameter::new("a", "", 0.0, 1.0), Parameter::new("a", "", 0.0, 1.0)]),
            Err(ConfigError::DuplicateParameter { .. })
        ));
    }

    #[test]
    fn test_policy_dependent_and_lookup() {
        let config = config();
        let dependent: Vec<_> = config.policy_dependent().map(|p| p.name.as_str()).collect();
        assert_eq!(dependent, vec!["beta"]);
        assert_eq!(config.index_of("cfr").unwrap(), 2);
        assert!(config.index_of("sigma").is_err());

        let mut values = ParamMap::new();
        values.insert("sigma".to_string(), 1.0);
        assert!(matches!(config.check_known(&values), Err(ConfigError::UnknownParameter { .. })));
    }

    #[test]
    fn test_serde_validates() {
        let json = serde_json::to_string(&config()).unwrap();
        let decoded: ParameterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config());
        assert!(serde_json::from_str::<ParameterConfig>("[]").is_err());
    }
}
