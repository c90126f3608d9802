//! Generalises fitted discount factors to unseen policies.
//!
//! A `ParameterMapper` is trained on every (policy, discounts) pair in one or
//! more fitted models and answers discount queries for arbitrary policies by
//! k-nearest-neighbour regression over the dial values.

#[cfg(feature = "persistent")]
pub mod file_store;
pub mod knn;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, PlannerResult};
use crate::model::FittedModelState;
use crate::parameter::ParamMap;
use crate::policy::PolicyVector;

pub use knn::{KNeighborsRegressor, Weighting};
#[cfg(feature = "persistent")]
pub use file_store::FileMapperStore;
pub use store::{ArtifactId, InMemoryMapperStore, MapperArtifact, MapperStore, ModelKey, ARTIFACT_VERSION};

/// Regressor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Neighbours averaged per query.
    pub n_neighbors: usize,
    /// How neighbours are weighted.
    pub weighting: Weighting,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 3,
            weighting: Weighting::Distance,
        }
    }
}

impl MapperConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when `n_neighbors` is zero.
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        if self.n_neighbors == 0 {
            return Err(crate::error::ConfigError::Invalid {
                reason: "mapper.n_neighbors must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Policy vector to discount regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMapper {
    knn: KNeighborsRegressor,
    param_keys: Vec<String>,
}

impl ParameterMapper {
    /// Trains on the discount tables of `states`.
    ///
    /// Parameter names come from the first discount entry; every other entry
    /// must carry the same names.
    ///
    /// # Errors
    ///
    /// Returns `MapperError::EmptyTrainingSet` when no state has discounts and
    /// `MapperError::InconsistentKeys` when entries name different parameters.
    pub fn fit(states: &[&FittedModelState], config: &MapperConfig) -> Result<Self, MapperError> {
        let mut param_keys: Option<Vec<String>> = None;
        let mut features = Vec::new();
        let mut targets = Vec::new();

        for state in states {
            for policy in state.policies() {
                let Some(discounts) = state.discounts.get(policy) else {
                    continue;
                };
                let keys = param_keys.get_or_insert_with(|| discounts.keys().cloned().collect());
                if let Some(extra) = discounts.keys().find(|k| !keys.contains(k)) {
                    return Err(MapperError::InconsistentKeys { name: extra.clone() });
                }
                let row = keys
                    .iter()
                    .map(|k| {
                        discounts
                            .get(k)
                            .copied()
                            .ok_or_else(|| MapperError::InconsistentKeys { name: k.clone() })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                features.push(policy.features().to_vec());
                targets.push(row);
            }
        }

        let mut knn = KNeighborsRegressor::new(config.n_neighbors, config.weighting);
        knn.fit(features, targets)?;
        tracing::info!(
            target: "mapper",
            samples = knn.len(),
            n_neighbors = config.n_neighbors,
            "mapper_fitted"
        );
        Ok(Self {
            knn,
            param_keys: param_keys.unwrap_or_default(),
        })
    }

    /// Loads the mapper stored under `key`, or fits one and stores it.
    ///
    /// # Errors
    ///
    /// Returns `PlannerError::Store` on backend failure and
    /// `PlannerError::Mapper` if fitting fails.
    pub fn load_or_fit(
        store: &dyn MapperStore,
        key: &ModelKey,
        states: &[&FittedModelState],
        config: &MapperConfig,
    ) -> PlannerResult<Self> {
        if let Some(artifact) = store.load(key)? {
            tracing::info!(target: "mapper", key = %key, artifact = %artifact.id, "mapper_cache_hit");
            return Ok(artifact.mapper);
        }
        tracing::info!(target: "mapper", key = %key, "mapper_cache_miss");

        let mapper = Self::fit(states, config)?;
        let artifact = MapperArtifact::new(key.clone(), mapper.clone(), states.iter().map(|s| (*s).clone()).collect());
        store.save(&artifact)?;
        tracing::info!(target: "mapper", key = %key, artifact = %artifact.id, "mapper_saved");
        Ok(mapper)
    }

    /// Predicted discounts for `policy`, keyed by parameter name.
    ///
    /// # Errors
    ///
    /// Propagates regression failures.
    pub fn get(&self, policy: &PolicyVector) -> Result<ParamMap, MapperError> {
        let prediction = self.knn.predict(policy.features())?;
        Ok(self.param_keys.iter().cloned().zip(prediction).collect())
    }

    /// Parameter names in prediction order.
    #[must_use]
    pub fn param_keys(&self) -> &[String] {
        &self.param_keys
    }

    /// The trained regressor.
    #[must_use]
    pub const fn regressor(&self) -> &KNeighborsRegressor {
        &self.knn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Dial;

    fn curfew(value: f64) -> PolicyVector {
        PolicyVector::from_pairs([(Dial::Curfew, value)]).unwrap()
    }

    fn discounts(alpha: f64, beta: f64) -> ParamMap {
        ParamMap::from([("alpha".to_string(), alpha), ("beta".to_string(), beta)])
    }

    fn state() -> FittedModelState {
        let mut state = FittedModelState::default();
        state.discounts.insert(curfew(1.0), discounts(1.0, 1.0));
        state.discounts.insert(curfew(0.5), discounts(0.75, 0.5));
        state.discounts.insert(curfew(0.0), discounts(0.5, 0.0));
        state
    }

    #[test]
    fn test_seen_policies_return_their_discounts() {
        let state = state();
        let mapper = ParameterMapper::fit(&[&state], &MapperConfig::default()).unwrap();
        for (policy, expected) in &state.discounts {
            assert_eq!(&mapper.get(policy).unwrap(), expected);
        }
    }

    #[test]
    fn test_unseen_policy_interpolates() {
        let state = state();
        let mapper = ParameterMapper::fit(&[&state], &MapperConfig::default()).unwrap();
        let params = mapper.get(&curfew(0.75)).unwrap();
        assert!(0.75 < params["alpha"] && params["alpha"] < 1.0);
        assert!(0.5 < params["beta"] && params["beta"] < 1.0);
    }

    #[test]
    fn test_fit_across_models() {
        let mut first = FittedModelState::default();
        first.discounts.insert(curfew(1.0), discounts(1.0, 1.0));
        let mut second = FittedModelState::default();
        second.discounts.insert(curfew(0.0), discounts(0.5, 0.0));
        let mapper = ParameterMapper::fit(&[&first, &second], &MapperConfig::default()).unwrap();
        assert_eq!(mapper.regressor().len(), 2);
        assert_eq!(mapper.param_keys(), ["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_empty_training_set() {
        let empty = FittedModelState::default();
        assert_eq!(
            ParameterMapper::fit(&[&empty], &MapperConfig::default()),
            Err(MapperError::EmptyTrainingSet)
        );
    }

    #[test]
    fn test_inconsistent_keys() {
        let mut state = state();
        state
            .discounts
            .insert(curfew(0.25), ParamMap::from([("gamma".to_string(), 1.0)]));
        assert!(matches!(
            ParameterMapper::fit(&[&state], &MapperConfig::default()),
            Err(MapperError::InconsistentKeys { .. })
        ));
    }

    #[test]
    fn test_load_or_fit_uses_cache() {
        let store = InMemoryMapperStore::new();
        let key = ModelKey::from_bytes(b"sir");
        let state = state();
        let fitted = ParameterMapper::load_or_fit(&store, &key, &[&state], &MapperConfig::default()).unwrap();

        let other = FittedModelState::default();
        let cached = ParameterMapper::load_or_fit(&store, &key, &[&other], &MapperConfig::default()).unwrap();
        assert_eq!(fitted, cached);
    }

    #[test]
    fn test_config_validate() {
        assert!(MapperConfig::default().validate().is_ok());
        let config = MapperConfig {
            n_neighbors: 0,
            ..MapperConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
