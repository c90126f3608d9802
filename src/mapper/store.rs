//! Persistence port for fitted mappers.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{DiseaseModel, FittedModelState};
use crate::parameter::ParameterConfig;

use super::ParameterMapper;

/// Version of the `MapperArtifact` layout.
pub const ARTIFACT_VERSION: u32 = 1;

fn lock_err(context: &'static str) -> StoreError {
    StoreError::Backend(format!("poisoned lock: {context}"))
}

/// Identity of a model for caching: a blake3 digest of its name and
/// parameter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelKey(String);

impl ModelKey {
    /// Hashes arbitrary identity bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// Key of a model with the given name and parameters.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the configuration cannot be
    /// serialized.
    pub fn new(name: &str, parameters: &ParameterConfig) -> Result<Self, StoreError> {
        let mut hasher = blake3::Hasher::new();
        Self::feed(&mut hasher, name, parameters)?;
        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    /// Key of a disease model. Ensembles hash their members in order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if a configuration cannot be
    /// serialized.
    pub fn for_model(model: &DiseaseModel) -> Result<Self, StoreError> {
        let mut hasher = blake3::Hasher::new();
        Self::feed_model(&mut hasher, model)?;
        Ok(Self(hasher.finalize().to_hex().to_string()))
    }

    fn feed_model(hasher: &mut blake3::Hasher, model: &DiseaseModel) -> Result<(), StoreError> {
        match model {
            DiseaseModel::Sir(engine) => Self::feed(hasher, engine.name(), engine.parameter_config()),
            DiseaseModel::Seir(engine) => Self::feed(hasher, engine.name(), engine.parameter_config()),
            DiseaseModel::AuquanSeir(engine) => Self::feed(hasher, engine.name(), engine.parameter_config()),
            DiseaseModel::Ensemble(ensemble) => {
                hasher.update(b"ensemble\0");
                for member in ensemble.members() {
                    Self::feed_model(hasher, member)?;
                }
                Ok(())
            }
        }
    }

    fn feed(hasher: &mut blake3::Hasher, name: &str, parameters: &ParameterConfig) -> Result<(), StoreError> {
        let config = serde_json::to_vec(parameters).map_err(|e| StoreError::Serialization(e.to_string()))?;
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(&config);
        hasher.update(b"\0");
        Ok(())
    }

    /// Hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier of a saved artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(uuid::Uuid);

impl ArtifactId {
    /// Creates a new random artifact ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fitted mapper together with the discount tables it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapperArtifact {
    /// Identifier of this save.
    pub id: ArtifactId,
    /// Layout version, checked on load.
    pub version: u32,
    /// Model the mapper belongs to.
    pub key: ModelKey,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// The fitted mapper.
    pub mapper: ParameterMapper,
    /// Fitted states the mapper was trained on.
    pub discount_tables: Vec<FittedModelState>,
}

impl MapperArtifact {
    /// Wraps a freshly fitted mapper at the current layout version.
    #[must_use]
    pub fn new(key: ModelKey, mapper: ParameterMapper, discount_tables: Vec<FittedModelState>) -> Self {
        Self {
            id: ArtifactId::new(),
            version: ARTIFACT_VERSION,
            key,
            created_at: Utc::now(),
            mapper,
            discount_tables,
        }
    }

    /// # Errors
    ///
    /// Returns `StoreError::VersionMismatch` for artifacts written by another
    /// layout version.
    pub const fn check_version(&self) -> Result<(), StoreError> {
        if self.version != ARTIFACT_VERSION {
            return Err(StoreError::VersionMismatch {
                found: self.version,
                expected: ARTIFACT_VERSION,
            });
        }
        Ok(())
    }
}

/// Load/save port for mapper artifacts.
///
/// Implementations must be safe to share across threads.
pub trait MapperStore: Send + Sync {
    /// Returns the artifact stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on backend failure or an incompatible artifact.
    fn load(&self, key: &ModelKey) -> Result<Option<MapperArtifact>, StoreError>;

    /// Stores `artifact` under its key, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on backend failure.
    fn save(&self, artifact: &MapperArtifact) -> Result<(), StoreError>;
}

/// Thread-safe in-memory store for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryMapperStore {
    artifacts: RwLock<HashMap<ModelKey, MapperArtifact>>,
}

impl InMemoryMapperStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.artifacts.read().map_err(|_| lock_err("mapper.len"))?.len())
    }
}

impl MapperStore for InMemoryMapperStore {
    fn load(&self, key: &ModelKey) -> Result<Option<MapperArtifact>, StoreError> {
        let artifacts = self.artifacts.read().map_err(|_| lock_err("mapper.load"))?;
        let Some(artifact) = artifacts.get(key) else {
            return Ok(None);
        };
        artifact.check_version()?;
        Ok(Some(artifact.clone()))
    }

    fn save(&self, artifact: &MapperArtifact) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.write().map_err(|_| lock_err("mapper.save"))?;
        artifacts.insert(artifact.key.clone(), artifact.clone());
        Ok(())
    }
}
