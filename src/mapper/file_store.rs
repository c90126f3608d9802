//! On-disk mapper cache.
//!
//! Each model key owns one `<key>.mapper` file:
//! ```text
//! [magic "LKDP"][format: u8][payload length: u32 LE][crc32 of payload: u32 LE][payload: JSON]
//! ```
//! Writes go to a sibling temp file that is synced and renamed into place,
//! so readers never observe a half-written artifact.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

use super::store::{MapperArtifact, MapperStore, ModelKey};

const MAGIC: &[u8; 4] = b"LKDP";
const FORMAT: u8 = 2;
const HEADER_LEN: usize = MAGIC.len() + 1 + 4 + 4;

/// Payloads larger than this are treated as corrupt.
const MAX_PAYLOAD: usize = 100 * 1024 * 1024;

/// Mapper cache with one checksummed file per model key.
#[derive(Debug, Clone)]
pub struct FileMapperStore {
    dir: PathBuf,
}

impl FileMapperStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the artifacts.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &ModelKey) -> PathBuf {
        self.dir.join(format!("{key}.mapper"))
    }

    fn pack(artifact: &MapperArtifact) -> Result<Vec<u8>, StoreError> {
        let payload = serde_json::to_vec(artifact).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|_| payload.len() <= MAX_PAYLOAD)
            .ok_or_else(|| {
                StoreError::Serialization(format!(
                    "artifact of {} bytes is over the {MAX_PAYLOAD} byte limit",
                    payload.len()
                ))
            })?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT);
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    fn unpack(bytes: &[u8]) -> Result<MapperArtifact, StoreError> {
        let corrupt = |what: String| StoreError::Serialization(format!("corrupt mapper file: {what}"));
        let word = |at: usize| {
            bytes
                .get(at..at + 4)
                .and_then(|b| <[u8; 4]>::try_from(b).ok())
                .map(u32::from_le_bytes)
                .ok_or_else(|| corrupt(format!("truncated at byte {at}")))
        };

        if bytes.get(..MAGIC.len()) != Some(MAGIC.as_slice()) {
            return Err(corrupt("bad magic bytes".to_string()));
        }
        let format = bytes[MAGIC.len()..].first().copied().ok_or_else(|| corrupt("missing format".to_string()))?;
        if format != FORMAT {
            return Err(StoreError::VersionMismatch {
                found: u32::from(format),
                expected: u32::from(FORMAT),
            });
        }
        let len = word(MAGIC.len() + 1)? as usize;
        let checksum = word(MAGIC.len() + 5)?;
        if len > MAX_PAYLOAD {
            return Err(corrupt(format!("payload length {len} is over the limit")));
        }
        let payload = bytes
            .get(HEADER_LEN..HEADER_LEN + len)
            .ok_or_else(|| corrupt(format!("expected {len} payload bytes, found {}", bytes.len() - HEADER_LEN)))?;
        let computed = crc32fast::hash(payload);
        if computed != checksum {
            return Err(corrupt(format!("checksum {computed:08x} does not match stored {checksum:08x}")));
        }

        let artifact: MapperArtifact =
            serde_json::from_slice(payload).map_err(|e| StoreError::Serialization(e.to_string()))?;
        artifact.check_version()?;
        Ok(artifact)
    }
}

impl MapperStore for FileMapperStore {
    fn load(&self, key: &ModelKey) -> Result<Option<MapperArtifact>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Self::unpack(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, artifact: &MapperArtifact) -> Result<(), StoreError> {
        let bytes = Self::pack(artifact)?;
        let path = self.path_for(&artifact.key);
        let tmp = path.with_extension("mapper.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &path)?;
        tracing::debug!(target: "mapper", key = %artifact.key, bytes = bytes.len(), "mapper_saved");
        Ok(())
    }
}
