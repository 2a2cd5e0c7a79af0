use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs::{create_dir_all, read, remove_file, rename, write};
use tracing::{error, trace};
use uuid::Uuid;

use crate::maven::coordinates::Coordinate;
use crate::maven::paths::{cache_directory, maven_file_name};

const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache entry for {coordinate} is corrupted: {reason}")]
    Corrupted {
        coordinate: String,
        reason: String,
    },
    #[error("cache I/O error for {coordinate}: {reason}")]
    Io {
        coordinate: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub coordinate: Coordinate,
    pub path: PathBuf,
    /// hex encoded SHA1 of the payload
    pub sha1: String,
    pub fetched_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize)]
struct EntryMetaData {
    sha1: String,
    #[serde(with = "time::serde::rfc3339")]
    fetched_at: OffsetDateTime,
}

/// Artifacts cached on the local file system, one directory per coordinate (minus extension).
///
/// An entry consists of the payload file and a sidecar with its hash and fetch time. Both are
///  written to temporary files first and published by renaming, the sidecar last: an entry is
///  visible to [LocalCache::lookup] only once its sidecar exists, so a failed or interrupted
///  store never exposes partial data.
///
/// This type does no locking of its own: concurrent stores for the same coordinate are
///  serialized by the caller (see [crate::cache::fetcher::ArtifactFetcher]).
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> LocalCache {
        LocalCache {
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn payload_path(&self, coordinate: &Coordinate) -> Result<PathBuf, CacheError> {
        coordinate.check_path_safe()
            .map_err(|reason| CacheError::Io {
                coordinate: coordinate.to_string(),
                reason: format!("not storable below {}: {}", self.root.display(), reason),
            })?;

        let mut result = self.root.clone();
        result.push(cache_directory(coordinate));
        result.push(maven_file_name(coordinate));
        Ok(result)
    }

    fn sidecar_path(payload_path: &Path) -> PathBuf {
        let mut file_name = payload_path.file_name().unwrap_or_default().to_os_string();
        file_name.push(SIDECAR_SUFFIX);
        payload_path.with_file_name(file_name)
    }

    pub async fn lookup(&self, coordinate: &Coordinate) -> Result<Option<CacheEntry>, CacheError> {
        let payload_path = self.payload_path(coordinate)?;
        let sidecar_path = Self::sidecar_path(&payload_path);
        trace!("looking up {} in {}", coordinate, payload_path.display());

        let sidecar = match read(&sidecar_path).await {
            Ok(sidecar) => sidecar,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(coordinate, e)),
        };
        let metadata: EntryMetaData = serde_json::from_slice(&sidecar)
            .map_err(|e| corrupted(coordinate, format!("unreadable sidecar: {}", e)))?;

        let payload = match read(&payload_path).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(corrupted(coordinate, "payload missing".to_string())),
            Err(e) => return Err(io_error(coordinate, e)),
        };

        let actual = hex::encode(Sha1::digest(&payload));
        if actual != metadata.sha1 {
            return Err(corrupted(coordinate, format!("expected SHA1 {}, found {}", metadata.sha1, actual)));
        }

        Ok(Some(CacheEntry {
            coordinate: coordinate.clone(),
            path: payload_path,
            sha1: metadata.sha1,
            fetched_at: metadata.fetched_at,
        }))
    }

    /// Stores a payload, replacing any previous entry for the coordinate. Storing content that
    ///  is identical to the existing entry returns that entry unchanged.
    pub async fn store(&self, coordinate: &Coordinate, data: &[u8]) -> Result<CacheEntry, CacheError> {
        let sha1 = hex::encode(Sha1::digest(data));

        if let Ok(Some(existing)) = self.lookup(coordinate).await {
            if existing.sha1 == sha1 {
                trace!("{} already cached with identical content", coordinate);
                return Ok(existing);
            }
        }

        let payload_path = self.payload_path(coordinate)?;
        let sidecar_path = Self::sidecar_path(&payload_path);
        let directory = payload_path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        create_dir_all(&directory).await
            .map_err(|e| io_error(coordinate, e))?;

        let key = Uuid::new_v4();
        let temp_payload = directory.join(format!(".{}.inserting", key.as_hyphenated()));
        let temp_sidecar = directory.join(format!(".{}.meta.inserting", key.as_hyphenated()));

        trace!("storing {} via temporary file {}", coordinate, temp_payload.display());

        let metadata = EntryMetaData {
            sha1: sha1.clone(),
            fetched_at: OffsetDateTime::now_utc(),
        };

        // removes the temporary files if storing fails or the future is dropped half way
        let temp_files = TempFiles(vec![temp_payload.clone(), temp_sidecar.clone()]);
        Self::do_store(&metadata, data, &temp_payload, &temp_sidecar, &payload_path, &sidecar_path).await
            .map_err(|e| io_error(coordinate, e))?;
        temp_files.disarm();

        Ok(CacheEntry {
            coordinate: coordinate.clone(),
            path: payload_path,
            sha1,
            fetched_at: metadata.fetched_at,
        })
    }

    async fn do_store(
        metadata: &EntryMetaData,
        data: &[u8],
        temp_payload: &Path,
        temp_sidecar: &Path,
        payload_path: &Path,
        sidecar_path: &Path,
    ) -> std::io::Result<()> {
        let metadata_json = serde_json::to_vec(metadata)?;
        write(temp_payload, data).await?;
        write(temp_sidecar, metadata_json).await?;

        // unpublish the previous entry before its payload is replaced
        match remove_file(sidecar_path).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        rename(temp_payload, payload_path).await?;
        rename(temp_sidecar, sidecar_path).await?;
        Ok(())
    }
}

struct TempFiles(Vec<PathBuf>);

impl TempFiles {
    fn disarm(mut self) {
        self.0.clear();
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            match std::fs::remove_file(path) {
                Ok(_) => trace!("removed leftover temporary file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => error!("error cleaning up temporary file {}: {}", path.display(), e),
            }
        }
    }
}

fn corrupted(coordinate: &Coordinate, reason: String) -> CacheError {
    CacheError::Corrupted {
        coordinate: coordinate.to_string(),
        reason,
    }
}

fn io_error(coordinate: &Coordinate, e: std::io::Error) -> CacheError {
    CacheError::Io {
        coordinate: coordinate.to_string(),
        reason: e.to_string(),
    }
}
