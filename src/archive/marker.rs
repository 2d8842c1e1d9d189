use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarkerError {
    #[error("I/O error on marker {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt marker {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// The newest file known to be in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub file_name: String,
    /// Stamp parsed from `file_name`.
    pub file_time: NaiveDateTime,
    pub updated_at: DateTime<Utc>,
}

impl Marker {
    pub fn new(file_name: impl Into<String>, file_time: NaiveDateTime) -> Self {
        Self {
            file_name: file_name.into(),
            file_time,
            updated_at: Utc::now(),
        }
    }

    /// Whether a file with this stamp and name sorts at or before the marker.
    pub fn covers(&self, file_time: NaiveDateTime, file_name: &str) -> bool {
        (file_time, file_name) <= (self.file_time, self.file_name.as_str())
    }
}

/// JSON file holding the current [`Marker`].
#[derive(Debug, Clone)]
pub struct MarkerStore {
    path: PathBuf,
}

impl MarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no marker has been written yet.
    pub async fn load(&self) -> Result<Option<Marker>, MarkerError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(MarkerError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| MarkerError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    pub async fn save(&self, marker: &Marker) -> Result<(), MarkerError> {
        let io_err = |source| MarkerError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let payload = serde_json::to_vec_pretty(marker).map_err(|source| MarkerError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, payload).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}
