use crate::sink::rotation::Batch;
use crate::source::timestamp::{format_file_stamp, TimestampFormat};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Turns batches into files named `{prefix}-{stamp}-{uuid}.{ext}`.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    directory: PathBuf,
    prefix: String,
    extension: String,
    timestamps: TimestampFormat,
}

impl BatchWriter {
    pub fn new(
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
        timestamps: TimestampFormat,
    ) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            extension: extension.into(),
            timestamps,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the output directory if it does not exist yet.
    pub fn prepare(&self) -> Result<(), WriteError> {
        std::fs::create_dir_all(&self.directory).map_err(|source| WriteError::Io {
            path: self.directory.clone(),
            source,
        })
    }

    pub fn file_name(&self, stamp: &DateTime<Utc>) -> String {
        format!(
            "{}-{}-{}.{}",
            self.prefix,
            format_file_stamp(stamp),
            Uuid::new_v4(),
            self.extension
        )
    }

    /// Creation time of the last record in the batch, or the current time
    /// when that record has no usable timestamp.
    pub fn batch_stamp(&self, batch: &Batch) -> DateTime<Utc> {
        let Some(last) = batch.last() else {
            return Utc::now();
        };

        match last.created_at() {
            Some(raw) => match self.timestamps.parse(raw) {
                Ok(ts) => ts,
                Err(e) => {
                    warn!(error = %e, "Unparsable record timestamp, naming file after current time");
                    Utc::now()
                }
            },
            None => {
                warn!(id = ?last.id(), "Record has no created_at, naming file after current time");
                Utc::now()
            }
        }
    }

    /// Serialize the batch as a JSON array into `file_name`.
    ///
    /// The content goes to a hidden `.partial` file first and is renamed into
    /// place, so a visible file always holds a complete batch. The file work
    /// runs on the blocking pool.
    pub async fn write(&self, batch: &Batch, file_name: &str) -> Result<PathBuf, WriteError> {
        let payload = serde_json::to_vec(batch.records())?;

        let final_path = self.directory.join(file_name);
        let partial_path = self.directory.join(format!(".{}.partial", file_name));

        tokio::task::spawn_blocking(move || {
            persist(&payload, &partial_path, &final_path)?;
            Ok(final_path)
        })
        .await?
    }
}

fn persist(payload: &[u8], partial_path: &Path, final_path: &Path) -> Result<(), WriteError> {
    let mut file = std::fs::File::create(partial_path).map_err(|e| io_error(partial_path, e))?;
    file.write_all(payload)
        .and_then(|_| file.sync_all())
        .map_err(|e| io_error(partial_path, e))?;
    drop(file);

    if let Err(e) = std::fs::rename(partial_path, final_path) {
        let _ = std::fs::remove_file(partial_path);
        return Err(io_error(final_path, e));
    }

    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> WriteError {
    WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}
