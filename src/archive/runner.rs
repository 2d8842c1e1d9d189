use crate::archive::compress::{gzip_into, CompressError, GZIP_SUFFIX};
use crate::archive::marker::{Marker, MarkerError, MarkerStore};
use crate::archive::store::{object_name, ObjectStore, StoreError};
use crate::config::types::StoreConfig;
use crate::pipeline::channel::stop_signal;
use crate::source::timestamp::parse_file_stamp;
use chrono::{NaiveDateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot list {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("marker error: {0}")]
    Marker(#[from] MarkerError),
}

/// Why a single file did not reach the store.
#[derive(Debug, Error)]
enum UploadError {
    #[error(transparent)]
    Compress(#[from] CompressError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hidden directory under the source directory that holds compressed copies
/// while they upload.
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub source_directory: PathBuf,
    pub pattern: Regex,
    pub marker_path: PathBuf,
    pub bucket: String,
    pub folder: String,
    pub store: StoreConfig,
    /// Gzip each file before upload. Local copies stay uncompressed.
    pub compress: bool,
    pub retention: Duration,
    pub retry_wait: Duration,
    pub poll_interval: Duration,
}

/// What one pass over the source directory did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub uploaded: Vec<String>,
    /// File whose upload failed; the pass stopped there.
    pub failed: Option<String>,
    pub deleted: Vec<String>,
    /// Matching files without a timestamp in their name.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    path: PathBuf,
    time: NaiveDateTime,
}

/// Mirrors rotated files into an object store and prunes old local copies.
pub struct ArchiveJob {
    settings: ArchiveSettings,
    store: Arc<dyn ObjectStore>,
    markers: MarkerStore,
}

impl ArchiveJob {
    pub fn new(settings: ArchiveSettings, store: Arc<dyn ObjectStore>) -> Self {
        let markers = MarkerStore::new(settings.marker_path.clone());
        Self {
            settings,
            store,
            markers,
        }
    }

    /// Upload everything newer than the marker, oldest first, then delete
    /// local files that are both archived and past retention.
    ///
    /// Uploading stops at the first failure so the marker never moves past a
    /// file that is missing from the store.
    pub async fn run_pass(&self, now: NaiveDateTime) -> Result<PassReport, ArchiveError> {
        let mut report = PassReport::default();
        let mut marker = self.markers.load().await?;
        let candidates = self.scan(&mut report).await?;

        for candidate in &candidates {
            if marker
                .as_ref()
                .is_some_and(|m| m.covers(candidate.time, &candidate.name))
            {
                continue;
            }

            match self.upload(candidate).await {
                Ok(name) => {
                    info!(file = %candidate.name, object = %name, "Uploaded");
                    let next = Marker::new(candidate.name.clone(), candidate.time);
                    self.markers.save(&next).await?;
                    marker = Some(next);
                    report.uploaded.push(candidate.name.clone());
                }
                Err(e) => {
                    warn!(file = %candidate.name, error = %e, "Upload failed");
                    report.failed = Some(candidate.name.clone());
                    break;
                }
            }
        }

        let Some(marker) = marker else {
            return Ok(report);
        };

        let cutoff = chrono::Duration::from_std(self.settings.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
            .unwrap_or(NaiveDateTime::MIN);

        for candidate in &candidates {
            if candidate.time >= cutoff || !marker.covers(candidate.time, &candidate.name) {
                continue;
            }
            match tokio::fs::remove_file(&candidate.path).await {
                Ok(()) => {
                    debug!(file = %candidate.name, "Deleted archived file past retention");
                    report.deleted.push(candidate.name.clone());
                }
                Err(e) => warn!(file = %candidate.name, error = %e, "Failed to delete file"),
            }
        }

        Ok(report)
    }

    /// Repeat passes until a stop is requested. A pass with a failed upload
    /// is retried after `retry_wait`, a clean one after `poll_interval`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ArchiveError> {
        info!(
            directory = %self.settings.source_directory.display(),
            store = %self.store.describe(),
            bucket = %self.settings.bucket,
            "Archive job started"
        );

        loop {
            let wait = match self.run_pass(Utc::now().naive_utc()).await {
                Ok(report) => {
                    log_pass(&report);
                    if report.failed.is_some() {
                        self.settings.retry_wait
                    } else {
                        self.settings.poll_interval
                    }
                }
                Err(ArchiveError::Scan { path, source }) => {
                    error!(path = %path.display(), error = %source, "Cannot list source directory");
                    self.settings.retry_wait
                }
                Err(e) => return Err(e),
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop_signal(&mut shutdown) => {
                    info!("Archive job stopped");
                    return Ok(());
                }
            }
        }
    }

    /// Put one file into the store, compressed if configured, and return the
    /// object name it was stored under.
    async fn upload(&self, candidate: &Candidate) -> Result<String, UploadError> {
        if !self.settings.compress {
            let name = object_name(&self.settings.folder, &candidate.name);
            self.store
                .put(&self.settings.bucket, &name, &candidate.path)
                .await?;
            return Ok(name);
        }

        let staging = self.settings.source_directory.join(STAGING_DIR);
        let staged = gzip_into(&candidate.path, &staging, &candidate.name).await?;
        let name = object_name(
            &self.settings.folder,
            &format!("{}{}", candidate.name, GZIP_SUFFIX),
        );

        let result = self.store.put(&self.settings.bucket, &name, &staged).await;
        discard_staged(&staged).await;
        result?;
        Ok(name)
    }

    async fn scan(&self, report: &mut PassReport) -> Result<Vec<Candidate>, ArchiveError> {
        let dir = &self.settings.source_directory;
        let scan_err = |source| ArchiveError::Scan {
            path: dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(scan_err)?;
        let mut candidates = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(scan_err)? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            // In-flight writes
            if name.starts_with('.') || !self.settings.pattern.is_match(&name) {
                continue;
            }
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            match parse_file_stamp(&name) {
                Some(time) => candidates.push(Candidate {
                    path: entry.path(),
                    name,
                    time,
                }),
                None => {
                    warn!(file = %name, "No timestamp in file name, skipping");
                    report.skipped += 1;
                }
            }
        }

        candidates.sort_by(|a, b| (a.time, &a.name).cmp(&(b.time, &b.name)));
        Ok(candidates)
    }
}

async fn discard_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "Could not remove staged archive");
    }
}

pub(crate) fn log_pass(report: &PassReport) {
    match &report.failed {
        Some(file) => warn!(
            uploaded = report.uploaded.len(),
            deleted = report.deleted.len(),
            failed = %file,
            "Archive pass incomplete, retrying"
        ),
        None => info!(
            uploaded = report.uploaded.len(),
            deleted = report.deleted.len(),
            skipped = report.skipped,
            "Archive pass complete"
        ),
    }
}
