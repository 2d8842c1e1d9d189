use crate::pipeline::channel::{EndReason, Message, Receiver};
use crate::sink::rotation::{Batch, RotationPolicy};
use crate::sink::writer::{BatchWriter, WriteError};
use crate::source::timestamp::TimestampFormat;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot prepare output directory: {0}")]
    Prepare(#[source] WriteError),

    #[error("failed to persist {records} records to {file}: {source}")]
    Persist {
        records: usize,
        file: String,
        #[source]
        source: WriteError,
    },
}

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub policy: RotationPolicy,
    pub output_directory: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,
    pub timestamps: TimestampFormat,
    /// Extra attempts for a flush that failed.
    pub write_retries: u32,
    pub write_retry_delay: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Files written, in flush order.
    pub files: Vec<PathBuf>,
    pub records: u64,
    /// `None` when the channel closed without an end marker.
    pub end: Option<EndReason>,
}

/// Drains the channel into batches and writes each batch to its own file
/// when the rotation policy says so.
///
/// Whatever is still buffered when the end marker arrives (or the channel
/// closes) is flushed as a final, possibly short, file.
pub struct Sink {
    policy: RotationPolicy,
    writer: BatchWriter,
    write_retries: u32,
    write_retry_delay: Duration,
    batch: Batch,
    last_flush: Instant,
    report: SinkReport,
}

impl Sink {
    pub fn new(settings: SinkSettings) -> Self {
        let writer = BatchWriter::new(
            settings.output_directory,
            settings.file_prefix,
            settings.file_extension,
            settings.timestamps,
        );

        Self {
            policy: settings.policy,
            writer,
            write_retries: settings.write_retries,
            write_retry_delay: settings.write_retry_delay,
            batch: Batch::new(),
            last_flush: Instant::now(),
            report: SinkReport::default(),
        }
    }

    pub fn prepare(&self) -> Result<(), SinkError> {
        self.writer.prepare().map_err(SinkError::Prepare)
    }

    pub async fn run(mut self, mut input: Receiver<Message>) -> Result<SinkReport, SinkError> {
        info!(
            rotation = %self.policy,
            directory = %self.writer.directory().display(),
            "Sink started"
        );
        self.last_flush = Instant::now();

        loop {
            let deadline = self.policy.deadline(&self.batch, self.last_flush);

            let message = tokio::select! {
                message = input.recv() => message,
                _ = wait_until(deadline) => {
                    debug!(records = self.batch.len(), "Rotation interval elapsed");
                    self.flush().await?;
                    continue;
                }
            };

            match message {
                Some(Message::Record(record)) => {
                    self.batch.push(record);
                    if self
                        .policy
                        .is_ready(&self.batch, self.last_flush, Instant::now())
                    {
                        self.flush().await?;
                    }
                }
                Some(Message::StallWarning(warning)) => {
                    warn!(
                        code = ?warning.code,
                        percent_full = ?warning.percent_full,
                        message = ?warning.message,
                        "Upstream reports we are falling behind"
                    );
                }
                Some(Message::End(reason)) => {
                    self.report.end = Some(reason);
                    break;
                }
                None => {
                    warn!("Channel closed without an end marker");
                    break;
                }
            }
        }

        self.flush().await?;

        info!(
            files = self.report.files.len(),
            records = self.report.records,
            "Sink finished"
        );
        Ok(self.report)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let records = self.batch.len();
        let stamp = self.writer.batch_stamp(&self.batch);
        let file_name = self.writer.file_name(&stamp);
        let mut attempt = 0;

        loop {
            match self.writer.write(&self.batch, &file_name).await {
                Ok(path) => {
                    info!(file = %file_name, records = records, "Flushed batch");
                    self.report.files.push(path);
                    self.report.records += records as u64;
                    self.batch.clear();
                    self.last_flush = Instant::now();
                    return Ok(());
                }
                Err(e) if attempt < self.write_retries => {
                    attempt += 1;
                    warn!(
                        file = %file_name,
                        error = %e,
                        attempt = attempt,
                        "Flush failed, retrying"
                    );
                    tokio::time::sleep(self.write_retry_delay).await;
                }
                Err(e) => {
                    error!(file = %file_name, records = records, error = %e, "Flush failed");
                    return Err(SinkError::Persist {
                        records,
                        file: file_name,
                        source: e,
                    });
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
