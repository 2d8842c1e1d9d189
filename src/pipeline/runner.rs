use crate::collector::{Collector, CollectorError};
use crate::config::types::Config;
use crate::pipeline::channel::{create_channel, EndReason, Message};
use crate::sink::{Sink, SinkError};
use crate::source::upstream::Upstream;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Records the collector received and forwarded.
    pub collected: u64,
    /// Records written to disk.
    pub persisted: u64,
    /// Output files in flush order.
    pub files: Vec<PathBuf>,
    pub end: EndReason,
}

/// Run one collector and one sink against each other until the source is
/// exhausted, a stop is requested, or either side fails.
///
/// The sink's output directory is created before either task starts. When
/// both sides fail, the sink's error wins: the collector only saw the
/// consequence (a closed channel).
pub async fn run_pipeline(
    config: &Config,
    upstream: Arc<dyn Upstream>,
    shutdown: watch::Receiver<bool>,
) -> Result<PipelineReport, PipelineError> {
    let sink = Sink::new(config.sink.clone());
    sink.prepare()?;

    let (tx, rx) = create_channel::<Message>(config.channel_capacity);

    info!(
        source = %config.collector.spec,
        rotation = %config.sink.policy,
        capacity = config.channel_capacity,
        "Starting pipeline"
    );

    let collector = Collector::new(upstream, config.collector.clone(), tx, shutdown);
    let collector_handle = tokio::spawn(collector.run());
    let sink_handle = tokio::spawn(sink.run(rx));

    let collected = collector_handle.await;
    let persisted = sink_handle.await;

    let sink_report = match persisted {
        Ok(Ok(report)) => report,
        Ok(Err(e)) => {
            error!(error = %e, "Sink failed");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let collector_report = collected??;

    let report = PipelineReport {
        collected: collector_report.records,
        persisted: sink_report.records,
        files: sink_report.files,
        end: collector_report.end,
    };

    info!(
        collected = report.collected,
        persisted = report.persisted,
        files = report.files.len(),
        end = %report.end,
        "Pipeline finished"
    );

    Ok(report)
}
