use crate::cli::{require_config, shutdown_on_ctrl_c};
use crate::config::parse::{load_config, ConfigError};
use crate::pipeline::{run_pipeline, PipelineError, PipelineReport};
use crate::source::http::HttpUpstream;
use crate::source::upstream::UpstreamError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot create upstream client: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config(config_path);
    run_collection(&config_path).await?;
    Ok(())
}

async fn run_collection(config_path: &Path) -> Result<PipelineReport, RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let upstream = Arc::new(HttpUpstream::new(&config.upstream)?);
    info!(base_url = %upstream.base_url(), "Upstream client ready");

    let shutdown = shutdown_on_ctrl_c();
    info!("Collection started, press Ctrl+C to stop");

    Ok(run_pipeline(&config, upstream, shutdown).await?)
}
