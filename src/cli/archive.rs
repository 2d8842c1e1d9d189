use crate::archive::runner::log_pass;
use crate::archive::{build_store, ArchiveJob};
use crate::cli::{require_config, shutdown_on_ctrl_c};
use crate::config::parse::load_config;
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

pub async fn archive(
    config_path: Option<PathBuf>,
    once: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config(config_path);
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(&config_path)?;

    let settings = config.archive.ok_or_else(|| {
        format!(
            "no 'archive' section in {}; add one to use 'spike archive'",
            config_path.display()
        )
    })?;

    let store = build_store(&settings.store)?;
    let job = ArchiveJob::new(settings, store);

    if once {
        let report = job.run_pass(Utc::now().naive_utc()).await?;
        log_pass(&report);
        if let Some(file) = report.failed {
            return Err(format!("upload of {} failed", file).into());
        }
        return Ok(());
    }

    job.run(shutdown_on_ctrl_c()).await?;
    Ok(())
}
