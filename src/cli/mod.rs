pub mod archive;
pub mod config;
pub mod run;

use crate::config::SYSTEM_CONFIG_PATH;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};

/// Exit with a hint when no config file could be found.
pub(crate) fn require_config(config_path: Option<PathBuf>) -> PathBuf {
    match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/spike/config.yml");
            eprintln!("  {}", SYSTEM_CONFIG_PATH);
            eprintln!("\nUse --config <path> to specify a config file, or run 'spike config init' to generate one.");
            std::process::exit(1);
        }
    }
}

/// Exit status for a run killed by a second Ctrl+C.
const FORCED_EXIT_CODE: i32 = 130;

/// Stop flag flipped by the first Ctrl+C. A second one exits immediately.
pub(crate) fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut signals = 0u32;
        while tokio::signal::ctrl_c().await.is_ok() {
            signals += 1;
            if !record_interrupt(signals, &shutdown_tx) {
                warn!("Second interrupt, exiting without waiting for the pipeline");
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    });
    shutdown_rx
}

/// Handle the `count`-th interrupt. Returns `false` once a graceful stop has
/// already been requested and the process should exit.
fn record_interrupt(count: u32, shutdown_tx: &watch::Sender<bool>) -> bool {
    if count > 1 {
        return false;
    }
    info!("Shutdown signal received, finishing current batch (Ctrl+C again to force exit)");
    let _ = shutdown_tx.send(true);
    true
}
