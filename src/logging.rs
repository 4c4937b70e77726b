//! Diagnostic logging setup.
//!
//! The terminal UI owns the screen, so in that mode diagnostics go to a file.

use crate::config::APP_DIR;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "my2sql_console=info";
const VERBOSE_LOG_FILTER: &str = "my2sql_console=debug";

pub struct LogConfig {
    pub verbose: bool,
    pub tui_mode: bool,
}

/// `<data dir>/my2sql-console/console.log`, falling back to the temp dir.
pub fn log_file_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("console.log")
}

pub fn init_logging(config: LogConfig) -> Result<()> {
    let fallback = if config.verbose {
        VERBOSE_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if config.tui_mode {
        let path = log_file_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .try_init()
            .context("failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .context("failed to install log subscriber")?;
    }
    Ok(())
}
