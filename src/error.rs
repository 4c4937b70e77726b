//! Domain error kinds for the console.
//!
//! Every failure is terminal at the boundary where it occurs; the console turns
//! these into notices and returns to an idle-equivalent state.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("engine error: {0}")]
    Engine(String),
    #[error("stop signal could not be delivered to the engine")]
    StopDelivery,
    #[error("a task is already running")]
    AlreadyRunning,
}

/// Missing or out-of-range fields that block submission. No engine call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("connection string is required")]
    MissingConnection,
    #[error("output directory is required")]
    MissingOutputDir,
    #[error("a target database must be selected")]
    MissingDatabase,
    #[error("test the connection successfully before starting an analysis")]
    NotConnected,
    #[error("thread count {0} is outside 1..=64")]
    ThreadsOutOfRange(u32),
    #[error("invalid datetime {0:?}, expected YYYY-MM-DD HH:mm:ss")]
    InvalidDatetime(String),
    #[error("start datetime must be earlier than stop datetime")]
    EmptyTimeWindow,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report {path} is unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report line {line} is malformed: {reason}")]
    Parse { line: usize, reason: String },
}
