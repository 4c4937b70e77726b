//! Persistent form defaults loaded from `settings.json`.

use crate::model::{OpFlags, TaskConfig, WorkType};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_DIR: &str = "my2sql-console";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub connection_string: String,
    pub output_dir: Option<PathBuf>,
    pub work_type: WorkType,
    pub threads: u32,
    pub ddl: bool,
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
    /// Path or command name of the my2sql binary.
    pub engine_bin: PathBuf,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        let ops = OpFlags::default();
        Self {
            connection_string: "root:password@tcp(127.0.0.1:3306)".into(),
            output_dir: None,
            work_type: WorkType::Forward,
            threads: 4,
            ddl: ops.ddl,
            insert: ops.insert,
            update: ops.update,
            delete: ops.delete,
            engine_bin: PathBuf::from("my2sql"),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Settings {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid settings JSON")
    }

    /// Initial form state before CLI overrides.
    pub fn task_config(&self) -> TaskConfig {
        TaskConfig {
            connection_string: self.connection_string.clone(),
            output_dir: self.output_dir.clone().unwrap_or_default(),
            threads: self.threads,
            work_type: self.work_type,
            ops: OpFlags {
                ddl: self.ddl,
                insert: self.insert,
                update: self.update,
                delete: self.delete,
            },
            ..Default::default()
        }
    }
}

/// `<config dir>/my2sql-console/settings.json`, when the platform has a config dir.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
}

/// Load settings from `explicit`, or from the default location if present.
///
/// An explicit path must exist; a missing default file yields defaults.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_settings_path() {
            Some(p) if p.exists() => p,
            _ => return Ok(Settings::default()),
        },
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    let settings =
        Settings::from_json(&raw).with_context(|| format!("failed to load {}", path.display()))?;
    tracing::debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}
