use crate::error::ConfigError;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use time::{
    format_description::FormatItem, macros::format_description, OffsetDateTime,
    PrimitiveDateTime, UtcOffset,
};

static LOCAL_OFFSET: OnceLock<UtcOffset> = OnceLock::new();

/// Record the local UTC offset. `time` can only read it while the process is
/// single-threaded, so call this before the runtime starts.
pub fn capture_local_offset() {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let _ = LOCAL_OFFSET.set(offset);
}

/// Current time in the offset captured at startup, UTC if none was captured.
pub fn local_now() -> OffsetDateTime {
    let offset = LOCAL_OFFSET.get().copied().unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset)
}

/// Datetime layout shared with the engine: `YYYY-MM-DD HH:mm:ss`.
pub const DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const LOG_TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

/// Direction of the generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    #[default]
    Forward,
    Rollback,
}

impl WorkType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkType::Forward => "forward",
            WorkType::Rollback => "rollback",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            WorkType::Forward => WorkType::Rollback,
            WorkType::Rollback => WorkType::Forward,
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DML statement kinds that can be toggled individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpFlags {
    pub ddl: bool,
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
}

impl Default for OpFlags {
    fn default() -> Self {
        Self {
            ddl: false,
            insert: true,
            update: true,
            delete: true,
        }
    }
}

impl OpFlags {
    pub fn any_dml(&self) -> bool {
        self.insert || self.update || self.delete
    }

    pub fn dml(&self, kind: DmlKind) -> bool {
        match kind {
            DmlKind::Insert => self.insert,
            DmlKind::Update => self.update,
            DmlKind::Delete => self.delete,
        }
    }

    pub fn set_dml(&mut self, kind: DmlKind, on: bool) {
        match kind {
            DmlKind::Insert => self.insert = on,
            DmlKind::Update => self.update = on,
            DmlKind::Delete => self.delete = on,
        }
    }

    pub fn clear_dml(&mut self) {
        self.insert = false;
        self.update = false;
        self.delete = false;
    }
}

/// Inclusive time filter; `None` on either side is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeWindow {
    pub start: Option<PrimitiveDateTime>,
    pub stop: Option<PrimitiveDateTime>,
}

pub fn parse_datetime(raw: &str) -> Result<PrimitiveDateTime, ConfigError> {
    PrimitiveDateTime::parse(raw.trim(), DATETIME_FORMAT)
        .map_err(|_| ConfigError::InvalidDatetime(raw.to_string()))
}

pub fn format_datetime(dt: Option<PrimitiveDateTime>) -> String {
    dt.and_then(|v| v.format(DATETIME_FORMAT).ok())
        .unwrap_or_default()
}

/// Everything the engine needs for one analysis task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    pub connection_string: String,
    pub output_dir: PathBuf,
    pub database: Option<String>,
    /// Empty means every table in `database`.
    pub tables: BTreeSet<String>,
    pub window: TimeWindow,
    pub threads: u32,
    pub work_type: WorkType,
    pub ops: OpFlags,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            output_dir: PathBuf::new(),
            database: None,
            tables: BTreeSet::new(),
            window: TimeWindow::default(),
            threads: 4,
            work_type: WorkType::Forward,
            ops: OpFlags::default(),
        }
    }
}

/// Wire form of a task submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub connection_string: String,
    pub output_dir: String,
    pub databases: Vec<String>,
    pub tables: Vec<String>,
    pub threads: u32,
    #[serde(rename = "includeDDL")]
    pub include_ddl: bool,
    pub include_insert: bool,
    pub include_update: bool,
    pub include_delete: bool,
    #[serde(rename = "worktype")]
    pub work_type: WorkType,
    pub start_datetime: String,
    pub stop_datetime: String,
}

impl From<&TaskConfig> for AnalyzeRequest {
    fn from(cfg: &TaskConfig) -> Self {
        Self {
            connection_string: cfg.connection_string.trim().to_string(),
            output_dir: cfg.output_dir.display().to_string(),
            databases: cfg.database.iter().cloned().collect(),
            tables: cfg.tables.iter().cloned().collect(),
            threads: cfg.threads,
            include_ddl: cfg.ops.ddl,
            include_insert: cfg.ops.insert,
            include_update: cfg.ops.update,
            include_delete: cfg.ops.delete,
            work_type: cfg.work_type,
            start_datetime: format_datetime(cfg.window.start),
            stop_datetime: format_datetime(cfg.window.stop),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
}

/// Result of the most recent connection probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnStatus {
    #[default]
    None,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn generate() -> Self {
        let mut b = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut b);
        SessionId(u64::from_le_bytes(b))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One engine log line, stamped when it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub received_at: OffsetDateTime,
}

impl LogLine {
    pub fn now(text: String) -> Self {
        Self {
            text,
            received_at: local_now(),
        }
    }

    pub fn display_time(&self) -> String {
        self.received_at
            .format(LOG_TIME_FORMAT)
            .unwrap_or_else(|_| "--:--:--".into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: u32,
    pub operation: Operation,
    pub database: String,
    pub table: String,
    pub records: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}
