use crate::config::{self, Settings};
use crate::engine::{Engine, My2SqlEngine};
use crate::error::ConfigError;
use crate::model::{parse_datetime, ConnStatus, NoticeLevel, RunStatus, TaskConfig, WorkType};
use crate::orchestrator::{self, Console, ConsoleEvent, UiCommand, NO_RESULTS};
use crate::report;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "my2sql-console",
    version,
    about = "Run my2sql binlog analysis with live logs, optional TUI"
)]
pub struct Cli {
    /// Connection descriptor: user:password@tcp(host:port)
    #[arg(long)]
    pub dsn: Option<String>,

    /// Directory the engine writes SQL files and binlog_status.txt into
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Database to analyze
    #[arg(long)]
    pub database: Option<String>,

    /// Restrict analysis to a table (repeatable); default is every table
    #[arg(long = "table")]
    pub table: Vec<String>,

    /// Only events at or after this time (YYYY-MM-DD HH:mm:ss)
    #[arg(long)]
    pub start_datetime: Option<String>,

    /// Only events at or before this time (YYYY-MM-DD HH:mm:ss)
    #[arg(long)]
    pub stop_datetime: Option<String>,

    /// Engine worker threads (1-64)
    #[arg(long)]
    pub threads: Option<u32>,

    /// Generate forward SQL or rollback SQL
    #[arg(long, value_enum)]
    pub work_type: Option<WorkType>,

    /// Output DDL statements instead of DML
    #[arg(long)]
    pub ddl: bool,

    /// Use --insert false to skip INSERT statements
    #[arg(long, action = clap::ArgAction::Set)]
    pub insert: Option<bool>,

    /// Use --update false to skip UPDATE statements
    #[arg(long, action = clap::ArgAction::Set)]
    pub update: Option<bool>,

    /// Use --delete false to skip DELETE statements
    #[arg(long, action = clap::ArgAction::Set)]
    pub delete: Option<bool>,

    /// Path to the my2sql binary
    #[arg(long)]
    pub engine_bin: Option<PathBuf>,

    /// Timeout for catalog connections
    #[arg(long)]
    pub connect_timeout: Option<humantime::Duration>,

    /// Settings file (default: <config dir>/my2sql-console/settings.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run headless, print logs and a summary, and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Print databases visible through --dsn and exit
    #[arg(long)]
    pub list_databases: bool,

    /// Print tables of --database and exit
    #[arg(long)]
    pub list_tables: bool,

    /// Print the report in --output-dir and exit
    #[arg(long)]
    pub report: bool,

    /// Print the report as JSON (with --report)
    #[arg(long)]
    pub json: bool,

    /// Export change records as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Debug-level diagnostics
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    pub fn tui_mode(&self) -> bool {
        cfg!(feature = "tui")
            && !(self.text || self.report || self.list_databases || self.list_tables)
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && !args.report {
        return Err(anyhow!("--json can only be used with --report."));
    }

    let settings = config::load_settings(args.config.as_deref())?;
    let cfg = build_config(&args, &settings)?;
    let engine = build_engine(&args, &settings);

    if args.list_databases {
        return list_databases(&engine, &cfg).await;
    }
    if args.list_tables {
        return list_tables(&engine, &cfg).await;
    }
    if args.report {
        return run_report(&args, &cfg);
    }

    if !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(engine, cfg).await;
        }
    }

    run_text(&args, engine, cfg).await
}

fn build_engine(args: &Cli, settings: &Settings) -> My2SqlEngine {
    let binary = args
        .engine_bin
        .clone()
        .unwrap_or_else(|| settings.engine_bin.clone());
    let timeout = args
        .connect_timeout
        .map(Duration::from)
        .unwrap_or(settings.connect_timeout);
    My2SqlEngine::new(binary, timeout)
}

/// Build the initial form from settings plus CLI overrides.
pub fn build_config(args: &Cli, settings: &Settings) -> Result<TaskConfig, ConfigError> {
    let mut cfg = settings.task_config();
    if let Some(dsn) = &args.dsn {
        cfg.connection_string = dsn.clone();
    }
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.clone();
    }
    cfg.database = args.database.clone().filter(|d| !d.trim().is_empty());
    cfg.tables = args.table.iter().cloned().collect();
    cfg.window.start = args.start_datetime.as_deref().map(parse_datetime).transpose()?;
    cfg.window.stop = args.stop_datetime.as_deref().map(parse_datetime).transpose()?;
    if let Some(threads) = args.threads {
        cfg.threads = threads;
    }
    if let Some(work_type) = args.work_type {
        cfg.work_type = work_type;
    }
    if let Some(on) = args.insert {
        cfg.ops.insert = on;
    }
    if let Some(on) = args.update {
        cfg.ops.update = on;
    }
    if let Some(on) = args.delete {
        cfg.ops.delete = on;
    }
    if args.ddl {
        cfg.ops.ddl = true;
        cfg.ops.clear_dml();
    }
    Ok(cfg)
}

async fn list_databases<E: Engine>(engine: &E, cfg: &TaskConfig) -> Result<()> {
    let dsn = required_dsn(cfg)?;
    let schemas = engine
        .test_connection(dsn)
        .await
        .context("connection test failed")?;
    for schema in schemas {
        println!("{schema}");
    }
    Ok(())
}

async fn list_tables<E: Engine>(engine: &E, cfg: &TaskConfig) -> Result<()> {
    let dsn = required_dsn(cfg)?;
    let database = cfg.database.clone().ok_or(ConfigError::MissingDatabase)?;
    let tables = engine
        .list_tables(dsn, vec![database.clone()])
        .await
        .with_context(|| format!("failed to list tables of {database}"))?;
    for table in tables {
        println!("{table}");
    }
    Ok(())
}

fn required_dsn(cfg: &TaskConfig) -> Result<String, ConfigError> {
    let dsn = cfg.connection_string.trim();
    if dsn.is_empty() {
        return Err(ConfigError::MissingConnection);
    }
    Ok(dsn.to_string())
}

fn run_report(args: &Cli, cfg: &TaskConfig) -> Result<()> {
    if cfg.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::MissingOutputDir.into());
    }
    let path = report::report_path(&cfg.output_dir);
    let records = match report::read_report(&path) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("{e}");
            eprintln!("{NO_RESULTS}");
            return Ok(());
        }
    };

    if let Some(p) = args.export_json.as_deref() {
        orchestrator::export_json(p, &records)?;
        eprintln!("Exported JSON: {}", p.display());
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for line in crate::text_summary::build_text_summary(&records).lines {
            println!("{line}");
        }
    }
    Ok(())
}

/// How a headless run ended.
#[derive(Debug, PartialEq, Eq)]
enum TextOutcome {
    Finished,
    Stopped,
    Failed(String),
}

async fn run_text<E: Engine>(args: &Cli, engine: E, cfg: TaskConfig) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ConsoleEvent>();
    let output_dir = cfg.output_dir.clone();
    let console = Console::new(engine, cfg, event_tx);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let outcome = drive_text_run(console, event_rx, &out_tx, shutdown).await;

    let res = match outcome {
        Ok(TextOutcome::Finished) => {
            let processed =
                orchestrator::process_run_completion(&output_dir, args.export_json.as_deref());
            tracing::info!(records = processed.records.len(), "analysis report read");
            for line in processed.summary.lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
            for msg in processed.export_messages {
                let _ = out_tx.send(OutputLine::Stderr(msg));
            }
            Ok(())
        }
        Ok(TextOutcome::Stopped) => Ok(()),
        Ok(TextOutcome::Failed(msg)) => Err(anyhow!(msg)),
        Err(e) => Err(e),
    };

    drop(out_tx);
    let _ = out_handle.await;
    res
}

/// Probe, submit and stream one analysis until it ends or `shutdown` fires.
async fn drive_text_run<E, F>(
    mut console: Console<E>,
    mut event_rx: UnboundedReceiver<ConsoleEvent>,
    out_tx: &UnboundedSender<OutputLine>,
    shutdown: F,
) -> Result<TextOutcome>
where
    E: Engine,
    F: Future<Output = ()>,
{
    let target = console.config().clone();
    let mut failure = None;

    required_dsn(&target)?;
    console.handle(UiCommand::TestConnection);
    while console.conn_status() == ConnStatus::None {
        console.step().await;
    }
    let probe_error = forward_events(&mut event_rx, out_tx, &mut failure);
    if console.conn_status() != ConnStatus::Success {
        bail!(probe_error.unwrap_or_else(|| "connection test failed".into()));
    }

    // A probe resets the selection; put the requested target back.
    if let Some(db) = target.database.clone() {
        if !console.catalog().schemas.contains(&db) {
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "warning: database {db} not found on server"
            )));
        }
        console.handle(UiCommand::SelectDatabase(db));
    }
    for table in &target.tables {
        console.handle(UiCommand::ToggleTable(table.clone()));
    }

    console.handle(UiCommand::Submit);
    let rejected = forward_events(&mut event_rx, out_tx, &mut failure);
    if console.status() != RunStatus::Running {
        bail!(rejected.unwrap_or_else(|| "analysis was not started".into()));
    }

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                console.handle(UiCommand::Stop);
                forward_events(&mut event_rx, out_tx, &mut failure);
                return Ok(TextOutcome::Stopped);
            }
            _ = console.step() => {}
        }
        forward_events(&mut event_rx, out_tx, &mut failure);
        if console.status() == RunStatus::Idle {
            break;
        }
    }

    Ok(match failure {
        Some(msg) => TextOutcome::Failed(msg),
        None => TextOutcome::Finished,
    })
}

/// Print pending console events and record an engine failure in `failure`.
///
/// Returns the last error notice seen, if any.
fn forward_events(
    event_rx: &mut UnboundedReceiver<ConsoleEvent>,
    out_tx: &UnboundedSender<OutputLine>,
    failure: &mut Option<String>,
) -> Option<String> {
    let mut last_error = None;
    while let Ok(ev) = event_rx.try_recv() {
        match ev {
            ConsoleEvent::Log(line) => {
                let _ = out_tx.send(OutputLine::Stdout(format!(
                    "[{}] {}",
                    line.display_time(),
                    line.text
                )));
            }
            ConsoleEvent::Notice(n) => {
                let label = match n.level {
                    NoticeLevel::Info => "info",
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Warning => "warning",
                    NoticeLevel::Error => {
                        last_error = Some(n.text.clone());
                        "error"
                    }
                };
                let _ = out_tx.send(OutputLine::Stderr(format!("{label}: {}", n.text)));
            }
            ConsoleEvent::Finished { error: Some(e) } => *failure = Some(e),
            _ => {}
        }
    }
    last_error
}
