//! Presentation-agnostic console: the form, the connection probe and the task
//! controller behind one command/event interface.
//!
//! Every long-latency call (probe, table listing, report read, engine run) runs
//! on its own task and reports back through a channel, so log lines keep
//! flowing while they are outstanding.

use super::controller::{ControllerEvent, TaskController};
use crate::engine::Engine;
use crate::error::{ConfigError, ConsoleError, ReportError};
use crate::model::{
    ChangeRecord, ConnStatus, DmlKind, LogLine, Notice, OpFlags, RunStatus, TaskConfig,
    TimeWindow, WorkType,
};
use crate::probe::{ConnectionCatalog, ConnectionProbe, ProbeTicket};
use crate::report;
use crate::validate::{self, DdlChange, DdlConsequence, MAX_THREADS, MIN_THREADS};
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const NO_RESULTS: &str = "No analysis results found";

/// Commands emitted by UI layers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UiCommand {
    SetConnection(String),
    SetOutputDir(PathBuf),
    TestConnection,
    SelectDatabase(String),
    ToggleTable(String),
    SetDml(DmlKind, bool),
    RequestDdl(bool),
    ConfirmDdl,
    CancelDdl,
    SetWorkType(WorkType),
    SetThreads(u32),
    SetWindow(TimeWindow),
    Submit,
    Stop,
    ClearLog,
    ViewReport,
    Quit,
}

/// State changes pushed to UI layers.
#[derive(Debug, Clone)]
pub(crate) enum ConsoleEvent {
    Config(TaskConfig),
    Connection {
        status: ConnStatus,
        catalog: ConnectionCatalog,
    },
    Status(RunStatus),
    Log(LogLine),
    LogCleared,
    Notice(Notice),
    ConfirmDdl(DdlConsequence),
    Report(Vec<ChangeRecord>),
    /// The current run ended on its own; `error` is set when the engine failed.
    Finished { error: Option<String> },
}

enum Outcome {
    Schemas {
        ticket: ProbeTicket,
        result: Result<Vec<String>, ConsoleError>,
    },
    Tables {
        ticket: ProbeTicket,
        schema: String,
        result: Result<Vec<String>, ConsoleError>,
    },
    Report(Result<Vec<ChangeRecord>, ReportError>),
}

pub(crate) struct Console<E: Engine> {
    config: TaskConfig,
    probe: ConnectionProbe,
    controller: TaskController<E>,
    /// Flags and mode a DDL proposal resolves to, awaiting confirmation.
    pending_ddl: Option<(OpFlags, WorkType)>,
    event_tx: UnboundedSender<ConsoleEvent>,
    outcome_tx: UnboundedSender<Outcome>,
    outcome_rx: UnboundedReceiver<Outcome>,
}

impl<E: Engine> Console<E> {
    pub fn new(engine: E, config: TaskConfig, event_tx: UnboundedSender<ConsoleEvent>) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            config,
            probe: ConnectionProbe::default(),
            controller: TaskController::new(engine),
            pending_ddl: None,
            event_tx,
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn conn_status(&self) -> ConnStatus {
        self.probe.status()
    }

    pub fn catalog(&self) -> &ConnectionCatalog {
        self.probe.catalog()
    }

    pub fn status(&self) -> RunStatus {
        self.controller.status()
    }

    #[cfg(test)]
    pub fn controller(&self) -> &TaskController<E> {
        &self.controller
    }

    fn emit(&self, ev: ConsoleEvent) {
        let _ = self.event_tx.send(ev);
    }

    fn notice(&self, notice: Notice) {
        self.emit(ConsoleEvent::Notice(notice));
    }

    fn emit_config(&self) {
        self.emit(ConsoleEvent::Config(self.config.clone()));
    }

    fn emit_connection(&self) {
        self.emit(ConsoleEvent::Connection {
            status: self.probe.status(),
            catalog: self.probe.catalog().clone(),
        });
    }

    /// Push the full current state, e.g. when a UI attaches.
    pub fn announce(&self) {
        self.emit_config();
        self.emit_connection();
        self.emit(ConsoleEvent::Status(self.status()));
    }

    pub fn handle(&mut self, cmd: UiCommand) {
        match cmd {
            UiCommand::SetConnection(dsn) => {
                self.config.connection_string = dsn;
                self.emit_config();
            }
            UiCommand::SetOutputDir(dir) => {
                self.config.output_dir = dir;
                self.emit_config();
            }
            UiCommand::TestConnection => self.test_connection(),
            UiCommand::SelectDatabase(db) => self.select_database(db),
            UiCommand::ToggleTable(table) => {
                if !self.config.tables.remove(&table) {
                    self.config.tables.insert(table);
                }
                self.emit_config();
            }
            UiCommand::SetDml(kind, on) => {
                if validate::set_dml(&mut self.config, kind, on) {
                    self.emit_config();
                } else {
                    self.notice(Notice::warning("DML options are locked while DDL is on"));
                }
            }
            UiCommand::RequestDdl(enable) => match validate::propose_ddl_change(&self.config, enable) {
                DdlChange::Apply(next) => {
                    self.config = next;
                    self.emit_config();
                }
                DdlChange::NeedsConfirmation {
                    consequence,
                    resolved,
                } => {
                    self.pending_ddl = Some((resolved.ops, resolved.work_type));
                    self.emit(ConsoleEvent::ConfirmDdl(consequence));
                }
            },
            UiCommand::ConfirmDdl => {
                if let Some((ops, work_type)) = self.pending_ddl.take() {
                    self.config.ops = ops;
                    self.config.work_type = work_type;
                    self.emit_config();
                }
            }
            UiCommand::CancelDdl => self.pending_ddl = None,
            UiCommand::SetWorkType(work_type) => {
                self.config.work_type = work_type;
                self.emit_config();
            }
            UiCommand::SetThreads(n) => {
                self.config.threads = n.clamp(MIN_THREADS, MAX_THREADS);
                self.emit_config();
            }
            UiCommand::SetWindow(window) => {
                self.config.window = window;
                self.emit_config();
            }
            UiCommand::Submit => self.submit(),
            UiCommand::Stop => self.stop(),
            UiCommand::ClearLog => {
                self.controller.clear_log();
                self.emit(ConsoleEvent::LogCleared);
            }
            UiCommand::ViewReport => self.view_report(),
            UiCommand::Quit => {
                if self.status() == RunStatus::Running {
                    self.stop();
                }
            }
        }
    }

    fn test_connection(&mut self) {
        let dsn = self.config.connection_string.trim().to_string();
        if dsn.is_empty() {
            self.notice(Notice::error(ConfigError::MissingConnection.to_string()));
            return;
        }
        let ticket = self.probe.begin_test();
        self.config.database = None;
        self.config.tables.clear();
        self.emit_config();
        self.emit_connection();

        tracing::info!("testing connection");
        let fut = self.controller.engine().test_connection(dsn);
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send(Outcome::Schemas { ticket, result });
        });
    }

    fn select_database(&mut self, db: String) {
        self.config.database = Some(db.clone());
        self.config.tables.clear();
        let ticket = self.probe.begin_tables(&db);
        self.emit_config();
        self.emit_connection();

        let dsn = self.config.connection_string.trim().to_string();
        let fut = self.controller.engine().list_tables(dsn, vec![db.clone()]);
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send(Outcome::Tables {
                ticket,
                schema: db,
                result,
            });
        });
    }

    fn submit(&mut self) {
        match self.controller.submit(&self.config, self.probe.status()) {
            Ok(submitted) => {
                self.emit(ConsoleEvent::LogCleared);
                self.emit(ConsoleEvent::Status(RunStatus::Running));
                for c in submitted.corrections {
                    self.notice(Notice::warning(c.describe()));
                }
            }
            Err(ConsoleError::AlreadyRunning) => {}
            Err(e) => self.notice(Notice::error(e.to_string())),
        }
    }

    fn stop(&mut self) {
        let res = self.controller.stop();
        self.emit(ConsoleEvent::Status(RunStatus::Idle));
        match res {
            Ok(()) => self.notice(Notice::warning("Analysis stopped")),
            Err(e) => self.notice(Notice::error(format!("Failed to send stop signal: {e}"))),
        }
    }

    fn view_report(&mut self) {
        if self.config.output_dir.as_os_str().is_empty() {
            self.notice(Notice::warning(ConfigError::MissingOutputDir.to_string()));
            return;
        }
        let path = report::report_path(&self.config.output_dir);
        let tx = self.outcome_tx.clone();
        tokio::task::spawn_blocking(move || {
            let _ = tx.send(Outcome::Report(report::read_report(&path)));
        });
    }

    /// Wait for one background event and apply it.
    pub async fn step(&mut self) {
        tokio::select! {
            ev = self.controller.next_event() => self.on_controller_event(ev),
            Some(outcome) = self.outcome_rx.recv() => self.on_outcome(outcome),
        }
    }

    fn on_controller_event(&mut self, ev: ControllerEvent) {
        match ev {
            ControllerEvent::Line(line) => self.emit(ConsoleEvent::Log(line)),
            ControllerEvent::Finished { result, .. } => {
                self.emit(ConsoleEvent::Status(RunStatus::Idle));
                self.emit(ConsoleEvent::Finished {
                    error: result.as_ref().err().map(ToString::to_string),
                });
                match result {
                    Ok(()) => self.notice(Notice::success("Analysis finished")),
                    Err(e) => self.notice(Notice::error(format!("Analysis failed: {e}"))),
                }
            }
            ControllerEvent::LateCompletion { .. } => {}
        }
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Schemas { ticket, result } => {
                if !self.probe.finish_test(ticket, &result) {
                    tracing::debug!("stale connection test result dropped");
                    return;
                }
                self.emit_connection();
                match result {
                    Ok(schemas) => self.notice(Notice::success(format!(
                        "Connected: {} database(s) available",
                        schemas.len()
                    ))),
                    Err(e) => {
                        tracing::warn!("connection test failed: {e}");
                        self.notice(Notice::error(e.to_string()));
                    }
                }
            }
            Outcome::Tables {
                ticket,
                schema,
                result,
            } => {
                if !self.probe.finish_tables(ticket, &result) {
                    tracing::debug!(%schema, "stale table listing dropped");
                    return;
                }
                self.emit_connection();
                if let Err(e) = result {
                    tracing::warn!(%schema, "listing tables failed: {e}");
                    self.notice(Notice::error(e.to_string()));
                }
            }
            Outcome::Report(Ok(records)) if !records.is_empty() => {
                self.emit(ConsoleEvent::Report(records));
            }
            Outcome::Report(Ok(_)) => self.notice(Notice::info(NO_RESULTS)),
            Outcome::Report(Err(e)) => {
                tracing::warn!("report unavailable: {e}");
                self.notice(Notice::info(NO_RESULTS));
            }
        }
    }
}

/// Drive a console from UI commands until the UI quits.
pub(crate) async fn run_console<E: Engine>(
    mut console: Console<E>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    console.announce();
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(UiCommand::Quit) | None => {
                    console.handle(UiCommand::Quit);
                    break;
                }
                Some(cmd) => console.handle(cmd),
            },
            _ = console.step() => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::model::NoticeLevel;
    use std::time::Duration;

    fn form() -> TaskConfig {
        TaskConfig {
            connection_string: "root:pw@tcp(127.0.0.1:3306)".into(),
            output_dir: PathBuf::from("/tmp/out"),
            ..Default::default()
        }
    }

    fn setup(engine: FakeEngine) -> (Console<FakeEngine>, UnboundedReceiver<ConsoleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Console::new(engine, form(), tx), rx)
    }

    async fn step(console: &mut Console<FakeEngine>) {
        tokio::time::timeout(Duration::from_secs(5), console.step())
            .await
            .expect("console step");
    }

    fn drain(rx: &mut UnboundedReceiver<ConsoleEvent>) -> Vec<ConsoleEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn notices(events: &[ConsoleEvent]) -> Vec<Notice> {
        events
            .iter()
            .filter_map(|e| match e {
                ConsoleEvent::Notice(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn bad_host_keeps_submission_blocked() {
        let engine = FakeEngine::default();
        let (mut console, mut rx) = setup(engine.clone());
        console.handle(UiCommand::SetConnection("bad-host".into()));
        console.handle(UiCommand::TestConnection);
        step(&mut console).await;

        assert_eq!(console.conn_status(), ConnStatus::Error);
        assert!(console.catalog().schemas.is_empty());

        drain(&mut rx);
        console.handle(UiCommand::Submit);
        assert_eq!(console.status(), RunStatus::Idle);
        assert_eq!(engine.spawned(), 0);
        let n = notices(&drain(&mut rx));
        assert_eq!(n.len(), 1);
        assert_eq!(n[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn successful_probe_resets_selection() {
        let engine = FakeEngine::with_schemas(&["shop", "crm"]).tables("shop", &["orders"]);
        let (mut console, _rx) = setup(engine);
        console.handle(UiCommand::TestConnection);
        step(&mut console).await;
        console.handle(UiCommand::SelectDatabase("shop".into()));
        step(&mut console).await;
        console.handle(UiCommand::ToggleTable("orders".into()));
        assert_eq!(console.catalog().tables, vec!["orders"]);
        assert!(console.config().tables.contains("orders"));

        console.handle(UiCommand::TestConnection);
        assert!(console.config().database.is_none());
        assert!(console.config().tables.is_empty());
        step(&mut console).await;
        assert_eq!(console.catalog().schemas, vec!["shop", "crm"]);
        assert!(console.catalog().tables.is_empty());
    }

    #[tokio::test]
    async fn table_listing_failure_leaves_no_stale_tables() {
        let engine = FakeEngine::with_schemas(&["shop", "crm"]).tables("shop", &["orders"]);
        let (mut console, _rx) = setup(engine);
        console.handle(UiCommand::TestConnection);
        step(&mut console).await;
        console.handle(UiCommand::SelectDatabase("shop".into()));
        step(&mut console).await;
        assert_eq!(console.catalog().tables, vec!["orders"]);

        console.handle(UiCommand::SelectDatabase("crm".into()));
        step(&mut console).await;
        assert!(console.catalog().tables.is_empty());
        assert_eq!(console.conn_status(), ConnStatus::Success);
    }

    #[tokio::test]
    async fn ddl_conflict_waits_for_confirmation() {
        let (mut console, mut rx) = setup(FakeEngine::default());
        console.handle(UiCommand::SetWorkType(WorkType::Rollback));
        let before = console.config().clone();
        drain(&mut rx);

        console.handle(UiCommand::RequestDdl(true));
        assert_eq!(console.config(), &before);
        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [ConsoleEvent::ConfirmDdl(DdlConsequence::ForceForwardAndClearDml)]
        ));

        console.handle(UiCommand::CancelDdl);
        console.handle(UiCommand::ConfirmDdl);
        assert_eq!(console.config(), &before, "cancelled proposal must not apply");

        console.handle(UiCommand::RequestDdl(true));
        console.handle(UiCommand::ConfirmDdl);
        let ops = console.config().ops;
        assert!(ops.ddl && !ops.insert && !ops.update && !ops.delete);
        assert_eq!(console.config().work_type, WorkType::Forward);
    }

    #[tokio::test]
    async fn confirmed_ddl_keeps_later_form_edits() {
        let (mut console, mut rx) = setup(FakeEngine::default());
        console.handle(UiCommand::RequestDdl(true));
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ConsoleEvent::ConfirmDdl(DdlConsequence::ClearDml)]
        ));

        console.handle(UiCommand::SetOutputDir(PathBuf::from("/tmp/elsewhere")));
        console.handle(UiCommand::SetThreads(8));
        console.handle(UiCommand::ConfirmDdl);

        let cfg = console.config();
        assert!(cfg.ops.ddl && !cfg.ops.any_dml());
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(cfg.threads, 8);
    }

    #[tokio::test]
    async fn streams_a_full_run_and_goes_idle() {
        let engine = FakeEngine::with_schemas(&["shop"])
            .tables("shop", &["t1"])
            .script(&["start", "processing table t1", "done"]);
        let (mut console, mut rx) = setup(engine.clone());
        console.handle(UiCommand::TestConnection);
        step(&mut console).await;
        console.handle(UiCommand::SelectDatabase("shop".into()));
        step(&mut console).await;
        drain(&mut rx);

        console.handle(UiCommand::Submit);
        assert_eq!(console.status(), RunStatus::Running);
        for _ in 0..3 {
            step(&mut console).await;
        }
        engine.finish();
        step(&mut console).await;
        assert_eq!(console.status(), RunStatus::Idle);

        let events = drain(&mut rx);
        let logs: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ConsoleEvent::Log(l) => Some(l.text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(logs, vec!["start", "processing table t1", "done"]);
        let statuses: Vec<RunStatus> = events
            .iter()
            .filter_map(|e| match e {
                ConsoleEvent::Status(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![RunStatus::Running, RunStatus::Idle]);
        let texts: Vec<String> = console
            .controller()
            .log()
            .lines()
            .map(|l| l.text.clone())
            .collect();
        assert_eq!(texts, vec!["start", "processing table t1", "done"]);
    }

    #[tokio::test]
    async fn missing_report_collapses_to_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let (mut console, mut rx) = setup(FakeEngine::default());
        console.handle(UiCommand::SetOutputDir(dir.path().to_path_buf()));
        drain(&mut rx);

        console.handle(UiCommand::ViewReport);
        step(&mut console).await;
        let n = notices(&drain(&mut rx));
        assert_eq!(n, vec![Notice::info(NO_RESULTS)]);
        assert_eq!(console.status(), RunStatus::Idle);
    }

    #[tokio::test]
    async fn threads_are_clamped() {
        let (mut console, _rx) = setup(FakeEngine::default());
        console.handle(UiCommand::SetThreads(0));
        assert_eq!(console.config().threads, 1);
        console.handle(UiCommand::SetThreads(500));
        assert_eq!(console.config().threads, 64);
    }
}
