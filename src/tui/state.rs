use crate::model::{
    format_datetime, parse_datetime, ChangeRecord, ConnStatus, DmlKind, LogLine, Notice,
    RunStatus, TaskConfig, TimeWindow,
};
use crate::orchestrator::{push_capped, ConsoleEvent, UiCommand, LOG_CAPACITY};
use crate::probe::ConnectionCatalog;
use crate::validate::DdlConsequence;
use crossterm::event::{KeyCode, KeyModifiers};
use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pane {
    #[default]
    Databases,
    Tables,
    Log,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Databases => Pane::Tables,
            Pane::Tables => Pane::Log,
            Pane::Log => Pane::Databases,
        }
    }
}

/// Free-text form fields edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Connection,
    OutputDir,
    Start,
    Stop,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::Connection => "Connection",
            Field::OutputDir => "Output dir",
            Field::Start => "Start time",
            Field::Stop => "Stop time",
        }
    }
}

/// What the UI thread should do after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    None,
    Send(UiCommand),
    CopyLog,
    Quit,
}

/// View-side mirror of console state. Owned by the UI thread only.
#[derive(Default)]
pub struct UiState {
    pub config: TaskConfig,
    pub conn: ConnStatus,
    pub catalog: ConnectionCatalog,
    pub status: RunStatus,
    pub logs: VecDeque<LogLine>,
    pub notice: Option<Notice>,
    pub focus: Pane,
    pub db_cursor: usize,
    pub table_cursor: usize,
    pub editing: Option<(Field, String)>,
    pub confirm: Option<DdlConsequence>,
    pub report: Option<Vec<ChangeRecord>>,
    pub show_help: bool,
}

impl UiState {
    pub fn apply(&mut self, ev: ConsoleEvent) {
        match ev {
            ConsoleEvent::Config(cfg) => self.config = cfg,
            ConsoleEvent::Connection { status, catalog } => {
                self.conn = status;
                self.catalog = catalog;
                self.db_cursor = clamp_cursor(self.db_cursor, self.catalog.schemas.len());
                self.table_cursor = clamp_cursor(self.table_cursor, self.catalog.tables.len());
            }
            ConsoleEvent::Status(status) => self.status = status,
            ConsoleEvent::Log(line) => push_capped(&mut self.logs, line, LOG_CAPACITY),
            ConsoleEvent::LogCleared => self.logs.clear(),
            ConsoleEvent::Notice(n) => self.notice = Some(n),
            ConsoleEvent::ConfirmDdl(consequence) => self.confirm = Some(consequence),
            ConsoleEvent::Report(records) => self.report = Some(records),
            ConsoleEvent::Finished { .. } => {}
        }
    }

    /// Submission needs a successful probe and no running task.
    pub fn can_submit(&self) -> bool {
        self.conn == ConnStatus::Success && self.status == RunStatus::Idle
    }

    pub fn dml_locked(&self) -> bool {
        self.config.ops.ddl
    }

    pub fn ddl_locked(&self) -> bool {
        self.config.work_type == crate::model::WorkType::Rollback && !self.config.ops.ddl
    }

    pub fn log_text(&self) -> String {
        self.logs
            .iter()
            .map(|l| format!("[{}] {}", l.display_time(), l.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn local_notice(&mut self, notice: Notice) -> KeyAction {
        self.notice = Some(notice);
        KeyAction::None
    }

    fn field_value(&self, field: Field) -> String {
        match field {
            Field::Connection => self.config.connection_string.clone(),
            Field::OutputDir => self.config.output_dir.display().to_string(),
            Field::Start => format_datetime(self.config.window.start),
            Field::Stop => format_datetime(self.config.window.stop),
        }
    }

    fn commit_edit(&mut self, field: Field, value: String) -> KeyAction {
        let value = value.trim().to_string();
        let cmd = match field {
            Field::Connection => UiCommand::SetConnection(value),
            Field::OutputDir => UiCommand::SetOutputDir(PathBuf::from(value)),
            Field::Start | Field::Stop => {
                let parsed = if value.is_empty() {
                    None
                } else {
                    match parse_datetime(&value) {
                        Ok(dt) => Some(dt),
                        Err(e) => return self.local_notice(Notice::error(e.to_string())),
                    }
                };
                let mut window: TimeWindow = self.config.window;
                if field == Field::Start {
                    window.start = parsed;
                } else {
                    window.stop = parsed;
                }
                UiCommand::SetWindow(window)
            }
        };
        KeyAction::Send(cmd)
    }

    fn on_edit_key(&mut self, code: KeyCode) -> KeyAction {
        let Some((field, mut buf)) = self.editing.take() else {
            return KeyAction::None;
        };
        match code {
            KeyCode::Enter => return self.commit_edit(field, buf),
            KeyCode::Esc => return KeyAction::None,
            KeyCode::Backspace => {
                buf.pop();
            }
            KeyCode::Char(c) => buf.push(c),
            _ => {}
        }
        self.editing = Some((field, buf));
        KeyAction::None
    }

    fn toggle_dml(&mut self, kind: DmlKind) -> KeyAction {
        if self.dml_locked() {
            return self.local_notice(Notice::warning("DML options are locked while DDL is on"));
        }
        KeyAction::Send(UiCommand::SetDml(kind, !self.config.ops.dml(kind)))
    }

    fn move_cursor(&mut self, down: bool) {
        let (cursor, len) = match self.focus {
            Pane::Databases => (&mut self.db_cursor, self.catalog.schemas.len()),
            Pane::Tables => (&mut self.table_cursor, self.catalog.tables.len()),
            Pane::Log => return,
        };
        if down {
            *cursor = clamp_cursor(*cursor + 1, len);
        } else {
            *cursor = cursor.saturating_sub(1);
        }
    }

    pub fn on_key(&mut self, modifiers: KeyModifiers, code: KeyCode) -> KeyAction {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
            return KeyAction::Quit;
        }
        if self.editing.is_some() {
            return self.on_edit_key(code);
        }
        if self.confirm.is_some() {
            return match code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    self.confirm = None;
                    KeyAction::Send(UiCommand::ConfirmDdl)
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    self.confirm = None;
                    KeyAction::Send(UiCommand::CancelDdl)
                }
                _ => KeyAction::None,
            };
        }
        if self.report.is_some() {
            if matches!(code, KeyCode::Esc | KeyCode::Char('r') | KeyCode::Char('q')) {
                self.report = None;
            }
            return KeyAction::None;
        }
        if self.show_help {
            self.show_help = false;
            return KeyAction::None;
        }

        match code {
            KeyCode::Char('q') => KeyAction::Quit,
            KeyCode::Char('?') => {
                self.show_help = true;
                KeyAction::None
            }
            KeyCode::Char('a') => self.start_edit(Field::Connection),
            KeyCode::Char('o') => self.start_edit(Field::OutputDir),
            KeyCode::Char('[') => self.start_edit(Field::Start),
            KeyCode::Char(']') => self.start_edit(Field::Stop),
            KeyCode::Char('t') => KeyAction::Send(UiCommand::TestConnection),
            KeyCode::Tab => {
                self.focus = self.focus.next();
                KeyAction::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_cursor(false);
                KeyAction::None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_cursor(true);
                KeyAction::None
            }
            KeyCode::Enter if self.focus == Pane::Databases => {
                match self.catalog.schemas.get(self.db_cursor) {
                    Some(db) => {
                        self.table_cursor = 0;
                        KeyAction::Send(UiCommand::SelectDatabase(db.clone()))
                    }
                    None => self.local_notice(Notice::info("Test the connection to list databases")),
                }
            }
            KeyCode::Char(' ') if self.focus == Pane::Tables => {
                match self.catalog.tables.get(self.table_cursor) {
                    Some(t) => KeyAction::Send(UiCommand::ToggleTable(t.clone())),
                    None => KeyAction::None,
                }
            }
            KeyCode::Char('i') => self.toggle_dml(DmlKind::Insert),
            KeyCode::Char('u') => self.toggle_dml(DmlKind::Update),
            KeyCode::Char('e') => self.toggle_dml(DmlKind::Delete),
            KeyCode::Char('d') => {
                if self.ddl_locked() {
                    return self.local_notice(Notice::warning(
                        "DDL output is not available in rollback mode",
                    ));
                }
                KeyAction::Send(UiCommand::RequestDdl(!self.config.ops.ddl))
            }
            KeyCode::Char('w') => {
                KeyAction::Send(UiCommand::SetWorkType(self.config.work_type.toggled()))
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                KeyAction::Send(UiCommand::SetThreads(self.config.threads.saturating_add(1)))
            }
            KeyCode::Char('-') => {
                KeyAction::Send(UiCommand::SetThreads(self.config.threads.saturating_sub(1)))
            }
            KeyCode::Char('s') => {
                if self.status == RunStatus::Running {
                    self.local_notice(Notice::warning("An analysis is already running"))
                } else if self.conn != ConnStatus::Success {
                    self.local_notice(Notice::warning("Test the connection before starting"))
                } else {
                    KeyAction::Send(UiCommand::Submit)
                }
            }
            KeyCode::Char('x') => {
                if self.status == RunStatus::Running {
                    KeyAction::Send(UiCommand::Stop)
                } else {
                    self.local_notice(Notice::info("No analysis is running"))
                }
            }
            KeyCode::Char('c') => KeyAction::Send(UiCommand::ClearLog),
            KeyCode::Char('r') => KeyAction::Send(UiCommand::ViewReport),
            KeyCode::Char('y') => KeyAction::CopyLog,
            _ => KeyAction::None,
        }
    }

    fn start_edit(&mut self, field: Field) -> KeyAction {
        self.editing = Some((field, self.field_value(field)));
        KeyAction::None
    }
}

fn clamp_cursor(cursor: usize, len: usize) -> usize {
    cursor.min(len.saturating_sub(1))
}
