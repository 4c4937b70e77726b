mod help;
mod state;

use crate::engine::Engine;
use crate::model::{ConnStatus, NoticeLevel, RunStatus, TaskConfig};
use crate::orchestrator::{self, Console, ConsoleEvent, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
    Terminal,
};
use state::{Field, KeyAction, Pane, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run<E: Engine>(engine: E, cfg: TaskConfig) -> Result<()> {
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ConsoleEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_handle = std::thread::spawn(move || run_threaded(event_rx, cmd_tx));

    let console = Console::new(engine, cfg, event_tx);
    let res = orchestrator::run_console(console, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    mut event_rx: UnboundedReceiver<ConsoleEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::default();
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut dirty = true;

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            state.apply(ev);
            dirty = true;
        }

        if dirty && last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
            dirty = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => {
                    dirty = true;
                    match state.on_key(k.modifiers, k.code) {
                        KeyAction::None => {}
                        KeyAction::Send(cmd) => {
                            let _ = cmd_tx.send(cmd);
                        }
                        KeyAction::CopyLog => {
                            state.notice = Some(match copy_to_clipboard(&state.log_text()) {
                                Ok(()) => crate::model::Notice::success(format!(
                                    "Copied {} log line(s) to clipboard",
                                    state.logs.len()
                                )),
                                Err(e) => crate::model::Notice::error(format!(
                                    "Clipboard copy failed: {e:#}"
                                )),
                            });
                        }
                        KeyAction::Quit => {
                            let _ = cmd_tx.send(UiCommand::Quit);
                            break Ok(());
                        }
                    }
                }
                Ok(Event::Resize(..)) => dirty = true,
                _ => {}
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Min(6),
            Constraint::Length(3),
        ])
        .split(area);

    draw_form(chunks[0], f, state);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(60),
        ])
        .split(chunks[1]);
    draw_databases(body[0], f, state);
    draw_tables(body[1], f, state);
    draw_log(body[2], f, state);

    draw_status_bar(chunks[2], f, state);

    if let Some(consequence) = state.confirm {
        draw_confirm(centered(area, 60, 7), f, consequence.describe());
    } else if let Some(records) = state.report.as_deref() {
        draw_report(centered(area, 90, 20), f, records);
    } else if state.show_help {
        help::draw_help(centered(area, 60, 22), f);
    }
}

fn checkbox(label: &str, on: bool, locked: bool) -> Span<'static> {
    let mark = if on { "[x]" } else { "[ ]" };
    let style = if locked {
        Style::default().fg(Color::DarkGray)
    } else if on {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };
    Span::styled(format!("{mark} {label}  "), style)
}

fn field_line<'a>(state: &UiState, field: Field, value: String) -> Line<'a> {
    let editing = state.editing.as_ref().filter(|(f, _)| *f == field);
    let (text, style) = match editing {
        Some((_, buf)) => (format!("{buf}_"), Style::default().fg(Color::Yellow)),
        None if value.is_empty() => ("-".to_string(), Style::default().fg(Color::DarkGray)),
        None => (value, Style::default()),
    };
    Line::from(vec![
        Span::styled(format!("{:<12}", field.label()), Style::default().fg(Color::Cyan)),
        Span::styled(text, style),
    ])
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let cfg = &state.config;

    let (conn_label, conn_color) = match state.conn {
        ConnStatus::None => ("not tested", Color::DarkGray),
        ConnStatus::Success => ("connected", Color::Green),
        ConnStatus::Error => ("failed", Color::Red),
    };
    let mut conn = field_line(state, Field::Connection, cfg.connection_string.clone());
    conn.spans.push(Span::raw("  "));
    conn.spans
        .push(Span::styled(format!("● {conn_label}"), Style::default().fg(conn_color)));

    let ops = &cfg.ops;
    let dml_locked = state.dml_locked();
    let lines = vec![
        conn,
        field_line(state, Field::OutputDir, cfg.output_dir.display().to_string()),
        Line::from(vec![
            field_line(
                state,
                Field::Start,
                crate::model::format_datetime(cfg.window.start),
            )
            .spans,
            vec![Span::raw("   ")],
            field_line(state, Field::Stop, crate::model::format_datetime(cfg.window.stop)).spans,
        ]
        .concat()),
        Line::from(vec![
            Span::styled(format!("{:<12}", "Mode"), Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:<10}", cfg.work_type.as_str())),
            Span::styled("Threads ", Style::default().fg(Color::Cyan)),
            Span::raw(format!("{:<4}", cfg.threads)),
            Span::styled("Database ", Style::default().fg(Color::Cyan)),
            Span::raw(cfg.database.clone().unwrap_or_else(|| "-".into())),
        ]),
        Line::from(vec![
            Span::styled(format!("{:<12}", "Output"), Style::default().fg(Color::Cyan)),
            checkbox("INSERT", ops.insert, dml_locked),
            checkbox("UPDATE", ops.update, dml_locked),
            checkbox("DELETE", ops.delete, dml_locked),
            checkbox("DDL", ops.ddl, state.ddl_locked()),
        ]),
    ];

    let title = match state.status {
        RunStatus::Idle => " my2sql-console [idle] ",
        RunStatus::Running => " my2sql-console [running] ",
    };
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn pane_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

fn draw_databases(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let items: Vec<ListItem> = state
        .catalog
        .schemas
        .iter()
        .map(|db| {
            let chosen = state.config.database.as_deref() == Some(db.as_str());
            let style = if chosen {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(db.clone(), style))
        })
        .collect();
    let list = List::new(items)
        .block(pane_block("Databases", state.focus == Pane::Databases))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    if !state.catalog.schemas.is_empty() {
        list_state.select(Some(state.db_cursor));
    }
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draw_tables(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let items: Vec<ListItem> = state
        .catalog
        .tables
        .iter()
        .map(|t| {
            let mark = if state.config.tables.contains(t) { "[x]" } else { "[ ]" };
            ListItem::new(format!("{mark} {t}"))
        })
        .collect();
    let title = if state.config.tables.is_empty() {
        "Tables (all)".to_string()
    } else {
        format!("Tables ({})", state.config.tables.len())
    };
    let list = List::new(items)
        .block(pane_block(&title, state.focus == Pane::Tables))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut list_state = ListState::default();
    if !state.catalog.tables.is_empty() {
        list_state.select(Some(state.table_cursor));
    }
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draw_log(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let visible = area.height.saturating_sub(2) as usize;
    let skip = state.logs.len().saturating_sub(visible);
    let lines: Vec<Line> = state
        .logs
        .iter()
        .skip(skip)
        .map(|l| {
            Line::from(vec![
                Span::styled(l.display_time(), Style::default().fg(Color::DarkGray)),
                Span::raw(" "),
                Span::raw(l.text.clone()),
            ])
        })
        .collect();
    let title = format!("Log ({})", state.logs.len());
    let p = Paragraph::new(lines).block(pane_block(&title, state.focus == Pane::Log));
    f.render_widget(p, area);
}

fn draw_status_bar(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let line = match &state.notice {
        Some(n) => {
            let color = match n.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Success => Color::Green,
                NoticeLevel::Warning => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(Span::styled(n.text.clone(), Style::default().fg(color)))
        }
        None => Line::from(Span::styled(
            "t test  s start  x stop  r report  ? help  q quit",
            Style::default().fg(Color::DarkGray),
        )),
    };
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(p, area);
}

fn draw_confirm(area: Rect, f: &mut ratatui::Frame, text: &str) {
    let p = Paragraph::new(vec![
        Line::from(text.to_string()),
        Line::from(""),
        Line::from(vec![
            Span::styled("y", Style::default().fg(Color::Magenta)),
            Span::raw(" confirm   "),
            Span::styled("n", Style::default().fg(Color::Magenta)),
            Span::raw(" cancel"),
        ]),
    ])
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title("Enable DDL?"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}

fn draw_report(area: Rect, f: &mut ratatui::Frame, records: &[crate::model::ChangeRecord]) {
    let header = Row::new(vec!["#", "Op", "Database", "Table", "Records", "Time"])
        .style(Style::default().fg(Color::Cyan));
    let rows: Vec<Row> = records
        .iter()
        .map(|r| {
            Row::new(vec![
                r.id.to_string(),
                r.operation.as_str().to_string(),
                r.database.clone(),
                r.table.clone(),
                r.records.to_string(),
                r.timestamp.clone(),
            ])
        })
        .collect();
    let widths = [
        Constraint::Length(4),
        Constraint::Length(7),
        Constraint::Percentage(20),
        Constraint::Percentage(25),
        Constraint::Length(10),
        Constraint::Length(20),
    ];
    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Analysis results ({}) - esc to close", records.len())),
    );
    f.render_widget(Clear, area);
    f.render_widget(table, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

// Global clipboard manager channel - initialized once on first use
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;

static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Background thread that owns clipboard handles; some Linux clipboard managers
/// only read the contents while the owning instance is alive.
fn init_clipboard_manager() -> &'static std_mpsc::Sender<String> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                match Clipboard::new() {
                    Ok(mut clipboard) => {
                        if clipboard.set_text(&text).is_ok() {
                            std::thread::sleep(Duration::from_secs(2));
                        }
                    }
                    Err(e) => tracing::warn!("clipboard unavailable: {e}"),
                }
            }
        });
        tx
    })
}

/// Queue `text` for the clipboard without blocking the UI thread.
fn copy_to_clipboard(text: &str) -> Result<()> {
    init_clipboard_manager()
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
