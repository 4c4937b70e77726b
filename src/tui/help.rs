use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const KEYS: &[(&str, &str)] = &[
    ("a / o", "Edit connection string / output dir"),
    ("[ / ]", "Edit start / stop time"),
    ("t", "Test connection"),
    ("tab", "Switch pane"),
    ("↑/↓", "Move in databases or tables"),
    ("enter", "Choose database"),
    ("space", "Toggle table"),
    ("i/u/e", "Toggle INSERT / UPDATE / DELETE"),
    ("d", "Toggle DDL"),
    ("w", "Switch forward / rollback"),
    ("+ / -", "Threads"),
    ("s", "Start analysis"),
    ("x", "Stop analysis"),
    ("c", "Clear log"),
    ("r", "View report"),
    ("y", "Copy log to clipboard"),
    ("?", "Show this help"),
];

fn key_line(key: &str, desc: &str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{key:<10}"), Style::default().fg(Color::Magenta)),
        Span::raw(desc.to_string()),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![Line::from("Keybinds:")];
    lines.extend(KEYS.iter().map(|(k, d)| key_line(k, d)));
    lines.push(Line::from(vec![
        Span::raw("  "),
        Span::styled("q", Style::default().fg(Color::Magenta)),
        Span::raw(" / "),
        Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
        Span::raw(" Quit"),
    ]));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Press any key to close",
        Style::default().fg(Color::Gray),
    )));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(Clear, area);
    f.render_widget(p, area);
}
