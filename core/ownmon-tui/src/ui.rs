use chrono::Local;
use ownmon_live::{
    app_display_name, format_clock, format_number, format_time_seconds, ActivityView,
    ConnectionStatus, CountersView, MediaView,
};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Padding, Paragraph},
    Frame,
};

use crate::app::App;

const RECENT_TRACKS_SHOWN: usize = 3;

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();

    let main_block = Block::default()
        .title(Line::from(vec![
            Span::styled(" ◆ ", Style::default().fg(Color::Cyan)),
            Span::styled(
                "OwnMon ",
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("({}) ", app.endpoint()),
                Style::default().fg(Color::DarkGray),
            ),
        ]))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));

    let inner = main_block.inner(area);
    f.render_widget(main_block, area);

    let chunks = Layout::vertical([
        Constraint::Length(6),
        Constraint::Min(7),
        Constraint::Length(7),
        Constraint::Length(1),
    ])
    .split(inner);

    render_activity_card(f, &app.activity(), app.status(), chunks[0]);
    render_media_card(f, &app.media(), chunks[1]);
    render_counters_card(f, &app.counters(), chunks[2]);

    let footer = match app.message() {
        Some(message) => Line::from(Span::styled(
            format!(" {message}"),
            Style::default().fg(Color::Cyan),
        )),
        None => default_footer(app.status()),
    };
    f.render_widget(Paragraph::new(footer), chunks[3]);
}

fn default_footer(status: ConnectionStatus) -> Line<'static> {
    let toggle = match status {
        ConnectionStatus::Idle | ConnectionStatus::Closed => " Connect ",
        _ => " Disconnect ",
    };
    Line::from(vec![
        Span::styled(" [r]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Refresh ", Style::default().fg(Color::Gray)),
        Span::styled(" [c]", Style::default().fg(Color::DarkGray)),
        Span::styled(toggle, Style::default().fg(Color::Gray)),
        Span::styled(" [q]", Style::default().fg(Color::DarkGray)),
        Span::styled(" Quit ", Style::default().fg(Color::Gray)),
    ])
}

fn card(title: &'static str, accent: Color, indicator: Option<Line<'static>>) -> Block<'static> {
    let mut block = Block::default()
        .title(Line::from(vec![
            Span::styled(" ● ", Style::default().fg(accent)),
            Span::styled(
                format!("{title} "),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        ]))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray))
        .padding(Padding::horizontal(1));
    if let Some(indicator) = indicator {
        block = block.title(indicator.right_aligned());
    }
    block
}

fn connection_indicator(status: ConnectionStatus) -> Line<'static> {
    match status {
        ConnectionStatus::Open => Line::from(vec![
            Span::styled("● ", Style::default().fg(Color::Green)),
            Span::styled("Live ", Style::default().fg(Color::Gray)),
        ]),
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => Line::from(vec![
            Span::styled("◐ ", Style::default().fg(Color::Yellow)),
            Span::styled("Reconnecting ", Style::default().fg(Color::DarkGray)),
        ]),
        ConnectionStatus::Idle | ConnectionStatus::Closed => Line::from(vec![
            Span::styled("○ ", Style::default().fg(Color::DarkGray)),
            Span::styled("Disconnected ", Style::default().fg(Color::DarkGray)),
        ]),
    }
}

fn render_activity_card(f: &mut Frame, view: &ActivityView, status: ConnectionStatus, area: Rect) {
    let block = card("Current Activity", Color::Blue, Some(connection_indicator(status)));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let width = inner.width as usize;
    let lines = match view.focused() {
        Some(focused) => vec![
            Line::from(Span::styled(
                app_display_name(&focused.process_name),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                truncate_string(&focused.window_title, width),
                Style::default().fg(Color::Gray),
            )),
            Line::from(vec![
                Span::styled("Duration  ", Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format_clock(focused.duration_secs),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
            ]),
        ],
        None => vec![Line::from(Span::styled(
            "No active session",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    f.render_widget(Paragraph::new(lines), inner);
}

fn render_media_card(f: &mut Frame, view: &MediaView, area: Rect) {
    let block = card("Media Player", Color::Magenta, None);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let width = inner.width as usize;
    let Some(current) = view.current() else {
        let empty = Line::from(Span::styled(
            "Nothing playing",
            Style::default().fg(Color::DarkGray),
        ));
        f.render_widget(Paragraph::new(empty), inner);
        return;
    };

    let (icon, color) = if current.is_playing {
        ("▶", Color::Green)
    } else {
        ("⏸", Color::DarkGray)
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled(format!("{icon} "), Style::default().fg(color)),
            Span::styled(
                truncate_string(&current.title, width.saturating_sub(2)),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(Span::styled(
            format!("  {}", truncate_string(&current.artist, width.saturating_sub(2))),
            Style::default().fg(Color::Gray),
        )),
    ];
    if let Some(album) = &current.album {
        lines.push(Line::from(Span::styled(
            format!("  {}", truncate_string(album, width.saturating_sub(2))),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines.push(Line::from(vec![
        Span::styled(
            format!("  {}", current.source_app),
            Style::default().fg(Color::Magenta),
        ),
        Span::styled(
            format!("  {}", format_time_seconds(current.duration_secs)),
            Style::default().fg(Color::DarkGray),
        ),
    ]));

    if !view.recent().is_empty() {
        lines.push(Line::from(Span::styled(
            "Recent",
            Style::default().fg(Color::DarkGray),
        )));
        for media in view.recent().iter().take(RECENT_TRACKS_SHOWN) {
            let duration = format_time_seconds(media.duration_secs);
            let label = format!("{} · {}", media.title, media.artist);
            lines.push(Line::from(vec![
                Span::styled(
                    format!(
                        "  {}",
                        truncate_string(&label, width.saturating_sub(duration.len() + 4))
                    ),
                    Style::default().fg(Color::Gray),
                ),
                Span::styled(format!("  {duration}"), Style::default().fg(Color::DarkGray)),
            ]));
        }
    }

    f.render_widget(Paragraph::new(lines), inner);
}

fn render_counters_card(f: &mut Frame, view: &CountersView, area: Rect) {
    let block = card("Today", Color::Yellow, None);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(stats) = view.stats() else {
        let waiting = Line::from(Span::styled(
            "Waiting for data",
            Style::default().fg(Color::DarkGray),
        ));
        f.render_widget(Paragraph::new(waiting), inner);
        return;
    };

    let row = |label: &'static str, value: String| {
        Line::from(vec![
            Span::styled(format!("{label:<12}"), Style::default().fg(Color::DarkGray)),
            Span::styled(value, Style::default().fg(Color::White)),
        ])
    };

    let mut lines = vec![
        row("Focus time", format_time_seconds(stats.focus_time_secs)),
        row("Keystrokes", format_number(stats.keystrokes)),
        row("Clicks", format_number(stats.clicks)),
        row("Sessions", format_number(stats.sessions)),
    ];
    if let Some(as_of) = view.as_of() {
        let source = view.source().map(|s| s.as_str()).unwrap_or("unknown");
        lines.push(Line::from(Span::styled(
            format!(
                "as of {} ({source})",
                as_of.with_timezone(&Local).format("%H:%M:%S")
            ),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    f.render_widget(Paragraph::new(lines), inner);
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
