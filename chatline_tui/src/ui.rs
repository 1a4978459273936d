use chatline_lib::{display_text, MessageKind, ViewEntry};
use chrono::Local;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::{
    app::{App, Focus},
    theme::Theme,
};

const FRIENDS_WIDTH: u16 = 26;

const HELP: &[&str] = &[
    "Tab          switch between friends and input",
    "j/k, arrows  move in the friends list",
    "Enter        open conversation / send message",
    "Ctrl+R       resend the latest failed message",
    "PgUp/PgDn    scroll the conversation",
    "Esc          clear input or filter, else close the conversation",
    "Ctrl+C       quit",
    "",
    "/search <email or username>  send a friend request",
    "/accept <id>, /decline <id>  answer a friend request",
    "/find <name>                 filter friends (no name clears)",
    "/refresh                     reload friends and requests",
];

pub fn draw(f: &mut Frame, app: &App) {
    let theme = Theme::chatline();
    f.render_widget(Block::default().style(theme.background_style()), f.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(FRIENDS_WIDTH), Constraint::Min(20)])
        .split(f.area());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Conversation
            Constraint::Length(1), // Notice
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status bar
        ])
        .split(columns[1]);

    draw_friends(f, columns[0], app, &theme);
    draw_conversation(f, rows[0], app, &theme);
    draw_notice(f, rows[1], app, &theme);
    draw_input(f, rows[2], app, &theme);
    draw_status_bar(f, rows[3], app, &theme);

    if app.show_help {
        draw_help(f, &theme);
    }
}

fn draw_friends(f: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let focused = app.focus == Focus::Friends;
    let mut lines: Vec<Line> = Vec::new();

    let visible = app.visible_friends();
    if visible.is_empty() {
        lines.push(Line::styled("  (no friends)", theme.muted_style()));
    }
    for (index, friend) in visible.iter().enumerate() {
        let marker = if app.is_active(friend) { "● " } else { "  " };
        let text = format!("{}{}", marker, display_text(&friend.username));
        let style = if index == app.selected && focused {
            theme.selected_style()
        } else if app.is_active(friend) {
            theme.sent_style()
        } else {
            theme.text_style()
        };
        lines.push(Line::styled(text, style));
    }

    if !app.requests.is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::styled("Requests", theme.muted_style()));
        for request in &app.requests {
            lines.push(Line::styled(
                format!("✉ {} (#{})", display_text(&request.from_username), request.request_id),
                theme.notice_style(),
            ));
        }
    }

    let title = match &app.filter {
        Some(pattern) => format!(" Friends: {} ", display_text(pattern)),
        None => " Friends ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border_style(focused))
        .title(title);
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn entry_lines<'a>(entry: &ViewEntry, theme: &Theme) -> Vec<Line<'a>> {
    let (who, style) = match (entry, entry.kind()) {
        (ViewEntry::Pending { failed: true, .. }, _) => ("✗ you", theme.failed_style()),
        (ViewEntry::Pending { .. }, _) => ("⏳ you", theme.pending_style()),
        (_, MessageKind::Sent) => ("you", theme.sent_style()),
        (_, MessageKind::Received) => ("them", theme.received_style()),
    };

    let mut header = vec![
        Span::styled(format!("[{}] ", display_text(entry.timestamp())), theme.muted_style()),
        Span::styled(format!("{}:", who), style),
    ];
    if entry.is_failed() {
        header.push(Span::styled(" not delivered, Ctrl+R to resend", theme.failed_style()));
    }

    let mut lines = vec![Line::from(header)];
    let body_style = if entry.is_pending() {
        style
    } else {
        theme.text_style()
    };
    for body_line in entry.display_body().split('\n') {
        lines.push(Line::styled(format!("  {}", body_line), body_style));
    }
    lines
}

fn draw_conversation(f: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let title = match &app.snapshot.active {
        Some(target) => format!(" {} ", display_text(&target.display_name)),
        None => " Conversation ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border_style(false))
        .title(title);

    if let Some(placeholder) = &app.snapshot.placeholder {
        let inner_height = area.height.saturating_sub(2) as usize;
        let mut lines = vec![Line::raw(""); inner_height / 2];
        lines.push(Line::styled(placeholder.text(), theme.muted_style()));
        let paragraph = Paragraph::new(lines)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
        return;
    }

    let lines: Vec<Line> = app
        .snapshot
        .entries
        .iter()
        .flat_map(|entry| entry_lines(entry, theme))
        .collect();

    // Show the tail, shifted up by the scroll offset.
    let height = area.height.saturating_sub(2) as usize;
    let max_scroll = lines.len().saturating_sub(height);
    let scroll = app.scroll.min(max_scroll);
    let end = lines.len() - scroll;
    let start = end.saturating_sub(height);
    let visible: Vec<Line> = lines[start..end].to_vec();

    f.render_widget(Paragraph::new(visible).block(block), area);
}

fn draw_notice(f: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let Some(notice) = app.notice.as_ref().filter(|n| n.is_fresh(Local::now())) else {
        return;
    };
    let style = if notice.is_error {
        theme.failed_style()
    } else {
        theme.notice_style()
    };
    f.render_widget(Paragraph::new(Line::styled(format!(" {}", notice.text), style)), area);
}

fn draw_input(f: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let focused = app.focus == Focus::Input;
    let hint = if app.snapshot.can_compose {
        " Message "
    } else {
        " Command "
    };
    let input = Paragraph::new(app.input.as_str())
        .style(theme.input_style())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style(focused))
                .title(hint),
        );
    f.render_widget(input, area);

    if focused && !app.show_help {
        let x = area.x + 1 + app.input.chars().count() as u16;
        f.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let status = Paragraph::new(app.status_text()).style(theme.status_style());
    f.render_widget(status, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_help(f: &mut Frame, theme: &Theme) {
    let popup_area = centered_rect(64, HELP.len() as u16 + 2, f.area());
    f.render_widget(Clear, popup_area);

    let lines: Vec<Line> = HELP.iter().map(|l| Line::styled(*l, theme.text_style())).collect();
    let popup = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.border_style(true))
            .title(" Help (Esc to close) ")
            .title_alignment(Alignment::Left),
    );
    f.render_widget(popup, popup_area);
}
