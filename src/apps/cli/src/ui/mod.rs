//! TUI interface module
//!
//! Builds the terminal user interface using ratatui: message view,
//! input box and status line.

use std::io;

use anyhow::Result;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use skiff_core::Role;

use crate::app::{model_display_name, App};

pub type Tui = Terminal<CrosstermBackend<io::Stdout>>;

/// Initialize terminal
pub fn init_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore terminal
pub fn restore_terminal(mut terminal: Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_messages(frame, app, chunks[0]);
    draw_input(frame, app, chunks[1]);
    draw_status(frame, app, chunks[2]);
}

fn speaker_style(role: Role) -> Style {
    let color = match role {
        Role::User => Color::Cyan,
        Role::Assistant => Color::Green,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn draw_messages(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let mut lines: Vec<Line> = Vec::new();

    for message in &app.messages {
        let speaker = match message.role {
            Role::User => "You",
            Role::Assistant => model_display_name(&app.model),
        };
        lines.push(Line::from(Span::styled(
            speaker.to_string(),
            speaker_style(message.role),
        )));
        for text_line in message.text.lines() {
            lines.push(Line::from(text_line.to_string()));
        }
        if message.has_image {
            lines.push(Line::from(Span::styled(
                "[image attached]",
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines.push(Line::from(""));
    }

    if let Some(pending) = &app.pending_assistant {
        lines.push(Line::from(Span::styled(
            model_display_name(&app.model).to_string(),
            speaker_style(Role::Assistant),
        )));
        for text_line in pending.lines() {
            lines.push(Line::from(text_line.to_string()));
        }
    }

    // Keep the newest output visible.
    let height = area.height.saturating_sub(2) as usize;
    let scroll = lines.len().saturating_sub(height) as u16;

    let messages = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Chat with {} ", model_display_name(&app.model))),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(messages, area);
}

fn draw_input(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let title = if app.generating {
        " generating... (Esc to stop) "
    } else {
        " Message (Enter to send, /model /vision /image /models, Ctrl+C to quit) "
    };

    let input = Paragraph::new(app.input.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if app.generating {
                Color::Yellow
            } else {
                Color::Blue
            }))
            .title(title),
    );
    frame.render_widget(input, area);

    if !app.generating {
        frame.set_cursor_position((area.x + 1 + app.input.len() as u16, area.y + 1));
    }
}

fn draw_status(frame: &mut Frame, app: &App, area: ratatui::layout::Rect) {
    let mut spans = vec![Span::styled(
        format!(" {} ", model_display_name(&app.model)),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(progress) = &app.last_progress {
        spans.push(Span::styled(
            format!(
                "| {:.0} chars/s, {:.1}s ",
                progress.chars_per_second, progress.elapsed_seconds
            ),
            Style::default().fg(Color::Yellow),
        ));
    }

    if let Some(status) = &app.status {
        spans.push(Span::styled(
            format!("| {} ", status),
            Style::default().fg(Color::DarkGray),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
