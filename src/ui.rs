use crate::client::ApiClient;
use crate::protocol::LogEvent;
use crate::render::{self, LineSpec};
use crate::stream::{LogStream, StreamStatus};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::Paragraph;
use ratatui::{Frame, Terminal};
use std::collections::HashSet;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

type UiResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

// Restores terminal settings even if the loop exits early.
struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Self {
        Self
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

enum UiEvent {
    Stream { session: u64, event: LogEvent },
    Done { session: u64, error: Option<String> },
}

struct App {
    client: ApiClient,
    project_id: String,
    run_id: String,
    stream: LogStream,
    sender: mpsc::Sender<UiEvent>,
    receiver: mpsc::Receiver<UiEvent>,
    selected: usize,
    follow: bool,
    expanded: HashSet<usize>,
    should_quit: bool,
}

impl App {
    fn new(client: ApiClient, project_id: String, run_id: String) -> Self {
        let (sender, receiver) = mpsc::channel(256);
        Self {
            client,
            project_id,
            run_id,
            stream: LogStream::new(),
            sender,
            receiver,
            selected: 0,
            follow: true,
            expanded: HashSet::new(),
            should_quit: false,
        }
    }

    fn start_stream(&mut self) {
        let session = self.stream.begin();
        self.expanded.clear();
        self.selected = 0;
        self.follow = true;

        let events = self.sender.clone();
        let done = self.sender.clone();
        let handle = self.client.stream_run_events(
            &self.project_id,
            &self.run_id,
            move |event| {
                let events = events.clone();
                async move {
                    let _ = events.send(UiEvent::Stream { session, event }).await;
                }
            },
            move |error| async move {
                let _ = done.send(UiEvent::Done { session, error }).await;
            },
        );
        self.stream.attach(handle);
    }

    // Applies queued stream signals one at a time, in receipt order.
    fn drain_events(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            match event {
                UiEvent::Stream { session, event } => {
                    if self.stream.push(session, event) && self.follow {
                        self.selected = self.stream.events().len().saturating_sub(1);
                    }
                }
                UiEvent::Done { session, error } => match error {
                    Some(message) => self.stream.fail(session, message),
                    None => self.stream.close(session),
                },
            }
        }
    }

    fn handle_input(&mut self) -> UiResult<()> {
        if !event::poll(Duration::from_millis(50))? {
            return Ok(());
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                return Ok(());
            }
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                self.quit();
                return Ok(());
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.quit(),
                KeyCode::Char('s') => self.stream.stop(),
                KeyCode::Char('r') => self.start_stream(),
                KeyCode::Up | KeyCode::Char('k') => self.select_previous(),
                KeyCode::Down | KeyCode::Char('j') => self.select_next(),
                KeyCode::End | KeyCode::Char('G') => self.resume_follow(),
                KeyCode::Enter | KeyCode::Char(' ') => self.toggle_expanded(),
                _ => {}
            }
        }
        Ok(())
    }

    fn quit(&mut self) {
        self.stream.stop();
        self.should_quit = true;
    }

    fn select_previous(&mut self) {
        self.follow = false;
        self.selected = self.selected.saturating_sub(1);
    }

    fn select_next(&mut self) {
        if self.stream.events().is_empty() {
            return;
        }
        self.follow = false;
        self.selected = (self.selected + 1).min(self.stream.events().len() - 1);
    }

    fn resume_follow(&mut self) {
        self.follow = true;
        self.selected = self.stream.events().len().saturating_sub(1);
    }

    fn toggle_expanded(&mut self) {
        if self.stream.events().is_empty() {
            return;
        }
        if !self.expanded.remove(&self.selected) {
            self.expanded.insert(self.selected);
        }
    }

    fn draw(&self, f: &mut Frame) {
        let [header_area, body_area, footer_area] = Layout::vertical([
            Constraint::Length(2),
            Constraint::Fill(1),
            Constraint::Length(1),
        ])
        .areas(f.area());

        self.draw_header(f, header_area);
        self.draw_body(f, body_area);
        self.draw_footer(f, footer_area);
    }

    fn draw_header(&self, f: &mut Frame, area: Rect) {
        let first = Line::from(vec![
            Span::styled("project ", Style::default().fg(Color::DarkGray)),
            Span::raw(self.project_id.clone()),
            Span::styled("  run ", Style::default().fg(Color::DarkGray)),
            Span::raw(self.run_id.clone()),
            Span::raw("  "),
            status_badge(self.stream.status()),
        ]);
        let second = match self.stream.status() {
            StreamStatus::Error(message) => Line::from(Span::styled(
                format!("stream failed: {}", message),
                Style::default().fg(Color::Red),
            )),
            _ => Line::from(Span::styled(
                format!("{} event(s)", self.stream.events().len()),
                Style::default().fg(Color::DarkGray),
            )),
        };
        f.render_widget(Paragraph::new(Text::from(vec![first, second])), area);
    }

    fn draw_body(&self, f: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = Vec::new();
        let mut selected_range = (0usize, 0usize);
        for (index, event) in self.stream.events().iter().enumerate() {
            let start = lines.len();
            let expanded = self.expanded.contains(&index);
            for spec in render::event_lines(event, expanded) {
                lines.push(line_from_spec(spec, index == self.selected));
            }
            if index == self.selected {
                selected_range = (start, lines.len());
            }
        }

        let height = area.height as usize;
        let total = lines.len();
        let offset = if self.follow || total <= height {
            total.saturating_sub(height)
        } else {
            scroll_offset(selected_range, height, total)
        };

        let paragraph =
            Paragraph::new(Text::from(lines)).scroll((offset.min(u16::MAX as usize) as u16, 0));
        f.render_widget(paragraph, area);
    }

    fn draw_footer(&self, f: &mut Frame, area: Rect) {
        let hints = " q quit · s stop · r restart · ↑/↓ select · enter expand · G follow ";
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(
                hints,
                Style::default().fg(Color::DarkGray),
            ))),
            area,
        );
    }
}

pub async fn run_watch(client: ApiClient, project_id: String, run_id: String) -> UiResult<()> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    let _guard = TerminalGuard::new();
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(client, project_id, run_id);
    app.start_stream();

    while !app.should_quit {
        app.drain_events();
        terminal.draw(|f| app.draw(f))?;
        app.handle_input()?;
    }

    Ok(())
}

fn status_badge(status: &StreamStatus) -> Span<'static> {
    let (label, style) = match status {
        StreamStatus::Idle => ("not connected", Style::default().fg(Color::DarkGray)),
        StreamStatus::Streaming => (
            "streaming",
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        StreamStatus::Stopped => ("stopped", Style::default().fg(Color::Yellow)),
        StreamStatus::Error(_) => (
            "error",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
    };
    Span::styled(format!("[{}]", label), style)
}

fn line_from_spec(spec: LineSpec, selected: bool) -> Line<'static> {
    let style = if selected {
        spec.style.add_modifier(Modifier::REVERSED)
    } else {
        spec.style
    };
    Line::from(Span::styled(spec.text, style))
}

// Keeps the selected event's lines inside a window of `height` rows.
fn scroll_offset(selected: (usize, usize), height: usize, total: usize) -> usize {
    let (start, end) = selected;
    let max_offset = total.saturating_sub(height);
    end.saturating_sub(height).min(start).min(max_offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_offset_keeps_the_selection_visible() {
        // Selection near the top: no scrolling needed.
        assert_eq!(scroll_offset((0, 3), 10, 50), 0);
        // Selection below the window: scroll just far enough.
        assert_eq!(scroll_offset((20, 24), 10, 50), 14);
        // Selection taller than the window: pin to its first line.
        assert_eq!(scroll_offset((5, 30), 10, 50), 5);
        // Never scroll past the end of the content.
        assert_eq!(scroll_offset((48, 50), 10, 50), 40);
    }

    #[test]
    fn status_badge_labels_match_the_session_state() {
        assert_eq!(status_badge(&StreamStatus::Idle).content, "[not connected]");
        assert_eq!(status_badge(&StreamStatus::Streaming).content, "[streaming]");
        assert_eq!(status_badge(&StreamStatus::Stopped).content, "[stopped]");
        assert_eq!(
            status_badge(&StreamStatus::Error("x".to_string())).content,
            "[error]"
        );
    }
}
