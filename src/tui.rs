//! Terminal User Interface module for Clip Captioner
//! Built with Ratatui; background tasks talk to it over a message channel.

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;

use crate::store::ItemStore;
use crate::types::{
    CaptionStatus, ItemId, ProcessingStatus, SubtitleRemovalConfig, APP_NAME, APP_VERSION,
};

/// Messages sent from background tasks to the TUI
#[derive(Debug, Clone)]
pub enum AppMessage {
    /// Add a log entry
    Log(LogLevel, String),
    /// The native file picker closed; empty when the user cancelled
    FilesPicked(Vec<PathBuf>),
}

/// Log levels for activity messages
#[derive(Debug, Clone, Copy)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User intents raised by key handling, drained by the event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Open the native multi-file picker
    PickFiles,
    /// Re-run caption generation for one item
    Retry(ItemId),
    /// Remove one item from the session
    Remove(ItemId),
    /// Open the item's preview (or processed output) externally
    OpenPreview(ItemId),
}

/// Current screen of the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppScreen {
    /// Item list + caption detail
    Browse,
    /// Editing the global style prompt
    PromptInput,
}

/// Log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: String,
}

/// Lightweight per-item view, synced from the store once per frame so
/// rendering never holds the store lock.
#[derive(Debug, Clone)]
pub struct ItemRow {
    pub id: ItemId,
    pub name: String,
    pub size_bytes: u64,
    pub caption_status: CaptionStatus,
    pub caption_text: String,
    pub caption_error: Option<String>,
    pub processing_status: ProcessingStatus,
    pub subtitle_config: SubtitleRemovalConfig,
}

/// Main application state
pub struct App {
    /// Current screen
    pub screen: AppScreen,
    /// Application start time
    pub start_time: Instant,
    /// Current status message
    pub status: String,
    /// Log entries
    pub logs: Vec<LogEntry>,
    /// Item views, newest first (mirror of the store)
    pub rows: Vec<ItemRow>,
    /// Selected row index
    pub selected: usize,
    /// User input buffer (prompt editing)
    pub input: String,
    /// Cursor position in input
    pub cursor_pos: usize,
    /// Global style prompt applied to new generation runs
    pub style_prompt: String,
    /// Global subtitle removal defaults for newly created items
    pub subtitle_defaults: SubtitleRemovalConfig,
    /// Whether the native file picker is currently open
    pub picker_open: bool,
    /// Whether app should quit
    pub should_quit: bool,
    /// Intents raised by key handling, drained by the event loop
    pub pending: Vec<UserAction>,
}

impl App {
    /// Create new app instance
    pub fn new(style_prompt: String, subtitle_defaults: SubtitleRemovalConfig) -> Self {
        Self {
            screen: AppScreen::Browse,
            start_time: Instant::now(),
            status: "Ready".to_string(),
            logs: Vec::new(),
            rows: Vec::new(),
            selected: 0,
            input: String::new(),
            cursor_pos: 0,
            style_prompt,
            subtitle_defaults,
            picker_open: false,
            should_quit: false,
            pending: Vec::new(),
        }
    }

    /// Get formatted uptime
    pub fn uptime(&self) -> String {
        let elapsed = self.start_time.elapsed();
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    }

    /// Add a log entry
    pub fn log(&mut self, level: LogLevel, message: String) {
        let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
        self.logs.push(LogEntry {
            level,
            message,
            timestamp,
        });
        // Keep logs manageable
        if self.logs.len() > 100 {
            self.logs.remove(0);
        }
    }

    /// Mirror the store into render rows, keeping the selection in range
    pub fn sync_items(&mut self, store: &ItemStore) {
        self.rows = store
            .items()
            .iter()
            .map(|item| ItemRow {
                id: item.id,
                name: item.file_name(),
                size_bytes: item.size_bytes,
                caption_status: item.caption_status,
                caption_text: item.caption_text.clone(),
                caption_error: item.caption_error.clone(),
                processing_status: item.processing_status,
                subtitle_config: item.subtitle_config,
            })
            .collect();

        if self.selected >= self.rows.len() {
            self.selected = self.rows.len().saturating_sub(1);
        }
    }

    /// Id of the currently selected item, if any
    pub fn selected_id(&self) -> Option<ItemId> {
        self.rows.get(self.selected).map(|row| row.id)
    }

    /// Handle key events
    pub fn handle_key(&mut self, key: KeyCode) {
        match &self.screen {
            AppScreen::Browse => match key {
                KeyCode::Char('u') => {
                    if !self.picker_open {
                        self.pending.push(UserAction::PickFiles);
                    }
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    if self.selected > 0 {
                        self.selected -= 1;
                    }
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if self.selected + 1 < self.rows.len() {
                        self.selected += 1;
                    }
                }
                KeyCode::Char('r') => {
                    if let Some(id) = self.selected_id() {
                        self.pending.push(UserAction::Retry(id));
                    }
                }
                KeyCode::Char('d') | KeyCode::Delete => {
                    if let Some(id) = self.selected_id() {
                        self.pending.push(UserAction::Remove(id));
                    }
                }
                KeyCode::Char('o') => {
                    if let Some(id) = self.selected_id() {
                        self.pending.push(UserAction::OpenPreview(id));
                    }
                }
                KeyCode::Char('p') => {
                    self.input = self.style_prompt.clone();
                    self.cursor_pos = self.input.len();
                    self.screen = AppScreen::PromptInput;
                }
                KeyCode::Char('s') => {
                    self.subtitle_defaults.enabled = !self.subtitle_defaults.enabled;
                    let state = if self.subtitle_defaults.enabled {
                        "enabled"
                    } else {
                        "disabled"
                    };
                    self.log(
                        LogLevel::Info,
                        format!("Subtitle removal {} for new uploads", state),
                    );
                }
                KeyCode::Char('m') => {
                    self.subtitle_defaults.mode = self.subtitle_defaults.mode.toggled();
                    self.log(
                        LogLevel::Info,
                        format!("Removal mode: {}", self.subtitle_defaults.mode.label()),
                    );
                }
                KeyCode::Char('a') => {
                    self.subtitle_defaults.area = self.subtitle_defaults.area.toggled();
                    self.log(
                        LogLevel::Info,
                        format!("Removal area: {}", self.subtitle_defaults.area.label()),
                    );
                }
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.should_quit = true;
                }
                _ => {}
            },
            AppScreen::PromptInput => match key {
                KeyCode::Enter => {
                    self.style_prompt = self.input.trim().to_string();
                    if self.style_prompt.is_empty() {
                        self.log(
                            LogLevel::Info,
                            "Style prompt cleared; using the default analysis prompt".to_string(),
                        );
                    } else {
                        self.log(LogLevel::Info, "Style prompt updated".to_string());
                    }
                    self.screen = AppScreen::Browse;
                }
                KeyCode::Char(c) => {
                    self.input.insert(self.cursor_pos, c);
                    self.cursor_pos += 1;
                }
                KeyCode::Backspace => {
                    if self.cursor_pos > 0 {
                        self.cursor_pos -= 1;
                        self.input.remove(self.cursor_pos);
                    }
                }
                KeyCode::Delete => {
                    if self.cursor_pos < self.input.len() {
                        self.input.remove(self.cursor_pos);
                    }
                }
                KeyCode::Left => {
                    if self.cursor_pos > 0 {
                        self.cursor_pos -= 1;
                    }
                }
                KeyCode::Right => {
                    if self.cursor_pos < self.input.len() {
                        self.cursor_pos += 1;
                    }
                }
                KeyCode::Esc => {
                    self.screen = AppScreen::Browse;
                }
                _ => {}
            },
        }
    }

    /// Process messages from background tasks
    pub fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Log(level, message) => self.log(level, message),
            // FilesPicked is routed through the event loop, which owns
            // intake and task scheduling.
            AppMessage::FilesPicked(_) => {}
        }
    }
}

/// Setup the terminal for TUI
pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restore terminal to normal state
pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Render the TUI
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Main layout: Header, Content, Footer
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Header
            Constraint::Min(10),   // Content
            Constraint::Length(3), // Footer
        ])
        .split(area);

    render_header(frame, app, main_layout[0]);
    match app.screen {
        AppScreen::Browse => render_browse(frame, app, main_layout[1]),
        AppScreen::PromptInput => render_prompt_input(frame, app, main_layout[1]),
    }
    render_footer(frame, app, main_layout[2]);
}

/// Render the header section
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let header_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            format!(" {} v{} ", APP_NAME, APP_VERSION),
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ));

    let inner = header_block.inner(area);
    frame.render_widget(header_block, area);

    let header_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    let prompt_label = if app.style_prompt.trim().is_empty() {
        Span::styled("default", Style::default().fg(Color::DarkGray))
    } else {
        Span::styled(
            truncate(&app.style_prompt, 40),
            Style::default().fg(Color::Yellow),
        )
    };

    let removal = &app.subtitle_defaults;
    let removal_label = if removal.enabled {
        Span::styled(
            format!("ON ({}, {})", removal.mode.label(), removal.area.label()),
            Style::default().fg(Color::Green),
        )
    } else {
        Span::styled("OFF", Style::default().fg(Color::DarkGray))
    };

    let left_text = Text::from(vec![
        Line::from(vec![
            Span::raw("⚡ Status: "),
            Span::styled(app.status.clone(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![Span::raw("✍  Style prompt: "), prompt_label]),
        Line::from(vec![Span::raw("🧹 Subtitle removal: "), removal_label]),
    ]);
    frame.render_widget(Paragraph::new(left_text), header_layout[0]);

    let completed = app
        .rows
        .iter()
        .filter(|row| row.caption_status == CaptionStatus::Completed)
        .count();

    let right_text = Text::from(vec![
        Line::from(vec![
            Span::raw("⏱  Uptime: "),
            Span::styled(app.uptime(), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::raw("🎬 Captions: "),
            Span::styled(
                format!("{}/{}", completed, app.rows.len()),
                Style::default().fg(Color::Green),
            ),
        ]),
    ]);
    frame.render_widget(Paragraph::new(right_text), header_layout[1]);
}

/// Render the main browse screen: item list, caption detail, activity log
fn render_browse(frame: &mut Frame, app: &App, area: Rect) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(8), Constraint::Length(8)])
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(layout[0]);

    render_items(frame, app, columns[0]);
    render_detail(frame, app, columns[1]);
    render_logs(frame, app, layout[1]);
}

fn caption_status_span(status: CaptionStatus) -> Span<'static> {
    match status {
        CaptionStatus::Idle => Span::styled("· idle", Style::default().fg(Color::DarkGray)),
        CaptionStatus::Preparing => {
            Span::styled("… preparing", Style::default().fg(Color::Yellow))
        }
        CaptionStatus::Analyzing => Span::styled("▶ analyzing", Style::default().fg(Color::Cyan)),
        CaptionStatus::Completed => Span::styled("✔ done", Style::default().fg(Color::Green)),
        CaptionStatus::Error => Span::styled("✘ failed", Style::default().fg(Color::Red)),
    }
}

fn processing_status_span(status: ProcessingStatus) -> Option<Span<'static>> {
    match status {
        ProcessingStatus::Idle => None,
        ProcessingStatus::Processing => Some(Span::styled(
            "🧹 removing…",
            Style::default().fg(Color::Yellow),
        )),
        ProcessingStatus::Completed => Some(Span::styled(
            "🧹 clean",
            Style::default().fg(Color::Green),
        )),
        ProcessingStatus::Error => {
            Some(Span::styled("🧹 failed", Style::default().fg(Color::Red)))
        }
    }
}

fn render_items(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" 📼 Uploads ({}) ", app.rows.len()));

    if app.rows.is_empty() {
        let empty = Paragraph::new(Text::from(vec![
            Line::from(""),
            Line::from("No videos yet."),
            Line::from(""),
            Line::from(Span::styled(
                "Press 'u' to upload one or more videos.",
                Style::default().fg(Color::DarkGray),
            )),
        ]))
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let marker = if index == app.selected { "▸ " } else { "  " };
            let name_style = if index == app.selected {
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };

            let mut spans = vec![
                Span::raw(marker),
                Span::styled(truncate(&row.name, 28), name_style),
                Span::styled(
                    format!(" {} ", format_size(row.size_bytes)),
                    Style::default().fg(Color::DarkGray),
                ),
                caption_status_span(row.caption_status),
            ];
            if let Some(badge) = processing_status_span(row.processing_status) {
                spans.push(Span::raw(" "));
                spans.push(badge);
            }

            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items).block(block);
    frame.render_widget(list, area);
}

fn render_detail(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" 📝 Caption ");

    let Some(row) = app.rows.get(app.selected) else {
        frame.render_widget(
            Paragraph::new("Select an upload to see its caption.").block(block),
            area,
        );
        return;
    };

    let mut lines = vec![Line::from(vec![
        Span::styled(row.name.clone(), Style::default().fg(Color::Cyan)),
        Span::styled(
            format!("  {}", format_size(row.size_bytes)),
            Style::default().fg(Color::DarkGray),
        ),
    ])];

    let snapshot = &row.subtitle_config;
    if snapshot.enabled {
        lines.push(Line::from(Span::styled(
            format!(
                "Subtitle removal: {} / {}",
                snapshot.mode.label(),
                snapshot.area.label()
            ),
            Style::default().fg(Color::DarkGray),
        )));
    }
    lines.push(Line::from(""));

    match row.caption_status {
        CaptionStatus::Error => {
            let message = row
                .caption_error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            lines.push(Line::from(Span::styled(
                message,
                Style::default().fg(Color::Red),
            )));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Press 'r' to retry.",
                Style::default().fg(Color::DarkGray),
            )));
        }
        CaptionStatus::Preparing => {
            lines.push(Line::from(Span::styled(
                "Preparing upload…",
                Style::default().fg(Color::Yellow),
            )));
        }
        _ => {
            if row.caption_text.is_empty() {
                lines.push(Line::from(Span::styled(
                    "Waiting for the first words…",
                    Style::default().fg(Color::DarkGray),
                )));
            } else {
                lines.push(Line::from(Span::raw(row.caption_text.clone())));
                if row.caption_status == CaptionStatus::Analyzing {
                    lines.push(Line::from(Span::styled(
                        "▌",
                        Style::default().fg(Color::Cyan),
                    )));
                }
            }
        }
    }

    let paragraph = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_logs(frame: &mut Frame, app: &App, area: Rect) {
    let logs_block = Block::default()
        .borders(Borders::ALL)
        .title(" Activity Log ");

    let log_items: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .take(6)
        .map(|entry| {
            let (icon, color) = match entry.level {
                LogLevel::Info => ("ℹ️ ", Color::Blue),
                LogLevel::Success => ("✔ ", Color::Green),
                LogLevel::Warning => ("⚠ ", Color::Yellow),
                LogLevel::Error => ("✘ ", Color::Red),
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", entry.timestamp),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(icon),
                Span::styled(entry.message.clone(), Style::default().fg(color)),
            ]))
        })
        .collect();

    let logs_list = List::new(log_items).block(logs_block);
    frame.render_widget(logs_list, area);
}

fn render_prompt_input(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" ✍ Style Prompt ");

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let input_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(inner);

    let instructions = Paragraph::new(
        "Describe the caption style for future runs (e.g. \"humorous, for a cooking channel, with hashtags\"). Leave empty for the default analysis prompt.",
    )
    .style(Style::default().fg(Color::Gray))
    .wrap(Wrap { trim: true });
    frame.render_widget(instructions, input_layout[0]);

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));

    let input_text = Paragraph::new(app.input.as_str())
        .block(input_block)
        .style(Style::default().fg(Color::Yellow));

    frame.render_widget(input_text, input_layout[1]);

    frame.set_cursor_position((
        input_layout[1].x + 1 + app.cursor_pos as u16,
        input_layout[1].y + 1,
    ));
}

/// Render the footer with keyboard shortcuts
fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = match &app.screen {
        AppScreen::Browse => {
            "U: Upload | ↑/↓: Select | R: Retry | D: Remove | O: Open | P: Prompt | S/M/A: Removal | Q: Quit"
        }
        AppScreen::PromptInput => "Enter: Save | Esc: Cancel",
    };

    let footer_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Keyboard Shortcuts ");

    let footer_text = Paragraph::new(shortcuts)
        .block(footer_block)
        .style(Style::default().fg(Color::Gray));

    frame.render_widget(footer_text, area);
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}

fn format_size(bytes: u64) -> String {
    let mb = bytes as f64 / 1_048_576.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if mb >= 1.0 {
        format!("{:.1} MB", mb)
    } else {
        format!("{:.0} KB", bytes as f64 / 1024.0)
    }
}

/// Channel for sending messages to the TUI
pub type TuiSender = mpsc::UnboundedSender<AppMessage>;
pub type TuiReceiver = mpsc::UnboundedReceiver<AppMessage>;

/// Create a new message channel
pub fn create_channel() -> (TuiSender, TuiReceiver) {
    mpsc::unbounded_channel()
}
