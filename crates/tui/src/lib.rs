mod workspace;

use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use ratatui::{Frame, Terminal};
use tabula_core::config::AppConfig;
use tabula_core::export::ExportSettings;
use tabula_core::projection::selection_summary;
use tabula_core::session::Session;
use tabula_core::value::{render_cell, CellValue};
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};

use crate::workspace::{ExportFormat, Workspace, WorkspaceError};

const POLL_INTERVAL: Duration = Duration::from_millis(120);
const GRID_COLUMN_WIDTH: u16 = 18;
const DEFAULT_EXTRACT_DIR: &str = "extracted_photos";
const DATABASE_EXTENSION: &str = "db";

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    DatabasePicker,
    Tables,
    Grid,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Self::DatabasePicker => Self::DatabasePicker,
            Self::Tables => Self::Grid,
            Self::Grid => Self::Tables,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    OpenDatabase,
    TableFilter,
    EditCell { row: usize, column: usize },
    ReplaceImage { row: usize, column: usize },
    Selection,
    AddJoin,
    InsertRow,
    CreateTable,
    AddColumn,
    RenameColumn { column: usize },
    ExportPath(ExportFormat),
    ImportPath,
    ExtractDirectory,
}

impl PromptKind {
    fn label(self) -> &'static str {
        match self {
            Self::OpenDatabase => "Database file",
            Self::TableFilter => "Filter tables",
            Self::EditCell { .. } => "New value",
            Self::ReplaceImage { .. } => "Image file",
            Self::Selection => "Columns (comma separated, blank for all)",
            Self::AddJoin => "Join <table> <base column> <target column> [inner|left]",
            Self::InsertRow => "New row (column=value | column=value)",
            Self::CreateTable => "New table (<name> <column> <TYPE>, ...)",
            Self::AddColumn => "New column (<name> [TYPE] [default])",
            Self::RenameColumn { .. } => "Rename column to",
            Self::ExportPath(_) => "Export to",
            Self::ImportPath => "Import rows from workbook",
            Self::ExtractDirectory => "Extract photos into",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Prompt {
    kind: PromptKind,
    buffer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingDelete {
    Row(usize),
    Table(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    NextPane,
    Submit,
    Cancel,
    Navigate(DirectionKey),
    Input(char),
    Backspace,
    Refresh,
    FilterTables,
    QuickJoin,
    AddJoin,
    RemoveLastJoin,
    ClearJoins,
    SortByColumn,
    ToggleSortDirection,
    EditSelection,
    Delete,
    InsertRow,
    CreateTable,
    AddColumn,
    RenameColumn,
    Export(ExportFormat),
    ImportSpreadsheet,
    ToggleJoinMark,
    Inspect,
    ExtractImages,
    CycleThumbnailSize,
    ToggleImageFiles,
    ToggleIncludeImages,
}

#[derive(Debug)]
struct TuiApp {
    runtime: Runtime,
    config: AppConfig,
    export_settings: ExportSettings,
    pane: Pane,
    prompt: Option<Prompt>,
    workspace: Option<Workspace>,
    table_filter: String,
    selected_table_index: usize,
    join_marks: Vec<String>,
    cursor_row: usize,
    cursor_column: usize,
    pending_delete: Option<PendingDelete>,
    report: Option<String>,
    show_help: bool,
    should_quit: bool,
    status_line: String,
}

impl TuiApp {
    fn new(config: AppConfig) -> Result<Self, TuiError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let initial_path = config.default_database.display().to_string();
        Ok(Self {
            runtime,
            export_settings: config.export,
            config,
            pane: Pane::DatabasePicker,
            prompt: Some(Prompt {
                kind: PromptKind::OpenDatabase,
                buffer: initial_path,
            }),
            workspace: None,
            table_filter: String::new(),
            selected_table_index: 0,
            join_marks: Vec::new(),
            cursor_row: 0,
            cursor_column: 0,
            pending_delete: None,
            report: None,
            show_help: false,
            should_quit: false,
            status_line: "Enter opens the file (created when missing), Esc the default database"
                .to_string(),
        })
    }

    fn is_typing(&self) -> bool {
        self.prompt.is_some()
    }

    fn handle(&mut self, msg: Msg) {
        if msg != Msg::Delete {
            self.pending_delete = None;
        }
        if self.report.is_some() && matches!(msg, Msg::Submit | Msg::Cancel) {
            self.report = None;
            return;
        }

        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::NextPane => self.pane = self.pane.next(),
            Msg::Submit => self.submit(),
            Msg::Cancel => self.cancel(),
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::Input(ch) => self.push_input(ch),
            Msg::Backspace => {
                if let Some(prompt) = self.prompt.as_mut() {
                    prompt.buffer.pop();
                    if prompt.kind == PromptKind::TableFilter {
                        self.table_filter.clone_from(&prompt.buffer);
                        self.selected_table_index = 0;
                    }
                }
            }
            Msg::Refresh => self.with_workspace(|workspace, runtime| {
                workspace.refresh(runtime)?;
                Ok("Schema and rows reloaded".to_string())
            }),
            Msg::FilterTables => {
                let current = self.table_filter.clone();
                self.open_prompt(PromptKind::TableFilter, current);
            }
            Msg::QuickJoin => self.quick_join(),
            Msg::AddJoin => self.open_prompt_with_table(PromptKind::AddJoin, String::new()),
            Msg::RemoveLastJoin => self.with_workspace(Workspace::remove_last_join),
            Msg::ClearJoins => self.with_workspace(Workspace::clear_joins),
            Msg::SortByColumn => self.sort_by_cursor_column(),
            Msg::ToggleSortDirection => self.with_workspace(Workspace::toggle_sort_direction),
            Msg::EditSelection => {
                let current = self
                    .workspace
                    .as_ref()
                    .map(|workspace| workspace.session().selection().join(", "))
                    .unwrap_or_default();
                self.open_prompt_with_table(PromptKind::Selection, current);
            }
            Msg::Delete => self.delete(),
            Msg::InsertRow => self.open_prompt_with_table(PromptKind::InsertRow, String::new()),
            Msg::CreateTable => {
                if self.workspace.is_some() {
                    self.open_prompt(PromptKind::CreateTable, String::new());
                }
            }
            Msg::AddColumn => self.open_prompt_with_table(PromptKind::AddColumn, String::new()),
            Msg::RenameColumn => self.begin_rename(),
            Msg::Export(format) => self.begin_export(format),
            Msg::ImportSpreadsheet => {
                self.open_prompt_with_table(PromptKind::ImportPath, String::new());
            }
            Msg::ToggleJoinMark => self.toggle_join_mark(),
            Msg::Inspect => self.inspect(),
            Msg::ExtractImages => {
                if self.workspace.is_some() {
                    self.open_prompt(
                        PromptKind::ExtractDirectory,
                        DEFAULT_EXTRACT_DIR.to_string(),
                    );
                }
            }
            Msg::CycleThumbnailSize => {
                self.export_settings.thumbnail_size = self.export_settings.thumbnail_size.next();
                self.status_line = format!(
                    "Thumbnail size: {} px",
                    self.export_settings.thumbnail_size.pixels()
                );
            }
            Msg::ToggleImageFiles => {
                self.export_settings.save_images_as_files =
                    !self.export_settings.save_images_as_files;
                self.status_line = format!(
                    "Save images as files: {}",
                    on_off(self.export_settings.save_images_as_files)
                );
            }
            Msg::ToggleIncludeImages => {
                self.export_settings.include_images = !self.export_settings.include_images;
                self.status_line = format!(
                    "Include images in exports: {}",
                    on_off(self.export_settings.include_images)
                );
            }
        }
    }

    fn with_workspace<F>(&mut self, action: F)
    where
        F: FnOnce(&mut Workspace, &Runtime) -> Result<String, WorkspaceError>,
    {
        let Some(workspace) = self.workspace.as_mut() else {
            self.status_line = "Open a database first".to_string();
            return;
        };
        let outcome = action(workspace, &self.runtime);
        self.report_outcome(outcome);
        self.clamp_cursor();
    }

    fn report_outcome(&mut self, outcome: Result<String, WorkspaceError>) {
        match outcome {
            Ok(message) => self.status_line = message,
            Err(error) => {
                tracing::warn!(%error, "action failed");
                self.status_line = format!("Error: {error}");
            }
        }
    }

    fn open_prompt(&mut self, kind: PromptKind, initial: String) {
        self.prompt = Some(Prompt {
            kind,
            buffer: initial,
        });
    }

    // Prompts acting on the current view need a base table.
    fn open_prompt_with_table(&mut self, kind: PromptKind, initial: String) {
        let has_table = self
            .workspace
            .as_ref()
            .is_some_and(|workspace| workspace.session().current_table().is_some());
        if has_table {
            self.open_prompt(kind, initial);
        } else {
            self.status_line = "Select a table first".to_string();
        }
    }

    fn push_input(&mut self, ch: char) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        prompt.buffer.push(ch);
        if prompt.kind == PromptKind::TableFilter {
            self.table_filter.clone_from(&prompt.buffer);
            self.selected_table_index = 0;
        }
    }

    fn cancel(&mut self) {
        match self.prompt.take() {
            Some(Prompt {
                kind: PromptKind::OpenDatabase,
                ..
            }) if self.workspace.is_none() => self.open_database(""),
            Some(Prompt {
                kind: PromptKind::TableFilter,
                ..
            }) => {
                self.table_filter.clear();
                self.selected_table_index = 0;
            }
            Some(_) => self.status_line = "Cancelled".to_string(),
            None => self.show_help = false,
        }
    }

    fn submit(&mut self) {
        if let Some(prompt) = self.prompt.take() {
            self.submit_prompt(prompt);
            return;
        }
        match self.pane {
            Pane::DatabasePicker => self.open_prompt(PromptKind::OpenDatabase, String::new()),
            Pane::Tables => self.open_highlighted_table(),
            Pane::Grid => self.begin_edit(),
        }
    }

    fn submit_prompt(&mut self, prompt: Prompt) {
        let Prompt { kind, buffer } = prompt;
        let input = buffer.trim();
        match kind {
            PromptKind::OpenDatabase => self.open_database(&buffer),
            PromptKind::TableFilter => {
                self.status_line = format!("{} tables match", self.visible_tables().len());
            }
            PromptKind::EditCell { row, column } => self.with_workspace(|workspace, runtime| {
                workspace.update_cell(runtime, row, column, &buffer)
            }),
            PromptKind::ReplaceImage { row, column } => self.with_workspace(|workspace, runtime| {
                workspace.update_image(runtime, row, column, Path::new(input))
            }),
            PromptKind::Selection => {
                self.with_workspace(|workspace, runtime| workspace.set_selection(runtime, input));
            }
            PromptKind::AddJoin => {
                self.with_workspace(|workspace, runtime| workspace.add_join(runtime, input));
            }
            PromptKind::InsertRow => {
                self.with_workspace(|workspace, runtime| workspace.insert_row(runtime, input));
            }
            PromptKind::CreateTable => {
                self.with_workspace(|workspace, runtime| workspace.create_table(runtime, input));
            }
            PromptKind::AddColumn => {
                self.with_workspace(|workspace, runtime| workspace.add_column(runtime, input));
            }
            PromptKind::RenameColumn { column } => self.with_workspace(|workspace, runtime| {
                workspace.rename_column(runtime, column, input)
            }),
            PromptKind::ExportPath(format) => self.export(format, Path::new(input)),
            PromptKind::ImportPath => self.with_workspace(|workspace, runtime| {
                workspace.import_spreadsheet(runtime, Path::new(input))
            }),
            PromptKind::ExtractDirectory => {
                let target = if input.is_empty() {
                    DEFAULT_EXTRACT_DIR
                } else {
                    input
                };
                let Some(workspace) = self.workspace.as_ref() else {
                    return;
                };
                match workspace.extract_images(&self.runtime, Path::new(target)) {
                    Ok(report) => {
                        self.status_line = format!("Photos extracted into {target}");
                        self.report = Some(report);
                    }
                    Err(error) => self.report_outcome(Err(error)),
                }
            }
        }
    }

    fn open_database(&mut self, raw_path: &str) {
        let path = database_path(raw_path, &self.config.default_database);

        match Workspace::open(&self.runtime, &path, self.config.schema_cache_ttl()) {
            Ok(workspace) => {
                if let Some(previous) = self.workspace.replace(workspace) {
                    previous.close(&self.runtime);
                }
                self.pane = Pane::Tables;
                self.table_filter.clear();
                self.selected_table_index = 0;
                self.join_marks.clear();
                self.cursor_row = 0;
                self.cursor_column = 0;
                self.status_line = format!(
                    "Opened {} ({} tables)",
                    path.display(),
                    self.visible_tables().len()
                );
            }
            Err(error) => {
                self.status_line = format!("Error: {error}");
                if self.workspace.is_none() {
                    self.open_prompt(PromptKind::OpenDatabase, raw_path.to_string());
                }
            }
        }
    }

    fn visible_tables(&self) -> Vec<&str> {
        let Some(workspace) = self.workspace.as_ref() else {
            return Vec::new();
        };
        let needle = self.table_filter.to_lowercase();
        workspace
            .tables()
            .iter()
            .map(String::as_str)
            .filter(|table| needle.is_empty() || table.to_lowercase().contains(&needle))
            .collect()
    }

    fn highlighted_table(&self) -> Option<String> {
        self.visible_tables()
            .get(self.selected_table_index)
            .map(|table| (*table).to_string())
    }

    fn open_highlighted_table(&mut self) {
        let Some(table) = self.highlighted_table() else {
            self.status_line = "No table highlighted".to_string();
            return;
        };
        self.cursor_row = 0;
        self.cursor_column = 0;
        self.with_workspace(|workspace, runtime| {
            workspace.select_table(runtime, &table)?;
            Ok(format!("Showing `{table}`"))
        });
        self.pane = Pane::Grid;
    }

    fn toggle_join_mark(&mut self) {
        let Some(table) = self.highlighted_table() else {
            self.status_line = "No table highlighted".to_string();
            return;
        };
        if let Some(position) = self.join_marks.iter().position(|marked| *marked == table) {
            self.join_marks.remove(position);
        } else {
            self.join_marks.push(table);
        }
        self.status_line = format!("{} tables marked for joining", self.join_marks.len());
    }

    // Marked tables join as one batch; without marks the highlighted one does.
    fn quick_join(&mut self) {
        let targets = if self.join_marks.is_empty() {
            let Some(target) = self.highlighted_table() else {
                self.status_line = "Highlight a table to join".to_string();
                return;
            };
            vec![target]
        } else {
            std::mem::take(&mut self.join_marks)
        };
        self.with_workspace(|workspace, runtime| workspace.quick_join(runtime, &targets));
    }

    fn cursor_column_name(&self) -> Option<String> {
        self.workspace
            .as_ref()
            .and_then(Workspace::grid)
            .and_then(|grid| grid.column_name(self.cursor_column))
            .map(str::to_string)
    }

    fn sort_by_cursor_column(&mut self) {
        let Some(column) = self.cursor_column_name() else {
            self.status_line = "No column under the cursor".to_string();
            return;
        };
        self.with_workspace(|workspace, runtime| workspace.sort_by(runtime, &column));
    }

    fn begin_edit(&mut self) {
        let Some(grid) = self.workspace.as_ref().and_then(Workspace::grid) else {
            self.status_line = "Select a table first".to_string();
            return;
        };
        let Some(value) = grid.result.cell(self.cursor_row, self.cursor_column) else {
            self.status_line = "No cell under the cursor".to_string();
            return;
        };

        let (row, column) = (self.cursor_row, self.cursor_column);
        let holds_image = match value {
            CellValue::Blob(_) => true,
            CellValue::Null => grid.is_blob_column(column),
            _ => false,
        };
        if holds_image {
            self.open_prompt(PromptKind::ReplaceImage { row, column }, String::new());
        } else {
            let current = render_cell(value, false);
            self.open_prompt(PromptKind::EditCell { row, column }, current);
        }
    }

    fn begin_rename(&mut self) {
        match self.cursor_column_name() {
            Some(name) => self.open_prompt(
                PromptKind::RenameColumn {
                    column: self.cursor_column,
                },
                name,
            ),
            None => self.status_line = "No column under the cursor".to_string(),
        }
    }

    // A destructive key must be pressed twice in a row.
    fn delete(&mut self) {
        let target = match self.pane {
            Pane::Grid => {
                let has_row = self
                    .workspace
                    .as_ref()
                    .and_then(Workspace::grid)
                    .is_some_and(|grid| self.cursor_row < grid.result.len());
                if !has_row {
                    self.status_line = "No row under the cursor".to_string();
                    return;
                }
                PendingDelete::Row(self.cursor_row)
            }
            Pane::Tables => {
                let Some(table) = self.highlighted_table() else {
                    self.status_line = "No table highlighted".to_string();
                    return;
                };
                PendingDelete::Table(table)
            }
            Pane::DatabasePicker => return,
        };

        if self.pending_delete.as_ref() != Some(&target) {
            self.status_line = match &target {
                PendingDelete::Row(row) => format!("Press d again to delete row {}", row + 1),
                PendingDelete::Table(table) => format!("Press d again to drop `{table}`"),
            };
            self.pending_delete = Some(target);
            return;
        }

        self.pending_delete = None;
        match target {
            PendingDelete::Row(row) => {
                self.with_workspace(|workspace, runtime| workspace.delete_row(runtime, row));
            }
            PendingDelete::Table(table) => {
                self.join_marks.retain(|marked| *marked != table);
                self.with_workspace(|workspace, runtime| workspace.drop_table(runtime, &table));
                self.selected_table_index = self.selected_table_index.saturating_sub(1);
            }
        }
    }

    fn begin_export(&mut self, format: ExportFormat) {
        let Some(table) = self
            .workspace
            .as_ref()
            .filter(|workspace| workspace.grid().is_some())
            .and_then(|workspace| workspace.session().current_table())
        else {
            self.status_line = "Nothing to export; select a table first".to_string();
            return;
        };
        let initial = format!("{table}.{}", format.extension());
        self.open_prompt(PromptKind::ExportPath(format), initial);
    }

    fn export(&mut self, format: ExportFormat, destination: &Path) {
        let Some(workspace) = self.workspace.as_ref() else {
            return;
        };
        let outcome = workspace.export(
            format,
            destination,
            &self.export_settings,
            self.config.pdf_font_path.clone(),
        );
        self.report_outcome(outcome);
    }

    fn inspect(&mut self) {
        let Some(workspace) = self.workspace.as_ref() else {
            self.status_line = "Open a database first".to_string();
            return;
        };
        match workspace.inspect(&self.runtime) {
            Ok(report) => {
                self.report = Some(report);
                self.status_line = "Database inspected".to_string();
            }
            Err(error) => self.report_outcome(Err(error)),
        }
    }

    fn navigate(&mut self, direction: DirectionKey) {
        match self.pane {
            Pane::DatabasePicker => {}
            Pane::Tables => {
                let count = self.visible_tables().len();
                if count == 0 {
                    self.status_line = "No tables available".to_string();
                    return;
                }
                self.selected_table_index = match direction {
                    DirectionKey::Up | DirectionKey::Left => {
                        self.selected_table_index.saturating_sub(1)
                    }
                    DirectionKey::Down | DirectionKey::Right => {
                        (self.selected_table_index + 1).min(count - 1)
                    }
                };
            }
            Pane::Grid => {
                match direction {
                    DirectionKey::Up => self.cursor_row = self.cursor_row.saturating_sub(1),
                    DirectionKey::Down => self.cursor_row += 1,
                    DirectionKey::Left => self.cursor_column = self.cursor_column.saturating_sub(1),
                    DirectionKey::Right => self.cursor_column += 1,
                }
                self.clamp_cursor();
            }
        }
    }

    fn clamp_cursor(&mut self) {
        let (rows, columns) = self
            .workspace
            .as_ref()
            .and_then(Workspace::grid)
            .map_or((0, 0), |grid| (grid.result.len(), grid.result.columns.len()));
        self.cursor_row = self.cursor_row.min(rows.saturating_sub(1));
        self.cursor_column = self.cursor_column.min(columns.saturating_sub(1));
    }

    fn pane_name(&self) -> &'static str {
        match self.pane {
            Pane::DatabasePicker => "Open Database",
            Pane::Tables => "Tables",
            Pane::Grid => "Rows",
        }
    }

    fn close(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            workspace.close(&self.runtime);
        }
    }
}

/// Blank input means the configured default; a name without an extension
/// gets `.db`.
fn database_path(raw_path: &str, default: &Path) -> PathBuf {
    let raw_path = raw_path.trim();
    if raw_path.is_empty() {
        return default.to_path_buf();
    }
    let mut path = PathBuf::from(raw_path);
    if path.extension().is_none() {
        path.set_extension(DATABASE_EXTENSION);
    }
    path
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

#[must_use]
pub fn ui_name() -> &'static str {
    "tabula-tui"
}

pub fn run(config: AppConfig) -> Result<(), TuiError> {
    let mut app = TuiApp::new(config)?;
    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app);
    let restore_result = restore_terminal(&mut terminal);
    app.close();

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut TuiApp,
) -> Result<(), TuiError> {
    loop {
        terminal.draw(|frame| render(frame, app))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key, app.is_typing()) {
                        app.handle(message);
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn render(frame: &mut Frame<'_>, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.area());

    frame.render_widget(render_header(app), chunks[0]);

    if app.pane == Pane::DatabasePicker {
        let picker = Paragraph::new(vec![
            Line::from("Open a SQLite database"),
            Line::from("The file is created when it does not exist."),
            Line::from(""),
            Line::from("Enter: open   Esc: open the default database"),
        ])
        .block(Block::default().borders(Borders::ALL).title("Database"))
        .alignment(Alignment::Left);
        frame.render_widget(picker, chunks[1]);
    } else {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(25), Constraint::Percentage(75)])
            .split(chunks[1]);
        render_sidebar(frame, app, body[0]);
        render_grid(frame, app, body[1]);
    }

    let first_line = match &app.prompt {
        Some(prompt) => Line::from(vec![
            Span::styled(
                format!("{}: ", prompt.kind.label()),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw(format!("{}_", prompt.buffer)),
        ]),
        None => Line::from(
            "Enter: open/edit | J: quick join | s/S: sort | v: columns | d: delete | e/p/c/o: export | ?: help",
        ),
    };
    let footer = Paragraph::new(vec![
        first_line,
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title(app.pane_name()));
    frame.render_widget(footer, chunks[2]);

    if let Some(report) = &app.report {
        render_report_popup(frame, report);
    }
    if app.show_help {
        render_help_popup(frame);
    }
}

fn render_header(app: &TuiApp) -> Paragraph<'static> {
    let session = app.workspace.as_ref().map(Workspace::session);
    let database = session.map_or_else(|| "-".to_string(), Session::database_name);
    let table = session
        .and_then(Session::current_table)
        .unwrap_or("-")
        .to_string();
    let joins = session.map_or(0, |session| session.joins().len());
    let sort = session
        .and_then(Session::sort)
        .map_or_else(|| "none".to_string(), |sort| format!("{} {}", sort.column, sort.direction));
    let columns = session.map_or_else(|| "all".to_string(), |session| {
        selection_summary(session.selection())
    });

    Paragraph::new(Line::from(vec![
        Span::styled(
            format!(" DB: {database} "),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("Table: {table}")),
        Span::raw(" | "),
        Span::raw(format!("Joins: {joins}")),
        Span::raw(" | "),
        Span::raw(format!("Sort: {sort}")),
        Span::raw(" | "),
        Span::raw(format!("Columns: {columns}")),
        Span::raw(" | "),
        Span::raw(format!(
            "Images: {} {}px{}",
            on_off(app.export_settings.include_images),
            app.export_settings.thumbnail_size.pixels(),
            if app.export_settings.save_images_as_files {
                " +files"
            } else {
                ""
            }
        )),
    ]))
    .block(Block::default().borders(Borders::ALL).title("tabula"))
}

fn render_sidebar(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let joins = app
        .workspace
        .as_ref()
        .map(|workspace| workspace.session().joins())
        .unwrap_or_default();
    let join_height = u16::try_from(joins.len()).unwrap_or(u16::MAX).saturating_add(2);
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(4), Constraint::Length(join_height.max(3))])
        .split(area);

    let mut lines = Vec::new();
    if !app.table_filter.is_empty() {
        lines.push(Line::from(format!("filter: {}", app.table_filter)));
    }
    let current = app
        .workspace
        .as_ref()
        .and_then(|workspace| workspace.session().current_table());
    for (index, table) in app.visible_tables().into_iter().enumerate() {
        let cursor = if index == app.selected_table_index && app.pane == Pane::Tables {
            ">"
        } else {
            " "
        };
        let mark = if app.join_marks.iter().any(|marked| marked == table) {
            "*"
        } else {
            " "
        };
        let marker = format!("{cursor}{mark}");
        let style = if Some(table) == current {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(format!("{marker} {table}"), style)));
    }
    if lines.is_empty() {
        lines.push(Line::from("No tables (T creates one)"));
    }
    let tables = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Tables"));
    frame.render_widget(tables, parts[0]);

    let join_lines = if joins.is_empty() {
        vec![Line::from("none")]
    } else {
        joins
            .iter()
            .map(|join| Line::from(format!("{} {}", join.kind, join.target_table)))
            .collect()
    };
    let join_list =
        Paragraph::new(join_lines).block(Block::default().borders(Borders::ALL).title("Joins"));
    frame.render_widget(join_list, parts[1]);
}

fn render_grid(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let Some(grid) = app.workspace.as_ref().and_then(Workspace::grid) else {
        let empty = Paragraph::new("Select a table and press Enter")
            .block(Block::default().borders(Borders::ALL).title("Rows"));
        frame.render_widget(empty, area);
        return;
    };

    let visible_columns =
        usize::from(area.width.saturating_sub(2) / (GRID_COLUMN_WIDTH + 1)).max(1);
    let column_start = app.cursor_column.saturating_sub(visible_columns - 1);
    let visible_rows = usize::from(area.height.saturating_sub(4)).max(1);
    let row_start = app.cursor_row.saturating_sub(visible_rows / 2);
    let focused = app.pane == Pane::Grid;

    let header = Row::new(
        grid.result
            .columns
            .iter()
            .skip(column_start)
            .take(visible_columns)
            .map(|column| Cell::from(column.clone())),
    )
    .style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );

    let rows = grid
        .result
        .rows
        .iter()
        .enumerate()
        .skip(row_start)
        .take(visible_rows)
        .map(|(row_index, row)| {
            let cells = row
                .values
                .iter()
                .enumerate()
                .skip(column_start)
                .take(visible_columns)
                .map(|(column_index, value)| {
                    let text = render_cell(value, grid.is_image_column(column_index));
                    let style = if focused
                        && row_index == app.cursor_row
                        && column_index == app.cursor_column
                    {
                        Style::default().add_modifier(Modifier::REVERSED)
                    } else {
                        Style::default()
                    };
                    Cell::from(text).style(style)
                });
            let row_style = if row_index == app.cursor_row {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(cells).style(row_style)
        });

    let widths = vec![Constraint::Length(GRID_COLUMN_WIDTH); visible_columns];
    let title = format!(
        "Rows: {} ({} ms)",
        grid.result.len(),
        grid.result.elapsed.as_millis()
    );
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(table, area);
}

fn render_report_popup(frame: &mut Frame<'_>, report: &str) {
    let area = centered_rect(80, 70, frame.area());
    frame.render_widget(Clear, area);
    let lines = report.lines().map(Line::from).collect::<Vec<_>>();
    let popup = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Report (Esc to close)"),
    );
    frame.render_widget(popup, area);
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 80, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Global keymap"),
        Line::from("q: quit   ?: toggle help   Tab: tables / rows   r: refresh"),
        Line::from("Arrows or hjkl: navigation   /: filter tables"),
        Line::from("Enter: open table (Tables), edit cell or replace image (Rows)"),
        Line::from("Space: mark table for joining   J: quick join marked or highlighted tables"),
        Line::from("a: join with explicit columns"),
        Line::from("x: remove last join   X: remove all joins"),
        Line::from("s: sort by column (again flips)   S: flip direction"),
        Line::from("v: choose columns"),
        Line::from("n: insert row   d d: delete row / drop table"),
        Line::from("T: create table   C: add column   R: rename column"),
        Line::from("e: xlsx   p: pdf   c: csv   o: json   I: import workbook rows"),
        Line::from("t: thumbnail size   m: include images   f: images as files"),
        Line::from("i: inspect database   E: extract photos"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(key: KeyEvent, typing: bool) -> Option<Msg> {
    if typing {
        return match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => Some(Msg::Quit),
            (_, KeyCode::Enter) => Some(Msg::Submit),
            (_, KeyCode::Esc) => Some(Msg::Cancel),
            (_, KeyCode::Backspace) => Some(Msg::Backspace),
            (_, KeyCode::Char(ch)) => Some(Msg::Input(ch)),
            _ => None,
        };
    }

    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q')) => Some(Msg::Quit),
        (_, KeyCode::Char('?')) => Some(Msg::ToggleHelp),
        (_, KeyCode::Tab) => Some(Msg::NextPane),
        (_, KeyCode::Enter) => Some(Msg::Submit),
        (_, KeyCode::Esc) => Some(Msg::Cancel),
        (_, KeyCode::Up | KeyCode::Char('k')) => Some(Msg::Navigate(DirectionKey::Up)),
        (_, KeyCode::Down | KeyCode::Char('j')) => Some(Msg::Navigate(DirectionKey::Down)),
        (_, KeyCode::Left | KeyCode::Char('h')) => Some(Msg::Navigate(DirectionKey::Left)),
        (_, KeyCode::Right | KeyCode::Char('l')) => Some(Msg::Navigate(DirectionKey::Right)),
        (_, KeyCode::Char('/')) => Some(Msg::FilterTables),
        (_, KeyCode::Char('r')) => Some(Msg::Refresh),
        (_, KeyCode::Char('J')) => Some(Msg::QuickJoin),
        (_, KeyCode::Char(' ')) => Some(Msg::ToggleJoinMark),
        (_, KeyCode::Char('a')) => Some(Msg::AddJoin),
        (_, KeyCode::Char('x')) => Some(Msg::RemoveLastJoin),
        (_, KeyCode::Char('X')) => Some(Msg::ClearJoins),
        (_, KeyCode::Char('s')) => Some(Msg::SortByColumn),
        (_, KeyCode::Char('S')) => Some(Msg::ToggleSortDirection),
        (_, KeyCode::Char('v')) => Some(Msg::EditSelection),
        (_, KeyCode::Char('d')) => Some(Msg::Delete),
        (_, KeyCode::Char('n')) => Some(Msg::InsertRow),
        (_, KeyCode::Char('T')) => Some(Msg::CreateTable),
        (_, KeyCode::Char('C')) => Some(Msg::AddColumn),
        (_, KeyCode::Char('R')) => Some(Msg::RenameColumn),
        (_, KeyCode::Char('e')) => Some(Msg::Export(ExportFormat::Xlsx)),
        (_, KeyCode::Char('p')) => Some(Msg::Export(ExportFormat::Pdf)),
        (_, KeyCode::Char('c')) => Some(Msg::Export(ExportFormat::Csv)),
        (_, KeyCode::Char('o')) => Some(Msg::Export(ExportFormat::Json)),
        (_, KeyCode::Char('i')) => Some(Msg::Inspect),
        (_, KeyCode::Char('I')) => Some(Msg::ImportSpreadsheet),
        (_, KeyCode::Char('E')) => Some(Msg::ExtractImages),
        (_, KeyCode::Char('t')) => Some(Msg::CycleThumbnailSize),
        (_, KeyCode::Char('f')) => Some(Msg::ToggleImageFiles),
        (_, KeyCode::Char('m')) => Some(Msg::ToggleIncludeImages),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use tabula_core::config::AppConfig;
    use tabula_core::export::ThumbnailSize;
    use tabula_core::value::CellValue;
    use tempfile::TempDir;

    use std::path::{Path, PathBuf};

    use super::{database_path, map_key_event, DirectionKey, Msg, Pane, PromptKind, TuiApp};
    use crate::workspace::ExportFormat;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(app: &mut TuiApp, text: &str) {
        for ch in text.chars() {
            app.handle(Msg::Input(ch));
        }
    }

    fn clear_prompt(app: &mut TuiApp) {
        if let Some(prompt) = app.prompt.as_mut() {
            prompt.buffer.clear();
        }
    }

    fn run_prompt(app: &mut TuiApp, open: Msg, text: &str) {
        app.handle(open);
        assert!(app.prompt.is_some(), "{open:?} should open a prompt");
        clear_prompt(app);
        type_text(app, text);
        app.handle(Msg::Submit);
    }

    fn app_in(dir: &TempDir) -> TuiApp {
        let config = AppConfig {
            default_database: dir.path().join("my_database.db"),
            ..AppConfig::default()
        };
        TuiApp::new(config).expect("runtime")
    }

    fn opened_app(dir: &TempDir) -> TuiApp {
        let mut app = app_in(dir);
        app.handle(Msg::Submit);
        assert_eq!(app.pane, Pane::Tables, "{}", app.status_line);
        app
    }

    fn cell(app: &TuiApp, row: usize, column: usize) -> Option<CellValue> {
        app.workspace
            .as_ref()
            .and_then(|workspace| workspace.grid())
            .and_then(|grid| grid.result.cell(row, column).cloned())
    }

    #[test]
    fn pane_cycles_between_tables_and_rows() {
        assert_eq!(Pane::Tables.next(), Pane::Grid);
        assert_eq!(Pane::Grid.next(), Pane::Tables);
        assert_eq!(Pane::DatabasePicker.next(), Pane::DatabasePicker);
    }

    #[test]
    fn keymap_supports_required_global_keys() {
        assert_eq!(map_key_event(key(KeyCode::Char('q')), false), Some(Msg::Quit));
        assert_eq!(map_key_event(key(KeyCode::Tab), false), Some(Msg::NextPane));
        assert_eq!(
            map_key_event(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), false),
            Some(Msg::Quit)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('c')), false),
            Some(Msg::Export(ExportFormat::Csv))
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('j')), false),
            Some(Msg::Navigate(DirectionKey::Down))
        );
        assert_eq!(
            map_key_event(KeyEvent::new(KeyCode::Char('J'), KeyModifiers::SHIFT), false),
            Some(Msg::QuickJoin)
        );
        assert_eq!(map_key_event(key(KeyCode::Char(' ')), false), Some(Msg::ToggleJoinMark));
        assert_eq!(
            map_key_event(KeyEvent::new(KeyCode::Char('I'), KeyModifiers::SHIFT), false),
            Some(Msg::ImportSpreadsheet)
        );
    }

    #[test]
    fn typing_turns_letters_into_input() {
        assert_eq!(map_key_event(key(KeyCode::Char('q')), true), Some(Msg::Input('q')));
        assert_eq!(map_key_event(key(KeyCode::Backspace), true), Some(Msg::Backspace));
        assert_eq!(map_key_event(key(KeyCode::Esc), true), Some(Msg::Cancel));
        assert_eq!(map_key_event(key(KeyCode::Tab), true), None);
    }

    #[test]
    fn starts_on_database_prompt_with_default_path() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = app_in(&dir);
        assert_eq!(app.pane, Pane::DatabasePicker);
        let prompt = app.prompt.clone().expect("prompt");
        assert_eq!(prompt.kind, PromptKind::OpenDatabase);
        assert!(prompt.buffer.ends_with("my_database.db"));

        app.handle(Msg::Cancel);
        assert!(!app.should_quit);
        assert_eq!(app.pane, Pane::Tables, "{}", app.status_line);
        assert!(app.workspace.is_some());
        assert!(dir.path().join("my_database.db").exists());
    }

    #[test]
    fn database_names_without_extension_get_db() {
        let default = Path::new("my_database.db");
        assert_eq!(database_path("  ", default), PathBuf::from("my_database.db"));
        assert_eq!(database_path("shop", default), PathBuf::from("shop.db"));
        assert_eq!(database_path("data/shop", default), PathBuf::from("data/shop.db"));
        assert_eq!(database_path("shop.sqlite", default), PathBuf::from("shop.sqlite"));
    }

    #[test]
    fn create_insert_edit_and_delete_through_messages() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = opened_app(&dir);
        assert!(dir.path().join("my_database.db").exists());

        run_prompt(&mut app, Msg::CreateTable, "people id INTEGER, name TEXT");
        assert_eq!(app.visible_tables(), vec!["people"]);

        app.handle(Msg::Submit);
        assert_eq!(app.pane, Pane::Grid);
        run_prompt(&mut app, Msg::InsertRow, "id=1 | name=Ann");
        assert_eq!(cell(&app, 0, 1), Some(CellValue::from("Ann")));

        app.handle(Msg::Navigate(DirectionKey::Right));
        app.handle(Msg::Submit);
        let prompt = app.prompt.clone().expect("edit prompt");
        assert_eq!(prompt.kind, PromptKind::EditCell { row: 0, column: 1 });
        assert_eq!(prompt.buffer, "Ann");
        clear_prompt(&mut app);
        type_text(&mut app, "Bob");
        app.handle(Msg::Submit);
        assert_eq!(cell(&app, 0, 1), Some(CellValue::from("Bob")), "{}", app.status_line);

        app.handle(Msg::Delete);
        assert!(cell(&app, 0, 0).is_some());
        app.handle(Msg::Delete);
        assert!(cell(&app, 0, 0).is_none(), "{}", app.status_line);
    }

    #[test]
    fn delete_needs_two_presses_in_a_row() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = opened_app(&dir);
        run_prompt(&mut app, Msg::CreateTable, "audit event TEXT");

        app.handle(Msg::Delete);
        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::Delete);
        assert_eq!(app.visible_tables(), vec!["audit"]);

        app.handle(Msg::Delete);
        assert!(app.visible_tables().is_empty(), "{}", app.status_line);
    }

    #[test]
    fn quick_join_sort_and_csv_export() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = opened_app(&dir);
        run_prompt(&mut app, Msg::CreateTable, "contacts id INTEGER, email TEXT");
        run_prompt(&mut app, Msg::CreateTable, "people id INTEGER, name TEXT");
        assert_eq!(app.visible_tables(), vec!["contacts", "people"]);

        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::Submit);
        run_prompt(&mut app, Msg::InsertRow, "id=1 | name=Ann");
        run_prompt(&mut app, Msg::InsertRow, "id=2 | name=Bob");

        app.handle(Msg::NextPane);
        app.handle(Msg::Navigate(DirectionKey::Up));
        app.handle(Msg::QuickJoin);
        assert_eq!(app.status_line, "Joined `contacts` on `id`");

        app.handle(Msg::NextPane);
        app.handle(Msg::Navigate(DirectionKey::Right));
        app.handle(Msg::SortByColumn);
        app.handle(Msg::SortByColumn);
        let sort = app
            .workspace
            .as_ref()
            .and_then(|workspace| workspace.session().sort().cloned())
            .expect("sort");
        assert_eq!(sort.column, "name");
        assert_eq!(sort.direction.to_string(), "DESC");

        let destination = dir.path().join("people.csv");
        run_prompt(
            &mut app,
            Msg::Export(ExportFormat::Csv),
            &destination.display().to_string(),
        );
        let written = std::fs::read_to_string(&destination).expect("csv");
        assert!(written.starts_with("id,name,email\n"), "{written}");

        app.handle(Msg::ClearJoins);
        assert!(app
            .workspace
            .as_ref()
            .is_some_and(|workspace| workspace.session().joins().is_empty()));
    }

    #[test]
    fn inspection_report_opens_and_closes() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = opened_app(&dir);
        run_prompt(&mut app, Msg::CreateTable, "notes body TEXT");

        app.handle(Msg::Inspect);
        let report = app.report.clone().expect("report");
        assert!(report.contains("notes"), "{report}");
        app.handle(Msg::Cancel);
        assert!(app.report.is_none());
    }

    #[test]
    fn export_settings_toggle_from_keys() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = app_in(&dir);
        app.handle(Msg::CycleThumbnailSize);
        assert_eq!(app.export_settings.thumbnail_size, ThumbnailSize::Large);
        app.handle(Msg::ToggleImageFiles);
        assert!(app.export_settings.save_images_as_files);
        app.handle(Msg::ToggleIncludeImages);
        assert!(!app.export_settings.include_images);
    }

    #[test]
    fn actions_without_a_table_report_instead_of_failing() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = opened_app(&dir);
        app.handle(Msg::InsertRow);
        assert!(app.prompt.is_none());
        assert_eq!(app.status_line, "Select a table first");
        app.handle(Msg::Export(ExportFormat::Pdf));
        assert!(app.prompt.is_none());
    }

    #[test]
    fn text_cells_with_image_like_names_edit_as_text() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = opened_app(&dir);
        run_prompt(&mut app, Msg::CreateTable, "notes id INTEGER, topic TEXT, photo BLOB");
        app.handle(Msg::Submit);
        run_prompt(&mut app, Msg::InsertRow, "id=1 | topic=rust");

        app.handle(Msg::Navigate(DirectionKey::Right));
        app.handle(Msg::Submit);
        let prompt = app.prompt.clone().expect("edit prompt");
        assert_eq!(prompt.kind, PromptKind::EditCell { row: 0, column: 1 });
        clear_prompt(&mut app);
        type_text(&mut app, "go");
        app.handle(Msg::Submit);
        assert_eq!(cell(&app, 0, 1), Some(CellValue::from("go")), "{}", app.status_line);

        app.handle(Msg::Navigate(DirectionKey::Right));
        app.handle(Msg::Submit);
        let prompt = app.prompt.clone().expect("image prompt");
        assert_eq!(prompt.kind, PromptKind::ReplaceImage { row: 0, column: 2 });
    }

    #[test]
    fn marked_tables_join_as_one_batch() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = opened_app(&dir);
        run_prompt(&mut app, Msg::CreateTable, "audit event TEXT");
        run_prompt(&mut app, Msg::CreateTable, "contacts id INTEGER, email TEXT");
        run_prompt(&mut app, Msg::CreateTable, "people id INTEGER, name TEXT");

        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::Submit);
        app.handle(Msg::NextPane);
        app.handle(Msg::Navigate(DirectionKey::Up));
        app.handle(Msg::ToggleJoinMark);
        app.handle(Msg::Navigate(DirectionKey::Up));
        app.handle(Msg::ToggleJoinMark);
        assert_eq!(app.join_marks, vec!["contacts", "audit"]);

        app.handle(Msg::QuickJoin);
        assert!(
            app.status_line.starts_with("Joined `contacts` on `id`; Skipped `audit`"),
            "{}",
            app.status_line
        );
        assert!(app.join_marks.is_empty());
        let joins = app
            .workspace
            .as_ref()
            .map(|workspace| workspace.session().joins())
            .unwrap_or_default();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].target_table, "contacts");
    }

    #[test]
    fn workbook_rows_import_into_current_table() {
        let dir = TempDir::new().expect("temp dir");
        let mut app = opened_app(&dir);
        run_prompt(&mut app, Msg::CreateTable, "people id INTEGER, name TEXT");
        app.handle(Msg::Submit);

        let source = dir.path().join("people.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "id").expect("header");
        sheet.write_string(0, 1, "name").expect("header");
        sheet.write_number(1, 0, 1).expect("cell");
        sheet.write_string(1, 1, "Ann").expect("cell");
        workbook.save(&source).expect("save workbook");

        run_prompt(&mut app, Msg::ImportSpreadsheet, &source.display().to_string());
        assert!(app.status_line.starts_with("Imported 1 rows"), "{}", app.status_line);
        assert_eq!(cell(&app, 0, 1), Some(CellValue::from("Ann")));
    }
}
