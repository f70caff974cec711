use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

use crate::domain::{ExplorerConfig, ExplorerError, FILTER_COLUMNS, HELP_TEXT, Message};
use crate::inputter::{InputResult, Inputter};
use crate::report::{counts_to_csv, csv_line, stats_to_csv};
use crate::session::Session;
use crate::table::Label;
use crate::ui::VIEW_CHROME_HEIGHT;

#[derive(Debug, PartialEq)]
pub enum Status {
    Ready,
    Quitting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    Main,
    Popup,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Focus {
    Filters,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewTab {
    Counts,
    BoxMajor,
    BoxMinor,
    Data,
}

impl ViewTab {
    pub const ALL: [ViewTab; 4] = [ViewTab::Counts, ViewTab::BoxMajor, ViewTab::BoxMinor, ViewTab::Data];

    pub fn index(self) -> usize {
        match self {
            ViewTab::Counts => 0,
            ViewTab::BoxMajor => 1,
            ViewTab::BoxMinor => 2,
            ViewTab::Data => 3,
        }
    }

    /// Box plot panel shown by this tab.
    pub fn panel(self) -> Option<usize> {
        match self {
            ViewTab::BoxMajor => Some(0),
            ViewTab::BoxMinor => Some(1),
            _ => None,
        }
    }
}

/// One line of the filter pane.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEntry {
    Header(&'static str),
    Choice { column: &'static str, label: Label },
    Notice(String),
}

pub struct Model {
    config: ExplorerConfig,
    session: Session,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    focus: Focus,
    tab: ViewTab,
    filter_entries: Vec<FilterEntry>,
    filter_cursor: usize,
    data_row: usize,
    data_offset_row: usize,
    data_column: usize,
    view_scroll: usize,
    clipboard: Option<Clipboard>,
    input: Inputter,
    last_input: InputResult,
    popup_message: Option<String>,
    status_message: String,
    last_status_message_update: Instant,
    width: usize,
    height: usize,
}

impl Model {
    pub fn init(
        config: &ExplorerConfig,
        path: Option<PathBuf>,
        ui_width: usize,
        ui_height: usize,
    ) -> Result<Self, ExplorerError> {
        let mut model = Self {
            config: config.clone(),
            session: Session::new(),
            status: Status::Ready,
            modus: Modus::Main,
            previous_modus: Modus::Main,
            focus: Focus::Filters,
            tab: ViewTab::Counts,
            filter_entries: Vec::new(),
            filter_cursor: 0,
            data_row: 0,
            data_offset_row: 0,
            data_column: 0,
            view_scroll: 0,
            clipboard: None,
            input: Inputter::default(),
            last_input: InputResult::default(),
            popup_message: None,
            status_message: String::new(),
            last_status_message_update: Instant::now(),
            width: ui_width,
            height: ui_height,
        };
        match path {
            Some(path) => model.open(path),
            None => {
                model.rebuild_filter_entries();
                model.set_status_message("No file loaded, press 'e' to open one");
            }
        }
        Ok(model)
    }

    // -------------------- Accessors for the ui ---------------------- //

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn tab(&self) -> ViewTab {
        self.tab
    }

    pub fn filter_entries(&self) -> &[FilterEntry] {
        &self.filter_entries
    }

    pub fn filter_cursor(&self) -> usize {
        self.filter_cursor
    }

    /// Selected data row, its first visible row and the first visible column.
    pub fn data_position(&self) -> (usize, usize, usize) {
        (self.data_row, self.data_offset_row, self.data_column)
    }

    pub fn view_scroll(&self) -> usize {
        self.view_scroll
    }

    pub fn popup(&self) -> Option<&str> {
        self.popup_message.as_deref()
    }

    /// The open file prompt while it is active.
    pub fn prompt(&self) -> Option<&InputResult> {
        (self.modus == Modus::Input).then_some(&self.last_input)
    }

    /// Applies startup options to the loaded session.
    pub fn configure(&mut self, apply: impl FnOnce(&mut Session)) {
        apply(&mut self.session);
        self.clamp_data_view();
    }

    pub fn raw_keyevents(&self) -> bool {
        self.modus == Modus::Input
    }

    /// Latest message while it is fresh, otherwise the first warning or the key hint.
    pub fn status_line(&self) -> String {
        let timeout = Duration::from_secs(self.config.status_message_timeout);
        if !self.status_message.is_empty() && self.last_status_message_update.elapsed() < timeout {
            return self.status_message.clone();
        }
        match self.session.warnings() {
            [] => String::from("? help  q quit"),
            [w] => format!("⚠ {w}"),
            [w, rest @ ..] => format!("⚠ {w} (+{} more)", rest.len()),
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.last_status_message_update = Instant::now();
    }

    // -------------------- Message handling ---------------------- //

    pub fn quit(&mut self) {
        self.status = Status::Quitting;
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), ExplorerError> {
        if let Some(msg) = message {
            match self.modus {
                Modus::Main => match msg {
                    Message::Quit => self.quit(),
                    Message::MoveUp => self.move_vertical(-1),
                    Message::MoveDown => self.move_vertical(1),
                    Message::MovePageUp => self.move_vertical(-(self.page_size() as isize)),
                    Message::MovePageDown => self.move_vertical(self.page_size() as isize),
                    Message::MoveLeft => self.move_horizontal(false),
                    Message::MoveRight => self.move_horizontal(true),
                    Message::SwitchFocus => self.switch_focus(),
                    Message::ShowView(idx) => self.show_view(idx),
                    Message::ToggleSelection => self.toggle_current_selection(),
                    Message::ClearSelections => self.clear_selections(),
                    Message::CycleGrouping => self.cycle_grouping(),
                    Message::CycleValueColumn => self.with_panel(Session::cycle_value_column),
                    Message::ToggleOutliers => self.with_panel(Session::toggle_outliers),
                    Message::ToggleZeros => self.with_panel(Session::toggle_zeros),
                    Message::Copy => self.copy(),
                    Message::OpenFile => self.enter_input_mode(),
                    Message::Help => self.show_help(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit | Message::RawKey(_) => (),
                },
                Modus::Popup => match msg {
                    Message::Quit => self.quit(),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    Message::Exit | Message::Help => self.exit_popup(),
                    _ => (),
                },
                Modus::Input => match msg {
                    Message::RawKey(key) => self.raw_input(key),
                    Message::Resize(width, height) => self.ui_resize(width, height),
                    _ => (),
                },
            }
        }
        Ok(())
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!("UI was resized! w:{}->{}, h:{}->{}", self.width, width, self.height, height);
        self.width = width;
        self.height = height;
        self.clamp_data_view();
    }

    /// Rows of the data table that fit on screen.
    fn page_size(&self) -> usize {
        self.height.saturating_sub(VIEW_CHROME_HEIGHT).max(1)
    }

    fn switch_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Filters => Focus::View,
            Focus::View => Focus::Filters,
        };
    }

    fn show_view(&mut self, idx: usize) {
        if let Some(tab) = ViewTab::ALL.get(idx) {
            self.tab = *tab;
            self.view_scroll = 0;
            self.focus = Focus::View;
        }
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::Popup;
        self.popup_message = Some(HELP_TEXT.to_string());
    }

    fn exit_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = self.previous_modus;
        self.previous_modus = Modus::Popup;
        self.popup_message = None;
    }

    // -------------------- Filters ---------------------- //

    fn rebuild_filter_entries(&mut self) {
        let mut entries = Vec::new();
        for column in FILTER_COLUMNS {
            entries.push(FilterEntry::Header(column));
            match self.session.filter_options(column) {
                Ok(options) if options.is_empty() => {
                    entries.push(FilterEntry::Notice(String::from("(no values)")))
                }
                Ok(options) => entries.extend(
                    options
                        .into_iter()
                        .map(|label| FilterEntry::Choice { column, label }),
                ),
                Err(w) => entries.push(FilterEntry::Notice(w.to_string())),
            }
        }
        self.filter_entries = entries;
        self.filter_cursor = self.next_choice(0, 1).unwrap_or(0);
    }

    fn is_choice(&self, idx: usize) -> bool {
        matches!(self.filter_entries.get(idx), Some(FilterEntry::Choice { .. }))
    }

    /// First choice at or after `from` walking in direction `step`.
    fn next_choice(&self, from: usize, step: isize) -> Option<usize> {
        let mut idx = from as isize;
        while idx >= 0 && (idx as usize) < self.filter_entries.len() {
            if self.is_choice(idx as usize) {
                return Some(idx as usize);
            }
            idx += step;
        }
        None
    }

    fn move_filter_cursor(&mut self, delta: isize) {
        let step = delta.signum();
        let mut cursor = self.filter_cursor;
        for _ in 0..delta.unsigned_abs() {
            let next = (cursor as isize + step).max(0) as usize;
            match self.next_choice(next, step) {
                Some(idx) if idx != cursor => cursor = idx,
                _ => break,
            }
        }
        self.filter_cursor = cursor;
    }

    /// Moves the cursor to the first choice of the previous or next filter column.
    fn jump_filter_column(&mut self, forward: bool) {
        let headers: Vec<usize> = self
            .filter_entries
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, FilterEntry::Header(_)))
            .map(|(idx, _)| idx)
            .collect();
        let current = headers
            .iter()
            .rposition(|h| *h <= self.filter_cursor)
            .unwrap_or(0);
        let candidates: Vec<usize> = if forward {
            headers.iter().skip(current + 1).copied().collect()
        } else {
            headers.iter().take(current).rev().copied().collect()
        };
        for header in candidates {
            let end = headers
                .iter()
                .find(|h| **h > header)
                .copied()
                .unwrap_or(self.filter_entries.len());
            if let Some(idx) = (header..end).find(|idx| self.is_choice(*idx)) {
                self.filter_cursor = idx;
                return;
            }
        }
    }

    fn toggle_current_selection(&mut self) {
        if self.focus != Focus::Filters {
            return;
        }
        if let Some(FilterEntry::Choice { column, label }) =
            self.filter_entries.get(self.filter_cursor).cloned()
        {
            self.session.toggle_selection(column, label);
            self.after_refresh();
        }
    }

    fn clear_selections(&mut self) {
        if self.session.selections().is_empty() {
            self.set_status_message("No filters set");
            return;
        }
        self.session.clear_selections();
        self.after_refresh();
        self.set_status_message("Filters cleared");
    }

    fn after_refresh(&mut self) {
        self.clamp_data_view();
        self.view_scroll = 0;
        self.set_status_message(format!(
            "{} of {} rows",
            self.session.filtered().height(),
            self.session.raw().height()
        ));
    }

    // -------------------- View options ---------------------- //

    fn cycle_grouping(&mut self) {
        self.session.cycle_chart_group();
        match self.session.options().chart_group {
            Some(group) => self.set_status_message(format!("Chart grouped by {group}")),
            None => self.set_status_message("No column to group the chart by"),
        }
    }

    fn with_panel(&mut self, action: fn(&mut Session, usize)) {
        match self.tab.panel() {
            Some(panel) => {
                action(&mut self.session, panel);
                self.view_scroll = 0;
                let p = &self.session.options().panels[panel];
                let value = p.value_column.as_deref().unwrap_or("-");
                let message = format!(
                    "{value} by {}, outliers {}, zeros {}",
                    p.group_column,
                    if p.show_outliers { "shown" } else { "hidden" },
                    if p.include_zero { "included" } else { "excluded" },
                );
                self.set_status_message(message);
            }
            None => self.set_status_message("Switch to a box plot tab (2 or 3) first"),
        }
    }

    // -------------------- Movement ---------------------- //

    fn move_vertical(&mut self, delta: isize) {
        match (self.focus, self.tab) {
            (Focus::Filters, _) => self.move_filter_cursor(delta),
            (Focus::View, ViewTab::Data) => {
                let height = self.session.filtered().height();
                if height == 0 {
                    return;
                }
                let row = (self.data_row as isize + delta).clamp(0, height as isize - 1);
                self.data_row = row as usize;
                self.clamp_data_view();
            }
            (Focus::View, _) => {
                self.view_scroll = (self.view_scroll as isize + delta).max(0) as usize;
            }
        }
    }

    fn move_horizontal(&mut self, forward: bool) {
        match (self.focus, self.tab) {
            (Focus::Filters, _) => self.jump_filter_column(forward),
            (Focus::View, ViewTab::Data) => {
                let width = self.session.filtered().width();
                if forward && self.data_column + 1 < width {
                    self.data_column += 1;
                } else if !forward {
                    self.data_column = self.data_column.saturating_sub(1);
                }
            }
            (Focus::View, _) => (),
        }
    }

    /// Keeps the selected data row inside the table and inside the visible window.
    fn clamp_data_view(&mut self) {
        let height = self.session.filtered().height();
        self.data_row = self.data_row.min(height.saturating_sub(1));
        let page = self.page_size();
        if self.data_row < self.data_offset_row {
            self.data_offset_row = self.data_row;
        } else if self.data_row >= self.data_offset_row + page {
            self.data_offset_row = self.data_row + 1 - page;
        }
        self.data_offset_row = self.data_offset_row.min(height.saturating_sub(1));
        self.data_column = self
            .data_column
            .min(self.session.filtered().width().saturating_sub(1));
    }

    // -------------------- Clipboard ---------------------- //

    /// Text the copy key puts on the clipboard for the current tab.
    pub fn copy_text(&self) -> Option<String> {
        match self.tab {
            ViewTab::Counts => self.session.counts().and_then(counts_to_csv),
            ViewTab::BoxMajor | ViewTab::BoxMinor => self
                .tab
                .panel()
                .and_then(|p| self.session.box_view(p))
                .and_then(|v| v.stats.as_ref().ok())
                .map(stats_to_csv),
            ViewTab::Data => {
                let table = self.session.filtered();
                let ridx = *table.rows().get(self.data_row)?;
                let cells: Vec<String> = table
                    .columns()
                    .iter()
                    .map(|c| match c.label(ridx) {
                        Label::Value(s) => s,
                        Label::Missing => String::new(),
                    })
                    .collect();
                Some(csv_line(&cells))
            }
        }
    }

    fn clipboard(&mut self) -> Result<&mut Clipboard, ExplorerError> {
        if self.clipboard.is_none() {
            let clipboard = Clipboard::new().map_err(|e| ExplorerError::Clipboard(e.to_string()))?;
            self.clipboard = Some(clipboard);
        }
        self.clipboard
            .as_mut()
            .ok_or_else(|| ExplorerError::Clipboard(String::from("not available")))
    }

    fn copy(&mut self) {
        let Some(text) = self.copy_text() else {
            self.set_status_message("Nothing to copy");
            return;
        };
        let lines = text.lines().count();
        let result = self
            .clipboard()
            .and_then(|c| c.set_text(text).map_err(|e| ExplorerError::Clipboard(e.to_string())));
        match result {
            Ok(_) => {
                trace!("Copied {lines} lines to clipboard.");
                self.set_status_message(format!("Copied {lines} lines as CSV"));
            }
            Err(e) => {
                error!("Error copying to clipboard: {e}");
                self.set_status_message(e.to_string());
            }
        }
    }

    // -------------------- Loading ---------------------- //

    fn open(&mut self, path: PathBuf) {
        let start = Instant::now();
        match self.session.open(path.clone(), &self.config.load_options) {
            Ok(()) => {
                let duration = start.elapsed().as_millis();
                info!("Loading {} took {duration}ms", path.display());
                self.rebuild_filter_entries();
                self.data_row = 0;
                self.data_offset_row = 0;
                self.data_column = 0;
                self.view_scroll = 0;
                let encoding = self
                    .session
                    .source()
                    .and_then(|s| s.encoding)
                    .map(|e| format!(" ({})", e.name()))
                    .unwrap_or_default();
                self.set_status_message(format!(
                    "Loaded {} rows{encoding} in {duration}ms",
                    self.session.raw().height()
                ));
            }
            Err(e) => {
                error!("Failed to open {}: {e}", path.display());
                self.set_status_message(format!("Could not open {}: {e}", path.display()));
            }
        }
    }

    fn enter_input_mode(&mut self) {
        trace!("Entering input mode ...");
        self.previous_modus = self.modus;
        self.modus = Modus::Input;
        self.input.clear();
        if let Some(source) = self.session.source() {
            self.input.set(&source.path.to_string_lossy());
        }
        self.last_input = self.input.get();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.handle_input();
        }
    }

    fn handle_input(&mut self) {
        self.modus = self.previous_modus;
        self.previous_modus = Modus::Input;
        let input = self.last_input.input.trim().to_string();
        debug!("Handle open file input {input:?}");
        if self.last_input.canceled || input.is_empty() {
            self.set_status_message("Canceled");
            return;
        }
        match shellexpand::full(&input) {
            Ok(expanded) => self.open(PathBuf::from(expanded.as_ref())),
            Err(e) => self.set_status_message(format!("Invalid path {input:?}: {e}")),
        }
    }
}
