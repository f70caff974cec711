use std::io::Error;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

use crate::loader::LoadOptions;

// Column names as they appear in the inquiry spreadsheets.
pub const ORDER_STATUS: &str = "受注の有無";
pub const INDUSTRY_MAJOR: &str = "業種大分類";
pub const INDUSTRY_MINOR: &str = "業種中分類";
pub const MACHINE_TYPE: &str = "脱水機種別";
pub const SOLIDS_RECOVERY: &str = "固形物回収率 %";
pub const CAKE_MOISTURE: &str = "脱水ケーキ含水率 %";

pub const MEASUREMENT_COLUMNS: [&str; 2] = [SOLIDS_RECOVERY, CAKE_MOISTURE];
pub const FILTER_COLUMNS: [&str; 4] = [ORDER_STATUS, INDUSTRY_MAJOR, INDUSTRY_MINOR, MACHINE_TYPE];
pub const CHART_COLUMNS: [&str; 3] = [INDUSTRY_MAJOR, INDUSTRY_MINOR, ORDER_STATUS];

/// Machine types the count chart splits by. Rows with any other machine type are left out of
/// the split chart only.
pub const ALLOWED_MACHINE_TYPES: [&str; 2] = ["多重円板型脱水機", "多重板型スクリュープレス脱水機"];

/// Display text for a missing grouping label.
pub const MISSING_LABEL: &str = "不明/欠損値";

pub const HELP_TEXT: &str = "\
 q            quit
 Tab          switch focus between filters and views
 1..4         counts / box plot major / box plot minor / data
 ↑↓ ←→ hjkl   move
 Space        toggle filter value
 c            clear all filters
 g            cycle chart grouping
 v            cycle value column of the box plot
 o            toggle outliers
 z            toggle zero values
 y            copy statistics (or current row) to clipboard
 e            open another file
 ?            this help
 Esc          close popup / cancel input";

#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("io error: {0}")]
    IoError(#[from] Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("spreadsheet error: {0}")]
    SpreadsheetError(#[from] calamine::Error),
    #[error("loading failed: {0}")]
    LoadingFailed(String),
    #[error("file not found")]
    FileNotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("unknown file type {0:?}")]
    UnknownFileType(String),
    #[error("could not decode file with any of [{}]", .tried.join(", "))]
    Undecodable { tried: Vec<String> },
    #[error("unknown text encoding {0:?}")]
    UnknownEncoding(String),
    #[error("clipboard: {0}")]
    Clipboard(String),
}

/// Non fatal conditions. Every one of them is shown to the user and the affected feature is
/// skipped, the rest of the view still renders.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Warning {
    #[error("column '{column}' does not exist, {feature} skipped")]
    MissingColumn { column: String, feature: String },
    #[error("no rows left for {context}")]
    EmptyResult { context: String },
    #[error("column '{column}' is not {expected}")]
    TypeMismatch { column: String, expected: String },
    #[error("not enough categories or values in ('{group}', '{value}') for a box plot")]
    InsufficientVariation { group: String, value: String },
}

impl Warning {
    pub fn missing_column(column: &str, feature: &str) -> Self {
        Warning::MissingColumn {
            column: column.to_string(),
            feature: feature.to_string(),
        }
    }

    pub fn empty_result(context: impl Into<String>) -> Self {
        Warning::EmptyResult {
            context: context.into(),
        }
    }

    pub fn type_mismatch(column: &str, expected: &str) -> Self {
        Warning::TypeMismatch {
            column: column.to_string(),
            expected: expected.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    SwitchFocus,
    ShowView(usize),
    ToggleSelection,
    ClearSelections,
    CycleGrouping,
    CycleValueColumn,
    ToggleOutliers,
    ToggleZeros,
    Copy,
    OpenFile,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct ExplorerConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub status_message_timeout: u64,
    pub load_options: LoadOptions,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            max_column_width: 24,
            status_message_timeout: 5,
            load_options: LoadOptions::default(),
        }
    }
}
