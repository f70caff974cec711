use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod domain;
mod filter;
mod inputter;
mod loader;
mod model;
mod policy;
mod report;
mod session;
mod summary;
mod table;
mod ui;

use controller::Controller;
use domain::{CHART_COLUMNS, ExplorerConfig, ExplorerError};
use loader::{LoadOptions, parse_flag};
use model::{Model, Status};
use policy::{CleaningPolicy, ZeroScope, parse_number};
use session::Session;
use table::{ColumnKind, Label, format_flag, format_number};
use ui::ExplorerUI;

const LOG_ENV: &str = "INQUIRY_LOG";
const LOG_FILE_NAME: &str = "inquiry-explorer.log";

/// Explore dewatering inquiry records: filter them, count them and compare measurements.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// File to open (csv, tsv, xlsx, xls, ods, parquet, arrow). `~` and `$VAR` are expanded.
    path: Option<String>,

    /// Print the summaries as plain text instead of starting the terminal ui
    #[arg(long, requires = "path")]
    report: bool,

    /// Only keep rows where COLUMN equals VALUE. Repeat to allow more values or columns.
    #[arg(long = "filter", value_name = "COLUMN=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// Grouping column of the count chart
    #[arg(long, value_name = "COLUMN")]
    group: Option<String>,

    /// Numeric column shown in both box plots
    #[arg(long, value_name = "COLUMN")]
    value: Option<String>,

    /// Leave zero values out of the box plots and statistics
    #[arg(long)]
    exclude_zero: bool,

    /// Columns where a literal zero counts as a missing value
    #[arg(long, value_enum, default_value_t = ZeroScope::Measurements)]
    zero_as_missing: ZeroScope,

    /// Text encodings tried in order on csv/tsv files [default: utf-8, shift_jis, euc-jp]
    #[arg(long = "encoding", value_name = "LABEL")]
    encodings: Vec<String>,

    /// Log file [default: inquiry-explorer.log in the temp dir]
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected COLUMN=VALUE, got {s:?}")),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = setup_logging(args.log_file.clone()) {
        eprintln!("Error: could not set up logging: {e}");
        return ExitCode::FAILURE;
    }

    let result = if args.report {
        run_report(&args)
    } else {
        let result = run_tui(&args);
        ratatui::restore();
        result
    };

    match result {
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn setup_logging(log_file: Option<PathBuf>) -> Result<(), ExplorerError> {
    let path = log_file.unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE_NAME));
    let file = File::create(&path)?;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .with(ErrorLayer::default())
        .init();
    info!("Logging to {}", path.display());
    Ok(())
}

fn build_config(args: &Args) -> Result<ExplorerConfig, ExplorerError> {
    let mut load_options =
        LoadOptions::default().with_policy(CleaningPolicy::new(args.zero_as_missing));
    if !args.encodings.is_empty() {
        load_options = load_options.with_encodings(LoadOptions::encodings_from_labels(&args.encodings)?);
    }
    Ok(ExplorerConfig::default().with_load_options(load_options))
}

fn expand_path(path: &str) -> Result<PathBuf, ExplorerError> {
    let expanded =
        shellexpand::full(path).map_err(|e| ExplorerError::LoadingFailed(e.to_string()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// Applies the view arguments to a loaded session. Returns notices for arguments that could
/// not be applied.
fn apply_view_args(session: &mut Session, args: &Args) -> Vec<String> {
    let mut notices = Vec::new();

    let mut selections: BTreeMap<&str, Vec<Label>> = BTreeMap::new();
    for (column, value) in args.filters.iter() {
        let options = match session.filter_options(column) {
            Ok(options) => options,
            Err(w) => {
                notices.push(format!("filter {column}={value} ignored: {w}"));
                continue;
            }
        };
        let label = filter_label(session, column, value);
        if !options.contains(&label) {
            notices.push(format!("{value:?} does not occur in column {column:?}"));
        }
        selections.entry(column.as_str()).or_default().push(label);
    }
    for (column, labels) in selections {
        session.set_selection(column, labels);
    }

    if let Some(group) = &args.group {
        match CHART_COLUMNS.iter().find(|c| **c == group.as_str()) {
            Some(column) => session.set_chart_group(*column),
            None => notices.push(format!(
                "cannot group the chart by {group:?}, use one of {}",
                CHART_COLUMNS.join(", ")
            )),
        }
    }
    for panel in 0..2 {
        if let Some(value) = &args.value {
            session.set_value_column(panel, value);
        }
        if args.exclude_zero && session.options().panels[panel].include_zero {
            session.toggle_zeros(panel);
        }
    }
    for notice in notices.iter() {
        warn!("{notice}");
    }
    notices
}

/// Spells a filter value the way the column renders it, so `true` matches `True` and `95.0`
/// matches `95`.
fn filter_label(session: &Session, column: &str, value: &str) -> Label {
    let normalized = match session.raw().column(column).map(|c| c.kind()) {
        Some(ColumnKind::Flag) => parse_flag(value).map(|b| format_flag(b).to_string()),
        Some(ColumnKind::Number) => parse_number(value).map(format_number),
        _ => None,
    };
    Label::value(normalized.unwrap_or_else(|| value.to_string()))
}

fn run_report(args: &Args) -> Result<(), ExplorerError> {
    let config = build_config(args)?;
    let path = args
        .path
        .as_deref()
        .ok_or_else(|| ExplorerError::LoadingFailed(String::from("no file given")))?;
    let mut session = Session::new();
    session.open(expand_path(path)?, &config.load_options)?;
    for notice in apply_view_args(&mut session, args) {
        eprintln!("Warning: {notice}");
    }
    print!("{}", report::render_report(&session));
    Ok(())
}

fn run_tui(args: &Args) -> Result<(), ExplorerError> {
    let config = build_config(args)?;
    let path = args.path.as_deref().map(expand_path).transpose()?;

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(&config, path, size.width as usize, size.height as usize)?;
    model.configure(|session| {
        apply_view_args(session, args);
    });

    let ui = ExplorerUI::new(&config);
    let controller = Controller::new(&config);

    while model.status != Status::Quitting {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }
    info!("Bye");
    Ok(())
}
