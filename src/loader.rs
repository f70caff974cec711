use std::fs;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Instant;

use calamine::{Data, Range, Reader, open_workbook_auto};
use derive_setters::Setters;
use encoding_rs::{EUC_JP, Encoding, SHIFT_JIS, UTF_8};
use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{
    CAKE_MOISTURE, ExplorerError, INDUSTRY_MAJOR, INDUSTRY_MINOR, MACHINE_TYPE, ORDER_STATUS,
    SOLIDS_RECOVERY, Warning,
};
use crate::policy::{CleaningPolicy, parse_number};
use crate::table::{Column, ColumnData, ColumnKind, Table, format_flag, format_number};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileType {
    Csv,
    Tsv,
    Spreadsheet,
    Parquet,
    Arrow,
}

#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub file_type: FileType,
    /// Text encoding that decoded the file, delimited text only.
    pub encoding: Option<&'static Encoding>,
}

impl SourceInfo {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("???")
            .to_string()
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct LoadOptions {
    pub policy: CleaningPolicy,
    /// Tried in order on delimited text until one decodes without error.
    pub encodings: Vec<&'static Encoding>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            policy: CleaningPolicy::default(),
            encodings: vec![UTF_8, SHIFT_JIS, EUC_JP],
        }
    }
}

impl LoadOptions {
    pub fn encodings_from_labels(labels: &[String]) -> Result<Vec<&'static Encoding>, ExplorerError> {
        labels
            .iter()
            .map(|label| {
                Encoding::for_label(label.trim().as_bytes())
                    .ok_or_else(|| ExplorerError::UnknownEncoding(label.clone()))
            })
            .collect()
    }
}

/// A column straight out of a reader, before cleaning and typing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub cells: Vec<Option<String>>,
}

#[derive(Debug)]
pub struct Loaded {
    pub table: Table,
    pub source: SourceInfo,
    pub warnings: Vec<Warning>,
}

pub fn load_and_clean(path: PathBuf, options: &LoadOptions) -> Result<Loaded, ExplorerError> {
    let start_time = Instant::now();
    let mut source = get_file_info(path)?;
    info!("Loading {:?} ({} bytes) as {:?}", source.path, source.file_size, source.file_type);

    let raw = match source.file_type {
        FileType::Csv | FileType::Tsv => {
            let bytes = fs::read(&source.path)?;
            let (text, encoding) = decode_text(&bytes, &options.encodings)?;
            source.encoding = Some(encoding);
            let separator = if source.file_type == FileType::Tsv { b'\t' } else { b',' };
            read_delimited(text, separator)?
        }
        FileType::Spreadsheet => read_spreadsheet(&source.path)?,
        FileType::Parquet => frame_to_raw(&load_parquet(&source.path)?.collect()?)?,
        FileType::Arrow => frame_to_raw(&load_arrow(&source.path)?.collect()?)?,
    };

    let (table, warnings) = clean_table(source.file_name(), raw, &options.policy);
    info!(
        "Loaded {} rows x {} columns in {}ms",
        table.height(),
        table.width(),
        start_time.elapsed().as_millis()
    );
    for w in warnings.iter() {
        warn!("{w}");
    }
    Ok(Loaded {
        table,
        source,
        warnings,
    })
}

fn get_file_info(path: PathBuf) -> Result<SourceInfo, ExplorerError> {
    let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ExplorerError::FileNotFound,
        ErrorKind::PermissionDenied => ExplorerError::PermissionDenied,
        _ => ExplorerError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(ExplorerError::LoadingFailed("Not a file!".into()));
    }

    let file_type = detect_file_type(&path)?;
    Ok(SourceInfo {
        path,
        file_size: metadata.len(),
        file_type,
        encoding: None,
    })
}

fn detect_file_type(path: &Path) -> Result<FileType, ExplorerError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase());
    match extension.as_deref() {
        Some("CSV") | Some("TXT") => Ok(FileType::Csv),
        Some("TSV") => Ok(FileType::Tsv),
        Some("XLSX") | Some("XLSM") | Some("XLS") | Some("ODS") => Ok(FileType::Spreadsheet),
        Some("PARQUET") | Some("PQ") => Ok(FileType::Parquet),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::Arrow),
        other => Err(ExplorerError::UnknownFileType(
            other.unwrap_or_default().to_lowercase(),
        )),
    }
}

/// Decodes with the first encoding that accepts the whole input without replacement
/// characters. A byte order mark wins over the list.
pub fn decode_text(
    bytes: &[u8],
    encodings: &[&'static Encoding],
) -> Result<(String, &'static Encoding), ExplorerError> {
    if let Some((encoding, bom_length)) = Encoding::for_bom(bytes)
        && let Some(text) =
            encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_length..])
    {
        debug!("Decoded by byte order mark as {}", encoding.name());
        return Ok((text.into_owned(), encoding));
    }

    for &encoding in encodings {
        match encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            Some(text) => {
                debug!("Decoded as {}", encoding.name());
                return Ok((text.into_owned(), encoding));
            }
            None => debug!("Decoding as {} failed", encoding.name()),
        }
    }
    Err(ExplorerError::Undecodable {
        tried: encodings.iter().map(|e| e.name().to_string()).collect(),
    })
}

/// Reads delimited text with every column kept as text, typing happens in `clean_table`.
fn read_delimited(text: String, separator: u8) -> Result<Vec<RawColumn>, ExplorerError> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| opts.with_separator(separator))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()?;
    Ok(frame_to_raw(&df)?)
}

fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
}

fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

// Each column is converted in its own rayon task.
fn frame_to_raw(df: &DataFrame) -> Result<Vec<RawColumn>, PolarsError> {
    df.get_column_names()
        .par_iter()
        .map(|name| raw_column(df, name))
        .collect()
}

fn raw_column(df: &DataFrame, col_name: &str) -> Result<RawColumn, PolarsError> {
    let col = df.column(col_name)?.cast(&DataType::String)?;
    let series = col.str()?;
    let cells = series.into_iter().map(|v| v.map(str::to_string)).collect();
    Ok(RawColumn {
        name: col_name.to_string(),
        cells,
    })
}

/// First worksheet, first row is the header.
fn read_spreadsheet(path: &Path) -> Result<Vec<RawColumn>, ExplorerError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExplorerError::LoadingFailed("Workbook has no worksheet!".into()))??;
    Ok(range_to_raw(&range))
}

fn range_to_raw(range: &Range<Data>) -> Vec<RawColumn> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let mut columns: Vec<RawColumn> = header
        .iter()
        .enumerate()
        .map(|(idx, cell)| RawColumn {
            name: spreadsheet_cell_text(cell).unwrap_or_else(|| format!("Unnamed: {idx}")),
            cells: Vec::with_capacity(range.height().saturating_sub(1)),
        })
        .collect();
    for row in rows {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.cells.push(row.get(idx).and_then(spreadsheet_cell_text));
        }
    }
    columns
}

fn spreadsheet_cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Float(f) => Some(format_number(*f)),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(format_flag(*b).to_string()),
        // Whole day serials are dates, anything else keeps its time of day
        Data::DateTime(dt) if dt.is_datetime() => match dt.as_datetime() {
            Some(d) if dt.as_f64().fract() == 0.0 => Some(d.format("%Y-%m-%d").to_string()),
            Some(d) => Some(d.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => Some(dt.to_string()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn declared_kind(name: &str) -> Option<ColumnKind> {
    match name {
        ORDER_STATUS => Some(ColumnKind::Flag),
        INDUSTRY_MAJOR | INDUSTRY_MINOR | MACHINE_TYPE => Some(ColumnKind::Label),
        SOLIDS_RECOVERY | CAKE_MOISTURE => Some(ColumnKind::Number),
        _ => None,
    }
}

pub fn parse_flag(text: &str) -> Option<bool> {
    match text.to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn infer_kind(cells: &[Option<&str>]) -> ColumnKind {
    let mut values = cells.iter().flatten().peekable();
    if values.peek().is_none() {
        return ColumnKind::Label;
    }
    if cells.iter().flatten().all(|c| parse_number(c).is_some()) {
        ColumnKind::Number
    } else if cells.iter().flatten().all(|c| parse_flag(c).is_some()) {
        ColumnKind::Flag
    } else {
        ColumnKind::Label
    }
}

/// pandas style renaming of repeated headers: `a`, `a.1`, `a.2`.
fn dedupe_names(columns: &mut [RawColumn]) {
    let mut seen: Vec<String> = Vec::with_capacity(columns.len());
    for column in columns.iter_mut() {
        if seen.contains(&column.name) {
            let mut n = 1;
            while seen.contains(&format!("{}.{n}", column.name)) {
                n += 1;
            }
            column.name = format!("{}.{n}", column.name);
        }
        seen.push(column.name.clone());
    }
}

fn build_column(raw: RawColumn, policy: &CleaningPolicy) -> (Column, Option<Warning>) {
    let column_policy = policy.for_column(&raw.name);
    let cleaned: Vec<Option<&str>> = raw
        .cells
        .iter()
        .map(|c| column_policy.clean(c.as_deref()))
        .collect();
    let declared = declared_kind(&raw.name);
    let kind = declared.unwrap_or_else(|| infer_kind(&cleaned));

    let labels = || ColumnData::Label(cleaned.iter().map(|c| c.map(str::to_string)).collect());
    let (data, warning) = match kind {
        ColumnKind::Number => {
            let numbers: Vec<Option<f64>> =
                cleaned.iter().map(|c| c.and_then(parse_number)).collect();
            let coerced = cleaned.iter().flatten().count() - numbers.iter().flatten().count();
            if coerced > 0 {
                debug!("{}: {} non numeric cells set to missing", raw.name, coerced);
            }
            (ColumnData::Number(numbers), None)
        }
        ColumnKind::Flag => {
            let flags: Vec<Option<bool>> = cleaned.iter().map(|c| c.and_then(parse_flag)).collect();
            let has_values = cleaned.iter().any(Option::is_some);
            if has_values && flags.iter().all(Option::is_none) {
                // No True/False at all, keep the text so the column is still usable.
                (labels(), Some(Warning::type_mismatch(&raw.name, "boolean")))
            } else {
                (ColumnData::Flag(flags), None)
            }
        }
        ColumnKind::Label => (labels(), None),
    };

    let column = Column::new(raw.name, data);
    debug!(
        "Column \"{}\": {} ({}), width_max: {}",
        column.name(),
        column.kind(),
        if declared.is_some() { "declared" } else { "inferred" },
        column.max_width()
    );
    (column, warning)
}

/// Applies the cleaning policy and types every column. Columns are processed in parallel.
pub fn clean_table(
    name: impl Into<String>,
    mut raw: Vec<RawColumn>,
    policy: &CleaningPolicy,
) -> (Table, Vec<Warning>) {
    dedupe_names(&mut raw);
    let (columns, warnings): (Vec<Column>, Vec<Option<Warning>>) = raw
        .into_par_iter()
        .map(|r| build_column(r, policy))
        .unzip();
    (
        Table::new(name, columns),
        warnings.into_iter().flatten().collect(),
    )
}
