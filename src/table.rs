use std::fmt;
use std::sync::Arc;

use crate::domain::MISSING_LABEL;

/// Type a column is declared (or inferred) as at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Label,
    Number,
    Flag,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Label => "text",
            ColumnKind::Number => "numeric",
            ColumnKind::Flag => "boolean",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Label(Vec<Option<String>>),
    Number(Vec<Option<f64>>),
    Flag(Vec<Option<bool>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Label(v) => v.len(),
            ColumnData::Number(v) => v.len(),
            ColumnData::Flag(v) => v.len(),
        }
    }
}

/// Grouping and filter key of a cell.
///
/// `Value` sorts before `Missing`, so the unknown bucket ends up last when labels tie.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Value(String),
    Missing,
}

impl Label {
    pub fn value(s: impl Into<String>) -> Self {
        Label::Value(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Label::Missing)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Value(s) => f.write_str(s),
            Label::Missing => f.write_str(MISSING_LABEL),
        }
    }
}

/// Integral values print without a fractional part, like the spreadsheet shows them.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn format_flag(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
    max_width: usize,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        let mut column = Column {
            name: name.into(),
            data,
            max_width: 0,
        };
        column.max_width = (0..column.len())
            .map(|idx| column.render(idx).chars().count())
            .max()
            .unwrap_or(0);
        column
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        match self.data {
            ColumnData::Label(_) => ColumnKind::Label,
            ColumnData::Number(_) => ColumnKind::Number,
            ColumnData::Flag(_) => ColumnKind::Flag,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Widest rendered cell, in characters.
    pub fn max_width(&self) -> usize {
        self.max_width
    }

    pub fn label(&self, idx: usize) -> Label {
        match &self.data {
            ColumnData::Label(v) => v[idx].as_ref().map(Label::value),
            ColumnData::Number(v) => v[idx].map(|n| Label::Value(format_number(n))),
            ColumnData::Flag(v) => v[idx].map(|b| Label::value(format_flag(b))),
        }
        .unwrap_or(Label::Missing)
    }

    /// Numeric value of a cell, `None` if missing or the column is not numeric.
    pub fn number(&self, idx: usize) -> Option<f64> {
        match &self.data {
            ColumnData::Number(v) => v[idx],
            _ => None,
        }
    }

    /// Cell text for display, missing values show as `∅`.
    pub fn render(&self, idx: usize) -> String {
        match self.label(idx) {
            Label::Value(s) => s.replace("\r\n", " ↵ ").replace('\n', " ↵ "),
            Label::Missing => String::from("∅"),
        }
    }
}

/// A view on shared column data. Filtering never copies columns, it only derives a new row
/// mapping, so every table derived from a load shares the same `Arc`.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    columns: Arc<Vec<Column>>,
    rows: Arc<Vec<usize>>, // Mapping of view row index to data index
}

impl Default for Table {
    fn default() -> Self {
        Table::empty()
    }
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        let nrows = columns.first().map(Column::len).unwrap_or(0);
        Table {
            name: name.into(),
            columns: Arc::new(columns),
            rows: Arc::new((0..nrows).collect()),
        }
    }

    pub fn empty() -> Self {
        Table::new("", Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows in this view.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    #[cfg(test)]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Data indices of the rows in this view, in view order.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Derives a view holding the given data indices.
    pub fn with_rows(&self, rows: Vec<usize>) -> Table {
        Table {
            name: self.name.clone(),
            columns: Arc::clone(&self.columns),
            rows: Arc::new(rows),
        }
    }

    /// Labels of a column for every row in view order.
    pub fn labels<'a>(&'a self, column: &'a Column) -> impl Iterator<Item = Label> + 'a {
        self.rows.iter().map(move |&ridx| column.label(ridx))
    }

    /// Rendered cells of the view row `row`.
    pub fn render_row(&self, row: usize) -> Vec<String> {
        let ridx = self.rows[row];
        self.columns.iter().map(|c| c.render(ridx)).collect()
    }

    /// True if both views show the same cells in the same order.
    #[cfg(test)]
    pub fn same_content(&self, other: &Table) -> bool {
        self.column_names() == other.column_names()
            && self.height() == other.height()
            && (0..self.height()).all(|r| self.render_row(r) == other.render_row(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            "sample",
            vec![
                Column::new(
                    "major",
                    ColumnData::Label(vec![Some("A".into()), None, Some("B".into())]),
                ),
                Column::new("val", ColumnData::Number(vec![Some(10.0), Some(2.5), None])),
                Column::new("won", ColumnData::Flag(vec![Some(true), Some(false), None])),
            ],
        )
    }

    #[test]
    fn labels_render_per_kind() {
        let table = sample();
        let val = table.column("val").unwrap();
        assert_eq!(val.label(0), Label::value("10"));
        assert_eq!(val.label(1), Label::value("2.5"));
        assert_eq!(val.label(2), Label::Missing);
        let won = table.column("won").unwrap();
        assert_eq!(won.label(0), Label::value("True"));
        assert_eq!(won.render(2), "∅");
        assert_eq!(Label::Missing.to_string(), MISSING_LABEL);
    }

    #[test]
    fn missing_sorts_last() {
        let mut labels = vec![Label::Missing, Label::value("B"), Label::value("A")];
        labels.sort();
        assert_eq!(labels, vec![Label::value("A"), Label::value("B"), Label::Missing]);
    }

    #[test]
    fn derived_view_shares_columns() {
        let table = sample();
        let view = table.with_rows(vec![2, 0]);
        assert_eq!(view.height(), 2);
        assert_eq!(view.render_row(0), vec!["B", "∅", "∅"]);
        assert!(Arc::ptr_eq(&table.columns, &view.columns));
        assert!(!view.same_content(&table));
        assert!(table.same_content(&table.with_rows(vec![0, 1, 2])));
    }

    #[test]
    fn typed_accessors() {
        let table = sample();
        assert_eq!(table.column("val").unwrap().number(0), Some(10.0));
        assert_eq!(table.column("major").unwrap().number(0), None);
        assert_eq!(table.column("major").unwrap().kind(), ColumnKind::Label);
        assert_eq!(table.column("major").unwrap().max_width(), 1);
        assert!(table.column("nope").is_none());
    }

    #[test]
    fn format_number_drops_integral_fraction() {
        assert_eq!(format_number(85.0), "85");
        assert_eq!(format_number(85.25), "85.25");
        assert_eq!(format_number(-3.0), "-3");
    }
}
