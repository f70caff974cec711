use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use tracing::{trace, warn};

use crate::domain::Warning;
use crate::table::{Column, Label, Table};

/// Allowed labels per column. An empty set means the column is not filtered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selections {
    columns: BTreeMap<String, BTreeSet<Label>>,
}

impl Selections {
    pub fn new() -> Self {
        Selections::default()
    }

    #[cfg(test)]
    pub fn with(mut self, column: &str, labels: impl IntoIterator<Item = Label>) -> Self {
        self.set(column, labels);
        self
    }

    pub fn set(&mut self, column: &str, labels: impl IntoIterator<Item = Label>) {
        self.columns
            .insert(column.to_string(), labels.into_iter().collect());
    }

    /// Adds or removes a label, returns whether it is selected afterwards.
    pub fn toggle(&mut self, column: &str, label: Label) -> bool {
        let set = self.columns.entry(column.to_string()).or_default();
        if set.remove(&label) {
            false
        } else {
            set.insert(label);
            true
        }
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }

    pub fn is_selected(&self, column: &str, label: &Label) -> bool {
        self.columns
            .get(column)
            .is_some_and(|set| set.contains(label))
    }

    /// Columns with a non empty selection.
    pub fn active(&self) -> impl Iterator<Item = (&str, &BTreeSet<Label>)> {
        self.columns
            .iter()
            .filter(|(_, set)| !set.is_empty())
            .map(|(name, set)| (name.as_str(), set))
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }
}

/// Keeps the rows whose label is allowed in every selected column. Row order is preserved.
/// Selections on columns the table does not have are ignored with a warning.
pub fn filter(table: &Table, selections: &Selections) -> (Table, Vec<Warning>) {
    let start_time = Instant::now();
    let mut warnings = Vec::new();
    let mut predicates: Vec<(&Column, &BTreeSet<Label>)> = Vec::new();
    for (name, allowed) in selections.active() {
        match table.column(name) {
            Some(column) => predicates.push((column, allowed)),
            None => {
                warn!("Filter on unknown column {name:?} ignored");
                warnings.push(Warning::missing_column(name, "filter"));
            }
        }
    }

    if predicates.is_empty() {
        return (table.clone(), warnings);
    }

    let rows: Vec<usize> = table
        .rows()
        .iter()
        .copied()
        .filter(|&ridx| {
            predicates
                .iter()
                .all(|(column, allowed)| allowed.contains(&column.label(ridx)))
        })
        .collect();

    trace!(
        "Filter kept {}/{} rows in {}ms",
        rows.len(),
        table.height(),
        start_time.elapsed().as_millis()
    );
    (table.with_rows(rows), warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;

    fn sample() -> Table {
        Table::new(
            "sample",
            vec![
                Column::new(
                    "major",
                    ColumnData::Label(vec![
                        Some("A".into()),
                        Some("A".into()),
                        Some("B".into()),
                        None,
                    ]),
                ),
                Column::new(
                    "won",
                    ColumnData::Flag(vec![Some(true), Some(false), Some(true), Some(true)]),
                ),
            ],
        )
    }

    #[test]
    fn keeps_matching_rows_in_order() {
        let table = sample();
        let (filtered, warnings) =
            filter(&table, &Selections::new().with("major", [Label::value("A")]));
        assert!(warnings.is_empty());
        assert_eq!(filtered.rows(), &[0, 1]);
    }

    #[test]
    fn empty_selection_is_identity() {
        let table = sample();
        let selections = Selections::new()
            .with("major", Vec::<Label>::new())
            .with("won", Vec::<Label>::new());
        let (filtered, warnings) = filter(&table, &selections);
        assert!(warnings.is_empty());
        assert!(filtered.same_content(&table));
        assert!(selections.is_empty());
    }

    #[test]
    fn filtering_twice_changes_nothing() {
        let table = sample();
        let selections = Selections::new()
            .with("major", [Label::value("A"), Label::Missing])
            .with("won", [Label::value("True")]);
        let (once, _) = filter(&table, &selections);
        let (twice, _) = filter(&once, &selections);
        assert_eq!(once.rows(), &[0, 3]);
        assert!(once.same_content(&twice));
    }

    #[test]
    fn unknown_column_is_ignored_with_warning() {
        let table = sample();
        let selections = Selections::new().with("machine", [Label::value("x")]);
        let (filtered, warnings) = filter(&table, &selections);
        assert_eq!(filtered.height(), 4);
        assert_eq!(warnings, vec![Warning::missing_column("machine", "filter")]);
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut selections = Selections::new();
        assert!(selections.toggle("major", Label::value("A")));
        assert!(selections.is_selected("major", &Label::value("A")));
        assert!(!selections.toggle("major", Label::value("A")));
        assert!(selections.is_empty());
    }
}
