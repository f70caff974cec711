use std::path::PathBuf;

use tracing::{info, warn};

use crate::domain::{
    CHART_COLUMNS, ExplorerError, FILTER_COLUMNS, INDUSTRY_MAJOR, INDUSTRY_MINOR, ORDER_STATUS,
    Warning,
};
use crate::filter::{Selections, filter};
use crate::loader::{LoadOptions, SourceInfo, load_and_clean};
use crate::summary::{
    BoxSeries, CountRow, CrossTab, GroupStats, box_plot, chart_cross_tab, summarize_counts,
    summarize_stats,
};
use crate::table::{ColumnKind, Label, Table};

/// Settings of one box plot panel.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxPanel {
    pub group_column: &'static str,
    pub value_column: Option<String>,
    pub show_outliers: bool,
    pub include_zero: bool,
}

impl BoxPanel {
    fn new(group_column: &'static str) -> Self {
        BoxPanel {
            group_column,
            value_column: None,
            show_outliers: true,
            include_zero: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewOptions {
    pub chart_group: Option<&'static str>,
    pub panels: [BoxPanel; 2],
}

impl Default for ViewOptions {
    fn default() -> Self {
        ViewOptions {
            chart_group: None,
            panels: [BoxPanel::new(INDUSTRY_MAJOR), BoxPanel::new(INDUSTRY_MINOR)],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CountView {
    pub group_column: &'static str,
    pub split: Option<CrossTab>,
    pub rows: Result<Vec<CountRow>, Warning>,
}

#[derive(Debug, Clone)]
pub struct BoxView {
    pub group_column: &'static str,
    pub value_column: Option<String>,
    pub series: Result<Vec<BoxSeries>, Warning>,
    pub stats: Result<GroupStats, Warning>,
}

/// Everything one explorer session holds: the loaded table, the active selections and the
/// view options. Every handler gets it passed explicitly.
#[derive(Debug, Default)]
pub struct Session {
    source: Option<SourceInfo>,
    raw: Table,
    filtered: Table,
    selections: Selections,
    options: ViewOptions,
    load_warnings: Vec<Warning>,
    warnings: Vec<Warning>,
    counts: Option<CountView>,
    boxes: [Option<BoxView>; 2],
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn from_table(table: Table, load_warnings: Vec<Warning>) -> Self {
        let mut session = Session {
            filtered: table.clone(),
            raw: table,
            load_warnings,
            ..Session::default()
        };
        session.reset_options();
        session.refresh();
        session
    }

    /// Loads a new file. On failure the current session stays as it was.
    pub fn open(&mut self, path: PathBuf, options: &LoadOptions) -> Result<(), ExplorerError> {
        let loaded = load_and_clean(path, options)?;
        *self = Session::from_table(loaded.table, loaded.warnings);
        self.source = Some(loaded.source);
        info!("Session opened with {} rows", self.raw.height());
        Ok(())
    }

    pub fn source(&self) -> Option<&SourceInfo> {
        self.source.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.raw.width() > 0
    }

    pub fn raw(&self) -> &Table {
        &self.raw
    }

    pub fn filtered(&self) -> &Table {
        &self.filtered
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn options(&self) -> &ViewOptions {
        &self.options
    }

    /// Warnings of the last load and refresh.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn counts(&self) -> Option<&CountView> {
        self.counts.as_ref()
    }

    pub fn box_view(&self, panel: usize) -> Option<&BoxView> {
        self.boxes.get(panel).and_then(Option::as_ref)
    }

    /// Values offered for filtering, in order of first appearance in the loaded table. A
    /// boolean column only offers the values it has, True before False. An order status
    /// column without boolean values cannot be filtered.
    pub fn filter_options(&self, column: &str) -> Result<Vec<Label>, Warning> {
        let col = self
            .raw
            .column(column)
            .ok_or_else(|| Warning::missing_column(column, "filter"))?;
        if column == ORDER_STATUS && col.kind() != ColumnKind::Flag {
            return Err(Warning::type_mismatch(column, "boolean"));
        }
        let mut options: Vec<Label> = Vec::new();
        for label in self.raw.labels(col) {
            if !label.is_missing() && !options.contains(&label) {
                options.push(label);
            }
        }
        if col.kind() == ColumnKind::Flag {
            options.sort_by_key(|l| *l != Label::value("True"));
        }
        Ok(options)
    }

    pub fn toggle_selection(&mut self, column: &str, label: Label) {
        if let Err(w) = self.filter_options(column) {
            warn!("Filter {column:?} ignored: {w}");
            return;
        }
        let selected = self.selections.toggle(column, label);
        info!("Filter {column:?} toggled (selected: {selected})");
        self.refresh();
    }

    pub fn set_selection(&mut self, column: &str, labels: impl IntoIterator<Item = Label>) {
        if let Err(w) = self.filter_options(column) {
            warn!("Filter {column:?} ignored: {w}");
            return;
        }
        self.selections.set(column, labels);
        self.refresh();
    }

    pub fn clear_selections(&mut self) {
        self.selections.clear();
        self.refresh();
    }

    /// Grouping columns for the count chart that exist and hold at least one value.
    pub fn chart_options(&self) -> Vec<&'static str> {
        CHART_COLUMNS
            .iter()
            .copied()
            .filter(|name| {
                self.filtered
                    .column(name)
                    .is_some_and(|c| self.filtered.labels(c).any(|l| !l.is_missing()))
            })
            .collect()
    }

    pub fn numeric_columns(&self) -> Vec<String> {
        self.raw
            .columns()
            .iter()
            .filter(|c| c.kind() == ColumnKind::Number)
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn set_chart_group(&mut self, column: &'static str) {
        self.options.chart_group = Some(column);
        self.refresh();
    }

    pub fn cycle_chart_group(&mut self) {
        let options = self.chart_options();
        self.options.chart_group = cycle(&options, self.options.chart_group.as_ref()).copied();
        self.refresh();
    }

    pub fn set_value_column(&mut self, panel: usize, column: &str) {
        if let Some(p) = self.options.panels.get_mut(panel) {
            p.value_column = Some(column.to_string());
            self.refresh();
        }
    }

    pub fn cycle_value_column(&mut self, panel: usize) {
        let numeric = self.numeric_columns();
        if let Some(p) = self.options.panels.get_mut(panel) {
            p.value_column = cycle(&numeric, p.value_column.as_ref()).cloned();
            self.refresh();
        }
    }

    pub fn toggle_outliers(&mut self, panel: usize) {
        if let Some(p) = self.options.panels.get_mut(panel) {
            p.show_outliers = !p.show_outliers;
        }
    }

    pub fn toggle_zeros(&mut self, panel: usize) {
        if let Some(p) = self.options.panels.get_mut(panel) {
            p.include_zero = !p.include_zero;
            self.refresh();
        }
    }

    fn reset_options(&mut self) {
        self.options = ViewOptions::default();
        self.options.chart_group = self.chart_options().first().copied();
        let first_numeric = self.numeric_columns().into_iter().next();
        for p in self.options.panels.iter_mut() {
            p.value_column = first_numeric.clone();
        }
    }

    /// Recomputes the filtered table and every derived summary.
    pub fn refresh(&mut self) {
        let mut warnings = self.load_warnings.clone();
        for column in FILTER_COLUMNS {
            if self.is_loaded() && !self.raw.has_column(column) {
                warnings.push(Warning::missing_column(column, "filter"));
            }
        }

        let (filtered, filter_warnings) = filter(&self.raw, &self.selections);
        self.filtered = filtered;
        warnings.extend(filter_warnings);

        if self.filtered.is_empty() {
            if self.is_loaded() {
                warnings.push(Warning::empty_result("the current filters"));
            }
            self.counts = None;
            self.boxes = [None, None];
        } else {
            self.counts = self.options.chart_group.map(|group_column| {
                let (split, notice) = chart_cross_tab(&self.filtered, group_column);
                warnings.extend(notice);
                let rows = summarize_counts(&self.filtered, group_column, split.as_ref());
                CountView {
                    group_column,
                    split,
                    rows,
                }
            });
            for (idx, panel) in self.options.panels.iter().enumerate() {
                self.boxes[idx] = Some(self.build_box_view(panel));
            }
            if let Some(Err(w)) = self.counts.as_ref().map(|c| &c.rows) {
                warnings.push(w.clone());
            }
            for view in self.boxes.iter().flatten() {
                warnings.extend(view.series.as_ref().err().cloned());
                if let Err(w) = &view.stats
                    && view.series.as_ref().err() != Some(w)
                {
                    warnings.push(w.clone());
                }
            }
        }

        for w in warnings.iter() {
            warn!("{w}");
        }
        self.warnings = warnings;
    }

    fn build_box_view(&self, panel: &BoxPanel) -> BoxView {
        let group = panel.group_column;
        let (series, stats) = match panel.value_column.as_deref() {
            Some(value) => (
                box_plot(&self.filtered, group, value, panel.include_zero),
                summarize_stats(&self.filtered, group, value, panel.include_zero),
            ),
            None => {
                let w = Warning::empty_result(format!("box plot of '{group}', no numeric column"));
                (Err(w.clone()), Err(w))
            }
        };
        BoxView {
            group_column: group,
            value_column: panel.value_column.clone(),
            series,
            stats,
        }
    }
}

/// Next element after `current`, wrapping around. Starts at the first one.
fn cycle<'a, T: PartialEq>(options: &'a [T], current: Option<&T>) -> Option<&'a T> {
    let next = current
        .and_then(|c| options.iter().position(|o| o == c))
        .map(|idx| (idx + 1) % options.len())
        .unwrap_or(0);
    options.get(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ALLOWED_MACHINE_TYPES, CAKE_MOISTURE, MACHINE_TYPE, ORDER_STATUS, SOLIDS_RECOVERY,
    };
    use std::path::PathBuf;

    fn fixture_session() -> Session {
        let mut session = Session::new();
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/inquiries.csv");
        session.open(path, &LoadOptions::default()).unwrap();
        session
    }

    #[test]
    fn open_sets_defaults() {
        let session = fixture_session();
        assert_eq!(session.filtered().height(), 8);
        assert_eq!(session.options().chart_group, Some(INDUSTRY_MAJOR));
        assert_eq!(
            session.numeric_columns(),
            vec![SOLIDS_RECOVERY.to_string(), CAKE_MOISTURE.to_string()]
        );
        assert_eq!(
            session.options().panels[0].value_column.as_deref(),
            Some(SOLIDS_RECOVERY)
        );
        assert!(session.warnings().is_empty(), "{:?}", session.warnings());
        assert_eq!(
            session.chart_options(),
            vec![INDUSTRY_MAJOR, INDUSTRY_MINOR, ORDER_STATUS]
        );
    }

    #[test]
    fn filter_options_in_first_appearance_order() {
        let session = fixture_session();
        assert_eq!(
            session.filter_options(INDUSTRY_MAJOR).unwrap(),
            vec![
                Label::value("食品製造"),
                Label::value("畜産"),
                Label::value("化学製品工場")
            ]
        );
        assert_eq!(
            session.filter_options(ORDER_STATUS).unwrap(),
            vec![Label::value("True"), Label::value("False")]
        );
        assert!(session.filter_options("nope").is_err());
    }

    #[test]
    fn selections_refresh_summaries() {
        let mut session = fixture_session();
        session.toggle_selection(INDUSTRY_MAJOR, Label::value("食品製造"));
        assert_eq!(session.filtered().height(), 4);

        let counts = session.counts().unwrap();
        assert_eq!(counts.split.map(|s| s.column), Some(MACHINE_TYPE));
        let rows = counts.rows.as_ref().unwrap();
        assert_eq!(rows.iter().map(|r| r.count).sum::<usize>(), 4);
        assert_eq!(
            rows[0].secondary,
            Some(Label::value(ALLOWED_MACHINE_TYPES[0]))
        );

        let stats = session.box_view(0).unwrap().stats.as_ref().unwrap();
        let food = stats.get("食品製造").unwrap();
        assert_eq!(food.count, 4);
        assert_eq!(food.mean, 93.875);

        session.clear_selections();
        assert_eq!(session.filtered().height(), 8);
    }

    #[test]
    fn filter_to_nothing_skips_summaries() {
        let mut session = fixture_session();
        session.set_selection(INDUSTRY_MAJOR, [Label::value("存在しない")]);
        assert!(session.filtered().is_empty());
        assert!(session.counts().is_none());
        assert!(session.box_view(0).is_none());
        assert!(
            session
                .warnings()
                .contains(&Warning::empty_result("the current filters"))
        );
    }

    #[test]
    fn options_cycle_and_toggle() {
        let mut session = fixture_session();
        session.cycle_chart_group();
        assert_eq!(session.options().chart_group, Some(INDUSTRY_MINOR));
        session.set_chart_group(ORDER_STATUS);
        assert!(session.counts().unwrap().split.is_none());
        session.cycle_chart_group();
        assert_eq!(session.options().chart_group, Some(INDUSTRY_MAJOR));

        session.cycle_value_column(1);
        assert_eq!(
            session.options().panels[1].value_column.as_deref(),
            Some(CAKE_MOISTURE)
        );
        session.toggle_outliers(1);
        assert!(!session.options().panels[1].show_outliers);
        session.toggle_zeros(0);
        assert!(!session.options().panels[0].include_zero);
    }

    #[test]
    fn failed_open_keeps_session() {
        let mut session = fixture_session();
        let result = session.open(PathBuf::from("/nowhere/x.csv"), &LoadOptions::default());
        assert!(matches!(result, Err(ExplorerError::FileNotFound)));
        assert_eq!(session.raw().height(), 8);
    }

    #[test]
    fn missing_filter_columns_are_reported() {
        let table = crate::loader::clean_table(
            "t",
            vec![crate::loader::RawColumn {
                name: INDUSTRY_MAJOR.into(),
                cells: vec![Some("A".into())],
            }],
            &crate::policy::CleaningPolicy::default(),
        )
        .0;
        let session = Session::from_table(table, Vec::new());
        assert!(
            session
                .warnings()
                .contains(&Warning::missing_column(MACHINE_TYPE, "filter"))
        );
        assert!(
            session
                .warnings()
                .contains(&Warning::missing_column(MACHINE_TYPE, "machine type split"))
        );
    }

    #[test]
    fn order_status_without_booleans_is_not_filterable() {
        let (table, warnings) = crate::loader::clean_table(
            "t",
            vec![crate::loader::RawColumn {
                name: ORDER_STATUS.into(),
                cells: vec![Some("受注".into()), Some("失注".into())],
            }],
            &crate::policy::CleaningPolicy::default(),
        );
        assert!(warnings.contains(&Warning::type_mismatch(ORDER_STATUS, "boolean")));
        let mut session = Session::from_table(table, warnings);
        assert_eq!(
            session.filter_options(ORDER_STATUS),
            Err(Warning::type_mismatch(ORDER_STATUS, "boolean"))
        );

        session.toggle_selection(ORDER_STATUS, Label::value("受注"));
        assert!(session.selections().is_empty());
        assert_eq!(session.filtered().height(), 2);

        session.set_selection(ORDER_STATUS, [Label::value("失注")]);
        assert_eq!(session.filtered().height(), 2);
    }

    #[test]
    fn cycle_wraps() {
        let options = ["a", "b"];
        assert_eq!(cycle(&options, None), Some(&"a"));
        assert_eq!(cycle(&options, Some(&"a")), Some(&"b"));
        assert_eq!(cycle(&options, Some(&"b")), Some(&"a"));
        assert_eq!(cycle::<&str>(&[], None), None);
    }
}
