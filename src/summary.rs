use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::trace;

use crate::domain::{
    ALLOWED_MACHINE_TYPES, INDUSTRY_MAJOR, INDUSTRY_MINOR, MACHINE_TYPE, Warning,
};
use crate::table::{ColumnKind, Label, Table};

/// Restricts a count to rows whose `column` holds one of `allowed`, and splits the counts
/// by that column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossTab {
    pub column: &'static str,
    pub allowed: &'static [&'static str],
}

pub const MACHINE_TYPE_SPLIT: CrossTab = CrossTab {
    column: MACHINE_TYPE,
    allowed: &ALLOWED_MACHINE_TYPES,
};

#[derive(Debug, Clone, PartialEq)]
pub struct CountRow {
    pub group: Label,
    pub secondary: Option<Label>,
    pub count: usize,
}

/// Split used for the count chart of `group_column`. The industry columns are split by
/// machine type when the table has one, otherwise the chart is single coloured and a warning
/// is returned.
pub fn chart_cross_tab(table: &Table, group_column: &str) -> (Option<CrossTab>, Option<Warning>) {
    if group_column != INDUSTRY_MAJOR && group_column != INDUSTRY_MINOR {
        return (None, None);
    }
    if table.has_column(MACHINE_TYPE) {
        (Some(MACHINE_TYPE_SPLIT), None)
    } else {
        (
            None,
            Some(Warning::missing_column(MACHINE_TYPE, "machine type split")),
        )
    }
}

/// Counts rows per label of `group_column`. Missing labels are counted in their own bucket.
///
/// Groups are ordered by descending total, ties by ascending label with the missing bucket
/// last. Inside a group the split labels follow the same rule.
pub fn summarize_counts(
    table: &Table,
    group_column: &str,
    cross_tab: Option<&CrossTab>,
) -> Result<Vec<CountRow>, Warning> {
    let column = table
        .column(group_column)
        .ok_or_else(|| Warning::missing_column(group_column, "count chart"))?;
    let split = match cross_tab {
        Some(ct) => Some((
            table
                .column(ct.column)
                .ok_or_else(|| Warning::missing_column(ct.column, "count chart"))?,
            ct.allowed,
        )),
        None => None,
    };

    let mut counts: HashMap<(Label, Option<Label>), usize> = HashMap::new();
    for &ridx in table.rows() {
        let secondary = match split {
            Some((split_column, allowed)) => match split_column.label(ridx) {
                Label::Value(v) if allowed.iter().any(|a| *a == v) => Some(Label::Value(v)),
                _ => continue,
            },
            None => None,
        };
        *counts.entry((column.label(ridx), secondary)).or_insert(0) += 1;
    }

    if counts.keys().all(|(group, _)| group.is_missing()) {
        return Err(Warning::empty_result(format!("count chart of '{group_column}'")));
    }

    let mut totals: HashMap<Label, usize> = HashMap::new();
    for ((group, _), count) in counts.iter() {
        *totals.entry(group.clone()).or_insert(0) += count;
    }

    let mut rows: Vec<CountRow> = counts
        .into_iter()
        .map(|((group, secondary), count)| CountRow {
            group,
            secondary,
            count,
        })
        .collect();
    rows.sort_by(|a, b| {
        let key = |r: &CountRow| (Reverse(totals[&r.group]), r.group.clone());
        key(a)
            .cmp(&key(b))
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.secondary.cmp(&b.secondary))
    });
    trace!("Counted {} groups of '{group_column}'", totals.len());
    Ok(rows)
}

/// Total per group in chart order.
pub fn group_totals(rows: &[CountRow]) -> Vec<(Label, usize)> {
    let mut totals: Vec<(Label, usize)> = Vec::new();
    for row in rows {
        match totals.last_mut() {
            Some((group, total)) if *group == row.group => *total += row.count,
            _ => totals.push((row.group.clone(), row.count)),
        }
    }
    totals
}

/// Descriptive statistics of one group. `std` is the sample standard deviation and is
/// undefined for a single value. Quantiles interpolate linearly between closest ranks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub max: f64,
}

impl Describe {
    pub fn from_sorted(sorted: &[f64]) -> Option<Self> {
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std = (count > 1).then(|| {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });
        Some(Describe {
            count,
            mean,
            std,
            min,
            p25: quantile(sorted, 0.25),
            p50: quantile(sorted, 0.5),
            p75: quantile(sorted, 0.75),
            max,
        })
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub group_column: String,
    pub value_column: String,
    /// Ascending by group label.
    pub groups: Vec<(String, Describe)>,
}

impl GroupStats {
    /// `None` means not applicable: the group has no value left.
    pub fn get(&self, group: &str) -> Option<&Describe> {
        self.groups.iter().find(|(g, _)| g == group).map(|(_, d)| d)
    }
}

/// Sorted values per group, rows with a missing group or value dropped.
fn grouped_values(
    table: &Table,
    group_column: &str,
    value_column: &str,
    include_zero: bool,
    feature: &str,
) -> Result<BTreeMap<String, Vec<f64>>, Warning> {
    let group = table
        .column(group_column)
        .ok_or_else(|| Warning::missing_column(group_column, feature))?;
    let value = table
        .column(value_column)
        .ok_or_else(|| Warning::missing_column(value_column, feature))?;
    if value.kind() != ColumnKind::Number {
        return Err(Warning::type_mismatch(value_column, "numeric"));
    }

    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for &ridx in table.rows() {
        let (Label::Value(label), Some(v)) = (group.label(ridx), value.number(ridx)) else {
            continue;
        };
        if !include_zero && v == 0.0 {
            continue;
        }
        groups.entry(label).or_default().push(v);
    }
    if groups.is_empty() {
        return Err(Warning::empty_result(format!(
            "{feature} of '{value_column}' by '{group_column}'"
        )));
    }
    for values in groups.values_mut() {
        values.sort_by(f64::total_cmp);
    }
    Ok(groups)
}

pub fn summarize_stats(
    table: &Table,
    group_column: &str,
    value_column: &str,
    include_zero: bool,
) -> Result<GroupStats, Warning> {
    let groups: Vec<(String, Vec<f64>)> =
        grouped_values(table, group_column, value_column, include_zero, "statistics")?
            .into_iter()
            .collect();
    let groups = groups
        .into_par_iter()
        .filter_map(|(label, values)| Describe::from_sorted(&values).map(|d| (label, d)))
        .collect();
    Ok(GroupStats {
        group_column: group_column.to_string(),
        value_column: value_column.to_string(),
        groups,
    })
}

/// One box of a box plot. Whiskers end at the most extreme values within 1.5 IQR of the box.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSeries {
    pub label: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

impl BoxSeries {
    fn from_sorted(label: String, sorted: &[f64]) -> Option<Self> {
        let d = Describe::from_sorted(sorted)?;
        let iqr = d.p75 - d.p25;
        let (low_fence, high_fence) = (d.p25 - 1.5 * iqr, d.p75 + 1.5 * iqr);
        let inside = || sorted.iter().copied().filter(|v| *v >= low_fence && *v <= high_fence);
        Some(BoxSeries {
            label,
            count: d.count,
            min: d.min,
            q1: d.p25,
            median: d.p50,
            q3: d.p75,
            max: d.max,
            lower_whisker: inside().next().unwrap_or(d.p25),
            upper_whisker: inside().last().unwrap_or(d.p75),
            outliers: sorted
                .iter()
                .copied()
                .filter(|v| *v < low_fence || *v > high_fence)
                .collect(),
        })
    }
}

/// Box plot series ordered by descending count, ties by label.
pub fn box_plot(
    table: &Table,
    group_column: &str,
    value_column: &str,
    include_zero: bool,
) -> Result<Vec<BoxSeries>, Warning> {
    let groups = grouped_values(table, group_column, value_column, include_zero, "box plot")?;

    let mut distinct: Vec<f64> = groups.values().flatten().copied().collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if groups.len() < 2 || distinct.len() < 2 {
        return Err(Warning::InsufficientVariation {
            group: group_column.to_string(),
            value: value_column.to_string(),
        });
    }

    let mut series: Vec<BoxSeries> = groups
        .into_iter()
        .filter_map(|(label, values)| BoxSeries::from_sorted(label, &values))
        .collect();
    series.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SOLIDS_RECOVERY;
    use crate::loader::{RawColumn, clean_table};
    use crate::policy::{CleaningPolicy, ZeroScope};

    fn table(columns: &[(&str, &[Option<&str>])]) -> Table {
        let raw = columns
            .iter()
            .map(|(name, cells)| RawColumn {
                name: name.to_string(),
                cells: cells.iter().map(|c| c.map(str::to_string)).collect(),
            })
            .collect();
        clean_table("t", raw, &CleaningPolicy::new(ZeroScope::Measurements)).0
    }

    fn scenario() -> Table {
        table(&[
            (INDUSTRY_MAJOR, &[Some("A"), Some("A"), Some("B")]),
            (SOLIDS_RECOVERY, &[Some("10"), Some(" "), Some("0")]),
        ])
    }

    #[test]
    fn stats_scenario() {
        let stats = summarize_stats(&scenario(), INDUSTRY_MAJOR, SOLIDS_RECOVERY, true).unwrap();
        let a = stats.get("A").unwrap();
        assert_eq!(a.count, 1);
        assert_eq!(a.mean, 10.0);
        assert_eq!(a.std, None);
        assert!(stats.get("B").is_none());
    }

    #[test]
    fn counts_scenario_descending() {
        let rows = summarize_counts(&scenario(), INDUSTRY_MAJOR, None).unwrap();
        let pairs: Vec<(String, usize)> =
            rows.iter().map(|r| (r.group.to_string(), r.count)).collect();
        assert_eq!(pairs, vec![("A".to_string(), 2), ("B".to_string(), 1)]);
    }

    #[test]
    fn counts_ties_break_by_label_with_missing_bucket() {
        let t = table(&[(INDUSTRY_MAJOR, &[Some("C"), None, Some("B"), Some("C"), Some("-")])]);
        let rows = summarize_counts(&t, INDUSTRY_MAJOR, None).unwrap();
        let groups: Vec<Label> = rows.iter().map(|r| r.group.clone()).collect();
        assert_eq!(groups, vec![Label::value("C"), Label::Missing, Label::value("B")]);
        assert_eq!(rows.iter().map(|r| r.count).sum::<usize>(), t.height());
    }

    #[test]
    fn cross_tab_only_counts_allowed_machine_types() {
        let t = table(&[
            (INDUSTRY_MAJOR, &[Some("A"), Some("A"), Some("B"), Some("B"), Some("B")]),
            (
                MACHINE_TYPE,
                &[
                    Some(ALLOWED_MACHINE_TYPES[0]),
                    Some("ベルトプレス"),
                    Some(ALLOWED_MACHINE_TYPES[1]),
                    Some(ALLOWED_MACHINE_TYPES[0]),
                    None,
                ],
            ),
        ]);
        let (split, warning) = chart_cross_tab(&t, INDUSTRY_MAJOR);
        assert!(warning.is_none());
        let rows = summarize_counts(&t, INDUSTRY_MAJOR, split.as_ref()).unwrap();
        assert_eq!(rows.iter().map(|r| r.count).sum::<usize>(), 3);
        assert_eq!(
            group_totals(&rows),
            vec![(Label::value("B"), 2), (Label::value("A"), 1)]
        );
        assert_eq!(rows[0].secondary, Some(Label::value(ALLOWED_MACHINE_TYPES[0])));
    }

    #[test]
    fn cross_tab_falls_back_without_machine_type() {
        let t = table(&[(INDUSTRY_MAJOR, &[Some("A")])]);
        let (split, warning) = chart_cross_tab(&t, INDUSTRY_MAJOR);
        assert!(split.is_none());
        assert_eq!(
            warning,
            Some(Warning::missing_column(MACHINE_TYPE, "machine type split"))
        );
        assert_eq!(chart_cross_tab(&t, "受注の有無"), (None, None));
    }

    #[test]
    fn counts_need_some_label() {
        let t = table(&[(INDUSTRY_MAJOR, &[None, Some(" ")])]);
        assert!(matches!(
            summarize_counts(&t, INDUSTRY_MAJOR, None),
            Err(Warning::EmptyResult { .. })
        ));
        assert!(matches!(
            summarize_counts(&t, "nope", None),
            Err(Warning::MissingColumn { .. })
        ));
    }

    #[test]
    fn describe_matches_linear_quantiles() {
        let d = Describe::from_sorted(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!((d.p25, d.p50, d.p75), (1.75, 2.5, 3.25));
        assert!((d.std.unwrap() - 1.2909944487358056).abs() < 1e-12);
        assert_eq!((d.min, d.max, d.mean), (1.0, 4.0, 2.5));
        assert!(Describe::from_sorted(&[]).is_none());
    }

    #[test]
    fn excluding_zero_never_reports_zero_min() {
        let t = table(&[
            (INDUSTRY_MAJOR, &[Some("A"), Some("A"), Some("B")]),
            ("件数", &[Some("0"), Some("5"), Some("0")]),
        ]);
        let with_zero = summarize_stats(&t, INDUSTRY_MAJOR, "件数", true).unwrap();
        assert_eq!(with_zero.get("A").unwrap().min, 0.0);
        let without = summarize_stats(&t, INDUSTRY_MAJOR, "件数", false).unwrap();
        assert_eq!(without.get("A").unwrap().min, 5.0);
        assert!(without.get("B").is_none());
        assert!(without.groups.iter().all(|(_, d)| d.min != 0.0));

        let only_zero = table(&[(INDUSTRY_MAJOR, &[Some("B")]), ("件数", &[Some("0")])]);
        assert!(matches!(
            summarize_stats(&only_zero, INDUSTRY_MAJOR, "件数", false),
            Err(Warning::EmptyResult { .. })
        ));
    }

    #[test]
    fn stats_need_numeric_values() {
        let t = table(&[(INDUSTRY_MAJOR, &[Some("A")]), (INDUSTRY_MINOR, &[Some("x")])]);
        assert_eq!(
            summarize_stats(&t, INDUSTRY_MAJOR, INDUSTRY_MINOR, true),
            Err(Warning::type_mismatch(INDUSTRY_MINOR, "numeric"))
        );
    }

    #[test]
    fn box_plot_whiskers_and_outliers() {
        let t = table(&[
            (
                INDUSTRY_MAJOR,
                &[Some("A"), Some("A"), Some("A"), Some("A"), Some("A"), Some("B")],
            ),
            (
                "値",
                &[Some("1"), Some("2"), Some("3"), Some("4"), Some("100"), Some("7")],
            ),
        ]);
        let series = box_plot(&t, INDUSTRY_MAJOR, "値", true).unwrap();
        assert_eq!(series[0].label, "A");
        assert_eq!((series[0].q1, series[0].median, series[0].q3), (2.0, 3.0, 4.0));
        assert_eq!(series[0].lower_whisker, 1.0);
        assert_eq!(series[0].upper_whisker, 4.0);
        assert_eq!(series[0].outliers, vec![100.0]);
        assert_eq!(series[1].label, "B");
    }

    #[test]
    fn box_plot_needs_variation() {
        let t = table(&[
            (INDUSTRY_MAJOR, &[Some("A"), Some("A")]),
            ("値", &[Some("1"), Some("2")]),
        ]);
        assert!(matches!(
            box_plot(&t, INDUSTRY_MAJOR, "値", true),
            Err(Warning::InsufficientVariation { .. })
        ));
    }
}
