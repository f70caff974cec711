use std::fmt::Write;

use crate::session::{BoxView, CountView, Session};
use crate::summary::{Describe, GroupStats};

pub const STATS_HEADER: [&str; 9] = ["", "count", "mean", "std", "min", "25%", "50%", "75%", "max"];

pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "NaN".to_string(),
    }
}

/// Cells of one statistics row, in `STATS_HEADER` order.
pub fn stats_cells(group: &str, d: &Describe) -> Vec<String> {
    vec![
        group.to_string(),
        d.count.to_string(),
        format_stat(Some(d.mean)),
        format_stat(d.std),
        format_stat(Some(d.min)),
        format_stat(Some(d.p25)),
        format_stat(Some(d.p50)),
        format_stat(Some(d.p75)),
        format_stat(Some(d.max)),
    ]
}

/// Quotes a field if it contains a separator, whitespace or a quote.
pub fn csv_field(c: &str) -> String {
    let needs_escaping = c.contains('"');
    let needs_wrapping = c.chars().any(|c| c == ' ' || c == '\t' || c == ',' || c == '\n');
    let mut out = String::from(c);

    if needs_escaping {
        out = out.replace('"', "\"\"");
    }
    if needs_wrapping || needs_escaping {
        out = format!("\"{out}\"");
    }
    out
}

pub fn csv_line(cells: &[String]) -> String {
    cells
        .iter()
        .map(|c| csv_field(c))
        .collect::<Vec<String>>()
        .join(",")
}

pub fn stats_to_csv(stats: &GroupStats) -> String {
    let mut header: Vec<String> = STATS_HEADER.iter().map(|h| h.to_string()).collect();
    header[0] = stats.group_column.clone();
    let mut lines = vec![csv_line(&header)];
    lines.extend(
        stats
            .groups
            .iter()
            .map(|(group, d)| csv_line(&stats_cells(group, d))),
    );
    lines.join("\n")
}

/// Count rows as CSV, `None` when the counts were replaced by a warning.
pub fn counts_to_csv(view: &CountView) -> Option<String> {
    let rows = view.rows.as_ref().ok()?;
    let mut header = vec![view.group_column.to_string()];
    header.extend(view.split.map(|s| s.column.to_string()));
    header.push(String::from("count"));
    let mut lines = vec![csv_line(&header)];
    for row in rows {
        let mut cells = vec![row.group.to_string()];
        cells.extend(row.secondary.as_ref().map(|s| s.to_string()));
        cells.push(row.count.to_string());
        lines.push(csv_line(&cells));
    }
    Some(lines.join("\n"))
}

fn write_counts(out: &mut String, view: &CountView) {
    let title = match view.split {
        Some(split) => format!("{} (split by {})", view.group_column, split.column),
        None => view.group_column.to_string(),
    };
    writeln!(out, "== Counts by {title} ==").ok();
    match &view.rows {
        Ok(rows) => {
            for row in rows {
                let line = match &row.secondary {
                    Some(secondary) => format!("{}\t{}\t{}", row.group, secondary, row.count),
                    None => format!("{}\t{}", row.group, row.count),
                };
                writeln!(out, "{line}").ok();
            }
        }
        Err(w) => {
            writeln!(out, "! {w}").ok();
        }
    }
}

fn write_box(out: &mut String, view: &BoxView) {
    let value = view.value_column.as_deref().unwrap_or("-");
    writeln!(out, "== {} by {} ==", value, view.group_column).ok();
    match &view.stats {
        Ok(stats) => {
            let mut header: Vec<String> = STATS_HEADER.iter().map(|h| h.to_string()).collect();
            header[0] = view.group_column.to_string();
            writeln!(out, "{}", header.join("\t")).ok();
            for (group, d) in stats.groups.iter() {
                writeln!(out, "{}", stats_cells(group, d).join("\t")).ok();
            }
        }
        Err(w) => {
            writeln!(out, "! {w}").ok();
        }
    }
    if let Ok(series) = &view.series {
        let outliers: usize = series.iter().map(|s| s.outliers.len()).sum();
        writeln!(out, "box plot: {} groups, {} outliers", series.len(), outliers).ok();
    }
}

/// Plain text rendering of everything the interactive view shows.
pub fn render_report(session: &Session) -> String {
    let mut out = String::new();
    if let Some(source) = session.source() {
        let encoding = source.encoding.map(|e| e.name()).unwrap_or("-");
        writeln!(out, "File: {} ({})", source.file_name(), encoding).ok();
    }
    writeln!(
        out,
        "Rows: {} / {}",
        session.filtered().height(),
        session.raw().height()
    )
    .ok();
    for (column, labels) in session.selections().active() {
        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        writeln!(out, "Filter: {} = {}", column, labels.join(" | ")).ok();
    }
    for w in session.warnings() {
        writeln!(out, "Warning: {w}").ok();
    }

    if let Some(view) = session.counts() {
        writeln!(out).ok();
        write_counts(&mut out, view);
    }
    for panel in 0..2 {
        if let Some(view) = session.box_view(panel) {
            writeln!(out).ok();
            write_box(&mut out, view);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::INDUSTRY_MAJOR;
    use crate::loader::LoadOptions;
    use crate::table::Label;
    use std::path::PathBuf;

    fn fixture_session() -> Session {
        let mut session = Session::new();
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/inquiries.csv");
        session.open(path, &LoadOptions::default()).unwrap();
        session
    }

    #[test]
    fn report_lists_counts_and_stats() {
        let mut session = fixture_session();
        session.toggle_selection(INDUSTRY_MAJOR, Label::value("食品製造"));
        let report = render_report(&session);
        assert!(report.contains("File: inquiries.csv (UTF-8)"), "{report}");
        assert!(report.contains("Rows: 4 / 8"));
        assert!(report.contains("Filter: 業種大分類 = 食品製造"));
        assert!(report.contains("食品製造\t多重円板型脱水機\t2"));
        assert!(report.contains("食品製造\t4\t93.8"));
    }

    #[test]
    fn report_shows_replacing_warning() {
        let mut session = fixture_session();
        session.set_selection(INDUSTRY_MAJOR, [Label::value("畜産")]);
        let report = render_report(&session);
        assert!(report.contains("Rows: 2 / 8"));
        assert!(report.contains("! no rows left for statistics of '固形物回収率 %' by '業種大分類'"));
    }

    #[test]
    fn counts_as_csv() {
        let mut session = fixture_session();
        session.set_chart_group(crate::domain::ORDER_STATUS);
        let csv = counts_to_csv(session.counts().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "受注の有無,count");
        assert_eq!(lines[1], "True,4");
        assert_eq!(lines[2], "False,3");
        assert_eq!(lines[3], "不明/欠損値,1");
    }

    #[test]
    fn csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_line(&["x".into(), "y z".into()]), "x,\"y z\"");
    }
}
