use ratatui::{
    Frame,
    layout::{Constraint, Direction, Flex, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{
        Bar, BarChart, BarGroup, Block, Cell, Clear, Paragraph, Row, Table, TableState, Tabs,
        Wrap,
    },
};
use tracing::trace;

use crate::domain::ExplorerConfig;
use crate::model::{FilterEntry, Focus, Model, ViewTab};
use crate::report::{STATS_HEADER, stats_cells};
use crate::session::{BoxView, CountView};
use crate::summary::{BoxSeries, group_totals};
use crate::table::Label;

pub const HEADER_HEIGHT: u16 = 1;
pub const STATUSLINE_HEIGHT: u16 = 1;
pub const TABS_HEIGHT: u16 = 1;
pub const FILTER_PANE_WIDTH: u16 = 34;
/// Lines around the data table rows: header, status line, tabs, borders and the column header.
pub const VIEW_CHROME_HEIGHT: usize = (HEADER_HEIGHT + STATUSLINE_HEIGHT + TABS_HEIGHT + 3) as usize;

const SPLIT_COLORS: [Color; 2] = [Color::Cyan, Color::Magenta];
const TAB_TITLES: [&str; 4] = ["1 Counts", "2 Box 大分類", "3 Box 中分類", "4 Data"];

pub struct ExplorerUI {
    max_column_width: usize,
}

impl ExplorerUI {
    pub fn new(config: &ExplorerConfig) -> Self {
        Self {
            max_column_width: config.max_column_width,
        }
    }

    pub fn draw(&self, model: &Model, frame: &mut Frame) {
        let [header, body, status] = Layout::vertical([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT),
        ])
        .areas(frame.area());
        let [filters, view] =
            Layout::horizontal([Constraint::Length(FILTER_PANE_WIDTH), Constraint::Min(0)]).areas(body);

        self.draw_header(model, frame, header);
        self.draw_filters(model, frame, filters);
        self.draw_view(model, frame, view);
        self.draw_status(model, frame, status);

        if let Some(message) = model.popup() {
            self.draw_popup(message, frame);
        }
    }

    fn draw_header(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let session = model.session();
        let mut spans = vec![" Inquiry explorer ".bold().reversed(), " ".into()];
        match session.source() {
            Some(source) => {
                spans.push(source.file_name().yellow());
                if let Some(encoding) = source.encoding {
                    spans.push(format!(" [{}]", encoding.name()).dark_gray());
                }
            }
            None => spans.push(session.raw().name().to_string().yellow()),
        }
        spans.push(
            format!(
                "  rows: {} / {}",
                session.filtered().height(),
                session.raw().height()
            )
            .into(),
        );
        frame.render_widget(Line::from(spans), area);
    }

    fn pane_block(title: &str, focused: bool) -> Block<'_> {
        let block = Block::bordered().title(Line::from(title).bold());
        if focused {
            block.border_set(border::THICK).border_style(Style::new().yellow())
        } else {
            block
        }
    }

    fn draw_filters(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let focused = model.focus() == Focus::Filters;
        let selections = model.session().selections();
        let lines: Vec<Line> = model
            .filter_entries()
            .iter()
            .enumerate()
            .map(|(idx, entry)| match entry {
                FilterEntry::Header(column) => Line::from(column.to_string()).bold().underlined(),
                FilterEntry::Choice { column, label } => {
                    let marker = if selections.is_selected(column, label) { "[x] " } else { "[ ] " };
                    let line = Line::from(format!("{marker}{label}"));
                    if focused && idx == model.filter_cursor() {
                        line.reversed()
                    } else {
                        line
                    }
                }
                FilterEntry::Notice(text) => Line::from(text.clone()).italic().dark_gray(),
            })
            .collect();

        let inner_height = area.height.saturating_sub(2) as usize;
        let scroll = (model.filter_cursor() + 1).saturating_sub(inner_height);
        let paragraph = Paragraph::new(lines)
            .block(Self::pane_block(" Filters ", focused))
            .scroll((scroll as u16, 0));
        frame.render_widget(paragraph, area);
    }

    fn draw_view(&self, model: &Model, frame: &mut Frame, area: Rect) {
        let [tabs_area, content] =
            Layout::vertical([Constraint::Length(TABS_HEIGHT), Constraint::Min(0)]).areas(area);
        let tabs = Tabs::new(TAB_TITLES)
            .select(model.tab().index())
            .highlight_style(Style::new().yellow().bold());
        frame.render_widget(tabs, tabs_area);

        let focused = model.focus() == Focus::View;
        let session = model.session();
        if !session.is_loaded() {
            let text = Paragraph::new("No data loaded. Press 'e' to open a file.")
                .block(Self::pane_block(" View ", focused));
            frame.render_widget(text, content);
            return;
        }
        if session.filtered().is_empty() {
            let text = Paragraph::new("No rows match the current filters.")
                .block(Self::pane_block(" View ", focused));
            frame.render_widget(text, content);
            return;
        }

        match model.tab() {
            ViewTab::Counts => match session.counts() {
                Some(view) => self.draw_counts(view, model.view_scroll(), focused, frame, content),
                None => {
                    let text = Paragraph::new("No column to group by.")
                        .block(Self::pane_block(" Counts ", focused));
                    frame.render_widget(text, content);
                }
            },
            ViewTab::BoxMajor | ViewTab::BoxMinor => {
                let panel = model.tab().panel().unwrap_or(0);
                if let Some(view) = session.box_view(panel) {
                    let show_outliers = session.options().panels[panel].show_outliers;
                    let include_zero = session.options().panels[panel].include_zero;
                    let title = format!(
                        " {} by {}  outliers: {}  zeros: {} ",
                        view.value_column.as_deref().unwrap_or("-"),
                        view.group_column,
                        if show_outliers { "on" } else { "off" },
                        if include_zero { "in" } else { "out" },
                    );
                    let block = Self::pane_block(&title, focused);
                    let inner = block.inner(content);
                    frame.render_widget(block, content);
                    self.draw_box_view(view, show_outliers, model.view_scroll(), frame, inner);
                }
            }
            ViewTab::Data => self.draw_data(model, focused, frame, content),
        }
    }

    fn draw_counts(&self, view: &CountView, scroll: usize, focused: bool, frame: &mut Frame, area: Rect) {
        let title = match view.split {
            Some(split) => format!(" Counts by {} and {} ", view.group_column, split.column),
            None => format!(" Counts by {} ", view.group_column),
        };
        let block = Self::pane_block(&title, focused);
        let rows = match &view.rows {
            Ok(rows) => rows,
            Err(w) => {
                frame.render_widget(Paragraph::new(w.to_string()).block(block), area);
                return;
            }
        };

        let inner = block.inner(area);
        frame.render_widget(block, area);
        let [legend, chart_area] =
            Layout::vertical([Constraint::Length(1), Constraint::Min(0)]).areas(inner);

        let mut chart = BarChart::default()
            .direction(Direction::Horizontal)
            .bar_width(1)
            .bar_gap(0)
            .group_gap(1);
        match view.split {
            Some(split) => {
                let spans: Vec<Span> = split
                    .allowed
                    .iter()
                    .zip(SPLIT_COLORS)
                    .map(|(name, color)| Span::styled(format!("■ {name}  "), Style::new().fg(color)))
                    .collect();
                frame.render_widget(Line::from(spans), legend);

                let totals = group_totals(rows);
                let mut groups: Vec<(&Label, Vec<Bar>)> = Vec::new();
                for row in rows {
                    let color = row
                        .secondary
                        .as_ref()
                        .and_then(|s| split.allowed.iter().position(|a| Label::value(*a) == *s))
                        .map(|idx| SPLIT_COLORS[idx % SPLIT_COLORS.len()])
                        .unwrap_or(Color::Gray);
                    let bar = Bar::default().value(row.count as u64).style(Style::new().fg(color));
                    let same_group = groups.last().is_some_and(|(label, _)| **label == row.group);
                    match groups.last_mut() {
                        Some((_, bars)) if same_group => bars.push(bar),
                        _ => groups.push((&row.group, vec![bar])),
                    }
                }
                for ((label, bars), (_, total)) in groups.into_iter().zip(totals).skip(scroll) {
                    let group = BarGroup::default()
                        .label(Line::from(format!("{label} ({total})")))
                        .bars(&bars);
                    chart = chart.data(group);
                }
            }
            None => {
                let total: usize = rows.iter().map(|r| r.count).sum();
                frame.render_widget(Line::from(format!("{total} rows")), legend);
                let bars: Vec<Bar> = rows
                    .iter()
                    .skip(scroll)
                    .map(|row| {
                        Bar::default()
                            .value(row.count as u64)
                            .label(Line::from(row.group.to_string()))
                            .style(Style::new().fg(SPLIT_COLORS[0]))
                    })
                    .collect();
                chart = chart.data(BarGroup::default().bars(&bars));
            }
        }
        frame.render_widget(chart, chart_area);
    }

    fn draw_box_view(&self, view: &BoxView, show_outliers: bool, scroll: usize, frame: &mut Frame, area: Rect) {
        let stats_height = match &view.stats {
            Ok(stats) => stats.groups.len() as u16 + 2,
            Err(_) => 2,
        };
        let [plot_area, stats_area] = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(stats_height.min(area.height / 2)),
        ])
        .areas(area);

        match &view.series {
            Ok(series) => self.draw_box_plot(series, show_outliers, scroll, frame, plot_area),
            Err(w) => {
                let text = Paragraph::new(w.to_string()).wrap(Wrap { trim: true });
                frame.render_widget(text, plot_area);
            }
        }

        match &view.stats {
            Ok(stats) => {
                let mut header: Vec<String> = STATS_HEADER.iter().map(|h| h.to_string()).collect();
                header[0] = stats.group_column.clone();
                let rows: Vec<Row> = stats
                    .groups
                    .iter()
                    .map(|(group, d)| Row::new(stats_cells(group, d)))
                    .collect();
                let mut widths = vec![Constraint::Length(self.max_column_width as u16)];
                widths.extend([Constraint::Length(8); 8]);
                let table = Table::new(rows, widths)
                    .header(Row::new(header).bold().underlined())
                    .block(Block::new().title(Line::from(" Statistics ").bold()));
                frame.render_widget(table, stats_area);
            }
            Err(w) => frame.render_widget(Paragraph::new(w.to_string()), stats_area),
        }
    }

    fn draw_box_plot(&self, series: &[BoxSeries], show_outliers: bool, scroll: usize, frame: &mut Frame, area: Rect) {
        let [label_area, plot_area] = Layout::horizontal([
            Constraint::Length(self.max_column_width as u16),
            Constraint::Min(10),
        ])
        .areas(area);
        let Some((lo, hi)) = plot_range(series, show_outliers) else {
            return;
        };
        let visible: Vec<&BoxSeries> = series
            .iter()
            .skip(scroll)
            .take(area.height.saturating_sub(1) as usize)
            .collect();

        let mut labels: Vec<Line> = visible
            .iter()
            .map(|s| Line::from(format!("{} ({})", s.label, s.count)))
            .collect();
        labels.push(Line::from(""));
        let width = plot_area.width as usize;
        let mut plots: Vec<Line> = visible
            .iter()
            .map(|s| Line::from(box_line(s, lo, hi, width, show_outliers)).fg(SPLIT_COLORS[0]))
            .collect();
        plots.push(axis_line(lo, hi, width).dark_gray());

        frame.render_widget(Paragraph::new(labels), label_area);
        frame.render_widget(Paragraph::new(plots), plot_area);
    }

    fn draw_data(&self, model: &Model, focused: bool, frame: &mut Frame, area: Rect) {
        let table = model.session().filtered();
        let (row, offset_row, first_column) = model.data_position();
        let page = area.height.saturating_sub(3) as usize;
        trace!("Data view rows {offset_row}..{} columns {first_column}..", offset_row + page);

        let columns = &table.columns()[first_column.min(table.width())..];
        let widths: Vec<Constraint> = columns
            .iter()
            .map(|c| {
                let width = c.max_width().max(c.name().chars().count()).min(self.max_column_width);
                Constraint::Length(width as u16)
            })
            .collect();
        let header = Row::new(columns.iter().map(|c| Cell::from(c.name().to_string()))).bold();
        let rows: Vec<Row> = table
            .rows()
            .iter()
            .skip(offset_row)
            .take(page)
            .map(|ridx| Row::new(columns.iter().map(|c| Cell::from(c.render(*ridx)))))
            .collect();

        let mut state = TableState::default().with_selected(Some(row.saturating_sub(offset_row)));
        let widget = Table::new(rows, widths)
            .header(header)
            .row_highlight_style(Style::new().add_modifier(Modifier::REVERSED))
            .block(Self::pane_block(" Data ", focused));
        frame.render_stateful_widget(widget, area, &mut state);
    }

    fn draw_status(&self, model: &Model, frame: &mut Frame, area: Rect) {
        match model.prompt() {
            Some(input) => {
                let prefix = "Open file: ";
                let before_cursor: String = input.input.chars().take(input.cursor_pos).collect();
                let cursor_x = Span::raw(prefix).width() + Span::raw(before_cursor).width();
                frame.render_widget(
                    Line::from(vec![prefix.bold(), input.input.clone().into()]),
                    area,
                );
                frame.set_cursor_position((area.x + cursor_x as u16, area.y));
            }
            None => frame.render_widget(Line::from(model.status_line()).reversed(), area),
        }
    }

    fn draw_popup(&self, message: &str, frame: &mut Frame) {
        let text = Text::from(message);
        let [area] = Layout::horizontal([Constraint::Length(text.width() as u16 + 4)])
            .flex(Flex::Center)
            .areas(frame.area());
        let [area] = Layout::vertical([Constraint::Length(text.height() as u16 + 2)])
            .flex(Flex::Center)
            .areas(area);
        let block = Block::bordered()
            .title(Line::from(" Help ").bold().centered())
            .title_bottom(Line::from(" Esc to close ").centered())
            .border_set(border::THICK);
        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(text).block(block), area);
    }
}

/// Value range covered by all boxes, whiskers and, when shown, outliers.
pub fn plot_range(series: &[BoxSeries], show_outliers: bool) -> Option<(f64, f64)> {
    let lo = series
        .iter()
        .map(|s| if show_outliers { s.min } else { s.lower_whisker })
        .min_by(f64::total_cmp)?;
    let hi = series
        .iter()
        .map(|s| if show_outliers { s.max } else { s.upper_whisker })
        .max_by(f64::total_cmp)?;
    Some((lo, hi))
}

fn position(value: f64, lo: f64, hi: f64, width: usize) -> usize {
    if width < 2 || hi <= lo {
        return 0;
    }
    let pos = ((value - lo) / (hi - lo) * (width - 1) as f64).round();
    (pos.max(0.0) as usize).min(width - 1)
}

/// One text row of a horizontal box plot scaled to `lo..hi` over `width` cells.
pub fn box_line(series: &BoxSeries, lo: f64, hi: f64, width: usize, show_outliers: bool) -> String {
    let mut cells = vec![' '; width];
    if width == 0 {
        return String::new();
    }
    let pos = |v: f64| position(v, lo, hi, width);
    let (lw, q1, med, q3, uw) = (
        pos(series.lower_whisker),
        pos(series.q1),
        pos(series.median),
        pos(series.q3),
        pos(series.upper_whisker),
    );
    for cell in cells.iter_mut().take(uw + 1).skip(lw) {
        *cell = '─';
    }
    for cell in cells.iter_mut().take(q3 + 1).skip(q1) {
        *cell = '▒';
    }
    cells[lw] = '├';
    cells[uw] = '┤';
    cells[med] = '┃';
    if show_outliers {
        for v in series.outliers.iter() {
            cells[pos(*v)] = '•';
        }
    }
    cells.into_iter().collect()
}

fn axis_line(lo: f64, hi: f64, width: usize) -> Line<'static> {
    let left = crate::table::format_number((lo * 100.0).round() / 100.0);
    let right = crate::table::format_number((hi * 100.0).round() / 100.0);
    let gap = width.saturating_sub(left.chars().count() + right.chars().count());
    Line::from(format!("{left}{}{right}", " ".repeat(gap)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: [f64; 5], outliers: Vec<f64>) -> BoxSeries {
        let [lower_whisker, q1, median, q3, upper_whisker] = values;
        BoxSeries {
            label: String::from("A"),
            count: 10,
            min: outliers.iter().copied().fold(lower_whisker, f64::min),
            q1,
            median,
            q3,
            max: outliers.iter().copied().fold(upper_whisker, f64::max),
            lower_whisker,
            upper_whisker,
            outliers,
        }
    }

    #[test]
    fn draws_box_with_whiskers() {
        let s = series([0.0, 2.0, 5.0, 8.0, 10.0], vec![]);
        assert_eq!(box_line(&s, 0.0, 10.0, 11, true), "├─▒▒▒┃▒▒▒─┤");
    }

    #[test]
    fn outliers_are_optional() {
        let s = series([2.0, 3.0, 4.0, 5.0, 6.0], vec![10.0]);
        let (lo, hi) = plot_range(&[s.clone()], true).unwrap();
        assert_eq!((lo, hi), (2.0, 10.0));
        assert_eq!(box_line(&s, lo, hi, 9, true), "├▒┃▒┤   •");
        assert_eq!(box_line(&s, lo, hi, 9, false), "├▒┃▒┤    ");
        assert_eq!(plot_range(&[s], false), Some((2.0, 6.0)));
    }

    #[test]
    fn degenerate_range_stays_in_bounds() {
        let s = series([1.0, 1.0, 1.0, 1.0, 1.0], vec![]);
        assert_eq!(box_line(&s, 1.0, 1.0, 3, true), "┃  ");
        assert_eq!(box_line(&s, 1.0, 1.0, 0, true), "");
    }
}
