//! End-of-run summary printed to the terminal.

use comfy_table::{
    presets,
    Attribute,
    Cell,
    CellAlignment,
    Color,
    ContentArrangement,
    Table,
};
use multi_sampler_collector::{
    CollectorSummary,
    ResultTable,
    SessionReport,
    ShutdownReason,
};
use std::path::Path;

pub fn render(report: &SessionReport, output: &Path) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Source").add_attribute(Attribute::Bold),
            Cell::new("Samples").add_attribute(Attribute::Bold),
            Cell::new("Absent").add_attribute(Attribute::Bold),
            Cell::new("Last value").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ]);

    for summary in &report.collectors {
        table.add_row(vec![
            Cell::new(&summary.name).add_attribute(Attribute::Bold),
            Cell::new(summary.samples).set_alignment(CellAlignment::Right),
            Cell::new(summary.absent)
                .set_alignment(CellAlignment::Right)
                .fg(absent_color(summary)),
            Cell::new(format_value(summary.last_value)).set_alignment(CellAlignment::Right),
            status_cell(summary),
        ]);
    }

    let reason = match &report.reason {
        ShutdownReason::CollectorExited { .. } => format!("Stopped early: {}", report.reason),
        reason => format!("Stopped: {reason}"),
    };
    format!(
        "{table}\n{reason} after {}. {} rows written to {}",
        humanize(report.elapsed),
        report.table.row_count(),
        output.display()
    )
}

/// The merged rows, cut down to the first and last `edge` rows of a long run.
pub fn render_rows(table: &ResultTable, edge: usize) -> String {
    let mut rendered = Table::new();
    rendered
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            table
                .column_names()
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        );

    let rows = table.row_count();
    let row = |index: usize| {
        table
            .columns()
            .iter()
            .map(|column| Cell::new(column.data.cell(index)).set_alignment(CellAlignment::Right))
            .collect::<Vec<_>>()
    };

    if rows <= edge * 2 {
        for index in 0..rows {
            rendered.add_row(row(index));
        }
    } else {
        for index in 0..edge {
            rendered.add_row(row(index));
        }
        rendered.add_row(table.columns().iter().map(|_| Cell::new("…").set_alignment(CellAlignment::Center)));
        for index in rows - edge..rows {
            rendered.add_row(row(index));
        }
    }

    rendered.to_string()
}

fn status_cell(summary: &CollectorSummary) -> Cell {
    match &summary.failure {
        Some(failure) => Cell::new(format!("failed: {failure}")).fg(Color::Red),
        None => Cell::new("ok").fg(Color::Green),
    }
}

fn absent_color(summary: &CollectorSummary) -> Color {
    match summary.absent {
        0 => Color::Green,
        absent if absent == summary.samples => Color::Red,
        _ => Color::Yellow,
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.4}"),
        None => "-".to_string(),
    }
}

/// Elapsed time rounded to whole seconds.
fn humanize(elapsed: std::time::Duration) -> String {
    let secs = std::time::Duration::from_secs(elapsed.as_secs_f64().round() as u64);
    humantime::format_duration(secs).to_string()
}
