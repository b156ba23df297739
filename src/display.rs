use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;

use crate::derive::TableSummary;
use crate::record::TimingRecord;
use crate::types::{ABSOLUTE_SUFFIX, GIT_DATE_FORMAT, Metric, RunStatistics, Verdict};

/// Column heading without the " (absolute)" suffix.
pub fn short_column_name(column: &str) -> &str {
    column.strip_suffix(ABSOLUTE_SUFFIX).unwrap_or(column)
}

fn format_cell(mean: f64, std: f64) -> String {
    format!("{:.3e} ± {:.1e}", mean, std)
}

fn style_header() -> Style {
    Style::new().cyan().bold()
}

/// Aligned table of per-RHS means and standard deviations, one line per
/// table. `legend` replaces the table names when given.
pub fn format_comparison(summaries: &[TableSummary], legend: Option<&[String]>) -> String {
    let mut out = String::new();

    let title = "Average time per RHS evaluation (seconds):";
    out.push_str(
        &title
            .if_supports_color(Stream::Stdout, |s| s.dimmed())
            .to_string(),
    );
    out.push_str("\n\n");

    let Some(first) = summaries.first() else {
        return out;
    };

    let labels: Vec<String> = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| {
            legend
                .and_then(|l| l.get(i))
                .cloned()
                .unwrap_or_else(|| s.name.clone())
        })
        .collect();
    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);

    let cells: Vec<Vec<String>> = summaries
        .iter()
        .map(|s| s.columns.iter().map(|c| format_cell(c.mean, c.std)).collect())
        .collect();

    let widths: Vec<usize> = first
        .columns
        .iter()
        .enumerate()
        .map(|(j, c)| {
            cells
                .iter()
                .filter_map(|row| row.get(j))
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(short_column_name(&c.column).len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header_style = style_header();
    let mut header = format!("{:<width$}", "", width = label_width);
    for (c, width) in first.columns.iter().zip(&widths) {
        header.push_str(&format!("  {:>width$}", short_column_name(&c.column), width = width));
    }
    out.push_str(
        &header
            .if_supports_color(Stream::Stdout, |s| s.style(header_style))
            .to_string(),
    );
    out.push('\n');

    for (label, row) in labels.iter().zip(&cells) {
        let padded = format!("{:<width$}", label, width = label_width);
        out.push_str(
            &padded
                .if_supports_color(Stream::Stdout, |s| s.green())
                .to_string(),
        );
        for (cell, width) in row.iter().zip(&widths) {
            let pad = width.saturating_sub(cell.chars().count());
            out.push_str(&format!("  {}{}", " ".repeat(pad), cell));
        }
        out.push('\n');
    }

    out
}

pub fn format_comparison_json(summaries: &[TableSummary]) -> String {
    serde_json::to_string_pretty(summaries).unwrap_or_else(|_| "[]".to_string())
}

/// Recorded steps in commit-date order. The fastest `low` is highlighted.
pub fn format_history(records: &[TimingRecord]) -> String {
    let mut sorted: Vec<&TimingRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.date);

    let fastest = sorted
        .iter()
        .map(|r| r.stats.low)
        .fold(f64::INFINITY, f64::min);

    let mut out = String::new();
    let header = format!(
        "{:<8}  {:<25}  {:>10}  {:>10}  {:>10}",
        "commit", "date", "mean", "std", "low"
    );
    out.push_str(
        &header
            .if_supports_color(Stream::Stdout, |s| s.style(style_header()))
            .to_string(),
    );
    out.push('\n');

    for record in sorted {
        let low = format!("{:>10.4}", record.stats.low);
        let low = if record.stats.low == fastest {
            low.if_supports_color(Stream::Stdout, |s| s.green()).to_string()
        } else {
            low
        };
        out.push_str(&format!(
            "{:<8}  {:<25}  {:>10.4}  {:>10.4}  {}\n",
            record.commit,
            record.date.format(GIT_DATE_FORMAT).to_string(),
            record.stats.mean,
            record.stats.std,
            low
        ));
    }
    out
}

/// One-line human summary of a scored step.
pub fn format_verdict(metric: &Metric, verdict: Verdict) -> String {
    let verdict_str = match verdict {
        Verdict::Good => "good"
            .if_supports_color(Stream::Stdout, |s| s.green())
            .to_string(),
        Verdict::Bad => "bad"
            .if_supports_color(Stream::Stdout, |s| s.red())
            .to_string(),
        Verdict::Skip => "skip"
            .if_supports_color(Stream::Stdout, |s| s.yellow())
            .to_string(),
    };
    format!(
        "{:?}: {} (std {}) -> {}",
        metric.kind, metric.value, metric.std, verdict_str
    )
}

/// JSON report of one bisection step.
#[derive(Serialize)]
struct JsonStep<'a> {
    commit: &'a str,
    date: String,
    runtime: &'a RunStatistics,
    metric: Option<&'a Metric>,
    verdict: Option<Verdict>,
    log_dir: String,
}

pub fn format_step_json(
    commit: &str,
    date: String,
    runtime: &RunStatistics,
    metric: Option<&Metric>,
    verdict: Option<Verdict>,
    log_dir: &std::path::Path,
) -> String {
    let step = JsonStep {
        commit,
        date,
        runtime,
        metric,
        verdict,
        log_dir: log_dir.display().to_string(),
    };
    serde_json::to_string_pretty(&step).unwrap_or_else(|_| "{}".to_string())
}
