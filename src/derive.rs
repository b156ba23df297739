//! Per-RHS metrics derived from timing tables.
//!
//! Two different normalisations live here and must not be mixed up:
//! [`average_per_work_unit`] divides column totals, while
//! [`average_and_std_per_work_unit`] averages the per-row ratios. They agree
//! only when every row did the same amount of work.

use serde::Serialize;

use crate::errors::{BisectError, Result};
use crate::types::{MeanStd, Metric, MetricKind, NamedTable, RunStatistics, WALL_TIME, WORK_UNITS};

/// Column scored by [`MetricKind::InvPerRhs`].
pub const INV_ABSOLUTE: &str = "Inv (absolute)";

/// Columns shown by default when comparing runs.
pub const DEFAULT_COMPARE_COLUMNS: &[&str] = &[
    "Inv (absolute)",
    "Comm (absolute)",
    "SOLVER (absolute)",
    "Calc (absolute)",
    "Wall Time",
];

/// Total number of RHS evaluations in `table`.
pub fn total_work_units(table: &NamedTable) -> Result<f64> {
    Ok(table.column(WORK_UNITS)?.iter().sum())
}

/// Sum of `column` divided by the total number of RHS evaluations.
pub fn average_per_work_unit(table: &NamedTable, column: &str) -> Result<f64> {
    let total = table.column(column)?.iter().sum::<f64>();
    let work = total_work_units(table)?;
    if work == 0.0 {
        return Err(BisectError::DivisionByZero {
            table: table.name().to_string(),
        });
    }
    Ok(total / work)
}

/// Wall time per RHS evaluation.
pub fn time_per_work_unit(table: &NamedTable) -> Result<f64> {
    average_per_work_unit(table, WALL_TIME)
}

/// Mean and sample standard deviation of `column / RHS evals`, row by row.
///
/// The standard deviation is `NaN` with fewer than two rows.
pub fn average_and_std_per_work_unit(table: &NamedTable, column: &str) -> Result<MeanStd> {
    let values = table.column(column)?;
    let work = table.column(WORK_UNITS)?;

    if work.is_empty() || work.contains(&0.0) {
        return Err(BisectError::DivisionByZero {
            table: table.name().to_string(),
        });
    }

    let ratios: Vec<f64> = values.iter().zip(&work).map(|(v, w)| v / w).collect();
    Ok(MeanStd {
        mean: mean(&ratios),
        std: sample_std(&ratios),
    })
}

/// Score one metric for the current revision.
///
/// Runtime metrics come straight from `stats`. Per-RHS metrics take the best
/// run among `tables`, with the spread across runs as the noise estimate.
pub fn score(kind: MetricKind, stats: &RunStatistics, tables: &[NamedTable]) -> Result<Metric> {
    let (value, std) = match kind {
        MetricKind::RuntimeLow => (stats.low, stats.std),
        MetricKind::RuntimeMean => (stats.mean, stats.std),
        MetricKind::InvPerRhs | MetricKind::TimePerRhs => {
            if tables.is_empty() {
                return Err(BisectError::InvalidArguments(format!(
                    "metric {:?} needs at least one timing table",
                    kind
                )));
            }
            let per_run = tables
                .iter()
                .map(|t| match kind {
                    MetricKind::InvPerRhs => average_per_work_unit(t, INV_ABSOLUTE),
                    _ => time_per_work_unit(t),
                })
                .collect::<Result<Vec<f64>>>()?;
            (minimum(&per_run), population_std(&per_run))
        }
    };

    tracing::debug!(?kind, value, std, "scored metric");
    Ok(Metric { kind, value, std })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub mean: f64,
    pub std: f64,
}

/// Row-wise per-RHS statistics of several columns of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<ColumnSummary>,
}

/// Per-RHS mean and standard deviation of `columns` for each table, in
/// table order. This is what a grouped bar chart of the runs plots.
pub fn grouped_statistics<S: AsRef<str>>(
    tables: &[NamedTable],
    columns: &[S],
) -> Result<Vec<TableSummary>> {
    tables
        .iter()
        .map(|table| {
            let columns = columns
                .iter()
                .map(|c| {
                    let stats = average_and_std_per_work_unit(table, c.as_ref())?;
                    Ok(ColumnSummary {
                        column: c.as_ref().to_string(),
                        mean: stats.mean,
                        std: stats.std,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(TableSummary {
                name: table.name().to_string(),
                columns,
            })
        })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

pub(crate) fn minimum(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}
