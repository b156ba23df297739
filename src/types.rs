use chrono::{DateTime, FixedOffset};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::errors::{BisectError, Result};

/// Row key of the timing table.
pub const SIM_TIME: &str = "Sim Time";
/// Number of RHS evaluations since the previous output step.
pub const WORK_UNITS: &str = "RHS evals";
pub const WALL_TIME: &str = "Wall Time";
pub const ABSOLUTE_SUFFIX: &str = " (absolute)";

/// Timestamp layout of `git show --format=%ci`.
pub const GIT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// One output step of the timing table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub sim_time: f64,
    /// One value per entry of `NamedTable::columns`.
    pub values: Vec<f64>,
}

/// A timing table tagged with the name of the run it came from.
///
/// Every row-selection method returns a new table carrying the same name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTable {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl NamedTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        NamedTable {
            name: name.into(),
            columns,
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column names, excluding the `Sim Time` key.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sim_times(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.sim_time).collect()
    }

    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| BisectError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// All values of `column`, in row order.
    pub fn column(&self, column: &str) -> Result<Vec<f64>> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(|r| r.values[idx]).collect())
    }

    /// Table without its first row (the initialisation step).
    pub fn drop_first(&self) -> NamedTable {
        NamedTable {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().skip(1).cloned().collect(),
        }
    }

    pub fn filter_rows<F>(&self, mut keep: F) -> NamedTable
    where
        F: FnMut(&Row) -> bool,
    {
        NamedTable {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Append a derived column. `values` must have one entry per row.
    pub(crate) fn push_column(&mut self, column: String, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(column);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values.push(value);
        }
    }
}

/// One repetition of the benchmark.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Wall-clock duration in seconds.
    pub duration: f64,
    pub table: Option<NamedTable>,
}

/// Summary of the wall-clock durations of all repetitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub low: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    /// Fastest repetition
    RuntimeLow,
    /// Mean over repetitions
    RuntimeMean,
    /// Laplacian inversion time per RHS evaluation
    #[value(alias = "inv_per_rhs")]
    InvPerRhs,
    /// Wall time per RHS evaluation
    #[value(alias = "time_per_rhs")]
    TimePerRhs,
}

impl MetricKind {
    pub fn needs_tables(self) -> bool {
        matches!(self, MetricKind::InvPerRhs | MetricKind::TimePerRhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metric {
    pub kind: MetricKind,
    pub value: f64,
    pub std: f64,
}

/// Mean and sample standard deviation of a row-wise ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Good,
    Bad,
    Skip,
}

/// Commit the working tree is currently at.
#[derive(Debug, Clone, PartialEq)]
pub struct GitInfo {
    /// First seven characters of the commit hash.
    pub commit: String,
    pub date: DateTime<FixedOffset>,
}

impl GitInfo {
    pub fn date_string(&self) -> String {
        self.date.format(GIT_DATE_FORMAT).to_string()
    }
}
