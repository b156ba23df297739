//! Extraction of the timing table embedded in a BOUT++ log file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{BisectError, Result};
use crate::types::{ABSOLUTE_SUFFIX, NamedTable, Row, SIM_TIME, WALL_TIME, WORK_UNITS};

/// Header line of the timing table starts with this.
pub const START_SENTINEL: &str = "Sim Time";
/// Printed once the simulation completes; ends the table.
pub const END_SENTINEL: &str = "Run finished";

pub const DEFAULT_LOGFILE: &str = "BOUT.log.0";

/// Directory name BOUT++ writes its output into. Never used as a table name.
pub const DEFAULT_DATA_DIR: &str = "data";

// Either " | " between columns or a run of two or more spaces.
static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\|\s+|\s{2,}").expect("separator regex is valid"));

const PERCENT_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Number of rows to read, including the initialisation row. `None` reads all.
    pub nout: Option<usize>,
    /// Drop the initialisation row, which skews per-step statistics.
    pub skip_first: bool,
    /// Table name. Inferred from the log's directory when `None`.
    pub name: Option<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            nout: None,
            skip_first: true,
            name: None,
        }
    }
}

/// Read `logfile` from `directory`.
pub fn read_timings_from_dir(
    directory: &Path,
    logfile: &str,
    options: &ReadOptions,
) -> Result<NamedTable> {
    read_timings(&directory.join(logfile), options)
}

/// Read the timing table from the log file at `path`.
///
/// Percentage columns get a companion `"<column> (absolute)"` column holding
/// the time in seconds.
pub fn read_timings(path: &Path, options: &ReadOptions) -> Result<NamedTable> {
    let text = fs::read_to_string(path).map_err(|e| BisectError::Parse {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let name = match &options.name {
        Some(name) => name.clone(),
        None => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            infer_name(dir)
        }
    };

    parse_timings(&text, path, name, options)
}

/// Parse a timing table out of the full text of a log file.
///
/// `path` is only used in error messages.
pub fn parse_timings(
    text: &str,
    path: &Path,
    name: String,
    options: &ReadOptions,
) -> Result<NamedTable> {
    let lines: Vec<&str> = text.lines().collect();

    // a log appended to by several runs holds several tables; the last one is current
    let start = lines
        .iter()
        .rposition(|l| l.starts_with(START_SENTINEL))
        .ok_or_else(|| BisectError::Parse {
            path: path.to_path_buf(),
            detail: format!("no line starting with {:?}", START_SENTINEL),
        })?;

    let header = split_fields(lines[start]);
    let key_idx = header
        .iter()
        .position(|h| *h == SIM_TIME)
        .ok_or_else(|| BisectError::Parse {
            path: path.to_path_buf(),
            detail: format!("cannot split header {:?}", lines[start]),
        })?;
    for required in [WORK_UNITS, WALL_TIME] {
        if !header.contains(&required) {
            return Err(BisectError::Parse {
                path: path.to_path_buf(),
                detail: format!("header has no {:?} column", required),
            });
        }
    }

    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != key_idx)
        .map(|(_, h)| h.to_string())
        .collect();

    let mut rows: Vec<Row> = Vec::new();
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        let lno = start + offset + 2;

        if line.starts_with(END_SENTINEL) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        if options.nout.is_some_and(|n| rows.len() >= n) {
            break;
        }

        let malformed = |detail: String| BisectError::MalformedRow {
            path: path.to_path_buf(),
            line: lno,
            detail,
        };

        let fields = split_fields(line);
        if fields.len() != header.len() {
            return Err(malformed(format!(
                "expected {} columns, found {} in {:?}",
                header.len(),
                fields.len(),
                line.trim()
            )));
        }

        let mut sim_time = 0.0;
        let mut values = Vec::with_capacity(columns.len());
        for (i, field) in fields.iter().enumerate() {
            let value: f64 = field
                .parse()
                .map_err(|_| malformed(format!("{:?} is not a number", field)))?;
            if !value.is_finite() {
                return Err(malformed(format!("{:?} is not a finite number", field)));
            }
            if i == key_idx {
                sim_time = value;
            } else {
                values.push(value);
            }
        }

        if let Some(prev) = rows.last()
            && sim_time <= prev.sim_time
        {
            return Err(malformed(format!(
                "{} {} does not follow {}",
                SIM_TIME, sim_time, prev.sim_time
            )));
        }

        rows.push(Row { sim_time, values });
    }

    let mut table = NamedTable::new(name, columns, rows);
    if options.skip_first {
        table = table.drop_first();
    }

    let percentages = percentage_columns(&table);
    warn_on_overfull_breakdown(&table, &percentages)?;
    append_absolute_columns(&mut table, &percentages)?;

    tracing::debug!(
        table = table.name(),
        rows = table.len(),
        path = %path.display(),
        "read timing table"
    );

    Ok(table)
}

fn split_fields(line: &str) -> Vec<&str> {
    SEPARATOR.split(line.trim()).collect()
}

/// Columns holding a percentage of the wall time.
pub fn percentage_columns(table: &NamedTable) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|c| *c != WORK_UNITS && *c != WALL_TIME && !c.ends_with(ABSOLUTE_SUFFIX))
        .cloned()
        .collect()
}

fn append_absolute_columns(table: &mut NamedTable, percentages: &[String]) -> Result<()> {
    let wall = table.column(WALL_TIME)?;
    for column in percentages {
        let absolute: Vec<f64> = table
            .column(column)?
            .iter()
            .zip(&wall)
            .map(|(pct, wall)| wall * (pct / 100.0))
            .collect();
        table.push_column(format!("{}{}", column, ABSOLUTE_SUFFIX), absolute);
    }
    Ok(())
}

fn warn_on_overfull_breakdown(table: &NamedTable, percentages: &[String]) -> Result<()> {
    let indices = percentages
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Result<Vec<_>>>()?;

    for row in table.rows() {
        let total: f64 = indices.iter().map(|&i| row.values[i]).sum();
        if total > 100.0 + PERCENT_TOLERANCE {
            tracing::warn!(
                table = table.name(),
                sim_time = row.sim_time,
                total,
                "percentage breakdown exceeds 100%"
            );
        }
    }
    Ok(())
}

/// Name a table after the directory its log lives in.
///
/// The directory is made absolute first so that `.` resolves to something
/// meaningful.
pub fn infer_name(directory: &Path) -> String {
    let resolved: PathBuf = fs::canonicalize(directory)
        .or_else(|_| std::path::absolute(directory))
        .unwrap_or_else(|_| directory.to_path_buf());
    name_from_dir(&resolved)
}

/// Last component of `directory`, or of its parent when the last component
/// is the generic `data` directory.
pub fn name_from_dir(directory: &Path) -> String {
    let last = directory.file_name();
    let chosen = match last {
        Some(n) if n == DEFAULT_DATA_DIR => directory.parent().and_then(|p| p.file_name()),
        other => other,
    };
    match chosen {
        Some(n) => n.to_string_lossy().into_owned(),
        None => directory.display().to_string(),
    }
}
