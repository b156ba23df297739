//! Append-only log of bisection steps.
//!
//! One comma-separated line per step:
//!
//! ```text
//! commit, date, mean, std, low, log_dir
//! commit, date, "script output", log_dir
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::errors::{BisectError, Result};
use crate::types::{GIT_DATE_FORMAT, GitInfo, RunStatistics};

const SEPARATOR: &str = ", ";

#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub commit: String,
    pub date: DateTime<FixedOffset>,
    pub stats: RunStatistics,
    pub log_dir: PathBuf,
}

impl TimingRecord {
    pub fn new(git: &GitInfo, stats: RunStatistics, log_dir: &Path) -> Self {
        TimingRecord {
            commit: git.commit.clone(),
            date: git.date,
            stats,
            log_dir: log_dir.to_path_buf(),
        }
    }

    /// Format as one line, without the trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{commit}, {date}, {mean}, {std}, {low}, {dir}",
            commit = self.commit,
            date = self.date.format(GIT_DATE_FORMAT),
            mean = self.stats.mean,
            std = self.stats.std,
            low = self.stats.low,
            dir = self.log_dir.display(),
        )
    }

    pub fn parse_line(line: &str) -> Result<TimingRecord> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.splitn(6, SEPARATOR).collect();
        if fields.len() != 6 {
            return Err(record_error(line, format!("expected 6 fields, found {}", fields.len())));
        }

        let number = |field: &str, what: &str| -> Result<f64> {
            field
                .trim()
                .parse()
                .map_err(|_| record_error(line, format!("{} {:?} is not a number", what, field)))
        };

        Ok(TimingRecord {
            commit: fields[0].trim().to_string(),
            date: parse_date(line, fields[1])?,
            stats: RunStatistics {
                mean: number(fields[2], "mean")?,
                std: number(fields[3], "std")?,
                low: number(fields[4], "low")?,
            },
            log_dir: PathBuf::from(fields[5]),
        })
    }
}

/// Outcome of delegating the verdict to an external script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRecord {
    pub commit: String,
    pub date: DateTime<FixedOffset>,
    pub result: String,
    pub log_dir: PathBuf,
}

impl ScriptRecord {
    pub fn new(git: &GitInfo, result: &str, log_dir: &Path) -> Self {
        ScriptRecord {
            commit: git.commit.clone(),
            date: git.date,
            result: result.trim_end_matches('\n').to_string(),
            log_dir: log_dir.to_path_buf(),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}, {}, \"{}\", {}",
            self.commit,
            self.date.format(GIT_DATE_FORMAT),
            self.result,
            self.log_dir.display()
        )
    }
}

fn parse_date(line: &str, field: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(field.trim(), GIT_DATE_FORMAT)
        .map_err(|e| record_error(line, format!("bad date {:?}: {}", field, e)))
}

fn record_error(line: &str, detail: String) -> BisectError {
    BisectError::Record {
        line: line.to_string(),
        detail,
    }
}

/// Append `line` to the file at `path`, creating it if needed.
pub fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

/// Read every timing record in `path`.
pub fn read_timing_records(path: &Path) -> Result<Vec<TimingRecord>> {
    let text = std::fs::read_to_string(path).map_err(|e| BisectError::Record {
        line: String::new(),
        detail: format!("cannot read {}: {}", path.display(), e),
    })?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(TimingRecord::parse_line)
        .collect()
}
