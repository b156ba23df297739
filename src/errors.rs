use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, BisectError>;

#[derive(thiserror::Error, Debug)]
pub enum BisectError {
    #[error("Failed to read timing table from {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("Malformed timing row at {path}:{line}: {detail}")]
    MalformedRow {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    #[error("Column '{column}' not found in timing table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("No work units recorded in timing table '{table}'")]
    DivisionByZero { table: String },

    #[error("Build step '{step}' failed: {command}")]
    BuildFailure { step: String, command: String },

    #[error("Benchmark run failed: {command}")]
    RunFailure { command: String },

    #[error("Could not read git metadata: {detail}")]
    Git { detail: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Could not parse bisection record {line:?}: {detail}")]
    Record { line: String, detail: String },

    #[error("Failed to archive logs into {path}: {source}")]
    Archive {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to load config {path}: {detail}")]
    Config { path: PathBuf, detail: String },
}

impl BisectError {
    /// Build and run failures mean the revision could not be measured at all.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            BisectError::BuildFailure { .. } | BisectError::RunFailure { .. }
        )
    }
}
