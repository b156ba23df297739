//! Repeated benchmark runs.
//!
//! Every repetition writes its logs into the same model `data/` directory, so
//! runs are strictly sequential and each run's logs are archived before the
//! next one starts.

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::derive::{mean, minimum, population_std};
use crate::errors::{BisectError, Result};
use crate::parse::{self, ReadOptions};
use crate::types::{RunResult, RunStatistics};

/// The side effects a repeated run needs from the outside world.
pub trait BenchmarkHost {
    /// Run the benchmark once, leaving its logs in the working directory.
    fn run_benchmark(&mut self) -> Result<()>;

    /// Copy the logs of the last run into `destination`.
    fn archive_logs(&mut self, destination: &Path) -> Result<()>;
}

/// Archive directory of repetition `run` under `log_dir`.
pub fn run_directory(log_dir: &Path, run: usize) -> PathBuf {
    log_dir.join(format!("run{:02}", run))
}

pub fn run_directories(log_dir: &Path, repeat: usize) -> Vec<PathBuf> {
    (0..repeat).map(|run| run_directory(log_dir, run)).collect()
}

impl RunStatistics {
    /// Mean, population standard deviation and minimum of `durations`.
    pub fn from_durations(durations: &[f64]) -> Result<RunStatistics> {
        if durations.is_empty() {
            return Err(BisectError::InvalidArguments(
                "no benchmark runs to summarise".to_string(),
            ));
        }
        Ok(RunStatistics {
            mean: mean(durations),
            std: population_std(durations),
            low: minimum(durations),
        })
    }
}

/// Run the benchmark `repeat` times, archiving each run's logs under
/// `log_dir/runNN`.
///
/// Stops at the first failed run.
pub fn run_repeated<H: BenchmarkHost>(
    host: &mut H,
    repeat: usize,
    log_dir: &Path,
) -> Result<(RunStatistics, Vec<RunResult>)> {
    if repeat == 0 {
        return Err(BisectError::InvalidArguments(
            "repeat must be at least 1".to_string(),
        ));
    }

    let mut results = Vec::with_capacity(repeat);
    for run in 0..repeat {
        let start = Instant::now();
        host.run_benchmark()?;
        let duration = start.elapsed().as_secs_f64();

        let destination = run_directory(log_dir, run);
        host.archive_logs(&destination)?;

        tracing::info!(run, duration, archive = %destination.display(), "benchmark run finished");
        results.push(RunResult {
            duration,
            table: None,
        });
    }

    let durations: Vec<f64> = results.iter().map(|r| r.duration).collect();
    let stats = RunStatistics::from_durations(&durations)?;
    Ok((stats, results))
}

/// Read the archived timing table of every repetition into its result.
///
/// Tables are named after their run directory.
pub fn read_run_tables(
    results: &mut [RunResult],
    log_dir: &Path,
    logfile: &str,
    nout: Option<usize>,
) -> Result<()> {
    let options = ReadOptions {
        nout,
        ..ReadOptions::default()
    };
    let dirs = run_directories(log_dir, results.len());
    for (dir, result) in dirs.iter().zip(results.iter_mut()) {
        result.table = Some(parse::read_timings_from_dir(dir, logfile, &options)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeHost {
        events: Vec<String>,
        fail_on_run: Option<usize>,
        runs: usize,
    }

    impl BenchmarkHost for FakeHost {
        fn run_benchmark(&mut self) -> Result<()> {
            let run = self.runs;
            self.runs += 1;
            self.events.push(format!("run {}", run));
            if self.fail_on_run == Some(run) {
                return Err(BisectError::RunFailure {
                    command: "./elm_pb".to_string(),
                });
            }
            Ok(())
        }

        fn archive_logs(&mut self, destination: &Path) -> Result<()> {
            self.events
                .push(format!("archive {}", destination.display()));
            Ok(())
        }
    }

    #[test]
    fn archives_after_every_run_before_the_next() {
        let mut host = FakeHost::default();
        let (_, results) = run_repeated(&mut host, 3, Path::new("logs/abc1234")).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(
            host.events,
            vec![
                "run 0",
                "archive logs/abc1234/run00",
                "run 1",
                "archive logs/abc1234/run01",
                "run 2",
                "archive logs/abc1234/run02",
            ]
        );
    }

    #[test]
    fn failed_run_aborts_without_archiving() {
        let mut host = FakeHost {
            fail_on_run: Some(1),
            ..FakeHost::default()
        };
        let err = run_repeated(&mut host, 3, Path::new("logs")).unwrap_err();
        assert!(err.is_skip());
        assert_eq!(host.events, vec!["run 0", "archive logs/run00", "run 1"]);
    }

    #[test]
    fn zero_repeats_is_rejected() {
        let mut host = FakeHost::default();
        assert!(matches!(
            run_repeated(&mut host, 0, Path::new("logs")),
            Err(BisectError::InvalidArguments(_))
        ));
        assert!(host.events.is_empty());
    }

    #[test]
    fn statistics_use_population_std() {
        let durations = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = RunStatistics::from_durations(&durations).unwrap();
        assert_eq!(stats.mean, 5.0);
        assert_eq!(stats.std, 2.0);
        assert_eq!(stats.low, 2.0);
    }

    #[test]
    fn run_directories_are_zero_padded() {
        let dirs = run_directories(Path::new("logs"), 11);
        assert_eq!(dirs[0], PathBuf::from("logs/run00"));
        assert_eq!(dirs[10], PathBuf::from("logs/run10"));
    }

    #[test]
    fn reads_one_table_per_run() {
        let tmp = tempfile::tempdir().unwrap();
        let log = "Sim Time | RHS evals | Wall Time | Inv\n\
                   0.0 | 1 | 0.1 | 0.0\n\
                   1.0 | 10 | 1.0 | 50.0\n";
        for dir in run_directories(tmp.path(), 2) {
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("BOUT.log.0"), log).unwrap();
        }

        let mut host = FakeHost::default();
        let (_, mut results) = run_repeated(&mut host, 2, tmp.path()).unwrap();
        read_run_tables(&mut results, tmp.path(), "BOUT.log.0", None).unwrap();

        let names: Vec<&str> = results
            .iter()
            .map(|r| r.table.as_ref().unwrap().name())
            .collect();
        assert_eq!(names, vec!["run00", "run01"]);
        let table = results[1].table.as_ref().unwrap();
        assert_eq!(table.column("Inv (absolute)").unwrap(), vec![0.5]);
    }

    #[test]
    fn missing_archive_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut results = vec![RunResult {
            duration: 1.0,
            table: None,
        }];
        let err = read_run_tables(&mut results, tmp.path(), "BOUT.log.0", None).unwrap_err();
        assert!(matches!(err, BisectError::Parse { .. }));
    }
}
