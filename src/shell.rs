//! Build, run and git collaborators, all driven through `sh -c`.

use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use chrono::{DateTime, FixedOffset};

use crate::archive;
use crate::config::Config;
use crate::errors::{BisectError, Result};
use crate::runner::BenchmarkHost;
use crate::types::{GIT_DATE_FORMAT, GitInfo};

const SHORT_HASH_LEN: usize = 7;

fn shell_command(command: &str, dir: Option<&Path>) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }
    cmd
}

fn run_step(step: &str, command: &str, dir: Option<&Path>) -> Result<()> {
    tracing::info!(step, command, "running build step");
    let status = shell_command(command, dir).status();
    match status {
        Ok(s) if s.success() => Ok(()),
        _ => Err(BisectError::BuildFailure {
            step: step.to_string(),
            command: command.to_string(),
        }),
    }
}

fn capture(command: &str, dir: Option<&Path>) -> std::io::Result<(ExitStatus, String)> {
    let output = shell_command(command, dir)
        .stderr(Stdio::inherit())
        .output()?;
    Ok((
        output.status,
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

/// Return the source tree to a pristine state.
///
/// `distclean` may fail on an unconfigured tree; that is only logged.
pub fn cleanup(config: &Config) -> Result<()> {
    let commands = &config.commands;
    if let Err(e) = run_step("distclean", &commands.distclean, None) {
        tracing::warn!(error = %e, "ignoring distclean failure");
    }

    for dir in &commands.remove_dirs {
        match std::fs::remove_dir_all(dir) {
            Ok(()) => tracing::debug!(dir = %dir.display(), "removed directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "could not remove directory")
            }
        }
    }

    for command in &commands.clean {
        run_step("clean", command, None)?;
    }
    Ok(())
}

pub fn configure(config: &Config) -> Result<()> {
    println!("{}", config.commands.configure);
    run_step("configure", &config.commands.configure, None)
}

pub fn build(config: &Config) -> Result<()> {
    run_step("build", &config.commands.build, None)
}

/// Build the benchmark model inside its own directory.
pub fn build_model(config: &Config) -> Result<()> {
    run_step(
        "model build",
        &config.commands.model_build,
        Some(&config.model_path),
    )
}

/// Runs the model in `model_path` and archives its `data/` directory.
pub struct ShellHost<'a> {
    config: &'a Config,
    command: String,
}

impl<'a> ShellHost<'a> {
    pub fn new(config: &'a Config, nout: usize) -> Self {
        ShellHost {
            config,
            command: config.run_command(nout),
        }
    }
}

impl BenchmarkHost for ShellHost<'_> {
    fn run_benchmark(&mut self) -> Result<()> {
        tracing::debug!(
            command = %self.command,
            dir = %self.config.model_path.display(),
            "running benchmark"
        );
        let status = shell_command(&self.command, Some(&self.config.model_path))
            .stdout(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(()),
            _ => Err(BisectError::RunFailure {
                command: self.command.clone(),
            }),
        }
    }

    fn archive_logs(&mut self, destination: &Path) -> Result<()> {
        archive::backup_log_files(
            &self.config.model_data_dir(),
            destination,
            self.config.include_dump_files,
        )?;
        Ok(())
    }
}

/// Hash prefix and commit date of `HEAD`.
pub fn git_info() -> Result<GitInfo> {
    let hash = git_output("git rev-parse HEAD")?;
    let date = git_output("git --no-pager show -s --format=%ci")?;
    Ok(GitInfo {
        commit: short_hash(&hash)?,
        date: parse_git_date(&date)?,
    })
}

fn git_output(command: &str) -> Result<String> {
    match capture(command, None) {
        Ok((status, out)) if status.success() => Ok(out),
        Ok((status, _)) => Err(BisectError::Git {
            detail: format!("`{}` exited with {}", command, status),
        }),
        Err(e) => Err(BisectError::Git {
            detail: format!("`{}`: {}", command, e),
        }),
    }
}

fn short_hash(hash: &str) -> Result<String> {
    let hash = hash.trim();
    if hash.len() < SHORT_HASH_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BisectError::Git {
            detail: format!("unexpected commit hash {:?}", hash),
        });
    }
    Ok(hash[..SHORT_HASH_LEN].to_string())
}

fn parse_git_date(date: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(date.trim(), GIT_DATE_FORMAT).map_err(|e| BisectError::Git {
        detail: format!("unexpected commit date {:?}: {}", date.trim(), e),
    })
}

/// Run an external scoring script, returning its exit code and stdout.
///
/// A script killed by a signal reports exit code 1.
pub fn run_script(script: &str) -> Result<(i32, String)> {
    tracing::info!(script, "delegating verdict to script");
    let (status, out) = capture(script, None).map_err(|e| BisectError::RunFailure {
        command: format!("{}: {}", script, e),
    })?;
    Ok((status.code().unwrap_or(1), out))
}
