use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use perf_bisect::classify::{self, ABORT_EXIT_CODE, DEFAULT_FACTOR};
use perf_bisect::config::Config;
use perf_bisect::derive::{self, DEFAULT_COMPARE_COLUMNS};
use perf_bisect::display;
use perf_bisect::errors::BisectError;
use perf_bisect::parse::{self, ReadOptions};
use perf_bisect::record::{self, ScriptRecord, TimingRecord};
use perf_bisect::runner;
use perf_bisect::shell::{self, ShellHost};
use perf_bisect::types::{MetricKind, NamedTable, Verdict};

#[derive(Parser)]
#[command(
    name = "perf-bisect",
    version,
    about = "git bisect helper for performance regressions"
)]
struct Cli {
    /// Print debug logging to stderr
    #[arg(long, global = true)]
    debug: bool,

    /// Config file [default: ~/.config/perf-bisect/config.toml if present]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, benchmark and score the current commit (for `git bisect run`)
    Run(RunArgs),

    /// Compare per-RHS timings of the logs in several directories
    Compare(CompareArgs),

    /// Show the steps recorded in the bisection log
    History {
        /// Bisection log [default: timings_file from the config]
        file: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Number of timesteps (per-RHS metrics read this many log rows, including row 0)
    #[arg(long)]
    nout: Option<usize>,

    /// Don't clean library
    #[arg(long = "no-clean", action = ArgAction::SetFalse)]
    clean: bool,

    /// Don't configure library
    #[arg(long = "no-configure", action = ArgAction::SetFalse)]
    configure: bool,

    /// Don't build library
    #[arg(long = "no-make", action = ArgAction::SetFalse)]
    make: bool,

    /// Don't write to the bisection log
    #[arg(long = "no-write", action = ArgAction::SetFalse)]
    write: bool,

    /// Don't clean/configure/build/write
    #[arg(long)]
    just_run: bool,

    /// Number of repeat runs
    #[arg(long)]
    repeat: Option<usize>,

    /// Metric value of a known good commit
    #[arg(long, allow_negative_numbers = true)]
    good: Option<f64>,

    /// Metric value of a known bad commit
    #[arg(long, allow_negative_numbers = true)]
    bad: Option<f64>,

    /// Fraction of the good/bad gap still considered good
    #[arg(long, default_value_t = DEFAULT_FACTOR)]
    factor: f64,

    /// Metric to score
    #[arg(long, value_enum, default_value_t = MetricKind::RuntimeLow)]
    metric: MetricKind,

    /// Path to model
    #[arg(long)]
    path: Option<PathBuf>,

    /// Model executable
    #[arg(long)]
    model: Option<String>,

    /// Number of MPI processes
    #[arg(long)]
    nprocs: Option<usize>,

    /// Backup log file directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Other script to run to determine good/bad
    #[arg(long)]
    script: Option<String>,

    /// Print the step as JSON instead of the log line
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CompareArgs {
    /// Directories containing a log file each
    #[arg(required = true)]
    dirs: Vec<PathBuf>,

    /// Log file name inside each directory
    #[arg(long, default_value = parse::DEFAULT_LOGFILE)]
    logfile: String,

    /// Number of timesteps to read [default: all]
    #[arg(long)]
    nout: Option<usize>,

    /// Keep the initialisation step
    #[arg(long)]
    keep_first: bool,

    /// Only use steps after this simulation time
    #[arg(long, allow_negative_numbers = true)]
    after: Option<f64>,

    /// Columns to compare, comma separated
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,

    /// Labels to use instead of the directory names, comma separated
    #[arg(long, value_delimiter = ',')]
    legend: Vec<String>,

    #[arg(long)]
    json: bool,
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Reject invocations that would waste a build and run cycle.
fn validate(args: &RunArgs) -> perf_bisect::errors::Result<()> {
    if args.good.is_some() != args.bad.is_some() {
        return Err(BisectError::InvalidArguments(
            "You must supply either both of --good and --bad, or neither".to_string(),
        ));
    }
    if !(args.factor > 0.0 && args.factor <= 1.0) {
        return Err(BisectError::InvalidArguments(format!(
            "--factor must be in (0, 1], got {}",
            args.factor
        )));
    }
    if args.repeat == Some(0) {
        return Err(BisectError::InvalidArguments(
            "--repeat must be at least 1".to_string(),
        ));
    }
    if let (Some(good), Some(bad)) = (args.good, args.bad)
        && good >= bad
    {
        tracing::warn!(good, bad, "--good should be smaller than --bad");
    }
    Ok(())
}

fn apply_overrides(mut config: Config, args: &RunArgs) -> Config {
    if let Some(nout) = args.nout {
        config.nout = nout;
    }
    if let Some(repeat) = args.repeat {
        config.repeat = repeat;
    }
    if let Some(path) = &args.path {
        config.model_path = path.clone();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(nprocs) = args.nprocs {
        config.nprocs = nprocs;
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = log_dir.clone();
    }
    config
}

fn bisect_step(mut args: RunArgs, config: Config) -> Result<u8> {
    validate(&args)?;

    if args.just_run {
        args.clean = false;
        args.configure = false;
        args.make = false;
        args.write = false;
    }

    let config = apply_overrides(config, &args);

    let git = shell::git_info()?;
    let log_dir = config.log_dir.join(&git.commit);
    tracing::info!(commit = %git.commit, log_dir = %log_dir.display(), "bisection step");

    if args.clean {
        shell::cleanup(&config)?;
    }
    if args.configure {
        shell::configure(&config)?;
    }
    if args.make {
        shell::build(&config)?;
    }
    shell::build_model(&config)?;

    let mut host = ShellHost::new(&config, config.nout);
    let (stats, mut results) = runner::run_repeated(&mut host, config.repeat, &log_dir)?;

    if let Some(script) = &args.script {
        let (code, output) = shell::run_script(script)?;
        let line = ScriptRecord::new(&git, &output, &log_dir).to_line();
        println!("{}", line);
        if args.write {
            record::append_line(&config.script_log_file, &line).with_context(|| {
                format!("append to {}", config.script_log_file.display())
            })?;
        }
        return Ok(code.clamp(0, 255) as u8);
    }

    let line = TimingRecord::new(&git, stats, &log_dir).to_line();
    if !args.json {
        println!("{}", line);
    }
    if args.write {
        record::append_line(&config.timings_file, &line)
            .with_context(|| format!("append to {}", config.timings_file.display()))?;
    }

    let (Some(good), Some(bad)) = (args.good, args.bad) else {
        if args.json {
            let step = display::format_step_json(
                &git.commit,
                git.date_string(),
                &stats,
                None,
                None,
                &log_dir,
            );
            println!("{}", step);
        }
        return Ok(0);
    };

    if args.metric.needs_tables() {
        runner::read_run_tables(&mut results, &log_dir, &config.logfile, Some(config.nout))?;
    }
    let tables: Vec<NamedTable> = results.into_iter().filter_map(|r| r.table).collect();

    let metric = derive::score(args.metric, &stats, &tables)?;
    let verdict = classify::verdict_for(good, bad, &metric, args.factor);

    if args.json {
        println!(
            "{}",
            display::format_step_json(
                &git.commit,
                git.date_string(),
                &stats,
                Some(&metric),
                Some(verdict),
                &log_dir
            )
        );
    } else {
        println!("{}", display::format_verdict(&metric, verdict));
    }

    Ok(verdict.exit_code())
}

fn compare(args: CompareArgs) -> Result<u8> {
    if !args.legend.is_empty() && args.legend.len() != args.dirs.len() {
        return Err(BisectError::InvalidArguments(format!(
            "--legend has {} labels for {} directories",
            args.legend.len(),
            args.dirs.len()
        ))
        .into());
    }

    let options = ReadOptions {
        nout: args.nout,
        skip_first: !args.keep_first,
        name: None,
    };
    let tables = args
        .dirs
        .iter()
        .map(|dir| parse::read_timings_from_dir(dir, &args.logfile, &options))
        .map(|table| match args.after {
            Some(after) => table.map(|t| t.filter_rows(|row| row.sim_time > after)),
            None => table,
        })
        .collect::<perf_bisect::errors::Result<Vec<_>>>()?;

    let columns: Vec<String> = if args.columns.is_empty() {
        DEFAULT_COMPARE_COLUMNS.iter().map(|c| c.to_string()).collect()
    } else {
        args.columns
    };

    let summaries = derive::grouped_statistics(&tables, &columns)?;
    if args.json {
        println!("{}", display::format_comparison_json(&summaries));
    } else {
        let legend = (!args.legend.is_empty()).then_some(args.legend.as_slice());
        print!("{}", display::format_comparison(&summaries, legend));
    }
    Ok(0)
}

fn history(file: Option<PathBuf>, config: &Config) -> Result<u8> {
    let path = file.unwrap_or_else(|| config.timings_file.clone());
    let records = record::read_timing_records(&path)?;
    print!("{}", display::format_history(&records));
    Ok(0)
}

fn run(cli: Cli) -> Result<u8> {
    let config = Config::load(cli.config.as_deref())?;
    match cli.cmd {
        Commands::Run(args) => bisect_step(args, config),
        Commands::Compare(args) => compare(args),
        Commands::History { file } => history(file, &config),
    }
}

fn main() -> ExitCode {
    // clap's own usage errors exit with 2, which `git bisect run` reads as "bad"
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(ABORT_EXIT_CODE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(cli.debug);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{:#}", err);
            let skip = err
                .downcast_ref::<BisectError>()
                .is_some_and(BisectError::is_skip);
            ExitCode::from(if skip {
                Verdict::Skip.exit_code()
            } else {
                ABORT_EXIT_CODE
            })
        }
    }
}
