use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Command with an empty HOME so no user config file is picked up.
fn perf_bisect_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("perf-bisect").unwrap();
    cmd.env("HOME", home.path());
    cmd.env_remove("XDG_CONFIG_HOME");
    cmd.env_remove("RUST_LOG");
    cmd.env("NO_COLOR", "1");
    cmd
}

fn git(repo: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args([
            "-c",
            "user.name=Bisect Test",
            "-c",
            "user.email=bisect@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(repo)
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// A git repository with one commit, a model directory, and a config whose
/// benchmark copies `log` into the model's data directory.
fn setup_repo(run: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path();
    git(repo, &["init", "-q"]);
    git(repo, &["commit", "-q", "--allow-empty", "-m", "initial"]);

    let model = repo.join("model");
    fs::create_dir_all(&model).unwrap();

    let config = format!(
        "model_path = '{model}'\n\
         log_dir = '{logs}'\n\
         repeat = 3\n\
         \n\
         [commands]\n\
         model_build = 'true'\n\
         run = '''{run}'''\n",
        model = model.display(),
        logs = repo.join("logs").display(),
        run = run,
    );
    fs::write(repo.join("perf-bisect.toml"), config).unwrap();
    tmp
}

fn copy_fixture_run() -> String {
    format!(
        "mkdir -p data && cp '{}' data/BOUT.log.0",
        fixture("v4.3.0/data/BOUT.log.0").display()
    )
}

fn run_in_repo(repo: &TempDir) -> Command {
    let mut cmd = perf_bisect_cmd(repo);
    cmd.current_dir(repo.path());
    cmd.args(["run", "--config", "perf-bisect.toml"]);
    cmd.args(["--no-clean", "--no-configure", "--no-make"]);
    cmd
}

// ---- argument validation ----

#[test]
fn help_succeeds() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("compare"));
}

#[test]
fn good_without_bad_aborts_before_building() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .current_dir(home.path())
        .args(["run", "--good", "10"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("both of --good and --bad"));
}

#[test]
fn factor_out_of_range_aborts() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .current_dir(home.path())
        .args(["run", "--good", "10", "--bad", "20", "--factor", "1.5"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("--factor"));
}

#[test]
fn unknown_flag_aborts_instead_of_marking_bad() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .args(["run", "--frobnicate"])
        .assert()
        .code(255);
}

#[test]
fn unknown_metric_is_rejected() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .args(["run", "--metric", "flops"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("runtime-low"));
}

// ---- compare ----

#[test]
fn compare_prints_aligned_table() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .arg("compare")
        .arg(fixture("v4.3.0/data"))
        .arg(fixture("next"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Average time per RHS evaluation"))
        .stdout(predicate::str::contains("v4.3.0"))
        .stdout(predicate::str::contains("next"))
        .stdout(predicate::str::contains("SOLVER"))
        .stdout(predicate::str::contains("(absolute)").not());
}

#[test]
fn compare_json_reports_row_wise_statistics() {
    let home = TempDir::new().unwrap();
    let output = perf_bisect_cmd(&home)
        .args(["compare", "--json", "--columns", "Wall Time,Inv (absolute)"])
        .arg(fixture("v4.3.0/data"))
        .arg(fixture("next"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("output should be JSON");
    let arr = parsed.as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["name"], "v4.3.0");
    assert_eq!(arr[1]["name"], "next");

    let wall = &arr[1]["columns"][0];
    assert_eq!(wall["column"], "Wall Time");
    assert!((wall["mean"].as_f64().unwrap() - 0.005).abs() < 1e-12);

    let inv = &arr[1]["columns"][1];
    assert!((inv["mean"].as_f64().unwrap() - 0.0005).abs() < 1e-12);
}

#[test]
fn compare_after_restricts_rows() {
    let home = TempDir::new().unwrap();
    let output = perf_bisect_cmd(&home)
        .args(["compare", "--json", "--columns", "Wall Time", "--after", "2.5"])
        .arg(fixture("next"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let wall = &parsed[0]["columns"][0];
    assert!((wall["mean"].as_f64().unwrap() - 0.005).abs() < 1e-12);
    // a single row has no sample spread
    assert!(wall["std"].is_null());
}

#[test]
fn compare_legend_replaces_names() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .args(["compare", "--legend", "before,after"])
        .arg(fixture("v4.3.0/data"))
        .arg(fixture("next"))
        .assert()
        .success()
        .stdout(predicate::str::contains("before"))
        .stdout(predicate::str::contains("after"));
}

#[test]
fn compare_legend_length_must_match() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .args(["compare", "--legend", "only-one"])
        .arg(fixture("v4.3.0/data"))
        .arg(fixture("next"))
        .assert()
        .code(255)
        .stderr(predicate::str::contains("--legend"));
}

#[test]
fn compare_missing_log_aborts() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .arg("compare")
        .arg(home.path())
        .assert()
        .code(255)
        .stderr(predicate::str::contains("Failed to read timing table"));
}

// ---- run ----

#[test]
fn run_without_references_records_timings() {
    let repo = setup_repo(&copy_fixture_run());
    run_in_repo(&repo).assert().code(0);

    let timings = fs::read_to_string(repo.path().join("bisect_timings")).unwrap();
    let lines: Vec<&str> = timings.lines().collect();
    assert_eq!(lines.len(), 1);
    let fields: Vec<&str> = lines[0].split(", ").collect();
    assert_eq!(fields.len(), 6);
    assert_eq!(fields[0].len(), 7);

    let log_dir = PathBuf::from(fields[5]);
    for run in ["run00", "run01", "run02"] {
        assert!(log_dir.join(run).join("BOUT.log.0").is_file(), "{} not archived", run);
    }
}

#[test]
fn history_lists_recorded_steps() {
    let repo = setup_repo(&copy_fixture_run());
    run_in_repo(&repo).assert().code(0);
    run_in_repo(&repo).assert().code(0);

    let output = perf_bisect_cmd(&repo)
        .current_dir(repo.path())
        .args(["history", "--config", "perf-bisect.toml"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 3);
    assert!(stdout.lines().next().unwrap().contains("commit"));
}

#[test]
fn history_of_missing_log_aborts() {
    let home = TempDir::new().unwrap();
    perf_bisect_cmd(&home)
        .current_dir(home.path())
        .arg("history")
        .assert()
        .code(255)
        .stderr(predicate::str::contains("bisect_timings"));
}

#[test]
fn run_scores_time_per_rhs_as_good() {
    let repo = setup_repo(&copy_fixture_run());
    // 0.69 s / 187 RHS evals ~ 0.00369 s, below the 0.004 midpoint
    run_in_repo(&repo)
        .args(["--metric", "time-per-rhs", "--good", "0.003", "--bad", "0.005"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("good"));
}

#[test]
fn run_scores_time_per_rhs_as_bad() {
    let repo = setup_repo(&copy_fixture_run());
    run_in_repo(&repo)
        .args(["--metric", "time_per_rhs", "--good", "0.001", "--bad", "0.002"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("bad"));
}

#[test]
fn just_run_does_not_write_timings() {
    let repo = setup_repo(&copy_fixture_run());
    run_in_repo(&repo).arg("--just-run").assert().code(0);
    assert!(!repo.path().join("bisect_timings").exists());
}

#[test]
fn run_json_reports_step() {
    let repo = setup_repo(&copy_fixture_run());
    let output = run_in_repo(&repo)
        .args(["--json", "--metric", "inv-per-rhs", "--good", "1", "--bad", "2"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed["verdict"], "good");
    assert_eq!(parsed["metric"]["kind"], "inv-per-rhs");
    assert!(parsed["runtime"]["low"].as_f64().unwrap() >= 0.0);
}

#[test]
fn nout_limits_rows_scored_per_rhs() {
    let repo = setup_repo(&copy_fixture_run());
    let output = run_in_repo(&repo)
        .args(["--json", "--metric", "time-per-rhs", "--good", "1", "--bad", "2"])
        .args(["--nout", "2"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    // two rows including the initialisation row leave only the first step
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let value = parsed["metric"]["value"].as_f64().unwrap();
    assert!((value - 0.227 / 62.0).abs() < 1e-12, "scored {}", value);
}

#[test]
fn failing_benchmark_is_skipped() {
    let repo = setup_repo("false");
    run_in_repo(&repo)
        .args(["--good", "1", "--bad", "2"])
        .assert()
        .code(125)
        .stderr(predicate::str::contains("Benchmark run failed"));
    assert!(!repo.path().join("bisect_timings").exists());
}

#[test]
fn script_decides_verdict() {
    let repo = setup_repo(&copy_fixture_run());
    run_in_repo(&repo)
        .args(["--script", "echo 'slower by 3%'; exit 1"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"slower by 3%\""));

    let log = fs::read_to_string(repo.path().join("bisect_script_log")).unwrap();
    assert!(log.contains("\"slower by 3%\""));
    assert!(!repo.path().join("bisect_timings").exists());
}
