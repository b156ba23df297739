use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{BisectError, Result};

const CONFIG_DIR_NAME: &str = "perf-bisect";
const CONFIG_FILE_NAME: &str = "config.toml";

const DEFAULT_CONFIGURE: &str = "./configure -C \
CXXFLAGS='-std=c++11 -fdiagnostics-color=always' \
--with-netcdf --enable-optimize=3 --enable-checks=no \
--disable-backtrace";

/// Settings for one bisection step. Every field has a default, so a config
/// file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory of the benchmark model, relative to the repository root.
    pub model_path: PathBuf,
    /// Model executable inside `model_path`.
    pub model: String,
    pub nprocs: usize,
    pub nout: usize,
    pub repeat: usize,
    /// Root of the per-commit log archive.
    pub log_dir: PathBuf,
    /// Output directory of the model, relative to `model_path`.
    pub data_dir: PathBuf,
    pub logfile: String,
    pub timings_file: PathBuf,
    pub script_log_file: PathBuf,
    /// Also archive `BOUT.dmp.*` files.
    pub include_dump_files: bool,
    pub commands: CommandConfig,
}

/// Shell command lines for the build and run collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandConfig {
    /// Allowed to fail: a fresh checkout has nothing to clean.
    pub distclean: String,
    pub remove_dirs: Vec<PathBuf>,
    pub clean: Vec<String>,
    pub configure: String,
    pub build: String,
    /// Builds the model itself, run inside `model_path`.
    pub model_build: String,
    /// `{nprocs}`, `{model}` and `{nout}` are substituted.
    pub run: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model_path: PathBuf::from("./work_models/elm_pb"),
            model: "elm_pb".to_string(),
            nprocs: 4,
            nout: 100,
            repeat: 5,
            log_dir: PathBuf::from("logs"),
            data_dir: PathBuf::from("data"),
            logfile: "BOUT.log.0".to_string(),
            timings_file: PathBuf::from("bisect_timings"),
            script_log_file: PathBuf::from("bisect_script_log"),
            include_dump_files: true,
            commands: CommandConfig::default(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        CommandConfig {
            distclean: "make distclean".to_string(),
            remove_dirs: vec![
                PathBuf::from("googletest"),
                PathBuf::from("externalpackages/googletest"),
                PathBuf::from("externalpackages/mpark.variant"),
            ],
            clean: vec![
                r#"find src -type f -name "*\.o" -delete"#.to_string(),
                "git submodule update --init --recursive".to_string(),
            ],
            configure: DEFAULT_CONFIGURE.to_string(),
            build: "make -j8".to_string(),
            model_build: "make".to_string(),
            run: "mpirun -n {nprocs} ./{model} NOUT={nout}".to_string(),
        }
    }
}

impl Config {
    /// Load `path`, or the user config file if it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(p) => Config::from_file(p),
            None => match default_config_path() {
                Some(p) if p.is_file() => Config::from_file(&p),
                _ => Ok(Config::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|e| BisectError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let config = toml::from_str(&text).map_err(|e| BisectError::Config {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Benchmark command line for `nout` output steps.
    pub fn run_command(&self, nout: usize) -> String {
        self.commands
            .run
            .replace("{nprocs}", &self.nprocs.to_string())
            .replace("{model}", &self.model)
            .replace("{nout}", &nout.to_string())
    }

    /// Directory the model writes its logs into.
    pub fn model_data_dir(&self) -> PathBuf {
        self.model_path.join(&self.data_dir)
    }
}

/// `<config dir>/perf-bisect/config.toml`, e.g. `~/.config/perf-bisect/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
