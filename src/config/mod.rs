//! Project-level configuration support
//!
//! Loads per-project configuration from `ts-bench.toml` or `.ts-bench.json`
//! in the repository root. Environment variables override the file, and
//! command-line flags override both.
//!
//! # Configuration Format
//!
//! ```toml
//! # ts-bench.toml
//!
//! [run]
//! concurrency = 6
//! timeout_minutes = 60
//! max_old_space_size = 6144
//! compiler = "pnpm exec tsc"
//! skip_millis = 100
//! force_millis = 150
//!
//! [packages]
//! exclude = ["fixtures", "e2e"]
//! cache_lookup = "turbo"
//! turbo_task = "typecheck"
//!
//! [report]
//! path = "ts-bench-report.md"
//!
//! [storage]
//! db_path = ".ts-bench/history.redb"
//! ```

use crate::cache::paths::history_db_path;
use crate::reporters::REPORT_FILE;
use crate::runner::artifacts::TRACE_DIR;
use crate::runner::RunnerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONCURRENCY_ENV: &str = "TS_BENCH_CONCURRENCY";
pub const TIMEOUT_ENV: &str = "TS_BENCH_TIMEOUT_MINUTES";
pub const DB_ENV: &str = "TS_BENCH_DB";

/// A command given either as one string or as an argument list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Args(Vec<String>),
}

impl CommandSpec {
    pub fn to_args(&self) -> Vec<String> {
        match self {
            CommandSpec::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            CommandSpec::Args(args) => args.clone(),
        }
    }
}

/// `[run]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Worker count; defaults to 80% of logical cores
    pub concurrency: Option<usize>,
    pub timeout_minutes: u64,
    /// MB, passed to node via NODE_OPTIONS
    pub max_old_space_size: u32,
    pub compiler: Option<CommandSpec>,
    pub analyzer: Option<CommandSpec>,
    /// Run `@typescript/analyze-trace` after each compile
    pub analyze: bool,
    pub skip_millis: u64,
    pub force_millis: u64,
    /// Trace directory name inside each package
    pub trace_dir: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            timeout_minutes: 60,
            max_old_space_size: 6144,
            compiler: None,
            analyzer: None,
            analyze: true,
            skip_millis: 100,
            force_millis: 150,
            trace_dir: TRACE_DIR.to_string(),
        }
    }
}

impl RunConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            compiler: self.compiler.as_ref().map(CommandSpec::to_args),
            analyzer: self.analyzer.as_ref().map(CommandSpec::to_args),
            analyze: self.analyze,
            trace_dir: self.trace_dir.clone(),
            max_old_space_size: self.max_old_space_size,
            skip_millis: self.skip_millis,
            force_millis: self.force_millis,
        }
    }
}

/// How to learn which packages an upstream build cache already validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheLookup {
    /// Every package is compiled
    #[default]
    None,
    /// `turbo run <task> --dry-run=json`
    Turbo,
}

/// `[packages]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Directory names skipped during discovery, on top of the defaults
    pub exclude: Vec<String>,
    pub cache_lookup: CacheLookup,
    pub turbo_task: String,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            cache_lookup: CacheLookup::None,
            turbo_task: "typecheck".to_string(),
        }
    }
}

/// `[report]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Markdown report path, relative to the working directory
    pub path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(REPORT_FILE),
        }
    }
}

/// `[storage]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// History database file; defaults to the per-repository cache dir
    pub db_path: Option<PathBuf>,
}

/// Project-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub run: RunConfig,
    pub packages: PackagesConfig,
    pub report: ReportConfig,
    pub storage: StorageConfig,
}

impl ProjectConfig {
    /// Apply `TS_BENCH_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(CONCURRENCY_ENV) {
            match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.run.concurrency = Some(n),
                _ => warn!("Ignoring invalid {}={:?}", CONCURRENCY_ENV, value),
            }
        }
        if let Some(value) = lookup(TIMEOUT_ENV) {
            match value.trim().parse::<u64>() {
                Ok(n) if n > 0 => self.run.timeout_minutes = n,
                _ => warn!("Ignoring invalid {}={:?}", TIMEOUT_ENV, value),
            }
        }
        if let Some(value) = lookup(DB_ENV) {
            if !value.trim().is_empty() {
                self.storage.db_path = Some(PathBuf::from(value.trim()));
            }
        }
    }

    /// History database location for `repo_root`
    pub fn db_path(&self, repo_root: &Path) -> PathBuf {
        match &self.storage.db_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => repo_root.join(path),
            None => history_db_path(repo_root),
        }
    }
}

/// Load project configuration from the repository root, then apply
/// environment overrides. Falls back to defaults.
pub fn load_project_config(repo_path: &Path) -> ProjectConfig {
    let mut config = load_config_file(repo_path);
    config.apply_env();
    config
}

fn load_config_file(repo_path: &Path) -> ProjectConfig {
    // Try TOML first (preferred format)
    let toml_path = repo_path.join("ts-bench.toml");
    if toml_path.exists() {
        match load_toml_config(&toml_path) {
            Ok(config) => {
                debug!("Loaded project config from {}", toml_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", toml_path.display(), e);
            }
        }
    }

    let json_path = repo_path.join(".ts-bench.json");
    if json_path.exists() {
        match load_json_config(&json_path) {
            Ok(config) => {
                debug!("Loaded project config from {}", json_path.display());
                return config;
            }
            Err(e) => {
                warn!("Failed to load {}: {}", json_path.display(), e);
            }
        }
    }

    debug!("No project config found, using defaults");
    ProjectConfig::default()
}

/// Load configuration from a TOML file
fn load_toml_config(path: &Path) -> anyhow::Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ProjectConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration from a JSON file
fn load_json_config(path: &Path) -> anyhow::Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: ProjectConfig = serde_json::from_str(&content)?;
    Ok(config)
}
