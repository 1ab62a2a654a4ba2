//! Core data models for ts-bench
//!
//! These models flow through the whole benchmark pipeline: the runner
//! produces [`PackageResult`]s, the store persists them under a [`Scan`],
//! and the reporters compare two [`ScanRecord`]s.

use crate::runner::artifacts::TraceMetrics;
use crate::runner::diagnostics::DiagnosticMetrics;
use crate::runner::hotspots::HotSpotMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A workspace package discovered in the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Name from package.json (e.g. `@acme/web`)
    pub name: String,
    /// Absolute path of the package directory
    pub absolute_path: PathBuf,
    /// Path relative to the repository root
    #[serde(default)]
    pub relative_path: PathBuf,
}

impl Package {
    pub fn new(name: impl Into<String>, absolute_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            absolute_path: absolute_path.into(),
            relative_path: PathBuf::new(),
        }
    }

    pub fn with_relative_path(mut self, relative_path: impl Into<PathBuf>) -> Self {
        self.relative_path = relative_path.into();
        self
    }
}

/// One unit of work for the worker pool
#[derive(Debug, Clone)]
pub struct PackageJob {
    pub package: Package,
    /// An upstream build cache already validated this package
    pub is_cached: bool,
}

impl PackageJob {
    pub fn new(package: Package, is_cached: bool) -> Self {
        Self { package, is_cached }
    }
}

/// All metrics collected for a successfully benchmarked package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetrics {
    #[serde(default)]
    pub diagnostics: DiagnosticMetrics,
    #[serde(default)]
    pub trace: TraceMetrics,
    #[serde(default)]
    pub hot_spots: HotSpotMetrics,
}

/// Success or failure of one package, with a fixed field set per case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success(PackageMetrics),
    Failure {
        /// Stable error code (`EXECUTION_ERROR`, `ARTIFACT_READ_ERROR`, `CANCELLED`)
        code: String,
        error: String,
    },
}

/// Outcome of benchmarking one package within a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageResult {
    pub package: Package,
    #[serde(default)]
    pub is_cached: bool,
    /// Compiler wall-clock time in milliseconds
    #[serde(default)]
    pub duration_ms: f64,
    pub outcome: Outcome,
}

impl PackageResult {
    pub fn success(package: Package, is_cached: bool, duration_ms: f64, metrics: PackageMetrics) -> Self {
        Self {
            package,
            is_cached,
            duration_ms,
            outcome: Outcome::Success(metrics),
        }
    }

    pub fn failure(package: Package, duration_ms: f64, err: &crate::error::PackageError) -> Self {
        Self {
            package,
            is_cached: false,
            duration_ms,
            outcome: Outcome::Failure {
                code: err.code().to_string(),
                error: err.to_string(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    pub fn metrics(&self) -> Option<&PackageMetrics> {
        match &self.outcome {
            Outcome::Success(metrics) => Some(metrics),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure { error, .. } => Some(error),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success(_) => None,
            Outcome::Failure { code, .. } => Some(code),
        }
    }
}

/// Host CPU descriptor recorded with every scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    pub model: String,
    pub logical_cores: usize,
}

impl CpuInfo {
    /// Detect the current host's CPU
    pub fn detect() -> Self {
        let logical_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let model = std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|info| {
                info.lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split_once(':'))
                    .map(|(_, v)| v.trim().to_string())
            })
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());

        Self {
            model,
            logical_cores,
        }
    }

    /// Default worker count: 80% of logical cores, at least one
    pub fn default_concurrency(&self) -> usize {
        default_concurrency(self.logical_cores)
    }
}

impl std::fmt::Display for CpuInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} x {}", self.model, self.logical_cores)
    }
}

/// Leave headroom for the measured compiler so timings are not skewed.
///
/// 4 cores → 3, 8 cores → 6, 1 core → 1.
pub fn default_concurrency(logical_cores: usize) -> usize {
    (logical_cores * 4 / 5).max(1)
}

/// One benchmarking run of a repository at a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    /// ts-bench version that produced the scan
    pub version: String,
    pub owner: String,
    pub repository: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub commit_date: DateTime<Utc>,
    #[serde(default)]
    pub files_changed: usize,
    #[serde(default)]
    pub insertions: usize,
    #[serde(default)]
    pub deletions: usize,
    pub scanned_at: DateTime<Utc>,
    pub cpu: CpuInfo,
    /// Worker count used for the run
    #[serde(default)]
    pub concurrency: usize,
}

impl Scan {
    /// Short commit hash for display
    pub fn short_hash(&self) -> &str {
        let end = self.commit_hash.len().min(12);
        &self.commit_hash[..end]
    }
}

/// A scan as stored, with its results attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: u64,
    pub scan: Scan,
    pub results: Vec<PackageResult>,
}

impl ScanRecord {
    pub fn result_for(&self, package: &str) -> Option<&PackageResult> {
        self.results.iter().find(|r| r.package.name == package)
    }
}
