//! Package Runner
//!
//! Benchmarks one package: compiler run with extended diagnostics and trace
//! generation, hot-spot analysis of the trace, and trace bundle reading.
//! Every outcome, including tool failures and cancellation, is reported as a
//! [`PackageResult`]; nothing here returns `Err` to the pool.

pub mod artifacts;
pub mod diagnostics;
pub mod external_tool;
pub mod hotspots;

use crate::error::PackageError;
use crate::models::{Package, PackageJob, PackageMetrics, PackageResult};
use artifacts::{
    read_cached_trace_metrics, read_optional, read_trace_metrics, reset_trace_dir, trace_dir_for,
    ANALYZE_FILE, DIAGNOSTICS_FILE, TRACE_DIR,
};
use diagnostics::DiagnosticMetrics;
use external_tool::{get_js_exec_command, run_external_tool, ExternalToolResult};
use hotspots::{HotSpotMetrics, HotSpotReport};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lines of compiler output kept in failure messages
const ERROR_TAIL_LINES: usize = 20;

/// Something that turns a [`PackageJob`] into exactly one [`PackageResult`]
pub trait PackageRunner: Send + Sync + 'static {
    fn run(
        &self,
        job: PackageJob,
        cancel: CancellationToken,
    ) -> impl Future<Output = PackageResult> + Send;
}

/// Compiler and analyzer settings for [`TscRunner`]
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Compiler command; `None` resolves to `npx tsc` / `bunx tsc`
    pub compiler: Option<Vec<String>>,
    /// Analyzer command; `None` resolves to `npx @typescript/analyze-trace`
    pub analyzer: Option<Vec<String>>,
    /// Skip hot-spot analysis entirely
    pub analyze: bool,
    /// Trace directory name inside each package
    pub trace_dir: String,
    /// Passed as `NODE_OPTIONS=--max-old-space-size=<N>` (MB)
    pub max_old_space_size: u32,
    pub skip_millis: u64,
    pub force_millis: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            compiler: None,
            analyzer: None,
            analyze: true,
            trace_dir: TRACE_DIR.to_string(),
            max_old_space_size: 6144,
            skip_millis: 100,
            force_millis: 150,
        }
    }
}

/// Runs the TypeScript compiler and trace analyzer as subprocesses
#[derive(Debug, Clone)]
pub struct TscRunner {
    config: RunnerConfig,
    compiler: Vec<String>,
    analyzer: Vec<String>,
}

impl TscRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let compiler = config
            .compiler
            .clone()
            .unwrap_or_else(|| get_js_exec_command("tsc"));
        let analyzer = config
            .analyzer
            .clone()
            .unwrap_or_else(|| get_js_exec_command("@typescript/analyze-trace"));
        Self {
            config,
            compiler,
            analyzer,
        }
    }

    fn compiler_command(&self, trace_dir: &Path) -> Vec<String> {
        let mut cmd = self.compiler.clone();
        cmd.extend(
            [
                "--noEmit",
                "--extendedDiagnostics",
                "--incremental",
                "false",
                "--generateTrace",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        cmd.push(trace_dir.to_string_lossy().to_string());
        cmd
    }

    fn analyzer_command(&self, trace_dir: &Path) -> Vec<String> {
        let mut cmd = self.analyzer.clone();
        cmd.push(trace_dir.to_string_lossy().to_string());
        cmd.extend([
            "--skipMillis".to_string(),
            self.config.skip_millis.to_string(),
            "--forceMillis".to_string(),
            self.config.force_millis.to_string(),
            "--json".to_string(),
        ]);
        cmd
    }

    fn compiler_env(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "NODE_OPTIONS".to_string(),
            format!("--max-old-space-size={}", self.config.max_old_space_size),
        );
        env
    }

    async fn run_package(&self, job: PackageJob, cancel: CancellationToken) -> PackageResult {
        let package = job.package;
        let trace_dir = trace_dir_for(&package.absolute_path, &self.config.trace_dir);

        if job.is_cached {
            return self.read_cached(package, &trace_dir).await;
        }

        if cancel.is_cancelled() {
            return cancelled(package, 0.0);
        }

        if let Err(e) = reset_trace_dir(&trace_dir).await {
            return PackageResult::failure(package, 0.0, &e);
        }

        debug!("Compiling {}", package.name);
        let start = Instant::now();
        let compile = run_external_tool(
            &self.compiler_command(&trace_dir),
            "tsc",
            Some(&package.absolute_path),
            Some(&self.compiler_env()),
            &cancel,
        )
        .await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if let Err(e) = check_compile(&compile) {
            if !matches!(e, PackageError::Cancelled(_)) {
                warn!("{} failed after {:.0}ms: {}", package.name, duration_ms, e);
            }
            return PackageResult::failure(package, duration_ms, &e);
        }

        let diagnostics = DiagnosticMetrics::parse(&compile.stdout);
        if let Err(e) = tokio::fs::write(trace_dir.join(DIAGNOSTICS_FILE), &compile.stdout).await {
            warn!("Could not save diagnostics for {}: {}", package.name, e);
        }

        let hot_spots = match self.analyze(&package, &trace_dir, &cancel).await {
            Ok(metrics) => metrics,
            Err(e) if e.is_fatal() => {
                return PackageResult::failure(package, duration_ms, &e);
            }
            Err(e) => {
                warn!("Hot-spot analysis for {} degraded: {}", package.name, e);
                HotSpotMetrics::default()
            }
        };

        let trace = match read_trace_metrics(&trace_dir).await {
            Ok(trace) => trace,
            Err(e) => {
                warn!("{}: {}", package.name, e);
                return PackageResult::failure(package, duration_ms, &e);
            }
        };

        info!(
            "{} done in {:.0}ms ({} types)",
            package.name, duration_ms, trace.num_types
        );

        PackageResult::success(
            package,
            false,
            duration_ms,
            PackageMetrics {
                diagnostics,
                trace,
                hot_spots,
            },
        )
    }

    /// Run the trace analyzer and aggregate its report.
    ///
    /// Output is parsed regardless of exit code: the analyzer exits non-zero
    /// when it finds hot spots.
    async fn analyze(
        &self,
        package: &Package,
        trace_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<HotSpotMetrics, PackageError> {
        if !self.config.analyze {
            return Ok(HotSpotMetrics::default());
        }
        if cancel.is_cancelled() {
            return Err(PackageError::Cancelled("before trace analysis".to_string()));
        }

        let result = run_external_tool(
            &self.analyzer_command(trace_dir),
            "analyze-trace",
            Some(&package.absolute_path),
            None,
            cancel,
        )
        .await;

        if result.cancelled {
            return Err(PackageError::Cancelled("during trace analysis".to_string()));
        }
        if !result.success {
            return Err(PackageError::Analysis(
                result.error.unwrap_or_else(|| "analyzer failed".to_string()),
            ));
        }

        if let Err(e) = tokio::fs::write(trace_dir.join(ANALYZE_FILE), &result.stdout).await {
            warn!("Could not save analysis for {}: {}", package.name, e);
        }

        let report = HotSpotReport::parse(&result.stdout);
        if report.is_empty() && !result.exit_ok() {
            return Err(PackageError::Analysis(format!(
                "analyze-trace exited with code {}: {}",
                result.return_code.unwrap_or(-1),
                result.output_tail(ERROR_TAIL_LINES)
            )));
        }

        Ok(report.metrics(result.stdout.len() as u64))
    }

    /// Rebuild metrics from a previous run's bundle without compiling
    async fn read_cached(&self, package: Package, trace_dir: &Path) -> PackageResult {
        debug!("{} is cached, reading previous trace bundle", package.name);

        let diagnostics = read_optional(&trace_dir.join(DIAGNOSTICS_FILE))
            .await
            .map(|text| DiagnosticMetrics::parse(&text))
            .unwrap_or_default();

        let hot_spots = read_optional(&trace_dir.join(ANALYZE_FILE))
            .await
            .map(|text| HotSpotReport::parse(&text).metrics(text.len() as u64))
            .unwrap_or_default();

        let trace = read_cached_trace_metrics(trace_dir).await;

        PackageResult::success(
            package,
            true,
            0.0,
            PackageMetrics {
                diagnostics,
                trace,
                hot_spots,
            },
        )
    }
}

impl PackageRunner for TscRunner {
    fn run(
        &self,
        job: PackageJob,
        cancel: CancellationToken,
    ) -> impl Future<Output = PackageResult> + Send {
        self.run_package(job, cancel)
    }
}

fn check_compile(result: &ExternalToolResult) -> Result<(), PackageError> {
    if result.cancelled {
        return Err(PackageError::Cancelled("during compilation".to_string()));
    }
    if !result.success {
        return Err(PackageError::Execution(
            result
                .error
                .clone()
                .unwrap_or_else(|| "tsc could not be started".to_string()),
        ));
    }
    match result.return_code {
        Some(0) => Ok(()),
        code => Err(PackageError::Execution(format!(
            "tsc exited with code {}: {}",
            code.unwrap_or(-1),
            compiler_errors(result)
        ))),
    }
}

/// Output lines that are not part of the diagnostics block, falling back
/// to the tail when every line is one
fn compiler_errors(result: &ExternalToolResult) -> String {
    let lines: Vec<&str> = result
        .stdout
        .lines()
        .chain(result.stderr.lines())
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty() && !diagnostics::is_diagnostics_line(line))
        .take(ERROR_TAIL_LINES)
        .collect();
    if lines.is_empty() {
        result.output_tail(ERROR_TAIL_LINES)
    } else {
        lines.join("\n")
    }
}

/// Result for a package that never got to finish
pub fn cancelled(package: Package, duration_ms: f64) -> PackageResult {
    PackageResult::failure(
        package,
        duration_ms,
        &PackageError::Cancelled("run cancelled before the package finished".to_string()),
    )
}
