//! Analyze command - benchmark every package at the current commit

use crate::config::{load_project_config, CacheLookup, ProjectConfig};
use crate::git::{GitHistory, RepoIdentity};
use crate::models::{CpuInfo, PackageJob, PackageResult, Scan};
use crate::packages;
use crate::pipeline::WorkerPool;
use crate::reporters::{self, Bucket, Comparison, OutputFormat};
use crate::runner::TscRunner;
use crate::store::HistoryStore;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Flags of the `analyze` command
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub concurrency: Option<usize>,
    pub format: String,
    pub output: Option<PathBuf>,
    pub timeout_minutes: Option<u64>,
    pub no_analyze: bool,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            concurrency: None,
            format: "text".to_string(),
            output: None,
            timeout_minutes: None,
            no_analyze: false,
        }
    }
}

/// Outcome of benchmarking one commit
pub(crate) struct BenchmarkRun {
    pub scan_id: u64,
    pub comparison: Comparison,
    pub elapsed: Duration,
}

impl BenchmarkRun {
    pub fn failed(&self) -> usize {
        self.comparison.count(Bucket::Errored)
    }
}

/// Async runtime and Ctrl-C token shared by every commit benchmarked in
/// one invocation
pub(crate) struct BenchSession {
    runtime: Runtime,
    cancel: CancellationToken,
}

impl BenchSession {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running packages");
                token.cancel();
            }
        });

        Ok(Self { runtime, cancel })
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub fn run(path: &Path, opts: AnalyzeOptions) -> Result<()> {
    let format = OutputFormat::from_str(&opts.format)?;
    let git = open_repo(path)?;
    let repo_root = git.repo_root()?.to_path_buf();

    let mut config = load_project_config(&repo_root);
    if let Some(n) = opts.concurrency {
        config.run.concurrency = Some(n);
    }
    if let Some(minutes) = opts.timeout_minutes {
        config.run.timeout_minutes = minutes;
    }
    if opts.no_analyze {
        config.run.analyze = false;
    }

    let session = BenchSession::new()?;
    let run = benchmark_head(&git, &repo_root, &config, &session)?;

    println!("{}", reporters::report_with_format(&run.comparison, format)?);

    let report_path = opts.output.unwrap_or_else(|| config.report.path.clone());
    write_markdown_report(&run.comparison, &report_path)?;

    print_summary(&run, &report_path);
    Ok(())
}

/// Open the repository containing `path`
pub(crate) fn open_repo(path: &Path) -> Result<GitHistory> {
    let repo_path = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    GitHistory::open(&repo_path)
}

/// Benchmark the checked-out commit, store it and compare with the
/// previous stored commit of the same repository.
/// An interrupted run is not stored.
pub(crate) fn benchmark_head(
    git: &GitHistory,
    repo_root: &Path,
    config: &ProjectConfig,
    session: &BenchSession,
) -> Result<BenchmarkRun> {
    let started = Instant::now();
    let head = git.head_commit()?;
    let identity = RepoIdentity::resolve(git);
    let cpu = CpuInfo::detect();
    let concurrency = config
        .run
        .concurrency
        .unwrap_or_else(|| cpu.default_concurrency());

    let jobs = collect_jobs(repo_root, config)?;

    println!(
        "\n{} {}/{} @ {} ({} packages, {} workers)",
        style("⏱").bold(),
        style(&identity.owner).cyan(),
        style(&identity.repository).cyan(),
        style(head.short_hash()).yellow(),
        jobs.len(),
        concurrency
    );

    let results = run_jobs(session, jobs, config, concurrency);
    if session.is_cancelled() {
        bail!("Interrupted; scan of {} was not saved", head.short_hash());
    }

    let scan = Scan {
        version: env!("CARGO_PKG_VERSION").to_string(),
        owner: identity.owner,
        repository: identity.repository,
        commit_hash: head.hash,
        commit_message: head.message,
        commit_date: head.date,
        files_changed: head.files_changed,
        insertions: head.insertions,
        deletions: head.deletions,
        scanned_at: Utc::now(),
        cpu,
        concurrency,
    };

    let db_path = config.db_path(repo_root);
    let store = HistoryStore::open(&db_path)?;
    let scan_id = store.save_scan(&scan, &results)?;
    let previous = store.find_previous_scan(&scan)?;
    match &previous {
        Some(prev) => info!("Comparing with {}", prev.scan.short_hash()),
        None => info!("No earlier scan of {} stored", scan.repository),
    }

    Ok(BenchmarkRun {
        scan_id,
        comparison: Comparison::build(&scan, &results, previous.as_ref()),
        elapsed: started.elapsed(),
    })
}

fn collect_jobs(repo_root: &Path, config: &ProjectConfig) -> Result<Vec<PackageJob>> {
    let found = packages::discover(repo_root, &config.packages.exclude)?;
    let cached: HashSet<String> = match config.packages.cache_lookup {
        CacheLookup::Turbo => packages::turbo_cached_packages(repo_root, &config.packages.turbo_task),
        CacheLookup::None => HashSet::new(),
    };

    Ok(found
        .into_iter()
        .map(|package| {
            let is_cached = cached.contains(&package.name);
            PackageJob::new(package, is_cached)
        })
        .collect())
}

/// Drive the worker pool on the session runtime. Packages not finished
/// by the deadline are recorded as cancelled.
fn run_jobs(
    session: &BenchSession,
    jobs: Vec<PackageJob>,
    config: &ProjectConfig,
    concurrency: usize,
) -> Vec<PackageResult> {
    let progress = ProgressBar::new(jobs.len() as u64);
    progress.set_style(create_bar_style());

    let runner = TscRunner::new(config.run.runner_config());
    let deadline = Duration::from_secs(config.run.timeout_minutes.saturating_mul(60));

    let pool = WorkerPool::new(runner, concurrency)
        .with_cancel_token(session.cancel_token().clone())
        .with_deadline(deadline)
        .with_progress(progress.clone());
    let results = session.runtime.block_on(pool.run(jobs));

    progress.finish_and_clear();
    results
}

/// Write the markdown report, creating parent directories
pub(crate) fn write_markdown_report(cmp: &Comparison, path: &Path) -> Result<()> {
    let markdown = reporters::report_with_format(cmp, OutputFormat::Markdown)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, markdown)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;
    Ok(())
}

fn print_summary(run: &BenchmarkRun, report_path: &Path) {
    let total = run.comparison.packages.len();
    let failed = run.failed();
    let status = if failed == 0 {
        style("✓").green().bold()
    } else {
        style("!").yellow().bold()
    };
    println!(
        "\n{} {} packages benchmarked ({} failed) in {:.1}s, scan #{}",
        status,
        total,
        failed,
        run.elapsed.as_secs_f64(),
        run.scan_id
    );
    println!(
        "{} Report written to {}",
        style("📄").dim(),
        style(report_path.display()).cyan()
    );
}

/// Create bar progress style
fn create_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("valid progress template")
        .progress_chars("█▓▒░  ")
}
