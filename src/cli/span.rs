//! Span command - benchmark a range of recent commits

use super::analyze::{benchmark_head, open_repo, BenchSession};
use crate::config::load_project_config;
use crate::git::{CommitInfo, GitHistory};
use anyhow::{bail, Context, Result};
use console::style;
use std::path::Path;
use std::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Flags of the `span` command
#[derive(Debug, Clone)]
pub struct SpanOptions {
    pub size: usize,
    pub skip: usize,
    pub prepare_commands: Vec<String>,
    pub timeout_minutes: u64,
    pub force: bool,
    pub concurrency: Option<usize>,
}

pub fn run(path: &Path, opts: SpanOptions) -> Result<()> {
    let git = open_repo(path)?;
    let repo_root = git.repo_root()?.to_path_buf();

    if !opts.force && git.is_dirty()? {
        bail!(
            "Working tree of {} has uncommitted changes; commit or stash them, or pass --force",
            repo_root.display()
        );
    }

    let mut config = load_project_config(&repo_root);
    config.run.timeout_minutes = opts.timeout_minutes;
    if let Some(n) = opts.concurrency {
        config.run.concurrency = Some(n);
    }

    let mut commits = git.get_recent_commits(opts.size, opts.skip)?;
    if commits.is_empty() {
        println!("No commits to benchmark.");
        return Ok(());
    }
    // Oldest first, so every commit is compared with the one benchmarked before it
    commits.reverse();

    let session = BenchSession::new()?;
    let original = git.current_head()?;
    info!("Benchmarking {} commits", commits.len());

    let cancel = session.cancel_token().clone();
    let outcome = benchmark_commits(&git, &repo_root, &commits, &opts, &cancel, |git| {
        benchmark_head(git, &repo_root, &config, &session).map(|run| {
            println!(
                "  {} {} packages, {} failed, {:.1}s (scan #{})",
                style("→").dim(),
                run.comparison.packages.len(),
                run.failed(),
                run.elapsed.as_secs_f64(),
                run.scan_id
            );
        })
    });

    // HEAD goes back even when a commit failed
    let restored = git.restore(&original, opts.force);
    let benchmarked = outcome?;
    restored.context("Failed to restore the original HEAD")?;

    println!(
        "\n{} Benchmarked {} commit{}. Run `ts-bench report` for the latest comparison.",
        style("✓").green().bold(),
        benchmarked,
        if benchmarked == 1 { "" } else { "s" }
    );
    Ok(())
}

/// Check out each commit, prepare it, then benchmark it.
/// Stops at the first failure or once `cancel` fires.
fn benchmark_commits(
    git: &GitHistory,
    repo_root: &Path,
    commits: &[CommitInfo],
    opts: &SpanOptions,
    cancel: &CancellationToken,
    mut benchmark: impl FnMut(&GitHistory) -> Result<()>,
) -> Result<usize> {
    let interrupted = |done: usize| -> Result<()> {
        if cancel.is_cancelled() {
            bail!("Interrupted after {} of {} commits", done, commits.len());
        }
        Ok(())
    };

    for (i, commit) in commits.iter().enumerate() {
        interrupted(i)?;
        println!(
            "\n{} [{}/{}] {} {}",
            style("⎇").bold(),
            i + 1,
            commits.len(),
            style(commit.short_hash()).yellow(),
            commit.message
        );

        git.checkout(&commit.hash, opts.force)?;
        for command in &opts.prepare_commands {
            let prepared = run_prepare_command(command, repo_root);
            interrupted(i)?;
            prepared.with_context(|| format!("Preparing {} failed", commit.short_hash()))?;
        }
        benchmark(git)?;
    }
    Ok(commits.len())
}

/// Run one prepare command through the shell, output passed through
fn run_prepare_command(command: &str, cwd: &Path) -> Result<()> {
    info!("Running `{}`", command);
    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .status()
        .with_context(|| format!("Failed to spawn `{}`", command))?;

    if !status.success() {
        warn!("`{}` exited with {}", command, status);
        bail!("`{}` exited with {}", command, status);
    }
    Ok(())
}
