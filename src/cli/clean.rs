//! Clean command - remove trace directories left in packages

use super::analyze::open_repo;
use crate::config::load_project_config;
use anyhow::Result;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

pub fn run(path: &Path, dry_run: bool) -> Result<()> {
    let git = open_repo(path)?;
    let repo_root = git.repo_root()?.to_path_buf();
    let trace_dir = load_project_config(&repo_root).run.trace_dir;

    let found = find_trace_dirs(&repo_root, &trace_dir);

    if found.is_empty() {
        println!("No {} directories found.", trace_dir);
        return Ok(());
    }

    println!(
        "Found {} {} director{}:",
        found.len(),
        trace_dir,
        if found.len() == 1 { "y" } else { "ies" }
    );

    for dir in &found {
        println!("  {}", dir.display());
    }

    if dry_run {
        println!("\nDry run - nothing removed. Run without --dry-run to delete.");
        return Ok(());
    }

    println!();
    let mut removed = 0;
    for dir in &found {
        match std::fs::remove_dir_all(dir) {
            Ok(_) => {
                removed += 1;
                println!("Removed: {}", dir.display());
            }
            Err(e) => eprintln!("Failed to remove {}: {}", dir.display(), e),
        }
    }

    println!(
        "\nCleaned {} director{}.",
        removed,
        if removed == 1 { "y" } else { "ies" }
    );

    Ok(())
}

/// Directories named `trace_dir` below `root`.
///
/// Trace directories are usually gitignored, so ignore files are not
/// honoured; dependency and VCS directories are skipped instead.
fn find_trace_dirs(root: &Path, trace_dir: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .parents(false)
        .filter_entry(|entry| {
            let name = entry.file_name();
            name != "node_modules" && name != ".git"
        })
        .build();

    for entry in walker.filter_map(|e| e.ok()) {
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        if is_dir && entry.depth() > 0 && entry.file_name() == trace_dir {
            found.push(entry.into_path());
        }
    }

    // Nested matches disappear with their parent
    found.sort();
    let mut outer: Vec<PathBuf> = Vec::new();
    for dir in found {
        if !outer.iter().any(|parent| dir.starts_with(parent)) {
            outer.push(dir);
        }
    }
    outer
}
