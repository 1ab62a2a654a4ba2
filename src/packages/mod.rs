//! Workspace package discovery and build-cache lookup
//!
//! Every `package.json` with a `name` below the repository root is a
//! package; the root manifest itself is the workspace, not a package.

use crate::models::Package;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Directories never descended into
pub const DEFAULT_EXCLUDES: &[&str] = &["node_modules", "dist", ".git", "generated"];

const MANIFEST: &str = "package.json";

/// Find all packages under `repo_root`, sorted by name.
///
/// `extra_excludes` are directory names skipped in addition to
/// [`DEFAULT_EXCLUDES`].
pub fn discover(repo_root: &Path, extra_excludes: &[String]) -> Result<Vec<Package>> {
    let root = repo_root
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", repo_root.display()))?;

    let excluded: HashSet<String> = DEFAULT_EXCLUDES
        .iter()
        .map(|s| s.to_string())
        .chain(extra_excludes.iter().cloned())
        .collect();

    let walker = WalkBuilder::new(&root)
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .parents(false)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir && entry.depth() > 0 && excluded.contains(entry.file_name().to_string_lossy().as_ref()))
        })
        .build();

    let manifests: Vec<PathBuf> = walker
        .filter_map(|e| e.ok())
        .filter(|e| e.depth() > 1 && e.file_type().is_some_and(|t| t.is_file()))
        .filter(|e| e.file_name() == MANIFEST)
        .map(|e| e.into_path())
        .collect();

    debug!("Found {} package manifests under {}", manifests.len(), root.display());

    let mut packages: Vec<Package> = manifests
        .par_iter()
        .filter_map(|manifest| read_package(&root, manifest))
        .collect();

    packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.relative_path.cmp(&b.relative_path)));

    let mut seen = HashSet::new();
    packages.retain(|p| {
        let first = seen.insert(p.name.clone());
        if !first {
            warn!(
                "Duplicate package name {} at {}, skipping",
                p.name,
                p.relative_path.display()
            );
        }
        first
    });

    info!("Discovered {} packages", packages.len());
    Ok(packages)
}

fn read_package(root: &Path, manifest: &Path) -> Option<Package> {
    let content = match std::fs::read_to_string(manifest) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read {}: {}", manifest.display(), e);
            return None;
        }
    };
    let json: Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse {}: {}", manifest.display(), e);
            return None;
        }
    };
    let name = json.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let dir = manifest.parent()?;
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    Some(Package::new(name, dir).with_relative_path(relative))
}

/// Packages whose `task` is a cache hit according to `turbo run --dry-run`.
///
/// Any failure (turbo missing, bad output) means nothing is cached.
pub fn turbo_cached_packages(repo_root: &Path, task: &str) -> HashSet<String> {
    let output = Command::new("turbo")
        .args(["run", task, "--dry-run=json"])
        .current_dir(repo_root)
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let cached = parse_turbo_dry_run(&String::from_utf8_lossy(&out.stdout), task);
            info!("turbo reports {} cached {} tasks", cached.len(), task);
            cached
        }
        Ok(out) => {
            warn!(
                "turbo dry run failed ({}), treating all packages as uncached",
                out.status
            );
            HashSet::new()
        }
        Err(e) => {
            warn!("Could not run turbo: {}, treating all packages as uncached", e);
            HashSet::new()
        }
    }
}

/// Extract cache-hit package names for `task` from dry-run JSON
pub fn parse_turbo_dry_run(stdout: &str, task: &str) -> HashSet<String> {
    let Ok(json) = serde_json::from_str::<Value>(stdout) else {
        return HashSet::new();
    };
    let Some(tasks) = json.get("tasks").and_then(Value::as_array) else {
        return HashSet::new();
    };

    tasks
        .iter()
        .filter(|t| t.get("task").and_then(Value::as_str) == Some(task))
        .filter(|t| {
            t.get("cache")
                .and_then(|c| c.get("status"))
                .and_then(Value::as_str)
                == Some("HIT")
        })
        .filter_map(|t| t.get("package").and_then(Value::as_str).map(str::to_string))
        .collect()
}
