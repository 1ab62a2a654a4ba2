//! Report command - re-render a stored comparison

use super::analyze::open_repo;
use crate::config::load_project_config;
use crate::reporters::{self, Comparison};
use crate::store::HistoryStore;
use anyhow::{bail, Context, Result};
use console::style;
use std::path::{Path, PathBuf};

pub fn run(path: &Path, format: &str, output: Option<PathBuf>, scan_id: Option<u64>) -> Result<()> {
    let git = open_repo(path)?;
    let repo_root = git.repo_root()?.to_path_buf();
    let config = load_project_config(&repo_root);

    let db_path = config.db_path(&repo_root);
    if !db_path.exists() {
        bail!("No scans stored yet. Run `ts-bench analyze` first.");
    }
    let store = HistoryStore::open(&db_path)?;

    let current = match scan_id {
        Some(id) => store
            .get_scan(id)?
            .with_context(|| format!("No scan with id {}", id))?,
        None => store
            .latest_scan()?
            .context("No scans stored yet. Run `ts-bench analyze` first.")?,
    };
    let previous = store.find_previous_scan(&current.scan)?;
    let cmp = Comparison::from_records(&current, previous.as_ref());
    let rendered = reporters::report(&cmp, format)?;

    match output {
        Some(out) => {
            std::fs::write(&out, &rendered)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            eprintln!(
                "{} Report for {} written to {}",
                style("📄").dim(),
                style(current.scan.short_hash()).yellow(),
                style(out.display()).cyan()
            );
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
