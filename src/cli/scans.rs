//! Scans command - list stored scans

use super::analyze::open_repo;
use crate::config::load_project_config;
use crate::models::ScanRecord;
use crate::store::HistoryStore;
use anyhow::Result;
use console::style;
use std::path::Path;

const MESSAGE_WIDTH: usize = 50;

pub fn run(path: &Path, limit: usize, offset: usize, json: bool) -> Result<()> {
    let git = open_repo(path)?;
    let repo_root = git.repo_root()?.to_path_buf();
    let config = load_project_config(&repo_root);

    let db_path = config.db_path(&repo_root);
    let records = if db_path.exists() {
        HistoryStore::open(&db_path)?.load_recent_scans(limit, offset)?
    } else {
        Vec::new()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No scans stored in {}", db_path.display());
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "{:>5}  {:<12}  {:<16}  {:>8}  {:>6}  {}",
            "ID", "COMMIT", "DATE", "PACKAGES", "FAILED", "MESSAGE"
        ))
        .bold()
    );
    for record in &records {
        println!("{}", format_row(record));
    }
    Ok(())
}

fn format_row(record: &ScanRecord) -> String {
    let failed = record.results.iter().filter(|r| !r.is_success()).count();
    let message: String = record.scan.commit_message.chars().take(MESSAGE_WIDTH).collect();
    let failed_cell = format!("{:>6}", failed);
    let failed_cell = if failed > 0 {
        style(failed_cell).red().to_string()
    } else {
        failed_cell
    };
    format!(
        "{:>5}  {:<12}  {:<16}  {:>8}  {}  {}",
        record.id,
        style(record.scan.short_hash()).yellow(),
        record.scan.commit_date.format("%Y-%m-%d %H:%M"),
        record.results.len(),
        failed_cell,
        message
    )
}
