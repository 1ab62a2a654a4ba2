//! History store on redb
//!
//! Tables:
//! - `scans`: scan id → scan JSON
//! - `scan_keys`: `repository\0commit` → scan id (one scan per commit)
//! - `results`: `<scan id, zero padded>/<package>` → result JSON
//! - `meta`: id sequence
//!
//! Result keys share a prefix per scan, so a scan's results are one range
//! scan and deleting a scan can drop them in the same transaction.

use crate::models::{PackageResult, Scan, ScanRecord};
use anyhow::{Context, Result};
use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, TableError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCANS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("scans");
const SCAN_KEYS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("scan_keys");
const RESULTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("results");
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_SCAN_ID: &str = "next_scan_id";

/// Default database file name
pub const DB_FILE: &str = "history.redb";

fn scan_key(repository: &str, commit_hash: &str) -> String {
    format!("{}\0{}", repository, commit_hash)
}

fn result_prefix(scan_id: u64) -> String {
    format!("{:020}/", scan_id)
}

/// Exclusive upper bound of a scan's result keys (`'0'` sorts right after `'/'`)
fn result_prefix_end(scan_id: u64) -> String {
    format!("{:020}0", scan_id)
}

fn result_key(scan_id: u64, package: &str) -> String {
    format!("{}{}", result_prefix(scan_id), package)
}

/// Persistent record of scans and their per-package results
pub struct HistoryStore {
    db: Database,
    path: Option<PathBuf>,
}

impl HistoryStore {
    /// Create or open the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let db = Database::create(path)
            .with_context(|| format!("Failed to open history database {}", path.display()))?;
        debug!("Opened history store at {}", path.display());
        Ok(Self {
            db,
            path: Some(path.to_path_buf()),
        })
    }

    /// Non-persistent store
    pub fn in_memory() -> Result<Self> {
        let db = redb::Builder::new()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context("Failed to create in-memory history database")?;
        Ok(Self { db, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert or replace a scan and its results in one transaction.
    ///
    /// A scan for the same (repository, commit) keeps its id; results are
    /// replaced per package. Returns the scan id.
    pub fn save_scan(&self, scan: &Scan, results: &[PackageResult]) -> Result<u64> {
        let txn = self.db.begin_write()?;
        let scan_id;
        {
            let mut keys = txn.open_table(SCAN_KEYS_TABLE)?;
            let key = scan_key(&scan.repository, &scan.commit_hash);
            let existing = keys.get(key.as_str())?.map(|guard| guard.value());

            scan_id = match existing {
                Some(id) => id,
                None => {
                    let mut meta = txn.open_table(META_TABLE)?;
                    let next = meta.get(NEXT_SCAN_ID)?.map(|guard| guard.value()).unwrap_or(1);
                    meta.insert(NEXT_SCAN_ID, next + 1)?;
                    keys.insert(key.as_str(), next)?;
                    next
                }
            };

            let mut scans = txn.open_table(SCANS_TABLE)?;
            let scan_bytes = serde_json::to_vec(scan)?;
            scans.insert(scan_id, scan_bytes.as_slice())?;

            let mut table = txn.open_table(RESULTS_TABLE)?;
            for result in results {
                let key = result_key(scan_id, &result.package.name);
                let value = serde_json::to_vec(result)?;
                table.insert(key.as_str(), value.as_slice())?;
            }
        }
        txn.commit().context("Failed to commit scan")?;

        info!(
            "Saved scan {} ({} @ {}) with {} results",
            scan_id,
            scan.repository,
            scan.short_hash(),
            results.len()
        );
        Ok(scan_id)
    }

    /// Scans ordered by commit date, newest first, with results attached
    pub fn load_recent_scans(&self, limit: usize, offset: usize) -> Result<Vec<ScanRecord>> {
        let txn = self.db.begin_read()?;
        let mut scans = read_all_scans(&txn)?;
        scans.sort_by(|(a_id, a), (b_id, b)| {
            b.commit_date
                .cmp(&a.commit_date)
                .then_with(|| b_id.cmp(a_id))
        });

        scans
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(id, scan)| attach_results(&txn, id, scan))
            .collect()
    }

    /// Newest scan by commit date
    pub fn latest_scan(&self) -> Result<Option<ScanRecord>> {
        Ok(self.load_recent_scans(1, 0)?.into_iter().next())
    }

    pub fn get_scan(&self, id: u64) -> Result<Option<ScanRecord>> {
        let txn = self.db.begin_read()?;
        let scans = match txn.open_table(SCANS_TABLE) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(bytes) = scans.get(id)? else {
            return Ok(None);
        };
        let scan: Scan = serde_json::from_slice(bytes.value())
            .with_context(|| format!("Corrupt scan record {}", id))?;
        attach_results(&txn, id, scan).map(Some)
    }

    pub fn find_scan(&self, repository: &str, commit_hash: &str) -> Result<Option<ScanRecord>> {
        let id = {
            let txn = self.db.begin_read()?;
            let keys = match txn.open_table(SCAN_KEYS_TABLE) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let id = keys
                .get(scan_key(repository, commit_hash).as_str())?
                .map(|guard| guard.value());
            id
        };
        match id {
            Some(id) => self.get_scan(id),
            None => Ok(None),
        }
    }

    /// Closest scan of the same repository ordered before `scan` by
    /// commit date, then by scan id for commits sharing a date.
    /// An unsaved `scan` sorts after every stored scan of its date.
    pub fn find_previous_scan(&self, scan: &Scan) -> Result<Option<ScanRecord>> {
        let txn = self.db.begin_read()?;
        let scans = read_all_scans(&txn)?;
        let current_id = scans
            .iter()
            .find(|(_, s)| s.repository == scan.repository && s.commit_hash == scan.commit_hash)
            .map_or(u64::MAX, |(id, _)| *id);

        let previous = scans
            .into_iter()
            .filter(|(id, s)| {
                s.repository == scan.repository
                    && s.commit_hash != scan.commit_hash
                    && (s.commit_date, *id) < (scan.commit_date, current_id)
            })
            .max_by_key(|(id, s)| (s.commit_date, *id));

        match previous {
            Some((id, s)) => attach_results(&txn, id, s).map(Some),
            None => Ok(None),
        }
    }

    /// Delete a scan and all of its results. Returns whether it existed.
    pub fn delete_scan(&self, id: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let existed;
        {
            let mut scans = txn.open_table(SCANS_TABLE)?;
            let removed: Option<Scan> = match scans.remove(id)? {
                Some(bytes) => Some(serde_json::from_slice(bytes.value())?),
                None => None,
            };
            existed = removed.is_some();

            if let Some(scan) = removed {
                let mut keys = txn.open_table(SCAN_KEYS_TABLE)?;
                keys.remove(scan_key(&scan.repository, &scan.commit_hash).as_str())?;
            }

            let mut results = txn.open_table(RESULTS_TABLE)?;
            let start = result_prefix(id);
            let end = result_prefix_end(id);
            let doomed: Vec<String> = results
                .range(start.as_str()..end.as_str())?
                .map(|item| item.map(|(key, _)| key.value().to_string()))
                .collect::<std::result::Result<_, _>>()?;
            for key in &doomed {
                results.remove(key.as_str())?;
            }
            debug!("Deleted scan {} and {} results", id, doomed.len());
        }
        txn.commit()?;
        Ok(existed)
    }

    pub fn scan_count(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        Ok(read_all_scans(&txn)?.len())
    }
}

fn read_all_scans(txn: &ReadTransaction) -> Result<Vec<(u64, Scan)>> {
    let table = match txn.open_table(SCANS_TABLE) {
        Ok(t) => t,
        Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut scans = Vec::new();
    for item in table.iter()? {
        let (id, bytes) = item?;
        let id = id.value();
        let scan: Scan = serde_json::from_slice(bytes.value())
            .with_context(|| format!("Corrupt scan record {}", id))?;
        scans.push((id, scan));
    }
    Ok(scans)
}

fn attach_results(txn: &ReadTransaction, id: u64, scan: Scan) -> Result<ScanRecord> {
    let table = match txn.open_table(RESULTS_TABLE) {
        Ok(t) => t,
        Err(TableError::TableDoesNotExist(_)) => {
            return Ok(ScanRecord {
                id,
                scan,
                results: Vec::new(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let start = result_prefix(id);
    let end = result_prefix_end(id);
    let mut results = Vec::new();
    for item in table.range(start.as_str()..end.as_str())? {
        let (key, bytes) = item?;
        let result: PackageResult = serde_json::from_slice(bytes.value())
            .with_context(|| format!("Corrupt result record {}", key.value()))?;
        results.push(result);
    }

    Ok(ScanRecord { id, scan, results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackageError;
    use crate::models::{CpuInfo, Package, PackageMetrics};
    use chrono::{TimeZone, Utc};

    fn scan(repo: &str, commit: &str, day: u32) -> Scan {
        Scan {
            version: "0.4.0".into(),
            owner: "acme".into(),
            repository: repo.into(),
            commit_hash: commit.into(),
            commit_message: format!("commit {}", commit),
            commit_date: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
            files_changed: 1,
            insertions: 10,
            deletions: 2,
            scanned_at: Utc::now(),
            cpu: CpuInfo {
                model: "Test CPU".into(),
                logical_cores: 8,
            },
            concurrency: 6,
        }
    }

    fn success(name: &str, types: u64) -> PackageResult {
        let mut metrics = PackageMetrics::default();
        metrics.trace.num_types = types;
        metrics.diagnostics.types = types;
        PackageResult::success(Package::new(name, format!("/repo/{}", name)), false, 10.0, metrics)
    }

    fn failure(name: &str) -> PackageResult {
        PackageResult::failure(
            Package::new(name, format!("/repo/{}", name)),
            3.0,
            &PackageError::Execution("tsc exited with code 2".into()),
        )
    }

    #[test]
    fn test_empty_store() {
        let store = HistoryStore::in_memory().unwrap();
        assert!(store.load_recent_scans(10, 0).unwrap().is_empty());
        assert!(store.latest_scan().unwrap().is_none());
        assert!(store.find_scan("web", "abc").unwrap().is_none());
        assert!(store.get_scan(1).unwrap().is_none());
        assert!(!store.delete_scan(1).unwrap());
    }

    #[test]
    fn test_save_is_idempotent() {
        let store = HistoryStore::in_memory().unwrap();
        let s = scan("web", "abc", 1);
        let results = vec![success("a", 100), failure("b")];

        let first = store.save_scan(&s, &results).unwrap();
        let second = store.save_scan(&s, &results).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.scan_count().unwrap(), 1);

        let record = store.find_scan("web", "abc").unwrap().unwrap();
        assert_eq!(record.results.len(), 2);
        assert_eq!(record.scan, s);
    }

    #[test]
    fn test_rerun_replaces_results_in_place() {
        let store = HistoryStore::in_memory().unwrap();
        let s = scan("web", "abc", 1);
        let id = store.save_scan(&s, &[success("a", 100), success("b", 50)]).unwrap();

        let mut updated = s.clone();
        updated.commit_message = "amended".into();
        store.save_scan(&updated, &[success("a", 120)]).unwrap();

        let record = store.get_scan(id).unwrap().unwrap();
        assert_eq!(record.scan.commit_message, "amended");
        assert_eq!(record.results.len(), 2);
        let a = record.result_for("a").unwrap();
        assert_eq!(a.metrics().unwrap().trace.num_types, 120);
    }

    #[test]
    fn test_recent_scans_order_and_offset() {
        let store = HistoryStore::in_memory().unwrap();
        // saved out of commit-date order
        store.save_scan(&scan("web", "c2", 2), &[success("a", 2)]).unwrap();
        store.save_scan(&scan("web", "c3", 3), &[success("a", 3)]).unwrap();
        store.save_scan(&scan("web", "c1", 1), &[success("a", 1)]).unwrap();

        let recent = store.load_recent_scans(2, 0).unwrap();
        let hashes: Vec<&str> = recent.iter().map(|r| r.scan.commit_hash.as_str()).collect();
        assert_eq!(hashes, vec!["c3", "c2"]);
        assert_eq!(recent[0].results.len(), 1);

        let older = store.load_recent_scans(10, 2).unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].scan.commit_hash, "c1");

        assert_eq!(store.latest_scan().unwrap().unwrap().scan.commit_hash, "c3");
    }

    #[test]
    fn test_results_do_not_leak_between_scans() {
        let store = HistoryStore::in_memory().unwrap();
        // ids 1 and 10 share a decimal prefix
        for day in 1..=10 {
            let commit = format!("c{}", day);
            store.save_scan(&scan("web", &commit, day), &[success(&commit, day as u64)]).unwrap();
        }
        let first = store.get_scan(1).unwrap().unwrap();
        assert_eq!(first.results.len(), 1);
        assert_eq!(first.results[0].name(), "c1");
    }

    #[test]
    fn test_find_previous_scan() {
        let store = HistoryStore::in_memory().unwrap();
        store.save_scan(&scan("web", "c1", 1), &[success("a", 1)]).unwrap();
        store.save_scan(&scan("web", "c2", 2), &[success("a", 2)]).unwrap();
        store.save_scan(&scan("other", "x", 3), &[success("a", 9)]).unwrap();
        let current = scan("web", "c4", 4);
        store.save_scan(&current, &[success("a", 4)]).unwrap();

        let previous = store.find_previous_scan(&current).unwrap().unwrap();
        assert_eq!(previous.scan.commit_hash, "c2");

        let first = scan("web", "c1", 1);
        assert!(store.find_previous_scan(&first).unwrap().is_none());
    }

    #[test]
    fn test_find_previous_scan_same_commit_date() {
        let store = HistoryStore::in_memory().unwrap();
        let first = scan("web", "c1", 5);
        let second = scan("web", "c2", 5);
        store.save_scan(&first, &[success("a", 1)]).unwrap();
        store.save_scan(&second, &[success("a", 2)]).unwrap();

        let previous = store.find_previous_scan(&second).unwrap().unwrap();
        assert_eq!(previous.scan.commit_hash, "c1");
        assert!(store.find_previous_scan(&first).unwrap().is_none());

        // not stored yet: every scan of the same date came before it
        let third = scan("web", "c3", 5);
        let previous = store.find_previous_scan(&third).unwrap().unwrap();
        assert_eq!(previous.scan.commit_hash, "c2");
    }

    #[test]
    fn test_delete_cascades() {
        let store = HistoryStore::in_memory().unwrap();
        let keep = store.save_scan(&scan("web", "c1", 1), &[success("a", 1)]).unwrap();
        let doomed = store
            .save_scan(&scan("web", "c2", 2), &[success("a", 2), failure("b")])
            .unwrap();

        assert!(store.delete_scan(doomed).unwrap());
        assert!(store.get_scan(doomed).unwrap().is_none());
        assert!(store.find_scan("web", "c2").unwrap().is_none());
        assert_eq!(store.get_scan(keep).unwrap().unwrap().results.len(), 1);

        // saving the same commit again gets a fresh id with no stale results
        let again = store.save_scan(&scan("web", "c2", 2), &[success("c", 5)]).unwrap();
        assert_ne!(again, doomed);
        let record = store.get_scan(again).unwrap().unwrap();
        assert_eq!(record.results.len(), 1);
        assert_eq!(record.results[0].name(), "c");
    }

    #[test]
    fn test_persists_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join(DB_FILE);
        {
            let store = HistoryStore::open(&path).unwrap();
            store.save_scan(&scan("web", "abc", 1), &[success("a", 7)]).unwrap();
        }
        let store = HistoryStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        let record = store.find_scan("web", "abc").unwrap().unwrap();
        assert_eq!(record.results[0].metrics().unwrap().trace.num_types, 7);
    }
}
