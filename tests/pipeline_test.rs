//! End-to-end pipeline tests through the library API
//!
//! A scripted runner stands in for tsc so two consecutive commits can be
//! benchmarked, stored and compared without a Node.js toolchain.

use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use ts_bench::error::PackageError;
use ts_bench::models::{CpuInfo, Package, PackageJob, PackageMetrics, PackageResult, Scan};
use ts_bench::pipeline::WorkerPool;
use ts_bench::reporters::{self, Bucket, Comparison};
use ts_bench::runner::PackageRunner;
use ts_bench::store::HistoryStore;

/// Reports a fixed type count per package; packages without one fail
struct ScriptedRunner {
    types: HashMap<String, u64>,
}

impl ScriptedRunner {
    fn new(types: &[(&str, u64)]) -> Self {
        Self {
            types: types.iter().map(|(n, t)| (n.to_string(), *t)).collect(),
        }
    }
}

impl PackageRunner for ScriptedRunner {
    fn run(&self, job: PackageJob, _cancel: CancellationToken) -> impl Future<Output = PackageResult> + Send {
        let types = self.types.get(&job.package.name).copied();
        async move {
            tokio::task::yield_now().await;
            match types {
                Some(types) => {
                    let mut metrics = PackageMetrics::default();
                    metrics.trace.num_types = types;
                    metrics.diagnostics.types = types;
                    metrics.diagnostics.total_time = types as f64 / 1000.0;
                    PackageResult::success(job.package, job.is_cached, 10.0, metrics)
                }
                None => PackageResult::failure(
                    job.package,
                    5.0,
                    &PackageError::Execution("tsc exited with code 2: error TS2304".to_string()),
                ),
            }
        }
    }
}

fn jobs(names: &[&str]) -> Vec<PackageJob> {
    names
        .iter()
        .map(|name| PackageJob::new(Package::new(*name, format!("/repo/packages/{}", name)), false))
        .collect()
}

fn scan(hash: &str, seconds: i64) -> Scan {
    Scan {
        version: "0.4.0".into(),
        owner: "acme".into(),
        repository: "monorepo".into(),
        commit_hash: hash.into(),
        commit_message: format!("commit {}", hash),
        commit_date: Utc.timestamp_opt(seconds, 0).unwrap(),
        files_changed: 1,
        insertions: 1,
        deletions: 0,
        scanned_at: Utc::now(),
        cpu: CpuInfo {
            model: "Test CPU".into(),
            logical_cores: 8,
        },
        concurrency: 3,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_commits_compared() {
    let store = HistoryStore::in_memory().unwrap();
    let names = ["api", "db", "ui", "web"];

    let first = WorkerPool::new(ScriptedRunner::new(&[("api", 100), ("db", 50), ("ui", 200), ("web", 80)]), 3)
        .run(jobs(&names))
        .await;
    assert_eq!(first.len(), 4);
    let first_scan = scan("aaaaaaaaaaaa", 1_700_000_000);
    store.save_scan(&first_scan, &first).unwrap();

    // ui shrinks, api grows, db unchanged, web breaks
    let second = WorkerPool::new(ScriptedRunner::new(&[("api", 121), ("db", 50), ("ui", 150)]), 3)
        .run(jobs(&names))
        .await;
    let names_in_order: Vec<&str> = second.iter().map(|r| r.name()).collect();
    assert_eq!(names_in_order, names);

    let second_scan = scan("bbbbbbbbbbbb", 1_700_000_100);
    store.save_scan(&second_scan, &second).unwrap();

    let previous = store.find_previous_scan(&second_scan).unwrap().unwrap();
    assert_eq!(previous.scan.commit_hash, "aaaaaaaaaaaa");

    let cmp = Comparison::build(&second_scan, &second, Some(&previous));
    assert_eq!(cmp.count(Bucket::Improved), 1);
    assert_eq!(cmp.count(Bucket::Regressed), 1);
    assert_eq!(cmp.count(Bucket::Unchanged), 1);
    assert_eq!(cmp.count(Bucket::Errored), 1);

    let sorted: Vec<&str> = cmp.packages.iter().map(|p| p.package.as_str()).collect();
    assert_eq!(sorted, vec!["ui", "api", "db", "web"]);

    let api = cmp.packages.iter().find(|p| p.package == "api").unwrap();
    assert_eq!(api.types.as_ref().unwrap().change, "+21.0%");

    let md = reporters::report(&cmp, "markdown").unwrap();
    assert!(md.contains("(compared to aaaaaaaaaaaa)"));
    assert!(md.contains("121 (+21.0%)"));
    assert!(md.contains("TS2304"));
    assert!(md.contains("v0.4.0 (Test CPU x 8)"));
}

#[tokio::test]
async fn test_rerun_of_same_commit_is_idempotent() {
    let store = HistoryStore::in_memory().unwrap();
    let runner = ScriptedRunner::new(&[("api", 100), ("db", 50)]);
    let pool = WorkerPool::new(runner, 2);
    let commit = scan("cccccccccccc", 1_700_000_000);

    let first_id = store.save_scan(&commit, &pool.run(jobs(&["api", "db"])).await).unwrap();
    let second_id = store.save_scan(&commit, &pool.run(jobs(&["api", "db"])).await).unwrap();

    assert_eq!(first_id, second_id);
    assert_eq!(store.scan_count().unwrap(), 1);
    let stored = store.latest_scan().unwrap().unwrap();
    assert_eq!(stored.results.len(), 2);
    assert!(store.find_previous_scan(&commit).unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_run_still_reports_every_package() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let results = WorkerPool::new(ScriptedRunner::new(&[("api", 1)]), 2)
        .with_cancel_token(cancel)
        .run(jobs(&["api", "db", "ui"]))
        .await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.error_code() == Some("CANCELLED")));
}
