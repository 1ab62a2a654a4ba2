//! Per-package comparison of a run against the previous scan

use crate::models::{PackageMetrics, PackageResult, Scan, ScanRecord};
use serde::Serialize;

/// Percent change between two measurements, rendered for reports.
///
/// - `before == 0` (no baseline) → `"N/A"`
/// - change rounds to 0.0% → `""`
/// - otherwise sign and one decimal: 100 → 121 is `"+21.0%"`, 100 → 92 is `"-8.0%"`
pub fn format_delta(before: f64, after: f64) -> String {
    if before == 0.0 {
        return "N/A".to_string();
    }
    let diff = (after - before) / before.abs() * 100.0;
    let magnitude = format!("{:.1}", diff.abs());
    if magnitude == "0.0" {
        return String::new();
    }
    let sign = if diff >= 0.0 { '+' } else { '-' };
    format!("{}{}%", sign, magnitude)
}

/// Which report section a package lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// Type count went down
    Improved,
    /// Type count went up
    Regressed,
    /// No measurable change, or nothing to compare against
    Unchanged,
    /// The package failed in this run
    Errored,
}

/// One compared measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDelta {
    /// Previous value; `None` without a successful baseline
    pub before: Option<f64>,
    pub after: f64,
    /// Output of [`format_delta`]
    pub change: String,
}

impl MetricDelta {
    fn new(before: Option<f64>, after: f64) -> Self {
        Self {
            before,
            after,
            change: format_delta(before.unwrap_or(0.0), after),
        }
    }

    /// `"121 (+21.0%)"`, `"121"` when unchanged
    pub fn display_with(&self, value: &str) -> String {
        if self.change.is_empty() {
            value.to_string()
        } else {
            format!("{} ({})", value, self.change)
        }
    }
}

/// Comparison row for a single package
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageComparison {
    pub package: String,
    pub bucket: Bucket,
    pub is_cached: bool,
    pub duration_ms: f64,
    pub types: Option<MetricDelta>,
    pub types_file_size: Option<MetricDelta>,
    pub total_time: Option<MetricDelta>,
    pub memory_used: Option<MetricDelta>,
    pub num_hot_spots: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PackageComparison {
    fn build(result: &PackageResult, baseline: Option<&PackageMetrics>) -> Self {
        let Some(metrics) = result.metrics() else {
            return Self {
                package: result.name().to_string(),
                bucket: Bucket::Errored,
                is_cached: result.is_cached,
                duration_ms: result.duration_ms,
                types: None,
                types_file_size: None,
                total_time: None,
                memory_used: None,
                num_hot_spots: None,
                error: result.error().map(str::to_string),
            };
        };

        let before = |f: fn(&PackageMetrics) -> f64| baseline.map(f);
        let types = MetricDelta::new(before(|m| m.trace.num_types as f64), metrics.trace.num_types as f64);

        let bucket = if types.change.starts_with('+') {
            Bucket::Regressed
        } else if types.change.starts_with('-') {
            Bucket::Improved
        } else {
            Bucket::Unchanged
        };

        Self {
            package: result.name().to_string(),
            bucket,
            is_cached: result.is_cached,
            duration_ms: result.duration_ms,
            types_file_size: Some(MetricDelta::new(
                before(|m| m.trace.types_file_size as f64),
                metrics.trace.types_file_size as f64,
            )),
            total_time: Some(MetricDelta::new(
                before(|m| m.diagnostics.total_time),
                metrics.diagnostics.total_time,
            )),
            memory_used: Some(MetricDelta::new(
                before(|m| m.diagnostics.memory_used as f64),
                metrics.diagnostics.memory_used as f64,
            )),
            num_hot_spots: Some(metrics.hot_spots.num_hot_spots),
            types: Some(types),
            error: None,
        }
    }

    fn sort_key(&self) -> f64 {
        self.types.as_ref().map(|t| t.after).unwrap_or(-1.0)
    }
}

/// A run compared against its predecessor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub version: String,
    pub commit_hash: String,
    pub previous_commit_hash: Option<String>,
    pub concurrency: usize,
    pub cpu_model: String,
    pub logical_cores: usize,
    /// Sorted by type count descending, then name; failures last
    pub packages: Vec<PackageComparison>,
}

impl Comparison {
    /// Compare `results` of `scan` with the `previous` scan's results.
    ///
    /// A package only has a baseline if it succeeded in the previous scan.
    pub fn build(scan: &Scan, results: &[PackageResult], previous: Option<&ScanRecord>) -> Self {
        let mut packages: Vec<PackageComparison> = results
            .iter()
            .map(|result| {
                let baseline = previous
                    .and_then(|p| p.result_for(result.name()))
                    .and_then(PackageResult::metrics);
                PackageComparison::build(result, baseline)
            })
            .collect();

        packages.sort_by(|a, b| {
            b.sort_key()
                .total_cmp(&a.sort_key())
                .then_with(|| a.package.cmp(&b.package))
        });

        Self {
            version: scan.version.clone(),
            commit_hash: scan.commit_hash.clone(),
            previous_commit_hash: previous.map(|p| p.scan.commit_hash.clone()),
            concurrency: scan.concurrency,
            cpu_model: scan.cpu.model.clone(),
            logical_cores: scan.cpu.logical_cores,
            packages,
        }
    }

    /// Compare a stored scan with its predecessor
    pub fn from_records(current: &ScanRecord, previous: Option<&ScanRecord>) -> Self {
        Self::build(&current.scan, &current.results, previous)
    }

    pub fn bucket(&self, bucket: Bucket) -> impl Iterator<Item = &PackageComparison> {
        self.packages.iter().filter(move |p| p.bucket == bucket)
    }

    pub fn count(&self, bucket: Bucket) -> usize {
        self.bucket(bucket).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackageError;
    use crate::models::{CpuInfo, Package};
    use chrono::Utc;

    fn scan(commit: &str) -> Scan {
        Scan {
            version: "0.4.0".into(),
            owner: "acme".into(),
            repository: "web".into(),
            commit_hash: commit.into(),
            commit_message: String::new(),
            commit_date: Utc::now(),
            files_changed: 0,
            insertions: 0,
            deletions: 0,
            scanned_at: Utc::now(),
            cpu: CpuInfo {
                model: "Test CPU".into(),
                logical_cores: 8,
            },
            concurrency: 6,
        }
    }

    fn success(name: &str, types: u64, total_time: f64) -> PackageResult {
        let mut metrics = PackageMetrics::default();
        metrics.trace.num_types = types;
        metrics.trace.types_file_size = types * 10;
        metrics.diagnostics.total_time = total_time;
        metrics.diagnostics.memory_used = 1000;
        PackageResult::success(Package::new(name, "/repo"), false, 5.0, metrics)
    }

    fn failure(name: &str) -> PackageResult {
        PackageResult::failure(
            Package::new(name, "/repo"),
            5.0,
            &PackageError::Execution("tsc exited with code 2: boom".into()),
        )
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(100.0, 121.0), "+21.0%");
        assert_eq!(format_delta(100.0, 92.0), "-8.0%");
        assert_eq!(format_delta(0.0, 50.0), "N/A");
        assert_eq!(format_delta(100.0, 100.0), "");
        assert_eq!(format_delta(100000.0, 100004.0), "");
        assert_eq!(format_delta(3.0, 4.0), "+33.3%");
    }

    #[test]
    fn test_buckets() {
        let previous = ScanRecord {
            id: 1,
            scan: scan("prev"),
            results: vec![
                success("grew", 100, 1.0),
                success("shrank", 100, 1.0),
                success("same", 100, 1.0),
                failure("was-broken"),
            ],
        };
        let results = vec![
            success("grew", 121, 1.5),
            success("shrank", 92, 1.0),
            success("same", 100, 2.0),
            success("was-broken", 10, 1.0),
            success("new", 10, 1.0),
            failure("broken"),
        ];

        let cmp = Comparison::build(&scan("cur"), &results, Some(&previous));

        assert_eq!(cmp.previous_commit_hash.as_deref(), Some("prev"));
        assert_eq!(cmp.packages.len(), 6);
        let bucket_of = |name: &str| {
            cmp.packages
                .iter()
                .find(|p| p.package == name)
                .map(|p| p.bucket)
                .unwrap()
        };
        assert_eq!(bucket_of("grew"), Bucket::Regressed);
        assert_eq!(bucket_of("shrank"), Bucket::Improved);
        assert_eq!(bucket_of("same"), Bucket::Unchanged);
        assert_eq!(bucket_of("was-broken"), Bucket::Unchanged);
        assert_eq!(bucket_of("new"), Bucket::Unchanged);
        assert_eq!(bucket_of("broken"), Bucket::Errored);

        let grew = cmp.packages.iter().find(|p| p.package == "grew").unwrap();
        assert_eq!(grew.types.as_ref().unwrap().change, "+21.0%");
        assert_eq!(grew.total_time.as_ref().unwrap().change, "+50.0%");

        let new = cmp.packages.iter().find(|p| p.package == "new").unwrap();
        assert_eq!(new.types.as_ref().unwrap().change, "N/A");
        assert_eq!(new.types.as_ref().unwrap().before, None);

        let broken = cmp.packages.iter().find(|p| p.package == "broken").unwrap();
        assert!(broken.error.as_deref().unwrap().contains("boom"));
    }

    #[test]
    fn test_no_previous_scan() {
        let cmp = Comparison::build(&scan("cur"), &[success("a", 5, 1.0)], None);
        assert_eq!(cmp.previous_commit_hash, None);
        assert_eq!(cmp.packages[0].bucket, Bucket::Unchanged);
        assert_eq!(cmp.count(Bucket::Unchanged), 1);
    }

    #[test]
    fn test_sorted_by_types_then_name() {
        let results = vec![
            failure("z-broken"),
            success("b", 10, 1.0),
            success("a", 10, 1.0),
            success("c", 500, 1.0),
        ];
        let cmp = Comparison::build(&scan("cur"), &results, None);
        let names: Vec<&str> = cmp.packages.iter().map(|p| p.package.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b", "z-broken"]);
    }

    #[test]
    fn test_display_with() {
        let delta = MetricDelta::new(Some(100.0), 121.0);
        assert_eq!(delta.display_with("121"), "121 (+21.0%)");
        let same = MetricDelta::new(Some(100.0), 100.0);
        assert_eq!(same.display_with("100"), "100");
    }
}
