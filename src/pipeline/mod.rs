//! Worker Pool
//!
//! Runs the Package Runner over many packages with bounded parallelism:
//! 1. Acquire a semaphore permit (waits while N packages are in flight)
//! 2. Spawn the package task, which releases the permit when it finishes
//! 3. Once everything is dispatched, collect results in dispatch order
//!
//! Cancellation (external token, Ctrl-C, or the run deadline) stops
//! dispatching; in-flight packages kill their processes and report
//! `CANCELLED`, packages that never started are reported the same way.

use crate::error::PackageError;
use crate::models::{Package, PackageJob, PackageResult};
use crate::runner::{self, PackageRunner};
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounded-concurrency executor for package jobs
pub struct WorkerPool<R: PackageRunner> {
    runner: Arc<R>,
    concurrency: usize,
    cancel: CancellationToken,
    deadline: Option<Duration>,
    progress: Option<ProgressBar>,
}

impl<R: PackageRunner> WorkerPool<R> {
    /// Create a pool running at most `concurrency` packages at once (min 1)
    pub fn new(runner: R, concurrency: usize) -> Self {
        Self::from_arc(Arc::new(runner), concurrency)
    }

    pub fn from_arc(runner: Arc<R>, concurrency: usize) -> Self {
        Self {
            runner,
            concurrency: concurrency.max(1),
            cancel: CancellationToken::new(),
            deadline: None,
            progress: None,
        }
    }

    /// Cancel the run when this token fires
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancel the run once it has been going for `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Tick this bar once per finished package
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run every job. Returns exactly one result per job, in input order.
    pub async fn run(&self, jobs: Vec<PackageJob>) -> Vec<PackageResult> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let total = jobs.len();
        info!(
            "Benchmarking {} packages with {} workers",
            total, self.concurrency
        );

        let run_token = self.cancel.child_token();
        let deadline_timer = self.deadline.map(|deadline| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!("Run deadline of {:?} reached, cancelling", deadline);
                token.cancel();
            })
        });

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut dispatched: Vec<(Package, Option<JoinHandle<PackageResult>>)> =
            Vec::with_capacity(total);

        for job in jobs {
            let permit = tokio::select! {
                biased;
                _ = run_token.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                dispatched.push((job.package, None));
                continue;
            };

            let package = job.package.clone();
            let runner = Arc::clone(&self.runner);
            let token = run_token.clone();
            let progress = self.progress.clone();

            debug!("Dispatching {}", package.name);
            let handle = tokio::spawn(async move {
                let result = runner.run(job, token).await;
                drop(permit);
                if let Some(pb) = progress {
                    pb.set_message(result.package.name.clone());
                    pb.inc(1);
                }
                result
            });
            dispatched.push((package, Some(handle)));
        }

        let mut results = Vec::with_capacity(total);
        for (package, handle) in dispatched {
            let result = match handle {
                Some(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Worker for {} failed: {}", package.name, e);
                        if let Some(pb) = &self.progress {
                            pb.inc(1);
                        }
                        PackageResult::failure(
                            package,
                            0.0,
                            &PackageError::Execution(format!("worker task failed: {}", e)),
                        )
                    }
                },
                None => {
                    if let Some(pb) = &self.progress {
                        pb.inc(1);
                    }
                    runner::cancelled(package, 0.0)
                }
            };
            results.push(result);
        }

        if let Some(timer) = deadline_timer {
            timer.abort();
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            "Finished {} packages ({} succeeded, {} failed)",
            total,
            total - failed,
            failed
        );

        results
    }
}
