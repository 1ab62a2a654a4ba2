//! Per-package error taxonomy
//!
//! Package errors never abort a run. They are captured into the package's
//! [`PackageResult`](crate::models::PackageResult); only infrastructure
//! failures (storage, git, runtime) propagate as `anyhow::Error`.

use thiserror::Error;

/// Errors that can occur while benchmarking a single package
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackageError {
    /// Compiler could not be spawned or exited non-zero
    #[error("{0}")]
    Execution(String),

    /// Trace bundle missing or unparsable after a successful compile
    #[error("{0}")]
    Artifact(String),

    /// Hot-spot analysis failed; degrades enrichment metrics only
    #[error("{0}")]
    Analysis(String),

    /// Run was cancelled or hit its deadline before the package finished
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl PackageError {
    /// Stable code persisted with failed results
    pub fn code(&self) -> &'static str {
        match self {
            PackageError::Execution(_) => "EXECUTION_ERROR",
            PackageError::Artifact(_) => "ARTIFACT_READ_ERROR",
            PackageError::Analysis(_) => "ANALYSIS_ERROR",
            PackageError::Cancelled(_) => "CANCELLED",
        }
    }

    /// Whether this error fails the package (analysis errors only degrade it)
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PackageError::Analysis(_))
    }
}
