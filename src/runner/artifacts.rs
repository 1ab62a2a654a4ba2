//! Trace bundle files written by `tsc --generateTrace`
//!
//! Layout of a package's trace directory:
//!
//! ```text
//! <package>/.tsbench-trace/
//!   trace.json        (array of trace events)
//!   types.json        (array of type descriptors)
//!   analyze.json      (analyzer stdout, written by the runner)
//!   diagnostics.txt   (compiler stdout, written by the runner)
//! ```

use crate::error::PackageError;
use serde::de::{IgnoredAny, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer as _, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default trace directory name inside each package
pub const TRACE_DIR: &str = ".tsbench-trace";

pub const TRACE_FILE: &str = "trace.json";
pub const TYPES_FILE: &str = "types.json";
pub const ANALYZE_FILE: &str = "analyze.json";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.txt";

/// Counts and sizes of the trace bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceMetrics {
    /// Top-level elements of `types.json`
    pub num_types: u64,
    /// Top-level elements of `trace.json`
    pub num_trace_events: u64,
    /// Bytes
    pub types_file_size: u64,
    /// Bytes
    pub trace_file_size: u64,
}

/// One parsed JSON array file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArrayFile {
    len: u64,
    size: u64,
}

async fn read_array_file(path: &Path) -> Result<ArrayFile, PackageError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PackageError::Artifact(format!("failed to read {}: {}", path.display(), e)))?;

    let len = count_array_elements(&bytes).map_err(|e| {
        if e.is_data() {
            PackageError::Artifact(format!("{} is not a JSON array: {}", path.display(), e))
        } else {
            PackageError::Artifact(format!("failed to parse {}: {}", path.display(), e))
        }
    })?;

    Ok(ArrayFile {
        len,
        size: bytes.len() as u64,
    })
}

/// Counts the elements of a top-level JSON array, skipping their content
struct ElementCount;

impl<'de> Visitor<'de> for ElementCount {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<u64, A::Error> {
        let mut len = 0;
        while seq.next_element::<IgnoredAny>()?.is_some() {
            len += 1;
        }
        Ok(len)
    }
}

/// Validates the array and counts its elements without keeping them
fn count_array_elements(bytes: &[u8]) -> Result<u64, serde_json::Error> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let len = (&mut de).deserialize_seq(ElementCount)?;
    de.end()?;
    Ok(len)
}

/// Read `trace.json` and `types.json` from a freshly generated bundle.
///
/// Both files must exist and parse.
pub async fn read_trace_metrics(trace_dir: &Path) -> Result<TraceMetrics, PackageError> {
    let trace = read_array_file(&trace_dir.join(TRACE_FILE)).await?;
    let types = read_array_file(&trace_dir.join(TYPES_FILE)).await?;

    Ok(TraceMetrics {
        num_types: types.len,
        num_trace_events: trace.len,
        types_file_size: types.size,
        trace_file_size: trace.size,
    })
}

/// Read whatever a previous run left behind. Missing or unreadable files
/// count as zero.
pub async fn read_cached_trace_metrics(trace_dir: &Path) -> TraceMetrics {
    let trace = read_array_file(&trace_dir.join(TRACE_FILE)).await;
    let types = read_array_file(&trace_dir.join(TYPES_FILE)).await;

    if let Err(e) = trace.as_ref().and(types.as_ref()) {
        debug!("Cached trace bundle incomplete: {}", e);
    }

    let trace = trace.unwrap_or(ArrayFile { len: 0, size: 0 });
    let types = types.unwrap_or(ArrayFile { len: 0, size: 0 });

    TraceMetrics {
        num_types: types.len,
        num_trace_events: trace.len,
        types_file_size: types.size,
        trace_file_size: trace.size,
    }
}

/// Read a text artifact if present
pub async fn read_optional(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok()
}

/// Remove and recreate the trace directory so stale files never leak into a run
pub async fn reset_trace_dir(trace_dir: &Path) -> Result<(), PackageError> {
    match tokio::fs::remove_dir_all(trace_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(PackageError::Execution(format!(
                "failed to clear {}: {}",
                trace_dir.display(),
                e
            )))
        }
    }
    tokio::fs::create_dir_all(trace_dir).await.map_err(|e| {
        PackageError::Execution(format!("failed to create {}: {}", trace_dir.display(), e))
    })
}

/// Trace directory for a package
pub fn trace_dir_for(package_dir: &Path, dir_name: &str) -> PathBuf {
    package_dir.join(dir_name)
}
