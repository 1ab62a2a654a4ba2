//! Data path utilities - uses ~/.cache/ts-bench/<repo-hash>/ so benchmark
//! history never lands in the analysed repository.

use crate::store::DB_FILE;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// Get the data directory for a repository.
/// Uses ~/.cache/ts-bench/<repo-hash>/ on Unix, %LOCALAPPDATA%/ts-bench/<repo-hash>/ on Windows.
pub fn get_cache_dir(repo_path: &Path) -> PathBuf {
    let repo_hash = hash_path(repo_path);

    let base = if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")))
    } else {
        dirs::cache_dir().unwrap_or_else(|| {
            // Fallback to ~/.cache
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    };

    base.join("ts-bench").join(&repo_hash)
}

/// Default history database path for a repository.
pub fn history_db_path(repo_path: &Path) -> PathBuf {
    get_cache_dir(repo_path).join(DB_FILE)
}

/// Hash a path to create a unique but deterministic directory name.
/// Uses the canonical path so `.` and the absolute path agree.
/// xxh3 output is fixed across Rust releases.
fn hash_path(path: &Path) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let path_str = canonical.to_string_lossy();
    let hash = xxh3_64(path_str.as_bytes());

    let repo_name = canonical
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(20)
        .collect::<String>();

    format!("{}-{:016x}", repo_name, hash)
}
