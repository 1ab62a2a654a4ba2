//! Git metadata for scans
//!
//! Provides the commit a scan is recorded against, the repository identity
//! (owner/name) scans are grouped by, and commit listing plus checkout for
//! benchmarking a span of history.
//!
//! # Example
//!
//! ```no_run
//! use ts_bench::git::{GitHistory, RepoIdentity};
//! use std::path::Path;
//!
//! let history = GitHistory::open(Path::new("/path/to/repo")).unwrap();
//! let head = history.head_commit().unwrap();
//! let identity = RepoIdentity::resolve(&history);
//! println!("{}/{} @ {}", identity.owner, identity.repository, head.short_hash());
//! ```

pub mod history;

pub use history::{CommitInfo, GitHistory, HeadRef};

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Environment variable CI systems set to `owner/repo`
pub const GITHUB_REPOSITORY_ENV: &str = "GITHUB_REPOSITORY";

const UNKNOWN: &str = "unknown";

/// Owner and name a repository's scans are stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentity {
    pub owner: String,
    pub repository: String,
}

static REMOTE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn get_remote_pattern() -> &'static Regex {
    // git@host:owner/repo.git, https://host/owner/repo(.git), ssh://git@host/owner/repo
    REMOTE_PATTERN.get_or_init(|| {
        Regex::new(r"[:/]([^/:]+)/([^/]+?)(?:\.git)?/?$").expect("valid remote url regex")
    })
}

impl RepoIdentity {
    /// `GITHUB_REPOSITORY` wins, then `remote.origin.url`, then the
    /// working directory name with an unknown owner.
    pub fn resolve(history: &GitHistory) -> Self {
        let from_env = std::env::var(GITHUB_REPOSITORY_ENV).ok();
        let origin = history.origin_url();
        let dir_name = history
            .repo_root()
            .ok()
            .and_then(|root| root.file_name())
            .map(|name| name.to_string_lossy().to_string());

        Self::from_sources(from_env.as_deref(), origin.as_deref(), dir_name.as_deref())
    }

    fn from_sources(env: Option<&str>, origin: Option<&str>, dir_name: Option<&str>) -> Self {
        if let Some(identity) = env.and_then(parse_full_name) {
            debug!("Repository identity from {}", GITHUB_REPOSITORY_ENV);
            return identity;
        }
        if let Some(identity) = origin.and_then(parse_remote_url) {
            debug!("Repository identity from origin remote");
            return identity;
        }
        Self {
            owner: UNKNOWN.to_string(),
            repository: dir_name.unwrap_or(UNKNOWN).to_string(),
        }
    }
}

/// `owner/repo`
fn parse_full_name(full_name: &str) -> Option<RepoIdentity> {
    let (owner, repository) = full_name.trim().split_once('/')?;
    if owner.is_empty() || repository.is_empty() || repository.contains('/') {
        return None;
    }
    Some(RepoIdentity {
        owner: owner.to_string(),
        repository: repository.to_string(),
    })
}

/// Parse owner and name out of a remote URL
pub fn parse_remote_url(url: &str) -> Option<RepoIdentity> {
    let caps = get_remote_pattern().captures(url.trim())?;
    Some(RepoIdentity {
        owner: caps.get(1)?.as_str().to_string(),
        repository: caps.get(2)?.as_str().to_string(),
    })
}
