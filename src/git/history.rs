//! Commit metadata, listing and checkout using libgit2
//!
//! Uses the git2 crate (Rust bindings to libgit2).

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use git2::{build::CheckoutBuilder, Oid, Repository, Sort, StatusOptions};
use std::path::Path;
use tracing::{debug, info};

/// Information about a git commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full commit hash
    pub hash: String,
    /// First line of the commit message
    pub message: String,
    /// Author date, kept by rebases and cherry-picks
    pub date: DateTime<Utc>,
    /// Files changed relative to the first parent
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl CommitInfo {
    /// Short hash (12 characters)
    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(12)]
    }
}

/// Where HEAD pointed before a checkout, so it can be put back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadRef {
    Branch(String),
    Detached(String),
}

/// Git repository access using libgit2.
pub struct GitHistory {
    repo: Repository,
}

impl GitHistory {
    /// Open a git repository.
    ///
    /// # Arguments
    /// * `path` - Path to the repository (or any subdirectory)
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .with_context(|| format!("Failed to open git repository at {:?}", path))?;
        debug!("Opened git repository at {:?}", repo.path());
        Ok(Self { repo })
    }

    /// Get the repository root path.
    pub fn repo_root(&self) -> Result<&Path> {
        self.repo
            .workdir()
            .context("Repository has no working directory (bare repo?)")
    }

    /// `remote.origin.url`, if configured
    pub fn origin_url(&self) -> Option<String> {
        self.repo
            .find_remote("origin")
            .ok()
            .and_then(|remote| remote.url().map(str::to_string))
    }

    /// Metadata of the commit HEAD points at
    pub fn head_commit(&self) -> Result<CommitInfo> {
        let head = self
            .repo
            .head()
            .context("Repository has no commits yet; commit before benchmarking")?;
        let commit = head.peel_to_commit()?;
        self.extract_commit_info(&commit)
    }

    /// Recent commits reachable from HEAD, newest first.
    ///
    /// # Arguments
    /// * `max_commits` - Maximum number of commits to return
    /// * `skip` - Commits to step over between two returned commits
    pub fn get_recent_commits(&self, max_commits: usize, skip: usize) -> Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push_head()?;

        let mut commits = Vec::new();
        for oid_result in revwalk.step_by(skip + 1) {
            if commits.len() >= max_commits {
                break;
            }
            let commit = self.repo.find_commit(oid_result?)?;
            commits.push(self.extract_commit_info(&commit)?);
        }

        Ok(commits)
    }

    /// Whether tracked files have uncommitted changes
    pub fn is_dirty(&self) -> Result<bool> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    /// Current HEAD, for [`GitHistory::restore`]
    pub fn current_head(&self) -> Result<HeadRef> {
        let head = self.repo.head()?;
        if head.is_branch() {
            let name = head.name().context("HEAD branch name is not UTF-8")?;
            return Ok(HeadRef::Branch(name.to_string()));
        }
        let oid = head.target().context("HEAD does not point at a commit")?;
        Ok(HeadRef::Detached(oid.to_string()))
    }

    /// Check out `hash` with a detached HEAD.
    ///
    /// With `force`, local modifications to tracked files are discarded.
    pub fn checkout(&self, hash: &str, force: bool) -> Result<()> {
        let oid = Oid::from_str(hash).with_context(|| format!("Invalid commit hash {}", hash))?;
        let commit = self.repo.find_commit(oid)?;

        let mut opts = CheckoutBuilder::new();
        if force {
            opts.force();
        } else {
            opts.safe();
        }
        self.repo
            .checkout_tree(commit.as_object(), Some(&mut opts))
            .with_context(|| format!("Failed to check out {}", hash))?;
        self.repo.set_head_detached(oid)?;

        info!("Checked out {}", &hash[..hash.len().min(12)]);
        Ok(())
    }

    /// Put HEAD back where [`GitHistory::current_head`] found it
    pub fn restore(&self, head: &HeadRef, force: bool) -> Result<()> {
        match head {
            HeadRef::Detached(hash) => self.checkout(hash, force),
            HeadRef::Branch(name) => {
                let reference = self.repo.find_reference(name)?;
                let Some(oid) = reference.target() else {
                    bail!("Branch {} does not point at a commit", name);
                };
                let commit = self.repo.find_commit(oid)?;
                let mut opts = CheckoutBuilder::new();
                if force {
                    opts.force();
                } else {
                    opts.safe();
                }
                self.repo
                    .checkout_tree(commit.as_object(), Some(&mut opts))
                    .with_context(|| format!("Failed to restore {}", name))?;
                self.repo.set_head(name)?;
                info!("Restored {}", name);
                Ok(())
            }
        }
    }

    /// Extract commit information from a git2 Commit object.
    fn extract_commit_info(&self, commit: &git2::Commit) -> Result<CommitInfo> {
        let message = commit
            .message()
            .unwrap_or("")
            .lines()
            .next()
            .unwrap_or("")
            .to_string();

        let parent = commit.parent(0).ok();
        let tree = commit.tree()?;
        let parent_tree = parent.as_ref().map(|p| p.tree()).transpose()?;

        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        let stats = diff.stats()?;

        Ok(CommitInfo {
            hash: commit.id().to_string(),
            message,
            date: git_time_to_utc(&commit.author().when()),
            files_changed: stats.files_changed(),
            insertions: stats.insertions(),
            deletions: stats.deletions(),
        })
    }
}

fn git_time_to_utc(time: &git2::Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.seconds(), 0)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use git2::Signature;
    use tempfile::TempDir;

    /// Commit `content` to `file` in `repo`, with a commit time of `seconds`
    pub(crate) fn commit_file(repo: &Repository, file: &str, content: &str, message: &str, seconds: i64) -> Oid {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(file), content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();

        let sig = Signature::new("Test", "test@example.com", &git2::Time::new(seconds, 0)).unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    pub(crate) fn init_repo() -> (TempDir, Repository) {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        (tmp, repo)
    }

    #[test]
    fn test_head_commit() {
        let (tmp, repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "first", 1_700_000_000);
        commit_file(&repo, "a.txt", "one\ntwo\nthree\n", "second\n\nbody", 1_700_000_100);

        let history = GitHistory::open(tmp.path()).unwrap();
        let head = history.head_commit().unwrap();
        assert_eq!(head.message, "second");
        assert_eq!(head.files_changed, 1);
        assert_eq!(head.insertions, 2);
        assert_eq!(head.deletions, 0);
        assert_eq!(head.date.timestamp(), 1_700_000_100);
        assert_eq!(head.hash.len(), 40);
        assert_eq!(head.short_hash().len(), 12);
    }

    #[test]
    fn test_date_is_author_date() {
        let (tmp, repo) = init_repo();
        std::fs::write(tmp.path().join("a.txt"), "one\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("a.txt")).unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

        // rebased: authored long before it was committed
        let author = Signature::new("Author", "a@example.com", &git2::Time::new(1_600_000_000, 0)).unwrap();
        let committer = Signature::new("Rebaser", "r@example.com", &git2::Time::new(1_700_000_000, 0)).unwrap();
        repo.commit(Some("HEAD"), &author, &committer, "rebased", &tree, &[])
            .unwrap();

        let head = GitHistory::open(tmp.path()).unwrap().head_commit().unwrap();
        assert_eq!(head.date.timestamp(), 1_600_000_000);
    }

    #[test]
    fn test_empty_repo_has_no_head() {
        let (tmp, _repo) = init_repo();
        let history = GitHistory::open(tmp.path()).unwrap();
        assert!(history.head_commit().is_err());
    }

    #[test]
    fn test_recent_commits_with_skip() {
        let (tmp, repo) = init_repo();
        for i in 0..6 {
            commit_file(&repo, "a.txt", &format!("{}\n", i), &format!("c{}", i), 1_700_000_000 + i);
        }
        let history = GitHistory::open(tmp.path()).unwrap();

        let all: Vec<String> = history
            .get_recent_commits(3, 0)
            .unwrap()
            .into_iter()
            .map(|c| c.message)
            .collect();
        assert_eq!(all, vec!["c5", "c4", "c3"]);

        let stepped: Vec<String> = history
            .get_recent_commits(10, 1)
            .unwrap()
            .into_iter()
            .map(|c| c.message)
            .collect();
        assert_eq!(stepped, vec!["c5", "c3", "c1"]);
    }

    #[test]
    fn test_checkout_and_restore() {
        let (tmp, repo) = init_repo();
        let first = commit_file(&repo, "a.txt", "old\n", "first", 1_700_000_000);
        commit_file(&repo, "a.txt", "new\n", "second", 1_700_000_100);

        let history = GitHistory::open(tmp.path()).unwrap();
        let original = history.current_head().unwrap();
        assert!(matches!(original, HeadRef::Branch(_)));
        assert!(!history.is_dirty().unwrap());

        history.checkout(&first.to_string(), false).unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "old\n");
        assert_eq!(history.head_commit().unwrap().message, "first");

        history.restore(&original, false).unwrap();
        assert_eq!(std::fs::read_to_string(tmp.path().join("a.txt")).unwrap(), "new\n");
        assert_eq!(history.current_head().unwrap(), original);
    }

    #[test]
    fn test_dirty_worktree() {
        let (tmp, repo) = init_repo();
        commit_file(&repo, "a.txt", "old\n", "first", 1_700_000_000);
        let history = GitHistory::open(tmp.path()).unwrap();

        std::fs::write(tmp.path().join("untracked.txt"), "x").unwrap();
        assert!(!history.is_dirty().unwrap());

        std::fs::write(tmp.path().join("a.txt"), "changed\n").unwrap();
        assert!(history.is_dirty().unwrap());
    }
}
