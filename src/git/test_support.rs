//! Real-git fixtures shared by the workspace, cherry-pick and orchestrator tests.
//!
//! The fixture lays out a temp directory as:
//!
//! ```text
//! <tmp>/remotes/test/repo   bare repository acting as the hosting service
//! <tmp>/seed                working clone used to author commits
//! <tmp>/bot                 the bot's root dir (cache/ and work/)
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::types::{RepoId, Sha};

use super::{CommitIdentity, GitConfig, run_git_stdout, run_git_sync};

const TIMEOUT: Duration = Duration::from_secs(60);

/// Test identity for commits made by the bot.
pub(crate) fn test_identity() -> CommitIdentity {
    CommitIdentity {
        name: "Test".to_string(),
        email: "test@test.com".to_string(),
    }
}

pub(crate) struct TestRemote {
    pub dir: TempDir,
    pub config: GitConfig,
    pub repo: RepoId,
}

impl TestRemote {
    /// Creates a bare remote whose `main` holds a single `README.md` commit.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = RepoId::new("test", "repo");

        let config = GitConfig {
            root_dir: dir.path().join("bot"),
            remote_base: dir.path().join("remotes").to_string_lossy().into_owned(),
            commit_identity: test_identity(),
            timeout: TIMEOUT,
        };

        let fixture = TestRemote { dir, config, repo };

        let bare = fixture.bare_path();
        std::fs::create_dir_all(&bare).unwrap();
        run_git_sync(&bare, &["init", "--bare", "-q"]).unwrap();
        run_git_sync(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]).unwrap();

        let seed = fixture.seed_path();
        std::fs::create_dir_all(&seed).unwrap();
        run_git_sync(&seed, &["init", "-q"]).unwrap();
        run_git_sync(&seed, &["checkout", "-q", "-b", "main"]).unwrap();
        run_git_sync(&seed, &["config", "user.email", "test@test.com"]).unwrap();
        run_git_sync(&seed, &["config", "user.name", "Test"]).unwrap();
        run_git_sync(&seed, &["remote", "add", "origin", bare.to_str().unwrap()]).unwrap();

        std::fs::write(seed.join("README.md"), "# Test\n").unwrap();
        run_git_sync(&seed, &["add", "."]).unwrap();
        run_git_sync(&seed, &["commit", "-q", "-m", "Initial commit"]).unwrap();
        run_git_sync(&seed, &["push", "-q", "origin", "main"]).unwrap();

        fixture
    }

    pub fn bare_path(&self) -> PathBuf {
        self.dir
            .path()
            .join("remotes")
            .join(&self.repo.owner)
            .join(&self.repo.repo)
    }

    pub fn seed_path(&self) -> PathBuf {
        self.dir.path().join("seed")
    }

    /// Creates `branch` from `from` on the remote.
    pub fn create_branch(&self, branch: &str, from: &str) {
        let seed = self.seed_path();
        run_git_sync(&seed, &["checkout", "-q", "-b", branch, from]).unwrap();
        run_git_sync(&seed, &["push", "-q", "origin", branch]).unwrap();
    }

    /// Commits `content` to `file` on `branch` and pushes it.
    pub fn commit_file(&self, branch: &str, file: &str, content: &str, message: &str) -> Sha {
        let seed = self.seed_path();
        run_git_sync(&seed, &["checkout", "-q", branch]).unwrap();
        write_file(&seed, file, content);
        run_git_sync(&seed, &["add", "."]).unwrap();
        run_git_sync(&seed, &["commit", "-q", "-m", message]).unwrap();
        run_git_sync(&seed, &["push", "-q", "origin", branch]).unwrap();
        self.seed_head()
    }

    /// Publishes `sha` as the head of pull request `number`, the way the
    /// hosting service exposes `refs/pull/<n>/head`.
    pub fn publish_pull_ref(&self, number: u64, sha: &Sha) {
        let refspec = format!("{}:refs/pull/{}/head", sha, number);
        run_git_sync(&self.seed_path(), &["push", "-q", "origin", &refspec]).unwrap();
    }

    /// Returns the remote's current head of `branch`, if it exists.
    pub fn remote_branch(&self, branch: &str) -> Option<Sha> {
        run_git_stdout(
            &self.bare_path(),
            &["rev-parse", "--verify", "-q", &format!("refs/heads/{}", branch)],
            TIMEOUT,
        )
        .ok()
        .map(Sha::new)
    }

    fn seed_head(&self) -> Sha {
        Sha::new(run_git_stdout(&self.seed_path(), &["rev-parse", "HEAD"], TIMEOUT).unwrap())
    }
}

pub(crate) fn write_file(dir: &Path, file: &str, content: &str) {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Returns the subjects of the last `n` commits of `rev`, newest first.
pub(crate) fn subjects(workdir: &Path, rev: &str, n: usize) -> Vec<String> {
    run_git_stdout(
        workdir,
        &["log", "--format=%s", &format!("-{}", n), rev],
        TIMEOUT,
    )
    .unwrap()
    .lines()
    .map(str::to_string)
    .collect()
}
