//! Repository Acquirer: resolve a [`RepoReference`] to a working tree.
//!
//! Remote repositories are cloned into `{repo_dir}/{repo_id}`. Clones go
//! to a private staging directory first and are swapped into place only
//! after they succeed, so a half-cloned tree is never visible under the
//! repository's path.
//!
//! ```text
//! acquire(ref)
//!   ├─ local  ─────────────▶ use the directory in place
//!   └─ remote
//!        ├─ marker fresh ──▶ reuse {repo_dir}/{repo_id}
//!        └─ stale/missing
//!             clone ─▶ {repo_dir}/.staging/{repo_id}-{uuid}   (bounded by clone_timeout)
//!             write .scout-acquired marker
//!             rename old tree aside, rename staging into place, remove old tree
//! ```
//!
//! Refreshing is always a full re-clone; trees are replaced, never merged.
//! Failures and timeouts remove the staging directory and leave any
//! previous tree untouched.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scout_core::identity::RepoReference;
use scout_core::{AcquisitionFailure, ScoutError, ScoutResult};
use tokio::process::Command;

use crate::config::Config;

/// Name of the file that records when a cloned tree was acquired.
pub const MARKER_FILE: &str = ".scout-acquired";

const STAGING_DIR: &str = ".staging";

/// A materialized repository on local storage.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    pub repo_id: String,
    pub path: PathBuf,
    pub acquired_at: DateTime<Utc>,
    /// `true` when a cached tree was reused without cloning.
    pub reused: bool,
}

/// Strategy for materializing a remote repository into an empty directory.
#[async_trait]
pub trait Cloner: Send + Sync {
    async fn clone_repo(&self, reference: &RepoReference, dest: &Path) -> ScoutResult<()>;
}

/// Hook invoked after every successful remote acquisition, for capacity
/// management of the repository cache.
pub trait CachePruner: Send + Sync {
    fn after_acquire(&self, repo_dir: &Path, tree: &WorkingTree);
}

/// Keeps every cached tree.
pub struct NoopPruner;

impl CachePruner for NoopPruner {
    fn after_acquire(&self, _repo_dir: &Path, _tree: &WorkingTree) {}
}

/// Clones with the `git` executable.
pub struct GitCloner {
    pub shallow: bool,
}

#[async_trait]
impl Cloner for GitCloner {
    async fn clone_repo(&self, reference: &RepoReference, dest: &Path) -> ScoutResult<()> {
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--quiet"]);
        if self.shallow {
            cmd.args(["--depth", "1"]);
        }
        if let Some(branch) = &reference.branch {
            cmd.args(["--branch", branch, "--single-branch"]);
        }
        cmd.arg(&reference.location)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ScoutError::acquisition(
                    AcquisitionFailure::Unreachable,
                    "failed to execute 'git clone': is git installed?",
                )
            } else {
                io_failure(e, "failed to execute 'git clone'")
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(ScoutError::acquisition(
                classify_git_failure(stderr),
                format!("git clone {} failed: {}", reference.location, stderr),
            ));
        }
        Ok(())
    }
}

/// Map `git clone` stderr to an acquisition failure reason.
pub fn classify_git_failure(stderr: &str) -> AcquisitionFailure {
    let s = stderr.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| s.contains(n));
    if any(&["no space left on device", "disk quota exceeded"]) {
        AcquisitionFailure::DiskSpace
    } else if any(&[
        "authentication failed",
        "could not read username",
        "could not read password",
        "permission denied",
        "terminal prompts disabled",
        "403",
    ]) {
        AcquisitionFailure::Authentication
    } else if any(&[
        "could not resolve host",
        "unable to access",
        "connection refused",
        "connection timed out",
        "repository not found",
        "does not exist",
        "not found",
        "network is unreachable",
    ]) {
        AcquisitionFailure::Unreachable
    } else {
        AcquisitionFailure::Other
    }
}

fn io_failure(e: io::Error, what: &str) -> ScoutError {
    // ENOSPC / EDQUOT
    let reason = match e.raw_os_error() {
        Some(28) | Some(122) => AcquisitionFailure::DiskSpace,
        _ => AcquisitionFailure::Other,
    };
    ScoutError::acquisition(reason, format!("{what}: {e}"))
}

pub struct Acquirer {
    repo_dir: PathBuf,
    ttl: chrono::Duration,
    clone_timeout: Duration,
    cloner: Arc<dyn Cloner>,
    pruner: Arc<dyn CachePruner>,
}

impl Acquirer {
    pub fn new(
        repo_dir: PathBuf,
        ttl: chrono::Duration,
        clone_timeout: Duration,
        cloner: Arc<dyn Cloner>,
    ) -> Self {
        Self {
            repo_dir,
            ttl,
            clone_timeout,
            cloner,
            pruner: Arc::new(NoopPruner),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.storage.repo_dir.clone(),
            config.cache.ttl(),
            config.cache.clone_timeout(),
            Arc::new(GitCloner {
                shallow: config.cache.shallow_clone,
            }),
        )
    }

    pub fn with_pruner(mut self, pruner: Arc<dyn CachePruner>) -> Self {
        self.pruner = pruner;
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Where the working tree for `reference` lives (or would live).
    pub fn tree_path(&self, reference: &RepoReference) -> PathBuf {
        if reference.is_remote() {
            self.repo_dir.join(reference.repo_id())
        } else {
            PathBuf::from(&reference.location)
        }
    }

    pub async fn acquire(&self, reference: &RepoReference) -> ScoutResult<WorkingTree> {
        if reference.is_remote() {
            self.acquire_remote(reference).await
        } else {
            acquire_local(reference).await
        }
    }

    /// The cached tree for a remote reference, if one exists.
    pub async fn cached_tree(&self, reference: &RepoReference) -> Option<WorkingTree> {
        if !reference.is_remote() {
            return None;
        }
        let path = self.tree_path(reference);
        let acquired_at = read_marker(&path).await?;
        Some(WorkingTree {
            repo_id: reference.repo_id(),
            path,
            acquired_at,
            reused: true,
        })
    }

    /// Remove the cached clone of a remote reference. Local trees are never
    /// touched. Returns whether anything was removed.
    pub async fn evict(&self, reference: &RepoReference) -> ScoutResult<bool> {
        if !reference.is_remote() {
            return Ok(false);
        }
        let path = self.tree_path(reference);
        if tokio::fs::metadata(&path).await.is_err() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|e| io_failure(e, &format!("failed to remove {}", path.display())))?;
        Ok(true)
    }

    async fn acquire_remote(&self, reference: &RepoReference) -> ScoutResult<WorkingTree> {
        let repo_id = reference.repo_id();
        let dest = self.repo_dir.join(&repo_id);

        if let Some(acquired_at) = read_marker(&dest).await {
            if Utc::now().signed_duration_since(acquired_at) < self.ttl {
                tracing::debug!(repo_id = %repo_id, "reusing cached working tree");
                return Ok(WorkingTree {
                    repo_id,
                    path: dest,
                    acquired_at,
                    reused: true,
                });
            }
        }

        let staging_root = self.repo_dir.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging_root).await.map_err(|e| {
            io_failure(e, &format!("failed to create {}", staging_root.display()))
        })?;
        let staging = staging_root.join(format!("{}-{}", repo_id, uuid::Uuid::new_v4()));

        tracing::info!(repo = %reference.location, repo_id = %repo_id, "cloning repository");
        let started = std::time::Instant::now();
        let outcome =
            tokio::time::timeout(self.clone_timeout, self.cloner.clone_repo(reference, &staging))
                .await;
        let cloned = match outcome {
            Ok(result) => result,
            Err(_) => Err(ScoutError::acquisition(
                AcquisitionFailure::Timeout,
                format!(
                    "cloning {} exceeded {}s",
                    reference.location,
                    self.clone_timeout.as_secs()
                ),
            )),
        };
        if let Err(e) = cloned {
            discard(&staging).await;
            return Err(e);
        }

        let acquired_at = Utc::now();
        if let Err(e) = tokio::fs::write(staging.join(MARKER_FILE), acquired_at.to_rfc3339()).await
        {
            discard(&staging).await;
            return Err(io_failure(e, "failed to write acquisition marker"));
        }

        self.swap_into_place(&staging, &dest, &staging_root, &repo_id)
            .await?;
        tracing::info!(
            repo_id = %repo_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "clone complete"
        );

        let tree = WorkingTree {
            repo_id,
            path: dest,
            acquired_at,
            reused: false,
        };
        self.pruner.after_acquire(&self.repo_dir, &tree);
        Ok(tree)
    }

    async fn swap_into_place(
        &self,
        staging: &Path,
        dest: &Path,
        staging_root: &Path,
        repo_id: &str,
    ) -> ScoutResult<()> {
        let previous = if tokio::fs::metadata(dest).await.is_ok() {
            let aside = staging_root.join(format!("{}-old-{}", repo_id, uuid::Uuid::new_v4()));
            if let Err(e) = tokio::fs::rename(dest, &aside).await {
                discard(staging).await;
                return Err(io_failure(e, "failed to move previous working tree aside"));
            }
            Some(aside)
        } else {
            None
        };

        if let Err(e) = tokio::fs::rename(staging, dest).await {
            if let Some(aside) = &previous {
                if let Err(restore) = tokio::fs::rename(aside, dest).await {
                    tracing::warn!("failed to restore previous tree for {repo_id}: {restore:#}");
                }
            }
            discard(staging).await;
            return Err(io_failure(e, "failed to move clone into place"));
        }

        if let Some(aside) = previous {
            discard(&aside).await;
        }
        Ok(())
    }
}

async fn acquire_local(reference: &RepoReference) -> ScoutResult<WorkingTree> {
    let path = PathBuf::from(&reference.location);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_dir() => Ok(WorkingTree {
            repo_id: reference.repo_id(),
            path,
            acquired_at: Utc::now(),
            reused: true,
        }),
        Ok(_) => Err(ScoutError::acquisition(
            AcquisitionFailure::InvalidReference,
            format!("{} is not a directory", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ScoutError::acquisition(
            AcquisitionFailure::InvalidReference,
            format!("{} does not exist", path.display()),
        )),
        Err(e) => Err(io_failure(e, &format!("cannot access {}", path.display()))),
    }
}

async fn read_marker(tree: &Path) -> Option<DateTime<Utc>> {
    let raw = tokio::fs::read_to_string(tree.join(MARKER_FILE)).await.ok()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("failed to remove {}: {e:#}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Writes `clone-{n}.txt` into the destination, counting calls.
    struct FakeCloner {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl FakeCloner {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }
    }

    #[async_trait]
    impl Cloner for FakeCloner {
        async fn clone_repo(&self, _reference: &RepoReference, dest: &Path) -> ScoutResult<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::create_dir_all(dest).await.unwrap();
            tokio::fs::write(dest.join(format!("clone-{n}.txt")), "partial")
                .await
                .unwrap();
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ScoutError::acquisition(
                    AcquisitionFailure::Unreachable,
                    "remote hung up",
                ));
            }
            Ok(())
        }
    }

    fn remote() -> RepoReference {
        RepoReference::parse("https://github.com/acme/widgets").unwrap()
    }

    fn staging_is_empty(root: &Path) -> bool {
        match std::fs::read_dir(root.join(STAGING_DIR)) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn fresh_tree_is_reused_without_cloning() {
        let dir = TempDir::new().unwrap();
        let cloner = Arc::new(FakeCloner::new());
        let acquirer = Acquirer::new(
            dir.path().to_path_buf(),
            chrono::Duration::hours(24),
            Duration::from_secs(5),
            cloner.clone(),
        );

        let first = acquirer.acquire(&remote()).await.unwrap();
        assert!(!first.reused);
        assert!(first.path.join("clone-0.txt").exists());
        assert!(first.path.join(MARKER_FILE).exists());

        let second = acquirer.acquire(&remote()).await.unwrap();
        assert!(second.reused);
        assert_eq!(second.path, first.path);
        assert_eq!(cloner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_tree_is_replaced_not_merged() {
        let dir = TempDir::new().unwrap();
        let cloner = Arc::new(FakeCloner::new());
        let acquirer = Acquirer::new(
            dir.path().to_path_buf(),
            chrono::Duration::zero(),
            Duration::from_secs(5),
            cloner.clone(),
        );

        acquirer.acquire(&remote()).await.unwrap();
        let tree = acquirer.acquire(&remote()).await.unwrap();
        assert_eq!(cloner.calls.load(Ordering::SeqCst), 2);
        assert!(tree.path.join("clone-1.txt").exists());
        assert!(!tree.path.join("clone-0.txt").exists());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn timeout_discards_partial_clone() {
        let dir = TempDir::new().unwrap();
        let cloner = Arc::new(FakeCloner {
            delay: Duration::from_secs(30),
            ..FakeCloner::new()
        });
        let acquirer = Acquirer::new(
            dir.path().to_path_buf(),
            chrono::Duration::hours(24),
            Duration::from_millis(50),
            cloner,
        );

        let err = acquirer.acquire(&remote()).await.unwrap_err();
        match err {
            ScoutError::Acquisition { reason, .. } => {
                assert_eq!(reason, AcquisitionFailure::Timeout)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!acquirer.tree_path(&remote()).exists());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_tree() {
        let dir = TempDir::new().unwrap();
        let good = Acquirer::new(
            dir.path().to_path_buf(),
            chrono::Duration::zero(),
            Duration::from_secs(5),
            Arc::new(FakeCloner::new()),
        );
        let first = good.acquire(&remote()).await.unwrap();

        let failing = Acquirer::new(
            dir.path().to_path_buf(),
            chrono::Duration::zero(),
            Duration::from_secs(5),
            Arc::new(FakeCloner {
                fail: true,
                ..FakeCloner::new()
            }),
        );
        let err = failing.acquire(&remote()).await.unwrap_err();
        assert_eq!(err.kind(), "acquisition_error");
        assert!(first.path.join("clone-0.txt").exists());
        assert!(staging_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn local_directory_is_used_in_place() {
        let dir = TempDir::new().unwrap();
        let acquirer = Acquirer::new(
            dir.path().join("repos"),
            chrono::Duration::hours(24),
            Duration::from_secs(5),
            Arc::new(FakeCloner::new()),
        );
        let location = dir.path().to_string_lossy().to_string();
        let reference = RepoReference::parse(&location).unwrap();
        let tree = acquirer.acquire(&reference).await.unwrap();
        assert_eq!(tree.path, PathBuf::from(&reference.location));

        let missing = RepoReference::parse(&format!("{location}/nope")).unwrap();
        let err = acquirer.acquire(&missing).await.unwrap_err();
        assert_eq!(err.kind(), "acquisition_error");
    }

    #[tokio::test]
    async fn evict_removes_cached_clone() {
        let dir = TempDir::new().unwrap();
        let acquirer = Acquirer::new(
            dir.path().to_path_buf(),
            chrono::Duration::hours(24),
            Duration::from_secs(5),
            Arc::new(FakeCloner::new()),
        );
        acquirer.acquire(&remote()).await.unwrap();
        assert!(acquirer.cached_tree(&remote()).await.is_some());
        assert!(acquirer.evict(&remote()).await.unwrap());
        assert!(acquirer.cached_tree(&remote()).await.is_none());
        assert!(!acquirer.evict(&remote()).await.unwrap());
    }

    #[test]
    fn git_failures_are_classified() {
        assert_eq!(
            classify_git_failure("fatal: Authentication failed for 'https://x/'"),
            AcquisitionFailure::Authentication
        );
        assert_eq!(
            classify_git_failure("fatal: could not read Username for 'https://github.com': terminal prompts disabled"),
            AcquisitionFailure::Authentication
        );
        assert_eq!(
            classify_git_failure("fatal: unable to access 'https://nohost/': Could not resolve host: nohost"),
            AcquisitionFailure::Unreachable
        );
        assert_eq!(
            classify_git_failure("error: unable to write file: No space left on device"),
            AcquisitionFailure::DiskSpace
        );
        assert_eq!(classify_git_failure("fatal: weird"), AcquisitionFailure::Other);
    }
}
