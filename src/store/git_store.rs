//! Git-backed store variant: the shared store lives in a Git repository
//! cloned into `.gitalong/` under the managed repository.
use super::lock::{default_lock_path, StoreLock};
use super::{merge_mine, RetryConfig, RetryError, RetryOutcome, StoreBackend};
use crate::error::GitalongError;
use crate::git::{exec::git_in, exec::git_in_fn, GitUrl};
use crate::model::TrackedCommit;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

const STORE_FILE: &str = "store.json";
const SENTINEL_FILE: &str = ".last_pull";
const COMMIT_MESSAGE_TEMPLATE: &str = "gitalong: publish from";

/// The git-backed store: a clone of the store repository kept at
/// `<managed-repo>/.gitalong/`.
pub struct GitStore {
    clone_dir: PathBuf,
    host: String,
    author: String,
    pull_threshold: std::time::Duration,
    retry: RetryConfig,
    lock: Mutex<StoreLock>,
}

impl GitStore {
    pub fn new(
        managed_repo_root: &Path,
        store_url: &GitUrl,
        host: String,
        author: String,
        pull_threshold_secs: u64,
    ) -> Result<Self, GitalongError> {
        let clone_dir = managed_repo_root.join(".gitalong");
        if !clone_dir.join(".git").exists() {
            fs::create_dir_all(clone_dir.parent().unwrap_or(Path::new(".")))?;
            git_in(managed_repo_root, ["clone", store_url.as_ref(), ".gitalong"])?;
        }
        let lock = StoreLock::new(default_lock_path(&clone_dir));
        Ok(GitStore {
            clone_dir,
            host,
            author,
            pull_threshold: std::time::Duration::from_secs(pull_threshold_secs),
            retry: RetryConfig::default(),
            lock: Mutex::new(lock),
        })
    }

    fn store_file(&self) -> PathBuf {
        self.clone_dir.join(STORE_FILE)
    }

    fn sentinel_file(&self) -> PathBuf {
        self.clone_dir.join(SENTINEL_FILE)
    }

    /// Fetches and resets to the remote tip, debounced by `pull_threshold`.
    fn pull_if_due(&self) -> Result<(), GitalongError> {
        let sentinel = self.sentinel_file();
        let due = match fs::metadata(&sentinel).and_then(|m| m.modified()) {
            Ok(modified) => SystemTime::now()
                .duration_since(modified)
                .map(|age| age >= self.pull_threshold)
                .unwrap_or(true),
            Err(_) => true,
        };
        if due {
            self.force_pull()?;
            fs::write(&sentinel, b"")?;
        }
        Ok(())
    }

    fn force_pull(&self) -> Result<(), GitalongError> {
        git_in(&self.clone_dir, ["fetch", "origin", "main"])?;
        git_in(&self.clone_dir, ["reset", "--hard", "origin/main"])?;
        Ok(())
    }

    fn read_records(&self) -> Result<Vec<TrackedCommit>, GitalongError> {
        let path = self.store_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&contents)
            .map_err(|e| GitalongError::InvalidConfig(format!("store.json: {e}")))
    }

    fn write_and_push(&self, records: &[TrackedCommit]) -> Result<(), GitalongError> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| GitalongError::InvalidConfig(format!("store.json: {e}")))?;
        fs::write(self.store_file(), json)?;
        git_in(&self.clone_dir, ["add", STORE_FILE])?;

        let status = git_in_fn(&self.clone_dir, ["status", "--porcelain"], |out| Ok(out.to_string()))?;
        if status.trim().is_empty() {
            return Ok(()); // nothing changed, nothing to commit
        }

        let message = format!("{COMMIT_MESSAGE_TEMPLATE} {}/{}", self.host, self.author);
        git_in(&self.clone_dir, ["commit", "-m", &message])?;
        git_in(&self.clone_dir, ["push", "origin", "HEAD:main"])?;
        Ok(())
    }
}

impl StoreBackend for GitStore {
    fn snapshot(&self) -> Result<Vec<TrackedCommit>, GitalongError> {
        self.pull_if_due()?;
        self.read_records()
    }

    fn commit(&self, mine_new: Vec<TrackedCommit>) -> Result<(), GitalongError> {
        let result: Result<(), RetryError<GitalongError>> = self.retry.retry(|attempt| {
            if attempt > 1 {
                if let Err(e) = self.force_pull() {
                    return Err(RetryOutcome::Fatal(e));
                }
            }
            let remote = match self.read_records() {
                Ok(r) => r,
                Err(e) => return Err(RetryOutcome::Fatal(e)),
            };
            let merged = merge_mine(remote, mine_new.clone(), &self.host, &self.author);
            match self.write_and_push(&merged) {
                Ok(()) => Ok(()),
                Err(GitalongError::Git(e)) => Err(RetryOutcome::Retryable(GitalongError::Git(e))),
                Err(e) => Err(RetryOutcome::Fatal(e)),
            }
        });
        match result {
            Ok(()) => Ok(()),
            Err(RetryError::Fatal(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, .. }) => Err(GitalongError::StoreConflict { attempts }),
        }
    }

    fn lock(&self) -> Result<(), GitalongError> {
        self.lock.lock().unwrap().lock().map_err(GitalongError::from)
    }

    fn unlock(&self) -> Result<(), GitalongError> {
        self.lock.lock().unwrap().unlock().map_err(GitalongError::from)
    }
}
