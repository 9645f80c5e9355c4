//! The Store abstraction: a mutable set of [`TrackedCommit`]s shared across
//! clones, behind two pluggable backends.
pub mod git_store;
pub mod json_store;
pub mod lock;

use crate::error::GitalongError;
use crate::model::TrackedCommit;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;

pub use git_store::GitStore;
pub use json_store::JsonStore;

/// Retry ladder for store commits.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            multiplier: self.factor,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    /// Runs `attempt` up to `max_attempts` times, sleeping along the
    /// exponential ladder between retryable failures. `attempt` reports
    /// whether a failure is retryable via `Err(Retryable(e))` vs.
    /// `Err(Fatal(e))`.
    pub fn retry<T, E>(
        &self,
        mut attempt: impl FnMut(u32) -> Result<T, RetryOutcome<E>>,
    ) -> Result<T, RetryError<E>> {
        let mut backoff = self.backoff();
        for n in 1..=self.max_attempts {
            match attempt(n) {
                Ok(v) => return Ok(v),
                Err(RetryOutcome::Fatal(e)) => return Err(RetryError::Fatal(e)),
                Err(RetryOutcome::Retryable(e)) => {
                    if n == self.max_attempts {
                        return Err(RetryError::Exhausted { attempts: n, last: e });
                    }
                    let delay = backoff.next_backoff().unwrap_or(self.max_delay);
                    tracing::warn!(attempt = n, delay_ms = delay.as_millis() as u64, "retrying store operation");
                    std::thread::sleep(delay);
                }
            }
        }
        unreachable!("max_attempts >= 1 is enforced by construction")
    }
}

/// The outcome of one attempt passed to [`RetryConfig::retry`].
pub enum RetryOutcome<E> {
    Retryable(E),
    Fatal(E),
}

/// The final outcome after a retry loop gives up.
pub enum RetryError<E> {
    Fatal(E),
    Exhausted { attempts: u32, last: E },
}

/// Shared capability interface for a store backend.
pub trait StoreBackend {
    /// An atomic, consistent read of every record currently in the store.
    fn snapshot(&self) -> Result<Vec<TrackedCommit>, GitalongError>;

    /// Atomically replaces this clone's contribution, merged with the
    /// observed remote state per the merge rule.
    fn commit(&self, records: Vec<TrackedCommit>) -> Result<(), GitalongError>;

    /// Acquires the backend's cross-process mutual exclusion, if any.
    fn lock(&self) -> Result<(), GitalongError>;

    /// Releases the lock acquired by [`StoreBackend::lock`].
    fn unlock(&self) -> Result<(), GitalongError>;
}

/// Applies the merge rule: keep every record that isn't mine, plus my
/// freshly computed slice.
pub fn merge_mine(remote: Vec<TrackedCommit>, mine_new: Vec<TrackedCommit>, host: &str, author: &str) -> Vec<TrackedCommit> {
    let mut merged: Vec<TrackedCommit> = remote
        .into_iter()
        .filter(|r| !r.is_mine(host, author))
        .collect();
    merged.extend(mine_new);
    merged
}

/// Tagged-variant store selected by URL shape: an HTTPS URL pointing at a
/// JSON document uses the JSON-document backend; anything else
/// (an `ssh://`/`git://`/local-path remote) uses the Git-backed store.
pub enum Store {
    Git(GitStore),
    Json(JsonStore),
}

impl StoreBackend for Store {
    fn snapshot(&self) -> Result<Vec<TrackedCommit>, GitalongError> {
        match self {
            Store::Git(s) => s.snapshot(),
            Store::Json(s) => s.snapshot(),
        }
    }

    fn commit(&self, records: Vec<TrackedCommit>) -> Result<(), GitalongError> {
        match self {
            Store::Git(s) => s.commit(records),
            Store::Json(s) => s.commit(records),
        }
    }

    fn lock(&self) -> Result<(), GitalongError> {
        match self {
            Store::Git(s) => s.lock(),
            Store::Json(s) => s.lock(),
        }
    }

    fn unlock(&self) -> Result<(), GitalongError> {
        match self {
            Store::Git(s) => s.unlock(),
            Store::Json(s) => s.unlock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitUrl;
    use std::str::FromStr;

    fn rec(host: &str, author: &str, changes: Vec<&str>) -> TrackedCommit {
        TrackedCommit::uncommitted(
            GitUrl::from_str("https://example.com/r.git").unwrap(),
            host.into(),
            author.into(),
            changes.into_iter().map(String::from).collect(),
            vec![],
        )
    }

    #[test]
    fn merge_rule_only_replaces_own_records() {
        let remote = vec![rec("other", "o@x.com", vec!["a"]), rec("me", "me@x.com", vec!["stale"])];
        let mine_new = vec![rec("me", "me@x.com", vec!["fresh"])];
        let merged = merge_mine(remote, mine_new, "me", "me@x.com");
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|r| r.host == "other"));
        assert!(merged.iter().any(|r| r.changes == vec!["fresh".to_string()]));
        assert!(!merged.iter().any(|r| r.changes == vec!["stale".to_string()]));
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let cfg = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            factor: 1.0,
            max_delay: Duration::from_millis(1),
        };
        let mut calls = 0;
        let result: Result<(), RetryError<&str>> = cfg.retry(|_| {
            calls += 1;
            Err(RetryOutcome::Retryable("conflict"))
        });
        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls, 3);
    }

    #[test]
    fn retry_stops_immediately_on_fatal() {
        let cfg = RetryConfig::default();
        let mut calls = 0;
        let result: Result<(), RetryError<&str>> = cfg.retry(|_| {
            calls += 1;
            Err(RetryOutcome::Fatal("unauthorized"))
        });
        assert!(matches!(result, Err(RetryError::Fatal("unauthorized"))));
        assert_eq!(calls, 1);
    }
}
