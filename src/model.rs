//! The Tracked Commit value object.
use crate::git::{CommitInfo, CommitSha, GitUrl, RefName};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// The two branch sets a [`TrackedCommit`] can be reachable from: branches on
/// the publisher's own checkout, and the publisher's remote-tracking refs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSet {
    #[serde(default)]
    pub local: BTreeSet<RefName>,
    #[serde(default)]
    pub remote: BTreeSet<RefName>,
}

/// One record published by one clone: either a real commit (`sha` non-empty)
/// or a synthetic "uncommitted" record (`sha == ""`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedCommit {
    pub sha: CommitSha,
    pub remote: GitUrl,
    pub branches: BranchSet,
    pub host: String,
    pub author: String,
    /// RFC 3339 provenance timestamp; informational only.
    pub date: DateTime<Utc>,
    /// Informational commit summary; empty for uncommitted records.
    #[serde(default)]
    pub summary: String,
    /// Repository-relative paths this record covers.
    #[serde(default)]
    pub changes: Vec<String>,
    /// Paths explicitly claimed but not yet modified (only meaningful on an
    /// uncommitted record).
    #[serde(default)]
    pub claims: Vec<String>,
    /// Unrecognized keys from a future store-document version, preserved
    /// verbatim across a read-modify-write cycle.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrackedCommit {
    /// Builds a record for a real commit reachable from `local_branches`
    /// and/or `remote_branches` on the publisher's clone. `host`/`author`
    /// identify the publishing clone, not necessarily the commit's own
    /// author -- a clone routinely publishes records for commits authored by
    /// teammates it has pulled.
    pub fn from_commit(
        info: CommitInfo,
        remote: GitUrl,
        host: String,
        author: String,
        local_branches: BTreeSet<RefName>,
        remote_branches: BTreeSet<RefName>,
    ) -> TrackedCommit {
        TrackedCommit {
            sha: info.sha,
            remote,
            branches: BranchSet {
                local: local_branches,
                remote: remote_branches,
            },
            host,
            author,
            date: Utc
                .timestamp_opt(info.timestamp, 0)
                .single()
                .unwrap_or_else(Utc::now),
            summary: info.summary,
            changes: info.changes,
            claims: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Builds (or rebuilds) the synthetic uncommitted record for `host`/`author`.
    pub fn uncommitted(
        remote: GitUrl,
        host: String,
        author: String,
        changes: Vec<String>,
        claims: Vec<String>,
    ) -> TrackedCommit {
        TrackedCommit {
            sha: CommitSha::uncommitted(),
            remote,
            branches: BranchSet::default(),
            host,
            author,
            date: Utc::now(),
            summary: String::new(),
            changes,
            claims,
            extra: Map::new(),
        }
    }

    /// Identity key for this record: `(remote, host, author)` if uncommitted,
    /// `(remote, sha)` otherwise -- see the asymmetric `PartialEq` below.
    pub fn is_mine(&self, host: &str, author: &str) -> bool {
        self.host == host && self.author == author
    }

    /// Invariant 3: a record advertising neither changes nor claims is garbage.
    pub fn is_garbage(&self) -> bool {
        self.changes.is_empty() && self.claims.is_empty()
    }

    /// Merges `other`'s branch sets into `self` (invariant 2: real-commit
    /// records with the same `(remote, sha)` merge by union of branch sets).
    pub fn merge_branches_from(&mut self, other: &TrackedCommit) {
        self.branches.local.extend(other.branches.local.iter().cloned());
        self.branches.remote.extend(other.branches.remote.iter().cloned());
    }
}

impl PartialEq for TrackedCommit {
    fn eq(&self, other: &Self) -> bool {
        if self.sha.is_uncommitted() && other.sha.is_uncommitted() {
            self.remote == other.remote && self.host == other.host && self.author == other.author
        } else {
            self.remote == other.remote
                && self.sha == other.sha
                && self.host == other.host
                && self.author == other.author
        }
    }
}

impl Eq for TrackedCommit {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn url() -> GitUrl {
        GitUrl::from_str("https://example.com/repo.git").unwrap()
    }

    #[test]
    fn uncommitted_equality_ignores_sha_field_identity() {
        let a = TrackedCommit::uncommitted(url(), "h".into(), "a@x.com".into(), vec!["f".into()], vec![]);
        let b = TrackedCommit::uncommitted(url(), "h".into(), "a@x.com".into(), vec!["g".into()], vec![]);
        assert_eq!(a, b, "uncommitted records compare by (remote, host, author) only");
    }

    #[test]
    fn real_commits_differ_by_sha() {
        let info_a = CommitInfo {
            sha: CommitSha::from_str("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678").unwrap(),
            author_name: "A".into(),
            author_email: "a@x.com".into(),
            timestamp: 0,
            summary: "s".into(),
            changes: vec![],
        };
        let info_b = CommitInfo {
            sha: CommitSha::from_str("ffffffffffffffffffffffffffffffffffffffff").unwrap(),
            ..info_a.clone()
        };
        let a = TrackedCommit::from_commit(info_a, url(), "h".into(), "a@x.com".into(), Default::default(), Default::default());
        let b = TrackedCommit::from_commit(info_b, url(), "h".into(), "a@x.com".into(), Default::default(), Default::default());
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_detection() {
        let rec = TrackedCommit::uncommitted(url(), "h".into(), "a@x.com".into(), vec![], vec![]);
        assert!(rec.is_garbage());
    }

    #[test]
    fn unknown_fields_round_trip() {
        let mut rec = TrackedCommit::uncommitted(url(), "h".into(), "a@x.com".into(), vec!["f".into()], vec![]);
        rec.extra.insert("future_field".into(), Value::Bool(true));
        let json = serde_json::to_string(&rec).unwrap();
        let back: TrackedCommit = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extra.get("future_field"), Some(&Value::Bool(true)));
    }
}
