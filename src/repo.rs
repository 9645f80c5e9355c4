//! Orchestrates the Git Probe, the Tracked Commit model, the store, and the
//! Spread Classifier behind the five public operations the CLI drives.
use crate::batch::map_parallel;
use crate::config::Config;
use crate::error::{GitError, GitalongError};
use crate::git::{CommitSha, GitProbe, GitUrl, RefName};
use crate::identity::Identity;
use crate::model::TrackedCommit;
use crate::spread::{self, SpreadFlags};
use crate::store::{GitStore, JsonStore, Store, StoreBackend};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use walkdir::WalkDir;

type Result<T> = std::result::Result<T, GitalongError>;

/// Per-path outcome of [`GitalongRepo::claim`].
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed,
    /// The record already covering this path, preventing the claim.
    Blocked(TrackedCommit),
    /// A filesystem error while changing this path's permissions. Other
    /// paths in the same batch still succeed or fail independently.
    Failed(String),
}

/// Per-path outcome of [`GitalongRepo::release`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The path has already been modified locally; only `update` can clear it.
    StillDirty,
    /// A filesystem error while changing this path's permissions. Other
    /// paths in the same batch still succeed or fail independently.
    Failed(String),
}

/// One line of `status` output.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub path: String,
    pub spread: SpreadFlags,
    pub sha: String,
    pub local_branches: Vec<String>,
    pub remote_branches: Vec<String>,
    pub host: String,
    pub author: String,
}

/// Orchestrates the probe, model, store, and classifier against one managed
/// repository.
pub struct GitalongRepo {
    probe: GitProbe,
    config: Config,
    store: Store,
    identity: Identity,
}

impl GitalongRepo {
    /// Opens an already-`setup` repository at `repo_root`.
    pub fn open(repo_root: &Path) -> Result<GitalongRepo> {
        let config = Config::load(repo_root)?;
        let probe = GitProbe::new(repo_root);
        let identity = Identity::local(&probe)?;
        let store = build_store(repo_root, &config, &identity)?;
        Ok(GitalongRepo {
            probe,
            config,
            store,
            identity,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Publishes this clone's local state to the store.
    pub fn update(&self) -> Result<()> {
        tracing::info!(repo = %self.probe.root().display(), "update: start");
        self.store.lock()?;
        let outcome = self.try_update();
        self.store.unlock()?;
        match &outcome {
            Ok(()) => tracing::info!("update: done"),
            Err(e) => tracing::warn!(error = %e, "update: failed"),
        }
        outcome
    }

    fn try_update(&self) -> Result<()> {
        let records = self.store.snapshot()?;
        let old_uncommitted = records
            .iter()
            .find(|r| r.sha.is_uncommitted() && r.is_mine(&self.identity.host, &self.identity.user));
        let mine = self.build_local_slice(old_uncommitted)?;
        self.store.commit(mine.clone())?;
        if self.config.modify_permissions {
            self.enforce_permissions(&records, &mine)?;
        }
        Ok(())
    }

    /// Builds this clone's full contribution: one record per distinct commit
    /// reachable from a local or remote-tracking branch tip, plus (if
    /// configured) one uncommitted record.
    fn build_local_slice(&self, old_uncommitted: Option<&TrackedCommit>) -> Result<Vec<TrackedCommit>> {
        let remote = self.probe.remote_url()?;
        let local_branches = self.probe.local_branches()?;
        let remote_branches = self.probe.remote_branches()?;

        let mut by_sha: BTreeMap<CommitSha, TrackedCommit> = BTreeMap::new();

        for branch in local_branches.iter().chain(remote_branches.iter()) {
            let refname = if local_branches.contains(branch) {
                format!("refs/heads/{branch}")
            } else {
                format!("refs/remotes/{branch}")
            };
            let Some(sha) = self.tip_sha(&refname)? else { continue };
            if by_sha.contains_key(&sha) {
                continue;
            }
            let (local, remote_refs) = self.probe.branches_containing(&sha)?;
            let info = self.probe.commit(&sha)?;
            let record = TrackedCommit::from_commit(
                info,
                remote.clone(),
                self.identity.host.clone(),
                self.identity.user.clone(),
                local.into_iter().collect(),
                remote_refs.into_iter().collect(),
            );
            by_sha.insert(sha, record);
        }

        let mut slice: Vec<TrackedCommit> = by_sha.into_values().collect();

        if self.config.track_uncommitted {
            let changes = self.probe.working_changes(&self.config.tracked_extensions_set())?;
            let changes_set: BTreeSet<String> = changes.iter().cloned().collect();

            // A claim survives an update only if the claimant has not started
            // editing it yet and the file is still writable.
            let preserved_claims: Vec<String> = old_uncommitted
                .map(|o| {
                    o.claims
                        .iter()
                        .filter(|p| !changes_set.contains(*p) && self.probe.is_writable(p))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            let mut merged_changes: BTreeSet<String> = changes_set;
            merged_changes.extend(preserved_claims.iter().cloned());

            let uncommitted = TrackedCommit::uncommitted(
                remote,
                self.identity.host.clone(),
                self.identity.user.clone(),
                merged_changes.into_iter().collect(),
                preserved_claims,
            );
            if !uncommitted.is_garbage() {
                slice.push(uncommitted);
            }
        }

        Ok(slice)
    }

    /// Enforces the permission rule over every tracked-extension file in the
    /// working tree.
    fn enforce_permissions(&self, old_records: &[TrackedCommit], mine: &[TrackedCommit]) -> Result<()> {
        let exts = self.config.tracked_extensions_set();
        if exts.is_empty() {
            return Ok(());
        }

        let mut others_covered: BTreeSet<String> = BTreeSet::new();
        for r in old_records {
            if !r.is_mine(&self.identity.host, &self.identity.user) {
                others_covered.extend(r.changes.iter().cloned());
                others_covered.extend(r.claims.iter().cloned());
            }
        }
        let mut mine_covered: BTreeSet<String> = BTreeSet::new();
        for r in mine {
            mine_covered.extend(r.changes.iter().cloned());
            mine_covered.extend(r.claims.iter().cloned());
        }

        for entry in WalkDir::new(self.probe.root())
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git" && e.file_name() != ".gitalong")
        {
            let entry = entry.map_err(|e| GitalongError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(self.probe.root())
                .unwrap_or(entry.path());
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            let tracked = Path::new(&rel_str)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| exts.contains(e))
                .unwrap_or(false);
            if !tracked {
                continue;
            }
            let writable = mine_covered.contains(&rel_str) || !others_covered.contains(&rel_str);
            self.probe
                .chmod(&rel_str, writable)
                .map_err(|_| GitalongError::PermissionDenied(rel.to_path_buf()))?;
        }
        Ok(())
    }

    fn tip_sha(&self, refname: &str) -> Result<Option<CommitSha>> {
        match self.probe.raw(["rev-parse", "--verify", "-q", refname]) {
            Ok(lines) => lines
                .into_iter()
                .next()
                .map(|s| CommitSha::from_str(&s))
                .transpose()
                .map_err(GitalongError::from),
            Err(GitError::CommandFailed { exit_code, .. }) if exit_code == 1 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The highest-priority record covering `path`, if any.
    pub fn last_commit<'a>(&self, records: &'a [TrackedCommit], path: &str) -> Option<&'a TrackedCommit> {
        records
            .iter()
            .filter(|r| r.changes.iter().any(|c| c == path))
            .max_by_key(|r| priority_key(r, &self.identity))
    }

    /// One [`StatusEntry`] per input path, off a single snapshot.
    pub fn status(&self, paths: &[String]) -> Result<Vec<StatusEntry>> {
        tracing::info!(count = paths.len(), "status: start");
        let records = self.store.snapshot()?;
        let active_branch = self.probe.active_branch()?;

        let entries = map_parallel(paths, |_, path| match self.last_commit(&records, path) {
            Some(record) => {
                let flags = spread::classify(record, &self.identity, active_branch.as_ref());
                StatusEntry {
                    path: path.clone(),
                    spread: flags,
                    sha: record.sha.to_string(),
                    local_branches: record.branches.local.iter().map(RefName::to_string).collect(),
                    remote_branches: record.branches.remote.iter().map(RefName::to_string).collect(),
                    host: record.host.clone(),
                    author: record.author.clone(),
                }
            }
            // Unknown fields render as `-` (no record covers this path).
            None => StatusEntry {
                path: path.clone(),
                spread: SpreadFlags::empty(),
                sha: "-".to_string(),
                local_branches: vec!["-".to_string()],
                remote_branches: vec!["-".to_string()],
                host: "-".to_string(),
                author: "-".to_string(),
            },
        });

        tracing::info!("status: done");
        Ok(entries)
    }

    /// Attempts to reserve each path for exclusive editing.
    /// Failures on individual paths do not prevent others from succeeding.
    pub fn claim(&self, paths: &[String]) -> Result<Vec<ClaimOutcome>> {
        tracing::info!(count = paths.len(), "claim: start");
        self.store.lock()?;
        let outcome = self.try_claim(paths);
        self.store.unlock()?;
        match &outcome {
            Ok(_) => tracing::info!("claim: done"),
            Err(e) => tracing::warn!(error = %e, "claim: failed"),
        }
        outcome
    }

    fn try_claim(&self, paths: &[String]) -> Result<Vec<ClaimOutcome>> {
        let records = self.store.snapshot()?;
        let remote = self.probe.remote_url()?;

        let mut mine = my_uncommitted(&records, &self.identity).cloned().unwrap_or_else(|| {
            TrackedCommit::uncommitted(
                remote,
                self.identity.host.clone(),
                self.identity.user.clone(),
                Vec::new(),
                Vec::new(),
            )
        });

        // Per-path decisions (blocking-record lookup, chmod) run through the
        // worker pool; only the final publish is serialized through the lock.
        let decisions = map_parallel(paths, |_, path| -> ClaimDecision {
            if let Some(blocker) = blocking_record(&records, &self.identity, path) {
                return ClaimDecision::Blocked(blocker.clone());
            }
            if self.config.modify_permissions {
                if let Err(e) = self.probe.chmod(path, true) {
                    return ClaimDecision::Failed(format!("{path}: permission denied ({e})"));
                }
            }
            ClaimDecision::Claimed(path.clone())
        });

        let mut outcomes = Vec::with_capacity(paths.len());
        for decision in decisions {
            match decision {
                ClaimDecision::Claimed(path) => {
                    if !mine.claims.iter().any(|c| c == &path) {
                        mine.claims.push(path);
                    }
                    outcomes.push(ClaimOutcome::Claimed);
                }
                ClaimDecision::Blocked(record) => outcomes.push(ClaimOutcome::Blocked(record)),
                ClaimDecision::Failed(msg) => outcomes.push(ClaimOutcome::Failed(msg)),
            }
        }

        self.publish_mine(records, mine)?;
        Ok(outcomes)
    }

    /// Removes paths from this clone's claims.
    pub fn release(&self, paths: &[String]) -> Result<Vec<ReleaseOutcome>> {
        tracing::info!(count = paths.len(), "release: start");
        self.store.lock()?;
        let outcome = self.try_release(paths);
        self.store.unlock()?;
        match &outcome {
            Ok(_) => tracing::info!("release: done"),
            Err(e) => tracing::warn!(error = %e, "release: failed"),
        }
        outcome
    }

    fn try_release(&self, paths: &[String]) -> Result<Vec<ReleaseOutcome>> {
        let records = self.store.snapshot()?;
        let Some(existing) = my_uncommitted(&records, &self.identity) else {
            return Ok(paths.iter().map(|_| ReleaseOutcome::Released).collect());
        };
        let mut mine = existing.clone();

        // Per-path decisions (dirty check, chmod) run through the worker
        // pool; only the final publish is serialized through the lock.
        let decisions = map_parallel(paths, |_, path| -> ReleaseDecision {
            if mine.changes.iter().any(|c| c == path) {
                return ReleaseDecision::StillDirty;
            }
            if self.config.modify_permissions {
                if let Err(e) = self.probe.chmod(path, false) {
                    return ReleaseDecision::Failed(format!("{path}: permission denied ({e})"));
                }
            }
            ReleaseDecision::Released(path.clone())
        });

        let mut outcomes = Vec::with_capacity(paths.len());
        for decision in decisions {
            match decision {
                ReleaseDecision::Released(path) => {
                    mine.claims.retain(|c| c != &path);
                    outcomes.push(ReleaseOutcome::Released);
                }
                ReleaseDecision::StillDirty => outcomes.push(ReleaseOutcome::StillDirty),
                ReleaseDecision::Failed(msg) => outcomes.push(ReleaseOutcome::Failed(msg)),
            }
        }

        self.publish_mine(records, mine)?;
        Ok(outcomes)
    }

    /// Publishes `mine` (the updated uncommitted record) alongside this
    /// clone's other own records, leaving every other clone's records as
    /// `records` had them (the store merges on top of that).
    fn publish_mine(&self, records: Vec<TrackedCommit>, mine: TrackedCommit) -> Result<()> {
        let mut mine_slice: Vec<TrackedCommit> = records
            .into_iter()
            .filter(|r| !r.sha.is_uncommitted() && r.is_mine(&self.identity.host, &self.identity.user))
            .collect();
        if !mine.is_garbage() {
            mine_slice.push(mine);
        }
        self.store.commit(mine_slice)
    }
}

/// Per-path decision computed by [`GitalongRepo::try_claim`]'s worker pool,
/// folded into the final `mine` record and outcome list afterward.
enum ClaimDecision {
    Claimed(String),
    Blocked(TrackedCommit),
    Failed(String),
}

/// Per-path decision computed by [`GitalongRepo::try_release`]'s worker pool,
/// folded into the final `mine` record and outcome list afterward.
enum ReleaseDecision {
    Released(String),
    StillDirty,
    Failed(String),
}

fn my_uncommitted<'a>(records: &'a [TrackedCommit], identity: &Identity) -> Option<&'a TrackedCommit> {
    records
        .iter()
        .find(|r| r.sha.is_uncommitted() && r.is_mine(&identity.host, &identity.user))
}

/// The record (if any), not mine, that already covers `path` via its
/// `changes` or `claims` (invariant 5: a path is claimed by at most one
/// identity at a time).
fn blocking_record<'a>(records: &'a [TrackedCommit], identity: &Identity, path: &str) -> Option<&'a TrackedCommit> {
    records.iter().find(|r| {
        !r.is_mine(&identity.host, &identity.user)
            && (r.changes.iter().any(|c| c == path) || r.claims.iter().any(|c| c == path))
    })
}

/// `last_commit`'s priority ordering: MINE_UNCOMMITTED > OTHER_UNCOMMITTED >
/// real commits, newest first among those.
fn priority_key(r: &TrackedCommit, identity: &Identity) -> (u8, i64) {
    let rank = if r.sha.is_uncommitted() && r.is_mine(&identity.host, &identity.user) {
        2
    } else if r.sha.is_uncommitted() {
        1
    } else {
        0
    };
    (rank, r.date.timestamp())
}

fn build_store(repo_root: &Path, config: &Config, identity: &Identity) -> Result<Store> {
    let looks_like_json_endpoint =
        (config.store_url.starts_with("https://") || config.store_url.starts_with("http://"))
            && !config.store_url.ends_with(".git");

    if looks_like_json_endpoint {
        let store = JsonStore::new(
            repo_root.join(".gitalong"),
            config.store_url.clone(),
            config.store_headers.clone(),
            identity.host.clone(),
            identity.user.clone(),
            std::time::Duration::from_secs(30),
        )?;
        Ok(Store::Json(store))
    } else {
        let url = GitUrl::from_str(&config.store_url)?;
        let store = GitStore::new(
            repo_root,
            &url,
            identity.host.clone(),
            identity.user.clone(),
            config.pull_threshold,
        )?;
        Ok(Store::Git(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BranchSet;
    use std::str::FromStr as _;

    fn url() -> GitUrl {
        GitUrl::from_str("https://example.com/r.git").unwrap()
    }

    fn identity() -> Identity {
        Identity {
            host: "me".into(),
            user: "me@x.com".into(),
        }
    }

    fn real_commit(host: &str, changes: Vec<&str>, date_offset: i64) -> TrackedCommit {
        TrackedCommit {
            sha: CommitSha::from_str("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678").unwrap(),
            remote: url(),
            branches: BranchSet::default(),
            host: host.into(),
            author: "x@x.com".into(),
            date: chrono::Utc::now() + chrono::Duration::seconds(date_offset),
            summary: String::new(),
            changes: changes.into_iter().map(String::from).collect(),
            claims: vec![],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn last_commit_prefers_mine_uncommitted_over_everything() {
        let id = identity();
        let mine_uncommitted = TrackedCommit::uncommitted(url(), "me".into(), "me@x.com".into(), vec!["a.png".into()], vec![]);
        let other_uncommitted = TrackedCommit::uncommitted(url(), "other".into(), "o@x.com".into(), vec!["a.png".into()], vec![]);
        let committed = real_commit("other", vec!["a.png"], 0);
        let records = vec![committed, other_uncommitted, mine_uncommitted.clone()];

        let repo_identity_only = id;
        let chosen = records
            .iter()
            .filter(|r| r.changes.iter().any(|c| c == "a.png"))
            .max_by_key(|r| priority_key(r, &repo_identity_only))
            .unwrap();
        assert_eq!(chosen, &mine_uncommitted);
    }

    #[test]
    fn blocking_record_ignores_own_records() {
        let id = identity();
        let mine = real_commit("me", vec!["a.png"], 0);
        let others = vec![mine];
        assert!(blocking_record(&others, &id, "a.png").is_none());
    }

    #[test]
    fn blocking_record_finds_other_clones_claim() {
        let id = identity();
        let mut other = TrackedCommit::uncommitted(url(), "other".into(), "o@x.com".into(), vec![], vec!["a.png".into()]);
        other.claims.push("a.png".into());
        let records = vec![other];
        assert!(blocking_record(&records, &id, "a.png").is_some());
    }

    #[test]
    fn priority_prefers_newest_real_commit_on_tie() {
        let id = identity();
        let older = real_commit("other", vec!["a.png"], -100);
        let newer = real_commit("other", vec!["a.png"], 0);
        let records = vec![older.clone(), newer.clone()];
        let chosen = records.iter().max_by_key(|r| priority_key(r, &id)).unwrap();
        assert_eq!(chosen.date, newer.date);
    }
}
