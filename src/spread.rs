//! The commit-spread classifier: a pure function from a tracked commit, the
//! local identity, and the local active branch to a bitset describing where
//! that commit lives across the fleet.
use crate::git::RefName;
use crate::identity::Identity;
use crate::model::TrackedCommit;
use std::fmt;

/// Bit positions, in the order the CLI's `status` output prints them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SpreadBit {
    MineUncommitted = 0,
    MineActiveBranch = 1,
    MineOtherBranch = 2,
    RemoteMatchingBranch = 3,
    RemoteOtherBranch = 4,
    OtherOtherBranch = 5,
    OtherMatchingBranch = 6,
    OtherUncommitted = 7,
}

impl SpreadBit {
    pub const ALL: [SpreadBit; 8] = [
        SpreadBit::MineUncommitted,
        SpreadBit::MineActiveBranch,
        SpreadBit::MineOtherBranch,
        SpreadBit::RemoteMatchingBranch,
        SpreadBit::RemoteOtherBranch,
        SpreadBit::OtherOtherBranch,
        SpreadBit::OtherMatchingBranch,
        SpreadBit::OtherUncommitted,
    ];
}

/// An 8-bit classification of where one [`TrackedCommit`] lives across the
/// fleet. Multiple bits can be set simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpreadFlags(u8);

impl SpreadFlags {
    pub fn empty() -> Self {
        SpreadFlags(0)
    }

    pub fn set(&mut self, bit: SpreadBit) {
        self.0 |= 1 << (bit as u8);
    }

    pub fn is_set(&self, bit: SpreadBit) -> bool {
        self.0 & (1 << (bit as u8)) != 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// Renders as the eight-character `+`/`-` string, in bit order 0..7.
impl fmt::Display for SpreadFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in SpreadBit::ALL {
            f.write_str(if self.is_set(bit) { "+" } else { "-" })?;
        }
        Ok(())
    }
}

/// Classifies where `record` lives relative to `identity` and `active_branch`.
///
/// A detached `active_branch` (`None`) means neither `MineActiveBranch` nor
/// `RemoteMatchingBranch` can ever be set.
pub fn classify(
    record: &TrackedCommit,
    identity: &Identity,
    active_branch: Option<&RefName>,
) -> SpreadFlags {
    let mut flags = SpreadFlags::empty();
    let is_mine = record.host == identity.host && record.author == identity.user;
    let is_uncommitted = record.sha.is_uncommitted();

    if is_uncommitted && is_mine {
        flags.set(SpreadBit::MineUncommitted);
    }
    if is_uncommitted && !is_mine {
        flags.set(SpreadBit::OtherUncommitted);
    }

    let on_active_local = active_branch
        .map(|b| record.branches.local.contains(b))
        .unwrap_or(false);
    let other_local = record
        .branches
        .local
        .iter()
        .any(|b| Some(b) != active_branch);
    let on_active_remote = active_branch
        .map(|b| record.branches.remote.contains(b))
        .unwrap_or(false);
    let other_remote = record
        .branches
        .remote
        .iter()
        .any(|b| Some(b) != active_branch);

    if record.host == identity.host && on_active_local {
        flags.set(SpreadBit::MineActiveBranch);
    }
    if record.host == identity.host && other_local {
        flags.set(SpreadBit::MineOtherBranch);
    }
    if on_active_remote {
        flags.set(SpreadBit::RemoteMatchingBranch);
    }
    if other_remote {
        flags.set(SpreadBit::RemoteOtherBranch);
    }
    if record.host != identity.host && other_local {
        flags.set(SpreadBit::OtherOtherBranch);
    }
    if record.host != identity.host && on_active_local {
        flags.set(SpreadBit::OtherMatchingBranch);
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{CommitSha, GitUrl};
    use crate::model::BranchSet;
    use std::collections::BTreeSet;
    use std::str::FromStr;

    fn identity(host: &str, user: &str) -> Identity {
        Identity {
            host: host.into(),
            user: user.into(),
        }
    }

    fn base_record(host: &str, author: &str) -> TrackedCommit {
        TrackedCommit {
            sha: CommitSha::from_str("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678").unwrap(),
            remote: GitUrl::from_str("https://example.com/r.git").unwrap(),
            branches: BranchSet::default(),
            host: host.into(),
            author: author.into(),
            date: chrono::Utc::now(),
            summary: String::new(),
            changes: vec!["a.png".into()],
            claims: vec![],
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn committed_and_pushed_on_active_branch() {
        // Mine, on the active branch, both locally and on the matching remote.
        let main = RefName::from_str("main").unwrap();
        let mut rec = base_record("me", "me@x.com");
        rec.branches.local.insert(main.clone());
        rec.branches.remote.insert(main.clone());
        let flags = classify(&rec, &identity("me", "me@x.com"), Some(&main));
        assert_eq!(flags.to_string(), "-+-+----");
    }

    #[test]
    fn local_only_commit_on_active_branch() {
        let main = RefName::from_str("main").unwrap();
        let mut rec = base_record("me", "me@x.com");
        rec.branches.local.insert(main.clone());
        let flags = classify(&rec, &identity("me", "me@x.com"), Some(&main));
        assert_eq!(flags.to_string(), "-+------");
    }

    #[test]
    fn uncommitted_tracked_matches_scenario_3() {
        let main = RefName::from_str("main").unwrap();
        let mut rec = base_record("me", "me@x.com");
        rec.sha = CommitSha::uncommitted();
        let flags = classify(&rec, &identity("me", "me@x.com"), Some(&main));
        assert_eq!(flags.to_string(), "+-------");
    }

    #[test]
    fn detached_head_never_sets_active_branch_bits() {
        let mut rec = base_record("me", "me@x.com");
        rec.branches.remote.insert(RefName::from_str("main").unwrap());
        let flags = classify(&rec, &identity("me", "me@x.com"), None);
        assert!(!flags.is_set(SpreadBit::MineActiveBranch));
        assert!(!flags.is_set(SpreadBit::RemoteMatchingBranch));
    }

    #[test]
    fn other_clone_uncommitted_record() {
        let mut rec = base_record("other-host", "other@x.com");
        rec.sha = CommitSha::uncommitted();
        let flags = classify(&rec, &identity("me", "me@x.com"), None);
        assert!(flags.is_set(SpreadBit::OtherUncommitted));
        assert!(!flags.is_set(SpreadBit::MineUncommitted));
    }
}
