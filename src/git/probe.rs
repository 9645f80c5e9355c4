//! Read-only queries over a managed Git repository.
use super::exec::{git_in, git_in_fn};
use super::types::{CommitSha, GitUrl, RefName};
use crate::error::GitError;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

type Result<A> = std::result::Result<A, GitError>;

/// Git's canonical empty-tree object, used as the "parent" of a root commit.
const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

/// Metadata and changed paths for one real commit, as read from `git show`/`git diff-tree`.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub sha: CommitSha,
    pub author_name: String,
    pub author_email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub summary: String,
    pub changes: Vec<String>,
}

/// A read-only window onto a managed Git repository.
#[derive(Debug, Clone)]
pub struct GitProbe {
    root: PathBuf,
}

impl GitProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        GitProbe { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The current branch name, or `None` when `HEAD` is detached.
    pub fn active_branch(&self) -> Result<Option<RefName>> {
        let result = git_in_fn(&self.root, ["symbolic-ref", "--short", "-q", "HEAD"], |out| {
            Ok(out.trim().to_string())
        });
        match result {
            Ok(name) if !name.is_empty() => Ok(Some(RefName::from_str(&name)?)),
            Ok(_) => Ok(None),
            Err(GitError::CommandFailed { exit_code, .. }) if exit_code == 1 => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The URL of the `origin` remote.
    pub fn remote_url(&self) -> Result<GitUrl> {
        git_in_fn(
            &self.root,
            ["config", "--get", "remote.origin.url"],
            |out| GitUrl::from_str(out.trim()),
        )
    }

    /// The email configured for the identity making commits from this clone.
    pub fn user_email(&self) -> Result<String> {
        git_in_fn(&self.root, ["config", "--get", "user.email"], |out| {
            Ok(out.trim().to_string())
        })
    }

    /// Short names of all local branches.
    pub fn local_branches(&self) -> Result<Vec<RefName>> {
        git_in_fn(
            &self.root,
            ["for-each-ref", "--format=%(refname:short)", "refs/heads/"],
            parse_ref_lines,
        )
    }

    /// Short names of all remote-tracking branches.
    pub fn remote_branches(&self) -> Result<Vec<RefName>> {
        git_in_fn(
            &self.root,
            ["for-each-ref", "--format=%(refname:short)", "refs/remotes/"],
            parse_ref_lines,
        )
    }

    /// Local and remote-tracking branches that can reach `sha`.
    pub fn branches_containing(&self, sha: &CommitSha) -> Result<(Vec<RefName>, Vec<RefName>)> {
        if sha.is_uncommitted() {
            return Ok((Vec::new(), Vec::new()));
        }
        let local = git_in_fn(
            &self.root,
            ["branch", "--contains", sha.as_str(), "--format=%(refname:short)"],
            parse_ref_lines,
        )?;
        let remote = git_in_fn(
            &self.root,
            [
                "branch",
                "--remotes",
                "--contains",
                sha.as_str(),
                "--format=%(refname:short)",
            ],
            |out| {
                out.lines()
                    .filter_map(|l| l.trim().rsplit_once('/').map(|(_, short)| short))
                    .map(RefName::from_str)
                    .collect::<Result<Vec<_>>>()
            },
        )?;
        Ok((local, remote))
    }

    /// Metadata and changed-path list for one commit.
    ///
    /// A root commit (no parent) is diffed against Git's empty tree, so its
    /// `changes` is every path present in that commit's tree.
    pub fn commit(&self, sha: &CommitSha) -> Result<CommitInfo> {
        const SEP: &str = "\u{1f}"; // unit separator, unlikely to appear in a summary line
        let format = format!("%H{SEP}%an{SEP}%ae{SEP}%at{SEP}%s");
        let format_arg = format!("--format={format}");

        let header = git_in_fn(
            &self.root,
            ["show", "--no-patch", &format_arg, sha.as_str()],
            |out| Ok(out.trim_end().to_string()),
        )?;
        let mut fields = header.splitn(5, SEP);
        let hash = fields.next().ok_or(GitError::Undecodable)?;
        let author_name = fields.next().ok_or(GitError::Undecodable)?.to_string();
        let author_email = fields.next().ok_or(GitError::Undecodable)?.to_string();
        let timestamp: i64 = fields
            .next()
            .ok_or(GitError::Undecodable)?
            .parse()
            .map_err(|_| GitError::Undecodable)?;
        let summary = fields.next().unwrap_or_default().to_string();

        let parent = git_in_fn(
            &self.root,
            ["rev-parse", "--verify", "-q", &format!("{}^", sha.as_str())],
            |out| Ok(out.trim().to_string()),
        )
        .unwrap_or_default();
        let parent_ref = if parent.is_empty() { EMPTY_TREE } else { &parent };

        let changes = git_in_fn(
            &self.root,
            [
                "diff-tree",
                "--no-commit-id",
                "--name-only",
                "-r",
                parent_ref,
                sha.as_str(),
            ],
            |out| Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect()),
        )?;

        Ok(CommitInfo {
            sha: CommitSha::from_str(hash)?,
            author_name,
            author_email,
            timestamp,
            summary,
            changes,
        })
    }

    /// Working-tree, index, and untracked paths whose extension is in `extensions`
    /// (an empty set tracks nothing, matching the default `track_uncommitted` config).
    pub fn working_changes(&self, extensions: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut paths = BTreeSet::new();

        let unstaged = git_in_fn(&self.root, ["diff", "--name-only", "HEAD"], parse_path_lines)
            .or_else(|e| match e {
                // No HEAD yet (empty repository) -- nothing is "diffed against HEAD".
                GitError::CommandFailed { .. } => Ok(Vec::new()),
                e => Err(e),
            })?;
        let staged = git_in_fn(&self.root, ["diff", "--cached", "--name-only"], parse_path_lines)?;
        let untracked = git_in_fn(
            &self.root,
            ["ls-files", "--others", "--exclude-standard"],
            parse_path_lines,
        )?;

        paths.extend(unstaged);
        paths.extend(staged);
        paths.extend(untracked);

        Ok(paths
            .into_iter()
            .filter(|p| has_tracked_extension(p, extensions))
            .collect())
    }

    /// Whether `path` (repository-relative) currently exists on disk.
    pub fn file_exists_on_disk(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }

    /// Sets the writable bit of `path` (repository-relative) on or off.
    #[cfg(unix)]
    pub fn chmod(&self, path: &str, writable: bool) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let full = self.root.join(path);
        let mut perms = fs::metadata(&full)?.permissions();
        let mode = perms.mode();
        let new_mode = if writable { mode | 0o200 } else { mode & !0o222 };
        perms.set_mode(new_mode);
        fs::set_permissions(&full, perms)
    }

    #[cfg(not(unix))]
    pub fn chmod(&self, path: &str, writable: bool) -> io::Result<()> {
        let full = self.root.join(path);
        let mut perms = fs::metadata(&full)?.permissions();
        perms.set_readonly(!writable);
        fs::set_permissions(&full, perms)
    }

    /// Whether `path` (repository-relative) currently has its writable bit set.
    /// Missing files are reported writable (there is nothing to protect).
    #[cfg(unix)]
    pub fn is_writable(&self, path: &str) -> bool {
        use std::os::unix::fs::PermissionsExt;
        match fs::metadata(self.root.join(path)) {
            Ok(meta) => meta.permissions().mode() & 0o200 != 0,
            Err(_) => true,
        }
    }

    #[cfg(not(unix))]
    pub fn is_writable(&self, path: &str) -> bool {
        match fs::metadata(self.root.join(path)) {
            Ok(meta) => !meta.permissions().readonly(),
            Err(_) => true,
        }
    }

    /// Runs an arbitrary read-only `git` command and returns its stdout lines.
    /// Used by the store backends, which need a few extra plumbing commands
    /// (`fetch`, `rev-parse`, ...) that do not warrant their own method here.
    pub fn raw<I, S>(&self, args: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        git_in_fn(&self.root, args, parse_path_lines)
    }

    /// Runs an arbitrary `git` command, discarding stdout.
    pub fn run<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        git_in(&self.root, args)
    }
}

fn parse_ref_lines(output: &str) -> Result<Vec<RefName>> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(RefName::from_str)
        .collect()
}

fn parse_path_lines(output: &str) -> Result<Vec<String>> {
    Ok(output
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

fn has_tracked_extension(path: &str, extensions: &BTreeSet<String>) -> bool {
    if extensions.is_empty() {
        return false;
    }
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(e))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter() {
        let mut exts = BTreeSet::new();
        exts.insert("png".to_string());
        assert!(has_tracked_extension("art/foo.png", &exts));
        assert!(!has_tracked_extension("src/main.rs", &exts));
        assert!(!has_tracked_extension("art/foo.png", &BTreeSet::new()));
    }
}
