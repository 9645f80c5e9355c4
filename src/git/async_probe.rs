//! Async mirror of [`GitProbe`] for embedding Gitalong's read-only queries
//! in an async host behind an optional `async` feature.
use super::types::{CommitSha, GitUrl, RefName};
use crate::error::GitError;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::{self, FromStr};
use tokio::process::Command;

type Result<A> = std::result::Result<A, GitError>;

/// Async equivalent of [`GitProbe`]; covers the subset of queries most useful
/// to embed in an async host (the CLI itself stays synchronous).
#[derive(Debug, Clone)]
pub struct AsyncGitProbe {
    root: PathBuf,
}

impl AsyncGitProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        AsyncGitProbe { root: root.into() }
    }

    pub async fn active_branch(&self) -> Result<Option<RefName>> {
        match run_fn(&self.root, ["symbolic-ref", "--short", "-q", "HEAD"], |out| {
            Ok(out.trim().to_string())
        })
        .await
        {
            Ok(name) if !name.is_empty() => Ok(Some(RefName::from_str(&name)?)),
            Ok(_) => Ok(None),
            Err(GitError::CommandFailed { exit_code, .. }) if exit_code == 1 => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn remote_url(&self) -> Result<GitUrl> {
        run_fn(&self.root, ["config", "--get", "remote.origin.url"], |out| {
            GitUrl::from_str(out.trim())
        })
        .await
    }

    pub async fn working_changes(&self, extensions: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut paths = std::collections::BTreeSet::new();
        let unstaged = run_fn(&self.root, ["diff", "--name-only", "HEAD"], parse_lines)
            .await
            .unwrap_or_default();
        let staged = run_fn(&self.root, ["diff", "--cached", "--name-only"], parse_lines).await?;
        let untracked = run_fn(
            &self.root,
            ["ls-files", "--others", "--exclude-standard"],
            parse_lines,
        )
        .await?;
        paths.extend(unstaged);
        paths.extend(staged);
        paths.extend(untracked);

        Ok(paths
            .into_iter()
            .filter(|p| {
                !extensions.is_empty()
                    && Path::new(p)
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(|e| extensions.contains(e))
                        .unwrap_or(false)
            })
            .collect())
    }

    pub async fn commit_sha(&self, ref_name: &str) -> Result<CommitSha> {
        run_fn(&self.root, ["rev-parse", ref_name], |out| {
            CommitSha::from_str(out.trim())
        })
        .await
    }
}

fn parse_lines(out: &str) -> Result<Vec<String>> {
    Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
}

async fn run_fn<I, S, F, R>(dir: &Path, args: I, process: F) -> Result<R>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    F: FnOnce(&str) -> Result<R>,
{
    let output = Command::new("git").current_dir(dir).args(args).output().await;
    match output {
        Ok(output) => {
            if output.status.success() {
                match str::from_utf8(&output.stdout) {
                    Ok(stdout) => process(stdout),
                    Err(_) => Err(GitError::Undecodable),
                }
            } else {
                let stdout = str::from_utf8(&output.stdout)
                    .map(|s| s.trim_end().to_owned())
                    .unwrap_or_default();
                let stderr = str::from_utf8(&output.stderr)
                    .map(|s| s.trim_end().to_owned())
                    .unwrap_or_default();
                Err(GitError::CommandFailed {
                    command: "git".to_string(),
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                })
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(GitError::GitNotFound),
        Err(_) => Err(GitError::Execution),
    }
}
