//! The single choke point every `git` invocation passes through.
use crate::error::GitError;
use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::str;

type Result<A> = std::result::Result<A, GitError>;

/// Runs `git <args>` in `dir`, discarding stdout on success.
pub fn git_in<I, S, P>(dir: P, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    P: AsRef<Path>,
{
    git_in_fn(dir, args, |_| Ok(()))
}

/// Runs `git <args>` in `dir` and parses stdout with `process` on success.
///
/// Maps a missing `git` executable to [`GitError::GitNotFound`], a non-zero
/// exit to [`GitError::CommandFailed`] (with stdout/stderr captured), and
/// non-UTF8 output to [`GitError::Undecodable`].
pub fn git_in_fn<I, S, P, F, R>(dir: P, args: I, process: F) -> Result<R>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    P: AsRef<Path>,
    F: FnOnce(&str) -> Result<R>,
{
    let args: Vec<_> = args.into_iter().collect();
    let command_line = describe(&args);

    let span = tracing::debug_span!("git", command = %command_line);
    let _enter = span.enter();

    let output = Command::new("git")
        .current_dir(dir.as_ref())
        .args(args.iter().map(|a| a.as_ref()))
        .output();

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
                    .unwrap_or_else(|_| "[stdout: undecodable UTF-8]".to_string());
                let stderr = str::from_utf8(&output.stderr)
                    .map(|s| s.trim_end().to_owned())
                    .unwrap_or_else(|_| "[stderr: undecodable UTF-8]".to_string());
                tracing::warn!(%command_line, exit_code = output.status.code().unwrap_or(-1), %stderr, "git command failed");
                Err(GitError::CommandFailed {
                    command: command_line,
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                })
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(GitError::GitNotFound),
        Err(e) => {
            tracing::error!(error = %e, "failed to spawn git process");
            Err(GitError::Execution)
        }
    }
}

fn describe<S: AsRef<OsStr>>(args: &[S]) -> String {
    let mut s = String::from("git");
    for a in args {
        s.push(' ');
        s.push_str(&a.as_ref().to_string_lossy());
    }
    s
}
