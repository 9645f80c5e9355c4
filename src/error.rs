//! Defines the error types used throughout the crate.
use thiserror::Error;

/// Represents errors that can occur while shelling out to `git`.
#[derive(Debug, Error)]
pub enum GitError {
    /// Failed to access the current working directory, e.g., due to permissions.
    #[error("unable to access current working directory")]
    WorkingDirectoryInaccessible,

    /// Failed to execute the external 'git' process, e.g., 'git' not found in PATH.
    #[error("unable to execute git process")]
    Execution,

    /// The output (stdout or stderr) from the 'git' process was not valid UTF-8.
    #[error("unable to decode output from git executable")]
    Undecodable,

    /// The provided string is not a valid Git URL according to the crate's criteria.
    #[error("git URL is invalid: {0}")]
    InvalidUrl(String),

    /// The provided string is not a valid Git reference name (e.g., branch name).
    #[error("ref name is invalid: {0}")]
    InvalidRefName(String),

    /// The provided string is not a valid 40-character Git commit SHA.
    #[error("commit sha is invalid: {0}")]
    InvalidSha(String),

    /// The 'git' command executed but reported a non-zero exit status.
    /// Contains the command line and the captured stdout/stderr from the failed command.
    #[error("git {command} failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The path could not be converted to a UTF-8 string, required to build a git argument.
    #[error("path contains non-UTF8 characters and cannot be used as a command argument: {0:?}")]
    PathEncodingError(std::path::PathBuf),

    /// The 'git' executable was not found in the system's PATH.
    #[error("'git' command not found; ensure git is installed and on PATH")]
    GitNotFound,
}

/// Top level error type returned by the public Gitalong API.
#[derive(Debug, Error)]
pub enum GitalongError {
    /// No `.gitalong.json` at the repository root.
    #[error("this repository has not been set up for gitalong; run `gitalong setup <store-url>` first")]
    NotSetUp,

    /// `setup` was invoked on a repository that already has a `.gitalong.json`.
    #[error(".gitalong.json already exists; remove it before running setup again")]
    AlreadySetUp,

    /// The store backend could not be reached after exhausting the retry budget.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store write lost every retry to a conflicting concurrent write.
    #[error("store write conflict: retry budget exhausted after {attempts} attempts")]
    StoreConflict { attempts: u32 },

    /// A `git` subprocess invocation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A filesystem permission change was refused by the OS.
    #[error("permission denied changing mode of {0}")]
    PermissionDenied(std::path::PathBuf),

    /// `.gitalong.json` is present but malformed.
    #[error("invalid configuration field `{0}`")]
    InvalidConfig(String),

    /// Any other filesystem failure not otherwise classified.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for the public Gitalong API.
pub type Result<T> = std::result::Result<T, GitalongError>;
