//! Typed wrapper around the `git` command-line tool: validated newtypes,
//! the subprocess executor, and the read-only probe.

pub mod exec;
pub mod probe;
pub mod types;

#[cfg(feature = "async")]
pub mod async_probe;

pub use probe::{CommitInfo, GitProbe};
pub use types::{CommitSha, GitUrl, RefName};

#[cfg(feature = "async")]
pub use async_probe::AsyncGitProbe;
