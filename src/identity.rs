//! Derives the `(host, user)` pair that identifies one clone.
use crate::error::GitalongError;
use crate::git::GitProbe;

/// The publisher identity for one clone: a hostname paired with the Git
/// `user.email` configured in that clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub host: String,
    pub user: String,
}

impl Identity {
    /// Resolves the local identity from the OS hostname and the managed
    /// repository's `git config user.email`.
    pub fn local(probe: &GitProbe) -> Result<Identity, GitalongError> {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown-host".to_string());
        let user = probe.user_email()?;
        Ok(Identity { host, user })
    }
}
