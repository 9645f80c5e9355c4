//! Validated newtypes for the pieces of Git data Gitalong moves around:
//! remote URLs, reference (branch) names, and commit SHAs.
use crate::error::GitError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

type Result<A> = std::result::Result<A, GitError>;

// Regex from https://github.com/jonschlinkert/is-git-url - compile time checked.
static GIT_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new("(?:git|ssh|https?|git@[-\\w.]+):(//)?(.*?)(\\.git)(/?|\\#[-\\d\\w._]+?)$")
        .expect("invalid static git URL regex")
});

/// A validated Git remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GitUrl {
    value: String,
}

impl FromStr for GitUrl {
    type Err = GitError;

    fn from_str(value: &str) -> Result<Self> {
        if GIT_URL_REGEX.is_match(value) {
            Ok(GitUrl {
                value: value.to_string(),
            })
        } else {
            Err(GitError::InvalidUrl(value.to_string()))
        }
    }
}

impl TryFrom<String> for GitUrl {
    type Error = GitError;
    fn try_from(value: String) -> Result<Self> {
        GitUrl::from_str(&value)
    }
}

impl From<GitUrl> for String {
    fn from(u: GitUrl) -> String {
        u.value
    }
}

impl Display for GitUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for GitUrl {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl AsRef<OsStr> for GitUrl {
    fn as_ref(&self) -> &OsStr {
        self.value.as_ref()
    }
}

/// A validated Git reference (branch) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName {
    value: String,
}

impl FromStr for RefName {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self> {
        if is_valid_reference_name(s) {
            Ok(RefName {
                value: s.to_string(),
            })
        } else {
            Err(GitError::InvalidRefName(s.to_string()))
        }
    }
}

impl TryFrom<String> for RefName {
    type Error = GitError;
    fn try_from(value: String) -> Result<Self> {
        RefName::from_str(&value)
    }
}

impl From<RefName> for String {
    fn from(r: RefName) -> String {
        r.value
    }
}

impl Display for RefName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl AsRef<OsStr> for RefName {
    fn as_ref(&self) -> &OsStr {
        self.value.as_ref()
    }
}

const INVALID_REFERENCE_CHARS: [char; 5] = [' ', '~', '^', ':', '\\'];
const INVALID_REFERENCE_START: &str = "-";
const INVALID_REFERENCE_END: &str = ".";

/// Checks if a string is a valid Git reference name, approximating the rules
/// from `git check-ref-format`. See https://git-scm.com/docs/git-check-ref-format.
fn is_valid_reference_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(INVALID_REFERENCE_START)
        && !name.ends_with(INVALID_REFERENCE_END)
        && name.chars().all(|c| {
            !c.is_ascii_control() && INVALID_REFERENCE_CHARS.iter().all(|invalid| c != *invalid)
        })
        && !name.contains("/.")
        && !name.contains("@{")
        && !name.contains("..")
        && name != "@"
        && !name.contains("//")
        && !name.contains("/*")
        && !name.contains('?')
        && !name.contains('[')
        && !name.contains(']')
}

/// A validated Git commit SHA, or the distinguished empty string standing in
/// for a synthetic "uncommitted" record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitSha {
    value: String,
}

impl CommitSha {
    /// The synthetic SHA standing in for an uncommitted record.
    pub fn uncommitted() -> Self {
        CommitSha {
            value: String::new(),
        }
    }

    pub fn is_uncommitted(&self) -> bool {
        self.value.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl FromStr for CommitSha {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(CommitSha::uncommitted());
        }
        let looks_like_sha =
            s.len() >= 7 && s.len() <= 40 && s.chars().all(|c| c.is_ascii_hexdigit());
        if looks_like_sha {
            Ok(CommitSha {
                value: s.to_ascii_lowercase(),
            })
        } else {
            Err(GitError::InvalidSha(s.to_string()))
        }
    }
}

impl TryFrom<String> for CommitSha {
    type Error = GitError;
    fn try_from(value: String) -> Result<Self> {
        CommitSha::from_str(&value)
    }
}

impl From<CommitSha> for String {
    fn from(s: CommitSha) -> String {
        s.value
    }
}

impl Display for CommitSha {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for CommitSha {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl AsRef<OsStr> for CommitSha {
    fn as_ref(&self) -> &OsStr {
        self.value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_git_urls() {
        let valid_urls = vec![
            "git://github.com/ember-cli/ember-cli.git#ff786f9f",
            "git@github.com:user/project.git",
            "https://github.com/user/project.git",
            "ssh://user@host.xz/path/to/repo.git/",
        ];
        for url in valid_urls {
            assert!(GitUrl::from_str(url).is_ok(), "expected valid: {url}");
        }
    }

    #[test]
    fn invalid_git_urls() {
        let invalid_urls = vec!["/path/to/repo.git/", "path/to/repo.git", "~/path/to/repo.git"];
        for url in invalid_urls {
            assert!(GitUrl::from_str(url).is_err(), "expected invalid: {url}");
        }
    }

    #[test]
    fn valid_reference_names() {
        for name in ["main", "a/valid/ref", "feature/new_stuff", "v1.0.0"] {
            assert!(RefName::from_str(name).is_ok(), "expected OK: {name}");
        }
    }

    #[test]
    fn invalid_reference_names() {
        for name in ["", "double..dot", "invalid^character", "-startwithdash", "end."] {
            assert!(RefName::from_str(name).is_err(), "expected Err: {name}");
        }
    }

    #[test]
    fn commit_sha_roundtrip() {
        let sha = CommitSha::from_str("a1b2c3d4e5f60718293a4b5c6d7e8f9012345678").unwrap();
        assert!(!sha.is_uncommitted());
        let empty = CommitSha::from_str("").unwrap();
        assert!(empty.is_uncommitted());
    }
}
