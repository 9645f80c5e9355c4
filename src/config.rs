//! Loads and saves the per-repository `.gitalong.json` document.
use crate::error::GitalongError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = ".gitalong.json";

fn default_modify_permissions() -> bool {
    true
}
fn default_track_uncommitted() -> bool {
    true
}
fn default_pull_threshold() -> u64 {
    5
}

/// The `.gitalong.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store_url: String,
    #[serde(default)]
    pub store_headers: HashMap<String, String>,
    #[serde(default = "default_modify_permissions")]
    pub modify_permissions: bool,
    #[serde(default)]
    pub tracked_extensions: Vec<String>,
    #[serde(default = "default_track_uncommitted")]
    pub track_uncommitted: bool,
    #[serde(default = "default_pull_threshold")]
    pub pull_threshold: u64,
}

impl Config {
    pub fn new(store_url: String) -> Config {
        Config {
            store_url,
            store_headers: HashMap::new(),
            modify_permissions: default_modify_permissions(),
            tracked_extensions: Vec::new(),
            track_uncommitted: default_track_uncommitted(),
            pull_threshold: default_pull_threshold(),
        }
    }

    pub fn tracked_extensions_set(&self) -> BTreeSet<String> {
        self.tracked_extensions.iter().cloned().collect()
    }

    fn validate(&self) -> Result<(), GitalongError> {
        if self.store_url.trim().is_empty() {
            return Err(GitalongError::InvalidConfig("store_url".to_string()));
        }
        let looks_like_json_endpoint = self.store_url.starts_with("https://") || self.store_url.starts_with("http://");
        let looks_like_git_remote = self.store_url.ends_with(".git")
            || self.store_url.starts_with("git@")
            || self.store_url.starts_with("ssh://")
            || self.store_url.starts_with("git://")
            || self.store_url.starts_with('/')
            || self.store_url.starts_with('.');
        if !looks_like_json_endpoint && !looks_like_git_remote {
            return Err(GitalongError::InvalidConfig("store_url".to_string()));
        }
        Ok(())
    }

    fn path(repo_root: &Path) -> std::path::PathBuf {
        repo_root.join(CONFIG_FILE_NAME)
    }

    /// Loads `.gitalong.json` from `repo_root`. Returns [`GitalongError::NotSetUp`]
    /// if the file does not exist.
    pub fn load(repo_root: &Path) -> Result<Config, GitalongError> {
        let path = Self::path(repo_root);
        if !path.exists() {
            return Err(GitalongError::NotSetUp);
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| GitalongError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes `.gitalong.json` to `repo_root`. Returns
    /// [`GitalongError::AlreadySetUp`] if one already exists.
    pub fn save(&self, repo_root: &Path) -> Result<(), GitalongError> {
        self.validate()?;
        let path = Self::path(repo_root);
        if path.exists() {
            return Err(GitalongError::AlreadySetUp);
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| GitalongError::InvalidConfig(e.to_string()))?;
        std::fs::write(&path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::new("https://example.com/store.json".into());
        assert!(cfg.modify_permissions);
        assert!(cfg.track_uncommitted);
        assert_eq!(cfg.pull_threshold, 5);
        assert!(cfg.tracked_extensions.is_empty());
    }

    #[test]
    fn rejects_nonsense_store_url() {
        let cfg = Config::new("not-a-url-at-all".into());
        assert!(matches!(cfg.validate(), Err(GitalongError::InvalidConfig(_))));
    }

    #[test]
    fn load_missing_file_is_not_set_up() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Config::load(dir.path()), Err(GitalongError::NotSetUp)));
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::new("git@example.com:team/store.git".into());
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.store_url, cfg.store_url);

        assert!(matches!(cfg.save(dir.path()), Err(GitalongError::AlreadySetUp)));
    }
}
