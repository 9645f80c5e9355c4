//! Idempotent, fenced-section installation of the shell hooks that call
//! `gitalong update`, plus `.gitignore` maintenance.
use crate::error::GitalongError;
use std::fs;
use std::path::Path;

type Result<T> = std::result::Result<T, GitalongError>;

const FENCE_START: &str = "# >>> gitalong >>>";
const FENCE_END: &str = "# <<< gitalong <<<";

/// Hooks that trigger a re-publish of this clone's local state.
pub const HOOK_NAMES: [&str; 4] = ["applypatch-msg", "post-checkout", "post-commit", "post-rewrite"];

/// Installs the gitalong-managed section into each of [`HOOK_NAMES`] under
/// `repo_root/.git/hooks/`, creating the hook file if it does not exist and
/// leaving any pre-existing content (or any other tool's own fenced section)
/// untouched.
pub fn install_hooks(repo_root: &Path) -> Result<()> {
    let hooks_dir = repo_root.join(".git").join("hooks");
    fs::create_dir_all(&hooks_dir)?;

    for name in HOOK_NAMES {
        let path = hooks_dir.join(name);
        let existing = fs::read_to_string(&path).unwrap_or_default();
        let updated = replace_fenced_section(&existing, &managed_section());
        let contents = if existing.trim().is_empty() {
            format!("#!/bin/sh\n{updated}\n")
        } else {
            format!("{updated}\n")
        };
        fs::write(&path, contents)?;
        set_executable(&path)?;
        tracing::debug!(hook = name, "installed hook");
    }
    Ok(())
}

fn managed_section() -> String {
    format!("{FENCE_START}\ngitalong update || true\n{FENCE_END}")
}

/// Replaces the text between `FENCE_START`/`FENCE_END` in `body` with
/// `section`, appending `section` if no fenced block is present yet.
fn replace_fenced_section(body: &str, section: &str) -> String {
    let body = body.trim_end();
    match (body.find(FENCE_START), body.find(FENCE_END)) {
        (Some(start), Some(end)) if end > start => {
            let before = body[..start].trim_end();
            let after = &body[end + FENCE_END.len()..];
            if before.is_empty() {
                format!("{section}{after}")
            } else {
                format!("{before}\n{section}{after}")
            }
        }
        _ => {
            if body.is_empty() {
                section.to_string()
            } else {
                format!("{body}\n{section}")
            }
        }
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    let mode = perms.mode();
    perms.set_mode(mode | 0o111);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Idempotently appends a fenced `.gitalong/` entry to `repo_root/.gitignore`.
pub fn update_gitignore(repo_root: &Path) -> Result<()> {
    let path = repo_root.join(".gitignore");
    let existing = fs::read_to_string(&path).unwrap_or_default();
    let section = format!("{FENCE_START}\n.gitalong/\n{FENCE_END}");
    let updated = replace_fenced_section(&existing, &section);
    fs::write(&path, format!("{updated}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_file_gets_fenced_section_appended() {
        let result = replace_fenced_section("", &managed_section());
        assert!(result.contains(FENCE_START));
        assert!(result.contains("gitalong update"));
    }

    #[test]
    fn preexisting_content_is_preserved() {
        let body = "#!/bin/sh\necho hello\n";
        let result = replace_fenced_section(body.trim_end(), &managed_section());
        assert!(result.contains("echo hello"));
        assert!(result.contains(FENCE_START));
    }

    #[test]
    fn reinstalling_replaces_only_the_fenced_section() {
        let first = replace_fenced_section("#!/bin/sh\necho keep-me\n", &managed_section());
        let second = replace_fenced_section(&first, &managed_section());
        assert_eq!(first, second);
        assert_eq!(second.matches(FENCE_START).count(), 1);
        assert!(second.contains("echo keep-me"));
    }

    #[test]
    fn install_hooks_creates_all_four_executable_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        install_hooks(dir.path()).unwrap();
        for name in HOOK_NAMES {
            let path = dir.path().join(".git").join("hooks").join(name);
            assert!(path.exists());
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = fs::metadata(&path).unwrap().permissions().mode();
                assert!(mode & 0o111 != 0);
            }
        }
    }

    #[test]
    fn gitignore_gets_fenced_entry() {
        let dir = tempfile::tempdir().unwrap();
        update_gitignore(dir.path()).unwrap();
        let contents = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(contents.contains(".gitalong/"));
        update_gitignore(dir.path()).unwrap();
        let contents2 = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(contents2.matches(FENCE_START).count(), 1);
    }
}
