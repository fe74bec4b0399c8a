#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::error::GwtError;

/// `git` subprocess runner rooted at one worktree.
#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
}

impl Git {
    pub fn from_cwd() -> Result<Self, GwtError> {
        let cwd = std::env::current_dir()
            .map_err(|e| GwtError::Other(format!("failed to get cwd: {e}")))?;
        Self::from_dir(&cwd)
    }

    pub fn from_dir(dir: &Path) -> Result<Self, GwtError> {
        let repo_root = find_repo_root(dir).ok_or(GwtError::NotInGitRepo)?;
        Ok(Self { repo_root })
    }

    #[must_use]
    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// The repository's shared metadata directory. Linked worktrees all
    /// resolve to the main checkout's `.git`, so a lock placed here covers
    /// the whole worktree set.
    pub fn git_common_dir(&self) -> Result<PathBuf, GwtError> {
        let out = self.run(&["rev-parse", "--git-common-dir"])?;
        let dir = PathBuf::from(out.trim());
        if dir.is_absolute() {
            Ok(dir)
        } else {
            Ok(self.repo_root.join(dir))
        }
    }

    pub fn list_worktrees_porcelain(&self) -> Result<String, GwtError> {
        self.run(&["worktree", "list", "--porcelain"])
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool, GwtError> {
        let refname = format!("refs/heads/{branch}");
        let out = self.run_raw(&["show-ref", "--verify", "--quiet", &refname])?;
        Ok(out.status.success())
    }

    pub fn add_worktree(
        &self,
        path: &Path,
        branch: &str,
        create_from: Option<&str>,
    ) -> Result<(), GwtError> {
        let path = path.to_string_lossy();
        match create_from {
            Some(base) => {
                let _ = self.run(&["worktree", "add", "-b", branch, &path, base])?;
            }
            None => {
                let _ = self.run(&["worktree", "add", &path, branch])?;
            }
        }
        Ok(())
    }

    pub fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), GwtError> {
        let path = path.to_string_lossy();
        if force {
            let _ = self.run(&["worktree", "remove", "--force", &path])?;
        } else {
            let _ = self.run(&["worktree", "remove", &path])?;
        }
        Ok(())
    }

    pub fn prune_worktrees(&self, dry_run: bool) -> Result<String, GwtError> {
        if dry_run {
            self.run(&["worktree", "prune", "--dry-run", "--verbose"])
        } else {
            self.run(&["worktree", "prune", "--verbose"])
        }
    }

    pub fn delete_branch(&self, branch: &str, force: bool) -> Result<(), GwtError> {
        let flag = if force { "-D" } else { "-d" };
        let _ = self.run(&["branch", flag, branch])?;
        Ok(())
    }

    pub fn run(&self, args: &[&str]) -> Result<String, GwtError> {
        let out = self.run_raw(args)?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).to_string())
        } else {
            Err(GwtError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            })
        }
    }

    pub fn run_raw(&self, args: &[&str]) -> Result<Output, GwtError> {
        log::debug!("git {}", args.join(" "));
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => GwtError::GitNotFound,
                _ => GwtError::Other(format!("failed to run git: {e}")),
            })
    }
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    let mut cur = Some(start);
    while let Some(dir) = cur {
        let candidate = dir.join(".git");
        if candidate.is_dir() || candidate.is_file() {
            return Some(dir.to_path_buf());
        }
        cur = dir.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_root_from_nested_dir() {
        let td = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(td.path().join(".git")).unwrap();
        let nested = td.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(find_repo_root(&nested).as_deref(), Some(td.path()));
    }

    #[test]
    fn linked_worktree_gitfile_counts_as_root() {
        let td = tempfile::tempdir().expect("tempdir");
        std::fs::write(td.path().join(".git"), "gitdir: /elsewhere\n").unwrap();
        assert_eq!(find_repo_root(td.path()).as_deref(), Some(td.path()));
    }
}
