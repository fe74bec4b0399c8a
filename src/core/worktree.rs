#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config;
use crate::config::Config;
use crate::core::git::Git;
use crate::error::GwtError;

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Worktree {
    pub path: String,
    /// Empty when HEAD is detached.
    pub branch: String,
    pub head: String,
    pub is_main: bool,
    pub is_current: bool,
    pub locked: bool,
    /// git reports the directory as gone.
    pub prunable: bool,
}

impl Worktree {
    #[must_use]
    pub fn name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.path)
    }

    #[must_use]
    pub fn matches(&self, pattern: &str) -> bool {
        let p = pattern.to_lowercase();
        self.branch.to_lowercase().contains(&p) || self.path.to_lowercase().contains(&p)
    }
}

#[derive(Debug, Clone)]
pub struct WorktreeManager {
    git: Git,
    cfg: Config,
}

impl WorktreeManager {
    #[must_use]
    pub fn new(git: Git, cfg: Config) -> Self {
        Self { git, cfg }
    }

    #[must_use]
    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn list(&self) -> Result<Vec<Worktree>, GwtError> {
        let out = self.git.list_worktrees_porcelain()?;
        let mut worktrees = parse_worktree_porcelain(&out);
        if let Ok(cwd) = std::env::current_dir() {
            mark_current(&mut worktrees, &cwd);
        }
        Ok(worktrees)
    }

    pub fn matching(&self, pattern: &str) -> Result<Vec<Worktree>, GwtError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|wt| wt.matches(pattern))
            .collect())
    }

    /// Where a worktree for `branch` goes when no path is given:
    /// `<base_dir>/<repo>-<branch>` with `base_dir` relative to the main
    /// checkout.
    pub fn default_path(&self, branch: &str) -> Result<PathBuf, GwtError> {
        let main = self.main_root()?;
        let base = config::resolve_dir(&self.cfg.worktree.base_dir, &main);
        let repo = main
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("repo");
        Ok(base.join(format!("{repo}-{}", branch.replace('/', "-"))))
    }

    /// Creates a worktree, attaching `branch` when it exists and creating it
    /// from `base` (or HEAD) otherwise. Returns the worktree path.
    pub fn add(
        &self,
        branch: &str,
        base: Option<&str>,
        path: Option<&Path>,
    ) -> Result<PathBuf, GwtError> {
        let path = match path {
            Some(p) => config::resolve_dir(&p.to_string_lossy(), self.git.repo_root()),
            None => self.default_path(branch)?,
        };
        validate_worktree_path(&path)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GwtError::IoPath {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let create_from = if self.git.branch_exists(branch)? {
            None
        } else {
            Some(base.unwrap_or("HEAD"))
        };
        self.git.add_worktree(&path, branch, create_from)?;
        Ok(path)
    }

    pub fn remove(&self, wt: &Worktree, force: bool, delete_branch: bool) -> Result<(), GwtError> {
        if wt.is_main {
            return Err(GwtError::Other(format!(
                "refusing to remove the main worktree {}",
                wt.path
            )));
        }
        self.git.remove_worktree(Path::new(&wt.path), force)?;
        if delete_branch && !wt.branch.is_empty() {
            self.git.delete_branch(&wt.branch, force)?;
        }
        Ok(())
    }

    /// Drops administrative entries for worktrees whose directory is gone.
    /// Returns git's report lines.
    pub fn prune(&self, dry_run: bool) -> Result<Vec<String>, GwtError> {
        let out = self.git.prune_worktrees(dry_run)?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn main_root(&self) -> Result<PathBuf, GwtError> {
        let common = self.git.git_common_dir()?;
        match common.parent() {
            Some(parent) if common.file_name().is_some_and(|n| n == ".git") => {
                Ok(parent.to_path_buf())
            }
            _ => Ok(self.git.repo_root().to_path_buf()),
        }
    }
}

fn validate_worktree_path(path: &Path) -> Result<(), GwtError> {
    if !path.exists() {
        return Ok(());
    }
    let io_err = |e| GwtError::IoPath {
        path: path.to_path_buf(),
        source: e,
    };
    if std::fs::metadata(path).map_err(io_err)?.is_dir() {
        let mut it = std::fs::read_dir(path).map_err(io_err)?;
        if it.next().is_some() {
            return Err(GwtError::Other(format!(
                "directory is not empty: {}",
                path.display()
            )));
        }
        return Ok(());
    }
    Err(GwtError::Other(format!(
        "path exists and is not a directory: {}",
        path.display()
    )))
}

/// Flags the worktree containing `cwd` (the deepest one, since linked
/// worktrees may live inside the main checkout).
fn mark_current(worktrees: &mut [Worktree], cwd: &Path) {
    let cwd = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
    let best = worktrees
        .iter()
        .enumerate()
        .filter_map(|(i, wt)| {
            let p = Path::new(&wt.path);
            let p = p.canonicalize().unwrap_or_else(|_| p.to_path_buf());
            cwd.starts_with(&p).then(|| (i, p.components().count()))
        })
        .max_by_key(|&(_, depth)| depth);
    if let Some((i, _)) = best {
        worktrees[i].is_current = true;
    }
}

/// Parses `git worktree list --porcelain`. The first entry is always the
/// main worktree.
pub fn parse_worktree_porcelain(out: &str) -> Vec<Worktree> {
    let mut entries: Vec<Worktree> = Vec::new();

    for line in out.lines() {
        let line = line.trim_end();
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.push(Worktree {
                path: path.to_owned(),
                is_main: entries.is_empty(),
                ..Worktree::default()
            });
            continue;
        }
        let Some(cur) = entries.last_mut() else {
            continue;
        };
        if let Some(branch) = line.strip_prefix("branch ") {
            branch
                .trim()
                .trim_start_matches("refs/heads/")
                .clone_into(&mut cur.branch);
        } else if let Some(head) = line.strip_prefix("HEAD ") {
            head.trim().clone_into(&mut cur.head);
        } else if line == "locked" || line.starts_with("locked ") {
            cur.locked = true;
        } else if line == "prunable" || line.starts_with("prunable ") {
            cur.prunable = true;
        }
    }

    entries
}
