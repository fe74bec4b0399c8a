#![forbid(unsafe_code)]

//! Cross-process advisory lock over one repository's worktree set.
//!
//! Exclusion is the existence of the lock file, created with
//! `O_CREAT | O_EXCL` semantics. Its content (holder pid, then acquisition
//! unix time, one per line) is only read to decide staleness.

use std::fs::OpenOptions;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use time::OffsetDateTime;

use crate::error::GwtError;

pub const LOCK_FILE_NAME: &str = "git-wt.lock";

/// Sleep between acquisition attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockInfo {
    pub pid: i32,
    /// Missing or unparsable second line is tolerated.
    pub acquired_at: Option<i64>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            pid: std::process::id().try_into().unwrap_or(i32::MAX),
            acquired_at: Some(OffsetDateTime::now_utc().unix_timestamp()),
        }
    }

    fn parse(raw: &str) -> Result<Self, String> {
        let mut lines = raw.lines();
        let first = lines.next().unwrap_or("").trim();
        let pid: i32 = first
            .parse()
            .map_err(|e| format!("invalid pid '{first}': {e}"))?;
        if pid <= 0 {
            return Err(format!("invalid pid '{first}'"));
        }
        let acquired_at = lines.next().and_then(|l| l.trim().parse().ok());
        Ok(Self { pid, acquired_at })
    }

    fn render(&self) -> String {
        format!("{}\n{}\n", self.pid, self.acquired_at.unwrap_or_default())
    }
}

#[derive(Debug)]
pub struct WorktreeLock {
    path: PathBuf,
    held: bool,
}

impl WorktreeLock {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, held: false }
    }

    /// Lock for the repository whose common git dir is `git_dir`.
    #[must_use]
    pub fn for_git_dir(git_dir: &Path) -> Self {
        Self::new(git_dir.join(LOCK_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// One non-blocking attempt.
    pub fn try_acquire(&mut self) -> Result<bool, GwtError> {
        if self.held {
            return Ok(true);
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(self.io_error(e)),
        };

        if let Err(e) = file
            .write_all(LockInfo::current().render().as_bytes())
            .and_then(|()| file.sync_all())
        {
            drop(file);
            let _ = std::fs::remove_file(&self.path);
            return Err(self.io_error(e));
        }

        self.held = true;
        log::debug!("acquired lock {}", self.path.display());
        Ok(true)
    }

    /// Polls until the lock is ours or `timeout` has elapsed.
    pub fn acquire(&mut self, timeout: Duration) -> Result<(), GwtError> {
        let start = Instant::now();
        loop {
            if self.try_acquire()? {
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= timeout {
                log::debug!("timed out waiting for lock {}", self.path.display());
                return Err(GwtError::LockTimeout {
                    path: self.path.clone(),
                    waited,
                });
            }
            std::thread::sleep(RETRY_INTERVAL.min(timeout - waited));
        }
    }

    /// Current holder as recorded in the lock file, if any.
    pub fn holder(&self) -> Result<Option<LockInfo>, GwtError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        LockInfo::parse(&raw)
            .map(Some)
            .map_err(|reason| GwtError::LockMetadata {
                path: self.path.clone(),
                reason,
            })
    }

    /// A missing lock file is stale. Unparsable content is an error rather
    /// than a guess, so a live lock is never discarded on bad data.
    pub fn is_stale(&self) -> Result<bool, GwtError> {
        match self.holder()? {
            None => Ok(true),
            Some(info) => Ok(!process_alive(info.pid)),
        }
    }

    /// Removes the lock file when its holder is gone. Returns whether a
    /// file was removed.
    pub fn clean_stale(&self) -> Result<bool, GwtError> {
        let Some(dead) = self.holder()? else {
            return Ok(false);
        };
        if process_alive(dead.pid) {
            return Ok(false);
        }
        self.remove_if_unchanged(dead)
    }

    /// Unlinks the lock file only while it still records `expected`.
    ///
    /// Another instance may have reaped the same dead holder and acquired
    /// the lock since `expected` was read; its file carries a different
    /// pid or timestamp and is left alone. The window between this re-read
    /// and the unlink remains: two reapers that both pass the check can
    /// still delete a lock taken in between.
    fn remove_if_unchanged(&self, expected: LockInfo) -> Result<bool, GwtError> {
        if self.holder()? != Some(expected) {
            log::debug!("lock {} changed hands; not removing", self.path.display());
            return Ok(false);
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("removed stale lock {}", self.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Deletes the lock file if this instance holds it. Failures are logged.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("released lock {}", self.path.display()),
            Err(e) => log::warn!("failed to remove lock {}: {e}", self.path.display()),
        }
    }

    fn io_error(&self, source: io::Error) -> GwtError {
        GwtError::IoPath {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for WorktreeLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Signal 0 liveness check. `EPERM` means the process exists under another user.
fn process_alive(pid: i32) -> bool {
    match signal::kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            log::warn!("liveness check for pid {pid} failed: {e}");
            true
        }
    }
}
