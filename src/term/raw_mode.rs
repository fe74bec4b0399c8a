#![forbid(unsafe_code)]

//! Raw-mode controller for the controlling terminal.
//!
//! The attributes captured on [`RawMode::enter`] are mirrored into a
//! process-wide slot so the interrupt watcher in [`super::signals`] can put
//! the terminal back even when the owning [`RawMode`] never gets dropped.
//! Every write to the slot happens while holding its mutex, and the
//! watcher reads it under the same mutex, so a signal observed after
//! `enter` returns always sees the published attributes.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use nix::sys::termios::{
    self, InputFlags, LocalFlags, SetArg, SpecialCharacterIndices, Termios,
};

use crate::error::GwtError;

/// Read timeout in tenths of a second while raw (VTIME).
const READ_TIMEOUT_DECISECONDS: u8 = 1;

static SAVED_ATTRIBUTES: Mutex<Option<Termios>> = Mutex::new(None);
static RAW_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Locks the signal-visible slot holding the active session's original
/// attributes. `None` means no raw session is active.
pub(crate) fn lock_slot() -> MutexGuard<'static, Option<Termios>> {
    SAVED_ATTRIBUTES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Whether some [`RawMode`] in this process currently has the terminal raw.
#[must_use]
pub fn is_raw() -> bool {
    RAW_ACTIVE.load(Ordering::Acquire)
}

/// Owns the pre-raw terminal attributes for one session.
///
/// Dropping the value restores the terminal, so early returns and panics
/// unwind through the same path as a normal [`RawMode::exit`].
#[derive(Debug, Default)]
pub struct RawMode {
    original: Option<Termios>,
}

impl RawMode {
    #[must_use]
    pub fn new() -> Self {
        Self { original: None }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.original.is_some()
    }

    /// Switches stdin to raw mode. Calling this while any session in the
    /// process is already raw does nothing.
    pub fn enter(&mut self) -> Result<(), GwtError> {
        if self.original.is_some() || is_raw() {
            return Ok(());
        }

        let stdin = io::stdin();
        let original = termios::tcgetattr(&stdin)
            .map_err(|e| GwtError::Terminal(format!("failed to read terminal attributes: {e}")))?;
        let raw = raw_attributes(&original);

        let mut slot = lock_slot();
        termios::tcsetattr(&stdin, SetArg::TCSAFLUSH, &raw)
            .map_err(|e| GwtError::Terminal(format!("failed to enable raw mode: {e}")))?;
        *slot = Some(original.clone());
        RAW_ACTIVE.store(true, Ordering::Release);
        drop(slot);

        log::debug!("terminal entered raw mode");
        self.original = Some(original);
        Ok(())
    }

    /// Restores the attributes captured by [`RawMode::enter`]. Does nothing
    /// when this session is not raw. Restore failures are logged only.
    pub fn exit(&mut self) {
        let Some(original) = self.original.take() else {
            return;
        };

        // Unpublish before restoring; the watcher must never restore
        // attributes of a session that is already tearing down.
        let mut slot = lock_slot();
        *slot = None;
        RAW_ACTIVE.store(false, Ordering::Release);
        if let Err(e) = termios::tcsetattr(io::stdin(), SetArg::TCSAFLUSH, &original) {
            log::warn!("failed to restore terminal attributes: {e}");
        } else {
            log::debug!("terminal restored from raw mode");
        }
        drop(slot);
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        self.exit();
    }
}

/// Canonical mode and echo off, signal keys left on, no input translation
/// or flow control, and reads that return after a short timeout with
/// whatever is available (possibly nothing).
pub(crate) fn raw_attributes(original: &Termios) -> Termios {
    let mut raw = original.clone();
    raw.local_flags
        .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::IEXTEN);
    raw.local_flags.insert(LocalFlags::ISIG);
    raw.input_flags.remove(
        InputFlags::ICRNL
            | InputFlags::INLCR
            | InputFlags::IXON
            | InputFlags::BRKINT
            | InputFlags::INPCK
            | InputFlags::ISTRIP,
    );
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = READ_TIMEOUT_DECISECONDS;
    raw
}

#[cfg(test)]
mod tests {
    use std::io::IsTerminal as _;

    use super::*;

    #[test]
    fn exit_without_enter_is_a_no_op() {
        let mut mode = RawMode::new();
        mode.exit();
        mode.exit();
        assert!(!mode.is_active());
    }

    #[test]
    fn enter_twice_matches_enter_once() {
        if !io::stdin().is_terminal() {
            eprintln!("skipping: stdin is not a terminal");
            return;
        }
        let before = termios::tcgetattr(io::stdin()).expect("tcgetattr");

        let mut mode = RawMode::new();
        mode.enter().expect("enter");
        let once = termios::tcgetattr(io::stdin()).expect("tcgetattr");
        mode.enter().expect("enter again");
        let twice = termios::tcgetattr(io::stdin()).expect("tcgetattr");
        assert_eq!(once, twice);
        assert!(is_raw());
        assert!(lock_slot().is_some());

        mode.exit();
        mode.exit();
        assert!(!is_raw());
        assert!(lock_slot().is_none());
        let after = termios::tcgetattr(io::stdin()).expect("tcgetattr");
        assert_eq!(before, after);
    }

    #[test]
    fn raw_attributes_keep_signal_keys() {
        if !io::stdin().is_terminal() {
            eprintln!("skipping: stdin is not a terminal");
            return;
        }
        let original = termios::tcgetattr(io::stdin()).expect("tcgetattr");
        let raw = raw_attributes(&original);
        assert!(raw.local_flags.contains(LocalFlags::ISIG));
        assert!(!raw.local_flags.contains(LocalFlags::ICANON));
        assert!(!raw.local_flags.contains(LocalFlags::ECHO));
        assert!(!raw.input_flags.contains(InputFlags::IXON));
        assert_eq!(raw.control_chars[SpecialCharacterIndices::VMIN as usize], 0);
    }
}
