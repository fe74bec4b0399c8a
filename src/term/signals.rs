#![forbid(unsafe_code)]

//! Scoped interrupt/resize handling for an interactive selection session.
//!
//! Nothing here runs application code in signal context. Resize only flips
//! an atomic flag. Interrupts are forwarded by `signal-hook` through its
//! self-pipe to a watcher thread, which posts the signal number for the
//! selection loop. The loop erases its region, leaves raw mode and calls
//! [`exit_interrupted`]. Should the loop not get there within
//! [`INTERRUPT_GRACE`], the watcher takes the raw-mode slot lock, restores
//! the terminal itself and terminates the process with `128 + signo`.

use std::io::{self, Write as _};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use nix::sys::termios::{self, SetArg};
use signal_hook::SigId;
use signal_hook::consts::{SIGINT, SIGTERM, SIGWINCH};
use signal_hook::iterator::{Handle, Signals};

use crate::error::GwtError;
use crate::term::{cursor, raw_mode};

const INTERRUPT_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

/// How long the watcher leaves the selection loop to clean up after an
/// interrupt. The loop polls once per read timeout (100 ms).
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(1);

/// Once `signal-hook` owns a signal it never gives the disposition back,
/// so outside a session this flag makes its handler fall through to the
/// default action (terminate) again.
static DEFAULT_ACTION_ARMED: OnceLock<Arc<AtomicBool>> = OnceLock::new();

fn default_action_flag() -> io::Result<&'static Arc<AtomicBool>> {
    if let Some(flag) = DEFAULT_ACTION_ARMED.get() {
        return Ok(flag);
    }
    let flag = Arc::new(AtomicBool::new(true));
    for sig in INTERRUPT_SIGNALS {
        signal_hook::flag::register_conditional_default(sig, Arc::clone(&flag))?;
    }
    Ok(DEFAULT_ACTION_ARMED.get_or_init(|| flag))
}

/// Handlers installed for the lifetime of the value.
pub struct SignalScope {
    redraw: Arc<AtomicBool>,
    interrupt: Arc<AtomicI32>,
    resize_id: Option<SigId>,
    watcher: Option<(Handle, JoinHandle<()>)>,
}

impl SignalScope {
    pub fn install() -> Result<Self, GwtError> {
        let io_err = |e: io::Error| GwtError::Terminal(format!("failed to install signal handlers: {e}"));

        let armed = default_action_flag().map_err(io_err)?;
        armed.store(false, Ordering::SeqCst);

        let mut scope = Self {
            redraw: Arc::new(AtomicBool::new(false)),
            interrupt: Arc::new(AtomicI32::new(0)),
            resize_id: None,
            watcher: None,
        };

        scope.resize_id = Some(
            signal_hook::flag::register(SIGWINCH, Arc::clone(&scope.redraw)).map_err(io_err)?,
        );

        let mut signals = Signals::new(INTERRUPT_SIGNALS).map_err(io_err)?;
        let handle = signals.handle();
        let interrupt = Arc::clone(&scope.interrupt);
        let thread = std::thread::Builder::new()
            .name("git-wt-signals".to_owned())
            .spawn(move || {
                if let Some(signo) = signals.forever().next() {
                    interrupt.store(signo, Ordering::Release);
                    std::thread::sleep(INTERRUPT_GRACE);
                    terminate_on_interrupt(signo);
                }
            })
            .map_err(io_err)?;
        scope.watcher = Some((handle, thread));

        log::debug!("selection signal handlers installed");
        Ok(scope)
    }

    /// Set by the resize handler; the selection loop swaps it back to
    /// `false` when it performs the full redraw.
    #[must_use]
    pub fn redraw_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.redraw)
    }

    /// Holds the number of the first interrupt signal received, zero
    /// until then.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicI32> {
        Arc::clone(&self.interrupt)
    }
}

impl Drop for SignalScope {
    fn drop(&mut self) {
        if let Some(id) = self.resize_id.take() {
            signal_hook::low_level::unregister(id);
        }
        if let Some((handle, thread)) = self.watcher.take() {
            handle.close();
            if thread.join().is_err() {
                log::warn!("signal watcher thread panicked");
            }
        }
        if let Some(armed) = DEFAULT_ACTION_ARMED.get() {
            armed.store(true, Ordering::SeqCst);
        }
        log::debug!("selection signal handlers removed");
    }
}

/// Exits the way the interrupt would have, for a caller that has already
/// erased its output and restored the terminal.
pub fn exit_interrupted(signo: i32) -> ! {
    let _ = io::stdout().flush();
    log::debug!("exiting after signal {signo}");
    std::process::exit(128 + signo);
}

/// Last-resort path: leave the terminal usable and exit. The slot lock is
/// held until the process is gone so the main thread cannot race a
/// concurrent `RawMode::exit`.
fn terminate_on_interrupt(signo: i32) -> ! {
    let slot = raw_mode::lock_slot();
    if let Some(original) = slot.as_ref()
        && let Err(e) = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, original)
    {
        log::warn!("failed to restore terminal after signal {signo}: {e}");
    }
    let mut out = io::stdout();
    let _ = cursor::show_cursor(&mut out);
    let _ = out.write_all(b"\r\n");
    let _ = out.flush();
    log::debug!("terminating on signal {signo}");
    std::process::exit(128 + signo);
}
