#![forbid(unsafe_code)]

pub mod engine;
pub mod input;
pub mod prompt;

use std::io;

pub use engine::{SelectOptions, Selection};

use crate::error::GwtError;
use crate::select::engine::Engine;
use crate::select::input::ByteDecoder;
use crate::term;
use crate::term::raw_mode::RawMode;
use crate::term::signals::{self, SignalScope};

/// Interactive single-select. Returns [`Selection::Cancelled`] without
/// drawing anything unless both stdin and stdout are terminals.
pub fn select_one(items: &[String], options: SelectOptions) -> Result<Selection, GwtError> {
    run_interactive(items, false, options)
}

/// Interactive multi-select; see [`select_one`].
pub fn select_many(items: &[String], options: SelectOptions) -> Result<Selection, GwtError> {
    run_interactive(items, true, options)
}

/// Interactive selection on a terminal, numbered prompt on stderr otherwise.
pub fn choose(items: &[String], multi: bool, options: SelectOptions) -> Result<Selection, GwtError> {
    if term::is_interactive() {
        return run_interactive(items, multi, options);
    }
    log::debug!("no terminal attached; using numbered prompt");
    prompt::prompt(items, multi, io::stdin().lock(), io::stderr())
}

fn run_interactive(
    items: &[String],
    multi: bool,
    options: SelectOptions,
) -> Result<Selection, GwtError> {
    if items.is_empty() || !term::is_interactive() {
        return Ok(Selection::Cancelled);
    }

    // Handlers go in before raw mode and come out after it, so an interrupt
    // at any point while raw finds the watcher running.
    let scope = SignalScope::install()?;
    let mut raw = RawMode::new();
    raw.enter()?;

    let mut keys = ByteDecoder::new(io::stdin());
    let engine = if multi {
        Engine::multi(items, options, io::stdout(), scope.redraw_flag())
    } else {
        Engine::single(items, options, io::stdout(), scope.redraw_flag())
    };
    let mut engine = engine
        .with_interrupt(scope.interrupt_flag())
        .with_width(term::terminal_width);
    let result = engine.run(&mut keys);

    raw.exit();
    if let Some(signo) = engine.interrupted_by() {
        signals::exit_interrupted(signo);
    }
    drop(scope);
    result.map_err(|e| GwtError::Terminal(format!("selection failed: {e}")))
}
