#![forbid(unsafe_code)]

pub mod cursor;
pub mod raw_mode;
pub mod signals;

use std::io::IsTerminal as _;

/// Both ends of the selection UI must be a terminal for raw-mode input to
/// make sense; anything else goes through the numbered prompt instead.
#[must_use]
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Columns of the terminal on stdout, if it reports a usable size.
#[must_use]
pub fn terminal_width() -> Option<usize> {
    crossterm::terminal::size()
        .ok()
        .map(|(cols, _)| usize::from(cols))
        .filter(|&cols| cols > 0)
}
