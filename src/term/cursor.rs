#![forbid(unsafe_code)]

//! Stateless ANSI emitters. Nothing is flushed here; callers flush once a
//! frame is complete.

use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveDown, MoveUp, Show};
use crossterm::queue;
use crossterm::terminal::{Clear, ClearType};

pub fn hide_cursor(out: &mut impl Write) -> io::Result<()> {
    queue!(out, Hide)
}

pub fn show_cursor(out: &mut impl Write) -> io::Result<()> {
    queue!(out, Show)
}

/// Moving by zero rows emits nothing; `CSI 0 A` means one row on most
/// terminals.
pub fn move_up(out: &mut impl Write, rows: usize) -> io::Result<()> {
    if rows == 0 {
        return Ok(());
    }
    queue!(out, MoveUp(clamp_rows(rows)))
}

pub fn move_down(out: &mut impl Write, rows: usize) -> io::Result<()> {
    if rows == 0 {
        return Ok(());
    }
    queue!(out, MoveDown(clamp_rows(rows)))
}

/// Returns to column 0 and erases the whole line.
pub fn clear_line(out: &mut impl Write) -> io::Result<()> {
    out.write_all(b"\r")?;
    queue!(out, Clear(ClearType::CurrentLine))
}

/// Erases from the cursor to the end of the screen.
pub fn clear_below(out: &mut impl Write) -> io::Result<()> {
    queue!(out, Clear(ClearType::FromCursorDown))
}

fn clamp_rows(rows: usize) -> u16 {
    u16::try_from(rows).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_row_moves_emit_nothing() {
        let mut out = Vec::new();
        move_up(&mut out, 0).unwrap();
        move_down(&mut out, 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn emits_standard_sequences() {
        let mut out = Vec::new();
        move_up(&mut out, 3).unwrap();
        move_down(&mut out, 2).unwrap();
        clear_line(&mut out).unwrap();
        hide_cursor(&mut out).unwrap();
        show_cursor(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\x1b[3A\x1b[2B\r\x1b[2K\x1b[?25l\x1b[?25h"
        );
    }
}
