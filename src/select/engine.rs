#![forbid(unsafe_code)]

//! Inline single/multi-select list.
//!
//! The engine draws below the current cursor position and never clears the
//! whole screen. Its region is one leading blank line, one line per item,
//! and (with instructions on) a blank separator plus the hint line. Between
//! frames the cursor rests on the region's last line, so every redraw and
//! the final cleanup are computed from [`Engine::region_height`] alone,
//! which only holds while no line wraps: every line is cut to the terminal
//! width before it is written.

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crossterm::queue;
use crossterm::style::{Attribute, Color, SetAttribute, SetForegroundColor};
use unicode_width::UnicodeWidthChar;

use crate::select::input::{Key, KeySource};
use crate::term::cursor;

const HINT_SINGLE: &str = "↑/↓ move • Enter select • Esc/q cancel";
const HINT_MULTI: &str = "↑/↓ move • Space toggle • Enter confirm • Esc/q cancel";

/// Columns taken by `[>] ` in single mode and `> [x] ` in multi mode.
const SINGLE_PREFIX_WIDTH: usize = 4;
const MULTI_PREFIX_WIDTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Single(usize),
    /// Ascending, without duplicates.
    Multiple(Vec<usize>),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOptions {
    pub show_instructions: bool,
    /// Multi-select only: confirm with nothing toggled returns an empty set
    /// instead of the item under the cursor.
    pub allow_empty: bool,
    pub color: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            show_instructions: true,
            allow_empty: false,
            color: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Single,
    Multi { toggled: Vec<bool> },
}

pub struct Engine<'a, W: Write> {
    items: &'a [String],
    mode: Mode,
    options: SelectOptions,
    cursor: usize,
    out: W,
    redraw: Arc<AtomicBool>,
    interrupt: Arc<AtomicI32>,
    interrupted: Option<i32>,
    width: fn() -> Option<usize>,
    columns: Option<usize>,
    erased_lines: usize,
}

impl<'a, W: Write> Engine<'a, W> {
    pub fn single(
        items: &'a [String],
        options: SelectOptions,
        out: W,
        redraw: Arc<AtomicBool>,
    ) -> Self {
        Self::with_mode(items, Mode::Single, options, out, redraw)
    }

    pub fn multi(
        items: &'a [String],
        options: SelectOptions,
        out: W,
        redraw: Arc<AtomicBool>,
    ) -> Self {
        let toggled = vec![false; items.len()];
        Self::with_mode(items, Mode::Multi { toggled }, options, out, redraw)
    }

    fn with_mode(
        items: &'a [String],
        mode: Mode,
        options: SelectOptions,
        out: W,
        redraw: Arc<AtomicBool>,
    ) -> Self {
        Self {
            items,
            mode,
            options,
            cursor: 0,
            out,
            redraw,
            interrupt: Arc::new(AtomicI32::new(0)),
            interrupted: None,
            width: || None,
            columns: None,
            erased_lines: 0,
        }
    }

    /// Signal number posted by the interrupt watcher, zero while none is
    /// pending. A posted signal ends the session like a cancel.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Arc<AtomicI32>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Terminal width source, queried on start and after every resize.
    /// `None` leaves lines uncut.
    #[must_use]
    pub fn with_width(mut self, width: fn() -> Option<usize>) -> Self {
        self.width = width;
        self
    }

    /// The signal that ended the last run, if one did.
    #[must_use]
    pub fn interrupted_by(&self) -> Option<i32> {
        self.interrupted
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Lines wiped by the last cleanup.
    #[must_use]
    pub fn erased_lines(&self) -> usize {
        self.erased_lines
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    #[must_use]
    pub fn region_height(&self) -> usize {
        let hint = if self.options.show_instructions { 2 } else { 0 };
        1 + self.items.len() + hint
    }

    /// Runs the session to completion. The drawn region is cleared on every
    /// exit, including a failing key source.
    pub fn run<K: KeySource>(&mut self, keys: &mut K) -> io::Result<Selection> {
        if self.items.is_empty() {
            return Ok(Selection::Cancelled);
        }

        self.columns = (self.width)();
        cursor::hide_cursor(&mut self.out)?;
        self.draw_region()?;

        let outcome = self.event_loop(keys);
        let cleared = self.clear_region();
        let selection = outcome?;
        cleared?;
        log::debug!("selection finished: {selection:?}");
        Ok(selection)
    }

    fn event_loop<K: KeySource>(&mut self, keys: &mut K) -> io::Result<Selection> {
        loop {
            let signo = self.interrupt.load(Ordering::Acquire);
            if signo != 0 {
                log::debug!("selection interrupted by signal {signo}");
                self.interrupted = Some(signo);
                return Ok(Selection::Cancelled);
            }
            if self.redraw.swap(false, Ordering::AcqRel) {
                self.redraw_full()?;
            }

            match keys.next_key()? {
                Key::Up | Key::Char(b'k') => {
                    if self.cursor > 0 {
                        self.cursor -= 1;
                        self.redraw_items()?;
                    }
                }
                Key::Down | Key::Char(b'j') => {
                    if self.cursor + 1 < self.items.len() {
                        self.cursor += 1;
                        self.redraw_items()?;
                    }
                }
                Key::Space => {
                    if let Mode::Multi { toggled } = &mut self.mode {
                        toggled[self.cursor] = !toggled[self.cursor];
                        self.redraw_items()?;
                    }
                }
                Key::Enter => return Ok(self.confirm()),
                Key::Escape | Key::Char(b'q' | b'Q') => return Ok(Selection::Cancelled),
                Key::Char(_) | Key::None => {}
            }
        }
    }

    fn confirm(&mut self) -> Selection {
        match &mut self.mode {
            Mode::Single => Selection::Single(self.cursor),
            Mode::Multi { toggled } => {
                if !self.options.allow_empty && !toggled.iter().any(|&t| t) {
                    toggled[self.cursor] = true;
                }
                let picked = toggled
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &t)| t.then_some(i))
                    .collect();
                Selection::Multiple(picked)
            }
        }
    }

    /// Draws the whole region starting on the line the cursor is on.
    fn draw_region(&mut self) -> io::Result<()> {
        self.out.write_all(b"\r\n")?;
        for i in 0..self.items.len() {
            if i > 0 {
                self.out.write_all(b"\r\n")?;
            }
            self.write_item(i)?;
        }
        if self.options.show_instructions {
            self.out.write_all(b"\r\n\r\n")?;
            self.write_hint()?;
        }
        self.out.flush()
    }

    /// Terminal size may have changed: wipe from the region top down and
    /// draw everything again.
    fn redraw_full(&mut self) -> io::Result<()> {
        let up = self.region_height() - 1;
        cursor::move_up(&mut self.out, up)?;
        cursor::clear_line(&mut self.out)?;
        cursor::clear_below(&mut self.out)?;
        self.columns = (self.width)();
        self.draw_region()
    }

    /// Rewrites the item lines in place; the hint is left alone.
    fn redraw_items(&mut self) -> io::Result<()> {
        let last = self.region_height() - 1;
        cursor::move_up(&mut self.out, last - 1)?;
        for i in 0..self.items.len() {
            if i > 0 {
                self.out.write_all(b"\r\n")?;
            }
            cursor::clear_line(&mut self.out)?;
            self.write_item(i)?;
        }
        cursor::move_down(&mut self.out, last - self.items.len())?;
        self.out.flush()
    }

    /// Erases exactly the drawn region bottom-up and leaves the cursor on
    /// the region's first line.
    fn clear_region(&mut self) -> io::Result<()> {
        let height = self.region_height();
        for row in 0..height {
            if row > 0 {
                cursor::move_up(&mut self.out, 1)?;
            }
            cursor::clear_line(&mut self.out)?;
        }
        self.erased_lines = height;
        cursor::clear_below(&mut self.out)?;
        cursor::show_cursor(&mut self.out)?;
        self.out.flush()
    }

    fn write_item(&mut self, index: usize) -> io::Result<()> {
        let current = index == self.cursor;
        let items = self.items;
        let prefix = match self.mode {
            Mode::Single => SINGLE_PREFIX_WIDTH,
            Mode::Multi { .. } => MULTI_PREFIX_WIDTH,
        };
        let text = fit(&items[index], self.text_budget(prefix));
        match &self.mode {
            Mode::Single => {
                if current {
                    queue!(self.out, SetAttribute(Attribute::Bold))?;
                    if self.options.color {
                        queue!(self.out, SetForegroundColor(Color::Cyan))?;
                    }
                    write!(self.out, "[>] {text}")?;
                } else {
                    write!(self.out, "[ ] {text}")?;
                }
            }
            Mode::Multi { toggled } => {
                let marker = if toggled[index] { "[x]" } else { "[ ]" };
                if current {
                    queue!(
                        self.out,
                        SetAttribute(Attribute::Bold),
                        SetAttribute(Attribute::Reverse)
                    )?;
                    write!(self.out, "> {marker} {text}")?;
                } else if toggled[index] && self.options.color {
                    self.out.write_all(b"  ")?;
                    queue!(self.out, SetForegroundColor(Color::Green))?;
                    write!(self.out, "{marker}")?;
                    queue!(self.out, SetAttribute(Attribute::Reset))?;
                    write!(self.out, " {text}")?;
                } else {
                    write!(self.out, "  {marker} {text}")?;
                }
            }
        }
        // Item text may carry its own styling; nothing survives the line.
        queue!(self.out, SetAttribute(Attribute::Reset))
    }

    fn write_hint(&mut self) -> io::Result<()> {
        let hint = match self.mode {
            Mode::Single => HINT_SINGLE,
            Mode::Multi { .. } => HINT_MULTI,
        };
        let hint = fit(hint, self.text_budget(0));
        queue!(self.out, SetAttribute(Attribute::Dim))?;
        self.out.write_all(hint.as_bytes())?;
        queue!(self.out, SetAttribute(Attribute::Reset))
    }

    /// Columns left for text after `prefix`. The last column stays empty
    /// so a full line never triggers the terminal's pending wrap.
    fn text_budget(&self, prefix: usize) -> Option<usize> {
        self.columns
            .map(|cols| cols.saturating_sub(1).saturating_sub(prefix))
    }
}

/// Length of the CSI escape sequence at the start of `s`, if any.
fn escape_len(s: &str) -> Option<usize> {
    let rest = s.strip_prefix("\x1b[")?;
    let end = rest.find(|c: char| ('\x40'..='\x7e').contains(&c))?;
    Some(2 + end + 1)
}

/// Terminal columns `text` occupies; escape sequences take none.
fn display_width(text: &str) -> usize {
    let mut width = 0;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        let len = escape_len(rest).unwrap_or_else(|| {
            width += c.width().unwrap_or(0);
            c.len_utf8()
        });
        rest = &rest[len..];
    }
    width
}

/// Cuts `text` to at most `max` columns, marking the cut with `…`.
/// Escape sequences before the cut are kept.
fn fit(text: &str, max: Option<usize>) -> Cow<'_, str> {
    let Some(max) = max else {
        return Cow::Borrowed(text);
    };
    if display_width(text) <= max {
        return Cow::Borrowed(text);
    }

    let budget = max.saturating_sub(1);
    let mut out = String::with_capacity(text.len());
    let mut used = 0;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        let len = match escape_len(rest) {
            Some(len) => {
                out.push_str(&rest[..len]);
                len
            }
            None => {
                let w = c.width().unwrap_or(0);
                if used + w > budget {
                    break;
                }
                used += w;
                out.push(c);
                c.len_utf8()
            }
        };
        rest = &rest[len..];
    }
    if max > 0 {
        out.push('…');
    }
    Cow::Owned(out)
}
