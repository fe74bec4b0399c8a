#![forbid(unsafe_code)]

//! Numbered-list fallback for when stdin or stdout is not a terminal.

use std::io::{BufRead, Write};

use crate::error::GwtError;
use crate::select::engine::Selection;

/// Lists `items` on `out`, reads one answer line from `input`.
///
/// An empty answer, `q`, or end of input cancels. Multi mode accepts
/// numbers separated by commas or whitespace.
pub fn prompt<R: BufRead, W: Write>(
    items: &[String],
    multi: bool,
    mut input: R,
    mut out: W,
) -> Result<Selection, GwtError> {
    if items.is_empty() {
        return Ok(Selection::Cancelled);
    }

    let io_err = |e: std::io::Error| GwtError::Other(format!("prompt failed: {e}"));
    for (i, item) in items.iter().enumerate() {
        writeln!(out, "  {}) {item}", i + 1).map_err(io_err)?;
    }
    let hint = if multi { "numbers, comma separated" } else { "number" };
    write!(out, "Select {hint} [1-{}] (q to cancel): ", items.len()).map_err(io_err)?;
    out.flush().map_err(io_err)?;

    let mut answer = String::new();
    if input.read_line(&mut answer).map_err(io_err)? == 0 {
        return Ok(Selection::Cancelled);
    }

    if multi {
        Ok(parse_many(&answer, items.len())?.map_or(Selection::Cancelled, Selection::Multiple))
    } else {
        Ok(parse_one(&answer, items.len())?.map_or(Selection::Cancelled, Selection::Single))
    }
}

/// Parses a 1-based answer into a 0-based index. `None` means cancel.
pub fn parse_one(answer: &str, len: usize) -> Result<Option<usize>, GwtError> {
    let answer = answer.trim();
    if is_cancel(answer) {
        return Ok(None);
    }
    parse_number(answer, len).map(Some)
}

/// Parses a list of 1-based answers into sorted, deduplicated indices.
pub fn parse_many(answer: &str, len: usize) -> Result<Option<Vec<usize>>, GwtError> {
    let answer = answer.trim();
    if is_cancel(answer) {
        return Ok(None);
    }
    let mut picked = answer
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| parse_number(s, len))
        .collect::<Result<Vec<_>, _>>()?;
    picked.sort_unstable();
    picked.dedup();
    Ok(Some(picked))
}

fn is_cancel(answer: &str) -> bool {
    answer.is_empty() || answer.eq_ignore_ascii_case("q")
}

fn parse_number(s: &str, len: usize) -> Result<usize, GwtError> {
    let n: usize = s
        .parse()
        .map_err(|_| GwtError::InvalidSelection(format!("'{s}' is not a number")))?;
    if n == 0 || n > len {
        return Err(GwtError::InvalidSelection(format!(
            "{n} is out of range (1-{len})"
        )));
    }
    Ok(n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<String> {
        vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]
    }

    #[test]
    fn single_answer_is_one_based() {
        assert_eq!(parse_one("2\n", 3).unwrap(), Some(1));
        assert_eq!(parse_one("  q ", 3).unwrap(), None);
        assert_eq!(parse_one("", 3).unwrap(), None);
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(matches!(parse_one("0", 3), Err(GwtError::InvalidSelection(_))));
        assert!(matches!(parse_one("4", 3), Err(GwtError::InvalidSelection(_))));
        assert!(matches!(parse_one("two", 3), Err(GwtError::InvalidSelection(_))));
        assert!(matches!(parse_many("1, 9", 3), Err(GwtError::InvalidSelection(_))));
    }

    #[test]
    fn many_answers_are_sorted_and_unique() {
        assert_eq!(parse_many("3, 1 3,2", 3).unwrap(), Some(vec![0, 1, 2]));
    }

    #[test]
    fn prompt_lists_items_and_reads_answer() {
        let mut out = Vec::new();
        let selection = prompt(&items(), false, &b"3\n"[..], &mut out).unwrap();
        assert_eq!(selection, Selection::Single(2));
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("  1) a\n"));
        assert!(shown.contains("[1-3]"));
    }

    #[test]
    fn prompt_cancels_on_eof() {
        let selection = prompt(&items(), true, &b""[..], Vec::new()).unwrap();
        assert_eq!(selection, Selection::Cancelled);
    }

    #[test]
    fn prompt_multi() {
        let selection = prompt(&items(), true, &b"2,1\n"[..], Vec::new()).unwrap();
        assert_eq!(selection, Selection::Multiple(vec![0, 1]));
    }
}
