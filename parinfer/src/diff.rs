//! Change inference and the change map consumed by the engine.
//!
//! An editor that cannot report precise edits can hand over the previous
//! text instead; [`compute_text_change`] reduces the two texts to the
//! single differing span. Exactly one change is produced even for
//! multi-character edits.

use std::collections::HashMap;

use parinfer_core::{
  grapheme::{
    char_width,
    str_width,
  },
  line_ending::split_lines,
};

use crate::{
  Column,
  LineNumber,
  Tendril,
};

/// A single replaced span: `old_text` starting at `(line_no, x)` became
/// `new_text`. Coordinates are display cells in the previous text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
  pub x:        Column,
  pub line_no:  LineNumber,
  pub old_text: Tendril,
  pub new_text: Tendril,
}

/// Returns the single span on which `prev` and `text` differ, or `None`
/// when they are identical.
///
/// The forward scan stops at the first differing codepoint, the backward
/// scan at the last, bounded so the two never cross. The reported column
/// and line are those of the forward divergence.
#[must_use]
pub fn compute_text_change(prev: &str, text: &str) -> Option<Change> {
  if prev == text {
    return None;
  }

  let mut x: Column = 0;
  let mut line_no: LineNumber = 0;
  let mut start_prev = 0;
  let mut start_text = 0;

  for ((i, prev_ch), (j, ch)) in prev.char_indices().zip(text.char_indices()) {
    if prev_ch != ch {
      break;
    }
    if prev_ch == '\n' {
      x = 0;
      line_no += 1;
    } else {
      x += char_width(prev_ch);
    }
    start_prev = i + prev_ch.len_utf8();
    start_text = j + ch.len_utf8();
  }

  let mut end_prev = prev.len();
  let mut end_text = text.len();
  for ((i, prev_ch), (j, ch)) in prev.char_indices().rev().zip(text.char_indices().rev()) {
    if prev_ch != ch || i < start_prev || j < start_text {
      break;
    }
    end_prev = i;
    end_text = j;
  }

  Some(Change {
    x,
    line_no,
    old_text: prev[start_prev..end_prev].into(),
    new_text: text[start_text..end_text].into(),
  })
}

/// A [`Change`] reduced to what the engine consumes: the columns where its
/// old and new text end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransformedChange {
  pub old_end_x: Column,
  pub new_end_x: Column,
}

/// Keyed by the input coordinate where the new text ends, which is where
/// line processing encounters the change. Last writer wins on collision.
pub(crate) type ChangeMap = HashMap<(LineNumber, Column), TransformedChange>;

pub(crate) fn build_change_map(changes: &[Change]) -> ChangeMap {
  let mut map = ChangeMap::new();
  for change in changes {
    let old_lines = split_lines(&change.old_text);
    let new_lines = split_lines(&change.new_text);

    let start_of_last = |lines: &[&str]| if lines.len() == 1 { change.x } else { 0 };
    let old_end_x = start_of_last(&old_lines) + str_width(old_lines.last().unwrap_or(&""));
    let new_end_x = start_of_last(&new_lines) + str_width(new_lines.last().unwrap_or(&""));

    let line_no = change.line_no + new_lines.len() - 1;
    map.insert((line_no, new_end_x), TransformedChange { old_end_x, new_end_x });
  }
  map
}
