//! Caller-owned configuration for a single transformation.

use crate::{
  Column,
  LineNumber,
  diff::Change,
};

/// Options for one `process` call. Everything is optional; the zero value
/// asks for a plain cursor-less transformation.
///
/// Cursor and selection positions refer to the text being processed;
/// `prev_cursor_*` refer to where the cursor was before the edit that
/// produced this text. `changes` (or `prev_text`, from which a single
/// change is derived) tell smart and paren modes how indentation shifted.
#[derive(Debug, Clone, Default)]
pub struct Options {
  pub cursor_x:             Option<Column>,
  pub cursor_line:          Option<LineNumber>,
  pub prev_cursor_x:        Option<Column>,
  pub prev_cursor_line:     Option<LineNumber>,
  pub selection_start_line: Option<LineNumber>,

  /// Edits that produced the current text, in input coordinates.
  pub changes: Vec<Change>,

  /// On failure, return the partially processed text and cursor instead of
  /// the originals.
  pub partial_result: bool,

  /// Suppress the leading-close-paren and unmatched-outside-trail checks,
  /// balancing whatever is there.
  pub force_balance: bool,

  /// Populate [`crate::Answer::parens`] with the full paren tree.
  pub return_parens: bool,

  /// The text as it was before the edit; used to derive a [`Change`] when
  /// `changes` is empty.
  pub prev_text: Option<String>,
}
