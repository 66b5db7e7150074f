//! The processing engine: a single pass over the input's grapheme clusters
//! that maintains the paren stack and per-line paren trails, classifies
//! code/comment/string context, consumes edit-derived indent deltas and
//! edits the working lines until paren structure and indentation agree.
//!
//! Control flow deviates from straight-line processing in exactly two
//! ways: a [`TransformError::Parinfer`] aborts the pass and surfaces the
//! error through the answer, and a [`TransformError::Restart`] (smart mode
//! only) unwinds the whole run and re-enters in paren mode on the same
//! input. Neither escapes [`process_text`].

use std::borrow::Cow;

use parinfer_core::{
  chars::{
    matching_paren,
    str_is_close_paren,
    str_is_open_paren,
  },
  grapheme::{
    graphemes,
    str_width,
  },
  line_ending::auto_detect_line_ending,
};
use smallvec::SmallVec;

use crate::{
  Column,
  Delta,
  Tendril,
  answer::{
    Answer,
    Closer,
    Error,
    ErrorName,
    Paren,
    ParenTrail,
  },
  options::Options,
  state::{
    ArgTabStop,
    Context,
    ErrorPos,
    EscapeState,
    InternalMode,
    Opener,
    OpenerId,
    State,
    Trail,
  },
};

/// The engine's internal failure type. `Restart` is never observable by
/// callers; `Parinfer` becomes [`Answer::error`].
pub(crate) enum TransformError {
  Restart,
  Parinfer(Box<Error>),
}

pub(crate) type Transform<T> = Result<T, TransformError>;

fn raise<T>(state: &State<'_>, name: ErrorName) -> Transform<T> {
  Err(TransformError::Parinfer(Box::new(state.make_error(name))))
}

pub(crate) fn process_text(
  text: &str,
  options: &Options,
  mode: InternalMode,
  smart: bool,
) -> Answer {
  tracing::debug!(?mode, smart, "processing text");
  let mut state = State::new(text, options, mode, smart);

  match run(&mut state) {
    Ok(()) => {},
    Err(TransformError::Restart) => {
      tracing::debug!("smart mode gave up, restarting in paren mode");
      return process_text(text, options, InternalMode::Paren, smart);
    },
    Err(TransformError::Parinfer(error)) => {
      tracing::debug!(name = error.name.as_str(), "transformation failed");
      state.error = Some(*error);
    },
  }

  public_result(state)
}

fn run(state: &mut State<'_>) -> Transform<()> {
  for i in 0..state.input_lines.len() {
    state.input_line_no = i;
    process_line(state, i)?;
  }
  finalize_result(state)
}

// Line processing.

fn init_line(state: &mut State<'_>) {
  state.line_no = state.lines.len();
  state.x = 0;
  state.indent_x = None;
  state.comment_x = None;
  state.indent_delta = 0;

  state.error_pos_cache.remove(&ErrorName::UnmatchedCloseParen);
  state.error_pos_cache.remove(&ErrorName::UnmatchedOpenParen);
  state.error_pos_cache.remove(&ErrorName::LeadingCloseParen);

  state.tracking_arg_tab_stop = ArgTabStop::NotSearching;
  state.tracking_indent = state.context != Context::String;
}

fn process_line(state: &mut State<'_>, line_index: usize) -> Transform<()> {
  init_line(state);
  let line = state.input_lines[line_index];
  state.lines.push(Cow::Borrowed(line));

  set_tab_stops(state);

  let mut col = 0;
  for grapheme in graphemes(line) {
    state.input_x = col;
    process_char(state, grapheme.slice, grapheme.width)?;
    col += grapheme.width;
  }
  // the newline is dispatch-only; input_x stays at the last grapheme
  process_char(state, "\n", 1)?;

  if !state.force_balance {
    check_unmatched_outside_paren_trail(state)?;
    check_leading_close_paren(state)?;
  }

  if state.paren_trail.line_no == Some(state.line_no) {
    finish_new_paren_trail(state);
  }
  Ok(())
}

fn set_tab_stops(state: &mut State<'_>) {
  if state.selection_start_line.or(state.cursor_line) != Some(state.line_no) {
    return;
  }

  for i in 0..state.paren_stack.len() {
    let id = state.paren_stack[i];
    let tab_stop = state.openers[id].tab_stop();
    state.tab_stops.push(tab_stop);
  }
  if state.mode == InternalMode::Paren {
    for i in (0..state.paren_trail.openers.len()).rev() {
      let id = state.paren_trail.openers[i];
      let tab_stop = state.openers[id].tab_stop();
      state.tab_stops.push(tab_stop);
    }
  }
}

// Character processing.

fn process_char(state: &mut State<'_>, orig: &str, orig_width: usize) -> Transform<()> {
  state.ch = orig.into();
  state.skip_char = false;

  handle_change_delta(state);

  if state.tracking_indent {
    check_indent(state)?;
  }

  if state.skip_char {
    state.ch = Tendril::new();
  } else {
    on_char(state)?;
  }

  commit_char(state, orig, orig_width);
  Ok(())
}

fn handle_change_delta(state: &mut State<'_>) {
  if state.changes.is_empty() || !(state.smart || state.mode == InternalMode::Paren) {
    return;
  }
  if let Some(change) = state.changes.get(&(state.input_line_no, state.input_x)) {
    state.indent_delta += change.new_end_x as Delta - change.old_end_x as Delta;
  }
}

fn commit_char(state: &mut State<'_>, orig: &str, orig_width: usize) {
  let ch_width = str_width(&state.ch);
  if state.ch.as_str() != orig {
    let (line_no, x) = (state.line_no, state.x);
    let ch = state.ch.clone();
    state.replace_within_line(line_no, x, x + orig_width, &ch);
    state.indent_delta -= orig_width as Delta - ch_width as Delta;
  }
  state.x += ch_width;
}

fn on_char(state: &mut State<'_>) -> Transform<()> {
  if state.escape == EscapeState::Escaped {
    state.escape = EscapeState::Normal;
  }

  if state.escape == EscapeState::Escaping {
    after_backslash(state)?;
  } else {
    let ch = state.ch.clone();
    match ch.as_str() {
      ch if str_is_open_paren(ch) => on_open_paren(state),
      ch if str_is_close_paren(ch) => on_close_paren(state)?,
      "\"" => on_quote(state),
      ";" => on_semicolon(state),
      "\\" => on_backslash(state),
      "\t" => on_tab(state),
      "\n" => on_newline(state),
      _ => {},
    }
  }

  if is_closable(state) {
    let line_no = state.line_no;
    let x = state.x + str_width(&state.ch);
    reset_paren_trail(state, line_no, x);
  }

  match state.tracking_arg_tab_stop {
    ArgTabStop::NotSearching => {},
    ArgTabStop::Space => {
      if state.context == Context::Code && is_whitespace(state) {
        state.tracking_arg_tab_stop = ArgTabStop::Arg;
      }
    },
    ArgTabStop::Arg => {
      if !is_whitespace(state) {
        if let Some(id) = state.peek_stack(0) {
          state.openers[id].arg_x = Some(state.x);
        }
        state.tracking_arg_tab_stop = ArgTabStop::NotSearching;
      }
    },
  }
  Ok(())
}

fn after_backslash(state: &mut State<'_>) -> Transform<()> {
  state.escape = EscapeState::Normal;
  if state.ch.as_str() == "\n" {
    if state.context == Context::Code {
      return raise(state, ErrorName::EolBackslash);
    }
    on_newline(state);
  } else {
    state.escape = EscapeState::Escaped;
  }
  Ok(())
}

fn on_open_paren(state: &mut State<'_>) {
  if state.context != Context::Code {
    return;
  }
  let Some(ch) = state.ch.chars().next() else { return };

  let opener = Opener {
    input_line_no: state.input_line_no,
    input_x: state.input_x,
    line_no: state.line_no,
    x: state.x,
    ch,
    indent_delta: state.indent_delta,
    max_child_indent: None,
    arg_x: None,
    closer: None,
    children: Vec::new(),
  };
  let id = state.openers.len();
  state.openers.push(opener);

  if state.return_parens {
    match state.peek_stack(0) {
      Some(parent) => state.openers[parent].children.push(id),
      None => state.parens.push(id),
    }
  }

  state.paren_stack.push(id);
  state.tracking_arg_tab_stop = ArgTabStop::Space;
}

fn is_valid_close_paren(state: &State<'_>, ch: char) -> bool {
  state
    .peek_stack(0)
    .is_some_and(|id| matching_paren(state.openers[id].ch) == Some(ch))
}

fn on_close_paren(state: &mut State<'_>) -> Transform<()> {
  if state.context != Context::Code {
    return Ok(());
  }
  let Some(ch) = state.ch.chars().next() else {
    return Ok(());
  };
  if is_valid_close_paren(state, ch) {
    on_matched_close_paren(state, ch)?;
  } else {
    on_unmatched_close_paren(state)?;
  }
  Ok(())
}

fn on_matched_close_paren(state: &mut State<'_>, ch: char) -> Transform<()> {
  let Some(id) = state.peek_stack(0) else {
    return Ok(());
  };
  if state.return_parens {
    state.openers[id].closer = Some(Closer {
      line_no: state.line_no,
      x: state.x,
      ch,
      trail: None,
    });
  }

  state.paren_trail.end_x = Some(state.x + 1);
  state.paren_trail.openers.push(id);

  if state.mode == InternalMode::Indent && state.smart && check_cursor_holding(state, id)? {
    // keep the closer where the user typed it: stash the trail and start a
    // fresh one right after it
    let orig_start_x = state.paren_trail.start_x;
    let orig_end_x = state.paren_trail.end_x;
    let orig_openers = std::mem::take(&mut state.paren_trail.openers);
    let (line_no, x) = (state.line_no, state.x + 1);
    reset_paren_trail(state, line_no, x);
    state.paren_trail.clamped.start_x = orig_start_x;
    state.paren_trail.clamped.end_x = orig_end_x;
    state.paren_trail.clamped.openers = orig_openers;
  }

  state.paren_stack.pop();
  state.tracking_arg_tab_stop = ArgTabStop::NotSearching;
  Ok(())
}

fn on_unmatched_close_paren(state: &mut State<'_>) -> Transform<()> {
  match state.mode {
    InternalMode::Paren => {
      let in_leading_paren_trail = state.paren_trail.line_no == Some(state.line_no)
        && state.paren_trail.start_x == state.indent_x;
      let can_remove = state.smart && in_leading_paren_trail;
      if !can_remove {
        return raise(state, ErrorName::UnmatchedCloseParen);
      }
    },
    InternalMode::Indent => {
      if !state.error_pos_cache.contains_key(&ErrorName::UnmatchedCloseParen) {
        state.cache_error_pos(ErrorName::UnmatchedCloseParen);
        if let Some(id) = state.peek_stack(0) {
          let opener = &state.openers[id];
          let pos = ErrorPos {
            line_no:       state.line_no,
            x:             state.x,
            input_line_no: opener.input_line_no,
            input_x:       opener.input_x,
          };
          state.error_pos_cache.insert(ErrorName::UnmatchedOpenParen, pos);
        }
      }
    },
  }
  state.ch = Tendril::new();
  Ok(())
}

/// The cursor "holds" an opener when it sits in the opener-to-opener window
/// on the opener's line, meaning the user is still typing there and the
/// trail must not be reset past it. Releasing a hold with no edit in play
/// restarts in paren mode.
fn check_cursor_holding(state: &State<'_>, id: OpenerId) -> Transform<bool> {
  let opener = &state.openers[id];
  let hold_min_x = state.peek_stack(1).map_or(0, |parent| state.openers[parent].x + 1);
  let hold_max_x = opener.x;

  let in_window = |line: Option<usize>, x: Option<Column>| {
    line == Some(opener.line_no) && x.is_some_and(|x| hold_min_x <= x && x <= hold_max_x)
  };
  let holding = in_window(state.cursor_line, state.cursor_x);

  if state.changes.is_empty() && state.prev_cursor_line.is_some() {
    let prev_holding = in_window(state.prev_cursor_line, state.prev_cursor_x);
    if prev_holding && !holding {
      return Err(TransformError::Restart);
    }
  }
  Ok(holding)
}

fn on_quote(state: &mut State<'_>) {
  match state.context {
    Context::String => state.context = Context::Code,
    Context::Comment => {
      state.quote_danger = !state.quote_danger;
      if state.quote_danger {
        state.cache_error_pos(ErrorName::QuoteDanger);
      }
    },
    Context::Code => {
      state.context = Context::String;
      state.cache_error_pos(ErrorName::UnclosedQuote);
    },
  }
}

fn on_semicolon(state: &mut State<'_>) {
  if state.context == Context::Code {
    state.context = Context::Comment;
    state.comment_x = Some(state.x);
    state.tracking_arg_tab_stop = ArgTabStop::NotSearching;
  }
}

fn on_backslash(state: &mut State<'_>) {
  state.escape = EscapeState::Escaping;
}

fn on_tab(state: &mut State<'_>) {
  if state.context == Context::Code {
    state.ch = "  ".into();
  }
}

fn on_newline(state: &mut State<'_>) {
  if state.context == Context::Comment {
    state.context = Context::Code;
  }
  state.ch = Tendril::new();
}

fn is_whitespace(state: &State<'_>) -> bool {
  state.escape != EscapeState::Escaped && matches!(state.ch.as_str(), " " | "  ")
}

/// A grapheme the paren trail must restart after: code that is neither
/// whitespace nor an unescaped closer.
fn is_closable(state: &State<'_>) -> bool {
  let ch = state.ch.as_str();
  let is_closer = str_is_close_paren(ch) && state.escape != EscapeState::Escaped;
  state.context == Context::Code && !is_whitespace(state) && !ch.is_empty() && !is_closer
}

// Indent checks.

fn check_indent(state: &mut State<'_>) -> Transform<()> {
  let ch = state.ch.clone();
  if str_is_close_paren(ch.as_str()) {
    on_leading_close_paren(state)?;
  } else if ch.as_str() == ";" {
    on_comment_line(state);
    state.tracking_indent = false;
  } else if ch.as_str() != "\n" && ch.as_str() != " " && ch.as_str() != "\t" {
    on_indent(state)?;
  }
  Ok(())
}

fn on_leading_close_paren(state: &mut State<'_>) -> Transform<()> {
  match state.mode {
    InternalMode::Indent => {
      if !state.force_balance {
        if state.smart {
          tracing::trace!("leading close paren in smart mode, restarting");
          return Err(TransformError::Restart);
        }
        if !state.error_pos_cache.contains_key(&ErrorName::LeadingCloseParen) {
          state.cache_error_pos(ErrorName::LeadingCloseParen);
        }
      }
      state.skip_char = true;
    },
    InternalMode::Paren => {
      let Some(ch) = state.ch.chars().next() else {
        return Ok(());
      };
      if !is_valid_close_paren(state, ch) {
        if state.smart {
          state.skip_char = true;
        } else {
          return raise(state, ErrorName::UnmatchedCloseParen);
        }
      } else if state.is_cursor_on_left(state.x) {
        let (line_no, x) = (state.line_no, state.x);
        reset_paren_trail(state, line_no, x);
        on_indent(state)?;
      } else {
        append_paren_trail(state);
        state.skip_char = true;
      }
    },
  }
  Ok(())
}

/// A comment-only line follows its parent opener's indent shift. In paren
/// mode the pending trail openers are pushed back for the parent lookup;
/// indent mode consults the bare stack.
fn on_comment_line(state: &mut State<'_>) {
  let trail_openers: Vec<OpenerId> = state.paren_trail.openers.to_vec();
  if state.mode == InternalMode::Paren {
    for &id in trail_openers.iter().rev() {
      state.paren_stack.push(id);
    }
  }

  let x = state.x;
  let depth = get_parent_opener_index(state, x);
  if let Some(id) = state.peek_stack(depth) {
    let delta = state.openers[id].indent_delta;
    if should_add_opener_indent(state, id) {
      add_indent(state, delta);
    }
  }

  if state.mode == InternalMode::Paren {
    for _ in 0..trail_openers.len() {
      state.paren_stack.pop();
    }
  }
}

fn on_indent(state: &mut State<'_>) -> Transform<()> {
  state.indent_x = Some(state.x);
  state.tracking_indent = false;

  if state.quote_danger {
    return raise(state, ErrorName::QuoteDanger);
  }

  match state.mode {
    InternalMode::Indent => {
      let x = state.x;
      correct_paren_trail(state, x);
      if let Some(id) = state.peek_stack(0) {
        let delta = state.openers[id].indent_delta;
        if should_add_opener_indent(state, id) {
          add_indent(state, delta);
        }
      }
    },
    InternalMode::Paren => correct_indent(state),
  }
  Ok(())
}

/// Skip the shift when the user already applied it, which happens when
/// multiple lines are indented together.
fn should_add_opener_indent(state: &State<'_>, id: OpenerId) -> bool {
  state.openers[id].indent_delta != state.indent_delta
}

fn add_indent(state: &mut State<'_>, delta: Delta) {
  let orig_indent = state.x;
  let new_indent = (orig_indent as Delta + delta).max(0) as Column;
  let indent_str = " ".repeat(new_indent);
  let line_no = state.line_no;
  state.replace_within_line(line_no, 0, orig_indent, &indent_str);
  state.x = new_indent;
  state.indent_x = Some(new_indent);
  state.indent_delta += delta;
}

fn correct_indent(state: &mut State<'_>) {
  let orig_indent = state.x;
  let mut new_indent = orig_indent as Delta;
  let mut min_indent: Column = 0;
  let mut max_indent = state.max_indent;

  if let Some(id) = state.peek_stack(0) {
    let opener = &state.openers[id];
    min_indent = opener.x + 1;
    max_indent = opener.max_child_indent;
    new_indent += opener.indent_delta;
  }

  new_indent = new_indent.max(min_indent as Delta);
  if let Some(max) = max_indent {
    new_indent = new_indent.min(max as Delta);
  }

  if new_indent != orig_indent as Delta {
    add_indent(state, new_indent - orig_indent as Delta);
  }
}

// Paren-trail management.

fn reset_paren_trail(state: &mut State<'_>, line_no: usize, x: Column) {
  state.paren_trail.line_no = Some(line_no);
  state.paren_trail.start_x = Some(x);
  state.paren_trail.end_x = Some(x);
  state.paren_trail.openers.clear();
  state.paren_trail.clamped = Default::default();
}

fn invalidate_paren_trail(state: &mut State<'_>) {
  state.paren_trail = Trail::default();
}

/// Paren mode, leading closer owned by the line above: write it at the end
/// of the previous trail instead of processing it in place.
fn append_paren_trail(state: &mut State<'_>) {
  let (Some(line_no), Some(end_x)) = (state.paren_trail.line_no, state.paren_trail.end_x) else {
    return;
  };
  let Some(id) = state.paren_stack.pop() else {
    return;
  };
  let Some(close_ch) = matching_paren(state.openers[id].ch) else {
    return;
  };

  if state.return_parens {
    state.openers[id].closer = Some(Closer {
      line_no,
      x: end_x,
      ch: close_ch,
      trail: None,
    });
  }

  set_max_indent(state, Some(id));
  state.replace_within_line(line_no, end_x, end_x, close_ch.encode_utf8(&mut [0u8; 4]));
  state.paren_trail.end_x = Some(end_x + 1);
  state.paren_trail.openers.push(id);
  update_remembered_paren_trail(state);
}

/// Closers left of the cursor are the user's own; split them off into the
/// clamped shadow so the correction pass cannot move them.
fn clamp_paren_trail_to_cursor(state: &mut State<'_>) {
  let (Some(start_x), Some(end_x)) = (state.paren_trail.start_x, state.paren_trail.end_x) else {
    return;
  };
  if !state.is_cursor_on_right(Some(start_x)) || state.is_cursor_in_comment() {
    return;
  }
  let Some(cursor_x) = state.cursor_x else {
    return;
  };

  let new_start_x = start_x.max(cursor_x);
  let new_end_x = end_x.max(cursor_x);

  let remove_count = {
    let line = &state.lines[state.line_no];
    let mut count = 0;
    let mut col = 0;
    for grapheme in graphemes(line) {
      if col >= new_start_x {
        break;
      }
      if col >= start_x && str_is_close_paren(grapheme.slice) {
        count += 1;
      }
      col += grapheme.width;
    }
    count
  };

  let openers = std::mem::take(&mut state.paren_trail.openers);
  let remove_count = remove_count.min(openers.len());
  state.paren_trail.clamped.openers = SmallVec::from_slice(&openers[..remove_count]);
  state.paren_trail.openers = SmallVec::from_slice(&openers[remove_count..]);
  state.paren_trail.start_x = Some(new_start_x);
  state.paren_trail.end_x = Some(new_end_x);
  state.paren_trail.clamped.start_x = Some(start_x);
  state.paren_trail.clamped.end_x = Some(end_x);
}

/// Indent mode closes lines provisionally; the openers go back on the
/// stack so the next line's indentation can re-place them.
fn pop_paren_trail(state: &mut State<'_>) {
  if state.paren_trail.start_x == state.paren_trail.end_x {
    return;
  }
  while let Some(id) = state.paren_trail.openers.pop() {
    state.paren_stack.push(id);
  }
}

/// Walks the paren stack from the innermost opener and decides which one
/// is the parent of a line indented to `indent_x`. Openers whose
/// `indent_delta` moved them relative to the line get the
/// adoption/fragmentation treatment.
fn get_parent_opener_index(state: &mut State<'_>, indent_x: Column) -> usize {
  let stack_len = state.paren_stack.len();
  let mut depth = 0;

  while depth < stack_len {
    let id = state.paren_stack[stack_len - 1 - depth];
    let opener_x = state.openers[id].x;
    let opener_delta = state.openers[id].indent_delta;

    let curr_outside = opener_x < indent_x;
    let prev_indent_x = indent_x as Delta - state.indent_delta;
    let prev_outside = (opener_x as Delta - opener_delta) < prev_indent_x;

    let is_parent = match (prev_outside, curr_outside) {
      (true, true) => true,
      (false, false) => false,

      // fragmentation: the opener used to enclose this indent; only an
      // unshifted line may break away from it
      (true, false) => state.indent_delta == 0,

      // adoption: the opener may take this line in, unless the next one
      // out would keep the indent inside its own threshold
      (false, true) => {
        let next_delta = (depth + 1 < stack_len)
          .then(|| state.openers[state.paren_stack[stack_len - 2 - depth]].indent_delta);
        let adopting = match next_delta {
          Some(next_delta) if next_delta <= opener_delta => {
            indent_x as Delta + next_delta > opener_x as Delta
          },
          Some(_) => true,
          None => state.indent_delta > opener_delta,
        };
        if adopting {
          // indent_delta is reserved for previous child lines only
          state.openers[id].indent_delta = 0;
        }
        adopting
      },
    };

    if is_parent {
      break;
    }
    depth += 1;
  }
  depth
}

/// Indent mode: close every opener the new indentation leaves behind,
/// writing their closers over the current trail.
fn correct_paren_trail(state: &mut State<'_>, indent_x: Column) {
  let depth = get_parent_opener_index(state, indent_x);
  tracing::trace!(depth, indent_x, "correcting paren trail");

  let trail_line_no = state.paren_trail.line_no;
  let trail_start_x = state.paren_trail.start_x;

  let mut parens = String::new();
  for i in 0..depth {
    let Some(id) = state.paren_stack.pop() else {
      break;
    };
    state.paren_trail.openers.push(id);
    let Some(close_ch) = matching_paren(state.openers[id].ch) else {
      continue;
    };
    parens.push(close_ch);

    if state.return_parens {
      if let (Some(line_no), Some(start_x)) = (trail_line_no, trail_start_x) {
        state.openers[id].closer = Some(Closer {
          line_no,
          x: start_x + i,
          ch: close_ch,
          trail: None,
        });
      }
    }
  }

  if let (Some(line_no), Some(start_x), Some(end_x)) =
    (trail_line_no, trail_start_x, state.paren_trail.end_x)
  {
    state.replace_within_line(line_no, start_x, end_x, &parens);
    state.paren_trail.end_x = Some(start_x + parens.len());
    update_remembered_paren_trail(state);
  }
}

/// Paren mode, cursor elsewhere: drop whitespace between the trail's
/// closers so they sit flush.
fn clean_paren_trail(state: &mut State<'_>) {
  let (Some(start_x), Some(end_x)) = (state.paren_trail.start_x, state.paren_trail.end_x) else {
    return;
  };
  if start_x == end_x || state.paren_trail.line_no != Some(state.line_no) {
    return;
  }

  let (new_trail, space_count) = {
    let line = &state.lines[state.line_no];
    let mut new_trail = String::new();
    let mut space_count = 0;
    let mut col = 0;
    for grapheme in graphemes(line) {
      if col >= end_x {
        break;
      }
      if col >= start_x {
        if str_is_close_paren(grapheme.slice) {
          new_trail.push_str(grapheme.slice);
        } else {
          space_count += grapheme.width;
        }
      }
      col += grapheme.width;
    }
    (new_trail, space_count)
  };

  if space_count > 0 {
    let line_no = state.line_no;
    state.replace_within_line(line_no, start_x, end_x, &new_trail);
    state.paren_trail.end_x = Some(end_x - space_count);
  }
}

/// The outermost closer on this line caps how far subsequent lines may
/// indent under the enclosing opener.
fn set_max_indent(state: &mut State<'_>, opener_id: Option<OpenerId>) {
  let Some(id) = opener_id else { return };
  let x = state.openers[id].x;
  match state.peek_stack(0) {
    Some(parent) => state.openers[parent].max_child_indent = Some(x),
    None => state.max_indent = Some(x),
  }
}

fn finish_new_paren_trail(state: &mut State<'_>) {
  if state.context == Context::String {
    invalidate_paren_trail(state);
  } else if state.mode == InternalMode::Indent {
    clamp_paren_trail_to_cursor(state);
    pop_paren_trail(state);
  } else {
    let last = state.paren_trail.openers.last().copied();
    set_max_indent(state, last);
    if state.cursor_line != Some(state.line_no) {
      clean_paren_trail(state);
    }
    remember_paren_trail(state);
  }
}

fn remember_paren_trail(state: &mut State<'_>) {
  let trail = &state.paren_trail;
  if trail.clamped.openers.is_empty() && trail.openers.is_empty() {
    return;
  }
  let Some(line_no) = trail.line_no else { return };

  let is_clamped = trail.clamped.start_x.is_some();
  let all_clamped = trail.openers.is_empty();
  let start_x = if is_clamped { trail.clamped.start_x } else { trail.start_x };
  let end_x = if all_clamped && is_clamped { trail.clamped.end_x } else { trail.end_x };
  let (Some(start_x), Some(end_x)) = (start_x, end_x) else {
    return;
  };

  let short_trail = ParenTrail { line_no, start_x, end_x };
  let ids: Vec<OpenerId> =
    trail.clamped.openers.iter().chain(trail.openers.iter()).copied().collect();
  state.paren_trails.push(short_trail);

  if state.return_parens {
    for id in ids {
      if let Some(closer) = state.openers[id].closer.as_mut() {
        closer.trail = Some(short_trail);
      }
    }
  }
}

fn update_remembered_paren_trail(state: &mut State<'_>) {
  let needs_new = match state.paren_trails.last() {
    Some(trail) => Some(trail.line_no) != state.paren_trail.line_no,
    None => true,
  };
  if needs_new {
    remember_paren_trail(state);
    return;
  }

  let Some(trail) = state.paren_trails.last_mut() else {
    return;
  };
  if let Some(end_x) = state.paren_trail.end_x {
    trail.end_x = end_x;
  }
  let short_trail = *trail;
  if state.return_parens {
    if let Some(&id) = state.paren_trail.openers.last() {
      if let Some(closer) = state.openers[id].closer.as_mut() {
        closer.trail = Some(short_trail);
      }
    }
  }
}

// Line-end checks.

fn check_unmatched_outside_paren_trail(state: &mut State<'_>) -> Transform<()> {
  if let Some(cache) = state.error_pos_cache.get(&ErrorName::UnmatchedCloseParen).copied() {
    let outside = state.paren_trail.start_x.map_or(true, |start_x| cache.x < start_x);
    if outside {
      return raise(state, ErrorName::UnmatchedCloseParen);
    }
  }
  Ok(())
}

fn check_leading_close_paren(state: &mut State<'_>) -> Transform<()> {
  if state.error_pos_cache.contains_key(&ErrorName::LeadingCloseParen)
    && state.paren_trail.line_no == Some(state.line_no)
  {
    return raise(state, ErrorName::LeadingCloseParen);
  }
  Ok(())
}

// Finalize and output.

fn finalize_result(state: &mut State<'_>) -> Transform<()> {
  if state.quote_danger {
    return raise(state, ErrorName::QuoteDanger);
  }
  if state.context == Context::String {
    return raise(state, ErrorName::UnclosedQuote);
  }

  if !state.paren_stack.is_empty() && state.mode == InternalMode::Paren {
    return raise(state, ErrorName::UnclosedParen);
  }
  if state.mode == InternalMode::Indent {
    // close any remaining openers against a virtual final empty line
    init_line(state);
    on_indent(state)?;
  }

  state.success = true;
  Ok(())
}

fn public_result(state: State<'_>) -> Answer {
  let line_ending = auto_detect_line_ending(state.orig_text);
  let join = |lines: &[Cow<'_, str>]| -> String {
    let mut text = String::new();
    for (i, line) in lines.iter().enumerate() {
      if i > 0 {
        text.push_str(line_ending.as_str());
      }
      text.push_str(line);
    }
    text
  };

  if state.success {
    Answer {
      text:         join(&state.lines),
      success:      true,
      error:        None,
      cursor_x:     state.cursor_x,
      cursor_line:  state.cursor_line,
      tab_stops:    state.tab_stops,
      paren_trails: state.paren_trails,
      parens:       materialize_parens(&state.openers, &state.parens),
    }
  } else {
    Answer {
      text: if state.partial_result {
        join(&state.lines)
      } else {
        state.orig_text.to_string()
      },
      success: false,
      error: state.error,
      cursor_x: if state.partial_result {
        state.cursor_x
      } else {
        state.orig_cursor_x
      },
      cursor_line: if state.partial_result {
        state.cursor_line
      } else {
        state.orig_cursor_line
      },
      tab_stops: Vec::new(),
      paren_trails: if state.partial_result {
        state.paren_trails
      } else {
        Vec::new()
      },
      parens: if state.partial_result {
        materialize_parens(&state.openers, &state.parens)
      } else {
        Vec::new()
      },
    }
  }
}

/// Clones the arena-backed tree into the owned result tree.
fn materialize_parens(openers: &[Opener], ids: &[OpenerId]) -> Vec<Paren> {
  ids
    .iter()
    .map(|&id| {
      let opener = &openers[id];
      Paren {
        line_no:          opener.line_no,
        x:                opener.x,
        ch:               opener.ch,
        indent_delta:     opener.indent_delta,
        max_child_indent: opener.max_child_indent,
        arg_x:            opener.arg_x,
        input_line_no:    opener.input_line_no,
        input_x:          opener.input_x,
        closer:           opener.closer.clone(),
        children:         materialize_parens(openers, &opener.children),
      }
    })
    .collect()
}
