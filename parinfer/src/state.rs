//! The per-call working set of the processing engine.
//!
//! One [`State`] lives for exactly one `process_text` run. Working lines
//! start as borrowed slices of the input and become owned strings on first
//! edit, so the free path is unambiguous. Open parens live in an arena and
//! are referenced by index everywhere they travel (paren stack, trail
//! openers, result tree), which gives them the stable identity the
//! trail-correction rules rely on without aliasing.

use std::{
  borrow::Cow,
  collections::HashMap,
};

use parinfer_core::{
  grapheme::{
    column_byte_index,
    str_width,
  },
  line_ending::split_lines,
};
use smallvec::SmallVec;

use crate::{
  Column,
  Delta,
  LineNumber,
  Tendril,
  answer::{
    Closer,
    Error,
    ErrorName,
    TabStop,
  },
  diff::{
    ChangeMap,
    build_change_map,
  },
  options::Options,
};

/// The engine runs in one of two internal modes; smart mode is indent mode
/// with the `smart` flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InternalMode {
  Indent,
  Paren,
}

/// Lexical context of the current grapheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Context {
  Code,
  Comment,
  String,
}

/// Backslash handling: `Escaping` after the backslash itself, `Escaped`
/// while processing the character it protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EscapeState {
  Normal,
  Escaping,
  Escaped,
}

/// Progress of the search for an opener's first-argument column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgTabStop {
  NotSearching,
  Space,
  Arg,
}

pub(crate) type OpenerId = usize;

/// An open paren in the arena. `children` and `closer` are only maintained
/// when the caller asked for the paren tree.
#[derive(Debug, Clone)]
pub(crate) struct Opener {
  pub line_no:          LineNumber,
  pub x:                Column,
  pub ch:               char,
  pub indent_delta:     Delta,
  pub max_child_indent: Option<Column>,
  pub arg_x:            Option<Column>,
  pub input_line_no:    LineNumber,
  pub input_x:          Column,
  pub closer:           Option<Closer>,
  pub children:         Vec<OpenerId>,
}

impl Opener {
  pub fn tab_stop(&self) -> TabStop {
    TabStop {
      ch:      self.ch,
      x:       self.x,
      line_no: self.line_no,
      arg_x:   self.arg_x,
    }
  }
}

/// The current line's paren trail, plus the pre-clamp shadow preserved for
/// smart-mode cursor decisions.
#[derive(Debug, Clone, Default)]
pub(crate) struct Trail {
  pub line_no: Option<LineNumber>,
  pub start_x: Option<Column>,
  pub end_x:   Option<Column>,
  pub openers: SmallVec<[OpenerId; 8]>,
  pub clamped: ClampedTrail,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ClampedTrail {
  pub start_x: Option<Column>,
  pub end_x:   Option<Column>,
  pub openers: SmallVec<[OpenerId; 8]>,
}

/// A cached error site, in both working and input coordinates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ErrorPos {
  pub line_no:       LineNumber,
  pub x:             Column,
  pub input_line_no: LineNumber,
  pub input_x:       Column,
}

pub(crate) struct State<'a> {
  pub mode:  InternalMode,
  pub smart: bool,

  pub orig_text:        &'a str,
  pub orig_cursor_x:    Option<Column>,
  pub orig_cursor_line: Option<LineNumber>,

  pub input_lines:   Vec<&'a str>,
  pub input_line_no: LineNumber,
  pub input_x:       Column,

  pub lines:    Vec<Cow<'a, str>>,
  pub line_no:  LineNumber,
  pub ch:       Tendril,
  pub x:        Column,
  pub indent_x: Option<Column>,

  pub openers:      Vec<Opener>,
  pub paren_stack:  SmallVec<[OpenerId; 16]>,
  pub tab_stops:    Vec<TabStop>,
  pub paren_trail:  Trail,
  pub paren_trails: Vec<crate::answer::ParenTrail>,

  pub return_parens: bool,
  pub parens:        Vec<OpenerId>,

  pub cursor_x:         Option<Column>,
  pub cursor_line:      Option<LineNumber>,
  pub prev_cursor_x:    Option<Column>,
  pub prev_cursor_line: Option<LineNumber>,

  pub selection_start_line: Option<LineNumber>,

  pub changes: ChangeMap,

  pub context:   Context,
  pub comment_x: Option<Column>,
  pub escape:    EscapeState,

  pub quote_danger:    bool,
  pub tracking_indent: bool,
  pub skip_char:       bool,
  pub success:         bool,
  pub partial_result:  bool,
  pub force_balance:   bool,

  pub max_indent:            Option<Column>,
  pub indent_delta:          Delta,
  pub tracking_arg_tab_stop: ArgTabStop,

  pub error:           Option<Error>,
  pub error_pos_cache: HashMap<ErrorName, ErrorPos>,
}

impl<'a> State<'a> {
  pub fn new(text: &'a str, options: &Options, mode: InternalMode, smart: bool) -> State<'a> {
    State {
      mode,
      smart,
      orig_text: text,
      orig_cursor_x: options.cursor_x,
      orig_cursor_line: options.cursor_line,
      input_lines: split_lines(text),
      input_line_no: 0,
      input_x: 0,
      lines: Vec::new(),
      line_no: 0,
      ch: Tendril::new(),
      x: 0,
      indent_x: None,
      openers: Vec::new(),
      paren_stack: SmallVec::new(),
      tab_stops: Vec::new(),
      paren_trail: Trail::default(),
      paren_trails: Vec::new(),
      return_parens: options.return_parens,
      parens: Vec::new(),
      cursor_x: options.cursor_x,
      cursor_line: options.cursor_line,
      prev_cursor_x: options.prev_cursor_x,
      prev_cursor_line: options.prev_cursor_line,
      selection_start_line: options.selection_start_line,
      changes: build_change_map(&options.changes),
      context: Context::Code,
      comment_x: None,
      escape: EscapeState::Normal,
      quote_danger: false,
      tracking_indent: false,
      skip_char: false,
      success: false,
      partial_result: options.partial_result,
      force_balance: options.force_balance,
      max_indent: None,
      indent_delta: 0,
      tracking_arg_tab_stop: ArgTabStop::NotSearching,
      error: None,
      error_pos_cache: HashMap::new(),
    }
  }

  /// The opener `depth` levels below the top of the paren stack.
  pub fn peek_stack(&self, depth: usize) -> Option<OpenerId> {
    let len = self.paren_stack.len();
    if depth < len {
      Some(self.paren_stack[len - 1 - depth])
    } else {
      None
    }
  }

  /// Splices `replace` over the display-column range `[start, end)` of a
  /// working line, converting it to an owned string and shifting a cursor
  /// sitting right of the splice.
  pub fn replace_within_line(
    &mut self,
    line_no: LineNumber,
    start: Column,
    end: Column,
    replace: &str,
  ) {
    let line = &self.lines[line_no];
    let start_byte = column_byte_index(line, start);
    let end_byte = column_byte_index(line, end);

    let mut new_line = String::with_capacity(line.len() + replace.len());
    new_line.push_str(&line[..start_byte]);
    new_line.push_str(replace);
    new_line.push_str(&line[end_byte..]);
    self.lines[line_no] = Cow::Owned(new_line);

    self.shift_cursor_on_edit(line_no, start, end, str_width(replace));
  }

  fn shift_cursor_on_edit(
    &mut self,
    line_no: LineNumber,
    start: Column,
    end: Column,
    new_width: usize,
  ) {
    let dx = new_width as Delta - (end - start) as Delta;
    if dx == 0 || self.cursor_line != Some(line_no) {
      return;
    }
    if let Some(cursor_x) = self.cursor_x {
      if cursor_x > start {
        self.cursor_x = Some((cursor_x as Delta + dx).max(0) as Column);
      }
    }
  }

  /// True when the cursor sits on the current line at or left of `x`.
  pub fn is_cursor_on_left(&self, x: Column) -> bool {
    self.cursor_line == Some(self.line_no) && self.cursor_x.is_some_and(|cx| cx <= x)
  }

  /// True when the cursor sits on the current line strictly right of `x`.
  pub fn is_cursor_on_right(&self, x: Option<Column>) -> bool {
    match (x, self.cursor_x) {
      (Some(x), Some(cursor_x)) => self.cursor_line == Some(self.line_no) && cursor_x > x,
      _ => false,
    }
  }

  pub fn is_cursor_in_comment(&self) -> bool {
    self.is_cursor_on_right(self.comment_x)
  }

  pub fn current_pos(&self) -> ErrorPos {
    ErrorPos {
      line_no:       self.line_no,
      x:             self.x,
      input_line_no: self.input_line_no,
      input_x:       self.input_x,
    }
  }

  /// Remembers the current position as the site of `name`, overwriting any
  /// earlier cache for it.
  pub fn cache_error_pos(&mut self, name: ErrorName) {
    let pos = self.current_pos();
    self.error_pos_cache.insert(name, pos);
  }

  /// Builds the public error for `name`, preferring the cached site and
  /// honoring the `partial_result` coordinate policy.
  pub fn make_error(&self, name: ErrorName) -> Error {
    let cache = self.error_pos_cache.get(&name).copied().unwrap_or_else(|| self.current_pos());
    let pick = |pos: &ErrorPos| {
      if self.partial_result {
        (pos.line_no, pos.x)
      } else {
        (pos.input_line_no, pos.input_x)
      }
    };
    let (mut line_no, mut x) = pick(&cache);
    let (mut input_line_no, mut input_x) = (cache.input_line_no, cache.input_x);

    let opener = self.peek_stack(0).map(|id| &self.openers[id]);
    let mut extra = None;

    match name {
      ErrorName::UnmatchedCloseParen => {
        let open_pos = self
          .error_pos_cache
          .get(&ErrorName::UnmatchedOpenParen)
          .copied()
          .or_else(|| {
            opener.map(|opener| ErrorPos {
              line_no:       opener.line_no,
              x:             opener.x,
              input_line_no: opener.input_line_no,
              input_x:       opener.input_x,
            })
          });
        if let Some(pos) = open_pos {
          let (extra_line_no, extra_x) = pick(&pos);
          extra = Some(Box::new(Error {
            name:          ErrorName::UnmatchedOpenParen,
            msg:           ErrorName::UnmatchedOpenParen.message(),
            x:             extra_x,
            line_no:       extra_line_no,
            input_x:       pos.input_x,
            input_line_no: pos.input_line_no,
            extra:         None,
          }));
        }
      },
      ErrorName::UnclosedParen => {
        // the unclosed opener itself is the most useful position
        if let Some(opener) = opener {
          if self.partial_result {
            (line_no, x) = (opener.line_no, opener.x);
          } else {
            (line_no, x) = (opener.input_line_no, opener.input_x);
          }
          (input_line_no, input_x) = (opener.input_line_no, opener.input_x);
        }
      },
      _ => {},
    }

    Error {
      name,
      msg: name.message(),
      x,
      line_no,
      input_x,
      input_line_no,
      extra,
    }
  }
}
