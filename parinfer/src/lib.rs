//! Keeps the paren structure of S-expression code in sync with its
//! indentation.
//!
//! Given source text plus optional cursor context, the engine produces new
//! text in which either closing parens are inferred from indentation
//! ([`indent_mode`]), indentation is inferred from paren structure
//! ([`paren_mode`]), or the choice is made dynamically from what the user
//! just typed ([`smart_mode`]). Syntax is Clojure-flavored: `;` starts a
//! line comment, `"` delimits strings and `\` escapes a single character.
//!
//! A call is a complete transformation; there is no incremental or
//! streaming interface. All columns in inputs and outputs are display
//! cells, never byte offsets.
//!
//! # Example
//!
//! ```
//! use parinfer::{indent_mode, Options};
//!
//! let answer = indent_mode("(def foo\n  bar", &Options::default());
//! assert!(answer.success);
//! assert_eq!(answer.text, "(def foo\n  bar)");
//! ```
//!
//! Smart mode consumes the edit the user just made, either as explicit
//! [`Change`]s or derived from [`Options::prev_text`], and falls back to
//! paren mode when the edit leaves indentation ambiguous.

use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod answer;
pub mod diff;
pub mod options;

mod engine;
mod state;

pub use answer::{
  Answer,
  Closer,
  Error,
  ErrorName,
  Paren,
  ParenTrail,
  TabStop,
};
pub use diff::{
  Change,
  compute_text_change,
};
pub use options::Options;

use crate::state::InternalMode;

pub type LineNumber = usize;

/// A display-cell column.
pub type Column = usize;

/// A signed shift measured in display cells.
pub type Delta = isize;

pub type Tendril = SmartString<LazyCompact>;

/// The three public transformation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Indent,
  Paren,
  Smart,
}

/// A complete transformation request: mode, source text and options.
#[derive(Debug, Clone)]
pub struct Request {
  pub mode:    Mode,
  pub text:    String,
  pub options: Options,
}

/// Infers close parens from indentation.
pub fn indent_mode(text: &str, options: &Options) -> Answer {
  engine::process_text(text, options, InternalMode::Indent, false)
}

/// Infers indentation from paren structure.
pub fn paren_mode(text: &str, options: &Options) -> Answer {
  engine::process_text(text, options, InternalMode::Paren, false)
}

/// Chooses between the two based on the edit context. A selection disables
/// smart behavior and reverts to plain indent mode.
pub fn smart_mode(text: &str, options: &Options) -> Answer {
  let smart = options.selection_start_line.is_none();
  engine::process_text(text, options, InternalMode::Indent, smart)
}

/// Dispatches a [`Request`], deriving a [`Change`] from
/// [`Options::prev_text`] when no explicit changes were supplied.
pub fn process(request: &Request) -> Answer {
  let mut options = request.options.clone();
  if options.changes.is_empty() {
    if let Some(prev_text) = options.prev_text.as_deref() {
      options.changes.extend(compute_text_change(prev_text, &request.text));
    }
  }

  match request.mode {
    Mode::Indent => indent_mode(&request.text, &options),
    Mode::Paren => paren_mode(&request.text, &options),
    Mode::Smart => smart_mode(&request.text, &options),
  }
}
