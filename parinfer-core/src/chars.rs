//! Character classification for Clojure-flavored lexing: the three paren
//! pairs, the comment/string/escape starters and engine whitespace.

#[inline]
#[must_use]
pub const fn char_is_open_paren(ch: char) -> bool {
  matches!(ch, '(' | '[' | '{')
}

#[inline]
#[must_use]
pub const fn char_is_close_paren(ch: char) -> bool {
  matches!(ch, ')' | ']' | '}')
}

/// Returns the partner of a paren character: the closer for an opener and
/// the opener for a closer.
#[inline]
#[must_use]
pub const fn matching_paren(ch: char) -> Option<char> {
  match ch {
    '(' => Some(')'),
    '[' => Some(']'),
    '{' => Some('}'),
    ')' => Some('('),
    ']' => Some('['),
    '}' => Some('{'),
    _ => None,
  }
}

/// True when the grapheme's base codepoint is an opener.
#[inline]
#[must_use]
pub fn str_is_open_paren(s: &str) -> bool {
  s.chars().next().is_some_and(char_is_open_paren)
}

/// True when the grapheme's base codepoint is a closer.
#[inline]
#[must_use]
pub fn str_is_close_paren(s: &str) -> bool {
  s.chars().next().is_some_and(char_is_close_paren)
}
