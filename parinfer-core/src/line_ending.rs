//! Line splitting and line-ending detection.
//!
//! The engine works on LF-separated lines internally and rejoins them with
//! the ending detected from the original text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
  /// U+000A -- LineFeed
  Lf,

  /// CarriageReturn followed by LineFeed.
  Crlf,
}

impl LineEnding {
  #[inline]
  pub const fn as_str(&self) -> &'static str {
    match self {
      Self::Lf => "\u{000A}",
      Self::Crlf => "\u{000D}\u{000A}",
    }
  }
}

/// Detects the ending to rejoin lines with: CRLF iff the text contains a
/// carriage return anywhere, LF otherwise.
#[must_use]
pub fn auto_detect_line_ending(text: &str) -> LineEnding {
  if text.contains('\r') {
    LineEnding::Crlf
  } else {
    LineEnding::Lf
  }
}

/// Splits on LF, stripping one trailing CR from each line. Always yields at
/// least one line; a trailing LF yields a final empty line.
#[must_use]
pub fn split_lines(text: &str) -> Vec<&str> {
  text
    .split('\n')
    .map(|line| line.strip_suffix('\r').unwrap_or(line))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_auto_detect() {
    assert_eq!(auto_detect_line_ending("foo\nbar"), LineEnding::Lf);
    assert_eq!(auto_detect_line_ending("foo\r\nbar"), LineEnding::Crlf);
    // a lone CR anywhere selects CRLF
    assert_eq!(auto_detect_line_ending("foo\rbar"), LineEnding::Crlf);
    assert_eq!(auto_detect_line_ending(""), LineEnding::Lf);
  }

  #[test]
  fn test_split_lines() {
    assert_eq!(split_lines(""), vec![""]);
    assert_eq!(split_lines("a"), vec!["a"]);
    assert_eq!(split_lines("a\nb"), vec!["a", "b"]);
    assert_eq!(split_lines("a\r\nb\r\n"), vec!["a", "b", ""]);
    assert_eq!(split_lines("a\n\nb"), vec!["a", "", "b"]);
  }
}
