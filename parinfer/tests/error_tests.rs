//! Failure paths: the error taxonomy, cached positions and the
//! partial-result policy.

use parinfer::{
  ErrorName,
  Options,
  indent_mode,
  paren_mode,
  smart_mode,
};

#[test]
fn paren_mode_rejects_stray_closer() {
  let answer = paren_mode(")", &Options::default());
  assert!(!answer.success);
  assert_eq!(answer.text, ")", "original text is returned on failure");

  let error = answer.error.unwrap();
  assert_eq!(error.name, ErrorName::UnmatchedCloseParen);
  assert_eq!(error.name.as_str(), "unmatched-close-paren");
  assert_eq!(error.x, 0);
  assert_eq!(error.line_no, 0);
}

#[test]
fn indent_mode_rejects_leading_closer() {
  let answer = indent_mode(")abc", &Options::default());
  assert!(!answer.success);

  let error = answer.error.unwrap();
  assert_eq!(error.name, ErrorName::LeadingCloseParen);
  assert_eq!(error.msg, "Line cannot lead with a close-paren.");
  // the cached position is the closer itself, not the line end
  assert_eq!(error.x, 0);
  assert_eq!(error.line_no, 0);
}

#[test]
fn leading_closer_with_partial_result_keeps_edits() {
  let options = Options {
    partial_result: true,
    ..Options::default()
  };
  let answer = indent_mode(")abc", &options);
  assert!(!answer.success);
  // the offending closer was already deleted from the working text
  assert_eq!(answer.text, "abc");
  assert_eq!(answer.error.unwrap().name, ErrorName::LeadingCloseParen);
}

#[test]
fn unclosed_quote_points_at_the_quote() {
  let answer = indent_mode("(foo \"bar", &Options::default());
  assert!(!answer.success);

  let error = answer.error.unwrap();
  assert_eq!(error.name, ErrorName::UnclosedQuote);
  assert_eq!(error.msg, "String is missing a closing quote.");
  assert_eq!(error.line_no, 0);
  assert_eq!(error.x, 5);
}

#[test]
fn unbalanced_quote_in_comment_is_quote_danger() {
  let answer = indent_mode("(foo) ; \"bar", &Options::default());
  assert!(!answer.success);

  let error = answer.error.unwrap();
  assert_eq!(error.name, ErrorName::QuoteDanger);
  assert_eq!(error.msg, "Quotes must balanced inside comment blocks.");
  assert_eq!(error.line_no, 0);
  assert_eq!(error.x, 8);
}

#[test]
fn balanced_quotes_in_comment_are_fine() {
  let answer = indent_mode("(foo) ; \"bar\"", &Options::default());
  assert!(answer.success);
}

#[test]
fn hanging_backslash_is_rejected() {
  let answer = indent_mode("(foo \\", &Options::default());
  assert!(!answer.success);

  let error = answer.error.unwrap();
  assert_eq!(error.name, ErrorName::EolBackslash);
  assert_eq!(error.msg, "Line cannot end in a hanging backslash.");
  assert_eq!(error.line_no, 0);
  assert_eq!(error.x, 5);
}

#[test]
fn backslash_newline_inside_string_is_fine() {
  let answer = indent_mode("(foo \"a\\\nb\")", &Options::default());
  assert!(answer.success);
}

#[test]
fn paren_mode_reports_unclosed_paren_at_opener() {
  let answer = paren_mode("(foo\n  (bar", &Options::default());
  assert!(!answer.success);

  let error = answer.error.unwrap();
  assert_eq!(error.name, ErrorName::UnclosedParen);
  assert_eq!(error.msg, "Unclosed open-paren.");
  // position is the innermost unclosed opener, not the end of input
  assert_eq!(error.line_no, 1);
  assert_eq!(error.x, 2);
}

#[test]
fn paren_mode_unmatched_closer_reports_kind_mismatch() {
  let answer = paren_mode("(foo]", &Options::default());
  assert!(!answer.success);

  let error = answer.error.unwrap();
  assert_eq!(error.name, ErrorName::UnmatchedCloseParen);
  assert_eq!(error.x, 4);
  // the companion points at the opener left unmatched
  let extra = error.extra.unwrap();
  assert_eq!(extra.name, ErrorName::UnmatchedOpenParen);
  assert_eq!(extra.msg, "Unmatched open-paren.");
  assert_eq!(extra.x, 0);
  assert_eq!(extra.line_no, 0);
}

#[test]
fn indent_mode_unmatched_closer_outside_trail_fails() {
  // the stray closer sits before more code, so it cannot be absorbed into
  // the paren trail
  let answer = indent_mode("(foo) ) bar", &Options::default());
  assert!(!answer.success);

  let error = answer.error.unwrap();
  assert_eq!(error.name, ErrorName::UnmatchedCloseParen);
  assert_eq!(error.x, 6);
}

#[test]
fn smart_mode_restart_adopts_paren_mode_indentation() {
  // a leading closer makes smart mode give up and re-run with paren
  // mode's semantics: the closer joins the previous line's trail
  let answer = smart_mode("(foo\n)bar", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(foo)\nbar");

  let paren = paren_mode("(foo\n)bar", &Options::default());
  assert_eq!(answer.text, paren.text);
}

#[test]
fn smart_mode_elides_orphaned_leading_closer() {
  // the re-run keeps smart behavior, so a closer with no opener is
  // deleted where plain paren mode would fail
  let answer = smart_mode(")x", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "x");

  let answer = smart_mode(")", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "");
}

#[test]
fn error_is_always_attached_on_failure() {
  for (text, run_paren) in [(")", true), (")abc", false), ("\"open", false)] {
    let answer = if run_paren {
      paren_mode(text, &Options::default())
    } else {
      indent_mode(text, &Options::default())
    };
    assert!(!answer.success);
    assert!(answer.error.is_some(), "{text:?}");
    assert!(answer.tab_stops.is_empty());
    assert!(answer.paren_trails.is_empty());
  }
}
