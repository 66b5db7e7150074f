//! End-to-end transformations: indent mode, paren mode, smart mode and the
//! structural guarantees their outputs share.

use parinfer::{
  Change,
  Options,
  indent_mode,
  paren_mode,
  smart_mode,
};

fn cursor(line: usize, x: usize) -> Options {
  Options {
    cursor_line: Some(line),
    cursor_x: Some(x),
    ..Options::default()
  }
}

#[test]
fn indent_mode_closes_open_parens() {
  let answer = indent_mode("(def foo\n  bar", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(def foo\n  bar)");
}

#[test]
fn indent_mode_closes_nested_parens() {
  let answer = indent_mode("(let [x 1]\n  (+ x 2", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(let [x 1]\n  (+ x 2))");
}

#[test]
fn indent_mode_moves_closer_to_owning_line() {
  // bar at column 0 is top-level, so the list closes on its own line
  let answer = indent_mode("(foo\nbar", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(foo)\nbar");
}

#[test]
fn indent_mode_preserves_balanced_text() {
  for text in [
    "(def foo)",
    "(let [x 1]\n  (+ x 2))",
    "(defn f [x]\n  (* x x))\n\n(f 3)",
    "; just a comment",
    "(str \"a (not paren\")",
  ] {
    let answer = indent_mode(text, &Options::default());
    assert!(answer.success, "{text:?}");
    assert_eq!(answer.text, text);
  }
}

#[test]
fn indent_mode_replaces_tabs_in_code() {
  let answer = indent_mode("(foo\n\tbar", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(foo\n  bar)");
}

#[test]
fn indent_mode_removes_stray_inner_closer() {
  // the closer behind "bar" has no opener; indent mode deletes it when the
  // line still ends inside the trail
  let answer = indent_mode("(foo bar))", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(foo bar)");
}

#[test]
fn paren_mode_infers_indentation() {
  let answer = paren_mode("(def foo\nbar)", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(def foo\n bar)");
}

#[test]
fn paren_mode_caps_indentation_below_closed_form() {
  // the top-level form is closed, so the over-indented line is pulled back
  // to the top level
  let answer = paren_mode("(def foo [a b])\n          bar", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(def foo [a b])\nbar");
}

#[test]
fn paren_mode_preserves_well_indented_text() {
  for text in [
    "(def foo)",
    "(let [x 1]\n  (+ x 2))",
    "(foo\n  (bar\n    baz))",
  ] {
    let answer = paren_mode(text, &Options::default());
    assert!(answer.success, "{text:?}");
    assert_eq!(answer.text, text);
  }
}

#[test]
fn smart_mode_preserves_already_balanced() {
  let answer = smart_mode("(def foo\n  bar", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(def foo\n  bar)");
}

#[test]
fn smart_mode_shifts_child_lines_with_parent() {
  // the user indented line 0 by two cells; the child follows
  let options = Options {
    changes: vec![Change {
      x:        0,
      line_no:  0,
      old_text: "".into(),
      new_text: "  ".into(),
    }],
    ..Options::default()
  };
  let answer = smart_mode("  (foo\n  bar)", &options);
  assert!(answer.success);
  assert_eq!(answer.text, "  (foo\n    bar)");
}

#[test]
fn indent_mode_without_change_fragments_instead() {
  // same text, but with no change recorded the second line keeps its
  // indentation and the list closes early
  let answer = indent_mode("  (foo\n  bar)", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "  (foo)\n  bar");
}

#[test]
fn indent_then_paren_is_stable() {
  for text in [
    "(def foo\n  bar",
    "(let [x 1]\n  (+ x 2",
    "(foo\nbar",
    "(a (b (c\nd",
    "(foo ; comment\n  bar",
  ] {
    let first = indent_mode(text, &Options::default());
    assert!(first.success, "{text:?}");
    let second = paren_mode(&first.text, &Options::default());
    assert!(second.success, "{text:?}");
    assert_eq!(second.text, first.text, "paren mode must not disturb {text:?}");
  }
}

#[test]
fn line_ending_is_preserved() {
  let answer = indent_mode("(def foo\r\n  bar", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(def foo\r\n  bar)");
}

#[test]
fn paren_trails_report_display_columns() {
  // "(def 漢字" is 9 cells wide, so the inferred closer lands at cell 9
  let answer = indent_mode("(def 漢字", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(def 漢字)");
  assert_eq!(answer.paren_trails.len(), 1);
  let trail = answer.paren_trails[0];
  assert_eq!((trail.line_no, trail.start_x, trail.end_x), (0, 9, 10));
}

#[test]
fn string_contents_are_untouched() {
  let answer = indent_mode("(prn \"(((\"\n  x", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(prn \"(((\"\n  x)");
}

#[test]
fn comment_lines_do_not_close_parens() {
  let answer = indent_mode("(foo\n  ;; note\n  bar", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(foo\n  ;; note\n  bar)");
}

#[test]
fn cursor_shifts_with_paren_mode_indentation() {
  let answer = paren_mode("(def foo\nbar)", &cursor(1, 1));
  assert!(answer.success);
  assert_eq!(answer.text, "(def foo\n bar)");
  assert_eq!(answer.cursor_line, Some(1));
  assert_eq!(answer.cursor_x, Some(2));
}

#[test]
fn cursor_right_of_trail_keeps_typed_closer() {
  // with the cursor right after the closer the user typed, indent mode
  // leaves the trail alone instead of re-deriving it
  let answer = indent_mode("(def foo\n  bar)", &cursor(1, 6));
  assert!(answer.success);
  assert_eq!(answer.text, "(def foo\n  bar)");
  assert_eq!(answer.paren_trails, vec![parinfer::ParenTrail {
    line_no: 1,
    start_x: 5,
    end_x:   6,
  }]);
}

#[test]
fn tab_stops_are_reported_for_cursor_line() {
  let answer = indent_mode("(def foo\n  bar", &cursor(1, 2));
  assert!(answer.success);
  assert_eq!(answer.tab_stops.len(), 1);
  let tab_stop = answer.tab_stops[0];
  assert_eq!(tab_stop.ch, '(');
  assert_eq!(tab_stop.x, 0);
  assert_eq!(tab_stop.line_no, 0);
  assert_eq!(tab_stop.arg_x, Some(5));
}

#[test]
fn return_parens_builds_the_tree() {
  let options = Options {
    return_parens: true,
    ..Options::default()
  };
  let answer = indent_mode("(let [x 1]\n  (+ x 2", &options);
  assert!(answer.success);
  assert_eq!(answer.text, "(let [x 1]\n  (+ x 2))");

  assert_eq!(answer.parens.len(), 1);
  let root = &answer.parens[0];
  assert_eq!(root.ch, '(');
  assert_eq!((root.line_no, root.x), (0, 0));
  assert_eq!(root.children.len(), 2);
  assert_eq!(root.children[0].ch, '[');
  assert_eq!(root.children[1].ch, '(');

  // the inferred closers sit in the final trail on line 1
  let inner = &root.children[1];
  let closer = inner.closer.as_ref().unwrap();
  assert_eq!(closer.ch, ')');
  assert_eq!(closer.line_no, 1);
  let trail = closer.trail.unwrap();
  assert_eq!((trail.line_no, trail.start_x, trail.end_x), (1, 8, 10));
}

#[test]
fn parens_are_empty_without_return_parens() {
  let answer = indent_mode("(foo\n  bar", &Options::default());
  assert!(answer.success);
  assert!(answer.parens.is_empty());
}

#[test]
fn cursor_holding_keeps_typed_closer_in_smart_mode() {
  // the cursor rests on the inner opener, so its closer stays where the
  // user typed it even though the next line indents past it
  let answer = smart_mode("(foo (bar)\n      baz", &cursor(0, 5));
  assert!(answer.success);
  assert_eq!(answer.text, "(foo (bar)\n      baz)");
}

#[test]
fn without_holding_the_indented_line_is_adopted() {
  let answer = indent_mode("(foo (bar)\n      baz", &Options::default());
  assert!(answer.success);
  assert_eq!(answer.text, "(foo (bar\n      baz))");
}

#[test]
fn smart_mode_with_selection_behaves_like_indent() {
  let options = Options {
    selection_start_line: Some(0),
    ..Options::default()
  };
  let indent = indent_mode("(foo\n  bar", &Options::default());
  let smart = smart_mode("(foo\n  bar", &options);
  assert_eq!(smart.text, indent.text);
}
