//! Text primitives shared by the parinfer engine: grapheme clustering with
//! display-cell widths, character classification and line-ending handling.

pub mod chars;
pub mod grapheme;
pub mod line_ending;
