//! Encoding-aware fixed-width column splitting.
//!
//! dBase records are fixed-width in *bytes*, but the attribute text arrives
//! already decoded, so byte offsets cannot be used directly: a single char
//! of decoded Big5 or UTF-8 text occupied more than one byte on disk. The
//! cursor here walks the decoded text and charges each character its on-disk
//! width, so a field's declared byte length can be spent as a visual-column
//! budget.

use crate::attributes::TextEncoding;

/// A cursor over decoded attribute text.
///
/// [`TextCursor::consume_columns`] is the single place where byte budgets
/// meet decoded text; both field-name extraction and record splitting go
/// through it.
#[derive(Debug, Clone)]
pub struct TextCursor<'a> {
    rest: &'a str,
}

impl<'a> TextCursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    /// Text not yet consumed.
    pub fn remaining(&self) -> &'a str {
        self.rest
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Consume characters until `budget` columns are spent or the text ends,
    /// returning the consumed slice.
    ///
    /// A character costs 1 column if its UTF-8 representation is a single
    /// byte, otherwise the encoding's declared multi-byte width. A multi-byte
    /// character at the boundary may overshoot the budget; it is consumed
    /// whole, never split.
    pub fn consume_columns(&mut self, encoding: &TextEncoding, budget: usize) -> &'a str {
        let mut columns = 0usize;
        let mut end = 0usize;

        for ch in self.rest.chars() {
            if columns >= budget {
                break;
            }
            let utf8_len = ch.len_utf8();
            columns += if utf8_len > 1 {
                encoding.multibyte_width()
            } else {
                1
            };
            end += utf8_len;
        }

        let (consumed, rest) = self.rest.split_at(end);
        self.rest = rest;
        consumed
    }
}
