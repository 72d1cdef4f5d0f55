use core::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A location in the original source text, as reported by the external
/// parser: 1-based line/column for humans, byte offset and length for
/// diagnostics rendering.
#[derive(
    Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Span {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
    pub len: usize,
}

impl Span {
    pub fn new(line: u32, column: u32, offset: usize, len: usize) -> Self {
        Self {
            line,
            column,
            offset,
            len,
        }
    }

    /// The byte range covered by this span.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }
}

impl From<Span> for Range<usize> {
    fn from(val: Span) -> Self {
        val.range()
    }
}

/// Identifiers, with the span they were written at.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
