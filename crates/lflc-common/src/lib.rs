//! Source-location plumbing shared by every phase of the compiler.

use codespan_reporting::files::SimpleFiles;

/// A region of source text, stored as a starting byte offset plus a byte
/// length. Tokens are lexed this way round (a start and how far the scan
/// ran), and diagnostics convert to a byte range on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// The span covering `start..end`.
    pub fn between(start: usize, end: usize) -> Self {
        Self {
            start,
            len: end.saturating_sub(start),
        }
    }

    /// An empty span anchored at a single offset.
    pub fn point(at: usize) -> Self {
        Self { start: at, len: 0 }
    }

    /// Byte offset just past the last character covered.
    pub fn end(self) -> usize {
        self.start + self.len
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span::between(
            self.start.min(other.start),
            self.end().max(other.end()),
        )
    }
}

impl From<Span> for std::ops::Range<usize> {
    fn from(span: Span) -> Self {
        span.start..span.end()
    }
}

/// Handle into the diagnostic file database.
pub type FileId = usize;

/// Source file database rendered by codespan-reporting diagnostics.
pub type SourceDb = SimpleFiles<String, String>;
