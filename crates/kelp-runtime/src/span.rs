use std::{fmt::Display, ops::Deref};

/// Byte range into the source text.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct Span {
    start: u32,
    end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        debug_assert!(start <= end, "Inverted span {start}..{end}");
        Self { start, end }
    }
    pub fn at(pos: u32) -> Span {
        Self {
            start: pos,
            end: pos,
        }
    }
    pub fn empty() -> Span {
        Self { start: 0, end: 0 }
    }
    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }
    pub fn len(self) -> u32 {
        self.end.saturating_sub(self.start)
    }
    #[track_caller]
    pub fn as_str(self, src: &str) -> &str {
        &src[self.start as usize..self.end as usize]
    }
    pub fn contains(self, pos: u32) -> bool {
        self.start <= pos && pos < self.end
    }
    /// Checks whether another span is fully covered by this one, empty spans are never covered.
    pub fn contains_span(self, span: Span) -> bool {
        (span.start < span.end) && (span.start >= self.start) && (span.end <= self.end)
    }
    /// Smallest span covering both.
    pub fn cover(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
    pub fn start(self) -> u32 {
        self.start
    }
    pub fn end(self) -> u32 {
        self.end
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub inner: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: Span) -> Spanned<T> {
        Spanned { inner: value, span }
    }
    pub fn with_span(self, span: Span) -> Spanned<T> {
        Self {
            inner: self.inner,
            span,
        }
    }
}

impl<T> Deref for Spanned<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[test]
fn test_cover() {
    let a = Span::new(2, 4);
    let b = Span::new(6, 9);
    assert_eq!(a.cover(b), Span::new(2, 9));
    assert_eq!(b.cover(a), Span::new(2, 9));
    assert!(Span::new(2, 9).contains_span(b));
    assert!(!a.contains_span(Span::at(3)));
}
