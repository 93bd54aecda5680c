use regex::Regex;

use crate::{charset::CharSet, span::Span};

/// A matched range of the source text.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LexicalContext<'a> {
    source: &'a str,
    span: Span,
}

impl<'a> LexicalContext<'a> {
    pub fn new(source: &'a str, span: Span) -> LexicalContext<'a> {
        LexicalContext { source, span }
    }
    pub fn empty_at(source: &'a str, position: u32) -> LexicalContext<'a> {
        LexicalContext {
            source,
            span: Span::at(position),
        }
    }
    pub fn span(&self) -> Span {
        self.span
    }
    pub fn source(&self) -> &'a str {
        self.source
    }
    pub fn matched(&self) -> &'a str {
        self.span.as_str(self.source)
    }
    pub fn slice(&self, span: Span) -> &'a str {
        span.as_str(self.source)
    }
}

#[derive(Clone, Copy, Debug)]
struct Mark {
    pre_skip: u32,
    start: u32,
}

/// Position in the source with a stack of marks for backtracking.
///
/// Every [`Cursor::mark`] must be paired with exactly one [`Cursor::rewind`] or [`Cursor::proceed`].
pub struct Cursor<'a> {
    source: &'a str,
    position: u32,
    marks: Vec<Mark>,
    skip: Option<CharSet>,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Cursor<'a> {
        assert!(
            source.len() < u32::MAX as usize,
            "Source must be smaller than 4GiB"
        );
        Cursor {
            source,
            position: 0,
            marks: Vec::new(),
            skip: None,
        }
    }

    pub fn with_skip(mut self, skip: Option<CharSet>) -> Cursor<'a> {
        self.skip = skip;
        self
    }

    pub fn source(&self) -> &'a str {
        self.source
    }
    pub fn position(&self) -> u32 {
        self.position
    }
    pub fn depth(&self) -> usize {
        self.marks.len()
    }
    pub fn is_at_end(&self) -> bool {
        self.position as usize == self.source.len()
    }
    pub fn remaining(&self) -> &'a str {
        &self.source[self.position as usize..]
    }
    pub fn current(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Moves to an absolute position, used when replaying memoized results.
    pub fn jump_to(&mut self, position: u32) {
        debug_assert!(
            self.source.is_char_boundary(position as usize),
            "Position {position} is not on a char boundary"
        );
        self.position = position;
    }

    /// Advances past any characters of the skip set, if one is configured.
    pub fn skip(&mut self) {
        let Some(skip) = &self.skip else {
            return;
        };

        let rest = self.remaining();
        let skipped = rest
            .char_indices()
            .find(|&(_, c)| !skip.contains(c))
            .map_or(rest.len(), |(i, _)| i);

        self.position += skipped as u32;
    }

    pub fn mark(&mut self, skip: bool) {
        let pre_skip = self.position;
        if skip {
            self.skip();
        }
        self.marks.push(Mark {
            pre_skip,
            start: self.position,
        });
    }

    /// Drops the last mark and returns to where it was taken, including any skipped characters.
    pub fn rewind(&mut self) {
        let mark = self.pop_mark();
        self.position = mark.pre_skip;
    }

    /// Drops the last mark, keeping the position.
    pub fn proceed(&mut self) -> LexicalContext<'a> {
        let mark = self.pop_mark();
        LexicalContext::new(self.source, Span::new(mark.start, self.position))
    }

    /// The range matched since the last mark, without popping it.
    pub fn context(&self) -> LexicalContext<'a> {
        let start = self.marks.last().map_or(0, |mark| mark.start);
        LexicalContext::new(self.source, Span::new(start, self.position))
    }

    #[track_caller]
    fn pop_mark(&mut self) -> Mark {
        match self.marks.pop() {
            Some(mark) => mark,
            None => panic!("Unbalanced cursor marks"),
        }
    }

    fn advance(&mut self, bytes: usize) {
        self.position += bytes as u32;
    }

    pub fn scan_literal(&mut self, literal: &str) -> bool {
        if self.remaining().starts_with(literal) {
            self.advance(literal.len());
            return true;
        }
        false
    }

    pub fn scan_set(&mut self, set: &CharSet) -> bool {
        match self.current() {
            Some(c) if set.contains(c) => {
                self.advance(c.len_utf8());
                true
            }
            _ => false,
        }
    }

    /// The regex must be anchored to the start of the haystack.
    pub fn scan_regex(&mut self, regex: &Regex) -> bool {
        match regex.find(self.remaining()) {
            Some(found) if found.start() == 0 => {
                self.advance(found.end());
                true
            }
            _ => false,
        }
    }

    /// Consumes everything before the next occurrence of `literal`, fails if there is none.
    pub fn scan_up_to_literal(&mut self, literal: &str) -> bool {
        match self.remaining().find(literal) {
            Some(offset) => {
                self.advance(offset);
                true
            }
            None => false,
        }
    }

    /// Consumes everything before the next character from `set`, fails if there is none.
    pub fn scan_up_to_set(&mut self, set: &CharSet) -> bool {
        match self.remaining().find(|c: char| set.contains(c)) {
            Some(offset) => {
                self.advance(offset);
                true
            }
            None => false,
        }
    }

    pub fn scan_next(&mut self) -> Option<char> {
        let c = self.current()?;
        self.advance(c.len_utf8());
        Some(c)
    }

    pub fn scan_end(&self) -> bool {
        self.is_at_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::CharClass;
    use proptest::prelude::*;

    #[test]
    fn scans_do_not_partially_consume() {
        let mut cursor = Cursor::new("abcdef");
        assert!(!cursor.scan_literal("abx"));
        assert_eq!(cursor.position(), 0);
        assert!(cursor.scan_literal("abc"));
        assert_eq!(cursor.position(), 3);
        assert!(!cursor.scan_set(&CharSet::class(CharClass::DecimalDigit)));
        assert_eq!(cursor.position(), 3);
    }

    #[test]
    fn regex_is_anchored() {
        let regex = Regex::new("^(?:[0-9]+)").unwrap();
        let mut cursor = Cursor::new("ab12");
        assert!(!cursor.scan_regex(&regex));
        cursor.jump_to(2);
        assert!(cursor.scan_regex(&regex));
        assert!(cursor.is_at_end());
    }

    #[test]
    fn scan_up_to() {
        let mut cursor = Cursor::new("key = value");
        assert!(cursor.scan_up_to_literal("="));
        assert_eq!(cursor.position(), 4);
        assert!(!cursor.scan_up_to_literal(";"));
        assert_eq!(cursor.position(), 4);
        assert!(cursor.scan_up_to_set(&CharSet::class(CharClass::Letter)));
        assert_eq!(cursor.remaining(), "value");
    }

    #[test]
    fn multibyte_scalars() {
        let mut cursor = Cursor::new("žluť");
        assert_eq!(cursor.scan_next(), Some('ž'));
        assert_eq!(cursor.position(), 2);
        assert!(cursor.scan_set(&CharSet::class(CharClass::Letter)));
        assert_eq!(cursor.current(), Some('u'));
    }

    #[test]
    fn skipping_mark() {
        let mut cursor = Cursor::new("   abc").with_skip(Some(CharSet::class(CharClass::Whitespace)));
        cursor.mark(true);
        assert!(cursor.scan_literal("abc"));
        let cx = cursor.proceed();
        assert_eq!(cx.span(), Span::new(3, 6));
        assert_eq!(cx.matched(), "abc");

        cursor.jump_to(0);
        cursor.mark(true);
        assert_eq!(cursor.position(), 3);
        cursor.rewind();
        assert_eq!(cursor.position(), 0);
    }

    proptest! {
        #[test]
        fn mark_rewind_symmetry(source in "[a-c ]{0,24}", steps in prop::collection::vec(0usize..4, 0..16)) {
            let mut cursor = Cursor::new(&source).with_skip(Some(CharSet::chars([' '])));
            let mut expected = Vec::new();

            for step in steps {
                expected.push(cursor.position());
                cursor.mark(step % 2 == 0);
                for _ in 0..step {
                    cursor.scan_next();
                }
            }

            while let Some(position) = expected.pop() {
                prop_assert_eq!(cursor.depth(), expected.len() + 1);
                cursor.rewind();
                prop_assert_eq!(cursor.position(), position);
            }
            prop_assert_eq!(cursor.depth(), 0);
        }
    }
}
