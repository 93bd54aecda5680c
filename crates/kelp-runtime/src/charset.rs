use std::fmt::{Debug, Display, Write};

use cranelift_bitset::ScalarBitSet;

/// Named character classes usable from grammar text as `.name`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CharClass {
    Letter,
    UppercaseLetter,
    LowercaseLetter,
    DecimalDigit,
    Alphanumeric,
    Whitespace,
    Newline,
    WhitespaceOrNewline,
    Punctuation,
    Symbol,
}

impl CharClass {
    pub const ALL: [CharClass; 10] = [
        CharClass::Letter,
        CharClass::UppercaseLetter,
        CharClass::LowercaseLetter,
        CharClass::DecimalDigit,
        CharClass::Alphanumeric,
        CharClass::Whitespace,
        CharClass::Newline,
        CharClass::WhitespaceOrNewline,
        CharClass::Punctuation,
        CharClass::Symbol,
    ];

    pub fn from_name(name: &str) -> Option<CharClass> {
        CharClass::ALL.into_iter().find(|class| class.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            CharClass::Letter => "letter",
            CharClass::UppercaseLetter => "uppercaseLetter",
            CharClass::LowercaseLetter => "lowercaseLetter",
            CharClass::DecimalDigit => "decimalDigit",
            CharClass::Alphanumeric => "alphanumeric",
            CharClass::Whitespace => "whitespace",
            CharClass::Newline => "newline",
            CharClass::WhitespaceOrNewline => "whitespaceOrNewline",
            CharClass::Punctuation => "punctuation",
            CharClass::Symbol => "symbol",
        }
    }

    pub fn contains(self, c: char) -> bool {
        match self {
            CharClass::Letter => c.is_alphabetic(),
            CharClass::UppercaseLetter => c.is_uppercase(),
            CharClass::LowercaseLetter => c.is_lowercase(),
            CharClass::DecimalDigit => c.is_ascii_digit(),
            CharClass::Alphanumeric => c.is_alphanumeric(),
            CharClass::Whitespace => c.is_whitespace() && !is_newline(c),
            CharClass::Newline => is_newline(c),
            CharClass::WhitespaceOrNewline => c.is_whitespace(),
            // only the ASCII portion of the unicode categories is recognized
            CharClass::Punctuation => c.is_ascii_punctuation() && !is_ascii_symbol(c),
            CharClass::Symbol => is_ascii_symbol(c),
        }
    }
}

fn is_newline(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0B}' | '\u{0C}' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

fn is_ascii_symbol(c: char) -> bool {
    matches!(c, '$' | '+' | '<' | '=' | '>' | '^' | '`' | '|' | '~')
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Item {
    Class(CharClass),
    Range(char, char),
    Char(char),
}

impl Item {
    fn contains(self, c: char) -> bool {
        match self {
            Item::Class(class) => class.contains(c),
            Item::Range(start, end) => (start..=end).contains(&c),
            Item::Char(a) => a == c,
        }
    }
}

/// A set of unicode scalars, made up of named classes, inclusive ranges and single characters.
///
/// Membership of ASCII characters is precomputed into a bitset.
#[derive(Clone, Default)]
pub struct CharSet {
    ascii: ScalarBitSet<u128>,
    items: Vec<Item>,
}

impl CharSet {
    pub fn new() -> CharSet {
        CharSet::default()
    }
    pub fn class(class: CharClass) -> CharSet {
        let mut set = CharSet::new();
        set.push(Item::Class(class));
        set
    }
    /// Returns `None` for an empty or inverted range.
    pub fn range(start: char, end: char) -> Option<CharSet> {
        if start > end {
            return None;
        }
        let mut set = CharSet::new();
        set.push(Item::Range(start, end));
        Some(set)
    }
    pub fn chars(chars: impl IntoIterator<Item = char>) -> CharSet {
        let mut set = CharSet::new();
        for c in chars {
            set.push(Item::Char(c));
        }
        set
    }
    pub fn union(mut self, other: &CharSet) -> CharSet {
        for &item in &other.items {
            self.push(item);
        }
        self
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn contains(&self, c: char) -> bool {
        if c.is_ascii() {
            return self.ascii.contains(c as u8);
        }
        self.items.iter().any(|item| item.contains(c))
    }

    fn push(&mut self, item: Item) {
        if self.items.contains(&item) {
            return;
        }
        for byte in 0..128u8 {
            if item.contains(byte as char) {
                self.ascii.insert(byte);
            }
        }
        self.items.push(item);
    }
}

impl PartialEq for CharSet {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Debug for CharSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CharSet({self})")
    }
}

impl Display for CharSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            match *item {
                Item::Class(class) => {
                    f.write_char('.')?;
                    f.write_str(class.name())?;
                }
                Item::Range(start, end) => write!(f, "{start:?}...{end:?}")?,
                Item::Char(c) => write!(f, "{c:?}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CharClass::Letter, 'a', true)]
    #[case(CharClass::Letter, 'ž', true)]
    #[case(CharClass::Letter, '1', false)]
    #[case(CharClass::UppercaseLetter, 'Q', true)]
    #[case(CharClass::LowercaseLetter, 'Q', false)]
    #[case(CharClass::DecimalDigit, '7', true)]
    #[case(CharClass::Whitespace, '\t', true)]
    #[case(CharClass::Whitespace, '\n', false)]
    #[case(CharClass::Newline, '\n', true)]
    #[case(CharClass::WhitespaceOrNewline, '\r', true)]
    #[case(CharClass::Punctuation, ',', true)]
    #[case(CharClass::Punctuation, '+', false)]
    #[case(CharClass::Symbol, '+', true)]
    fn class_membership(#[case] class: CharClass, #[case] c: char, #[case] expected: bool) {
        assert_eq!(CharSet::class(class).contains(c), expected);
    }

    #[test]
    fn class_names_roundtrip() {
        for class in CharClass::ALL {
            assert_eq!(CharClass::from_name(class.name()), Some(class));
        }
        assert_eq!(CharClass::from_name("digits"), None);
    }

    #[test]
    fn ranges() {
        assert!(CharSet::range('z', 'a').is_none());
        let set = CharSet::range('a', 'f').unwrap();
        assert!(set.contains('a'));
        assert!(set.contains('f'));
        assert!(!set.contains('g'));

        let greek = CharSet::range('α', 'ω').unwrap();
        assert!(greek.contains('λ'));
        assert!(!greek.contains('a'));
    }

    #[test]
    fn union_keeps_both() {
        let set = CharSet::chars(['_'])
            .union(&CharSet::class(CharClass::DecimalDigit))
            .union(&CharSet::chars(['é']));
        assert!(set.contains('_'));
        assert!(set.contains('3'));
        assert!(set.contains('é'));
        assert!(!set.contains('a'));
        assert_eq!(set.to_string(), "'_' | .decimalDigit | 'é'");
    }
}
