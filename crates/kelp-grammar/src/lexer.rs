use kelp_runtime::span::Span;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[rustfmt::skip]
pub enum TokenKind {
    Ident, Str, Regex, Number, CharClass,
    ErrorToken,

    LParen, RParen,
    At, Eq, Colon, Pipe, Bang, Lookahead, Ellipsis,
    Question, Plus, Star,
}

#[derive(Clone, Copy, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Whitespace or a comment comes right before the token.
    pub preceded_by_trivia: bool,
}

pub struct Lexer<'a> {
    str: &'a [u8],
    pos: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(str: &'a [u8]) -> Self {
        Self { str, pos: 0 }
    }

    pub fn pos(&self) -> u32 {
        self.pos
    }

    pub fn span_since(&self, start: u32) -> Span {
        Span::new(start, self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.pos as usize == self.str.len()
    }

    pub fn next(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    pub fn peek(&self) -> Option<u8> {
        self.str.get(self.pos as usize).copied()
    }

    pub fn consume(&mut self, value: u8) -> bool {
        if self.peek() == Some(value) {
            self.next();
            true
        } else {
            false
        }
    }

    pub fn consume_while(&mut self, predicate: impl Fn(u8) -> bool) -> Span {
        let start = self.pos();
        while let Some(c) = self.peek() {
            if predicate(c) {
                self.next();
            } else {
                break;
            }
        }
        self.span_since(start)
    }

    pub fn sequence(&mut self, sequence: &[u8]) -> bool {
        if self.str[self.pos as usize..].starts_with(sequence) {
            self.pos += sequence.len() as u32;
            true
        } else {
            false
        }
    }

    /// Consumes until an unescaped `delimiter` (inclusive) or the end of input.
    fn delimited(&mut self, delimiter: u8) {
        while let Some(c) = self.next() {
            match c {
                b'\\' => _ = self.next(),
                c if c == delimiter => return,
                _ => {}
            }
        }
    }
}

fn is_ident_byte(c: u8) -> bool {
    matches!(c, b'_' | b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9')
}

/// Splits the grammar source into tokens, whitespace and comments are only recorded through
/// [`Token::preceded_by_trivia`].
pub fn lex(l: &mut Lexer) -> Vec<Token> {
    use TokenKind::*;

    let mut tokens = Vec::new();
    let mut trivia = false;
    while let Some(first) = l.next() {
        let pos = l.pos() - 1;
        let kind = match first {
            b'\t' | b'\n' | b'\x0C' | b'\r' | b' ' => {
                l.consume_while(|c| c.is_ascii_whitespace());
                trivia = true;
                continue;
            }
            b'/' if l.peek() == Some(b'/') => {
                l.consume_while(|c| c != b'\n');
                trivia = true;
                continue;
            }
            b'/' => {
                l.delimited(b'/');
                Regex
            }
            b'"' => {
                l.delimited(b'"');
                Str
            }
            b'.' => {
                if l.sequence(b"..") {
                    Ellipsis
                } else if l.consume_while(is_ident_byte).is_empty() {
                    ErrorToken
                } else {
                    CharClass
                }
            }
            b'>' if l.consume(b'>') => Lookahead,
            b'@' => At,
            b'=' => Eq,
            b':' => Colon,
            b'|' => Pipe,
            b'!' => Bang,
            b'?' => Question,
            b'+' => Plus,
            b'*' => Star,
            b'(' => LParen,
            b')' => RParen,
            b'-' | b'0'..=b'9' => {
                let digits = l.consume_while(|c| c.is_ascii_digit());
                match first == b'-' && digits.is_empty() {
                    true => ErrorToken,
                    false => Number,
                }
            }
            c if is_ident_byte(c) => {
                l.consume_while(is_ident_byte);
                Ident
            }
            _ => {
                // keep spans on scalar boundaries
                l.consume_while(|c| (c & 0b1100_0000) == 0b1000_0000);
                ErrorToken
            }
        };

        let span = l.span_since(pos);
        debug_assert!(!span.is_empty());
        tokens.push(Token {
            kind,
            span,
            preceded_by_trivia: trivia,
        });
        trivia = false;
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(src: &str) -> Vec<(TokenKind, &str)> {
        lex(&mut Lexer::new(src.as_bytes()))
            .into_iter()
            .map(|t| (t.kind, t.span.as_str(src)))
            .collect()
    }

    #[test]
    fn declaration() {
        assert_eq!(
            kinds("@token(\"n\") number: Int = .decimalDigit+ // digits\n"),
            [
                (At, "@"),
                (Ident, "token"),
                (LParen, "("),
                (Str, "\"n\""),
                (RParen, ")"),
                (Ident, "number"),
                (Colon, ":"),
                (Ident, "Int"),
                (Eq, "="),
                (CharClass, ".decimalDigit"),
                (Plus, "+"),
            ]
        );
    }

    #[test]
    fn literals() {
        assert_eq!(
            kinds(r#""a\"b" "a"..."z" /[a-z]\/+/ >>!x -12"#),
            [
                (Str, r#""a\"b""#),
                (Str, "\"a\""),
                (Ellipsis, "..."),
                (Str, "\"z\""),
                (Regex, r"/[a-z]\/+/"),
                (Lookahead, ">>"),
                (Bang, "!"),
                (Ident, "x"),
                (Number, "-12"),
            ]
        );
    }

    #[test]
    fn trivia() {
        let src = "a+ b + c";
        let tokens = lex(&mut Lexer::new(src.as_bytes()));
        let trivia: Vec<_> = tokens.iter().map(|t| t.preceded_by_trivia).collect();
        assert_eq!(trivia, [false, false, true, true, true]);
    }

    #[test]
    fn unknown_characters() {
        assert_eq!(kinds("é >"), [(ErrorToken, "é"), (ErrorToken, ">")]);
    }
}
