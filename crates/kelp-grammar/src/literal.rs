use kelp_runtime::span::Span;

use crate::error::ErrorAccumulator;

#[derive(Clone)]
struct Chars<'a> {
    inner: std::str::Chars<'a>,
    len: usize,
}

impl<'a> Chars<'a> {
    fn new(src: &'a str) -> Chars<'a> {
        Self {
            inner: src.chars(),
            len: src.len(),
        }
    }

    fn next(&mut self) -> Option<char> {
        self.inner.next()
    }

    fn char(&mut self, c: char) -> bool {
        let mut copy = self.inner.clone();
        if copy.next() == Some(c) {
            self.inner = copy;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> u32 {
        (self.len - self.inner.as_str().len()) as u32
    }
}

/// Contents of a `"..."` literal with its escapes resolved.
pub fn extract_string(src: &str, span: Span, err: &ErrorAccumulator) -> String {
    let mut out = String::new();
    let error = |l: &Chars, message: &'static str| {
        err.error_static(Span::at(span.start() + l.offset()), message);
    };

    let mut l = Chars::new(span.as_str(src));
    if !l.char('"') {
        error(&l, "Expected opening quote");
        return out;
    }

    loop {
        let copy = l.clone();
        match l.next() {
            Some('\\') => {
                let escaped = match l.next() {
                    Some('\\') => '\\',
                    Some('"') => '"',
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    Some('0') => '\0',
                    Some(c) => {
                        err.error(
                            Span::at(span.start() + copy.offset()),
                            format_args!("Unknown character escape '\\{}'", c.escape_default()),
                        );
                        continue;
                    }
                    None => continue,
                };
                out.push(escaped);
            }
            Some('"') => break,
            Some(c) => out.push(c),
            None => {
                error(&l, "Expected closing quote");
                break;
            }
        }
    }
    out
}

/// Pattern of a `/.../` literal, only `\/` is unescaped, everything else is left to the regex engine.
pub fn extract_regex(src: &str, span: Span, err: &ErrorAccumulator) -> String {
    let mut out = String::new();
    let mut l = Chars::new(span.as_str(src));
    if !l.char('/') {
        err.error_static(Span::at(span.start()), "Expected opening slash");
        return out;
    }

    loop {
        match l.next() {
            Some('\\') => {
                if l.char('/') {
                    out.push('/');
                } else {
                    out.push('\\');
                }
            }
            Some('/') => break,
            Some(c) => out.push(c),
            None => {
                err.error_static(Span::at(span.start() + l.offset()), "Expected closing slash");
                break;
            }
        }
    }
    out
}
