//! Recursive descent parser for grammar files.
//!
//! ```text
//! file       = decl*
//! decl       = annotation* Ident (':' Ident)? '=' choice
//! choice     = sequence ('|' sequence)*
//! sequence   = prefixed (free-standing '+'? prefixed)*
//! prefixed   = annotation* ('!' | '>>')* postfix
//! postfix    = atom ('?' | '*' | attached '+')*
//! atom       = Ident | Str ('...' Str)? | CharClass | Regex | '(' choice ')'
//! annotation = '@' Ident ('(' (Str | Number | 'true' | 'false') ')')?
//! ```
//!
//! Sequences end where the next declaration begins, so declarations need no terminator.

use kelp_runtime::{
    annotation::{AnnotationValue, RcString},
    span::{Span, Spanned},
};

use crate::{
    ast::{Annotation, Expr, ExprKind, File, Quantifier, RuleDecl},
    error::ErrorAccumulator,
    lexer::{lex, Lexer, Token, TokenKind},
    literal::{extract_regex, extract_string},
};

use TokenKind::*;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: u32,
    src: &'a str,
    err: &'a ErrorAccumulator,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str, err: &'a ErrorAccumulator) -> Parser<'a> {
        let tokens = lex(&mut Lexer::new(src.as_bytes()));
        Parser {
            tokens,
            pos: 0,
            src,
            err,
        }
    }

    pub fn advance(&mut self) {
        assert!(!self.eof());
        self.pos += 1;
    }

    #[inline]
    pub fn eof(&self) -> bool {
        self.pos as usize == self.tokens.len()
    }

    pub fn peek(&self) -> Option<TokenKind> {
        self.nth(0)
    }

    pub fn nth(&self, lookahead: u32) -> Option<TokenKind> {
        self.nth_impl(lookahead).map(|it| it.kind)
    }

    pub fn nth_impl(&self, lookahead: u32) -> Option<&Token> {
        self.tokens.get((self.pos + lookahead) as usize)
    }

    #[inline]
    pub fn at(&self, kind: TokenKind) -> bool {
        self.nth(0) == Some(kind)
    }

    pub fn token(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Span of the current token, or an empty span at the end of the source.
    fn current_span(&self) -> Span {
        match self.nth_impl(0) {
            Some(token) => token.span,
            None => Span::at(self.src.len() as u32),
        }
    }

    /// End of the last consumed token.
    fn last_end(&self) -> u32 {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i as usize))
            .map_or(0, |t| t.span.end())
    }

    fn span_since(&self, start: u32) -> Span {
        Span::new(start, self.last_end().max(start))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Span> {
        let span = self.current_span();
        if self.token(kind) {
            Some(span)
        } else {
            self.err.error(span, format_args!("Expected {what}"));
            None
        }
    }

    fn text(&self, span: Span) -> &'a str {
        span.as_str(self.src)
    }

    /// Whether `annotation* Ident (':' Ident)? '='` follows.
    fn at_decl_start(&self) -> bool {
        let mut i = 0;
        while self.nth(i) == Some(At) {
            i += 1;
            if self.nth(i) != Some(Ident) {
                return false;
            }
            i += 1;
            if self.nth(i) == Some(LParen) {
                // annotation values are a single literal
                if self.nth(i + 2) != Some(RParen) {
                    return false;
                }
                i += 3;
            }
        }
        if self.nth(i) != Some(Ident) {
            return false;
        }
        i += 1;
        if self.nth(i) == Some(Colon) {
            if self.nth(i + 1) != Some(Ident) {
                return false;
            }
            i += 2;
        }
        self.nth(i) == Some(Eq)
    }

    fn at_sequence_end(&self) -> bool {
        matches!(self.peek(), None | Some(RParen | Pipe)) || self.at_decl_start()
    }

    fn at_element_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(Ident | Str | CharClass | Regex | LParen | At | Bang | Lookahead)
        )
    }
}

pub fn parse_file(src: &str, err: &ErrorAccumulator) -> File {
    let mut p = Parser::new(src, err);
    let mut file = File::default();

    while !p.eof() {
        if p.at_decl_start() {
            file.decls.push(decl(&mut p));
            continue;
        }

        let start = p.current_span();
        p.advance();
        while !(p.eof() || p.at_decl_start()) {
            p.advance();
        }
        err.error(
            p.span_since(start.start()),
            "Expected a rule declaration `name = expression`",
        );
    }

    log::debug!("Parsed {} declarations", file.decls.len());
    file
}

fn decl(p: &mut Parser) -> RuleDecl {
    let start = p.current_span().start();
    let annotations = annotations(p);

    let name_span = p.current_span();
    p.advance();
    let name = Spanned::new(RcString::from(p.text(name_span)), name_span);

    let mut value_type = None;
    if p.token(Colon) {
        let span = p.current_span();
        p.advance();
        value_type = Some(Spanned::new(RcString::from(p.text(span)), span));
    }
    p.expect(Eq, "'='");

    let body = choice(p);

    RuleDecl {
        annotations,
        name,
        value_type,
        body,
        span: p.span_since(start),
    }
}

fn annotations(p: &mut Parser) -> Vec<Annotation> {
    let mut annotations = Vec::new();
    while let Some(annotation) = annotation(p) {
        annotations.push(annotation);
    }
    annotations
}

fn annotation(p: &mut Parser) -> Option<Annotation> {
    let start = p.current_span().start();
    if !p.token(At) {
        return None;
    }

    let label_span = p.expect(Ident, "an annotation name")?;
    let label = Spanned::new(RcString::from(p.text(label_span)), label_span);

    let mut value = Spanned::new(AnnotationValue::Set, label_span);
    if p.token(LParen) {
        let span = p.current_span();
        let parsed = match p.peek() {
            Some(Str) => Some(AnnotationValue::Str(
                extract_string(p.src, span, p.err).into(),
            )),
            Some(Number) => p.text(span).parse().ok().map(AnnotationValue::Int),
            Some(Ident) => match p.text(span) {
                "true" => Some(AnnotationValue::Bool(true)),
                "false" => Some(AnnotationValue::Bool(false)),
                _ => None,
            },
            _ => None,
        };
        match parsed {
            Some(parsed) => {
                p.advance();
                value = Spanned::new(parsed, span);
            }
            None => p.err.error(
                span,
                "Expected a string, integer, `true` or `false` annotation value",
            ),
        }
        // skip whatever is left of a malformed value
        while !(p.eof() || p.at(RParen) || p.at_decl_start()) {
            p.advance();
        }
        p.expect(RParen, "')'");
    }

    log::trace!("Annotation @{} at {}", label.inner, p.span_since(start));
    Some(Annotation { label, value })
}

fn choice(p: &mut Parser) -> Expr {
    let start = p.current_span().start();
    let mut alternatives = vec![sequence(p)];
    while p.token(Pipe) {
        alternatives.push(sequence(p));
    }

    match alternatives.len() {
        1 => alternatives.pop().unwrap_or_else(|| Expr::error(Span::at(start))),
        _ => Expr::new(ExprKind::Choice(alternatives), p.span_since(start)),
    }
}

fn sequence(p: &mut Parser) -> Expr {
    let start = p.current_span().start();
    let mut elements = Vec::new();
    loop {
        if p.at_sequence_end() {
            break;
        }
        // `a + b` is sequencing, `a+` was consumed as a quantifier
        if p.at(Plus) && !elements.is_empty() {
            p.advance();
            continue;
        }
        if p.at_element_start() {
            elements.push(prefixed(p));
            continue;
        }

        let span = p.current_span();
        p.err.error(span, "Expected an expression");
        p.advance();
        elements.push(Expr::error(span));
    }

    match elements.len() {
        0 => {
            let span = p.current_span();
            p.err.error(Span::at(span.start()), "Expected an expression");
            Expr::error(Span::at(span.start()))
        }
        1 => elements.pop().unwrap_or_else(|| Expr::error(Span::at(start))),
        _ => Expr::new(ExprKind::Sequence(elements), p.span_since(start)),
    }
}

fn prefixed(p: &mut Parser) -> Expr {
    let start = p.current_span().start();
    let annotations = annotations(p);

    let mut prefixes = Vec::new();
    while let Some(kind @ (Bang | Lookahead)) = p.peek() {
        prefixes.push(kind);
        p.advance();
    }

    let mut expr = postfix(p);
    for prefix in prefixes.into_iter().rev() {
        let kind = match prefix {
            Bang => ExprKind::Not(Box::new(expr)),
            _ => ExprKind::Lookahead(Box::new(expr)),
        };
        expr = Expr::new(kind, p.span_since(start));
    }

    if !annotations.is_empty() {
        expr = Expr::new(
            ExprKind::Annotated(annotations, Box::new(expr)),
            p.span_since(start),
        );
    }
    expr
}

fn postfix(p: &mut Parser) -> Expr {
    let start = p.current_span().start();
    let mut expr = atom(p);
    loop {
        let quantifier = match p.nth_impl(0) {
            Some(t) if t.kind == Question => Quantifier::Optional,
            Some(t) if t.kind == Star => Quantifier::ZeroOrMore,
            Some(t) if t.kind == Plus && !t.preceded_by_trivia => Quantifier::OneOrMore,
            _ => break,
        };
        p.advance();
        expr = Expr::new(ExprKind::Repeat(Box::new(expr), quantifier), p.span_since(start));
    }
    expr
}

fn atom(p: &mut Parser) -> Expr {
    let span = p.current_span();
    let Some(kind) = p.peek() else {
        p.err.error(span, "Expected an expression");
        return Expr::error(span);
    };

    match kind {
        Ident => {
            p.advance();
            Expr::new(ExprKind::Ident(p.text(span).into()), span)
        }
        Str => {
            p.advance();
            let text = extract_string(p.src, span, p.err);
            if !p.token(Ellipsis) {
                return Expr::new(ExprKind::Literal(text.into()), span);
            }
            let Some(end_span) = p.expect(Str, "the end of the character range") else {
                return Expr::error(p.span_since(span.start()));
            };
            let end = extract_string(p.src, end_span, p.err);
            let range_span = p.span_since(span.start());
            match (single_char(&text), single_char(&end)) {
                (Some(a), Some(b)) => Expr::new(ExprKind::Range(a, b), range_span),
                _ => {
                    p.err.error(
                        range_span,
                        "Character range bounds must be single characters",
                    );
                    Expr::error(range_span)
                }
            }
        }
        CharClass => {
            p.advance();
            let name = &p.text(span)[1..];
            match name {
                "endOfInput" => Expr::new(ExprKind::EndOfInput, span),
                _ => Expr::new(ExprKind::CharClass(name.into()), span),
            }
        }
        Regex => {
            p.advance();
            let pattern = extract_regex(p.src, span, p.err);
            Expr::new(ExprKind::Regex(pattern.into()), span)
        }
        LParen => {
            p.advance();
            let inner = match p.at(RParen) {
                true => {
                    p.err.error(p.current_span(), "Expected an expression");
                    Expr::error(p.current_span())
                }
                false => choice(p),
            };
            p.expect(RParen, "')'");
            Expr {
                span: p.span_since(span.start()),
                ..inner
            }
        }
        _ => {
            p.err.error(span, "Expected an expression");
            p.advance();
            Expr::error(span)
        }
    }
}

fn single_char(text: &str) -> Option<char> {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (File, Vec<String>) {
        let err = ErrorAccumulator::new();
        let file = parse_file(src, &err);
        let errors = err.get().iter().map(|e| e.inner.to_string()).collect();
        (file, errors)
    }

    /// Compact s-expression rendering of an expression.
    fn render(expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Ident(a) => a.to_string(),
            ExprKind::Literal(a) => format!("{a:?}"),
            ExprKind::Range(a, b) => format!("{a:?}...{b:?}"),
            ExprKind::CharClass(a) => format!(".{a}"),
            ExprKind::EndOfInput => ".endOfInput".to_owned(),
            ExprKind::Regex(a) => format!("/{a}/"),
            ExprKind::Sequence(c) => {
                let c: Vec<_> = c.iter().map(render).collect();
                format!("(seq {})", c.join(" "))
            }
            ExprKind::Choice(c) => {
                let c: Vec<_> = c.iter().map(render).collect();
                format!("(or {})", c.join(" "))
            }
            ExprKind::Not(a) => format!("!{}", render(a)),
            ExprKind::Lookahead(a) => format!(">>{}", render(a)),
            ExprKind::Repeat(a, q) => {
                let q = match q {
                    Quantifier::Optional => "?",
                    Quantifier::ZeroOrMore => "*",
                    Quantifier::OneOrMore => "+",
                };
                format!("{}{q}", render(a))
            }
            ExprKind::Annotated(a, e) => {
                let labels: Vec<_> = a.iter().map(|a| format!("@{}", a.label.inner)).collect();
                format!("{} {}", labels.join(" "), render(e))
            }
            ExprKind::Error => "<error>".to_owned(),
        }
    }

    #[test]
    fn declarations_without_terminators() {
        let (file, errors) = parse(
            "digit = .decimalDigit\n\
             number: Int = digit+\n\
             @void ws = \" \"*",
        );
        assert!(errors.is_empty(), "{errors:?}");

        let decls: Vec<_> = file
            .decls
            .values()
            .map(|d| (d.name.inner.to_string(), render(&d.body)))
            .collect();
        assert_eq!(
            decls,
            [
                ("digit".to_owned(), ".decimalDigit".to_owned()),
                ("number".to_owned(), "digit+".to_owned()),
                ("ws".to_owned(), "\" \"*".to_owned()),
            ]
        );

        let number = &file.decls.values().nth(1).unwrap();
        assert_eq!(number.value_type.as_ref().map(|t| &*t.inner), Some("Int"));
        let ws = &file.decls.values().nth(2).unwrap();
        assert_eq!(&*ws.annotations[0].label.inner, "void");
    }

    #[test]
    fn precedence() {
        let (file, errors) = parse(r#"a = b c | !d e* | >>(f | g)? + "x"..."z" @pinned h"#);
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            render(&file.decls.values().next().unwrap().body),
            "(or (seq b c) (seq !d e*) (seq >>(or f g)? 'x'...'z' @pinned h))"
        );
    }

    #[test]
    fn free_standing_plus() {
        let (file, errors) = parse("a = b + c+ + d");
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            render(&file.decls.values().next().unwrap().body),
            "(seq b c+ d)"
        );
    }

    #[test]
    fn annotation_values() {
        let (file, errors) = parse(r#"a = @error("expected a") @depth(3) @flag(true) "a""#);
        assert!(errors.is_empty(), "{errors:?}");
        let ExprKind::Annotated(annotations, _) = &file.decls.values().next().unwrap().body.kind else {
            panic!("expected annotations");
        };
        let values: Vec<_> = annotations.iter().map(|a| a.value.inner.clone()).collect();
        assert_eq!(
            values,
            [
                AnnotationValue::Str("expected a".into()),
                AnnotationValue::Int(3),
                AnnotationValue::Bool(true),
            ]
        );
    }

    #[test]
    fn recovery() {
        let (file, errors) = parse("= junk\na = \"a\" ) \nb = (\nc = \"c\"");
        assert_eq!(file.decls.len(), 3);
        assert_eq!(
            errors,
            [
                "Expected a rule declaration `name = expression`",
                "Expected a rule declaration `name = expression`",
                "Expected an expression",
                "Expected ')'",
            ]
        );
        let c = file.decl_named("c").unwrap();
        assert_eq!(render(&file.decls[c].body), "\"c\"");
    }
}
