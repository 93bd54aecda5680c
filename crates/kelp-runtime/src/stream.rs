use std::collections::VecDeque;

use crate::{
    error::{ErrorLog, ParseError},
    grammar::{Grammar, RuleHandle, TokenHandle},
    ir::{IntermediateRepresentation, IrCheckpoint, MatchResult, Site},
    parser::{ParseOptions, Parser},
    span::Span,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StreamToken {
    pub token: TokenHandle,
    pub span: Span,
}

struct Scope {
    structural: bool,
    emitted: usize,
}

/// Emits the outermost structural matches, nested ones are covered by their ancestor.
#[derive(Default)]
struct OutermostTokens {
    scopes: Vec<Scope>,
    open_structural: usize,
    emitted: Vec<StreamToken>,
    errors: ErrorLog,
}

impl<'a> IntermediateRepresentation<'a> for OutermostTokens {
    fn will_build_from(&mut self, _source: &'a str, _grammar: &Grammar) {
        self.reset_state();
    }

    fn will_evaluate(
        &mut self,
        grammar: &Grammar,
        rule: RuleHandle,
        _site: Site,
    ) -> Option<MatchResult<'a>> {
        let structural = grammar.get_rule(rule).behaviour.is_structural();
        if structural {
            self.open_structural += 1;
        }
        self.scopes.push(Scope {
            structural,
            emitted: self.emitted.len(),
        });
        None
    }

    fn did_evaluate(&mut self, grammar: &Grammar, rule: RuleHandle, result: MatchResult<'a>) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        if scope.structural {
            self.open_structural -= 1;
        }

        let r = grammar.get_rule(rule);
        match result {
            MatchResult::Success(cx) if !r.behaviour.lookahead => {
                if let (Some(token), 0) = (r.behaviour.token(), self.open_structural) {
                    self.emitted.push(StreamToken {
                        token,
                        span: cx.span(),
                    });
                }
            }
            MatchResult::Failure(position) => {
                self.emitted.truncate(scope.emitted);
                if let Some(message) = r.annotations.error() {
                    self.errors.report(position, message);
                }
            }
            _ => self.emitted.truncate(scope.emitted),
        }
    }

    fn reset_state(&mut self) {
        self.scopes.clear();
        self.open_structural = 0;
        self.emitted.clear();
        self.errors.clear();
    }

    fn checkpoint(&self) -> IrCheckpoint {
        IrCheckpoint(self.emitted.len())
    }

    fn restore(&mut self, checkpoint: IrCheckpoint) {
        self.emitted.truncate(checkpoint.0);
    }
}

/// Lazily parses the source, one top level production per refill.
pub struct TokenStream<'g, 'a> {
    parser: Parser<'g, 'a>,
    ir: OutermostTokens,
    pending: VecDeque<StreamToken>,
    done: bool,
}

impl<'g, 'a> TokenStream<'g, 'a> {
    pub fn new(grammar: &'g Grammar, source: &'a str, options: &ParseOptions) -> TokenStream<'g, 'a> {
        let mut ir = OutermostTokens::default();
        ir.will_build_from(source, grammar);
        TokenStream {
            parser: Parser::new(grammar, source, options),
            ir,
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Position the stream stopped at, if it ended before consuming the whole input.
    pub fn stopped_at(&self) -> Option<u32> {
        let cursor = self.parser.cursor();
        match self.done && !cursor.is_at_end() {
            true => Some(cursor.position()),
            false => None,
        }
    }

    pub fn errors(&self) -> &[ParseError] {
        self.ir.errors.errors()
    }

    fn refill(&mut self) {
        let before = self.parser.cursor().position();
        let result = self.parser.step(&mut self.ir);
        self.pending.extend(self.ir.emitted.drain(..));
        if result.is_success() {
            self.parser.skip();
        }

        let cursor = self.parser.cursor();
        if !result.is_success() || cursor.position() == before {
            self.done = true;
        }
    }
}

impl Iterator for TokenStream<'_, '_> {
    type Item = StreamToken;

    fn next(&mut self) -> Option<StreamToken> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            if self.done {
                return None;
            }
            if self.parser.cursor().is_at_end() {
                self.done = true;
                self.ir.did_build();
                continue;
            }
            self.refill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charset::{CharClass, CharSet};

    fn words() -> Grammar {
        // word = .letter+
        // digit = .decimalDigit
        // number = digit+
        let mut grammar = Grammar::new();
        let letter = grammar.char_set(CharSet::class(CharClass::Letter));
        let letters = grammar.one_or_more(letter);
        let word_token = grammar.token("word");
        let word = grammar.structural(letters, word_token);

        let digit = grammar.char_set(CharSet::class(CharClass::DecimalDigit));
        let digit_token = grammar.token("digit");
        let digit = grammar.structural(digit, digit_token);
        let digits = grammar.one_or_more(digit);
        let body = grammar.sequence(vec![digits]);
        let number_token = grammar.token("number");
        let number = grammar.structural(body, number_token);

        grammar.add_root(word);
        grammar.add_root(number);
        grammar
    }

    #[test]
    fn yields_outermost_tokens() {
        let grammar = words();
        let options = ParseOptions::skipping(CharSet::class(CharClass::Whitespace));
        let source = "abc 12 de";
        let tokens: Vec<_> = TokenStream::new(&grammar, source, &options)
            .map(|t| (grammar.token_name(t.token), t.span.as_str(source)))
            .collect();
        assert_eq!(tokens, [("word", "abc"), ("number", "12"), ("word", "de")]);
    }

    #[test]
    fn trailing_skipped_characters() {
        let grammar = words();
        let options = ParseOptions::skipping(CharSet::class(CharClass::WhitespaceOrNewline));
        let mut stream = TokenStream::new(&grammar, " ab  12 \n", &options);
        let tokens: Vec<_> = stream.by_ref().map(|t| t.span).collect();
        assert_eq!(tokens, [Span::new(1, 3), Span::new(5, 7)]);
        assert_eq!(stream.stopped_at(), None);
        assert!(stream.errors().is_empty());
    }

    #[test]
    fn stops_on_unmatched_input() {
        let grammar = words();
        let options = ParseOptions::skipping(CharSet::class(CharClass::Whitespace));
        let mut stream = TokenStream::new(&grammar, "abc ?", &options);
        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
        assert_eq!(stream.stopped_at(), Some(4));
    }
}
