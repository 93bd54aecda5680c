use std::collections::HashSet;

use crate::{
    behaviour::BehaviourKind,
    charset::CharSet,
    cursor::{Cursor, LexicalContext},
    grammar::{Grammar, RuleHandle},
    ir::{IntermediateRepresentation, MatchResult, Site},
    rule::{Rule, RuleKind, Terminal},
};

#[derive(Clone, Default, Debug)]
pub struct ParseOptions {
    /// Characters skipped before every rule.
    pub skip: Option<CharSet>,
    /// Cache results by rule and position, only used by the tree builders.
    pub memoize: bool,
}

impl ParseOptions {
    pub fn skipping(skip: CharSet) -> ParseOptions {
        ParseOptions {
            skip: Some(skip),
            memoize: false,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RunOutcome {
    pub consumed_all: bool,
    pub position: u32,
}

/// Drives the evaluation of a grammar over one source, reporting events to an
/// [`IntermediateRepresentation`].
pub struct Parser<'g, 'a> {
    grammar: &'g Grammar,
    cursor: Cursor<'a>,
    /// Recursive stubs currently being evaluated, with the position they were entered at.
    active: HashSet<(RuleHandle, u32)>,
}

impl<'g, 'a> Parser<'g, 'a> {
    pub fn new(grammar: &'g Grammar, source: &'a str, options: &ParseOptions) -> Parser<'g, 'a> {
        Parser {
            grammar,
            cursor: Cursor::new(source).with_skip(options.skip.clone()),
            active: HashSet::new(),
        }
    }

    pub fn cursor(&self) -> &Cursor<'a> {
        &self.cursor
    }
    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }
    /// Advances past characters of the skip set, as done between top level productions.
    pub fn skip(&mut self) {
        self.cursor.skip();
    }

    /// Parses the whole source, evaluating the roots until the input is exhausted or stops matching.
    pub fn run<I>(&mut self, ir: &mut I) -> RunOutcome
    where
        I: IntermediateRepresentation<'a> + ?Sized,
    {
        let source = self.cursor.source();
        log::debug!(
            "Parsing {} bytes with {} root rules",
            source.len(),
            self.grammar.roots().len()
        );

        ir.will_build_from(source, self.grammar);
        loop {
            let before = self.cursor.position();
            let result = self.step(ir);
            self.skip();

            if !result.is_success() || self.cursor.position() == before || self.cursor.is_at_end() {
                break;
            }
        }
        ir.did_build();

        let outcome = RunOutcome {
            consumed_all: self.cursor.is_at_end(),
            position: self.cursor.position(),
        };
        log::debug!("Parse finished at {} of {}", outcome.position, source.len());
        outcome
    }

    /// Evaluates one top level production, the roots are tried in order.
    pub fn step<I>(&mut self, ir: &mut I) -> MatchResult<'a>
    where
        I: IntermediateRepresentation<'a> + ?Sized,
    {
        let position = self.cursor.position();
        for &root in self.grammar.roots() {
            let result = self.evaluate(root, ir);
            if result.is_success() {
                return result;
            }
        }
        MatchResult::Failure(position)
    }

    pub fn evaluate<I>(&mut self, handle: RuleHandle, ir: &mut I) -> MatchResult<'a>
    where
        I: IntermediateRepresentation<'a> + ?Sized,
    {
        let grammar = self.grammar;
        let rule = grammar.get_rule(handle);
        let position = self.cursor.position();
        let site = Site {
            position,
            cacheable: !self.active.iter().any(|&(_, at)| at == position),
        };

        if !rule.is_stub() {
            return self.evaluate_rule(handle, rule, site, ir);
        }

        // re-entering a stub without consuming anything would never terminate
        let key = (handle, position);
        if !self.active.insert(key) {
            log::trace!("{handle} re-entered at {position}, failing the recursive path");
            return MatchResult::Failure(position);
        }
        let result = self.evaluate_rule(handle, rule, site, ir);
        self.active.remove(&key);

        result
    }

    fn evaluate_rule<I>(
        &mut self,
        handle: RuleHandle,
        rule: &'g Rule,
        site: Site,
        ir: &mut I,
    ) -> MatchResult<'a>
    where
        I: IntermediateRepresentation<'a> + ?Sized,
    {
        let grammar = self.grammar;
        let behaviour = rule.behaviour;

        if let Some(cached) = ir.will_evaluate(grammar, handle, site) {
            if let (Some(cx), false) = (cached.context(), behaviour.lookahead) {
                self.cursor.jump_to(cx.span().end());
            }
            return cached;
        }

        self.cursor.mark(true);
        let start = self.cursor.position();

        let max = behaviour.cardinality.max.unwrap_or(u32::MAX);
        let mut count = 0;
        while count < max {
            let before = self.cursor.position();
            let checkpoint = ir.checkpoint();

            self.cursor.mark(false);
            if self.test(rule, ir) {
                self.cursor.proceed();
            } else {
                self.cursor.rewind();
                ir.restore(checkpoint);
                break;
            }

            count += 1;
            if self.cursor.position() == before {
                break;
            }
        }

        let result = if count < behaviour.cardinality.min {
            self.cursor.rewind();
            MatchResult::Failure(start)
        } else if count == 0 {
            self.cursor.rewind();
            MatchResult::IgnoreFailure(start)
        } else if behaviour.lookahead {
            let cx = self.cursor.context();
            self.cursor.rewind();
            MatchResult::Success(cx)
        } else {
            let cx: LexicalContext<'a> = self.cursor.proceed();
            match behaviour.kind {
                BehaviourKind::Skipping => MatchResult::Consume(cx),
                _ => MatchResult::Success(cx),
            }
        };

        ir.did_evaluate(grammar, handle, result);
        result
    }

    fn test<I>(&mut self, rule: &'g Rule, ir: &mut I) -> bool
    where
        I: IntermediateRepresentation<'a> + ?Sized,
    {
        if !rule.behaviour.negated {
            return self.test_kind(&rule.kind, ir);
        }

        let checkpoint = ir.checkpoint();
        self.cursor.mark(false);
        let matched = self.test_kind(&rule.kind, ir);
        self.cursor.rewind();
        ir.restore(checkpoint);

        match matched {
            true => false,
            false => self.cursor.scan_next().is_some(),
        }
    }

    fn test_kind<I>(&mut self, kind: &'g RuleKind, ir: &mut I) -> bool
    where
        I: IntermediateRepresentation<'a> + ?Sized,
    {
        match kind {
            RuleKind::Terminal(terminal) => self.scan(terminal),
            RuleKind::Sequence(children) => {
                for &child in children.iter() {
                    if !self.evaluate(child, ir).is_success() {
                        return false;
                    }
                }
                true
            }
            RuleKind::Choice(children) => {
                for &child in children.iter() {
                    if self.evaluate(child, ir).is_success() {
                        return true;
                    }
                }
                false
            }
            RuleKind::Reference(target) => self.evaluate(*target, ir).is_success(),
            RuleKind::Recursive(Some(surrogate)) => self.evaluate(*surrogate, ir).is_success(),
            RuleKind::Recursive(None) => {
                panic!("Evaluated a recursive rule before its surrogate was assigned")
            }
        }
    }

    fn scan(&mut self, terminal: &Terminal) -> bool {
        match terminal {
            Terminal::Literal(text) => self.cursor.scan_literal(text),
            Terminal::Set(set) => self.cursor.scan_set(set),
            Terminal::Regex(handle) => self.cursor.scan_regex(self.grammar.compiled_regex(*handle)),
            Terminal::EndOfInput => self.cursor.scan_end(),
            Terminal::Never => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        behaviour::Behaviour,
        charset::CharClass,
        grammar::Grammar,
        ir::{IntermediateRepresentation, MatchResult, Site},
    };
    use std::rc::Rc;

    /// Records the results of every evaluated rule.
    #[derive(Default)]
    struct Results<'a> {
        results: Vec<(RuleHandle, MatchResult<'a>)>,
        depth: usize,
    }

    impl<'a> IntermediateRepresentation<'a> for Results<'a> {
        fn will_build_from(&mut self, _source: &'a str, _grammar: &Grammar) {
            self.reset_state();
        }
        fn will_evaluate(
            &mut self,
            _grammar: &Grammar,
            _rule: RuleHandle,
            _site: Site,
        ) -> Option<MatchResult<'a>> {
            self.depth += 1;
            None
        }
        fn did_evaluate(&mut self, _grammar: &Grammar, rule: RuleHandle, result: MatchResult<'a>) {
            self.depth -= 1;
            self.results.push((rule, result));
        }
        fn reset_state(&mut self) {
            self.results.clear();
            self.depth = 0;
        }
    }

    fn evaluate<'a>(grammar: &Grammar, rule: RuleHandle, source: &'a str) -> (MatchResult<'a>, u32) {
        let mut parser = Parser::new(grammar, source, &ParseOptions::default());
        let mut ir = Results::default();
        let result = parser.evaluate(rule, &mut ir);
        assert_eq!(ir.depth, 0);
        assert_eq!(parser.cursor().depth(), 0);
        (result, parser.cursor().position())
    }

    #[test]
    fn sequence_is_all_or_nothing() {
        let mut grammar = Grammar::new();
        let a = grammar.literal("a");
        let b = grammar.literal("b");
        let ab = grammar.sequence(vec![a, b]);

        let (result, position) = evaluate(&grammar, ab, "ac");
        assert_eq!(result, MatchResult::Failure(0));
        assert_eq!(position, 0);

        let (result, position) = evaluate(&grammar, ab, "abc");
        assert!(matches!(result, MatchResult::Success(cx) if cx.matched() == "ab"));
        assert_eq!(position, 2);
    }

    #[test]
    fn choice_rewinds_each_branch() {
        let mut grammar = Grammar::new();
        let a = grammar.literal("a");
        let x = grammar.literal("x");
        let b = grammar.literal("b");
        let ax = grammar.sequence(vec![a, x]);
        let ab = grammar.sequence(vec![a, b]);
        let choice = grammar.choice(vec![ax, ab]);

        let (result, position) = evaluate(&grammar, choice, "ab");
        assert!(matches!(result, MatchResult::Success(cx) if cx.matched() == "ab"));
        assert_eq!(position, 2);

        // the first success wins even if a later branch is longer
        let short = grammar.choice(vec![a, ab]);
        let (result, _) = evaluate(&grammar, short, "ab");
        assert!(matches!(result, MatchResult::Success(cx) if cx.matched() == "a"));
    }

    #[test]
    fn quantifier_boundaries() {
        let mut grammar = Grammar::new();
        let never = grammar.literal("z");
        let many = grammar.zero_or_more(never);
        let some = grammar.one_or_more(never);

        assert_eq!(evaluate(&grammar, many, "abc"), (MatchResult::IgnoreFailure(0), 0));
        assert_eq!(evaluate(&grammar, some, "abc"), (MatchResult::Failure(0), 0));

        let digit = grammar.char_set(CharSet::class(CharClass::DecimalDigit));
        let two = grammar.with_cardinality(digit, crate::behaviour::Cardinality::new(1, Some(2)));
        let (result, position) = evaluate(&grammar, two, "123");
        assert!(matches!(result, MatchResult::Success(cx) if cx.matched() == "12"));
        assert_eq!(position, 2);
    }

    #[test]
    fn negation_and_lookahead() {
        let mut grammar = Grammar::new();
        let quote = grammar.literal("\"");
        let not_quote = grammar.negate(quote);
        let body = grammar.zero_or_more(not_quote);

        let (result, position) = evaluate(&grammar, body, "abc\"");
        assert!(matches!(result, MatchResult::Success(cx) if cx.matched() == "abc"));
        assert_eq!(position, 3);

        // negation fails at the end of input
        assert_eq!(evaluate(&grammar, not_quote, ""), (MatchResult::Failure(0), 0));

        let peek = grammar.lookahead(quote);
        let (result, position) = evaluate(&grammar, peek, "\"");
        assert!(matches!(result, MatchResult::Success(cx) if cx.matched() == "\""));
        assert_eq!(position, 0);
    }

    #[test]
    fn skipping_rules_consume() {
        let mut grammar = Grammar::new();
        let space = grammar.literal(" ");
        let void = grammar.void(space);
        let (result, position) = evaluate(&grammar, void, " ");
        assert!(matches!(result, MatchResult::Consume(_)));
        assert_eq!(position, 1);
    }

    #[test]
    fn left_recursion_falls_through() {
        // expr = expr "+" "1" | "1"
        let mut grammar = Grammar::new();
        let token = grammar.token("expr");
        let expr = grammar.recursive_stub(Behaviour::structural(token), Rc::default());
        let plus = grammar.literal("+");
        let one = grammar.literal("1");
        let recursive = grammar.sequence(vec![expr, plus, one]);
        let body = grammar.choice(vec![recursive, one]);
        grammar.assign_surrogate(expr, body);

        let (result, position) = evaluate(&grammar, expr, "1+1");
        assert!(matches!(result, MatchResult::Success(cx) if cx.matched() == "1"));
        assert_eq!(position, 1);
    }

    #[test]
    #[should_panic(expected = "surrogate")]
    fn unassigned_stub_panics() {
        let mut grammar = Grammar::new();
        let stub = grammar.recursive_stub(Behaviour::scanning(), Rc::default());
        evaluate(&grammar, stub, "x");
    }

    #[test]
    fn skip_set_applies_before_rules() {
        let mut grammar = Grammar::new();
        let a = grammar.literal("a");
        let b = grammar.literal("b");
        let ab = grammar.sequence(vec![a, b]);
        grammar.add_root(ab);

        let options = ParseOptions::skipping(CharSet::class(CharClass::WhitespaceOrNewline));
        let mut parser = Parser::new(&grammar, "  a \n b  ", &options);
        let mut ir = Results::default();
        let outcome = parser.run(&mut ir);
        assert!(outcome.consumed_all);

        let (_, result) = ir.results.last().copied().unwrap();
        assert!(matches!(result, MatchResult::Success(cx) if cx.span().start() == 2));
    }
}
