use std::fmt::Write;

use crate::{
    grammar::{Grammar, RuleHandle},
    ir::{IntermediateRepresentation, MatchResult, Site},
};

/// Records every evaluation as an indented line of text.
#[derive(Default)]
pub struct Trace {
    buf: String,
    depth: usize,
    events: usize,
}

impl Trace {
    pub fn new() -> Trace {
        Trace::default()
    }
    pub fn as_str(&self) -> &str {
        &self.buf
    }
    pub fn into_string(self) -> String {
        self.buf
    }
    /// Number of evaluated rules.
    pub fn events(&self) -> usize {
        self.events
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
    }
}

impl<'a> IntermediateRepresentation<'a> for Trace {
    fn will_build_from(&mut self, source: &'a str, grammar: &Grammar) {
        self.reset_state();
        _ = writeln!(
            self.buf,
            "parsing {} bytes, {} roots",
            source.len(),
            grammar.roots().len()
        );
    }

    fn will_evaluate(
        &mut self,
        grammar: &Grammar,
        rule: RuleHandle,
        site: Site,
    ) -> Option<MatchResult<'a>> {
        self.indent();
        _ = writeln!(self.buf, "{} @{}", grammar.display_rule(rule), site.position);
        self.depth += 1;
        self.events += 1;
        None
    }

    fn did_evaluate(&mut self, _grammar: &Grammar, _rule: RuleHandle, result: MatchResult<'a>) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        _ = writeln!(self.buf, "-> {result}");
    }

    fn did_build(&mut self) {
        self.buf.push_str("done\n");
    }

    fn reset_state(&mut self) {
        self.buf.clear();
        self.depth = 0;
        self.events = 0;
    }
}
