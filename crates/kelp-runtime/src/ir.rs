use std::fmt::Display;

use crate::{
    cursor::LexicalContext,
    grammar::{Grammar, RuleHandle},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MatchResult<'a> {
    Success(LexicalContext<'a>),
    /// A skipping rule matched, its content is discarded.
    Consume(LexicalContext<'a>),
    /// An optional rule matched zero times.
    IgnoreFailure(u32),
    Failure(u32),
}

impl<'a> MatchResult<'a> {
    /// Everything except [`MatchResult::Failure`] lets the parent continue.
    pub fn is_success(&self) -> bool {
        !matches!(self, MatchResult::Failure(_))
    }
    pub fn context(&self) -> Option<LexicalContext<'a>> {
        match *self {
            MatchResult::Success(cx) | MatchResult::Consume(cx) => Some(cx),
            _ => None,
        }
    }
}

impl Display for MatchResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchResult::Success(cx) => write!(f, "success {} {:?}", cx.span(), cx.matched()),
            MatchResult::Consume(cx) => write!(f, "consume {} {:?}", cx.span(), cx.matched()),
            MatchResult::IgnoreFailure(at) => write!(f, "ignored @{at}"),
            MatchResult::Failure(at) => write!(f, "failure @{at}"),
        }
    }
}

/// Where a rule is about to be evaluated.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Site {
    pub position: u32,
    /// False while a recursive stub entered at the same position is being evaluated. The result
    /// may then depend on the recursion guard, so it must neither be cached nor answered from a
    /// cache.
    pub cacheable: bool,
}

/// Opaque position in the state of an [`IntermediateRepresentation`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct IrCheckpoint(pub usize);

/// Observer of rule evaluation which builds some output from the events.
///
/// Every `will_evaluate` that returns `None` is matched by exactly one `did_evaluate` for the
/// same rule, in stack order.
pub trait IntermediateRepresentation<'a> {
    fn will_build_from(&mut self, source: &'a str, grammar: &Grammar);

    /// Returning a result skips evaluating the rule, any nodes belonging to the result must
    /// already be in place.
    fn will_evaluate(
        &mut self,
        grammar: &Grammar,
        rule: RuleHandle,
        site: Site,
    ) -> Option<MatchResult<'a>>;

    fn did_evaluate(&mut self, grammar: &Grammar, rule: RuleHandle, result: MatchResult<'a>);

    fn did_build(&mut self) {}

    fn reset_state(&mut self);

    fn checkpoint(&self) -> IrCheckpoint {
        IrCheckpoint::default()
    }

    /// Discards everything produced since the checkpoint.
    fn restore(&mut self, _checkpoint: IrCheckpoint) {}
}

impl<'a, T: IntermediateRepresentation<'a> + ?Sized> IntermediateRepresentation<'a> for &mut T {
    fn will_build_from(&mut self, source: &'a str, grammar: &Grammar) {
        (**self).will_build_from(source, grammar)
    }
    fn will_evaluate(
        &mut self,
        grammar: &Grammar,
        rule: RuleHandle,
        site: Site,
    ) -> Option<MatchResult<'a>> {
        (**self).will_evaluate(grammar, rule, site)
    }
    fn did_evaluate(&mut self, grammar: &Grammar, rule: RuleHandle, result: MatchResult<'a>) {
        (**self).did_evaluate(grammar, rule, result)
    }
    fn did_build(&mut self) {
        (**self).did_build()
    }
    fn reset_state(&mut self) {
        (**self).reset_state()
    }
    fn checkpoint(&self) -> IrCheckpoint {
        (**self).checkpoint()
    }
    fn restore(&mut self, checkpoint: IrCheckpoint) {
        (**self).restore(checkpoint)
    }
}

/// Forwards events to two representations.
///
/// Cached results and checkpoints come from the primary. When the primary answers from its
/// cache the secondary sees neither event for that rule, the secondary is never rolled back.
pub struct Tee<A, B> {
    pub primary: A,
    pub secondary: B,
}

impl<A, B> Tee<A, B> {
    pub fn new(primary: A, secondary: B) -> Tee<A, B> {
        Tee { primary, secondary }
    }
    pub fn into_inner(self) -> (A, B) {
        (self.primary, self.secondary)
    }
}

impl<'a, A, B> IntermediateRepresentation<'a> for Tee<A, B>
where
    A: IntermediateRepresentation<'a>,
    B: IntermediateRepresentation<'a>,
{
    fn will_build_from(&mut self, source: &'a str, grammar: &Grammar) {
        self.primary.will_build_from(source, grammar);
        self.secondary.will_build_from(source, grammar);
    }
    fn will_evaluate(
        &mut self,
        grammar: &Grammar,
        rule: RuleHandle,
        site: Site,
    ) -> Option<MatchResult<'a>> {
        let cached = self.primary.will_evaluate(grammar, rule, site);
        if cached.is_none() {
            // the secondary must not answer from a cache, its answer is ignored
            _ = self.secondary.will_evaluate(grammar, rule, site);
        }
        cached
    }
    fn did_evaluate(&mut self, grammar: &Grammar, rule: RuleHandle, result: MatchResult<'a>) {
        self.primary.did_evaluate(grammar, rule, result);
        self.secondary.did_evaluate(grammar, rule, result);
    }
    fn did_build(&mut self) {
        self.primary.did_build();
        self.secondary.did_build();
    }
    fn reset_state(&mut self) {
        self.primary.reset_state();
        self.secondary.reset_state();
    }
    fn checkpoint(&self) -> IrCheckpoint {
        self.primary.checkpoint()
    }
    fn restore(&mut self, checkpoint: IrCheckpoint) {
        self.primary.restore(checkpoint);
    }
}
