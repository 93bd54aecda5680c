use std::rc::Rc;

use crate::{
    annotation::{Annotations, RcString},
    behaviour::Behaviour,
    charset::CharSet,
    grammar::{RegexHandle, RuleHandle},
};

#[derive(Clone, PartialEq, Debug)]
pub enum Terminal {
    Literal(RcString),
    /// A single scalar from the set, character ranges are sets too.
    Set(CharSet),
    Regex(RegexHandle),
    EndOfInput,
    /// Never matches, stands in for terminals that failed to compile.
    Never,
}

#[derive(Clone, PartialEq, Debug)]
pub enum RuleKind {
    Terminal(Terminal),
    Sequence(Rc<[RuleHandle]>),
    Choice(Rc<[RuleHandle]>),
    Reference(RuleHandle),
    /// Stub for a recursive rule, evaluates the surrogate once it's assigned.
    Recursive(Option<RuleHandle>),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Rule {
    pub kind: RuleKind,
    pub behaviour: Behaviour,
    pub annotations: Rc<Annotations>,
}

impl Rule {
    pub fn new(kind: RuleKind, behaviour: Behaviour) -> Rule {
        Rule {
            kind,
            behaviour,
            annotations: Rc::default(),
        }
    }
    pub fn is_stub(&self) -> bool {
        matches!(self.kind, RuleKind::Recursive(_))
    }
    /// A rule whose behaviour can be changed without wrapping it.
    pub fn has_plain_behaviour(&self) -> bool {
        let b = &self.behaviour;
        b.cardinality.is_one() && !b.negated && !b.lookahead
    }
}
