use std::fmt::Display;

use crate::grammar::TokenHandle;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BehaviourKind {
    /// Produces a node with the token.
    Structural(TokenHandle),
    /// Consumed without a node of its own, children are hoisted into the parent.
    Scanning,
    /// Consumed and discarded along with any children.
    Skipping,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Cardinality {
    pub min: u32,
    /// `None` is unbounded.
    pub max: Option<u32>,
}

impl Cardinality {
    pub const ONE: Cardinality = Cardinality::new(1, Some(1));
    pub const OPTIONAL: Cardinality = Cardinality::new(0, Some(1));
    pub const ZERO_OR_MORE: Cardinality = Cardinality::new(0, None);
    pub const ONE_OR_MORE: Cardinality = Cardinality::new(1, None);

    pub const fn new(min: u32, max: Option<u32>) -> Cardinality {
        Cardinality { min, max }
    }
    pub fn is_one(self) -> bool {
        self == Cardinality::ONE
    }
}

impl Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min, self.max) {
            (1, Some(1)) => Ok(()),
            (0, Some(1)) => f.write_str("?"),
            (0, None) => f.write_str("*"),
            (1, None) => f.write_str("+"),
            (min, None) => write!(f, "{{{min},}}"),
            (min, Some(max)) => write!(f, "{{{min},{max}}}"),
        }
    }
}

/// How a rule's match is used, independent of what it matches.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Behaviour {
    pub kind: BehaviourKind,
    pub cardinality: Cardinality,
    pub negated: bool,
    pub lookahead: bool,
}

impl Behaviour {
    pub fn structural(token: TokenHandle) -> Behaviour {
        Behaviour::new(BehaviourKind::Structural(token))
    }
    pub fn scanning() -> Behaviour {
        Behaviour::new(BehaviourKind::Scanning)
    }
    pub fn skipping() -> Behaviour {
        Behaviour::new(BehaviourKind::Skipping)
    }
    pub fn new(kind: BehaviourKind) -> Behaviour {
        Behaviour {
            kind,
            cardinality: Cardinality::ONE,
            negated: false,
            lookahead: false,
        }
    }
    pub fn with_kind(self, kind: BehaviourKind) -> Behaviour {
        Behaviour { kind, ..self }
    }
    pub fn with_cardinality(self, cardinality: Cardinality) -> Behaviour {
        Behaviour {
            cardinality,
            ..self
        }
    }
    pub fn token(&self) -> Option<TokenHandle> {
        match self.kind {
            BehaviourKind::Structural(token) => Some(token),
            _ => None,
        }
    }
    pub fn is_structural(&self) -> bool {
        matches!(self.kind, BehaviourKind::Structural(_))
    }
}
