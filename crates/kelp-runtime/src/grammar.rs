use std::{
    collections::HashMap,
    fmt::{Debug, Display},
    rc::Rc,
};

use cranelift_entity::{entity_impl, PrimaryMap};
use regex::Regex;

use crate::{
    annotation::{Annotations, RcString},
    behaviour::{Behaviour, BehaviourKind, Cardinality},
    charset::CharSet,
    rule::{Rule, RuleKind, Terminal},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleHandle(u32);
entity_impl!(RuleHandle, "rule");

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenHandle(u32);
entity_impl!(TokenHandle, "token");

impl TokenHandle {
    /// Reserved token for rules which produce no node.
    pub const TRANSIENT: TokenHandle = TokenHandle(0);
    /// Reserved token wrapping multiple top level nodes.
    pub const ROOT: TokenHandle = TokenHandle(1);
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegexHandle(u32);
entity_impl!(RegexHandle, "regex");

/// Declared type of the value a token converts to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ValueType {
    Int,
    Float,
    Bool,
    String,
}

impl ValueType {
    pub fn from_name(name: &str) -> Option<ValueType> {
        match name {
            "Int" => Some(ValueType::Int),
            "Float" => Some(ValueType::Float),
            "Bool" => Some(ValueType::Bool),
            "String" => Some(ValueType::String),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct TokenInfo {
    pub name: RcString,
    pub value_type: Option<ValueType>,
}

#[derive(thiserror::Error, Debug)]
pub enum GrammarError {
    #[error("Empty character range {start:?}...{end:?}")]
    EmptyRange { start: char, end: char },
    #[error("Invalid regex /{pattern}/: {source}")]
    InvalidRegex {
        pattern: RcString,
        #[source]
        source: regex::Error,
    },
}

struct CachedRegex {
    pattern: RcString,
    regex: Regex,
}

/// Compiled regexes, deduplicated by pattern.
#[derive(Default)]
pub struct RegexCache {
    by_pattern: HashMap<RcString, RegexHandle>,
    compiled: PrimaryMap<RegexHandle, CachedRegex>,
}

impl RegexCache {
    pub fn get_or_compile(&mut self, pattern: &str) -> Result<RegexHandle, regex::Error> {
        if let Some(&handle) = self.by_pattern.get(pattern) {
            return Ok(handle);
        }

        // anchor to the cursor position
        let regex = Regex::new(&format!("^(?:{pattern})"))?;
        let pattern: RcString = pattern.into();
        let handle = self.compiled.push(CachedRegex {
            pattern: pattern.clone(),
            regex,
        });
        self.by_pattern.insert(pattern, handle);

        Ok(handle)
    }
    pub fn get(&self, handle: RegexHandle) -> &Regex {
        &self.compiled[handle].regex
    }
    pub fn pattern(&self, handle: RegexHandle) -> &str {
        &self.compiled[handle].pattern
    }
    pub fn len(&self) -> usize {
        self.compiled.len()
    }
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// The executable rule graph.
///
/// Rules live in an arena and refer to each other by handle, rules are never modified once
/// constructed with the exception of assigning surrogates to recursive stubs.
pub struct Grammar {
    rules: PrimaryMap<RuleHandle, Rule>,
    tokens: PrimaryMap<TokenHandle, TokenInfo>,
    token_names: HashMap<RcString, TokenHandle>,
    names: HashMap<RcString, RuleHandle>,
    regexes: RegexCache,
    roots: Vec<RuleHandle>,
}

/// Only the sizes, the rules themselves are printed through [`Grammar::display_rule`].
impl Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("rules", &self.rules.len())
            .field("tokens", &self.tokens.len())
            .field("regexes", &self.regexes.len())
            .field("roots", &self.roots)
            .finish()
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar::new()
    }
}

impl Grammar {
    pub fn new() -> Grammar {
        let mut grammar = Grammar {
            rules: PrimaryMap::new(),
            tokens: PrimaryMap::new(),
            token_names: HashMap::new(),
            names: HashMap::new(),
            regexes: RegexCache::default(),
            roots: Vec::new(),
        };

        let transient = grammar.token("$transient");
        let root = grammar.token("$root");
        debug_assert_eq!(transient, TokenHandle::TRANSIENT);
        debug_assert_eq!(root, TokenHandle::ROOT);

        grammar
    }

    pub fn get_rule(&self, handle: RuleHandle) -> &Rule {
        &self.rules[handle]
    }
    pub fn rules(&self) -> impl Iterator<Item = (RuleHandle, &Rule)> {
        self.rules.iter()
    }
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Interns a token by name.
    pub fn token(&mut self, name: &str) -> TokenHandle {
        if let Some(&handle) = self.token_names.get(name) {
            return handle;
        }
        let name: RcString = name.into();
        let handle = self.tokens.push(TokenInfo {
            name: name.clone(),
            value_type: None,
        });
        self.token_names.insert(name, handle);
        handle
    }
    pub fn lookup_token(&self, name: &str) -> Option<TokenHandle> {
        self.token_names.get(name).copied()
    }
    pub fn token_name(&self, token: TokenHandle) -> &str {
        &self.tokens[token].name
    }
    pub fn token_info(&self, token: TokenHandle) -> &TokenInfo {
        &self.tokens[token]
    }
    pub fn set_value_type(&mut self, token: TokenHandle, value_type: ValueType) {
        self.tokens[token].value_type = Some(value_type);
    }
    pub fn tokens(&self) -> impl Iterator<Item = (TokenHandle, &TokenInfo)> {
        self.tokens.iter()
    }

    /// Associates a rule with a name so it can be looked up after compilation.
    pub fn define(&mut self, name: &str, rule: RuleHandle) {
        self.names.insert(name.into(), rule);
    }
    pub fn named(&self, name: &str) -> Option<RuleHandle> {
        self.names.get(name).copied()
    }

    pub fn roots(&self) -> &[RuleHandle] {
        &self.roots
    }
    pub fn add_root(&mut self, rule: RuleHandle) {
        if !self.roots.contains(&rule) {
            self.roots.push(rule);
        }
    }
    pub fn set_roots(&mut self, roots: Vec<RuleHandle>) {
        self.roots = roots;
    }

    pub fn regexes(&self) -> &RegexCache {
        &self.regexes
    }
    pub fn compiled_regex(&self, handle: RegexHandle) -> &Regex {
        self.regexes.get(handle)
    }

    pub fn push(&mut self, rule: Rule) -> RuleHandle {
        self.rules.push(rule)
    }

    fn terminal(&mut self, terminal: Terminal) -> RuleHandle {
        self.push(Rule::new(RuleKind::Terminal(terminal), Behaviour::scanning()))
    }
    pub fn literal(&mut self, text: &str) -> RuleHandle {
        self.terminal(Terminal::Literal(text.into()))
    }
    pub fn char_set(&mut self, set: CharSet) -> RuleHandle {
        self.terminal(Terminal::Set(set))
    }
    pub fn char_range(&mut self, start: char, end: char) -> Result<RuleHandle, GrammarError> {
        let set = CharSet::range(start, end).ok_or(GrammarError::EmptyRange { start, end })?;
        Ok(self.char_set(set))
    }
    pub fn regex(&mut self, pattern: &str) -> Result<RuleHandle, GrammarError> {
        let handle = self
            .regexes
            .get_or_compile(pattern)
            .map_err(|source| GrammarError::InvalidRegex {
                pattern: pattern.into(),
                source,
            })?;
        Ok(self.terminal(Terminal::Regex(handle)))
    }
    pub fn end_of_input(&mut self) -> RuleHandle {
        self.terminal(Terminal::EndOfInput)
    }
    pub fn never(&mut self) -> RuleHandle {
        self.terminal(Terminal::Never)
    }

    pub fn sequence(&mut self, children: Vec<RuleHandle>) -> RuleHandle {
        self.push(Rule::new(
            RuleKind::Sequence(children.into()),
            Behaviour::scanning(),
        ))
    }
    pub fn choice(&mut self, children: Vec<RuleHandle>) -> RuleHandle {
        self.push(Rule::new(
            RuleKind::Choice(children.into()),
            Behaviour::scanning(),
        ))
    }
    pub fn reference(&mut self, target: RuleHandle) -> RuleHandle {
        self.push(Rule::new(RuleKind::Reference(target), Behaviour::scanning()))
    }

    /// Placeholder for a rule whose body refers back to it, see [`Grammar::assign_surrogate`].
    pub fn recursive_stub(&mut self, behaviour: Behaviour, annotations: Rc<Annotations>) -> RuleHandle {
        self.push(Rule {
            kind: RuleKind::Recursive(None),
            behaviour,
            annotations,
        })
    }
    pub fn assign_surrogate(&mut self, stub: RuleHandle, surrogate: RuleHandle) {
        match &mut self.rules[stub].kind {
            RuleKind::Recursive(slot @ None) => *slot = Some(surrogate),
            RuleKind::Recursive(Some(_)) => panic!("Stub {stub} already has a surrogate"),
            _ => panic!("Rule {stub} is not a recursive stub"),
        }
    }
    pub fn surrogate(&self, stub: RuleHandle) -> Option<RuleHandle> {
        match self.rules[stub].kind {
            RuleKind::Recursive(surrogate) => surrogate,
            _ => None,
        }
    }

    /// Creates a copy of the rule's matching logic with a different behaviour and annotations.
    ///
    /// Stubs are referenced rather than copied because their surrogate may not be assigned yet.
    pub fn instance(
        &mut self,
        rule: RuleHandle,
        mut behaviour: Behaviour,
        annotations: Rc<Annotations>,
    ) -> RuleHandle {
        let r = &self.rules[rule];
        let kind = match &r.kind {
            RuleKind::Recursive(_) => {
                // the stub already builds its node on every evaluation
                if behaviour.kind == r.behaviour.kind && behaviour.token().is_some() {
                    behaviour.kind = BehaviourKind::Scanning;
                }
                RuleKind::Reference(rule)
            }
            other => other.clone(),
        };
        self.push(Rule {
            kind,
            behaviour,
            annotations,
        })
    }

    fn wrap(&mut self, rule: RuleHandle, behaviour: Behaviour) -> RuleHandle {
        self.push(Rule::new(RuleKind::Sequence(Rc::new([rule])), behaviour))
    }

    pub fn with_cardinality(&mut self, rule: RuleHandle, cardinality: Cardinality) -> RuleHandle {
        let r = &self.rules[rule];
        // a negated rule repeats its negated test, so the cardinality can be applied directly
        if r.behaviour.cardinality.is_one() && !r.behaviour.lookahead {
            let behaviour = r.behaviour.with_cardinality(cardinality);
            let annotations = r.annotations.clone();
            return self.instance(rule, behaviour, annotations);
        }
        self.wrap(rule, Behaviour::scanning().with_cardinality(cardinality))
    }
    pub fn optional(&mut self, rule: RuleHandle) -> RuleHandle {
        self.with_cardinality(rule, Cardinality::OPTIONAL)
    }
    pub fn zero_or_more(&mut self, rule: RuleHandle) -> RuleHandle {
        self.with_cardinality(rule, Cardinality::ZERO_OR_MORE)
    }
    pub fn one_or_more(&mut self, rule: RuleHandle) -> RuleHandle {
        self.with_cardinality(rule, Cardinality::ONE_OR_MORE)
    }

    /// Matches a single scalar wherever the rule doesn't match.
    pub fn negate(&mut self, rule: RuleHandle) -> RuleHandle {
        let r = &self.rules[rule];
        if r.has_plain_behaviour() {
            let behaviour = Behaviour {
                negated: true,
                ..r.behaviour
            };
            let annotations = r.annotations.clone();
            return self.instance(rule, behaviour, annotations);
        }
        let behaviour = Behaviour {
            negated: true,
            ..Behaviour::scanning()
        };
        self.wrap(rule, behaviour)
    }

    /// Matches without consuming.
    pub fn lookahead(&mut self, rule: RuleHandle) -> RuleHandle {
        let r = &self.rules[rule];
        if r.behaviour.lookahead {
            return rule;
        }
        let behaviour = Behaviour {
            lookahead: true,
            ..r.behaviour
        };
        let annotations = r.annotations.clone();
        self.instance(rule, behaviour, annotations)
    }

    /// Merges annotations into a new instance of the rule, `void`, `transient` and `token`
    /// also change its behaviour.
    pub fn annotate(&mut self, rule: RuleHandle, annotations: &Annotations) -> RuleHandle {
        let r = &self.rules[rule];
        let merged = Rc::new(r.annotations.merge(&annotations.without_behaviour()));
        let mut behaviour = r.behaviour;

        if annotations.is_void() {
            behaviour.kind = BehaviourKind::Skipping;
        } else if annotations.is_transient() {
            behaviour.kind = BehaviourKind::Scanning;
        } else if let Some(name) = annotations.token() {
            behaviour.kind = BehaviourKind::Structural(self.token(name));
        }

        self.instance(rule, behaviour, merged)
    }

    pub fn with_kind(&mut self, rule: RuleHandle, kind: BehaviourKind) -> RuleHandle {
        let r = &self.rules[rule];
        let behaviour = r.behaviour.with_kind(kind);
        let annotations = r.annotations.clone();
        self.instance(rule, behaviour, annotations)
    }
    pub fn structural(&mut self, rule: RuleHandle, token: TokenHandle) -> RuleHandle {
        self.with_kind(rule, BehaviourKind::Structural(token))
    }
    pub fn transient(&mut self, rule: RuleHandle) -> RuleHandle {
        self.with_kind(rule, BehaviourKind::Scanning)
    }
    pub fn void(&mut self, rule: RuleHandle) -> RuleHandle {
        self.with_kind(rule, BehaviourKind::Skipping)
    }

    pub fn display_rule(&self, rule: RuleHandle) -> RuleDisplay<'_> {
        RuleDisplay {
            grammar: self,
            rule,
        }
    }
}

pub struct RuleDisplay<'a> {
    grammar: &'a Grammar,
    rule: RuleHandle,
}

impl Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let grammar = self.grammar;
        let rule = grammar.get_rule(self.rule);
        let behaviour = &rule.behaviour;

        match behaviour.kind {
            BehaviourKind::Structural(token) => write!(f, "{} = ", grammar.token_name(token))?,
            BehaviourKind::Scanning => {}
            BehaviourKind::Skipping => f.write_str("@void ")?,
        }
        if behaviour.lookahead {
            f.write_str(">>")?;
        }
        if behaviour.negated {
            f.write_str("!")?;
        }
        match &rule.kind {
            RuleKind::Terminal(terminal) => match terminal {
                Terminal::Literal(text) => write!(f, "{text:?}")?,
                Terminal::Set(set) => write!(f, "[{set}]")?,
                Terminal::Regex(handle) => write!(f, "/{}/", grammar.regexes.pattern(*handle))?,
                Terminal::EndOfInput => f.write_str(".endOfInput")?,
                Terminal::Never => f.write_str("<never>")?,
            },
            RuleKind::Sequence(children) => write_children(f, children, " ")?,
            RuleKind::Choice(children) => write_children(f, children, " | ")?,
            RuleKind::Reference(target) => write!(f, "&{target}")?,
            RuleKind::Recursive(Some(surrogate)) => write!(f, "rec &{surrogate}")?,
            RuleKind::Recursive(None) => f.write_str("rec <unassigned>")?,
        }
        write!(f, "{}", behaviour.cardinality)
    }
}

fn write_children(
    f: &mut std::fmt::Formatter<'_>,
    children: &[RuleHandle],
    separator: &str,
) -> std::fmt::Result {
    f.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "&{child}")?;
    }
    f.write_str(")")
}
