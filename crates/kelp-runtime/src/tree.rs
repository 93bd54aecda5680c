use std::{collections::HashMap, rc::Rc};

use crate::{
    annotation::Annotations,
    behaviour::BehaviourKind,
    cursor::LexicalContext,
    error::{ErrorLog, ParseError, ParseErrors},
    grammar::{Grammar, RuleHandle, TokenHandle},
    ir::{IntermediateRepresentation, IrCheckpoint, MatchResult, Site},
    node::TreeNode,
    parser::{ParseOptions, Parser, RunOutcome},
    span::Span,
};

/// Stack of scopes, each collecting the nodes produced while one rule is evaluated.
pub struct NodeStack<N> {
    scopes: Vec<Vec<N>>,
}

impl<N> Default for NodeStack<N> {
    fn default() -> Self {
        NodeStack::new()
    }
}

impl<N> NodeStack<N> {
    pub fn new() -> NodeStack<N> {
        NodeStack {
            scopes: vec![Vec::new()],
        }
    }
    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }
    #[track_caller]
    pub fn pop_scope(&mut self) -> Vec<N> {
        assert!(self.scopes.len() > 1, "Popped the base scope");
        self.scopes.pop().unwrap_or_default()
    }
    pub fn top(&self) -> &[N] {
        self.scopes.last().map_or(&[], Vec::as_slice)
    }
    pub fn top_mut(&mut self) -> &mut Vec<N> {
        if self.scopes.is_empty() {
            self.scopes.push(Vec::new());
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }
    pub fn truncate_top(&mut self, len: usize) {
        self.top_mut().truncate(len);
    }
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.scopes.push(Vec::new());
    }
    /// Takes the nodes of the base scope, any unclosed scopes are discarded.
    pub fn take_base(&mut self) -> Vec<N> {
        self.scopes.truncate(1);
        self.scopes
            .first_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

struct MemoEntry<'a, N> {
    result: MatchResult<'a>,
    nodes: Vec<N>,
}

/// Builds a tree of `N` from evaluation events.
pub struct TreeBuilder<'a, N> {
    source: &'a str,
    stack: NodeStack<N>,
    errors: ErrorLog,
    /// Packrat cache, nodes produced at a key are replayed on a hit.
    memo: Option<HashMap<(RuleHandle, u32), MemoEntry<'a, N>>>,
    /// Positions of the rules currently being evaluated, `None` for results which must not be
    /// cached. Only tracked when memoizing.
    positions: Vec<Option<u32>>,
}

impl<'a, N: TreeNode> Default for TreeBuilder<'a, N> {
    fn default() -> Self {
        TreeBuilder::new()
    }
}

impl<'a, N: TreeNode> TreeBuilder<'a, N> {
    pub fn new() -> TreeBuilder<'a, N> {
        TreeBuilder {
            source: "",
            stack: NodeStack::new(),
            errors: ErrorLog::default(),
            memo: None,
            positions: Vec::new(),
        }
    }
    pub fn with_memoization(mut self) -> TreeBuilder<'a, N> {
        self.memo = Some(HashMap::new());
        self
    }

    pub fn errors(&self) -> &[ParseError] {
        self.errors.errors()
    }

    /// Returns the tree along with every recorded error, the tree may be partial.
    pub fn finish(mut self, grammar: &Grammar, outcome: RunOutcome) -> (Option<N>, Vec<ParseError>) {
        let mut errors = self.errors.take();
        if !outcome.consumed_all {
            errors.push(ParseError::UnexpectedInput {
                position: outcome.position,
            });
        }

        let mut nodes = self.stack.take_base();
        let tree = match nodes.len() {
            0 => {
                errors.push(ParseError::NoNodesCreated);
                None
            }
            1 => nodes.pop(),
            _ => {
                let span = cover(&nodes).unwrap_or_default();
                Some(N::branch(
                    TokenHandle::ROOT,
                    span,
                    nodes,
                    &Rc::default(),
                    grammar,
                ))
            }
        };

        (tree, errors)
    }

    fn make_node(
        &self,
        token: TokenHandle,
        context: LexicalContext<'a>,
        mut children: Vec<N>,
        annotations: &Rc<Annotations>,
        grammar: &Grammar,
    ) -> N {
        if children.is_empty() {
            return N::leaf(token, context, annotations, grammar);
        }
        if children.len() == 1 && !children[0].is_pinned() && !annotations.is_pinned() {
            if let Some(child) = children.pop() {
                return N::fold(token, context, child, annotations, grammar);
            }
        }
        let span = cover(&children).unwrap_or(context.span());
        N::branch(token, span, children, annotations, grammar)
    }
}

fn cover<N: TreeNode>(nodes: &[N]) -> Option<Span> {
    nodes.iter().map(N::span).reduce(Span::cover)
}

impl<'a, N: TreeNode> IntermediateRepresentation<'a> for TreeBuilder<'a, N> {
    fn will_build_from(&mut self, source: &'a str, _grammar: &Grammar) {
        self.reset_state();
        self.source = source;
    }

    fn will_evaluate(
        &mut self,
        _grammar: &Grammar,
        rule: RuleHandle,
        site: Site,
    ) -> Option<MatchResult<'a>> {
        if let Some(memo) = &self.memo {
            let key = (rule, site.position);
            if let (true, Some(entry)) = (site.cacheable, memo.get(&key)) {
                log::trace!("Memo hit for {rule} at {}", site.position);
                self.stack.top_mut().extend(entry.nodes.iter().cloned());
                return Some(entry.result);
            }
            self.positions.push(site.cacheable.then_some(site.position));
        }
        self.stack.push_scope();
        None
    }

    fn did_evaluate(&mut self, grammar: &Grammar, rule: RuleHandle, result: MatchResult<'a>) {
        let r = grammar.get_rule(rule);
        let behaviour = &r.behaviour;
        let children = self.stack.pop_scope();
        let parent_len = self.stack.top().len();

        match result {
            MatchResult::Failure(position) => {
                if let Some(message) = r.annotations.error() {
                    self.errors.report(position, message);
                }
            }
            MatchResult::IgnoreFailure(position) => {
                if let (Some(token), true) = (behaviour.token(), r.annotations.is_pinned()) {
                    let context = LexicalContext::empty_at(self.source, position);
                    let node = N::leaf(token, context, &r.annotations, grammar);
                    self.stack.top_mut().push(node);
                }
            }
            MatchResult::Consume(_) => {}
            MatchResult::Success(_) if behaviour.lookahead => {}
            MatchResult::Success(context) => match behaviour.kind {
                BehaviourKind::Structural(token) => {
                    let node = match behaviour.negated {
                        true => N::leaf(token, context, &r.annotations, grammar),
                        false => self.make_node(token, context, children, &r.annotations, grammar),
                    };
                    self.stack.top_mut().push(node);
                }
                BehaviourKind::Scanning if !behaviour.negated => {
                    self.stack.top_mut().extend(children);
                }
                BehaviourKind::Scanning | BehaviourKind::Skipping => {}
            },
        }

        if let Some(memo) = &mut self.memo {
            if let Some(Some(position)) = self.positions.pop() {
                let nodes = self.stack.top()[parent_len..].to_vec();
                memo.insert((rule, position), MemoEntry { result, nodes });
            }
        }
    }

    fn reset_state(&mut self) {
        self.stack.reset();
        self.errors.clear();
        self.positions.clear();
        if let Some(memo) = &mut self.memo {
            memo.clear();
        }
    }

    fn checkpoint(&self) -> IrCheckpoint {
        IrCheckpoint(self.stack.top().len())
    }

    fn restore(&mut self, checkpoint: IrCheckpoint) {
        self.stack.truncate_top(checkpoint.0);
    }
}

/// Parses the source into a tree, which is returned only if no errors were recorded.
pub fn build<N: TreeNode>(
    grammar: &Grammar,
    source: &str,
    options: &ParseOptions,
) -> Result<N, ParseErrors> {
    let mut builder = TreeBuilder::<N>::new();
    if options.memoize {
        builder = builder.with_memoization();
    }

    let mut parser = Parser::new(grammar, source, options);
    let outcome = parser.run(&mut builder);
    let (tree, errors) = builder.finish(grammar, outcome);

    match tree {
        Some(tree) if errors.is_empty() => Ok(tree),
        _ => Err(ParseErrors(errors)),
    }
}
