use std::{fmt::Write, rc::Rc};

use crate::{
    annotation::{Annotations, RcString},
    cursor::LexicalContext,
    grammar::{Grammar, TokenHandle, ValueType},
    span::Span,
};

/// Node shape constructed by the tree builder.
pub trait TreeNode: Clone {
    fn leaf(
        token: TokenHandle,
        context: LexicalContext<'_>,
        annotations: &Rc<Annotations>,
        grammar: &Grammar,
    ) -> Self;
    /// Replaces the token of a lone child, `context` is the range matched by the parent.
    fn fold(
        token: TokenHandle,
        context: LexicalContext<'_>,
        child: Self,
        annotations: &Rc<Annotations>,
        grammar: &Grammar,
    ) -> Self;
    fn branch(
        token: TokenHandle,
        span: Span,
        children: Vec<Self>,
        annotations: &Rc<Annotations>,
        grammar: &Grammar,
    ) -> Self;

    fn token(&self) -> TokenHandle;
    fn span(&self) -> Span;
    fn is_pinned(&self) -> bool;
}

fn fold_annotations(child: &Rc<Annotations>, parent: &Rc<Annotations>) -> Rc<Annotations> {
    match (child.is_empty(), parent.is_empty()) {
        (_, true) => child.clone(),
        (true, false) => parent.clone(),
        (false, false) => Rc::new(child.merge(parent)),
    }
}

/// Homogeneous tree node, the matched text is recovered from the source through the span.
#[derive(Clone, PartialEq, Debug)]
pub struct Node {
    token: TokenHandle,
    span: Span,
    annotations: Rc<Annotations>,
    children: Vec<Node>,
}

impl Node {
    pub fn new(token: TokenHandle, span: Span, children: Vec<Node>) -> Node {
        Node {
            token,
            span,
            annotations: Rc::default(),
            children,
        }
    }
    pub fn token(&self) -> TokenHandle {
        self.token
    }
    pub fn span(&self) -> Span {
        self.span
    }
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
    pub fn children(&self) -> &[Node] {
        &self.children
    }
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
    pub fn matched<'a>(&self, source: &'a str) -> &'a str {
        self.span.as_str(source)
    }
    pub fn name<'g>(&self, grammar: &'g Grammar) -> &'g str {
        grammar.token_name(self.token)
    }
    pub fn child(&self, name: &str, grammar: &Grammar) -> Option<&Node> {
        self.children_named(name, grammar).next()
    }
    pub fn children_named<'s>(
        &'s self,
        name: &str,
        grammar: &Grammar,
    ) -> impl Iterator<Item = &'s Node> + 's {
        let token = grammar.lookup_token(name);
        self.children
            .iter()
            .filter(move |child| Some(child.token) == token)
    }

    pub fn display(&self, source: &str, grammar: &Grammar) -> String {
        let mut buf = String::new();
        self.display_into(&mut buf, source, grammar, 0);
        buf
    }

    pub fn display_into(&self, buf: &mut dyn Write, source: &str, grammar: &Grammar, indent: usize) {
        for _ in 0..indent {
            _ = buf.write_str("  ");
        }
        _ = write!(buf, "{} {}", self.name(grammar), self.span);
        if self.children.is_empty() {
            _ = write!(buf, " {:?}", self.matched(source));
        }
        if !self.annotations.is_empty() {
            _ = write!(buf, " {}", self.annotations);
        }
        _ = buf.write_char('\n');
        for child in &self.children {
            child.display_into(buf, source, grammar, indent + 1);
        }
    }
}

impl TreeNode for Node {
    fn leaf(
        token: TokenHandle,
        context: LexicalContext<'_>,
        annotations: &Rc<Annotations>,
        _grammar: &Grammar,
    ) -> Self {
        Node {
            token,
            span: context.span(),
            annotations: annotations.clone(),
            children: Vec::new(),
        }
    }
    fn fold(
        token: TokenHandle,
        _context: LexicalContext<'_>,
        child: Self,
        annotations: &Rc<Annotations>,
        _grammar: &Grammar,
    ) -> Self {
        Node {
            token,
            span: child.span,
            annotations: fold_annotations(&child.annotations, annotations),
            children: child.children,
        }
    }
    fn branch(
        token: TokenHandle,
        span: Span,
        children: Vec<Self>,
        annotations: &Rc<Annotations>,
        _grammar: &Grammar,
    ) -> Self {
        Node {
            token,
            span,
            annotations: annotations.clone(),
            children,
        }
    }
    fn token(&self) -> TokenHandle {
        self.token
    }
    fn span(&self) -> Span {
        self.span
    }
    fn is_pinned(&self) -> bool {
        self.annotations.is_pinned()
    }
}

#[derive(Clone, PartialEq, Debug)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(RcString),
    List(Vec<ValueNode>),
}

impl Value {
    /// Converts text to the declared type, falling back to text when it doesn't parse.
    pub fn convert(value_type: Option<ValueType>, text: &str) -> Value {
        let converted = match value_type {
            Some(ValueType::Int) => text.parse().ok().map(Value::Int),
            Some(ValueType::Float) => text.parse().ok().map(Value::Float),
            Some(ValueType::Bool) => match text {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            Some(ValueType::String) | None => Some(Value::Text(text.into())),
        };
        converted.unwrap_or_else(|| {
            log::debug!("Cannot convert {text:?} to {value_type:?}, keeping text");
            Value::Text(text.into())
        })
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(a) => Some(*a),
            _ => None,
        }
    }
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(a) => Some(*a),
            Value::Int(a) => Some(*a as f64),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(a) => Some(*a),
            _ => None,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(a) => Some(a),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[ValueNode]> {
        match self {
            Value::List(a) => Some(a),
            _ => None,
        }
    }
}

/// Heterogeneous tree node, leaves carry values converted according to their token's declared type.
#[derive(Clone, PartialEq, Debug)]
pub struct ValueNode {
    token: TokenHandle,
    span: Span,
    annotations: Rc<Annotations>,
    value: Value,
}

impl ValueNode {
    pub fn token(&self) -> TokenHandle {
        self.token
    }
    pub fn span(&self) -> Span {
        self.span
    }
    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }
    pub fn value(&self) -> &Value {
        &self.value
    }
    pub fn name<'g>(&self, grammar: &'g Grammar) -> &'g str {
        grammar.token_name(self.token)
    }
    pub fn children(&self) -> &[ValueNode] {
        self.value.as_list().unwrap_or(&[])
    }

    pub fn display(&self, grammar: &Grammar) -> String {
        let mut buf = String::new();
        self.display_into(&mut buf, grammar, 0);
        buf
    }

    pub fn display_into(&self, buf: &mut dyn Write, grammar: &Grammar, indent: usize) {
        for _ in 0..indent {
            _ = buf.write_str("  ");
        }
        _ = write!(buf, "{} {}", self.name(grammar), self.span);
        _ = match &self.value {
            Value::Bool(a) => write!(buf, " {a}"),
            Value::Int(a) => write!(buf, " {a}"),
            Value::Float(a) => write!(buf, " {a:?}"),
            Value::Text(a) => write!(buf, " {a:?}"),
            Value::List(_) => Ok(()),
        };
        _ = buf.write_char('\n');
        for child in self.children() {
            child.display_into(buf, grammar, indent + 1);
        }
    }
}

impl TreeNode for ValueNode {
    fn leaf(
        token: TokenHandle,
        context: LexicalContext<'_>,
        annotations: &Rc<Annotations>,
        grammar: &Grammar,
    ) -> Self {
        let value_type = grammar.token_info(token).value_type;
        ValueNode {
            token,
            span: context.span(),
            annotations: annotations.clone(),
            value: Value::convert(value_type, context.matched()),
        }
    }
    fn fold(
        token: TokenHandle,
        context: LexicalContext<'_>,
        child: Self,
        annotations: &Rc<Annotations>,
        grammar: &Grammar,
    ) -> Self {
        // a typed parent converts the text of a scalar child by its own type
        let value = match (grammar.token_info(token).value_type, child.value) {
            (Some(value_type), value) if !matches!(value, Value::List(_)) => {
                Value::convert(Some(value_type), context.slice(child.span))
            }
            (_, value) => value,
        };
        ValueNode {
            token,
            span: child.span,
            annotations: fold_annotations(&child.annotations, annotations),
            value,
        }
    }
    fn branch(
        token: TokenHandle,
        span: Span,
        children: Vec<Self>,
        annotations: &Rc<Annotations>,
        _grammar: &Grammar,
    ) -> Self {
        ValueNode {
            token,
            span,
            annotations: annotations.clone(),
            value: Value::List(children),
        }
    }
    fn token(&self) -> TokenHandle {
        self.token
    }
    fn span(&self) -> Span {
        self.span
    }
    fn is_pinned(&self) -> bool {
        self.annotations.is_pinned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(ValueType::Int), "42", Value::Int(42))]
    #[case(Some(ValueType::Int), "4x", Value::Text("4x".into()))]
    #[case(Some(ValueType::Float), "2.5", Value::Float(2.5))]
    #[case(Some(ValueType::Bool), "true", Value::Bool(true))]
    #[case(Some(ValueType::String), "12", Value::Text("12".into()))]
    #[case(None, "x", Value::Text("x".into()))]
    fn conversion(#[case] value_type: Option<ValueType>, #[case] text: &str, #[case] expected: Value) {
        assert_eq!(Value::convert(value_type, text), expected);
    }

    #[test]
    fn typed_fold_converts_child_text() {
        let mut grammar = Grammar::new();
        let digit = grammar.token("digit");
        let number = grammar.token("number");
        grammar.set_value_type(number, ValueType::Int);

        let source = "123";
        let cx = LexicalContext::new(source, Span::new(0, 3));
        let child = ValueNode::leaf(digit, cx, &Rc::default(), &grammar);
        assert_eq!(child.value(), &Value::Text("123".into()));

        let folded = ValueNode::fold(number, cx, child, &Rc::default(), &grammar);
        assert_eq!(folded.token(), number);
        assert_eq!(folded.value(), &Value::Int(123));
    }

    #[test]
    fn display() {
        let mut grammar = Grammar::new();
        let pair = grammar.token("pair");
        let key = grammar.token("key");
        let source = "a=b";
        let tree = Node::new(
            pair,
            Span::new(0, 3),
            vec![
                Node::new(key, Span::new(0, 1), vec![]),
                Node::new(key, Span::new(2, 3), vec![]),
            ],
        );
        assert_eq!(
            tree.display(source, &grammar),
            "pair 0..3\n  key 0..1 \"a\"\n  key 2..3 \"b\"\n"
        );
        assert_eq!(tree.children_named("key", &grammar).count(), 2);
        assert!(tree.child("value", &grammar).is_none());
    }
}
