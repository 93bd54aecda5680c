use cranelift_entity::{entity_impl, PrimaryMap};
use kelp_runtime::{
    annotation::{AnnotationValue, RcString},
    span::{Span, Spanned},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeclHandle(u32);
entity_impl!(DeclHandle, "decl");

#[derive(Default)]
pub struct File {
    pub decls: PrimaryMap<DeclHandle, RuleDecl>,
}

/// `annotation* identifier [: Type] = expression`
pub struct RuleDecl {
    pub annotations: Vec<Annotation>,
    pub name: Spanned<RcString>,
    pub value_type: Option<Spanned<RcString>>,
    pub body: Expr,
    pub span: Span,
}

/// `@label` or `@label(literal)`
#[derive(Clone, Debug)]
pub struct Annotation {
    pub label: Spanned<RcString>,
    pub value: Spanned<AnnotationValue>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Quantifier {
    Optional,
    ZeroOrMore,
    OneOrMore,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Ident(RcString),
    Literal(RcString),
    Range(char, char),
    CharClass(RcString),
    EndOfInput,
    Regex(RcString),
    Sequence(Vec<Expr>),
    Choice(Vec<Expr>),
    Not(Box<Expr>),
    Lookahead(Box<Expr>),
    Repeat(Box<Expr>, Quantifier),
    Annotated(Vec<Annotation>, Box<Expr>),
    /// Placeholder for an expression which failed to parse.
    Error,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Expr {
        Expr { kind, span }
    }
    pub fn error(span: Span) -> Expr {
        Expr::new(ExprKind::Error, span)
    }

    /// Preorder traversal.
    pub fn visit(&self, fun: &mut dyn FnMut(&Expr)) {
        fun(self);
        match &self.kind {
            ExprKind::Sequence(children) | ExprKind::Choice(children) => {
                for child in children {
                    child.visit(fun);
                }
            }
            ExprKind::Not(inner)
            | ExprKind::Lookahead(inner)
            | ExprKind::Repeat(inner, _)
            | ExprKind::Annotated(_, inner) => inner.visit(fun),
            _ => {}
        }
    }
}

impl File {
    pub fn decl_named(&self, name: &str) -> Option<DeclHandle> {
        self.decls
            .iter()
            .find(|(_, decl)| &*decl.name.inner == name)
            .map(|(handle, _)| handle)
    }
}
