//! Lowers a parsed grammar file into the executable rule graph.
//!
//! Declarations on a reference cycle are registered as recursive stubs before any body is
//! compiled, their bodies are compiled in [`SymbolTable::resolve`] and assigned as surrogates.
//! Everything else is compiled on demand, depth first.

use std::{collections::HashSet, rc::Rc};

use cranelift_entity::{EntitySet, SecondaryMap};
use kelp_runtime::{
    annotation::{AnnotationKey, AnnotationValue, Annotations, RcString},
    behaviour::{Behaviour, BehaviourKind},
    charset::{CharClass, CharSet},
    grammar::{Grammar, RuleHandle, TokenHandle, ValueType},
    span::Span,
};

use crate::{
    analysis::Analysis,
    ast::{Annotation, DeclHandle, Expr, ExprKind, File, Quantifier},
    error::ErrorAccumulator,
};

#[derive(Clone, Debug)]
pub struct Symbol {
    pub rule: RuleHandle,
    pub token: TokenHandle,
    pub recursive: bool,
    pub left_recursive: bool,
    pub referenced: bool,
}

pub struct SymbolTable<'a> {
    file: &'a File,
    err: &'a ErrorAccumulator,
    analysis: Analysis,
    grammar: Grammar,
    symbols: SecondaryMap<DeclHandle, Option<Symbol>>,
    duplicates: EntitySet<DeclHandle>,
    /// Stubs waiting for their surrogate.
    pending: Vec<(DeclHandle, RuleHandle)>,
    token_overrides: HashSet<RcString>,
}

impl<'a> SymbolTable<'a> {
    pub fn new(file: &'a File, err: &'a ErrorAccumulator) -> SymbolTable<'a> {
        let analysis = Analysis::new(file);

        let mut duplicates = EntitySet::new();
        for (handle, decl) in file.decls.iter() {
            if analysis.resolved.get(&*decl.name.inner) != Some(&handle) {
                err.error(
                    decl.name.span,
                    format_args!("Duplicate rule `{}`", decl.name.inner),
                );
                duplicates.insert(handle);
            }
        }

        SymbolTable {
            file,
            err,
            analysis,
            grammar: Grammar::new(),
            symbols: SecondaryMap::new(),
            duplicates,
            pending: Vec::new(),
            token_overrides: HashSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        let handle = *self.analysis.resolved.get(name)?;
        self.symbols[handle].as_ref()
    }

    /// Creates a symbol for every declaration.
    pub fn build(&mut self) {
        let file = self.file;
        for handle in file.decls.keys() {
            if !self.duplicates.contains(handle) {
                self.symbol(handle);
            }
        }
        log::debug!(
            "Built {} symbols, {} stubs pending",
            file.decls.len() - self.pending.len(),
            self.pending.len()
        );
    }

    /// Compiles the bodies of recursive declarations.
    pub fn resolve(&mut self) {
        let file = self.file;
        while let Some((handle, stub)) = self.pending.pop() {
            let body = self.compile_expr(&file.decls[handle].body);
            log::trace!("Assigning {body} to the stub of `{}`", file.decls[handle].name.inner);
            self.grammar.assign_surrogate(stub, body);
        }
    }

    pub fn validate(&mut self) {
        let file = self.file;
        for (handle, decl) in file.decls.iter() {
            let Some(symbol) = &self.symbols[handle] else {
                continue;
            };
            let name = &decl.name.inner;

            if self.grammar.get_rule(symbol.rule).is_stub()
                && self.grammar.surrogate(symbol.rule).is_none()
            {
                self.err
                    .error(decl.name.span, format_args!("Rule `{name}` was never resolved"));
            }

            if symbol.left_recursive {
                if self.analysis.has_no_escape(handle, file) {
                    self.err.error(
                        decl.name.span,
                        format_args!(
                            "Left recursive rule `{name}` has no alternative which escapes the recursion"
                        ),
                    );
                } else {
                    self.err.warning(
                        decl.name.span,
                        format_args!(
                            "Rule `{name}` is left recursive, its recursive alternatives never match at the start"
                        ),
                    );
                }
            }
        }
    }

    /// Picks the roots and hands out the grammar.
    pub fn finish(mut self) -> Grammar {
        let file = self.file;
        let mut roots = Vec::new();
        let mut last = None;
        for handle in file.decls.keys() {
            let Some(symbol) = &self.symbols[handle] else {
                continue;
            };
            last = Some(symbol.rule);
            if !symbol.referenced {
                roots.push(symbol.rule);
            }
        }
        if roots.is_empty() {
            roots.extend(last);
        }

        log::debug!("Grammar has {} rules and {} roots", self.grammar.rule_count(), roots.len());
        self.grammar.set_roots(roots);
        self.grammar
    }

    fn symbol(&mut self, handle: DeclHandle) -> RuleHandle {
        if let Some(symbol) = &self.symbols[handle] {
            return symbol.rule;
        }

        let file = self.file;
        let decl = &file.decls[handle];
        let token = self.grammar.token(&decl.name.inner);
        if let Some(value_type) = &decl.value_type {
            match ValueType::from_name(&value_type.inner) {
                Some(value_type) => self.grammar.set_value_type(token, value_type),
                None => self.err.error(
                    value_type.span,
                    format_args!(
                        "Unknown type `{}`, expected Int, Float, Bool or String",
                        value_type.inner
                    ),
                ),
            }
        }

        let annotations = self.annotations(&decl.annotations);
        let recursive = self.analysis.recursive.contains(handle);
        let rule = if recursive {
            let kind = self.declaration_kind(&annotations, token);
            let annotations = Rc::new(annotations.without_behaviour());
            let stub = self.grammar.recursive_stub(Behaviour::new(kind), annotations);
            self.pending.push((handle, stub));
            // registered before any body can refer back to it
            self.insert_symbol(handle, stub);
            stub
        } else {
            let body = self.compile_expr(&decl.body);
            let rule = self.grammar.structural(body, token);
            let rule = match annotations.is_empty() {
                true => rule,
                false => self.grammar.annotate(rule, &annotations),
            };
            self.insert_symbol(handle, rule);
            rule
        };

        self.grammar.define(&decl.name.inner, rule);
        rule
    }

    fn insert_symbol(&mut self, handle: DeclHandle, rule: RuleHandle) {
        let token = self
            .grammar
            .get_rule(rule)
            .behaviour
            .token()
            .unwrap_or(TokenHandle::TRANSIENT);
        self.symbols[handle] = Some(Symbol {
            rule,
            token,
            recursive: self.analysis.recursive.contains(handle),
            left_recursive: self.analysis.left_recursive.contains(handle),
            referenced: self.analysis.is_referenced(handle, self.file),
        });
    }

    fn declaration_kind(&mut self, annotations: &Annotations, token: TokenHandle) -> BehaviourKind {
        if annotations.is_void() {
            BehaviourKind::Skipping
        } else if annotations.is_transient() {
            BehaviourKind::Scanning
        } else if let Some(name) = annotations.token() {
            BehaviourKind::Structural(self.grammar.token(name))
        } else {
            BehaviourKind::Structural(token)
        }
    }

    fn annotations(&mut self, annotations: &[Annotation]) -> Annotations {
        let mut out = Annotations::new();
        for annotation in annotations {
            let label = &annotation.label.inner;
            let key = AnnotationKey::from_label(label);
            let value = &annotation.value.inner;

            let expected = match key {
                AnnotationKey::Error | AnnotationKey::Token => {
                    (!matches!(value, AnnotationValue::Str(_))).then_some("a string")
                }
                AnnotationKey::Void | AnnotationKey::Transient | AnnotationKey::Pinned => {
                    (!matches!(value, AnnotationValue::Set | AnnotationValue::Bool(_)))
                        .then_some("no value or a boolean")
                }
                AnnotationKey::Custom(_) => None,
            };
            if let Some(expected) = expected {
                self.err.error(
                    annotation.value.span,
                    format_args!("Annotation @{label} expects {expected}"),
                );
                continue;
            }

            if let (AnnotationKey::Token, AnnotationValue::Str(name)) = (&key, value) {
                self.check_token_override(name, annotation.value.span);
            }
            if out.insert(key, value.clone()).is_some() {
                log::debug!("Annotation @{label} given twice, the last one wins");
            }
        }
        out
    }

    /// Overridden tokens may collide with each other or with declared rules, the token is then
    /// shared.
    fn check_token_override(&mut self, name: &RcString, span: Span) {
        if self.analysis.resolved.contains_key(&**name) {
            self.err.warning(
                span,
                format_args!("Token `{name}` is shared with the rule of the same name"),
            );
        } else if !self.token_overrides.insert(name.clone()) {
            self.err.warning(
                span,
                format_args!("Token `{name}` is already produced by another annotation"),
            );
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> RuleHandle {
        match &expr.kind {
            ExprKind::Ident(name) => match self.analysis.resolve(expr) {
                Some(handle) => self.symbol(handle),
                None => {
                    self.err
                        .error(expr.span, format_args!("Unknown rule `{name}`"));
                    self.grammar.never()
                }
            },
            ExprKind::Literal(text) => self.grammar.literal(text),
            ExprKind::Range(start, end) => match self.grammar.char_range(*start, *end) {
                Ok(rule) => rule,
                Err(e) => {
                    self.err.error(expr.span, e);
                    self.grammar.never()
                }
            },
            ExprKind::CharClass(name) => match CharClass::from_name(name) {
                Some(class) => self.grammar.char_set(CharSet::class(class)),
                None => {
                    self.err
                        .error(expr.span, format_args!("Unknown character set `.{name}`"));
                    self.grammar.never()
                }
            },
            ExprKind::EndOfInput => self.grammar.end_of_input(),
            ExprKind::Regex(pattern) => match self.grammar.regex(pattern) {
                Ok(rule) => rule,
                Err(e) => {
                    self.err.error(expr.span, e);
                    self.grammar.never()
                }
            },
            ExprKind::Sequence(children) => {
                let children = children.iter().map(|c| self.compile_expr(c)).collect();
                self.grammar.sequence(children)
            }
            ExprKind::Choice(children) => {
                let children = children.iter().map(|c| self.compile_expr(c)).collect();
                self.grammar.choice(children)
            }
            ExprKind::Not(inner) => {
                let rule = self.compile_expr(inner);
                self.grammar.negate(rule)
            }
            ExprKind::Lookahead(inner) => {
                let rule = self.compile_expr(inner);
                self.grammar.lookahead(rule)
            }
            ExprKind::Repeat(inner, quantifier) => {
                let rule = self.compile_expr(inner);
                match quantifier {
                    Quantifier::Optional => self.grammar.optional(rule),
                    Quantifier::ZeroOrMore => self.grammar.zero_or_more(rule),
                    Quantifier::OneOrMore => self.grammar.one_or_more(rule),
                }
            }
            ExprKind::Annotated(annotations, inner) => {
                let rule = self.compile_expr(inner);
                let annotations = self.annotations(annotations);
                match annotations.is_empty() {
                    true => rule,
                    false => self.grammar.annotate(rule, &annotations),
                }
            }
            ExprKind::Error => self.grammar.never(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;

    fn table_for<'a>(file: &'a File, err: &'a ErrorAccumulator) -> SymbolTable<'a> {
        let mut table = SymbolTable::new(file, err);
        table.build();
        table.resolve();
        table.validate();
        table
    }

    #[test]
    fn stubs_only_for_recursive_rules() {
        let err = ErrorAccumulator::new();
        let file = parse_file(
            r#"
            list = "(" item* ")"
            item = list | .letter
            "#,
            &err,
        );
        let table = table_for(&file, &err);
        assert!(!err.has_errors());

        let list = table.get("list").unwrap();
        let item = table.get("item").unwrap();
        assert!(list.recursive && item.recursive);
        assert!(!list.left_recursive);
        assert!(table.grammar.get_rule(list.rule).is_stub());
        assert!(table.grammar.surrogate(list.rule).is_some());
        assert!(list.referenced && item.referenced);
    }

    #[test]
    fn roots_are_unreferenced_rules() {
        let err = ErrorAccumulator::new();
        let file = parse_file(
            r#"
            a = b
            b = "b"
            c = "c"
            "#,
            &err,
        );
        let table = table_for(&file, &err);
        let expected = [table.get("a").unwrap().rule, table.get("c").unwrap().rule];
        let grammar = table.finish();
        assert_eq!(grammar.roots(), expected);
    }

    #[test]
    fn last_rule_is_root_when_everything_is_referenced() {
        let err = ErrorAccumulator::new();
        let file = parse_file(r#"a = "x" b?  b = "y" a"#, &err);
        let table = table_for(&file, &err);
        let b = table.get("b").unwrap().rule;
        assert_eq!(table.finish().roots(), [b]);
    }

    #[test]
    fn token_overrides_are_shared() {
        let err = ErrorAccumulator::new();
        let file = parse_file(
            r#"
            pair = @token("key") .letter "=" value
            value = @token("key") .decimalDigit
            key = "k"
            "#,
            &err,
        );
        let _table = table_for(&file, &err);
        assert!(!err.has_errors());
        assert_eq!(err.warnings().len(), 2);
    }

    #[test]
    fn annotation_shapes() {
        let err = ErrorAccumulator::new();
        let file = parse_file(r#"a = @error(3) @pinned("x") @custom(1) "a""#, &err);
        let _table = table_for(&file, &err);
        let messages: Vec<_> = err.get().iter().map(|e| e.inner.to_string()).collect();
        assert_eq!(
            messages,
            [
                "Annotation @error expects a string",
                "Annotation @pinned expects no value or a boolean"
            ]
        );
    }
}
