//! Reference graph properties used to decide which declarations need recursive stubs.

use std::collections::{HashMap, HashSet};

use cranelift_entity::{EntitySet, SecondaryMap};
use kelp_runtime::{annotation::RcString, span::Span};

use crate::ast::{DeclHandle, Expr, ExprKind, File, Quantifier};

pub struct Analysis {
    pub resolved: HashMap<String, DeclHandle>,
    /// Every declaration referenced from the body, with the span of the first reference.
    pub references: SecondaryMap<DeclHandle, HashMap<DeclHandle, Span>>,
    /// Declarations which may be entered before the body consumes anything.
    pub prefix: SecondaryMap<DeclHandle, HashMap<DeclHandle, Span>>,
    pub nullable: EntitySet<DeclHandle>,
    pub recursive: EntitySet<DeclHandle>,
    pub left_recursive: EntitySet<DeclHandle>,
    /// Regex patterns which match the empty string, invalid patterns are left out.
    empty_regexes: HashSet<RcString>,
}

impl Analysis {
    pub fn new(file: &File) -> Analysis {
        let mut resolved = HashMap::new();
        for (handle, decl) in file.decls.iter() {
            // duplicates are reported by the compiler, the first declaration wins
            resolved.entry(decl.name.inner.to_string()).or_insert(handle);
        }

        let mut this = Analysis {
            resolved,
            references: SecondaryMap::new(),
            prefix: SecondaryMap::new(),
            nullable: EntitySet::new(),
            recursive: EntitySet::new(),
            left_recursive: EntitySet::new(),
            empty_regexes: HashSet::new(),
        };

        for decl in file.decls.values() {
            decl.body.visit(&mut |expr| {
                if let ExprKind::Regex(pattern) = &expr.kind {
                    if !this.empty_regexes.contains(pattern) && matches_empty(pattern) {
                        this.empty_regexes.insert(pattern.clone());
                    }
                }
            });
        }

        this.compute_nullable(file);
        for (handle, decl) in file.decls.iter() {
            let mut references = HashMap::new();
            decl.body.visit(&mut |expr| {
                if let Some(target) = this.resolve(expr) {
                    references.entry(target).or_insert(expr.span);
                }
            });
            this.references[handle] = references;

            let mut prefix = HashMap::new();
            this.collect_prefix(&decl.body, &mut prefix);
            this.prefix[handle] = prefix;
        }

        for handle in file.decls.keys() {
            if reaches(handle, handle, &this.references) {
                this.recursive.insert(handle);
            }
            if reaches(handle, handle, &this.prefix) {
                this.left_recursive.insert(handle);
            }
        }

        log::debug!(
            "{} recursive and {} left recursive declarations",
            file.decls.keys().filter(|&h| this.recursive.contains(h)).count(),
            file.decls.keys().filter(|&h| this.left_recursive.contains(h)).count(),
        );
        this
    }

    pub fn resolve(&self, expr: &Expr) -> Option<DeclHandle> {
        match &expr.kind {
            ExprKind::Ident(name) => self.resolved.get(&**name).copied(),
            _ => None,
        }
    }

    /// Whether the declaration is referenced by some other declaration.
    pub fn is_referenced(&self, handle: DeclHandle, file: &File) -> bool {
        file.decls
            .keys()
            .any(|other| other != handle && self.references[other].contains_key(&handle))
    }

    fn compute_nullable(&mut self, file: &File) {
        // fixed point, declarations only ever become nullable
        loop {
            let mut changed = false;
            for (handle, decl) in file.decls.iter() {
                if !self.nullable.contains(handle) && self.expr_nullable(&decl.body) {
                    self.nullable.insert(handle);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Whether the expression can succeed without consuming input.
    pub fn expr_nullable(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Ident(_) => self.resolve(expr).is_some_and(|h| self.nullable.contains(h)),
            ExprKind::Literal(text) => text.is_empty(),
            ExprKind::Range(..) | ExprKind::CharClass(_) | ExprKind::Not(_) => false,
            ExprKind::EndOfInput | ExprKind::Lookahead(_) => true,
            ExprKind::Regex(pattern) => self.empty_regexes.contains(pattern),
            ExprKind::Sequence(children) => children.iter().all(|c| self.expr_nullable(c)),
            ExprKind::Choice(children) => children.iter().any(|c| self.expr_nullable(c)),
            ExprKind::Repeat(inner, quantifier) => match quantifier {
                Quantifier::Optional | Quantifier::ZeroOrMore => true,
                Quantifier::OneOrMore => self.expr_nullable(inner),
            },
            ExprKind::Annotated(_, inner) => self.expr_nullable(inner),
            ExprKind::Error => false,
        }
    }

    /// Returns whether the expression always consumes input.
    fn collect_prefix(&self, expr: &Expr, rules: &mut HashMap<DeclHandle, Span>) -> bool {
        match &expr.kind {
            ExprKind::Ident(_) => {
                if let Some(handle) = self.resolve(expr) {
                    rules.entry(handle).or_insert(expr.span);
                }
                !self.expr_nullable(expr)
            }
            ExprKind::Sequence(children) => {
                for child in children {
                    if self.collect_prefix(child, rules) {
                        return true;
                    }
                }
                false
            }
            ExprKind::Choice(children) => {
                let mut all_true = true;
                for child in children {
                    all_true &= self.collect_prefix(child, rules);
                }
                all_true
            }
            ExprKind::Repeat(inner, quantifier) => {
                let consumes = self.collect_prefix(inner, rules);
                consumes && *quantifier == Quantifier::OneOrMore
            }
            // the negated expression is tested in place, a success consumes one scalar
            ExprKind::Not(inner) => {
                self.collect_prefix(inner, rules);
                true
            }
            ExprKind::Lookahead(inner) => {
                self.collect_prefix(inner, rules);
                false
            }
            ExprKind::Annotated(_, inner) => self.collect_prefix(inner, rules),
            _ => !self.expr_nullable(expr),
        }
    }

    /// Whether every way of matching the declaration re-enters it before consuming anything, and
    /// outside of an optional, lookahead or negated context.
    pub fn has_no_escape(&self, handle: DeclHandle, file: &File) -> bool {
        let mut visiting = HashSet::new();
        visiting.insert(handle);
        self.traps(&file.decls[handle].body, handle, file, &mut visiting)
    }

    fn traps(
        &self,
        expr: &Expr,
        target: DeclHandle,
        file: &File,
        visiting: &mut HashSet<DeclHandle>,
    ) -> bool {
        match &expr.kind {
            ExprKind::Ident(_) => {
                let Some(handle) = self.resolve(expr) else {
                    return false;
                };
                if handle == target || visiting.contains(&handle) {
                    return true;
                }
                // only follow declarations that lead back to the target
                if !reaches(handle, target, &self.prefix) {
                    return false;
                }
                visiting.insert(handle);
                let traps = self.traps(&file.decls[handle].body, target, file, visiting);
                visiting.remove(&handle);
                traps
            }
            ExprKind::Sequence(children) => {
                for child in children {
                    if self.traps(child, target, file, visiting) {
                        return true;
                    }
                    if !self.expr_nullable(child) {
                        return false;
                    }
                }
                false
            }
            ExprKind::Choice(children) => children
                .iter()
                .all(|c| self.traps(c, target, file, visiting)),
            ExprKind::Repeat(inner, Quantifier::OneOrMore) => self.traps(inner, target, file, visiting),
            ExprKind::Annotated(_, inner) => self.traps(inner, target, file, visiting),
            _ => false,
        }
    }
}

fn matches_empty(pattern: &str) -> bool {
    regex::Regex::new(&format!("^(?:{pattern})")).is_ok_and(|regex| regex.is_match(""))
}

/// Closed list traversal from the successors of `from`.
fn reaches(
    from: DeclHandle,
    to: DeclHandle,
    edges: &SecondaryMap<DeclHandle, HashMap<DeclHandle, Span>>,
) -> bool {
    let mut visited = EntitySet::new();
    let mut stack: Vec<DeclHandle> = edges[from].keys().copied().collect();
    while let Some(handle) = stack.pop() {
        if handle == to {
            return true;
        }
        if !visited.contains(handle) {
            visited.insert(handle);
            stack.extend(edges[handle].keys().copied());
        }
    }
    false
}
