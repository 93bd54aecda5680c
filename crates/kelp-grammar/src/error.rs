use std::{borrow::Cow, cell::RefCell, fmt::Display};

use kelp_runtime::span::{Span, Spanned};

pub type Error = Cow<'static, str>;

#[derive(Default)]
pub struct ErrorAccumulator {
    errors: RefCell<Vec<Spanned<Error>>>,
    warnings: RefCell<Vec<Spanned<Error>>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn error_static(&self, span: Span, err: &'static str) {
        self.errors
            .borrow_mut()
            .push(Spanned::new(err.into(), span));
    }
    pub fn error(&self, span: Span, err: impl ToString) {
        self.errors
            .borrow_mut()
            .push(Spanned::new(err.to_string().into(), span));
    }
    pub fn warning(&self, span: Span, warning: impl ToString) {
        let warning = warning.to_string();
        log::warn!("{warning}");
        self.warnings
            .borrow_mut()
            .push(Spanned::new(warning.into(), span));
    }
    pub fn get(&self) -> std::cell::Ref<'_, Vec<Spanned<Error>>> {
        self.errors.borrow()
    }
    pub fn warnings(&self) -> std::cell::Ref<'_, Vec<Spanned<Error>>> {
        self.warnings.borrow()
    }
    pub fn has_errors(&self) -> bool {
        !self.errors.borrow().is_empty()
    }
    pub fn clear(&self) {
        self.errors.borrow_mut().clear();
        self.warnings.borrow_mut().clear();
    }

    /// Errors in source order, resolved to lines and columns of `src`.
    pub fn diagnostics(&self, src: &str) -> Vec<Diagnostic> {
        let mut errors: Vec<_> = self
            .errors
            .borrow()
            .iter()
            .map(|e| Diagnostic::new(src, e.span, e.inner.to_string()))
            .collect();
        errors.sort_by_key(|d| d.span.start());
        errors
    }
}

/// 1-based line and column of a byte offset, columns count scalars.
pub fn line_column(src: &str, offset: u32) -> (usize, usize) {
    let offset = (offset as usize).min(src.len());
    let before = src.get(..offset).unwrap_or(src);
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let line = before.matches('\n').count() + 1;
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnostic {
    pub span: Span,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(src: &str, span: Span, message: String) -> Diagnostic {
        let (line, column) = line_column(src, span.start());
        Diagnostic {
            span,
            line,
            column,
            message,
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {}", self.line, self.column, self.message)
    }
}

/// Every error collected while compiling a grammar.
#[derive(thiserror::Error, Clone, Debug)]
#[error("{}", display_lines(.errors))]
pub struct CompileErrors {
    pub errors: Vec<Diagnostic>,
}

impl CompileErrors {
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|d| d.message.as_str())
    }
    pub fn contains(&self, message: &str) -> bool {
        self.messages().any(|m| m.contains(message))
    }
}

fn display_lines(errors: &[Diagnostic]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, (1, 1))]
    #[case(3, (1, 4))]
    #[case(4, (2, 1))]
    #[case(7, (2, 3))]
    #[case(100, (2, 3))]
    fn line_columns(#[case] offset: u32, #[case] expected: (usize, usize)) {
        assert_eq!(line_column("abc\ndé", offset), expected);
    }

    #[test]
    fn diagnostics_are_sorted() {
        let err = ErrorAccumulator::new();
        err.error(Span::at(5), "second");
        err.error_static(Span::at(0), "first");
        err.warning(Span::at(1), "ignored");

        let src = "a\nbc\nd";
        let diagnostics = err.diagnostics(src);
        let lines: Vec<_> = diagnostics.iter().map(ToString::to_string).collect();
        assert_eq!(lines, ["1:1 first", "3:1 second"]);
        assert_eq!(err.warnings().len(), 1);
    }
}
