pub mod analysis;
pub mod ast;
pub mod compile;
pub mod error;
pub mod lexer;
pub mod literal;
pub mod parser;

use kelp_runtime::grammar::Grammar;

use compile::SymbolTable;
pub use error::{CompileErrors, Diagnostic, ErrorAccumulator};

/// Compiles grammar source, collecting errors and warnings into `err`.
///
/// The returned grammar is only meaningful when no errors were reported.
pub fn compile_with(src: &str, err: &ErrorAccumulator) -> Grammar {
    let file = parser::parse_file(src, err);

    let mut table = SymbolTable::new(&file, err);
    table.build();
    table.resolve();
    table.validate();
    table.finish()
}

pub fn compile(src: &str) -> Result<Grammar, CompileErrors> {
    let err = ErrorAccumulator::new();
    let grammar = compile_with(src, &err);
    match err.has_errors() {
        true => Err(CompileErrors {
            errors: err.diagnostics(src),
        }),
        false => Ok(grammar),
    }
}
