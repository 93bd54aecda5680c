use std::{
    fmt::Display,
    path::{Path, PathBuf},
    process::ExitCode,
    str::FromStr,
    time::Instant,
};

use anyhow::Context;
use clap::Parser as _;
use kelp_grammar::{compile_with, error::line_column, ErrorAccumulator};
use kelp_runtime::{
    charset::{CharClass, CharSet},
    error::ParseError,
    grammar::Grammar,
    ir::Tee,
    node::{Node, TreeNode, ValueNode},
    parser::{ParseOptions, Parser},
    stream::{StreamToken, TokenStream},
    trace::Trace,
    tree::TreeBuilder,
};

/// Parses a file with a grammar and prints the resulting tree.
#[derive(clap::Parser)]
#[command(name = "kelp", version)]
struct Args {
    /// Grammar file
    grammar: PathBuf,
    /// File to parse
    input: PathBuf,
    /// Print the outermost tokens instead of the tree
    #[arg(long)]
    tokens: bool,
    /// Print every rule evaluation before the tree
    #[arg(long)]
    trace: bool,
    /// Print the tree with values converted to the declared types
    #[arg(long, conflicts_with = "tokens")]
    values: bool,
    /// Skip whitespace and newlines before every rule
    #[arg(long)]
    skip_whitespace: bool,
    /// Cache rule results by position, the tree is unaffected
    #[arg(long, conflicts_with = "tokens")]
    memoize: bool,
    /// Start from this rule instead of the unreferenced ones
    #[arg(long, value_name = "NAME")]
    root: Option<String>,
    /// Print how long each phase took
    #[arg(long)]
    bench: bool,
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    iters: u32,
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging() {
        eprintln!("{e:#}");
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() -> anyhow::Result<()> {
    let level = match std::env::var("RUST_LOG") {
        Ok(level) => log::LevelFilter::from_str(&level)
            .with_context(|| format!("Invalid log level `{level}` in RUST_LOG"))?,
        Err(_) => log::LevelFilter::Warn,
    };

    simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )?;
    Ok(())
}

pub struct UnitPrinter {
    value: f64,
    /// Largest unit first.
    suffixes: &'static [(&'static str, f64)],
}

#[allow(non_upper_case_globals)]
impl UnitPrinter {
    fn bytes(value: f64) -> Self {
        const KiB: f64 = 1.0 / 1024.0;
        Self {
            value,
            suffixes: &[("MiB", KiB * KiB), ("KiB", KiB), ("B", 1.0)],
        }
    }
    fn seconds(value: f64) -> Self {
        const ms: f64 = 1000.0;
        Self {
            value,
            suffixes: &[
                ("s", 1.0),
                ("ms", ms),
                ("µs", ms * ms),
                ("ns", ms * ms * ms),
            ],
        }
    }
}

impl Display for UnitPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scaled = self
            .suffixes
            .iter()
            .map(|&(name, factor)| (self.value * factor, name));

        let mut best = None;
        for (value, name) in scaled {
            best = Some((value, name));
            if value >= 1.0 {
                break;
            }
        }

        match best {
            Some((value, suffix)) => write!(f, "{value:.2} {suffix}"),
            None => write!(f, "{:.2}", self.value),
        }
    }
}

/// Times phases over one file and reports diagnostics with its line and column.
pub struct PhaseRunner<'a> {
    src: &'a str,
    file: &'a Path,
    do_bench: bool,
    iters: u32,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(src: &'a str, file: &'a Path, do_bench: bool, iters: u32) -> PhaseRunner<'a> {
        PhaseRunner {
            src,
            file,
            do_bench,
            iters: iters.max(1),
        }
    }
    pub fn run<F: FnMut() -> T, T>(&self, name: &str, mut fun: F) -> T {
        let start = Instant::now();
        let mut output = fun();
        for _ in 1..self.iters {
            output = fun();
        }
        let elapsed = (start.elapsed() / self.iters).as_secs_f64();

        if self.do_bench {
            let throughput = UnitPrinter::bytes((self.src.len() as f64) / elapsed);
            let time = UnitPrinter::seconds(elapsed);
            eprintln!("{name}\t {time}\t {throughput}/s");
        }
        output
    }
    pub fn report(&self, offset: Option<u32>, message: impl Display) {
        let file = self.file.display();
        match offset {
            Some(offset) => {
                let (line, column) = line_column(self.src, offset);
                eprintln!("{file}:{line}:{column} {message}");
            }
            None => eprintln!("{file}: {message}"),
        }
    }
}

fn run(args: &Args) -> anyhow::Result<bool> {
    let grammar_src = std::fs::read_to_string(&args.grammar)
        .with_context(|| format!("Failed to read grammar `{}`", args.grammar.display()))?;
    let input = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input `{}`", args.input.display()))?;

    let compiler = PhaseRunner::new(&grammar_src, &args.grammar, args.bench, args.iters);
    let err = ErrorAccumulator::new();
    let mut grammar = compiler.run("compile", || {
        err.clear();
        compile_with(&grammar_src, &err)
    });

    for warning in err.warnings().iter() {
        compiler.report(
            Some(warning.span.start()),
            format_args!("warning: {}", warning.inner),
        );
    }
    if err.has_errors() {
        let file = args.grammar.display();
        for diagnostic in err.diagnostics(&grammar_src) {
            eprintln!("{file}:{diagnostic}");
        }
        return Ok(false);
    }

    if let Some(name) = &args.root {
        let root = grammar
            .named(name)
            .with_context(|| format!("Grammar has no rule named `{name}`"))?;
        grammar.set_roots(vec![root]);
    }

    let options = ParseOptions {
        skip: args
            .skip_whitespace
            .then(|| CharSet::class(CharClass::WhitespaceOrNewline)),
        memoize: args.memoize,
    };
    let parser = PhaseRunner::new(&input, &args.input, args.bench, args.iters);

    let errors = if args.tokens {
        let (tokens, errors) = parser.run("tokens", || tokenize(&grammar, &input, &options));
        for StreamToken { token, span } in tokens {
            println!("{} {span} {:?}", grammar.token_name(token), span.as_str(&input));
        }
        errors
    } else if args.values {
        let (trace, tree, errors) =
            parser.run("parse", || parse::<ValueNode>(&grammar, &input, &options, args.trace));
        print!("{trace}");
        if let Some(tree) = tree {
            print!("{}", tree.display(&grammar));
        }
        errors
    } else {
        let (trace, tree, errors) =
            parser.run("parse", || parse::<Node>(&grammar, &input, &options, args.trace));
        print!("{trace}");
        if let Some(tree) = tree {
            print!("{}", tree.display(&input, &grammar));
        }
        errors
    };

    for error in &errors {
        parser.report(error.position(), error);
    }
    Ok(errors.is_empty())
}

fn tokenize(
    grammar: &Grammar,
    input: &str,
    options: &ParseOptions,
) -> (Vec<StreamToken>, Vec<ParseError>) {
    let mut stream = TokenStream::new(grammar, input, options);
    let tokens = stream.by_ref().collect();

    let mut errors = stream.errors().to_vec();
    if let Some(position) = stream.stopped_at() {
        errors.push(ParseError::UnexpectedInput { position });
    }
    (tokens, errors)
}

/// Unlike [`kelp_runtime::build`] the tree is kept even when errors were recorded.
fn parse<N: TreeNode>(
    grammar: &Grammar,
    input: &str,
    options: &ParseOptions,
    trace: bool,
) -> (String, Option<N>, Vec<ParseError>) {
    let mut builder = TreeBuilder::<N>::new();
    if options.memoize {
        builder = builder.with_memoization();
    }

    let mut parser = Parser::new(grammar, input, options);
    let (builder, trace, outcome) = match trace {
        true => {
            let mut tee = Tee::new(builder, Trace::new());
            let outcome = parser.run(&mut tee);
            let (builder, trace) = tee.into_inner();
            (builder, trace.into_string(), outcome)
        }
        false => {
            let outcome = parser.run(&mut builder);
            (builder, String::new(), outcome)
        }
    };

    let (tree, errors) = builder.finish(grammar, outcome);
    (trace, tree, errors)
}
