use kelp_grammar::compile;
use kelp_runtime::{
    build,
    charset::{CharClass, CharSet},
    de::from_node,
    error::ParseError,
    grammar::Grammar,
    node::{Node, Value, ValueNode},
    parser::ParseOptions,
    stream::TokenStream,
};
use rstest::rstest;

fn grammar(src: &str) -> Grammar {
    match compile(src) {
        Ok(grammar) => grammar,
        Err(errors) => panic!("grammar failed to compile:\n{errors}"),
    }
}

fn tree(grammar: &Grammar, source: &str) -> String {
    let tree: Node = match build(grammar, source, &ParseOptions::default()) {
        Ok(tree) => tree,
        Err(errors) => panic!("{source:?} failed to parse:\n{errors}"),
    };
    tree.display(source, grammar)
}

#[test]
fn single_child_folds_into_parent() {
    let grammar = grammar(
        r#"
        a = b
        b = "x"
        "#,
    );
    assert_eq!(tree(&grammar, "x"), "a 0..1 \"x\"\n");
}

#[test]
fn repeated_reference_is_one_node() {
    let grammar = grammar(
        r#"
        digit = .decimalDigit
        number = digit+
        "#,
    );
    let source = "123";
    let tree: Node = build(&grammar, source, &ParseOptions::default()).unwrap();
    assert_eq!(tree.name(&grammar), "number");
    assert_eq!(tree.span().start(), 0);
    assert_eq!(tree.span().end(), 3);
    assert_eq!(tree.matched(source), "123");
    assert!(tree.children().is_empty());
}

#[test]
fn quantifier_boundaries() {
    let star = grammar("a = b* \"y\"  b = \"x\"");
    assert_eq!(tree(&star, "y"), "a 0..1 \"y\"\n");

    let plus = grammar("a = b+ \"y\"  b = \"x\"");
    let errors = build::<Node>(&plus, "y", &ParseOptions::default()).unwrap_err();
    assert_eq!(
        errors.0,
        [
            ParseError::UnexpectedInput { position: 0 },
            ParseError::NoNodesCreated
        ]
    );
}

#[test]
fn left_recursion_with_escape() {
    let grammar = grammar(
        r#"
        expr = expr "+" term | term
        term = .decimalDigit
        "#,
    );
    assert_eq!(tree(&grammar, "1"), "expr 0..1 \"1\"\n");
}

#[test]
fn error_annotations_are_reported_once() {
    let grammar = grammar(
        r#"
        s = x "1" | x "2"
        x = @error("expected x") "a"
        "#,
    );
    let errors = build::<Node>(&grammar, "b", &ParseOptions::default()).unwrap_err();
    assert_eq!(
        errors.0,
        [
            ParseError::Annotated {
                position: 0,
                message: "expected x".into()
            },
            ParseError::UnexpectedInput { position: 0 },
            ParseError::NoNodesCreated,
        ]
    );
}

#[test]
fn void_rules_leave_no_nodes() {
    let grammar = grammar(
        r#"
        pair = key ws? "=" ws? value
        key = .letter+
        value = .decimalDigit+
        @void ws = " "+
        "#,
    );
    assert_eq!(
        tree(&grammar, "ab = 12"),
        "pair 0..7\n  key 0..2 \"ab\"\n  value 5..7 \"12\"\n"
    );
}

#[test]
fn lookahead_does_not_consume() {
    let grammar = grammar(
        r#"
        stmt = kw " " name
        kw = "if" >>" "
        name = .letter+
        "#,
    );
    assert_eq!(
        tree(&grammar, "if x"),
        "stmt 0..4\n  kw 0..2 \"if\"\n  name 3..4 \"x\"\n"
    );
}

#[rstest]
#[case(r#"line = (!"\n")* "\n""#, "ab\n", "line 0..3 \"ab\\n\"\n")]
#[case(r#"ident = /[a-z_][a-z0-9_]*/"#, "foo_1", "ident 0..5 \"foo_1\"\n")]
#[case(r#"hex = ("0"..."9" | "a"..."f")+"#, "1f", "hex 0..2 \"1f\"\n")]
#[case(r#"@token("word") w = .letter+"#, "abc", "word 0..3 \"abc\"\n")]
#[case(r#"@token("word") @doc w = .letter+"#, "abc", "word 0..3 \"abc\" @doc\n")]
#[case(r#"end = "a" .endOfInput"#, "a", "end 0..1 \"a\"\n")]
fn terminals(#[case] grammar_src: &str, #[case] source: &str, #[case] expected: &str) {
    let grammar = grammar(grammar_src);
    assert_eq!(tree(&grammar, source), expected);
}

#[test]
fn skipped_whitespace() {
    let grammar = grammar(
        r#"
        sum = num "+" num
        num = .decimalDigit+
        "#,
    );
    let options = ParseOptions::skipping(CharSet::class(CharClass::Whitespace));
    let source = "1 + 2";
    let tree: Node = build(&grammar, source, &options).unwrap();
    assert_eq!(
        tree.display(source, &grammar),
        "sum 0..5\n  num 0..1 \"1\"\n  num 4..5 \"2\"\n"
    );
}

#[test]
fn memoized_parse_is_identical() {
    let grammar = grammar(
        r#"
        expr = term "+" expr | term "-" expr | term
        term = .decimalDigit+
        "#,
    );
    let source = "1-22+3";
    let plain: Node = build(&grammar, source, &ParseOptions::default()).unwrap();
    let options = ParseOptions {
        memoize: true,
        ..ParseOptions::default()
    };
    let memoized: Node = build(&grammar, source, &options).unwrap();
    assert_eq!(plain, memoized);
}

#[test]
fn memoization_respects_recursion_guard() {
    // `b` only matches "1y" when it is not entered from inside `a`, so a result
    // computed under the guard must not be replayed outside of it
    let grammar = grammar(
        r#"
        s = a "z" | b
        a = b "x" | "1"
        b = a "y" | "1"
        "#,
    );
    let source = "1y";
    let plain = tree(&grammar, source);
    let options = ParseOptions {
        memoize: true,
        ..ParseOptions::default()
    };
    let memoized: Node = match build(&grammar, source, &options) {
        Ok(tree) => tree,
        Err(errors) => panic!("memoized parse failed:\n{errors}"),
    };
    assert_eq!(memoized.display(source, &grammar), plain);
}

#[test]
fn repeated_recursive_rule_hoists_its_nodes() {
    let mut grammar = grammar(
        r#"
        list = "(" item* ")"
        item = list | .letter
        "#,
    );
    let list = grammar.named("list").unwrap();
    grammar.set_roots(vec![list]);
    assert_eq!(
        tree(&grammar, "(ab)"),
        "list 0..4\n  item 1..2 \"a\"\n  item 2..3 \"b\"\n"
    );
}

#[test]
fn typed_values() {
    let grammar = grammar(
        r#"
        list = number ("," number)*
        number: Int = .decimalDigit+
        "#,
    );
    let tree: ValueNode = build(&grammar, "1,22", &ParseOptions::default()).unwrap();
    let values: Vec<_> = tree.children().iter().map(|n| n.value().clone()).collect();
    assert_eq!(values, [Value::Int(1), Value::Int(22)]);
}

#[test]
fn decode_into_struct() {
    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct Pair {
        key: String,
        value: u32,
    }

    let grammar = grammar(
        r#"
        pair = key "=" value
        key = .letter+
        value = .decimalDigit+
        "#,
    );
    let source = "abc=42";
    let tree: Node = build(&grammar, source, &ParseOptions::default()).unwrap();
    let pair: Pair = from_node(&tree, source, &grammar).unwrap();
    assert_eq!(
        pair,
        Pair {
            key: "abc".to_owned(),
            value: 42
        }
    );
}

#[test]
fn token_stream() {
    let grammar = grammar(
        r#"
        word = .letter+
        number = .decimalDigit+
        "#,
    );
    let options = ParseOptions::skipping(CharSet::class(CharClass::Whitespace));
    let source = "ab 12 c";
    let tokens: Vec<_> = TokenStream::new(&grammar, source, &options)
        .map(|t| (grammar.token_name(t.token), t.span.as_str(source)))
        .collect();
    assert_eq!(tokens, [("word", "ab"), ("number", "12"), ("word", "c")]);
}
