use kelp_grammar::{compile, compile_with, ErrorAccumulator};
use rstest::rstest;

fn messages(src: &str) -> Vec<String> {
    match compile(src) {
        Ok(_) => panic!("grammar compiled without errors"),
        Err(errors) => errors.messages().map(str::to_owned).collect(),
    }
}

#[test]
fn diagnostics_carry_line_and_column() {
    let errors = compile("a = b").unwrap_err();
    assert_eq!(errors.errors.len(), 1);
    assert_eq!(errors.errors[0].to_string(), "1:5 Unknown rule `b`");

    let errors = compile("a = \"x\"\nb = .foo").unwrap_err();
    assert_eq!(errors.to_string(), "2:5 Unknown character set `.foo`");
}

#[rstest]
#[case("a = \"x\"\na = \"y\"", "Duplicate rule `a`")]
#[case(r#"a = "z"..."a""#, "Empty character range")]
#[case(r#"a = "ab"..."z""#, "Character range bounds must be single characters")]
#[case("a = /(/", "Invalid regex /(/")]
#[case("a: Number = \"1\"", "Unknown type `Number`, expected Int, Float, Bool or String")]
#[case("a = a \"x\"", "Left recursive rule `a` has no alternative which escapes the recursion")]
#[case("@error a = \"x\"", "Annotation @error expects a string")]
#[case("@pinned(\"yes\") a = \"x\"", "Annotation @pinned expects no value or a boolean")]
#[case("a = \"unterminated", "Expected closing quote")]
#[case("a = \"\\q\"", "Unknown character escape '\\q'")]
#[case("= \"x\"", "Expected a rule declaration `name = expression`")]
fn reported(#[case] src: &str, #[case] expected: &str) {
    let messages = messages(src);
    assert!(
        messages.iter().any(|m| m.contains(expected)),
        "{expected:?} not in {messages:?}"
    );
}

#[test]
fn errors_are_sorted_by_position() {
    let messages = messages("a = c\nb = .nope\nd = a | b | e");
    assert_eq!(
        messages,
        [
            "Unknown rule `c`",
            "Unknown character set `.nope`",
            "Unknown rule `e`",
        ]
    );
}

#[test]
fn warnings_do_not_fail_compilation() {
    let err = ErrorAccumulator::new();
    compile_with(
        r#"
        expr = expr "+" num | num
        num = .decimalDigit+
        "#,
        &err,
    );
    assert!(!err.has_errors());
    let warnings = err.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].inner.contains("left recursive"));
}
