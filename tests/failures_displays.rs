use lalr_toolkit::{Grammar, GrammarError, LexError, NotationError, ParseError, Parser, TokenSpec};

fn notation_error(src: &str) -> NotationError {
    match Grammar::parse(src) {
        Ok(g) => panic!("{src:?} was read as {g}"),
        Err(e) => e,
    }
}

#[test]
fn incomplete_rule() {
    let src = "Foo = A|";
    let err = notation_error(src);
    assert_eq!(err.to_string(), "unexpected end of input at 1:9");
    let report = err.report(src);
    assert!(report.contains("input ends here"), "{report}");
}

#[test]
fn invalid_syntax_rule() {
    let cases = [
        ("Foo = (A;", "unexpected ; \";\" at 1:9"),
        ("Foo = (?;", "unexpected ? \"?\" at 1:8"),
        ("Foo = A{};", "unexpected } \"}\" at 1:9"),
        ("Foo = A B @;", "unexpected ; \";\" at 1:12"),
    ];
    for (src, message) in cases {
        let err = notation_error(src);
        assert_eq!(err.to_string(), message, "{src}");
        let report = err.report(src);
        assert!(report.contains("not expected here"), "{report}");
    }
}

#[test]
fn invalid_start() {
    let cases = [
        ("'Hello' = A;", "quoted", 1),
        ("A? = A;", "?", 2),
        ("A* = A;", "*", 2),
        ("? = A;", "?", 1),
        ("A|B = A;", "|", 2),
    ];
    for (src, name, column) in cases {
        match notation_error(src) {
            NotationError::Parse(ParseError::UnexpectedToken {
                name: found,
                line: 1,
                column: found_column,
                ..
            }) => assert_eq!((found.as_str(), found_column), (name, column), "{src}"),
            other => panic!("{src}: {other:?}"),
        }
    }
}

#[test]
fn empty_input() {
    let g = Grammar::parse("  // nothing here\n").unwrap();
    assert!(g.is_empty());
    let err = Parser::new(&TokenSpec::new(), &g).unwrap_err();
    assert_eq!(err, GrammarError::Empty);
}

#[test]
fn unclosed_string() {
    let src = "A = 'Hello";
    let err = notation_error(src);
    assert_eq!(
        err,
        NotationError::Parse(ParseError::Lex(LexError {
            character: '\'',
            line: 1,
            column: 5,
            offset: 4
        }))
    );
    let report = err.report(src);
    assert!(report.contains("no token starts here"), "{report}");
}

#[test]
fn misplaced_alias() {
    let err = notation_error("A = x [y @Why];");
    assert_eq!(
        err.to_string(),
        "alias `@Why` in rule `A` is only allowed on a top-level alternative"
    );
    assert_eq!(err.report(""), err.to_string());
}

#[test]
fn grammar_errors_display() {
    let tokens = TokenSpec::new().pattern("x", "x");
    let cases = [
        ("A = x{3,2};", "invalid repetition bounds {3,2} in rule `A`"),
        ("A = x ()*;", "Repeat0 with an empty body in rule `A`"),
        (
            "S = A | B; A = x; B = x;",
            "reduce/reduce conflict on end of input: `A -> x` vs `B -> x`",
        ),
    ];
    for (src, message) in cases {
        match Parser::from_notation(&tokens, src) {
            Err(NotationError::Grammar(e)) => assert_eq!(e.to_string(), message, "{src}"),
            other => panic!("{src}: {other:?}"),
        }
    }

    let err = Parser::new(&TokenSpec::new().pattern("bad", "("), &Grammar::parse("A = bad;").unwrap())
        .unwrap_err();
    assert!(matches!(err, GrammarError::InvalidPattern { name, .. } if name == "bad"));
}

#[test]
fn parse_error_reports() {
    let tokens = TokenSpec::new().pattern("d", "[0-9]+").keyword("+");
    let parser = Parser::from_notation(&tokens, "Exp = Exp '+' d | d;").unwrap();

    let src = "1+2+";
    let err = parser.parse(src, |_, _| {}).unwrap_err();
    assert_eq!(err.position().map(|p| p.column), Some(5));
    assert!(err.report(src).contains("input ends here"));

    let src = "1+2 3";
    let err = parser.parse(src, |_, _| {}).unwrap_err();
    assert!(matches!(err, ParseError::Lex(LexError { character: ' ', column: 4, .. })));
    let report = err.report(src);
    assert!(report.contains("unexpected character ' ' at 1:4"), "{report}");
}
