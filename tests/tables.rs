use lalr_toolkit::{
    CompiledTable, Config, Grammar, Matcher, ParseError, Parser, TableDump, TableError, TokenSpec,
};
use proptest::prelude::*;

const ARITHMETIC: &str = "
Exp  = Exp '+' Term @Sum | Term;
Term = Term '*' F @Product | F;
F    = '(' Exp ')' @_ | d | '-' d @Negative;
";

fn tokens() -> TokenSpec {
    TokenSpec::new()
        .pattern("d", "[0-9]+")
        .keywords(["+", "*", "(", ")", "-"])
        .pattern("sp", r"\s+")
}

fn compiled() -> Parser {
    let _ = env_logger::builder().is_test(true).try_init();
    let grammar = Grammar::parse(ARITHMETIC).unwrap();
    let config = Config {
        skip: vec!["sp".into()],
        ..Config::default()
    };
    Parser::with_config(&tokens(), &grammar, &config).unwrap()
}

fn trace(parser: &Parser, text: &str) -> Result<Vec<String>, ParseError> {
    let mut seen = vec![];
    parser.parse(text, |name, tokens| {
        let texts: Vec<_> = tokens.iter().map(|t| t.text.unwrap_or(t.name)).collect();
        seen.push(format!("{name}({})", texts.join(" ")));
    })?;
    Ok(seen)
}

#[test]
fn restored_tables_parse_identically() {
    let parser = compiled();
    let json = parser.dump().unwrap().to_json().unwrap();

    let dump = TableDump::from_json(&json).unwrap();
    let matcher = Matcher::new(&tokens(), true).unwrap();
    let restored = Parser::restore(matcher, &dump).unwrap();
    assert_eq!(restored.skip_tokens().collect::<Vec<_>>(), ["sp"]);
    assert_eq!(restored.table().states(), parser.table().states());
    assert!(restored.table().resolved_conflicts().is_empty());

    for text in ["1", "1 + 2 * 3", "(1 + -2) * (3)", "1 +", "1 2", "((4)"] {
        assert_eq!(trace(&restored, text), trace(&parser, text), "{text}");
    }
    insta::assert_debug_snapshot!(trace(&restored, "-1 * (2 + 3)").unwrap(), @r#"
    [
        "Negative(- 1)",
        "Term(F)",
        "F(2)",
        "Term(F)",
        "Exp(Term)",
        "F(3)",
        "Term(F)",
        "Sum(Exp + Term)",
        "Product(Term * F)",
        "Exp(Term)",
    ]
    "#);
}

#[test]
fn dumps_are_deterministic() {
    let a = compiled().dump().unwrap();
    let b = compiled().dump().unwrap();
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
}

#[test]
fn restore_rejects_damage() {
    let parser = compiled();
    let mut dump = parser.dump().unwrap();
    let last = dump.states.len();
    if let Some(target) = dump.states[0].shift.values_mut().next() {
        *target = last;
    }
    let matcher = Matcher::new(&tokens(), true).unwrap();
    assert!(matches!(
        Parser::restore(matcher, &dump),
        Err(TableError::Corrupt { .. })
    ));
    assert!(matches!(TableDump::from_json("[]"), Err(TableError::Json(_))));
}

#[test]
fn parsers_are_shared_between_threads() {
    let parser = compiled();
    let inputs = ["1+2", "3*4+5", "(6)", "7*(8+9)", "1+"];
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .map(|&text| {
                let parser = &parser;
                scope.spawn(move || trace(parser, text).map(|r| r.len()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let expected: Vec<_> = inputs.iter().map(|text| trace(&parser, text).map(|r| r.len())).collect();
    assert_eq!(results, expected);
    assert!(results[4].is_err());
}

#[test]
fn dangling_else_prefers_the_shift() {
    let _ = env_logger::builder().is_test(true).try_init();
    let grammar = Grammar::parse(
        "S = 'if' e 'then' S 'else' S @IfElse
           | 'if' e 'then' S @If
           | x;",
    )
    .unwrap();
    let table = CompiledTable::compile(&grammar).unwrap();
    let resolved = table.resolved_conflicts();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].lookahead, "else");
    assert_eq!(resolved[0].dropped, "S -> if e then S");

    let tokens = TokenSpec::new()
        .keywords(["if", "then", "else", "e", "x"])
        .pattern("sp", " +");
    let mut parser = Parser::from_table(Matcher::new(&tokens, true).unwrap(), table);
    parser.set_skip_tokens(["sp"]);
    let mut seen = vec![];
    parser
        .parse("if e then if e then x else x", |name, _| seen.push(name.to_owned()))
        .unwrap();
    // The else binds to the nearest if.
    assert_eq!(seen, ["S", "S", "IfElse", "If"]);
}

#[test]
fn case_insensitive_config() {
    let tokens = TokenSpec::new().keyword("select").pattern("name", "[a-z]+").pattern("sp", " ");
    let config: Config = serde_json::from_str(r#"{"case_insensitive": true, "skip": ["sp"]}"#).unwrap();
    let parser = Parser::with_config(
        &tokens,
        &Grammar::parse("Q = 'select' name;").unwrap(),
        &config,
    )
    .unwrap();
    let mut texts = vec![];
    parser
        .parse("SELECT Users", |_, tokens| {
            texts.extend(tokens.iter().filter_map(|t| t.text));
        })
        .unwrap();
    assert_eq!(texts, ["SELECT", "Users"]);
    assert!(parser.matcher().case_insensitive());
}

fn word() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("if".to_owned()),
        Just("i".to_owned()),
        "[a-z]{1,6}",
        "if[a-z]{1,3}",
    ]
}

proptest! {
    #[test]
    fn longest_match_wins(words in prop::collection::vec(word(), 1..8)) {
        let tokens = TokenSpec::new()
            .keyword("if")
            .pattern("ident", "[a-z]+")
            .pattern("sp", " ");
        let matcher = Matcher::new(&tokens, true).unwrap();
        let text = words.join(" ");
        let lexed: Vec<_> = matcher
            .tokenize(&text)
            .unwrap()
            .into_iter()
            .filter(|t| t.name != "sp")
            .collect();

        prop_assert_eq!(lexed.len(), words.len());
        for (token, word) in lexed.iter().zip(&words) {
            prop_assert_eq!(token.text, Some(word.as_str()));
            let expected = if word == "if" { "if" } else { "ident" };
            prop_assert_eq!(token.name, expected);
        }
    }
}
