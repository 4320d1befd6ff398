#![cfg(test)]
use proptest::prelude::*;
use proptest_derive::Arbitrary;

use crate::{Grammar, Production, Symbol};

const PUNCTUATION: [&str; 6] = ["+", "(", "'", "::=", "|", "@"];

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Operator {
    Repeat0,
    Repeat1,
    Optional,
    Alternation,
    Bounded {
        #[proptest(strategy = "0..4usize")]
        min: usize,
        #[proptest(strategy = "0..6usize")]
        max: usize,
    },
}

impl Operator {
    fn wrap(self, mut bodies: Vec<Vec<Symbol>>) -> Symbol {
        match self {
            Operator::Alternation => Symbol::Alternation(bodies),
            Operator::Repeat0 => Symbol::Repeat0(bodies.swap_remove(0)),
            Operator::Repeat1 => Symbol::Repeat1(bodies.swap_remove(0)),
            Operator::Optional => Symbol::Optional(bodies.swap_remove(0)),
            Operator::Bounded { min, max } => Symbol::bounded(min, max, bodies.swap_remove(0)),
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum Label {
    Plain,
    Silent,
    Alias(#[proptest(regex = "[A-Z][a-z]{0,4}")] String),
}

fn name_strategy() -> impl Strategy<Value = Symbol> {
    prop_oneof![
        3 => "[a-z][a-z0-9_]{0,5}".prop_map(Symbol::name),
        1 => prop::sample::select(PUNCTUATION.to_vec()).prop_map(Symbol::name),
    ]
}

fn symbol_strategy() -> impl Strategy<Value = Symbol> {
    name_strategy().prop_recursive(3, 24, 3, |inner| {
        let body = prop::collection::vec(inner, 1..3);
        (any::<Operator>(), prop::collection::vec(body, 2..4))
            .prop_map(|(operator, bodies)| operator.wrap(bodies))
    })
}

fn production_strategy() -> impl Strategy<Value = Production> {
    (prop::collection::vec(symbol_strategy(), 1..4), any::<Label>()).prop_map(
        |(symbols, label)| match label {
            Label::Plain => Production::new(symbols),
            Label::Silent => Production::silent(symbols),
            Label::Alias(alias) => Production::new(symbols).alias(alias),
        },
    )
}

fn grammar_strategy() -> impl Strategy<Value = Grammar> {
    prop::collection::vec(prop::collection::vec(production_strategy(), 1..3), 1..4).prop_map(
        |rules| {
            rules
                .into_iter()
                .enumerate()
                .fold(Grammar::new(), |g, (n, productions)| {
                    g.rule(format!("rule{n}"), productions)
                })
        },
    )
}

fn settle(grammar: &mut Grammar) {
    loop {
        let before = grammar.clone();
        grammar.simplify();
        if *grammar == before {
            return;
        }
    }
}

#[test]
fn punctuation_is_quoted() {
    let g = Grammar::new().rule("r", [Production::new(PUNCTUATION)]);
    assert_eq!(g.to_string(), "r = '+' '(' \"'\" '::=' '|' '@';\n");
}

proptest! {
    #[test]
    fn display_parse_roundtrip(mut original in grammar_strategy()) {
        settle(&mut original);
        let text = original.to_string();
        let mut actual = Grammar::parse(&text).unwrap_or_else(|e| panic!("{e}\n{text}"));
        settle(&mut actual);

        if original != actual {
            eprintln!("Got:\n{actual}\nExpected:\n{original}");
            prop_assert_eq!(actual, original);
        }
    }

    #[test]
    fn simplify_is_stable(mut original in grammar_strategy()) {
        original.simplify();
        let once = original.clone();
        original.simplify();
        prop_assert_eq!(original, once);
    }
}
