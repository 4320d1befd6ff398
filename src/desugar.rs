//! Rewrites EBNF operators into plain BNF.
//!
//! Every operator at symbol index `i` of production `k` of rule `N` becomes a reference to a helper
//! rule named `N#k#i`. Helper productions carry a [`Emit::Repetition`] or [`Emit::Choice`] reducer
//! that collects their children at parse time, and the owning production's emit is wrapped in
//! [`Emit::Merge`] so it sees the collected children spliced back in place of the helper. Operators
//! nested inside a helper's body are rewritten the same way, with the helper as owner.

use std::{collections::VecDeque, fmt::Display};

use crate::{Emit, Grammar, Production, Symbol, error::GrammarError};

#[derive(Debug, Clone, PartialEq)]
pub struct BnfProduction {
    pub symbols: Vec<String>,
    pub emit: Emit,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BnfRule {
    pub name: String,
    pub productions: Vec<BnfProduction>,
    /// Introduced by desugaring rather than written by the user.
    pub helper: bool,
}

/// A grammar with no EBNF operators left. The first rule is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct BnfGrammar {
    pub rules: Vec<BnfRule>,
}

impl BnfGrammar {
    pub fn root(&self) -> &str {
        match self.rules.first() {
            Some(rule) => &rule.name,
            None => unreachable!("desugared grammar without rules - this is a bug"),
        }
    }

    pub fn get(&self, name: &str) -> Option<&BnfRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn is_helper(&self, name: &str) -> bool {
        self.get(name).is_some_and(|r| r.helper)
    }
}

impl Display for BnfGrammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for rule in &self.rules {
            for production in &rule.productions {
                write!(f, "{} ->", rule.name)?;
                for symbol in &production.symbols {
                    write!(f, " {symbol}")?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

pub fn desugar(grammar: &Grammar) -> Result<BnfGrammar, GrammarError> {
    if grammar.is_empty() {
        return Err(GrammarError::Empty);
    }

    let mut queue: VecDeque<(String, Vec<Production>, bool)> = grammar
        .rules()
        .map(|r| (r.name.clone(), r.productions.clone(), false))
        .collect();
    let mut rules = vec![];

    while let Some((name, productions, helper)) = queue.pop_front() {
        let mut bnf = Vec::with_capacity(productions.len());
        for (k, production) in productions.into_iter().enumerate() {
            let mut symbols = Vec::with_capacity(production.symbols.len());
            let mut merged = false;
            for (i, symbol) in production.symbols.into_iter().enumerate() {
                if let Symbol::Name(n) = symbol {
                    symbols.push(n);
                    continue;
                }
                let helper_name = format!("{name}#{k}#{i}");
                let expanded = expand(&name, &helper_name, symbol)?;
                queue.push_back((helper_name.clone(), expanded, true));
                symbols.push(helper_name);
                merged = true;
            }
            let emit = if merged {
                Emit::Merge {
                    inner: Box::new(production.emit),
                }
            } else {
                production.emit
            };
            bnf.push(BnfProduction {
                symbols,
                emit,
                alias: production.alias,
            });
        }
        rules.push(BnfRule {
            name,
            productions: bnf,
            helper,
        });
    }

    log::debug!(
        "desugared {} rules into {} ({} helpers)",
        grammar.rules().count(),
        rules.len(),
        rules.iter().filter(|r| r.helper).count()
    );
    Ok(BnfGrammar { rules })
}

fn expand(owner: &str, helper: &str, symbol: Symbol) -> Result<Vec<Production>, GrammarError> {
    let kind: &'static str = symbol.kind().into();
    let empty_body = || GrammarError::EmptyBody {
        rule: owner.to_owned(),
        kind,
    };
    let repetition = |max: usize, group: usize| Emit::Repetition {
        collector: helper.to_owned(),
        max,
        group,
    };
    let recursive = |seq: &[Symbol]| {
        let mut symbols = Vec::with_capacity(seq.len() + 1);
        symbols.push(Symbol::name(helper));
        symbols.extend_from_slice(seq);
        symbols
    };
    let production = |symbols: Vec<Symbol>, emit: Emit| Production {
        symbols,
        emit,
        alias: None,
    };

    let productions = match symbol {
        Symbol::Name(_) => unreachable!("plain names are never expanded - this is a bug"),
        Symbol::Repeat0(seq) | Symbol::Repeat1(seq) | Symbol::Optional(seq) | Symbol::Bounded { body: seq, .. }
            if seq.is_empty() =>
        {
            return Err(empty_body());
        }
        Symbol::Alternation(branches) if branches.is_empty() => return Err(empty_body()),

        Symbol::Repeat0(seq) => vec![
            production(recursive(&seq), repetition(0, seq.len())),
            production(vec![], repetition(0, seq.len())),
        ],
        Symbol::Repeat1(seq) => vec![
            production(recursive(&seq), repetition(0, seq.len())),
            production(seq.clone(), repetition(0, seq.len())),
        ],
        Symbol::Optional(seq) => vec![
            production(seq.clone(), repetition(1, seq.len())),
            production(vec![], repetition(1, seq.len())),
        ],
        Symbol::Alternation(branches) => branches
            .into_iter()
            .map(|branch| {
                production(
                    branch,
                    Emit::Choice {
                        collector: helper.to_owned(),
                    },
                )
            })
            .collect(),
        Symbol::Bounded { min, max, body } => {
            if max != 0 && max < min {
                return Err(GrammarError::InvalidBounds {
                    rule: owner.to_owned(),
                    min,
                    max,
                });
            }
            let floor = body.iter().cloned().cycle().take(min * body.len()).collect();
            let mut productions = vec![production(floor, repetition(max, body.len()))];
            if max == 0 || max != min {
                productions.push(production(recursive(&body), repetition(max, body.len())));
            }
            productions
        }
    };
    Ok(productions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d() -> Vec<Symbol> {
        vec![Symbol::name("d")]
    }

    fn shape(grammar: &BnfGrammar) -> String {
        grammar.to_string()
    }

    #[test]
    fn repetitions_become_helper_rules() {
        let g = Grammar::new().rule(
            "A",
            [Production::new([Symbol::name("x"), Symbol::repeat0(d()), Symbol::repeat1(d())])],
        );
        let bnf = desugar(&g).unwrap();
        insta::assert_snapshot!(shape(&bnf), @r"
        A -> x A#0#1 A#0#2
        A#0#1 -> A#0#1 d
        A#0#1 ->
        A#0#2 -> A#0#2 d
        A#0#2 -> d
        ");
        assert!(bnf.is_helper("A#0#1"));
        assert!(!bnf.is_helper("A"));
        assert_eq!(bnf.root(), "A");
        assert!(matches!(bnf.rules[0].productions[0].emit, Emit::Merge { .. }));
        assert_eq!(
            bnf.rules[1].productions[1].emit,
            Emit::Repetition {
                collector: "A#0#1".into(),
                max: 0,
                group: 1
            }
        );
    }

    #[test]
    fn nested_operators_are_named_after_their_helper() {
        let g = Grammar::new().rule(
            "L",
            [
                Production::new(["a"]),
                Production::new([Symbol::optional([
                    Symbol::name(","),
                    Symbol::alternation([vec![Symbol::name("b")], vec![]]),
                ])]),
            ],
        );
        let bnf = desugar(&g).unwrap();
        insta::assert_snapshot!(shape(&bnf), @r"
        L -> a
        L -> L#1#0
        L#1#0 -> , L#1#0#0#1
        L#1#0 ->
        L#1#0#0#1 -> b
        L#1#0#0#1 ->
        ");
        let helper = bnf.get("L#1#0").unwrap();
        assert!(matches!(
            &helper.productions[0].emit,
            Emit::Merge { inner } if matches!(**inner, Emit::Repetition { max: 1, group: 2, .. })
        ));
        assert_eq!(helper.productions[1].emit.innermost(), helper.productions[0].emit.innermost());
    }

    #[test]
    fn bounded_repetition() {
        let g = Grammar::new()
            .rule("A", [Production::new([Symbol::bounded(2, 4, d())])])
            .rule("B", [Production::new([Symbol::bounded(3, 0, d())])])
            .rule("C", [Production::new([Symbol::bounded(2, 2, [Symbol::name("x"), Symbol::name("y")])])])
            .rule("D", [Production::new([Symbol::bounded(0, 0, d())])]);
        let bnf = desugar(&g).unwrap();
        insta::assert_snapshot!(shape(&bnf), @r"
        A -> A#0#0
        B -> B#0#0
        C -> C#0#0
        D -> D#0#0
        A#0#0 -> d d
        A#0#0 -> A#0#0 d
        B#0#0 -> d d d
        B#0#0 -> B#0#0 d
        C#0#0 -> x y x y
        D#0#0 ->
        D#0#0 -> D#0#0 d
        ");
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let g = Grammar::new().rule("A", [Production::new([Symbol::bounded(4, 2, d())])]);
        assert_eq!(
            desugar(&g),
            Err(GrammarError::InvalidBounds {
                rule: "A".into(),
                min: 4,
                max: 2
            })
        );
    }

    #[test]
    fn empty_bodies_are_rejected() {
        let g = Grammar::new().rule("A", [Production::new([Symbol::repeat1([])])]);
        assert_eq!(
            desugar(&g),
            Err(GrammarError::EmptyBody {
                rule: "A".into(),
                kind: "Repeat1"
            })
        );
        let g = Grammar::new().rule("A", [Production::new([Symbol::Alternation(vec![])])]);
        assert!(matches!(desugar(&g), Err(GrammarError::EmptyBody { kind: "Alternation", .. })));
        assert_eq!(desugar(&Grammar::new()), Err(GrammarError::Empty));
    }

    #[test]
    fn emits_are_preserved() {
        let g = Grammar::new().rule(
            "A",
            [
                Production::silent(["x"]).alias("X"),
                Production::new([Symbol::repeat0(d())]).alias("Ds"),
            ],
        );
        let bnf = desugar(&g).unwrap();
        let a = &bnf.rules[0];
        assert_eq!(a.productions[0].emit, Emit::None);
        assert_eq!(a.productions[0].alias.as_deref(), Some("X"));
        assert_eq!(
            a.productions[1].emit,
            Emit::Merge {
                inner: Box::new(Emit::Report)
            }
        );
        assert_eq!(a.productions[1].alias.as_deref(), Some("Ds"));
    }
}
