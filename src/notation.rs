//! Textual EBNF notation for grammars.
//!
//! ```text
//! Exp  = Exp '+' Term @Sum | Term;
//! Term = d | '(' Exp ')' @_ ;
//! List = item (',' item)* [','];
//! ```
//!
//! Quoted and bare names are both plain symbol names. `@Name` after an alternative sets the name it
//! is reported under and `@_` silences it. Suffixes `*`, `+`, `?`, `{n}`, `{n,}`, `{n,m}` and `{,m}`
//! apply to the preceding name or group. `//` starts a comment.
//!
//! The notation is itself parsed by this crate: its grammar is compiled into an LALR table on first
//! use and driven in tree mode over a `logos` token source.

use std::{collections::BTreeSet, str::FromStr, sync::LazyLock};

use logos::Logos;
use strum::{IntoStaticStr, VariantArray};

use crate::{
    Grammar, Parser, Production, Symbol,
    error::{LexError, NotationError},
    matcher::{Prefer, TokenSource, TokenSpec},
    parser::tree_from_source,
    table::CompiledTable,
    token_data::{Position, Token},
    tree::{ParseTreeNode, TreeChild},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Logos, IntoStaticStr, VariantArray)]
#[logos(skip r"([ \t\r\n\f]+|//[^\n]*)")]
enum NotationToken {
    #[regex("[A-Za-z_][A-Za-z0-9_]*")]
    #[strum(serialize = "ident")]
    Identifier,
    #[regex("'[^']+'")]
    #[regex("\"[^\"]+\"")]
    #[strum(serialize = "quoted")]
    Quoted,
    #[regex("[0-9]+")]
    #[strum(serialize = "number")]
    Number,
    #[token("=")]
    #[token("::=")]
    #[strum(serialize = "=")]
    Equals,
    #[token(";")]
    #[strum(serialize = ";")]
    Termination,
    #[token("|")]
    #[strum(serialize = "|")]
    Alternation,
    #[token("*")]
    #[strum(serialize = "*")]
    Kleene,
    #[token("+")]
    #[strum(serialize = "+")]
    Repeat,
    #[token("?")]
    #[strum(serialize = "?")]
    Optional,
    #[token("(")]
    #[strum(serialize = "(")]
    OpeningGroup,
    #[token(")")]
    #[strum(serialize = ")")]
    ClosingGroup,
    #[token("[")]
    #[strum(serialize = "[")]
    OpeningSquare,
    #[token("]")]
    #[strum(serialize = "]")]
    ClosingSquare,
    #[token("{")]
    #[strum(serialize = "{")]
    OpeningBrace,
    #[token("}")]
    #[strum(serialize = "}")]
    ClosingBrace,
    #[token(",")]
    #[strum(serialize = ",")]
    Comma,
    #[token("@")]
    #[strum(serialize = "@")]
    At,
}

/// Adapts a `logos` lexer to the parser runtime, tracking lines and columns as it goes.
struct NotationSource<'a> {
    lexer: logos::Lexer<'a, NotationToken>,
    cursor: Position,
}

impl<'a> NotationSource<'a> {
    fn new(text: &'a str) -> NotationSource<'a> {
        NotationSource {
            lexer: NotationToken::lexer(text),
            cursor: Position::START,
        }
    }

    fn seek(&self, offset: usize) -> Position {
        self.cursor
            .advance(&self.lexer.source()[self.cursor.offset..offset])
    }
}

impl<'a> TokenSource<'a> for NotationSource<'a> {
    fn next_token(&mut self, _: Prefer<'_>) -> Result<Option<Token<'a>>, LexError> {
        let Some(kind) = self.lexer.next() else {
            self.cursor = self.seek(self.lexer.source().len());
            return Ok(None);
        };
        let span = self.lexer.span();
        let at = self.seek(span.start);
        match kind {
            Ok(kind) => {
                let text = self.lexer.slice();
                self.cursor = at.advance(text);
                Ok(Some(Token::new(kind.into(), text, at)))
            }
            Err(()) => {
                let character = self.lexer.source()[span.start..]
                    .chars()
                    .next()
                    .unwrap_or_default();
                Err(LexError::at(character, at))
            }
        }
    }

    fn position(&self) -> Position {
        self.cursor
    }
}

fn notation_grammar() -> Grammar {
    let n = |name: &str| Symbol::name(name);
    Grammar::new()
        .rule(
            "grammar",
            [Production::new([Symbol::repeat0([n("rule")])]).alias("Grammar")],
        )
        .rule("rule", [Production::new(["ident", "=", "alts", ";"])])
        .rule(
            "alts",
            [Production::new([n("seq"), Symbol::repeat0([n("|"), n("seq")])])],
        )
        .rule(
            "seq",
            [Production::new([
                Symbol::repeat0([n("item")]),
                Symbol::optional([n("@"), n("ident")]),
            ])],
        )
        .rule(
            "item",
            [Production::new([n("atom"), Symbol::optional([n("suffix")])])],
        )
        .rule(
            "atom",
            [
                Production::new(["ident"]).alias("Name"),
                Production::new(["quoted"]).alias("Name"),
                Production::new(["(", "alts", ")"]).alias("Group"),
                Production::new(["[", "alts", "]"]).alias("Option"),
            ],
        )
        .rule(
            "suffix",
            [
                Production::new(["*"]).alias("Star"),
                Production::new(["+"]).alias("Plus"),
                Production::new(["?"]).alias("Question"),
                Production::new(["{", "number", "}"]).alias("Exact"),
                Production::new(["{", "number", ",", "}"]).alias("AtLeast"),
                Production::new(["{", "number", ",", "number", "}"]).alias("Between"),
                Production::new(["{", ",", "number", "}"]).alias("AtMost"),
            ],
        )
}

static NOTATION: LazyLock<CompiledTable> = LazyLock::new(|| {
    match CompiledTable::compile(&notation_grammar()) {
        Ok(table) => table,
        Err(e) => unreachable!("the notation grammar does not compile: {e} - this is a bug"),
    }
});

impl Grammar {
    /// Reads a grammar written in the textual notation. The result is simplified.
    pub fn parse(text: &str) -> Result<Grammar, NotationError> {
        let mut source = NotationSource::new(text);
        let tree = tree_from_source(&NOTATION, &mut source, &BTreeSet::new(), &|_| true)?;
        let mut grammar = Grammar::new();
        for rule in tree.nodes() {
            let (name, productions) = read_rule(rule)?;
            grammar.add_rule(name, productions);
        }
        grammar.simplify();
        Ok(grammar)
    }
}

impl FromStr for Grammar {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Grammar::parse(s)
    }
}

impl Parser {
    /// Compiles a grammar written in the textual notation.
    pub fn from_notation(tokens: &TokenSpec, grammar: &str) -> Result<Parser, NotationError> {
        let grammar = Grammar::parse(grammar)?;
        Ok(Parser::new(tokens, &grammar)?)
    }
}

struct Branch<'t> {
    symbols: Vec<Symbol>,
    alias: Option<Token<'t>>,
}

fn leaves<'n, 't>(node: &'n ParseTreeNode<'t>) -> impl Iterator<Item = Token<'t>> + 'n {
    node.children.iter().filter_map(|c| match c {
        TreeChild::Leaf(token) => Some(*token),
        TreeChild::Node(_) => None,
    })
}

fn leaf_text<'t>(node: &ParseTreeNode<'t>, name: &str) -> &'t str {
    match leaves(node).find(|t| t.name == name).and_then(|t| t.text) {
        Some(text) => text,
        None => unreachable!("`{}` node without a {name} token - this is a bug", node.label),
    }
}

fn only_node<'n, 't>(node: &'n ParseTreeNode<'t>) -> &'n ParseTreeNode<'t> {
    match node.nodes().next() {
        Some(child) => child,
        None => unreachable!("`{}` node without children - this is a bug", node.label),
    }
}

fn read_rule(node: &ParseTreeNode<'_>) -> Result<(String, Vec<Production>), NotationError> {
    let name = leaf_text(node, "ident");
    let productions = read_alternatives(only_node(node), name)?
        .into_iter()
        .map(|Branch { symbols, alias }| {
            let production = Production::new(symbols);
            match alias.and_then(|t| t.text) {
                Some("_") => Production::silent(production.symbols),
                Some(alias) => production.alias(alias),
                None => production,
            }
        })
        .collect();
    Ok((name.to_owned(), productions))
}

fn read_alternatives<'t>(node: &ParseTreeNode<'t>, rule: &str) -> Result<Vec<Branch<'t>>, NotationError> {
    node.nodes().map(|seq| read_sequence(seq, rule)).collect()
}

fn read_sequence<'t>(node: &ParseTreeNode<'t>, rule: &str) -> Result<Branch<'t>, NotationError> {
    let symbols = node
        .nodes()
        .map(|item| read_item(item, rule))
        .collect::<Result<_, _>>()?;
    let alias = leaves(node).find(|t| t.name == "ident");
    Ok(Branch { symbols, alias })
}

/// Reads a nested group, where aliases are not allowed.
fn read_group(node: &ParseTreeNode<'_>, rule: &str) -> Result<Vec<Vec<Symbol>>, NotationError> {
    read_alternatives(only_node(node), rule)?
        .into_iter()
        .map(|branch| match branch.alias.and_then(|t| t.text) {
            Some(alias) => Err(NotationError::MisplacedAlias {
                rule: rule.to_owned(),
                alias: alias.to_owned(),
            }),
            None => Ok(branch.symbols),
        })
        .collect()
}

fn read_item(node: &ParseTreeNode<'_>, rule: &str) -> Result<Symbol, NotationError> {
    let mut parts = node.nodes();
    let (Some(atom), suffix) = (parts.next(), parts.next()) else {
        unreachable!("item without an atom - this is a bug")
    };

    let atom = match atom.label {
        "Name" => {
            let token = leaves(atom).next().and_then(|t| t.text).unwrap_or_default();
            let name = if token.starts_with(['\'', '"']) {
                &token[1..token.len() - 1]
            } else {
                token
            };
            Symbol::name(name)
        }
        "Group" => Symbol::Alternation(read_group(atom, rule)?),
        "Option" => Symbol::Optional(sequence_of(Symbol::Alternation(read_group(atom, rule)?))),
        other => unreachable!("unknown atom `{other}` - this is a bug"),
    };

    let Some(suffix) = suffix else {
        return Ok(atom);
    };
    let bounds: Vec<Token<'_>> = leaves(suffix).filter(|t| t.name == "number").collect();
    let numbers = bounds
        .iter()
        .map(|t| t.text.unwrap_or_default().parse::<usize>().map_err(|_| out_of_range(t)))
        .collect::<Result<Vec<_>, _>>()?;
    // An upper bound of zero would read as unbounded.
    if suffix.label != "AtLeast"
        && let (Some(&0), Some(last)) = (numbers.last(), bounds.last())
    {
        return Err(out_of_range(last));
    }
    let body = sequence_of(atom);

    Ok(match (suffix.label, numbers.as_slice()) {
        ("Star", []) => Symbol::Repeat0(body),
        ("Plus", []) => Symbol::Repeat1(body),
        ("Question", []) => Symbol::Optional(body),
        ("Exact", &[n]) => Symbol::bounded(n, n, body),
        ("AtLeast", &[n]) => Symbol::bounded(n, 0, body),
        ("Between", &[n, m]) => Symbol::bounded(n, m, body),
        ("AtMost", &[m]) => Symbol::bounded(0, m, body),
        (other, _) => unreachable!("unknown suffix `{other}` - this is a bug"),
    })
}

fn out_of_range(token: &Token<'_>) -> NotationError {
    NotationError::InvalidBound {
        text: token.text.unwrap_or_default().to_owned(),
        line: token.line,
        column: token.column,
    }
}

/// The body a suffix applies to: the contents of a single-branch group, or the symbol itself.
fn sequence_of(symbol: Symbol) -> Vec<Symbol> {
    match symbol {
        Symbol::Alternation(mut branches) if branches.len() == 1 => branches.remove(0),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GrammarError, ParseError};

    #[test]
    fn notation_terminals_are_all_lexed() {
        let grammar = notation_grammar();
        let names: Vec<&str> = NotationToken::VARIANTS.iter().map(|&t| t.into()).collect();
        for (rule, name) in grammar.dangling_references() {
            assert!(names.contains(&name), "`{name}` in `{rule}` is never lexed");
        }
        assert!(NOTATION.resolved_conflicts().is_empty());
    }

    #[test]
    fn reads_rules_and_aliases() {
        let g = Grammar::parse(
            "// arithmetic
             Exp ::= Exp '+' Term @Sum | Term;
             Term = d | '(' Exp ')' @_ ;",
        )
        .unwrap_or_else(|e| panic!("{e}"));
        insta::assert_snapshot!(g.to_string(), @r"
        Exp = Exp '+' Term @Sum
            | Term;
        Term = d
            | '(' Exp ')' @_;
        ");
        assert_eq!(g.root(), Some("Exp"));
    }

    #[test]
    fn reads_operators() {
        let g: Grammar = "L = x (',' x)* [','] (a | b c)+ y? z{2} w{1,} v{2,3} u{,4} (p q);"
            .parse()
            .unwrap_or_else(|e| panic!("{e}"));
        let production = &g.get("L").unwrap().productions[0];
        assert_eq!(
            production.symbols,
            [
                Symbol::name("x"),
                Symbol::repeat0([Symbol::name(","), Symbol::name("x")]),
                Symbol::optional([Symbol::name(",")]),
                Symbol::repeat1([Symbol::alternation([
                    vec![Symbol::name("a")],
                    vec![Symbol::name("b"), Symbol::name("c")],
                ])]),
                Symbol::optional([Symbol::name("y")]),
                Symbol::bounded(2, 2, [Symbol::name("z")]),
                Symbol::bounded(1, 0, [Symbol::name("w")]),
                Symbol::bounded(2, 3, [Symbol::name("v")]),
                Symbol::bounded(0, 4, [Symbol::name("u")]),
                Symbol::name("p"),
                Symbol::name("q"),
            ]
        );
        assert_eq!(
            production.to_string(),
            "x (',' x)* [','] ((a | b c))+ [y] (z){2} (w){1,} (v){2,3} (u){0,4} p q"
        );
    }

    #[test]
    fn duplicate_rules_append() {
        let g = Grammar::parse("A = x; B = y; A = z;").unwrap();
        assert_eq!(g.rules().count(), 2);
        assert_eq!(g.get("A").unwrap().productions.len(), 2);
        assert!(Grammar::parse("").unwrap().is_empty());
    }

    #[test]
    fn double_quotes_allow_apostrophes() {
        let g = Grammar::parse(r#"A = "it's" | '"';"#).unwrap();
        let names: Vec<_> = g
            .get("A")
            .unwrap()
            .productions
            .iter()
            .map(|p| p.symbols[0].clone())
            .collect();
        assert_eq!(names, [Symbol::name("it's"), Symbol::name("\"")]);
    }

    #[test]
    fn aliases_inside_groups_are_rejected() {
        assert_eq!(
            Grammar::parse("A = (x @B | y);"),
            Err(NotationError::MisplacedAlias {
                rule: "A".into(),
                alias: "B".into()
            })
        );
    }

    #[test]
    fn syntax_errors_point_at_the_token() {
        let err = Grammar::parse("A = x;\nB = ) ;").unwrap_err();
        assert_eq!(err.to_string(), "unexpected ) \")\" at 2:5");

        let err = Grammar::parse("A = x").unwrap_err();
        assert_eq!(err.to_string(), "unexpected end of input at 1:6");

        let err = Grammar::parse("A = $;").unwrap_err();
        assert!(matches!(err, NotationError::Parse(ParseError::Lex(_))));

        let err = Grammar::parse("A = x{99999999999999999999999};").unwrap_err();
        assert!(matches!(err, NotationError::InvalidBound { line: 1, column: 7, .. }));

        let err = Grammar::parse("A = x{2,0};").unwrap_err();
        assert_eq!(err.to_string(), "repetition bound `0` at 1:9 is out of range");
        assert!(Grammar::parse("A = x{0,};").is_ok());
    }

    #[test]
    fn compile_errors_surface() {
        let tokens = TokenSpec::new().pattern("x", "x");
        assert!(matches!(
            Parser::from_notation(&tokens, "A = x{3,2};"),
            Err(NotationError::Grammar(GrammarError::InvalidBounds { min: 3, max: 2, .. }))
        ));
        assert!(Parser::from_notation(&tokens, "A = x+;").is_ok());
    }
}
