use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    Grammar,
    error::{GrammarError, ParseError, TableError},
    matcher::{Matcher, Prefer, TokenSource, TokenSpec},
    reducer::ReductionContext,
    table::{CompiledState, CompiledTable, TableDump},
    token_data::Token,
    tree::{ParseTreeNode, TreeBuilder},
};

/// Parser settings that can be loaded from a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub case_insensitive: bool,
    /// Token names dropped before they reach the parser, such as whitespace and comments.
    pub skip: Vec<String>,
}

/// The token and state stacks of one parse. They always have the same depth, counting the start
/// state that sits below the first token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LrStack<'a> {
    tokens: Vec<Token<'a>>,
    states: Vec<usize>,
}

impl<'a> LrStack<'a> {
    pub(crate) fn new() -> LrStack<'a> {
        LrStack {
            tokens: Vec::new(),
            states: vec![0],
        }
    }

    pub(crate) fn state(&self) -> usize {
        match self.states.last() {
            Some(&state) => state,
            None => unreachable!("popped the start state - this is a bug"),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn push(&mut self, token: Token<'a>, state: usize) {
        self.tokens.push(token);
        self.states.push(state);
    }

    /// Pops one entry per symbol, checking that the popped tokens carry those names in order.
    pub(crate) fn pop_checked(&mut self, symbols: &[String]) -> Result<Vec<Token<'a>>, ParseError> {
        if symbols.len() > self.tokens.len() {
            return Err(ParseError::Internal {
                expected: symbols.join(" "),
                found: self
                    .tokens
                    .iter()
                    .map(|t| t.name)
                    .collect::<Vec<_>>()
                    .join(" "),
            });
        }
        let split = self.tokens.len() - symbols.len();
        let popped = self.tokens.split_off(split);
        self.states.truncate(split + 1);
        if let Some((token, expected)) = popped.iter().zip(symbols).find(|(t, s)| t.name != s.as_str()) {
            return Err(ParseError::Internal {
                expected: expected.clone(),
                found: token.name.to_owned(),
            });
        }
        Ok(popped)
    }
}

fn next_significant<'a>(
    source: &mut dyn TokenSource<'a>,
    skip: &BTreeSet<String>,
    state: &CompiledState,
) -> Result<Option<Token<'a>>, ParseError> {
    let accepts = |name: &str| state.accepts(name);
    loop {
        match source.next_token(Prefer::Matching(&accepts))? {
            Some(token) if skip.contains(token.name) => log::trace!("skip {token:?}"),
            other => return Ok(other),
        }
    }
}

/// Drives the shift-reduce loop over `source` until the root rule is accepted.
pub(crate) fn run<'a>(
    table: &'a CompiledTable,
    source: &mut dyn TokenSource<'a>,
    skip: &BTreeSet<String>,
    report: &mut dyn FnMut(&str, &[Token<'a>]),
    mut tree: Option<&mut TreeBuilder<'a, '_>>,
) -> Result<(), ParseError> {
    let states = table.states();
    let mut stack = LrStack::new();
    let mut context = ReductionContext::new();
    let mut lookahead = next_significant(source, skip, &states[0])?;
    // Holds the real lookahead while a freshly reduced nonterminal is being shifted.
    let mut pending: Option<Option<Token<'a>>> = None;

    loop {
        let state = &states[stack.state()];
        let name = lookahead.map_or("", |t| t.name);

        if let Some(token) = lookahead
            && let Some(&target) = state.shift.get(name)
        {
            log::trace!("shift {token:?} to state {target}");
            stack.push(token, target);
            lookahead = match pending.take() {
                Some(replay) => replay,
                None => next_significant(source, skip, &states[target])?,
            };
            continue;
        }

        if lookahead.is_some_and(|t| t.is_synthetic()) {
            return Err(match pending {
                Some(Some(token)) => ParseError::unexpected(&token),
                _ => ParseError::eof(source.position()),
            });
        }

        let Some(&index) = state.reduce.get(name).or_else(|| state.reduce.get("")) else {
            return Err(match lookahead {
                Some(token) => ParseError::unexpected(&token),
                None => ParseError::eof(source.position()),
            });
        };
        let rule = &state.rules[index];
        let popped = stack.pop_checked(&rule.symbols)?;
        log::trace!("reduce {rule}");

        context.reduce(rule, &popped, report)?;
        if let Some(builder) = tree.as_deref_mut() {
            builder.reduce(rule, &popped)?;
        }

        if lookahead.is_none() && stack.depth() == 1 && rule.nonterminal == table.root() {
            if !context.is_drained() {
                log::debug!("accepted with unclaimed repetition collections");
            }
            return Ok(());
        }

        let at = match (popped.last(), lookahead.as_ref()) {
            (Some(token), _) | (None, Some(token)) => token.position(),
            (None, None) => source.position(),
        };
        pending = Some(lookahead);
        lookahead = Some(Token::synthetic(&rule.nonterminal, at));
    }
}

/// A compiled grammar bound to a token matcher. Reusable and shareable across threads; every
/// parse owns its own stacks.
#[derive(Debug)]
pub struct Parser {
    matcher: Matcher,
    table: CompiledTable,
    skip: BTreeSet<String>,
}

impl Parser {
    pub fn new(tokens: &TokenSpec, grammar: &Grammar) -> Result<Parser, GrammarError> {
        Parser::with_config(tokens, grammar, &Config::default())
    }

    pub fn with_config(tokens: &TokenSpec, grammar: &Grammar, config: &Config) -> Result<Parser, GrammarError> {
        for (rule, name) in grammar.dangling_references() {
            if !tokens.contains(name) {
                log::debug!("`{name}` in rule `{rule}` is neither a rule nor a declared token");
            }
        }
        let matcher = Matcher::new(tokens, !config.case_insensitive)?;
        let table = CompiledTable::compile(grammar)?;
        let mut parser = Parser::from_table(matcher, table);
        parser.set_skip_tokens(config.skip.iter().cloned());
        Ok(parser)
    }

    pub fn from_table(matcher: Matcher, table: CompiledTable) -> Parser {
        Parser {
            matcher,
            table,
            skip: BTreeSet::new(),
        }
    }

    /// Rebuilds a parser from a dumped table. The dump's skip set is restored as well.
    pub fn restore(matcher: Matcher, dump: &TableDump) -> Result<Parser, TableError> {
        let table = CompiledTable::restore(dump)?;
        let mut parser = Parser::from_table(matcher, table);
        parser.set_skip_tokens(dump.skip.iter().cloned());
        Ok(parser)
    }

    pub fn dump(&self) -> Result<TableDump, TableError> {
        let skip: Vec<String> = self.skip.iter().cloned().collect();
        self.table.dump(&skip)
    }

    /// Replaces the set of token names that are dropped between the matcher and the parser.
    pub fn set_skip_tokens<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip = names.into_iter().map(Into::into).collect();
    }

    pub fn skip_tokens(&self) -> impl Iterator<Item = &str> {
        self.skip.iter().map(String::as_str)
    }

    pub fn table(&self) -> &CompiledTable {
        &self.table
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Parses `text`, passing every reported reduction to `callback` as it happens.
    pub fn parse<'a, F>(&'a self, text: &'a str, mut callback: F) -> Result<(), ParseError>
    where
        F: FnMut(&str, &[Token<'a>]),
    {
        let mut stream = self.matcher.stream(text);
        run(&self.table, &mut stream, &self.skip, &mut callback, None)
    }

    /// Parses tokens from any source instead of this parser's own matcher.
    pub fn parse_source<'a, F>(&'a self, source: &mut dyn TokenSource<'a>, mut callback: F) -> Result<(), ParseError>
    where
        F: FnMut(&str, &[Token<'a>]),
    {
        run(&self.table, source, &self.skip, &mut callback, None)
    }

    pub fn tree<'a>(&'a self, text: &'a str) -> Result<ParseTreeNode<'a>, ParseError> {
        self.tree_filtered(text, |_| true)
    }

    /// Like [`tree`](Self::tree), but leaves for which `keep` returns false are left out.
    pub fn tree_filtered<'a>(
        &'a self,
        text: &'a str,
        keep: impl Fn(&Token<'_>) -> bool,
    ) -> Result<ParseTreeNode<'a>, ParseError> {
        let mut stream = self.matcher.stream(text);
        tree_from_source(&self.table, &mut stream, &self.skip, &keep)
    }
}

pub(crate) fn tree_from_source<'a>(
    table: &'a CompiledTable,
    source: &mut dyn TokenSource<'a>,
    skip: &BTreeSet<String>,
    keep: &dyn Fn(&Token<'_>) -> bool,
) -> Result<ParseTreeNode<'a>, ParseError> {
    let mut builder = TreeBuilder::new(keep);
    let mut ignore = |_: &str, _: &[Token<'a>]| {};
    run(table, source, skip, &mut ignore, Some(&mut builder))?;
    builder.finish()
}
