//! A longest-match lexer and LALR(1) parser generator.
//!
//! Grammars are written as EBNF, either through the [`Grammar`] builder API or in the textual
//! notation read by [`Grammar::parse`]. Compiling one desugars the EBNF operators into helper
//! rules, builds the LALR(1) automaton and compacts it into a [`CompiledTable`]. A [`Parser`]
//! pairs that table with a [`Matcher`] and reports every reduction through a callback, with the
//! helper rules already folded back into the production that used them.
//!
//! ```
//! use lalr_toolkit::{Grammar, Parser, TokenSpec};
//!
//! let tokens = TokenSpec::new().pattern("d", "[0-9]+").keyword(",");
//! let grammar = Grammar::parse("List = d (',' d)*;").unwrap();
//! let parser = Parser::new(&tokens, &grammar).unwrap();
//!
//! let mut seen = vec![];
//! parser.parse("1,2,3", |name, tokens| seen.push((name.to_owned(), tokens.len()))).unwrap();
//! assert_eq!(seen, [("List".to_owned(), 5)]);
//! ```

#![forbid(unsafe_code)]
#![warn(explicit_outlives_requirements)]
#![warn(missing_debug_implementations)]
#![warn(clippy::pedantic)]
#![warn(redundant_lifetimes)]
//#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(unused_crate_dependencies)]
#![warn(unused_qualifications)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

mod desugar;
mod error;
pub mod lalr;
mod matcher;
mod notation;
mod parser;
mod proptesting;
mod reducer;
mod rule;
mod simplification;
mod symbol;
mod table;
mod token_data;
mod tree;

pub use desugar::{BnfGrammar, BnfProduction, BnfRule, desugar};
pub use error::{GrammarError, LexError, NotationError, ParseError, TableError};
pub use matcher::{Matcher, Prefer, TokenDef, TokenPattern, TokenSource, TokenSpec, TokenStream};
pub use parser::{Config, Parser};
pub use rule::{Callback, Emit, Grammar, Production, Rule};
pub use symbol::{Symbol, SymbolKind};
pub use table::{
    CompiledState, CompiledTable, EmitDump, ReduceRule, ResolvedConflict, RuleDump, StateDump,
    TableDump,
};
pub use token_data::{Position, Span, Token};
pub use tree::{ParseTreeNode, TreeChild};
