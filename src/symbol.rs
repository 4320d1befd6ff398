use std::{collections::VecDeque, fmt::Display};

use strum::{EnumDiscriminants, IntoStaticStr, VariantNames};

/// One element of a raw production's right-hand side.
///
/// `Name` refers to a rule when one of that name exists and to a token otherwise. Every other
/// variant is an EBNF operator that the preprocessor rewrites into helper rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumDiscriminants)]
#[strum_discriminants(name(SymbolKind), derive(VariantNames, IntoStaticStr, Hash))]
pub enum Symbol {
    Name(String),
    /// Zero or more repetitions of the sequence.
    Repeat0(Vec<Symbol>),
    /// One or more repetitions of the sequence.
    Repeat1(Vec<Symbol>),
    Optional(Vec<Symbol>),
    Alternation(Vec<Vec<Symbol>>),
    /// Between `min` and `max` repetitions. `max == 0` leaves it unbounded above.
    Bounded {
        min: usize,
        max: usize,
        body: Vec<Symbol>,
    },
}

impl Symbol {
    pub fn name(name: impl Into<String>) -> Symbol {
        Symbol::Name(name.into())
    }

    pub fn repeat0(body: impl Into<Vec<Symbol>>) -> Symbol {
        Symbol::Repeat0(body.into())
    }

    pub fn repeat1(body: impl Into<Vec<Symbol>>) -> Symbol {
        Symbol::Repeat1(body.into())
    }

    pub fn optional(body: impl Into<Vec<Symbol>>) -> Symbol {
        Symbol::Optional(body.into())
    }

    pub fn alternation<I>(branches: I) -> Symbol
    where
        I: IntoIterator,
        I::Item: Into<Vec<Symbol>>,
    {
        Symbol::Alternation(branches.into_iter().map(Into::into).collect())
    }

    pub fn bounded(min: usize, max: usize, body: impl Into<Vec<Symbol>>) -> Symbol {
        Symbol::Bounded {
            min,
            max,
            body: body.into(),
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Symbol::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn kind(&self) -> SymbolKind {
        SymbolKind::from(self)
    }

    /// Every name mentioned anywhere inside this symbol, outermost first.
    pub fn names(&self) -> Vec<&str> {
        let mut queue = VecDeque::from([self]);
        let mut names = vec![];
        while let Some(symbol) = queue.pop_front() {
            match symbol {
                Symbol::Name(name) => names.push(name.as_str()),
                Symbol::Repeat0(body)
                | Symbol::Repeat1(body)
                | Symbol::Optional(body)
                | Symbol::Bounded { body, .. } => queue.extend(body),
                Symbol::Alternation(branches) => queue.extend(branches.iter().flatten()),
            }
        }
        names
    }

    /// Rewrites the tree bottom-up: children first, then `self`. `func` returns the replacement
    /// for a node, or `None` to leave it alone.
    pub(crate) fn apply_replacement(&mut self, func: &mut impl FnMut(&Symbol) -> Option<Symbol>) {
        match self {
            Symbol::Name(_) => {}
            Symbol::Repeat0(body)
            | Symbol::Repeat1(body)
            | Symbol::Optional(body)
            | Symbol::Bounded { body, .. } => replace_in_sequence(body, func),
            Symbol::Alternation(branches) => {
                for branch in branches {
                    replace_in_sequence(branch, func);
                }
            }
        }
        if let Some(new) = func(self) {
            *self = new;
        }
    }
}

pub(crate) fn replace_in_sequence(
    seq: &mut [Symbol],
    func: &mut impl FnMut(&Symbol) -> Option<Symbol>,
) {
    for symbol in seq {
        symbol.apply_replacement(func);
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::Name(value.to_owned())
    }
}

impl From<String> for Symbol {
    fn from(value: String) -> Self {
        Symbol::Name(value)
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn write_name(f: &mut std::fmt::Formatter<'_>, name: &str) -> std::fmt::Result {
    if is_identifier(name) {
        write!(f, "{name}")
    } else if name.contains('\'') {
        write!(f, "\"{name}\"")
    } else {
        write!(f, "'{name}'")
    }
}

pub(crate) fn write_sequence(f: &mut std::fmt::Formatter<'_>, seq: &[Symbol]) -> std::fmt::Result {
    for (index, symbol) in seq.iter().enumerate() {
        if index > 0 {
            write!(f, " ")?;
        }
        write!(f, "{symbol}")?;
    }
    Ok(())
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Name(name) => write_name(f, name),
            Symbol::Repeat0(body) => {
                write!(f, "(")?;
                write_sequence(f, body)?;
                write!(f, ")*")
            }
            Symbol::Repeat1(body) => {
                write!(f, "(")?;
                write_sequence(f, body)?;
                write!(f, ")+")
            }
            Symbol::Optional(body) => {
                write!(f, "[")?;
                write_sequence(f, body)?;
                write!(f, "]")
            }
            Symbol::Alternation(branches) => {
                write!(f, "(")?;
                for (index, branch) in branches.iter().enumerate() {
                    if index > 0 {
                        write!(f, " | ")?;
                    }
                    write_sequence(f, branch)?;
                }
                write!(f, ")")
            }
            Symbol::Bounded { min, max, body } => {
                write!(f, "(")?;
                write_sequence(f, body)?;
                match (*min, *max) {
                    (min, 0) => write!(f, "){{{min},}}"),
                    (min, max) if min == max => write!(f, "){{{min}}}"),
                    (min, max) => write!(f, "){{{min},{max}}}"),
                }
            }
        }
    }
}
