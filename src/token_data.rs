use std::{
    fmt::{Debug, Display},
    ops::Range,
};

use serde::{Deserialize, Serialize};

/// A location in source text. `line` and `column` are 1-based, `column` counts characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    /// Byte offset into the source.
    pub offset: usize,
}

impl Position {
    pub const START: Position = Position {
        line: 1,
        column: 1,
        offset: 0,
    };

    /// The position reached after consuming `text` from here.
    pub fn advance(self, text: &str) -> Position {
        let offset = self.offset + text.len();
        match text.rfind('\n') {
            Some(last) => Position {
                line: self.line + text.matches('\n').count(),
                column: text[last + 1..].chars().count() + 1,
                offset,
            },
            None => Position {
                line: self.line,
                column: self.column + text.chars().count(),
                offset,
            },
        }
    }

    /// Walks `source` up to `offset`. Used where only byte offsets are known.
    pub fn locate(source: &str, offset: usize) -> Position {
        let mut offset = offset.min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }
        Position::START.advance(&source[..offset])
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open byte range into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl From<Range<usize>> for Span {
    fn from(Range { start, end }: Range<usize>) -> Self {
        Span { start, end }
    }
}

impl Span {
    pub fn union(s: Span, t: Span) -> Span {
        Span {
            start: s.start.min(t.start),
            end: s.end.max(t.end),
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Span { start, end } = self;
        write!(f, "[{start}..{end}]")
    }
}

/// One lexed (or synthesized) token.
///
/// `text` is `None` for a *synthetic* token: the stand-in for a nonterminal the parser has just
/// reduced. Names and text borrow from the matcher, the compiled table and the input, all of which
/// outlive a parse.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token<'a> {
    pub name: &'a str,
    pub text: Option<&'a str>,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl<'a> Token<'a> {
    pub fn new(name: &'a str, text: &'a str, at: Position) -> Token<'a> {
        Token {
            name,
            text: Some(text),
            line: at.line,
            column: at.column,
            offset: at.offset,
        }
    }

    pub fn synthetic(name: &'a str, at: Position) -> Token<'a> {
        Token {
            name,
            text: None,
            line: at.line,
            column: at.column,
            offset: at.offset,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.text.is_none()
    }

    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.offset,
        }
    }

    pub fn span(&self) -> Span {
        let len = self.text.map_or(0, str::len);
        Span {
            start: self.offset,
            end: self.offset + len,
        }
    }
}

impl Debug for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Token {
            name, line, column, ..
        } = self;
        write!(f, "{name} [{line}:{column}]")?;
        match self.text {
            Some(text) => write!(f, "(\"{}\")", text.escape_debug()),
            None => Ok(()),
        }
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.text {
            Some(text) => write!(f, "{} {:?}", self.name, text),
            None => write!(f, "{}", self.name),
        }
    }
}
