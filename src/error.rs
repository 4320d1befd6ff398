use std::ops::Range;

use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::token_data::{Position, Token};

/// No token pattern matches at the current offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected character {character:?} at {line}:{column}")]
pub struct LexError {
    pub character: char,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl LexError {
    pub(crate) fn at(character: char, at: Position) -> LexError {
        LexError {
            character,
            line: at.line,
            column: at.column,
            offset: at.offset,
        }
    }

    pub fn report(&self, source: &str) -> String {
        let span = self.offset..self.offset + self.character.len_utf8();
        render(&self.to_string(), "no token starts here", span, source)
    }
}

/// Raised while compiling token patterns or a grammar. No table exists after one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("grammar has no rules")]
    Empty,
    #[error("invalid pattern for token `{name}`: {message}")]
    InvalidPattern { name: String, message: String },
    #[error("invalid repetition bounds {{{min},{max}}} in rule `{rule}`")]
    InvalidBounds { rule: String, min: usize, max: usize },
    #[error("{kind} with an empty body in rule `{rule}`")]
    EmptyBody { rule: String, kind: &'static str },
    #[error("reduce/reduce conflict on {}: `{first}` vs `{second}`", lookahead_name(.lookahead))]
    ReduceConflict {
        lookahead: String,
        first: String,
        second: String,
    },
}

fn lookahead_name(lookahead: &str) -> String {
    if lookahead.is_empty() {
        "end of input".to_owned()
    } else {
        format!("`{lookahead}`")
    }
}

/// Raised by a single `parse` call. The parser and its table stay usable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("unexpected {name} {text:?} at {line}:{column}")]
    UnexpectedToken {
        name: String,
        text: String,
        line: usize,
        column: usize,
        offset: usize,
    },
    #[error("unexpected end of input at {line}:{column}")]
    UnexpectedEof {
        line: usize,
        column: usize,
        offset: usize,
    },
    #[error("`{rule}` allows at most {max} repetitions, found {name} {text:?} at {line}:{column}")]
    RepetitionLimit {
        rule: String,
        max: usize,
        name: String,
        text: String,
        line: usize,
        column: usize,
        offset: usize,
    },
    #[error("internal error: expected `{expected}` on the parse stack, found `{found}` - this is a bug")]
    Internal { expected: String, found: String },
}

impl ParseError {
    pub(crate) fn unexpected(token: &Token<'_>) -> ParseError {
        ParseError::UnexpectedToken {
            name: token.name.to_owned(),
            text: token.text.unwrap_or_default().to_owned(),
            line: token.line,
            column: token.column,
            offset: token.offset,
        }
    }

    pub(crate) fn eof(at: Position) -> ParseError {
        ParseError::UnexpectedEof {
            line: at.line,
            column: at.column,
            offset: at.offset,
        }
    }

    pub(crate) fn repetition_limit(rule: &str, max: usize, token: &Token<'_>) -> ParseError {
        ParseError::RepetitionLimit {
            rule: rule.to_owned(),
            max,
            name: token.name.to_owned(),
            text: token.text.unwrap_or_default().to_owned(),
            line: token.line,
            column: token.column,
            offset: token.offset,
        }
    }

    /// Where in the input the failure was detected, if anywhere.
    pub fn position(&self) -> Option<Position> {
        match self {
            ParseError::Lex(LexError {
                line,
                column,
                offset,
                ..
            })
            | ParseError::UnexpectedToken {
                line,
                column,
                offset,
                ..
            }
            | ParseError::UnexpectedEof {
                line,
                column,
                offset,
            }
            | ParseError::RepetitionLimit {
                line,
                column,
                offset,
                ..
            } => Some(Position {
                line: *line,
                column: *column,
                offset: *offset,
            }),
            ParseError::Internal { .. } => None,
        }
    }

    /// Renders the error as a labelled snippet of `source`.
    pub fn report(&self, source: &str) -> String {
        match self {
            ParseError::Lex(e) => e.report(source),
            ParseError::UnexpectedToken { text, offset, .. } => render(
                &self.to_string(),
                "not expected here",
                *offset..offset + text.len().max(1),
                source,
            ),
            ParseError::RepetitionLimit { text, offset, .. } => render(
                &self.to_string(),
                "one repetition too many",
                *offset..offset + text.len().max(1),
                source,
            ),
            ParseError::UnexpectedEof { .. } => {
                let end = source.len();
                let start = source
                    .char_indices()
                    .next_back()
                    .map_or(end, |(index, _)| index);
                if start == end {
                    return self.to_string();
                }
                render(&self.to_string(), "input ends here", start..end, source)
            }
            ParseError::Internal { .. } => self.to_string(),
        }
    }
}

/// Raised when dumping or restoring a compiled table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("rule `{rule}` carries an in-process callback and cannot be dumped")]
    Callback { rule: String },
    #[error("corrupt table: {reason}")]
    Corrupt { reason: String },
    #[error("malformed table data: {0}")]
    Json(String),
}

impl From<serde_json::Error> for TableError {
    fn from(value: serde_json::Error) -> Self {
        TableError::Json(value.to_string())
    }
}

/// Raised by [`Grammar::parse`](crate::Grammar::parse).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotationError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error("alias `@{alias}` in rule `{rule}` is only allowed on a top-level alternative")]
    MisplacedAlias { rule: String, alias: String },
    #[error("repetition bound `{text}` at {line}:{column} is out of range")]
    InvalidBound {
        text: String,
        line: usize,
        column: usize,
    },
}

impl NotationError {
    pub fn report(&self, source: &str) -> String {
        match self {
            NotationError::Parse(e) => e.report(source),
            other => other.to_string(),
        }
    }
}

fn render(message: &str, label: &str, span: Range<usize>, source: &str) -> String {
    if source.get(span.clone()).is_none() {
        return message.to_owned();
    }
    let mut out = Vec::new();
    let written = Report::build(ReportKind::Error, span.clone())
        .with_config(
            Config::default()
                .with_color(false)
                .with_index_type(IndexType::Byte),
        )
        .with_message(message)
        .with_label(Label::new(span).with_message(label))
        .finish()
        .write(Source::from(source), &mut out);
    match written {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_end_of_input() {
        let e = GrammarError::ReduceConflict {
            lookahead: String::new(),
            first: "A -> a".into(),
            second: "B -> a".into(),
        };
        assert_eq!(
            e.to_string(),
            "reduce/reduce conflict on end of input: `A -> a` vs `B -> a`"
        );
    }

    #[test]
    fn report_mentions_message() {
        let e = ParseError::UnexpectedToken {
            name: "+".into(),
            text: "+".into(),
            line: 1,
            column: 3,
            offset: 2,
        };
        let report = e.report("1++");
        assert!(report.contains("unexpected + \"+\" at 1:3"), "{report}");
        assert!(report.contains("not expected here"), "{report}");
    }

    #[test]
    fn eof_report_on_empty_source() {
        let e = ParseError::eof(Position::START);
        assert_eq!(e.report(""), "unexpected end of input at 1:1");
    }
}
