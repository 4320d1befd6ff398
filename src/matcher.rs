//! Longest-match tokenizer over a runtime list of named patterns.
//!
//! A single alternation regex reports the *first* alternative that matches, not the longest. The
//! [`Matcher`] therefore keeps one union per suffix of the pattern list (`patterns[i..]`) and
//! re-runs the scan from just after whichever pattern won, collecting every pattern that matches at
//! the offset. The best candidate is the longest; ties go to the preferred token, then to literal
//! keywords, then to the earliest declaration.

use std::fmt::Debug;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    error::{GrammarError, LexError},
    token_data::{Position, Token},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenPattern {
    Regex(String),
    /// A literal whose text is the token's name.
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDef {
    pub name: String,
    pub pattern: TokenPattern,
}

/// Ordered token declarations. Order matters only for breaking ties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpec {
    defs: Vec<TokenDef>,
}

impl TokenSpec {
    pub fn new() -> TokenSpec {
        TokenSpec::default()
    }

    #[must_use]
    pub fn pattern(mut self, name: impl Into<String>, regex: impl Into<String>) -> TokenSpec {
        self.defs.push(TokenDef {
            name: name.into(),
            pattern: TokenPattern::Regex(regex.into()),
        });
        self
    }

    #[must_use]
    pub fn keyword(mut self, text: impl Into<String>) -> TokenSpec {
        self.defs.push(TokenDef {
            name: text.into(),
            pattern: TokenPattern::Keyword,
        });
        self
    }

    #[must_use]
    pub fn keywords<I, S>(self, texts: I) -> TokenSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts.into_iter().fold(self, TokenSpec::keyword)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenDef> {
        self.defs.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.iter().any(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl FromIterator<TokenDef> for TokenSpec {
    fn from_iter<T: IntoIterator<Item = TokenDef>>(iter: T) -> Self {
        TokenSpec {
            defs: iter.into_iter().collect(),
        }
    }
}

/// Tie-break hint for candidates of equal length.
#[derive(Clone, Copy, Default)]
pub enum Prefer<'p> {
    #[default]
    Nothing,
    Token(&'p str),
    /// Any token the predicate accepts, e.g. the names the parser can act on in its current state.
    Matching(&'p dyn Fn(&str) -> bool),
}

impl Prefer<'_> {
    fn wants(&self, name: &str) -> bool {
        match self {
            Prefer::Nothing => false,
            Prefer::Token(wanted) => *wanted == name,
            Prefer::Matching(accepts) => accepts(name),
        }
    }
}

impl Debug for Prefer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prefer::Nothing => write!(f, "Nothing"),
            Prefer::Token(name) => write!(f, "Token({name:?})"),
            Prefer::Matching(_) => write!(f, "Matching(..)"),
        }
    }
}

#[derive(Debug)]
struct Entry {
    name: String,
    keyword: bool,
    /// `\A`-anchored regex for this pattern alone.
    single: Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    index: usize,
    len: usize,
}

#[derive(Debug)]
pub struct Matcher {
    entries: Vec<Entry>,
    /// `cascades[i]` is the anchored union of `entries[i..]`.
    cascades: Vec<Regex>,
    /// Capture groups (outer wrapper included) contributed by `entries[..i]`.
    group_offsets: Vec<usize>,
    case_insensitive: bool,
}

impl Matcher {
    pub fn new(spec: &TokenSpec, case_sensitive: bool) -> Result<Matcher, GrammarError> {
        let compile = |name: &str, source: &str| {
            RegexBuilder::new(source)
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| GrammarError::InvalidPattern {
                    name: name.to_owned(),
                    message: e.to_string(),
                })
        };

        let mut sources = Vec::with_capacity(spec.len());
        let mut entries = Vec::with_capacity(spec.len());
        let mut group_offsets = vec![0];
        for def in spec.iter() {
            let (source, keyword) = match &def.pattern {
                TokenPattern::Regex(r) => (r.clone(), false),
                TokenPattern::Keyword => (regex::escape(&def.name), true),
            };
            let single = compile(&def.name, &format!(r"\A(?:{source})"))?;
            let inner_groups = single.captures_len() - 1;
            group_offsets.push(group_offsets[group_offsets.len() - 1] + 1 + inner_groups);
            entries.push(Entry {
                name: def.name.clone(),
                keyword,
                single,
            });
            sources.push(format!("({})", unnamed_groups(&source)));
        }

        let cascades = (0..sources.len())
            .map(|first| compile(&entries[first].name, &format!(r"\A(?:{})", sources[first..].join("|"))))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("compiled {} token patterns", entries.len());
        Ok(Matcher {
            entries,
            cascades,
            group_offsets,
            case_insensitive: !case_sensitive,
        })
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    pub fn is_keyword(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.keyword && e.name == name)
    }

    /// The best match starting exactly at `offset`, as `(token name, matched text)`.
    pub fn match_at<'m, 't>(
        &'m self,
        text: &'t str,
        offset: usize,
        prefer: Prefer<'_>,
    ) -> Option<(&'m str, &'t str)> {
        let rest = text.get(offset..)?;
        let Candidate { index, len } = self.longest(rest, prefer)?;
        Some((&self.entries[index].name, &rest[..len]))
    }

    pub fn stream<'a>(&'a self, text: &'a str) -> TokenStream<'a> {
        TokenStream {
            matcher: self,
            text,
            at: Position::START,
            backlog: Vec::new(),
            failed: false,
        }
    }

    /// Every token of `text`, or the first lexing failure.
    pub fn tokenize<'a>(&'a self, text: &'a str) -> Result<Vec<Token<'a>>, LexError> {
        self.stream(text).collect()
    }

    fn longest(&self, rest: &str, prefer: Prefer<'_>) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        let mut first = 0;
        while let Some(cascade) = self.cascades.get(first) {
            let Some(captures) = cascade.captures(rest) else {
                break;
            };
            let base = self.group_offsets[first];
            let Some(index) = (first..self.entries.len())
                .find(|&i| captures.get(1 + self.group_offsets[i] - base).is_some())
            else {
                unreachable!("a cascade matched without any of its patterns - this is a bug")
            };
            let len = captures.get(0).map_or(0, |m| m.len());
            if len > 0 {
                let candidate = Candidate { index, len };
                log::trace!("candidate {} ({len} bytes)", self.entries[index].name);
                best = Some(match best {
                    None => candidate,
                    Some(best) => self.pick(best, candidate, prefer),
                });
            }
            first = index + 1;
        }
        best
    }

    fn pick(&self, best: Candidate, candidate: Candidate, prefer: Prefer<'_>) -> Candidate {
        if candidate.len != best.len {
            return if candidate.len > best.len {
                candidate
            } else {
                best
            };
        }
        let (old, new) = (&self.entries[best.index].name, &self.entries[candidate.index].name);
        match (prefer.wants(old), prefer.wants(new)) {
            (false, true) => candidate,
            (true, false) => best,
            _ if self.is_keyword(new) && !self.is_keyword(old) => candidate,
            _ => best,
        }
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// `source` with every `(?P<name>...)` or `(?<name>...)` turned into a plain capture group.
///
/// The group count is unchanged, so the unions can still tell patterns apart by group index
/// while independent patterns are free to reuse a group name.
fn unnamed_groups(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.char_indices().peekable();
    let mut class_depth = 0usize;
    while let Some((i, c)) = chars.next() {
        out.push(c);
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            '[' => {
                class_depth += 1;
                if class_depth == 1 {
                    // A leading `]` (after an optional `^`) is a literal.
                    if let Some(&(_, '^')) = chars.peek() {
                        out.push('^');
                        chars.next();
                    }
                    if let Some(&(_, ']')) = chars.peek() {
                        out.push(']');
                        chars.next();
                    }
                }
            }
            ']' if class_depth > 0 => class_depth -= 1,
            '(' if class_depth == 0 => {
                let tail = &source[i + 1..];
                let Some(name) = tail.strip_prefix("?P<").or_else(|| tail.strip_prefix("?<")) else {
                    continue;
                };
                if let Some(close) = name.find('>') {
                    let end = i + 1 + (tail.len() - name.len()) + close + 1;
                    while chars.next_if(|&(j, _)| j < end).is_some() {}
                }
            }
            _ => {}
        }
    }
    out
}

/// Anything the parser runtime can pull tokens from.
pub trait TokenSource<'a> {
    /// `Ok(None)` once the input is exhausted.
    fn next_token(&mut self, prefer: Prefer<'_>) -> Result<Option<Token<'a>>, LexError>;

    /// Where the next token would start; the end of the input once exhausted.
    fn position(&self) -> Position;
}

/// Sequential scan of one input with line/column tracking and a put-back backlog.
#[derive(Debug)]
pub struct TokenStream<'a> {
    matcher: &'a Matcher,
    text: &'a str,
    at: Position,
    backlog: Vec<Token<'a>>,
    failed: bool,
}

impl<'a> TokenStream<'a> {
    pub fn next_token(&mut self, prefer: Prefer<'_>) -> Result<Option<Token<'a>>, LexError> {
        if let Some(token) = self.backlog.pop() {
            return Ok(Some(token));
        }
        let (matcher, text) = (self.matcher, self.text);
        let Some(rest) = text.get(self.at.offset..).filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        match matcher.longest(rest, prefer) {
            Some(Candidate { index, len }) => Ok(Some(self.consume(&matcher.entries[index].name, len))),
            None => {
                let character = rest.chars().next().unwrap_or_default();
                Err(LexError::at(character, self.at))
            }
        }
    }

    /// The next call to [`next_token`](Self::next_token) returns `token` again. Last in, first out.
    pub fn put_back(&mut self, token: Token<'a>) {
        log::trace!("put back {token:?}");
        self.backlog.push(token);
    }

    /// Reads the text at the current offset as the named token only, skipping the cascade.
    ///
    /// Put-back tokens are discarded first and the stream rewinds to the earliest of them, so
    /// text that was already read can be reinterpreted.
    pub fn expect_token(&mut self, name: &str) -> Option<Token<'a>> {
        self.rewind_backlog();
        let matcher = self.matcher;
        let entry = matcher.entry(name)?;
        let text = self.text;
        let rest = text.get(self.at.offset..)?;
        let len = entry.single.find(rest).map(|m| m.len()).filter(|&l| l > 0)?;
        Some(self.consume(&entry.name, len))
    }

    /// Reads `literal` at the current offset as a token named after itself.
    pub fn expect_string(&mut self, literal: &'a str) -> Option<Token<'a>> {
        self.rewind_backlog();
        let text = self.text;
        let rest = text.get(self.at.offset..)?;
        let head = rest.get(..literal.len())?;
        let matched = if self.matcher.case_insensitive {
            head.eq_ignore_ascii_case(literal)
        } else {
            head == literal
        };
        (matched && !literal.is_empty()).then(|| self.consume(literal, literal.len()))
    }

    pub fn position(&self) -> Position {
        self.backlog.last().map_or(self.at, Token::position)
    }

    pub fn is_exhausted(&self) -> bool {
        self.backlog.is_empty() && self.at.offset >= self.text.len()
    }

    fn consume(&mut self, name: &'a str, len: usize) -> Token<'a> {
        let start = self.at.offset;
        let text = &self.text[start..start + len];
        let token = Token::new(name, text, self.at);
        self.at = self.at.advance(text);
        token
    }

    fn rewind_backlog(&mut self) {
        if let Some(earliest) = self.backlog.iter().map(Token::position).min() {
            log::trace!("rewinding {} put-back tokens to {earliest}", self.backlog.len());
            self.at = earliest;
            self.backlog.clear();
        }
    }
}

impl<'a> TokenSource<'a> for TokenStream<'a> {
    fn next_token(&mut self, prefer: Prefer<'_>) -> Result<Option<Token<'a>>, LexError> {
        TokenStream::next_token(self, prefer)
    }

    fn position(&self) -> Position {
        TokenStream::position(self)
    }
}

impl<'a> Iterator for TokenStream<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_token(Prefer::Nothing) {
            Ok(token) => token.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
