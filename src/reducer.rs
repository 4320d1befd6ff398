use std::collections::HashMap;

use crate::{Emit, error::ParseError, table::ReduceRule, token_data::Token};

/// Children gathered by one helper-rule instance, waiting for its parent reduction.
#[derive(Debug, Default)]
struct Collection<'a> {
    tokens: Vec<Token<'a>>,
    groups: usize,
}

/// Per-parse scratch space for helper-rule reducers.
///
/// Each collector name maps to a stack of collections, so a helper rule that is reduced again
/// before its parent consumed the previous collection (through recursion) keeps both apart.
#[derive(Debug, Default)]
pub(crate) struct ReductionContext<'a> {
    collections: HashMap<&'a str, Vec<Collection<'a>>>,
}

impl<'a> ReductionContext<'a> {
    pub(crate) fn new() -> ReductionContext<'a> {
        ReductionContext::default()
    }

    /// Runs `rule`'s reducer over the tokens just popped for it.
    pub(crate) fn reduce(
        &mut self,
        rule: &'a ReduceRule,
        popped: &[Token<'a>],
        report: &mut dyn FnMut(&str, &[Token<'a>]),
    ) -> Result<(), ParseError> {
        self.apply(&rule.emit, rule, popped, popped, report)
    }

    /// Whether every helper collection has been handed to its parent.
    pub(crate) fn is_drained(&self) -> bool {
        self.collections.values().all(Vec::is_empty)
    }

    fn apply(
        &mut self,
        emit: &'a Emit,
        rule: &'a ReduceRule,
        popped: &[Token<'a>],
        children: &[Token<'a>],
        report: &mut dyn FnMut(&str, &[Token<'a>]),
    ) -> Result<(), ParseError> {
        match emit {
            Emit::None => Ok(()),
            Emit::Report => {
                report(rule.label(), children);
                Ok(())
            }
            Emit::Callback(callback) => {
                callback(rule.label(), children);
                Ok(())
            }
            Emit::Repetition {
                collector,
                max,
                group,
            } => self.repeat(collector, *max, *group, popped, children),
            Emit::Choice { collector } => {
                self.push(collector, children.to_vec(), 1);
                Ok(())
            }
            Emit::Merge { inner } => {
                let merged = self.splice(&rule.nonterminal, children);
                self.apply(inner, rule, popped, &merged, report)
            }
        }
    }

    fn repeat(
        &mut self,
        collector: &'a str,
        max: usize,
        group: usize,
        popped: &[Token<'a>],
        children: &[Token<'a>],
    ) -> Result<(), ParseError> {
        let is_self = |t: &Token<'_>| t.is_synthetic() && t.name == collector;
        let recursive = popped.first().is_some_and(is_self);
        let added = (popped.len() - usize::from(recursive)) / group.max(1);

        if !recursive {
            self.push(collector, children.to_vec(), added);
            return Ok(());
        }

        let Some(top) = self
            .collections
            .get_mut(collector)
            .and_then(|stack| stack.last_mut())
        else {
            return Err(ParseError::Internal {
                expected: format!("a collection for `{collector}`"),
                found: "none".to_owned(),
            });
        };
        top.groups += added;
        if max > 0 && top.groups > max {
            let culprit = children.get(1).unwrap_or(&children[0]);
            let rule = collector.split_once('#').map_or(collector, |(owner, _)| owner);
            return Err(ParseError::repetition_limit(rule, max, culprit));
        }
        top.tokens.extend_from_slice(&children[1..]);
        Ok(())
    }

    fn push(&mut self, collector: &'a str, tokens: Vec<Token<'a>>, groups: usize) {
        log::trace!("collect {groups} group(s) into {collector}");
        self.collections
            .entry(collector)
            .or_default()
            .push(Collection { tokens, groups });
    }

    /// Replaces each helper-rule child with the tokens it collected.
    fn splice(&mut self, reducing: &str, children: &[Token<'a>]) -> Vec<Token<'a>> {
        let mut out = Vec::with_capacity(children.len());
        for &child in children {
            if child.is_synthetic()
                && child.name != reducing
                && let Some(collection) = self.collections.get_mut(child.name).and_then(Vec::pop)
            {
                out.extend(collection.tokens);
            } else {
                out.push(child);
            }
        }
        out
    }
}
