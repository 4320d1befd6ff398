use std::{collections::HashSet, fmt::Display, sync::Arc};

use crate::{
    symbol::{Symbol, write_name, write_sequence},
    token_data::Token,
};

/// A per-production reduction callback. Receives the reported name (the alias if one is set, the
/// rule name otherwise) and the production's children in order.
pub type Callback = Arc<dyn Fn(&str, &[Token<'_>]) + Send + Sync>;

/// What happens when a production is reduced.
#[derive(Clone, Default)]
pub enum Emit {
    /// Nothing is reported.
    None,
    /// Reported to the callback given to `parse`, or added to the tree.
    #[default]
    Report,
    /// Reported to a callback owned by the production.
    Callback(Callback),
    /// Helper rule of a repetition or optional. Appends `group`-sized slices to `collector`,
    /// failing once more than `max` groups are present (`max == 0` means no limit).
    Repetition {
        collector: String,
        max: usize,
        group: usize,
    },
    /// Helper rule of an alternation. Publishes the chosen branch under `collector`.
    Choice { collector: String },
    /// A production some of whose children are helper rules. Splices their collections back in
    /// before running `inner`.
    Merge { inner: Box<Emit> },
}

impl Emit {
    /// The emit with any `Merge` layers removed.
    pub fn innermost(&self) -> &Emit {
        match self {
            Emit::Merge { inner } => inner.innermost(),
            other => other,
        }
    }
}

impl std::fmt::Debug for Emit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Emit::None => write!(f, "None"),
            Emit::Report => write!(f, "Report"),
            Emit::Callback(_) => write!(f, "Callback(..)"),
            Emit::Repetition {
                collector,
                max,
                group,
            } => f
                .debug_struct("Repetition")
                .field("collector", collector)
                .field("max", max)
                .field("group", group)
                .finish(),
            Emit::Choice { collector } => f
                .debug_struct("Choice")
                .field("collector", collector)
                .finish(),
            Emit::Merge { inner } => f.debug_struct("Merge").field("inner", inner).finish(),
        }
    }
}

impl PartialEq for Emit {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Emit::None, Emit::None) | (Emit::Report, Emit::Report) => true,
            (Emit::Callback(a), Emit::Callback(b)) => Arc::ptr_eq(a, b),
            (
                Emit::Repetition {
                    collector: c1,
                    max: m1,
                    group: g1,
                },
                Emit::Repetition {
                    collector: c2,
                    max: m2,
                    group: g2,
                },
            ) => c1 == c2 && m1 == m2 && g1 == g2,
            (Emit::Choice { collector: a }, Emit::Choice { collector: b }) => a == b,
            (Emit::Merge { inner: a }, Emit::Merge { inner: b }) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Production {
    pub symbols: Vec<Symbol>,
    pub emit: Emit,
    /// Name reported instead of the rule's own.
    pub alias: Option<String>,
}

impl Production {
    pub fn new<I>(symbols: I) -> Production
    where
        I: IntoIterator,
        I::Item: Into<Symbol>,
    {
        Production {
            symbols: symbols.into_iter().map(Into::into).collect(),
            emit: Emit::Report,
            alias: None,
        }
    }

    /// A production that is never reported.
    pub fn silent<I>(symbols: I) -> Production
    where
        I: IntoIterator,
        I::Item: Into<Symbol>,
    {
        Production {
            emit: Emit::None,
            ..Production::new(symbols)
        }
    }

    pub fn empty() -> Production {
        Production::new(Vec::<Symbol>::new())
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Production {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn callback(mut self, callback: impl Fn(&str, &[Token<'_>]) + Send + Sync + 'static) -> Production {
        self.emit = Emit::Callback(Arc::new(callback));
        self
    }
}

impl Display for Production {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_sequence(f, &self.symbols)?;
        let sep = if self.symbols.is_empty() { "" } else { " " };
        match (&self.alias, self.emit.innermost()) {
            (_, Emit::None) => write!(f, "{sep}@_"),
            (Some(alias), _) => write!(f, "{sep}@{alias}"),
            (None, _) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub productions: Vec<Production>,
}

impl Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_name(f, &self.name)?;
        write!(f, " =")?;
        for (index, production) in self.productions.iter().enumerate() {
            let lead = if index == 0 { " " } else { "\n    | " };
            write!(f, "{lead}{production}")?;
        }
        write!(f, ";")
    }
}

/// An ordered set of rules. The first rule is the root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grammar {
    rules: Vec<Rule>,
}

impl Grammar {
    pub fn new() -> Grammar {
        Grammar::default()
    }

    /// Builder form of [`add_rule`](Self::add_rule).
    #[must_use]
    pub fn rule(
        mut self,
        name: impl Into<String>,
        productions: impl IntoIterator<Item = Production>,
    ) -> Grammar {
        self.add_rule(name, productions);
        self
    }

    /// Adds productions to the rule `name`, creating it at the end if it does not exist yet.
    pub fn add_rule(
        &mut self,
        name: impl Into<String>,
        productions: impl IntoIterator<Item = Production>,
    ) {
        let name = name.into();
        match self.rules.iter_mut().find(|r| r.name == name) {
            Some(rule) => rule.productions.extend(productions),
            None => self.rules.push(Rule {
                name,
                productions: productions.into_iter().collect(),
            }),
        }
    }

    pub fn root(&self) -> Option<&str> {
        self.rules.first().map(|r| r.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn rules_mut(&mut self) -> impl Iterator<Item = &mut Rule> {
        self.rules.iter_mut()
    }

    /// Names referenced by some production that are not rules, paired with the first rule that
    /// mentions them. These are terminals, so each must be produced by the token matcher.
    pub fn dangling_references(&self) -> Vec<(&str, &str)> {
        let mut seen = HashSet::new();
        let mut dangling = vec![];
        for rule in &self.rules {
            let names = rule
                .productions
                .iter()
                .flat_map(|p| &p.symbols)
                .flat_map(Symbol::names);
            for name in names {
                if !self.contains(name) && seen.insert(name) {
                    dangling.push((rule.name.as_str(), name));
                }
            }
        }
        dangling
    }
}

impl FromIterator<Rule> for Grammar {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        let mut grammar = Grammar::default();
        for Rule { name, productions } in iter {
            grammar.add_rule(name, productions);
        }
        grammar
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arithmetic() -> Grammar {
        Grammar::new()
            .rule(
                "Exp",
                [Production::new(["Exp", "+", "Term"]), Production::new(["Term"])],
            )
            .rule("Term", [Production::new(["d"]).alias("Number")])
    }

    #[test]
    fn first_rule_is_root_and_duplicates_append() {
        let mut g = arithmetic();
        g.add_rule("Exp", [Production::silent(["(", "Exp", ")"])]);
        assert_eq!(g.root(), Some("Exp"));
        assert_eq!(g.rules().count(), 2);
        assert_eq!(g.get("Exp").map(|r| r.productions.len()), Some(3));
    }

    #[test]
    fn dangling_references_are_terminals() {
        let g = arithmetic().rule("Unused", [Production::new([Symbol::repeat0(["x"].map(Symbol::from))])]);
        insta::assert_compact_debug_snapshot!(
            g.dangling_references(),
            @r#"[("Exp", "+"), ("Term", "d"), ("Unused", "x")]"#
        );
    }

    #[test]
    fn display_prints_notation() {
        let g = arithmetic()
            .rule("List", [Production::silent([Symbol::repeat1(["Exp"].map(Symbol::from))]), Production::empty()]);
        insta::assert_snapshot!(g.to_string(), @r"
        Exp = Exp '+' Term
            | Term;
        Term = d @Number;
        List = (Exp)+ @_
            | ;
        ");
    }

    #[test]
    fn callbacks_compare_by_identity() {
        let p = Production::new(["a"]).callback(|_, _| {});
        assert_eq!(p.clone(), p);
        assert_ne!(Production::new(["a"]).callback(|_, _| {}), p);
        assert_eq!(format!("{:?}", p.emit), "Callback(..)");
    }
}
