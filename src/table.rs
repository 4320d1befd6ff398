use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::{
    Emit, Grammar,
    desugar::desugar,
    error::{GrammarError, TableError},
    lalr,
};

/// A production as the runtime sees it: fully desugared, with its reducer attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ReduceRule {
    pub nonterminal: String,
    pub symbols: Vec<String>,
    pub emit: Emit,
    pub alias: Option<String>,
    pub helper: bool,
}

impl ReduceRule {
    /// The name reductions of this rule are reported under.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.nonterminal)
    }
}

impl Display for ReduceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ->", self.nonterminal)?;
        if self.symbols.is_empty() {
            write!(f, " (empty)")?;
        }
        for symbol in &self.symbols {
            write!(f, " {symbol}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledState {
    pub rules: Vec<ReduceRule>,
    /// Lookahead name (`""` for end of input) to an index into `rules`.
    pub reduce: BTreeMap<String, usize>,
    /// Terminal or nonterminal name to the next state.
    pub shift: BTreeMap<String, usize>,
}

impl CompiledState {
    /// Whether this state has any action for a token named `name`.
    pub fn accepts(&self, name: &str) -> bool {
        self.shift.contains_key(name) || self.reduce.contains_key(name)
    }
}

/// A shift/reduce cell that was settled in favour of the shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub state: usize,
    pub lookahead: String,
    /// The production whose reduction was dropped, as `A -> x y`.
    pub dropped: String,
}

/// The immutable result of compiling a grammar. Parsing starts in state 0.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTable {
    states: Vec<CompiledState>,
    root: String,
    resolved: Vec<ResolvedConflict>,
}

impl CompiledTable {
    /// Desugars, builds and compacts `grammar`.
    pub fn compile(grammar: &Grammar) -> Result<CompiledTable, GrammarError> {
        let bnf = desugar(grammar)?;
        lalr::build(&bnf).optimize()
    }

    pub(crate) fn from_parts(
        states: Vec<CompiledState>,
        root: String,
        resolved: Vec<ResolvedConflict>,
    ) -> CompiledTable {
        CompiledTable {
            states,
            root,
            resolved,
        }
    }

    pub fn states(&self) -> &[CompiledState] {
        &self.states
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Every shift/reduce cell that was resolved by dropping the reduction. Empty for restored
    /// tables.
    pub fn resolved_conflicts(&self) -> &[ResolvedConflict] {
        &self.resolved
    }

    pub fn dump(&self, skip: &[String]) -> Result<TableDump, TableError> {
        let states = self
            .states
            .iter()
            .map(|state| {
                let rules = state
                    .rules
                    .iter()
                    .map(|rule| {
                        Ok(RuleDump {
                            nonterminal: rule.nonterminal.clone(),
                            symbols: rule.symbols.clone(),
                            emit: EmitDump::from_emit(&rule.emit, &rule.nonterminal)?,
                            alias: rule.alias.clone(),
                            helper: rule.helper,
                        })
                    })
                    .collect::<Result<_, TableError>>()?;
                Ok(StateDump {
                    rules,
                    reduce: state.reduce.clone(),
                    shift: state.shift.clone(),
                })
            })
            .collect::<Result<_, TableError>>()?;
        Ok(TableDump {
            root: self.root.clone(),
            skip: skip.to_vec(),
            states,
        })
    }

    /// Rebuilds a table from a dump, checking every index it contains.
    pub fn restore(dump: &TableDump) -> Result<CompiledTable, TableError> {
        let corrupt = |reason: String| Err(TableError::Corrupt { reason });
        if dump.states.is_empty() {
            return corrupt("no states".to_owned());
        }
        let count = dump.states.len();
        let mut reduces_root = false;
        let mut states = Vec::with_capacity(count);

        for (index, state) in dump.states.iter().enumerate() {
            if let Some((name, &target)) = state.shift.iter().find(|&(_, &t)| t >= count) {
                return corrupt(format!(
                    "state {index} shifts `{name}` to state {target}, but there are only {count} states"
                ));
            }
            if let Some((name, &rule)) = state.reduce.iter().find(|&(_, &r)| r >= state.rules.len()) {
                return corrupt(format!(
                    "state {index} reduces `{name}` by rule {rule}, but it has only {} rules",
                    state.rules.len()
                ));
            }
            reduces_root |= state.rules.iter().any(|r| r.nonterminal == dump.root);
            states.push(CompiledState {
                rules: state
                    .rules
                    .iter()
                    .map(|r| ReduceRule {
                        nonterminal: r.nonterminal.clone(),
                        symbols: r.symbols.clone(),
                        emit: r.emit.to_emit(),
                        alias: r.alias.clone(),
                        helper: r.helper,
                    })
                    .collect(),
                reduce: state.reduce.clone(),
                shift: state.shift.clone(),
            });
        }
        if !reduces_root {
            return corrupt(format!("no state reduces the root rule `{}`", dump.root));
        }

        log::debug!("restored table with {count} states");
        Ok(CompiledTable {
            states,
            root: dump.root.clone(),
            resolved: vec![],
        })
    }
}

/// Plain-data form of a compiled table together with the skip-token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDump {
    pub root: String,
    #[serde(default)]
    pub skip: Vec<String>,
    pub states: Vec<StateDump>,
}

impl TableDump {
    pub fn to_json(&self) -> Result<String, TableError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<TableDump, TableError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDump {
    pub rules: Vec<RuleDump>,
    pub reduce: BTreeMap<String, usize>,
    pub shift: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDump {
    pub nonterminal: String,
    pub symbols: Vec<String>,
    pub emit: EmitDump,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub helper: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmitDump {
    None,
    Report,
    Repetition {
        collector: String,
        max: usize,
        group: usize,
    },
    Choice {
        collector: String,
    },
    Merge {
        inner: Box<EmitDump>,
    },
}

impl EmitDump {
    fn from_emit(emit: &Emit, rule: &str) -> Result<EmitDump, TableError> {
        Ok(match emit {
            Emit::None => EmitDump::None,
            Emit::Report => EmitDump::Report,
            Emit::Callback(_) => {
                return Err(TableError::Callback {
                    rule: rule.to_owned(),
                });
            }
            Emit::Repetition {
                collector,
                max,
                group,
            } => EmitDump::Repetition {
                collector: collector.clone(),
                max: *max,
                group: *group,
            },
            Emit::Choice { collector } => EmitDump::Choice {
                collector: collector.clone(),
            },
            Emit::Merge { inner } => EmitDump::Merge {
                inner: Box::new(EmitDump::from_emit(inner, rule)?),
            },
        })
    }

    fn to_emit(&self) -> Emit {
        match self {
            EmitDump::None => Emit::None,
            EmitDump::Report => Emit::Report,
            EmitDump::Repetition {
                collector,
                max,
                group,
            } => Emit::Repetition {
                collector: collector.clone(),
                max: *max,
                group: *group,
            },
            EmitDump::Choice { collector } => Emit::Choice {
                collector: collector.clone(),
            },
            EmitDump::Merge { inner } => Emit::Merge {
                inner: Box::new(inner.to_emit()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Production, Symbol};

    fn list_grammar() -> Grammar {
        Grammar::new()
            .rule(
                "List",
                [Production::new([
                    Symbol::name("["),
                    Symbol::repeat0([Symbol::name("d")]),
                    Symbol::name("]"),
                ])
                .alias("Items")],
            )
    }

    #[test]
    fn dump_survives_json() {
        let table = CompiledTable::compile(&list_grammar()).unwrap();
        let dump = table.dump(&["sp".to_owned()]).unwrap();
        let json = dump.to_json().unwrap();
        assert!(json.contains("\"kind\": \"repetition\""), "{json}");

        let back = TableDump::from_json(&json).unwrap();
        assert_eq!(back, dump);
        assert_eq!(back.skip, ["sp"]);
        let restored = CompiledTable::restore(&back).unwrap();
        assert_eq!(restored.states(), table.states());
        assert_eq!(restored.root(), "List");
    }

    #[test]
    fn callbacks_cannot_be_dumped() {
        let g = Grammar::new().rule(
            "A",
            [Production::new([Symbol::optional([Symbol::name("x")])]).callback(|_, _| {})],
        );
        let table = CompiledTable::compile(&g).unwrap();
        assert_eq!(
            table.dump(&[]),
            Err(TableError::Callback { rule: "A".into() })
        );
    }

    #[test]
    fn restore_rejects_bad_indices() {
        let table = CompiledTable::compile(&list_grammar()).unwrap();
        let mut dump = table.dump(&[]).unwrap();
        dump.states[0].shift.insert("[".into(), 99);
        assert!(matches!(
            CompiledTable::restore(&dump),
            Err(TableError::Corrupt { reason }) if reason.contains("state 99")
        ));

        let mut dump = table.dump(&[]).unwrap();
        dump.root = "Missing".into();
        assert!(CompiledTable::restore(&dump).is_err());

        dump.states.clear();
        assert_eq!(
            CompiledTable::restore(&dump),
            Err(TableError::Corrupt {
                reason: "no states".into()
            })
        );
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(TableDump::from_json("{\"root\": 1}"), Err(TableError::Json(_))));
    }

    #[test]
    fn rule_display() {
        let table = CompiledTable::compile(&list_grammar()).unwrap();
        let mut rendered: Vec<String> = table
            .states()
            .iter()
            .flat_map(|s| &s.rules)
            .map(ToString::to_string)
            .collect();
        rendered.sort();
        rendered.dedup();
        insta::assert_compact_debug_snapshot!(
            rendered,
            @r#"["List -> [ List#0#1 ]", "List#0#1 -> (empty)", "List#0#1 -> List#0#1 d"]"#
        );
    }
}
