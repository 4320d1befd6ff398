//! LALR(1) automaton construction.
//!
//! States are identified by the cores (production, dot) of their kernel items, so LR(1) states
//! that differ only in lookaheads are merged as they are discovered. When a merge grows a kernel's
//! lookaheads the state is queued again, and its successors pick up the growth in turn; the loop
//! stops once no lookahead set changes.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque, btree_map};

use crate::{
    desugar::{BnfGrammar, BnfProduction},
    error::GrammarError,
    table::{CompiledState, CompiledTable, ReduceRule, ResolvedConflict},
};

type SymbolId = usize;

/// The end-of-input sentinel, named `""`.
const END: SymbolId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Core {
    production: usize,
    dot: usize,
}

type ItemSet = BTreeMap<Core, BTreeSet<SymbolId>>;

#[derive(Debug)]
struct FlatProduction<'g> {
    rule: usize,
    lhs: SymbolId,
    rhs: Vec<SymbolId>,
    source: &'g BnfProduction,
}

/// Symbol interning plus nullable and FIRST sets.
#[derive(Debug)]
struct Analysis<'g> {
    grammar: &'g BnfGrammar,
    names: Vec<&'g str>,
    ids: HashMap<&'g str, SymbolId>,
    productions: Vec<FlatProduction<'g>>,
    /// Productions of each symbol; empty for terminals.
    by_symbol: Vec<Vec<usize>>,
    nullable: Vec<bool>,
    first: Vec<BTreeSet<SymbolId>>,
}

impl<'g> Analysis<'g> {
    fn new(grammar: &'g BnfGrammar) -> Analysis<'g> {
        let mut names = vec![""];
        let mut ids = HashMap::from([("", END)]);
        let mut intern = |name: &'g str| {
            *ids.entry(name).or_insert_with(|| {
                names.push(name);
                names.len() - 1
            })
        };

        let mut productions = vec![];
        for (rule, r) in grammar.rules.iter().enumerate() {
            let lhs = intern(&r.name);
            for p in &r.productions {
                let rhs = p.symbols.iter().map(|s| intern(s)).collect();
                productions.push(FlatProduction {
                    rule,
                    lhs,
                    rhs,
                    source: p,
                });
            }
        }

        let mut by_symbol = vec![vec![]; names.len()];
        for (index, p) in productions.iter().enumerate() {
            by_symbol[p.lhs].push(index);
        }

        let mut analysis = Analysis {
            grammar,
            first: (0..names.len())
                .map(|s| {
                    if s == END || !by_symbol[s].is_empty() {
                        BTreeSet::new()
                    } else {
                        BTreeSet::from([s])
                    }
                })
                .collect(),
            nullable: vec![false; names.len()],
            names,
            ids,
            productions,
            by_symbol,
        };
        analysis.compute_nullable();
        analysis.compute_first();
        analysis
    }

    fn compute_nullable(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for p in &self.productions {
                if !self.nullable[p.lhs] && p.rhs.iter().all(|&s| self.nullable[s]) {
                    self.nullable[p.lhs] = true;
                    changed = true;
                }
            }
        }
    }

    fn compute_first(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for p in &self.productions {
                let mut gained: BTreeSet<SymbolId> = BTreeSet::new();
                for &s in &p.rhs {
                    if s != p.lhs {
                        gained.extend(self.first[s].difference(&self.first[p.lhs]));
                    }
                    if !self.nullable[s] {
                        break;
                    }
                }
                if !gained.is_empty() {
                    self.first[p.lhs].extend(gained);
                    changed = true;
                }
            }
        }
    }

    fn is_nonterminal(&self, symbol: SymbolId) -> bool {
        !self.by_symbol[symbol].is_empty()
    }

    /// FIRST of `seq` followed by any of `tail`.
    fn first_of(&self, seq: &[SymbolId], tail: &BTreeSet<SymbolId>) -> BTreeSet<SymbolId> {
        let mut out = BTreeSet::new();
        for &s in seq {
            out.extend(&self.first[s]);
            if !self.nullable[s] {
                return out;
            }
        }
        out.extend(tail);
        out
    }

    fn closure(&self, kernel: &ItemSet) -> ItemSet {
        let mut items = kernel.clone();
        let mut work: Vec<Core> = items.keys().copied().collect();
        while let Some(core) = work.pop() {
            let rhs = &self.productions[core.production].rhs;
            let Some(&next) = rhs.get(core.dot) else {
                continue;
            };
            if !self.is_nonterminal(next) {
                continue;
            }
            let lookahead = self.first_of(&rhs[core.dot + 1..], &items[&core]);
            for &production in &self.by_symbol[next] {
                let core = Core { production, dot: 0 };
                match items.entry(core) {
                    btree_map::Entry::Vacant(slot) => {
                        slot.insert(lookahead.clone());
                        work.push(core);
                    }
                    btree_map::Entry::Occupied(mut slot) => {
                        let entry = slot.get_mut();
                        let before = entry.len();
                        entry.extend(&lookahead);
                        if entry.len() > before {
                            work.push(core);
                        }
                    }
                }
            }
        }
        items
    }

    /// Kernels reached from `items` by each symbol that appears after a dot.
    fn gotos(&self, items: &ItemSet) -> BTreeMap<SymbolId, ItemSet> {
        let mut gotos: BTreeMap<SymbolId, ItemSet> = BTreeMap::new();
        for (core, lookahead) in items {
            if let Some(&next) = self.productions[core.production].rhs.get(core.dot) {
                gotos
                    .entry(next)
                    .or_default()
                    .entry(Core {
                        production: core.production,
                        dot: core.dot + 1,
                    })
                    .or_default()
                    .extend(lookahead);
            }
        }
        gotos
    }

    fn describe(&self, production: usize) -> String {
        let p = &self.productions[production];
        let mut out = format!("{} ->", self.names[p.lhs]);
        if p.rhs.is_empty() {
            out.push_str(" (empty)");
        }
        for &s in &p.rhs {
            out.push(' ');
            out.push_str(self.names[s]);
        }
        out
    }
}

#[derive(Debug)]
struct State {
    kernel: ItemSet,
    items: ItemSet,
    transitions: BTreeMap<SymbolId, usize>,
}

impl State {
    fn new(analysis: &Analysis<'_>, kernel: ItemSet) -> State {
        State {
            items: analysis.closure(&kernel),
            kernel,
            transitions: BTreeMap::new(),
        }
    }

    fn key(&self) -> Vec<Core> {
        self.kernel.keys().copied().collect()
    }

    /// Unions `kernel`'s lookaheads into this state's. Returns whether anything grew.
    fn spread(&mut self, analysis: &Analysis<'_>, kernel: ItemSet) -> bool {
        let mut grew = false;
        for (core, lookahead) in kernel {
            let existing = self.kernel.entry(core).or_default();
            let before = existing.len();
            existing.extend(lookahead);
            grew |= existing.len() > before;
        }
        if grew {
            self.items = analysis.closure(&self.kernel);
        }
        grew
    }
}

/// The canonical LALR(1) collection of a desugared grammar.
#[derive(Debug)]
pub struct Automaton<'g> {
    analysis: Analysis<'g>,
    states: Vec<State>,
}

pub fn build(grammar: &BnfGrammar) -> Automaton<'_> {
    let analysis = Analysis::new(grammar);
    let root = analysis.ids[grammar.root()];
    let start: ItemSet = analysis.by_symbol[root]
        .iter()
        .map(|&production| (Core { production, dot: 0 }, BTreeSet::from([END])))
        .collect();

    let mut states = vec![State::new(&analysis, start)];
    let mut index = HashMap::from([(states[0].key(), 0)]);
    let mut queue = VecDeque::from([0]);
    let mut queued = vec![true];

    while let Some(s) = queue.pop_front() {
        queued[s] = false;
        for (symbol, kernel) in analysis.gotos(&states[s].items) {
            let key: Vec<Core> = kernel.keys().copied().collect();
            let target = if let Some(&t) = index.get(&key) {
                if states[t].spread(&analysis, kernel) && !queued[t] {
                    queued[t] = true;
                    queue.push_back(t);
                }
                t
            } else {
                let t = states.len();
                states.push(State::new(&analysis, kernel));
                index.insert(key, t);
                queued.push(true);
                queue.push_back(t);
                t
            };
            states[s].transitions.insert(symbol, target);
        }
    }

    log::debug!(
        "built {} LALR states over {} symbols and {} productions",
        states.len(),
        analysis.names.len(),
        analysis.productions.len()
    );
    Automaton { analysis, states }
}

impl Automaton<'_> {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Terminals that can begin `name`, with `""` standing for none of them. `None` if `name` is
    /// not a symbol of the grammar.
    pub fn first(&self, name: &str) -> Option<BTreeSet<&str>> {
        let &id = self.analysis.ids.get(name)?;
        Some(self.analysis.first[id].iter().map(|&s| self.analysis.names[s]).collect())
    }

    pub fn is_nullable(&self, name: &str) -> bool {
        self.analysis
            .ids
            .get(name)
            .is_some_and(|&id| self.analysis.nullable[id])
    }

    /// Compacts the automaton into shift and reduce tables.
    ///
    /// Two productions completing in one state on the same lookahead are a
    /// [`GrammarError::ReduceConflict`]. A lookahead that is both shifted and reduced keeps only
    /// the shift.
    pub fn optimize(&self) -> Result<CompiledTable, GrammarError> {
        let analysis = &self.analysis;
        let mut compiled = Vec::with_capacity(self.states.len());
        let mut resolved = vec![];

        for (index, state) in self.states.iter().enumerate() {
            let mut rules: Vec<ReduceRule> = vec![];
            let mut rule_of: HashMap<usize, usize> = HashMap::new();
            let mut claimed: BTreeMap<String, usize> = BTreeMap::new();
            let mut reduce = BTreeMap::new();

            for (core, lookahead) in &state.items {
                let p = &analysis.productions[core.production];
                if core.dot < p.rhs.len() {
                    continue;
                }
                let rule_index = *rule_of.entry(core.production).or_insert_with(|| {
                    let r = &analysis.grammar.rules[p.rule];
                    rules.push(ReduceRule {
                        nonterminal: r.name.clone(),
                        symbols: p.source.symbols.clone(),
                        emit: p.source.emit.clone(),
                        alias: p.source.alias.clone(),
                        helper: r.helper,
                    });
                    rules.len() - 1
                });
                for &l in lookahead {
                    let key = analysis.names[l];
                    if let Some(&other) = claimed.get(key)
                        && other != core.production
                    {
                        return Err(GrammarError::ReduceConflict {
                            lookahead: key.to_owned(),
                            first: analysis.describe(other),
                            second: analysis.describe(core.production),
                        });
                    }
                    claimed.insert(key.to_owned(), core.production);
                    reduce.insert(key.to_owned(), rule_index);
                }
            }

            let shift: BTreeMap<String, usize> = state
                .transitions
                .iter()
                .map(|(&symbol, &target)| (analysis.names[symbol].to_owned(), target))
                .collect();

            reduce.retain(|lookahead: &String, rule: &mut usize| {
                if !shift.contains_key(lookahead) {
                    return true;
                }
                let dropped = &rules[*rule];
                let conflict = ResolvedConflict {
                    state: index,
                    lookahead: lookahead.clone(),
                    dropped: dropped.to_string(),
                };
                log::warn!(
                    "shift/reduce conflict in state {index} on `{lookahead}`: shifting instead of reducing `{}`",
                    conflict.dropped
                );
                resolved.push(conflict);
                false
            });

            compiled.push(CompiledState {
                rules,
                reduce,
                shift,
            });
        }

        let table = CompiledTable::from_parts(compiled, analysis.grammar.root().to_owned(), resolved);
        log::debug!(
            "compiled table: {} states, {} shift and {} reduce entries",
            table.states().len(),
            table.states().iter().map(|s| s.shift.len()).sum::<usize>(),
            table.states().iter().map(|s| s.reduce.len()).sum::<usize>()
        );
        Ok(table)
    }
}
