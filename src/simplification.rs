use crate::{Grammar, Production, Symbol, symbol::replace_in_sequence};

impl Grammar {
    /// Canonicalises every production: single-branch groups are inlined into the surrounding
    /// sequence and alternations nested directly inside alternations are flattened.
    pub fn simplify(&mut self) {
        for rule in self.rules_mut() {
            for production in &mut rule.productions {
                production.simplify();
            }
        }
    }
}

impl Production {
    pub fn simplify(&mut self) {
        simplify_sequence(&mut self.symbols);
    }
}

pub(crate) fn simplify_sequence(seq: &mut Vec<Symbol>) {
    replace_in_sequence(seq, &mut simplify_node);
    *seq = inline_groups(seq);
}

fn simplify_node(n: &Symbol) -> Option<Symbol> {
    match n {
        Symbol::Repeat0(body) if has_group(body) => Some(Symbol::Repeat0(inline_groups(body))),
        Symbol::Repeat1(body) if has_group(body) => Some(Symbol::Repeat1(inline_groups(body))),
        Symbol::Optional(body) if has_group(body) => Some(Symbol::Optional(inline_groups(body))),
        Symbol::Bounded { min, max, body } if has_group(body) => Some(Symbol::Bounded {
            min: *min,
            max: *max,
            body: inline_groups(body),
        }),
        Symbol::Alternation(branches)
            if branches.iter().any(|b| has_group(b) || as_alternation(b).is_some()) =>
        {
            Some(Symbol::Alternation(flatten_choices(branches)))
        }
        _ => None,
    }
}

/// A parenthesised sequence with no `|`.
fn is_group(symbol: &Symbol) -> bool {
    matches!(symbol, Symbol::Alternation(branches) if branches.len() == 1)
}

fn has_group(seq: &[Symbol]) -> bool {
    seq.iter().any(is_group)
}

fn inline_groups(seq: &[Symbol]) -> Vec<Symbol> {
    let mut new_body = vec![];
    for symbol in seq {
        match symbol {
            Symbol::Alternation(branches) if branches.len() == 1 => {
                new_body.extend(branches[0].iter().cloned());
            }
            other => new_body.push(other.clone()),
        }
    }
    new_body
}

fn as_alternation(branch: &[Symbol]) -> Option<&[Vec<Symbol>]> {
    match branch {
        [Symbol::Alternation(inner)] if inner.len() > 1 => Some(inner),
        _ => None,
    }
}

fn flatten_choices(branches: &[Vec<Symbol>]) -> Vec<Vec<Symbol>> {
    let mut outputs = vec![];
    for branch in branches {
        let branch = inline_groups(branch);
        match as_alternation(&branch) {
            Some(inner) => outputs.extend(inner.iter().cloned()),
            None => outputs.push(branch),
        }
    }
    outputs
}
