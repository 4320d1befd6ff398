use std::fmt::Formatter;

use display_tree::{AsTree, DisplayTree, Style};

use crate::{
    error::ParseError,
    table::ReduceRule,
    token_data::{Span, Token},
};

/// A generic parse tree. Labels are rule names, or aliases where one is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTreeNode<'a> {
    pub label: &'a str,
    pub children: Vec<TreeChild<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChild<'a> {
    Node(ParseTreeNode<'a>),
    Leaf(Token<'a>),
}

impl<'a> ParseTreeNode<'a> {
    /// Every leaf token, left to right.
    pub fn leaves(&self) -> Vec<Token<'a>> {
        let mut out = vec![];
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<Token<'a>>) {
        for child in &self.children {
            match child {
                TreeChild::Node(node) => node.collect_leaves(out),
                TreeChild::Leaf(token) => out.push(*token),
            }
        }
    }

    /// Child nodes, skipping leaves.
    pub fn nodes(&self) -> impl Iterator<Item = &ParseTreeNode<'a>> {
        self.children.iter().filter_map(|c| match c {
            TreeChild::Node(n) => Some(n),
            TreeChild::Leaf(_) => None,
        })
    }

    /// Source range covered by the leaves, if there are any.
    pub fn span(&self) -> Option<Span> {
        self.leaves().iter().map(Token::span).reduce(Span::union)
    }

    pub fn depth(&self) -> usize {
        1 + self.nodes().map(ParseTreeNode::depth).max().unwrap_or(0)
    }
}

impl DisplayTree for ParseTreeNode<'_> {
    fn fmt(&self, f: &mut Formatter, style: Style) -> std::fmt::Result {
        let indentation = style.indentation as usize - 1;
        let horizontal_bar = format!("{:indentation$}", style.char_set.horizontal);
        let spacer = " ".repeat(horizontal_bar.chars().count());
        let vertical = style.char_set.vertical.to_string();

        writeln!(f, "{}", style.leaf_style.apply(self.label))?;
        let last = self.children.len().saturating_sub(1);
        for (n, child) in self.children.iter().enumerate() {
            let (connector, continued) = if n < last {
                (style.char_set.connector, vertical.as_str())
            } else {
                (style.char_set.end_connector, " ")
            };
            let rendered = AsTree::with_style(child, style).to_string();
            for (line_no, line) in rendered.lines().enumerate() {
                let lead = if line_no == 0 {
                    format!("{connector}{horizontal_bar}")
                } else {
                    format!("{continued}{spacer}")
                };
                writeln!(f, "{}{line}", style.branch_style.apply(&lead))?;
            }
        }
        Ok(())
    }
}

impl DisplayTree for TreeChild<'_> {
    fn fmt(&self, f: &mut Formatter, style: Style) -> std::fmt::Result {
        match self {
            TreeChild::Node(node) => DisplayTree::fmt(node, f, style),
            TreeChild::Leaf(token) => writeln!(f, "{}", style.leaf_style.apply(&token.to_string())),
        }
    }
}

/// Builds a [`ParseTreeNode`] alongside the shift-reduce loop.
///
/// One node is pushed per reduction; each synthetic child of a reduction pops the node built for
/// it. Nodes of helper rules are spliced into their parent, so the tree keeps the shape of the
/// grammar as written.
pub(crate) struct TreeBuilder<'a, 'k> {
    stack: Vec<(ParseTreeNode<'a>, bool)>,
    keep: &'k dyn Fn(&Token<'_>) -> bool,
}

impl<'a, 'k> TreeBuilder<'a, 'k> {
    pub(crate) fn new(keep: &'k dyn Fn(&Token<'_>) -> bool) -> TreeBuilder<'a, 'k> {
        TreeBuilder { stack: vec![], keep }
    }

    pub(crate) fn reduce(&mut self, rule: &'a ReduceRule, popped: &[Token<'a>]) -> Result<(), ParseError> {
        let wanted = popped.iter().filter(|t| t.is_synthetic()).count();
        if wanted > self.stack.len() {
            return Err(ParseError::Internal {
                expected: format!("{wanted} subtrees for `{rule}`"),
                found: self.stack.len().to_string(),
            });
        }
        let mut nodes = self.stack.split_off(self.stack.len() - wanted).into_iter();
        let mut children = Vec::with_capacity(popped.len());
        for token in popped {
            if !token.is_synthetic() {
                if (self.keep)(token) {
                    children.push(TreeChild::Leaf(*token));
                }
                continue;
            }
            match nodes.next() {
                Some((node, true)) => children.extend(node.children),
                Some((node, false)) => children.push(TreeChild::Node(node)),
                None => unreachable!("subtree count was checked above - this is a bug"),
            }
        }
        self.stack.push((
            ParseTreeNode {
                label: rule.label(),
                children,
            },
            rule.helper,
        ));
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<ParseTreeNode<'a>, ParseError> {
        match (self.stack.pop(), self.stack.len()) {
            (Some((root, _)), 0) => Ok(root),
            (root, rest) => Err(ParseError::Internal {
                expected: "a single tree".to_owned(),
                found: format!("{} trees", rest + usize::from(root.is_some())),
            }),
        }
    }
}

impl std::fmt::Debug for TreeBuilder<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeBuilder")
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}
