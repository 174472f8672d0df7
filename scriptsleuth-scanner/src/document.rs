//! Document-order index over a parsed page.
//!
//! Positions are computed once per crawl by flattening the element tree
//! depth-first, pre-order, starting at (and including) the root element.
//! Distance and "closest preceding" queries are answered from that single
//! flattening.

use crate::error::IndexError;
use crate::page::{NodeKey, Page};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct DocumentIndex {
    order: Vec<NodeKey>,
    positions: HashMap<NodeKey, usize>,
}

impl DocumentIndex {
    pub fn build(page: &Page) -> Self {
        let mut order = Vec::with_capacity(page.len());

        if !page.is_empty() {
            let mut stack = vec![page.root()];
            while let Some(node) = stack.pop() {
                order.push(node);
                stack.extend(page.children(node).iter().rev().copied());
            }
        }

        let positions = order
            .iter()
            .enumerate()
            .map(|(position, node)| (*node, position))
            .collect();

        Self { order, positions }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in document order.
    pub fn iter(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.order.iter().copied()
    }

    pub fn position(&self, node: NodeKey) -> Result<usize, IndexError> {
        self.positions
            .get(&node)
            .copied()
            .ok_or(IndexError::NotFound(node))
    }

    /// Absolute difference of the two nodes' positions.
    pub fn distance(&self, a: NodeKey, b: NodeKey) -> Result<usize, IndexError> {
        Ok(self.position(a)?.abs_diff(self.position(b)?))
    }

    /// The nearest node before `node` in document order that satisfies
    /// `predicate`. Returns `None` when `node` is not indexed.
    pub fn closest_preceding<P>(&self, node: NodeKey, mut predicate: P) -> Option<NodeKey>
    where
        P: FnMut(NodeKey) -> bool,
    {
        let position = self.position(node).ok()?;
        self.order[..position]
            .iter()
            .rev()
            .copied()
            .find(|candidate| predicate(*candidate))
    }
}
