//! Traversal helpers over already-materialized state. None of these touch a
//! source or suspend.

use std::sync::Arc;

use crate::entry::Entry;
use crate::tree::node::TreeNode;

/// Iterator from a node up to and including its root.
pub struct ToRoot<E> {
    next: Option<Arc<TreeNode<E>>>,
}

impl<E: Entry> Iterator for ToRoot<E> {
    type Item = Arc<TreeNode<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

/// Yield `node`, then each ancestor up to the root.
pub fn enumerate_to_root<E: Entry>(node: &Arc<TreeNode<E>>) -> ToRoot<E> {
    ToRoot {
        next: Some(node.clone()),
    }
}

/// Same walk as [`enumerate_to_root`], projected to payload values.
pub fn enumerate_values_to_root<E: Entry + Clone>(
    node: &Arc<TreeNode<E>>,
) -> impl Iterator<Item = E> {
    enumerate_to_root(node).map(|n| n.value().clone())
}

/// Number of materialized descendants below `node`.
///
/// Only counts what is already in memory; an unmaterialized folder counts 0.
pub fn children_count<E: Entry>(node: &TreeNode<E>) -> usize {
    node.children()
        .map(|children| {
            children
                .iter()
                .map(|child| 1 + children_count(child))
                .sum()
        })
        .unwrap_or(0)
}

/// Depth-first, pre-order iterator over materialized descendants.
pub struct Descendants<E> {
    stack: Vec<(Arc<TreeNode<E>>, usize)>,
    max_depth: Option<usize>,
}

impl<E: Entry> Descendants<E> {
    fn push_children(&mut self, node: &TreeNode<E>, depth: usize) {
        if self.max_depth.is_some_and(|max| depth > max) {
            return;
        }
        if let Some(children) = node.children() {
            self.stack
                .extend(children.iter().rev().map(|child| (child.clone(), depth)));
        }
    }
}

impl<E: Entry> Iterator for Descendants<E> {
    type Item = Arc<TreeNode<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (node, depth) = self.stack.pop()?;
        self.push_children(&node, depth + 1);
        Some(node)
    }
}

/// Walk the cached subtree below `node` without expanding anything.
///
/// `max_depth` counts levels below `node` (1 = direct children only);
/// `None` walks everything materialized.
pub fn enumerate_children<E: Entry>(
    node: &TreeNode<E>,
    max_depth: Option<usize>,
) -> Descendants<E> {
    let mut walk = Descendants {
        stack: Vec::new(),
        max_depth,
    };
    walk.push_children(node, 1);
    walk
}
