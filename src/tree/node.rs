use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::Mutex;

use crate::entry::Entry;

/// A materialized child sequence. Replaced wholesale, never edited in place.
pub type ChildList<E> = Arc<[Arc<TreeNode<E>>]>;

/// A node in the tree.
///
/// The parent owns its children through the child list; a child only holds a
/// weak link back up. Dropping a node's last handle drops its whole
/// materialized subtree.
pub struct TreeNode<E> {
    value: E,
    parent: Weak<TreeNode<E>>,
    depth: usize,
    selected: AtomicBool,
    expanded: AtomicBool,
    /// `None` until materialized; `Some` of an empty list is a folder with no children.
    children: RwLock<Option<ChildList<E>>>,
    /// Bumped each time a fresh materialization is installed. Re-sorting and
    /// collapsing leave it alone.
    materializations: AtomicU64,
    /// Held by whoever is writing `children`.
    writer: Mutex<()>,
}

impl<E: Entry> TreeNode<E> {
    /// Create a root node (no parent).
    pub fn new_root(value: E) -> Arc<Self> {
        Arc::new(Self::build(value, Weak::new(), 0))
    }

    /// Create a child owned by `parent`. The child is not attached until the
    /// parent's child list is replaced.
    pub(crate) fn new_child(parent: &Arc<Self>, value: E) -> Arc<Self> {
        Arc::new(Self::build(value, Arc::downgrade(parent), parent.depth + 1))
    }

    fn build(value: E, parent: Weak<Self>, depth: usize) -> Self {
        Self {
            value,
            parent,
            depth,
            selected: AtomicBool::new(false),
            expanded: AtomicBool::new(false),
            children: RwLock::new(None),
            materializations: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    pub fn value(&self) -> &E {
        &self.value
    }

    pub fn name(&self) -> &str {
        self.value.name()
    }

    pub fn is_folder(&self) -> bool {
        self.value.is_folder()
    }

    /// The owning node, if it is still alive.
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.upgrade()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.strong_count() > 0
    }

    /// Distance from the root (root is 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_selected(&self) -> bool {
        self.selected.load(Ordering::Relaxed)
    }

    pub fn set_selected(&self, selected: bool) {
        self.selected.store(selected, Ordering::Relaxed);
    }

    /// Whether the node is currently shown expanded.
    pub fn is_expanded(&self) -> bool {
        self.expanded.load(Ordering::Relaxed)
    }

    /// Whether children have been materialized (possibly zero of them).
    pub fn is_materialized(&self) -> bool {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Snapshot of the materialized children, if any.
    pub fn children(&self) -> Option<ChildList<E>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Find a materialized child by exact name.
    pub fn find_child(&self, name: &str) -> Option<Arc<Self>> {
        self.children()?
            .iter()
            .find(|child| child.name() == name)
            .cloned()
    }

    pub(crate) fn materializations(&self) -> u64 {
        self.materializations.load(Ordering::Acquire)
    }

    pub(crate) fn writer(&self) -> &Mutex<()> {
        &self.writer
    }

    /// Swap in a complete child list (or drop it with `None`).
    ///
    /// Callers must hold [`TreeNode::writer`].
    pub(crate) fn replace_children(&self, children: Option<ChildList<E>>) {
        debug_assert!(children.is_none() || self.is_folder());
        self.expanded.store(children.is_some(), Ordering::Relaxed);
        *self
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner) = children;
    }

    /// Install a list freshly fetched from the source.
    ///
    /// Callers must hold [`TreeNode::writer`].
    pub(crate) fn install_materialized(&self, children: ChildList<E>) {
        self.replace_children(Some(children));
        self.materializations.fetch_add(1, Ordering::Release);
    }
}

impl<E: Entry> fmt::Debug for TreeNode<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeNode")
            .field("name", &self.name())
            .field("depth", &self.depth)
            .field("is_folder", &self.is_folder())
            .field("is_selected", &self.is_selected())
            .field("materialized", &self.children().map(|c| c.len()))
            .finish_non_exhaustive()
    }
}
