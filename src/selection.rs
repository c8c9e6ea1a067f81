//! Anchor-based multi-selection over a virtualized item sequence.
//!
//! The controller holds no state. Callers keep the anchor index and hand the
//! current item sequence in on every interaction; concurrent calls over the
//! same items must be serialized by the caller.

use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;

use crate::entry::Entry;
use crate::tree::TreeNode;

/// Anything carrying a selection flag.
pub trait Selectable {
    fn is_selected(&self) -> bool;
    fn set_selected(&mut self, selected: bool);
}

impl<E: Entry> Selectable for Arc<TreeNode<E>> {
    fn is_selected(&self) -> bool {
        TreeNode::is_selected(self)
    }

    fn set_selected(&mut self, selected: bool) {
        TreeNode::set_selected(self, selected);
    }
}

/// An indexable item sequence. Indices beyond what is realized are skipped.
pub trait VirtualItems {
    type Item: Selectable;

    fn item(&self, index: usize) -> Option<&Self::Item>;

    fn item_mut(&mut self, index: usize) -> Option<&mut Self::Item>;
}

impl<T: Selectable> VirtualItems for [T] {
    type Item = T;

    fn item(&self, index: usize) -> Option<&T> {
        self.get(index)
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut T> {
        self.get_mut(index)
    }
}

impl<T: Selectable> VirtualItems for Vec<T> {
    type Item = T;

    fn item(&self, index: usize) -> Option<&T> {
        self.get(index)
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut T> {
        self.get_mut(index)
    }
}

/// How plain clicks and modifiers combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// At most one item; modifiers are ignored.
    Single,
    /// Multi-select through the range and toggle modifiers.
    #[default]
    Extended,
    /// Multi-select where a plain click toggles.
    Toggle,
}

impl SelectionMode {
    /// Parse from a config string. Unknown values fall back to `Extended`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => SelectionMode::Single,
            "toggle" => SelectionMode::Toggle,
            _ => SelectionMode::Extended,
        }
    }

    pub fn allows_multiple(&self) -> bool {
        !matches!(self, SelectionMode::Single)
    }
}

/// One selection interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionInput {
    pub target: usize,
    /// `false` deselects the target only.
    pub select: bool,
    /// Shift-style: select the span between anchor and target.
    pub range: bool,
    /// Ctrl-style: flip the target only.
    pub toggle: bool,
}

impl SelectionInput {
    /// A plain click on `target`.
    pub fn click(target: usize) -> Self {
        Self {
            target,
            select: true,
            range: false,
            toggle: false,
        }
    }

    pub fn with_range(mut self) -> Self {
        self.range = true;
        self
    }

    pub fn with_toggle(mut self) -> Self {
        self.toggle = true;
        self
    }

    /// Deselect `target`.
    pub fn deselect(target: usize) -> Self {
        Self {
            select: false,
            ..Self::click(target)
        }
    }
}

/// Apply `input` to `items` (of logical length `count`) and return the new anchor.
///
/// Out-of-range targets are a no-op that returns `anchor` unchanged.
/// Deselecting and range-selecting keep the existing anchor; single select
/// and toggle move it to the target.
pub fn update_selection<L>(
    items: &mut L,
    count: usize,
    anchor: usize,
    input: SelectionInput,
    mode: SelectionMode,
) -> usize
where
    L: VirtualItems + ?Sized,
{
    let target = input.target;
    if target >= count {
        return anchor;
    }

    if !input.select {
        if let Some(item) = items.item_mut(target) {
            item.set_selected(false);
        }
        return anchor;
    }

    if input.range && mode.allows_multiple() {
        let (low, high) = if anchor <= target {
            (anchor, target)
        } else {
            (target, anchor)
        };
        for index in 0..count {
            if let Some(item) = items.item_mut(index) {
                item.set_selected((low..=high).contains(&index));
            }
        }
        return anchor;
    }

    if mode.allows_multiple() && (input.toggle || mode == SelectionMode::Toggle) {
        if let Some(item) = items.item_mut(target) {
            let flipped = !item.is_selected();
            item.set_selected(flipped);
        }
        return target;
    }

    for index in 0..count {
        if let Some(item) = items.item_mut(index) {
            item.set_selected(index == target);
        }
    }
    target
}

/// [`update_selection`] with a count that is still being computed.
pub async fn update_selection_async<L, C>(
    items: &mut L,
    count: C,
    anchor: usize,
    input: SelectionInput,
    mode: SelectionMode,
) -> usize
where
    L: VirtualItems + ?Sized,
    C: Future<Output = usize>,
{
    let count = count.await;
    update_selection(items, count, anchor, input, mode)
}

/// Indices of selected items among the first `count`.
pub fn selected_indices<L>(items: &L, count: usize) -> Vec<usize>
where
    L: VirtualItems + ?Sized,
{
    (0..count)
        .filter(|&i| items.item(i).is_some_and(|item| item.is_selected()))
        .collect()
}

/// Clear every selection flag among the first `count` items.
pub fn clear_selection<L>(items: &mut L, count: usize)
where
    L: VirtualItems + ?Sized,
{
    for index in 0..count {
        if let Some(item) = items.item_mut(index) {
            item.set_selected(false);
        }
    }
}
