//! Comparer subsystem: synchronous and asynchronous orderings over entries.
//!
//! Every ordering funnels through one sort routine. A synchronous
//! [`Comparer`] satisfies [`AsyncComparer`] through a blanket adapter, and the
//! sort routine takes the plain slice sort when the comparer exposes a
//! synchronous view.

use std::cmp::Ordering;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::entry::{Entry, SortKey};
use crate::error::{Error, Result};

/// A total preorder over entries, decided without suspending.
pub trait Comparer<E: Entry>: Send + Sync {
    fn compare(&self, a: &E, b: &E) -> Ordering;
}

/// A total preorder over entries whose decision may itself need to await,
/// e.g. when metadata is still being fetched from a remote backend.
#[async_trait]
pub trait AsyncComparer<E: Entry>: Send + Sync {
    async fn compare_async(&self, a: &E, b: &E) -> Ordering;

    /// Synchronous view of this comparer, when it has one.
    fn as_sync(&self) -> Option<&dyn Comparer<E>> {
        None
    }
}

#[async_trait]
impl<E: Entry, C: Comparer<E>> AsyncComparer<E> for C {
    async fn compare_async(&self, a: &E, b: &E) -> Ordering {
        self.compare(a, b)
    }

    fn as_sync(&self) -> Option<&dyn Comparer<E>> {
        Some(self)
    }
}

impl<E: Entry> Comparer<E> for SortKey {
    fn compare(&self, a: &E, b: &E) -> Ordering {
        compare_entries(*self, a, b)
    }
}

/// Compare two entries under `key`.
///
/// Every key falls back to the name ordering on ties, so the result never
/// depends on input order.
pub fn compare_entries<E: Entry>(key: SortKey, a: &E, b: &E) -> Ordering {
    let primary = match key {
        SortKey::None => b.is_folder().cmp(&a.is_folder()),
        SortKey::Name => Ordering::Equal,
        SortKey::Edited => b.edited_on().cmp(&a.edited_on()),
        SortKey::Size => a.size().cmp(&b.size()),
        SortKey::Extension => compare_names(a.extension(), b.extension()),
    };
    primary.then_with(|| compare_names(a.name(), b.name()))
}

/// Case-insensitive name ordering, with the raw string as tie-break.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

/// Stable sort of `items` by the entries `project` exposes.
///
/// Synchronous comparers take the slice sort. Asynchronous ones go through a
/// bottom-up merge sort that awaits each comparison and checks `cancel`
/// between passes.
pub async fn sort_async<T, E, C, P>(
    mut items: Vec<T>,
    comparer: &C,
    project: P,
    cancel: &CancellationToken,
) -> Result<Vec<T>>
where
    T: Send + Sync,
    E: Entry,
    C: AsyncComparer<E> + ?Sized,
    P: Fn(&T) -> &E + Send + Sync,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    if let Some(sync) = comparer.as_sync() {
        items.sort_by(|a, b| sync.compare(project(a), project(b)));
        return Ok(items);
    }

    let mut runs: Vec<Vec<T>> = items.into_iter().map(|item| vec![item]).collect();
    while runs.len() > 1 {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut merged = Vec::with_capacity(runs.len().div_ceil(2));
        let mut pending = runs.into_iter();
        while let Some(left) = pending.next() {
            match pending.next() {
                Some(right) => merged.push(merge(left, right, comparer, &project).await),
                None => merged.push(left),
            }
        }
        runs = merged;
    }
    Ok(runs.pop().unwrap_or_default())
}

async fn merge<T, E, C, P>(left: Vec<T>, right: Vec<T>, comparer: &C, project: &P) -> Vec<T>
where
    T: Send + Sync,
    E: Entry,
    C: AsyncComparer<E> + ?Sized,
    P: Fn(&T) -> &E + Send + Sync,
{
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        // Ties keep the left run first.
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => {
                comparer.compare_async(project(l), project(r)).await != Ordering::Greater
            }
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        out.extend(if take_left { left.next() } else { right.next() });
    }
    out
}
