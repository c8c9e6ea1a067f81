//! The tree engine: materializes children through the scheduler, orders them
//! with the active comparer, and keeps one writer per node.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::compare::{sort_async, AsyncComparer};
use crate::config::AppConfig;
use crate::entry::{Entry, EntryFilter, PathSegment, SortKey};
use crate::error::{Error, Result, SourceError, SourceResult};
use crate::scheduler::Scheduler;
use crate::source::ItemSource;
use crate::tree::node::{ChildList, TreeNode};
use crate::tree::walk::enumerate_children;

/// Single-pass iterator over one materialization of a node's children.
///
/// Iterating again requires another [`TreeEngine::expand`].
pub struct ChildIter<E> {
    children: ChildList<E>,
    next: usize,
}

impl<E> ChildIter<E> {
    fn new(children: ChildList<E>) -> Self {
        Self { children, next: 0 }
    }
}

impl<E> Iterator for ChildIter<E> {
    type Item = Arc<TreeNode<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        let child = self.children.get(self.next)?.clone();
        self.next += 1;
        Some(child)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.children.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl<E> ExactSizeIterator for ChildIter<E> {}

impl<E: Entry> fmt::Debug for ChildIter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildIter")
            .field("len", &self.children.len())
            .field("next", &self.next)
            .finish()
    }
}

/// Outcome of a forced multi-level expansion.
pub struct ExpansionReport<E> {
    /// Every node reached, level by level.
    pub nodes: Vec<Arc<TreeNode<E>>>,
    /// Folders whose expansion failed; their siblings were still expanded.
    pub failures: Vec<(Arc<TreeNode<E>>, Error)>,
}

impl<E> Default for ExpansionReport<E> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<E: Entry> fmt::Debug for ExpansionReport<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpansionReport")
            .field("nodes", &self.nodes)
            .field("failures", &self.failures)
            .finish()
    }
}

impl<E> ExpansionReport<E> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns the source, the scheduler and the ordering policy.
pub struct TreeEngine<E: Entry, S> {
    source: Arc<S>,
    scheduler: Scheduler,
    comparer: RwLock<Arc<dyn AsyncComparer<E>>>,
    filter: EntryFilter,
    timeout: Option<Duration>,
}

impl<E: Entry, S: ItemSource<E>> TreeEngine<E, S> {
    /// Engine with default pools, the `None` sort key and no timeout.
    pub fn new(source: S) -> Self {
        Self::from_shared(Arc::new(source))
    }

    pub fn from_shared(source: Arc<S>) -> Self {
        let comparer: Arc<dyn AsyncComparer<E>> = Arc::new(SortKey::None);
        Self {
            source,
            scheduler: Scheduler::default(),
            comparer: RwLock::new(comparer),
            filter: EntryFilter::default(),
            timeout: None,
        }
    }

    /// Engine configured from the merged application config.
    pub fn configured(source: S, config: &AppConfig) -> Self {
        Self::new(source)
            .with_scheduler(Scheduler::new(
                config.primary_workers(),
                config.secondary_workers(),
            ))
            .with_sort_key(config.sort_key())
            .with_filter(EntryFilter {
                show_hidden: config.show_hidden(),
                ..Default::default()
            })
            .with_timeout(config.source_timeout())
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort_key(self, key: SortKey) -> Self {
        self.with_comparer(Arc::new(key))
    }

    pub fn with_comparer(self, comparer: Arc<dyn AsyncComparer<E>>) -> Self {
        self.set_comparer(comparer);
        self
    }

    /// Give up on a source call after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn filter(&self) -> &EntryFilter {
        &self.filter
    }

    /// The comparer new expansions will sort with.
    pub fn comparer(&self) -> Arc<dyn AsyncComparer<E>> {
        self.comparer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the comparer for future expansions. Already materialized
    /// children keep their order until [`TreeEngine::resort`].
    pub fn set_comparer(&self, comparer: Arc<dyn AsyncComparer<E>>) {
        *self
            .comparer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = comparer;
    }

    /// Resolve `path` into a root node.
    pub async fn open(&self, path: &str, cancel: &CancellationToken) -> Result<Arc<TreeNode<E>>> {
        let source = self.source.clone();
        let timeout = self.timeout;
        let path = path.to_string();
        self.scheduler
            .submit_primary(cancel.clone(), move |cancel| async move {
                let entry = guarded(&path, timeout, &cancel, source.entry(&path)).await?;
                debug!("opened {path}");
                Ok(TreeNode::new_root(entry))
            })
            .join()
            .await
    }

    /// Materialize `node`'s children and return them in comparer order.
    ///
    /// A caller that had to wait behind a concurrent expansion of the same
    /// node gets that expansion's result instead of starting another one.
    pub async fn expand(
        &self,
        node: &Arc<TreeNode<E>>,
        cancel: &CancellationToken,
    ) -> Result<ChildIter<E>> {
        self.expand_inner(node, cancel, true).await
    }

    /// Re-materialize `node`'s children even if another expansion just finished.
    pub async fn refresh(
        &self,
        node: &Arc<TreeNode<E>>,
        cancel: &CancellationToken,
    ) -> Result<ChildIter<E>> {
        self.expand_inner(node, cancel, false).await
    }

    async fn expand_inner(
        &self,
        node: &Arc<TreeNode<E>>,
        cancel: &CancellationToken,
        join_concurrent: bool,
    ) -> Result<ChildIter<E>> {
        if !node.is_folder() {
            return Err(Error::NotAFolder(node.value().with_path(str::to_owned)));
        }
        let observed = node.materializations();
        let _writer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = node.writer().lock() => guard,
        };

        // Only a materialization that finished while we waited counts;
        // a resort or collapse in between does not.
        if join_concurrent && node.materializations() != observed {
            if let Some(children) = node.children() {
                debug!("{}: joined concurrent expansion", node.name());
                return Ok(ChildIter::new(children));
            }
        }

        let children = self.materialize(node, cancel).await?;
        debug!("{}: materialized {} children", node.name(), children.len());
        node.install_materialized(children.clone());
        Ok(ChildIter::new(children))
    }

    /// Enumerate and sort `node`'s children on the primary pool without
    /// touching the node itself.
    async fn materialize(
        &self,
        node: &Arc<TreeNode<E>>,
        cancel: &CancellationToken,
    ) -> Result<ChildList<E>> {
        let source = self.source.clone();
        let comparer = self.comparer();
        let filter = self.filter.clone();
        let timeout = self.timeout;
        let parent = node.clone();

        self.scheduler
            .submit_primary(cancel.clone(), move |cancel| async move {
                let mut stream = parent
                    .value()
                    .with_path(|path| source.entries(path, &filter, false));
                let collect = async {
                    let mut entries = Vec::new();
                    while let Some(entry) = stream.next().await {
                        entries.push(entry?);
                    }
                    Ok::<_, SourceError>(entries)
                };
                let path = parent.value().with_path(str::to_owned);
                let entries = guarded(&path, timeout, &cancel, collect).await?;

                let children: Vec<_> = entries
                    .into_iter()
                    .map(|entry| TreeNode::new_child(&parent, entry))
                    .collect();
                let sorted = sort_async(children, &*comparer, |child| child.value(), &cancel).await?;
                Ok(Arc::from(sorted))
            })
            .join()
            .await
    }

    /// Drop `node`'s materialized subtree.
    pub async fn collapse(&self, node: &Arc<TreeNode<E>>) {
        let _writer = node.writer().lock().await;
        if node.is_materialized() {
            debug!("{}: collapsed", node.name());
            node.replace_children(None);
        }
    }

    /// Re-sort everything materialized under `root` by `key`, then make `key`
    /// the engine's comparer.
    ///
    /// If cancelled, the engine keeps its previous comparer. Lists that were
    /// already re-sorted keep the new order until their next resort or
    /// expansion.
    pub async fn sort_by(
        &self,
        root: &Arc<TreeNode<E>>,
        key: SortKey,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let comparer: Arc<dyn AsyncComparer<E>> = Arc::new(key);
        self.resort_with(root, comparer.clone(), cancel).await?;
        self.set_comparer(comparer);
        Ok(())
    }

    /// Re-sort every materialized child list under `root` with the current
    /// comparer. Never calls the source.
    pub async fn resort(&self, root: &Arc<TreeNode<E>>, cancel: &CancellationToken) -> Result<()> {
        self.resort_with(root, self.comparer(), cancel).await
    }

    async fn resort_with(
        &self,
        root: &Arc<TreeNode<E>>,
        comparer: Arc<dyn AsyncComparer<E>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut folders = vec![root.clone()];
        folders.extend(enumerate_children(root, None).filter(|n| n.is_materialized()));

        for folder in folders {
            // Same order as expansion: node lock first, then a pool slot.
            let _writer = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                guard = folder.writer().lock() => guard,
            };
            let Some(children) = folder.children() else {
                continue;
            };
            let comparer = comparer.clone();
            let sorted = self
                .scheduler
                .submit_primary(cancel.clone(), move |cancel| async move {
                    let sorted =
                        sort_async(children.to_vec(), &*comparer, |c| c.value(), &cancel).await?;
                    Ok(ChildList::from(sorted))
                })
                .join()
                .await?;
            folder.replace_children(Some(sorted));
        }
        debug!("{}: re-sorted", root.name());
        Ok(())
    }

    /// Expand `node` and every folder below it down to `max_depth` levels
    /// (`None` = unbounded), siblings concurrently.
    ///
    /// This always goes to the source; [`enumerate_children`] is the
    /// cached-only counterpart. A failing folder is recorded in the report
    /// and does not stop its siblings. Cancellation aborts the whole walk.
    pub async fn expand_descendants(
        &self,
        node: &Arc<TreeNode<E>>,
        max_depth: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<ExpansionReport<E>> {
        if !node.is_folder() {
            return Err(Error::NotAFolder(node.value().with_path(str::to_owned)));
        }
        let mut report = ExpansionReport::default();
        let mut frontier = vec![node.clone()];
        let mut depth = 0;

        while !frontier.is_empty() && max_depth.map_or(true, |max| depth < max) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let results = join_all(frontier.iter().map(|n| self.refresh(n, cancel))).await;
            let mut next = Vec::new();
            for (folder, result) in frontier.iter().zip(results) {
                match result {
                    Ok(children) => {
                        for child in children {
                            if child.is_folder() {
                                next.push(child.clone());
                            }
                            report.nodes.push(child);
                        }
                    }
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) => {
                        warn!("{}: expansion failed: {}", folder.name(), e);
                        report.failures.push((folder.clone(), e));
                    }
                }
            }
            frontier = next;
            depth += 1;
        }
        Ok(report)
    }

    /// The source's count of `node`'s direct children, fetched on the
    /// secondary pool. Does not materialize anything.
    pub async fn entry_count(
        &self,
        node: &Arc<TreeNode<E>>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if !node.is_folder() {
            return Ok(0);
        }
        let source = self.source.clone();
        let filter = self.filter.clone();
        let timeout = self.timeout;
        let path = node.value().with_path(str::to_owned);
        self.scheduler
            .submit_secondary(cancel.clone(), move |cancel| async move {
                guarded(&path, timeout, &cancel, source.entry_count(&path, &filter, false)).await
            })
            .join()
            .await
    }

    /// Breadcrumb segments for `node`'s path.
    pub async fn path_segments(
        &self,
        node: &Arc<TreeNode<E>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathSegment>> {
        let source = self.source.clone();
        let timeout = self.timeout;
        let path = node.value().with_path(str::to_owned);
        self.scheduler
            .submit_unbounded(cancel.clone(), move |cancel| async move {
                guarded(&path, timeout, &cancel, source.path_segments(&path)).await
            })
            .join()
            .await
    }
}

/// Run a source call under the timeout and cancellation token, mapping its
/// failure to [`Error::SourceUnavailable`] for `path`.
async fn guarded<T>(
    path: &str,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    call: impl Future<Output = SourceResult<T>>,
) -> Result<T> {
    let bounded = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(format!("timed out after {limit:?}").into())),
            None => call.await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = bounded => result.map_err(|e| {
            warn!("source unavailable for {path}: {e}");
            Error::source_unavailable(path, e)
        }),
    }
}
