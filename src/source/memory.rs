//! In-memory item source, for virtual backends and tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::entry::{Entry, EntryFilter, PathSegment};
use crate::error::{SourceError, SourceResult};
use crate::source::{EntryStream, ItemSource};

/// An entry held by [`MemorySource`]. Paths are `/`-separated and absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    path: String,
    name: String,
    extension: String,
    size: u64,
    edited_on: Option<SystemTime>,
    created_on: Option<SystemTime>,
    is_folder: bool,
}

impl MemoryEntry {
    pub fn folder(path: &str) -> Self {
        Self::build(path, 0, true)
    }

    pub fn file(path: &str, size: u64) -> Self {
        Self::build(path, size, false)
    }

    fn build(path: &str, size: u64, is_folder: bool) -> Self {
        let name = match path.rsplit('/').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => path.to_string(),
        };
        let extension = if is_folder {
            String::new()
        } else {
            match name.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => ext.to_string(),
                _ => String::new(),
            }
        };
        Self {
            path: path.to_string(),
            name,
            extension,
            size,
            edited_on: None,
            created_on: None,
            is_folder,
        }
    }

    /// Set the edit timestamp.
    pub fn edited(mut self, at: SystemTime) -> Self {
        self.edited_on = Some(at);
        self
    }

    /// Set the creation timestamp.
    pub fn created(mut self, at: SystemTime) -> Self {
        self.created_on = Some(at);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Entry for MemoryEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn edited_on(&self) -> Option<SystemTime> {
        self.edited_on
    }

    fn created_on(&self) -> Option<SystemTime> {
        self.created_on
    }

    fn is_folder(&self) -> bool {
        self.is_folder
    }

    fn is_root(&self) -> bool {
        self.path == "/"
    }

    fn visit_path<A, R>(&self, arg: A, project: impl FnOnce(&str, A) -> R) -> R {
        project(&self.path, arg)
    }
}

/// Parent path of a `/`-separated path; `None` for `/`.
fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path != "/" && path.starts_with('/');
    }
    path.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// A source backed by a path map.
///
/// Supports injected latency (per yielded entry) and injected failures, and
/// counts how often it was asked to enumerate.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: BTreeMap<String, MemoryEntry>,
    failing: HashSet<String>,
    latency: Option<Duration>,
    enumerations: AtomicUsize,
}

impl MemorySource {
    /// Create a source holding only the `/` root.
    pub fn new() -> Self {
        let mut source = Self::default();
        source.insert(MemoryEntry::folder("/"));
        source
    }

    /// Add (or replace) an entry.
    pub fn insert(&mut self, entry: MemoryEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn with(mut self, entry: MemoryEntry) -> Self {
        self.insert(entry);
        self
    }

    /// Make enumeration of `path` fail.
    pub fn failing(mut self, path: &str) -> Self {
        self.failing.insert(path.to_string());
        self
    }

    /// Delay each yielded entry by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// How many times `entries` was called.
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    /// Why `path` can't be enumerated, if it can't.
    fn enumeration_failure(&self, path: &str) -> Option<String> {
        if self.failing.contains(path) {
            return Some(format!("enumeration failed: {path}"));
        }
        match self.entries.get(path) {
            Some(entry) if entry.is_folder => None,
            Some(_) => Some(format!("not a folder: {path}")),
            None => Some(format!("no such entry: {path}")),
        }
    }

    fn matching(&self, path: &str, filter: &EntryFilter, recursive: bool) -> Vec<MemoryEntry> {
        self.entries
            .values()
            .filter(|e| {
                if recursive {
                    is_within(&e.path, path)
                } else {
                    parent_of(&e.path) == Some(path)
                }
            })
            .filter(|e| filter.admits(*e))
            .cloned()
            .collect()
    }

    fn segment(&self, path: &str, with_subs: bool) -> PathSegment {
        let children = self.matching(path, &EntryFilter::all(), false);
        let sub_segments = if with_subs {
            children
                .iter()
                .filter(|c| c.is_folder)
                .map(|c| self.segment(&c.path, false))
                .collect()
        } else {
            Vec::new()
        };
        PathSegment {
            name: MemoryEntry::folder(path).name,
            path: path.to_string(),
            has_children: !children.is_empty(),
            sub_segments,
        }
    }
}

#[async_trait]
impl ItemSource<MemoryEntry> for MemorySource {
    async fn entry(&self, path: &str) -> SourceResult<MemoryEntry> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| format!("no such entry: {path}").into())
    }

    fn entries(&self, path: &str, filter: &EntryFilter, recursive: bool) -> EntryStream<MemoryEntry> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let failure: Option<SourceError> = self.enumeration_failure(path).map(Into::into);
        let batch = self.matching(path, filter, recursive);
        let latency = self.latency;

        Box::pin(async_stream::stream! {
            if let Some(error) = failure {
                if let Some(delay) = latency {
                    tokio::time::sleep(delay).await;
                }
                yield Err(error);
                return;
            }
            for entry in batch {
                if let Some(delay) = latency {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(entry);
            }
        })
    }

    async fn entry_count(
        &self,
        path: &str,
        filter: &EntryFilter,
        recursive: bool,
    ) -> SourceResult<usize> {
        if let Some(reason) = self.enumeration_failure(path) {
            return Err(reason.into());
        }
        Ok(self.matching(path, filter, recursive).len())
    }

    async fn path_segments(&self, path: &str) -> SourceResult<Vec<PathSegment>> {
        if !self.entries.contains_key(path) {
            return Err(format!("no such entry: {path}").into());
        }
        let mut chain = vec![path];
        while let Some(parent) = chain.last().copied().and_then(parent_of) {
            chain.push(parent);
        }
        Ok(chain
            .into_iter()
            .rev()
            .map(|p| self.segment(p, true))
            .collect())
    }
}
