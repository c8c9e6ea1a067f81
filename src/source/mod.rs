//! The item source boundary: where entries come from.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::entry::{Entry, EntryFilter, PathSegment};
use crate::error::SourceResult;

pub use local::{LocalEntry, LocalSource};
pub use memory::{MemoryEntry, MemorySource};

/// Lazy stream of entries produced by a source.
pub type EntryStream<E> = BoxStream<'static, SourceResult<E>>;

/// Supplies raw entries for a path. The tree engine treats every failure
/// from here as the source being unavailable for that one node.
#[async_trait]
pub trait ItemSource<E: Entry>: Send + Sync + 'static {
    /// Resolve the single entry at `path`.
    async fn entry(&self, path: &str) -> SourceResult<E>;

    /// Stream the entries under `path` that pass `filter`.
    ///
    /// With `recursive` the stream also covers every nested folder.
    fn entries(&self, path: &str, filter: &EntryFilter, recursive: bool) -> EntryStream<E>;

    /// Count of the entries [`ItemSource::entries`] would yield.
    async fn entry_count(
        &self,
        path: &str,
        filter: &EntryFilter,
        recursive: bool,
    ) -> SourceResult<usize>;

    /// Breadcrumb segments from the source root down to `path`.
    async fn path_segments(&self, path: &str) -> SourceResult<Vec<PathSegment>>;
}
