//! Lazily materialized, concurrently expanded item trees.

pub mod compare;
pub mod config;
pub mod entry;
pub mod error;
pub mod scheduler;
pub mod selection;
pub mod source;
pub mod tree;

pub use compare::{AsyncComparer, Comparer};
pub use entry::{Entry, EntryFilter, PathSegment, SortKey};
pub use error::{Error, Result};
pub use scheduler::Scheduler;
pub use source::{ItemSource, LocalEntry, LocalSource, MemoryEntry, MemorySource};
pub use tree::{TreeEngine, TreeNode};
