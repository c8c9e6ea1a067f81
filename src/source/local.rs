//! Local filesystem source over `tokio::fs`.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use futures::StreamExt;
use log::warn;
use serde::Serialize;

use crate::compare::compare_names;
use crate::entry::{Entry, EntryFilter, PathSegment};
use crate::error::{SourceError, SourceResult};
use crate::source::{EntryStream, ItemSource};

/// A file or directory on local disk.
#[derive(Debug, Clone, Serialize)]
pub struct LocalEntry {
    path: String,
    name: String,
    extension: String,
    size: u64,
    edited_on: Option<SystemTime>,
    created_on: Option<SystemTime>,
    is_folder: bool,
    is_symlink: bool,
    is_root: bool,
}

impl LocalEntry {
    /// Build an entry from a path and its (non-followed) metadata.
    ///
    /// Symlinks are never folders, so a link cycle can't be expanded forever.
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let is_folder = metadata.is_dir();
        let extension = if is_folder {
            String::new()
        } else {
            path.extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default()
        };

        Self {
            path: path.to_string_lossy().to_string(),
            name,
            extension,
            size: metadata.len(),
            edited_on: metadata.modified().ok(),
            created_on: metadata.created().ok(),
            is_folder,
            is_symlink: metadata.is_symlink(),
            is_root: path.parent().is_none(),
        }
    }

    /// Stat `path` without following symlinks.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::symlink_metadata(path).await?;
        Ok(Self::from_metadata(path, &metadata))
    }

    pub fn is_symlink(&self) -> bool {
        self.is_symlink
    }
}

impl Entry for LocalEntry {
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
        self.is_root
    }

    fn visit_path<A, R>(&self, arg: A, project: impl FnOnce(&str, A) -> R) -> R {
        project(&self.path, arg)
    }
}

/// Reads entries straight from the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }
}

async fn child_folders(dir: &Path) -> Vec<PathSegment> {
    let Ok(mut reader) = tokio::fs::read_dir(dir).await else {
        return Vec::new();
    };
    let mut folders = Vec::new();
    while let Ok(Some(item)) = reader.next_entry().await {
        if let Ok(entry) = LocalEntry::from_path(&item.path()).await {
            if entry.is_folder {
                folders.push(PathSegment {
                    name: entry.name,
                    path: entry.path,
                    has_children: true,
                    sub_segments: Vec::new(),
                });
            }
        }
    }
    folders.sort_by(|a, b| compare_names(&a.name, &b.name));
    folders
}

#[async_trait]
impl ItemSource<LocalEntry> for LocalSource {
    async fn entry(&self, path: &str) -> SourceResult<LocalEntry> {
        Ok(LocalEntry::from_path(Path::new(path)).await?)
    }

    fn entries(&self, path: &str, filter: &EntryFilter, recursive: bool) -> EntryStream<LocalEntry> {
        let root = PathBuf::from(path);
        let filter = filter.clone();

        Box::pin(async_stream::stream! {
            let mut pending = vec![root.clone()];
            while let Some(dir) = pending.pop() {
                let mut reader = match tokio::fs::read_dir(&dir).await {
                    Ok(reader) => reader,
                    Err(e) if dir == root => {
                        yield Err(SourceError::from(e));
                        return;
                    }
                    Err(e) => {
                        warn!("skipping unreadable directory {}: {}", dir.display(), e);
                        continue;
                    }
                };
                loop {
                    let item = match reader.next_entry().await {
                        Ok(Some(item)) => item,
                        Ok(None) => break,
                        Err(e) => {
                            warn!("stopped reading {}: {}", dir.display(), e);
                            break;
                        }
                    };
                    // Entries that vanish or deny access mid-listing are skipped.
                    let Ok(entry) = LocalEntry::from_path(&item.path()).await else {
                        continue;
                    };
                    if !filter.admits(&entry) {
                        continue;
                    }
                    if recursive && entry.is_folder {
                        pending.push(item.path());
                    }
                    yield Ok(entry);
                }
            }
        })
    }

    async fn entry_count(
        &self,
        path: &str,
        filter: &EntryFilter,
        recursive: bool,
    ) -> SourceResult<usize> {
        let mut stream = self.entries(path, filter, recursive);
        let mut count = 0;
        while let Some(item) = stream.next().await {
            item?;
            count += 1;
        }
        Ok(count)
    }

    async fn path_segments(&self, path: &str) -> SourceResult<Vec<PathSegment>> {
        let target = Path::new(path);
        tokio::fs::symlink_metadata(target).await?;

        let chain: Vec<&Path> = target.ancestors().collect();
        let mut segments = Vec::with_capacity(chain.len());
        for dir in chain.into_iter().rev() {
            if dir.as_os_str().is_empty() {
                continue;
            }
            let sub_segments = child_folders(dir).await;
            let name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| dir.to_string_lossy().to_string());
            let has_children = match tokio::fs::read_dir(dir).await {
                Ok(mut reader) => matches!(reader.next_entry().await, Ok(Some(_))),
                Err(_) => false,
            };
            segments.push(PathSegment {
                name,
                path: dir.to_string_lossy().to_string(),
                has_children,
                sub_segments,
            });
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::create_dir(dir.path().join("beta")).unwrap();
        File::create(dir.path().join("file_a.txt")).unwrap();
        fs::write(dir.path().join("file_b.rs"), "fn main() {}").unwrap();
        File::create(dir.path().join(".hidden")).unwrap();
        File::create(dir.path().join("alpha").join("inner.txt")).unwrap();
        dir
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }

    async fn listed(dir: &Path, filter: &EntryFilter, recursive: bool) -> Vec<String> {
        let mut names: Vec<String> = LocalSource
            .entries(&path_str(dir), filter, recursive)
            .map(|e| e.unwrap().name().to_string())
            .collect()
            .await;
        names.sort();
        names
    }

    #[tokio::test]
    async fn entry_metadata_file() {
        let dir = setup_test_dir();
        let entry = LocalSource
            .entry(&path_str(&dir.path().join("file_b.rs")))
            .await
            .unwrap();
        assert_eq!(entry.name(), "file_b.rs");
        assert_eq!(entry.extension(), "rs");
        assert_eq!(entry.size(), 12);
        assert!(!entry.is_folder());
        assert!(!entry.is_root());
        assert!(entry.edited_on().is_some());
    }

    #[tokio::test]
    async fn entry_metadata_directory() {
        let dir = setup_test_dir();
        let entry = LocalSource
            .entry(&path_str(&dir.path().join("alpha")))
            .await
            .unwrap();
        assert!(entry.is_folder());
        assert_eq!(entry.extension(), "");
    }

    #[tokio::test]
    async fn entries_skip_hidden_by_default() {
        let dir = setup_test_dir();
        let names = listed(dir.path(), &EntryFilter::default(), false).await;
        assert_eq!(names, vec!["alpha", "beta", "file_a.txt", "file_b.rs"]);
        let all = listed(dir.path(), &EntryFilter::all(), false).await;
        assert!(all.contains(&".hidden".to_string()));
    }

    #[tokio::test]
    async fn entries_recursive_descend() {
        let dir = setup_test_dir();
        let names = listed(dir.path(), &EntryFilter::default(), true).await;
        assert!(names.contains(&"inner.txt".to_string()));
        let count = LocalSource
            .entry_count(&path_str(dir.path()), &EntryFilter::default(), true)
            .await
            .unwrap();
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = setup_test_dir();
        let mut stream = LocalSource.entries(
            &path_str(&dir.path().join("nope")),
            &EntryFilter::default(),
            false,
        );
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn path_segments_end_at_target() {
        let dir = setup_test_dir();
        let target = dir.path().join("alpha");
        let segments = LocalSource.path_segments(&path_str(&target)).await.unwrap();
        let last = segments.last().unwrap();
        assert_eq!(last.name, "alpha");
        assert!(last.has_children);
        let parent = &segments[segments.len() - 2];
        let subs: Vec<&str> = parent.sub_segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(subs, vec!["alpha", "beta"]);
    }
}
