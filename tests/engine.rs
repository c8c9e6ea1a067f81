use std::fs::{self, File};
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use lazytree::entry::{EntryFilter, SortKey};
use lazytree::error::Error;
use lazytree::scheduler::Scheduler;
use lazytree::selection::{selected_indices, update_selection, SelectionInput, SelectionMode};
use lazytree::source::{LocalSource, MemoryEntry, MemorySource};
use lazytree::tree::{children_count, enumerate_children, enumerate_to_root, TreeEngine};

fn setup_test_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::create_dir(dir.path().join("src").join("nested")).unwrap();
    fs::create_dir(dir.path().join("assets")).unwrap();
    fs::write(dir.path().join("README.md"), "hello world").unwrap();
    File::create(dir.path().join("Cargo.toml")).unwrap();
    File::create(dir.path().join(".gitignore")).unwrap();
    fs::write(dir.path().join("src").join("main.rs"), "fn main() {}").unwrap();
    File::create(dir.path().join("src").join("nested").join("deep.rs")).unwrap();
    dir
}

fn names<I, T>(nodes: I) -> Vec<String>
where
    I: IntoIterator<Item = Arc<lazytree::TreeNode<T>>>,
    T: lazytree::Entry,
{
    nodes.into_iter().map(|n| n.name().to_string()).collect()
}

#[tokio::test]
async fn local_tree_expands_level_by_level() {
    let dir = setup_test_dir();
    let engine = TreeEngine::new(LocalSource::new()).with_scheduler(Scheduler::new(2, 1));
    let cancel = CancellationToken::new();

    let root = engine
        .open(&dir.path().to_string_lossy(), &cancel)
        .await
        .unwrap();
    let top = names(engine.expand(&root, &cancel).await.unwrap());
    assert_eq!(top, vec!["assets", "src", "Cargo.toml", "README.md"]);

    let src = root.find_child("src").unwrap();
    let inner = names(engine.expand(&src, &cancel).await.unwrap());
    assert_eq!(inner, vec!["nested", "main.rs"]);

    let nested = src.find_child("nested").unwrap();
    engine.expand(&nested, &cancel).await.unwrap();
    let deep = nested.find_child("deep.rs").unwrap();
    assert_eq!(
        names(enumerate_to_root(&deep)).last().map(String::as_str),
        Some(root.name())
    );
    assert_eq!(children_count(&root), 7);
}

#[tokio::test]
async fn local_hidden_entries_follow_the_filter() {
    let dir = setup_test_dir();
    let engine = TreeEngine::new(LocalSource::new()).with_filter(EntryFilter::all());
    let cancel = CancellationToken::new();
    let root = engine
        .open(&dir.path().to_string_lossy(), &cancel)
        .await
        .unwrap();
    let listed = names(engine.expand(&root, &cancel).await.unwrap());
    assert!(listed.contains(&".gitignore".to_string()));
}

#[tokio::test]
async fn local_missing_folder_is_scoped_failure() {
    let dir = setup_test_dir();
    let engine = TreeEngine::new(LocalSource::new());
    let cancel = CancellationToken::new();
    let root = engine
        .open(&dir.path().to_string_lossy(), &cancel)
        .await
        .unwrap();
    engine.expand(&root, &cancel).await.unwrap();

    let assets = root.find_child("assets").unwrap();
    fs::remove_dir(dir.path().join("assets")).unwrap();

    let result = engine.expand(&assets, &cancel).await;
    assert!(matches!(result, Err(Error::SourceUnavailable { .. })));
    assert!(root.find_child("src").is_some());
    assert!(!assets.is_materialized());
}

#[tokio::test]
async fn local_sort_by_size_then_edited_name_fallback() {
    let dir = setup_test_dir();
    let engine = TreeEngine::new(LocalSource::new()).with_sort_key(SortKey::Size);
    let cancel = CancellationToken::new();
    let root = engine
        .open(&dir.path().to_string_lossy(), &cancel)
        .await
        .unwrap();
    engine.expand(&root, &cancel).await.unwrap();
    let files: Vec<String> = names(root.children().unwrap().iter().cloned())
        .into_iter()
        .filter(|n| n.contains('.'))
        .collect();
    assert_eq!(files, vec!["Cargo.toml", "README.md"]);
}

#[tokio::test]
async fn selection_over_expanded_children() {
    let source = MemorySource::new()
        .with(MemoryEntry::file("/a.txt", 1))
        .with(MemoryEntry::file("/b.txt", 2))
        .with(MemoryEntry::file("/c.txt", 3))
        .with(MemoryEntry::file("/d.txt", 4));
    let engine = TreeEngine::new(source).with_sort_key(SortKey::Name);
    let cancel = CancellationToken::new();
    let root = engine.open("/", &cancel).await.unwrap();
    let mut rows: Vec<_> = engine.expand(&root, &cancel).await.unwrap().collect();
    let count = rows.len();

    let anchor = update_selection(
        &mut rows,
        count,
        0,
        SelectionInput::click(1),
        SelectionMode::Extended,
    );
    let anchor = update_selection(
        &mut rows,
        count,
        anchor,
        SelectionInput::click(3).with_range(),
        SelectionMode::Extended,
    );
    assert_eq!(anchor, 1);
    assert_eq!(selected_indices(&rows, count), vec![1, 2, 3]);

    // Flags live on the nodes, so the tree sees the same selection.
    let marked: Vec<String> = enumerate_children(&root, Some(1))
        .filter(|n| n.is_selected())
        .map(|n| n.name().to_string())
        .collect();
    assert_eq!(marked, vec!["b.txt", "c.txt", "d.txt"]);
}

#[tokio::test]
async fn full_expansion_matches_cached_walk() {
    let mut source = MemorySource::new();
    for folder in ["/a", "/a/b", "/a/b/c", "/x"] {
        source.insert(MemoryEntry::folder(folder));
    }
    for file in ["/a/one", "/a/b/two", "/a/b/c/three", "/x/four"] {
        source.insert(MemoryEntry::file(file, 1));
    }
    let engine = TreeEngine::new(source);
    let cancel = CancellationToken::new();
    let root = engine.open("/", &cancel).await.unwrap();

    let report = engine.expand_descendants(&root, None, &cancel).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.nodes.len(), 8);
    assert_eq!(enumerate_children(&root, None).count(), 8);
    assert_eq!(children_count(&root), 8);
    assert_eq!(engine.source().enumerations(), 5);

    let limited = names(enumerate_children(&root, Some(2)));
    assert_eq!(limited, vec!["a", "b", "one", "x", "four"]);
}
