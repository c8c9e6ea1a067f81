//! Entry payloads, sort keys and filters shared by sources and the tree engine.

use std::time::SystemTime;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};

/// A file-system-like item (file or folder) supplied by an item source.
///
/// The path is never handed out as an owned string. Callers project it
/// through [`Entry::visit_path`] and decide what to produce from the borrowed
/// view.
pub trait Entry: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Extension without the leading dot; empty for folders and extensionless files.
    fn extension(&self) -> &str;

    /// Size in bytes.
    fn size(&self) -> u64;

    fn edited_on(&self) -> Option<SystemTime>;

    fn created_on(&self) -> Option<SystemTime>;

    fn is_folder(&self) -> bool;

    /// Whether this entry is the root of its source (a drive, a bucket, `/`).
    fn is_root(&self) -> bool;

    /// Run `project` over a borrowed view of this entry's path plus `arg`.
    fn visit_path<A, R>(&self, arg: A, project: impl FnOnce(&str, A) -> R) -> R;

    /// Run `project` over a borrowed view of this entry's path.
    fn with_path<R>(&self, project: impl FnOnce(&str) -> R) -> R {
        self.visit_path((), |path, ()| project(path))
    }

    fn is_hidden(&self) -> bool {
        self.name().starts_with('.')
    }
}

/// Ordering policy applied by the comparer subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Folders before files, then by name.
    #[default]
    None,
    /// Ascending by name.
    Name,
    /// Most recently edited first.
    Edited,
    /// Ascending by size.
    Size,
    /// Ascending by extension.
    Extension,
}

impl SortKey {
    /// All keys in cycling order.
    pub const ALL: [SortKey; 5] = [
        SortKey::None,
        SortKey::Name,
        SortKey::Edited,
        SortKey::Size,
        SortKey::Extension,
    ];

    /// Parse a sort key from a config string. Unknown values fall back to `None`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => SortKey::Name,
            "edited" | "modified" => SortKey::Edited,
            "size" => SortKey::Size,
            "extension" | "ext" => SortKey::Extension,
            _ => SortKey::None,
        }
    }

    /// Get the display label for the key.
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::None => "Default",
            SortKey::Name => "Name",
            SortKey::Edited => "Edited",
            SortKey::Size => "Size",
            SortKey::Extension => "Extension",
        }
    }

    /// Cycle to the next sort key.
    pub fn next(&self) -> Self {
        match self {
            SortKey::None => SortKey::Name,
            SortKey::Name => SortKey::Edited,
            SortKey::Edited => SortKey::Size,
            SortKey::Size => SortKey::Extension,
            SortKey::Extension => SortKey::None,
        }
    }
}

/// Filter passed to an item source alongside the path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    /// Name pattern; `None` admits every name.
    pub pattern: Option<String>,
    /// Admit dot-prefixed entries.
    pub show_hidden: bool,
    /// Use fuzzy matching instead of case-insensitive substring matching.
    pub fuzzy: bool,
}

impl EntryFilter {
    /// A filter that admits everything, hidden entries included.
    pub fn all() -> Self {
        Self {
            pattern: None,
            show_hidden: true,
            fuzzy: false,
        }
    }

    /// Whether `entry` passes this filter.
    ///
    /// Folders ignore the name pattern so matches further down stay reachable.
    pub fn admits<E: Entry>(&self, entry: &E) -> bool {
        if !self.show_hidden && entry.is_hidden() {
            return false;
        }
        if entry.is_folder() {
            return true;
        }
        self.matches_name(entry.name())
    }

    /// Whether `name` matches the pattern alone.
    pub fn matches_name(&self, name: &str) -> bool {
        let Some(pattern) = self.pattern.as_deref().filter(|p| !p.is_empty()) else {
            return true;
        };
        if self.fuzzy {
            SkimMatcherV2::default().fuzzy_match(name, pattern).is_some()
        } else {
            name.to_lowercase().contains(&pattern.to_lowercase())
        }
    }
}

/// One breadcrumb segment of a path, as reported by an item source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathSegment {
    pub name: String,
    /// Full path up to and including this segment.
    pub path: String,
    pub has_children: bool,
    /// Child folders of this segment, when the source lists them.
    pub sub_segments: Vec<PathSegment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, bool);

    impl Entry for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn extension(&self) -> &str {
            ""
        }
        fn size(&self) -> u64 {
            0
        }
        fn edited_on(&self) -> Option<SystemTime> {
            None
        }
        fn created_on(&self) -> Option<SystemTime> {
            None
        }
        fn is_folder(&self) -> bool {
            self.1
        }
        fn is_root(&self) -> bool {
            false
        }
        fn visit_path<A, R>(&self, arg: A, project: impl FnOnce(&str, A) -> R) -> R {
            project(self.0, arg)
        }
    }

    #[test]
    fn sort_key_parse_and_cycle() {
        assert_eq!(SortKey::parse("size"), SortKey::Size);
        assert_eq!(SortKey::parse("Modified"), SortKey::Edited);
        assert_eq!(SortKey::parse("bogus"), SortKey::None);

        let mut key = SortKey::None;
        for expected in SortKey::ALL.iter().skip(1) {
            key = key.next();
            assert_eq!(key, *expected);
        }
        assert_eq!(key.next(), SortKey::None);
    }

    #[test]
    fn sort_key_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            key: SortKey,
        }
        let w: Wrapper = toml::from_str(r#"key = "extension""#).expect("parse");
        assert_eq!(w.key, SortKey::Extension);
    }

    #[test]
    fn with_path_projects_borrowed_view() {
        let entry = Named("docs/readme.md", false);
        let len = entry.with_path(|p| p.len());
        assert_eq!(len, 14);
        let joined = entry.visit_path("/mnt", |p, prefix| format!("{prefix}/{p}"));
        assert_eq!(joined, "/mnt/docs/readme.md");
    }

    #[test]
    fn filter_hides_dotfiles_unless_enabled() {
        let filter = EntryFilter::default();
        assert!(!filter.admits(&Named(".env", false)));
        assert!(filter.admits(&Named("env", false)));
        assert!(EntryFilter::all().admits(&Named(".env", false)));
    }

    #[test]
    fn filter_substring_is_case_insensitive() {
        let filter = EntryFilter {
            pattern: Some("READ".into()),
            ..Default::default()
        };
        assert!(filter.admits(&Named("readme.md", false)));
        assert!(!filter.admits(&Named("main.rs", false)));
        // Folders always pass the pattern
        assert!(filter.admits(&Named("src", true)));
    }

    #[test]
    fn filter_fuzzy_matches_subsequence() {
        let filter = EntryFilter {
            pattern: Some("mnrs".into()),
            fuzzy: true,
            ..Default::default()
        };
        assert!(filter.matches_name("main.rs"));
        assert!(!filter.matches_name("lib.go"));
    }
}
