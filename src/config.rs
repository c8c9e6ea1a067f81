//! Configuration: TOML file loading, CLI overrides, and defaults.
//!
//! Resolution order (first found wins, values merge/override):
//! 1. CLI flags (`--sort`, `--hidden`, `--log-file`, etc.)
//! 2. Explicit `--config` file
//! 3. `$LAZYTREE_CONFIG` environment variable (path to config file)
//! 4. Project-local `.lazytree.toml` in the current working directory
//! 5. Global `~/.config/lazytree/config.toml`
//! 6. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{warn, LevelFilter};
use serde::Deserialize;

use crate::entry::SortKey;
use crate::scheduler::default_capacities;
use crate::selection::SelectionMode;

// ── Section configs ──────────────────────────────────────────────────────────

/// Tree settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TreeConfig {
    /// Sort key: "none", "name", "edited", "size", "extension".
    pub sort_by: Option<String>,
    /// Show dot-prefixed entries.
    pub show_hidden: Option<bool>,
    /// Levels the CLI listing force-expands (unset = 1).
    pub max_depth: Option<usize>,
}

/// Worker pool sizes.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SchedulerConfig {
    pub primary_workers: Option<usize>,
    pub secondary_workers: Option<usize>,
}

/// Item source settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SourceConfig {
    /// Per-call timeout in milliseconds (unset = wait forever).
    pub timeout_ms: Option<u64>,
}

/// Selection settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SelectionConfig {
    /// "single", "extended", or "toggle".
    pub mode: Option<String>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// "off", "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path; logging is disabled when unset.
    pub file: Option<PathBuf>,
}

// ── Top-level config ─────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// All fields are optional so that partial configs from different sources
/// can be merged together (CLI overrides file, file overrides defaults).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub tree: TreeConfig,
    pub scheduler: SchedulerConfig,
    pub source: SourceConfig,
    pub selection: SelectionConfig,
    pub log: LogConfig,
}

// ── Config file locator ──────────────────────────────────────────────────────

/// Return the list of candidate config file paths in priority order.
///
/// Does NOT include the CLI `--config` path; that is handled separately.
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(env_path) = std::env::var("LAZYTREE_CONFIG") {
        paths.push(PathBuf::from(env_path));
    }

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".lazytree.toml"));
    }

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("lazytree").join("config.toml"));
    }

    paths
}

/// Try to read and parse a TOML config file. Returns `None` if the file
/// doesn't exist or can't be parsed (with a warning).
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            warn!("failed to parse config file {}: {}", path.display(), e);
            eprintln!(
                "Warning: failed to parse config file {}: {}",
                path.display(),
                e
            );
            None
        }
    }
}

// ── Merge logic ──────────────────────────────────────────────────────────────

impl AppConfig {
    /// Merge `other` on top of `self`; `other`'s `Some` values win.
    pub fn merge(self, other: &AppConfig) -> AppConfig {
        AppConfig {
            tree: TreeConfig {
                sort_by: other.tree.sort_by.clone().or(self.tree.sort_by),
                show_hidden: other.tree.show_hidden.or(self.tree.show_hidden),
                max_depth: other.tree.max_depth.or(self.tree.max_depth),
            },
            scheduler: SchedulerConfig {
                primary_workers: other
                    .scheduler
                    .primary_workers
                    .or(self.scheduler.primary_workers),
                secondary_workers: other
                    .scheduler
                    .secondary_workers
                    .or(self.scheduler.secondary_workers),
            },
            source: SourceConfig {
                timeout_ms: other.source.timeout_ms.or(self.source.timeout_ms),
            },
            selection: SelectionConfig {
                mode: other.selection.mode.clone().or(self.selection.mode),
            },
            log: LogConfig {
                level: other.log.level.clone().or(self.log.level),
                file: other.log.file.clone().or(self.log.file),
            },
        }
    }

    /// Load the final merged configuration.
    ///
    /// `cli_config_path` is an explicit config file path from `--config`.
    /// `cli_overrides` are partial overrides derived from CLI flags.
    pub fn load(cli_config_path: Option<&Path>, cli_overrides: Option<&AppConfig>) -> AppConfig {
        let mut config = AppConfig::default();

        // Walk in reverse so that highest-priority (env var) overwrites lower.
        for path in candidate_paths().iter().rev() {
            if let Some(file_cfg) = load_file(path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(cli_path) = cli_config_path {
            if let Some(file_cfg) = load_file(cli_path) {
                config = config.merge(&file_cfg);
            }
        }

        if let Some(overrides) = cli_overrides {
            config = config.merge(overrides);
        }

        config
    }

    // ── Convenience getters with built-in defaults ──────────────────────────

    /// Active sort key.
    pub fn sort_key(&self) -> SortKey {
        self.tree
            .sort_by
            .as_deref()
            .map(SortKey::parse)
            .unwrap_or_default()
    }

    /// Whether hidden entries are listed.
    pub fn show_hidden(&self) -> bool {
        self.tree.show_hidden.unwrap_or(false)
    }

    /// Forced-expansion depth for listings.
    pub fn max_depth(&self) -> usize {
        self.tree.max_depth.unwrap_or(1)
    }

    /// Primary pool size (about half the host's parallelism).
    pub fn primary_workers(&self) -> usize {
        self.scheduler
            .primary_workers
            .unwrap_or_else(|| default_capacities().0)
            .max(1)
    }

    /// Secondary pool size (about a quarter of the host's parallelism).
    pub fn secondary_workers(&self) -> usize {
        self.scheduler
            .secondary_workers
            .unwrap_or_else(|| default_capacities().1)
            .max(1)
    }

    /// Source call timeout.
    pub fn source_timeout(&self) -> Option<Duration> {
        self.source.timeout_ms.map(Duration::from_millis)
    }

    /// Selection mode.
    pub fn selection_mode(&self) -> SelectionMode {
        self.selection
            .mode
            .as_deref()
            .map(SelectionMode::parse)
            .unwrap_or_default()
    }

    /// Log level filter.
    pub fn log_level(&self) -> LevelFilter {
        self.log
            .level
            .as_deref()
            .and_then(|l| l.parse().ok())
            .unwrap_or(LevelFilter::Info)
    }

    /// Log file, if logging is enabled.
    pub fn log_file(&self) -> Option<&Path> {
        self.log.file.as_deref()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
