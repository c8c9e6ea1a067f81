use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use simplelog::{Config, WriteLogger};
use tokio_util::sync::CancellationToken;

use lazytree::config::{AppConfig, LogConfig, TreeConfig};
use lazytree::entry::{Entry, EntryFilter};
use lazytree::error::{Error, Result};
use lazytree::source::{LocalEntry, LocalSource};
use lazytree::tree::{children_count, TreeEngine, TreeNode};

/// Print a lazily expanded directory tree.
#[derive(Parser, Debug)]
#[command(name = "lazytree", version, about)]
struct Cli {
    /// Root path to display (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Sort key: none, name, edited, size or extension
    #[arg(long)]
    sort: Option<String>,

    /// Levels to expand below the root
    #[arg(long)]
    depth: Option<usize>,

    /// Include hidden entries
    #[arg(long)]
    hidden: bool,

    /// Only list files whose name matches this pattern
    #[arg(long)]
    filter: Option<String>,

    /// Match --filter fuzzily instead of by substring
    #[arg(long)]
    fuzzy: bool,

    /// Print the tree as JSON
    #[arg(long)]
    json: bool,

    /// Path to a config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> AppConfig {
        AppConfig {
            tree: TreeConfig {
                sort_by: self.sort.clone(),
                show_hidden: self.hidden.then_some(true),
                max_depth: self.depth,
            },
            log: LogConfig {
                file: self.log_file.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct Listing {
    #[serde(flatten)]
    entry: LocalEntry,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<Listing>,
}

impl Listing {
    fn build(node: &TreeNode<LocalEntry>) -> Self {
        Self {
            entry: node.value().clone(),
            children: node
                .children()
                .map(|children| children.iter().map(|c| Listing::build(c)).collect())
                .unwrap_or_default(),
        }
    }
}

/// Install the file logger, if one is configured.
fn init_logging(config: &AppConfig) -> std::result::Result<(), String> {
    let Some(path) = config.log_file() else {
        return Ok(());
    };
    let file = File::create(path)
        .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?;
    WriteLogger::init(config.log_level(), Config::default(), file)
        .map_err(|e| format!("cannot install logger for {}: {}", path.display(), e))
}

fn print_tree(node: &TreeNode<LocalEntry>, indent: usize) {
    let Some(children) = node.children() else {
        return;
    };
    for child in children.iter() {
        let marker = if child.is_folder() { "/" } else { "" };
        println!("{}{}{}", "  ".repeat(indent), child.name(), marker);
        print_tree(child, indent + 1);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    if let Err(warning) = init_logging(&config) {
        eprintln!("Warning: {warning}");
    }

    let path = cli
        .path
        .canonicalize()
        .map_err(|_| Error::InvalidPath(format!("{} does not exist", cli.path.display())))?;
    let path = path.to_string_lossy().to_string();

    let engine = TreeEngine::configured(LocalSource::new(), &config).with_filter(EntryFilter {
        pattern: cli.filter.clone(),
        show_hidden: config.show_hidden(),
        fuzzy: cli.fuzzy,
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    info!("listing {} (sort: {})", path, config.sort_key().label());
    let root: Arc<TreeNode<LocalEntry>> = engine.open(&path, &cancel).await?;
    let report = engine
        .expand_descendants(&root, Some(config.max_depth()), &cancel)
        .await?;

    for (folder, error) in &report.failures {
        warn!("{}: {}", folder.name(), error);
        eprintln!("Warning: {}", error);
    }

    if cli.json {
        let listing = Listing::build(&root);
        match serde_json::to_string_pretty(&listing) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("Warning: cannot encode listing: {e}"),
        }
    } else {
        println!("{}", root.value().with_path(str::to_owned));
        print_tree(&root, 1);
        println!("\n{} entries", children_count(&root));
    }
    Ok(())
}
