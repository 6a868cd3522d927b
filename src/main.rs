//! # press-sync CLI
//!
//! The `press-sync` binary fills in destination articles from a WordPress
//! source: author references, hero images, and the helper steps around them.
//!
//! ## Usage
//!
//! ```bash
//! press-sync --config ./config/press-sync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `press-sync authors` | Resolve post authors and patch `author` references |
//! | `press-sync images` | Upload featured images and patch `mainImage` / `heroImageUrl` |
//! | `press-sync author-cache` | Rebuild the author id → name cache from `/users` |
//! | `press-sync remaining <field>` | List articles still missing a field |
//!
//! The destination token is read from `DESTINATION_TOKEN`; it is never
//! taken from the config file.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use press_sync::author_cache::{run_author_cache, AuthorNames};
use press_sync::config::{self, Config};
use press_sync::models::ArticleField;
use press_sync::pipeline::{run_pipeline, Target};
use press_sync::progress::ProgressMode;
use press_sync::remaining::{list_remaining, render_remaining};
use press_sync::source::SourceClient;
use press_sync::store::http::HttpStore;
use press_sync::store::DestinationStore;

/// press-sync: migrate WordPress authors and images into a headless CMS.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/press-sync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "press-sync",
    about = "Batched, idempotent WordPress → headless CMS synchronization",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/press-sync.toml`. A missing file means
    /// defaults plus environment overrides.
    #[arg(long, global = true, default_value = "./config/press-sync.toml")]
    config: PathBuf,

    /// Progress on stderr: `human`, `json`, or `off`.
    ///
    /// Defaults to `human` when stderr is a terminal, otherwise `off`.
    #[arg(long, global = true)]
    progress: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Patch article author references.
    ///
    /// Walks every source post, resolves its author name to a destination
    /// author (creating authors on first sight), and patches articles still
    /// missing `author`, one transaction per page.
    Authors {
        /// Resolve and count without creating authors or committing patches.
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many source pages.
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Patch article hero images.
    ///
    /// Resolves each post's featured media, uploads the binary to the
    /// destination asset store, and patches `mainImage` and `heroImageUrl`.
    Images {
        /// Resolve media URLs and count without uploading or committing.
        #[arg(long)]
        dry_run: bool,

        /// Stop after this many source pages.
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Rebuild the author id → name cache.
    ///
    /// Reads every source user and writes `{ "<id>": "<name>" }` to the
    /// configured cache path (or `--output`).
    AuthorCache {
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List destination articles still missing a field.
    Remaining {
        #[arg(value_enum)]
        field: FieldArg,

        /// Print at most this many articles.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FieldArg {
    Author,
    MainImage,
}

impl From<FieldArg> for ArticleField {
    fn from(arg: FieldArg) -> Self {
        match arg {
            FieldArg::Author => ArticleField::Author,
            FieldArg::MainImage => ArticleField::MainImage,
        }
    }
}

fn destination(cfg: &Config) -> Result<Arc<dyn DestinationStore>> {
    Ok(Arc::new(HttpStore::new(&cfg.destination)?))
}

async fn run_target(
    mut cfg: Config,
    target: Target,
    dry_run: bool,
    max_pages: Option<u32>,
    progress: ProgressMode,
) -> Result<()> {
    if let Some(n) = max_pages {
        cfg.source.max_pages = n;
    }
    let store = destination(&cfg)?;
    let source = SourceClient::new(&cfg.source)?;
    let names = match target {
        Target::Authors => AuthorNames::load(&cfg.cache.author_map)?,
        Target::Images => AuthorNames::default(),
    };

    let reporter = progress.reporter();
    let summary = run_pipeline(store, &source, names, target, dry_run, reporter.as_ref()).await?;
    print!("{}", summary.render());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let progress = match cli.progress.as_deref() {
        None => ProgressMode::default_for_tty(),
        Some(value) => match ProgressMode::parse(value) {
            Some(mode) => mode,
            None => bail!("Unknown progress mode '{}'. Use human, json, or off.", value),
        },
    };

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Authors { dry_run, max_pages } => {
            run_target(cfg, Target::Authors, dry_run, max_pages, progress).await?;
        }
        Commands::Images { dry_run, max_pages } => {
            run_target(cfg, Target::Images, dry_run, max_pages, progress).await?;
        }
        Commands::AuthorCache { output } => {
            let path = output.unwrap_or_else(|| cfg.cache.author_map.clone());
            let source = SourceClient::new(&cfg.source)?;
            let count = run_author_cache(&source, &path).await?;
            println!("author-cache");
            println!("  authors: {}", count);
            println!("  written: {}", path.display());
            println!("ok");
        }
        Commands::Remaining { field, limit } => {
            let field = ArticleField::from(field);
            let store = destination(&cfg)?;
            let articles = list_remaining(store.as_ref(), field).await?;
            info!(%field, count = articles.len(), "remaining listed");
            print!("{}", render_remaining(field, &articles, limit));
        }
    }

    Ok(())
}
