//! # learnbase CLI (`lbase`)
//!
//! The `lbase` binary is the primary interface for learnbase. It provides
//! commands for database initialization, markdown import, listing, search,
//! record retrieval, and starting the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! lbase --config ./config/lbase.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lbase init` | Create the SQLite database and schema |
//! | `lbase import --file F` | Import one markdown file |
//! | `lbase import --dir D` | Import every markdown file directly inside a directory |
//! | `lbase list` | List stored content |
//! | `lbase get <id>` | Print one record by id |
//! | `lbase search "<query>"` | Substring search over title, body and code |
//! | `lbase serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! lbase init
//! lbase import --dir ./content/ml --overwrite
//! lbase search "gradient" --module ml --limit 5
//! lbase serve
//! ```

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use learnbase::content::{self, ListParams};
use learnbase::ingest::{self, ImportSource};
use learnbase::search::{self, SearchParams};
use learnbase::{config, migrate, server};

/// learnbase: a local store for math and machine-learning learning content,
/// fed by a markdown ingestion pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lbase.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lbase",
    about = "learnbase: import, store and search math and machine-learning learning content",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lbase.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace). Ignored when RUST_LOG is set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `content` table. Running it
    /// repeatedly is safe.
    Init,

    /// Import markdown documents.
    ///
    /// Each document needs YAML frontmatter with `module`, `subcategory` and
    /// `title`. Documents are matched to existing records by title: existing
    /// titles are skipped unless `--overwrite` is given.
    #[command(group(ArgGroup::new("source").required(true).args(["file", "dir"])))]
    Import {
        /// A single markdown file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// A directory; files directly inside it that match
        /// `[import].include_globs` are imported in name order.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Replace the content of records whose title already exists.
        #[arg(long)]
        overwrite: bool,

        /// Directory that relative image paths resolve against
        /// (defaults to each file's own directory).
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// List stored content.
    List {
        #[arg(long)]
        module: Option<String>,

        #[arg(long)]
        subcategory: Option<String>,

        /// Number of records to skip.
        #[arg(long)]
        skip: Option<i64>,

        /// Maximum number of records to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Print one record by id.
    Get {
        /// Record UUID.
        id: String,
    },

    /// Case-insensitive substring search over title, body and code.
    Search {
        /// The search query string.
        query: String,

        /// Only return records from this module.
        #[arg(long)]
        module: Option<String>,

        #[arg(long)]
        skip: Option<i64>,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("learnbase={}", level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            file,
            dir,
            overwrite,
            base_dir,
        } => {
            let source = match (file, dir) {
                (Some(file), _) => ImportSource::File(file),
                (None, Some(dir)) => ImportSource::Dir(dir),
                (None, None) => anyhow::bail!("one of --file or --dir is required"),
            };
            ingest::run_import(&cfg, source, overwrite, base_dir).await?;
        }
        Commands::List {
            module,
            subcategory,
            skip,
            limit,
        } => {
            content::run_list(
                &cfg,
                ListParams {
                    module,
                    subcategory,
                    skip,
                    limit,
                },
            )
            .await?;
        }
        Commands::Get { id } => {
            content::run_get(&cfg, &id).await?;
        }
        Commands::Search {
            query,
            module,
            skip,
            limit,
        } => {
            search::run_search(
                &cfg,
                SearchParams {
                    query,
                    module,
                    skip,
                    limit,
                },
            )
            .await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
