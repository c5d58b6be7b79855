//! `paper-index`: ingest OpenAlex and S2AG dumps into a deduplicated papers
//! index, search it, and compare abstracts across the two APIs.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `paper-index serve` | HTTP server (default) |
//! | `paper-index mcp` | MCP tools over stdio |
//! | `paper-index ingest <source>...` | One bounded batch per source |
//! | `paper-index search "<query>"` | Title search |
//! | `paper-index similarity [doi]` | Abstract similarity for a DOI |
//!
//! Configuration comes from environment variables, see [`config::Config`].

mod abstract_index;
mod apis;
mod app;
mod config;
mod embed;
mod fingerprint;
mod index;
mod ingest;
mod mcp;
mod normalize;
mod rct;
mod record;
mod search;
mod server;
mod similarity;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use record::Source;

#[derive(Parser)]
#[command(name = "paper-index", version, about = "Bibliographic ingestion and search")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Address to bind, overriding PAPER_INDEX_BIND.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Serve MCP tools over stdio.
    Mcp,

    /// Ingest one bounded batch from each named source (`openalex`, `s2ag`).
    Ingest {
        #[arg(required = true)]
        sources: Vec<String>,

        /// Maximum lines to read per source, overriding PAPER_INDEX_BATCH_SIZE.
        #[arg(long)]
        max_records: Option<usize>,
    },

    /// Search titles; an empty query matches everything.
    Search {
        #[arg(default_value = "")]
        query: String,
    },

    /// Compare the OpenAlex and Semantic Scholar abstracts for a DOI.
    Similarity {
        /// Defaults to PAPER_INDEX_DEFAULT_DOI.
        doi: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            let app = App::build(config).await?;
            server::run_server(app).await?;
        }
        Commands::Mcp => {
            let app = App::build(config).await?;
            mcp::run_stdio(app).await?;
        }
        Commands::Ingest { sources, max_records } => {
            let app = App::build(config).await?;
            let max = max_records.unwrap_or(app.config.batch_size);
            for name in &sources {
                let source: Source = match name.parse() {
                    Ok(source) => source,
                    Err(e) => {
                        tracing::warn!("Skipping: {}", e);
                        continue;
                    }
                };
                let report = app.pipeline.ingest(source, &app.config.files, max).await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Commands::Search { query } => {
            let app = App::build(config).await?;
            let hits = app.gateway.search(&query).await?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Commands::Similarity { doi } => {
            let app = App::build(config).await?;
            let doi = doi.unwrap_or_else(|| app.config.default_doi.clone());
            match app.similarity.score_doi(&doi).await? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("No abstract available from both sources for DOI: {}", doi),
            }
        }
    }

    Ok(())
}
