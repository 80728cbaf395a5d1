//! # Groundwork CLI (`gw`)
//!
//! ## Usage
//!
//! ```bash
//! gw --config ./config/groundwork.toml --owner alice <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gw init` | Create the SQLite database and run schema migrations |
//! | `gw add <path>` | Store a text file as a document and embed it |
//! | `gw embed <id>` | Embed a stored document (no-op if already embedded) |
//! | `gw unembed <id>` | Delete a document's embeddings |
//! | `gw search "<query>"` | Keyword search with filters and paging |
//! | `gw get <id>` | Print a document |
//! | `gw retrieve "<query>"` | Vector retrieval of the best chunks |
//! | `gw ask "<question>"` | Retrieve-then-answer with `[n]` citations |
//! | `gw chat "<question>"` | Tool-driven answer loop (Ctrl-C cancels) |
//! | `gw serve` | Start the HTTP server |
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use groundwork::agent::ChatRequest;
use groundwork::app::App;
use groundwork::cancel::cancel_pair;
use groundwork::config::{self, Config};
use groundwork::lexical::{self, Page};
use groundwork::migrate;
use groundwork::server;
use groundwork_core::models::{Document, DocumentFilter};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Groundwork: grounded answers over your own documents.
#[derive(Parser)]
#[command(name = "gw", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/groundwork.toml")]
    config: PathBuf,

    /// Owner whose documents are read and written.
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Store a UTF-8 text file as a document.
    Add {
        path: PathBuf,
        /// Document type used by search filters (e.g. `tax`, `invoice`).
        #[arg(long = "type")]
        document_type: Option<String>,
        #[arg(long)]
        year: Option<String>,
        /// Document date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<String>,
        /// Store without embedding.
        #[arg(long)]
        no_embed: bool,
    },

    /// Embed a stored document.
    Embed { document_id: String },

    /// Delete a document's embeddings.
    Unembed { document_id: String },

    /// Keyword search over documents.
    Search {
        query: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long = "type")]
        document_type: Option<String>,
        #[arg(long)]
        year: Option<String>,
        /// Earliest document date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,
        /// Latest document date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,
    },

    /// Print a document by id.
    Get {
        document_id: String,
        #[arg(long)]
        max_length: Option<usize>,
    },

    /// Vector retrieval of the chunks most similar to a query.
    Retrieve {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Answer from the best matching chunks.
    Ask { question: String },

    /// Answer with the tool-driven loop.
    Chat {
        question: String,
        /// Document ids to inline into the question.
        #[arg(long = "ref")]
        refs: Vec<String>,
    },

    /// Start the HTTP server on `[server] bind`.
    Serve,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_document(owner: &str, path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Document::new(owner, &filename, &content))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "groundwork=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg: Config = config::load_config(&cli.config)?;
    let owner = cli.owner;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let app = Arc::new(App::open(cfg).await?);

    match cli.command {
        Commands::Init => {}
        Commands::Add {
            path,
            document_type,
            year,
            date,
            no_embed,
        } => {
            let mut doc = read_document(&owner, &path)?;
            doc.document_type = document_type;
            doc.document_year = year;
            doc.document_date = date;
            if no_embed {
                app.store.upsert_document(&doc).await?;
                info!(document_id = %doc.id, "stored without embedding");
                print_json(&serde_json::json!({ "documentId": doc.id }))?;
            } else {
                let outcome = app.generator.add_document(&doc).await?;
                print_json(&serde_json::json!({ "documentId": doc.id, "embedding": outcome }))?;
            }
        }
        Commands::Embed { document_id } => {
            let Some(doc) = app.store.get_document(&owner, &document_id).await? else {
                bail!("document not found: {}", document_id);
            };
            let outcome = app.generator.embed(&doc.id, &owner, &doc.content).await;
            if !outcome.success {
                warn!(document_id = %doc.id, "embedding failed");
            }
            print_json(&outcome)?;
        }
        Commands::Unembed { document_id } => {
            let deleted = app.generator.delete(&document_id).await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Commands::Search {
            query,
            page,
            page_size,
            document_type,
            year,
            from,
            to,
        } => {
            let retrieval = &app.config.retrieval;
            let filter = DocumentFilter {
                document_type,
                document_year: year,
                date_from: from,
                date_to: to,
            };
            let page = Page::new(
                page,
                page_size.unwrap_or(retrieval.page_size),
                retrieval.max_page_size,
            );
            let response =
                lexical::search_documents(app.store.as_ref(), &owner, &query, &filter, page)
                    .await?;
            print_json(&response)?;
        }
        Commands::Get {
            document_id,
            max_length,
        } => {
            let max_length = max_length.unwrap_or(app.config.retrieval.fetch_max_chars);
            match lexical::get_document(app.store.as_ref(), &owner, &document_id, max_length)
                .await?
            {
                Some(doc) => print_json(&doc)?,
                None => bail!("document not found: {}", document_id),
            }
        }
        Commands::Retrieve {
            query,
            top_k,
            threshold,
        } => {
            let retrieval = &app.config.retrieval;
            let result = app
                .retriever
                .retrieve(
                    &owner,
                    &query,
                    top_k.unwrap_or(retrieval.top_k),
                    threshold.unwrap_or(retrieval.similarity_threshold),
                )
                .await?;
            print_json(&result)?;
        }
        Commands::Ask { question } => {
            let response = app.ask(&owner, &question).await?;
            print_json(&response)?;
        }
        Commands::Chat { question, refs } => {
            let mut request = ChatRequest::new(&owner, &question);
            request.referenced_document_ids = refs;

            let (handle, token) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling");
                    handle.cancel();
                }
            });

            let response = app.agent.chat(&request, &token).await?;
            print_json(&response)?;
        }
        Commands::Serve => {
            server::run_server(app).await?;
        }
    }

    Ok(())
}
