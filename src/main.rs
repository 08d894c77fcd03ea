//! # Docsift CLI (`dsift`)
//!
//! The `dsift` binary drives the document pipeline from the command line:
//! ingestion, listing, analysis, translation, Q&A, and video lookup.
//!
//! ## Usage
//!
//! ```bash
//! dsift --config ./config/dsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dsift init` | Create the SQLite database and schema |
//! | `dsift ingest <file>` | Extract, classify, and persist a document |
//! | `dsift list` | List stored documents for an owner |
//! | `dsift show <id>` | Print a stored document page by page |
//! | `dsift delete <id>` | Delete an owned document |
//! | `dsift translate <id> --to Hindi` | Translate a document page by page |
//! | `dsift analyze <id> --kind risks` | Run (or reuse) a cached analysis |
//! | `dsift ask <id> "<question>"` | One-shot question about a document |
//! | `dsift chat <id>` | Interactive Q&A session |
//! | `dsift videos "<term>"` | Find explainer videos for a term |

use std::io::{BufRead, Write as _};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docsift::chat::{ConversationKey, ConversationStore, MemoryConversationStore};
use docsift::models::DocumentRecord;
use docsift::store::{DocumentStore, SqliteStore};
use docsift::{analysis, chat, config, db, inference, ingest, models, video};

/// Docsift CLI — extract, analyze, and question everyday documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dsift.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dsift",
    about = "Docsift — a document understanding pipeline for everyday paperwork",
    version,
    long_about = "Docsift extracts text from plain text, PDF, image, Word, and PowerPoint \
    files into a uniform page model, classifies each document, and layers translation, \
    jargon explanations, consequence and risk analysis, and multi-turn Q&A on top."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/dsift.toml`. Storage, upload, inference, chat,
    /// and video settings are read from this file.
    #[arg(long, global = true, default_value = "./config/dsift.toml")]
    config: PathBuf,

    /// Owner identifier scoping stored documents and conversations.
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite database and schema.
    Init,
    /// Extract, classify, and persist one document.
    Ingest {
        /// Path to the file to ingest (.txt, .pdf, .png/.jpg/..., .docx, .pptx).
        file: PathBuf,
    },
    /// List stored documents, most recent first.
    List,
    /// Print a stored document page by page.
    Show {
        /// Document id (UUID printed by `ingest` and `list`).
        id: String,
    },
    /// Delete an owned document.
    Delete {
        /// Document id.
        id: String,
    },
    /// Re-run classification on a stored document and print the type.
    Classify {
        /// Document id.
        id: String,
    },
    /// Translate a stored document page by page.
    Translate {
        /// Document id.
        id: String,
        /// Target language (e.g. `Hindi`, `Spanish`).
        #[arg(long, default_value = "Hindi")]
        to: String,
    },
    /// Run an analysis over a stored document, reusing the cached result
    /// when one exists.
    Analyze {
        /// Document id.
        id: String,
        /// Which analysis to run.
        #[arg(long, value_enum, default_value_t = AnalysisKind::Terms)]
        kind: AnalysisKind,
        /// Language for explanations.
        #[arg(long, default_value = "English")]
        lang: String,
        /// Recompute even if a cached result exists.
        #[arg(long)]
        refresh: bool,
    },
    /// Ask a single question about a stored document.
    Ask {
        /// Document id.
        id: String,
        /// The question to ask.
        question: String,
        /// Language for the answer.
        #[arg(long, default_value = "English")]
        lang: String,
    },
    /// Interactive Q&A session over a stored document.
    ///
    /// History is kept for the session; `/clear` resets it, `/quit` exits.
    Chat {
        /// Document id.
        id: String,
        /// Language for answers.
        #[arg(long, default_value = "English")]
        lang: String,
    },
    /// Find short explainer videos for a term.
    Videos {
        /// The term to explain (e.g. `escrow`).
        term: String,
        /// Category hint biasing the search (e.g. `Legal`, `Financial`).
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AnalysisKind {
    /// Difficult terms and jargon with plain-language explanations.
    Terms,
    /// Rules, obligations, and consequences of non-compliance.
    Consequences,
    /// Per-clause risk scoring with an overall score.
    Risks,
    /// Clauses that favor the user: protections, flexibility, exit options.
    Benefits,
    /// Likely unenforceable or non-compliant clauses with cited sources.
    Legality,
}

impl AnalysisKind {
    fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Terms => "terms",
            AnalysisKind::Consequences => "consequences",
            AnalysisKind::Risks => "risks",
            AnalysisKind::Benefits => "benefits",
            AnalysisKind::Legality => "legality",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsift=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;
    if matches!(cli.command, Commands::Init) {
        db::init_schema(&pool).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let store = SqliteStore::new(pool, cfg.upload.max_stored_chars);
    let provider = inference::create_provider(&cfg.inference)?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Ingest { file } => {
            let report =
                ingest::ingest_file(&cfg, &store, provider.as_ref(), &file, &cli.owner).await?;
            println!("Ingested {} ({})", report.record.filename, report.record.id);
            println!(
                "  type: {}   pages: {}",
                report.document_type,
                report.pages.len()
            );
        }
        Commands::List => {
            let docs = store.list(&cli.owner).await?;
            if docs.is_empty() {
                println!("No documents stored for owner '{}'.", cli.owner);
            }
            for doc in docs {
                println!(
                    "{}  {:<24} {:<20} {} page(s)  {}",
                    doc.id,
                    doc.filename,
                    doc.kind,
                    doc.page_count,
                    format_timestamp(doc.created_at)
                );
            }
        }
        Commands::Show { id } => {
            let record = fetch_owned(&store, &id, &cli.owner).await?;
            println!("{} ({}, {} page(s))", record.filename, record.kind, record.page_count);
            for page in models::split_pages(&record.body) {
                println!("\n--- Page {} ---", page.page_number);
                println!("{}", page.content);
            }
        }
        Commands::Delete { id } => {
            if store.delete(&id, &cli.owner).await? {
                println!("Deleted {}.", id);
            } else {
                bail!("no document {} owned by '{}'", id, cli.owner);
            }
        }
        Commands::Classify { id } => {
            let record = fetch_owned(&store, &id, &cli.owner).await?;
            // Classify on marker-free text, as at ingest time.
            let raw = models::plain_text(&record.body);
            let kind = analysis::classify_document(provider.as_ref(), &cfg.inference, &raw).await;
            println!("{}", kind);
        }
        Commands::Translate { id, to } => {
            let record = fetch_owned(&store, &id, &cli.owner).await?;
            let pages = models::split_pages(&record.body);
            let translated =
                analysis::translate_pages(provider.as_ref(), &cfg.inference, &pages, &to).await;
            for page in translated {
                println!("\n--- Page {} ({}) ---", page.page_number, to);
                println!("{}", page.translated);
            }
        }
        Commands::Analyze {
            id,
            kind,
            lang,
            refresh,
        } => {
            let record = fetch_owned(&store, &id, &cli.owner).await?;
            if !refresh {
                if let Some(cached) = store.get_analysis(&record.id, kind.as_str()).await? {
                    println!("{}", cached);
                    return Ok(());
                }
            }
            // Prompts get the marker-free text, not the persisted form.
            let text = models::plain_text(&record.body);
            let json = match kind {
                AnalysisKind::Terms => {
                    let terms =
                        analysis::difficult_terms(provider.as_ref(), &cfg.inference, &text, &lang)
                            .await;
                    serde_json::to_string_pretty(&terms)?
                }
                AnalysisKind::Consequences => {
                    let report = analysis::consequence_analysis(
                        provider.as_ref(),
                        &cfg.inference,
                        &text,
                        &lang,
                    )
                    .await;
                    serde_json::to_string_pretty(&report)?
                }
                AnalysisKind::Risks => {
                    let report = analysis::risk_analysis(
                        provider.as_ref(),
                        &cfg.inference,
                        &text,
                        &record.kind,
                        &lang,
                    )
                    .await;
                    serde_json::to_string_pretty(&report)?
                }
                AnalysisKind::Benefits => {
                    let report = analysis::benefits_analysis(
                        provider.as_ref(),
                        &cfg.inference,
                        &text,
                        &record.kind,
                        &lang,
                    )
                    .await;
                    serde_json::to_string_pretty(&report)?
                }
                AnalysisKind::Legality => {
                    let report = analysis::legality_analysis(
                        provider.as_ref(),
                        &cfg.inference,
                        &text,
                        &record.kind,
                        &lang,
                    )
                    .await;
                    serde_json::to_string_pretty(&report)?
                }
            };
            store.save_analysis(&record.id, kind.as_str(), &json).await?;
            println!("{}", json);
        }
        Commands::Ask { id, question, lang } => {
            let record = fetch_owned(&store, &id, &cli.owner).await?;
            let conversations = MemoryConversationStore::new();
            let key = ConversationKey::new(&cli.owner, &record.id);
            let body = models::plain_text(&record.body);
            let answer = chat::ask_question(
                provider.as_ref(),
                &conversations,
                &cfg.inference,
                &cfg.chat,
                &key,
                &body,
                &record.kind,
                &question,
                &lang,
            )
            .await;
            println!("{}", answer.answer);
        }
        Commands::Chat { id, lang } => {
            let record = fetch_owned(&store, &id, &cli.owner).await?;
            run_chat_session(&cfg, provider.as_ref(), &record, &cli.owner, &lang).await?;
        }
        Commands::Videos { term, category } => {
            let policy = cfg.inference.retry_policy();
            let results =
                video::search_videos(&cfg.video, &policy, &term, category.as_deref()).await;
            if results.is_empty() {
                println!("No videos found for '{}'.", term);
            }
            for v in results {
                println!("{}\n  {} — {}\n", v.title, v.channel, v.url);
            }
        }
    }

    Ok(())
}

async fn fetch_owned(store: &SqliteStore, id: &str, owner: &str) -> Result<DocumentRecord> {
    match store.get(id, Some(owner)).await? {
        Some(record) => Ok(record),
        None => bail!("no document {} owned by '{}'", id, owner),
    }
}

/// Line-oriented Q&A loop. History lives for the session only.
async fn run_chat_session(
    cfg: &config::Config,
    provider: &dyn inference::Inference,
    record: &DocumentRecord,
    owner: &str,
    lang: &str,
) -> Result<()> {
    let conversations = MemoryConversationStore::new();
    let key = ConversationKey::new(owner, &record.id);
    let body = models::plain_text(&record.body);

    println!("Chatting about {} ({}).", record.filename, record.kind);
    println!("Suggested questions:");
    for q in chat::suggested_questions(&record.kind) {
        println!("  - {}", q);
    }
    println!("Type a question, `/clear` to reset history, or `/quit` to exit.\n");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                conversations.clear(&key).await;
                println!("History cleared.");
                continue;
            }
            _ => {}
        }

        let answer = chat::ask_question(
            provider,
            &conversations,
            &cfg.inference,
            &cfg.chat,
            &key,
            &body,
            &record.kind,
            question,
            lang,
        )
        .await;
        println!("{}\n", answer.answer);
    }
    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
