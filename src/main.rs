use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::BufReader;

use review_rag::chat::ChatSession;
use review_rag::core::config::{AppPaths, ConfigService};
use review_rag::core::logging;
use review_rag::llm;
use review_rag::rag::{PromptBuilder, ScoredDocument};
use review_rag::state::{AppState, InitializationError};

#[derive(Parser, Debug)]
#[command(name = "review-rag")]
#[command(version, about = "Ask questions about restaurant reviews", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file to use instead of the discovered `config.yml`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the index if needed and describe it
    Index,
    /// Print the reviews most similar to a query
    Search {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Interactive question answering (the default)
    Ask {
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Print the effective configuration with secrets redacted
    Config,
}

#[derive(Serialize)]
struct SearchResponse<'a> {
    query: &'a str,
    count: usize,
    results: Vec<ScoredDocument>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = Arc::new(AppPaths::new());
    let mut config_service = ConfigService::new(paths.clone());
    if let Some(path) = cli.config {
        config_service = config_service.with_config_path(path);
    }

    let config = config_service
        .load_config()
        .map_err(|e| InitializationError::Config(e.into()))?;
    logging::init(&paths, &config.logging);
    tracing::debug!("Using config {}", config_service.config_path().display());

    match cli.command.unwrap_or(Commands::Ask { k: None }) {
        Commands::Config => {
            let raw = config_service.load_raw()?;
            let redacted = config_service.redact_sensitive_values(&raw);
            print!("{}", serde_yaml::to_string(&redacted)?);
        }
        Commands::Index => {
            let state = AppState::initialize(config_service, config)?;
            let index = state.open_index().await?;
            let meta = index.info();
            println!("Index: {}", index.location().display());
            println!("Collection: {}", meta.collection);
            println!("Documents: {}", index.len());
            println!(
                "Embedding: {} ({} dimensions)",
                meta.embedding_model, meta.dimension
            );
            println!("Built: {}", meta.created_at);
            index.close().await;
        }
        Commands::Search { query, k, json } => {
            let state = AppState::initialize(config_service, config)?;
            let index = state.open_index().await?;
            let k = k.unwrap_or(state.config.retrieval.top_k);
            let results = index
                .retrieve_scored(&query, k)
                .await
                .context("Search failed")?;

            if json {
                let response = SearchResponse {
                    query: &query,
                    count: results.len(),
                    results,
                };
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_search(&query, &results);
            }
            index.close().await;
        }
        Commands::Ask { k } => {
            let state = AppState::initialize(config_service, config)?;
            let index = state.open_index().await?;
            let provider = state.llm()?;
            llm::check_health(provider.as_ref()).await;

            let session = ChatSession::new(
                index,
                provider,
                PromptBuilder::new(state.config.prompt.template.clone()),
                k.unwrap_or(state.config.retrieval.top_k),
                state.config.llm.clone(),
            );
            session
                .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await?;
        }
    }

    Ok(())
}

fn print_search(query: &str, results: &[ScoredDocument]) {
    if results.is_empty() {
        println!("No reviews found for: \"{}\"", query);
        return;
    }

    println!();
    println!("Query: \"{}\"", query);
    println!();
    for (i, hit) in results.iter().enumerate() {
        let doc = &hit.document;
        println!("[{}] #{} | Score: {:.3}", i + 1, doc.id, hit.score);
        println!(
            "    Rating: {} | Date: {}",
            doc.metadata.rating, doc.metadata.date
        );
        println!("    {}", doc.content);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_ask() {
        let cli = Cli::try_parse_from(["review-rag"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn config_is_a_subcommand() {
        let cli = Cli::try_parse_from(["review-rag", "config", "--config", "alt.yml"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config)));
        assert_eq!(cli.config, Some(PathBuf::from("alt.yml")));
    }

    #[test]
    fn search_takes_k_and_json() {
        let cli = Cli::try_parse_from(["review-rag", "search", "crust", "-k", "3", "--json"]).unwrap();
        match cli.command {
            Some(Commands::Search { query, k, json }) => {
                assert_eq!(query, "crust");
                assert_eq!(k, Some(3));
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
