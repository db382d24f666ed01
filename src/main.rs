use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_rag::commands::{ask_question, clear_index, index_docs, load_config, search_docs};
use docs_rag::config::{get_config_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Answer questions from a Markdown documentation tree with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, the vector store and the pipeline
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index the Markdown files under a directory
    Index {
        /// Root of the documentation tree
        dir: PathBuf,
    },
    /// Ask a question about the indexed documentation
    Ask {
        question: String,
        /// Print the answer and its sources as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the passages closest to a query, with their scores
    Search {
        query: String,
        /// Number of passages to show, defaults to the configured top_k
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Delete every indexed chunk
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&load_config()?)?;
            } else {
                run_interactive_config(&get_config_dir()?)?;
            }
        }
        Commands::Index { dir } => {
            index_docs(&load_config()?, &dir).await?;
        }
        Commands::Ask { question, json } => {
            ask_question(&load_config()?, &question, json).await?;
        }
        Commands::Search { query, top_k } => {
            search_docs(&load_config()?, &query, top_k).await?;
        }
        Commands::Clear { yes } => {
            clear_index(&load_config()?, yes).await?;
        }
    }

    Ok(())
}
