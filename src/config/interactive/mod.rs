
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;
use std::time::Duration;

use super::{Config, ConfigError, OllamaConfig};
use crate::embeddings::EmbedderKind;
use crate::embeddings::ollama::OllamaClient;
use crate::vector_store::VectorBackend;

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Docs RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used for embeddings, reranking and answers.");
    eprintln!();
    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Vector Store Configuration").bold().yellow());
    configure_vector_store(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_ollama_connection(&config.ollama) {
        ConnectionStatus::Ready => {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
        }
        ConnectionStatus::MissingModels(missing) => {
            eprintln!(
                "{}",
                style("⚠ Connected, but some models are not pulled yet:").yellow()
            );
            for model in missing {
                eprintln!("  - {}", style(model).cyan());
            }
        }
        ConnectionStatus::Unreachable => {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            eprintln!("You can continue, but make sure Ollama is running before indexing.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    let ollama = &config.ollama;
    eprintln!(
        "  Embedding model: {} ({} dimensions)",
        style(&ollama.embedding_model).cyan(),
        ollama.embedding_dimension
    );
    eprintln!("  Generation model: {}", style(&ollama.generation_model).cyan());
    eprintln!("  Rerank model: {}", style(&ollama.rerank_model).cyan());
    eprintln!("  Safeguard model: {}", style(&ollama.safeguard_model).cyan());
    eprintln!(
        "  Embedders: index={}, query={}",
        style(ollama.index_embedder).cyan(),
        style(ollama.query_embedder).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    let store = &config.vector_store;
    eprintln!("  Backend: {}", style(store.backend).cyan());
    match store.backend {
        VectorBackend::Qdrant => eprintln!("  URL: {}", style(&store.url).cyan()),
        VectorBackend::LanceDb => eprintln!(
            "  Path: {}",
            style(config.vector_database_path().display()).cyan()
        ),
    }
    eprintln!("  Collection: {}", style(&store.collection).cyan());
    eprintln!("  Score threshold: {}", style(store.score_threshold).cyan());

    eprintln!();
    eprintln!("{}", style("Pipeline:").bold().yellow());
    let pipeline = &config.pipeline;
    eprintln!("  Top K: {}", style(pipeline.top_k).cyan());
    eprintln!("  Temperature: {}", style(pipeline.temperature).cyan());
    eprintln!(
        "  Chunks: {} chars, {} overlap",
        style(config.chunking.max_chars).cyan(),
        style(config.chunking.overlap).cyan()
    );
    eprintln!(
        "  Safeguard: {}",
        if pipeline.safeguard {
            style(format!("on ({})", pipeline.product_name)).green()
        } else {
            style("off".to_string()).dim()
        }
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load_file(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;
    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let candidate = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            candidate.ollama_url()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model = prompt_model("Embedding model", &ollama.embedding_model)?;
    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;
    let generation_model = prompt_model("Generation model", &ollama.generation_model)?;
    let rerank_model = prompt_model("Rerank model", &ollama.rerank_model)?;

    let embedders = [EmbedderKind::Generic, EmbedderKind::Cleaning];
    let query_index = Select::new()
        .with_prompt("Question text preparation")
        .default(usize::from(ollama.query_embedder == EmbedderKind::Cleaning))
        .items(&embedders)
        .interact()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_embedding_dimension(dimension)?;
    ollama.set_generation_model(generation_model)?;
    ollama.set_rerank_model(rerank_model)?;
    ollama.query_embedder = embedders[query_index];

    Ok(())
}

fn configure_vector_store(config: &mut Config) -> Result<()> {
    let backends = [VectorBackend::Qdrant, VectorBackend::LanceDb];
    let backend_index = Select::new()
        .with_prompt("Vector store backend")
        .default(usize::from(config.vector_store.backend == VectorBackend::LanceDb))
        .items(&backends)
        .interact()?;
    config.vector_store.backend = backends[backend_index];

    if config.vector_store.backend == VectorBackend::Qdrant {
        config.vector_store.url = Input::new()
            .with_prompt("Qdrant URL")
            .default(config.vector_store.url.clone())
            .validate_with(|input: &String| -> Result<(), &str> {
                url::Url::parse(input)
                    .map(|_| ())
                    .map_err(|_| "Not a valid URL")
            })
            .interact_text()?;
    }

    config.vector_store.collection = Input::new()
        .with_prompt("Collection name")
        .default(config.vector_store.collection.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Collection name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    Ok(())
}

fn prompt_model(prompt: &str, current: &str) -> Result<String> {
    let model = Input::new()
        .with_prompt(prompt)
        .default(current.to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(model)
}

#[derive(Debug, PartialEq, Eq)]
enum ConnectionStatus {
    Ready,
    MissingModels(Vec<String>),
    Unreachable,
}

fn test_ollama_connection(ollama: &OllamaConfig) -> ConnectionStatus {
    let Ok(client) = OllamaClient::new(ollama) else {
        return ConnectionStatus::Unreachable;
    };
    let client = client.with_timeout(CONNECTION_TEST_TIMEOUT);

    let Ok(models) = client.list_models() else {
        return ConnectionStatus::Unreachable;
    };

    let missing = missing_models(
        ollama,
        &models.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
    );
    if missing.is_empty() {
        ConnectionStatus::Ready
    } else {
        ConnectionStatus::MissingModels(missing)
    }
}

/// Configured models absent from the server's list. Untagged names match `:latest`.
fn missing_models(ollama: &OllamaConfig, available: &[&str]) -> Vec<String> {
    let is_available = |model: &str| {
        available.iter().any(|name| {
            *name == model || (!model.contains(':') && *name == format!("{}:latest", model))
        })
    };

    let mut missing = Vec::new();
    for model in [
        &ollama.embedding_model,
        &ollama.generation_model,
        &ollama.rerank_model,
    ] {
        if !is_available(model) && !missing.contains(model) {
            missing.push(model.clone());
        }
    }
    missing
}
