
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, Provider, ServiceConfig};
use crate::services::HttpTransport;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 VisaBridge Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Service Configuration").bold().yellow());
    eprintln!("Configure the embedding and language model service.");
    eprintln!();

    configure_service(&mut config.service)?;

    eprintln!();
    eprintln!("{}", style("Corpus Configuration").bold().yellow());
    configure_corpus(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_service_connection(&config.service) {
        eprintln!("{}", style("✓ Service connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to the service").yellow()
        );
        eprintln!("You can continue, but make sure the service is reachable before chatting.");
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
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    let service = &config.service;
    eprintln!("{}", style("Service Settings:").bold().yellow());
    eprintln!("  Provider: {}", style(service.provider).cyan());
    match config.service_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Embedding model: {}", style(&service.embedding_model).cyan());
    eprintln!("  Chat model: {}", style(&service.chat_model).cyan());
    eprintln!("  Temperature: {}", style(service.temperature).cyan());
    eprintln!("  Batch size: {}", style(service.batch_size).cyan());
    eprintln!("  Timeout: {}s", style(service.timeout_seconds).cyan());
    let key_state = match service.api_key() {
        Ok(Some(_)) => style("set".to_string()).green(),
        Ok(None) => style("not used".to_string()).dim(),
        Err(e) => style(e.to_string()).red(),
    };
    eprintln!("  API key ({}): {}", service.api_key_env, key_state);

    eprintln!();
    eprintln!("{}", style("Corpus Settings:").bold().yellow());
    eprintln!(
        "  Data directory: {}",
        style(config.corpus_dir().display()).cyan()
    );
    eprintln!(
        "  Chunk size / overlap: {} / {}",
        style(config.corpus.chunk_size).cyan(),
        style(config.corpus.chunk_overlap).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!("  k: {}", style(config.retrieval.k).cyan());
    eprintln!("  Distance: {}", style(config.retrieval.distance).cyan());
    eprintln!(
        "  Condense follow-ups: {}",
        style(config.retrieval.condense_follow_ups).cyan()
    );

    eprintln!();
    eprintln!(
        "Metrics file: {}",
        style(config.metrics_path().display()).dim()
    );
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
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

fn configure_service(service: &mut ServiceConfig) -> Result<()> {
    let providers = &[Provider::Ollama, Provider::OpenAi];
    let provider_index = Select::new()
        .with_prompt("Service provider")
        .default(
            providers
                .iter()
                .position(|&p| p == service.provider)
                .unwrap_or(0),
        )
        .items(providers)
        .interact()?;
    service.provider = providers[provider_index];

    let protocols = &["http", "https"];
    let protocol_index = Select::new()
        .with_prompt("Protocol")
        .default(
            protocols
                .iter()
                .position(|&p| p == service.protocol)
                .unwrap_or(0),
        )
        .items(protocols)
        .interact()?;
    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Host")
        .default(service.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ServiceConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..ServiceConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Port")
        .default(service.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(service.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(service.chat_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Temperature")
        .default(service.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 2.0")
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(service.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    service.set_protocol(protocol)?;
    service.set_host(host)?;
    service.set_port(port)?;
    service.set_embedding_model(embedding_model)?;
    service.set_chat_model(chat_model)?;
    service.set_temperature(temperature)?;
    service.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_corpus(config: &mut Config) -> Result<()> {
    let data_directory: String = Input::new()
        .with_prompt("Corpus directory")
        .default(config.corpus.data_directory.display().to_string())
        .validate_with(non_empty)
        .interact_text()?;

    let chunk_size: usize = Input::new()
        .with_prompt("Chunk size (characters)")
        .default(config.corpus.chunk_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Chunk size must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let chunk_overlap: usize = Input::new()
        .with_prompt("Chunk overlap (characters)")
        .default(config.corpus.chunk_overlap.min(chunk_size.saturating_sub(1)))
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input >= chunk_size {
                Err("Overlap must be smaller than the chunk size")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    config.corpus.data_directory = data_directory.into();
    config.corpus.chunk_size = chunk_size;
    config.corpus.chunk_overlap = chunk_overlap;

    Ok(())
}

#[expect(clippy::ptr_arg, reason = "dialoguer validators receive &String")]
fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Value cannot be empty")
    } else {
        Ok(())
    }
}

fn test_service_connection(service: &ServiceConfig) -> bool {
    // Without a key OpenAI reports 401
    HttpTransport::new(service, service.api_key().ok().flatten())
        .map(|transport| transport.with_retry_attempts(1).ping().is_ok())
        .unwrap_or(false)
}
