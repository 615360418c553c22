use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use visabridge::commands::{ask, chat, show_summary};
use visabridge::config::{Config, get_config_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "visabridge")]
#[command(about = "A retrieval-augmented visa and immigration assistant")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the metrics file
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation
    Chat,
    /// Ask a single question
    Ask {
        /// The question to answer
        query: String,
        /// Print the passages the answer was based on
        #[arg(long)]
        sources: bool,
    },
    /// Summarise the persisted evaluation metrics
    Summary,
    /// Configure the model service and corpus
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    match config.log_file_path() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };
    let config = Config::load(&config_dir)?;
    init_logging(&config)?;

    match cli.command {
        Commands::Chat => chat(&config)?,
        Commands::Ask { query, sources } => ask(&config, &query, sources)?,
        Commands::Summary => show_summary(&config)?,
        Commands::Config { show } => {
            if show {
                show_config(&config);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
    }

    Ok(())
}
