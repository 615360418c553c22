// CLI command handlers


use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use console::style;
use tracing::info;

use crate::VisaBridgeBot;
use crate::config::Config;
use crate::evaluation::{MetricsStore, QualityThresholds, Summary};
use crate::index::SearchResult;

/// What the user typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Quit,
    Clear,
    Summary,
    Empty,
    Query(String),
}

impl ChatInput {
    #[inline]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "quit" | "exit" => Self::Quit,
            "/clear" => Self::Clear,
            "/summary" => Self::Summary,
            "" => Self::Empty,
            _ => Self::Query(trimmed.to_string()),
        }
    }
}

fn start_bot(config: &Config) -> Result<VisaBridgeBot> {
    eprintln!("{}", style("Initializing VisaBridge...").yellow());
    let bot = VisaBridgeBot::new(config).context("Failed to initialize VisaBridge")?;
    info!("Indexed {} chunks", bot.index().len());
    Ok(bot)
}

/// Interactive conversation on stdin/stdout
#[inline]
pub fn chat(config: &Config) -> Result<()> {
    let mut bot = start_bot(config)?;
    eprintln!(
        "{}",
        style("VisaBridge is ready! Type 'quit' to exit, '/clear' to start over, '/summary' for statistics.")
            .green()
    );

    bot.start_conversation();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\nYou: ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };

        match ChatInput::parse(&line?) {
            ChatInput::Quit => break,
            ChatInput::Empty => {}
            ChatInput::Clear => {
                bot.clear_conversation();
                println!("Conversation cleared.");
            }
            ChatInput::Summary => {
                println!("\n{}", format_summary(&bot.generate_summary()));
            }
            ChatInput::Query(query) => {
                let answer = bot.chat(&query);
                println!("\nBot: {answer}");
            }
        }
    }

    let summary = bot.end_conversation();
    println!("\n{}", style("Conversation Summary:").bold());
    println!("{}", format_summary(&summary));
    Ok(())
}

/// Answer a single question and end the conversation
#[inline]
pub fn ask(config: &Config, query: &str, show_sources: bool) -> Result<()> {
    let mut bot = start_bot(config)?;
    bot.start_conversation();

    let reply = bot.respond(query);
    println!("{}", reply.answer);

    if show_sources && !reply.sources.is_empty() {
        println!("\n{}", style("Sources:").bold());
        for line in format_sources(&reply.sources) {
            println!("{line}");
        }
    }

    bot.end_conversation();
    Ok(())
}

/// Summarise the persisted metrics file
#[inline]
pub fn show_summary(config: &Config) -> Result<()> {
    let path = config.metrics_path();
    let store = MetricsStore::load(&path)
        .with_context(|| format!("Failed to read metrics from {}", path.display()))?;

    println!("{}", style(format!("Metrics from {}", path.display())).cyan());
    println!(
        "{}",
        format_summary(&store.summary(&QualityThresholds::from(&config.evaluation), None))
    );
    Ok(())
}

#[inline]
pub fn format_summary(summary: &Summary) -> String {
    match summary {
        Summary::NoData { error } => error.clone(),
        Summary::Report(report) => [
            format!("Total conversations: {}", report.total_conversations),
            format!("Total queries: {}", report.total_queries),
            format!(
                "Average response time: {} seconds",
                report.average_response_time
            ),
            format!("Error rate: {}%", report.error_rate),
            format!("Total errors: {}", report.total_errors),
            format!("Slow responses: {}", report.slow_responses),
            format!("Short responses: {}", report.short_responses),
            format!(
                "Generated at: {}",
                report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ]
        .join("\n"),
    }
}

#[inline]
pub fn format_sources(sources: &[SearchResult]) -> Vec<String> {
    sources
        .iter()
        .enumerate()
        .map(|(rank, result)| {
            format!(
                "{}. {} (chunk {}, distance {:.4})",
                rank + 1,
                result.chunk.source_file,
                result.chunk.ordinal,
                result.distance
            )
        })
        .collect()
}
