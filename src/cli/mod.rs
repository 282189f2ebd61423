//! CLI module - Command line interface definitions and handlers

pub mod interactive;

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{generate_sample_config, Config};
use crate::engine::bootstrap::open_indices;
use crate::engine::{AskRequest, AskResponse, Engine};
use crate::intake::UploadedFile;
use crate::sanitize::Sanitizer;

/// Ragrouter - question-routing retrieval engine
///
/// Classifies each question, answers it from the rule corpus, the database
/// schema or uploaded files, audits the answer and retries on rejection.
#[derive(Parser, Debug)]
#[command(name = "ragrouter")]
#[command(author = "Ryan Cashmoney <tunclon@proton.me>")]
#[command(version)]
#[command(about = "🔀 Question-routing retrieval engine", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose output (debug logs)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Config file (default: ~/.config/ragrouter/config.toml)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask one question
    Ask(AskArgs),

    /// Interactive chat over one session (default)
    Chat(ChatArgs),

    /// Load or build the rule and schema indices
    Index(IndexArgs),

    /// Run the output sanitizer over a file or stdin
    Sanitize(SanitizeArgs),

    /// Show or create the configuration file
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct AskArgs {
    /// The question
    #[arg(required = true)]
    pub question: String,

    /// Session id (default: a fresh UUID)
    #[arg(long, short)]
    pub session: Option<String>,

    /// Upload a file with the question (repeatable, at most 3)
    #[arg(long, short)]
    pub file: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Parser, Default)]
pub struct ChatArgs {
    /// Session id to continue (default: a fresh UUID)
    #[arg(long, short)]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Parser)]
pub struct IndexArgs {
    /// Delete persisted indices and build them again
    #[arg(long)]
    pub rebuild: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct SanitizeArgs {
    /// Input file (default: stdin)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
pub struct ConfigArgs {
    /// Write the default config file if it does not exist
    #[arg(long)]
    pub init: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_from(path),
            None => Ok(Config::load()),
        }
    }
}

/// Filter directive for the crate's own logs: `-v` forces debug, otherwise
/// the configured level, falling back to info
pub fn log_directive(verbose: bool, configured: &str) -> String {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        configured.trim().parse().unwrap_or(tracing::Level::INFO)
    };
    format!("ragrouter={}", level.as_str().to_lowercase())
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .context("Invalid spinner template")?,
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb.set_message(message.to_string());
    Ok(pb)
}

pub fn print_response(response: &AskResponse) {
    println!("\n{} {}\n", "▸".bright_cyan(), response.intent.bright_yellow());
    println!("{}", response.answer);

    if let Some(warning) = &response.warning {
        println!("\n{} {}", "⚠".bright_yellow(), warning.yellow());
    }
    if !response.sources.is_empty() {
        println!("\n{}", "Sources:".bright_white());
        for source in &response.sources {
            println!("  {} {}", "•".bright_cyan(), source);
        }
    }
    println!();
}

pub async fn run_ask(config: &Config, args: &AskArgs) -> Result<()> {
    let engine = Engine::from_config(config).await?;

    let session_id = args.session.clone().unwrap_or_else(new_session_id);
    let mut request = AskRequest::new(args.question.clone(), session_id);
    for path in &args.file {
        request = request.with_file(UploadedFile::from_path(path)?);
    }

    let pb = match args.output {
        OutputFormat::Human => Some(spinner("Thinking...")?),
        OutputFormat::Json => None,
    };
    let response = engine.handle(request).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let response = response?;

    match args.output {
        OutputFormat::Human => print_response(&response),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
    }
    Ok(())
}

pub async fn run_index(config: &Config, args: &IndexArgs) -> Result<()> {
    let pb = spinner(if args.rebuild {
        "Rebuilding indices..."
    } else {
        "Loading indices..."
    })?;

    let owned = config.clone();
    let rebuild = args.rebuild;
    let loaded = tokio::task::spawn_blocking(move || open_indices(&owned, rebuild))
        .await
        .context("Index task failed")??;
    pb.finish_and_clear();

    println!(
        "{} Schema catalog: {} object(s)",
        "🗄️".bright_cyan(),
        loaded.catalog.objects().len()
    );
    for status in &loaded.status {
        match (status.chunks, &status.error) {
            (Some(chunks), _) => println!(
                "{} {} index: {} chunk(s)",
                "✓".bright_green(),
                status.name,
                chunks.to_string().bright_white()
            ),
            (None, Some(error)) => println!(
                "{} {} index unavailable: {}",
                "✗".bright_red(),
                status.name,
                error
            ),
            (None, None) => println!("{} {} index unavailable", "✗".bright_red(), status.name),
        }
    }
    Ok(())
}

pub fn run_sanitize(args: &SanitizeArgs) -> Result<()> {
    let input = match &args.path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    print!("{}", Sanitizer::new()?.sanitize(&input));
    Ok(())
}

pub fn run_config(args: &ConfigArgs) -> Result<()> {
    if args.init {
        let path = Config::ensure_exists()?;
        println!("{} Config: {}", "✓".bright_green(), path.display());
    } else {
        print!("{}", generate_sample_config());
    }
    Ok(())
}
