//! Ragrouter - question-routing retrieval engine
//!
//! Routes each question to a rule, schema, file or chat strategy, audits
//! the answer and retries with the auditor's feedback.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ragrouter::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config();

    // Initialize logging
    let configured = config
        .as_ref()
        .map(|c| c.general.log_level.as_str())
        .unwrap_or("info");
    let directive = cli::log_directive(cli.verbose, configured);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).compact())
            .with(filter)
            .init();
    }

    match cli.command {
        Some(Commands::Ask(ref args)) => {
            cli::run_ask(&config?, args).await?;
        }
        Some(Commands::Chat(ref args)) => {
            cli::interactive::run_chat_session(&config?, args).await?;
        }
        Some(Commands::Index(ref args)) => {
            cli::run_index(&config?, args).await?;
        }
        Some(Commands::Sanitize(ref args)) => {
            cli::run_sanitize(args)?;
        }
        Some(Commands::Config(ref args)) => {
            cli::run_config(args)?;
        }
        None => {
            // Default: interactive chat
            cli::interactive::run_chat_session(&config?, &cli::ChatArgs::default()).await?;
        }
    }

    Ok(())
}
