//! Interactive Mode - chat loop over one session
//!
//! `/file <path>` attaches a file to the next question, `/clear` drops
//! attachments, `/quit` exits.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use console::Term;
use dialoguer::{theme::ColorfulTheme, Input};

use crate::cli::{new_session_id, print_response, spinner, ChatArgs};
use crate::config::Config;
use crate::engine::{AskRequest, Engine};
use crate::intake::{UploadedFile, MAX_FILES};

/// Run interactive session
pub async fn run_chat_session(config: &Config, args: &ChatArgs) -> Result<()> {
    let term = Term::stdout();
    term.clear_screen()?;

    print_chat_banner();

    let pb = spinner("Loading indices...")?;
    let engine = Engine::from_config(config).await;
    pb.finish_and_clear();
    let engine = engine?;
    let _sweeper = engine.spawn_sweeper();

    let session_id = args.session.clone().unwrap_or_else(new_session_id);
    println!("{} Session: {}\n", "💬".bright_cyan(), session_id.bright_white());

    let mut pending: Vec<UploadedFile> = Vec::new();

    loop {
        let line: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim();

        match Command::parse(line) {
            Command::Empty => continue,
            Command::Quit => break,
            Command::Clear => {
                pending.clear();
                println!("{} Attachments cleared", "✓".bright_green());
            }
            Command::Attach(path) => {
                if pending.len() >= MAX_FILES {
                    println!(
                        "{} At most {} files per question",
                        "✗".bright_red(),
                        MAX_FILES
                    );
                    continue;
                }
                match UploadedFile::from_path(&path) {
                    Ok(file) => {
                        println!("{} Attached {}", "📎".bright_cyan(), file.name);
                        pending.push(file);
                    }
                    Err(e) => println!("{} {:#}", "✗".bright_red(), e),
                }
            }
            Command::Ask(question) => {
                let mut request = AskRequest::new(question, session_id.clone());
                request.files = std::mem::take(&mut pending);

                let pb = spinner("Thinking...")?;
                let response = engine.handle(request).await;
                pb.finish_and_clear();

                match response {
                    Ok(response) => print_response(&response),
                    Err(e) => println!("{} {}", "✗".bright_red(), e),
                }
            }
        }
    }

    println!("\n{}\n", "Bye! 🔀".bright_cyan());
    Ok(())
}

fn print_chat_banner() {
    let banner = r#"
╔══════════════════════════════════════════════════════════════════════════════╗
║  🔀 RAGROUTER - Interactive Chat                                             ║
║                                                                              ║
║  Commands: /file <path> Attach   /clear Drop attachments   /quit Exit        ║
╚══════════════════════════════════════════════════════════════════════════════╝
"#;
    println!("{}", banner.bright_cyan());
}

#[derive(Debug, PartialEq)]
enum Command {
    Empty,
    Quit,
    Clear,
    Attach(PathBuf),
    Ask(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        if line.is_empty() {
            return Command::Empty;
        }
        match line {
            "/quit" | "/exit" | "/q" => Command::Quit,
            "/clear" => Command::Clear,
            _ => match line.strip_prefix("/file ") {
                Some(path) if !path.trim().is_empty() => Command::Attach(PathBuf::from(path.trim())),
                _ => Command::Ask(line.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("/q"), Command::Quit);
        assert_eq!(Command::parse("/clear"), Command::Clear);
        assert_eq!(
            Command::parse("/file  rules.pdf "),
            Command::Attach(PathBuf::from("rules.pdf"))
        );
        assert_eq!(
            Command::parse("what is the fee?"),
            Command::Ask("what is the fee?".into())
        );
    }
}
