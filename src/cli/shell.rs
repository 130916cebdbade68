//! `auctioneer shell`: interactive console for running a live auction.
//!
//! One engine and store live for the whole session, so the in-memory backend
//! keeps its state between commands.

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::{output, AuctionCommand, Session};
use crate::engine::AuctionEngine;

/// Internal CLI struct for shell parsing.
#[derive(Parser)]
#[command(name = "auction", no_binary_name = true)]
struct ShellCli {
    #[command(subcommand)]
    command: AuctionCommand,
}

pub async fn run(engine: &AuctionEngine, session: &Session) -> anyhow::Result<()> {
    println!("\x1b[36mAuction Console\x1b[0m");
    println!("Type 'help' for available commands, 'exit' to quit.");
    println!();

    let history_path = dirs::data_dir().map(|d| d.join("auctioneer").join("history.txt"));

    let mut rl = DefaultEditor::new()?;
    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline("\x1b[36mauction>\x1b[0m ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    "exit" | "quit" | "q" => break,
                    "help" | "?" => {
                        print_shell_help();
                        continue;
                    }
                    _ => {}
                }

                match ShellCli::try_parse_from(split_args(line)) {
                    Ok(parsed) => {
                        if let Err(e) = super::run(engine, parsed.command, session).await {
                            output::print_error(&format!("{e}"));
                        }
                    }
                    Err(e) => {
                        eprintln!("{e}");
                    }
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("readline error: {e}");
                break;
            }
        }
    }

    if let Some(ref path) = history_path {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(path);
    }

    Ok(())
}

/// Whitespace split that keeps double-quoted names together
fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in line.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

fn print_shell_help() {
    println!("Available commands:");
    println!("  start                      begin at the BAT stage");
    println!("  pick                       put a random player on the block");
    println!("  sell <team> <price>        sell to a team (id or name)");
    println!("  unsold | not-playing       clear the block without a sale");
    println!("  undo                       reverse the last sale");
    println!("  rebid {{on,off}}             suspend the icon-round rule");
    println!("  park {{on,off}}              pause picking");
    println!("  stage [name]               advance, or move to the named stage");
    println!("  reset [--yes]              refill budgets and clear sales");
    println!("  status | teams | players | history");
    println!("  add-team | add-player | remove-team | remove-player");
    println!("  help                       (this message)");
    println!("  exit                       (quit shell)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_args_keeps_quoted_names() {
        assert_eq!(
            split_args(r#"sell "Royal Kings" 1200"#),
            vec!["sell", "Royal Kings", "1200"]
        );
        assert_eq!(split_args("  pick  "), vec!["pick"]);
    }

    #[test]
    fn test_shell_parses_without_binary_name() {
        let parsed = ShellCli::try_parse_from(split_args("history --limit 5")).unwrap();
        assert!(matches!(parsed.command, AuctionCommand::History { limit: 5 }));
    }
}
