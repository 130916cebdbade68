//! Output formatting for `auctioneer` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::domain::{AuctionLog, Player, Team};
use crate::engine::AuctionStatus;

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

#[derive(Tabled)]
struct TeamRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Team")]
    name: String,
    #[tabled(rename = "Remaining")]
    remaining: i64,
    #[tabled(rename = "Spent")]
    spent: i64,
    #[tabled(rename = "Slots")]
    slots: i32,
}

impl From<&Team> for TeamRow {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id,
            name: team.name.clone(),
            remaining: team.remaining_points,
            spent: team.spent_points(),
            slots: team.auction_slots,
        }
    }
}

#[derive(Tabled)]
struct PlayerRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "#")]
    serial: i32,
    #[tabled(rename = "Player")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Price")]
    price: String,
}

impl From<&Player> for PlayerRow {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            serial: player.serial_number,
            name: player.name.clone(),
            role: player.role.to_string(),
            status: player.status.to_string(),
            team: dash(player.team_id),
            price: dash(player.sold_price),
        }
    }
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Stage")]
    stage: String,
    #[tabled(rename = "Player")]
    player: String,
    #[tabled(rename = "Team")]
    team: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "By")]
    admin: String,
    #[tabled(rename = "Notes")]
    notes: String,
}

impl From<&AuctionLog> for LogRow {
    fn from(log: &AuctionLog) -> Self {
        let action = if log.undone_at.is_some() {
            format!("{} (undone)", log.action_type)
        } else {
            log.action_type.to_string()
        };
        Self {
            id: log.id,
            time: log.timestamp.format("%H:%M:%S").to_string(),
            action,
            stage: dash(log.stage),
            player: dash(log.player_id),
            team: dash(log.team_id),
            price: dash(log.sold_price),
            admin: log.admin_user.clone().unwrap_or_else(|| "-".to_string()),
            notes: log.notes.clone().unwrap_or_default(),
        }
    }
}

fn dash<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn print_table<R: Tabled>(rows: Vec<R>) {
    if rows.is_empty() {
        println!("(no results)");
    } else {
        println!("{}", Table::new(rows));
    }
}

/// Print a single Serialize item as pretty JSON.
pub fn print_item<T: Serialize>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

pub fn print_teams(teams: &[Team], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => print_table(teams.iter().map(TeamRow::from).collect()),
        OutputMode::Json => print_item(&teams)?,
    }
    Ok(())
}

pub fn print_players(players: &[Player], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => print_table(players.iter().map(PlayerRow::from).collect()),
        OutputMode::Json => print_item(&players)?,
    }
    Ok(())
}

pub fn print_history(logs: &[AuctionLog], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => print_table(logs.iter().map(LogRow::from).collect()),
        OutputMode::Json => print_item(&logs)?,
    }
    Ok(())
}

pub fn print_status(status: &AuctionStatus, mode: OutputMode) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        return print_item(status);
    }

    print_kv("Started", if status.is_started { "yes" } else { "no" });
    print_kv("Stage", status.current_stage.as_str());
    print_kv("Rebid", if status.is_rebid { "on" } else { "off" });
    print_kv("Parked", if status.is_parked { "yes" } else { "no" });
    match &status.current_player {
        Some(player) => print_kv(
            "On the block",
            &format!("{} (#{}, {})", player.name, player.serial_number, player.role),
        ),
        None => print_kv("On the block", "-"),
    }
    Ok(())
}

/// Print a player after an action, or the player as JSON.
pub fn print_player(message: &str, player: &Player, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => print_success(&format!("{message}: {} (#{})", player.name, player.serial_number)),
        OutputMode::Json => print_item(player)?,
    }
    Ok(())
}

/// Print a simple key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("{key}: {value}");
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}

/// Prompt user for confirmation. Returns true if confirmed.
pub fn confirm(prompt: &str) -> bool {
    use std::io::{self, Write};
    print!("{prompt} [y/N] ");
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input).ok();
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
