//! Command-line surface for the auction console

pub mod output;
pub mod shell;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::{NewPlayer, NewTeam, PlayerRole, PlayerStatus, TeamId};
use crate::engine::AuctionEngine;
use crate::error::ValidationError;
use output::OutputMode;

#[derive(Parser)]
#[command(name = "auctioneer")]
#[command(version)]
#[command(about = "Live player auction console", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Config directory
    #[arg(short, long, default_value = "config", global = true)]
    pub config: String,

    /// Operator name recorded in the audit log
    #[arg(long, env = "AUCTION_ADMIN", global = true)]
    pub admin: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Auction(AuctionCommand),
    /// Apply database migrations
    Migrate,
    /// Interactive shell sharing one engine across commands
    Shell,
}

/// Commands available both one-shot and inside the shell
#[derive(Subcommand, Debug, Clone)]
pub enum AuctionCommand {
    /// Start the auction at the BAT stage
    Start,
    /// Put a random eligible player on the block
    Pick,
    /// Sell the player on the block
    Sell {
        /// Team id or name
        team: String,
        /// Selling price in points
        price: i64,
    },
    /// Assign a player to a team without going through the block
    Assign {
        /// Player id
        player: i64,
        /// Team id or name
        team: String,
        /// Price charged to the team
        price: i64,
    },
    /// Return the player on the block to the pool
    Unsold,
    /// Withdraw the player on the block from the auction
    NotPlaying,
    /// Reverse the last sale
    Undo,
    /// Turn rebid mode on or off
    Rebid {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Park or resume picking
    Park {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Move to the next stage, or to the named one
    Stage {
        /// BAT, BOWL, AR, OPEN or COMPLETED
        stage: Option<String>,
    },
    /// Restore every budget and return sold players to the pool
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show auction state
    Status,
    /// List teams with budgets
    Teams,
    /// List players
    Players(PlayerFilter),
    /// Show recent audit entries
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Register a team
    AddTeam {
        name: String,
        #[arg(long, default_value_t = crate::domain::DEFAULT_TOTAL_POINTS)]
        points: i64,
        #[arg(long, default_value_t = crate::domain::DEFAULT_MAX_PLAYERS)]
        max_players: i32,
        #[arg(long, default_value_t = crate::domain::DEFAULT_AUCTION_SLOTS)]
        slots: i32,
    },
    /// Register a player
    AddPlayer {
        serial: i32,
        name: String,
        #[arg(value_parser = parse_role)]
        role: PlayerRole,
        #[arg(long)]
        base_price: Option<i64>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Remove a team that owns no sold players
    RemoveTeam { id: TeamId },
    /// Remove a player that is not sold
    RemovePlayer { id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PlayerFilter {
    /// Only this role
    #[arg(long, value_parser = parse_role)]
    pub role: Option<PlayerRole>,
    /// Only players still available
    #[arg(long)]
    pub available: bool,
}

fn parse_role(raw: &str) -> Result<PlayerRole, String> {
    PlayerRole::try_from(raw).map_err(|_| ValidationError::UnknownRole(raw.to_string()).to_string())
}

/// Per-invocation settings
#[derive(Debug, Clone)]
pub struct Session {
    pub mode: OutputMode,
    pub admin: Option<String>,
}

/// Execute one auction command against `engine`
pub async fn run(engine: &AuctionEngine, command: AuctionCommand, session: &Session) -> anyhow::Result<()> {
    let mode = session.mode;
    let admin = session.admin.as_deref();

    match command {
        AuctionCommand::Start => {
            let control = engine.start_auction().await?;
            match mode {
                OutputMode::Table => output::print_success(&format!(
                    "Auction started at stage {}",
                    control.current_stage
                )),
                OutputMode::Json => output::print_item(&control)?,
            }
        }
        AuctionCommand::Pick => {
            let player = engine.pick_random_player().await?;
            output::print_player("On the block", &player, mode)?;
        }
        AuctionCommand::Sell { team, price } => {
            let team_id = resolve_team(engine, &team).await?;
            let player = engine.sell_current_player(team_id, price, admin).await?;
            output::print_player(&format!("Sold to {team} for {price}"), &player, mode)?;
        }
        AuctionCommand::Assign {
            player,
            team,
            price,
        } => {
            let team_id = resolve_team(engine, &team).await?;
            let player = engine.assign_player(player, team_id, price, admin).await?;
            output::print_player(&format!("Assigned to {team} for {price}"), &player, mode)?;
        }
        AuctionCommand::Unsold => {
            let player = engine.mark_unsold(admin).await?;
            output::print_player("Unsold", &player, mode)?;
        }
        AuctionCommand::NotPlaying => {
            let player = engine.mark_not_playing(admin).await?;
            output::print_player("Not playing", &player, mode)?;
        }
        AuctionCommand::Undo => {
            let player = engine.undo_last_action(admin).await?;
            output::print_player("Sale undone", &player, mode)?;
        }
        AuctionCommand::Rebid { state } => {
            let control = match state {
                Toggle::On => engine.enable_rebid().await?,
                Toggle::Off => engine.disable_rebid().await?,
            };
            match mode {
                OutputMode::Table => output::print_kv("Rebid", if control.is_rebid { "on" } else { "off" }),
                OutputMode::Json => output::print_item(&control)?,
            }
        }
        AuctionCommand::Park { state } => {
            let control = match state {
                Toggle::On => engine.park_auction().await?,
                Toggle::Off => engine.unpark_auction().await?,
            };
            match mode {
                OutputMode::Table => output::print_kv("Parked", if control.is_parked { "yes" } else { "no" }),
                OutputMode::Json => output::print_item(&control)?,
            }
        }
        AuctionCommand::Stage { stage } => {
            let stage = match stage {
                Some(name) => engine.change_stage_named(&name, admin).await?,
                None => engine.advance_stage(admin).await?,
            };
            match mode {
                OutputMode::Table => output::print_success(&format!("Stage is now {stage}")),
                OutputMode::Json => output::print_item(&stage)?,
            }
        }
        AuctionCommand::Reset { yes } => {
            if !yes && !output::confirm("Reset all budgets and return sold players to the pool?") {
                println!("Aborted");
                return Ok(());
            }
            let summary = engine.reset_auction(admin).await?;
            output::print_success(&format!(
                "Auction reset: {} players restored, {} teams refilled",
                summary.players_restored, summary.teams_restored
            ));
        }
        AuctionCommand::Status => {
            let status = engine.status().await?;
            output::print_status(&status, mode)?;
        }
        AuctionCommand::Teams => {
            let teams = engine.teams().await?;
            output::print_teams(&teams, mode)?;
        }
        AuctionCommand::Players(filter) => {
            let players: Vec<_> = engine
                .players()
                .await?
                .into_iter()
                .filter(|p| filter.role.map_or(true, |role| p.role == role))
                .filter(|p| !filter.available || p.status == PlayerStatus::Unsold)
                .collect();
            output::print_players(&players, mode)?;
        }
        AuctionCommand::History { limit } => {
            let logs = engine.history(limit).await?;
            output::print_history(&logs, mode)?;
        }
        AuctionCommand::AddTeam {
            name,
            points,
            max_players,
            slots,
        } => {
            let team = engine
                .register_team(
                    NewTeam::new(name)
                        .with_points(points)
                        .with_max_players(max_players)
                        .with_slots(slots),
                )
                .await?;
            match mode {
                OutputMode::Table => output::print_success(&format!("Team {} registered with id {}", team.name, team.id)),
                OutputMode::Json => output::print_item(&team)?,
            }
        }
        AuctionCommand::AddPlayer {
            serial,
            name,
            role,
            base_price,
            notes,
        } => {
            let mut new_player = NewPlayer::new(serial, name, role);
            if let Some(base_price) = base_price {
                new_player = new_player.with_base_price(base_price);
            }
            if let Some(notes) = notes {
                new_player = new_player.with_notes(notes);
            }
            let player = engine.register_player(new_player).await?;
            output::print_player("Registered", &player, mode)?;
        }
        AuctionCommand::RemoveTeam { id } => {
            let team = engine.remove_team(id).await?;
            output::print_success(&format!("Removed team {}", team.name));
        }
        AuctionCommand::RemovePlayer { id } => {
            let player = engine.remove_player(id).await?;
            output::print_player("Removed", &player, mode)?;
        }
    }

    Ok(())
}

/// Accept a numeric id or a case-insensitive team name
async fn resolve_team(engine: &AuctionEngine, raw: &str) -> anyhow::Result<TeamId> {
    if let Ok(id) = raw.parse::<TeamId>() {
        return Ok(id);
    }
    engine
        .teams()
        .await?
        .into_iter()
        .find(|t| t.name.eq_ignore_ascii_case(raw.trim()))
        .map(|t| t.id)
        .ok_or_else(|| anyhow!(ValidationError::InvalidTeam))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sell_and_stage() {
        let cli = Cli::try_parse_from(["auctioneer", "--json", "sell", "Lions", "1500"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Auction(AuctionCommand::Sell { team, price }) => {
                assert_eq!(team, "Lions");
                assert_eq!(price, 1500);
            }
            _ => panic!("expected sell"),
        }

        let cli = Cli::try_parse_from(["auctioneer", "assign", "7", "Tigers", "800"]).unwrap();
        match cli.command {
            Commands::Auction(AuctionCommand::Assign {
                player,
                team,
                price,
            }) => {
                assert_eq!(player, 7);
                assert_eq!(team, "Tigers");
                assert_eq!(price, 800);
            }
            _ => panic!("expected assign"),
        }

        let cli = Cli::try_parse_from(["auctioneer", "stage"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Auction(AuctionCommand::Stage { stage: None })
        ));
    }

    #[test]
    fn test_parse_add_player_role() {
        let cli = Cli::try_parse_from(["auctioneer", "add-player", "12", "Ravi", "bowl"]).unwrap();
        match cli.command {
            Commands::Auction(AuctionCommand::AddPlayer { serial, role, .. }) => {
                assert_eq!(serial, 12);
                assert_eq!(role, PlayerRole::Bowl);
            }
            _ => panic!("expected add-player"),
        }

        assert!(Cli::try_parse_from(["auctioneer", "add-player", "12", "Ravi", "keeper"]).is_err());
    }

    #[test]
    fn test_parse_toggles() {
        let cli = Cli::try_parse_from(["auctioneer", "rebid", "on"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Auction(AuctionCommand::Rebid { state: Toggle::On })
        ));
        assert!(Cli::try_parse_from(["auctioneer", "park", "maybe"]).is_err());
    }
}
