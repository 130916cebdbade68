use serde::{Deserialize, Serialize};
use std::fmt;

use super::TeamId;

pub type PlayerId = i64;

/// Player category. The three icon roles double as icon stage names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlayerRole {
    /// Batting icon
    Bat,
    /// Bowling icon
    Bowl,
    /// All-rounder icon
    Ar,
    /// Regular player
    Ply,
}

impl PlayerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerRole::Bat => "BAT",
            PlayerRole::Bowl => "BOWL",
            PlayerRole::Ar => "AR",
            PlayerRole::Ply => "PLY",
        }
    }

    pub fn is_icon(&self) -> bool {
        !matches!(self, PlayerRole::Ply)
    }
}

impl fmt::Display for PlayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PlayerRole {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_uppercase().as_str() {
            "BAT" => Ok(PlayerRole::Bat),
            "BOWL" => Ok(PlayerRole::Bowl),
            "AR" => Ok(PlayerRole::Ar),
            "PLY" => Ok(PlayerRole::Ply),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Player auction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    Unsold,
    Sold,
    NotPlaying,
    /// Free addition outside the auction
    Free,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Unsold => "UNSOLD",
            PlayerStatus::Sold => "SOLD",
            PlayerStatus::NotPlaying => "NOT_PLAYING",
            PlayerStatus::Free => "FREE",
        }
    }
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PlayerStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_uppercase().as_str() {
            "UNSOLD" => Ok(PlayerStatus::Unsold),
            "SOLD" => Ok(PlayerStatus::Sold),
            "NOT_PLAYING" => Ok(PlayerStatus::NotPlaying),
            "FREE" => Ok(PlayerStatus::Free),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// A player in the pool.
///
/// `status == Sold` holds exactly when both `team_id` and `sold_price` are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub serial_number: i32,
    pub name: String,
    pub role: PlayerRole,
    pub base_price: Option<i64>,
    pub status: PlayerStatus,
    pub sold_price: Option<i64>,
    pub team_id: Option<TeamId>,
    pub notes: Option<String>,
}

impl Player {
    /// Eligible to be put on the block
    pub fn is_available(&self) -> bool {
        self.status == PlayerStatus::Unsold && self.team_id.is_none()
    }

    pub fn mark_sold(&mut self, team_id: TeamId, price: i64) {
        self.status = PlayerStatus::Sold;
        self.team_id = Some(team_id);
        self.sold_price = Some(price);
    }

    /// Back to the pool with no owner or price
    pub fn restore_unsold(&mut self) {
        self.status = PlayerStatus::Unsold;
        self.team_id = None;
        self.sold_price = None;
    }

    pub fn mark_not_playing(&mut self) {
        self.status = PlayerStatus::NotPlaying;
    }

    /// Check the status/team/price coupling
    pub fn is_consistent(&self) -> bool {
        let sold = self.status == PlayerStatus::Sold;
        sold == self.team_id.is_some() && sold == self.sold_price.is_some()
    }
}

/// Fields for registering a player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPlayer {
    pub serial_number: i32,
    pub name: String,
    pub role: PlayerRole,
    pub base_price: Option<i64>,
    pub notes: Option<String>,
}

impl NewPlayer {
    pub fn new(serial_number: i32, name: impl Into<String>, role: PlayerRole) -> Self {
        Self {
            serial_number,
            name: name.into(),
            role,
            base_price: None,
            notes: None,
        }
    }

    pub fn with_base_price(mut self, base_price: i64) -> Self {
        self.base_price = Some(base_price);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn into_player(self, id: PlayerId) -> Player {
        Player {
            id,
            serial_number: self.serial_number,
            name: self.name,
            role: self.role,
            base_price: self.base_price,
            status: PlayerStatus::Unsold,
            sold_price: None,
            team_id: None,
            notes: self.notes,
        }
    }
}
