use serde::{Deserialize, Serialize};
use std::fmt;

use super::{PlayerId, PlayerRole};

/// Auction phase. Progression is strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStage {
    NotStarted,
    /// Batting icons
    Bat,
    /// Bowling icons
    Bowl,
    /// All-rounder icons
    Ar,
    /// Open auction for the remaining pool
    Open,
    Completed,
}

impl AuctionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStage::NotStarted => "NOT_STARTED",
            AuctionStage::Bat => "BAT",
            AuctionStage::Bowl => "BOWL",
            AuctionStage::Ar => "AR",
            AuctionStage::Open => "OPEN",
            AuctionStage::Completed => "COMPLETED",
        }
    }

    /// The stage that follows this one, if any
    pub fn next(&self) -> Option<AuctionStage> {
        use AuctionStage::*;

        match self {
            NotStarted => Some(Bat),
            Bat => Some(Bowl),
            Bowl => Some(Ar),
            Ar => Some(Open),
            Open => Some(Completed),
            Completed => None,
        }
    }

    /// Only single forward steps are legal
    pub fn can_transition_to(&self, target: AuctionStage) -> bool {
        self.next() == Some(target)
    }

    /// Role sold during this stage when it is an icon stage
    pub fn icon_role(&self) -> Option<PlayerRole> {
        match self {
            AuctionStage::Bat => Some(PlayerRole::Bat),
            AuctionStage::Bowl => Some(PlayerRole::Bowl),
            AuctionStage::Ar => Some(PlayerRole::Ar),
            _ => None,
        }
    }

    pub fn is_icon(&self) -> bool {
        self.icon_role().is_some()
    }

    /// Stages in which players can be put on the block
    pub fn is_selling(&self) -> bool {
        matches!(
            self,
            AuctionStage::Bat | AuctionStage::Bowl | AuctionStage::Ar | AuctionStage::Open
        )
    }
}

impl Default for AuctionStage {
    fn default() -> Self {
        AuctionStage::NotStarted
    }
}

impl fmt::Display for AuctionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for AuctionStage {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_uppercase().as_str() {
            "NOT_STARTED" => Ok(AuctionStage::NotStarted),
            "BAT" => Ok(AuctionStage::Bat),
            "BOWL" => Ok(AuctionStage::Bowl),
            "AR" => Ok(AuctionStage::Ar),
            "OPEN" => Ok(AuctionStage::Open),
            "COMPLETED" => Ok(AuctionStage::Completed),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Singleton auction control record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionControl {
    pub is_started: bool,
    pub current_stage: AuctionStage,
    /// Player on the block; weak reference, nulled when the player is removed
    pub current_player_id: Option<PlayerId>,
    /// Suspends the icon-round restriction
    pub is_rebid: bool,
    /// Pauses picking
    pub is_parked: bool,
}

impl AuctionControl {
    pub fn has_current_player(&self) -> bool {
        self.current_player_id.is_some()
    }
}
