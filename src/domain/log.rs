use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{AuctionStage, PlayerId, TeamId};

pub type LogId = i64;

/// Kind of audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Sold,
    Unsold,
    NotPlaying,
    StageChange,
    Undo,
    ManualEdit,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Sold => "SOLD",
            ActionType::Unsold => "UNSOLD",
            ActionType::NotPlaying => "NOT_PLAYING",
            ActionType::StageChange => "STAGE_CHANGE",
            ActionType::Undo => "UNDO",
            ActionType::ManualEdit => "MANUAL_EDIT",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ActionType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_uppercase().as_str() {
            "SOLD" => Ok(ActionType::Sold),
            "UNSOLD" => Ok(ActionType::Unsold),
            "NOT_PLAYING" => Ok(ActionType::NotPlaying),
            "STAGE_CHANGE" => Ok(ActionType::StageChange),
            "UNDO" => Ok(ActionType::Undo),
            "MANUAL_EDIT" => Ok(ActionType::ManualEdit),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// An immutable audit entry.
///
/// References are weak: a removed team or player leaves `None` behind.
/// `undone_at` is the only field written after insert, set once when an
/// undo consumes a SOLD entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionLog {
    pub id: LogId,
    pub timestamp: DateTime<Utc>,
    pub action_type: ActionType,
    pub player_id: Option<PlayerId>,
    pub team_id: Option<TeamId>,
    pub sold_price: Option<i64>,
    pub stage: Option<AuctionStage>,
    pub admin_user: Option<String>,
    pub notes: Option<String>,
    pub undone_at: Option<DateTime<Utc>>,
}

impl AuctionLog {
    /// A SOLD entry that has not been reversed
    pub fn is_active_sale(&self) -> bool {
        self.action_type == ActionType::Sold && self.undone_at.is_none()
    }
}

/// Entry to append; id and timestamp are assigned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub action_type: ActionType,
    pub player_id: Option<PlayerId>,
    pub team_id: Option<TeamId>,
    pub sold_price: Option<i64>,
    pub stage: Option<AuctionStage>,
    pub admin_user: Option<String>,
    pub notes: Option<String>,
}

impl NewLogEntry {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            player_id: None,
            team_id: None,
            sold_price: None,
            stage: None,
            admin_user: None,
            notes: None,
        }
    }

    pub fn player(mut self, player_id: PlayerId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    pub fn team(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn price(mut self, price: i64) -> Self {
        self.sold_price = Some(price);
        self
    }

    pub fn stage(mut self, stage: AuctionStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn admin(mut self, admin_user: Option<&str>) -> Self {
        self.admin_user = admin_user.map(str::to_string);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn into_log(self, id: LogId, timestamp: DateTime<Utc>) -> AuctionLog {
        AuctionLog {
            id,
            timestamp,
            action_type: self.action_type,
            player_id: self.player_id,
            team_id: self.team_id,
            sold_price: self.sold_price,
            stage: self.stage,
            admin_user: self.admin_user,
            notes: self.notes,
            undone_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_names() {
        assert_eq!(ActionType::StageChange.to_string(), "STAGE_CHANGE");
        assert_eq!(
            ActionType::try_from("manual_edit").unwrap(),
            ActionType::ManualEdit
        );
        assert!(ActionType::try_from("REFUND").is_err());
    }

    #[test]
    fn test_entry_builder() {
        let log = NewLogEntry::new(ActionType::Sold)
            .player(4)
            .team(2)
            .price(1500)
            .stage(AuctionStage::Bowl)
            .admin(Some("admin"))
            .into_log(9, Utc::now());

        assert_eq!(log.id, 9);
        assert_eq!(log.player_id, Some(4));
        assert_eq!(log.team_id, Some(2));
        assert_eq!(log.sold_price, Some(1500));
        assert_eq!(log.stage, Some(AuctionStage::Bowl));
        assert_eq!(log.admin_user.as_deref(), Some("admin"));
        assert!(log.is_active_sale());
    }
}
