//! Auction rule checks
//!
//! Pure predicates over already-loaded records. Each returns the
//! [`ValidationError`] the caller should surface; none of them touch the store.

use std::collections::HashMap;

use crate::domain::{
    AuctionControl, AuctionStage, NewPlayer, NewTeam, PlayerId, Team, TeamId,
};
use crate::error::ValidationError;

type Check = std::result::Result<(), ValidationError>;

/// The auction must not have been started yet
pub fn ensure_not_started(control: &AuctionControl) -> Check {
    if control.is_started {
        return Err(ValidationError::AlreadyStarted);
    }
    Ok(())
}

pub fn ensure_started(control: &AuctionControl) -> Check {
    if !control.is_started {
        return Err(ValidationError::NotStarted);
    }
    Ok(())
}

pub fn ensure_not_parked(control: &AuctionControl) -> Check {
    if control.is_parked {
        return Err(ValidationError::Parked);
    }
    Ok(())
}

/// Nothing may be on the block
pub fn ensure_block_empty(control: &AuctionControl) -> Check {
    if control.has_current_player() {
        return Err(ValidationError::PlayerAlreadySelected);
    }
    Ok(())
}

/// Returns the player on the block
pub fn require_current_player(control: &AuctionControl) -> std::result::Result<PlayerId, ValidationError> {
    control
        .current_player_id
        .ok_or(ValidationError::NoPlayerSelected)
}

/// Selling price must be strictly positive
pub fn validate_price(price: i64) -> Check {
    if price <= 0 {
        return Err(ValidationError::InvalidPrice);
    }
    Ok(())
}

pub fn validate_budget(team: &Team, price: i64) -> Check {
    if !team.can_afford(price) {
        return Err(ValidationError::NotEnoughPoints);
    }
    Ok(())
}

pub fn validate_slots(team: &Team) -> Check {
    if !team.has_slot() {
        return Err(ValidationError::NoSlotsRemaining);
    }
    Ok(())
}

/// Inputs for the icon-round fairness rule
#[derive(Debug, Clone)]
pub struct IconRound<'a> {
    pub stage: AuctionStage,
    pub is_rebid: bool,
    /// Every registered team
    pub team_ids: &'a [TeamId],
    /// Active sales in this stage per buying team
    pub purchases: &'a HashMap<TeamId, usize>,
    /// Players of the stage's role that are still in contention (not NOT_PLAYING)
    pub icon_pool: usize,
}

/// Round-robin fairness for icon stages.
///
/// A team may not buy its next icon while another team has fewer icons from
/// this stage. Rebid mode suspends the rule, and so does a pool too small for
/// every team to get one.
pub fn check_icon_round(buyer: TeamId, round: &IconRound<'_>) -> Check {
    if round.is_rebid || !round.stage.is_icon() {
        return Ok(());
    }
    if round.icon_pool < round.team_ids.len() {
        return Ok(());
    }

    let count_of = |team: &TeamId| round.purchases.get(team).copied().unwrap_or(0);
    let fewest = round.team_ids.iter().map(count_of).min().unwrap_or(0);

    if count_of(&buyer) > fewest {
        return Err(ValidationError::IconRoundRestricted);
    }
    Ok(())
}

/// Stage moves are single forward steps
pub fn validate_stage_transition(from: AuctionStage, to: AuctionStage) -> Check {
    if !from.can_transition_to(to) {
        return Err(ValidationError::InvalidStageTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

pub fn parse_stage(raw: &str) -> std::result::Result<AuctionStage, ValidationError> {
    AuctionStage::try_from(raw).map_err(|_| ValidationError::UnknownStage(raw.trim().to_string()))
}

pub fn validate_new_team(team: &NewTeam) -> Check {
    if team.name.trim().is_empty() {
        return Err(ValidationError::InvalidTeamConfig(
            "name cannot be empty".to_string(),
        ));
    }
    if team.total_points <= 0 {
        return Err(ValidationError::InvalidTeamConfig(format!(
            "total_points must be positive: {}",
            team.total_points
        )));
    }
    if team.max_players <= 0 {
        return Err(ValidationError::InvalidTeamConfig(format!(
            "max_players must be positive: {}",
            team.max_players
        )));
    }
    if team.auction_slots < 0 || team.auction_slots > team.max_players {
        return Err(ValidationError::InvalidTeamConfig(format!(
            "auction_slots must be between 0 and {}: {}",
            team.max_players, team.auction_slots
        )));
    }
    Ok(())
}

pub fn validate_new_player(player: &NewPlayer) -> Check {
    if player.name.trim().is_empty() {
        return Err(ValidationError::InvalidPlayerConfig(
            "name cannot be empty".to_string(),
        ));
    }
    if let Some(base) = player.base_price {
        if base < 0 {
            return Err(ValidationError::InvalidPlayerConfig(format!(
                "base_price cannot be negative: {}",
                base
            )));
        }
    }
    Ok(())
}
