//! Transaction bodies for every engine write.
//!
//! Each function runs inside one `AuctionTx` and starts by loading the control
//! record, which serializes it against every other write. Returning an error
//! abandons the transaction, so no partial change is ever committed.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use super::audit;
use super::TxError;
use crate::config::AuctionConfig;
use crate::domain::{
    ActionType, AuctionControl, AuctionStage, NewLogEntry, NewPlayer, NewTeam, Player, PlayerId,
    PlayerStatus, Team, TeamId,
};
use crate::error::ValidationError;
use crate::rules::{self, IconRound};
use crate::store::AuctionTx;

/// Whether `player` may be drawn while the auction is in `stage`.
///
/// With `by_stage_role` set (`auction.pick_by_stage_role`, the default) the icon
/// stages BAT, BOWL and AR draw only players of their own role, and OPEN draws
/// anyone still unsold. With it cleared every available player is eligible in
/// any selling stage, which is the older unfiltered draw. NOT_STARTED and
/// COMPLETED never draw.
pub fn eligible_for_stage(player: &Player, stage: AuctionStage, by_stage_role: bool) -> bool {
    if !player.is_available() || !stage.is_selling() {
        return false;
    }
    if !by_stage_role {
        return true;
    }
    match stage.icon_role() {
        Some(role) => player.role == role,
        None => true,
    }
}

pub async fn load_control(tx: &mut dyn AuctionTx) -> Result<AuctionControl, TxError> {
    Ok(tx.control().await?)
}

pub async fn start(tx: &mut dyn AuctionTx) -> Result<AuctionControl, TxError> {
    let mut control = tx.control().await?;
    rules::ensure_not_started(&control)?;

    control.is_started = true;
    control.current_stage = AuctionStage::Bat;
    tx.save_control(&control).await?;
    Ok(control)
}

pub async fn pick(tx: &mut dyn AuctionTx, config: AuctionConfig) -> Result<Player, TxError> {
    let mut control = tx.control().await?;
    rules::ensure_started(&control)?;
    rules::ensure_not_parked(&control)?;
    rules::ensure_block_empty(&control)?;

    let stage = control.current_stage;
    let eligible: Vec<Player> = tx
        .players()
        .await?
        .into_iter()
        .filter(|p| eligible_for_stage(p, stage, config.pick_by_stage_role))
        .collect();

    let chosen = {
        let mut rng = rand::thread_rng();
        eligible.choose(&mut rng).cloned()
    };
    let chosen = chosen.ok_or(ValidationError::NoPlayersRemaining)?;

    control.current_player_id = Some(chosen.id);
    tx.save_control(&control).await?;
    Ok(chosen)
}

/// Outcome of a committed sale
#[derive(Debug, Clone)]
pub struct Sale {
    pub player: Player,
    pub team: Team,
    pub stage: AuctionStage,
    pub advanced_to: Option<AuctionStage>,
}

pub async fn sell(
    tx: &mut dyn AuctionTx,
    config: AuctionConfig,
    team_id: TeamId,
    price: i64,
    admin_user: Option<String>,
) -> Result<Sale, TxError> {
    let mut control = tx.control().await?;
    let player_id = rules::require_current_player(&control)?;

    let mut team = tx.team(team_id).await?.ok_or(ValidationError::InvalidTeam)?;
    rules::validate_price(price)?;
    if let Err(err) = rules::validate_budget(&team, price) {
        warn!(
            team = %team.name,
            remaining = team.remaining_points,
            price,
            "Sale exceeds team budget"
        );
        return Err(err.into());
    }
    if let Err(err) = rules::validate_slots(&team) {
        warn!(team = %team.name, "Team has no auction slots left");
        return Err(err.into());
    }

    let stage = control.current_stage;
    if stage.is_icon() && !control.is_rebid {
        check_icon_round(tx, &control, team.id).await?;
    }

    let mut player = current_player(tx, player_id).await?;
    if !player.is_available() {
        return Err(TxError::Invariant(format!(
            "player {} on the block has status {}",
            player.id, player.status
        )));
    }

    team.debit(price);
    tx.save_team(&team).await?;
    player.mark_sold(team.id, price);
    debug_assert!(player.is_consistent());
    tx.save_player(&player).await?;

    audit::record(
        tx,
        NewLogEntry::new(ActionType::Sold)
            .player(player.id)
            .team(team.id)
            .price(price)
            .stage(stage)
            .admin(admin_user.as_deref()),
    )
    .await?;

    control.current_player_id = None;
    let advanced_to = if config.auto_advance_stage {
        auto_advance(tx, &mut control, config, admin_user.as_deref()).await?
    } else {
        None
    };
    tx.save_control(&control).await?;

    Ok(Sale {
        player,
        team,
        stage,
        advanced_to,
    })
}

async fn check_icon_round(
    tx: &mut dyn AuctionTx,
    control: &AuctionControl,
    buyer: TeamId,
) -> Result<(), TxError> {
    let stage = control.current_stage;
    let Some(role) = stage.icon_role() else {
        return Ok(());
    };

    let team_ids: Vec<TeamId> = tx.teams().await?.iter().map(|t| t.id).collect();
    let purchases = audit::stage_purchases(tx, stage).await?;
    let icon_pool = tx
        .players()
        .await?
        .iter()
        .filter(|p| p.role == role && p.status != PlayerStatus::NotPlaying)
        .count();

    let round = IconRound {
        stage,
        is_rebid: control.is_rebid,
        team_ids: &team_ids,
        purchases: &purchases,
        icon_pool,
    };
    if let Err(err) = rules::check_icon_round(buyer, &round) {
        warn!(
            team_id = buyer,
            stage = %stage,
            bought = purchases.get(&buyer).copied().unwrap_or(0),
            "Repeat icon purchase before every team has bought"
        );
        return Err(err.into());
    }
    Ok(())
}

async fn current_player(tx: &mut dyn AuctionTx, id: PlayerId) -> Result<Player, TxError> {
    tx.player(id)
        .await?
        .ok_or_else(|| TxError::Invariant(format!("player {} on the block does not exist", id)))
}

/// How a player leaves the block without being sold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Unsold,
    NotPlaying,
}

impl Release {
    fn action(&self) -> ActionType {
        match self {
            Release::Unsold => ActionType::Unsold,
            Release::NotPlaying => ActionType::NotPlaying,
        }
    }
}

/// Result of clearing the block without a sale
#[derive(Debug, Clone)]
pub struct Released {
    pub player: Player,
    pub advanced_to: Option<AuctionStage>,
}

pub async fn release(
    tx: &mut dyn AuctionTx,
    config: AuctionConfig,
    kind: Release,
    admin_user: Option<String>,
) -> Result<Released, TxError> {
    let mut control = tx.control().await?;
    let player_id = rules::require_current_player(&control)?;
    let mut player = current_player(tx, player_id).await?;

    match kind {
        Release::Unsold => player.restore_unsold(),
        Release::NotPlaying => player.mark_not_playing(),
    }
    tx.save_player(&player).await?;

    audit::record(
        tx,
        NewLogEntry::new(kind.action())
            .player(player.id)
            .stage(control.current_stage)
            .admin(admin_user.as_deref()),
    )
    .await?;

    control.current_player_id = None;
    // An unsold player stays in the pool, so only NOT_PLAYING can empty a stage
    let advanced_to = if config.auto_advance_stage && kind == Release::NotPlaying {
        auto_advance(tx, &mut control, config, admin_user.as_deref()).await?
    } else {
        None
    };
    tx.save_control(&control).await?;

    Ok(Released {
        player,
        advanced_to,
    })
}

/// Result of an admin assignment outside the block
#[derive(Debug, Clone)]
pub struct Assignment {
    pub player: Player,
    pub team: Team,
    pub price: i64,
    pub cleared_block: bool,
}

/// Hand a player straight to a team, bypassing the block and the icon round.
///
/// Budget and slot rules still apply. The entry is logged as MANUAL_EDIT, so it
/// is not counted as an icon purchase and cannot be undone.
pub async fn assign(
    tx: &mut dyn AuctionTx,
    player_id: PlayerId,
    team_id: TeamId,
    price: i64,
    admin_user: Option<String>,
) -> Result<Assignment, TxError> {
    let mut control = tx.control().await?;

    let mut player = tx
        .player(player_id)
        .await?
        .ok_or(ValidationError::PlayerNotFound(player_id))?;
    if player.status == PlayerStatus::Sold {
        return Err(ValidationError::PlayerIsSold.into());
    }
    let mut team = tx
        .team(team_id)
        .await?
        .ok_or(ValidationError::TeamNotFound(team_id))?;
    rules::validate_price(price)?;
    rules::validate_budget(&team, price)?;
    rules::validate_slots(&team)?;

    team.debit(price);
    tx.save_team(&team).await?;
    player.mark_sold(team.id, price);
    debug_assert!(player.is_consistent());
    tx.save_player(&player).await?;

    let cleared_block = control.current_player_id == Some(player.id);
    if cleared_block {
        control.current_player_id = None;
        tx.save_control(&control).await?;
    }

    audit::record(
        tx,
        NewLogEntry::new(ActionType::ManualEdit)
            .player(player.id)
            .team(team.id)
            .price(price)
            .stage(control.current_stage)
            .admin(admin_user.as_deref())
            .notes("manual assignment"),
    )
    .await?;

    Ok(Assignment {
        player,
        team,
        price,
        cleared_block,
    })
}

/// Result of a committed undo
#[derive(Debug, Clone)]
pub struct Reversal {
    pub player: Player,
    pub team: Team,
    pub price: i64,
}

pub async fn undo(tx: &mut dyn AuctionTx, admin_user: Option<String>) -> Result<Reversal, TxError> {
    tx.control().await?;
    let sale = audit::reversible_sale(tx).await?;

    let (Some(player_id), Some(team_id), Some(price)) =
        (sale.player_id, sale.team_id, sale.sold_price)
    else {
        return Err(TxError::Invariant(format!(
            "sale entry {} lost its player, team or price",
            sale.id
        )));
    };

    let mut team = tx
        .team(team_id)
        .await?
        .ok_or_else(|| TxError::Invariant(format!("buying team {} does not exist", team_id)))?;
    let mut player = tx
        .player(player_id)
        .await?
        .ok_or_else(|| TxError::Invariant(format!("sold player {} does not exist", player_id)))?;

    team.refund(price);
    tx.save_team(&team).await?;
    player.restore_unsold();
    debug_assert!(player.is_consistent());
    tx.save_player(&player).await?;

    audit::consume(tx, &sale, admin_user.as_deref()).await?;

    Ok(Reversal {
        player,
        team,
        price,
    })
}

/// Where a manual stage change is headed
#[derive(Debug, Clone, Copy)]
pub enum StageTarget {
    Next,
    To(AuctionStage),
}

pub async fn change_stage(
    tx: &mut dyn AuctionTx,
    target: StageTarget,
    admin_user: Option<String>,
) -> Result<(AuctionStage, AuctionStage), TxError> {
    let mut control = tx.control().await?;
    rules::ensure_started(&control)?;
    rules::ensure_block_empty(&control)?;

    let from = control.current_stage;
    let to = match target {
        StageTarget::Next => from.next().ok_or(ValidationError::AuctionCompleted)?,
        StageTarget::To(stage) => stage,
    };
    rules::validate_stage_transition(from, to)?;

    control.current_stage = to;
    tx.save_control(&control).await?;
    audit::record(
        tx,
        NewLogEntry::new(ActionType::StageChange)
            .stage(to)
            .admin(admin_user.as_deref())
            .notes(format!("{} -> {}", from, to)),
    )
    .await?;

    Ok((from, to))
}

/// Step to the next stage when the current one has nothing left to draw
async fn auto_advance(
    tx: &mut dyn AuctionTx,
    control: &mut AuctionControl,
    config: AuctionConfig,
    admin_user: Option<&str>,
) -> Result<Option<AuctionStage>, TxError> {
    let from = control.current_stage;
    if !from.is_selling() {
        return Ok(None);
    }

    let remaining = tx
        .players()
        .await?
        .iter()
        .any(|p| eligible_for_stage(p, from, config.pick_by_stage_role));
    if remaining {
        return Ok(None);
    }

    let Some(to) = from.next() else {
        return Ok(None);
    };
    control.current_stage = to;
    audit::record(
        tx,
        NewLogEntry::new(ActionType::StageChange)
            .stage(to)
            .admin(admin_user)
            .notes("auto"),
    )
    .await?;

    Ok(Some(to))
}

/// Which control flag a toggle writes
#[derive(Debug, Clone, Copy)]
pub enum Flag {
    Rebid,
    Parked,
}

pub async fn set_flag(
    tx: &mut dyn AuctionTx,
    flag: Flag,
    value: bool,
) -> Result<AuctionControl, TxError> {
    let mut control = tx.control().await?;
    match flag {
        Flag::Rebid => control.is_rebid = value,
        Flag::Parked => control.is_parked = value,
    }
    tx.save_control(&control).await?;
    Ok(control)
}

/// Counts returned by a reset
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetSummary {
    pub players_restored: usize,
    pub teams_restored: usize,
}

pub async fn reset(
    tx: &mut dyn AuctionTx,
    admin_user: Option<String>,
) -> Result<ResetSummary, TxError> {
    tx.control().await?;

    let mut bought: HashMap<TeamId, i32> = HashMap::new();
    let mut players_restored = 0;
    for mut player in tx.players().await? {
        if player.status != PlayerStatus::Sold {
            continue;
        }
        if let Some(team_id) = player.team_id {
            *bought.entry(team_id).or_insert(0) += 1;
        }
        player.restore_unsold();
        debug_assert!(player.is_consistent());
        tx.save_player(&player).await?;
        players_restored += 1;
    }

    let teams = tx.teams().await?;
    let teams_restored = teams.len();
    for mut team in teams {
        team.remaining_points = team.total_points;
        team.auction_slots += bought.get(&team.id).copied().unwrap_or(0);
        tx.save_team(&team).await?;
    }

    // Sales from before the reset no longer count toward any icon round
    let sales_voided = tx.void_active_sales().await?;
    debug!(sales_voided, "Voided pre-reset sales");

    tx.save_control(&AuctionControl::default()).await?;
    audit::record(
        tx,
        NewLogEntry::new(ActionType::ManualEdit)
            .admin(admin_user.as_deref())
            .notes("auction reset"),
    )
    .await?;

    Ok(ResetSummary {
        players_restored,
        teams_restored,
    })
}

pub async fn add_team(tx: &mut dyn AuctionTx, team: NewTeam) -> Result<Team, TxError> {
    tx.control().await?;
    rules::validate_new_team(&team)?;

    if tx.team_by_name(&team.name).await?.is_some() {
        return Err(ValidationError::DuplicateTeamName(team.name).into());
    }
    Ok(tx.insert_team(&team).await?)
}

pub async fn add_player(tx: &mut dyn AuctionTx, player: NewPlayer) -> Result<Player, TxError> {
    tx.control().await?;
    rules::validate_new_player(&player)?;

    if tx.player_by_serial(player.serial_number).await?.is_some() {
        return Err(ValidationError::DuplicateSerialNumber(player.serial_number).into());
    }
    Ok(tx.insert_player(&player).await?)
}

pub async fn remove_team(tx: &mut dyn AuctionTx, team_id: TeamId) -> Result<Team, TxError> {
    tx.control().await?;
    let team = tx
        .team(team_id)
        .await?
        .ok_or(ValidationError::TeamNotFound(team_id))?;

    let owns_players = tx
        .players()
        .await?
        .iter()
        .any(|p| p.team_id == Some(team_id) && p.status == PlayerStatus::Sold);
    if owns_players {
        return Err(ValidationError::TeamHasPlayers.into());
    }

    tx.delete_team(team_id).await?;
    Ok(team)
}

pub async fn remove_player(tx: &mut dyn AuctionTx, player_id: PlayerId) -> Result<Player, TxError> {
    tx.control().await?;
    let player = tx
        .player(player_id)
        .await?
        .ok_or(ValidationError::PlayerNotFound(player_id))?;

    if player.status == PlayerStatus::Sold {
        return Err(ValidationError::PlayerIsSold.into());
    }

    tx.delete_player(player_id).await?;
    Ok(player)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PlayerRole;

    fn player(role: PlayerRole, status: PlayerStatus) -> Player {
        let mut player = NewPlayer::new(1, "P", role).into_player(1);
        player.status = status;
        player
    }

    #[test]
    fn test_icon_stage_draws_matching_role() {
        let bat = player(PlayerRole::Bat, PlayerStatus::Unsold);
        let ply = player(PlayerRole::Ply, PlayerStatus::Unsold);

        assert!(eligible_for_stage(&bat, AuctionStage::Bat, true));
        assert!(!eligible_for_stage(&ply, AuctionStage::Bat, true));
        assert!(!eligible_for_stage(&bat, AuctionStage::Bowl, true));
        assert!(eligible_for_stage(&ply, AuctionStage::Open, true));
        assert!(eligible_for_stage(&bat, AuctionStage::Open, true));

        // role filter off
        assert!(eligible_for_stage(&ply, AuctionStage::Bat, false));
    }

    #[test]
    fn test_unavailable_or_closed_stage_never_eligible() {
        for status in [PlayerStatus::Sold, PlayerStatus::NotPlaying, PlayerStatus::Free] {
            let p = player(PlayerRole::Bat, status);
            assert!(!eligible_for_stage(&p, AuctionStage::Bat, false));
        }

        let p = player(PlayerRole::Bat, PlayerStatus::Unsold);
        assert!(!eligible_for_stage(&p, AuctionStage::NotStarted, false));
        assert!(!eligible_for_stage(&p, AuctionStage::Completed, false));
    }
}
