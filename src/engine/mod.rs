//! Auction engine
//!
//! Every write runs as one store transaction. Business-rule rejections come
//! back as [`AuctionError::Validation`] with the store untouched; store
//! failures are logged with full detail here and surface as a generic
//! [`AuctionError::Engine`]. Transient contention is retried with linear
//! backoff.

mod audit;
mod ops;

pub use ops::{eligible_for_stage, ResetSummary};

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::AuctionConfig;
use crate::domain::{
    AuctionControl, AuctionLog, AuctionStage, NewPlayer, NewTeam, Player, PlayerId, Team, TeamId,
};
use crate::error::{AuctionError, Result, StoreError, ValidationError};
use crate::store::{AuctionStore, AuctionTx, TransactionScope};

use ops::{Flag, Release, StageTarget};

/// Failure inside a transaction body, before it is classified for the caller
#[derive(Debug)]
pub(crate) enum TxError {
    Validation(ValidationError),
    Store(StoreError),
    /// Stored state contradicts an invariant
    Invariant(String),
}

impl From<ValidationError> for TxError {
    fn from(err: ValidationError) -> Self {
        TxError::Validation(err)
    }
}

impl From<StoreError> for TxError {
    fn from(err: StoreError) -> Self {
        TxError::Store(err)
    }
}

type TxFuture<'t, T> = BoxFuture<'t, std::result::Result<T, TxError>>;

/// Snapshot for dashboards and polling clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuctionStatus {
    pub is_started: bool,
    pub current_stage: AuctionStage,
    pub is_rebid: bool,
    pub is_parked: bool,
    pub current_player: Option<Player>,
}

/// Rules engine for one auction
#[derive(Clone)]
pub struct AuctionEngine {
    store: Arc<dyn AuctionStore>,
    config: AuctionConfig,
}

impl AuctionEngine {
    pub fn new(store: Arc<dyn AuctionStore>, config: AuctionConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AuctionConfig {
        &self.config
    }

    // ==================== Lifecycle ====================

    /// Current control record, created with defaults on first use
    pub async fn get_control(&self) -> Result<AuctionControl> {
        self.write(TransactionScope::Control, "Failed to load auction control", |tx| {
            Box::pin(ops::load_control(tx))
        })
        .await
    }

    pub async fn start_auction(&self) -> Result<AuctionControl> {
        let control = self
            .write(TransactionScope::Start, "Failed to start auction", |tx| {
                Box::pin(ops::start(tx))
            })
            .await?;
        info!(stage = %control.current_stage, "Auction started");
        Ok(control)
    }

    /// Move to `stage`, which must be the stage right after the current one
    pub async fn change_stage(
        &self,
        stage: AuctionStage,
        admin_user: Option<&str>,
    ) -> Result<AuctionStage> {
        self.stage_change(StageTarget::To(stage), admin_user).await
    }

    /// Like [`change_stage`](Self::change_stage) but takes the stage name as typed
    pub async fn change_stage_named(&self, stage: &str, admin_user: Option<&str>) -> Result<AuctionStage> {
        let stage = crate::rules::parse_stage(stage).map_err(|err| {
            warn!(input = stage, "Rejected stage name");
            AuctionError::from(err)
        })?;
        self.change_stage(stage, admin_user).await
    }

    pub async fn advance_stage(&self, admin_user: Option<&str>) -> Result<AuctionStage> {
        self.stage_change(StageTarget::Next, admin_user).await
    }

    async fn stage_change(&self, target: StageTarget, admin_user: Option<&str>) -> Result<AuctionStage> {
        let admin = admin_user.map(str::to_string);
        let (from, to) = self
            .write(TransactionScope::StageChange, "Failed to change stage", move |tx| {
                Box::pin(ops::change_stage(tx, target, admin.clone()))
            })
            .await?;
        info!(from = %from, to = %to, admin = ?admin_user, "Stage changed");
        Ok(to)
    }

    pub async fn enable_rebid(&self) -> Result<AuctionControl> {
        self.toggle(Flag::Rebid, true, TransactionScope::Rebid, "Failed to enable rebid")
            .await
    }

    pub async fn disable_rebid(&self) -> Result<AuctionControl> {
        self.toggle(Flag::Rebid, false, TransactionScope::Rebid, "Failed to disable rebid")
            .await
    }

    /// Pause picking; the player on the block can still be resolved
    pub async fn park_auction(&self) -> Result<AuctionControl> {
        self.toggle(Flag::Parked, true, TransactionScope::Park, "Failed to park auction")
            .await
    }

    pub async fn unpark_auction(&self) -> Result<AuctionControl> {
        self.toggle(Flag::Parked, false, TransactionScope::Park, "Failed to unpark auction")
            .await
    }

    async fn toggle(
        &self,
        flag: Flag,
        value: bool,
        scope: TransactionScope,
        failure: &'static str,
    ) -> Result<AuctionControl> {
        let control = self
            .write(scope, failure, move |tx| Box::pin(ops::set_flag(tx, flag, value)))
            .await?;
        info!(flag = ?flag, value, "Auction flag updated");
        Ok(control)
    }

    /// Return every sold player to the pool and every budget to full. History is kept.
    pub async fn reset_auction(&self, admin_user: Option<&str>) -> Result<ResetSummary> {
        let admin = admin_user.map(str::to_string);
        let summary = self
            .write(TransactionScope::Reset, "Failed to reset auction", move |tx| {
                Box::pin(ops::reset(tx, admin.clone()))
            })
            .await?;
        info!(
            players = summary.players_restored,
            teams = summary.teams_restored,
            admin = ?admin_user,
            "Auction reset"
        );
        Ok(summary)
    }

    // ==================== Player on the block ====================

    /// Put a random eligible player on the block
    pub async fn pick_random_player(&self) -> Result<Player> {
        let config = self.config;
        let player = self
            .write(TransactionScope::Pick, "Failed to pick player", move |tx| {
                Box::pin(ops::pick(tx, config))
            })
            .await?;
        info!(
            player_id = player.id,
            player = %player.name,
            role = %player.role,
            "Player on the block"
        );
        Ok(player)
    }

    pub async fn sell_current_player(
        &self,
        team_id: TeamId,
        price: i64,
        admin_user: Option<&str>,
    ) -> Result<Player> {
        let config = self.config;
        let admin = admin_user.map(str::to_string);
        let sale = self
            .write(TransactionScope::Sell, "Failed to sell player", move |tx| {
                Box::pin(ops::sell(tx, config, team_id, price, admin.clone()))
            })
            .await?;

        info!(
            player = %sale.player.name,
            team = %sale.team.name,
            price,
            stage = %sale.stage,
            remaining = sale.team.remaining_points,
            admin = ?admin_user,
            "Player sold"
        );
        if let Some(stage) = sale.advanced_to {
            info!(stage = %stage, "Stage advanced automatically");
        }
        Ok(sale.player)
    }

    pub async fn mark_unsold(&self, admin_user: Option<&str>) -> Result<Player> {
        self.release(Release::Unsold, admin_user).await
    }

    pub async fn mark_not_playing(&self, admin_user: Option<&str>) -> Result<Player> {
        self.release(Release::NotPlaying, admin_user).await
    }

    async fn release(&self, kind: Release, admin_user: Option<&str>) -> Result<Player> {
        let (scope, failure) = match kind {
            Release::Unsold => (TransactionScope::MarkUnsold, "Failed to mark player unsold"),
            Release::NotPlaying => (
                TransactionScope::MarkNotPlaying,
                "Failed to mark player not playing",
            ),
        };
        let config = self.config;
        let admin = admin_user.map(str::to_string);
        let released = self
            .write(scope, failure, move |tx| {
                Box::pin(ops::release(tx, config, kind, admin.clone()))
            })
            .await?;

        info!(
            player = %released.player.name,
            status = %released.player.status,
            admin = ?admin_user,
            "Player cleared from the block"
        );
        if let Some(stage) = released.advanced_to {
            info!(stage = %stage, "Stage advanced automatically");
        }
        Ok(released.player)
    }

    /// Assign a player to a team directly, as an admin correction
    pub async fn assign_player(
        &self,
        player_id: PlayerId,
        team_id: TeamId,
        price: i64,
        admin_user: Option<&str>,
    ) -> Result<Player> {
        let admin = admin_user.map(str::to_string);
        let assignment = self
            .write(TransactionScope::ManualEdit, "Failed to assign player", move |tx| {
                Box::pin(ops::assign(tx, player_id, team_id, price, admin.clone()))
            })
            .await?;

        info!(
            player = %assignment.player.name,
            team = %assignment.team.name,
            price = assignment.price,
            cleared_block = assignment.cleared_block,
            admin = ?admin_user,
            "Player assigned manually"
        );
        Ok(assignment.player)
    }

    /// Reverse the most recent action if it is a sale
    pub async fn undo_last_action(&self, admin_user: Option<&str>) -> Result<Player> {
        let admin = admin_user.map(str::to_string);
        let reversal = self
            .write(TransactionScope::Undo, "Failed to undo action", move |tx| {
                Box::pin(ops::undo(tx, admin.clone()))
            })
            .await?;
        info!(
            player = %reversal.player.name,
            team = %reversal.team.name,
            refunded = reversal.price,
            admin = ?admin_user,
            "Sale undone"
        );
        Ok(reversal.player)
    }

    // ==================== Registry ====================

    pub async fn register_team(&self, team: NewTeam) -> Result<Team> {
        let team = self
            .write(TransactionScope::Registry, "Failed to register team", move |tx| {
                Box::pin(ops::add_team(tx, team.clone()))
            })
            .await?;
        info!(team_id = team.id, team = %team.name, points = team.total_points, "Team registered");
        Ok(team)
    }

    pub async fn register_player(&self, player: NewPlayer) -> Result<Player> {
        let player = self
            .write(TransactionScope::Registry, "Failed to register player", move |tx| {
                Box::pin(ops::add_player(tx, player.clone()))
            })
            .await?;
        info!(
            player_id = player.id,
            serial = player.serial_number,
            player = %player.name,
            role = %player.role,
            "Player registered"
        );
        Ok(player)
    }

    pub async fn remove_team(&self, team_id: TeamId) -> Result<Team> {
        let team = self
            .write(TransactionScope::Registry, "Failed to remove team", move |tx| {
                Box::pin(ops::remove_team(tx, team_id))
            })
            .await?;
        info!(team_id, team = %team.name, "Team removed");
        Ok(team)
    }

    pub async fn remove_player(&self, player_id: PlayerId) -> Result<Player> {
        let player = self
            .write(TransactionScope::Registry, "Failed to remove player", move |tx| {
                Box::pin(ops::remove_player(tx, player_id))
            })
            .await?;
        info!(player_id, player = %player.name, "Player removed");
        Ok(player)
    }

    // ==================== Reads ====================

    /// Control snapshot plus the player on the block. Never creates the control record.
    pub async fn status(&self) -> Result<AuctionStatus> {
        let control = self
            .store
            .load_control()
            .await
            .map_err(|e| read_failure("status", e))?
            .unwrap_or_default();

        let current_player = match control.current_player_id {
            Some(id) => self
                .store
                .find_player(id)
                .await
                .map_err(|e| read_failure("status", e))?,
            None => None,
        };

        Ok(AuctionStatus {
            is_started: control.is_started,
            current_stage: control.current_stage,
            is_rebid: control.is_rebid,
            is_parked: control.is_parked,
            current_player,
        })
    }

    pub async fn teams(&self) -> Result<Vec<Team>> {
        self.store
            .list_teams()
            .await
            .map_err(|e| read_failure("teams", e))
    }

    pub async fn players(&self) -> Result<Vec<Player>> {
        self.store
            .list_players()
            .await
            .map_err(|e| read_failure("players", e))
    }

    /// Latest `limit` log entries, newest first
    pub async fn history(&self, limit: usize) -> Result<Vec<AuctionLog>> {
        self.store
            .recent_logs(limit)
            .await
            .map_err(|e| read_failure("history", e))
    }

    // ==================== Transactions ====================

    /// Run `op` in a fresh transaction, retrying on transient contention
    async fn write<T, F>(&self, scope: TransactionScope, failure: &'static str, mut op: F) -> Result<T>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut dyn AuctionTx) -> TxFuture<'t, T> + Send,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt(scope, &mut op).await {
                Ok(value) => return Ok(value),
                Err(TxError::Validation(err)) => {
                    warn!(scope = %scope, "Rejected: {}", err);
                    return Err(err.into());
                }
                Err(TxError::Store(err)) if err.is_transient() && attempt <= self.config.max_retries => {
                    let backoff = Duration::from_millis(self.config.retry_backoff_ms * u64::from(attempt));
                    warn!(
                        scope = %scope,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Transient store contention, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(TxError::Store(err)) => {
                    error!(scope = %scope, attempt, error = %err, "{}", failure);
                    return Err(AuctionError::engine(scope.as_str(), failure));
                }
                Err(TxError::Invariant(detail)) => {
                    error!(scope = %scope, detail = %detail, "{}", failure);
                    return Err(AuctionError::engine(scope.as_str(), failure));
                }
            }
        }
    }

    async fn attempt<T, F>(&self, scope: TransactionScope, op: &mut F) -> std::result::Result<T, TxError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut dyn AuctionTx) -> TxFuture<'t, T> + Send,
    {
        let mut tx = self.store.begin(scope).await?;
        let value = op(tx.as_mut()).await?;
        tx.commit().await?;
        debug!(scope = %scope, "Transaction committed");
        Ok(value)
    }
}

fn read_failure(operation: &'static str, err: StoreError) -> AuctionError {
    error!(operation, error = %err, "Failed to read auction state");
    AuctionError::engine(operation, "Failed to read auction state")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionType, PlayerRole, PlayerStatus};
    use crate::store::{MemoryStore, MockAuctionStore};

    async fn engine_with(config: AuctionConfig) -> (AuctionEngine, Team, Team) {
        let engine = AuctionEngine::new(Arc::new(MemoryStore::new()), config);
        let lions = engine.register_team(NewTeam::new("Lions")).await.unwrap();
        let tigers = engine.register_team(NewTeam::new("Tigers")).await.unwrap();
        (engine, lions, tigers)
    }

    async fn engine() -> (AuctionEngine, Team, Team) {
        engine_with(AuctionConfig::default()).await
    }

    fn fast_retry() -> AuctionConfig {
        AuctionConfig {
            max_retries: 2,
            retry_backoff_ms: 1,
            ..AuctionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_get_control_creates_defaults() {
        let engine = AuctionEngine::new(Arc::new(MemoryStore::new()), AuctionConfig::default());
        assert!(engine.store.load_control().await.unwrap().is_none());

        let control = engine.get_control().await.unwrap();
        assert_eq!(control, AuctionControl::default());
        assert!(engine.store.load_control().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let (engine, _, _) = engine().await;
        let control = engine.start_auction().await.unwrap();
        assert!(control.is_started);
        assert_eq!(control.current_stage, AuctionStage::Bat);

        let err = engine.start_auction().await.unwrap_err();
        assert_eq!(err.to_string(), "Auction already started");
    }

    #[tokio::test]
    async fn test_pick_before_start_and_empty_pool() {
        let (engine, _, _) = engine().await;
        let err = engine.pick_random_player().await.unwrap_err();
        assert_eq!(err.to_string(), "Auction not started yet");

        engine.start_auction().await.unwrap();
        let err = engine.pick_random_player().await.unwrap_err();
        assert_eq!(err.to_string(), "No players remaining");
    }

    #[tokio::test]
    async fn test_sell_and_undo_round_trip() {
        let (engine, lions, _) = engine().await;
        engine
            .register_player(NewPlayer::new(1, "Arjun", PlayerRole::Bat))
            .await
            .unwrap();
        engine.start_auction().await.unwrap();
        engine.pick_random_player().await.unwrap();

        let sold = engine
            .sell_current_player(lions.id, 2_500, Some("host"))
            .await
            .unwrap();
        assert_eq!(sold.status, PlayerStatus::Sold);
        assert_eq!(sold.team_id, Some(lions.id));

        let restored = engine.undo_last_action(Some("host")).await.unwrap();
        assert_eq!(restored.status, PlayerStatus::Unsold);
        assert_eq!(restored.sold_price, None);

        let teams = engine.teams().await.unwrap();
        assert_eq!(teams[0].remaining_points, lions.remaining_points);
        assert_eq!(teams[0].auction_slots, lions.auction_slots);

        let err = engine.undo_last_action(None).await.unwrap_err();
        assert_eq!(err.to_string(), "Only SOLD actions can be undone");

        let history = engine.history(10).await.unwrap();
        assert_eq!(history[0].action_type, ActionType::Undo);
        assert_eq!(history[1].action_type, ActionType::Sold);
        assert!(history[1].undone_at.is_some());
    }

    #[tokio::test]
    async fn test_pick_twice_keeps_block() {
        let (engine, _, _) = engine().await;
        for serial in 1..=2 {
            engine
                .register_player(NewPlayer::new(serial, format!("B{}", serial), PlayerRole::Bat))
                .await
                .unwrap();
        }
        engine.start_auction().await.unwrap();
        let first = engine.pick_random_player().await.unwrap();

        let err = engine.pick_random_player().await.unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::PlayerAlreadySelected));
        let status = engine.status().await.unwrap();
        assert_eq!(status.current_player.map(|p| p.id), Some(first.id));
    }

    #[tokio::test]
    async fn test_change_stage_by_name() {
        let (engine, _, _) = engine().await;
        engine.start_auction().await.unwrap();

        let err = engine.change_stage_named("INVALID", None).await.unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::UnknownStage("INVALID".into())));

        assert_eq!(
            engine.change_stage_named("bowl", Some("host")).await.unwrap(),
            AuctionStage::Bowl
        );
        let history = engine.history(1).await.unwrap();
        assert_eq!(history[0].action_type, ActionType::StageChange);
        assert_eq!(history[0].stage, Some(AuctionStage::Bowl));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_engine_error() {
        let mut store = MockAuctionStore::new();
        store
            .expect_begin()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("connection refused".into())));
        store
            .expect_load_control()
            .returning(|| Err(StoreError::Unavailable("connection refused".into())));

        let engine = AuctionEngine::new(Arc::new(store), fast_retry());

        let err = engine.start_auction().await.unwrap_err();
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "Failed to start auction");
        assert_eq!(err.status_code(), 500);

        let err = engine.status().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to read auction state");
    }

    #[tokio::test]
    async fn test_contention_retried_then_succeeds() {
        let memory = MemoryStore::new();
        let mut calls = 0;
        let mut store = MockAuctionStore::new();
        store.expect_begin().times(3).returning(move |scope| {
            calls += 1;
            if calls < 3 {
                Err(StoreError::Contention("deadlock detected".into()))
            } else {
                futures::executor::block_on(memory.begin(scope))
            }
        });

        let engine = AuctionEngine::new(Arc::new(store), fast_retry());
        let control = engine.start_auction().await.unwrap();
        assert!(control.is_started);
    }

    #[tokio::test]
    async fn test_contention_gives_up_after_max_retries() {
        let mut store = MockAuctionStore::new();
        store
            .expect_begin()
            .times(3)
            .returning(|_| Err(StoreError::Contention("could not serialize access".into())));

        let engine = AuctionEngine::new(Arc::new(store), fast_retry());
        let err = engine.pick_random_player().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to pick player");
    }
}
